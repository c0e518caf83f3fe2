// lib.rs - Bazel workspace label model and query-backed index.
//
// The binary in main.rs drives a one-shot refresh; editor integrations use
// the library directly.

pub mod completion;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod label;
pub mod lsp_adapter;
pub mod perf;
pub mod query;
pub mod refresh;
pub mod state;
pub mod tree;
pub mod utf16;
pub mod workspace_api;
// test_utils is available in test builds and when the `test-support` feature is enabled.
#[cfg(any(test, feature = "test-support"))]
pub mod test_utils;

pub use error::{IndexError, Result};
pub use label::Label;
pub use tree::{BuildTarget, Package, SourceFile, WorkspaceTree};
pub use workspace_api::{LabelCheck, WorkspaceApi};
