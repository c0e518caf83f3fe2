//
// error.rs
//
// Error taxonomy shared by the label parser, the workspace index and the
// query pipeline.
//

use std::io;

/// Errors surfaced by the index and its collaborators.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// Malformed label text. Always surfaced, never retried.
    #[error("invalid label syntax in {text:?}: {reason}")]
    InvalidLabelSyntax { text: String, reason: &'static str },

    /// A path segment had no matching package during traversal.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// A node already has a child package with this name.
    #[error("duplicate child package: {0}")]
    DuplicateChild(String),

    /// The process could not be spawned, was interrupted, or timed out.
    #[error("failed to dispatch `{command}`: {source}")]
    DispatchFailed {
        command: String,
        #[source]
        source: io::Error,
    },

    /// The build tool ran but reported an error.
    #[error("build tool query failed: {0}")]
    QueryFailed(String),
}

impl IndexError {
    pub(crate) fn syntax(text: &str, reason: &'static str) -> Self {
        IndexError::InvalidLabelSyntax {
            text: text.to_string(),
            reason,
        }
    }

    pub(crate) fn dispatch(command: &str, source: io::Error) -> Self {
        IndexError::DispatchFailed {
            command: command.to_string(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, IndexError>;
