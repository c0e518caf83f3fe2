//! Helpers shared by unit tests and integration tests.

pub mod fixture_workspace;
pub mod scripted_runner;
