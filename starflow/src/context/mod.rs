//! Execution contexts.
//!
//! A [`PipelineContext`] is shared by every node of one run and carries the
//! collaborators tasks need: warehouse connections, credentials and the event
//! sink. Each node attempt gets its own [`TaskContext`] on top of it.

mod execution;
mod identity;

pub use execution::{ExecutionContext, PipelineContext, TaskContext};
pub use identity::RunIdentity;
