//! Caller-observable error kinds (§7).
//!
//! Every fallible entry point in this crate returns `Result<_, GraphError>`; none of them leak an
//! `anyhow::Error`, so consumers can match on the concrete variant they care about.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("frame '{0}' already exists")]
    DuplicateFrame(String),

    #[error("parent frame '{0}' not found")]
    ParentNotFound(String),

    #[error("frame '{0}' not found")]
    FrameNotFound(String),

    #[error("frame '{0}' has children and cannot be removed")]
    HasChildren(String),

    #[error("cycle detected at frame '{0}'")]
    CycleDetected(String),

    #[error("frames '{0}' and '{1}' are not connected")]
    NotConnected(String, String),

    #[error("timestamp queried for frame '{0}' is older than the oldest retained sample")]
    OutOfRange(String),

    #[error("no samples retained for frame '{0}'")]
    BufferEmpty(String),

    #[error("{0} change listener(s) panicked during dispatch")]
    ListenerPanicked(usize),
}
