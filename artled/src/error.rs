#![warn(missing_docs)]
//! The errors used within the artled crate.

use std::sync::PoisonError;

use crate::{node_name::NodeNameError, parse_error::ParseError, settings::StoreError};

/// Error
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO errors
    #[error("std error: {0:?}")]
    Io(#[from] std::io::Error),

    /// Reading or writing the persisted settings failed.
    #[error("settings store error: {0}")]
    Store(#[from] StoreError),

    /// All datagram parse errors, see [ParseError].
    #[error("art-net parse error: {0:?}")]
    Parse(#[from] ParseError),

    /// Error with a node name
    #[error("node name error: {0:?}")]
    NodeName(#[from] NodeNameError),

    /// Failed to send a poll reply
    #[error("Failed to send poll reply")]
    SendPollReply(#[source] std::io::Error),

    /// Failed to write to a control connection
    #[error("Failed to write to control connection")]
    ControlWrite(#[source] std::io::Error),

    /// Thrown to indicate that the shared patch table has been poisoned by a thread panicking while holding its lock.
    /// The worker that observes this stops, a new node has to be started from the persisted settings.
    ///
    /// # Arguments
    /// A message providing further details as to where the corruption was observed.
    #[error("The patch table has corrupted due to an internal panic! and should no longer be used, {0}")]
    PatchTableCorrupt(String),

    /// All workers of a node stopped without reporting why.
    #[error("All workers of the node stopped")]
    WorkersStopped,
}

impl Error {
    /// Maps a poisoned patch table lock to [Error::PatchTableCorrupt], `context` names the worker that noticed.
    pub(crate) fn poisoned<T>(context: &str, e: PoisonError<T>) -> Self {
        Self::PatchTableCorrupt(format!("{context}: {e}"))
    }

    /// True for errors a worker recovers from by setting up its socket again.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::PatchTableCorrupt(_) | Self::WorkersStopped)
    }
}
