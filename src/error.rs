// Copyright (c) 2025 TexasFortress.AI
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use thiserror::Error;

use crate::imap::error::ImapError;
use crate::state::StateError;

/// Failures of a poll cycle, as seen by the scheduler.
#[derive(Debug, Error)]
pub enum WatchError {
    #[error("Connection error: {0}")]
    Connection(#[source] ImapError),

    #[error("Protocol error: {0}")]
    Protocol(#[source] ImapError),

    #[error("Partial fetch in {mailbox}: received {received} of {requested} summaries ({reason})")]
    PartialFetch {
        mailbox: String,
        requested: usize,
        received: usize,
        reason: String,
    },

    #[error("State corruption: {0}")]
    StateCorruption(#[source] StateError),

    #[error("Persistence error: {0}")]
    Persistence(#[source] StateError),
}

impl WatchError {
    /// True if the cycle was aborted before touching any mailbox data.
    pub fn is_connection(&self) -> bool {
        matches!(self, WatchError::Connection(_))
    }
}

impl From<ImapError> for WatchError {
    fn from(err: ImapError) -> Self {
        if err.is_connection_failure() {
            WatchError::Connection(err)
        } else {
            WatchError::Protocol(err)
        }
    }
}

impl From<StateError> for WatchError {
    fn from(err: StateError) -> Self {
        match err {
            StateError::Corrupt { .. } => WatchError::StateCorruption(err),
            other => WatchError::Persistence(other),
        }
    }
}
