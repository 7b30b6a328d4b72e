// Copyright (c) 2025 TexasFortress.AI
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use thiserror::Error;

/// Failures talking to the IMAP server.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ImapError {
    #[error("cannot reach server: {0}")]
    Connection(String),
    #[error("TLS setup failed: {0}")]
    Tls(String),
    #[error("login rejected: {0}")]
    Auth(String),
    #[error("timed out during {0}")]
    Timeout(String),
    #[error("mailbox unavailable: {0}")]
    InvalidMailbox(String),
    #[error("unparseable server response: {0}")]
    Parse(String),
    #[error("server answered BAD: {0}")]
    BadResponse(String),
    #[error("server answered NO: {0}")]
    Operation(String),
    #[error("fetch failed: {0}")]
    Fetch(String),
    #[error("{0}")]
    Other(String),
}

impl ImapError {
    /// True for failures of the transport or login rather than of a command
    /// the server understood and refused.
    pub fn is_connection_failure(&self) -> bool {
        matches!(
            self,
            ImapError::Connection(_) | ImapError::Tls(_) | ImapError::Auth(_) | ImapError::Timeout(_)
        )
    }
}

impl From<async_imap::error::Error> for ImapError {
    fn from(err: async_imap::error::Error) -> Self {
        use async_imap::error::Error as Raw;
        match err {
            Raw::Io(io) => io.into(),
            Raw::ConnectionLost => ImapError::Connection("connection lost".to_string()),
            Raw::Bad(text) => ImapError::BadResponse(text),
            Raw::No(text) => ImapError::Operation(text),
            Raw::Parse(parse) => ImapError::Parse(parse.to_string()),
            other => ImapError::Other(other.to_string()),
        }
    }
}

impl From<std::io::Error> for ImapError {
    fn from(io: std::io::Error) -> Self {
        if io.kind() == std::io::ErrorKind::TimedOut {
            ImapError::Timeout(io.to_string())
        } else {
            ImapError::Connection(io.to_string())
        }
    }
}
