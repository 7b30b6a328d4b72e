// Copyright (c) 2025 TexasFortress.AI
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::imap::error::ImapError;

/// Server-assigned message identifier (IMAP UID).
pub type Uid = u32;

/// What the watcher needs to know about one message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageSummary {
    pub uid: Uid,
    pub timestamp: DateTime<Utc>,
    pub subject: String,
}

/// Result of selecting a mailbox.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailboxInfo {
    pub exists: u32,
    pub uid_validity: Option<u32>,
    pub uid_next: Option<u32>,
}

/// How to pick the messages worth inspecting on a poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchCriterion {
    /// UIDs strictly greater than the given one.
    SinceUid(Uid),
    /// The UIDs of the last `n` messages by sequence number.
    Trailing(u32),
}

/// Summaries returned by a fetch, plus the error that cut it short, if any.
#[derive(Debug, Clone, Default)]
pub struct FetchResult {
    pub summaries: Vec<MessageSummary>,
    pub failure: Option<ImapError>,
}

impl FetchResult {
    pub fn complete(summaries: Vec<MessageSummary>) -> Self {
        Self { summaries, failure: None }
    }

    pub fn failed(err: ImapError) -> Self {
        Self { summaries: Vec::new(), failure: Some(err) }
    }
}
