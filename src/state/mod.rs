// Copyright (c) 2025 TexasFortress.AI
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Persisted recognition state: what has been seen in each mailbox.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::imap::types::Uid;

pub mod seen_window;
pub mod store;

pub use seen_window::{SeenWindow, SEEN_WINDOW_CAPACITY};
pub use store::{CorruptStatePolicy, StateError, StateStore};

/// Recognition state for one mailbox.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailboxState {
    #[serde(default)]
    pub seen: SeenWindow,
    /// Highest UID ever incorporated. Only narrows the search.
    #[serde(default)]
    pub cursor: Uid,
}

impl MailboxState {
    /// Folds a fetched UID into the state. Returns true if anything changed.
    pub fn absorb(&mut self, uid: Uid) -> bool {
        let inserted = self.seen.insert(uid);
        let advanced = uid > self.cursor;
        if advanced {
            self.cursor = uid;
        }
        inserted || advanced
    }

    /// True once anything has been recorded. An empty, zero-cursor state
    /// only says the mailbox was checked while it was empty.
    pub fn has_baseline(&self) -> bool {
        !self.seen.is_empty() || self.cursor > 0
    }
}

/// Everything persisted, keyed by mailbox name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateFile {
    #[serde(default)]
    pub mailboxes: BTreeMap<String, MailboxState>,
}

impl StateFile {
    /// True if `mailbox` has a baseline, so later messages count as new.
    pub fn is_initialized(&self, mailbox: &str) -> bool {
        self.mailboxes.get(mailbox).is_some_and(MailboxState::has_baseline)
    }

    /// True if `mailbox` has been looked at, even if it was empty then.
    pub fn is_checked(&self, mailbox: &str) -> bool {
        self.mailboxes.contains_key(mailbox)
    }

    pub fn mailbox(&self, mailbox: &str) -> Option<&MailboxState> {
        self.mailboxes.get(mailbox)
    }
}
