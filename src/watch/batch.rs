// Copyright (c) 2025 TexasFortress.AI
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::cmp::Reverse;

use crate::imap::types::MessageSummary;

/// New messages found by one cycle, newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotificationBatch {
    items: Vec<MessageSummary>,
}

impl NotificationBatch {
    pub fn new(mut items: Vec<MessageSummary>) -> Self {
        sort_newest_first(&mut items);
        Self { items }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn items(&self) -> &[MessageSummary] {
        &self.items
    }

    pub fn subjects(&self) -> Vec<&str> {
        self.items.iter().map(|item| item.subject.as_str()).collect()
    }

    /// Folds another batch in, keeping the newest-first order.
    pub fn merge(&mut self, other: NotificationBatch) {
        if other.is_empty() {
            return;
        }
        self.items.extend(other.items);
        sort_newest_first(&mut self.items);
    }

    pub fn into_items(self) -> Vec<MessageSummary> {
        self.items
    }
}

// Ties on timestamp fall back to the higher UID first.
fn sort_newest_first(items: &mut [MessageSummary]) {
    items.sort_by_key(|item| Reverse((item.timestamp, item.uid)));
}
