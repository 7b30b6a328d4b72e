// Copyright (c) 2025 TexasFortress.AI
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::collections::{HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::imap::types::Uid;

/// Number of UIDs remembered per mailbox.
pub const SEEN_WINDOW_CAPACITY: usize = 100;

/// Bounded set of UIDs that have already been accounted for.
///
/// Entries are kept in insertion order; once the window is full the entry
/// inserted earliest is evicted, whatever its numeric value. Membership is
/// checked through a hash index so `contains` is O(1).
///
/// Serialized as a plain list, oldest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<Uid>", into = "Vec<Uid>")]
pub struct SeenWindow {
    order: VecDeque<Uid>,
    members: HashSet<Uid>,
    capacity: usize,
}

impl SeenWindow {
    pub fn new() -> Self {
        Self::with_capacity(SEEN_WINDOW_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            order: VecDeque::with_capacity(capacity),
            members: HashSet::with_capacity(capacity),
            capacity,
        }
    }

    pub fn contains(&self, uid: Uid) -> bool {
        self.members.contains(&uid)
    }

    /// Adds `uid`. Returns false if it was already present, in which case its
    /// position in the eviction order is left alone.
    pub fn insert(&mut self, uid: Uid) -> bool {
        if !self.members.insert(uid) {
            return false;
        }
        self.order.push_back(uid);
        while self.order.len() > self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.members.remove(&evicted);
            }
        }
        true
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Iterates oldest first.
    pub fn iter(&self) -> impl Iterator<Item = Uid> + '_ {
        self.order.iter().copied()
    }
}

impl Default for SeenWindow {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Vec<Uid>> for SeenWindow {
    fn from(uids: Vec<Uid>) -> Self {
        let mut window = SeenWindow::new();
        for uid in uids {
            window.insert(uid);
        }
        window
    }
}

impl From<SeenWindow> for Vec<Uid> {
    fn from(window: SeenWindow) -> Self {
        window.order.into_iter().collect()
    }
}
