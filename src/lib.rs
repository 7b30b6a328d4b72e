// Copyright (c) 2025 TexasFortress.AI
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Library core for rustynotif.

// --- Modules ---
pub mod cli;
pub mod config;
pub mod error;
pub mod imap;
pub mod notify;
pub mod state;
pub mod watch;

// In-memory server for unit tests; integration tests enable `test-helpers`.
#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;

pub mod prelude {
    // Config
    pub use crate::config::{CorruptStatePolicy, Settings};

    // IMAP
    pub use crate::imap::error::ImapError;
    pub use crate::imap::session::{MailboxSession, SessionFactory};
    pub use crate::imap::types::{FetchResult, MailboxInfo, MessageSummary, SearchCriterion, Uid};

    // State and polling
    pub use crate::error::WatchError;
    pub use crate::state::{
        MailboxState, SeenWindow, StateError, StateFile, StateStore, SEEN_WINDOW_CAPACITY,
    };
    pub use crate::watch::{
        CandidateStrategy, ChangeDetector, CycleReport, DetectorOptions, NotificationBatch, Scheduler,
    };

    // Common Libs
    pub use log::{debug, error, info, trace, warn};
    pub use std::sync::Arc;
}
