// Copyright (c) 2025 TexasFortress.AI
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! IMAP access: the `MailboxSession` contract the watcher polls through, and
//! its async-imap implementation.

pub mod client;
pub mod error;
pub mod session;
pub mod subject;
pub mod types;

pub use client::{create_session_factory, ImapCredentials};
pub use error::ImapError;
pub use session::{AsyncImapSessionWrapper, MailboxSession, SessionFactory, SessionFuture};
pub use types::{FetchResult, MailboxInfo, MessageSummary, SearchCriterion, Uid};
