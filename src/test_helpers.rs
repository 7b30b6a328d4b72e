// Copyright (c) 2025 TexasFortress.AI
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! In-memory mailbox server used by the unit and integration tests.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use crate::imap::error::ImapError;
use crate::imap::session::{MailboxSession, SessionFactory, SessionFuture};
use crate::imap::types::{FetchResult, MailboxInfo, MessageSummary, SearchCriterion, Uid};

/// Builds a summary whose timestamp is `secs` seconds past the epoch.
pub fn summary(uid: Uid, secs: i64, subject: &str) -> MessageSummary {
    MessageSummary {
        uid,
        timestamp: Utc.timestamp_opt(secs, 0).single().unwrap_or_default(),
        subject: subject.to_string(),
    }
}

#[derive(Debug, Default)]
struct ServerState {
    // Messages per mailbox in sequence-number order.
    mailboxes: BTreeMap<String, Vec<MessageSummary>>,
    selected: Option<String>,
    reject_uid_search: bool,
    refuse_connections: bool,
    fetch_cutoff: Option<usize>,
    connections: usize,
    logouts: usize,
}

/// A scriptable stand-in for an IMAP server.
///
/// Clones share the same server, so a test can keep one handle to deliver
/// mail while the code under test polls through another.
#[derive(Debug, Clone)]
pub struct MemoryMailbox {
    inner: Arc<Mutex<ServerState>>,
}

impl Default for MemoryMailbox {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryMailbox {
    /// A server with an empty INBOX.
    pub fn new() -> Self {
        let mut state = ServerState::default();
        state.mailboxes.insert("INBOX".to_string(), Vec::new());
        Self { inner: Arc::new(Mutex::new(state)) }
    }

    fn lock(&self) -> MutexGuard<'_, ServerState> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn create_mailbox(&self, name: &str) {
        self.lock().mailboxes.entry(name.to_string()).or_default();
    }

    /// Appends to INBOX.
    pub fn deliver(&self, message: MessageSummary) {
        self.deliver_to("INBOX", message);
    }

    pub fn deliver_to(&self, mailbox: &str, message: MessageSummary) {
        self.lock().mailboxes.entry(mailbox.to_string()).or_default().push(message);
    }

    pub fn expunge(&self, mailbox: &str, uid: Uid) {
        if let Some(messages) = self.lock().mailboxes.get_mut(mailbox) {
            messages.retain(|m| m.uid != uid);
        }
    }

    /// Makes `UID SEARCH` fail with a BAD response.
    pub fn reject_uid_search(&self, reject: bool) {
        self.lock().reject_uid_search = reject;
    }

    /// Makes the session factory fail to connect.
    pub fn refuse_connections(&self, refuse: bool) {
        self.lock().refuse_connections = refuse;
    }

    /// Cuts every fetch short after `limit` summaries.
    pub fn cut_fetch_after(&self, limit: Option<usize>) {
        self.lock().fetch_cutoff = limit;
    }

    pub fn connections(&self) -> usize {
        self.lock().connections
    }

    pub fn logouts(&self) -> usize {
        self.lock().logouts
    }

    fn selected_messages<'a>(state: &'a ServerState) -> Result<&'a [MessageSummary], ImapError> {
        let name = state
            .selected
            .as_deref()
            .ok_or_else(|| ImapError::InvalidMailbox("no mailbox selected".to_string()))?;
        state
            .mailboxes
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| ImapError::InvalidMailbox(name.to_string()))
    }
}

#[async_trait]
impl MailboxSession for MemoryMailbox {
    async fn select_mailbox(&self, name: &str) -> Result<MailboxInfo, ImapError> {
        let mut state = self.lock();
        let messages = state
            .mailboxes
            .get(name)
            .ok_or_else(|| ImapError::InvalidMailbox(name.to_string()))?;
        let info = MailboxInfo {
            exists: messages.len() as u32,
            uid_validity: Some(1),
            uid_next: Some(messages.iter().map(|m| m.uid).max().unwrap_or(0) + 1),
        };
        state.selected = Some(name.to_string());
        Ok(info)
    }

    async fn search_candidates(&self, criterion: SearchCriterion) -> Result<Vec<Uid>, ImapError> {
        let state = self.lock();
        let messages = Self::selected_messages(&state)?;
        let mut uids: Vec<Uid> = match criterion {
            SearchCriterion::SinceUid(since) => {
                if state.reject_uid_search {
                    return Err(ImapError::BadResponse("UID SEARCH not supported".to_string()));
                }
                let mut found: Vec<Uid> =
                    messages.iter().map(|m| m.uid).filter(|uid| *uid > since).collect();
                // Like a real server, "n:*" always matches the highest UID.
                if found.is_empty() {
                    found.extend(messages.iter().map(|m| m.uid).max());
                }
                found
            }
            SearchCriterion::Trailing(count) => {
                let start = messages.len().saturating_sub(count as usize);
                messages[start..].iter().map(|m| m.uid).collect()
            }
        };
        uids.sort_unstable();
        uids.dedup();
        Ok(uids)
    }

    async fn fetch_summaries(&self, uids: &[Uid]) -> FetchResult {
        let state = self.lock();
        let messages = match Self::selected_messages(&state) {
            Ok(messages) => messages,
            Err(err) => return FetchResult::failed(err),
        };
        let mut found: Vec<MessageSummary> =
            messages.iter().filter(|m| uids.contains(&m.uid)).cloned().collect();
        match state.fetch_cutoff {
            Some(limit) if limit < found.len() => {
                found.truncate(limit);
                FetchResult {
                    summaries: found,
                    failure: Some(ImapError::Fetch("connection dropped mid-fetch".to_string())),
                }
            }
            _ => FetchResult::complete(found),
        }
    }

    async fn logout(&self) -> Result<(), ImapError> {
        let mut state = self.lock();
        state.selected = None;
        state.logouts += 1;
        Ok(())
    }
}

/// A factory handing out sessions on `server`.
pub fn memory_session_factory(server: MemoryMailbox) -> SessionFactory {
    Arc::new(move || -> SessionFuture {
        let server = server.clone();
        Box::pin(async move {
            {
                let mut state = server.lock();
                if state.refuse_connections {
                    return Err(ImapError::Connection("connection refused".to_string()));
                }
                state.connections += 1;
            }
            Ok(Box::new(server) as Box<dyn MailboxSession>)
        })
    })
}
