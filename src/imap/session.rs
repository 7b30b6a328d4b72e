// Copyright (c) 2025 TexasFortress.AI
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use futures_util::future::BoxFuture;
use futures_util::{pin_mut, StreamExt};
use log::{debug, warn};
use tokio::net::TcpStream as TokioTcpStream;
use tokio::sync::Mutex as TokioMutex;
use tokio_rustls::client::TlsStream;
use tokio_util::compat::Compat;

#[cfg(test)]
use mockall::automock;

use crate::imap::error::ImapError;
use crate::imap::subject::decode_subject;
use crate::imap::types::{FetchResult, MailboxInfo, MessageSummary, SearchCriterion, Uid};

// Type aliases
pub type TlsCompatibleStream = Compat<TlsStream<TokioTcpStream>>;
pub type TlsImapSession = async_imap::Session<TlsCompatibleStream>;

pub type SessionFuture = BoxFuture<'static, Result<Box<dyn MailboxSession>, ImapError>>;

/// Factory that connects and logs in, returning a ready-to-use session.
///
/// The scheduler calls it once per poll cycle.
pub type SessionFactory = Arc<dyn Fn() -> SessionFuture + Send + Sync>;

const SUMMARY_FETCH_ITEMS: &str = "(UID INTERNALDATE ENVELOPE)";

/// The mailbox operations the watcher relies on.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait MailboxSession: Send + Sync {
    /// Selects a mailbox and reports its size and UID metadata.
    async fn select_mailbox(&self, name: &str) -> Result<MailboxInfo, ImapError>;

    /// Returns candidate UIDs in the selected mailbox, ascending.
    async fn search_candidates(&self, criterion: SearchCriterion) -> Result<Vec<Uid>, ImapError>;

    /// Fetches summaries for the given UIDs. Whatever arrived before an
    /// error is still returned.
    async fn fetch_summaries(&self, uids: &[Uid]) -> FetchResult;

    /// Logs out the current session
    async fn logout(&self) -> Result<(), ImapError>;
}

/// `MailboxSession` over a live async-imap session.
#[derive(Clone)]
pub struct AsyncImapSessionWrapper {
    session: Arc<TokioMutex<TlsImapSession>>,
    // Message count of the selected mailbox, needed to address the trailing window.
    selected_exists: Arc<TokioMutex<Option<u32>>>,
}

impl fmt::Debug for AsyncImapSessionWrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncImapSessionWrapper").finish_non_exhaustive()
    }
}

impl AsyncImapSessionWrapper {
    pub fn new(session: TlsImapSession) -> Self {
        Self {
            session: Arc::new(TokioMutex::new(session)),
            selected_exists: Arc::new(TokioMutex::new(None)),
        }
    }
}

#[async_trait]
impl MailboxSession for AsyncImapSessionWrapper {
    async fn select_mailbox(&self, name: &str) -> Result<MailboxInfo, ImapError> {
        let mut session_guard = self.session.lock().await;
        let mailbox = session_guard.select(name).await.map_err(|e| match ImapError::from(e) {
            ImapError::Operation(msg) => ImapError::InvalidMailbox(format!("{}: {}", name, msg)),
            other => other,
        })?;
        *self.selected_exists.lock().await = Some(mailbox.exists);
        debug!(
            "Selected {}: exists={} uidvalidity={:?} uidnext={:?}",
            name, mailbox.exists, mailbox.uid_validity, mailbox.uid_next
        );
        Ok(MailboxInfo {
            exists: mailbox.exists,
            uid_validity: mailbox.uid_validity,
            uid_next: mailbox.uid_next,
        })
    }

    async fn search_candidates(&self, criterion: SearchCriterion) -> Result<Vec<Uid>, ImapError> {
        let mut session_guard = self.session.lock().await;
        let mut uids: Vec<Uid> = match criterion {
            SearchCriterion::SinceUid(since) => {
                let query = format!("UID {}:*", since.saturating_add(1));
                session_guard
                    .uid_search(&query)
                    .await?
                    .into_iter()
                    // "n:*" always matches the highest UID, even when it is below n.
                    .filter(|uid| *uid > since)
                    .collect()
            }
            SearchCriterion::Trailing(count) => {
                let exists = (*self.selected_exists.lock().await)
                    .ok_or_else(|| ImapError::InvalidMailbox("no mailbox selected".to_string()))?;
                if exists == 0 || count == 0 {
                    return Ok(Vec::new());
                }
                let start = exists.saturating_sub(count) + 1;
                let range = format!("{}:{}", start, exists);
                let stream = session_guard.fetch(&range, "UID").await?;
                pin_mut!(stream);
                let mut found = Vec::new();
                while let Some(item) = stream.next().await {
                    if let Some(uid) = item?.uid {
                        found.push(uid);
                    }
                }
                found
            }
        };
        uids.sort_unstable();
        uids.dedup();
        Ok(uids)
    }

    async fn fetch_summaries(&self, uids: &[Uid]) -> FetchResult {
        if uids.is_empty() {
            return FetchResult::default();
        }
        let mut session_guard = self.session.lock().await;
        let sequence = uids.iter().map(|uid| uid.to_string()).collect::<Vec<_>>().join(",");
        let requested: HashSet<Uid> = uids.iter().copied().collect();

        let stream = match session_guard.uid_fetch(&sequence, SUMMARY_FETCH_ITEMS).await {
            Ok(stream) => stream,
            Err(e) => return FetchResult::failed(ImapError::from(e)),
        };
        pin_mut!(stream);

        let mut result = FetchResult::default();
        while let Some(item) = stream.next().await {
            let fetch = match item {
                Ok(fetch) => fetch,
                Err(e) => {
                    warn!("Fetch of {} UIDs interrupted: {}", uids.len(), e);
                    result.failure = Some(ImapError::Fetch(e.to_string()));
                    break;
                }
            };
            let Some(uid) = fetch.uid else {
                debug!("Skipping FETCH response without a UID");
                continue;
            };
            if !requested.contains(&uid) {
                // Unsolicited, e.g. a flag change on another message.
                debug!("Skipping unsolicited FETCH for UID {}", uid);
                continue;
            }
            let timestamp = fetch
                .internal_date()
                .map(|d| d.with_timezone(&Utc))
                .unwrap_or_else(|| {
                    debug!("UID {} has no INTERNALDATE, using current time", uid);
                    Utc::now()
                });
            let subject = decode_subject(
                fetch.envelope().and_then(|env| env.subject.as_deref()),
            );
            result.summaries.push(MessageSummary { uid, timestamp, subject });
        }
        result
    }

    async fn logout(&self) -> Result<(), ImapError> {
        let mut session_guard = self.session.lock().await;
        session_guard.logout().await.map_err(ImapError::from)
    }
}

