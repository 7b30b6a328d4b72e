// Copyright (c) 2025 TexasFortress.AI
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::collections::HashSet;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::error::WatchError;
use crate::imap::session::MailboxSession;
use crate::imap::types::{MailboxInfo, SearchCriterion, Uid};
use crate::state::{StateFile, StateStore, SEEN_WINDOW_CAPACITY};
use crate::watch::baseline::BaselineInitializer;
use crate::watch::batch::NotificationBatch;

pub const DEFAULT_BASELINE_SIZE: u32 = 10;
pub const DEFAULT_TRAILING_WINDOW: u32 = 30;

/// How candidate UIDs are chosen once a mailbox has a cursor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateStrategy {
    /// `UID SEARCH cursor+1:*`, falling back to the trailing window if the
    /// server rejects it.
    #[default]
    SinceCursor,
    /// Always re-inspect the trailing window.
    Trailing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectorOptions {
    pub baseline_size: u32,
    pub trailing_window: u32,
    pub strategy: CandidateStrategy,
}

impl Default for DetectorOptions {
    fn default() -> Self {
        Self {
            baseline_size: DEFAULT_BASELINE_SIZE,
            trailing_window: DEFAULT_TRAILING_WINDOW,
            strategy: CandidateStrategy::default(),
        }
    }
}

impl DetectorOptions {
    /// The baseline has to cover the trailing window, otherwise the fallback
    /// would report pre-existing messages the baseline skipped.
    pub fn baseline_depth(&self) -> u32 {
        self.baseline_size
            .max(self.trailing_window)
            .min(SEEN_WINDOW_CAPACITY as u32)
    }
}

/// Outcome of polling one mailbox.
#[derive(Debug, Default)]
pub struct CycleReport {
    pub mailbox: String,
    pub batch: NotificationBatch,
    /// Problems that did not stop the cycle.
    pub warnings: Vec<WatchError>,
    /// True if the state file was rewritten.
    pub persisted: bool,
    /// True if this cycle established the baseline.
    pub baselined: bool,
}

impl CycleReport {
    fn empty(mailbox: &str) -> Self {
        Self { mailbox: mailbox.to_string(), ..Default::default() }
    }
}

/// Runs single poll cycles against one mailbox at a time.
#[derive(Debug, Clone)]
pub struct ChangeDetector {
    store: StateStore,
    options: DetectorOptions,
    baseline: BaselineInitializer,
}

impl ChangeDetector {
    pub fn new(store: StateStore, options: DetectorOptions) -> Self {
        let baseline = BaselineInitializer::new(options.baseline_depth());
        Self { store, options, baseline }
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn options(&self) -> &DetectorOptions {
        &self.options
    }

    /// Polls `mailbox` once.
    ///
    /// `state` is updated and saved before the report is returned, so a
    /// message in the returned batch will not be reported again even if the
    /// caller never gets to act on it.
    pub async fn poll(
        &self,
        session: &dyn MailboxSession,
        mailbox: &str,
        state: &mut StateFile,
    ) -> Result<CycleReport, WatchError> {
        let info = session.select_mailbox(mailbox).await?;
        debug!(
            "Polling {}: exists={} uidvalidity={:?}",
            mailbox, info.exists, info.uid_validity
        );

        if !state.is_initialized(mailbox) {
            return self.establish_baseline(session, mailbox, &info, state).await;
        }

        let mut report = CycleReport::empty(mailbox);
        if info.exists == 0 {
            debug!("Mailbox {} is empty", mailbox);
            return Ok(report);
        }

        let cursor = state.mailbox(mailbox).map(|m| m.cursor).unwrap_or_default();
        let candidates = self.candidates(session, mailbox, cursor).await?;
        if candidates.is_empty() {
            debug!("No candidates in {} past UID {}", mailbox, cursor);
            return Ok(report);
        }

        let fetched = session.fetch_summaries(&candidates).await;
        let requested: HashSet<Uid> = candidates.iter().copied().collect();
        let mut summaries = fetched.summaries;
        summaries.retain(|s| {
            let wanted = requested.contains(&s.uid);
            if !wanted {
                debug!("Ignoring summary for unrequested UID {} in {}", s.uid, mailbox);
            }
            wanted
        });
        match fetched.failure {
            Some(err) if summaries.is_empty() => {
                warn!("Fetch in {} failed with nothing received: {}", mailbox, err);
                return Err(err.into());
            }
            Some(err) => {
                warn!(
                    "Fetch in {} interrupted after {} of {} summaries: {}",
                    mailbox,
                    summaries.len(),
                    candidates.len(),
                    err
                );
                report.warnings.push(WatchError::PartialFetch {
                    mailbox: mailbox.to_string(),
                    requested: candidates.len(),
                    received: summaries.len(),
                    reason: err.to_string(),
                });
            }
            None if summaries.len() < candidates.len() => {
                // Usually an expunge between the search and the fetch.
                debug!(
                    "Fetch in {} returned {} of {} summaries",
                    mailbox,
                    summaries.len(),
                    candidates.len()
                );
                report.warnings.push(WatchError::PartialFetch {
                    mailbox: mailbox.to_string(),
                    requested: candidates.len(),
                    received: summaries.len(),
                    reason: "messages missing from response".to_string(),
                });
            }
            None => {}
        }

        // Ascending UID order keeps the window's eviction order close to arrival order.
        summaries.sort_by_key(|s| s.uid);

        let Some(entry) = state.mailboxes.get_mut(mailbox) else {
            return Ok(report);
        };
        let mut changed = false;
        let mut fresh = Vec::new();
        for summary in summaries {
            let is_new = !entry.seen.contains(summary.uid);
            changed |= entry.absorb(summary.uid);
            if is_new {
                fresh.push(summary);
            }
        }

        if !fresh.is_empty() {
            info!("{} new message(s) in {}", fresh.len(), mailbox);
        }
        report.batch = NotificationBatch::new(fresh);

        if changed {
            report.persisted = self.persist(state, &mut report.warnings).await;
        }
        Ok(report)
    }

    /// Forgets everything about `mailbox` and baselines it again.
    pub async fn reset(
        &self,
        session: &dyn MailboxSession,
        mailbox: &str,
        state: &mut StateFile,
    ) -> Result<CycleReport, WatchError> {
        if state.mailboxes.remove(mailbox).is_some() {
            info!("Reset state for {}", mailbox);
        }
        let info = session.select_mailbox(mailbox).await?;
        let report = self.establish_baseline(session, mailbox, &info, state).await?;
        if !report.baselined {
            // The baseline could not be taken; still drop the old entry on disk.
            let mut warnings = Vec::new();
            self.persist(state, &mut warnings).await;
            if let Some(err) = warnings.into_iter().next() {
                return Err(err);
            }
        }
        Ok(report)
    }

    async fn establish_baseline(
        &self,
        session: &dyn MailboxSession,
        mailbox: &str,
        info: &MailboxInfo,
        state: &mut StateFile,
    ) -> Result<CycleReport, WatchError> {
        let mut report = CycleReport::empty(mailbox);
        let Some(baseline) = self.baseline.initialize(session, mailbox, info).await? else {
            return Ok(report);
        };
        if state.mailbox(mailbox) == Some(&baseline) {
            // Still empty since the last check.
            return Ok(report);
        }
        state.mailboxes.insert(mailbox.to_string(), baseline);
        report.baselined = true;
        report.persisted = self.persist(state, &mut report.warnings).await;
        Ok(report)
    }

    async fn candidates(
        &self,
        session: &dyn MailboxSession,
        mailbox: &str,
        cursor: Uid,
    ) -> Result<Vec<Uid>, WatchError> {
        let trailing = SearchCriterion::Trailing(self.options.trailing_window.max(1));
        if self.options.strategy == CandidateStrategy::Trailing {
            return Ok(session.search_candidates(trailing).await?);
        }

        match session.search_candidates(SearchCriterion::SinceUid(cursor)).await {
            Ok(uids) => Ok(uids.into_iter().filter(|uid| *uid > cursor).collect()),
            Err(err) if !err.is_connection_failure() => {
                warn!(
                    "UID search in {} rejected ({}), re-inspecting the last {} messages",
                    mailbox,
                    err,
                    self.options.trailing_window
                );
                Ok(session.search_candidates(trailing).await?)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Saves `state`, turning a failure into a warning. Returns whether it was written.
    async fn persist(&self, state: &StateFile, warnings: &mut Vec<WatchError>) -> bool {
        match self.store.save(state).await {
            Ok(()) => true,
            Err(err) => {
                warn!("Failed to save state to {:?}: {}", self.store.path(), err);
                warnings.push(WatchError::Persistence(err));
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imap::error::ImapError;
    use crate::imap::session::MockMailboxSession;
    use crate::imap::types::FetchResult;
    use crate::state::MailboxState;
    use crate::test_helpers::{summary, MemoryMailbox};
    use mockall::predicate::eq;
    use tempfile::TempDir;

    fn detector(dir: &TempDir) -> ChangeDetector {
        ChangeDetector::new(StateStore::new(dir.path().join("email_state.json")), DetectorOptions::default())
    }

    fn initialized(uids: &[Uid]) -> StateFile {
        let mut inbox = MailboxState::default();
        for uid in uids {
            inbox.absorb(*uid);
        }
        let mut state = StateFile::default();
        state.mailboxes.insert("INBOX".to_string(), inbox);
        state
    }

    #[test]
    fn test_baseline_depth_covers_trailing_window() {
        assert_eq!(DetectorOptions::default().baseline_depth(), DEFAULT_TRAILING_WINDOW);
        let wide = DetectorOptions { baseline_size: 500, ..Default::default() };
        assert_eq!(wide.baseline_depth(), SEEN_WINDOW_CAPACITY as u32);
    }

    #[tokio::test]
    async fn test_first_poll_is_silent() {
        let dir = TempDir::new().unwrap();
        let mailbox = MemoryMailbox::new();
        mailbox.deliver(summary(10, 1, "first"));
        mailbox.deliver(summary(11, 2, "second"));

        let mut state = StateFile::default();
        let report = detector(&dir).poll(&mailbox, "INBOX", &mut state).await.unwrap();

        assert!(report.batch.is_empty());
        assert!(report.baselined);
        assert!(report.persisted);
        assert_eq!(state.mailbox("INBOX").unwrap().cursor, 11);
    }

    #[tokio::test]
    async fn test_new_message_reported_once() {
        let dir = TempDir::new().unwrap();
        let detector = detector(&dir);
        let mailbox = MemoryMailbox::new();
        mailbox.deliver(summary(10, 1, "old"));

        let mut state = StateFile::default();
        detector.poll(&mailbox, "INBOX", &mut state).await.unwrap();

        mailbox.deliver(summary(11, 2, "hello"));
        let report = detector.poll(&mailbox, "INBOX", &mut state).await.unwrap();
        assert_eq!(report.batch.subjects(), vec!["hello"]);
        assert!(report.persisted);

        let again = detector.poll(&mailbox, "INBOX", &mut state).await.unwrap();
        assert!(again.batch.is_empty());
        assert!(!again.persisted);
    }

    #[tokio::test]
    async fn test_search_rejection_falls_back_to_trailing() {
        let dir = TempDir::new().unwrap();
        let mut session = MockMailboxSession::new();
        session
            .expect_select_mailbox()
            .returning(|_| Ok(MailboxInfo { exists: 3, ..Default::default() }));
        session
            .expect_search_candidates()
            .with(eq(SearchCriterion::SinceUid(12)))
            .times(1)
            .returning(|_| Err(ImapError::BadResponse("SEARCH not supported".into())));
        session
            .expect_search_candidates()
            .with(eq(SearchCriterion::Trailing(DEFAULT_TRAILING_WINDOW)))
            .times(1)
            .returning(|_| Ok(vec![8, 11, 12]));
        session.expect_fetch_summaries().times(1).returning(|uids| {
            FetchResult::complete(uids.iter().map(|uid| summary(*uid, *uid as i64, "m")).collect())
        });

        let mut state = initialized(&[11, 12]);
        let report = detector(&dir).poll(&session, "INBOX", &mut state).await.unwrap();

        // 8 is below the cursor but was never seen.
        assert_eq!(report.batch.items().iter().map(|s| s.uid).collect::<Vec<_>>(), vec![8]);
        let inbox = state.mailbox("INBOX").unwrap();
        assert!(inbox.seen.contains(8));
        assert_eq!(inbox.cursor, 12);
    }

    #[tokio::test]
    async fn test_connection_failure_during_search_is_not_masked() {
        let dir = TempDir::new().unwrap();
        let mut session = MockMailboxSession::new();
        session
            .expect_select_mailbox()
            .returning(|_| Ok(MailboxInfo { exists: 3, ..Default::default() }));
        session
            .expect_search_candidates()
            .times(1)
            .returning(|_| Err(ImapError::Connection("broken pipe".into())));

        let mut state = initialized(&[11, 12]);
        let before = state.clone();
        let err = detector(&dir).poll(&session, "INBOX", &mut state).await.unwrap_err();
        assert!(err.is_connection());
        assert_eq!(state, before);
    }

    #[tokio::test]
    async fn test_failed_fetch_without_data_leaves_state() {
        let dir = TempDir::new().unwrap();
        let mut session = MockMailboxSession::new();
        session
            .expect_select_mailbox()
            .returning(|_| Ok(MailboxInfo { exists: 4, ..Default::default() }));
        session.expect_search_candidates().returning(|_| Ok(vec![13, 14]));
        session
            .expect_fetch_summaries()
            .returning(|_| FetchResult::failed(ImapError::Parse("garbled".into())));

        let mut state = initialized(&[11, 12]);
        let before = state.clone();
        let err = detector(&dir).poll(&session, "INBOX", &mut state).await.unwrap_err();
        assert!(matches!(err, WatchError::Protocol(ImapError::Parse(_))));
        assert_eq!(state, before);
        assert!(!dir.path().join("email_state.json").exists());
    }

    #[tokio::test]
    async fn test_partial_fetch_keeps_what_arrived() {
        let dir = TempDir::new().unwrap();
        let mut session = MockMailboxSession::new();
        session
            .expect_select_mailbox()
            .returning(|_| Ok(MailboxInfo { exists: 4, ..Default::default() }));
        session.expect_search_candidates().returning(|_| Ok(vec![13, 14]));
        session.expect_fetch_summaries().returning(|_| FetchResult {
            summaries: vec![summary(13, 13, "arrived")],
            failure: Some(ImapError::Fetch("stream closed".into())),
        });

        let mut state = initialized(&[11, 12]);
        let report = detector(&dir).poll(&session, "INBOX", &mut state).await.unwrap();

        assert_eq!(report.batch.subjects(), vec!["arrived"]);
        assert!(matches!(
            report.warnings.as_slice(),
            [WatchError::PartialFetch { requested: 2, received: 1, .. }]
        ));
        assert_eq!(state.mailbox("INBOX").unwrap().cursor, 13);
        assert!(report.persisted);
    }

    #[tokio::test]
    async fn test_unrequested_summaries_are_ignored() {
        let dir = TempDir::new().unwrap();
        let mut session = MockMailboxSession::new();
        session
            .expect_select_mailbox()
            .returning(|_| Ok(MailboxInfo { exists: 5, ..Default::default() }));
        session.expect_search_candidates().returning(|_| Ok(vec![13]));
        // The server slips in a flag update for an old message the window no longer holds.
        session.expect_fetch_summaries().returning(|_| {
            FetchResult::complete(vec![summary(2, 2, ""), summary(13, 13, "wanted")])
        });

        let mut state = initialized(&[11, 12]);
        let report = detector(&dir).poll(&session, "INBOX", &mut state).await.unwrap();

        assert_eq!(report.batch.subjects(), vec!["wanted"]);
        assert!(report.warnings.is_empty());
        assert!(!state.mailbox("INBOX").unwrap().seen.contains(2));
    }

    #[tokio::test]
    async fn test_save_failure_is_a_warning() {
        let dir = TempDir::new().unwrap();
        // A directory where the file should be makes the rename fail.
        let blocked = dir.path().join("email_state.json");
        std::fs::create_dir(&blocked).unwrap();
        let detector = ChangeDetector::new(StateStore::new(&blocked), DetectorOptions::default());

        let mailbox = MemoryMailbox::new();
        mailbox.deliver(summary(12, 1, "old"));
        let mut state = initialized(&[12]);
        mailbox.deliver(summary(13, 2, "new"));

        let report = detector.poll(&mailbox, "INBOX", &mut state).await.unwrap();
        assert_eq!(report.batch.subjects(), vec!["new"]);
        assert!(!report.persisted);
        assert!(matches!(report.warnings.as_slice(), [WatchError::Persistence(_)]));
        assert_eq!(state.mailbox("INBOX").unwrap().cursor, 13);

        // The next cycle that changes anything saves the whole state again.
        std::fs::remove_dir(&blocked).unwrap();
        mailbox.deliver(summary(14, 3, "newer"));
        let report = detector.poll(&mailbox, "INBOX", &mut state).await.unwrap();
        assert_eq!(report.batch.subjects(), vec!["newer"]);
        assert!(report.persisted);
        assert!(report.warnings.is_empty());

        let saved = detector.store().load().await.unwrap();
        let inbox = saved.mailbox("INBOX").unwrap();
        assert!(inbox.seen.contains(13));
        assert!(inbox.seen.contains(14));
        assert_eq!(inbox.cursor, 14);
    }

    #[tokio::test]
    async fn test_reset_rebaselines_silently() {
        let dir = TempDir::new().unwrap();
        let detector = detector(&dir);
        let mailbox = MemoryMailbox::new();
        mailbox.deliver(summary(20, 1, "a"));
        mailbox.deliver(summary(21, 2, "b"));

        let mut state = initialized(&[3, 4]);
        let report = detector.reset(&mailbox, "INBOX", &mut state).await.unwrap();

        assert!(report.baselined);
        assert!(report.batch.is_empty());
        let inbox = state.mailbox("INBOX").unwrap();
        assert!(!inbox.seen.contains(3));
        assert_eq!(inbox.cursor, 21);
        assert_eq!(detector.store().load().await.unwrap(), state);
    }

    #[tokio::test]
    async fn test_empty_mailbox_is_baselined_once_mail_appears() {
        let dir = TempDir::new().unwrap();
        let detector = detector(&dir);
        let mailbox = MemoryMailbox::new();

        let mut state = StateFile::default();
        let report = detector.poll(&mailbox, "INBOX", &mut state).await.unwrap();
        assert!(report.persisted);
        assert!(state.is_checked("INBOX"));
        assert!(!state.is_initialized("INBOX"));

        // Still empty: nothing to write.
        let report = detector.poll(&mailbox, "INBOX", &mut state).await.unwrap();
        assert!(!report.baselined);
        assert!(!report.persisted);

        // Mail that becomes visible later is taken as the baseline, not reported.
        mailbox.deliver(summary(10, 1, "older"));
        mailbox.deliver(summary(11, 2, "old"));
        let report = detector.poll(&mailbox, "INBOX", &mut state).await.unwrap();
        assert!(report.batch.is_empty());
        assert!(report.baselined);
        assert_eq!(state.mailbox("INBOX").unwrap().cursor, 11);

        mailbox.deliver(summary(12, 3, "welcome"));
        let report = detector.poll(&mailbox, "INBOX", &mut state).await.unwrap();
        assert_eq!(report.batch.subjects(), vec!["welcome"]);
    }

    #[tokio::test]
    async fn test_hand_written_empty_entry_is_not_a_baseline() {
        let dir = TempDir::new().unwrap();
        let mailbox = MemoryMailbox::new();
        mailbox.deliver(summary(5, 1, "existing"));

        let mut state: StateFile = serde_json::from_str(r#"{"mailboxes": {"INBOX": {}}}"#).unwrap();
        let report = detector(&dir).poll(&mailbox, "INBOX", &mut state).await.unwrap();

        assert!(report.batch.is_empty());
        assert!(report.baselined);
        assert!(state.mailbox("INBOX").unwrap().seen.contains(5));
    }

    #[test]
    fn test_strategy_names() {
        let parsed: CandidateStrategy = serde_json::from_str("\"trailing\"").unwrap();
        assert_eq!(parsed, CandidateStrategy::Trailing);
        let parsed: CandidateStrategy = serde_json::from_str("\"since_cursor\"").unwrap();
        assert_eq!(parsed, CandidateStrategy::SinceCursor);
    }
}
