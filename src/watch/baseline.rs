// Copyright (c) 2025 TexasFortress.AI
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use log::{debug, info, warn};

use crate::error::WatchError;
use crate::imap::session::MailboxSession;
use crate::imap::types::{MailboxInfo, SearchCriterion, Uid};
use crate::state::{MailboxState, SEEN_WINDOW_CAPACITY};

/// Seeds recognition state for a mailbox seen for the first time.
///
/// The most recent `depth` messages are recorded as already seen. Nothing
/// found here is ever reported.
#[derive(Debug, Clone, Copy)]
pub struct BaselineInitializer {
    depth: u32,
}

impl BaselineInitializer {
    pub fn new(depth: u32) -> Self {
        Self { depth: depth.clamp(1, SEEN_WINDOW_CAPACITY as u32) }
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Builds the initial state for `mailbox`, already selected with `info`.
    ///
    /// Returns `Ok(None)` when the server listed messages but handed back no
    /// summaries; the caller should leave the mailbox uninitialized so the
    /// next poll tries again.
    pub async fn initialize(
        &self,
        session: &dyn MailboxSession,
        mailbox: &str,
        info: &MailboxInfo,
    ) -> Result<Option<MailboxState>, WatchError> {
        if info.exists == 0 {
            info!("Mailbox {} is empty, recording it as checked", mailbox);
            return Ok(Some(MailboxState::default()));
        }

        let uids = session.search_candidates(SearchCriterion::Trailing(self.depth)).await?;
        if uids.is_empty() {
            warn!("Mailbox {} reports {} messages but none were listed", mailbox, info.exists);
            return Ok(None);
        }

        let fetched = session.fetch_summaries(&uids).await;
        if let Some(err) = fetched.failure {
            warn!("Baseline fetch for {} failed: {}", mailbox, err);
            return Err(err.into());
        }
        if fetched.summaries.is_empty() {
            warn!("Baseline fetch for {} returned no summaries, will retry", mailbox);
            return Ok(None);
        }

        let mut seen: Vec<Uid> = fetched.summaries.iter().map(|s| s.uid).collect();
        seen.sort_unstable();
        seen.dedup();

        let mut state = MailboxState::default();
        for uid in seen {
            state.absorb(uid);
        }
        debug!("Baseline UIDs for {}: {:?}", mailbox, state.seen.iter().collect::<Vec<_>>());
        info!(
            "Baseline for {}: {} message(s) recorded, cursor at {}",
            mailbox,
            state.seen.len(),
            state.cursor
        );
        Ok(Some(state))
    }
}
