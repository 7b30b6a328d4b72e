// Copyright (c) 2025 TexasFortress.AI
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::error::WatchError;
use crate::imap::session::SessionFactory;
use crate::state::StateFile;
use crate::watch::batch::NotificationBatch;
use crate::watch::detector::{ChangeDetector, CycleReport};

/// Drives the change detector over every watched mailbox on a fixed period.
///
/// Exactly one cycle runs at a time. A cycle that overruns the period causes
/// the missed ticks to be dropped rather than replayed.
pub struct Scheduler {
    factory: SessionFactory,
    detector: ChangeDetector,
    mailboxes: Vec<String>,
    period: Duration,
}

impl Scheduler {
    pub fn new(
        factory: SessionFactory,
        detector: ChangeDetector,
        mailboxes: Vec<String>,
        period: Duration,
    ) -> Self {
        Self { factory, detector, mailboxes, period }
    }

    pub fn detector(&self) -> &ChangeDetector {
        &self.detector
    }

    /// Runs a single cycle: one session, every mailbox, then logout.
    ///
    /// Mailboxes that fail are logged and skipped. The merged batch of the
    /// others is still returned; an error comes back only when nothing could
    /// be polled at all.
    pub async fn run_once(&self, state: &mut StateFile) -> Result<NotificationBatch, WatchError> {
        let session = (self.factory)().await.map_err(WatchError::from)?;

        let mut merged = NotificationBatch::default();
        let mut first_error = None;
        let mut polled = 0usize;

        for mailbox in &self.mailboxes {
            match self.detector.poll(session.as_ref(), mailbox, state).await {
                Ok(report) => {
                    polled += 1;
                    log_report(&report);
                    merged.merge(report.batch);
                }
                Err(e) => {
                    warn!("Poll of {} failed: {}", mailbox, e);
                    first_error.get_or_insert(e);
                }
            }
        }

        if let Err(e) = session.logout().await {
            debug!("Logout failed: {}", e);
        }

        match first_error {
            Some(e) if polled == 0 => Err(e),
            _ => Ok(merged),
        }
    }

    /// Forgets every watched mailbox and baselines each one again over a
    /// single session. Stops at the first mailbox that cannot be reset.
    pub async fn reset_all(&self, state: &mut StateFile) -> Result<Vec<CycleReport>, WatchError> {
        let session = (self.factory)().await.map_err(WatchError::from)?;

        let mut reports = Vec::with_capacity(self.mailboxes.len());
        let mut outcome = Ok(());
        for mailbox in &self.mailboxes {
            match self.detector.reset(session.as_ref(), mailbox, state).await {
                Ok(report) => {
                    log_report(&report);
                    if !report.baselined {
                        warn!("Baseline for {} could not be taken yet; it will be retried", mailbox);
                    }
                    reports.push(report);
                }
                Err(e) => {
                    error!("Reset of {} failed: {}", mailbox, e);
                    outcome = Err(e);
                    break;
                }
            }
        }

        if let Err(e) = session.logout().await {
            debug!("Logout failed: {}", e);
        }
        outcome.map(|()| reports)
    }

    /// Polls until `stop` is cancelled, handing each non-empty batch to
    /// `on_batch`. The first cycle starts immediately.
    ///
    /// Cancellation is checked between cycles; a cycle already in progress
    /// runs to completion. Returns the state as of the last cycle.
    pub async fn run<F>(&self, mut state: StateFile, mut on_batch: F, stop: CancellationToken) -> StateFile
    where
        F: FnMut(NotificationBatch) + Send,
    {
        info!(
            "Watching {:?} every {:?}",
            self.mailboxes, self.period
        );
        let mut ticker = time::interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = stop.cancelled() => break,
                _ = ticker.tick() => {}
            }

            debug!("Starting poll cycle");
            match self.run_once(&mut state).await {
                Ok(batch) if !batch.is_empty() => on_batch(batch),
                Ok(_) => debug!("Poll cycle found nothing new"),
                Err(e) => error!("Poll cycle failed: {}", e),
            }
        }

        info!("Polling stopped");
        state
    }

    /// Runs the loop on its own task.
    pub fn start<F>(
        self: Arc<Self>,
        state: StateFile,
        on_batch: F,
        stop: CancellationToken,
    ) -> tokio::task::JoinHandle<StateFile>
    where
        F: FnMut(NotificationBatch) + Send + 'static,
    {
        tokio::spawn(async move { self.run(state, on_batch, stop).await })
    }
}

fn log_report(report: &CycleReport) {
    for warning in &report.warnings {
        warn!("{}: {}", report.mailbox, warning);
    }
    if report.baselined {
        info!("Baseline established for {}", report.mailbox);
    }
}
