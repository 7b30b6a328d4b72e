// Copyright (c) 2025 TexasFortress.AI
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

#![allow(dead_code)]

use std::path::PathBuf;
use std::time::Duration;

use rustynotif::prelude::*;
use rustynotif::test_helpers::{memory_session_factory, MemoryMailbox};
use tempfile::TempDir;

/// A server, a state file in a scratch directory and a scheduler wired to both.
pub struct Harness {
    pub server: MemoryMailbox,
    pub dir: TempDir,
    pub scheduler: Scheduler,
}

impl Harness {
    pub fn new(mailboxes: &[&str]) -> Self {
        Self::with_options(mailboxes, DetectorOptions::default())
    }

    pub fn with_options(mailboxes: &[&str], options: DetectorOptions) -> Self {
        let server = MemoryMailbox::new();
        for mailbox in mailboxes {
            server.create_mailbox(mailbox);
        }
        let dir = TempDir::new().expect("Failed to create temp dir");
        let store = StateStore::new(dir.path().join("email_state.json"));
        let scheduler = Scheduler::new(
            memory_session_factory(server.clone()),
            ChangeDetector::new(store, options),
            mailboxes.iter().map(|m| m.to_string()).collect(),
            Duration::from_secs(60),
        );
        Self { server, dir, scheduler }
    }

    pub fn state_path(&self) -> PathBuf {
        self.dir.path().join("email_state.json")
    }

    pub fn store(&self) -> StateStore {
        StateStore::new(self.state_path())
    }

    pub async fn poll(&self, state: &mut StateFile) -> Vec<String> {
        self.scheduler
            .run_once(state)
            .await
            .expect("poll cycle failed")
            .subjects()
            .into_iter()
            .map(str::to_string)
            .collect()
    }
}
