// Copyright (c) 2025 TexasFortress.AI
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Watches one or more IMAP mailboxes and logs an alert for every new message.
//!
//! Usage:
//!   rustynotif --server imap.example.com --user me@example.com --pass ...
//!   rustynotif --config rustynotif.toml --mailbox INBOX --mailbox Work
//!   rustynotif --once                  # single poll, then exit
//!   rustynotif --reset                 # forget seen mail, take a fresh baseline

use std::sync::Arc;

use clap::Parser;
use env_logger::Env;
use log::info;
use tokio_util::sync::CancellationToken;

use rustynotif::cli::Cli;
use rustynotif::config::Settings;
use rustynotif::error::WatchError;
use rustynotif::imap::create_session_factory;
use rustynotif::notify;
use rustynotif::state::StateStore;
use rustynotif::watch::{ChangeDetector, Scheduler};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let mut settings = Settings::new(cli.config.as_deref())?;
    cli.apply(&mut settings);

    env_logger::Builder::from_env(Env::default().default_filter_or(settings.log.level.as_str())).init();

    settings.validate()?;
    info!("Starting rustynotif for {}@{}:{}", settings.imap_user, settings.imap_host, settings.imap_port);

    let store = StateStore::new(settings.state_path()?);
    let mut state = store
        .load_with_policy(settings.on_corrupt_state)
        .await
        .map_err(WatchError::from)?;

    let factory = create_session_factory(settings.credentials())?;
    let detector = ChangeDetector::new(store, settings.detector_options());
    let mailboxes = settings.watched_mailboxes();

    let scheduler = Arc::new(Scheduler::new(factory, detector, mailboxes, settings.check_interval()));

    if cli.reset {
        scheduler.reset_all(&mut state).await?;
    }

    if cli.once {
        let batch = scheduler.run_once(&mut state).await?;
        if batch.is_empty() {
            info!("No new email");
        }
        notify::log_batch(batch);
        return Ok(());
    }

    let stop = CancellationToken::new();
    let handle = scheduler.clone().start(state, notify::log_batch, stop.clone());

    tokio::signal::ctrl_c().await?;
    info!("Interrupt received, finishing the current check");
    stop.cancel();

    let state = handle.await?;
    info!("Stopped with state for {} mailbox(es)", state.mailboxes.len());
    Ok(())
}
