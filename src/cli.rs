// Copyright (c) 2025 TexasFortress.AI
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::path::PathBuf;

use clap::Parser;

use crate::config::Settings;

#[derive(Parser, Debug, Default)]
#[command(name = "rustynotif", version, about = "Reports new IMAP mail once per message")]
pub struct Cli {
    /// Path to a TOML config file
    #[arg(short, long, env = "RUSTYNOTIF_CONFIG")]
    pub config: Option<String>,

    /// IMAP server address
    #[arg(long)]
    pub server: Option<String>,

    /// IMAP server port
    #[arg(long)]
    pub port: Option<u16>,

    /// Email username/address
    #[arg(long)]
    pub user: Option<String>,

    /// Email password
    #[arg(long)]
    pub pass: Option<String>,

    /// Check interval in seconds
    #[arg(long)]
    pub interval: Option<u64>,

    /// Mailbox to watch; repeat for several
    #[arg(long = "mailbox", value_name = "MAILBOX")]
    pub mailboxes: Vec<String>,

    /// Where recognition state is kept
    #[arg(long)]
    pub state_file: Option<PathBuf>,

    /// Forget what has been seen and take a fresh baseline
    #[arg(long)]
    pub reset: bool,

    /// Poll once and exit
    #[arg(long)]
    pub once: bool,
}

impl Cli {
    /// Overrides `settings` with whatever was given on the command line.
    pub fn apply(&self, settings: &mut Settings) {
        if let Some(server) = &self.server {
            settings.imap_host = server.clone();
        }
        if let Some(port) = self.port {
            settings.imap_port = port;
        }
        if let Some(user) = &self.user {
            settings.imap_user = user.clone();
        }
        if let Some(pass) = &self.pass {
            settings.imap_pass = pass.clone();
        }
        if let Some(interval) = self.interval {
            settings.check_interval_secs = interval;
        }
        if !self.mailboxes.is_empty() {
            settings.mailboxes = self.mailboxes.clone();
        }
        if let Some(path) = &self.state_file {
            settings.state_path = Some(path.to_string_lossy().into_owned());
        }
    }
}
