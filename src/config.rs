// Copyright (c) 2025 TexasFortress.AI
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use config::{Environment, File};
use log::warn;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::imap::client::ImapCredentials;
pub use crate::state::CorruptStatePolicy;
use crate::state::StateStore;
use crate::watch::detector::{
    CandidateStrategy, DetectorOptions, DEFAULT_BASELINE_SIZE, DEFAULT_TRAILING_WINDOW,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig { level: "info".to_string() }
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct Settings {
    pub log: LogConfig,
    pub imap_host: String,
    pub imap_port: u16,
    pub imap_user: String,
    pub imap_pass: String,
    pub mailboxes: Vec<String>,
    pub check_interval_secs: u64,
    pub state_path: Option<String>,
    pub baseline_size: u32,
    pub trailing_window: u32,
    pub candidate_strategy: CandidateStrategy,
    pub on_corrupt_state: CorruptStatePolicy,
    pub login_timeout_secs: u64,
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("log", &self.log)
            .field("imap_host", &self.imap_host)
            .field("imap_port", &self.imap_port)
            .field("imap_user", &self.imap_user)
            .field("mailboxes", &self.mailboxes)
            .field("check_interval_secs", &self.check_interval_secs)
            .field("state_path", &self.state_path)
            .field("baseline_size", &self.baseline_size)
            .field("trailing_window", &self.trailing_window)
            .field("candidate_strategy", &self.candidate_strategy)
            .field("on_corrupt_state", &self.on_corrupt_state)
            .field("login_timeout_secs", &self.login_timeout_secs)
            .finish_non_exhaustive()
    }
}

impl Settings {
    /// Loads settings from defaults, then `config_path` if given, then the
    /// environment.
    pub fn new(config_path: Option<&str>) -> Result<Self, SettingsError> {
        let mut config_builder = config::Config::builder()
            // IMAP defaults
            .set_default("imap_host", "")?
            .set_default("imap_port", 993)?
            .set_default("imap_user", "")?
            .set_default("imap_pass", "")?
            .set_default("login_timeout_secs", 30)?

            // Watch defaults
            .set_default("mailboxes", vec!["INBOX"])?
            .set_default("check_interval_secs", 60)?
            .set_default("baseline_size", DEFAULT_BASELINE_SIZE)?
            .set_default("trailing_window", DEFAULT_TRAILING_WINDOW)?
            .set_default("candidate_strategy", "since_cursor")?
            .set_default("on_corrupt_state", "reset")?

            // Log defaults
            .set_default("log.level", "info")?;

        if let Some(path) = config_path {
            config_builder = config_builder.add_source(File::with_name(path));
        }

        // e.g. `RUSTYNOTIF_CHECK_INTERVAL_SECS=30` overrides `check_interval_secs`,
        // `RUSTYNOTIF_LOG__LEVEL=debug` overrides `log.level`
        config_builder = config_builder.add_source(
            Environment::with_prefix("RUSTYNOTIF")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("mailboxes")
                .ignore_empty(true),
        );

        // Direct variables for the account itself, e.g. `IMAP_HOST=...`
        let env_vars = [
            ("IMAP_HOST", "imap_host"),
            ("IMAP_PORT", "imap_port"),
            ("IMAP_USER", "imap_user"),
            ("IMAP_PASS", "imap_pass"),
        ];

        for (env_var, config_key) in &env_vars {
            if let Ok(value) = env::var(env_var) {
                if *env_var == "IMAP_PORT" {
                    if let Ok(port) = value.parse::<u16>() {
                        config_builder = config_builder.set_override(*config_key, port)?;
                    } else {
                        warn!("Invalid port value in {}: {}", env_var, value);
                    }
                } else {
                    config_builder = config_builder.set_override(*config_key, value)?;
                }
            }
        }

        Ok(config_builder.build()?.try_deserialize()?)
    }

    /// Checks that the settings describe something that can be polled.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.imap_host.trim().is_empty() {
            return Err(SettingsError::Invalid("IMAP server is not set".to_string()));
        }
        if self.imap_user.trim().is_empty() {
            return Err(SettingsError::Invalid("IMAP user is not set".to_string()));
        }
        if self.mailboxes.iter().all(|m| m.trim().is_empty()) {
            return Err(SettingsError::Invalid("no mailbox to watch".to_string()));
        }
        if self.check_interval_secs == 0 {
            return Err(SettingsError::Invalid("check interval must be at least 1 second".to_string()));
        }
        Ok(())
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    /// Mailboxes to poll, blanks and repeats dropped, in configured order.
    pub fn watched_mailboxes(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for mailbox in &self.mailboxes {
            let mailbox = mailbox.trim();
            if !mailbox.is_empty() && !seen.iter().any(|m| m == mailbox) {
                seen.push(mailbox.to_string());
            }
        }
        seen
    }

    /// The configured state file, or the per-user default.
    pub fn state_path(&self) -> Result<PathBuf, SettingsError> {
        match self.state_path.as_deref().map(str::trim) {
            Some(path) if !path.is_empty() => Ok(PathBuf::from(path)),
            _ => StateStore::default_path().ok_or_else(|| {
                SettingsError::Invalid("no config directory; set state_path".to_string())
            }),
        }
    }

    pub fn detector_options(&self) -> DetectorOptions {
        DetectorOptions {
            baseline_size: self.baseline_size,
            trailing_window: self.trailing_window,
            strategy: self.candidate_strategy,
        }
    }

    pub fn credentials(&self) -> ImapCredentials {
        ImapCredentials {
            host: self.imap_host.clone(),
            port: self.imap_port,
            username: self.imap_user.clone(),
            password: self.imap_pass.clone(),
            login_timeout: Duration::from_secs(self.login_timeout_secs.max(1)),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log: LogConfig::default(),
            imap_host: String::new(),
            imap_port: 993,
            imap_user: String::new(),
            imap_pass: String::new(),
            mailboxes: vec!["INBOX".to_string()],
            check_interval_secs: 60,
            state_path: None,
            baseline_size: DEFAULT_BASELINE_SIZE,
            trailing_window: DEFAULT_TRAILING_WINDOW,
            candidate_strategy: CandidateStrategy::default(),
            on_corrupt_state: CorruptStatePolicy::default(),
            login_timeout_secs: 30,
        }
    }
}

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Failed to load or parse configuration: {0}")]
    LoadError(#[from] config::ConfigError),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
