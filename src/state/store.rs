// Copyright (c) 2025 TexasFortress.AI
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs as async_fs;
use tokio::io::AsyncWriteExt;

use crate::state::StateFile;

/// Directory under the user's config dir that holds the state file.
pub const STATE_DIR_NAME: &str = "rustynotif";
pub const STATE_FILE_NAME: &str = "email_state.json";

#[derive(Error, Debug)]
pub enum StateError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("State file {path:?} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// What to do when the state file on disk cannot be parsed.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CorruptStatePolicy {
    /// Start over from an empty state and baseline again.
    #[default]
    Reset,
    /// Refuse to start.
    Abort,
}

/// Loads and saves the `StateFile` at a fixed path.
///
/// Saves go through a sibling temporary file that is synced and then renamed
/// over the real one, so the file on disk is always either the old or the new
/// document.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self { path: path.as_ref().to_path_buf() }
    }

    /// `<config dir>/rustynotif/email_state.json`, if the platform has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(STATE_DIR_NAME).join(STATE_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    /// Reads the state file. A missing file is an empty state.
    pub async fn load(&self) -> Result<StateFile, StateError> {
        debug!("Loading state from: {:?}", self.path);

        let contents = match async_fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("No state file at {:?}, starting fresh", self.path);
                return Ok(StateFile::default());
            }
            Err(e) => return Err(e.into()),
        };

        let state: StateFile = serde_json::from_str(&contents)
            .map_err(|source| StateError::Corrupt { path: self.path.clone(), source })?;

        debug!("Loaded state for {} mailbox(es)", state.mailboxes.len());
        Ok(state)
    }

    /// Like `load`, but a corrupt file is handled according to `policy`.
    pub async fn load_with_policy(&self, policy: CorruptStatePolicy) -> Result<StateFile, StateError> {
        match self.load().await {
            Err(err @ StateError::Corrupt { .. }) => match policy {
                CorruptStatePolicy::Reset => {
                    warn!("{}; starting from an empty state", err);
                    Ok(StateFile::default())
                }
                CorruptStatePolicy::Abort => {
                    error!("{}; refusing to continue", err);
                    Err(err)
                }
            },
            other => other,
        }
    }

    /// Writes the state file atomically.
    pub async fn save(&self, state: &StateFile) -> Result<(), StateError> {
        debug!("Saving state to: {:?}", self.path);

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                async_fs::create_dir_all(parent).await?;
            }
        }

        let json = serde_json::to_string_pretty(state)?;

        let temp_path = self.temp_path();
        // A leftover from an interrupted save would keep its old mode.
        match async_fs::remove_file(&temp_path).await {
            Err(e) if e.kind() != ErrorKind::NotFound => return Err(e.into()),
            _ => {}
        }

        let mut options = async_fs::OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        options.mode(0o600);

        let mut file = options.open(&temp_path).await?;
        file.write_all(json.as_bytes()).await?;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        async_fs::rename(&temp_path, &self.path).await?;

        debug!("Saved state for {} mailbox(es)", state.mailboxes.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::MailboxState;
    use tempfile::TempDir;

    fn sample_state() -> StateFile {
        let mut state = StateFile::default();
        let mut inbox = MailboxState::default();
        for uid in [10, 11, 12] {
            inbox.seen.insert(uid);
        }
        inbox.cursor = 12;
        state.mailboxes.insert("INBOX".to_string(), inbox);
        state
    }

    #[tokio::test]
    async fn test_missing_file_loads_empty() {
        let temp_dir = TempDir::new().unwrap();
        let store = StateStore::new(temp_dir.path().join("email_state.json"));

        let state = store.load().await.unwrap();
        assert!(state.mailboxes.is_empty());
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let temp_dir = TempDir::new().unwrap();
        let store = StateStore::new(temp_dir.path().join("nested").join("email_state.json"));

        store.save(&sample_state()).await.unwrap();
        assert!(store.path().exists());
        assert!(!store.temp_path().exists());

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded, sample_state());
    }

    #[tokio::test]
    async fn test_file_layout() {
        let temp_dir = TempDir::new().unwrap();
        let store = StateStore::new(temp_dir.path().join("email_state.json"));
        store.save(&sample_state()).await.unwrap();

        let raw = std::fs::read_to_string(store.path()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["mailboxes"]["INBOX"]["cursor"], 12);
        assert_eq!(value["mailboxes"]["INBOX"]["seen"], serde_json::json!([10, 11, 12]));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let store = StateStore::new(temp_dir.path().join("email_state.json"));
        store.save(&sample_state()).await.unwrap();

        let mode = std::fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_leftover_temp_file_does_not_widen_mode() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let store = StateStore::new(temp_dir.path().join("email_state.json"));
        std::fs::write(store.temp_path(), "stale").unwrap();
        std::fs::set_permissions(store.temp_path(), std::fs::Permissions::from_mode(0o644)).unwrap();

        store.save(&sample_state()).await.unwrap();

        let mode = std::fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert_eq!(store.load().await.unwrap(), sample_state());
    }

    #[tokio::test]
    async fn test_garbage_is_reported_corrupt() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("email_state.json");
        std::fs::write(&path, "{\"mailboxes\": {\"INBOX\": ").unwrap();

        let err = StateStore::new(&path).load().await.unwrap_err();
        match err {
            StateError::Corrupt { path: reported, .. } => assert_eq!(reported, path),
            other => panic!("expected Corrupt, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_corrupt_policy() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("email_state.json");
        std::fs::write(&path, "not json").unwrap();
        let store = StateStore::new(&path);

        let recovered = store.load_with_policy(CorruptStatePolicy::Reset).await.unwrap();
        assert!(recovered.mailboxes.is_empty());

        let err = store.load_with_policy(CorruptStatePolicy::Abort).await.unwrap_err();
        assert!(matches!(err, StateError::Corrupt { .. }));

        // Recovery does not touch the file until the next save.
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "not json");
    }

    #[tokio::test]
    async fn test_interrupted_save_keeps_previous_state() {
        let temp_dir = TempDir::new().unwrap();
        let store = StateStore::new(temp_dir.path().join("email_state.json"));
        store.save(&sample_state()).await.unwrap();

        // A crash between writing the temp file and renaming it leaves a
        // half-written sibling behind.
        std::fs::write(store.temp_path(), "{\"mailboxes\": {\"INB").unwrap();

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded, sample_state());

        // The next save replaces the leftover.
        let mut next = sample_state();
        if let Some(inbox) = next.mailboxes.get_mut("INBOX") {
            inbox.seen.insert(13);
            inbox.cursor = 13;
        }
        store.save(&next).await.unwrap();
        assert_eq!(store.load().await.unwrap(), next);
        assert!(!store.temp_path().exists());
    }

    #[test]
    fn test_default_path_shape() {
        if let Some(path) = StateStore::default_path() {
            assert!(path.ends_with("rustynotif/email_state.json"));
        }
    }
}
