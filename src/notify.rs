// Copyright (c) 2025 TexasFortress.AI
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::fmt;

use log::info;

use crate::watch::NotificationBatch;

/// What the user is told about a batch of new mail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub title: String,
    pub message: String,
}

impl Alert {
    /// Renders the alert for `batch`, or `None` if it is empty.
    pub fn for_batch(batch: &NotificationBatch) -> Option<Self> {
        let subjects = batch.subjects();
        match subjects.as_slice() {
            [] => None,
            [only] => Some(Self {
                title: "New Email".to_string(),
                message: format!("You have a new email: {}", only),
            }),
            many => Some(Self {
                title: "New Emails".to_string(),
                message: format!("You have {} new emails", many.len()),
            }),
        }
    }
}

impl fmt::Display for Alert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.title, self.message)
    }
}

/// Default batch handler: logs the alert and each subject, newest first.
pub fn log_batch(batch: NotificationBatch) {
    let Some(alert) = Alert::for_batch(&batch) else {
        return;
    };
    info!("{}", alert);
    for item in batch.items() {
        info!("  [{}] {}", item.timestamp.format("%Y-%m-%d %H:%M"), item.subject);
    }
}
