// Copyright (c) 2025 TexasFortress.AI
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The polling engine: baseline, per-cycle change detection and the
//! single-flight scheduler that drives them.

pub mod baseline;
pub mod batch;
pub mod detector;
pub mod scheduler;

pub use baseline::BaselineInitializer;
pub use batch::NotificationBatch;
pub use detector::{CandidateStrategy, ChangeDetector, CycleReport, DetectorOptions};
pub use scheduler::Scheduler;
