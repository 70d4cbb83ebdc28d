// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Satchel-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Satchel and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! User-facing notices raised by reconciliation.
//!
//! Text templating and localization live with the caller; the engine only reports what
//! happened through a [`Notifier`].

use std::fmt;
use std::sync::Mutex;

use crate::model::UserId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    /// Pages were removed and some of their items did not fit in the remaining ones.
    ItemsOverflowed { count: usize },
    /// Items held in the overflow buffer were placed back into pages.
    ItemsRecovered { count: usize },
    /// An item displaced from a navigation slot found no free slot nearby.
    ItemOverflowed,
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ItemsOverflowed { count } => write!(
                f,
                "You lost access to some pages; {count} item(s) were stored safely until you can access them again."
            ),
            Self::ItemsRecovered { count } => write!(
                f,
                "{count} previously stored item(s) were recovered to your vault."
            ),
            Self::ItemOverflowed => {
                f.write_str("An item was moved to safe storage to make room for page navigation.")
            }
        }
    }
}

pub trait Notifier: Send + Sync {
    fn notify(&self, user: &UserId, notice: Notice);
}

/// Default notifier: records notices in the log only.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, user: &UserId, notice: Notice) {
        tracing::info!(user = %user, ?notice, "vault notice");
    }
}

/// Keeps every notice in memory; useful for embedding callers that poll.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<(UserId, Notice)>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take(&self) -> Vec<(UserId, Notice)> {
        match self.notices.lock() {
            Ok(mut notices) => std::mem::take(&mut *notices),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, user: &UserId, notice: Notice) {
        match self.notices.lock() {
            Ok(mut notices) => notices.push((user.clone(), notice)),
            Err(poisoned) => poisoned.into_inner().push((user.clone(), notice)),
        }
    }
}
