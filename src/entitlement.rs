// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Satchel-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Satchel and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Page-count entitlements.
//!
//! Resolving entitlements (permission strings, ranks, purchases) is the caller's business; the
//! engine only asks how many pages a user may currently use.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::model::UserId;

pub trait EntitlementResolver: Send + Sync {
    /// Maximum page count for `user`, or `None` when the user cannot be resolved right now
    /// (offline, unknown).
    fn max_pages(&self, user: &UserId) -> Option<u32>;

    /// Page count used for reconciliation; never below one page.
    fn pages_allowed(&self, user: &UserId) -> usize {
        self.max_pages(user).unwrap_or(1).max(1) as usize
    }

    /// Whether `user` is entitled to any storage at all. Unresolvable users are.
    fn has_entitlement(&self, user: &UserId) -> bool {
        self.max_pages(user).map_or(true, |pages| pages > 0)
    }
}

/// In-memory entitlement table, adjustable at runtime.
#[derive(Debug, Default)]
pub struct StaticEntitlements {
    pages: RwLock<HashMap<UserId, u32>>,
}

impl StaticEntitlements {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, user: UserId, pages: u32) -> Self {
        self.set(user, pages);
        self
    }

    pub fn set(&self, user: UserId, pages: u32) {
        match self.pages.write() {
            Ok(mut table) => {
                table.insert(user, pages);
            }
            Err(poisoned) => {
                poisoned.into_inner().insert(user, pages);
            }
        }
    }

    pub fn remove(&self, user: &UserId) {
        match self.pages.write() {
            Ok(mut table) => {
                table.remove(user);
            }
            Err(poisoned) => {
                poisoned.into_inner().remove(user);
            }
        }
    }
}

impl EntitlementResolver for StaticEntitlements {
    fn max_pages(&self, user: &UserId) -> Option<u32> {
        match self.pages.read() {
            Ok(table) => table.get(user).copied(),
            Err(poisoned) => poisoned.into_inner().get(user).copied(),
        }
    }
}
