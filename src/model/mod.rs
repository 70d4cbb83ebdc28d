// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Satchel-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Satchel and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Core data model: identities, items, slots and fixed-size pages.

#[cfg(test)]
pub(crate) mod fixtures;
pub mod ids;
pub mod item;
pub mod page;

pub use ids::{IdError, Identity, UserId};
pub use item::{Boundary, Item, MARKER_ATTRIBUTE, MARKER_KIND};
pub use page::{
    LayoutError, Page, PageLayout, PageTitle, PageTotal, Slot, DEFAULT_NEXT_SLOT,
    DEFAULT_PAGE_SLOTS, DEFAULT_PREV_SLOT,
};
