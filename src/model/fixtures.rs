// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Satchel-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Satchel and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use super::ids::{Identity, UserId};
use super::item::Item;
use super::page::PageLayout;

pub(crate) fn uid(value: &str) -> UserId {
    UserId::new(value).expect("user id")
}

pub(crate) fn identity(id: &str, name: &str) -> Identity {
    Identity::new(uid(id), name).expect("identity")
}

/// A distinct item; the serial keeps structurally equal items apart.
pub(crate) fn stone(serial: usize) -> Item {
    Item::new("stone", 1).with_attribute("serial", serial.to_string())
}

pub(crate) fn stones(range: std::ops::Range<usize>) -> Vec<Item> {
    range.map(stone).collect()
}

/// Nine slots with boundaries at 6 and 8, leaving seven storage slots per page.
pub(crate) fn small_layout() -> PageLayout {
    PageLayout::new(9, 6, 8).expect("small layout")
}
