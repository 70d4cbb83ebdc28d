// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Satchel-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Satchel and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

#![allow(dead_code)]

// Shared deterministic benchmark fixtures (no RNG).

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use satchel::model::{Identity, Item, PageLayout, UserId};
use satchel::store::StoredPages;

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

pub struct TempDir {
    path: PathBuf,
}

impl TempDir {
    pub fn new(prefix: &str) -> Self {
        let pid = std::process::id();
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let counter = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);

        let mut path = std::env::temp_dir();
        path.push(format!("satchel_bench_{prefix}_{pid}_{nanos}_{counter}"));
        std::fs::create_dir_all(&path).expect("create temp dir");

        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.path);
    }
}

pub fn identity(index: usize) -> Identity {
    let id = UserId::new(format!("bench-user-{index}")).expect("user id");
    Identity::new(id, format!("Bench{index}")).expect("identity")
}

/// Items with a few attributes so that JSON encoding does real work.
pub fn item(serial: usize) -> Item {
    let kind = match serial % 4 {
        0 => "stone",
        1 => "iron_ingot",
        2 => "enchanted_book",
        _ => "diamond_sword",
    };
    Item::new(kind, (serial % 64) as u32 + 1)
        .with_attribute("serial", serial.to_string())
        .with_attribute("lore", format!("crafted in batch {}", serial / 16))
}

pub fn items(count: usize) -> Vec<Item> {
    (0..count).map(item).collect()
}

/// `page_count` pages whose storage slots are filled up to `fill` (0.0..=1.0).
pub fn stored_pages(layout: &PageLayout, page_count: usize, fill: f64) -> StoredPages {
    let storage = (0..layout.size())
        .filter(|slot| layout.boundary_at(*slot).is_none())
        .collect::<Vec<_>>();
    let per_page = ((storage.len() as f64) * fill.clamp(0.0, 1.0)).round() as usize;

    let mut stored = StoredPages::with_page_count(page_count);
    let mut serial = 0;
    for page in 0..page_count {
        for slot in storage.iter().take(per_page) {
            stored.insert(page, *slot, item(serial));
            serial += 1;
        }
    }
    stored
}
