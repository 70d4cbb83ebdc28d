// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Satchel-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Satchel and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use satchel::entitlement::StaticEntitlements;
use satchel::model::{
    Boundary, Identity, Item, UserId, DEFAULT_NEXT_SLOT, DEFAULT_PAGE_SLOTS, DEFAULT_PREV_SLOT,
};
use satchel::notify::{Notice, RecordingNotifier};
use satchel::pages::PageView;
use satchel::session::Rejection;
use satchel::store::{StoredPages, VaultFolder};
use satchel::{OpenError, OpenRequest, Vault, VaultConfig};

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

struct TempDir {
    path: PathBuf,
}

impl TempDir {
    fn new(prefix: &str) -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let counter = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        let pid = std::process::id();
        let mut path = std::env::temp_dir();
        path.push(format!("satchel_it_{prefix}_{pid}_{nanos}_{counter}"));
        std::fs::create_dir_all(&path).expect("create temp dir");
        Self { path }
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.path);
    }
}

struct Harness {
    _tmp: TempDir,
    folder: VaultFolder,
    entitlements: Arc<StaticEntitlements>,
    notices: Arc<RecordingNotifier>,
    vault: Vault,
}

impl Harness {
    fn start(prefix: &str) -> Self {
        let tmp = TempDir::new(prefix);
        let config = VaultConfig::new(tmp.path().join("data"));
        let folder = config.folder();
        let entitlements = Arc::new(StaticEntitlements::new());
        let notices = Arc::new(RecordingNotifier::new());
        let vault = Vault::start(config, entitlements.clone(), notices.clone());
        Self {
            _tmp: tmp,
            folder,
            entitlements,
            notices,
            vault,
        }
    }

    async fn open(&self, request: OpenRequest) -> PageView {
        self.vault.open(request).await.expect("open")
    }
}

fn user(id: &str) -> UserId {
    UserId::new(id).expect("user id")
}

fn player(id: &str, name: &str) -> Identity {
    Identity::new(user(id), name).expect("identity")
}

fn gem(serial: usize) -> Item {
    Item::new("gem", 1).with_attribute("serial", serial.to_string())
}

fn is_boundary(slot: usize) -> bool {
    slot == DEFAULT_PREV_SLOT || slot == DEFAULT_NEXT_SLOT
}

#[tokio::test]
async fn lost_entitlement_moves_stragglers_to_overflow() {
    let h = Harness::start("scenario_a");
    let steve = player("u1", "Steve");

    // Page 1 is full apart from its next marker; pages 2 and 3 hold one item each.
    let mut stored = StoredPages::with_page_count(3);
    for slot in (0..DEFAULT_PAGE_SLOTS).filter(|slot| *slot != DEFAULT_NEXT_SLOT) {
        stored.insert(0, slot, gem(slot));
    }
    stored.insert(1, 0, gem(100));
    stored.insert(2, 0, gem(101));
    h.folder.save(&steve, &stored).expect("seed");
    h.entitlements.set(user("u1"), 1);

    let view = h.open(OpenRequest::owner(steve.clone())).await;
    assert_eq!(view.page_count, 1);
    assert_eq!(
        view.payloads[DEFAULT_PREV_SLOT],
        Some(gem(DEFAULT_PREV_SLOT))
    );
    assert_eq!(view.payloads[DEFAULT_NEXT_SLOT], None);
    assert_eq!(
        h.notices.take(),
        vec![(user("u1"), Notice::ItemsOverflowed { count: 2 })]
    );

    h.vault.flush().await.expect("flush");
    let parked = h.folder.overflow().peek(steve.id()).expect("peek");
    assert_eq!(parked, vec![gem(100), gem(101)]);
    assert_eq!(h.folder.load(&steve).page_count(), 1);
}

#[tokio::test]
async fn regained_entitlement_restores_overflow_into_new_pages() {
    let h = Harness::start("scenario_b");
    let steve = player("u1", "Steve");

    let mut stored = StoredPages::with_page_count(1);
    for slot in (0..DEFAULT_PAGE_SLOTS).filter(|slot| !is_boundary(*slot)) {
        stored.insert(0, slot, gem(slot));
    }
    h.folder.save(&steve, &stored).expect("seed pages");
    let overflow = h.folder.overflow();
    let seed = [gem(100), gem(101)];
    overflow.save(steve.id(), &seed).expect("seed overflow");
    h.entitlements.set(user("u1"), 3);

    let view = h.open(OpenRequest::owner(steve.clone())).await;
    assert_eq!(view.page_count, 3);
    assert_eq!(
        view.payloads[DEFAULT_NEXT_SLOT],
        Some(Item::marker(Boundary::Next))
    );
    assert_eq!(
        h.notices.take(),
        vec![(user("u1"), Notice::ItemsRecovered { count: 2 })]
    );

    let page_set = h.vault.page_set(steve.id()).await.expect("resident");
    assert_eq!(page_set.page(1).expect("page 2").item_count(), 2);
    let last = page_set.view(2).expect("page 3");
    assert_eq!(
        last.payloads[DEFAULT_PREV_SLOT],
        Some(Item::marker(Boundary::Prev))
    );
    assert_eq!(last.payloads[DEFAULT_NEXT_SLOT], None);

    h.vault.flush().await.expect("flush");
    assert!(!h.folder.overflow().path(steve.id()).exists());
}

#[tokio::test]
async fn corrupt_vault_file_opens_as_empty_pages() {
    let h = Harness::start("scenario_c");
    let steve = player("u1", "Steve");
    std::fs::create_dir_all(h.folder.root()).expect("data dir");
    std::fs::write(h.folder.vault_path(&steve), b"\x1f\x8b not really gzip").expect("corrupt");
    h.entitlements.set(user("u1"), 2);

    let view = h.open(OpenRequest::owner(steve.clone())).await;
    assert_eq!(view.page_count, 2);
    let page_set = h.vault.page_set(steve.id()).await.expect("resident");
    assert_eq!(page_set.item_count(), 0);
}

#[tokio::test]
async fn admin_waits_for_owner_to_close() {
    let h = Harness::start("scenario_d");
    let steve = player("u1", "Steve");
    h.entitlements.set(user("u1"), 2);

    h.open(OpenRequest::owner(steve.clone())).await;
    let request = OpenRequest::admin(user("mod"), steve.clone());
    let rejected = h.vault.open(request).await;
    assert_eq!(rejected, Err(OpenError::Rejected(Rejection::TargetInUse)));

    h.vault.close(steve.id(), None).await.expect("owner close");
    let view = h.open(OpenRequest::admin(user("mod"), steve.clone())).await;
    assert_eq!(view.page_count, 2);

    let owner = h.vault.open(OpenRequest::owner(steve)).await;
    assert_eq!(owner, Err(OpenError::Rejected(Rejection::TargetInUse)));
}

#[tokio::test]
async fn entitlement_swings_conserve_items() {
    let h = Harness::start("conservation");
    let steve = player("u1", "Steve");
    h.entitlements.set(user("u1"), 4);

    let first = h.open(OpenRequest::owner(steve.clone())).await;
    let mut payloads = first.payloads.clone();
    let storage = (0..DEFAULT_PAGE_SLOTS)
        .filter(|slot| !is_boundary(*slot))
        .collect::<Vec<_>>();
    for (serial, slot) in storage.iter().enumerate() {
        payloads[*slot] = Some(gem(serial));
    }
    let slot = DEFAULT_NEXT_SLOT;
    let next = h.vault.activate(steve.id(), slot, Some(payloads)).await;
    let second = next.expect("next");
    let mut payloads = second.payloads.clone();
    for serial in 0..10 {
        payloads[storage[serial]] = Some(gem(1000 + serial));
    }
    let captured = h.vault.capture(steve.id(), payloads).await;
    assert_eq!(captured.expect("capture").index, 1);
    let total = storage.len() + 10;

    for pages in [1, 3, 1, 2, 4] {
        h.entitlements.set(user("u1"), pages);
        h.vault.reload().await.expect("reload");
        h.vault.flush().await.expect("flush");

        let page_set = h.vault.page_set(steve.id()).await.expect("resident");
        assert_eq!(page_set.len(), pages as usize);
        let parked = h.folder.overflow().peek(steve.id()).expect("peek").len();
        assert_eq!(
            page_set.item_count() + parked,
            total,
            "after reload to {pages} page(s)"
        );
    }

    h.vault.close(steve.id(), None).await.expect("close");
    let report = h.vault.shutdown().await.expect("shutdown");
    assert!(report.backup.is_some_and(|backup| backup.is_clean()));
    let stored = h.folder.load(&steve).item_count();
    let parked = h.folder.overflow().peek(steve.id()).expect("peek").len();
    assert_eq!(stored + parked, total);
}
