// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Satchel-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Satchel and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use satchel::model::PageLayout;
use satchel::store::{decode_overflow, encode_overflow, VaultFolder};

mod fixtures;
mod profiler;

use fixtures::TempDir;

// Benchmark identity (keep stable):
// - Group names: `store.save`, `store.load`, `store.overflow`, `store.backup`
// - Case IDs must remain stable so results stay comparable over time.
fn benches_save_load(c: &mut Criterion) {
    let layout = PageLayout::default();
    let owner = fixtures::identity(0);

    let mut group = c.benchmark_group("store.save");
    for (case, pages, fill) in [("pages_1_half", 1, 0.5), ("pages_10_full", 10, 1.0)] {
        let stored = fixtures::stored_pages(&layout, pages, fill);
        let owner = owner.clone();
        group.bench_function(case, move |b| {
            b.iter_batched_ref(
                || TempDir::new("store_save"),
                |tmp| {
                    let folder = VaultFolder::new(tmp.path());
                    folder.save(&owner, black_box(&stored)).expect("save");
                    let metadata = std::fs::metadata(folder.vault_path(&owner)).expect("metadata");
                    black_box(metadata.len())
                },
                BatchSize::SmallInput,
            )
        });
    }
    group.finish();

    let mut group = c.benchmark_group("store.load");
    let tmp = TempDir::new("store_load");
    let folder = VaultFolder::new(tmp.path());
    let seed = fixtures::stored_pages(&layout, 10, 1.0);
    folder.save(&owner, &seed).expect("seed");
    group.bench_function("pages_10_full", |b| {
        b.iter(|| black_box(folder.load(black_box(&owner)).item_count()))
    });
    group.finish();
}

fn benches_overflow(c: &mut Criterion) {
    let mut group = c.benchmark_group("store.overflow");
    let items = fixtures::items(500);
    let compressed = {
        let tmp = TempDir::new("store_overflow_seed");
        let folder = VaultFolder::new(tmp.path());
        let owner = fixtures::identity(0);
        let overflow = folder.overflow();
        overflow.save(owner.id(), &items).expect("seed overflow");
        std::fs::read(overflow.path(owner.id())).expect("read overflow")
    };

    group.bench_function("encode_500", |b| {
        b.iter(|| black_box(encode_overflow(black_box(&items)).expect("encode").len()))
    });
    group.bench_function("decode_500", |b| {
        b.iter(|| {
            let decoded = decode_overflow(black_box(&compressed)).expect("decode");
            black_box(decoded.len())
        })
    });
    group.finish();
}

fn benches_backup(c: &mut Criterion) {
    let layout = PageLayout::default();
    let mut group = c.benchmark_group("store.backup");
    let tmp = TempDir::new("store_backup");
    let folder = VaultFolder::new(tmp.path().join("data"));
    for index in 0..32 {
        let owner = fixtures::identity(index);
        let seed = fixtures::stored_pages(&layout, 3, 0.75);
        folder.save(&owner, &seed).expect("seed");
        let items = fixtures::items(20);
        let overflow = folder.overflow();
        overflow.save(owner.id(), &items).expect("seed overflow");
    }
    let backup_dir = tmp.path().join("backup");

    group.bench_function("users_32", |b| {
        b.iter(|| {
            let report = folder.backup(black_box(&backup_dir)).expect("backup");
            black_box(report.copied)
        })
    });
    group.finish();
}

criterion_group! {
    name = benches;
    config = profiler::criterion();
    targets = benches_save_load, benches_overflow, benches_backup
}
criterion_main!(benches);
