// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Satchel-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Satchel and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use rstest::rstest;

use super::{reconcile, CaptureError, OverflowAction, PageSet, Reconciliation};
use crate::config::DEFAULT_CASCADE_PAGE_LIMIT;
use crate::model::fixtures::{small_layout, stone, stones};
use crate::model::{Boundary, Item, PageTotal, Slot};
use crate::notify::Notice;
use crate::session::ViewerRole;
use crate::store::StoredPages;

/// Storage slots of the small layout, in placement order.
const STORAGE: [usize; 7] = [0, 1, 2, 3, 4, 5, 7];
const PREV: usize = 6;
const NEXT: usize = 8;

fn stored(page_count: usize, items: &[(usize, usize, usize)]) -> StoredPages {
    let mut stored = StoredPages::with_page_count(page_count);
    for &(page, slot, serial) in items {
        stored.insert(page, slot, stone(serial));
    }
    stored
}

fn fill(stored: &mut StoredPages, page: usize, first_serial: usize) {
    for (offset, slot) in STORAGE.iter().enumerate() {
        stored.insert(page, *slot, stone(first_serial + offset));
    }
}

fn page_set(stored: StoredPages) -> PageSet {
    PageSet::from_stored(small_layout(), stored)
}

fn run(
    set: &mut PageSet,
    allowed: usize,
    role: ViewerRole,
    existing: Option<Vec<Item>>,
) -> Reconciliation {
    reconcile(set, allowed, role, existing, DEFAULT_CASCADE_PAGE_LIMIT)
}

fn assert_markers(set: &PageSet) {
    let last = set.len() - 1;
    for (index, page) in set.pages().iter().enumerate() {
        for (slot_index, slot) in page.slots().iter().enumerate() {
            let expected = match slot_index {
                PREV if index > 0 => Some(Boundary::Prev),
                NEXT if index < last => Some(Boundary::Next),
                _ => None,
            };
            match expected {
                Some(boundary) => assert_eq!(
                    slot,
                    &Slot::Marker(boundary),
                    "page {index} slot {slot_index}"
                ),
                None => assert!(!slot.is_marker(), "page {index} slot {slot_index}"),
            }
        }
    }
}

#[test]
fn constant_entitlement_places_markers_only_where_navigation_exists() {
    let mut set = page_set(stored(3, &[(0, 0, 0), (1, 3, 1)]));
    let result = run(&mut set, 3, ViewerRole::Owner, None);

    assert_eq!(result.overflow, OverflowAction::Untouched);
    assert!(result.notices.is_empty());
    assert_eq!(set.len(), 3);
    assert_eq!(set.entitled(), 3);
    assert_markers(&set);
    assert_eq!(set.page(1).unwrap().title().to_string(), "Page 2 of 3");
}

#[test]
fn single_page_has_no_markers_and_keeps_items_on_unused_boundaries() {
    let mut set = page_set(stored(1, &[(0, NEXT, 1), (0, PREV, 2)]));
    let result = run(&mut set, 1, ViewerRole::Owner, None);

    assert_eq!(result.cascaded, 0);
    assert_eq!(set.page(0).unwrap().slot(NEXT), Some(&Slot::Item(stone(1))));
    assert_eq!(set.page(0).unwrap().slot(PREV), Some(&Slot::Item(stone(2))));
}

#[test]
fn shrink_moves_items_into_free_slots_then_overflow() {
    let mut input = stored(3, &[(1, 0, 10), (1, 1, 11), (2, 0, 20)]);
    for slot in 0..6 {
        input.insert(0, slot, stone(slot));
    }
    let mut set = page_set(input);

    let result = run(&mut set, 1, ViewerRole::Owner, Some(vec![stone(99)]));

    assert_eq!(set.len(), 1);
    assert_eq!(set.page(0).unwrap().slot(7), Some(&Slot::Item(stone(10))));
    assert_eq!(
        result.overflow,
        OverflowAction::Replace(vec![stone(99), stone(11), stone(20)])
    );
    assert_eq!(result.notices, vec![Notice::ItemsOverflowed { count: 2 }]);
    assert_eq!(result.moved_to_overflow, 2);
}

#[test]
fn shrink_without_new_overflow_keeps_existing_buffer() {
    let mut set = page_set(stored(2, &[(1, 0, 1)]));
    let result = run(&mut set, 1, ViewerRole::Owner, Some(stones(50..52)));

    assert_eq!(set.item_count(), 1);
    assert_eq!(result.overflow, OverflowAction::Replace(stones(50..52)));
    assert!(result.notices.is_empty());
}

#[test]
fn shrink_with_nothing_anywhere_deletes_the_buffer() {
    let mut set = page_set(stored(3, &[]));
    let result = run(&mut set, 2, ViewerRole::Owner, Some(Vec::new()));
    assert_eq!(result.overflow, OverflowAction::Replace(Vec::new()));
}

#[test]
fn grow_recovers_overflow_into_new_pages() {
    let mut input = StoredPages::with_page_count(1);
    fill(&mut input, 0, 0);
    let mut set = page_set(input);

    let result = run(&mut set, 2, ViewerRole::Owner, Some(stones(100..110)));

    assert_eq!(set.len(), 2);
    assert_eq!(result.recovered, 7);
    assert_eq!(result.notices, vec![Notice::ItemsRecovered { count: 7 }]);
    assert_eq!(result.overflow, OverflowAction::Replace(stones(107..110)));
    assert_eq!(set.page(1).unwrap().item_count(), 7);
    assert_markers(&set);
}

#[test]
fn grow_that_drains_the_buffer_deletes_it() {
    let mut set = page_set(stored(0, &[]));
    let result = run(&mut set, 2, ViewerRole::Owner, Some(stones(0..3)));

    assert_eq!(set.len(), 2);
    assert_eq!(set.item_count(), 3);
    assert_eq!(result.overflow, OverflowAction::Replace(Vec::new()));
}

#[test]
fn item_on_required_boundary_cascades_to_following_page() {
    let mut set = page_set(stored(2, &[(0, NEXT, 1)]));
    let result = run(&mut set, 2, ViewerRole::Owner, None);

    assert_eq!(result.cascaded, 1);
    assert_eq!(set.page(1).unwrap().slot(0), Some(&Slot::Item(stone(1))));
    assert_eq!(result.overflow, OverflowAction::Untouched);
    assert_markers(&set);
}

#[test]
fn cascade_without_room_appends_to_overflow() {
    let mut input = stored(2, &[(0, NEXT, 1)]);
    fill(&mut input, 1, 10);
    let mut set = page_set(input);

    let result = run(&mut set, 2, ViewerRole::Owner, None);

    assert_eq!(result.overflow, OverflowAction::Append(vec![stone(1)]));
    assert_eq!(result.notices, vec![Notice::ItemOverflowed]);
    assert_markers(&set);
}

#[rstest]
#[case(1, OverflowAction::Append(vec![stone(1)]))]
#[case(DEFAULT_CASCADE_PAGE_LIMIT, OverflowAction::Untouched)]
fn cascade_search_is_bounded(#[case] limit: usize, #[case] expected: OverflowAction) {
    let mut input = stored(3, &[(0, NEXT, 1)]);
    fill(&mut input, 1, 10);
    let mut set = page_set(input);

    let result = reconcile(&mut set, 3, ViewerRole::Owner, None, limit);
    assert_eq!(result.overflow, expected);
}

#[test]
fn admin_sees_overflow_on_extra_pages() {
    let mut set = page_set(stored(1, &[]));
    let result = run(&mut set, 1, ViewerRole::Admin, Some(stones(0..10)));

    assert_eq!(set.len(), 3);
    assert_eq!(set.entitled(), 1);
    assert_eq!(set.overflow_page_count(), 2);
    assert_eq!(set.page(1).unwrap().item_count(), 7);
    assert_eq!(set.page(2).unwrap().item_count(), 3);
    assert_eq!(set.page(2).unwrap().title().total(), PageTotal::Overflow);
    assert_eq!(set.page(0).unwrap().title().total(), PageTotal::Pages(1));
    assert_eq!(result.overflow, OverflowAction::Replace(Vec::new()));
    assert_markers(&set);
}

#[test]
fn owner_reconciliation_is_idempotent() {
    let mut input = stored(3, &[(0, NEXT, 1), (2, PREV, 2), (1, 4, 3)]);
    fill(&mut input, 1, 10);
    let mut set = page_set(input);
    run(&mut set, 3, ViewerRole::Owner, None);
    let first = set.clone();

    let second = run(&mut set, 3, ViewerRole::Owner, None);
    assert_eq!(set, first);
    assert_eq!(second.overflow, OverflowAction::Untouched);
    assert!(second.notices.is_empty());
}

#[test]
fn admin_reconciliation_is_idempotent() {
    let mut set = page_set(stored(1, &[(0, 0, 0)]));
    run(&mut set, 1, ViewerRole::Admin, Some(stones(10..20)));
    let first = set.clone();

    let second = run(&mut set, 1, ViewerRole::Admin, Some(Vec::new()));
    assert_eq!(set, first);
    assert_eq!(second.overflow, OverflowAction::Replace(Vec::new()));
}

#[test]
fn re_reconciling_an_admin_set_for_an_owner_reabsorbs_overflow_pages() {
    let mut set = page_set(stored(1, &[]));
    run(&mut set, 1, ViewerRole::Admin, Some(stones(0..4)));
    assert_eq!(set.len(), 2);

    let result = run(&mut set, 1, ViewerRole::Owner, Some(Vec::new()));
    assert_eq!(set.len(), 1);
    assert_eq!(result.overflow, OverflowAction::Replace(stones(0..4)));
}

#[rstest]
#[case(3, 1, Some(5))]
#[case(1, 3, Some(30))]
#[case(2, 2, None)]
#[case(4, 2, None)]
#[case(0, 1, Some(0))]
fn reconciliation_conserves_items(
    #[case] stored_pages: usize,
    #[case] allowed: usize,
    #[case] overflow: Option<usize>,
    #[values(ViewerRole::Owner, ViewerRole::Admin)] role: ViewerRole,
) {
    let mut input = StoredPages::with_page_count(stored_pages);
    for page in 0..stored_pages {
        fill(&mut input, page, page * 100);
        input.insert(page, PREV, stone(page * 100 + 50));
        input.insert(page, NEXT, stone(page * 100 + 60));
    }
    let before = input.item_count() + overflow.unwrap_or(0);
    let mut set = page_set(input);

    let existing = overflow.map(|count| stones(1000..1000 + count));
    let result = run(&mut set, allowed, role, existing);

    assert_eq!(set.item_count() + result.overflow.items().len(), before);
    assert_markers(&set);
}

#[test]
fn stored_items_outside_the_layout_are_placed_or_overflowed() {
    let mut set = page_set(stored(1, &[(0, 40, 1)]));
    assert_eq!(set.item_count(), 1);

    run(&mut set, 1, ViewerRole::Owner, None);
    assert_eq!(set.page(0).unwrap().slot(0), Some(&Slot::Item(stone(1))));
}

#[test]
fn to_stored_reindexes_the_requested_range() {
    let mut set = page_set(stored(3, &[(2, 1, 7)]));
    run(&mut set, 3, ViewerRole::Owner, None);

    let tail = set.to_stored(2..3);
    assert_eq!(tail.page_count(), 1);
    assert_eq!(tail.page(0).unwrap().get(&1), Some(&stone(7)));
    assert_eq!(set.to_stored(0..3).item_count(), 1);
}

#[test]
fn capture_replaces_page_contents_and_checks_size() {
    let mut set = page_set(stored(1, &[(0, 0, 1)]));
    run(&mut set, 1, ViewerRole::Owner, None);

    let mut payloads = vec![None; 9];
    payloads[3] = Some(stone(2));
    assert_eq!(
        set.capture(0, payloads, DEFAULT_CASCADE_PAGE_LIMIT),
        Ok(Vec::new())
    );
    assert_eq!(set.items().cloned().collect::<Vec<_>>(), vec![stone(2)]);

    assert_eq!(
        set.capture(0, vec![None; 3], DEFAULT_CASCADE_PAGE_LIMIT),
        Err(CaptureError::SizeMismatch { expected: 9 })
    );
    assert_eq!(
        set.capture(4, vec![None; 9], DEFAULT_CASCADE_PAGE_LIMIT),
        Err(CaptureError::NoSuchPage { index: 4, len: 1 })
    );
}

#[test]
fn capture_puts_markers_back_and_cascades_items_off_them() {
    let mut set = page_set(stored(3, &[]));
    run(&mut set, 3, ViewerRole::Owner, None);

    let mut payloads = vec![None; 9];
    payloads[PREV] = Some(stone(1));
    payloads[NEXT] = Some(stone(2));
    payloads[0] = Some(Item::marker(Boundary::Next));
    assert_eq!(
        set.capture(1, payloads, DEFAULT_CASCADE_PAGE_LIMIT),
        Ok(Vec::new())
    );

    assert_markers(&set);
    assert_eq!(set.page(1).unwrap().item_count(), 0);
    let last = set.page(2).unwrap();
    assert_eq!(last.slot(STORAGE[0]), Some(&Slot::Item(stone(1))));
    assert_eq!(last.slot(STORAGE[1]), Some(&Slot::Item(stone(2))));
}

#[test]
fn capture_returns_items_with_no_room_left() {
    let mut stored_pages = StoredPages::with_page_count(2);
    fill(&mut stored_pages, 1, 10);
    let mut set = page_set(stored_pages);
    run(&mut set, 2, ViewerRole::Owner, None);

    let mut payloads = vec![None; 9];
    payloads[NEXT] = Some(stone(77));
    assert_eq!(
        set.capture(0, payloads, DEFAULT_CASCADE_PAGE_LIMIT),
        Ok(vec![stone(77)])
    );
    assert_markers(&set);
    assert_eq!(set.item_count(), 7);

    let mut last = set.view(1).unwrap().payloads;
    last[PREV] = Some(stone(78));
    assert_eq!(
        set.capture(1, last, DEFAULT_CASCADE_PAGE_LIMIT),
        Ok(vec![stone(78)])
    );
    assert_markers(&set);
}
