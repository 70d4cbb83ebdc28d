// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Satchel-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Satchel and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use super::PageSet;
use crate::model::{Boundary, Item, Page, PageLayout, PageTitle, PageTotal, Slot};
use crate::notify::Notice;
use crate::session::ViewerRole;

/// What has to happen to the persisted overflow buffer after a reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum OverflowAction {
    #[default]
    Untouched,
    /// The buffer was consumed for this run; it must now hold exactly these items.
    /// An empty list deletes the file.
    Replace(Vec<Item>),
    /// The buffer was not consumed; these items are added to whatever it holds.
    Append(Vec<Item>),
}

impl OverflowAction {
    pub fn items(&self) -> &[Item] {
        match self {
            Self::Untouched => &[],
            Self::Replace(items) | Self::Append(items) => items,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciliation {
    pub overflow: OverflowAction,
    pub notices: Vec<Notice>,
    /// Items newly sent to the overflow buffer.
    pub moved_to_overflow: usize,
    /// Items taken out of the overflow buffer into pages.
    pub recovered: usize,
    /// Items moved off a navigation slot into a later page.
    pub cascaded: usize,
}

struct OverflowBuffer {
    /// Contents of the consumed overflow file; `None` when the file was not read.
    loaded: Option<Vec<Item>>,
    pending: Vec<Item>,
}

impl OverflowBuffer {
    fn take_all(&mut self) -> Vec<Item> {
        let mut all = self.loaded.as_mut().map(std::mem::take).unwrap_or_default();
        all.append(&mut self.pending);
        all
    }

    fn finish(self) -> OverflowAction {
        match self.loaded {
            Some(mut loaded) => {
                loaded.extend(self.pending);
                OverflowAction::Replace(loaded)
            }
            None if self.pending.is_empty() => OverflowAction::Untouched,
            None => OverflowAction::Append(self.pending),
        }
    }
}

/// Resizes `page_set` to `allowed` pages and lays out navigation markers.
///
/// `existing_overflow` is the consumed overflow buffer, or `None` when it was not read. Every
/// item ends up either in a page or in the returned [`OverflowAction`]. Admin viewers get the
/// remaining overflow exposed on extra pages past `allowed`.
pub fn reconcile(
    page_set: &mut PageSet,
    allowed: usize,
    role: ViewerRole,
    existing_overflow: Option<Vec<Item>>,
    cascade_page_limit: usize,
) -> Reconciliation {
    let allowed = allowed.max(1);
    let layout = page_set.layout;
    let mut buffer = OverflowBuffer {
        loaded: existing_overflow,
        pending: Vec::new(),
    };
    let mut report = Reconciliation::default();

    let stripped = page_set.strip_overflow_pages();
    match buffer.loaded.as_mut() {
        Some(loaded) => loaded.extend(stripped),
        None => buffer.pending.extend(stripped),
    }

    let current = page_set.pages.len();
    if current > allowed {
        let excess = page_set.pages.split_off(allowed);
        let mut collected = Vec::new();
        for mut page in excess {
            for item in page.drain_items() {
                if let Err(item) = place_in_pages(&mut page_set.pages, &layout, item) {
                    collected.push(item);
                }
            }
        }
        if !collected.is_empty() {
            report.notices.push(Notice::ItemsOverflowed {
                count: collected.len(),
            });
            report.moved_to_overflow += collected.len();
            buffer.pending.extend(collected);
        }
    } else if current < allowed {
        let added = (current..allowed).map(|index| Page::new(&layout, title(index, allowed)));
        page_set.pages.extend(added);
        if let Some(loaded) = buffer.loaded.as_mut() {
            let mut queue = std::mem::take(loaded).into_iter();
            for item in queue.by_ref() {
                match place_in_pages(&mut page_set.pages, &layout, item) {
                    Ok(()) => report.recovered += 1,
                    Err(item) => {
                        loaded.push(item);
                        break;
                    }
                }
            }
            loaded.extend(queue);
        }
        if report.recovered > 0 {
            report.notices.push(Notice::ItemsRecovered {
                count: report.recovered,
            });
        }
    }

    let mut displaced_overflow = 0;
    for item in std::mem::take(&mut page_set.displaced) {
        if let Err(item) = place_in_pages(&mut page_set.pages, &layout, item) {
            buffer.pending.push(item);
            displaced_overflow += 1;
        }
    }
    if displaced_overflow > 0 {
        report.notices.push(Notice::ItemsOverflowed {
            count: displaced_overflow,
        });
        report.moved_to_overflow += displaced_overflow;
    }

    if role == ViewerRole::Admin {
        expose_overflow(page_set, &layout, &mut buffer);
    }

    normalize(
        page_set,
        allowed,
        cascade_page_limit,
        &mut buffer,
        &mut report,
    );
    page_set.entitled = allowed;
    report.overflow = buffer.finish();
    report
}

fn title(index: usize, allowed: usize) -> PageTitle {
    if index < allowed {
        PageTitle::new(index + 1, PageTotal::Pages(allowed))
    } else {
        PageTitle::new(index + 1, PageTotal::Overflow)
    }
}

/// First free storage slot across `pages`, in page order.
fn place_in_pages(pages: &mut [Page], layout: &PageLayout, mut item: Item) -> Result<(), Item> {
    for page in pages {
        match page.place(layout, item) {
            Ok(_) => return Ok(()),
            Err(back) => item = back,
        }
    }
    Err(item)
}

fn expose_overflow(page_set: &mut PageSet, layout: &PageLayout, buffer: &mut OverflowBuffer) {
    let exposed = buffer.take_all();
    if exposed.is_empty() {
        return;
    }
    let allowed = page_set.pages.len();
    let mut page = Page::new(layout, title(allowed, allowed));
    for item in exposed {
        let item = match page.place(layout, item) {
            Ok(_) => continue,
            Err(item) => item,
        };
        let next = Page::new(layout, title(allowed, allowed));
        page_set.pages.push(std::mem::replace(&mut page, next));
        if let Err(item) = page.place(layout, item) {
            buffer.pending.push(item);
        }
    }
    page_set.pages.push(page);
}

/// Rebuilds every page with a fresh title and puts markers exactly where navigation needs them.
fn normalize(
    page_set: &mut PageSet,
    allowed: usize,
    cascade_page_limit: usize,
    buffer: &mut OverflowBuffer,
    report: &mut Reconciliation,
) {
    let layout = page_set.layout;
    let pages = std::mem::take(&mut page_set.pages);
    page_set.pages = pages
        .into_iter()
        .enumerate()
        .map(|(index, page)| page.rebuilt(&layout, title(index, allowed)))
        .collect();

    for index in 0..page_set.pages.len() {
        let cascade = restore_markers(&mut page_set.pages, &layout, index, cascade_page_limit);
        report.cascaded += cascade.cascaded;
        for item in cascade.overflowed {
            buffer.pending.push(item);
            report.moved_to_overflow += 1;
            report.notices.push(Notice::ItemOverflowed);
        }
    }
}

/// Items pushed off the boundary slots of one page.
#[derive(Debug, Default)]
pub(super) struct Cascade {
    /// Moved into a following page.
    pub(super) cascaded: usize,
    /// Found no room within the cascade limit.
    pub(super) overflowed: Vec<Item>,
}

/// Puts markers on page `index` exactly where navigation needs them.
///
/// Markers outside the boundary slots are cleared. A genuine item on a boundary slot that needs
/// a marker moves to the first free slot of the next `cascade_page_limit` pages.
pub(super) fn restore_markers(
    pages: &mut [Page],
    layout: &PageLayout,
    index: usize,
    cascade_page_limit: usize,
) -> Cascade {
    let total = pages.len();
    let mut cascade = Cascade::default();
    let Some(page) = pages.get_mut(index) else {
        return cascade;
    };

    for slot in 0..layout.size() {
        if layout.boundary_at(slot).is_none() && page.slot(slot).is_some_and(Slot::is_marker) {
            page.set(slot, Slot::Empty);
        }
    }

    let mut displaced = Vec::new();
    for boundary in [Boundary::Prev, Boundary::Next] {
        let required = match boundary {
            Boundary::Prev => index > 0,
            Boundary::Next => index + 1 < total,
        };
        let slot = layout.boundary_slot(boundary);
        let current = page.slot_mut(slot).map(std::mem::take).unwrap_or_default();
        let restored = match (required, current) {
            (true, Slot::Item(item)) => {
                displaced.push(item);
                Slot::Marker(boundary)
            }
            (true, _) => Slot::Marker(boundary),
            (false, Slot::Marker(_)) => Slot::Empty,
            (false, other) => other,
        };
        page.set(slot, restored);
    }

    let end = total.min(index + 1 + cascade_page_limit);
    for item in displaced {
        let following = &mut pages[(index + 1).min(end)..end];
        match place_in_pages(following, layout, item) {
            Ok(()) => cascade.cascaded += 1,
            Err(item) => cascade.overflowed.push(item),
        }
    }
    cascade
}
