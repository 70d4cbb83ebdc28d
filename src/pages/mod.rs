// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Satchel-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Satchel and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! In-memory page sets and their reconciliation against entitlements.
//!
//! A [`PageSet`] is built from [`StoredPages`], reconciled with [`reconcile`] and captured back
//! into [`StoredPages`] when saved. Pages at or past [`PageSet::entitled`] only exist while an
//! admin is looking at the owner's overflow buffer.

mod reconcile;

use std::fmt;
use std::ops::Range;

use crate::model::{Item, Page, PageLayout, PageTitle, PageTotal, Slot};
use crate::store::StoredPages;

pub use reconcile::{reconcile, OverflowAction, Reconciliation};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageSet {
    layout: PageLayout,
    pages: Vec<Page>,
    /// Entitlement at the last reconciliation; 0 before the first one.
    entitled: usize,
    /// Loaded items whose stored slot does not exist in `layout`.
    displaced: Vec<Item>,
}

impl PageSet {
    pub fn new(layout: PageLayout) -> Self {
        Self {
            layout,
            pages: Vec::new(),
            entitled: 0,
            displaced: Vec::new(),
        }
    }

    /// Builds an unreconciled page set from persisted pages.
    pub fn from_stored(layout: PageLayout, stored: StoredPages) -> Self {
        let page_count = stored.page_count();
        let title = |index: usize| PageTitle::new(index + 1, PageTotal::Pages(page_count));
        let mut pages = (0..page_count)
            .map(|index| Page::new(&layout, title(index)))
            .collect::<Vec<_>>();
        let mut displaced = Vec::new();

        for (page_index, slots) in stored.into_pages() {
            for (slot_index, item) in slots {
                let target = pages
                    .get_mut(page_index)
                    .and_then(|page| page.slot_mut(slot_index))
                    .filter(|slot| slot.is_empty());
                match target {
                    Some(slot) => *slot = Slot::Item(item),
                    None => displaced.push(item),
                }
            }
        }

        Self {
            layout,
            pages,
            entitled: 0,
            displaced,
        }
    }

    /// Persistable contents of `range`, re-indexed from 0.
    pub fn to_stored(&self, range: Range<usize>) -> StoredPages {
        let range = range.start.min(self.pages.len())..range.end.min(self.pages.len());
        let mut stored = StoredPages::with_page_count(range.len());
        for (offset, page) in self.pages[range].iter().enumerate() {
            for (slot, item) in page.items() {
                stored.insert(offset, slot, item.clone());
            }
        }
        stored
    }

    pub fn layout(&self) -> PageLayout {
        self.layout
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn entitled(&self) -> usize {
        self.entitled
    }

    /// Number of admin overflow pages past the entitlement.
    pub fn overflow_page_count(&self) -> usize {
        if self.entitled == 0 {
            return 0;
        }
        self.pages.len().saturating_sub(self.entitled)
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    pub fn page(&self, index: usize) -> Option<&Page> {
        self.pages.get(index)
    }

    /// Genuine items across all pages, plus any displaced ones still awaiting reconciliation.
    pub fn item_count(&self) -> usize {
        self.pages.iter().map(Page::item_count).sum::<usize>() + self.displaced.len()
    }

    pub fn items(&self) -> impl Iterator<Item = &Item> {
        self.pages
            .iter()
            .flat_map(|page| page.items().map(|(_, item)| item))
            .chain(self.displaced.iter())
    }

    /// Replaces the contents of page `index` with what the UI reports.
    ///
    /// Navigation markers are put back afterwards. Items the UI left on a boundary slot that
    /// needs a marker move to the following pages; the returned ones found no room there and
    /// belong in the overflow buffer.
    pub fn capture(
        &mut self,
        index: usize,
        payloads: impl IntoIterator<Item = Option<Item>>,
        cascade_page_limit: usize,
    ) -> Result<Vec<Item>, CaptureError> {
        let layout = self.layout;
        let len = self.pages.len();
        let Some(page) = self.pages.get_mut(index) else {
            return Err(CaptureError::NoSuchPage { index, len });
        };
        let Some(captured) = Page::from_payloads(&layout, page.title(), payloads) else {
            return Err(CaptureError::SizeMismatch {
                expected: layout.size(),
            });
        };
        *page = captured;
        let restored =
            reconcile::restore_markers(&mut self.pages, &layout, index, cascade_page_limit);
        Ok(restored.overflowed)
    }

    pub fn view(&self, index: usize) -> Option<PageView> {
        let page = self.pages.get(index)?;
        Some(PageView {
            index,
            page_count: self.pages.len(),
            title: page.title(),
            payloads: page.payloads(),
        })
    }

    /// Removes the admin overflow pages and returns their items in page order.
    pub(crate) fn strip_overflow_pages(&mut self) -> Vec<Item> {
        if self.overflow_page_count() == 0 {
            return Vec::new();
        }
        let mut items = Vec::new();
        for mut page in self.pages.drain(self.entitled..) {
            items.extend(page.drain_items());
        }
        items
    }
}

/// What the caller renders for one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageView {
    pub index: usize,
    pub page_count: usize,
    pub title: PageTitle,
    /// One entry per slot; markers are exported as marker items.
    pub payloads: Vec<Option<Item>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    NoSuchPage { index: usize, len: usize },
    SizeMismatch { expected: usize },
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoSuchPage { index, len } => write!(f, "page {index} does not exist (len={len})"),
            Self::SizeMismatch { expected } => write!(f, "page capture must have {expected} slots"),
        }
    }
}

impl std::error::Error for CaptureError {}

#[cfg(test)]
mod tests;
