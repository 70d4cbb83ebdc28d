// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Satchel-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Satchel and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use std::fmt;

use super::item::{Boundary, Item};

pub const DEFAULT_PAGE_SLOTS: usize = 54;
pub const DEFAULT_PREV_SLOT: usize = 45;
pub const DEFAULT_NEXT_SLOT: usize = 53;

/// Grid geometry shared by every page of a vault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLayout {
    size: usize,
    prev_slot: usize,
    next_slot: usize,
}

impl PageLayout {
    pub fn new(size: usize, prev_slot: usize, next_slot: usize) -> Result<Self, LayoutError> {
        if prev_slot >= size || next_slot >= size {
            return Err(LayoutError::BoundaryOutOfRange {
                size,
                prev_slot,
                next_slot,
            });
        }
        if prev_slot == next_slot {
            return Err(LayoutError::SharedBoundary { slot: prev_slot });
        }
        if size < 3 {
            return Err(LayoutError::NoStorage { size });
        }
        Ok(Self {
            size,
            prev_slot,
            next_slot,
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn prev_slot(&self) -> usize {
        self.prev_slot
    }

    pub fn next_slot(&self) -> usize {
        self.next_slot
    }

    pub fn boundary_slot(&self, boundary: Boundary) -> usize {
        match boundary {
            Boundary::Prev => self.prev_slot,
            Boundary::Next => self.next_slot,
        }
    }

    pub fn boundary_at(&self, slot: usize) -> Option<Boundary> {
        if slot == self.prev_slot {
            Some(Boundary::Prev)
        } else if slot == self.next_slot {
            Some(Boundary::Next)
        } else {
            None
        }
    }

    /// Number of slots available to user items on every page.
    pub fn storage_capacity(&self) -> usize {
        self.size - 2
    }
}

impl Default for PageLayout {
    fn default() -> Self {
        Self {
            size: DEFAULT_PAGE_SLOTS,
            prev_slot: DEFAULT_PREV_SLOT,
            next_slot: DEFAULT_NEXT_SLOT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayoutError {
    BoundaryOutOfRange {
        size: usize,
        prev_slot: usize,
        next_slot: usize,
    },
    SharedBoundary {
        slot: usize,
    },
    NoStorage {
        size: usize,
    },
}

impl fmt::Display for LayoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BoundaryOutOfRange {
                size,
                prev_slot,
                next_slot,
            } => write!(
                f,
                "boundary slots {prev_slot} and {next_slot} lie outside a page of {size} slots"
            ),
            Self::SharedBoundary { slot } => {
                write!(f, "prev and next boundary must differ (both at {slot})")
            }
            Self::NoStorage { size } => write!(f, "page of {size} slots leaves no storage"),
        }
    }
}

impl std::error::Error for LayoutError {}

/// Content of one slot, resolved once when a payload enters the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Slot {
    #[default]
    Empty,
    Marker(Boundary),
    Item(Item),
}

impl Slot {
    pub fn from_payload(payload: Option<Item>) -> Self {
        match payload {
            None => Self::Empty,
            Some(item) => match item.marker_boundary() {
                Some(boundary) => Self::Marker(boundary),
                None => Self::Item(item),
            },
        }
    }

    pub fn to_payload(&self) -> Option<Item> {
        match self {
            Self::Empty => None,
            Self::Marker(boundary) => Some(Item::marker(*boundary)),
            Self::Item(item) => Some(item.clone()),
        }
    }

    pub fn item(&self) -> Option<&Item> {
        match self {
            Self::Item(item) => Some(item),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }

    pub fn is_marker(&self) -> bool {
        matches!(self, Self::Marker(_))
    }

    /// Removes and returns a genuine item, leaving markers untouched.
    pub fn take_item(&mut self) -> Option<Item> {
        if !matches!(self, Self::Item(_)) {
            return None;
        }
        match std::mem::take(self) {
            Self::Item(item) => Some(item),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageTotal {
    Pages(usize),
    /// Admin-only page past the owner's entitlement.
    Overflow,
}

/// Display title of a page: 1-based number plus what it is counted against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageTitle {
    number: usize,
    total: PageTotal,
}

impl PageTitle {
    pub fn new(number: usize, total: PageTotal) -> Self {
        Self { number, total }
    }

    pub fn number(&self) -> usize {
        self.number
    }

    pub fn total(&self) -> PageTotal {
        self.total
    }
}

impl fmt::Display for PageTitle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.total {
            PageTotal::Pages(total) => write!(f, "Page {} of {total}", self.number),
            PageTotal::Overflow => write!(f, "Page {} of OVERFLOW", self.number),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    slots: Vec<Slot>,
    title: PageTitle,
}

impl Page {
    pub fn new(layout: &PageLayout, title: PageTitle) -> Self {
        Self {
            slots: vec![Slot::Empty; layout.size()],
            title,
        }
    }

    /// Builds a page from raw UI payloads; returns `None` when the slot count does not match.
    pub fn from_payloads(
        layout: &PageLayout,
        title: PageTitle,
        payloads: impl IntoIterator<Item = Option<Item>>,
    ) -> Option<Self> {
        let slots = payloads
            .into_iter()
            .map(Slot::from_payload)
            .collect::<Vec<_>>();
        if slots.len() != layout.size() {
            return None;
        }
        Some(Self { slots, title })
    }

    pub fn title(&self) -> PageTitle {
        self.title
    }

    pub fn size(&self) -> usize {
        self.slots.len()
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    pub fn slot(&self, index: usize) -> Option<&Slot> {
        self.slots.get(index)
    }

    pub fn slot_mut(&mut self, index: usize) -> Option<&mut Slot> {
        self.slots.get_mut(index)
    }

    pub fn set(&mut self, index: usize, slot: Slot) {
        if let Some(current) = self.slots.get_mut(index) {
            *current = slot;
        }
    }

    pub fn payloads(&self) -> Vec<Option<Item>> {
        self.slots.iter().map(Slot::to_payload).collect()
    }

    /// Genuine items with their slot index, in slot order.
    pub fn items(&self) -> impl Iterator<Item = (usize, &Item)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.item().map(|item| (index, item)))
    }

    pub fn item_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| slot.item().is_some())
            .count()
    }

    /// Drains every genuine item, leaving markers and empty slots in place.
    pub fn drain_items(&mut self) -> Vec<Item> {
        self.slots.iter_mut().filter_map(Slot::take_item).collect()
    }

    /// First empty slot that is not a boundary of `layout`.
    pub fn first_free_storage_slot(&self, layout: &PageLayout) -> Option<usize> {
        self.slots
            .iter()
            .enumerate()
            .find(|(index, slot)| slot.is_empty() && layout.boundary_at(*index).is_none())
            .map(|(index, _)| index)
    }

    /// Stores `item` in the first free storage slot, handing it back when the page is full.
    pub fn place(&mut self, layout: &PageLayout, item: Item) -> Result<usize, Item> {
        match self.first_free_storage_slot(layout) {
            Some(index) => {
                self.slots[index] = Slot::Item(item);
                Ok(index)
            }
            None => Err(item),
        }
    }

    /// Moves the slot contents into a freshly built page with a new title.
    pub fn rebuilt(self, layout: &PageLayout, title: PageTitle) -> Self {
        let mut fresh = Self::new(layout, title);
        for (index, slot) in self.slots.into_iter().enumerate().take(layout.size()) {
            fresh.slots[index] = slot;
        }
        fresh
    }
}
