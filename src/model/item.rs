// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Satchel-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Satchel and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// Attribute key that tags a payload as a navigation marker.
pub const MARKER_ATTRIBUTE: &str = "satchel:nav";

/// Item kind used when a marker is exported to the UI layer.
pub const MARKER_KIND: &str = "arrow";

/// An opaque stored payload.
///
/// Items are moved as indivisible units and compared structurally.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Item {
    kind: SmolStr,
    #[serde(default = "default_amount")]
    amount: u32,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    attributes: BTreeMap<String, String>,
}

fn default_amount() -> u32 {
    1
}

impl Item {
    pub fn new(kind: impl AsRef<str>, amount: u32) -> Self {
        Self {
            kind: SmolStr::new(kind.as_ref()),
            amount,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn amount(&self) -> u32 {
        self.amount
    }

    pub fn attributes(&self) -> &BTreeMap<String, String> {
        &self.attributes
    }

    /// Returns the boundary a marker payload points to, or `None` for genuine items.
    ///
    /// Payloads carrying the marker attribute with an unknown value are still markers; they
    /// are treated as pointing forward.
    pub fn marker_boundary(&self) -> Option<Boundary> {
        let raw = self.attributes.get(MARKER_ATTRIBUTE)?;
        Some(if raw == Boundary::Prev.as_str() {
            Boundary::Prev
        } else {
            Boundary::Next
        })
    }

    pub fn is_marker(&self) -> bool {
        self.attributes.contains_key(MARKER_ATTRIBUTE)
    }

    /// Builds the UI payload for a navigation marker.
    pub fn marker(boundary: Boundary) -> Self {
        Self::new(MARKER_KIND, 1).with_attribute(MARKER_ATTRIBUTE, boundary.as_str())
    }
}

/// One of the two reserved slots of a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Boundary {
    Prev,
    Next,
}

impl Boundary {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Prev => "prev",
            Self::Next => "next",
        }
    }
}
