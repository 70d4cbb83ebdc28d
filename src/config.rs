// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Satchel-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Satchel and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use std::path::{Path, PathBuf};

use crate::model::PageLayout;
use crate::store::{VaultFolder, WriteDurability};

pub const DEFAULT_BACKUP_DIR_NAME: &str = "backup";

/// Pages searched past a boundary slot before a displaced item goes to overflow.
pub const DEFAULT_CASCADE_PAGE_LIMIT: usize = 10;

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultConfig {
    data_dir: PathBuf,
    backup_dir_name: String,
    durability: WriteDurability,
    layout: PageLayout,
    cascade_page_limit: usize,
}

impl VaultConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            backup_dir_name: DEFAULT_BACKUP_DIR_NAME.to_owned(),
            durability: WriteDurability::default(),
            layout: PageLayout::default(),
            cascade_page_limit: DEFAULT_CASCADE_PAGE_LIMIT,
        }
    }

    pub fn with_backup_dir_name(mut self, name: impl Into<String>) -> Self {
        self.backup_dir_name = name.into();
        self
    }

    pub fn with_durability(mut self, durability: WriteDurability) -> Self {
        self.durability = durability;
        self
    }

    pub fn with_layout(mut self, layout: PageLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn with_cascade_page_limit(mut self, limit: usize) -> Self {
        self.cascade_page_limit = limit;
        self
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn backup_dir(&self) -> PathBuf {
        self.data_dir.join(&self.backup_dir_name)
    }

    pub fn durability(&self) -> WriteDurability {
        self.durability
    }

    pub fn layout(&self) -> PageLayout {
        self.layout
    }

    pub fn cascade_page_limit(&self) -> usize {
        self.cascade_page_limit
    }

    /// Store handle over the configured data directory.
    pub fn folder(&self) -> VaultFolder {
        VaultFolder::new(&self.data_dir).with_durability(self.durability)
    }
}
