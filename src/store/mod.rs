// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Satchel-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Satchel and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Persistence for vaults on disk.
//!
//! The store module reads/writes the vault folder format (one compressed page document and at
//! most one overflow file per user) and mirrors it into the backup directory.

pub mod backup;
pub mod overflow;
pub mod vault_folder;

pub use backup::{BackupReport, VerifyReport};
pub use overflow::{decode_overflow, encode_overflow, OverflowDecodeError, OverflowStore};
pub use vault_folder::{
    classify_file_name, StoreError, StoreFile, StoredPages, VaultFolder, WriteDurability,
};
