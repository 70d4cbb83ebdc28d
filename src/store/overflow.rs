// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Satchel-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Satchel and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Per-user overflow buffer files.
//!
//! `<userId>-overflow-.bin.gz` holds the gzip of a big-endian `u32` item count followed by one
//! `u32` length plus JSON item bytes per item. Loading consumes the file.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use super::vault_folder::{gunzip, gzip, overflow_file_name, remove_if_exists, write_atomic};
use super::{StoreError, VaultFolder};
use crate::model::{Item, UserId};

const LENGTH_PREFIX: usize = 4;

#[derive(Debug)]
pub enum OverflowDecodeError {
    Gzip(io::Error),
    Truncated {
        offset: usize,
    },
    Item {
        index: usize,
        source: serde_json::Error,
    },
    TrailingBytes {
        count: usize,
    },
}

impl fmt::Display for OverflowDecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gzip(source) => write!(f, "invalid gzip stream: {source}"),
            Self::Truncated { offset } => write!(f, "truncated at byte {offset}"),
            Self::Item { index, source } => write!(f, "item {index} is not valid json: {source}"),
            Self::TrailingBytes { count } => write!(f, "{count} unexpected trailing byte(s)"),
        }
    }
}

impl std::error::Error for OverflowDecodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Gzip(source) => Some(source),
            Self::Item { source, .. } => Some(source),
            Self::Truncated { .. } | Self::TrailingBytes { .. } => None,
        }
    }
}

pub fn encode_overflow(items: &[Item]) -> Result<Vec<u8>, serde_json::Error> {
    let mut raw = Vec::with_capacity(LENGTH_PREFIX + items.len() * 64);
    raw.extend_from_slice(&(items.len() as u32).to_be_bytes());
    for item in items {
        let json = serde_json::to_vec(item)?;
        raw.extend_from_slice(&(json.len() as u32).to_be_bytes());
        raw.extend_from_slice(&json);
    }
    Ok(raw)
}

pub fn decode_overflow(compressed: &[u8]) -> Result<Vec<Item>, OverflowDecodeError> {
    let raw = gunzip(compressed).map_err(OverflowDecodeError::Gzip)?;
    let mut offset = 0;
    let count = read_u32(&raw, &mut offset)? as usize;
    // The count is untrusted until every item has been read.
    let mut items = Vec::with_capacity(count.min(1024));
    for index in 0..count {
        let len = read_u32(&raw, &mut offset)? as usize;
        let end = offset.checked_add(len).filter(|end| *end <= raw.len());
        let Some(end) = end else {
            return Err(OverflowDecodeError::Truncated { offset });
        };
        let item = serde_json::from_slice(&raw[offset..end])
            .map_err(|source| OverflowDecodeError::Item { index, source })?;
        items.push(item);
        offset = end;
    }
    if offset != raw.len() {
        return Err(OverflowDecodeError::TrailingBytes {
            count: raw.len() - offset,
        });
    }
    Ok(items)
}

fn read_u32(raw: &[u8], offset: &mut usize) -> Result<u32, OverflowDecodeError> {
    let Some(bytes) = raw.get(*offset..*offset + LENGTH_PREFIX) else {
        return Err(OverflowDecodeError::Truncated { offset: *offset });
    };
    *offset += LENGTH_PREFIX;
    Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Overflow files of one [`VaultFolder`].
#[derive(Debug, Clone, Copy)]
pub struct OverflowStore<'a> {
    folder: &'a VaultFolder,
}

impl VaultFolder {
    pub fn overflow(&self) -> OverflowStore<'_> {
        OverflowStore { folder: self }
    }
}

impl OverflowStore<'_> {
    pub fn path(&self, user: &UserId) -> PathBuf {
        self.folder.root().join(overflow_file_name(user))
    }

    /// Takes the whole buffer of `user`, deleting its file.
    ///
    /// A corrupt file yields no items and is moved aside so later writes cannot replace it. A
    /// file that cannot be read is left in place and reported.
    pub fn load(&self, user: &UserId) -> Result<Vec<Item>, StoreError> {
        self.folder.with_user_lock(user, || {
            let path = self.path(user);
            let items = self.read_or_quarantine(user, &path)?;
            if remove_if_exists(&path)? {
                tracing::debug!(user = %user, count = items.len(), "overflow consumed");
            }
            Ok(items)
        })
    }

    /// Reads the buffer without consuming it.
    pub fn peek(&self, user: &UserId) -> Result<Vec<Item>, StoreError> {
        self.folder.with_user_lock(user, || {
            let path = self.path(user);
            match read_file(&path)? {
                None => Ok(Vec::new()),
                Some(bytes) => decode_overflow(&bytes).map_err(|err| StoreError::Corrupt {
                    path: path.clone(),
                    reason: err.to_string(),
                }),
            }
        })
    }

    /// Writes `items` as the whole buffer. An empty list leaves the file alone.
    pub fn save(&self, user: &UserId, items: &[Item]) -> Result<(), StoreError> {
        if items.is_empty() {
            return Ok(());
        }
        self.folder.with_user_lock(user, || self.write(user, items))
    }

    /// Adds `items` to whatever the buffer already holds.
    pub fn append(&self, user: &UserId, items: &[Item]) -> Result<(), StoreError> {
        if items.is_empty() {
            return Ok(());
        }
        self.folder.with_user_lock(user, || {
            let path = self.path(user);
            let mut combined = self.read_or_quarantine(user, &path)?;
            combined.extend_from_slice(items);
            self.write(user, &combined)
        })
    }

    /// Makes the buffer hold exactly `items`; empty deletes the file.
    pub fn replace(&self, user: &UserId, items: &[Item]) -> Result<(), StoreError> {
        if items.is_empty() {
            return self.clear(user).map(|_| ());
        }
        self.folder.with_user_lock(user, || self.write(user, items))
    }

    /// Deletes the buffer file; returns whether one existed.
    pub fn clear(&self, user: &UserId) -> Result<bool, StoreError> {
        self.folder
            .with_user_lock(user, || remove_if_exists(&self.path(user)))
    }

    fn write(&self, user: &UserId, items: &[Item]) -> Result<(), StoreError> {
        let path = self.path(user);
        let raw = encode_overflow(items).map_err(|source| StoreError::Json {
            path: path.clone(),
            source,
        })?;
        let compressed = gzip(&raw).map_err(|source| StoreError::Io {
            path: path.clone(),
            source,
        })?;
        write_atomic(
            self.folder.root(),
            &path,
            &compressed,
            self.folder.durability(),
        )
    }

    /// Unreadable files are an error and stay in place; corrupt ones are moved aside.
    fn read_or_quarantine(&self, user: &UserId, path: &Path) -> Result<Vec<Item>, StoreError> {
        let Some(bytes) = read_file(path)? else {
            return Ok(Vec::new());
        };
        match decode_overflow(&bytes) {
            Ok(items) => Ok(items),
            Err(err) => {
                let nanos = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .unwrap_or_default()
                    .as_nanos();
                let name = format!("{}.corrupt-{nanos}", overflow_file_name(user));
                let aside = path.with_file_name(name);
                tracing::error!(
                    user = %user,
                    error = %err,
                    aside = ?aside,
                    "corrupt overflow file moved aside"
                );
                if let Err(err) = fs::rename(path, &aside) {
                    tracing::error!(
                        user = %user,
                        error = %err,
                        "cannot move corrupt overflow file aside"
                    );
                }
                Ok(Vec::new())
            }
        }
    }
}

fn read_file(path: &Path) -> Result<Option<Vec<u8>>, StoreError> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(StoreError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}
