// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Satchel-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Satchel and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs;
use std::io;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;

use crate::model::ids::FILE_NAME_DELIMITER;
use crate::model::{Identity, Item, UserId};

const COMPRESSED_EXTENSION: &str = ".json.gz";
const PLAIN_EXTENSION: &str = ".json";
const SLOT_KEY_PREFIX: &str = "slot";

/// Page indexes above this are treated as corrupt keys on load.
const MAX_STORED_PAGE_INDEX: usize = 4096;

#[derive(Debug)]
pub enum StoreError {
    Io {
        path: PathBuf,
        source: io::Error,
    },
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
    Corrupt {
        path: PathBuf,
        reason: String,
    },
    SymlinkRefused {
        path: PathBuf,
    },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => write!(f, "io error at {path:?}: {source}"),
            Self::Json { path, source } => write!(f, "json error at {path:?}: {source}"),
            Self::Corrupt { path, reason } => write!(f, "corrupt store file {path:?}: {reason}"),
            Self::SymlinkRefused { path } => {
                write!(f, "refusing to write through symlink at {path:?}")
            }
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Json { source, .. } => Some(source),
            Self::Corrupt { .. } => None,
            Self::SymlinkRefused { .. } => None,
        }
    }
}

/// Every write syncs its temp file before the atomic rename; this only decides whether the
/// rename itself is synced as well.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum WriteDurability {
    /// Skips the directory sync after the rename.
    BestEffort,

    /// Also syncs the parent directory so the rename survives a crash, where the platform allows.
    #[default]
    Durable,
}

/// Persisted page contents of one user: page index → slot index → item.
///
/// `page_count` is exact even when trailing pages are empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoredPages {
    page_count: usize,
    pages: BTreeMap<usize, BTreeMap<usize, Item>>,
}

impl StoredPages {
    pub fn with_page_count(page_count: usize) -> Self {
        Self {
            page_count,
            pages: BTreeMap::new(),
        }
    }

    pub fn page_count(&self) -> usize {
        self.page_count
    }

    pub fn insert(&mut self, page: usize, slot: usize, item: Item) {
        self.page_count = self.page_count.max(page + 1);
        self.pages.entry(page).or_default().insert(slot, item);
    }

    pub fn page(&self, page: usize) -> Option<&BTreeMap<usize, Item>> {
        self.pages.get(&page)
    }

    /// Every stored item as `(page, slot, item)`, ordered by page then slot.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, &Item)> {
        self.pages
            .iter()
            .flat_map(|(page, slots)| slots.iter().map(move |(slot, item)| (*page, *slot, item)))
    }

    pub fn item_count(&self) -> usize {
        self.pages.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.page_count == 0 && self.pages.is_empty()
    }

    pub(crate) fn into_pages(self) -> BTreeMap<usize, BTreeMap<usize, Item>> {
        self.pages
    }
}

#[derive(Debug, Default)]
struct UserLocks {
    locks: Mutex<HashMap<UserId, Arc<Mutex<()>>>>,
}

impl UserLocks {
    fn handle(&self, user: &UserId) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(user.clone()).or_default().clone()
    }

    /// Forgets the lock of `user` once no other thread holds or waits for it.
    fn release(&self, user: &UserId, handle: Arc<Mutex<()>>) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // New handles are only handed out under the map lock, so the count cannot grow here.
        let current = locks.get(user);
        let idle = Arc::strong_count(&handle) == 2
            && current.is_some_and(|current| Arc::ptr_eq(current, &handle));
        if idle {
            locks.remove(user);
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Directory holding every user's vault and overflow files.
///
/// Clones share the per-user file locks.
#[derive(Debug, Clone)]
pub struct VaultFolder {
    root: PathBuf,
    durability: WriteDurability,
    locks: Arc<UserLocks>,
}

impl VaultFolder {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            durability: WriteDurability::default(),
            locks: Arc::new(UserLocks::default()),
        }
    }

    pub fn with_durability(mut self, durability: WriteDurability) -> Self {
        self.durability = durability;
        self
    }

    pub fn durability(&self) -> WriteDurability {
        self.durability
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn vault_path(&self, identity: &Identity) -> PathBuf {
        self.root
            .join(vault_file_name(identity, COMPRESSED_EXTENSION))
    }

    pub fn legacy_vault_path(&self, identity: &Identity) -> PathBuf {
        self.root.join(vault_file_name(identity, PLAIN_EXTENSION))
    }

    /// Runs `f` while holding the file lock of `user`.
    pub(crate) fn with_user_lock<T>(&self, user: &UserId, f: impl FnOnce() -> T) -> T {
        let handle = self.locks.handle(user);
        let result = {
            let _guard = handle.lock().unwrap_or_else(PoisonError::into_inner);
            f()
        };
        self.locks.release(user, handle);
        result
    }

    /// Loads the stored pages of `identity`.
    ///
    /// Never fails: unreadable or corrupt data is logged and yields empty pages.
    pub fn load(&self, identity: &Identity) -> StoredPages {
        self.with_user_lock(identity.id(), || {
            let Some(path) = self.resolve_source(identity) else {
                return StoredPages::default();
            };
            self.read_or_empty(&path)
        })
    }

    /// Loads a user's pages knowing only the id; used for offline inspection.
    pub fn load_user(&self, user: &UserId) -> Option<(PathBuf, StoredPages)> {
        self.with_user_lock(user, || {
            let path = self.find_any_source(user)?;
            let pages = self.read_or_empty(&path);
            Some((path, pages))
        })
    }

    /// Atomically replaces the stored pages of `identity`.
    ///
    /// On success, files of the same user stored under another display name and the legacy
    /// plain file are removed. On failure the previous file is left untouched.
    pub fn save(&self, identity: &Identity, pages: &StoredPages) -> Result<(), StoreError> {
        let path = self.vault_path(identity);
        let contents = encode_vault_document(&path, pages)?;
        self.with_user_lock(identity.id(), || {
            write_atomic(&self.root, &path, &contents, self.durability)?;
            self.remove_stale_files(identity.id(), &path);
            Ok(())
        })
    }

    fn resolve_source(&self, identity: &Identity) -> Option<PathBuf> {
        let primary = self.vault_path(identity);
        if primary.is_file() {
            return Some(primary);
        }
        let legacy = self.legacy_vault_path(identity);
        if legacy.is_file() {
            return Some(legacy);
        }
        let renamed = self.find_any_source(identity.id());
        if let Some(path) = &renamed {
            tracing::info!(
                user = %identity.id(),
                path = ?path,
                "loading vault stored under a previous name"
            );
        }
        renamed
    }

    /// Any vault file of `user`, compressed ones first.
    fn find_any_source(&self, user: &UserId) -> Option<PathBuf> {
        let mut candidates = self
            .list_store_files()
            .ok()?
            .into_iter()
            .filter_map(|(path, file)| match file {
                StoreFile::Vault { id, compressed, .. } if &id == user => Some((!compressed, path)),
                _ => None,
            })
            .collect::<Vec<_>>();
        candidates.sort();
        candidates.into_iter().next().map(|(_, path)| path)
    }

    fn read_or_empty(&self, path: &Path) -> StoredPages {
        match read_vault_file(path) {
            Ok(pages) => pages,
            Err(err) => {
                tracing::error!(
                    path = ?path,
                    error = %err,
                    "cannot read vault file; using empty pages"
                );
                StoredPages::default()
            }
        }
    }

    fn remove_stale_files(&self, user: &UserId, keep: &Path) {
        let Ok(files) = self.list_store_files() else {
            return;
        };
        for (path, file) in files {
            let StoreFile::Vault { id, .. } = file else {
                continue;
            };
            if &id != user || path == keep {
                continue;
            }
            match fs::remove_file(&path) {
                Ok(()) => tracing::debug!(user = %user, path = ?path, "removed stale vault file"),
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => {
                    tracing::warn!(
                        user = %user,
                        path = ?path,
                        error = %err,
                        "cannot remove stale vault file"
                    )
                }
            }
        }
    }

    /// Every recognised store file directly inside the root, sorted by path.
    pub fn list_store_files(&self) -> Result<Vec<(PathBuf, StoreFile)>, StoreError> {
        list_store_files_in(&self.root)
    }
}

/// Every recognised store file directly inside `dir`, sorted by path; a missing `dir` is empty.
pub(crate) fn list_store_files_in(dir: &Path) -> Result<Vec<(PathBuf, StoreFile)>, StoreError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(StoreError::Io {
                path: dir.to_path_buf(),
                source,
            })
        }
    };

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| StoreError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        if !file_type.is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
            continue;
        };
        if let Some(file) = classify_file_name(&name) {
            files.push((entry.path(), file));
        }
    }
    files.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(files)
}

fn vault_file_name(identity: &Identity, extension: &str) -> String {
    let name = identity.display_name();
    let id = identity.id();
    format!("{name}{FILE_NAME_DELIMITER}{id}{extension}")
}

#[derive(Serialize)]
struct VaultDocument<'a> {
    pages: BTreeMap<String, BTreeMap<String, &'a Item>>,
}

fn slot_key(slot: usize) -> String {
    let mut buffer = itoa::Buffer::new();
    let digits = buffer.format(slot);
    let mut key = String::with_capacity(SLOT_KEY_PREFIX.len() + digits.len());
    key.push_str(SLOT_KEY_PREFIX);
    key.push_str(digits);
    key
}

fn encode_vault_document(path: &Path, pages: &StoredPages) -> Result<Vec<u8>, StoreError> {
    let mut page_keys = itoa::Buffer::new();
    let mut document = VaultDocument {
        pages: BTreeMap::new(),
    };
    for page in 0..pages.page_count() {
        let slots = pages
            .page(page)
            .into_iter()
            .flatten()
            .filter(|(_, item)| !item.is_marker())
            .map(|(slot, item)| (slot_key(*slot), item))
            .collect();
        let key = page_keys.format(page).to_owned();
        document.pages.insert(key, slots);
    }

    let json = serde_json::to_vec(&document).map_err(|source| StoreError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    gzip(&json).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn read_vault_file(path: &Path) -> Result<StoredPages, StoreError> {
    let bytes = fs::read(path).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let json = match gunzip(&bytes) {
        Ok(json) => json,
        Err(err) => {
            if path.to_string_lossy().ends_with(COMPRESSED_EXTENSION) {
                tracing::warn!(
                    path = ?path,
                    error = %err,
                    "vault file is not valid gzip; retrying as plain json"
                );
            }
            bytes
        }
    };
    decode_vault_document(path, &json)
}

fn decode_vault_document(path: &Path, json: &[u8]) -> Result<StoredPages, StoreError> {
    let root: Value = serde_json::from_slice(json).map_err(|source| StoreError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    let Some(pages) = root.get("pages") else {
        return Ok(StoredPages::default());
    };
    let Some(pages) = pages.as_object() else {
        return Err(StoreError::Corrupt {
            path: path.to_path_buf(),
            reason: "`pages` is not an object".to_owned(),
        });
    };

    let mut stored = StoredPages::default();
    for (page_key, slots) in pages {
        let Some(page) = page_key
            .parse::<usize>()
            .ok()
            .filter(|page| *page <= MAX_STORED_PAGE_INDEX)
        else {
            tracing::warn!(path = ?path, key = %page_key, "skipping unparseable page key");
            continue;
        };
        stored.page_count = stored.page_count.max(page + 1);
        let Some(slots) = slots.as_object() else {
            tracing::warn!(path = ?path, page, "skipping page that is not an object");
            continue;
        };
        for (slot_key, value) in slots {
            let Some(slot) = slot_key
                .strip_prefix(SLOT_KEY_PREFIX)
                .and_then(|raw| raw.parse::<usize>().ok())
            else {
                tracing::warn!(
                    path = ?path,
                    page,
                    key = %slot_key,
                    "skipping unparseable slot key"
                );
                continue;
            };
            match serde_json::from_value::<Item>(value.clone()) {
                Ok(item) if item.is_marker() => {}
                Ok(item) => stored.insert(page, slot, item),
                Err(err) => {
                    tracing::warn!(
                        path = ?path,
                        page,
                        slot,
                        error = %err,
                        "skipping unreadable item"
                    )
                }
            }
        }
    }
    Ok(stored)
}

include!("vault_folder/helpers.rs");
