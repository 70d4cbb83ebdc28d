// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Satchel-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Satchel and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

// Vault folder helpers: file-name classification, gzip framing and safe filesystem writes.

const TEMP_FILE_PREFIX: &str = ".satchel.tmp.";
const OVERFLOW_FILE_SUFFIX: &str = "-overflow-.bin.gz";

/// A file of the vault folder, recognised by its name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreFile {
    Vault {
        display_name: String,
        id: UserId,
        compressed: bool,
    },
    Overflow {
        id: UserId,
    },
}

impl StoreFile {
    pub fn user(&self) -> &UserId {
        match self {
            Self::Vault { id, .. } | Self::Overflow { id } => id,
        }
    }

    pub fn is_compressed(&self) -> bool {
        match self {
            Self::Vault { compressed, .. } => *compressed,
            Self::Overflow { .. } => true,
        }
    }
}

fn vault_file_regex() -> &'static Regex {
    static VAULT_FILE: OnceLock<Regex> = OnceLock::new();
    // Greedy name: the user id never contains the delimiter, so the last one splits.
    VAULT_FILE.get_or_init(|| {
        Regex::new(r"^(?P<name>.+) - (?P<id>.+?)\.json(?P<gz>\.gz)?$").expect("vault file regex")
    })
}

/// Classifies a file name; temp files and foreign files yield `None`.
pub fn classify_file_name(name: &str) -> Option<StoreFile> {
    if name.starts_with(TEMP_FILE_PREFIX) {
        return None;
    }
    if let Some(raw_id) = name.strip_suffix(OVERFLOW_FILE_SUFFIX) {
        return UserId::new(raw_id)
            .ok()
            .map(|id| StoreFile::Overflow { id });
    }
    let captures = vault_file_regex().captures(name)?;
    let id = UserId::new(captures.name("id")?.as_str()).ok()?;
    Some(StoreFile::Vault {
        display_name: captures.name("name")?.as_str().to_owned(),
        id,
        compressed: captures.name("gz").is_some(),
    })
}

pub(crate) fn overflow_file_name(user: &UserId) -> String {
    format!("{user}{OVERFLOW_FILE_SUFFIX}")
}

pub(crate) fn gzip(bytes: &[u8]) -> io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(bytes.len() / 2), Compression::default());
    encoder.write_all(bytes)?;
    encoder.finish()
}

/// Fully decompresses `bytes`; any framing or checksum error is reported.
pub(crate) fn gunzip(bytes: &[u8]) -> io::Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(bytes);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}

pub(crate) fn remove_if_exists(path: &Path) -> Result<bool, StoreError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(source) => Err(StoreError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn rename_overwrite(from: &Path, to: &Path) -> io::Result<()> {
    #[cfg(windows)]
    {
        match fs::rename(from, to) {
            Ok(()) => Ok(()),
            Err(err)
                if matches!(
                    err.kind(),
                    io::ErrorKind::AlreadyExists | io::ErrorKind::PermissionDenied
                ) =>
            {
                let _ = fs::remove_file(to);
                fs::rename(from, to)
            }
            Err(err) => Err(err),
        }
    }

    #[cfg(not(windows))]
    {
        fs::rename(from, to)
    }
}

/// Writes `contents` to a temp file next to `path`, syncs it and renames it into place.
pub(crate) fn write_atomic(
    root: &Path,
    path: &Path,
    contents: &[u8],
    durability: WriteDurability,
) -> Result<(), StoreError> {
    fs::create_dir_all(root).map_err(|source| StoreError::Io {
        path: root.to_path_buf(),
        source,
    })?;

    match fs::symlink_metadata(path) {
        Ok(md) if md.file_type().is_symlink() => {
            return Err(StoreError::SymlinkRefused {
                path: path.to_path_buf(),
            });
        }
        Ok(_) => {}
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(source) => {
            return Err(StoreError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    }

    let (Some(parent), Some(file_name)) = (path.parent(), path.file_name()) else {
        return Err(StoreError::Io {
            path: path.to_path_buf(),
            source: io::Error::other("path has no parent or file name"),
        });
    };

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let tmp_name = format!("{TEMP_FILE_PREFIX}{}.{nanos}", file_name.to_string_lossy());
    let tmp_path = parent.join(tmp_name);

    let written = (|| {
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&tmp_path)?;
        file.write_all(contents)?;
        file.sync_all()?;
        Ok::<(), io::Error>(())
    })();
    if let Err(source) = written {
        let _ = fs::remove_file(&tmp_path);
        return Err(StoreError::Io {
            path: tmp_path,
            source,
        });
    }

    if let Err(source) = rename_overwrite(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(StoreError::Io {
            path: path.to_path_buf(),
            source,
        });
    }

    if durability == WriteDurability::Durable {
        #[cfg(unix)]
        {
            let dir = fs::File::open(parent).map_err(|source| StoreError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
            dir.sync_all().map_err(|source| StoreError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
    }

    Ok(())
}
