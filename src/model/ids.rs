// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Satchel-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Satchel and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;

use smol_str::SmolStr;

/// Delimiter between display name and user id in primary store file names.
pub(crate) const FILE_NAME_DELIMITER: &str = " - ";

/// Stable identity of a vault owner or viewer.
///
/// This is a plain value: every engine map is keyed by it, never by a live handle owned by
/// the caller. It does not enforce a UUID format; it only enforces that the value is safe to
/// embed in a file name (`<display name> - <user id>.json.gz`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserId {
    value: SmolStr,
}

impl UserId {
    pub fn new(value: impl AsRef<str>) -> Result<Self, IdError> {
        let value = value.as_ref();
        validate_file_segment(value)?;
        if value.contains(FILE_NAME_DELIMITER) {
            return Err(IdError::ContainsDelimiter);
        }
        Ok(Self {
            value: SmolStr::new(value),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

impl AsRef<str> for UserId {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl Borrow<str> for UserId {
    fn borrow(&self) -> &str {
        self.as_str()
    }
}

impl FromStr for UserId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for UserId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

/// A user id together with the human-readable name its files are stored under.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity {
    id: UserId,
    display_name: SmolStr,
}

impl Identity {
    pub fn new(id: UserId, display_name: impl AsRef<str>) -> Result<Self, IdError> {
        let display_name = display_name.as_ref();
        validate_file_segment(display_name)?;
        Ok(Self {
            id,
            display_name: SmolStr::new(display_name),
        })
    }

    pub fn id(&self) -> &UserId {
        &self.id
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdError {
    Empty,
    ContainsSeparator,
    ContainsControl,
    ContainsDelimiter,
}

impl fmt::Display for IdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("id must not be empty"),
            Self::ContainsSeparator => f.write_str("id must not contain '/' or '\\'"),
            Self::ContainsControl => f.write_str("id must not contain control characters"),
            Self::ContainsDelimiter => write!(
                f,
                "id must not contain the file name delimiter {FILE_NAME_DELIMITER:?}"
            ),
        }
    }
}

impl std::error::Error for IdError {}

fn validate_file_segment(value: &str) -> Result<(), IdError> {
    if value.trim().is_empty() {
        return Err(IdError::Empty);
    }
    if value.contains(['/', '\\']) {
        return Err(IdError::ContainsSeparator);
    }
    if value.chars().any(char::is_control) {
        return Err(IdError::ContainsControl);
    }
    Ok(())
}
