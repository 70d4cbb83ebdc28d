// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Satchel-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Satchel and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Paged personal item vaults.
//!
//! Every user owns a set of fixed-size pages whose count follows an external entitlement.
//! Items that no longer fit are parked in a per-user overflow buffer and come back once pages
//! are regained; admins can inspect another user's pages including that buffer. The
//! [`vault::Vault`] engine ties sessions, reconciliation and persistence together.

pub mod config;
pub mod entitlement;
pub mod model;
pub mod notify;
pub mod pages;
pub mod session;
pub mod store;
pub mod vault;

pub use config::VaultConfig;
pub use vault::{OpenError, OpenRequest, Vault, VaultError};
