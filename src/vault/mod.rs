// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Satchel-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Satchel and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! The vault engine.
//!
//! [`Vault`] is a cloneable handle to a single mutation-authority task that owns every session
//! and resident page set. Loads and saves run on per-user I/O lanes; their results come back
//! to the authority as events, so in-memory state is only ever touched by one task.

mod authority;
mod lanes;

use std::fmt;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use crate::config::VaultConfig;
use crate::entitlement::EntitlementResolver;
use crate::model::{Identity, Item, UserId};
use crate::notify::Notifier;
use crate::pages::{CaptureError, PageSet, PageView};
use crate::session::{Rejection, ViewerRole};
use crate::store::BackupReport;

use authority::Command;

/// Who wants to look at whose vault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenRequest {
    viewer: UserId,
    target: Identity,
    role: ViewerRole,
}

impl OpenRequest {
    pub fn owner(identity: Identity) -> Self {
        Self {
            viewer: identity.id().clone(),
            target: identity,
            role: ViewerRole::Owner,
        }
    }

    pub fn admin(viewer: UserId, target: Identity) -> Self {
        Self {
            viewer,
            target,
            role: ViewerRole::Admin,
        }
    }

    pub fn viewer(&self) -> &UserId {
        &self.viewer
    }

    pub fn target(&self) -> &Identity {
        &self.target
    }

    pub fn role(&self) -> ViewerRole {
        self.role
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenError {
    Rejected(Rejection),
    /// The session was closed before its pages finished loading.
    Cancelled,
    EngineStopped,
}

impl fmt::Display for OpenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rejected(rejection) => write!(f, "open rejected: {rejection}"),
            Self::Cancelled => f.write_str("session closed while loading"),
            Self::EngineStopped => f.write_str("vault engine stopped"),
        }
    }
}

impl std::error::Error for OpenError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Rejected(rejection) => Some(rejection),
            Self::Cancelled | Self::EngineStopped => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VaultError {
    NoSession,
    StillLoading,
    InvalidPage(CaptureError),
    EngineStopped,
}

impl fmt::Display for VaultError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoSession => f.write_str("viewer has no open vault"),
            Self::StillLoading => f.write_str("vault is still loading"),
            Self::InvalidPage(source) => write!(f, "invalid page contents: {source}"),
            Self::EngineStopped => f.write_str("vault engine stopped"),
        }
    }
}

impl std::error::Error for VaultError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::InvalidPage(source) => Some(source),
            _ => None,
        }
    }
}

impl From<CaptureError> for VaultError {
    fn from(source: CaptureError) -> Self {
        Self::InvalidPage(source)
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReloadReport {
    /// Resident page sets queued for saving before the backup.
    pub saved: usize,
    /// Open sessions reconciled against fresh entitlements.
    pub reconciled: usize,
    pub backup: Option<BackupReport>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Sessions closed and saved by the shutdown.
    pub closed: usize,
    pub backup: Option<BackupReport>,
}

/// Handle to a running vault engine.
#[derive(Debug, Clone)]
pub struct Vault {
    commands: mpsc::UnboundedSender<Command>,
}

impl Vault {
    /// Spawns the engine on the current tokio runtime.
    pub fn start(
        config: VaultConfig,
        entitlements: Arc<dyn EntitlementResolver>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            commands: authority::spawn(config, entitlements, notifier),
        }
    }

    async fn request<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> Command) -> Option<T> {
        let (reply, response) = oneshot::channel();
        self.commands.send(command(reply)).ok()?;
        response.await.ok()
    }

    /// Admits the request and resolves with page 0 once the pages are loaded and reconciled.
    pub async fn open(&self, request: OpenRequest) -> Result<PageView, OpenError> {
        self.request(|reply| Command::Open { request, reply })
            .await
            .unwrap_or(Err(OpenError::EngineStopped))
    }

    /// Handles a click on `slot` of the page `viewer` is looking at.
    ///
    /// `edited` carries the page contents as the UI shows them; they are captured first.
    /// Clicks on anything but a navigation marker leave the page index unchanged.
    pub async fn activate(
        &self,
        viewer: &UserId,
        slot: usize,
        edited: Option<Vec<Option<Item>>>,
    ) -> Result<PageView, VaultError> {
        let viewer = viewer.clone();
        self.request(|reply| Command::Activate {
            viewer,
            slot,
            edited,
            reply,
        })
        .await
        .unwrap_or(Err(VaultError::EngineStopped))
    }

    /// Stores edits of the current page without navigating.
    pub async fn capture(
        &self,
        viewer: &UserId,
        edited: Vec<Option<Item>>,
    ) -> Result<PageView, VaultError> {
        let viewer = viewer.clone();
        self.request(|reply| Command::Capture {
            viewer,
            edited,
            reply,
        })
        .await
        .unwrap_or(Err(VaultError::EngineStopped))
    }

    /// Current page of `viewer`.
    pub async fn view(&self, viewer: &UserId) -> Result<PageView, VaultError> {
        let viewer = viewer.clone();
        self.request(|reply| Command::View { viewer, reply })
            .await
            .unwrap_or(Err(VaultError::EngineStopped))
    }

    /// Captures `edited`, saves and releases the session of `viewer`.
    pub async fn close(
        &self,
        viewer: &UserId,
        edited: Option<Vec<Option<Item>>>,
    ) -> Result<(), VaultError> {
        let viewer = viewer.clone();
        self.request(|reply| Command::Close {
            viewer,
            edited,
            reply,
        })
        .await
        .unwrap_or(Err(VaultError::EngineStopped))
    }

    /// Closes whatever `viewer` has open, without edits. Never fails.
    pub async fn disconnect(&self, viewer: &UserId) {
        let viewer = viewer.clone();
        self.request(|reply| Command::Disconnect { viewer, reply })
            .await;
    }

    /// Saves resident pages, backs up the folder and reconciles open sessions again.
    pub async fn reload(&self) -> Result<ReloadReport, VaultError> {
        self.request(|reply| Command::Reload { reply })
            .await
            .ok_or(VaultError::EngineStopped)
    }

    /// Snapshot of the resident page set of `target`.
    pub async fn page_set(&self, target: &UserId) -> Option<PageSet> {
        let target = target.clone();
        self.request(|reply| Command::PageSet { target, reply })
            .await
            .flatten()
    }

    /// Resolves once every I/O job queued so far has completed.
    pub async fn flush(&self) -> Result<(), VaultError> {
        self.request(|reply| Command::Flush { reply })
            .await
            .ok_or(VaultError::EngineStopped)
    }

    /// Closes every session, waits for pending I/O, backs up and stops the engine.
    pub async fn shutdown(&self) -> Result<ShutdownReport, VaultError> {
        self.request(|reply| Command::Shutdown { reply })
            .await
            .ok_or(VaultError::EngineStopped)
    }
}
