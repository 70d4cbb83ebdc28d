// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Satchel-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Satchel and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Session admission and navigation state.
//!
//! At most one session exists per target. A viewer holds at most one session at a time, and an
//! admin viewing a target excludes the target's own session. Nothing here performs I/O.

use std::collections::HashMap;
use std::fmt;

use crate::model::{Boundary, Identity, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewerRole {
    Owner,
    Admin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Admitted; pages are still being loaded.
    Loading,
    Open,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    viewer: UserId,
    target: Identity,
    role: ViewerRole,
    phase: SessionPhase,
    page_index: usize,
}

impl Session {
    pub fn viewer(&self) -> &UserId {
        &self.viewer
    }

    pub fn target(&self) -> &Identity {
        &self.target
    }

    pub fn role(&self) -> ViewerRole {
        self.role
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn page_index(&self) -> usize {
        self.page_index
    }
}

/// Outcome of a successful admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// New session in the loading phase; pages must be loaded.
    Fresh,
    /// The viewer's open session was reset to page 0.
    Reopened,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Someone else holds a session on the target.
    TargetInUse,
    /// The viewer's own session on the target is still loading.
    StillLoading,
    /// The viewer already views another target.
    ViewerBusy,
    /// The owner is not entitled to any pages.
    NoEntitlement,
    /// The admin's target is not entitled to any pages.
    TargetHasNoEntitlement,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TargetInUse => f.write_str("vault is in use by another viewer"),
            Self::StillLoading => f.write_str("vault is still loading"),
            Self::ViewerBusy => f.write_str("viewer already has another vault open"),
            Self::NoEntitlement => f.write_str("no vault pages available"),
            Self::TargetHasNoEntitlement => f.write_str("target has no vault pages"),
        }
    }
}

impl std::error::Error for Rejection {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
    Moved { from: usize, to: usize },
    Ignored,
}

#[derive(Debug, Default)]
pub struct SessionManager {
    /// Keyed by target.
    sessions: HashMap<UserId, Session>,
    /// Viewer → target, for every admitted viewer.
    viewing: HashMap<UserId, UserId>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn try_open(
        &mut self,
        viewer: &UserId,
        target: &Identity,
        role: ViewerRole,
    ) -> Result<Admission, Rejection> {
        if let Some(session) = self.sessions.get_mut(target.id()) {
            if &session.viewer != viewer {
                return Err(Rejection::TargetInUse);
            }
            if session.phase == SessionPhase::Loading {
                return Err(Rejection::StillLoading);
            }
            session.page_index = 0;
            return Ok(Admission::Reopened);
        }
        if self.viewing.contains_key(viewer) {
            return Err(Rejection::ViewerBusy);
        }

        self.sessions.insert(
            target.id().clone(),
            Session {
                viewer: viewer.clone(),
                target: target.clone(),
                role,
                phase: SessionPhase::Loading,
                page_index: 0,
            },
        );
        self.viewing.insert(viewer.clone(), target.id().clone());
        Ok(Admission::Fresh)
    }

    /// Moves the session on `target` to the open phase; false if there is none.
    pub fn mark_open(&mut self, target: &UserId) -> bool {
        match self.sessions.get_mut(target) {
            Some(session) => {
                session.phase = SessionPhase::Open;
                true
            }
            None => false,
        }
    }

    /// Releases the session held by `viewer`.
    pub fn close(&mut self, viewer: &UserId) -> Option<Session> {
        let target = self.viewing.remove(viewer)?;
        self.sessions.remove(&target)
    }

    pub fn navigate(
        &mut self,
        viewer: &UserId,
        boundary: Boundary,
        allowed_max: usize,
    ) -> Navigation {
        let Some(session) = self.session_of_mut(viewer) else {
            return Navigation::Ignored;
        };
        if session.phase != SessionPhase::Open {
            return Navigation::Ignored;
        }
        let from = session.page_index;
        let to = match boundary {
            Boundary::Prev if from > 0 => from - 1,
            Boundary::Next if from + 1 < allowed_max => from + 1,
            _ => return Navigation::Ignored,
        };
        session.page_index = to;
        Navigation::Moved { from, to }
    }

    /// Keeps the page index of `target` below `len`, e.g. after its page set shrank.
    pub fn clamp_page_index(&mut self, target: &UserId, len: usize) {
        if let Some(session) = self.sessions.get_mut(target) {
            session.page_index = session.page_index.min(len.saturating_sub(1));
        }
    }

    pub fn session(&self, target: &UserId) -> Option<&Session> {
        self.sessions.get(target)
    }

    pub fn session_of(&self, viewer: &UserId) -> Option<&Session> {
        self.sessions.get(self.viewing.get(viewer)?)
    }

    fn session_of_mut(&mut self, viewer: &UserId) -> Option<&mut Session> {
        let target = self.viewing.get(viewer)?;
        self.sessions.get_mut(target)
    }

    /// Target currently viewed by `admin` in admin mode.
    pub fn admin_target(&self, admin: &UserId) -> Option<&UserId> {
        self.session_of(admin)
            .filter(|session| session.role == ViewerRole::Admin)
            .map(|session| session.target.id())
    }

    pub fn sessions(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
