// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Satchel-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Satchel and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use super::lanes::{self, Lanes};
use super::{OpenError, OpenRequest, ReloadReport, ShutdownReport, VaultError};
use crate::config::VaultConfig;
use crate::entitlement::EntitlementResolver;
use crate::model::{Identity, Item, Slot, UserId};
use crate::notify::{Notice, Notifier};
use crate::pages::{reconcile, OverflowAction, PageSet, PageView};
use crate::session::{Admission, Rejection, SessionManager, SessionPhase, ViewerRole};
use crate::store::{BackupReport, StoredPages, VaultFolder};

type Reply<T> = oneshot::Sender<T>;

pub(super) enum Command {
    Open {
        request: OpenRequest,
        reply: Reply<Result<PageView, OpenError>>,
    },
    Activate {
        viewer: UserId,
        slot: usize,
        edited: Option<Vec<Option<Item>>>,
        reply: Reply<Result<PageView, VaultError>>,
    },
    Capture {
        viewer: UserId,
        edited: Vec<Option<Item>>,
        reply: Reply<Result<PageView, VaultError>>,
    },
    View {
        viewer: UserId,
        reply: Reply<Result<PageView, VaultError>>,
    },
    Close {
        viewer: UserId,
        edited: Option<Vec<Option<Item>>>,
        reply: Reply<Result<(), VaultError>>,
    },
    Disconnect {
        viewer: UserId,
        reply: Reply<()>,
    },
    Reload {
        reply: Reply<ReloadReport>,
    },
    PageSet {
        target: UserId,
        reply: Reply<Option<PageSet>>,
    },
    Flush {
        reply: Reply<()>,
    },
    Shutdown {
        reply: Reply<ShutdownReport>,
    },
}

enum Event {
    Loaded {
        target: Identity,
        role: ViewerRole,
        allowed: usize,
        stored: StoredPages,
        /// Consumed overflow buffer; `None` when it was not read.
        overflow: Option<Vec<Item>>,
    },
    /// Every lane drained past the reload's saves and the folder was backed up.
    BackedUp {
        reload: u64,
        backup: Option<BackupReport>,
    },
    /// Overflow buffer consumed on the lane of an owner whose entitlement changed.
    OverflowTaken {
        reload: u64,
        target: UserId,
        allowed: usize,
        overflow: Option<Vec<Item>>,
    },
}

/// A loaded page set and what the engine knows about the target's overflow file.
struct Resident {
    identity: Identity,
    role: ViewerRole,
    page_set: PageSet,
    /// Consumed overflow items that are neither on pages nor on admin overflow pages.
    admin_pending: Vec<Item>,
    /// Whether the admin consumed the overflow file, so that closing may replace it.
    overflow_read: bool,
}

/// Everything one lane job writes for a user: pages first, then the overflow action.
struct Snapshot {
    identity: Identity,
    pages: StoredPages,
    overflow: OverflowAction,
}

impl Resident {
    fn admin_page_items(&self) -> Vec<Item> {
        self.page_set.pages()[self.page_set.entitled().min(self.page_set.len())..]
            .iter()
            .flat_map(|page| page.items().map(|(_, item)| item.clone()))
            .collect()
    }

    fn entitled_pages(&self) -> StoredPages {
        self.page_set.to_stored(0..self.page_set.entitled())
    }

    /// Takes over the overflow outcome of a reconciliation.
    ///
    /// Admins keep the owner's overflow file mirroring the admin overflow pages, so that a
    /// crash while viewing loses nothing.
    fn absorb(&mut self, overflow: OverflowAction) -> Snapshot {
        let overflow = match (self.role, overflow) {
            (ViewerRole::Admin, OverflowAction::Replace(rest)) => {
                let mut mirror = self.admin_page_items();
                mirror.extend(rest.iter().cloned());
                self.admin_pending = rest;
                self.overflow_read = true;
                OverflowAction::Replace(mirror)
            }
            (_, action) => action,
        };
        Snapshot {
            identity: self.identity.clone(),
            pages: self.entitled_pages(),
            overflow,
        }
    }

    /// Sends `items` to the overflow buffer while the session stays open.
    fn spill(&mut self, items: Vec<Item>) -> Snapshot {
        if self.role == ViewerRole::Admin && self.overflow_read {
            self.admin_pending.extend(items);
            return self.snapshot();
        }
        Snapshot {
            identity: self.identity.clone(),
            pages: self.entitled_pages(),
            overflow: OverflowAction::Append(items),
        }
    }

    /// What a reload writes for a page set that stays resident.
    fn snapshot(&self) -> Snapshot {
        let overflow = match self.role {
            ViewerRole::Admin if self.overflow_read => {
                let mut mirror = self.admin_page_items();
                mirror.extend(self.admin_pending.iter().cloned());
                OverflowAction::Replace(mirror)
            }
            _ => OverflowAction::Untouched,
        };
        Snapshot {
            identity: self.identity.clone(),
            pages: self.entitled_pages(),
            overflow,
        }
    }

    /// What closing writes. Admin closes cut the set back to `allowed` pages and return the rest
    /// to the overflow buffer.
    fn into_closing(self, allowed: usize) -> Snapshot {
        let Self {
            identity,
            role,
            page_set,
            mut admin_pending,
            overflow_read,
        } = self;
        match role {
            ViewerRole::Owner => Snapshot {
                identity,
                pages: page_set.to_stored(0..page_set.len()),
                overflow: OverflowAction::Untouched,
            },
            ViewerRole::Admin => {
                let keep = allowed.min(page_set.len());
                let mut collected = page_set.pages()[keep..]
                    .iter()
                    .flat_map(|page| page.items().map(|(_, item)| item.clone()))
                    .collect::<Vec<_>>();
                let overflow = if overflow_read {
                    collected.append(&mut admin_pending);
                    OverflowAction::Replace(collected)
                } else {
                    OverflowAction::Append(collected)
                };
                Snapshot {
                    identity,
                    pages: page_set.to_stored(0..keep),
                    overflow,
                }
            }
        }
    }
}

/// A reload waiting for its backup and for the overflow reads it started.
struct PendingReload {
    reply: Reply<ReloadReport>,
    report: ReloadReport,
    backed_up: bool,
    waiting: HashSet<UserId>,
}

struct Stopping {
    reply: Option<Reply<ShutdownReport>>,
    closed: usize,
}

/// Spawns the authority task and returns its command queue.
pub(super) fn spawn(
    config: VaultConfig,
    entitlements: Arc<dyn EntitlementResolver>,
    notifier: Arc<dyn Notifier>,
) -> mpsc::UnboundedSender<Command> {
    let (commands, command_queue) = mpsc::unbounded_channel();
    let (events, event_queue) = mpsc::unbounded_channel();
    let authority = Authority {
        folder: config.folder(),
        config,
        entitlements,
        notifier,
        sessions: SessionManager::new(),
        resident: HashMap::new(),
        pending_opens: HashMap::new(),
        loads_in_flight: HashSet::new(),
        returned_overflow: HashMap::new(),
        reloads: HashMap::new(),
        next_reload: 0,
        lanes: Lanes::default(),
        events,
        stopping: None,
    };
    tokio::spawn(authority.run(command_queue, event_queue));
    commands
}

/// Sole owner of sessions and resident page sets. It never waits on file I/O itself.
struct Authority {
    config: VaultConfig,
    folder: VaultFolder,
    entitlements: Arc<dyn EntitlementResolver>,
    notifier: Arc<dyn Notifier>,
    sessions: SessionManager,
    /// Keyed by target.
    resident: HashMap<UserId, Resident>,
    pending_opens: HashMap<UserId, Reply<Result<PageView, OpenError>>>,
    /// Targets with a load job that has not reported back yet.
    loads_in_flight: HashSet<UserId>,
    /// Overflow items taken by a reload for a session that closed; merged into the next load.
    returned_overflow: HashMap<UserId, Vec<Item>>,
    reloads: HashMap<u64, PendingReload>,
    next_reload: u64,
    lanes: Lanes,
    events: mpsc::UnboundedSender<Event>,
    stopping: Option<Stopping>,
}

impl Authority {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut events: mpsc::UnboundedReceiver<Event>,
    ) {
        tracing::info!(data_dir = ?self.config.data_dir(), "vault engine started");
        let mut commands_open = true;
        loop {
            tokio::select! {
                // Finished I/O is applied before any later command.
                biased;
                Some(event) = events.recv() => self.on_event(event),
                command = commands.recv(), if commands_open => match command {
                    Some(command) => self.handle(command),
                    None => {
                        commands_open = false;
                        if self.stopping.is_none() {
                            self.begin_shutdown(None);
                        }
                    }
                },
            }

            if self.loads_in_flight.is_empty() && self.reloads.is_empty() {
                if let Some(stopping) = self.stopping.take() {
                    self.finish_shutdown(stopping).await;
                    break;
                }
            }
        }
        tracing::info!("vault engine stopped");
    }

    fn handle(&mut self, command: Command) {
        if self.stopping.is_some() {
            // Dropping the reply reports `EngineStopped` to the caller.
            return;
        }
        match command {
            Command::Open { request, reply } => self.open(request, reply),
            Command::Activate {
                viewer,
                slot,
                edited,
                reply,
            } => {
                let _ = reply.send(self.activate(&viewer, slot, edited));
            }
            Command::Capture {
                viewer,
                edited,
                reply,
            } => {
                let _ = reply.send(self.capture(&viewer, edited));
            }
            Command::View { viewer, reply } => {
                let view = self
                    .open_session(&viewer)
                    .and_then(|_| self.current_view(&viewer));
                let _ = reply.send(view);
            }
            Command::Close {
                viewer,
                edited,
                reply,
            } => {
                let _ = reply.send(self.close(&viewer, edited));
            }
            Command::Disconnect { viewer, reply } => {
                if self.release(&viewer) {
                    tracing::debug!(viewer = %viewer, "viewer disconnected");
                }
                let _ = reply.send(());
            }
            Command::Reload { reply } => self.reload(reply),
            Command::PageSet { target, reply } => {
                let page_set = self
                    .resident
                    .get(&target)
                    .map(|resident| resident.page_set.clone());
                let _ = reply.send(page_set);
            }
            Command::Flush { reply } => {
                let barriers = self.lanes.barriers();
                tokio::spawn(async move {
                    lanes::drain(barriers).await;
                    let _ = reply.send(());
                });
            }
            Command::Shutdown { reply } => self.begin_shutdown(Some(reply)),
        }
    }

    fn open(&mut self, request: OpenRequest, reply: Reply<Result<PageView, OpenError>>) {
        let target = request.target().clone();
        let user = target.id().clone();
        let viewer = request.viewer().clone();
        let role = request.role();

        let rejection = if !self.entitlements.has_entitlement(&user) {
            Some(match role {
                ViewerRole::Owner => Rejection::NoEntitlement,
                ViewerRole::Admin => Rejection::TargetHasNoEntitlement,
            })
        } else if self.loads_in_flight.contains(&user) && self.sessions.session(&user).is_none() {
            // A closed session's load is still being written back.
            Some(Rejection::StillLoading)
        } else {
            None
        };
        let admission = match rejection {
            Some(rejection) => Err(rejection),
            None => self.sessions.try_open(&viewer, &target, role),
        };

        match admission {
            Err(rejection) => {
                tracing::debug!(viewer = %viewer, target = %user, %rejection, "open rejected");
                let _ = reply.send(Err(OpenError::Rejected(rejection)));
            }
            Ok(Admission::Reopened) => {
                let view = self.current_view(&viewer).map_err(|_| OpenError::Cancelled);
                let _ = reply.send(view);
            }
            Ok(Admission::Fresh) => {
                let allowed = self.entitlements.pages_allowed(&user);
                tracing::debug!(viewer = %viewer, target = %user, ?role, allowed, "loading vault");
                self.pending_opens.insert(user.clone(), reply);
                self.loads_in_flight.insert(user.clone());
                self.queue_load(target, role, allowed);
            }
        }
    }

    fn queue_load(&mut self, target: Identity, role: ViewerRole, allowed: usize) {
        let folder = self.folder.clone();
        let events = self.events.clone();
        let user = target.id().clone();
        self.lanes.submit(&user, move || {
            let stored = folder.load(&target);
            let overflow = if role == ViewerRole::Admin || stored.page_count() != allowed {
                take_overflow(&folder, target.id())
            } else {
                None
            };
            let _ = events.send(Event::Loaded {
                target,
                role,
                allowed,
                stored,
                overflow,
            });
        });
    }

    fn on_event(&mut self, event: Event) {
        match event {
            Event::Loaded {
                target,
                role,
                allowed,
                stored,
                overflow,
            } => self.loaded(target, role, allowed, stored, overflow),
            Event::BackedUp { reload, backup } => self.backed_up(reload, backup),
            Event::OverflowTaken {
                reload,
                target,
                allowed,
                overflow,
            } => self.overflow_taken(reload, target, allowed, overflow),
        }
    }

    fn loaded(
        &mut self,
        target: Identity,
        role: ViewerRole,
        allowed: usize,
        stored: StoredPages,
        overflow: Option<Vec<Item>>,
    ) {
        let user = target.id().clone();
        self.loads_in_flight.remove(&user);

        // Items a reload took out of the file before this load ran.
        let returned = self.returned_overflow.remove(&user).unwrap_or_default();
        let (overflow, late) = match overflow {
            Some(mut items) => {
                items.extend(returned);
                (Some(items), Vec::new())
            }
            None => (None, returned),
        };

        let mut page_set = PageSet::from_stored(self.config.layout(), stored);
        let limit = self.config.cascade_page_limit();
        let outcome = reconcile(&mut page_set, allowed, role, overflow, limit);
        tracing::info!(
            user = %user,
            ?role,
            pages = page_set.len(),
            items = page_set.item_count(),
            moved_to_overflow = outcome.moved_to_overflow,
            recovered = outcome.recovered,
            cascaded = outcome.cascaded,
            "vault loaded"
        );
        self.notify(&user, outcome.notices);

        let mut resident = Resident {
            identity: target,
            role,
            page_set,
            admin_pending: Vec::new(),
            overflow_read: false,
        };
        let snapshot = resident.absorb(outcome.overflow);
        self.write(snapshot);

        let reply = self.pending_opens.remove(&user);
        let loading = self
            .sessions
            .session(&user)
            .is_some_and(|session| session.phase() == SessionPhase::Loading);
        if !loading {
            tracing::info!(user = %user, "session closed while loading; saving loaded vault");
            self.save_closed(resident);
            self.return_overflow(&user, late);
            self.prune_lanes();
            return;
        }

        self.sessions.mark_open(&user);
        self.resident.insert(user.clone(), resident);
        self.return_overflow(&user, late);
        let view = self
            .sessions
            .session(&user)
            .map(|session| session.viewer().clone())
            .ok_or(VaultError::NoSession)
            .and_then(|viewer| self.current_view(&viewer));
        if let Some(reply) = reply {
            let _ = reply.send(view.map_err(|_| OpenError::Cancelled));
        }
    }

    fn activate(
        &mut self,
        viewer: &UserId,
        slot: usize,
        edited: Option<Vec<Option<Item>>>,
    ) -> Result<PageView, VaultError> {
        let (target, page_index) = self.open_session(viewer)?;
        if let Some(edited) = edited {
            self.apply_capture(&target, page_index, edited)?;
        }

        let resident = self.resident.get(&target).ok_or(VaultError::NoSession)?;
        let page = resident.page_set.page(page_index);
        let boundary = match page.and_then(|page| page.slot(slot)) {
            Some(Slot::Marker(boundary)) => Some(*boundary),
            _ => None,
        };
        if let Some(boundary) = boundary {
            let len = resident.page_set.len();
            let allowed_max = match resident.role {
                ViewerRole::Admin => len,
                ViewerRole::Owner => self.entitlements.pages_allowed(&target).min(len),
            };
            let navigation = self.sessions.navigate(viewer, boundary, allowed_max);
            tracing::trace!(viewer = %viewer, ?boundary, ?navigation, "navigation");
        }
        self.current_view(viewer)
    }

    fn capture(
        &mut self,
        viewer: &UserId,
        edited: Vec<Option<Item>>,
    ) -> Result<PageView, VaultError> {
        let (target, page_index) = self.open_session(viewer)?;
        self.apply_capture(&target, page_index, edited)?;
        self.current_view(viewer)
    }

    /// Stores what the UI shows for page `page_index` of `target`.
    ///
    /// Items the UI left on a navigation slot are moved off it; those with no room left go to
    /// the overflow buffer right away.
    fn apply_capture(
        &mut self,
        target: &UserId,
        page_index: usize,
        edited: Vec<Option<Item>>,
    ) -> Result<(), VaultError> {
        let limit = self.config.cascade_page_limit();
        let resident = self.resident.get_mut(target).ok_or(VaultError::NoSession)?;
        let overflowed = resident.page_set.capture(page_index, edited, limit)?;
        if overflowed.is_empty() {
            return Ok(());
        }

        let count = overflowed.len();
        let snapshot = resident.spill(overflowed);
        tracing::info!(user = %target, count, "captured items moved to overflow");
        self.write(snapshot);
        self.notify(target, vec![Notice::ItemOverflowed; count]);
        Ok(())
    }

    fn close(
        &mut self,
        viewer: &UserId,
        edited: Option<Vec<Option<Item>>>,
    ) -> Result<(), VaultError> {
        let session = self
            .sessions
            .session_of(viewer)
            .ok_or(VaultError::NoSession)?;
        let target = session.target().id().clone();
        let page_index = session.page_index();
        if let Some(edited) = edited.filter(|_| self.resident.contains_key(&target)) {
            self.apply_capture(&target, page_index, edited)?;
        }
        self.release(viewer);
        Ok(())
    }

    /// Ends the session of `viewer` and writes back its page set; false if there was none.
    fn release(&mut self, viewer: &UserId) -> bool {
        let Some(session) = self.sessions.close(viewer) else {
            return false;
        };
        let target = session.target().id().clone();
        if let Some(reply) = self.pending_opens.remove(&target) {
            let _ = reply.send(Err(OpenError::Cancelled));
        }
        if let Some(resident) = self.resident.remove(&target) {
            self.save_closed(resident);
        }
        tracing::info!(viewer = %viewer, target = %target, role = ?session.role(), "vault closed");
        self.prune_lanes();
        true
    }

    fn save_closed(&mut self, resident: Resident) {
        let allowed = match resident.role {
            ViewerRole::Admin => self.entitlements.pages_allowed(resident.identity.id()),
            ViewerRole::Owner => resident.page_set.len(),
        };
        self.write(resident.into_closing(allowed));
    }

    /// Saves resident page sets and backs up the folder off the authority task. Open sessions
    /// are reconciled once the backup reports back in [`Self::backed_up`].
    fn reload(&mut self, reply: Reply<ReloadReport>) {
        let reload = self.next_reload;
        self.next_reload += 1;

        let snapshots = self
            .resident
            .values()
            .map(Resident::snapshot)
            .collect::<Vec<_>>();
        let saved = snapshots.len();
        for snapshot in snapshots {
            self.write(snapshot);
        }

        let barriers = self.lanes.barriers();
        let folder = self.folder.clone();
        let backup_dir = self.config.backup_dir();
        let events = self.events.clone();
        tokio::spawn(async move {
            lanes::drain(barriers).await;
            let backup = run_backup(folder, backup_dir).await;
            let _ = events.send(Event::BackedUp { reload, backup });
        });

        self.reloads.insert(
            reload,
            PendingReload {
                reply,
                report: ReloadReport {
                    saved,
                    ..ReloadReport::default()
                },
                backed_up: false,
                waiting: HashSet::new(),
            },
        );
        tracing::debug!(reload, saved, "vault reload started");
    }

    fn backed_up(&mut self, reload: u64, backup: Option<BackupReport>) {
        let open = self
            .sessions
            .sessions()
            .filter(|session| session.phase() == SessionPhase::Open)
            .map(|session| session.target().id().clone())
            .collect::<Vec<_>>();
        let mut reconciled = 0;
        for target in &open {
            if self.begin_reconcile(reload, target) {
                reconciled += 1;
            }
        }

        if let Some(pending) = self.reloads.get_mut(&reload) {
            pending.report.backup = backup;
            pending.report.reconciled += reconciled;
            pending.backed_up = true;
        }
        self.finish_reload(reload);
    }

    /// Reconciles a resident page set against a freshly resolved entitlement; false when it has
    /// to wait for its overflow buffer first.
    fn begin_reconcile(&mut self, reload: u64, target: &UserId) -> bool {
        let allowed = self.entitlements.pages_allowed(target);
        let Some(resident) = self.resident.get_mut(target) else {
            return false;
        };
        if resident.role == ViewerRole::Owner && allowed != resident.page_set.entitled() {
            self.queue_overflow_take(reload, target, allowed);
            return false;
        }
        let existing = match resident.role {
            ViewerRole::Admin if resident.overflow_read => {
                Some(std::mem::take(&mut resident.admin_pending))
            }
            _ => None,
        };
        self.reconcile_resident(target, allowed, existing, false)
    }

    fn queue_overflow_take(&mut self, reload: u64, target: &UserId, allowed: usize) {
        let folder = self.folder.clone();
        let events = self.events.clone();
        let user = target.clone();
        self.lanes.submit(target, move || {
            let overflow = take_overflow(&folder, &user);
            let _ = events.send(Event::OverflowTaken {
                reload,
                target: user,
                allowed,
                overflow,
            });
        });
        if let Some(pending) = self.reloads.get_mut(&reload) {
            pending.waiting.insert(target.clone());
        }
    }

    fn overflow_taken(
        &mut self,
        reload: u64,
        target: UserId,
        allowed: usize,
        overflow: Option<Vec<Item>>,
    ) {
        let owner = self
            .resident
            .get(&target)
            .is_some_and(|resident| resident.role == ViewerRole::Owner);
        let reconciled = if owner {
            self.reconcile_resident(&target, allowed, overflow, true)
        } else {
            self.return_overflow(&target, overflow.unwrap_or_default());
            false
        };

        if let Some(pending) = self.reloads.get_mut(&reload) {
            pending.waiting.remove(&target);
            if reconciled {
                pending.report.reconciled += 1;
            }
        }
        self.finish_reload(reload);
    }

    /// Applies `allowed` to the resident page set of `target` and writes the outcome.
    ///
    /// `taken_earlier` marks a buffer consumed on the lane while the session kept running; the
    /// file may have gained items since, so leftovers are appended instead of replacing it.
    fn reconcile_resident(
        &mut self,
        target: &UserId,
        allowed: usize,
        existing: Option<Vec<Item>>,
        taken_earlier: bool,
    ) -> bool {
        let limit = self.config.cascade_page_limit();
        let Some(resident) = self.resident.get_mut(target) else {
            return false;
        };
        let entitled = resident.page_set.entitled();
        let role = resident.role;
        let outcome = reconcile(&mut resident.page_set, allowed, role, existing, limit);
        let overflow = match outcome.overflow {
            OverflowAction::Replace(rest) if taken_earlier => OverflowAction::Append(rest),
            action => action,
        };
        let len = resident.page_set.len();
        let snapshot = resident.absorb(overflow);
        tracing::debug!(
            user = %target,
            from = entitled,
            to = allowed,
            pages = len,
            "vault reconciled"
        );

        self.write(snapshot);
        self.sessions.clamp_page_index(target, len);
        self.notify(target, outcome.notices);
        true
    }

    fn finish_reload(&mut self, reload: u64) {
        let done = self
            .reloads
            .get(&reload)
            .is_some_and(|pending| pending.backed_up && pending.waiting.is_empty());
        if !done {
            return;
        }
        let Some(pending) = self.reloads.remove(&reload) else {
            return;
        };
        let report = pending.report;
        tracing::info!(
            reload,
            saved = report.saved,
            reconciled = report.reconciled,
            backup_clean = report.backup.as_ref().is_some_and(BackupReport::is_clean),
            "vault reload finished"
        );
        let _ = pending.reply.send(report);
    }

    /// Puts consumed overflow items back when the session they were taken for is gone.
    fn return_overflow(&mut self, target: &UserId, items: Vec<Item>) {
        if items.is_empty() {
            return;
        }
        if let Some(resident) = self.resident.get_mut(target) {
            let snapshot = resident.spill(items);
            self.write(snapshot);
        } else if self.loads_in_flight.contains(target) {
            // That load is queued behind the take; it gets the items when it reports back.
            self.returned_overflow
                .entry(target.clone())
                .or_default()
                .extend(items);
        } else {
            let folder = self.folder.clone();
            let user = target.clone();
            self.lanes.submit(target, move || {
                if let Err(err) = folder.overflow().append(&user, &items) {
                    tracing::error!(
                        user = %user,
                        error = %err,
                        items = items.len(),
                        "overflow write failed"
                    );
                }
            });
        }
    }

    fn begin_shutdown(&mut self, reply: Option<Reply<ShutdownReport>>) {
        let viewers = self
            .sessions
            .sessions()
            .map(|session| session.viewer().clone())
            .collect::<Vec<_>>();
        let closed = viewers.iter().filter(|viewer| self.release(viewer)).count();
        tracing::info!(
            closed,
            loads_in_flight = self.loads_in_flight.len(),
            reloads = self.reloads.len(),
            "vault engine stopping"
        );
        self.stopping = Some(Stopping { reply, closed });
    }

    async fn finish_shutdown(&mut self, stopping: Stopping) {
        lanes::drain(self.lanes.barriers()).await;
        let backup = run_backup(self.folder.clone(), self.config.backup_dir()).await;
        if let Some(reply) = stopping.reply {
            let _ = reply.send(ShutdownReport {
                closed: stopping.closed,
                backup,
            });
        }
    }

    /// (target, page index) of the open session held by `viewer`.
    fn open_session(&self, viewer: &UserId) -> Result<(UserId, usize), VaultError> {
        let session = self
            .sessions
            .session_of(viewer)
            .ok_or(VaultError::NoSession)?;
        if session.phase() == SessionPhase::Loading {
            return Err(VaultError::StillLoading);
        }
        Ok((session.target().id().clone(), session.page_index()))
    }

    fn current_view(&self, viewer: &UserId) -> Result<PageView, VaultError> {
        let session = self
            .sessions
            .session_of(viewer)
            .ok_or(VaultError::NoSession)?;
        self.resident
            .get(session.target().id())
            .and_then(|resident| resident.page_set.view(session.page_index()))
            .ok_or(VaultError::NoSession)
    }

    fn write(&mut self, snapshot: Snapshot) {
        let Snapshot {
            identity,
            pages,
            overflow,
        } = snapshot;
        let folder = self.folder.clone();
        let user = identity.id().clone();
        self.lanes.submit(&user, move || {
            if let Err(err) = folder.save(&identity, &pages) {
                tracing::error!(user = %identity.id(), error = %err, "vault save failed");
            }
            let store = folder.overflow();
            let result = match &overflow {
                OverflowAction::Untouched => Ok(()),
                OverflowAction::Replace(items) => store.replace(identity.id(), items),
                OverflowAction::Append(items) => store.append(identity.id(), items),
            };
            if let Err(err) = result {
                tracing::error!(
                    user = %identity.id(),
                    error = %err,
                    items = overflow.items().len(),
                    "overflow write failed"
                );
            }
        });
    }

    fn notify(&self, user: &UserId, notices: Vec<Notice>) {
        for notice in notices {
            self.notifier.notify(user, notice);
        }
    }

    fn prune_lanes(&mut self) {
        let resident = &self.resident;
        let loading = &self.loads_in_flight;
        self.lanes
            .prune(|user| resident.contains_key(user) || loading.contains(user));
        tracing::trace!(lanes = self.lanes.len(), "i/o lanes pruned");
    }
}

/// Consumes the overflow buffer of `user`; `None` when it could not be read.
fn take_overflow(folder: &VaultFolder, user: &UserId) -> Option<Vec<Item>> {
    match folder.overflow().load(user) {
        Ok(items) => Some(items),
        Err(err) => {
            tracing::warn!(user = %user, error = %err, "overflow left unread");
            None
        }
    }
}

async fn run_backup(folder: VaultFolder, backup_dir: PathBuf) -> Option<BackupReport> {
    match tokio::task::spawn_blocking(move || folder.backup(&backup_dir)).await {
        Ok(Ok(report)) => Some(report),
        Ok(Err(err)) => {
            tracing::error!(error = %err, "vault backup failed");
            None
        }
        Err(err) => {
            tracing::error!(error = %err, "vault backup task failed");
            None
        }
    }
}
