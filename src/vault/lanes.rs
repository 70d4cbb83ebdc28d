// SPDX-FileCopyrightText: 2026 Bruno Meilick
// SPDX-License-Identifier: LicenseRef-Satchel-FreeUse-NoCopy-NoDerivatives
//
// All rights reserved.
//
// This file is part of Satchel and is proprietary software.
// Unauthorized copying, modification, or distribution is prohibited.

//! Per-user I/O lanes.
//!
//! Each lane is a tokio task running its user's blocking jobs one after another on the blocking
//! pool. Jobs of one user are totally ordered; different users run independently.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use crate::model::UserId;

type Job = Box<dyn FnOnce() + Send + 'static>;

#[derive(Debug)]
struct Lane {
    jobs: mpsc::UnboundedSender<Job>,
    in_flight: Arc<AtomicUsize>,
}

impl Lane {
    fn spawn(user: UserId) -> Self {
        let (jobs, mut queue) = mpsc::unbounded_channel::<Job>();
        let in_flight = Arc::new(AtomicUsize::new(0));
        let counter = in_flight.clone();
        tokio::spawn(async move {
            while let Some(job) = queue.recv().await {
                if let Err(err) = tokio::task::spawn_blocking(job).await {
                    tracing::error!(user = %user, error = %err, "vault i/o job failed");
                }
                counter.fetch_sub(1, Ordering::AcqRel);
            }
            tracing::trace!(user = %user, "i/o lane closed");
        });
        Self { jobs, in_flight }
    }
}

#[derive(Debug, Default)]
pub(crate) struct Lanes {
    lanes: HashMap<UserId, Lane>,
}

impl Lanes {
    pub(crate) fn submit(&mut self, user: &UserId, job: impl FnOnce() + Send + 'static) {
        let lane = self
            .lanes
            .entry(user.clone())
            .or_insert_with(|| Lane::spawn(user.clone()));
        lane.in_flight.fetch_add(1, Ordering::AcqRel);
        if lane.jobs.send(Box::new(job)).is_err() {
            lane.in_flight.fetch_sub(1, Ordering::AcqRel);
            tracing::error!(user = %user, "i/o lane is gone; job dropped");
        }
    }

    /// Queues `f` and hands back a receiver for its result.
    pub(crate) fn call<T: Send + 'static>(
        &mut self,
        user: &UserId,
        f: impl FnOnce() -> T + Send + 'static,
    ) -> oneshot::Receiver<T> {
        let (tx, rx) = oneshot::channel();
        self.submit(user, move || {
            let _ = tx.send(f());
        });
        rx
    }

    /// One receiver per lane, resolved once everything queued before it has run.
    pub(crate) fn barriers(&mut self) -> Vec<oneshot::Receiver<()>> {
        let users = self.lanes.keys().cloned().collect::<Vec<_>>();
        users.iter().map(|user| self.call(user, || ())).collect()
    }

    /// Drops idle lanes of users for which `keep` is false.
    pub(crate) fn prune(&mut self, keep: impl Fn(&UserId) -> bool) {
        self.lanes
            .retain(|user, lane| keep(user) || lane.in_flight.load(Ordering::Acquire) > 0);
    }

    pub(crate) fn len(&self) -> usize {
        self.lanes.len()
    }
}

/// Waits for every barrier; lanes that vanished count as drained.
pub(crate) async fn drain(barriers: Vec<oneshot::Receiver<()>>) {
    for barrier in barriers {
        let _ = barrier.await;
    }
}
