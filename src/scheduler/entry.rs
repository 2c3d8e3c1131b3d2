// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use crate::{
    error::TaskError,
    seam::SeamScratch,
    split::Stripe,
    task::{StripeId, TaskId},
    validate::ResolvedTask,
};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Condvar, Mutex, MutexGuard, Weak,
    },
    time::{Duration, Instant},
};
use tracing::{debug, warn};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TaskState {
    Queued,
    InProgress,
    Completed,
    Failed(TaskError),
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Failed(_))
    }
}

/// Fan-in state of a split parent.
struct Children {
    entries: Vec<Arc<TaskEntry>>,
    pending: usize,
    failure: Option<TaskError>,
}

/// A queued unit of work: a whole task, a split parent or one stripe.
///
/// Shared by the submitter, the queue, the worker running it and, for
/// stripes, the parent. Children point back at their parent weakly.
pub struct TaskEntry {
    pub id: TaskId,
    pub resolved: Arc<ResolvedTask>,
    /// Stripe this entry runs; unused by split parents.
    stripe: usize,
    pub budget: Duration,
    created: Instant,
    claimed: AtomicBool,
    state: Mutex<TaskState>,
    done: Condvar,
    parent: Weak<TaskEntry>,
    children: Mutex<Children>,
    children_done: Condvar,
    seam: Option<SeamScratch>,
}

impl TaskEntry {
    pub fn new(id: TaskId, resolved: Arc<ResolvedTask>, budget: Duration) -> Arc<Self> {
        let seam = resolved
            .stripes
            .iter()
            .any(|s| s.seam.is_some())
            .then(SeamScratch::new);
        Arc::new(Self::build(id, resolved, 0, budget, Weak::new(), seam))
    }

    fn build(
        id: TaskId,
        resolved: Arc<ResolvedTask>,
        stripe: usize,
        budget: Duration,
        parent: Weak<TaskEntry>,
        seam: Option<SeamScratch>,
    ) -> Self {
        TaskEntry {
            id,
            resolved,
            stripe,
            budget,
            created: Instant::now(),
            claimed: AtomicBool::new(false),
            state: Mutex::new(TaskState::Queued),
            done: Condvar::new(),
            parent,
            children: Mutex::new(Children {
                entries: Vec::new(),
                pending: 0,
                failure: None,
            }),
            children_done: Condvar::new(),
            seam,
        }
    }

    /// True for a top level entry whose task is split into stripes.
    pub fn is_split_parent(&self) -> bool {
        self.id.stripe_id() == StripeId::NONE && self.resolved.is_split()
    }

    pub fn stripe(&self) -> &Stripe {
        &self.resolved.stripes[self.stripe]
    }

    pub fn parent(&self) -> Option<Arc<TaskEntry>> {
        self.parent.upgrade()
    }

    pub fn seam(&self) -> Option<&SeamScratch> {
        self.seam.as_ref()
    }

    pub fn deadline(&self) -> Instant {
        self.created + self.budget
    }

    pub fn remaining(&self) -> Duration {
        self.deadline().saturating_duration_since(Instant::now())
    }

    fn lock(&self) -> MutexGuard<'_, TaskState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_children(&self) -> MutexGuard<'_, Children> {
        self.children.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn state(&self) -> TaskState {
        self.lock().clone()
    }

    /// Takes the entry for execution. Exactly one caller wins; everyone
    /// else must leave the entry alone.
    pub fn claim(&self) -> bool {
        if self
            .claimed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        *self.lock() = TaskState::InProgress;
        true
    }

    /// Creates the stripe entries of a split parent. Each stripe gets an
    /// equal share of the parent's budget.
    pub fn spawn_children(self: &Arc<Self>, min_budget: Duration) -> Vec<Arc<TaskEntry>> {
        let count = self.resolved.stripes.len();
        let budget = (self.budget / count as u32).max(min_budget);
        let entries: Vec<_> = self
            .resolved
            .stripes
            .iter()
            .enumerate()
            .map(|(i, s)| {
                Arc::new(TaskEntry::build(
                    self.id.stripe(s.id),
                    self.resolved.clone(),
                    i,
                    budget,
                    Arc::downgrade(self),
                    None,
                ))
            })
            .collect();
        let mut children = self.lock_children();
        children.entries = entries.clone();
        children.pending = entries.len();
        entries
    }

    /// Records the terminal state and wakes waiters. A child also reports
    /// to its parent.
    pub fn complete(&self, result: Result<(), TaskError>) {
        {
            let mut state = self.lock();
            if state.is_terminal() {
                warn!(task = %self.id, "completed twice");
                return;
            }
            *state = match &result {
                Ok(()) => TaskState::Completed,
                Err(e) => TaskState::Failed(e.clone()),
            };
        }
        self.done.notify_all();
        if let Some(parent) = self.parent() {
            parent.child_done(self.id, result);
        }
    }

    fn child_done(&self, child: TaskId, result: Result<(), TaskError>) {
        let mut children = self.lock_children();
        if let Err(e) = result {
            if children.failure.is_none() {
                debug!(task = %self.id, %child, "first stripe failure: {e}");
                children.failure = Some(e);
            }
        }
        children.pending = children.pending.saturating_sub(1);
        if children.pending == 0 {
            self.children_done.notify_all();
        }
    }

    /// Blocks until every child reached a terminal state and returns the
    /// aggregate result.
    ///
    /// Children are all claimed by the time the parent waits, and each of
    /// their blocking points is bounded, so this always returns.
    pub fn wait_children(&self) -> Result<(), TaskError> {
        let mut children = self.lock_children();
        while children.pending > 0 {
            let remaining = self.remaining();
            if remaining.is_zero() {
                children = match self.children_done.wait(children) {
                    Ok(g) => g,
                    Err(e) => e.into_inner(),
                };
            } else {
                children = match self.children_done.wait_timeout(children, remaining) {
                    Ok((g, _)) => g,
                    Err(e) => e.into_inner().0,
                };
                if children.pending > 0 && self.remaining().is_zero() {
                    warn!(task = %self.id, pending = children.pending, "stripes overran the budget");
                }
            }
        }
        match children.failure.clone() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Blocks the submitter until the entry is terminal.
    ///
    /// When the budget runs out while the entry still sits in the queue the
    /// submitter claims it and fails it with a resource timeout. An entry
    /// already running is always awaited.
    pub fn wait(&self) -> Result<(), TaskError> {
        let mut state = self.lock();
        loop {
            match &*state {
                TaskState::Completed => return Ok(()),
                TaskState::Failed(e) => return Err(e.clone()),
                _ => {}
            }
            let remaining = self.remaining();
            if remaining.is_zero() {
                drop(state);
                if self.claim() {
                    warn!(task = %self.id, "abandoned while queued");
                    self.complete(Err(TaskError::ResourceTimeout));
                    return Err(TaskError::ResourceTimeout);
                }
                state = self.lock();
                while !state.is_terminal() {
                    state = match self.done.wait(state) {
                        Ok(g) => g,
                        Err(e) => e.into_inner(),
                    };
                }
                continue;
            }
            state = match self.done.wait_timeout(state, remaining) {
                Ok((g, _)) => g,
                Err(e) => e.into_inner().0,
            };
        }
    }

    /// Stripe entries of a split parent.
    pub fn children(&self) -> Vec<Arc<TaskEntry>> {
        self.lock_children().entries.clone()
    }
}
