// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Resource arbiter: exclusive ownership of the hardware execution slots.
//!
//! Every IPU unit offers two slots, one per pipeline role. A task holds one
//! slot for as long as any of its channels may be enabled. Slots are handed
//! out as [`SlotGuard`]s which release on drop, so a slot is freed exactly
//! once on every exit path of the holder.

use crate::{error::TaskError, task::TaskId};
use core::fmt;
use std::{
    sync::{Condvar, Mutex, MutexGuard},
    time::{Duration, Instant},
};
use tracing::{debug, trace, warn};

/// Pipeline role of a slot.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Role {
    /// Viewfinder pipeline; the only one the deinterlacer attaches to.
    GeneralPurpose,
    /// Post-processing pipeline.
    Secondary,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Role::GeneralPurpose => write!(f, "vf"),
            Role::Secondary => write!(f, "pp"),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Slot {
    pub unit: u8,
    pub role: Role,
}

impl Slot {
    fn index(self) -> usize {
        self.unit as usize * 2 + (self.role == Role::Secondary) as usize
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ipu{}-{}", self.unit, self.role)
    }
}

struct Table {
    owners: Vec<Option<TaskId>>,
    waiters: usize,
    peak: usize,
}

impl Table {
    fn occupied(&self) -> usize {
        self.owners.iter().filter(|o| o.is_some()).count()
    }

    /// Claims the first free slot: the general-purpose role of any unit
    /// first, then the secondary role unless `deinterlace` is set.
    fn claim(&mut self, units: u8, task: TaskId, deinterlace: bool) -> Option<Slot> {
        let roles: &[Role] = if deinterlace {
            &[Role::GeneralPurpose]
        } else {
            &[Role::GeneralPurpose, Role::Secondary]
        };
        let slot = roles
            .iter()
            .flat_map(|&role| (0..units).map(move |unit| Slot { unit, role }))
            .find(|slot| self.owners[slot.index()].is_none())?;
        self.owners[slot.index()] = Some(task);
        self.peak = self.peak.max(self.occupied());
        Some(slot)
    }
}

/// Table of the hardware slots of every unit.
pub struct Arbiter {
    units: u8,
    table: Mutex<Table>,
    freed: Condvar,
}

impl Arbiter {
    pub fn new(units: u8) -> Self {
        Arbiter {
            units,
            table: Mutex::new(Table {
                owners: vec![None; units as usize * 2],
                waiters: 0,
                peak: 0,
            }),
            freed: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Table> {
        self.table.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Claims a slot for `task`, blocking up to `wait` for one to be freed.
    pub fn acquire(
        &self,
        task: TaskId,
        deinterlace: bool,
        wait: Duration,
    ) -> Result<SlotGuard<'_>, TaskError> {
        let deadline = Instant::now() + wait;
        let mut table = self.lock();
        loop {
            if let Some(slot) = table.claim(self.units, task, deinterlace) {
                debug!(%task, unit = slot.unit, role = %slot.role, "slot acquired");
                return Ok(SlotGuard {
                    arbiter: self,
                    slot,
                    task,
                });
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                warn!(%task, ?wait, "no hardware slot became free");
                return Err(TaskError::ResourceTimeout);
            }
            trace!(%task, ?remaining, "waiting for a slot");
            table.waiters += 1;
            table = match self.freed.wait_timeout(table, remaining) {
                Ok((guard, _)) => guard,
                Err(e) => e.into_inner().0,
            };
            table.waiters -= 1;
        }
    }

    fn release(&self, slot: Slot, task: TaskId) {
        let mut table = self.lock();
        match table.owners[slot.index()] {
            Some(owner) if owner == task => table.owners[slot.index()] = None,
            owner => {
                warn!(%task, %slot, ?owner, "released slot not owned by task");
                return;
            }
        }
        debug!(%task, unit = slot.unit, role = %slot.role, "slot released");
        if table.waiters > 0 {
            self.freed.notify_all();
        }
    }

    pub fn slots(&self) -> usize {
        self.units as usize * 2
    }

    /// Number of slots currently held.
    pub fn occupied(&self) -> usize {
        self.lock().occupied()
    }

    /// Highest number of slots ever held at once.
    pub fn peak(&self) -> usize {
        self.lock().peak
    }

    /// Callers currently blocked in [`Arbiter::acquire`].
    pub fn waiters(&self) -> usize {
        self.lock().waiters
    }

    pub fn owner(&self, slot: Slot) -> Option<TaskId> {
        self.lock().owners.get(slot.index()).copied().flatten()
    }

    /// True when `task` holds any slot.
    pub fn holds(&self, task: TaskId) -> bool {
        self.lock().owners.contains(&Some(task))
    }
}

/// Ownership of one slot. Dropping it releases the slot and wakes waiters.
#[must_use]
pub struct SlotGuard<'a> {
    arbiter: &'a Arbiter,
    slot: Slot,
    task: TaskId,
}

impl SlotGuard<'_> {
    pub fn slot(&self) -> Slot {
        self.slot
    }

    pub fn unit(&self) -> u8 {
        self.slot.unit
    }

    pub fn role(&self) -> Role {
        self.slot.role
    }
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        self.arbiter.release(self.slot, self.task);
    }
}

impl fmt::Debug for SlotGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("SlotGuard")
            .field("slot", &self.slot)
            .field("task", &self.task)
            .finish()
    }
}
