// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Worker pool draining one shared FIFO of task entries.
//!
//! Submitters queue an entry and block on it. A worker dequeues it, claims
//! it and either runs it on a hardware slot or, for a split parent, fans it
//! out into stripe entries, which go to the back of the same queue, and
//! fans them back in. The queue and the slot table have separate locks, so
//! nothing blocks on hardware while holding the queue.

mod entry;
mod worker;

pub use entry::{TaskEntry, TaskState};

use crate::{
    arbiter::Arbiter,
    channel::ChannelProgrammer,
    config::SchedulerConfig,
    error::TaskError,
    memory::MemoryMap,
    task::TaskId,
    validate::ResolvedTask,
};
use std::{
    io,
    sync::Arc,
    thread::{self, JoinHandle},
    time::Duration,
};
use tracing::{debug, info};

/// State every worker reaches through one `Arc`.
pub(crate) struct Shared {
    pub config: SchedulerConfig,
    pub arbiter: Arbiter,
    pub programmer: Arc<dyn ChannelProgrammer>,
    pub memory: Arc<MemoryMap>,
    pub queue: kanal::Sender<Arc<TaskEntry>>,
}

pub struct Scheduler {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
}

impl Scheduler {
    /// Starts `config.workers()` worker threads.
    pub fn new(
        config: SchedulerConfig,
        programmer: Arc<dyn ChannelProgrammer>,
        memory: Arc<MemoryMap>,
    ) -> io::Result<Self> {
        let (tx, rx) = kanal::unbounded();
        let count = config.workers();
        let shared = Arc::new(Shared {
            arbiter: Arbiter::new(config.profile.units),
            config,
            programmer,
            memory,
            queue: tx,
        });

        let mut scheduler = Scheduler {
            shared: shared.clone(),
            workers: Vec::with_capacity(count),
        };
        for index in 0..count {
            let (shared, rx) = (shared.clone(), rx.clone());
            let handle = thread::Builder::new()
                .name(format!("ipu-worker-{index}"))
                .spawn(move || worker::run(shared, rx, index))?;
            scheduler.workers.push(handle);
        }
        info!(
            workers = count,
            slots = scheduler.shared.arbiter.slots(),
            profile = %scheduler.shared.config.profile.name,
            "scheduler started"
        );
        Ok(scheduler)
    }

    /// Queues a validated task and blocks until it is terminal.
    pub fn submit(
        &self,
        id: TaskId,
        resolved: Arc<ResolvedTask>,
        budget: Duration,
    ) -> Result<(), TaskError> {
        let entry = TaskEntry::new(id, resolved, budget);
        self.shared
            .queue
            .send(entry.clone())
            .map_err(|_| TaskError::Generic("scheduler stopped".into()))?;
        debug!(task = %id, ?budget, "task queued");
        entry.wait()
    }

    pub fn arbiter(&self) -> &Arbiter {
        &self.shared.arbiter
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.shared.config
    }

    pub fn workers(&self) -> usize {
        self.workers.len()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        let _ = self.shared.queue.close();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
        debug!("scheduler stopped");
    }
}
