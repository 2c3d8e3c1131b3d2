// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use crate::{
    arbiter::Arbiter,
    channel::ChannelProgrammer,
    config::SchedulerConfig,
    emulator::SoftwareIpu,
    error::{TaskError, Warnings},
    memory::{DmaBuffer, MemoryError, MemoryMap},
    scheduler::Scheduler,
    split::SplitMode,
    task::{Task, TaskId},
    validate::{self, Mode, ResolvedTask},
};
use std::{
    io,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};
use tracing::{info, instrument};

/// Outcome of a successful [`IpuDevice::submit`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaskReport {
    pub id: TaskId,
    pub mode: Mode,
    pub split: SplitMode,
    pub stripes: usize,
    pub warnings: Warnings,
    pub elapsed: Duration,
}

/// Caller-facing IPU: validation, blocking submission and DMA memory.
///
/// Dropping the device stops the workers after they finish the task they
/// are running.
pub struct IpuDevice {
    scheduler: Scheduler,
    memory: Arc<MemoryMap>,
    sequence: AtomicU64,
}

impl IpuDevice {
    pub fn new(
        config: SchedulerConfig,
        programmer: Arc<dyn ChannelProgrammer>,
        memory: Arc<MemoryMap>,
    ) -> io::Result<Self> {
        Ok(IpuDevice {
            scheduler: Scheduler::new(config, programmer, memory.clone())?,
            memory,
            sequence: AtomicU64::new(1),
        })
    }

    /// Device backed by the software IPU and process memory. The emulator
    /// is returned as well so callers can inspect or fault it.
    pub fn software(
        config: SchedulerConfig,
        latency: Duration,
    ) -> io::Result<(Self, Arc<SoftwareIpu>)> {
        Self::software_with_memory(config, latency, Arc::new(MemoryMap::new()))
    }

    /// Software IPU over the given memory, such as a capped map or one
    /// backed by the CMA heap.
    pub fn software_with_memory(
        config: SchedulerConfig,
        latency: Duration,
        memory: Arc<MemoryMap>,
    ) -> io::Result<(Self, Arc<SoftwareIpu>)> {
        let ipu = Arc::new(SoftwareIpu::new(memory.clone()).with_latency(latency));
        let device = IpuDevice::new(config, ipu.clone(), memory)?;
        Ok((device, ipu))
    }

    /// Validates `task` without queuing it.
    pub fn check(&self, task: &Task) -> Result<ResolvedTask, TaskError> {
        validate::check(task, self.config().capabilities())
    }

    /// Validates and runs `task`, blocking until it and every stripe it was
    /// split into finished or its budget ran out.
    #[instrument(skip_all, fields(task = tracing::field::Empty))]
    pub fn submit(&self, task: &Task) -> Result<TaskReport, TaskError> {
        let start = Instant::now();
        let id = TaskId::from_sequence(self.sequence.fetch_add(1, Ordering::Relaxed));
        tracing::Span::current().record("task", tracing::field::display(id));

        let resolved = Arc::new(self.check(task)?);
        let budget = self.config().timeout_for(task.timeout);
        let (mode, split, stripes, warnings) = (
            resolved.mode,
            resolved.split,
            resolved.stripes.len(),
            resolved.warnings,
        );
        self.scheduler.submit(id, resolved, budget)?;

        let elapsed = start.elapsed();
        info!(?mode, ?split, ?elapsed, "task complete");
        Ok(TaskReport {
            id,
            mode,
            split,
            stripes,
            warnings,
            elapsed,
        })
    }

    pub fn allocate(&self, size: usize) -> Result<Arc<DmaBuffer>, MemoryError> {
        self.memory.allocate(size)
    }

    pub fn free(&self, paddr: u64) -> Result<(), MemoryError> {
        self.memory.free(paddr)
    }

    pub fn memory(&self) -> &Arc<MemoryMap> {
        &self.memory
    }

    pub fn config(&self) -> &SchedulerConfig {
        self.scheduler.config()
    }

    pub fn arbiter(&self) -> &Arbiter {
        self.scheduler.arbiter()
    }

    pub fn workers(&self) -> usize {
        self.scheduler.workers()
    }
}
