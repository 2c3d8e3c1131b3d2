// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use super::{entry::TaskEntry, Shared};
use crate::{channel::Completion, error::TaskError, pipeline::Pipeline};
use std::{sync::Arc, thread};
use tracing::{debug, error, info_span, instrument, trace, warn};

/// Worker loop: drains the shared queue until it is closed.
pub(super) fn run(shared: Arc<Shared>, queue: kanal::Receiver<Arc<TaskEntry>>, index: usize) {
    let _span = info_span!("worker", index).entered();
    debug!("worker started");
    while let Ok(entry) = queue.recv() {
        if !entry.claim() {
            trace!(task = %entry.id, "already claimed");
            continue;
        }
        dispatch(&shared, &entry);
        thread::yield_now();
    }
    debug!("worker stopped");
}

fn dispatch(shared: &Shared, entry: &Arc<TaskEntry>) {
    if entry.is_split_parent() {
        run_parent(shared, entry);
    } else {
        let result = execute(shared, entry);
        entry.complete(result);
    }
}

/// Fans a split parent out into its stripes and waits for them.
///
/// Every stripe is queued so idle workers can pick them up, then the parent
/// runs every stripe nobody claimed yet itself before it blocks.
#[instrument(skip_all, fields(task = %parent.id, split = ?parent.resolved.split))]
fn run_parent(shared: &Shared, parent: &Arc<TaskEntry>) {
    let children = parent.spawn_children(shared.config.min_timeout);
    for child in &children {
        if shared.queue.send(child.clone()).is_err() {
            trace!(task = %child.id, "queue closed, running inline");
        }
    }
    for child in &children {
        if child.claim() {
            let result = execute(shared, child);
            child.complete(result);
        }
    }
    let result = parent.wait_children();
    match &result {
        Ok(()) => debug!(stripes = children.len(), "split task complete"),
        Err(e) => warn!("split task failed: {e}"),
    }
    parent.complete(result);
}

/// Runs one plain task or stripe on the hardware.
#[instrument(skip_all, fields(task = %entry.id, stripe = ?entry.id.stripe_id()))]
fn execute(shared: &Shared, entry: &TaskEntry) -> Result<(), TaskError> {
    let resolved = &entry.resolved;
    let stripe = entry.stripe();
    let parent = entry.parent();
    let seam = parent.as_deref().and_then(TaskEntry::seam);
    let _gate = match (seam, stripe.seam) {
        (Some(scratch), Some(band)) => Some(scratch.gate(band.column)),
        _ => None,
    };

    let wait = entry.remaining().saturating_sub(shared.config.resource_margin);
    let slot = shared
        .arbiter
        .acquire(entry.id, resolved.is_deinterlaced(), wait)?;

    let mut pipeline = Pipeline::configure(
        shared.programmer.as_ref(),
        &shared.memory,
        slot.slot(),
        resolved,
        stripe,
        entry.id,
    )?;
    let token = pipeline.register_completion()?;
    pipeline.enable()?;

    let outcome = match token.wait(entry.remaining().max(shared.config.resource_margin)) {
        Some(Completion::Done) => Ok(()),
        Some(Completion::Fault(reason)) => {
            error!("hardware fault: {reason}");
            Err(TaskError::Generic(reason))
        }
        None => {
            warn!(budget = ?entry.budget, "hardware did not complete");
            Err(TaskError::HardwareTimeout)
        }
    };
    let teardown = pipeline.disable_and_release();
    drop(slot);
    outcome?;
    teardown?;

    if let Some(scratch) = seam {
        scratch.stripe_done(&shared.memory, resolved, stripe)?;
    }
    Ok(())
}
