// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Seam stitching for deinterlaced tasks split top/bottom.
//!
//! The upper stripe of each pair also renders the band of lines just below
//! the boundary, where the lower stripe lacks the field lines above its
//! first row. When the upper stripe finishes its band is saved. Once both
//! stripes of the pair finished, the saved band is written back over
//! whatever the lower stripe left there.
//!
//! The two stripes of a pair write overlapping lines, so each holds the
//! pair's gate from before its frame starts until it reported here.

use crate::{
    error::TaskError,
    format,
    memory::MemoryMap,
    split::{self, SeamBand, Stripe},
    task::Rect,
    validate::ResolvedTask,
};
use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard},
};
use tracing::{debug, trace};

#[derive(Default)]
struct Pair {
    band: Option<Vec<u8>>,
    finished: u8,
}

/// Per-parent scratch holding the saved band of every stripe pair.
#[derive(Default)]
pub struct SeamScratch {
    pairs: Mutex<HashMap<u8, Pair>>,
    gates: [Mutex<()>; 2],
}

impl SeamScratch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serialises the stripes of the pair in `column`.
    pub fn gate(&self, column: u8) -> MutexGuard<'_, ()> {
        let gate = &self.gates[usize::from(column.min(1))];
        gate.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<u8, Pair>> {
        self.pairs.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Records that `stripe` finished writing to the output surface.
    pub fn stripe_done(
        &self,
        memory: &MemoryMap,
        resolved: &ResolvedTask,
        stripe: &Stripe,
    ) -> Result<(), TaskError> {
        let Some(band) = stripe.seam else {
            return Ok(());
        };
        let spans = band_spans(resolved, stripe, &band);

        let mut pairs = self.lock();
        let pair = pairs.entry(band.column).or_default();
        if band.upper {
            let mut saved = Vec::with_capacity(spans.iter().map(|s| s.1).sum());
            for &(paddr, len) in &spans {
                saved.extend(memory.read_at(paddr, len).map_err(generic)?);
            }
            trace!(column = band.column, bytes = saved.len(), "seam band saved");
            pair.band = Some(saved);
        }
        pair.finished += 1;

        if pair.finished == 2 {
            if let Some(saved) = pair.band.take() {
                let mut pos = 0;
                for &(paddr, len) in &spans {
                    memory
                        .write_at(paddr, &saved[pos..pos + len])
                        .map_err(generic)?;
                    pos += len;
                }
                debug!(
                    column = band.column,
                    boundary = band.boundary,
                    lines = band.lines,
                    "seam band restored"
                );
            }
        }
        Ok(())
    }
}

fn generic(e: impl std::fmt::Display) -> TaskError {
    TaskError::Generic(format!("seam stitching: {e}"))
}

/// Absolute byte spans of the band in the output surface. The band is
/// mirrored with the stripes when the output is flipped.
fn band_spans(resolved: &ResolvedTask, stripe: &Stripe, band: &SeamBand) -> Vec<(u64, usize)> {
    let out = &resolved.output;
    let logical = Rect::new(stripe.output.x, band.boundary, stripe.output.width, band.lines);
    let r = split::mirror(logical, out.crop.width, out.crop.height, resolved.rotation);
    format::region_spans(
        out.format,
        out.width,
        out.height,
        out.crop.x + r.x,
        out.crop.y + r.y,
        r.width,
        r.height,
    )
    .into_iter()
    .map(|(off, len)| (out.paddr + off, len))
    .collect()
}
