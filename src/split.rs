// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Split planner: tiles an output too large for one resizer pass into
//! stripes that each fit a unit.
//!
//! Every axis is handled independently and cut at most once, so a task has
//! one, two or four stripes. Both stripes of an axis share one fixed-point
//! resize coefficient; each stripe also carries the initial phase of its
//! first output sample relative to the start of its input window. Scaling
//! the stripes independently therefore samples exactly the input pixels an
//! unsplit pass would, and the stripes' outputs reassemble the unsplit
//! output with no seam.
//!
//! Deinterlaced tasks split top/bottom additionally get a [`SeamBand`]: the
//! deinterlacer interpolates missing field lines from their neighbours, and
//! the lower stripe has no neighbour above its first line. The upper stripe
//! is programmed to also produce the band of lines below the boundary, and
//! the scheduler copies that band over the lower stripe's once both ran.

use crate::{
    config::Capabilities,
    error::{Axis, TaskError},
    task::{Rect, Rotation, StripeId},
};

/// Fraction bits of the resize coefficient and phase.
pub const RESIZE_SHIFT: u32 = 13;

/// Output lines corrected around a deinterlaced split boundary when not
/// upscaling.
pub const VDI_SAVE_LINES: u32 = 4;

/// Stripe boundaries and stripe input windows start on this alignment.
const STRIPE_ALIGN: u32 = 8;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum SplitMode {
    #[default]
    None,
    LeftRight,
    UpDown,
    Quad,
}

impl SplitMode {
    pub fn from_axes(horizontal: bool, vertical: bool) -> Self {
        match (horizontal, vertical) {
            (false, false) => SplitMode::None,
            (true, false) => SplitMode::LeftRight,
            (false, true) => SplitMode::UpDown,
            (true, true) => SplitMode::Quad,
        }
    }

    pub fn horizontal(self) -> bool {
        matches!(self, SplitMode::LeftRight | SplitMode::Quad)
    }

    pub fn vertical(self) -> bool {
        matches!(self, SplitMode::UpDown | SplitMode::Quad)
    }

    pub fn stripes(self) -> usize {
        match self {
            SplitMode::None => 1,
            SplitMode::LeftRight | SplitMode::UpDown => 2,
            SplitMode::Quad => 4,
        }
    }
}

/// Nearest-sample resize along one axis: output sample `x` of a window reads
/// input sample `(phase + x * coeff) >> RESIZE_SHIFT` of the window.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Resize {
    pub coeff: u32,
    pub phase: u32,
}

impl Resize {
    pub fn new(input: u32, output: u32) -> Self {
        Resize {
            coeff: coefficient(input, output),
            phase: 0,
        }
    }

    pub fn source(&self, x: u32) -> u32 {
        ((self.phase as u64 + x as u64 * self.coeff as u64) >> RESIZE_SHIFT) as u32
    }
}

fn coefficient(input: u32, output: u32) -> u32 {
    (((input as u64) << RESIZE_SHIFT) / output.max(1) as u64) as u32
}

/// Band of output lines around a top/bottom boundary of a deinterlaced
/// split, rewritten after both stripes of the pair finished.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SeamBand {
    /// First output line of the lower stripe, relative to the output crop.
    pub boundary: u32,
    /// Lines below the boundary produced by the upper stripe.
    pub lines: u32,
    /// True on the stripe above the boundary.
    pub upper: bool,
    /// Index of the left/right column the pair belongs to.
    pub column: u8,
}

/// One tile of a task.
///
/// `input` is relative to the input crop; `output` is relative to the
/// (pre-rotation) output crop and ignores flips. [`Stripe::placement`] gives
/// where the stripe lands once flips are applied.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Stripe {
    pub id: StripeId,
    pub input: Rect,
    pub output: Rect,
    pub h_resize: Resize,
    pub v_resize: Resize,
    pub seam: Option<SeamBand>,
}

impl Stripe {
    /// Covers the whole task with a single pass.
    pub fn full(input: (u32, u32), output: (u32, u32)) -> Self {
        Stripe {
            id: StripeId::NONE,
            input: Rect::new(0, 0, input.0, input.1),
            output: Rect::new(0, 0, output.0, output.1),
            h_resize: Resize::new(input.0, output.0),
            v_resize: Resize::new(input.1, output.1),
            seam: None,
        }
    }

    /// Output window the hardware writes, including a seam band the upper
    /// stripe produces on behalf of its lower neighbour.
    pub fn programmed_output(&self) -> Rect {
        match self.seam {
            Some(band) if band.upper => Rect {
                height: self.output.height + band.lines,
                ..self.output
            },
            _ => self.output,
        }
    }

    /// Where the stripe's programmed output lands in a `width` x `height`
    /// output crop once the flip of `rotation` is applied.
    pub fn placement(&self, width: u32, height: u32, rotation: Rotation) -> Rect {
        mirror(self.programmed_output(), width, height, rotation)
    }
}

/// Mirrors `rect` inside a `width` x `height` area according to the flips
/// of `rotation`.
pub fn mirror(rect: Rect, width: u32, height: u32, rotation: Rotation) -> Rect {
    let mut r = rect;
    if rotation.hflip() {
        r.x = width - rect.x - rect.width;
    }
    if rotation.vflip() {
        r.y = height - rect.y - rect.height;
    }
    r
}

struct Segment {
    out_off: u32,
    out_len: u32,
    in_off: u32,
    in_len: u32,
    resize: Resize,
}

/// Stripe geometry of one axis.
struct AxisPlan {
    axis: Axis,
    input: u32,
    output: u32,
    max_out: u32,
    max_in: u32,
    /// Input windows span a multiple of this many samples.
    granule: u32,
}

impl AxisPlan {
    fn split_point(&self) -> Result<u32, TaskError> {
        let mut point = align_down(self.output / 2, STRIPE_ALIGN);
        if self.output - point > self.max_out {
            point = align_up(self.output - self.max_out, STRIPE_ALIGN);
        }
        if point == 0 || point > self.max_out || self.output - point > self.max_out {
            return Err(TaskError::SplitOutputOverflow(self.axis));
        }
        Ok(point)
    }

    /// Input window feeding output samples `[out_off, out_off + out_len)`.
    /// A stripe reaching the end of the output reads to the end of the crop.
    /// `context_to` extends the window to include that output line's source
    /// plus one line below.
    fn segment(
        &self,
        out_off: u32,
        out_len: u32,
        context_to: Option<u32>,
    ) -> Result<Segment, TaskError> {
        let shared = Resize::new(self.input, self.output);
        let first = shared.source(out_off);
        let in_off = align_down(first, STRIPE_ALIGN);
        let phase = (out_off as u64 * shared.coeff as u64) - ((in_off as u64) << RESIZE_SHIFT);

        let last = if out_off + out_len >= self.output {
            self.input - 1
        } else {
            let mut last = shared.source(out_off + out_len - 1);
            if let Some(line) = context_to {
                last = (shared.source(line) + 1).min(self.input - 1);
            }
            last
        };
        // Chroma subsampled sources cannot end a window mid pair.
        let in_len = align_up(last + 1 - in_off, self.granule).min(self.input - in_off);

        if in_off + in_len > self.input || in_len > self.max_in {
            return Err(TaskError::SplitInputOverflow(self.axis));
        }
        Ok(Segment {
            out_off,
            out_len,
            in_off,
            in_len,
            resize: Resize {
                coeff: shared.coeff,
                phase: phase as u32,
            },
        })
    }

    fn plan(&self, split: bool, band: Option<u32>) -> Result<Vec<Segment>, TaskError> {
        if !split {
            return Ok(vec![self.segment(0, self.output, None)?]);
        }
        let point = self.split_point()?;
        let band = band.map(|lines| lines.min(self.output - point));
        if band.is_some_and(|lines| point + lines > self.max_out) {
            return Err(TaskError::SplitOutputOverflow(self.axis));
        }
        let context = band.map(|lines| point + lines - 1);
        Ok(vec![
            self.segment(0, point, context)?,
            self.segment(point, self.output - point, None)?,
        ])
    }
}

/// Lines of the seam band for a deinterlaced top/bottom split. Upscaling
/// stretches the lines that miss their neighbour, so the band grows with the
/// ratio to always cover two input lines.
pub fn seam_lines(input: u32, output: u32) -> u32 {
    let ratio = output.div_ceil(input.max(1));
    align_up(VDI_SAVE_LINES.max(2 * ratio), 2)
}

/// Plans the stripes of a task whose input crop is `input` and whose
/// pre-rotation output is `output`. `subsampling` is the chroma subsampling
/// of the input format, `(1, 1)` for RGB; stripe input windows are sized in
/// whole chroma samples.
///
/// With [`SplitMode::None`] the result is the single full stripe. Stripes are
/// listed row by row, top-left first.
pub fn plan(
    caps: &Capabilities,
    input: (u32, u32),
    output: (u32, u32),
    mode: SplitMode,
    deinterlace: bool,
    subsampling: (u32, u32),
) -> Result<Vec<Stripe>, TaskError> {
    if mode == SplitMode::None {
        return Ok(vec![Stripe::full(input, output)]);
    }

    let max_in_width = if deinterlace {
        caps.max_vdi_in_width.min(caps.max_in_width)
    } else {
        caps.max_in_width
    };
    let horizontal = AxisPlan {
        axis: Axis::Horizontal,
        input: input.0,
        output: output.0,
        max_out: caps.max_out_width,
        max_in: if mode.horizontal() {
            max_in_width
        } else {
            caps.max_in_width
        },
        granule: subsampling.0.max(1),
    };
    let vertical = AxisPlan {
        axis: Axis::Vertical,
        input: input.1,
        output: output.1,
        max_out: caps.max_out_height,
        max_in: caps.max_in_height,
        granule: subsampling.1.max(1),
    };

    let band = (deinterlace && mode.vertical()).then(|| seam_lines(input.1, output.1));
    let columns = horizontal.plan(mode.horizontal(), None)?;
    let rows = vertical.plan(mode.vertical(), band)?;

    let mut stripes = Vec::with_capacity(rows.len() * columns.len());
    for (r, row) in rows.iter().enumerate() {
        for (c, col) in columns.iter().enumerate() {
            let mut id = StripeId::NONE;
            if mode.vertical() {
                id = id.union(if r == 0 { StripeId::UP } else { StripeId::DOWN });
            }
            if mode.horizontal() {
                id = id.union(if c == 0 {
                    StripeId::LEFT
                } else {
                    StripeId::RIGHT
                });
            }
            let seam = band.map(|lines| SeamBand {
                boundary: rows[1].out_off,
                lines: lines.min(rows[1].out_len),
                upper: r == 0,
                column: c as u8,
            });
            stripes.push(Stripe {
                id,
                input: Rect::new(col.in_off, row.in_off, col.in_len, row.in_len),
                output: Rect::new(col.out_off, row.out_off, col.out_len, row.out_len),
                h_resize: col.resize,
                v_resize: row.resize,
                seam,
            });
        }
    }
    Ok(stripes)
}

pub(crate) fn align_down(v: u32, align: u32) -> u32 {
    v - v % align
}

pub(crate) fn align_up(v: u32, align: u32) -> u32 {
    v.div_ceil(align) * align
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_point_prefers_midpoint() {
        let plan = AxisPlan {
            axis: Axis::Horizontal,
            input: 1920,
            output: 1920,
            max_out: 1024,
            max_in: 4096,
            granule: 1,
        };
        assert_eq!(plan.split_point().unwrap(), 960);
    }

    #[test]
    fn split_point_moves_to_fit_ceiling() {
        let plan = AxisPlan {
            axis: Axis::Horizontal,
            input: 2040,
            output: 2040,
            max_out: 1024,
            max_in: 4096,
            granule: 1,
        };
        let point = plan.split_point().unwrap();
        assert!(point <= 1024 && 2040 - point <= 1024);
        assert_eq!(point % STRIPE_ALIGN, 0);
    }

    #[test]
    fn segment_phase_reproduces_shared_mapping() {
        let plan = AxisPlan {
            axis: Axis::Horizontal,
            input: 1000,
            output: 1736,
            max_out: 1024,
            max_in: 4096,
            granule: 1,
        };
        let shared = Resize::new(1000, 1736);
        for seg in plan.plan(true, None).unwrap() {
            for x in 0..seg.out_len {
                assert_eq!(
                    seg.in_off + seg.resize.source(x),
                    shared.source(seg.out_off + x)
                );
                assert!(seg.resize.source(x) < seg.in_len);
            }
        }
    }

    #[test]
    fn subsampled_windows_are_even() {
        let plan = AxisPlan {
            axis: Axis::Horizontal,
            input: 512,
            output: 1320,
            max_out: 1024,
            max_in: 4096,
            granule: 2,
        };
        for seg in plan.plan(true, None).unwrap() {
            assert_eq!(seg.in_len % 2, 0);
            assert!(seg.in_off + seg.in_len <= 512);
        }
    }

    #[test]
    fn seam_band_grows_with_upscale() {
        assert_eq!(seam_lines(1080, 1080), 4);
        assert_eq!(seam_lines(540, 2160), 8);
    }
}
