// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Task validation: normalises the geometry of a request, picks the
//! processing blocks it needs and decides whether it must be split.
//!
//! Validation is pure. It never touches hardware or memory, so a request can
//! be checked without being run and a rejected request never reaches the
//! queue.

use crate::{
    config::Capabilities,
    error::{Axis, SurfaceKind, TaskError, Warnings},
    format::{self, Family, FourCC, PlaneLayout},
    split::{self, SplitMode, Stripe},
    task::{Alpha, Deinterlace, Rect, Rotation, Task},
};
use core::fmt;
use tracing::{debug, instrument};

/// Crop width and height are truncated to this multiple.
const CROP_ALIGN: u32 = 8;

/// Processing blocks a task needs.
#[derive(Copy, Clone, Default, PartialEq, Eq)]
pub struct Mode(u8);

impl Mode {
    /// Image converter: resize, colour conversion, overlay, flips.
    pub const IC: Mode = Mode(0x1);
    /// Rotation unit.
    pub const ROT: Mode = Mode(0x2);
    /// Deinterlacer, which also resizes and converts.
    pub const VDI: Mode = Mode(0x4);

    pub fn empty() -> Self {
        Mode(0)
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn contains(self, other: Mode) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Mode) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Mode) {
        self.0 &= !other.0;
    }

    pub fn bits(self) -> u8 {
        self.0
    }
}

impl fmt::Debug for Mode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut parts = Vec::new();
        if self.contains(Mode::IC) {
            parts.push("IC");
        }
        if self.contains(Mode::ROT) {
            parts.push("ROT");
        }
        if self.contains(Mode::VDI) {
            parts.push("VDI");
        }
        write!(f, "{}", parts.join("+"))
    }
}

/// A surface with its normalised crop and the byte layout of that crop.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Surface {
    pub paddr: u64,
    pub width: u32,
    pub height: u32,
    pub format: FourCC,
    pub crop: Rect,
    pub layout: PlaneLayout,
}

impl Surface {
    fn new(
        paddr: u64,
        width: u32,
        height: u32,
        format: FourCC,
        crop: Rect,
    ) -> Self {
        Surface {
            paddr,
            width,
            height,
            format,
            crop,
            layout: format::plane_layout(format, width, height, crop.x, crop.y),
        }
    }

    /// Bus address of the first luma byte of the crop.
    pub fn window(&self) -> u64 {
        self.paddr + self.layout.offset
    }
}

/// A validated task: everything the scheduler needs to program it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedTask {
    pub mode: Mode,
    pub input: Surface,
    pub output: Surface,
    pub overlay: Option<Surface>,
    pub alpha: Option<Alpha>,
    pub color_key: Option<u32>,
    pub deinterlace: Option<Deinterlace>,
    /// Size the resizer produces, before rotation.
    pub ic_width: u32,
    pub ic_height: u32,
    pub rotation: Rotation,
    pub split: SplitMode,
    pub stripes: Vec<Stripe>,
    pub warnings: Warnings,
}

impl ResolvedTask {
    pub fn is_split(&self) -> bool {
        self.split != SplitMode::None
    }

    pub fn is_deinterlaced(&self) -> bool {
        self.mode.contains(Mode::VDI)
    }
}

fn supported(surface: SurfaceKind, format: FourCC) -> Result<(), TaskError> {
    match format.family() {
        Some(_) => Ok(()),
        None => Err(TaskError::UnsupportedFormat { surface, format }),
    }
}

/// Normalises a crop: width and height truncated to multiples of 8 and, for
/// YUV formats, the origin moved to even coordinates.
fn normalize_crop(
    crop: Option<Rect>,
    width: u32,
    height: u32,
    format: FourCC,
) -> Option<Rect> {
    let mut r = crop.unwrap_or(Rect::new(0, 0, width, height));
    r.width -= r.width % CROP_ALIGN;
    r.height -= r.height % CROP_ALIGN;
    if format.is_yuv() {
        r.x &= !1;
        r.y &= !1;
    }
    r.fits(width, height).then_some(r)
}

fn chroma_unaligned(layout: &PlaneLayout, format: FourCC) -> bool {
    format.family().is_some_and(|f| f.is_planar()) && !layout.chroma_aligned()
}

/// Checks `task` against `caps` and resolves it for execution.
#[instrument(skip_all, fields(
    input = %task.input.format,
    output = %task.output.format,
))]
pub fn check(task: &Task, caps: &Capabilities) -> Result<ResolvedTask, TaskError> {
    resolve(task, caps).inspect_err(|e| debug!("rejected: {e}"))
}

fn resolve(task: &Task, caps: &Capabilities) -> Result<ResolvedTask, TaskError> {
    let (input, output) = (&task.input, &task.output);
    supported(SurfaceKind::Input, input.format)?;
    supported(SurfaceKind::Output, output.format)?;
    if let Some(ov) = &task.overlay {
        supported(SurfaceKind::Overlay, ov.format)?;
    }

    if format::checked_row_stride(input.format, input.width).is_none() {
        return Err(TaskError::InvalidCrop(SurfaceKind::Input));
    }
    if format::checked_row_stride(output.format, output.width).is_none() {
        return Err(TaskError::InvalidCrop(SurfaceKind::Output));
    }
    if let Some(ov) = &task.overlay {
        if format::checked_row_stride(ov.format, ov.width).is_none() {
            return Err(TaskError::InvalidOverlayCrop);
        }
    }

    let in_crop = normalize_crop(input.crop, input.width, input.height, input.format)
        .ok_or(TaskError::InvalidCrop(SurfaceKind::Input))?;
    let out_crop = normalize_crop(output.crop, output.width, output.height, output.format)
        .ok_or(TaskError::InvalidCrop(SurfaceKind::Output))?;

    let rotation = output.rotation;
    let (ic_width, ic_height) = if rotation.is_rotated() {
        (out_crop.height, out_crop.width)
    } else {
        (out_crop.width, out_crop.height)
    };

    let deinterlace = input.deinterlace.is_some();
    if deinterlace && task.overlay.is_some() {
        return Err(TaskError::OverlayWithDeinterlace);
    }

    let overlay = match &task.overlay {
        Some(ov) => {
            let crop = normalize_crop(ov.crop, ov.width, ov.height, ov.format)
                .ok_or(TaskError::InvalidOverlayCrop)?;
            if (crop.width, crop.height) != (ic_width, ic_height) {
                return Err(TaskError::OverlaySizeMismatch {
                    overlay: (crop.width, crop.height),
                    output: (ic_width, ic_height),
                });
            }
            Some(Surface::new(ov.paddr, ov.width, ov.height, ov.format, crop))
        }
        None => None,
    };

    if in_crop.width > caps.max_in_width || in_crop.height > caps.max_in_height {
        return Err(TaskError::InputOverLimit {
            width: in_crop.width,
            height: in_crop.height,
        });
    }

    let mut mode = Mode::empty();
    let resize = (in_crop.width, in_crop.height) != (ic_width, ic_height);
    let flip = rotation != Rotation::Rotation0 && !rotation.is_rotated();
    if resize || input.format != output.format || overlay.is_some() || flip {
        mode.insert(Mode::IC);
    }
    if rotation.is_rotated() {
        mode.insert(Mode::ROT);
    }
    if deinterlace {
        mode.insert(Mode::VDI);
        mode.remove(Mode::IC);
    }
    if mode.is_empty() {
        return Err(TaskError::NoProcessingNeeded);
    }

    let max_downsize = caps.max_downsize as u64;
    if in_crop.width as u64 > ic_width as u64 * max_downsize {
        return Err(TaskError::DownsizeOverLimit(Axis::Horizontal));
    }
    if in_crop.height as u64 > ic_height as u64 * max_downsize {
        return Err(TaskError::DownsizeOverLimit(Axis::Vertical));
    }

    let split = SplitMode::from_axes(
        ic_width > caps.max_out_width || (deinterlace && in_crop.width > caps.max_vdi_in_width),
        ic_height > caps.max_out_height,
    );
    if split != SplitMode::None && rotation.is_rotated() {
        return Err(TaskError::SplitWithRotation);
    }
    let stripes = split::plan(
        caps,
        (in_crop.width, in_crop.height),
        (ic_width, ic_height),
        split,
        deinterlace,
        input.format.family().map_or((1, 1), Family::subsampling),
    )?;

    let input = Surface::new(input.paddr, input.width, input.height, input.format, in_crop);
    let output = Surface::new(
        output.paddr,
        output.width,
        output.height,
        output.format,
        out_crop,
    );

    let mut warnings = Warnings::empty();
    if chroma_unaligned(&input.layout, input.format) {
        warnings.insert(Warnings::INPUT_OFFSET_UNALIGNED);
    }
    if chroma_unaligned(&output.layout, output.format) {
        warnings.insert(Warnings::OUTPUT_OFFSET_UNALIGNED);
    }
    if let Some(ov) = &overlay {
        if chroma_unaligned(&ov.layout, ov.format) {
            warnings.insert(Warnings::OVERLAY_OFFSET_UNALIGNED);
        }
    }

    debug!(?mode, ?split, ?warnings, ic_width, ic_height, "task resolved");
    Ok(ResolvedTask {
        mode,
        input,
        output,
        overlay,
        alpha: task.overlay.as_ref().map(|ov| ov.alpha),
        color_key: task.overlay.as_ref().and_then(|ov| ov.color_key),
        deinterlace: task.input.deinterlace,
        ic_width,
        ic_height,
        rotation,
        split,
        stripes,
        warnings,
    })
}
