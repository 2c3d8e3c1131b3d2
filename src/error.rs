// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Terminal failure kinds of a task and the non-fatal check warnings.

use crate::format::FourCC;
use core::fmt;

/// Surface of a task a validation error refers to.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SurfaceKind {
    Input,
    Output,
    Overlay,
}

impl fmt::Display for SurfaceKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SurfaceKind::Input => write!(f, "input"),
            SurfaceKind::Output => write!(f, "output"),
            SurfaceKind::Overlay => write!(f, "overlay"),
        }
    }
}

/// Image axis a split or resize error refers to.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Axis {
    Horizontal,
    Vertical,
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Axis::Horizontal => write!(f, "horizontal"),
            Axis::Vertical => write!(f, "vertical"),
        }
    }
}

/// Coarse category of a [`TaskError`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed request, rejected before queuing.
    Validation,
    /// No hardware slot became free in time; the request may be retried.
    Resource,
    /// The channel programmer refused a configuration step.
    Programming,
    /// The hardware did not finish the frame.
    Execution,
}

/// Failures reported by the channel programmer, one per programming step.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    #[error("channel init failed: {0}")]
    Init(String),
    #[error("channel buffer init failed: {0}")]
    BufferInit(String),
    #[error("channel link failed: {0}")]
    Link(String),
    #[error("channel unlink failed: {0}")]
    Unlink(String),
    #[error("channel enable failed: {0}")]
    Enable(String),
    #[error("channel disable failed: {0}")]
    Disable(String),
    #[error("buffer select failed: {0}")]
    BufferSelect(String),
    #[error("no irq available: {0}")]
    NoIrq(String),
    #[error("irq registration failed: {0}")]
    IrqRegistration(String),
}

/// Terminal failure of a task.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    #[error("invalid {0} crop")]
    InvalidCrop(SurfaceKind),
    #[error("invalid overlay crop")]
    InvalidOverlayCrop,
    #[error("overlay {overlay:?} does not fit output {output:?}")]
    OverlaySizeMismatch {
        overlay: (u32, u32),
        output: (u32, u32),
    },
    #[error("input {width}x{height} exceeds the input ceiling")]
    InputOverLimit { width: u32, height: u32 },
    #[error("overlay is not supported with deinterlacing")]
    OverlayWithDeinterlace,
    #[error("no processing needed")]
    NoProcessingNeeded,
    #[error("unsupported {surface} format {format}")]
    UnsupportedFormat { surface: SurfaceKind, format: FourCC },
    #[error("{0} downsize exceeds the resizer limit")]
    DownsizeOverLimit(Axis),
    #[error("{0} split stripe input overflows the crop")]
    SplitInputOverflow(Axis),
    #[error("{0} split stripe output exceeds the unit ceiling")]
    SplitOutputOverflow(Axis),
    #[error("split is not supported with 90 degree rotation")]
    SplitWithRotation,

    #[error("timed out waiting for a hardware slot")]
    ResourceTimeout,

    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error("timed out waiting for hardware completion")]
    HardwareTimeout,
    #[error("task failed: {0}")]
    Generic(String),
    #[error("out of memory")]
    OutOfMemory,
}

impl TaskError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TaskError::ResourceTimeout => ErrorKind::Resource,
            TaskError::Channel(_) => ErrorKind::Programming,
            TaskError::HardwareTimeout | TaskError::Generic(_) | TaskError::OutOfMemory => {
                ErrorKind::Execution
            }
            _ => ErrorKind::Validation,
        }
    }

    /// True when resubmitting the same request later may succeed.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Resource
    }
}

/// Non-fatal findings of the validator.
#[derive(Copy, Clone, Default, PartialEq, Eq)]
pub struct Warnings(u8);

impl Warnings {
    pub const INPUT_OFFSET_UNALIGNED: Warnings = Warnings(0x1);
    pub const OUTPUT_OFFSET_UNALIGNED: Warnings = Warnings(0x2);
    pub const OVERLAY_OFFSET_UNALIGNED: Warnings = Warnings(0x4);

    pub fn empty() -> Self {
        Warnings(0)
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn contains(self, other: Warnings) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Warnings) {
        self.0 |= other.0;
    }

    pub fn bits(self) -> u8 {
        self.0
    }
}

impl fmt::Debug for Warnings {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let names = [
            (Warnings::INPUT_OFFSET_UNALIGNED, "INPUT_OFFSET_UNALIGNED"),
            (Warnings::OUTPUT_OFFSET_UNALIGNED, "OUTPUT_OFFSET_UNALIGNED"),
            (Warnings::OVERLAY_OFFSET_UNALIGNED, "OVERLAY_OFFSET_UNALIGNED"),
        ];
        let set: Vec<&str> = names
            .iter()
            .filter(|(w, _)| self.contains(*w))
            .map(|(_, n)| *n)
            .collect();
        write!(f, "Warnings({})", set.join(" | "))
    }
}
