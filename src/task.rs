// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Task descriptors: what a caller asks the IPU to do.
//!
//! A [`Task`] is a plain value describing one transform from an input
//! surface to an output surface, optionally composing an overlay or
//! deinterlacing the input. Surfaces are addressed by bus address, as handed
//! out by [`crate::memory::MemoryMap::allocate`].
//!
//! ```
//! use edgefirst_ipu::format::{NV12, RGBA};
//! use edgefirst_ipu::task::{Input, Output, Rotation, Task};
//!
//! let task = Task::new(
//!     Input::new(0x1000_0000, 1920, 1080, NV12),
//!     Output::new(0x2000_0000, 1280, 720, RGBA).with_rotation(Rotation::HorizontalFlip),
//! );
//! assert!(task.overlay.is_none());
//! ```

use crate::format::FourCC;
use core::fmt;
use std::time::Duration;

/// Rectangle inside a surface, in pixels.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Rect {
    /// X coordinate of top-left corner
    pub x: u32,
    /// Y coordinate of top-left corner
    pub y: u32,
    /// Width of the rectangle in pixels
    pub width: u32,
    /// Height of the rectangle in pixels
    pub height: u32,
}

impl Rect {
    pub const fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Rect {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// True when the rectangle lies inside a `width` x `height` surface.
    pub fn fits(&self, width: u32, height: u32) -> bool {
        self.width > 0
            && self.height > 0
            && self.x as u64 + self.width as u64 <= width as u64
            && self.y as u64 + self.height as u64 <= height as u64
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }
}

/// Output orientation. Discriminants match the IPU rotation unit encoding.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Rotation {
    #[default]
    Rotation0 = 0,
    /// Flip top-bottom
    VerticalFlip = 1,
    /// Flip left-right
    HorizontalFlip = 2,
    Rotation180 = 3,
    /// Rotate 90 degrees clockwise
    Rotation90 = 4,
    Rotation90VerticalFlip = 5,
    Rotation90HorizontalFlip = 6,
    /// Rotate 90 degrees counter-clockwise
    Rotation270 = 7,
}

impl Rotation {
    /// Modes at or above 90 degrees need the rotation unit and swap the
    /// dimensions of the image.
    pub fn is_rotated(self) -> bool {
        self as u8 >= Rotation::Rotation90 as u8
    }

    /// Flip component executed by the resizer; meaningful below 90 degrees.
    pub fn hflip(self) -> bool {
        matches!(self, Rotation::HorizontalFlip | Rotation::Rotation180)
    }

    pub fn vflip(self) -> bool {
        matches!(self, Rotation::VerticalFlip | Rotation::Rotation180)
    }
}

/// Motion compensation level of the deinterlacer.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Motion {
    Low,
    #[default]
    Medium,
    High,
}

/// Which field of an interlaced frame comes first in time.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum FieldOrder {
    #[default]
    TopFirst,
    BottomFirst,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Deinterlace {
    pub motion: Motion,
    pub field_order: FieldOrder,
}

/// Source surface of a task.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Input {
    pub paddr: u64,
    pub width: u32,
    pub height: u32,
    pub format: FourCC,
    /// Region to read; the full surface when `None`.
    pub crop: Option<Rect>,
    pub deinterlace: Option<Deinterlace>,
}

impl Input {
    pub fn new(paddr: u64, width: u32, height: u32, format: FourCC) -> Self {
        Input {
            paddr,
            width,
            height,
            format,
            crop: None,
            deinterlace: None,
        }
    }

    pub fn with_crop(mut self, crop: Rect) -> Self {
        self.crop = Some(crop);
        self
    }

    pub fn with_deinterlace(mut self, deinterlace: Deinterlace) -> Self {
        self.deinterlace = Some(deinterlace);
        self
    }
}

/// Destination surface of a task.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Output {
    pub paddr: u64,
    pub width: u32,
    pub height: u32,
    pub format: FourCC,
    /// Region to write; the full surface when `None`.
    pub crop: Option<Rect>,
    pub rotation: Rotation,
}

impl Output {
    pub fn new(paddr: u64, width: u32, height: u32, format: FourCC) -> Self {
        Output {
            paddr,
            width,
            height,
            format,
            crop: None,
            rotation: Rotation::Rotation0,
        }
    }

    pub fn with_crop(mut self, crop: Rect) -> Self {
        self.crop = Some(crop);
        self
    }

    pub fn with_rotation(mut self, rotation: Rotation) -> Self {
        self.rotation = rotation;
        self
    }
}

/// How overlay pixels are weighted against the background.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Alpha {
    /// One alpha value for the whole overlay.
    Global(u8),
    /// An 8-bit alpha plane the size of the overlay surface.
    Local { paddr: u64 },
}

/// Graphics plane composed over the processed input.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Overlay {
    pub paddr: u64,
    pub width: u32,
    pub height: u32,
    pub format: FourCC,
    pub crop: Option<Rect>,
    pub alpha: Alpha,
    /// 0xRRGGBB value treated as fully transparent.
    pub color_key: Option<u32>,
}

impl Overlay {
    pub fn new(paddr: u64, width: u32, height: u32, format: FourCC, alpha: Alpha) -> Self {
        Overlay {
            paddr,
            width,
            height,
            format,
            crop: None,
            alpha,
            color_key: None,
        }
    }

    pub fn with_crop(mut self, crop: Rect) -> Self {
        self.crop = Some(crop);
        self
    }

    pub fn with_color_key(mut self, key: u32) -> Self {
        self.color_key = Some(key);
        self
    }
}

/// One transform request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Task {
    pub input: Input,
    pub output: Output,
    pub overlay: Option<Overlay>,
    /// Budget for the whole request; the configured default when `None` or
    /// below the configured minimum.
    pub timeout: Option<Duration>,
}

impl Task {
    pub fn new(input: Input, output: Output) -> Self {
        Task {
            input,
            output,
            overlay: None,
            timeout: None,
        }
    }

    pub fn with_overlay(mut self, overlay: Overlay) -> Self {
        self.overlay = Some(overlay);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Position of a stripe inside its split parent, encoded in the low bits of
/// the task number.
#[derive(Copy, Clone, Default, PartialEq, Eq, Hash)]
pub struct StripeId(u8);

impl StripeId {
    pub const NONE: StripeId = StripeId(0);
    pub const LEFT: StripeId = StripeId(0x1);
    pub const RIGHT: StripeId = StripeId(0x2);
    pub const UP: StripeId = StripeId(0x4);
    pub const DOWN: StripeId = StripeId(0x8);

    pub const fn union(self, other: StripeId) -> StripeId {
        StripeId(self.0 | other.0)
    }

    pub fn contains(self, other: StripeId) -> bool {
        other.0 != 0 && self.0 & other.0 == other.0
    }

    pub fn bits(self) -> u8 {
        self.0
    }
}

impl fmt::Debug for StripeId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut name = String::new();
        if self.contains(StripeId::UP) {
            name.push_str("up");
        }
        if self.contains(StripeId::DOWN) {
            name.push_str("down");
        }
        if self.contains(StripeId::LEFT) {
            name.push_str("left");
        }
        if self.contains(StripeId::RIGHT) {
            name.push_str("right");
        }
        if name.is_empty() {
            name.push_str("full");
        }
        write!(f, "{name}")
    }
}

/// Task number. The low four bits are reserved for the [`StripeId`] of
/// sub-tasks; top level tasks carry zero there.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl TaskId {
    pub const STRIPE_BITS: u32 = 4;

    pub fn from_sequence(seq: u64) -> Self {
        TaskId(seq << Self::STRIPE_BITS)
    }

    /// Task number of the given stripe of this task.
    pub fn stripe(self, id: StripeId) -> Self {
        TaskId(self.0 | id.bits() as u64)
    }

    pub fn stripe_id(self) -> StripeId {
        StripeId((self.0 & ((1 << Self::STRIPE_BITS) - 1)) as u8)
    }

    pub fn sequence(self) -> u64 {
        self.0 >> Self::STRIPE_BITS
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl fmt::Debug for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "TaskId({:#x})", self.0)
    }
}
