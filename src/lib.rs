// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! # EdgeFirst IPU Task Scheduler
//!
//! Accepts image transform requests (color conversion, resize, rotation,
//! flips, overlay blending and deinterlacing), validates them against the
//! capabilities of the target Image Processing Unit, splits oversized
//! outputs into stripes, and runs them on a bounded pool of hardware
//! execution slots with per-task deadlines.
//!
//! ## Features
//!
//! - **Validation**: Crops are normalized to hardware alignment and the
//!   processing mode is derived from the request, so errors surface before
//!   any hardware is touched.
//! - **Splitting**: Outputs above the per-unit ceiling are cut into up to
//!   four stripes with resize phases that reproduce the unsplit mapping.
//! - **Arbitration**: Two slots per IPU unit, handed out under one lock and
//!   released by RAII guards.
//! - **Software IPU**: A channel programmer that enforces the hardware
//!   programming rules and executes frames on process memory, for hosts
//!   without the hardware.
//!
//! ## Example
//!
//! ```no_run
//! use edgefirst_ipu::{
//!     config::SchedulerConfig,
//!     device::IpuDevice,
//!     format::{frame_size, RGBA, YUYV},
//!     task::{Input, Output, Task},
//! };
//! use std::time::Duration;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let (device, _ipu) = IpuDevice::software(SchedulerConfig::default(), Duration::ZERO)?;
//!
//! let src = device.allocate(frame_size(YUYV, 1920, 1080))?;
//! let dst = device.allocate(frame_size(RGBA, 1280, 720))?;
//!
//! let task = Task::new(
//!     Input::new(src.paddr(), 1920, 1080, YUYV),
//!     Output::new(dst.paddr(), 1280, 720, RGBA),
//! );
//! let report = device.submit(&task)?;
//! println!("{:?} in {:?}", report.mode, report.elapsed);
//! # Ok(())
//! # }
//! ```
//!
//! ## Safety
//!
//! Mapping CMA DMA heap buffers uses `unsafe` code, isolated in
//! [`memory`] and wrapped with safe APIs.

pub mod arbiter;
pub mod channel;
pub mod config;
pub mod device;
pub mod emulator;
pub mod error;
pub mod format;
pub mod memory;
pub mod pipeline;
pub mod scheduler;
pub mod seam;
pub mod split;
pub mod task;
pub mod validate;

pub use config::{Capabilities, HardwareProfile, SchedulerConfig};
pub use device::{IpuDevice, TaskReport};
pub use error::{ChannelError, ErrorKind, TaskError, Warnings};
pub use task::{Alpha, Deinterlace, Input, Output, Overlay, Rect, Rotation, Task, TaskId};
pub use validate::{Mode, ResolvedTask};
