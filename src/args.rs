// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use clap::Parser;
use edgefirst_ipu::{
    format::FourCC,
    task::{Deinterlace, Motion, Rotation},
};
use std::path::PathBuf;

/// Output orientation of the demo workload.
#[derive(clap::ValueEnum, Clone, Debug, PartialEq, Copy)]
pub enum RotationSetting {
    /// No rotation
    None,
    /// Flip top-bottom
    Vflip,
    /// Flip left-right
    Hflip,
    /// Rotate 180 degrees
    R180,
    /// Rotate 90 degrees clockwise
    R90,
    /// Rotate 90 degrees clockwise then flip top-bottom
    R90Vflip,
    /// Rotate 90 degrees clockwise then flip left-right
    R90Hflip,
    /// Rotate 90 degrees counter-clockwise
    R270,
}

impl From<RotationSetting> for Rotation {
    fn from(value: RotationSetting) -> Self {
        match value {
            RotationSetting::None => Rotation::Rotation0,
            RotationSetting::Vflip => Rotation::VerticalFlip,
            RotationSetting::Hflip => Rotation::HorizontalFlip,
            RotationSetting::R180 => Rotation::Rotation180,
            RotationSetting::R90 => Rotation::Rotation90,
            RotationSetting::R90Vflip => Rotation::Rotation90VerticalFlip,
            RotationSetting::R90Hflip => Rotation::Rotation90HorizontalFlip,
            RotationSetting::R270 => Rotation::Rotation270,
        }
    }
}

/// Deinterlacer motion setting.
#[derive(clap::ValueEnum, Clone, Debug, PartialEq, Copy)]
pub enum MotionSetting {
    /// Weave both fields
    Low,
    /// Interpolate missing lines
    Medium,
    /// Double the kept field
    High,
}

impl From<MotionSetting> for Deinterlace {
    fn from(value: MotionSetting) -> Self {
        Deinterlace {
            motion: match value {
                MotionSetting::Low => Motion::Low,
                MotionSetting::Medium => Motion::Medium,
                MotionSetting::High => Motion::High,
            },
            ..Deinterlace::default()
        }
    }
}

/// Command-line arguments for the EdgeFirst IPU scheduler.
///
/// Runs a workload of identical transform tasks through the scheduler,
/// backed by the software IPU, and prints a JSON summary. Arguments can be
/// given on the command line or through environment variables.
///
/// # Example
///
/// ```bash
/// edgefirst-ipu --profile imx6q --input-size 3840 2160 --output-size 3840 2160 \
///     --input-format YUYV --output-format RGBA --tasks 8
///
/// export IPU_PROFILE=imx6dl
/// edgefirst-ipu --rotation r90
/// ```
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Hardware profile preset (imx51, imx53, imx6dl, imx6q)
    #[arg(short, long, env = "IPU_PROFILE", default_value = "imx6q")]
    pub profile: String,

    /// JSON scheduler configuration, overrides the profile
    #[arg(short, long, env = "IPU_CONFIG")]
    pub config: Option<PathBuf>,

    /// Worker threads (default: one per hardware slot)
    #[arg(short, long, env = "IPU_WORKERS")]
    pub workers: Option<usize>,

    /// Number of IPU units, overrides the profile
    #[arg(long, env = "IPU_UNITS")]
    pub units: Option<u8>,

    /// Input resolution in pixels (width height)
    #[arg(
        long,
        env = "INPUT_SIZE",
        default_value = "1920 1080",
        value_delimiter = ' ',
        num_args = 2
    )]
    pub input_size: Vec<u32>,

    /// Input pixel format as a four character code
    #[arg(long, env = "INPUT_FORMAT", default_value = "YUYV")]
    pub input_format: FourCC,

    /// Output resolution in pixels (width height)
    #[arg(
        long,
        env = "OUTPUT_SIZE",
        default_value = "1280 720",
        value_delimiter = ' ',
        num_args = 2
    )]
    pub output_size: Vec<u32>,

    /// Output pixel format as a four character code
    #[arg(long, env = "OUTPUT_FORMAT", default_value = "RGBA")]
    pub output_format: FourCC,

    /// Output orientation
    #[arg(long, env = "ROTATION", default_value = "none", value_enum)]
    pub rotation: RotationSetting,

    /// Deinterlace the input with the given motion setting
    #[arg(long, env = "DEINTERLACE", value_enum)]
    pub deinterlace: Option<MotionSetting>,

    /// Number of tasks to run
    #[arg(short, long, env = "TASKS", default_value = "16")]
    pub tasks: usize,

    /// Submitting threads
    #[arg(long, env = "CONCURRENCY", default_value = "4")]
    pub concurrency: usize,

    /// Back buffers with the Linux CMA DMA heap instead of process memory
    #[arg(long, env = "IPU_CMA")]
    pub cma: bool,

    /// Emulated hardware frame time in milliseconds
    #[arg(long, env = "LATENCY_MS", default_value = "2")]
    pub latency_ms: u64,

    /// Task timeout in milliseconds (default: the configured default)
    #[arg(long, env = "TIMEOUT_MS")]
    pub timeout_ms: Option<u64>,

    /// Enable verbose debug logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Enable Tracy profiler for performance analysis
    #[arg(long, env = "TRACY")]
    pub tracy: bool,
}
