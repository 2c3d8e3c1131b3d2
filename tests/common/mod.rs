// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

#![allow(dead_code)]

use edgefirst_ipu::{
    config::{Capabilities, HardwareProfile, SchedulerConfig},
    device::{IpuDevice, TaskReport},
    emulator::SoftwareIpu,
    format::{frame_size, FourCC},
    memory::DmaBuffer,
    task::Task,
};
use std::{error::Error, sync::Arc, time::Duration};

pub type TestResult<T = ()> = Result<T, Box<dyn Error>>;

/// Ceilings large enough that nothing up to 4K splits.
pub fn unlimited() -> Capabilities {
    Capabilities {
        max_in_width: 4096,
        max_in_height: 4096,
        max_out_width: 4096,
        max_out_height: 4096,
        max_vdi_in_width: 4096,
        max_downsize: 8,
    }
}

/// A 2048 pixel output ceiling: 1080p fits a unit, 4K needs four stripes.
pub fn wide() -> Capabilities {
    Capabilities {
        max_out_width: 2048,
        max_out_height: 2048,
        ..unlimited()
    }
}

/// Small ceilings so modest frames exercise every split mode.
pub fn small(max_out_width: u32, max_out_height: u32) -> Capabilities {
    Capabilities {
        max_out_width,
        max_out_height,
        ..unlimited()
    }
}

pub fn config(capabilities: Capabilities) -> SchedulerConfig {
    SchedulerConfig::new(HardwareProfile::default()).with_capabilities(capabilities)
}

pub fn device(config: SchedulerConfig, latency: Duration) -> TestResult<(IpuDevice, Arc<SoftwareIpu>)> {
    Ok(IpuDevice::software(config, latency)?)
}

pub fn surface(device: &IpuDevice, format: FourCC, width: u32, height: u32) -> TestResult<Arc<DmaBuffer>> {
    Ok(device.allocate(frame_size(format, width, height))?)
}

/// Fills `buffer` with a reproducible pseudo-random pattern.
pub fn noise(buffer: &DmaBuffer, seed: u32) {
    let mut state = seed.wrapping_mul(2_654_435_761).max(1);
    buffer.write(|bytes| {
        for b in bytes.iter_mut() {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            *b = (state >> 24) as u8;
        }
    });
}

/// Fills `buffer` with one repeated pixel.
pub fn solid(buffer: &DmaBuffer, pixel: &[u8]) {
    buffer.write(|bytes| {
        for chunk in bytes.chunks_exact_mut(pixel.len()) {
            chunk.copy_from_slice(pixel);
        }
    });
}

/// Surfaces a scenario allocated, handed to [`render`].
pub struct Scene {
    pub task: Task,
    pub output: Arc<DmaBuffer>,
}

/// Builds a scene on a fresh software device with `capabilities`, runs it
/// and returns the output bytes and the report.
pub fn render(
    capabilities: Capabilities,
    build: impl Fn(&IpuDevice) -> TestResult<Scene>,
) -> TestResult<(Vec<u8>, TaskReport)> {
    let (device, _ipu) = device(config(capabilities), Duration::ZERO)?;
    let scene = build(&device)?;
    let report = device.submit(&scene.task)?;
    Ok((scene.output.to_vec(), report))
}

/// Renders `build` once unsplit and once under `split`, returning both
/// outputs and the split report.
pub fn render_pair(
    split: Capabilities,
    build: impl Fn(&IpuDevice) -> TestResult<Scene>,
) -> TestResult<(Vec<u8>, Vec<u8>, TaskReport)> {
    let (whole, report) = render(unlimited(), &build)?;
    assert_eq!(report.stripes, 1, "reference render must not split");
    let (striped, report) = render(split, &build)?;
    Ok((whole, striped, report))
}

/// Position of the first differing byte, for readable failures.
pub fn first_difference(a: &[u8], b: &[u8]) -> Option<usize> {
    if a.len() != b.len() {
        return Some(a.len().min(b.len()));
    }
    a.iter().zip(b).position(|(x, y)| x != y)
}
