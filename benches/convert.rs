// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use criterion::{criterion_group, criterion_main, Criterion};
use edgefirst_ipu::{
    config::{Capabilities, HardwareProfile, SchedulerConfig},
    format::{self, frame_size, FourCC},
    IpuDevice, Input, Output, Task,
};
use std::time::Duration;

pub fn benchmark_convert(c: &mut Criterion) {
    let fmts = [format::RGBA, format::YUYV, format::NV12];
    let dims = [(320, 240), (640, 480), (1280, 720), (1920, 1080), (3840, 2160)];
    let caps = Capabilities {
        max_out_width: 2048,
        max_out_height: 2048,
        max_in_width: 4096,
        max_in_height: 4096,
        max_vdi_in_width: 4096,
        max_downsize: 8,
    };
    let config = SchedulerConfig::new(HardwareProfile::default()).with_capabilities(caps);
    let (device, _ipu) = IpuDevice::software(config, Duration::ZERO).unwrap();

    for src_fmt in fmts {
        let mut group = c.benchmark_group(format!("convert/{src_fmt}"));
        group.sample_size(10);
        for src_dim in dims {
            for dst_dim in dims {
                let Some(task) = task(&device, (src_fmt, src_dim), (format::RGBA, dst_dim)) else {
                    continue;
                };
                group.bench_with_input(
                    format!("{}x{}-{}x{}", src_dim.0, src_dim.1, dst_dim.0, dst_dim.1),
                    &task,
                    |b, task| b.iter(|| device.submit(task).unwrap()),
                );
            }
        }
        group.finish();
    }
}

fn task(device: &IpuDevice, src: (FourCC, (u32, u32)), dst: (FourCC, (u32, u32))) -> Option<Task> {
    let (fmt, (w, h)) = src;
    let input = device.allocate(frame_size(fmt, w, h)).unwrap();
    let input = Input::new(input.paddr(), w, h, fmt);
    let (fmt, (w, h)) = dst;
    let output = device.allocate(frame_size(fmt, w, h)).unwrap();
    let output = Output::new(output.paddr(), w, h, fmt);
    let task = Task::new(input, output).with_timeout(Duration::from_secs(10));
    // Skip pairs the hardware cannot do, such as downsizing past the limit.
    device.check(&task).ok().map(|_| task)
}

criterion_group!(benches, benchmark_convert);
criterion_main!(benches);
