// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use criterion::{criterion_group, criterion_main, Criterion};
use edgefirst_ipu::{
    config::{Capabilities, HardwareProfile},
    split::{plan, SplitMode},
};
use std::hint::black_box;

pub fn benchmark_plan(c: &mut Criterion) {
    let caps = Capabilities {
        max_out_width: 2048,
        max_out_height: 2048,
        ..HardwareProfile::default().capabilities
    };
    let cases = [
        ((1920, 1080), (3840, 2160), SplitMode::Quad, false),
        ((1280, 720), (3840, 1080), SplitMode::LeftRight, false),
        ((720, 480), (1920, 4096), SplitMode::UpDown, false),
        ((720, 1080), (1920, 2160), SplitMode::Quad, true),
    ];

    let mut group = c.benchmark_group("plan");
    for (input, output, mode, deinterlace) in cases {
        group.bench_with_input(
            format!(
                "{}x{}-{}x{}-{mode:?}{}",
                input.0,
                input.1,
                output.0,
                output.1,
                if deinterlace { "-vdi" } else { "" }
            ),
            &(input, output),
            |b, &(input, output)| {
                b.iter(|| plan(&caps, black_box(input), black_box(output), mode, deinterlace, (2, 1)))
            },
        );
    }
    group.finish();
}

criterion_group!(benches, benchmark_plan);
criterion_main!(benches);
