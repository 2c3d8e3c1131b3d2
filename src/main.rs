// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

mod args;

use args::Args;
use clap::Parser;
use edgefirst_ipu::{
    config::{HardwareProfile, SchedulerConfig},
    device::IpuDevice,
    format::frame_size,
    memory::{CmaAllocator, DmaBuffer, MemoryMap},
    task::{Input, Output, Rotation, Task},
    ErrorKind, TaskError,
};
use std::{
    collections::BTreeMap,
    error::Error,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    thread,
    time::{Duration, Instant},
};
use tracing::{error, info, warn};
use tracing_subscriber::{filter::LevelFilter, layer::SubscriberExt, Layer, Registry};

fn init_tracing(args: &Args) -> Result<(), Box<dyn Error>> {
    let level = if args.verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    let stdout_log = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_thread_names(true)
        .with_filter(level);

    let (journald, journald_error) = match tracing_journald::layer() {
        Ok(layer) => (Some(layer.with_filter(level)), None),
        Err(e) => (None, Some(e)),
    };

    #[cfg(feature = "tracy")]
    let tracy = if args.tracy {
        let _ = tracy_client::Client::start();
        Some(tracing_tracy::TracyLayer::default().with_filter(LevelFilter::TRACE))
    } else {
        None
    };

    let subscriber = Registry::default().with(stdout_log).with(journald);
    #[cfg(feature = "tracy")]
    let subscriber = subscriber.with(tracy);

    tracing::subscriber::set_global_default(subscriber)?;
    tracing_log::LogTracer::init()?;

    if let Some(e) = journald_error {
        warn!("journald unavailable: {e}");
    }
    if cfg!(not(feature = "tracy")) && args.tracy {
        warn!("built without the tracy feature, --tracy ignored");
    }
    Ok(())
}

fn load_config(args: &Args) -> Result<SchedulerConfig, Box<dyn Error>> {
    let mut config = match &args.config {
        Some(path) => SchedulerConfig::from_file(path)?,
        None => {
            let profile = HardwareProfile::preset(&args.profile).ok_or_else(|| {
                format!(
                    "unknown profile '{}', expected one of {:?}",
                    args.profile,
                    HardwareProfile::PRESETS
                )
            })?;
            SchedulerConfig::new(profile)
        }
    };
    if let Some(units) = args.units {
        if units == 0 {
            return Err("at least one unit is required".into());
        }
        config = config.with_units(units);
    }
    if let Some(workers) = args.workers {
        config = config.with_workers(workers);
    }
    Ok(config)
}

/// Bands of grey ramps so conversions produce a recognizable picture.
fn fill_pattern(buffer: &DmaBuffer) {
    buffer.write(|bytes| {
        for (i, b) in bytes.iter_mut().enumerate() {
            *b = ((i / 7) % 251) as u8;
        }
    });
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    init_tracing(&args)?;

    let config = load_config(&args)?;
    let (in_w, in_h) = (args.input_size[0], args.input_size[1]);
    let (out_w, out_h) = (args.output_size[0], args.output_size[1]);
    let rotation = Rotation::from(args.rotation);

    let memory = if args.cma {
        MemoryMap::with_allocator(Box::new(CmaAllocator))
    } else {
        MemoryMap::new()
    };
    let (device, ipu) = IpuDevice::software_with_memory(
        config,
        Duration::from_millis(args.latency_ms),
        Arc::new(memory),
    )?;
    info!(
        profile = %device.config().profile.name,
        units = device.config().profile.units,
        workers = device.workers(),
        "software IPU ready"
    );

    let source = device.allocate(frame_size(args.input_format, in_w, in_h))?;
    fill_pattern(&source);
    let concurrency = args.concurrency.max(1);
    let mut targets = Vec::with_capacity(concurrency);
    for _ in 0..concurrency {
        targets.push(device.allocate(frame_size(args.output_format, out_w, out_h))?);
    }

    let mut input = Input::new(source.paddr(), in_w, in_h, args.input_format);
    if let Some(motion) = args.deinterlace {
        input = input.with_deinterlace(motion.into());
    }
    let template = |paddr: u64| {
        let mut task = Task::new(
            input.clone(),
            Output::new(paddr, out_w, out_h, args.output_format).with_rotation(rotation),
        );
        if let Some(ms) = args.timeout_ms {
            task = task.with_timeout(Duration::from_millis(ms));
        }
        task
    };

    let resolved = device.check(&template(targets[0].paddr())).map_err(|e| {
        error!("task rejected: {e}");
        e
    })?;
    info!(
        mode = ?resolved.mode,
        split = ?resolved.split,
        stripes = resolved.stripes.len(),
        "workload resolved"
    );

    let next = AtomicUsize::new(0);
    let completed = AtomicUsize::new(0);
    let failures: Mutex<BTreeMap<String, usize>> = Mutex::new(BTreeMap::new());
    let latencies: Mutex<Vec<Duration>> = Mutex::new(Vec::with_capacity(args.tasks));

    let start = Instant::now();
    thread::scope(|scope| {
        for target in &targets {
            let task = template(target.paddr());
            let (device, next, completed, failures, latencies) =
                (&device, &next, &completed, &failures, &latencies);
            scope.spawn(move || {
                while next.fetch_add(1, Ordering::Relaxed) < args.tasks {
                    match device.submit(&task) {
                        Ok(report) => {
                            completed.fetch_add(1, Ordering::Relaxed);
                            if let Ok(mut l) = latencies.lock() {
                                l.push(report.elapsed);
                            }
                        }
                        Err(e) => {
                            if e.kind() != ErrorKind::Resource {
                                warn!("task failed: {e}");
                            }
                            if let Ok(mut f) = failures.lock() {
                                *f.entry(failure_name(&e)).or_default() += 1;
                            }
                        }
                    }
                }
            });
        }
    });
    let wall = start.elapsed();

    let mut latencies = latencies.into_inner().unwrap_or_default();
    latencies.sort();
    let percentile = |p: usize| {
        latencies
            .get((latencies.len() * p / 100).min(latencies.len().saturating_sub(1)))
            .map(|d| d.as_secs_f64() * 1000.0)
    };

    let summary = serde_json::json!({
        "profile": device.config().profile.name,
        "workers": device.workers(),
        "slots": device.arbiter().slots(),
        "mode": format!("{:?}", resolved.mode),
        "stripes": resolved.stripes.len(),
        "tasks": args.tasks,
        "completed": completed.load(Ordering::Relaxed),
        "failed": failures.into_inner().unwrap_or_default(),
        "frames": ipu.frames(),
        "peak_chains": ipu.peak_chains(),
        "peak_slots": device.arbiter().peak(),
        "wall_ms": wall.as_secs_f64() * 1000.0,
        "latency_ms": {
            "p50": percentile(50),
            "p90": percentile(90),
            "max": latencies.last().map(|d| d.as_secs_f64() * 1000.0),
        },
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn failure_name(error: &TaskError) -> String {
    let name = format!("{error:?}");
    match name.find(|c: char| matches!(c, '(' | ' ' | '{')) {
        Some(end) => name[..end].to_string(),
        None => name,
    }
}
