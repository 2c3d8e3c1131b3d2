// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

mod common;

use common::{small, unlimited};
use edgefirst_ipu::{
    config::Capabilities,
    error::{Axis, ErrorKind, SurfaceKind, TaskError, Warnings},
    format::{self, FourCC, GREY, I420, NV12, RGBA, RGB3, YUYV},
    split::SplitMode,
    task::{Alpha, Deinterlace, Input, Output, Overlay, Rect, Rotation, Task},
    validate::{check, Mode},
};
use std::{
    fmt,
    sync::{Arc, Mutex},
};
use tracing::{
    field::{Field, Visit},
    Event, Subscriber,
};
use tracing_subscriber::{
    layer::{Context, SubscriberExt},
    Layer, Registry,
};

const SRC: u64 = 0x1000_0000;
const DST: u64 = 0x2000_0000;
const OVL: u64 = 0x3000_0000;

fn task(input: (u32, u32, FourCC), output: (u32, u32, FourCC)) -> Task {
    Task::new(
        Input::new(SRC, input.0, input.1, input.2),
        Output::new(DST, output.0, output.1, output.2),
    )
}

fn imx6() -> Capabilities {
    Capabilities::default()
}

#[test]
fn test_convert_selects_ic() {
    let resolved = check(&task((640, 480, RGBA), (640, 480, YUYV)), &imx6()).unwrap();
    assert_eq!(resolved.mode, Mode::IC);
    assert_eq!(resolved.split, SplitMode::None);
    assert_eq!(resolved.stripes.len(), 1);
    assert_eq!(resolved.output.crop, Rect::new(0, 0, 640, 480));
    assert!(resolved.warnings.is_empty());
}

#[test]
fn test_mode_selection() {
    let caps = imx6();

    let resize = check(&task((640, 480, RGBA), (320, 240, RGBA)), &caps).unwrap();
    assert_eq!(resize.mode, Mode::IC);

    let mut flip = task((640, 480, RGBA), (640, 480, RGBA));
    flip.output.rotation = Rotation::HorizontalFlip;
    assert_eq!(check(&flip, &caps).unwrap().mode, Mode::IC);

    // Same format and size: only the rotator is needed.
    let mut rot = task((640, 480, RGBA), (480, 640, RGBA));
    rot.output.rotation = Rotation::Rotation90;
    let resolved = check(&rot, &caps).unwrap();
    assert_eq!(resolved.mode, Mode::ROT);
    assert_eq!((resolved.ic_width, resolved.ic_height), (640, 480));

    let mut both = task((640, 480, YUYV), (240, 320, RGBA));
    both.output.rotation = Rotation::Rotation270;
    let resolved = check(&both, &caps).unwrap();
    assert!(resolved.mode.contains(Mode::IC) && resolved.mode.contains(Mode::ROT));
    assert_eq!(format!("{:?}", resolved.mode), "IC+ROT");

    let mut vdi = task((720, 480, YUYV), (720, 480, YUYV));
    vdi.input = vdi.input.with_deinterlace(Deinterlace::default());
    let resolved = check(&vdi, &caps).unwrap();
    assert_eq!(resolved.mode, Mode::VDI);
    assert!(resolved.is_deinterlaced());

    let mut vdi_rot = task((720, 480, YUYV), (480, 720, YUYV));
    vdi_rot.input = vdi_rot.input.with_deinterlace(Deinterlace::default());
    vdi_rot.output.rotation = Rotation::Rotation90;
    let resolved = check(&vdi_rot, &caps).unwrap();
    assert_eq!(resolved.mode.bits(), (Mode::VDI.bits() | Mode::ROT.bits()));
}

#[test]
fn test_no_processing_needed() {
    let err = check(&task((640, 480, RGBA), (640, 480, RGBA)), &imx6()).unwrap_err();
    assert_eq!(err, TaskError::NoProcessingNeeded);
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(!err.is_retryable());
}

#[test]
fn test_unsupported_formats() {
    let err = check(&task((640, 480, GREY), (640, 480, RGBA)), &imx6()).unwrap_err();
    assert_eq!(
        err,
        TaskError::UnsupportedFormat {
            surface: SurfaceKind::Input,
            format: GREY
        }
    );

    let err = check(&task((640, 480, RGBA), (640, 480, GREY)), &imx6()).unwrap_err();
    assert!(matches!(
        err,
        TaskError::UnsupportedFormat {
            surface: SurfaceKind::Output,
            ..
        }
    ));

    let overlay = Overlay::new(OVL, 640, 480, FourCC(*b"H264"), Alpha::Global(255));
    let err = check(
        &task((640, 480, YUYV), (640, 480, RGBA)).with_overlay(overlay),
        &imx6(),
    )
    .unwrap_err();
    assert!(matches!(
        err,
        TaskError::UnsupportedFormat {
            surface: SurfaceKind::Overlay,
            ..
        }
    ));
}

#[test]
fn test_crop_rounding() {
    let mut t = task((640, 480, YUYV), (320, 240, RGBA));
    t.input.crop = Some(Rect::new(3, 5, 101, 67));
    t.output.crop = Some(Rect::new(3, 5, 101, 67));
    let resolved = check(&t, &imx6()).unwrap();
    // YUV origins move to even pixels, sizes truncate to multiples of 8.
    assert_eq!(resolved.input.crop, Rect::new(2, 4, 96, 64));
    // RGB origins stay where they are.
    assert_eq!(resolved.output.crop, Rect::new(3, 5, 96, 64));
    assert_eq!(
        resolved.input.window(),
        SRC + resolved.input.layout.offset
    );
    assert_eq!(resolved.input.layout.offset, (4 * 640 + 2) * 2);
}

#[test]
fn test_invalid_crops() {
    let mut t = task((640, 480, YUYV), (320, 240, RGBA));
    t.input.crop = Some(Rect::new(600, 0, 64, 64));
    assert_eq!(
        check(&t, &imx6()).unwrap_err(),
        TaskError::InvalidCrop(SurfaceKind::Input)
    );

    // Narrower than the crop alignment rounds to nothing.
    let mut t = task((640, 480, YUYV), (320, 240, RGBA));
    t.input.crop = Some(Rect::new(0, 0, 7, 64));
    assert_eq!(
        check(&t, &imx6()).unwrap_err(),
        TaskError::InvalidCrop(SurfaceKind::Input)
    );

    let mut t = task((640, 480, YUYV), (320, 240, RGBA));
    t.output.crop = Some(Rect::new(0, 200, 320, 48));
    assert_eq!(
        check(&t, &imx6()).unwrap_err(),
        TaskError::InvalidCrop(SurfaceKind::Output)
    );
}

#[test]
fn test_overlay_checks() {
    let base = task((640, 480, YUYV), (320, 240, RGBA));

    let fits = Overlay::new(OVL, 320, 240, RGBA, Alpha::Global(128)).with_color_key(0x00ff00);
    let resolved = check(&base.clone().with_overlay(fits), &imx6()).unwrap();
    assert_eq!(resolved.mode, Mode::IC);
    assert_eq!(resolved.alpha, Some(Alpha::Global(128)));
    assert_eq!(resolved.color_key, Some(0x00ff00));

    let cropped = Overlay::new(OVL, 640, 480, RGB3, Alpha::Local { paddr: OVL + 0x10_0000 })
        .with_crop(Rect::new(16, 16, 320, 240));
    let resolved = check(&base.clone().with_overlay(cropped), &imx6()).unwrap();
    assert_eq!(resolved.overlay.unwrap().crop, Rect::new(16, 16, 320, 240));

    let outside = Overlay::new(OVL, 320, 240, RGBA, Alpha::Global(1))
        .with_crop(Rect::new(8, 0, 320, 240));
    assert_eq!(
        check(&base.clone().with_overlay(outside), &imx6()).unwrap_err(),
        TaskError::InvalidOverlayCrop
    );

    let mismatch = Overlay::new(OVL, 640, 480, RGBA, Alpha::Global(1));
    assert_eq!(
        check(&base.clone().with_overlay(mismatch), &imx6()).unwrap_err(),
        TaskError::OverlaySizeMismatch {
            overlay: (640, 480),
            output: (320, 240)
        }
    );

    // An overlay alone is enough to need the converter.
    let same = task((320, 240, RGBA), (320, 240, RGBA))
        .with_overlay(Overlay::new(OVL, 320, 240, RGBA, Alpha::Global(64)));
    assert_eq!(check(&same, &imx6()).unwrap().mode, Mode::IC);
}

#[test]
fn test_overlay_with_deinterlace() {
    let mut t = task((720, 480, YUYV), (720, 480, RGBA))
        .with_overlay(Overlay::new(OVL, 720, 480, RGBA, Alpha::Global(255)));
    t.input = t.input.with_deinterlace(Deinterlace::default());
    assert_eq!(
        check(&t, &imx6()).unwrap_err(),
        TaskError::OverlayWithDeinterlace
    );
}

#[test]
fn test_input_over_limit() {
    let err = check(&task((4104, 64, RGBA), (1000, 64, RGBA)), &imx6()).unwrap_err();
    assert_eq!(
        err,
        TaskError::InputOverLimit {
            width: 4104,
            height: 64
        }
    );
}

#[test]
fn test_downsize_over_limit() {
    assert_eq!(
        check(&task((2048, 64, RGBA), (128, 64, RGBA)), &imx6()).unwrap_err(),
        TaskError::DownsizeOverLimit(Axis::Horizontal)
    );
    assert_eq!(
        check(&task((64, 2048, RGBA), (64, 128, RGBA)), &imx6()).unwrap_err(),
        TaskError::DownsizeOverLimit(Axis::Vertical)
    );
    // Exactly the limit is accepted.
    assert!(check(&task((1024, 64, RGBA), (128, 64, RGBA)), &imx6()).is_ok());
}

#[test]
fn test_split_selection() {
    let caps = imx6();
    let lr = check(&task((1920, 720, YUYV), (1920, 720, RGBA)), &caps).unwrap();
    assert_eq!(lr.split, SplitMode::LeftRight);
    assert_eq!(lr.stripes.len(), 2);

    let ud = check(&task((720, 1280, YUYV), (720, 1280, RGBA)), &caps).unwrap();
    assert_eq!(ud.split, SplitMode::UpDown);

    let quad = check(&task((1920, 1080, YUYV), (1920, 1080, RGBA)), &caps).unwrap();
    assert_eq!(quad.split, SplitMode::Quad);
    assert_eq!(quad.stripes.len(), 4);
    assert!(quad.is_split());

    // The deinterlacer's line buffer forces a split of wide inputs even
    // when the output fits one unit.
    let mut vdi = task((1280, 720, YUYV), (1016, 720, YUYV));
    vdi.input = vdi.input.with_deinterlace(Deinterlace::default());
    assert_eq!(check(&vdi, &caps).unwrap().split, SplitMode::LeftRight);
}

#[test]
fn test_split_errors() {
    let caps = imx6();
    assert_eq!(
        check(&task((1920, 720, YUYV), (3840, 720, RGBA)), &caps).unwrap_err(),
        TaskError::SplitOutputOverflow(Axis::Horizontal)
    );

    let mut rotated = task((1920, 720, YUYV), (720, 1920, RGBA));
    rotated.output.rotation = Rotation::Rotation90;
    assert_eq!(check(&rotated, &caps).unwrap_err(), TaskError::SplitWithRotation);

    // Each half of a 4096 wide deinterlaced line exceeds the line buffer.
    let mut vdi = task((4096, 720, YUYV), (1920, 720, YUYV));
    vdi.input = vdi.input.with_deinterlace(Deinterlace::default());
    assert_eq!(
        check(&vdi, &caps).unwrap_err(),
        TaskError::SplitInputOverflow(Axis::Horizontal)
    );
}

#[test]
fn test_chroma_offset_warnings() {
    let mut t = task((1920, 1080, I420), (640, 480, RGBA));
    t.input.crop = Some(Rect::new(8, 0, 1280, 720));
    let resolved = check(&t, &unlimited()).unwrap();
    assert!(resolved.warnings.contains(Warnings::INPUT_OFFSET_UNALIGNED));
    assert!(!resolved.warnings.contains(Warnings::OUTPUT_OFFSET_UNALIGNED));

    t.input.crop = Some(Rect::new(16, 0, 1280, 720));
    assert!(check(&t, &unlimited()).unwrap().warnings.is_empty());

    // A stride that is not a multiple of 8 offsets the chroma plane.
    let mut t = task((640, 480, RGBA), (1916, 1080, NV12));
    t.output.crop = Some(Rect::new(4, 2, 640, 480));
    let resolved = check(&t, &unlimited()).unwrap();
    assert!(resolved.warnings.contains(Warnings::OUTPUT_OFFSET_UNALIGNED));
    assert_eq!(
        format!("{:?}", resolved.warnings),
        "Warnings(OUTPUT_OFFSET_UNALIGNED)"
    );

    let overlay = Overlay::new(OVL, 1920, 1080, I420, Alpha::Global(200))
        .with_crop(Rect::new(8, 0, 640, 480));
    let t = task((640, 480, YUYV), (640, 480, RGBA)).with_overlay(overlay);
    let resolved = check(&t, &unlimited()).unwrap();
    assert!(resolved.warnings.contains(Warnings::OVERLAY_OFFSET_UNALIGNED));
}

#[test]
fn test_plane_layouts() {
    let l = format::plane_layout(I420, 1920, 1080, 0, 0);
    assert_eq!((l.offset, l.u_offset, l.v_offset, l.stride), (0, 2073600, 2592000, 1920));

    let l = format::plane_layout(NV12, 1920, 1080, 16, 8);
    assert_eq!(l.offset, 8 * 1920 + 16);
    assert_eq!(l.u_offset, l.v_offset);
    assert_eq!(l.offset + l.u_offset, 2073600 + 4 * 1920 + 16);

    assert_eq!(format::frame_size(NV12, 1920, 1080), 3110400);
    assert_eq!(format::frame_size(YUYV, 1920, 1080), 4147200);
    assert_eq!(format::frame_size(RGB3, 1920, 1080), 6220800);
    assert_eq!(format::frame_size(RGBA, 1920, 1080), 8294400);
}

#[test]
fn test_small_ceilings_apply() {
    let caps = small(256, 256);
    let resolved = check(&task((320, 240, YUYV), (480, 200, RGBA)), &caps).unwrap();
    assert_eq!(resolved.split, SplitMode::LeftRight);
    for stripe in &resolved.stripes {
        assert!(stripe.output.width <= 256);
    }
}

#[test]
fn test_oversized_stride_is_rejected() {
    // 4 bytes per pixel overflows a 32 bit stride.
    let mut t = task((640, 480, RGBA), (0x4000_0010, 64, RGBA));
    t.output.crop = Some(Rect::new(0, 0, 32, 32));
    assert_eq!(
        check(&t, &imx6()).unwrap_err(),
        TaskError::InvalidCrop(SurfaceKind::Output)
    );

    let mut t = task((0x8000_0000, 64, YUYV), (640, 480, RGBA));
    t.input.crop = Some(Rect::new(0, 0, 640, 64));
    assert_eq!(
        check(&t, &imx6()).unwrap_err(),
        TaskError::InvalidCrop(SurfaceKind::Input)
    );

    let overlay = Overlay::new(OVL, 0x4000_0000, 480, RGBA, Alpha::Global(128))
        .with_crop(Rect::new(0, 0, 640, 480));
    let t = task((640, 480, YUYV), (640, 480, RGBA)).with_overlay(overlay);
    assert_eq!(check(&t, &imx6()).unwrap_err(), TaskError::InvalidOverlayCrop);

    // Grey planes are one byte per pixel and still fit.
    assert_eq!(format::checked_row_stride(GREY, u32::MAX), Some(u32::MAX));
    assert_eq!(format::checked_row_stride(RGBA, 0x4000_0000), None);
}

#[test]
fn test_large_downsize_ceiling_does_not_wrap() {
    let caps = Capabilities {
        max_downsize: u32::MAX,
        ..unlimited()
    };
    let resolved = check(&task((4096, 4096, RGBA), (8, 8, RGBA)), &caps).unwrap();
    assert_eq!(resolved.mode, Mode::IC);
}

/// Collects the messages of every event raised while it is installed.
#[derive(Clone, Default)]
struct Messages(Arc<Mutex<Vec<String>>>);

struct MessageField<'a>(&'a mut String);

impl Visit for MessageField<'_> {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            *self.0 = format!("{value:?}");
        }
    }
}

impl<S: Subscriber> Layer<S> for Messages {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut message = String::new();
        event.record(&mut MessageField(&mut message));
        self.0.lock().unwrap().push(message);
    }
}

#[test]
fn test_check_logs_rejections() {
    let messages = Messages::default();
    let subscriber = Registry::default().with(messages.clone());
    let t = task((640, 480, RGBA), (640, 480, RGBA));
    tracing::subscriber::with_default(subscriber, || {
        assert_eq!(check(&t, &imx6()).unwrap_err(), TaskError::NoProcessingNeeded);
    });
    let messages = messages.0.lock().unwrap();
    assert!(
        messages.iter().any(|m| m.starts_with("rejected:")),
        "{messages:?}"
    );
}
