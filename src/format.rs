// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Pixel formats understood by the IPU and the plane layout math derived
//! from them.

use core::fmt;
use std::str::FromStr;

/// Four-character pixel format code, identical to the V4L2 codes.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct FourCC(pub [u8; 4]);

/// RGB 16-bit pixel format (5-6-5, little endian)
pub const RGBP: FourCC = FourCC(*b"RGBP");

/// RGB 24-bit pixel format (8 bits per channel, no alpha)
pub const RGB3: FourCC = FourCC(*b"RGB3");

/// BGR 24-bit pixel format (8 bits per channel, no alpha)
pub const BGR3: FourCC = FourCC(*b"BGR3");

/// RGBX 32-bit pixel format (8 bits per channel, unused alpha)
pub const RGBX: FourCC = FourCC(*b"RGBX");

/// RGBA 32-bit pixel format (8 bits per channel, with alpha)
pub const RGBA: FourCC = FourCC(*b"RGBA");

/// BGRA 32-bit pixel format (8 bits per channel, with alpha)
pub const BGRA: FourCC = FourCC(*b"BGRA");

/// YUYV 4:2:2 YUV packed format (common camera output format)
pub const YUYV: FourCC = FourCC(*b"YUYV");

/// UYVY 4:2:2 YUV packed format
pub const UYVY: FourCC = FourCC(*b"UYVY");

/// NV12 4:2:0 YUV semi-planar format (efficient for video encoding)
pub const NV12: FourCC = FourCC(*b"NV12");

/// I420 4:2:0 YUV planar format (Y, then U, then V)
pub const I420: FourCC = FourCC(*b"I420");

/// YV12 4:2:0 YVU planar format (Y, then V, then U)
pub const YV12: FourCC = FourCC(*b"YV12");

/// 422P 4:2:2 YUV planar format
pub const YUV422P: FourCC = FourCC(*b"422P");

/// 8-bit single plane, used for per-pixel alpha. Not a surface format.
pub const GREY: FourCC = FourCC(*b"GREY");

impl fmt::Display for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for b in self.0 {
            write!(f, "{}", b as char)?;
        }
        Ok(())
    }
}

impl fmt::Debug for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "FourCC({self})")
    }
}

impl FromStr for FourCC {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = s.as_bytes();
        if bytes.len() != 4 || !bytes.iter().all(u8::is_ascii_graphic) {
            return Err(format!("'{s}' is not a four character code"));
        }
        Ok(FourCC([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }
}

impl From<FourCC> for u32 {
    fn from(value: FourCC) -> Self {
        u32::from_le_bytes(value.0)
    }
}

/// Memory organisation shared by a group of formats.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Family {
    /// One plane, RGB components per pixel.
    PackedRgb,
    /// One plane, 4:2:2 macro-pixels of two luma samples sharing chroma.
    PackedYuv,
    /// Three planes, chroma subsampled both ways.
    Planar420,
    /// Three planes, chroma subsampled horizontally.
    Planar422,
    /// Luma plane followed by one interleaved 4:2:0 chroma plane.
    SemiPlanar420,
}

impl Family {
    /// Horizontal and vertical chroma subsampling factors.
    pub fn subsampling(self) -> (u32, u32) {
        match self {
            Family::PackedRgb => (1, 1),
            Family::PackedYuv | Family::Planar422 => (2, 1),
            Family::Planar420 | Family::SemiPlanar420 => (2, 2),
        }
    }

    pub fn is_yuv(self) -> bool {
        self != Family::PackedRgb
    }

    pub fn is_planar(self) -> bool {
        matches!(
            self,
            Family::Planar420 | Family::Planar422 | Family::SemiPlanar420
        )
    }
}

impl FourCC {
    /// Returns the family of a supported format or `None`.
    pub fn family(self) -> Option<Family> {
        match self {
            RGBP | RGB3 | BGR3 | RGBX | RGBA | BGRA => Some(Family::PackedRgb),
            YUYV | UYVY => Some(Family::PackedYuv),
            I420 | YV12 => Some(Family::Planar420),
            YUV422P => Some(Family::Planar422),
            NV12 => Some(Family::SemiPlanar420),
            _ => None,
        }
    }

    /// Bytes per pixel of the first (or only) plane.
    pub fn bytes_per_pixel(self) -> u32 {
        match self {
            RGBP | YUYV | UYVY => 2,
            RGB3 | BGR3 => 3,
            RGBX | RGBA | BGRA => 4,
            _ => 1,
        }
    }

    pub fn is_yuv(self) -> bool {
        self.family().is_some_and(Family::is_yuv)
    }
}

/// Row stride in bytes of the first plane of a `width` pixels wide surface,
/// or `None` when it does not fit the 32 bit stride register.
pub const fn checked_row_stride(format: FourCC, width: u32) -> Option<u32> {
    match format {
        RGBP | YUYV | UYVY => width.checked_mul(2),
        RGB3 | BGR3 => width.checked_mul(3),
        RGBX | RGBA | BGRA => width.checked_mul(4),
        _ => Some(width),
    }
}

/// Row stride in bytes of the first plane of a `width` pixels wide surface.
/// Saturates for widths [`checked_row_stride`] rejects.
pub const fn row_stride(format: FourCC, width: u32) -> u32 {
    match checked_row_stride(format, width) {
        Some(stride) => stride,
        None => u32::MAX,
    }
}

/// Total size in bytes of a frame, all planes included.
pub fn frame_size(format: FourCC, width: u32, height: u32) -> usize {
    let luma = row_stride(format, width) as usize * height as usize;
    match format.family() {
        Some(Family::Planar420) | Some(Family::SemiPlanar420) => luma + luma / 2,
        Some(Family::Planar422) => luma * 2,
        _ => luma,
    }
}

/// Byte offsets of a window inside a surface.
///
/// `offset` locates the first luma (or packed) byte of the window from the
/// surface base address. `u_offset`/`v_offset` locate the first chroma bytes
/// of the window relative to that first luma byte, matching how the IDMAC
/// expects chroma planes to be described. Packed formats have zero chroma
/// offsets; the semi-planar format reports the interleaved plane in both.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct PlaneLayout {
    pub offset: u64,
    pub u_offset: u64,
    pub v_offset: u64,
    pub stride: u32,
}

impl PlaneLayout {
    /// True when both chroma offsets satisfy the 8-byte IDMAC alignment.
    pub fn chroma_aligned(&self) -> bool {
        self.u_offset % 8 == 0 && self.v_offset % 8 == 0
    }
}

/// Computes the layout of the window whose top-left pixel is `(x, y)` in a
/// `width` x `height` surface of `format`.
pub fn plane_layout(format: FourCC, width: u32, height: u32, x: u32, y: u32) -> PlaneLayout {
    let stride = row_stride(format, width);
    let (x, y, h, s) = (x as u64, y as u64, height as u64, stride as u64);
    let offset = y * s + x * format.bytes_per_pixel() as u64;
    let luma = s * h;
    let (u, v) = match format.family() {
        Some(Family::Planar420) => {
            let chroma = (s / 2) * (h / 2);
            let pos = (y / 2) * (s / 2) + x / 2;
            let (first, second) = (luma + pos, luma + chroma + pos);
            if format == YV12 {
                (second, first)
            } else {
                (first, second)
            }
        }
        Some(Family::Planar422) => {
            let chroma = (s / 2) * h;
            let pos = y * (s / 2) + x / 2;
            (luma + pos, luma + chroma + pos)
        }
        Some(Family::SemiPlanar420) => {
            let pos = luma + (y / 2) * s + x;
            (pos, pos)
        }
        _ => {
            return PlaneLayout {
                offset,
                u_offset: 0,
                v_offset: 0,
                stride,
            };
        }
    };
    PlaneLayout {
        offset,
        u_offset: u - offset,
        v_offset: v - offset,
        stride,
    }
}

/// Byte spans, relative to the surface base, holding the pixels of the
/// rectangle `(x, y, w, h)` in every plane. Used to move bands of finished
/// output between surfaces and scratch memory.
///
/// For subsampled formats `x`, `y`, `w` and `h` are expected to be even.
pub fn region_spans(
    format: FourCC,
    width: u32,
    height: u32,
    x: u32,
    y: u32,
    w: u32,
    h: u32,
) -> Vec<(u64, usize)> {
    let stride = row_stride(format, width) as u64;
    let bpp = format.bytes_per_pixel() as u64;
    let luma = stride * height as u64;
    let mut spans: Vec<(u64, usize)> = (y..y + h)
        .map(|row| (row as u64 * stride + x as u64 * bpp, (w as u64 * bpp) as usize))
        .collect();

    match format.family() {
        Some(Family::Planar420) => {
            let cstride = stride / 2;
            let plane = cstride * (height as u64 / 2);
            for base in [luma, luma + plane] {
                spans.extend(
                    (y / 2..(y + h) / 2)
                        .map(|row| (base + row as u64 * cstride + x as u64 / 2, w as usize / 2)),
                );
            }
        }
        Some(Family::Planar422) => {
            let cstride = stride / 2;
            let plane = cstride * height as u64;
            for base in [luma, luma + plane] {
                spans.extend(
                    (y..y + h)
                        .map(|row| (base + row as u64 * cstride + x as u64 / 2, w as usize / 2)),
                );
            }
        }
        Some(Family::SemiPlanar420) => {
            spans.extend(
                (y / 2..(y + h) / 2)
                    .map(|row| (luma + row as u64 * stride + x as u64, w as usize)),
            );
        }
        _ => {}
    }
    spans
}
