// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Pixel path of the software IPU.
//!
//! Windows are decoded into a [`Raster`] of four byte pixels in either RGB
//! or YUV, processed, and encoded back. Conversions between the two only
//! happen when the output asks for the other space, so same-space work is
//! lossless.

use crate::{
    channel::BufferDesc,
    format::{self, Family, FourCC, BGR3, BGRA, GREY, RGB3, RGBA, RGBP, RGBX, UYVY, YUYV},
    split::Resize,
    task::{Deinterlace, FieldOrder, Motion, Rotation},
};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Space {
    Rgb,
    Yuv,
}

impl Space {
    pub fn of(format: FourCC) -> Self {
        if format.is_yuv() {
            Space::Yuv
        } else {
            Space::Rgb
        }
    }
}

/// BT.601 limited range, integer arithmetic.
pub fn rgb_to_yuv([r, g, b, a]: [u8; 4]) -> [u8; 4] {
    let (r, g, b) = (r as i32, g as i32, b as i32);
    let y = ((66 * r + 129 * g + 25 * b + 128) >> 8) + 16;
    let u = ((-38 * r - 74 * g + 112 * b + 128) >> 8) + 128;
    let v = ((112 * r - 94 * g - 18 * b + 128) >> 8) + 128;
    [clamp(y), clamp(u), clamp(v), a]
}

pub fn yuv_to_rgb([y, u, v, a]: [u8; 4]) -> [u8; 4] {
    let c = y as i32 - 16;
    let d = u as i32 - 128;
    let e = v as i32 - 128;
    let r = (298 * c + 409 * e + 128) >> 8;
    let g = (298 * c - 100 * d - 208 * e + 128) >> 8;
    let b = (298 * c + 516 * d + 128) >> 8;
    [clamp(r), clamp(g), clamp(b), a]
}

fn clamp(v: i32) -> u8 {
    v.clamp(0, 255) as u8
}

fn short(what: &str, desc: &BufferDesc) -> String {
    format!(
        "{what} of {}x{} {} window at {:#x} out of bounds",
        desc.width, desc.height, desc.format, desc.paddr
    )
}

fn check_width(family: Family, desc: &BufferDesc) -> Result<(), String> {
    if family.is_yuv() && desc.width % 2 != 0 {
        return Err(format!("odd width {} for {}", desc.width, desc.format));
    }
    Ok(())
}

fn rows<'a>(
    bytes: &'a [u8],
    start: u64,
    len: usize,
    desc: &BufferDesc,
) -> Result<&'a [u8], String> {
    let start = start as usize;
    bytes
        .get(start..start + len)
        .ok_or_else(|| short("row", desc))
}

fn rows_mut<'a>(
    bytes: &'a mut [u8],
    start: u64,
    len: usize,
    desc: &BufferDesc,
) -> Result<&'a mut [u8], String> {
    let start = start as usize;
    bytes
        .get_mut(start..start + len)
        .ok_or_else(|| short("row", desc))
}

/// Chroma plane geometry of a planar format: luma rows per chroma row and
/// chroma row stride.
fn chroma_plane(family: Family, stride: u32) -> (u32, u64) {
    match family {
        Family::Planar420 => (2, stride as u64 / 2),
        Family::Planar422 => (1, stride as u64 / 2),
        _ => (2, stride as u64),
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Raster {
    pub width: u32,
    pub height: u32,
    pub space: Space,
    pub px: Vec<[u8; 4]>,
}

impl Raster {
    pub fn new(width: u32, height: u32, space: Space) -> Self {
        Raster {
            width,
            height,
            space,
            px: vec![[0, 0, 0, 255]; width as usize * height as usize],
        }
    }

    pub fn at(&self, x: u32, y: u32) -> [u8; 4] {
        self.px[(y * self.width + x) as usize]
    }

    fn set(&mut self, x: u32, y: u32, p: [u8; 4]) {
        let w = self.width;
        self.px[(y * w + x) as usize] = p;
    }

    /// Decodes the window `desc`, whose first byte is at `base` in `bytes`.
    pub fn decode(bytes: &[u8], base: usize, desc: &BufferDesc) -> Result<Raster, String> {
        let family = desc
            .format
            .family()
            .ok_or_else(|| format!("cannot decode {}", desc.format))?;
        check_width(family, desc)?;
        let mut r = Raster::new(desc.width, desc.height, Space::of(desc.format));
        let base = base as u64;
        let line = format::row_stride(desc.format, desc.width) as usize;

        for y in 0..desc.height {
            let row = rows(bytes, base + y as u64 * desc.stride as u64, line, desc)?;
            match family {
                Family::PackedRgb => {
                    let bpp = desc.format.bytes_per_pixel() as usize;
                    for (x, c) in row.chunks_exact(bpp).enumerate() {
                        r.px[y as usize * desc.width as usize + x] = unpack_rgb(desc.format, c);
                    }
                }
                Family::PackedYuv => {
                    let (yo, uo, vo) = packed_yuv_offsets(desc.format);
                    for x in 0..desc.width {
                        let pair = (x / 2 * 4) as usize;
                        let luma = row[pair + yo + (x % 2) as usize * 2];
                        r.set(x, y, [luma, row[pair + uo], row[pair + vo], 255]);
                    }
                }
                Family::Planar420 | Family::Planar422 | Family::SemiPlanar420 => {
                    let (div, cstride) = chroma_plane(family, desc.stride);
                    let crow = (y / div) as u64 * cstride;
                    let clen = if family == Family::SemiPlanar420 {
                        line
                    } else {
                        (desc.width as usize).div_ceil(2)
                    };
                    let u = rows(bytes, base + desc.u_offset + crow, clen, desc)?;
                    let v = rows(bytes, base + desc.v_offset + crow, clen, desc)?;
                    for x in 0..desc.width {
                        let (ui, vi) = if family == Family::SemiPlanar420 {
                            ((x / 2 * 2) as usize, (x / 2 * 2 + 1) as usize)
                        } else {
                            ((x / 2) as usize, (x / 2) as usize)
                        };
                        r.set(x, y, [row[x as usize], u[ui], v[vi], 255]);
                    }
                }
            }
        }
        Ok(r)
    }

    /// Encodes into the window `desc`. Subsampled chroma takes the sample of
    /// the even pixel of each pair.
    pub fn encode(&self, bytes: &mut [u8], base: usize, desc: &BufferDesc) -> Result<(), String> {
        let family = desc
            .format
            .family()
            .ok_or_else(|| format!("cannot encode {}", desc.format))?;
        check_width(family, desc)?;
        if (self.width, self.height) != (desc.width, desc.height) {
            return Err(format!(
                "{}x{} frame does not fit {}x{} window",
                self.width, self.height, desc.width, desc.height
            ));
        }
        let base = base as u64;
        let line = format::row_stride(desc.format, desc.width) as usize;

        for y in 0..desc.height {
            let row = rows_mut(bytes, base + y as u64 * desc.stride as u64, line, desc)?;
            match family {
                Family::PackedRgb => {
                    let bpp = desc.format.bytes_per_pixel() as usize;
                    for (x, c) in row.chunks_exact_mut(bpp).enumerate() {
                        pack_rgb(desc.format, self.px[y as usize * desc.width as usize + x], c);
                    }
                }
                Family::PackedYuv => {
                    let (yo, uo, vo) = packed_yuv_offsets(desc.format);
                    for x in 0..desc.width {
                        let p = self.at(x, y);
                        let pair = (x / 2 * 4) as usize;
                        row[pair + yo + (x % 2) as usize * 2] = p[0];
                        if x % 2 == 0 {
                            row[pair + uo] = p[1];
                            row[pair + vo] = p[2];
                        }
                    }
                }
                Family::Planar420 | Family::Planar422 | Family::SemiPlanar420 => {
                    for x in 0..desc.width {
                        row[x as usize] = self.at(x, y)[0];
                    }
                    let (div, cstride) = chroma_plane(family, desc.stride);
                    if y % div != 0 {
                        continue;
                    }
                    let crow = (y / div) as u64 * cstride;
                    let semi = family == Family::SemiPlanar420;
                    let clen = if semi {
                        line
                    } else {
                        (desc.width as usize).div_ceil(2)
                    };
                    let chroma: Vec<(u8, u8)> = (0..desc.width)
                        .step_by(2)
                        .map(|x| {
                            let p = self.at(x, y);
                            (p[1], p[2])
                        })
                        .collect();
                    if semi {
                        let c = rows_mut(bytes, base + desc.u_offset + crow, clen, desc)?;
                        for (i, (u, v)) in chroma.iter().enumerate() {
                            c[i * 2] = *u;
                            c[i * 2 + 1] = *v;
                        }
                    } else {
                        let c = rows_mut(bytes, base + desc.u_offset + crow, clen, desc)?;
                        for (i, (u, _)) in chroma.iter().enumerate() {
                            c[i] = *u;
                        }
                        let c = rows_mut(bytes, base + desc.v_offset + crow, clen, desc)?;
                        for (i, (_, v)) in chroma.iter().enumerate() {
                            c[i] = *v;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    pub fn into_space(self, space: Space) -> Raster {
        if self.space == space {
            return self;
        }
        let convert = match space {
            Space::Yuv => rgb_to_yuv,
            Space::Rgb => yuv_to_rgb,
        };
        Raster {
            px: self.px.into_iter().map(convert).collect(),
            space,
            ..self
        }
    }

    /// Nearest-sample resize; `h` and `v` map output to input coordinates.
    pub fn resize(&self, width: u32, height: u32, h: Resize, v: Resize) -> Raster {
        if (width, height) == (self.width, self.height) && h.phase == 0 && v.phase == 0 {
            let identity = Resize::new(width, width);
            if h.coeff == identity.coeff && v.coeff == Resize::new(height, height).coeff {
                return self.clone();
            }
        }
        let mut out = Raster::new(width, height, self.space);
        let cols: Vec<u32> = (0..width)
            .map(|x| h.source(x).min(self.width - 1))
            .collect();
        for y in 0..height {
            let sy = v.source(y).min(self.height - 1);
            for (x, &sx) in cols.iter().enumerate() {
                out.set(x as u32, y, self.at(sx, sy));
            }
        }
        out
    }

    pub fn flip(&mut self, horizontal: bool, vertical: bool) {
        let w = self.width as usize;
        if horizontal {
            for row in self.px.chunks_exact_mut(w) {
                row.reverse();
            }
        }
        if vertical {
            let h = self.height as usize;
            for y in 0..h / 2 {
                let (top, bottom) = self.px.split_at_mut((h - 1 - y) * w);
                top[y * w..(y + 1) * w].swap_with_slice(&mut bottom[..w]);
            }
        }
    }

    /// Applies `rotation`; 90 degree modes swap width and height.
    pub fn rotate(mut self, rotation: Rotation) -> Raster {
        if !rotation.is_rotated() {
            self.flip(rotation.hflip(), rotation.vflip());
            return self;
        }
        let (w, h) = (self.width, self.height);
        let mut out = Raster::new(h, w, self.space);
        for dy in 0..w {
            for dx in 0..h {
                let (sx, sy) = match rotation {
                    Rotation::Rotation90 => (dy, h - 1 - dx),
                    Rotation::Rotation90VerticalFlip => (w - 1 - dy, h - 1 - dx),
                    Rotation::Rotation90HorizontalFlip => (dy, dx),
                    _ => (w - 1 - dy, dx),
                };
                out.set(dx, dy, self.at(sx, sy));
            }
        }
        out
    }

    /// Rebuilds the lines of the field not kept from their vertical
    /// neighbours.
    pub fn deinterlace(&self, mode: Deinterlace) -> Raster {
        let kept = match mode.field_order {
            FieldOrder::TopFirst => 0,
            FieldOrder::BottomFirst => 1,
        };
        let mut out = self.clone();
        if mode.motion == Motion::Low {
            return out;
        }
        for y in (0..self.height).filter(|y| y % 2 != kept) {
            let above = y.checked_sub(1);
            let below = (y + 1 < self.height).then_some(y + 1);
            for x in 0..self.width {
                let p = match (mode.motion, above, below) {
                    (Motion::Medium, Some(a), Some(b)) => average(self.at(x, a), self.at(x, b)),
                    (_, Some(a), _) => self.at(x, a),
                    (_, None, Some(b)) => self.at(x, b),
                    (_, None, None) => self.at(x, y),
                };
                out.set(x, y, p);
            }
        }
        out
    }

    /// Composes `overlay` over the raster with per-pixel weights `alpha`.
    /// Pixels whose RGB value equals `key` are left untouched.
    pub fn blend(&mut self, overlay: Raster, alpha: &[u8], key: Option<u32>) {
        let keyed: Vec<bool> = match key {
            Some(key) => overlay
                .clone()
                .into_space(Space::Rgb)
                .px
                .iter()
                .map(|p| u32::from_be_bytes([0, p[0], p[1], p[2]]) == key)
                .collect(),
            None => vec![false; overlay.px.len()],
        };
        let overlay = overlay.into_space(self.space);
        for (i, bg) in self.px.iter_mut().enumerate() {
            let a = if keyed[i] { 0 } else { alpha[i] as u32 };
            let fg = overlay.px[i];
            for c in 0..3 {
                bg[c] = ((fg[c] as u32 * a + bg[c] as u32 * (255 - a) + 127) / 255) as u8;
            }
        }
    }
}

fn average(a: [u8; 4], b: [u8; 4]) -> [u8; 4] {
    let mut p = [0; 4];
    for c in 0..4 {
        p[c] = ((a[c] as u16 + b[c] as u16 + 1) / 2) as u8;
    }
    p
}

/// Byte positions of the first luma, U and V inside a 4:2:2 macro-pixel.
fn packed_yuv_offsets(format: FourCC) -> (usize, usize, usize) {
    match format {
        YUYV => (0, 1, 3),
        UYVY => (1, 0, 2),
        _ => (0, 1, 3),
    }
}

fn unpack_rgb(format: FourCC, c: &[u8]) -> [u8; 4] {
    match format {
        RGBP => {
            let v = u16::from_le_bytes([c[0], c[1]]);
            let (r, g, b) = ((v >> 11) as u8, ((v >> 5) & 0x3f) as u8, (v & 0x1f) as u8);
            [r << 3 | r >> 2, g << 2 | g >> 4, b << 3 | b >> 2, 255]
        }
        RGB3 => [c[0], c[1], c[2], 255],
        BGR3 => [c[2], c[1], c[0], 255],
        RGBX => [c[0], c[1], c[2], 255],
        RGBA => [c[0], c[1], c[2], c[3]],
        BGRA => [c[2], c[1], c[0], c[3]],
        _ => [c[0], c[0], c[0], 255],
    }
}

fn pack_rgb(format: FourCC, p: [u8; 4], c: &mut [u8]) {
    match format {
        RGBP => {
            let v = ((p[0] as u16) >> 3) << 11 | ((p[1] as u16) >> 2) << 5 | (p[2] as u16) >> 3;
            c.copy_from_slice(&v.to_le_bytes());
        }
        RGB3 => c.copy_from_slice(&p[..3]),
        BGR3 => c.copy_from_slice(&[p[2], p[1], p[0]]),
        RGBX => c.copy_from_slice(&[p[0], p[1], p[2], 255]),
        RGBA => c.copy_from_slice(&p),
        BGRA => c.copy_from_slice(&[p[2], p[1], p[0], p[3]]),
        _ => c.fill(p[0]),
    }
}

/// Reads an 8-bit alpha plane window.
pub fn decode_alpha(bytes: &[u8], base: usize, desc: &BufferDesc) -> Result<Vec<u8>, String> {
    debug_assert_eq!(desc.format, GREY);
    let mut out = Vec::with_capacity(desc.width as usize * desc.height as usize);
    for y in 0..desc.height {
        let row = rows(
            bytes,
            base as u64 + y as u64 * desc.stride as u64,
            desc.width as usize,
            desc,
        )?;
        out.extend_from_slice(row);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn red_to_yuv() {
        assert_eq!(rgb_to_yuv([255, 0, 0, 255]), [82, 90, 240, 255]);
    }

    #[test]
    fn rotate_quarter_turns() {
        let mut r = Raster::new(2, 1, Space::Rgb);
        r.px = vec![[1, 0, 0, 255], [2, 0, 0, 255]];
        let cw = r.clone().rotate(Rotation::Rotation90);
        assert_eq!((cw.width, cw.height), (1, 2));
        assert_eq!(cw.px[0][0], 1);
        let ccw = r.rotate(Rotation::Rotation270);
        assert_eq!(ccw.px[0][0], 2);
    }

    #[test]
    fn medium_motion_averages_missing_lines() {
        let mut r = Raster::new(1, 3, Space::Yuv);
        r.px = vec![[10, 0, 0, 255], [99, 0, 0, 255], [30, 0, 0, 255]];
        let out = r.deinterlace(Deinterlace {
            motion: Motion::Medium,
            field_order: FieldOrder::TopFirst,
        });
        assert_eq!(out.px[1][0], 20);
    }
}
