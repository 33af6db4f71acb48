//! Blending a composed mosaic with its destination image

use image::imageops;
use image::{RgbImage, RgbaImage};

use crate::math::colorspace::{hls_to_rgb, rgb_to_hls};
use crate::spatial::tiles::RESIZE_FILTER;

/// How the destination shows through the mosaic
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum BlendMode {
    /// Mix RGB channels
    #[default]
    Alpha,
    /// Mix only the lightness channel in HSL
    Brightness,
}

fn to_unit(v: u8) -> f32 {
    f32::from(v) / 255.0
}

fn to_byte(v: f32) -> u8 {
    (v * 255.0).round().clamp(0.0, 255.0) as u8
}

/// Blend `dest` into `mosaic` at `level` in `[0, 1]`
///
/// The mosaic keeps weight `1 - level`; level 0 returns the mosaic unchanged.
/// The mosaic's alpha channel is preserved.
pub fn blend(mosaic: &RgbaImage, dest: &RgbImage, mode: BlendMode, level: f32) -> RgbaImage {
    let level = level.clamp(0.0, 1.0);
    if level <= 0.0 {
        return mosaic.clone();
    }
    let keep = 1.0 - level;
    let (width, height) = mosaic.dimensions();
    let dest = imageops::resize(dest, width, height, RESIZE_FILTER);

    let mut out = mosaic.clone();
    for (p, d) in out.pixels_mut().zip(dest.pixels()) {
        let m = [to_unit(p[0]), to_unit(p[1]), to_unit(p[2])];
        let d = [to_unit(d[0]), to_unit(d[1]), to_unit(d[2])];
        let mixed = match mode {
            BlendMode::Alpha => [
                m[0].mul_add(keep, d[0] * level),
                m[1].mul_add(keep, d[1] * level),
                m[2].mul_add(keep, d[2] * level),
            ],
            BlendMode::Brightness => {
                let [h, l, s] = rgb_to_hls(m);
                let dest_l = rgb_to_hls(d)[1];
                hls_to_rgb([h, l.mul_add(keep, dest_l * level), s])
            }
        };
        p[0] = to_byte(mixed[0]);
        p[1] = to_byte(mixed[1]);
        p[2] = to_byte(mixed[2]);
    }
    out
}
