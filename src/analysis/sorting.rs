//! Ordering tiles for a plain collage without a destination image

use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::io::error::Result;
use crate::math::colorspace::rgb_to_hsv;
use crate::spatial::grid::{Grid, calc_grid_size};
use crate::spatial::tiles::{Tile, TilePool};

/// Luminosity weights applied to the channels in blue, green, red order
pub const LUMINOSITY_COEFFICIENTS: [f64; 3] = [0.241, 0.691, 0.068];

/// Key by which collage tiles are ordered
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum SortMethod {
    /// Keep reading order
    #[value(name = "none")]
    None,
    /// Sum of all channel values
    #[default]
    #[value(name = "bgr_sum")]
    BgrSum,
    /// Mean HSV hue
    #[value(name = "av_hue")]
    AvHue,
    /// Mean HSV saturation
    #[value(name = "av_sat")]
    AvSat,
    /// Mean perceived luminosity
    #[value(name = "av_lum")]
    AvLum,
    /// Random order
    #[value(name = "rand")]
    Rand,
}

fn mean_over_pixels(tile: &Tile, f: impl Fn([u8; 3]) -> f64) -> f64 {
    let count = (tile.pixels.width() as usize * tile.pixels.height() as usize).max(1);
    tile.pixels.pixels().map(|p| f(p.0)).sum::<f64>() / count as f64
}

fn hsv_of(p: [u8; 3]) -> [f32; 3] {
    rgb_to_hsv([
        f32::from(p[0]) / 255.0,
        f32::from(p[1]) / 255.0,
        f32::from(p[2]) / 255.0,
    ])
}

impl SortMethod {
    /// Sort key of one tile; `rng` is only drawn from by [`SortMethod::Rand`]
    pub fn key(self, tile: &Tile, rng: &mut impl Rng) -> f64 {
        match self {
            Self::None => 0.0,
            Self::BgrSum => tile
                .pixels
                .pixels()
                .map(|p| f64::from(p[0]) + f64::from(p[1]) + f64::from(p[2]))
                .sum(),
            Self::AvHue => mean_over_pixels(tile, |p| f64::from(hsv_of(p)[0])),
            Self::AvSat => mean_over_pixels(tile, |p| f64::from(hsv_of(p)[1])),
            Self::AvLum => {
                let [cb, cg, cr] = LUMINOSITY_COEFFICIENTS;
                mean_over_pixels(tile, |[r, g, b]| {
                    ((f64::from(b) * cb).sqrt() + (f64::from(g) * cg).sqrt() + (f64::from(r) * cr).sqrt())
                        / 3.0
                })
            }
            Self::Rand => rng.random(),
        }
    }
}

/// Plan a grid for the pool at `ratio` and order its tiles by `method`
///
/// [`SortMethod::None`] keeps reading order and ignores `reverse`.
///
/// # Errors
///
/// Returns an error if the grid cannot be planned
pub fn sort_collage(
    pool: &TilePool,
    ratio: (u32, u32),
    method: SortMethod,
    reverse: bool,
    seed: Option<u64>,
) -> Result<(Grid, Vec<usize>)> {
    let (tile_w, tile_h) = pool.tile_size();
    let grid = calc_grid_size(ratio.0, ratio.1, pool.len(), tile_w, tile_h)?;
    let mut order: Vec<usize> = (0..pool.len()).collect();
    if method == SortMethod::None {
        return Ok((grid, order));
    }

    tracing::info!(?method, "sorting images");
    let mut rng = seed.map_or_else(|| StdRng::from_rng(&mut rand::rng()), StdRng::seed_from_u64);
    let keys: Vec<f64> = pool.tiles().iter().map(|t| method.key(t, &mut rng)).collect();
    order.sort_by(|&a, &b| keys[a].total_cmp(&keys[b]));
    if reverse {
        order.reverse();
    }
    Ok((grid, order))
}
