//! Colorspace conversion for normalized RGB pixels
//!
//! Every conversion takes sRGB channels in `[0, 1]` and goes through `palette`:
//! hue in degrees, `L*` in `[0, 100]`, D65 white for the CIE spaces.
//! [`Colorspace::convert`] additionally rescales hue to `[0, 1]` so hue based
//! spaces stay comparable with the other channels under a distance metric.

use std::fmt;
use std::str::FromStr;

use palette::{FromColor, Hsl, Hsv, Lab, LinSrgb, Luv, Srgb};

use crate::io::error::{MosaicError, invalid_parameter};

/// Colorspace in which block feature vectors are compared
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum Colorspace {
    /// Raw channels in blue, green, red order
    Bgr,
    /// Hue, saturation, value
    Hsv,
    /// Hue, lightness, saturation (channel order H, L, S)
    Hsl,
    /// CIE L*a*b* under D65
    #[default]
    Lab,
    /// CIE L*u*v* under D65
    Luv,
}

impl Colorspace {
    /// All supported colorspaces
    pub const ALL: [Self; 5] = [Self::Bgr, Self::Hsv, Self::Hsl, Self::Lab, Self::Luv];

    /// Lowercase name used on the command line
    pub const fn name(self) -> &'static str {
        match self {
            Self::Bgr => "bgr",
            Self::Hsv => "hsv",
            Self::Hsl => "hsl",
            Self::Lab => "lab",
            Self::Luv => "luv",
        }
    }

    /// Whether the first channel is a hue angle that gets rescaled to `[0, 1]`
    pub const fn has_hue(self) -> bool {
        matches!(self, Self::Hsv | Self::Hsl)
    }

    /// Convert one normalized RGB pixel into this colorspace
    pub fn convert(self, rgb: [f32; 3]) -> [f32; 3] {
        match self {
            Self::Bgr => [rgb[2], rgb[1], rgb[0]],
            Self::Hsv => {
                let [h, s, v] = rgb_to_hsv(rgb);
                [h / 360.0, s, v]
            }
            Self::Hsl => {
                let [h, l, s] = rgb_to_hls(rgb);
                [h / 360.0, l, s]
            }
            Self::Lab => rgb_to_lab(rgb),
            Self::Luv => rgb_to_luv(rgb),
        }
    }
}

impl fmt::Display for Colorspace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Colorspace {
    type Err = MosaicError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|space| space.name() == lowered)
            .ok_or_else(|| {
                invalid_parameter("colorspace", &s, &"expected one of bgr, hsv, hsl, lab, luv")
            })
    }
}

fn srgb(rgb: [f32; 3]) -> Srgb<f32> {
    Srgb::new(rgb[0], rgb[1], rgb[2])
}

fn linear(rgb: [f32; 3]) -> LinSrgb<f32> {
    srgb(rgb).into_linear()
}

/// RGB to HSV with hue in degrees `[0, 360)`
pub fn rgb_to_hsv(rgb: [f32; 3]) -> [f32; 3] {
    let hsv: Hsv = Hsv::from_color(srgb(rgb));
    [hsv.hue.into_positive_degrees(), hsv.saturation, hsv.value]
}

/// RGB to HLS with hue in degrees `[0, 360)`
pub fn rgb_to_hls(rgb: [f32; 3]) -> [f32; 3] {
    let hsl: Hsl = Hsl::from_color(srgb(rgb));
    [hsl.hue.into_positive_degrees(), hsl.lightness, hsl.saturation]
}

/// HLS (hue in degrees) back to RGB
pub fn hls_to_rgb(hls: [f32; 3]) -> [f32; 3] {
    let [h, l, s] = hls;
    let hsl: Hsl = Hsl::new(h, s, l);
    let rgb: Srgb = Srgb::from_color(hsl);
    [rgb.red, rgb.green, rgb.blue]
}

/// RGB to CIE L*a*b*
pub fn rgb_to_lab(rgb: [f32; 3]) -> [f32; 3] {
    let lab: Lab = Lab::from_color(linear(rgb));
    [lab.l, lab.a, lab.b]
}

/// RGB to CIE L*u*v*
///
/// Black has no chromaticity and maps to the origin.
pub fn rgb_to_luv(rgb: [f32; 3]) -> [f32; 3] {
    let luv: Luv = Luv::from_color(linear(rgb));
    [luv.l, luv.u, luv.v].map(|c| if c.is_finite() { c } else { 0.0 })
}
