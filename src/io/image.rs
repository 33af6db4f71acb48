//! Loading destinations and writing composed mosaics

use std::path::{Path, PathBuf};

use image::{DynamicImage, RgbImage, RgbaImage};

use crate::io::error::{MosaicError, Result, invalid_parameter};
use crate::spatial::composer::TileInfo;

/// Output extensions the encoder accepts
pub const OUTPUT_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// A decoded destination image
#[derive(Clone, Debug)]
pub struct Destination {
    /// Pixels with alpha (opaque when the file has none)
    pub pixels: RgbaImage,
    /// Whether the file carried an alpha channel
    pub has_alpha: bool,
}

/// Decode the destination image at `path`
///
/// # Errors
///
/// Returns an error if the file cannot be read or decoded
pub fn load_destination(path: &Path) -> Result<Destination> {
    let img = image::open(path).map_err(|e| MosaicError::ImageLoad {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(Destination {
        has_alpha: img.color().has_alpha(),
        pixels: img.to_rgba8(),
    })
}

/// Drop the alpha channel
pub fn strip_alpha(img: &RgbaImage) -> RgbImage {
    RgbImage::from_fn(img.width(), img.height(), |x, y| {
        let p = img.get_pixel(x, y);
        image::Rgb([p[0], p[1], p[2]])
    })
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
}

/// Check that `path` has a supported extension and an existing parent directory
///
/// # Errors
///
/// Returns an invalid parameter error otherwise
pub fn validate_output_path(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.is_dir()
    {
        return Err(invalid_parameter(
            "out",
            &path.display(),
            &format!("the output directory '{}' does not exist", parent.display()),
        ));
    }
    match extension_of(path) {
        Some(ext) if OUTPUT_EXTENSIONS.contains(&ext.as_str()) => Ok(()),
        _ => Err(invalid_parameter(
            "out",
            &path.display(),
            &"the file extension must be .jpg, .jpeg or .png",
        )),
    }
}

/// `dir/stem<suffix>.ext` for `dir/stem.ext`
pub fn output_path_with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let stem = path.file_stem().unwrap_or_default().to_string_lossy();
    let name = match path.extension() {
        Some(ext) => format!("{stem}{suffix}.{}", ext.to_string_lossy()),
        None => format!("{stem}{suffix}"),
    };
    path.parent().map_or_else(|| PathBuf::from(&name), |parent| parent.join(&name))
}

/// Encode `img` to `path`; JPEG output drops the alpha channel
///
/// # Errors
///
/// Returns an error if the parent directory cannot be created or encoding fails
pub fn save_image(img: &RgbaImage, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(|e| MosaicError::FileSystem {
            path: parent.to_path_buf(),
            operation: "create directory",
            source: e,
        })?;
    }

    let is_jpeg = matches!(extension_of(path).as_deref(), Some("jpg" | "jpeg"));
    let saved = if is_jpeg {
        DynamicImage::ImageRgba8(img.clone()).to_rgb8().save(path)
    } else {
        img.save(path)
    };
    saved.map_err(|e| MosaicError::ImageExport {
        path: path.to_path_buf(),
        source: e,
    })?;
    tracing::info!(path = %path.display(), "saved");
    Ok(())
}

/// Write the tile-info ledger as UTF-8 text
///
/// # Errors
///
/// Returns an error if the file cannot be written
pub fn write_tile_info(info: &TileInfo, path: &Path) -> Result<()> {
    std::fs::write(path, info.to_string()).map_err(|e| MosaicError::FileSystem {
        path: path.to_path_buf(),
        operation: "write tile info",
        source: e,
    })
}
