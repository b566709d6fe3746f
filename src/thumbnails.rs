//! The thumbnail cache: a parallel directory tree of bounded-size JPEGs,
//! keyed by the original's catalog-relative path. Presence on disk is the
//! cache-hit signal; a thumbnail is never re-validated against its source.

use std::fs;
use std::path::{Path, PathBuf};

use image::codecs::jpeg::JpegEncoder;
use log::{info, warn};

use crate::error::Result;

/// Bounding box for thumbnails generated by the serving surface and the
/// startup reconciler.
pub const SERVE_MAX_BOX: (u32, u32) = (512, 512);
/// Bounding box for thumbnails generated during import.
pub const IMPORT_MAX_BOX: (u32, u32) = (480, 270);

const JPEG_QUALITY: u8 = 80;

/// File extensions the catalog accepts, lowercase, without the dot.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp"];

pub fn is_supported_extension(ext: &str) -> bool {
    SUPPORTED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str())
}

/// The catalog-relative path of an image's file. `file_path` is preferred
/// when it already names a file (has an extension); otherwise it is treated
/// as a directory holding `file_name`.
pub fn derive_relative_path(file_path: &str, file_name: &str) -> PathBuf {
    let p = Path::new(file_path);
    if p.extension().is_some() {
        p.to_path_buf()
    } else {
        p.join(file_name)
    }
}

pub fn original_path(images_root: &Path, file_path: &str, file_name: &str) -> PathBuf {
    images_root.join(derive_relative_path(file_path, file_name))
}

/// Mirrors the relative path under the thumbnail root, normalizing the
/// extension to `.jpg`.
pub fn thumbnail_path(thumbs_root: &Path, relative: &Path) -> PathBuf {
    thumbs_root.join(relative).with_extension("jpg")
}

/// Ensures a cached thumbnail exists for `src` at `dst`.
///
/// Returns `Some(dst)` on a cache hit or after a successful generation, and
/// `None` when the source is missing or cannot be decoded/encoded. Failures
/// are logged and reported as a miss rather than raised; the caller decides
/// whether a miss is an error. Calling this again after a success is a pure
/// no-op: the existing file is returned untouched.
pub fn ensure_thumbnail(src: &Path, dst: &Path, max_box: (u32, u32)) -> Option<PathBuf> {
    if !src.is_file() {
        warn!("original image missing: {}", src.display());
        return None;
    }
    if dst.is_file() {
        return Some(dst.to_path_buf());
    }
    if let Some(parent) = dst.parent() {
        if let Err(e) = fs::create_dir_all(parent) {
            warn!("failed to create thumbnail directory {}: {}", parent.display(), e);
            return None;
        }
    }
    match generate(src, dst, max_box) {
        Ok(()) => {
            info!("created thumbnail {}", dst.display());
            Some(dst.to_path_buf())
        }
        Err(e) => {
            warn!("failed generating thumbnail for {}: {}", src.display(), e);
            None
        }
    }
}

/// Decode, resize to fit the box, flatten to RGB, encode as JPEG. The
/// encode happens in memory and the file is written in one call, so a
/// failure anywhere leaves no partial file behind.
fn generate(src: &Path, dst: &Path, max_box: (u32, u32)) -> Result<()> {
    let orig = image::open(src)?;
    // Dropping the alpha channel flattens transparency; grayscale is
    // widened to RGB for JPEG compatibility.
    let rgb = orig.into_rgb8();
    let (new_width, new_height) = fit_within((rgb.width(), rgb.height()), max_box);
    let thumb = image::imageops::thumbnail(&rgb, new_width, new_height);

    let mut encoded = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut encoded, JPEG_QUALITY);
    thumb.write_with_encoder(encoder)?;
    fs::write(dst, &encoded)?;
    Ok(())
}

/// Scales `(width, height)` down to fit within `max_box`, preserving the
/// aspect ratio. Images already inside the box keep their dimensions; this
/// never upscales.
pub fn fit_within((width, height): (u32, u32), (max_width, max_height): (u32, u32)) -> (u32, u32) {
    if width <= max_width && height <= max_height {
        return (width, height);
    }
    let scale = f64::min(
        max_width as f64 / width as f64,
        max_height as f64 / height as f64,
    );
    let new_width = ((width as f64 * scale).round() as u32).max(1);
    let new_height = ((height as f64 * scale).round() as u32).max(1);
    (new_width, new_height)
}
