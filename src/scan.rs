//! Initial directory scan: catalogs image files found under the images
//! root that have no row yet. Runs at startup when auto-scan is enabled.

use std::fs;
use std::path::Path;

use diesel::prelude::*;
use log::{debug, warn};
use walkdir::WalkDir;

use crate::error::Result;
use crate::models::NewImage;
use crate::queries;
use crate::thumbnails::is_supported_extension;

/// Walks `images_root` and inserts a catalog row for every supported image
/// file not already present (keyed by its root-relative path). Files that
/// cannot be decoded are skipped. Returns the number of rows added.
pub fn scan_images(conn: &mut SqliteConnection, images_root: &Path) -> Result<usize> {
    fs::create_dir_all(images_root)?;

    let mut added = 0;
    for entry in WalkDir::new(images_root) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("scan: skipping unreadable entry: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let ext = match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if is_supported_extension(ext) => ext.to_ascii_lowercase(),
            _ => continue,
        };
        // strip_prefix cannot fail for entries produced by this walk.
        let relative = path.strip_prefix(images_root).unwrap_or(path);
        let Some(relative_str) = relative.to_str() else {
            warn!("scan: skipping non-UTF-8 path: {}", relative.display());
            continue;
        };
        if queries::image_exists_with_file_path(conn, relative_str)? {
            continue;
        }
        let file_size = match entry.metadata() {
            // The catalog column is 32-bit; anything bigger is not a
            // wallpaper and gets skipped rather than recorded truncated.
            Ok(metadata) => match i32::try_from(metadata.len()) {
                Ok(size) => size,
                Err(_) => {
                    warn!(
                        "scan: skipping {} ({} bytes exceeds catalog size range)",
                        path.display(),
                        metadata.len()
                    );
                    continue;
                }
            },
            Err(e) => {
                warn!("scan: cannot stat {}: {}", path.display(), e);
                continue;
            }
        };
        let (width, height) = match image::image_dimensions(path) {
            Ok(dimensions) => dimensions,
            Err(e) => {
                warn!("scan: cannot read dimensions of {}: {}", path.display(), e);
                continue;
            }
        };
        let file_name = match relative.file_name().and_then(|n| n.to_str()) {
            Some(name) => name,
            None => continue,
        };
        let format = format_label(&ext);
        queries::insert_image(
            conn,
            &NewImage {
                file_path: relative_str,
                file_name,
                file_size,
                width: width as i32,
                height: height as i32,
                format: &format,
            },
        )?;
        debug!("scan: cataloged {}", relative_str);
        added += 1;
    }
    Ok(added)
}

fn format_label(ext: &str) -> String {
    match ext {
        "jpg" | "jpeg" => "JPEG".to_string(),
        "png" => "PNG".to_string(),
        "gif" => "GIF".to_string(),
        "webp" => "WEBP".to_string(),
        other => other.to_ascii_uppercase(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{temp_catalog, write_png};

    #[test]
    fn catalogs_new_files_and_skips_known_and_unsupported_ones() {
        let (tmp, mut conn) = temp_catalog();
        let root = tmp.path().join("images");
        fs::create_dir_all(root.join("walls")).unwrap();
        write_png(&root.join("walls/a.png"), 320, 200);
        fs::write(root.join("notes.txt"), "not an image").unwrap();
        fs::write(root.join("broken.png"), "corrupt").unwrap();

        assert_eq!(scan_images(&mut conn, &root).unwrap(), 1);
        let images = queries::list_images(&mut conn).unwrap();
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].file_path, "walls/a.png");
        assert_eq!(images[0].file_name, "a.png");
        assert_eq!((images[0].width, images[0].height), (320, 200));
        assert_eq!(images[0].format, "PNG");

        // A second scan with no new files adds nothing.
        assert_eq!(scan_images(&mut conn, &root).unwrap(), 0);
    }

    #[test]
    fn files_larger_than_the_size_column_are_skipped() {
        let (tmp, mut conn) = temp_catalog();
        let root = tmp.path().join("images");
        write_png(&root.join("ok.png"), 8, 8);
        // Sparse file, so no actual 3 GiB hit the disk.
        let huge = fs::File::create(root.join("huge.png")).unwrap();
        huge.set_len(3 * 1024 * 1024 * 1024).unwrap();

        assert_eq!(scan_images(&mut conn, &root).unwrap(), 1);
        let images = queries::list_images(&mut conn).unwrap();
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].file_name, "ok.png");
    }
}
