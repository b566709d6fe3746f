//! The startup reconciler: aligns catalog rows with filesystem reality
//! before the server accepts traffic. Rows whose original file vanished
//! are deleted (their tag associations cascade); rows whose thumbnail is
//! missing get one generated eagerly so the serving path can usually
//! assume a cache hit.

use std::path::Path;

use diesel::prelude::*;
use log::{info, warn};

use crate::error::Result;
use crate::queries;
use crate::thumbnails;

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub removed: usize,
    pub generated: usize,
}

/// Walks every catalog row once. Deletion is unconditional when the
/// original file is absent; a thumbnail failure is logged and the row is
/// kept. Each decision commits on its own, so a crash mid-scan loses no
/// completed work.
pub fn reconcile(
    conn: &mut SqliteConnection,
    images_root: &Path,
    thumbs_root: &Path,
) -> Result<ReconcileReport> {
    let mut report = ReconcileReport::default();

    for image in queries::list_images(conn)? {
        let src = thumbnails::original_path(images_root, &image.file_path, &image.file_name);
        if !src.is_file() {
            info!(
                "reconcile: removing image {} ({}): original file missing",
                image.id, image.file_path
            );
            queries::delete_image(conn, image.id)?;
            report.removed += 1;
            continue;
        }

        let relative = thumbnails::derive_relative_path(&image.file_path, &image.file_name);
        let dst = thumbnails::thumbnail_path(thumbs_root, &relative);
        if dst.is_file() {
            continue;
        }
        if thumbnails::ensure_thumbnail(&src, &dst, thumbnails::SERVE_MAX_BOX).is_some() {
            report.generated += 1;
        } else {
            warn!(
                "reconcile: could not generate thumbnail for image {} ({})",
                image.id, image.file_path
            );
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewImage, NewTag};
    use crate::testutil::{temp_catalog, write_png};
    use std::fs;

    fn seed(conn: &mut SqliteConnection, file_path: &str) -> i32 {
        queries::insert_image(
            conn,
            &NewImage {
                file_path,
                file_name: file_path,
                file_size: 1,
                width: 64,
                height: 64,
                format: "PNG",
            },
        )
        .unwrap()
    }

    #[test]
    fn removes_stale_rows_and_backfills_thumbnails() {
        let (tmp, mut conn) = temp_catalog();
        let images_root = tmp.path().join("images");
        let thumbs_root = tmp.path().join("thumbs");
        fs::create_dir_all(&images_root).unwrap();

        write_png(&images_root.join("kept.png"), 64, 64);
        let kept = seed(&mut conn, "kept.png");
        let stale = seed(&mut conn, "vanished.png");
        let tag_id = queries::insert_tag(&mut conn, &NewTag { name: "v" }).unwrap();
        queries::add_image_tag(&mut conn, stale, tag_id).unwrap();

        let report = reconcile(&mut conn, &images_root, &thumbs_root).unwrap();
        assert_eq!(report, ReconcileReport { removed: 1, generated: 1 });

        assert!(queries::get_image(&mut conn, stale).unwrap().is_none());
        assert!(queries::get_image(&mut conn, kept).unwrap().is_some());
        assert!(thumbs_root.join("kept.jpg").is_file());
        // The stale row's tag survives as an orphan.
        assert!(queries::get_tag(&mut conn, tag_id).unwrap().is_some());
    }

    #[test]
    fn is_idempotent_without_filesystem_changes() {
        let (tmp, mut conn) = temp_catalog();
        let images_root = tmp.path().join("images");
        let thumbs_root = tmp.path().join("thumbs");
        fs::create_dir_all(&images_root).unwrap();

        write_png(&images_root.join("a.png"), 32, 32);
        seed(&mut conn, "a.png");
        seed(&mut conn, "gone.png");

        let first = reconcile(&mut conn, &images_root, &thumbs_root).unwrap();
        assert_eq!(first, ReconcileReport { removed: 1, generated: 1 });

        let second = reconcile(&mut conn, &images_root, &thumbs_root).unwrap();
        assert_eq!(second, ReconcileReport { removed: 0, generated: 0 });
    }

    #[test]
    fn decode_failure_keeps_the_row() {
        let (tmp, mut conn) = temp_catalog();
        let images_root = tmp.path().join("images");
        let thumbs_root = tmp.path().join("thumbs");
        fs::create_dir_all(&images_root).unwrap();

        fs::write(images_root.join("corrupt.png"), b"junk").unwrap();
        let id = seed(&mut conn, "corrupt.png");

        let report = reconcile(&mut conn, &images_root, &thumbs_root).unwrap();
        assert_eq!(report, ReconcileReport { removed: 0, generated: 0 });
        assert!(queries::get_image(&mut conn, id).unwrap().is_some());
    }
}
