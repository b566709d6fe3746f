pub mod config;
pub mod db;
pub mod error;
pub mod importer;
pub mod models;
pub mod queries;
pub mod reconcile;
pub mod scan;
pub mod schema;
pub mod server;
pub mod thumbnails;

pub use error::{Error, Result};

#[cfg(test)]
pub(crate) mod testutil {
    use std::path::Path;

    use diesel::SqliteConnection;
    use tempfile::TempDir;

    /// A migrated catalog in a fresh temp directory, pragmas applied.
    pub fn temp_catalog() -> (TempDir, SqliteConnection) {
        let tmp = TempDir::new().unwrap();
        let mut conn = crate::db::establish(&tmp.path().join("catalog.db")).unwrap();
        crate::db::run_migrations(&mut conn).unwrap();
        (tmp, conn)
    }

    pub fn write_png(path: &Path, width: u32, height: u32) {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        let img = image::RgbaImage::from_pixel(width, height, image::Rgba([40, 90, 200, 255]));
        img.save(path).unwrap();
    }
}
