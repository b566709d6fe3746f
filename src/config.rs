use std::env;
use std::path::PathBuf;

/// Runtime configuration, read once from the environment at startup.
/// Every component that needs paths or the catalog location takes this
/// (or a field of it) explicitly; there is no process-global state.
#[derive(Debug, Clone)]
pub struct Config {
    /// Catalog SQLite file.
    pub db_path: PathBuf,
    /// Root directory holding the original images.
    pub images_root: PathBuf,
    /// Root directory holding the cached thumbnails, mirroring the
    /// relative layout of `images_root`.
    pub thumbs_root: PathBuf,
    /// Whether to scan `images_root` for uncataloged files at startup.
    pub auto_scan: bool,
    /// Listen address for the web server.
    pub bind: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            db_path: var_path("WPSERVE_DB_PATH", "image_browser.db"),
            images_root: var_path("WPSERVE_IMAGES_ROOT", "static/images"),
            thumbs_root: var_path("WPSERVE_THUMBS_ROOT", "static/thumbs"),
            auto_scan: env::var("WPSERVE_AUTO_SCAN").map(|v| v == "1").unwrap_or(true),
            bind: env::var("WPSERVE_BIND").unwrap_or_else(|_| "127.0.0.1:8000".to_string()),
        }
    }
}

fn var_path(key: &str, default: &str) -> PathBuf {
    env::var(key).map(PathBuf::from).unwrap_or_else(|_| PathBuf::from(default))
}
