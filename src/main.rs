use std::sync::Arc;

use log::info;

use wpserve::config::Config;
use wpserve::server::AppState;
use wpserve::{db, reconcile, scan, server};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::from_env();
    let pool = db::connection_pool(&config.db_path)?;

    // Catalog repair happens before the listener opens, so request
    // handlers can usually assume thumbnails already exist.
    {
        let mut conn = pool.get()?;
        db::run_migrations(&mut conn)?;

        if config.auto_scan {
            let added = scan::scan_images(&mut conn, &config.images_root)?;
            info!("initial scan cataloged {} new images", added);
        }

        let report = reconcile::reconcile(&mut conn, &config.images_root, &config.thumbs_root)?;
        info!(
            "reconcile: removed={} generated={}",
            report.removed, report.generated
        );
    }

    let listener = tokio::net::TcpListener::bind(&config.bind).await?;
    info!("listening on {}", listener.local_addr()?);

    let state = Arc::new(AppState { pool, config });
    axum::serve(listener, server::router(state)).await?;

    Ok(())
}
