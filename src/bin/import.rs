use std::path::PathBuf;

use clap::Parser;

use wpserve::config::Config;
use wpserve::importer::{self, ImportMode, ImportOptions};

/// Import images & tags from a source wallpapers catalog into the local
/// image browser.
#[derive(Parser)]
#[command(name = "wpserve-import")]
#[command(about = "Import images & tags from a source wallpapers.db")]
#[command(version)]
struct Cli {
    /// Path to the source wallpapers.db
    #[arg(long, default_value = "wallpapers.db")]
    source: PathBuf,

    /// Base directory containing source files if file_path is relative or
    /// not directly valid.
    #[arg(long = "copy-from")]
    copy_from: Option<PathBuf>,

    /// How to bring files into the local image tree.
    #[arg(long, value_enum, default_value = "copy")]
    mode: ImportMode,

    /// Limit number of images, for testing.
    #[arg(long)]
    limit: Option<usize>,

    /// Reduce output.
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.quiet { "warn" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    let config = Config::from_env();
    let report = importer::run(
        &config,
        &ImportOptions {
            source_db: cli.source,
            copy_from: cli.copy_from,
            mode: cli.mode,
            limit: cli.limit,
        },
    )?;

    println!(
        "Import finished: imported={} skipped={}",
        report.imported, report.skipped
    );
    Ok(())
}
