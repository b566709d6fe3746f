//! Offline batch importer: migrates image records and files from a source
//! wallpapers catalog into the local catalog and image tree. Read-only on
//! the source. Per-record problems are counted and logged; only structural
//! misconfiguration aborts the run.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use diesel::prelude::*;
use log::{debug, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::db;
use crate::error::{Error, Result};
use crate::models::{NewImage, NewTag};
use crate::queries;
use crate::thumbnails::{self, is_supported_extension};

/// Images lacking this tag in the source catalog are not imported.
pub const INCLUDE_MARKER_TAG: &str = "v";

/// A commit happens after this many successful imports.
const BATCH_COMMIT_SIZE: usize = 50;

/// How image files are brought into the local tree.
#[derive(Copy, Clone, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum ImportMode {
    /// Copy file contents.
    Copy,
    /// Symlink to the source file, falling back to a copy.
    Link,
    /// Bring no bytes over; assume the file is already staged under its
    /// source name.
    Skip,
}

#[derive(Debug, Clone)]
pub struct ImportOptions {
    pub source_db: PathBuf,
    /// Base directory for resolving relative (or stale absolute) source
    /// file paths.
    pub copy_from: Option<PathBuf>,
    pub mode: ImportMode,
    /// Cap on the number of source records considered, for testing.
    pub limit: Option<usize>,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub imported: usize,
    pub skipped: usize,
}

// The source catalog's layout, mapped explicitly. Only read.
mod source_schema {
    diesel::table! {
        image (id) {
            id -> Integer,
            file_path -> Text,
            file_name -> Text,
            file_size -> Integer,
            width -> Integer,
            height -> Integer,
            format -> Text,
        }
    }

    diesel::table! {
        tag (id) {
            id -> Integer,
            name -> Text,
        }
    }

    diesel::table! {
        image_tag (image_id, tag_id) {
            image_id -> Integer,
            tag_id -> Integer,
        }
    }

    diesel::joinable!(image_tag -> image (image_id));
    diesel::joinable!(image_tag -> tag (tag_id));
    diesel::allow_tables_to_appear_in_same_query!(image, image_tag, tag);
}

#[derive(Queryable, Debug)]
struct SourceImage {
    id: i32,
    file_path: String,
    file_name: String,
    file_size: i32,
    width: i32,
    height: i32,
    format: String,
}

/// Runs the import to completion. Fails fast only when the source database
/// is missing; everything else is a per-record skip.
pub fn run(config: &Config, options: &ImportOptions) -> Result<ImportReport> {
    if !options.source_db.exists() {
        return Err(Error::SourceDbNotFound(options.source_db.clone()));
    }

    fs::create_dir_all(&config.images_root)?;

    let mut source_conn = open_source(&options.source_db)?;
    let source_images = load_source_images(&mut source_conn, options.limit)?;
    let tags_by_image = load_source_tags(&mut source_conn)?;

    let mut conn = db::establish(&config.db_path)?;
    db::run_migrations(&mut conn)?;

    // Tag cache: populated once, refreshed on insert, so tag lookups never
    // go back to the database during the run.
    let mut tag_cache: HashMap<String, i32> = queries::list_all_tags(&mut conn)?
        .into_iter()
        .map(|tag| (tag.name, tag.id))
        .collect();

    let mut report = ImportReport::default();

    // Commit every BATCH_COMMIT_SIZE successful imports; skipped records
    // do not advance the commit window.
    let mut remaining = source_images.iter().peekable();
    while remaining.peek().is_some() {
        conn.transaction::<_, Error, _>(|conn| {
            let mut batched = 0;
            while batched < BATCH_COMMIT_SIZE {
                let Some(source) = remaining.next() else { break };
                match import_one(conn, config, options, source, &tags_by_image, &mut tag_cache)? {
                    Outcome::Imported => {
                        report.imported += 1;
                        batched += 1;
                    }
                    Outcome::Skipped => report.skipped += 1,
                }
            }
            Ok(())
        })?;
        debug!("committed batch; imported={} so far", report.imported);
    }

    info!(
        "import finished: imported={} skipped={}",
        report.imported, report.skipped
    );
    Ok(report)
}

enum Outcome {
    Imported,
    Skipped,
}

fn import_one(
    conn: &mut SqliteConnection,
    config: &Config,
    options: &ImportOptions,
    source: &SourceImage,
    tags_by_image: &HashMap<i32, Vec<String>>,
    tag_cache: &mut HashMap<String, i32>,
) -> Result<Outcome> {
    let ext = Path::new(&source.file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    let Some(ext) = ext.filter(|e| is_supported_extension(e)) else {
        info!("skip unsupported extension: {}", source.file_name);
        return Ok(Outcome::Skipped);
    };

    let tag_names = distinct_tag_names(tags_by_image.get(&source.id));
    if !tag_names.iter().any(|name| name == INCLUDE_MARKER_TAG) {
        info!("skip without '{}' tag: {}", INCLUDE_MARKER_TAG, source.file_name);
        return Ok(Outcome::Skipped);
    }

    if queries::image_exists_with_file_name(conn, &source.file_name)? {
        info!("already present: {}", source.file_name);
        return Ok(Outcome::Skipped);
    }

    let src_path = resolve_source_path(&source.file_path, options.copy_from.as_deref());

    // A fresh collision-free name keeps source catalogs from fighting over
    // file names in the shared image tree. Skip mode moves no bytes, so
    // there the staged file keeps its source name.
    let dest_name = match options.mode {
        ImportMode::Skip => source.file_name.clone(),
        _ => format!("{}.{}", Uuid::new_v4().simple(), ext),
    };
    let dest_path = config.images_root.join(&dest_name);

    // Every mode needs the file to exist somewhere: the resolved source
    // when bytes move, the already-staged destination when they don't.
    match options.mode {
        ImportMode::Copy | ImportMode::Link => {
            if !src_path.exists() {
                warn!("missing source file: {}", src_path.display());
                return Ok(Outcome::Skipped);
            }
        }
        ImportMode::Skip => {
            if !dest_path.exists() {
                warn!("missing staged file: {}", dest_path.display());
                return Ok(Outcome::Skipped);
            }
        }
    }

    match options.mode {
        ImportMode::Copy => {
            if let Err(e) = fs::copy(&src_path, &dest_path) {
                warn!("copy failed for {}: {}", src_path.display(), e);
                return Ok(Outcome::Skipped);
            }
        }
        ImportMode::Link => {
            if let Err(e) = link_or_copy(&src_path, &dest_path) {
                warn!("link failed for {}: {}", src_path.display(), e);
                return Ok(Outcome::Skipped);
            }
        }
        ImportMode::Skip => {}
    }

    // Thumbnail failure is logged inside and does not abort this record.
    let thumb_dst = thumbnails::thumbnail_path(&config.thumbs_root, Path::new(&dest_name));
    thumbnails::ensure_thumbnail(&dest_path, &thumb_dst, thumbnails::IMPORT_MAX_BOX);

    // Dimensions and size are carried over verbatim, not re-derived.
    let image_id = queries::insert_image(
        conn,
        &NewImage {
            file_path: &dest_name,
            file_name: &source.file_name,
            file_size: source.file_size,
            width: source.width,
            height: source.height,
            format: &source.format,
        },
    )?;

    for name in &tag_names {
        let tag_id = match tag_cache.get(name) {
            Some(id) => *id,
            None => {
                let id = queries::insert_tag(conn, &NewTag { name })?;
                tag_cache.insert(name.clone(), id);
                id
            }
        };
        queries::add_image_tag(conn, image_id, tag_id)?;
    }

    info!("imported {} as {}", source.file_name, dest_name);
    Ok(Outcome::Imported)
}

fn open_source(path: &Path) -> Result<SqliteConnection> {
    let path_str = path.to_str().ok_or_else(|| Error::NonUtf8Path(path.to_path_buf()))?;
    Ok(SqliteConnection::establish(path_str)?)
}

fn load_source_images(
    conn: &mut SqliteConnection,
    limit: Option<usize>,
) -> Result<Vec<SourceImage>> {
    use source_schema::image;

    let mut query = image::table
        .select((
            image::id,
            image::file_path,
            image::file_name,
            image::file_size,
            image::width,
            image::height,
            image::format,
        ))
        .order(image::id.asc())
        .into_boxed();
    if let Some(limit) = limit {
        query = query.limit(limit as i64);
    }
    Ok(query.load(conn)?)
}

fn load_source_tags(conn: &mut SqliteConnection) -> Result<HashMap<i32, Vec<String>>> {
    use source_schema::{image_tag, tag};

    let pairs: Vec<(i32, String)> = image_tag::table
        .inner_join(tag::table)
        .select((image_tag::image_id, tag::name))
        .load(conn)?;

    let mut by_image: HashMap<i32, Vec<String>> = HashMap::new();
    for (image_id, name) in pairs {
        by_image.entry(image_id).or_default().push(name);
    }
    Ok(by_image)
}

/// Deduplicates tag names (case-sensitive) preserving their stored order.
fn distinct_tag_names(names: Option<&Vec<String>>) -> Vec<String> {
    let mut seen = HashSet::new();
    names
        .map(|names| {
            names
                .iter()
                .filter(|name| seen.insert(name.as_str()))
                .cloned()
                .collect()
        })
        .unwrap_or_default()
}

/// The source catalog may record paths relative to a base directory, or
/// absolute paths that are only valid when re-rooted under `copy_from`.
fn resolve_source_path(file_path: &str, copy_from: Option<&Path>) -> PathBuf {
    let path = Path::new(file_path);
    if path.is_relative() {
        match copy_from {
            Some(base) => base.join(path),
            None => path.to_path_buf(),
        }
    } else if !path.exists() {
        match copy_from {
            Some(base) => {
                let rerooted = base.join(path.components().skip(1).collect::<PathBuf>());
                if rerooted.exists() {
                    rerooted
                } else {
                    path.to_path_buf()
                }
            }
            None => path.to_path_buf(),
        }
    } else {
        path.to_path_buf()
    }
}

#[cfg(unix)]
fn link_or_copy(src: &Path, dst: &Path) -> std::io::Result<()> {
    let resolved = src.canonicalize()?;
    if dst.exists() {
        fs::remove_file(dst)?;
    }
    if std::os::unix::fs::symlink(&resolved, dst).is_err() {
        fs::copy(src, dst)?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn link_or_copy(src: &Path, dst: &Path) -> std::io::Result<()> {
    fs::copy(src, dst)?;
    Ok(())
}
