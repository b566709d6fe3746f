//! Read-only HTTP surface over the catalog: HTML browse pages, a JSON API,
//! raw-file serving, and the lazy thumbnail path. The only write performed
//! here is the thumbnail cache miss.

use std::sync::Arc;

use axum::extract::{Path as UrlPath, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use log::error;
use serde::Serialize;

use crate::config::Config;
use crate::db::DbPool;
use crate::models::{Image, Tag};
use crate::queries;
use crate::thumbnails;

pub struct AppState {
    pub pool: DbPool,
    pub config: Config,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/tag/:id", get(tag_page))
        .route("/image/:id", get(image_page))
        .route("/api/images", get(api_images))
        .route("/api/images/:id", get(api_image))
        .route("/api/tags", get(api_tags))
        .route("/api/thumb/:id", get(api_thumb))
        .route("/api/raw/:id", get(api_raw))
        .route("/healthz", get(healthz))
        .with_state(state)
}

enum ServeError {
    NotFound(&'static str),
    Internal(String),
}

impl IntoResponse for ServeError {
    fn into_response(self) -> Response {
        match self {
            ServeError::NotFound(msg) => (StatusCode::NOT_FOUND, msg).into_response(),
            ServeError::Internal(msg) => {
                error!("request failed: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error").into_response()
            }
        }
    }
}

impl From<diesel::result::Error> for ServeError {
    fn from(e: diesel::result::Error) -> Self {
        ServeError::Internal(e.to_string())
    }
}

impl From<diesel::r2d2::PoolError> for ServeError {
    fn from(e: diesel::r2d2::PoolError) -> Self {
        ServeError::Internal(e.to_string())
    }
}

impl From<tokio::task::JoinError> for ServeError {
    fn from(e: tokio::task::JoinError) -> Self {
        ServeError::Internal(e.to_string())
    }
}

type ServeResult<T> = std::result::Result<T, ServeError>;

#[derive(Serialize)]
struct ApiTag {
    id: i32,
    name: String,
}

impl From<Tag> for ApiTag {
    fn from(tag: Tag) -> Self {
        ApiTag { id: tag.id, name: tag.name }
    }
}

#[derive(Serialize)]
struct ApiImage {
    id: i32,
    file_name: String,
    file_path: String,
    file_size: i32,
    width: i32,
    height: i32,
    format: String,
    tags: Vec<ApiTag>,
}

impl ApiImage {
    fn new(image: Image, tags: Vec<Tag>) -> Self {
        ApiImage {
            id: image.id,
            file_name: image.file_name,
            file_path: image.file_path,
            file_size: image.file_size,
            width: image.width,
            height: image.height,
            format: image.format,
            tags: tags.into_iter().map(ApiTag::from).collect(),
        }
    }
}

async fn healthz() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "ok": true }))
}

async fn index(State(state): State<Arc<AppState>>) -> ServeResult<Html<String>> {
    let mut conn = state.pool.get()?;
    let tags = queries::list_visible_tags(&mut conn)?;
    let total = queries::count_images(&mut conn)?;

    let mut body = String::from("<h1>Image Browser</h1>\n");
    body.push_str(&format!("<p>{} images</p>\n<ul>\n", total));
    for tag in &tags {
        body.push_str(&format!(
            "<li><a href=\"/tag/{}\">{}</a></li>\n",
            tag.id,
            escape_html(&tag.name)
        ));
    }
    body.push_str("</ul>\n");
    Ok(Html(page("Image Browser", &body)))
}

async fn tag_page(
    State(state): State<Arc<AppState>>,
    UrlPath(id): UrlPath<i32>,
) -> ServeResult<Html<String>> {
    let mut conn = state.pool.get()?;
    let tag = queries::get_tag(&mut conn, id)?.ok_or(ServeError::NotFound("Tag not found"))?;
    let images = queries::images_for_tag(&mut conn, tag.id)?;

    let mut body = format!("<h1>{}</h1>\n<div class=\"grid\">\n", escape_html(&tag.name));
    for image in &images {
        body.push_str(&format!(
            "<a href=\"/image/{id}\"><img src=\"/api/thumb/{id}\" alt=\"{alt}\"></a>\n",
            id = image.id,
            alt = escape_html(&image.file_name)
        ));
    }
    body.push_str("</div>\n");
    Ok(Html(page(&tag.name, &body)))
}

async fn image_page(
    State(state): State<Arc<AppState>>,
    UrlPath(id): UrlPath<i32>,
) -> ServeResult<Html<String>> {
    let mut conn = state.pool.get()?;
    let image =
        queries::get_image(&mut conn, id)?.ok_or(ServeError::NotFound("Image not found"))?;
    let tags = queries::tags_for_image(&mut conn, image.id)?;

    let mut body = format!(
        "<h1>{name}</h1>\n<img src=\"/api/raw/{id}\" alt=\"{name}\">\n\
         <p>{width}&times;{height} &middot; {format} &middot; {size} bytes</p>\n<ul>\n",
        name = escape_html(&image.file_name),
        id = image.id,
        width = image.width,
        height = image.height,
        format = escape_html(&image.format),
        size = image.file_size,
    );
    for tag in &tags {
        body.push_str(&format!(
            "<li><a href=\"/tag/{}\">{}</a></li>\n",
            tag.id,
            escape_html(&tag.name)
        ));
    }
    body.push_str("</ul>\n");
    Ok(Html(page(&image.file_name, &body)))
}

async fn api_images(State(state): State<Arc<AppState>>) -> ServeResult<Json<Vec<ApiImage>>> {
    let mut conn = state.pool.get()?;
    let images = queries::list_images_with_tags(&mut conn)?;
    Ok(Json(
        images
            .into_iter()
            .map(|(image, tags)| ApiImage::new(image, tags))
            .collect(),
    ))
}

async fn api_image(
    State(state): State<Arc<AppState>>,
    UrlPath(id): UrlPath<i32>,
) -> ServeResult<Json<ApiImage>> {
    let mut conn = state.pool.get()?;
    let image =
        queries::get_image(&mut conn, id)?.ok_or(ServeError::NotFound("Image not found"))?;
    let tags = queries::tags_for_image(&mut conn, image.id)?;
    Ok(Json(ApiImage::new(image, tags)))
}

async fn api_tags(State(state): State<Arc<AppState>>) -> ServeResult<Json<Vec<ApiTag>>> {
    let mut conn = state.pool.get()?;
    let tags = queries::list_visible_tags(&mut conn)?;
    Ok(Json(tags.into_iter().map(ApiTag::from).collect()))
}

/// Resolves (or generates) the cached thumbnail and returns its bytes.
/// The catalog claims the image exists, so an unresolvable miss is a
/// server error, not a not-found.
async fn api_thumb(
    State(state): State<Arc<AppState>>,
    UrlPath(id): UrlPath<i32>,
) -> ServeResult<Response> {
    let image = {
        let mut conn = state.pool.get()?;
        queries::get_image(&mut conn, id)?.ok_or(ServeError::NotFound("Image not found"))?
    };

    let src = thumbnails::original_path(&state.config.images_root, &image.file_path, &image.file_name);
    let relative = thumbnails::derive_relative_path(&image.file_path, &image.file_name);
    let dst = thumbnails::thumbnail_path(&state.config.thumbs_root, &relative);

    // Decode/encode is CPU-bound; keep it off the async workers. Two
    // concurrent misses for the same path may both generate; each writes a
    // complete file, so the race only costs duplicate work.
    let thumb = tokio::task::spawn_blocking(move || {
        thumbnails::ensure_thumbnail(&src, &dst, thumbnails::SERVE_MAX_BOX)
    })
    .await?
    .ok_or_else(|| ServeError::Internal(format!("thumbnail unavailable for image {}", id)))?;

    let bytes = tokio::fs::read(&thumb)
        .await
        .map_err(|e| ServeError::Internal(e.to_string()))?;
    Ok(([(header::CONTENT_TYPE, "image/jpeg")], bytes).into_response())
}

async fn api_raw(
    State(state): State<Arc<AppState>>,
    UrlPath(id): UrlPath<i32>,
) -> ServeResult<Response> {
    let image = {
        let mut conn = state.pool.get()?;
        queries::get_image(&mut conn, id)?.ok_or(ServeError::NotFound("Image not found"))?
    };

    let path = thumbnails::original_path(&state.config.images_root, &image.file_path, &image.file_name);
    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(_) => return Err(ServeError::NotFound("File not found on disk")),
    };

    let content_type = path
        .extension()
        .and_then(|e| e.to_str())
        .map(content_type_for_extension)
        .unwrap_or("application/octet-stream");
    Ok(([(header::CONTENT_TYPE, content_type)], bytes).into_response())
}

/// Fixed extension lookup; anything unknown is served as a generic binary.
fn content_type_for_extension(ext: &str) -> &'static str {
    match ext.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        _ => "application/octet-stream",
    }
}

fn page(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"><title>{}</title></head>\n\
         <body>\n{}</body>\n</html>\n",
        escape_html(title),
        body
    )
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}
