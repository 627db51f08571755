use axum::{
    Json,
    body::Bytes,
    extract::{Multipart, State, multipart::MultipartError},
    http::{HeaderMap, StatusCode, header},
};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

use super::{ApiResponse, parse_json, success};
use crate::AppState;
use crate::error::{ApiError, ApiResult};
use crate::services::ResolvedPath;
use crate::utils::{remove_if_exists, validate_entry_name, validate_text_filename};

// ============= Request Types =============

#[derive(Debug, Deserialize)]
struct CreateFileRequest {
    #[serde(default)]
    filename: String,
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct CreateDirRequest {
    #[serde(default)]
    dirname: String,
}

// ============= Target Directory =============

/// The `/share<N>/...` tail of a Referer URL. The last occurrence wins.
pub(crate) fn referer_share_path(referer: &str) -> Option<&str> {
    referer
        .match_indices("/share")
        .map(|(i, _)| i)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .find(|&i| {
            let tail = &referer[i + "/share".len()..];
            let digits = tail.bytes().take_while(u8::is_ascii_digit).count();
            digits > 0 && tail[digits..].starts_with('/')
        })
        .map(|i| &referer[i..])
}

/// Directory a mutating call operates on: the directory page the request came
/// from, or the first share when there is no usable Referer.
fn target_dir(state: &AppState, headers: &HeaderMap) -> ApiResult<(usize, PathBuf)> {
    let referer = headers
        .get(header::REFERER)
        .and_then(|v| v.to_str().ok())
        .and_then(referer_share_path);

    let Some(page) = referer else {
        return state
            .shares
            .canonical_root(0)
            .map(|root| (0, root))
            .ok_or_else(|| ApiError::bad_request("No shared directories available"));
    };

    match state.shares.resolve(page) {
        ResolvedPath::Share { index, path } if path.is_dir() => Ok((index, path)),
        ResolvedPath::Share { .. } => Err(ApiError::bad_request("Invalid current directory")),
        ResolvedPath::Rejected | ResolvedPath::Root => Err(ApiError::access_denied()),
    }
}

/// `dir/name`, re-checked against the share boundary.
fn target_path(state: &AppState, index: usize, dir: &Path, name: &str) -> ApiResult<PathBuf> {
    let path = dir.join(name);
    if !state.shares.contains(index, &path) {
        tracing::warn!("Refusing to write outside share {}: {}", index + 1, path.display());
        return Err(ApiError::access_denied());
    }
    Ok(path)
}

fn exists_conflict(what: &str) -> impl FnOnce(std::io::Error) -> ApiError + '_ {
    move |e| {
        if e.kind() == std::io::ErrorKind::AlreadyExists {
            ApiError::Conflict(format!("{} already exists", what))
        } else {
            e.into()
        }
    }
}

// ============= Handlers =============

/// POST /api/create_file
pub async fn create_file(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<ApiResponse<()>>)> {
    let request: CreateFileRequest = parse_json(&body)?;
    let filename = request.filename.trim();
    validate_text_filename(filename).map_err(ApiError::bad_request)?;

    let (index, dir) = target_dir(&state, &headers)?;
    let path = target_path(&state, index, &dir, filename)?;

    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&path)
        .await
        .map_err(exists_conflict("File"))?;
    file.write_all(request.content.as_bytes()).await?;
    file.flush().await?;

    tracing::info!("Created file {}", path.display());
    Ok((StatusCode::CREATED, success("File created")))
}

/// POST /api/create_dir
pub async fn create_dir(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<ApiResponse<()>>)> {
    let request: CreateDirRequest = parse_json(&body)?;
    let dirname = request.dirname.trim();
    validate_entry_name(dirname).map_err(ApiError::bad_request)?;

    let (index, dir) = target_dir(&state, &headers)?;
    let path = target_path(&state, index, &dir, dirname)?;

    tokio::fs::create_dir(&path)
        .await
        .map_err(exists_conflict("Directory"))?;

    tracing::info!("Created directory {}", path.display());
    Ok((StatusCode::CREATED, success("Directory created")))
}

/// What the multipart stream delivered.
#[derive(Debug, Default)]
struct ReceivedUpload {
    filename_field: Option<String>,
    part_filename: Option<String>,
    bytes: Option<u64>,
}

/// POST /api/upload
///
/// Multipart fields `file` and `filename`. The file part is streamed into a
/// hidden temporary file next to its destination and moved into place once
/// the name has been checked.
pub async fn upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> ApiResult<(StatusCode, Json<ApiResponse<()>>)> {
    let (index, dir) = target_dir(&state, &headers)?;
    let temp_path = dir.join(format!(".upload-{}.part", uuid::Uuid::new_v4().simple()));

    let result = match receive_upload(&mut multipart, &temp_path, state.max_upload_bytes).await {
        Ok(received) => place_upload(&state, index, &dir, &temp_path, received).await,
        Err(e) => Err(e),
    };

    if result.is_err() {
        if let Err(e) = remove_if_exists(&temp_path).await {
            tracing::warn!("Failed to remove {}: {}", temp_path.display(), e);
        }
    }
    result
}

fn multipart_error(limit: u64) -> impl Fn(MultipartError) -> ApiError {
    move |e| {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge { limit }
        } else {
            tracing::warn!(?e, "Multipart parse error");
            ApiError::bad_request("Failed to parse multipart")
        }
    }
}

async fn receive_upload(
    multipart: &mut Multipart,
    temp_path: &Path,
    limit: u64,
) -> ApiResult<ReceivedUpload> {
    let mut received = ReceivedUpload::default();

    while let Some(mut field) = multipart.next_field().await.map_err(multipart_error(limit))? {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "filename" => {
                received.filename_field =
                    Some(field.text().await.map_err(multipart_error(limit))?);
            }
            "file" if received.bytes.is_none() => {
                received.part_filename = field.file_name().map(str::to_string);

                let mut out = tokio::fs::File::create(temp_path).await?;
                let mut written = 0u64;
                while let Some(chunk) = field.chunk().await.map_err(multipart_error(limit))? {
                    out.write_all(&chunk).await?;
                    written += chunk.len() as u64;
                }
                out.flush().await?;
                received.bytes = Some(written);
            }
            other => {
                tracing::debug!(field_name = %other, "Ignoring multipart field");
            }
        }
    }

    Ok(received)
}

async fn place_upload(
    state: &AppState,
    index: usize,
    dir: &Path,
    temp_path: &Path,
    received: ReceivedUpload,
) -> ApiResult<(StatusCode, Json<ApiResponse<()>>)> {
    let Some(bytes) = received.bytes else {
        return Err(ApiError::bad_request("No file uploaded"));
    };

    let filename = received
        .filename_field
        .or(received.part_filename)
        .map(|name| name.trim().to_string())
        .unwrap_or_default();
    if filename.is_empty() {
        return Err(ApiError::bad_request("Empty filename"));
    }
    validate_entry_name(&filename).map_err(ApiError::bad_request)?;

    let path = target_path(state, index, dir, &filename)?;

    // A hard link never replaces an existing file. Filesystems without hard
    // links fall back to check-then-rename.
    match tokio::fs::hard_link(temp_path, &path).await {
        Ok(()) => {
            remove_if_exists(temp_path).await?;
        }
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
            return Err(ApiError::Conflict("File already exists".to_string()));
        }
        Err(e) => {
            tracing::debug!("Hard link unavailable ({}), renaming instead", e);
            if tokio::fs::try_exists(&path).await? {
                return Err(ApiError::Conflict("File already exists".to_string()));
            }
            tokio::fs::rename(temp_path, &path).await?;
        }
    }

    tracing::info!("Uploaded {} ({} bytes)", path.display(), bytes);
    Ok((StatusCode::CREATED, success("File uploaded")))
}
