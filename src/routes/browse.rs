use axum::{
    extract::State,
    http::{HeaderMap, Method, StatusCode, Uri, header},
    response::{Html, IntoResponse, Response},
};
use percent_encoding::percent_decode_str;
use std::path::Path;

use crate::AppState;
use crate::error::{ApiError, ApiResult};
use crate::services::{
    ResolvedPath,
    listing::{self, DirectoryView},
    transfer,
};

const INDEX_FILES: [&str; 2] = ["index.html", "index.htm"];

/// Fallback handler: the share picker, directory listings and file downloads.
/// Paths the resolver rejects (unknown `/api/*` included) answer 403.
pub async fn dispatch(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let raw_path = uri.path();
    tracing::debug!(
        "{} {}",
        method,
        percent_decode_str(raw_path).decode_utf8_lossy()
    );

    let is_read = method == Method::GET || method == Method::HEAD;
    match state.shares.resolve(raw_path) {
        ResolvedPath::Root if is_read => Ok(root_page(&state).into_response()),
        ResolvedPath::Root => Err(ApiError::InvalidPath(
            "Cannot perform this operation at root level".to_string(),
        )),
        ResolvedPath::Rejected => Err(ApiError::access_denied()),
        ResolvedPath::Share { .. } if !is_read => Err(ApiError::MethodNotAllowed),
        ResolvedPath::Share { index, path } => {
            serve_share_path(&state, index, &path, raw_path, &headers, method == Method::HEAD)
                .await
        }
    }
}

fn root_page(state: &AppState) -> Html<String> {
    Html(listing::render_root(
        &state.shares.snapshot(),
        &state.control.status_text(),
    ))
}

async fn serve_share_path(
    state: &AppState,
    index: usize,
    path: &Path,
    raw_path: &str,
    headers: &HeaderMap,
    head_only: bool,
) -> ApiResult<Response> {
    let metadata = match tokio::fs::metadata(path).await {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => return Err(e.into()),
        Err(_) => return Err(ApiError::NotFound("File not found".to_string())),
    };

    if !metadata.is_dir() {
        return transfer::serve_file(path, headers, head_only).await;
    }

    if !raw_path.ends_with('/') {
        let location = format!("{}/", raw_path);
        return Ok((StatusCode::MOVED_PERMANENTLY, [(header::LOCATION, location)]).into_response());
    }

    for name in INDEX_FILES {
        let candidate = path.join(name);
        if candidate.is_file() && state.shares.contains(index, &candidate) {
            return transfer::serve_file(&candidate, headers, head_only).await;
        }
    }

    let entries = listing::read_entries(path).await?;
    let location = percent_decode_str(raw_path).decode_utf8_lossy();
    let status = state.control.status_text();
    let page = listing::render_directory(&DirectoryView {
        location: location.trim_start_matches('/'),
        entries: &entries,
        is_share_root: state.shares.is_share_root(index, path),
        status: &status,
        preview: &state.preview,
    });
    Ok(Html(page).into_response())
}
