//! File responses with single byte-range support.
//!
//! Bodies are produced by a pump task that copies the file into an in-memory
//! pipe in fixed-size chunks. When the client goes away the response body is
//! dropped, the pipe closes, and the pump stops on the next write.

use axum::{
    body::Body,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::Response,
};
use chrono::{DateTime, Utc};
use std::io;
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt, DuplexStream};
use tokio_util::io::ReaderStream;

use crate::error::{ApiError, ApiResult};

/// Copy buffer and pipe capacity.
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Inclusive byte range inside a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn length(&self) -> u64 {
        self.end - self.start + 1
    }

    pub fn content_range(&self, file_size: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, file_size)
    }
}

/// Parse `bytes=<start>-<end?>`. Anything else, including multiple ranges and
/// suffix ranges, is not satisfiable.
pub fn parse_range(value: &str, file_size: u64) -> Result<ByteRange, ApiError> {
    let unsatisfiable = || ApiError::RangeNotSatisfiable { file_size };

    let bounds = value.trim().strip_prefix("bytes=").ok_or_else(unsatisfiable)?;
    let (start, end) = bounds.split_once('-').ok_or_else(unsatisfiable)?;

    let is_digits = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
    if start.is_empty() || !is_digits(start) || !is_digits(end) {
        return Err(unsatisfiable());
    }

    let start: u64 = start.parse().map_err(|_| unsatisfiable())?;
    let end: u64 = if end.is_empty() {
        file_size.checked_sub(1).ok_or_else(unsatisfiable)?
    } else {
        end.parse().map_err(|_| unsatisfiable())?
    };

    if start > end || end >= file_size {
        return Err(unsatisfiable());
    }
    Ok(ByteRange { start, end })
}

/// Whether a write error means the client closed the connection.
pub fn is_peer_disconnect(err: &io::Error) -> bool {
    // WSAECONNABORTED, WSAECONNRESET, EPIPE, ECONNRESET
    const DISCONNECT_CODES: [i32; 4] = [10053, 10054, 32, 104];

    matches!(
        err.kind(),
        io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
    ) || err
        .raw_os_error()
        .is_some_and(|code| DISCONNECT_CODES.contains(&code))
}

pub fn http_date(time: DateTime<Utc>) -> String {
    time.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Serve `path` as a 200 or 206 response depending on the `Range` header.
/// With `head_only` the headers are computed but no body is produced.
pub async fn serve_file(path: &Path, headers: &HeaderMap, head_only: bool) -> ApiResult<Response> {
    let mut file = File::open(path).await?;
    let metadata = file.metadata().await?;
    let file_size = metadata.len();

    let mime_type = mime_guess::from_path(path).first_or_octet_stream();
    let last_modified = metadata
        .modified()
        .ok()
        .map(|time| http_date(DateTime::<Utc>::from(time)));

    let range = match headers.get(header::RANGE) {
        Some(value) => {
            let value = value
                .to_str()
                .map_err(|_| ApiError::RangeNotSatisfiable { file_size })?;
            Some(parse_range(value, file_size)?)
        }
        None => None,
    };

    let (status, start, length) = match range {
        Some(range) => (StatusCode::PARTIAL_CONTENT, range.start, range.length()),
        None => (StatusCode::OK, 0, file_size),
    };

    let mut builder = Response::builder()
        .status(status)
        .header(header::CONTENT_TYPE, mime_type.as_ref())
        .header(header::CONTENT_LENGTH, length)
        .header(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    if let Some(range) = range {
        builder = builder.header(header::CONTENT_RANGE, range.content_range(file_size));
    }
    if let Some(last_modified) = last_modified {
        builder = builder.header(header::LAST_MODIFIED, last_modified);
    }

    let body = if head_only || length == 0 {
        Body::empty()
    } else {
        if start > 0 {
            file.seek(io::SeekFrom::Start(start)).await?;
        }
        let (writer, reader) = tokio::io::duplex(CHUNK_SIZE);
        tokio::spawn(pump(file, length, writer, path.display().to_string()));
        Body::from_stream(ReaderStream::with_capacity(reader, CHUNK_SIZE))
    };

    tracing::debug!(
        "Serving {} ({} of {} bytes, {})",
        path.display(),
        length,
        file_size,
        status
    );

    builder
        .body(body)
        .map_err(|e| ApiError::Internal(format!("Failed to build response: {}", e)))
}

/// Copy exactly `remaining` bytes from `file` into the response pipe.
async fn pump(mut file: File, mut remaining: u64, mut sink: DuplexStream, label: String) {
    let mut buf = vec![0u8; CHUNK_SIZE];

    while remaining > 0 {
        let want = remaining.min(CHUNK_SIZE as u64) as usize;
        let n = match file.read(&mut buf[..want]).await {
            Ok(0) => {
                tracing::error!("{} ended early, {} bytes not sent", label, remaining);
                return;
            }
            Ok(n) => n,
            Err(e) => {
                tracing::error!("Read error on {}: {}", label, e);
                return;
            }
        };

        if let Err(e) = sink.write_all(&buf[..n]).await {
            if is_peer_disconnect(&e) {
                tracing::debug!("Client disconnected while receiving {}", label);
            } else {
                tracing::warn!("Transfer of {} aborted: {}", label, e);
            }
            return;
        }
        remaining -= n as u64;
    }

    let _ = sink.shutdown().await;
}
