//! Shared test fixtures
//!
//! Builds an `AppState` over temporary directories with a power backend that
//! records calls instead of shutting anything down.
#![allow(dead_code)]

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, Response, header},
};
use lan_share_server::{
    AppState,
    config::ServerConfig,
    routes,
    services::{
        PowerControl,
        power::{PowerError, PowerFuture},
    },
};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tower::ServiceExt;

// ============================================================================
// Power fake
// ============================================================================

#[derive(Default)]
pub struct RecordingPower {
    pub calls: Mutex<Vec<String>>,
}

impl RecordingPower {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl PowerControl for RecordingPower {
    fn schedule(&self, seconds: u64) -> PowerFuture<'_> {
        self.calls.lock().unwrap().push(format!("schedule {}", seconds));
        Box::pin(async { Ok::<(), PowerError>(()) })
    }

    fn cancel(&self) -> PowerFuture<'_> {
        self.calls.lock().unwrap().push("cancel".to_string());
        Box::pin(async { Ok::<(), PowerError>(()) })
    }
}

// ============================================================================
// Fixture
// ============================================================================

pub struct TestApp {
    pub state: AppState,
    pub power: Arc<RecordingPower>,
    pub shares: Vec<TempDir>,
    pub control: TempDir,
}

impl TestApp {
    /// `share_count` empty share directories and an empty control directory.
    pub fn new(share_count: usize) -> Self {
        Self::with_upload_limit(share_count, None)
    }

    pub fn with_upload_limit(share_count: usize, limit: Option<u64>) -> Self {
        let shares: Vec<TempDir> = (0..share_count).map(|_| TempDir::new().unwrap()).collect();
        let control = TempDir::new().unwrap();

        let mut config = ServerConfig::with_shares(
            shares.iter().map(|d| d.path().to_path_buf()).collect(),
            control.path().to_path_buf(),
        );
        if let Some(limit) = limit {
            config.max_upload_bytes = limit;
        }

        let power = Arc::new(RecordingPower::default());
        let state = AppState::new(&config, config.validated_shares().unwrap(), power.clone());

        Self {
            state,
            power,
            shares,
            control,
        }
    }

    pub fn router(&self) -> Router {
        routes::router(self.state.clone())
    }

    /// Root of share N (1-based, as in URLs).
    pub fn share(&self, number: usize) -> &Path {
        self.shares[number - 1].path()
    }

    pub fn control_file(&self, name: &str) -> PathBuf {
        self.control.path().join(name)
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router().oneshot(request).await.unwrap()
    }

    pub async fn get(&self, uri: &str) -> Response<Body> {
        self.send(Request::get(uri).body(Body::empty()).unwrap()).await
    }

    pub async fn post_json(&self, uri: &str, body: serde_json::Value) -> Response<Body> {
        self.send(
            Request::post(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    /// POST JSON as if sent from the listing page at `page`.
    pub async fn post_json_from(
        &self,
        page: &str,
        uri: &str,
        body: serde_json::Value,
    ) -> Response<Body> {
        self.send(
            Request::post(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .header(header::REFERER, format!("http://192.168.1.20:20261{}", page))
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }
}

// ============================================================================
// Body helpers
// ============================================================================

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

pub async fn body_text(response: Response<Body>) -> String {
    String::from_utf8(body_bytes(response).await).unwrap()
}

pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

/// A multipart body with a `file` part and an optional `filename` field.
pub fn multipart_body(filename: Option<&str>, part_name: &str, data: &[u8]) -> (String, Vec<u8>) {
    let boundary = "----lan-share-test-boundary";
    let mut body = Vec::new();

    if let Some(filename) = filename {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"filename\"\r\n\r\n{}\r\n",
                boundary, filename
            )
            .as_bytes(),
        );
    }

    body.extend_from_slice(
        format!(
            "--{}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
            boundary, part_name
        )
        .as_bytes(),
    );
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());

    (format!("multipart/form-data; boundary={}", boundary), body)
}
