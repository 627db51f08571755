// Library entry point for the binary and integration tests
pub mod config;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod server;
pub mod services;
pub mod utils;

use crate::config::ServerConfig;
use crate::services::{ControlChannel, Mailbox, PowerControl, PreviewSet, ShareSet};
use std::path::PathBuf;
use std::sync::Arc;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub shares: Arc<ShareSet>,
    pub control: Arc<ControlChannel>,
    pub mailbox: Arc<Mailbox>,
    pub preview: Arc<PreviewSet>,
    pub max_upload_bytes: u64,
}

impl AppState {
    /// Build the shared state. `shares` is the already-validated share list;
    /// control sentinels and mailbox slots live in `config.control_dir`.
    pub fn new(config: &ServerConfig, shares: Vec<PathBuf>, power: Arc<dyn PowerControl>) -> Self {
        Self {
            shares: Arc::new(ShareSet::new(shares)),
            control: Arc::new(ControlChannel::new(
                config.control_dir.clone(),
                power,
                config.shutdown_command_timeout,
            )),
            mailbox: Arc::new(Mailbox::new(config.control_dir.clone())),
            preview: Arc::new(PreviewSet::new(&config.extra_preview_extensions)),
            max_upload_bytes: config.max_upload_bytes,
        }
    }
}
