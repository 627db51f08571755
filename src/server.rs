use std::io;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::net::TcpListener;

use crate::AppState;
use crate::routes;
use crate::services::{control::spawn_control_loop, mailbox::spawn_inbox_watcher};

/// How often the server checks for text sent from a browser.
pub const INBOX_POLL_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("port {0} requires elevated privileges")]
    PermissionDenied(u16),

    #[error("port {0} is already in use")]
    AddrInUse(u16),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[from] io::Error),
}

/// Bind the listener, turning the common failures into readable errors.
pub async fn bind(addr: IpAddr, port: u16) -> Result<TcpListener, ServerError> {
    let addr = SocketAddr::new(addr, port);
    TcpListener::bind(addr).await.map_err(|source| match source.kind() {
        io::ErrorKind::PermissionDenied => ServerError::PermissionDenied(port),
        io::ErrorKind::AddrInUse => ServerError::AddrInUse(port),
        _ => ServerError::Bind { addr, source },
    })
}

/// Start the background monitors and serve until Ctrl+C or SIGTERM.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    control_poll_interval: Duration,
) -> Result<(), ServerError> {
    let control_task = spawn_control_loop(state.control.clone(), control_poll_interval);
    let inbox_task = spawn_inbox_watcher(state.mailbox.clone(), INBOX_POLL_INTERVAL);

    let app = routes::router(state);
    let result = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await;

    control_task.abort();
    inbox_task.abort();
    tracing::info!("Server stopped");
    result.map_err(ServerError::from)
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, shutting down gracefully...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, shutting down gracefully...");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bind_reports_port_in_use() {
        let first = bind(IpAddr::from([127, 0, 0, 1]), 0).await.unwrap();
        let port = first.local_addr().unwrap().port();

        let err = bind(IpAddr::from([127, 0, 0, 1]), port).await.unwrap_err();
        assert!(matches!(err, ServerError::AddrInUse(p) if p == port));
        assert_eq!(err.to_string(), format!("port {} is already in use", port));
    }
}
