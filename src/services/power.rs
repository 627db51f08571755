//! Platform shutdown commands.
//!
//! The control loop is the only caller; request handlers never reach this
//! module directly.

use std::future::Future;
use std::pin::Pin;
use std::process::{Output, Stdio};
use std::sync::Arc;
use std::time::Duration;

use tokio::process::Command;

#[derive(Debug, thiserror::Error)]
pub enum PowerError {
    #[error("failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with {code:?}: {stderr}")]
    CommandFailed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("shutdown command did not finish within {0:?}")]
    TimedOut(Duration),
}

pub type PowerFuture<'a> = Pin<Box<dyn Future<Output = Result<(), PowerError>> + Send + 'a>>;

/// Something that can schedule and cancel an OS shutdown.
pub trait PowerControl: Send + Sync {
    fn schedule(&self, seconds: u64) -> PowerFuture<'_>;

    /// Cancel a pending shutdown. Having nothing to cancel is success.
    fn cancel(&self) -> PowerFuture<'_>;
}

/// Runs the host's `shutdown` command.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemPower;

impl SystemPower {
    /// The child is killed if the returned future is dropped before it exits.
    async fn run(program: &str, args: &[String]) -> Result<Output, PowerError> {
        let command = format!("{} {}", program, args.join(" "));
        tracing::debug!("Running `{}`", command);
        Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| PowerError::Spawn { command, source })
    }

    fn failure(program: &str, args: &[String], output: &Output) -> PowerError {
        PowerError::CommandFailed {
            command: format!("{} {}", program, args.join(" ")),
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        }
    }
}

#[cfg(windows)]
impl PowerControl for SystemPower {
    fn schedule(&self, seconds: u64) -> PowerFuture<'_> {
        Box::pin(async move {
            let args = vec!["/s".to_string(), "/t".to_string(), seconds.to_string()];
            let output = Self::run("shutdown", &args).await?;
            if output.status.success() {
                tracing::info!("Windows will shut down in {} seconds", seconds);
                Ok(())
            } else {
                Err(Self::failure("shutdown", &args, &output))
            }
        })
    }

    fn cancel(&self) -> PowerFuture<'_> {
        // 1116: ERROR_SHUTDOWN_NOT_IN_PROGRESS
        const NOT_IN_PROGRESS: i32 = 1116;

        Box::pin(async move {
            let args = vec!["/a".to_string()];
            let output = Self::run("shutdown", &args).await?;
            let stderr = String::from_utf8_lossy(&output.stderr);
            if output.status.success() {
                tracing::info!("Windows shutdown cancelled");
                Ok(())
            } else if output.status.code() == Some(NOT_IN_PROGRESS)
                || stderr.contains("no shutdown in progress")
            {
                tracing::info!("No shutdown was in progress");
                Ok(())
            } else {
                Err(Self::failure("shutdown", &args, &output))
            }
        })
    }
}

#[cfg(not(windows))]
impl PowerControl for SystemPower {
    fn schedule(&self, seconds: u64) -> PowerFuture<'_> {
        Box::pin(async move {
            // `shutdown` on Unix only takes whole minutes.
            let minutes = seconds.div_ceil(60);
            let args = vec!["-h".to_string(), format!("+{}", minutes)];
            let output = Self::run("shutdown", &args).await?;
            if output.status.success() {
                tracing::info!(
                    "System will shut down in {} minute(s) ({} seconds requested)",
                    minutes,
                    seconds
                );
                Ok(())
            } else {
                Err(Self::failure("shutdown", &args, &output))
            }
        })
    }

    fn cancel(&self) -> PowerFuture<'_> {
        Box::pin(async move {
            let args = vec!["-c".to_string()];
            let output = Self::run("shutdown", &args).await?;
            let stderr = String::from_utf8_lossy(&output.stderr).to_lowercase();
            if output.status.success() {
                tracing::info!("Scheduled shutdown cancelled");
                Ok(())
            } else if stderr.contains("no shutdown") || stderr.contains("not scheduled") {
                tracing::info!("No shutdown was in progress");
                Ok(())
            } else {
                Err(Self::failure("shutdown", &args, &output))
            }
        })
    }
}

/// Await a power operation for at most `limit`. On timeout the operation is
/// dropped, which kills any command it is still waiting on.
pub async fn run_bounded(limit: Duration, op: PowerFuture<'_>) -> Result<(), PowerError> {
    tokio::time::timeout(limit, op)
        .await
        .unwrap_or(Err(PowerError::TimedOut(limit)))
}

pub fn system() -> Arc<dyn PowerControl> {
    Arc::new(SystemPower)
}
