//! File-signalled shutdown control.
//!
//! Handlers record intent as sentinel files in the control directory and
//! update [`ShutdownState`]; a background loop picks the sentinels up and
//! drives [`PowerControl`]. The sentinel names are the contract with the
//! desktop collaborator and must not change. Cancelling also sweeps up the
//! `电脑将于<N>秒后关机.txt` countdown notices older releases left behind.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::models::ShutdownState;
use crate::services::power::{PowerControl, run_bounded};
use crate::utils::{remove_if_exists, write_replace};

pub const SCHEDULE_SENTINEL: &str = "关机.txt";
pub const CANCEL_SENTINEL: &str = "取消关机.txt";

// `电脑将于<N>秒后关机.txt`
const LEGACY_NOTICE_PREFIX: &str = "电脑将于";
const LEGACY_NOTICE_SUFFIX: &str = "秒后关机.txt";

#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    #[error("seconds must be a positive integer")]
    InvalidSeconds,

    #[error("failed to record shutdown command: {0}")]
    Io(#[from] std::io::Error),
}

/// What happened to the schedule sentinel during one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleOutcome {
    Invoked(u64),
    /// Content was not a positive integer; the sentinel is left in place.
    Invalid,
    /// The platform call failed; the sentinel is kept for the next cycle.
    Failed,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    pub cancel_processed: bool,
    pub schedule: Option<ScheduleOutcome>,
}

pub struct ControlChannel {
    dir: PathBuf,
    state: Mutex<ShutdownState>,
    power: Arc<dyn PowerControl>,
    command_timeout: Duration,
}

impl ControlChannel {
    pub fn new(dir: PathBuf, power: Arc<dyn PowerControl>, command_timeout: Duration) -> Self {
        Self {
            dir,
            state: Mutex::new(ShutdownState::Idle),
            power,
            command_timeout,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn schedule_sentinel(&self) -> PathBuf {
        self.dir.join(SCHEDULE_SENTINEL)
    }

    pub fn cancel_sentinel(&self) -> PathBuf {
        self.dir.join(CANCEL_SENTINEL)
    }

    pub fn status(&self) -> ShutdownState {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn status_text(&self) -> String {
        self.status().status_text()
    }

    fn set_state(&self, next: ShutdownState) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        *state = next;
    }

    /// Record a schedule command and mark the shutdown as scheduled.
    pub async fn request_schedule(&self, seconds: u64) -> Result<(), ControlError> {
        if seconds == 0 {
            return Err(ControlError::InvalidSeconds);
        }

        write_replace(&self.schedule_sentinel(), seconds.to_string().as_bytes()).await?;
        self.set_state(ShutdownState::scheduled(seconds));
        tracing::info!("Shutdown requested in {} seconds", seconds);
        Ok(())
    }

    /// Record a cancel command. A schedule sentinel the loop has not picked
    /// up yet is withdrawn.
    pub async fn request_cancel(&self) -> Result<(), ControlError> {
        write_replace(&self.cancel_sentinel(), b"").await?;
        if remove_if_exists(&self.schedule_sentinel()).await? {
            tracing::info!("Withdrew pending shutdown command");
        }
        self.set_state(ShutdownState::CancelRequested);
        tracing::info!("Shutdown cancellation requested");
        Ok(())
    }

    /// One polling cycle: cancel first, then schedule.
    pub async fn run_cycle(&self) -> CycleReport {
        let mut report = CycleReport::default();

        let cancel_path = self.cancel_sentinel();
        if tokio::fs::try_exists(&cancel_path).await.unwrap_or(false) {
            self.process_cancel(&cancel_path).await;
            report.cancel_processed = true;
        }

        let schedule_path = self.schedule_sentinel();
        match tokio::fs::read_to_string(&schedule_path).await {
            Ok(raw) => {
                report.schedule = Some(self.process_schedule(&schedule_path, &raw).await);
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("Cannot read {}: {}", schedule_path.display(), e),
        }

        report
    }

    async fn process_cancel(&self, cancel_path: &Path) {
        tracing::info!("Found {}", CANCEL_SENTINEL);

        if let Err(e) = run_bounded(self.command_timeout, self.power.cancel()).await {
            tracing::warn!(
                "Cannot guarantee the shutdown was cancelled, clearing status anyway: {}",
                e
            );
        }

        self.remove_legacy_notices().await;

        match remove_if_exists(cancel_path).await {
            Ok(_) => tracing::debug!("Removed {}", CANCEL_SENTINEL),
            Err(e) => tracing::warn!("Failed to remove {}: {}", CANCEL_SENTINEL, e),
        }

        self.set_state(ShutdownState::Idle);
    }

    async fn process_schedule(&self, schedule_path: &Path, raw: &str) -> ScheduleOutcome {
        let content = raw.trim();
        let seconds = match parse_positive(content) {
            Some(seconds) => seconds,
            None => {
                tracing::warn!(
                    "Ignoring {}: '{}' is not a positive integer",
                    SCHEDULE_SENTINEL,
                    content
                );
                return ScheduleOutcome::Invalid;
            }
        };

        match run_bounded(self.command_timeout, self.power.schedule(seconds)).await {
            Ok(()) => {
                if let Err(e) = remove_if_exists(schedule_path).await {
                    tracing::warn!("Failed to remove {}: {}", SCHEDULE_SENTINEL, e);
                }
                ScheduleOutcome::Invoked(seconds)
            }
            Err(e) => {
                tracing::error!("Failed to schedule shutdown in {} seconds: {}", seconds, e);
                ScheduleOutcome::Failed
            }
        }
    }

    /// Delete countdown notices left by older releases.
    async fn remove_legacy_notices(&self) {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!("Cannot scan {}: {}", self.dir.display(), e);
                return;
            }
        };

        while let Ok(Some(entry)) = entries.next_entry().await {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if is_legacy_notice(&name) {
                match tokio::fs::remove_file(entry.path()).await {
                    Ok(()) => tracing::info!("Removed notice file {}", name),
                    Err(e) => tracing::warn!("Failed to remove notice file {}: {}", name, e),
                }
            }
        }
    }
}

fn is_legacy_notice(name: &str) -> bool {
    name.len() >= LEGACY_NOTICE_PREFIX.len() + LEGACY_NOTICE_SUFFIX.len()
        && name.starts_with(LEGACY_NOTICE_PREFIX)
        && name.ends_with(LEGACY_NOTICE_SUFFIX)
}

/// Digits only, greater than zero.
fn parse_positive(content: &str) -> Option<u64> {
    if content.is_empty() || !content.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    content.parse::<u64>().ok().filter(|&n| n > 0)
}

/// Poll the control directory forever. Individual cycle failures are logged
/// inside [`ControlChannel::run_cycle`] and never end the loop.
pub fn spawn_control_loop(
    control: Arc<ControlChannel>,
    period: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!(
            "Shutdown monitor watching {} every {:?}",
            control.dir().display(),
            period
        );
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            let report = control.run_cycle().await;
            if report != CycleReport::default() {
                tracing::debug!(?report, "Control cycle finished");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::power::{PowerError, PowerFuture};
    use tempfile::TempDir;

    #[derive(Default)]
    struct RecordingPower {
        calls: Mutex<Vec<String>>,
        fail: bool,
    }

    impl PowerControl for RecordingPower {
        fn schedule(&self, seconds: u64) -> PowerFuture<'_> {
            self.calls.lock().unwrap().push(format!("schedule {}", seconds));
            let result = if self.fail {
                Err(PowerError::CommandFailed {
                    command: "shutdown".to_string(),
                    code: Some(1),
                    stderr: "access denied".to_string(),
                })
            } else {
                Ok(())
            };
            Box::pin(async move { result })
        }

        fn cancel(&self) -> PowerFuture<'_> {
            self.calls.lock().unwrap().push("cancel".to_string());
            Box::pin(async { Ok::<(), PowerError>(()) })
        }
    }

    struct HangingPower;

    impl PowerControl for HangingPower {
        fn schedule(&self, _seconds: u64) -> PowerFuture<'_> {
            Box::pin(std::future::pending::<Result<(), PowerError>>())
        }

        fn cancel(&self) -> PowerFuture<'_> {
            Box::pin(std::future::pending::<Result<(), PowerError>>())
        }
    }

    fn channel(fail: bool) -> (ControlChannel, Arc<RecordingPower>, TempDir) {
        let dir = TempDir::new().unwrap();
        let power = Arc::new(RecordingPower {
            fail,
            ..Default::default()
        });
        let control = ControlChannel::new(
            dir.path().to_path_buf(),
            power.clone(),
            Duration::from_secs(5),
        );
        (control, power, dir)
    }

    #[test]
    fn test_parse_positive() {
        assert_eq!(parse_positive("30"), Some(30));
        assert_eq!(parse_positive("0"), None);
        assert_eq!(parse_positive("-5"), None);
        assert_eq!(parse_positive("+5"), None);
        assert_eq!(parse_positive("abc"), None);
        assert_eq!(parse_positive(""), None);
    }

    #[tokio::test]
    async fn test_schedule_writes_sentinel_and_state() {
        let (control, _power, dir) = channel(false);
        control.request_schedule(30).await.unwrap();

        let content = std::fs::read_to_string(dir.path().join(SCHEDULE_SENTINEL)).unwrap();
        assert_eq!(content, "30");
        assert!(control.status_text().contains("30"));
    }

    #[tokio::test]
    async fn test_schedule_rejects_zero() {
        let (control, _power, dir) = channel(false);
        assert!(matches!(
            control.request_schedule(0).await,
            Err(ControlError::InvalidSeconds)
        ));
        assert!(!dir.path().join(SCHEDULE_SENTINEL).exists());
        assert_eq!(control.status(), ShutdownState::Idle);
    }

    #[tokio::test]
    async fn test_cycle_invokes_and_removes_sentinel() {
        let (control, power, dir) = channel(false);
        control.request_schedule(30).await.unwrap();

        let report = control.run_cycle().await;
        assert_eq!(report.schedule, Some(ScheduleOutcome::Invoked(30)));
        assert!(!dir.path().join(SCHEDULE_SENTINEL).exists());
        assert_eq!(*power.calls.lock().unwrap(), vec!["schedule 30"]);
    }

    #[tokio::test]
    async fn test_failed_schedule_keeps_sentinel() {
        let (control, _power, dir) = channel(true);
        control.request_schedule(10).await.unwrap();

        let report = control.run_cycle().await;
        assert_eq!(report.schedule, Some(ScheduleOutcome::Failed));
        assert!(dir.path().join(SCHEDULE_SENTINEL).exists());
    }

    #[tokio::test]
    async fn test_invalid_sentinel_is_not_executed() {
        let (control, power, dir) = channel(false);
        std::fs::write(dir.path().join(SCHEDULE_SENTINEL), "soon").unwrap();

        let report = control.run_cycle().await;
        assert_eq!(report.schedule, Some(ScheduleOutcome::Invalid));
        assert!(power.calls.lock().unwrap().is_empty());
        assert!(dir.path().join(SCHEDULE_SENTINEL).exists());
    }

    #[tokio::test]
    async fn test_cancel_cycle() {
        let (control, power, dir) = channel(false);
        control.request_schedule(60).await.unwrap();
        std::fs::write(dir.path().join("电脑将于60秒后关机.txt"), "").unwrap();
        std::fs::write(dir.path().join("keep.txt"), "").unwrap();

        control.request_cancel().await.unwrap();
        assert_eq!(control.status(), ShutdownState::CancelRequested);
        assert!(!dir.path().join(SCHEDULE_SENTINEL).exists());

        let report = control.run_cycle().await;
        assert!(report.cancel_processed);
        assert_eq!(report.schedule, None);
        assert_eq!(*power.calls.lock().unwrap(), vec!["cancel"]);
        assert!(!dir.path().join(CANCEL_SENTINEL).exists());
        assert!(!dir.path().join("电脑将于60秒后关机.txt").exists());
        assert!(dir.path().join("keep.txt").exists());
        assert_eq!(control.status(), ShutdownState::Idle);
    }

    #[test]
    fn test_legacy_notice_names() {
        assert!(is_legacy_notice("电脑将于60秒后关机.txt"));
        assert!(is_legacy_notice("电脑将于秒后关机.txt"));
        assert!(!is_legacy_notice(SCHEDULE_SENTINEL));
        assert!(!is_legacy_notice(CANCEL_SENTINEL));
        assert!(!is_legacy_notice("电脑将于60秒后关机.txt.bak"));
        assert!(!is_legacy_notice("shutdown_in_60.txt"));
    }

    #[tokio::test]
    async fn test_hung_power_command_times_out() {
        let dir = TempDir::new().unwrap();
        let control = ControlChannel::new(
            dir.path().to_path_buf(),
            Arc::new(HangingPower),
            Duration::from_millis(50),
        );
        control.request_schedule(30).await.unwrap();

        let report = control.run_cycle().await;
        assert_eq!(report.schedule, Some(ScheduleOutcome::Failed));
        assert!(dir.path().join(SCHEDULE_SENTINEL).exists());

        control.request_cancel().await.unwrap();
        let report = control.run_cycle().await;
        assert!(report.cancel_processed);
        assert!(!dir.path().join(CANCEL_SENTINEL).exists());
        assert_eq!(control.status(), ShutdownState::Idle);
    }

    #[tokio::test]
    async fn test_operator_written_sentinels() {
        let (control, power, dir) = channel(false);
        std::fs::write(dir.path().join(CANCEL_SENTINEL), "").unwrap();
        std::fs::write(dir.path().join(SCHEDULE_SENTINEL), " 45\n").unwrap();

        let report = control.run_cycle().await;
        assert!(report.cancel_processed);
        assert_eq!(report.schedule, Some(ScheduleOutcome::Invoked(45)));
        assert_eq!(
            *power.calls.lock().unwrap(),
            vec!["cancel".to_string(), "schedule 45".to_string()]
        );
    }

    #[tokio::test]
    async fn test_empty_cycle() {
        let (control, power, _dir) = channel(false);
        assert_eq!(control.run_cycle().await, CycleReport::default());
        assert!(power.calls.lock().unwrap().is_empty());
    }
}
