use chrono::{DateTime, Local, TimeDelta, Utc};

/// Shutdown state as seen by the status endpoint and the pages.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ShutdownState {
    #[default]
    Idle,
    Scheduled {
        seconds: u64,
        scheduled_at: DateTime<Utc>,
    },
    CancelRequested,
}

impl ShutdownState {
    pub fn scheduled(seconds: u64) -> Self {
        ShutdownState::Scheduled {
            seconds,
            scheduled_at: Utc::now(),
        }
    }

    /// Human-readable status line. Empty when idle.
    pub fn status_text(&self) -> String {
        match self {
            ShutdownState::Idle => String::new(),
            ShutdownState::Scheduled {
                seconds,
                scheduled_at,
            } => match Self::deadline(*scheduled_at, *seconds) {
                Some(at) => format!(
                    "Shutdown scheduled in {} seconds (at {})",
                    seconds,
                    at.format("%H:%M:%S")
                ),
                None => format!("Shutdown scheduled in {} seconds", seconds),
            },
            ShutdownState::CancelRequested => "Shutdown cancellation requested".to_string(),
        }
    }

    /// Local wall-clock time the shutdown fires.
    fn deadline(scheduled_at: DateTime<Utc>, seconds: u64) -> Option<DateTime<Local>> {
        i64::try_from(seconds)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .and_then(|delay| scheduled_at.checked_add_signed(delay))
            .map(|at| at.with_timezone(&Local))
    }
}
