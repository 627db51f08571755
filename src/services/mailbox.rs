//! Two single-slot text mailboxes stored as JSON files in the control
//! directory. A write replaces the slot; a read does not consume it.

use chrono::Local;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::models::{Direction, MailboxMessage};
use crate::utils::{remove_if_exists, write_replace};

#[derive(Debug, thiserror::Error)]
pub enum MailboxError {
    #[error("mailbox I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("mailbox slot is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

pub struct Mailbox {
    dir: PathBuf,
}

impl Mailbox {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn slot_path(&self, direction: Direction) -> PathBuf {
        self.dir.join(direction.slot_file())
    }

    /// Store a message, replacing whatever was pending in that direction.
    pub async fn write(&self, message: &MailboxMessage) -> Result<(), MailboxError> {
        let json = serde_json::to_vec_pretty(message)?;
        let path = self.slot_path(message.direction);
        write_replace(&path, &json).await?;
        tracing::debug!(
            "Stored {} chars in {}",
            message.text.chars().count(),
            message.direction.slot_file()
        );
        Ok(())
    }

    /// Desktop-side "send text": queue `text` for the browser.
    pub async fn post(&self, text: &str, sender_ip: &str) -> Result<(), MailboxError> {
        self.write(&MailboxMessage::new(text, sender_ip, Direction::ToMobile))
            .await
    }

    /// Read the pending message without consuming it.
    pub async fn peek(&self, direction: Direction) -> Result<Option<MailboxMessage>, MailboxError> {
        read_slot(&self.slot_path(direction), direction).await
    }

    /// Read the pending message and clear the slot.
    pub async fn take(&self, direction: Direction) -> Result<Option<MailboxMessage>, MailboxError> {
        let path = self.slot_path(direction);
        let message = read_slot(&path, direction).await;
        // A corrupt slot is cleared too, otherwise it would wedge the poller.
        remove_if_exists(&path).await?;
        message
    }

    /// Clear the slot. Returns whether a message was pending.
    pub async fn clear(&self, direction: Direction) -> Result<bool, MailboxError> {
        Ok(remove_if_exists(&self.slot_path(direction)).await?)
    }
}

async fn read_slot(
    path: &Path,
    direction: Direction,
) -> Result<Option<MailboxMessage>, MailboxError> {
    let raw = match tokio::fs::read(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let mut message: MailboxMessage = serde_json::from_slice(&raw)?;
    message.direction = direction;
    Ok(Some(message))
}

/// Server-side consumer of the browser-to-server slot. Each received message
/// is logged and the slot is cleared.
pub fn spawn_inbox_watcher(
    mailbox: Arc<Mailbox>,
    period: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            match mailbox.take(Direction::ToServer).await {
                Ok(Some(message)) => {
                    let sent_at = message
                        .sent_at()
                        .map(|at| at.with_timezone(&Local).format("%H:%M:%S").to_string())
                        .unwrap_or_else(|| "unknown time".to_string());
                    tracing::info!(
                        sender_ip = %message.sender_ip,
                        %sent_at,
                        "Text message from mobile: {}",
                        message.text
                    );
                }
                Ok(None) => {}
                Err(e) => tracing::warn!("Failed to read incoming text message: {}", e),
            }
        }
    })
}
