use axum::{Json, body::Bytes, extract::State};
use serde::{Deserialize, Serialize};

use super::{ApiResponse, parse_json, success};
use crate::AppState;
use crate::error::{ApiError, ApiResult};
use crate::middleware::PeerAddr;
use crate::models::{Direction, MailboxMessage};

#[derive(Debug, Deserialize)]
struct SendTextRequest {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct CheckMessageResponse {
    pub has_message: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender_ip: Option<String>,
}

/// POST /api/send_text
///
/// Browser to server. Replaces any message the server has not read yet.
pub async fn send_text(
    State(state): State<AppState>,
    PeerAddr(peer): PeerAddr,
    body: Bytes,
) -> ApiResult<Json<ApiResponse<()>>> {
    let request: SendTextRequest = parse_json(&body)?;
    let text = request.text.trim();
    if text.is_empty() {
        return Err(ApiError::bad_request("Text cannot be empty"));
    }

    let message = MailboxMessage::new(text, peer.as_str(), Direction::ToServer);
    state.mailbox.write(&message).await?;

    let preview: String = text.chars().take(50).collect();
    tracing::info!("Text message from {}: {}", peer, preview);
    Ok(success("Text sent"))
}

/// GET|POST /api/check_message
///
/// Poll for a message from the computer. Does not consume it.
pub async fn check_message(State(state): State<AppState>) -> ApiResult<Json<CheckMessageResponse>> {
    let response = match state.mailbox.peek(Direction::ToMobile).await? {
        Some(message) => CheckMessageResponse {
            has_message: true,
            text: Some(message.text),
            sender_ip: Some(message.sender_ip),
        },
        None => CheckMessageResponse {
            has_message: false,
            text: None,
            sender_ip: None,
        },
    };
    Ok(Json(response))
}

/// POST /api/confirm_message
///
/// The browser has shown the computer's message; clear that slot.
pub async fn confirm_message(State(state): State<AppState>) -> ApiResult<Json<ApiResponse<()>>> {
    if state.mailbox.clear(Direction::ToMobile).await? {
        tracing::info!("Text message delivered to mobile");
    }
    Ok(success("Message confirmed"))
}
