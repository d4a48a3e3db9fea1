//! Wire protocol shared by the relay server and clients.
//!
//! The transport is newline-delimited UTF-8 lines over a persistent TCP
//! stream. Handshake: server sends [`NICK_REQUEST`], client replies with a
//! nickname, server confirms with [`CONNECTED_BANNER`]. Every later line
//! from a client is a chat message; every line to a client is a rendered
//! [`OutboundMessage`] or a server notice.

use serde::{Deserialize, Serialize};

// ── Handshake tokens ─────────────────────────────────────────────────────────

/// Literal token the server sends to request the client's identity.
pub const NICK_REQUEST: &str = "NICK";

/// Confirmation line sent once the handshake succeeded.
pub const CONNECTED_BANNER: &str = "Connected to the server!";

/// Error line sent before closing a connection whose nickname is in use.
pub const NICKNAME_TAKEN: &str = "That nickname is already taken.";

/// Notice sent to the sender when the moderation gate blocks a message.
pub const BLOCKED_NOTICE: &str =
    "Your message contains cyberbullying content and was not sent!";

/// Notice sent to the sender when moderation is unavailable and the
/// fail-closed policy withheld the message.
pub const DEGRADED_NOTICE: &str =
    "Moderation is currently unavailable; your message was not sent.";

// ── Defaults ─────────────────────────────────────────────────────────────────

pub const DEFAULT_BIND: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 5555;
pub const DEFAULT_HANDSHAKE_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_MAX_NICKNAME_LEN: usize = 32;

/// Upper bound on a single inbound line, in bytes. Bounds per-connection
/// buffering against a client that never sends a newline.
pub const MAX_LINE_LEN: usize = 8 * 1024;

// ── Messages ─────────────────────────────────────────────────────────────────

/// What a fan-out line represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Chat,
    SystemJoin,
    SystemLeave,
}

/// One message headed for fan-out. Ephemeral: lives only for the duration
/// of a single broadcast.
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    pub sender: String,
    pub body: String,
    pub kind: MessageKind,
}

impl OutboundMessage {
    pub fn chat(sender: &str, body: &str) -> Self {
        Self {
            sender: sender.to_string(),
            body: body.to_string(),
            kind: MessageKind::Chat,
        }
    }

    pub fn system_join(nickname: &str) -> Self {
        Self {
            sender: nickname.to_string(),
            body: String::new(),
            kind: MessageKind::SystemJoin,
        }
    }

    pub fn system_leave(nickname: &str) -> Self {
        Self {
            sender: nickname.to_string(),
            body: String::new(),
            kind: MessageKind::SystemLeave,
        }
    }

    /// Render the message as a single wire line (without the trailing
    /// newline; the codec adds it).
    pub fn wire_line(&self) -> String {
        match self.kind {
            MessageKind::Chat => format!("{}: {}", self.sender, self.body),
            MessageKind::SystemJoin => format!("{} joined the chat!", self.sender),
            MessageKind::SystemLeave => format!("{} left the chat!", self.sender),
        }
    }
}

// ── Nickname validation ──────────────────────────────────────────────────────

/// Malformed handshake input. Recovered by closing the offending
/// connection; never affects other sessions.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("nickname must not be empty")]
    EmptyNickname,
    #[error("nickname exceeds {max} characters")]
    NicknameTooLong { max: usize },
}

/// Validate a handshake nickname: trimmed, non-empty, bounded length.
pub fn validate_nickname(raw: &str, max_len: usize) -> Result<String, ProtocolError> {
    let nickname = raw.trim();
    if nickname.is_empty() {
        return Err(ProtocolError::EmptyNickname);
    }
    if nickname.chars().count() > max_len {
        return Err(ProtocolError::NicknameTooLong { max: max_len });
    }
    Ok(nickname.to_string())
}

// ── Classifier wire contract ─────────────────────────────────────────────────

/// Request body for the external classifier's `/predict` endpoint.
#[derive(Debug, Serialize)]
pub struct ClassifyRequest<'a> {
    pub text: &'a str,
}

/// Response body from the classifier. Extra fields are ignored.
#[derive(Debug, Deserialize)]
pub struct ClassifyResponse {
    pub is_bullying: bool,
    pub confidence: f64,
}
