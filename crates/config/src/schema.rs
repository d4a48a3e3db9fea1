//! Config schema. Every field has a default so a missing or partial config
//! file always yields a runnable configuration.

use serde::{Deserialize, Serialize};

use safechat_moderation::FailurePolicy;
use safechat_protocol as protocol;

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SafechatConfig {
    pub server: ServerConfig,
    pub moderation: ModerationConfig,
}

/// Relay server transport settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    /// How long a client may take to reply with a nickname, in ms.
    pub handshake_timeout_ms: u64,
    pub max_nickname_len: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: protocol::DEFAULT_BIND.to_string(),
            port: protocol::DEFAULT_PORT,
            handshake_timeout_ms: protocol::DEFAULT_HANDSHAKE_TIMEOUT_MS,
            max_nickname_len: protocol::DEFAULT_MAX_NICKNAME_LEN,
        }
    }
}

/// Moderation gate settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModerationConfig {
    /// Endpoint of the external classifier service.
    pub classifier_url: String,
    /// Confidence above which a message is blocked.
    pub threshold: f64,
    /// Behavior when the classifier is unavailable: `open` or `closed`.
    pub failure_policy: FailurePolicy,
    pub request_timeout_ms: u64,
}

impl Default for ModerationConfig {
    fn default() -> Self {
        Self {
            classifier_url: "http://localhost:5000/predict".to_string(),
            threshold: safechat_moderation::DEFAULT_THRESHOLD,
            failure_policy: FailurePolicy::default(),
            request_timeout_ms: 3_000,
        }
    }
}
