use tokio_util::codec::LinesCodecError;

use safechat_protocol::ProtocolError;

/// Relay error taxonomy. No variant is fatal to the server: each one is
/// recovered by closing the affected session only. The single process-fatal
/// condition — failing to bind the listen address — surfaces as an
/// `io::Error` from startup, before any session exists.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Read/write/connect failure on a session's transport.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// Line framing failure (includes oversized lines).
    #[error("framing error: {0}")]
    Framing(#[from] LinesCodecError),

    /// Another active session already holds this nickname.
    #[error("nickname '{0}' is already taken")]
    DuplicateNickname(String),

    /// Malformed handshake.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The client went away during the handshake.
    #[error("connection closed during handshake")]
    HandshakeClosed,

    /// The client did not complete the handshake in time.
    #[error("handshake timed out")]
    HandshakeTimeout,
}
