use std::{net::SocketAddr, sync::Arc, time::Duration};

use {
    futures::{SinkExt, StreamExt},
    tokio::{
        net::{TcpListener, TcpStream},
        sync::mpsc,
        time::timeout,
    },
    tokio_util::codec::{FramedRead, FramedWrite, LinesCodec},
    tracing::{debug, info, warn},
};

use {
    safechat_moderation::ModerationGate,
    safechat_protocol::{
        self as protocol, OutboundMessage, validate_nickname,
    },
};

use crate::{
    error::RelayError,
    state::{HubState, Session, SessionState},
};

// ── Options ──────────────────────────────────────────────────────────────────

/// Tunables for the relay's connection handling.
#[derive(Debug, Clone)]
pub struct RelayOptions {
    /// How long a client may take to reply to the nickname request before
    /// its transport is closed.
    pub handshake_timeout: Duration,
    pub max_nickname_len: usize,
}

impl Default for RelayOptions {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_millis(protocol::DEFAULT_HANDSHAKE_TIMEOUT_MS),
            max_nickname_len: protocol::DEFAULT_MAX_NICKNAME_LEN,
        }
    }
}

// ── Relay ────────────────────────────────────────────────────────────────────

/// The relay server: transport acceptance and lifecycle wiring around the
/// hub and the moderation gate.
pub struct Relay {
    hub: Arc<HubState>,
    gate: Arc<ModerationGate>,
    opts: RelayOptions,
}

impl Relay {
    pub fn new(gate: Arc<ModerationGate>, opts: RelayOptions) -> Arc<Self> {
        Arc::new(Self {
            hub: HubState::new(),
            gate,
            opts,
        })
    }

    pub fn hub(&self) -> &Arc<HubState> {
        &self.hub
    }

    /// Run the accept loop on an already-bound listener. Accept failures
    /// are logged and retried; only dropping the listener stops the loop.
    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> std::io::Result<()> {
        let addr = listener.local_addr()?;
        info!(%addr, "relay listening");

        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    let relay = Arc::clone(&self);
                    tokio::spawn(async move {
                        if let Err(e) = relay.handle_connection(stream, peer).await {
                            debug!(%peer, error = %e, "connection closed with error");
                        }
                    });
                },
                Err(e) => {
                    warn!(error = %e, "accept failed");
                },
            }
        }
    }

    /// Drive one client connection from handshake to close.
    ///
    /// Errors here never escape past this connection: the caller only logs
    /// them. Removal from the registry and the departure notice happen on
    /// every exit path after registration.
    async fn handle_connection(&self, stream: TcpStream, peer: SocketAddr) -> Result<(), RelayError> {
        let conn_id = self.hub.next_conn_id();
        let mut state = SessionState::Handshaking;
        debug!(conn_id, %peer, ?state, "connection accepted");

        let (read_half, write_half) = stream.into_split();
        let mut reader = FramedRead::new(
            read_half,
            LinesCodec::new_with_max_length(protocol::MAX_LINE_LEN),
        );
        let mut writer = FramedWrite::new(write_half, LinesCodec::new());

        // Handshake: request an identity, wait (bounded) for the reply.
        writer.send(protocol::NICK_REQUEST).await?;
        let reply = match timeout(self.opts.handshake_timeout, reader.next()).await {
            Err(_) => return Err(RelayError::HandshakeTimeout),
            Ok(None) => return Err(RelayError::HandshakeClosed),
            Ok(Some(line)) => line?,
        };
        let nickname = validate_nickname(&reply, self.opts.max_nickname_len)?;

        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        let session = Session::new(conn_id, nickname.clone(), tx.clone());
        if let Err(e) = self.hub.register(session).await {
            writer.send(protocol::NICKNAME_TAKEN).await.ok();
            return Err(e);
        }
        state = SessionState::Active;
        info!(conn_id, %peer, %nickname, ?state, "client joined");

        // Writer task: drains the session channel into the socket. Ends
        // when every sender (registry + this task) is gone or the peer
        // stops reading.
        let write_task = tokio::spawn(async move {
            while let Some(line) = rx.recv().await {
                if writer.send(line).await.is_err() {
                    break;
                }
            }
        });

        // Same order as the handshake the clients expect: the join notice
        // (everyone, the joiner included) precedes the confirmation banner
        // in the joiner's FIFO.
        self.announce(OutboundMessage::system_join(&nickname)).await;
        tx.send(protocol::CONNECTED_BANNER.to_string()).ok();

        // Receive loop: one inbound line at a time through the gate. The
        // moderation call runs on this task only; no hub lock is held
        // across it.
        let result = self.receive_loop(conn_id, &nickname, &mut reader, &tx).await;

        state = SessionState::Closed;
        debug!(conn_id, %nickname, ?state, "receive loop ended");

        // Whoever removes the session announces the departure — exactly
        // once even when a broadcast-failure prune races this cleanup.
        if self.hub.unregister(conn_id).await.is_some() {
            info!(conn_id, %nickname, "client left");
            self.announce(OutboundMessage::system_leave(&nickname)).await;
        }

        drop(tx);
        write_task.await.ok();
        result
    }

    async fn receive_loop(
        &self,
        conn_id: u64,
        nickname: &str,
        reader: &mut FramedRead<tokio::net::tcp::OwnedReadHalf, LinesCodec>,
        tx: &mpsc::UnboundedSender<String>,
    ) -> Result<(), RelayError> {
        while let Some(line) = reader.next().await {
            let text = line?;
            let decision = self.gate.evaluate(&text).await;
            if decision.allowed {
                if decision.degraded {
                    warn!(conn_id, nickname, "moderation degraded, message passed fail-open");
                }
                let pruned = self
                    .hub
                    .broadcast(&OutboundMessage::chat(nickname, &text), Some(conn_id))
                    .await;
                self.announce_departures(pruned).await;
            } else {
                info!(
                    conn_id,
                    nickname,
                    confidence = decision.confidence,
                    reason = %decision.reason,
                    "message blocked"
                );
                let notice = if decision.degraded {
                    protocol::DEGRADED_NOTICE
                } else {
                    protocol::BLOCKED_NOTICE
                };
                // Block notice goes to the sender only; the message never
                // reaches another session.
                tx.send(notice.to_string()).ok();
            }
        }
        Ok(())
    }

    /// Broadcast a system notice to every session, then announce the
    /// departure of any recipient whose write loop turned out dead.
    async fn announce(&self, message: OutboundMessage) {
        let pruned = self.hub.broadcast(&message, None).await;
        self.announce_departures(pruned).await;
    }

    /// Announce leave notices for sessions pruned during a fan-out. Each
    /// notice is itself a broadcast that may prune more sessions, so keep
    /// going until the registry is quiescent.
    async fn announce_departures(&self, mut departed: Vec<Session>) {
        while let Some(session) = departed.pop() {
            info!(conn_id = session.conn_id, nickname = %session.nickname, "client dropped during fan-out");
            let more = self
                .hub
                .broadcast(&OutboundMessage::system_leave(&session.nickname), None)
                .await;
            departed.extend(more);
        }
    }
}

/// Bind the configured address (the only process-fatal failure) and run
/// the relay until the process stops.
pub async fn start_relay(
    bind: &str,
    port: u16,
    gate: Arc<ModerationGate>,
    opts: RelayOptions,
) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{bind}:{port}").parse()?;
    let listener = TcpListener::bind(addr).await?;
    Relay::new(gate, opts).serve(listener).await?;
    Ok(())
}
