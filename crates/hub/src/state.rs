use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Instant,
};

use tokio::sync::{RwLock, mpsc};

use safechat_protocol::OutboundMessage;

use crate::error::RelayError;

// ── Session ──────────────────────────────────────────────────────────────────

/// A registered client connection.
///
/// The session's transport is owned by its connection task; the registry
/// only holds the channel feeding that task's write loop.
#[derive(Debug)]
pub struct Session {
    pub conn_id: u64,
    /// Unique among active sessions; set once at registration.
    pub nickname: String,
    /// Channel for queuing wire lines to this client's write loop.
    pub sender: mpsc::UnboundedSender<String>,
    pub connected_at: Instant,
}

impl Session {
    pub fn new(conn_id: u64, nickname: String, sender: mpsc::UnboundedSender<String>) -> Self {
        Self {
            conn_id,
            nickname,
            sender,
            connected_at: Instant::now(),
        }
    }

    /// Queue a wire line for this client. Returns false when the write
    /// loop is gone, which marks the session for pruning.
    pub fn send(&self, line: &str) -> bool {
        self.sender.send(line.to_string()).is_ok()
    }
}

/// Connection lifecycle. Only `Active` sessions are ever in the registry;
/// the other states live in the connection task driving the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Handshaking,
    Active,
    Closed,
}

// ── Registry ─────────────────────────────────────────────────────────────────

#[derive(Default)]
struct Registry {
    /// conn_id → session, iterated in conn-id (join) order so broadcast
    /// delivery order is deterministic.
    sessions: BTreeMap<u64, Session>,
    /// nickname → conn_id reverse lookup enforcing uniqueness.
    nicknames: HashMap<String, u64>,
}

impl Registry {
    fn remove(&mut self, conn_id: u64) -> Option<Session> {
        let session = self.sessions.remove(&conn_id)?;
        self.nicknames.remove(&session.nickname);
        Some(session)
    }
}

/// Shared hub state: the single source of truth for active sessions and
/// the serialization point for membership changes and fan-out.
pub struct HubState {
    registry: RwLock<Registry>,
    next_conn_id: AtomicU64,
}

impl HubState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            registry: RwLock::new(Registry::default()),
            next_conn_id: AtomicU64::new(0),
        })
    }

    /// Allocate a connection id. Monotonic, so registry order is join order.
    pub fn next_conn_id(&self) -> u64 {
        self.next_conn_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Atomic check-and-insert: of concurrent registrations for the same
    /// nickname, exactly one succeeds.
    pub async fn register(&self, session: Session) -> Result<(), RelayError> {
        let mut registry = self.registry.write().await;
        if registry.nicknames.contains_key(&session.nickname) {
            return Err(RelayError::DuplicateNickname(session.nickname));
        }
        registry
            .nicknames
            .insert(session.nickname.clone(), session.conn_id);
        registry.sessions.insert(session.conn_id, session);
        Ok(())
    }

    /// Remove a session. Idempotent: a second call for the same id is a
    /// no-op returning `None`, which tolerates the race between a
    /// read-error cleanup and a broadcast-failure cleanup.
    pub async fn unregister(&self, conn_id: u64) -> Option<Session> {
        self.registry.write().await.remove(conn_id)
    }

    pub async fn session_count(&self) -> usize {
        self.registry.read().await.sessions.len()
    }

    pub async fn nicknames(&self) -> Vec<String> {
        self.registry
            .read()
            .await
            .sessions
            .values()
            .map(|s| s.nickname.clone())
            .collect()
    }

    /// Fan a message out to every active session except `exclude`.
    ///
    /// Runs under a single write-lock acquisition: channel pushes never
    /// suspend, so no await happens while the lock is held, and the lock
    /// serializes broadcasts globally (FIFO per recipient). A failed
    /// recipient never aborts delivery to the rest; dead sessions are
    /// pruned in the same critical section and returned so the caller can
    /// announce their departure.
    pub async fn broadcast(&self, message: &OutboundMessage, exclude: Option<u64>) -> Vec<Session> {
        let line = message.wire_line();
        let mut registry = self.registry.write().await;

        let mut dead = Vec::new();
        for (&conn_id, session) in &registry.sessions {
            if exclude == Some(conn_id) {
                continue;
            }
            if !session.send(&line) {
                dead.push(conn_id);
            }
        }

        dead.into_iter()
            .filter_map(|conn_id| registry.remove(conn_id))
            .collect()
    }
}
