//! End-to-end relay scenarios over a real TCP listener with stub
//! classifiers standing in for the external capability.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use {
    async_trait::async_trait,
    futures::{SinkExt, StreamExt},
    tokio::{
        net::{TcpListener, TcpStream},
        time::timeout,
    },
    tokio_util::codec::{Framed, LinesCodec},
};

use {
    safechat_hub::{Relay, RelayOptions},
    safechat_moderation::{
        Classification, Classifier, FailurePolicy, ModerationError, ModerationGate,
    },
    safechat_protocol as protocol,
};

const STEP: Duration = Duration::from_secs(5);
const QUIET: Duration = Duration::from_millis(300);

struct FixedClassifier(f64);

#[async_trait]
impl Classifier for FixedClassifier {
    async fn classify(&self, _text: &str) -> Result<Classification, ModerationError> {
        Ok(Classification {
            flagged: self.0 > 0.7,
            confidence: self.0,
        })
    }
}

struct FailingClassifier;

#[async_trait]
impl Classifier for FailingClassifier {
    async fn classify(&self, _text: &str) -> Result<Classification, ModerationError> {
        Err(ModerationError::Unavailable("down for the test".into()))
    }
}

async fn spawn_relay(gate: ModerationGate, opts: RelayOptions) -> (SocketAddr, Arc<Relay>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let relay = Relay::new(Arc::new(gate), opts);
    tokio::spawn(Arc::clone(&relay).serve(listener));
    (addr, relay)
}

async fn spawn_default_relay(confidence: f64) -> (SocketAddr, Arc<Relay>) {
    spawn_relay(
        ModerationGate::new(Arc::new(FixedClassifier(confidence))),
        RelayOptions::default(),
    )
    .await
}

struct TestClient {
    lines: Framed<TcpStream, LinesCodec>,
}

impl TestClient {
    /// Connect and complete the handshake: wait for NICK, reply, then
    /// consume everything up to the connection banner (own join notice
    /// included).
    async fn join(addr: SocketAddr, nickname: &str) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        let mut lines = Framed::new(stream, LinesCodec::new());

        assert_eq!(Self::next_on(&mut lines).await, protocol::NICK_REQUEST);
        lines.send(nickname).await.unwrap();
        loop {
            if Self::next_on(&mut lines).await == protocol::CONNECTED_BANNER {
                break;
            }
        }
        Self { lines }
    }

    async fn next_on(lines: &mut Framed<TcpStream, LinesCodec>) -> String {
        timeout(STEP, lines.next())
            .await
            .expect("timed out waiting for a line")
            .expect("connection closed unexpectedly")
            .unwrap()
    }

    async fn next_line(&mut self) -> String {
        Self::next_on(&mut self.lines).await
    }

    async fn send_line(&mut self, line: &str) {
        self.lines.send(line).await.unwrap();
    }

    /// Assert nothing arrives within a short window.
    async fn assert_quiet(&mut self) {
        assert!(
            timeout(QUIET, self.lines.next()).await.is_err(),
            "expected no traffic"
        );
    }
}

#[tokio::test]
async fn chat_reaches_other_clients_but_not_sender() {
    let (addr, relay) = spawn_default_relay(0.1).await;

    let mut alice = TestClient::join(addr, "alice").await;
    let mut bob = TestClient::join(addr, "bob").await;

    // alice joined first, so she sees bob's arrival.
    assert_eq!(alice.next_line().await, "bob joined the chat!");

    assert_eq!(relay.hub().session_count().await, 2);

    alice.send_line("hello").await;
    assert_eq!(bob.next_line().await, "alice: hello");

    // No echo to alice: her next received line is bob's reply, not her own
    // message.
    bob.send_line("hey alice").await;
    assert_eq!(alice.next_line().await, "bob: hey alice");
}

#[tokio::test]
async fn flagged_message_blocked_with_sender_notice() {
    let (addr, _relay) = spawn_default_relay(0.95).await;

    let mut alice = TestClient::join(addr, "alice").await;
    let mut bob = TestClient::join(addr, "bob").await;
    assert_eq!(alice.next_line().await, "bob joined the chat!");

    alice.send_line("you are a loser").await;
    assert_eq!(alice.next_line().await, protocol::BLOCKED_NOTICE);
    bob.assert_quiet().await;
}

#[tokio::test]
async fn duplicate_nickname_rejected_and_closed() {
    let (addr, _relay) = spawn_default_relay(0.0).await;

    let _alice = TestClient::join(addr, "alice").await;

    let stream = TcpStream::connect(addr).await.unwrap();
    let mut lines = Framed::new(stream, LinesCodec::new());
    assert_eq!(TestClient::next_on(&mut lines).await, protocol::NICK_REQUEST);
    lines.send("alice").await.unwrap();
    assert_eq!(TestClient::next_on(&mut lines).await, protocol::NICKNAME_TAKEN);
    // The server closes the rejected connection.
    assert!(timeout(STEP, lines.next()).await.unwrap().is_none());
}

#[tokio::test]
async fn disconnect_announces_leave_once_and_frees_nickname() {
    let (addr, relay) = spawn_default_relay(0.0).await;

    let alice = TestClient::join(addr, "alice").await;
    let mut bob = TestClient::join(addr, "bob").await;

    // Abrupt close from alice's side.
    drop(alice);

    assert_eq!(bob.next_line().await, "alice left the chat!");
    bob.assert_quiet().await;
    // The session is gone by the time the leave notice arrived.
    assert_eq!(relay.hub().session_count().await, 1);

    // The nickname is registrable again.
    let mut alice2 = TestClient::join(addr, "alice").await;
    assert_eq!(bob.next_line().await, "alice joined the chat!");
    alice2.send_line("back again").await;
    assert_eq!(bob.next_line().await, "alice: back again");
}

#[tokio::test]
async fn handshake_timeout_closes_connection() {
    let opts = RelayOptions {
        handshake_timeout: Duration::from_millis(100),
        ..RelayOptions::default()
    };
    let (addr, _relay) = spawn_relay(ModerationGate::new(Arc::new(FixedClassifier(0.0))), opts).await;

    let stream = TcpStream::connect(addr).await.unwrap();
    let mut lines = Framed::new(stream, LinesCodec::new());
    assert_eq!(TestClient::next_on(&mut lines).await, protocol::NICK_REQUEST);

    // Never send a nickname; the server must hang up in bounded time.
    assert!(timeout(STEP, lines.next()).await.unwrap().is_none());
}

#[tokio::test]
async fn empty_nickname_rejected() {
    let (addr, _relay) = spawn_default_relay(0.0).await;

    let stream = TcpStream::connect(addr).await.unwrap();
    let mut lines = Framed::new(stream, LinesCodec::new());
    assert_eq!(TestClient::next_on(&mut lines).await, protocol::NICK_REQUEST);
    lines.send("   ").await.unwrap();
    assert!(timeout(STEP, lines.next()).await.unwrap().is_none());
}

#[tokio::test]
async fn classifier_outage_fails_open_by_default() {
    let (addr, _relay) = spawn_relay(
        ModerationGate::new(Arc::new(FailingClassifier)),
        RelayOptions::default(),
    )
    .await;

    let mut alice = TestClient::join(addr, "alice").await;
    let mut bob = TestClient::join(addr, "bob").await;
    assert_eq!(alice.next_line().await, "bob joined the chat!");

    alice.send_line("still here?").await;
    assert_eq!(bob.next_line().await, "alice: still here?");
}

#[tokio::test]
async fn classifier_outage_fails_closed_when_configured() {
    let gate =
        ModerationGate::new(Arc::new(FailingClassifier)).with_policy(FailurePolicy::Closed);
    let (addr, _relay) = spawn_relay(gate, RelayOptions::default()).await;

    let mut alice = TestClient::join(addr, "alice").await;
    let mut bob = TestClient::join(addr, "bob").await;
    assert_eq!(alice.next_line().await, "bob joined the chat!");

    alice.send_line("anyone?").await;
    assert_eq!(alice.next_line().await, protocol::DEGRADED_NOTICE);
    bob.assert_quiet().await;
}
