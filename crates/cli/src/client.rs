//! Minimal terminal line client: handshake, stdin → server, server → stdout.
//!
//! With a gate supplied, user input is pre-checked locally and blocked
//! input never leaves the process. This is an optimization only — the
//! server enforces its own gate on every message.

use std::sync::Arc;

use {
    futures::{SinkExt, StreamExt},
    tokio::{
        io::{AsyncBufReadExt, BufReader},
        net::TcpStream,
    },
    tokio_util::codec::{Framed, LinesCodec},
    tracing::warn,
};

use {safechat_moderation::ModerationGate, safechat_protocol as protocol};

pub async fn run_client(
    addr: &str,
    nickname: &str,
    gate: Option<Arc<ModerationGate>>,
) -> anyhow::Result<()> {
    let stream = TcpStream::connect(addr).await?;
    let (mut to_server, mut from_server) = Framed::new(stream, LinesCodec::new()).split::<String>();

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            incoming = from_server.next() => {
                let Some(line) = incoming else {
                    println!("[disconnected]");
                    return Ok(());
                };
                let line = line?;
                if line == protocol::NICK_REQUEST {
                    to_server.send(nickname.to_string()).await?;
                } else {
                    println!("{line}");
                }
            },
            typed = stdin.next_line() => {
                let Some(text) = typed? else {
                    // stdin closed — leave the chat.
                    return Ok(());
                };
                if text.is_empty() {
                    continue;
                }
                if let Some(gate) = &gate {
                    let decision = gate.evaluate(&text).await;
                    if !decision.allowed {
                        warn!(reason = %decision.reason, "message suppressed locally");
                        println!("[not sent: {}]", decision.reason);
                        continue;
                    }
                }
                to_server.send(text).await?;
            },
        }
    }
}
