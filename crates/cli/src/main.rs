mod client;

use std::{sync::Arc, time::Duration};

use {
    clap::{Parser, Subcommand},
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

use {
    safechat_config::SafechatConfig,
    safechat_hub::{RelayOptions, server::start_relay},
    safechat_moderation::{HttpClassifier, ModerationGate},
};

#[derive(Parser)]
#[command(name = "safechat", about = "SafeChat — moderated chat relay")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the relay server.
    Serve {
        /// Override the configured bind address.
        #[arg(long)]
        bind: Option<String>,
        /// Override the configured port.
        #[arg(long)]
        port: Option<u16>,
    },
    /// Run a message through the moderation gate and print the decision.
    Check {
        message: String,
    },
    /// Connect to a relay as a terminal line client.
    Connect {
        /// Server address, host:port.
        #[arg(long)]
        addr: Option<String>,
        /// Nickname to register with.
        #[arg(long)]
        nick: String,
        /// Evaluate input through the moderation gate locally before
        /// sending; blocked input is suppressed. The server still enforces
        /// its own gate.
        #[arg(long, default_value_t = false)]
        precheck: bool,
    },
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    if cli.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

/// Build the moderation gate from config.
fn build_gate(config: &SafechatConfig) -> anyhow::Result<Arc<ModerationGate>> {
    let classifier = HttpClassifier::new(
        &config.moderation.classifier_url,
        Duration::from_millis(config.moderation.request_timeout_ms),
    )?;
    Ok(Arc::new(
        ModerationGate::new(Arc::new(classifier))
            .with_threshold(config.moderation.threshold)
            .with_policy(config.moderation.failure_policy),
    ))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "safechat starting");

    let config = safechat_config::discover_and_load();

    match cli.command {
        Commands::Serve { bind, port } => {
            let bind = bind.unwrap_or_else(|| config.server.bind.clone());
            let port = port.unwrap_or(config.server.port);
            let gate = build_gate(&config)?;
            let opts = RelayOptions {
                handshake_timeout: Duration::from_millis(config.server.handshake_timeout_ms),
                max_nickname_len: config.server.max_nickname_len,
            };
            start_relay(&bind, port, gate, opts).await
        },
        Commands::Check { message } => {
            let gate = build_gate(&config)?;
            let decision = gate.evaluate(&message).await;
            println!(
                "allowed: {}\nconfidence: {:.3}\nreason: {}",
                decision.allowed, decision.confidence, decision.reason
            );
            Ok(())
        },
        Commands::Connect {
            addr,
            nick,
            precheck,
        } => {
            let addr = addr
                .unwrap_or_else(|| format!("{}:{}", config.server.bind, config.server.port));
            let gate = if precheck {
                Some(build_gate(&config)?)
            } else {
                None
            };
            client::run_client(&addr, &nick, gate).await
        },
    }
}
