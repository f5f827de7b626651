use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use futures_util::{SinkExt, StreamExt};
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::debug;

use crate::config::{Config, DEFAULT_IDLE_TIMEOUT_SECS, DEFAULT_PORT, DEFAULT_SWEEP_INTERVAL_SECS};
use crate::signaling::{ServerMessage, Signal};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const PROBE_KEEP_ALIVE: Duration = Duration::from_secs(30);

#[derive(Parser, Debug)]
#[command(name = "tidepool", version)]
#[command(about = "Tidepool P2P signaling relay and probe client")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    #[command(flatten)]
    pub serve: ServeArgs,
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// Interface to bind.
    #[arg(long, env = "TIDEPOOL_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on (0 picks a free port).
    #[arg(short, long, env = "TIDEPOOL_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Log peer connections and disconnections.
    #[arg(short, long, env = "TIDEPOOL_VERBOSE", default_value_t = false)]
    pub verbose: bool,

    /// Evict peers silent for this many seconds (0 disables eviction).
    #[arg(long, env = "TIDEPOOL_IDLE_TIMEOUT_SECS", default_value_t = DEFAULT_IDLE_TIMEOUT_SECS)]
    pub idle_timeout_secs: u64,

    /// How often to look for idle peers.
    #[arg(long, env = "TIDEPOOL_SWEEP_INTERVAL_SECS", default_value_t = DEFAULT_SWEEP_INTERVAL_SECS)]
    pub sweep_interval_secs: u64,
}

impl From<ServeArgs> for Config {
    fn from(args: ServeArgs) -> Self {
        Config {
            host: args.host,
            port: args.port,
            verbose: args.verbose,
            idle_timeout: Duration::from_secs(args.idle_timeout_secs),
            sweep_interval: Duration::from_secs(args.sweep_interval_secs),
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Join a channel and print every message relayed to this peer
    Probe {
        /// Relay WebSocket URL
        #[arg(short, long, default_value = "ws://localhost:8080/ws")]
        url: String,

        /// Channel to join
        #[arg(short, long)]
        channel: String,

        /// Stop after this many seconds (runs until interrupted if unset)
        #[arg(long)]
        timeout_secs: Option<u64>,
    },
}

pub async fn run_probe(url: String, channel: String, timeout_secs: Option<u64>) -> Result<()> {
    debug!(url = %url, channel = %channel, "connecting probe");

    let (ws_stream, _) = timeout(CONNECT_TIMEOUT, connect_async(url.as_str()))
        .await
        .map_err(|_| anyhow::anyhow!("Connection timeout - is the relay running?"))?
        .with_context(|| format!("failed to connect to {url}"))?;
    let (mut write, mut read) = ws_stream.split();

    let join = serde_json::to_string(&Signal::JoinPool {
        channel: channel.clone(),
    })?;
    write.send(Message::Text(join.into())).await?;
    println!("Joined channel {channel} on {url}");

    let deadline = async {
        match timeout_secs {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(deadline);

    let mut keep_alive = tokio::time::interval(PROBE_KEEP_ALIVE);
    keep_alive.tick().await;

    loop {
        tokio::select! {
            _ = &mut deadline => break,
            _ = tokio::signal::ctrl_c() => break,
            _ = keep_alive.tick() => {
                let ping = serde_json::to_string(&Signal::KeepAlive {})?;
                write.send(Message::Text(ping.into())).await?;
            }
            frame = read.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => print_frame(text.as_str()),
                    Some(Ok(Message::Close(frame))) => {
                        println!("Relay closed the connection: {frame:?}");
                        return Ok(());
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(e).context("connection error"),
                    None => return Ok(()),
                }
            }
        }
    }

    let kill = serde_json::to_string(&Signal::Kill {})?;
    let _ = write.send(Message::Text(kill.into())).await;
    Ok(())
}

fn print_frame(text: &str) {
    match serde_json::from_str::<ServerMessage>(text) {
        Ok(ServerMessage::Offer { source, offer }) => {
            println!("offer from {source}: {offer}");
        }
        Ok(ServerMessage::Answer { source, answer }) => {
            println!("answer from {source}: {answer}");
        }
        Ok(ServerMessage::Candidate { candidate }) => {
            println!("candidate: {candidate}");
        }
        Err(_) => println!("unrecognised frame: {text}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_timeout::timeout]
    fn serve_args_default_to_config_defaults() {
        let cli = Cli::try_parse_from(["tidepool"]).unwrap();
        assert!(cli.command.is_none());
        let config = Config::from(cli.serve);
        let defaults = Config::default();
        assert_eq!(config.listen_addr(), defaults.listen_addr());
        assert_eq!(config.idle_timeout, defaults.idle_timeout);
        assert_eq!(config.sweep_interval, defaults.sweep_interval);
        assert!(!config.verbose);
    }

    #[test_timeout::timeout]
    fn serve_flags_override_defaults() {
        let cli = Cli::try_parse_from([
            "tidepool",
            "--port",
            "9000",
            "--verbose",
            "--idle-timeout-secs",
            "0",
            "--sweep-interval-secs",
            "5",
        ])
        .unwrap();
        let config = Config::from(cli.serve);
        assert_eq!(config.port, 9000);
        assert!(config.verbose);
        assert!(!config.eviction_enabled());
        assert_eq!(config.sweep_interval, Duration::from_secs(5));
    }

    #[test_timeout::timeout]
    fn probe_subcommand_parses() {
        let cli = Cli::try_parse_from(["tidepool", "probe", "--channel", "room1"]).unwrap();
        match cli.command {
            Some(Commands::Probe {
                url,
                channel,
                timeout_secs,
            }) => {
                assert_eq!(url, "ws://localhost:8080/ws");
                assert_eq!(channel, "room1");
                assert_eq!(timeout_secs, None);
            }
            None => panic!("expected probe subcommand"),
        }
    }
}
