//! callsignal - Real-time call signaling client

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use callsignal::config::{self, SignalingConfig};
use callsignal::network::{
    ConnectionState, E2EEMessageType, E2EEOutboundMessage, HeartbeatScheduler, RelayServer,
    SignalingHandlers, SignalingRouter,
};

#[derive(Parser)]
#[command(name = "callsignal")]
#[command(about = "Real-time call signaling client")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (defaults to the platform config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Join a call room through the relay
    Join {
        /// Relay URL (e.g., wss://example.com); overrides the config file
        #[arg(short, long)]
        server: Option<String>,

        /// Room ID to join
        #[arg(short, long)]
        room: String,

        /// Bearer token sent with every (re)connect
        #[arg(short, long, env = "CALLSIGNAL_TOKEN")]
        token: String,
    },

    /// Run a local reference relay
    Relay {
        /// Port to listen on
        #[arg(short, long, default_value = "8080")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "0.0.0.0")]
        host: String,
    },

    /// Inspect or create the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration
    Show,
    /// Write a default configuration file
    Init,
}

fn setup_logging(verbose: bool) -> Result<()> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;
    Ok(())
}

fn load_config(path: Option<&PathBuf>) -> Result<SignalingConfig> {
    let config = match path {
        Some(path) => config::load_config(path)?,
        None => config::load_default_config()?,
    };
    Ok(config)
}

/// One line of interactive input
#[derive(Debug, PartialEq)]
enum Command {
    Join,
    Leave,
    Offer { to: String, sdp: String },
    Answer { to: String, sdp: String },
    Ice { to: String, candidate: String },
    Camera(bool),
    Microphone(bool),
    ScreenShare(bool),
    Key {
        kind: E2EEMessageType,
        to: String,
        payload: String,
    },
    Heartbeat,
    Status,
    Quit,
}

fn parse_switch(word: Option<&str>) -> Result<bool, String> {
    match word {
        Some("on") | Some("start") => Ok(true),
        Some("off") | Some("stop") => Ok(false),
        _ => Err("expected on/off".to_string()),
    }
}

fn parse_command(line: &str) -> Result<Command, String> {
    let mut words = line.split_whitespace();
    let verb = words.next().ok_or("empty command")?;

    let command = match verb {
        "join" => Command::Join,
        "leave" => Command::Leave,
        "offer" | "answer" | "ice" => {
            let usage = || format!("usage: {} <user> <payload>", verb);
            let to = words.next().ok_or_else(usage)?.to_string();
            let rest: Vec<&str> = words.collect();
            if rest.is_empty() {
                return Err(usage());
            }
            let body = rest.join(" ");
            match verb {
                "offer" => Command::Offer { to, sdp: body },
                "answer" => Command::Answer { to, sdp: body },
                _ => Command::Ice {
                    to,
                    candidate: body,
                },
            }
        }
        "camera" => Command::Camera(parse_switch(words.next())?),
        "mic" => Command::Microphone(parse_switch(words.next())?),
        "share" => Command::ScreenShare(parse_switch(words.next())?),
        "key" => {
            let kind = match words.next() {
                Some("offer") => E2EEMessageType::KeyOffer,
                Some("answer") => E2EEMessageType::KeyAnswer,
                Some("rotation") => E2EEMessageType::KeyRotation,
                Some("generic") => E2EEMessageType::Generic,
                _ => {
                    return Err("usage: key <offer|answer|rotation|generic> <user> <payload>".into())
                }
            };
            let to = words.next().ok_or("missing user")?.to_string();
            let payload = words.next().ok_or("missing payload")?.to_string();
            Command::Key { kind, to, payload }
        }
        "heartbeat" => Command::Heartbeat,
        "status" => Command::Status,
        "quit" | "exit" => Command::Quit,
        other => return Err(format!("unknown command: {}", other)),
    };

    Ok(command)
}

fn print_help() {
    println!("Commands:");
    println!("  join | leave");
    println!("  offer <user> <sdp>    answer <user> <sdp>    ice <user> <candidate>");
    println!("  camera on|off    mic on|off    share start|stop");
    println!("  key <offer|answer|rotation|generic> <user> <payload>");
    println!("  heartbeat | status | quit");
}

fn event_handlers(states: mpsc::UnboundedSender<ConnectionState>) -> SignalingHandlers {
    SignalingHandlers::new()
        .on_room_joined(|e| {
            println!("Joined room {} ({} participants)", e.room_id, e.participants.len());
            for p in &e.participants {
                let marker = if p.is_initiator { " (initiator)" } else { "" };
                println!("  - {}{}", p.user_id, marker);
            }
        })
        .on_user_joined(|e| println!("{} joined", e.user_id))
        .on_user_left(|e| println!("{} left", e.user_id))
        .on_offer(|e| println!("Offer from {}: {}", e.from_user_id, e.offer))
        .on_answer(|e| println!("Answer from {}: {}", e.from_user_id, e.answer))
        .on_ice_candidate(|e| println!("ICE candidate from {}: {}", e.from_user_id, e.candidate))
        .on_call_ended(|e| {
            println!(
                "Call ended by {}{}",
                e.ended_by,
                e.reason.map(|r| format!(": {}", r)).unwrap_or_default()
            )
        })
        .on_media_state_changed(|e| {
            println!("{} {} -> {}", e.user_id, e.media_type, on_off(e.enabled))
        })
        .on_camera_toggled(|e| println!("{} camera {}", e.user_id, on_off(e.enabled)))
        .on_microphone_toggled(|e| println!("{} microphone {}", e.user_id, on_off(e.enabled)))
        .on_screen_share_started(|e| println!("{} started sharing", e.user_id))
        .on_screen_share_stopped(|e| println!("{} stopped sharing", e.user_id))
        .on_heartbeat_ack(|e| tracing::debug!("Heartbeat ack at {}", e.timestamp))
        .on_e2ee_message(|m| {
            println!(
                "E2EE {:?} from {} ({} bytes)",
                m.message_type,
                m.from_user_id,
                m.payload.len()
            )
        })
        .on_state_changed(move |state| {
            let _ = states.send(state);
        })
        .on_error(|e| warn!("Signaling error [{}]: {}", e.code(), e))
}

fn on_off(enabled: bool) -> &'static str {
    if enabled {
        "on"
    } else {
        "off"
    }
}

async fn execute(router: &SignalingRouter, command: Command) -> Result<bool> {
    match command {
        Command::Join => router.join_room().await?,
        Command::Leave => router.leave_room().await?,
        Command::Offer { to, sdp } => router.send_offer(&to, &sdp).await?,
        Command::Answer { to, sdp } => router.send_answer(&to, &sdp).await?,
        Command::Ice { to, candidate } => router.send_ice_candidate(&to, &candidate).await?,
        Command::Camera(on) => router.media().toggle_camera(on).await?,
        Command::Microphone(on) => router.media().toggle_microphone(on).await?,
        Command::ScreenShare(true) => router.media().start_screen_share().await?,
        Command::ScreenShare(false) => router.media().stop_screen_share().await?,
        Command::Key { kind, to, payload } => {
            let result = router
                .e2ee()
                .send(&E2EEOutboundMessage::new(&to, kind, payload))
                .await;
            if !result.success {
                println!(
                    "Key exchange failed [{}]: {}",
                    result.error_code.unwrap_or_default(),
                    result.error_message.unwrap_or_default()
                );
            }
        }
        Command::Heartbeat => router.send_heartbeat().await?,
        Command::Status => println!(
            "State: {} (room {})",
            router.state(),
            router.room_id().unwrap_or_else(|| "-".to_string())
        ),
        Command::Quit => return Ok(false),
    }
    Ok(true)
}

async fn run_join(config: SignalingConfig, room: String, token: String) -> Result<()> {
    let (state_tx, mut state_rx) = mpsc::unbounded_channel();
    let router = SignalingRouter::new(config.transport_config(), event_handlers(state_tx));

    info!("Connecting to {} (room {})", config.server_url, room);
    router
        .connect(&room, Arc::new(move || Some(token.clone())))
        .await;

    if router.state() != ConnectionState::Connected {
        let reason = router
            .transport()
            .last_error()
            .map(|e| e.to_string())
            .unwrap_or_else(|| "unknown error".to_string());
        bail!("Could not connect: {}", reason);
    }

    router.join_room().await?;
    let mut heartbeat =
        HeartbeatScheduler::start(router.transport().clone(), config.heartbeat_interval());

    println!("\nConnected. Type 'help' for commands, Ctrl+C to leave.\n");

    let stdin = tokio::io::stdin();
    let mut stdin_reader = BufReader::new(stdin).lines();
    let mut was_reconnecting = false;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down...");
                break;
            }
            Some(state) = state_rx.recv() => {
                match state {
                    ConnectionState::Reconnecting => was_reconnecting = true,
                    ConnectionState::Connected if was_reconnecting => {
                        was_reconnecting = false;
                        info!("Rejoining room {} after reconnect", room);
                        if let Err(e) = router.join_room().await {
                            warn!("Rejoin failed: {}", e);
                        }
                    }
                    ConnectionState::Disconnected | ConnectionState::Error => {
                        warn!("Relay connection is {}", state);
                    }
                    _ => {}
                }
            }
            line_result = stdin_reader.next_line() => {
                match line_result {
                    Ok(Some(line)) => {
                        let line = line.trim();
                        if line.is_empty() {
                            continue;
                        }
                        if line == "help" {
                            print_help();
                            continue;
                        }
                        match parse_command(line) {
                            Ok(command) => match execute(&router, command).await {
                                Ok(true) => {}
                                Ok(false) => break,
                                Err(e) => warn!("{}", e),
                            },
                            Err(e) => println!("{}", e),
                        }
                    }
                    Ok(None) => {
                        info!("stdin closed");
                        break;
                    }
                    Err(e) => {
                        warn!("stdin error: {}", e);
                        break;
                    }
                }
            }
        }
    }

    heartbeat.stop();
    if router.state().is_connected() {
        if let Err(e) = router.leave_room().await {
            warn!("Leave failed: {}", e);
        }
    }
    router.disconnect().await;

    Ok(())
}

async fn run_relay(host: String, port: u16) -> Result<()> {
    let server = RelayServer::new();
    let addr = format!("{}:{}", host, port);

    let serve = server.clone();
    let task = tokio::spawn(async move { serve.run(&addr).await });

    println!("\nRelay started on {}:{}.", host, port);
    println!("Press Ctrl+C to stop.\n");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down...");
            server.shutdown();
        }
        result = task => {
            result??;
        }
    }

    Ok(())
}

fn run_config(action: ConfigAction, path: Option<PathBuf>) -> Result<()> {
    let path = match path {
        Some(path) => path,
        None => config::default_config_path().context("Could not determine config directory")?,
    };

    match action {
        ConfigAction::Show => {
            let config = if path.exists() {
                config::load_config(&path)?
            } else {
                SignalingConfig::default()
            };
            println!("# {}", path.display());
            print!("{}", toml::to_string_pretty(&config)?);
        }
        ConfigAction::Init => {
            if path.exists() {
                bail!("{} already exists", path.display());
            }
            config::save_config(&SignalingConfig::default(), &path)?;
            println!("Wrote {}", path.display());
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose)?;

    match cli.command {
        Commands::Join {
            server,
            room,
            token,
        } => {
            let mut config = load_config(cli.config.as_ref())?;
            if let Some(server) = server {
                config.server_url = server;
            }
            config.validate()?;
            run_join(config, room, token).await?;
        }
        Commands::Relay { port, host } => {
            run_relay(host, port).await?;
        }
        Commands::Config { action } => {
            run_config(action, cli.config)?;
        }
    }

    Ok(())
}
