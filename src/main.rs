//! Binary entrypoint for the pingbot CLI.
//!
//! Commands:
//! - `start [--feed <path>] [--outbox <path>]` - run the bot loop with the console on stdin
//! - `init` - create a starter `config.toml` and the data directory
//! - `status [--json]` - print the configuration summary and the saved relay directory
//!
//! See the library crate docs for module-level details: `pingbot::`.
use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use log::{info, warn};

use pingbot::bot::relays::RelayStatsTracker;
use pingbot::bot::BotServer;
use pingbot::config::Config;
use pingbot::logutil::format_path;
use pingbot::mesh::bridge::{spawn_feed_reader, JsonLinesTransport};
use pingbot::mesh::{NullTransport, SystemClock, Transport};
use pingbot::storage::PeerStore;

#[derive(Parser)]
#[command(name = "pingbot")]
#[command(about = "Auto-responder bot for a mesh radio group channel")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (can be used before or after subcommand)
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: String,

    /// Verbose logging (-v, -vv for more; may appear before or after subcommand)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the bot
    Start {
        /// JSON-lines file or FIFO with inbound mesh events
        #[arg(short, long)]
        feed: Option<String>,

        /// JSON-lines file receiving outbound sends
        #[arg(short, long)]
        outbox: Option<String>,
    },
    /// Write a default configuration
    Init,
    /// Show configuration and the saved relay directory
    Status {
        /// Print machine-readable JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Init => {
            init_logging(&None, cli.verbose);
            if std::path::Path::new(&cli.config).exists() {
                return Err(anyhow!("{} already exists; not overwriting", cli.config));
            }
            Config::create_default(&cli.config).await?;
            let cfg = Config::load(&cli.config).await?;
            tokio::fs::create_dir_all(&cfg.storage.data_dir).await?;
            info!(
                "Wrote {} and created data directory {}",
                cli.config, cfg.storage.data_dir
            );
        }
        Commands::Start { feed, outbox } => {
            let config = Config::load(&cli.config).await?;
            init_logging(&Some(config.clone()), cli.verbose);
            info!("Starting pingbot v{}", env!("CARGO_PKG_VERSION"));

            let transport: Box<dyn Transport> = match outbox {
                Some(path) => {
                    info!("Writing outbound sends to {}", path);
                    Box::new(JsonLinesTransport::open(&path)?)
                }
                None => {
                    info!("No --outbox given; sends are logged only");
                    Box::new(NullTransport)
                }
            };

            let mut bot = BotServer::new(config, transport, Box::new(SystemClock::new()))?;
            if let Some(path) = feed {
                spawn_feed_reader(path, bot.event_sender());
            } else {
                warn!("No --feed given; only console commands will reach the bot");
            }
            bot.run().await?;
        }
        Commands::Status { json } => {
            let config = Config::load(&cli.config).await?;
            init_logging(&Some(config.clone()), cli.verbose);
            show_status(&config, json)?;
        }
    }

    Ok(())
}

fn show_status(config: &Config, json: bool) -> Result<()> {
    let mut relays = RelayStatsTracker::new();
    let mut store = PeerStore::new(config.storage.peers_path(), config.storage.max_peers);
    if let Err(e) = store.load(&mut relays) {
        warn!("Could not read {}: {}", store.path().display(), e);
    }
    let saved: Vec<_> = store.table().relays().collect();

    if json {
        let payload = serde_json::json!({
            "name": config.bot.name,
            "mention": config.bot.plain_name(),
            "channel": config.bot.channel,
            "channel_name": config.bot.channel_name,
            "version": config.bot.firmware_version,
            "stats_enabled": config.reply.enable_stats,
            "persistence_enabled": config.reply.enable_persistence,
            "peers_file": store.path().display().to_string(),
            "relay_count": saved.len(),
            "relays": saved,
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }

    println!("=== pingbot status ===");
    println!("Name: {} (mention: {})", config.bot.name, config.bot.plain_name());
    println!(
        "Channel: {} ({})",
        config.bot.channel, config.bot.channel_name
    );
    println!(
        "Version: {} ({})",
        config.bot.firmware_version, config.bot.firmware_build
    );
    println!(
        "Quiet mode: {} messages in {}s, cooldown {}s",
        config.reply.quiet_threshold, config.reply.quiet_window_seconds, config.reply.cooldown_seconds
    );
    println!("Relay directory: {}", store.path().display());
    println!("Saved relays: {}", saved.len());
    for rec in saved {
        let path = match &rec.out_path {
            Some(p) if p.is_empty() => "direct".to_string(),
            Some(p) => format_path(p),
            None => "unknown".to_string(),
        };
        println!(
            "  {:02X} {} (last advert {}, path {})",
            rec.relay_id(),
            rec.name,
            rec.last_advert,
            path
        );
    }
    Ok(())
}

fn init_logging(config: &Option<Config>, verbosity: u8) {
    use std::io::Write;
    let mut builder = env_logger::Builder::new();
    // Config level is the floor; -v / -vv raise it
    let configured = config
        .as_ref()
        .map(|c| c.logging.level_filter())
        .unwrap_or(log::LevelFilter::Info);
    let base_level = match verbosity {
        0 => configured,
        1 => configured.max(log::LevelFilter::Debug),
        _ => log::LevelFilter::Trace,
    };
    builder.filter_level(base_level);

    let log_file = config
        .as_ref()
        .and_then(|c| c.logging.file.as_ref())
        .and_then(|file| {
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(file)
                .ok()
        });

    if let Some(f) = log_file {
        let write_mutex = std::sync::Arc::new(std::sync::Mutex::new(f));
        // Foreground runs also echo to the console
        let is_tty = atty::is(atty::Stream::Stdout);
        builder.format(move |fmt, record| {
            let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
            let line = format!("{} [{}] {}", ts, record.level(), record.args());
            if let Ok(mut guard) = write_mutex.lock() {
                let _ = writeln!(guard, "{}", line);
            }
            if is_tty {
                writeln!(fmt, "{}", line)
            } else {
                Ok(())
            }
        });
    } else {
        builder.format(|fmt, record| {
            let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
            writeln!(fmt, "{} [{}] {}", ts, record.level(), record.args())
        });
    }
    let _ = builder.try_init();
}
