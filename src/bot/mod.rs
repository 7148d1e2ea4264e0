//! # Bot Core Module
//!
//! Everything the ping bot decides lives here:
//!
//! - [`gate`] - sliding-window activity counter behind quiet mode
//! - [`relays`] - fixed 256-slot relay statistics with top-3 ranking
//! - [`triggers`] - `"<sender>: <body>"` parsing and synonym matching
//! - [`reply`] - the reply engine owning per-session state
//! - [`console`] - operator console line assembly and command parsing
//! - [`server`] - the control loop wiring mesh events, console and ticks together
//!
//! ## Data Flow
//!
//! ```text
//! mesh event ──► BotServer ──► ReplyEngine ──► gate / triggers / relays
//!                   │                │
//!                   │                └─► ReplyOutcome ──► Transport
//!                   ├─► PeerStore (discovery, delayed save)
//! console bytes ──► LineBuffer ──► ConsoleCommand
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use pingbot::bot::BotServer;
//! use pingbot::config::Config;
//! use pingbot::mesh::{NullTransport, SystemClock};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml").await?;
//!     let mut bot = BotServer::new(config, Box::new(NullTransport), Box::new(SystemClock::new()))?;
//!     bot.run().await
//! }
//! ```

pub mod console;
pub mod gate;
pub mod relays;
pub mod reply;
pub mod server;
pub mod triggers;

pub use reply::{ReplyEngine, ReplyOutcome};
pub use server::BotServer;
