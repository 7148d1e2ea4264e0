//! # Pingbot - Auto-Responder for a Mesh Radio Group Channel
//!
//! Pingbot is the application layer of a mesh-radio "ping" bot. It listens on one
//! broadcast channel, answers short trigger phrases with route diagnostics, keeps
//! statistics about the relays replies travelled through and persists a small
//! directory of relay peers across restarts. Radio control, routing, framing and
//! identity belong to an external mesh stack reached through the [`mesh`] seams.
//!
//! ## Features
//!
//! - **Quiet Mode**: sliding five-minute activity window that silences the bot on a busy channel.
//! - **Route Replies**: direct replies report SNR; relayed replies report hop count and path.
//! - **Relay Statistics**: fixed 256-slot first-hop/total-hop counters with a top-3 ranking.
//! - **Relay Directory**: 140-byte fixed records, relay-type peers only, rewritten under a file lock.
//! - **Operator Console**: line-oriented commands (`clock`, `time`, `quiet`, `advert`, `repeaters`, ...).
//!
//! ## Quick Start
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
//!     bot.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`bot`] - Reply engine, quiet gate, relay statistics, console and control loop
//! - [`mesh`] - Transport / clock / event seams and the JSON-lines bridge
//! - [`storage`] - Relay directory persistence
//! - [`config`] - Configuration management and validation
//! - [`metrics`] - Reply counters
//! - [`validation`] - UTF-8 safe clamping and input parsing helpers
//! - [`logutil`] - Single-line log escaping and path rendering

pub mod bot;
pub mod config;
pub mod logutil;
pub mod mesh;
pub mod metrics;
pub mod storage;
pub mod validation;
