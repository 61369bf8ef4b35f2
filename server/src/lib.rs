//! # Lightcycle Arena Server Library
//!
//! The authoritative server for a small multiplayer lightcycle game. Players
//! connect over TCP, steer with single-byte commands and receive the whole
//! arena as a text frame every tick.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Simulation
//! Every cycle advances one cell per tick. Leaving the board or driving into
//! another player's trail is fatal; the player who owns that trail is
//! credited with the kill. Dead players respawn after a fixed delay on a
//! cell with an empty neighbourhood.
//!
//! ### Seat Management
//! A bounded number of seats is handed out smallest-index-first. A seat's
//! color identifies the player's head and trail on the board, and no two
//! seated players ever share a color.
//!
//! ### Scoring
//! Survival earns points per whole second alive. Kills earn a flat bonus
//! plus a share of the victim's score. Personal bests survive restarts via a
//! small text ledger keyed by peer address.
//!
//! ## Architecture Design
//!
//! ### Single Engine Lock
//! All game state lives in one [`game::Engine`] behind a
//! `tokio::sync::Mutex`. Joins, inputs, removals and ticks each take the lock
//! for a short synchronous section and never await while holding it.
//!
//! ### Per-Connection Tasks
//! Each connection runs a reader that applies commands and watches for
//! silence, plus a writer that drains a bounded outbox. A full or closed
//! outbox is treated as a dead peer and evicts the seat.
//!
//! ## Module Organization
//!
//! - `config`: command-line and environment tunables
//! - `board`: the occupancy grid
//! - `slots`: seat allocation
//! - `ledger`: persistent high scores
//! - `player`: per-seat state
//! - `game`: the engine and tick pipeline
//! - `network`: accept loop, connection tasks and the tick clock
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use tron_server::config::ServerConfig;
//! use tron_server::game::Engine;
//! use tron_server::ledger::HighScoreLedger;
//! use tron_server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig::default();
//!     config.validate()?;
//!
//!     let ledger = HighScoreLedger::load(&config.highscores)?;
//!     let engine = Engine::new(&config, ledger);
//!
//!     // Accepts players forever and ticks every 300ms
//!     Server::new(config, engine).await?.run().await;
//!     Ok(())
//! }
//! ```

pub mod board;
pub mod config;
pub mod game;
pub mod ledger;
pub mod network;
pub mod player;
pub mod slots;
