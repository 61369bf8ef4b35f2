//! Server tunables, parsed from flags or `TRON_*` environment variables.

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tron_shared::{
    max_frame_len, BOARD_HEIGHT, BOARD_WIDTH, CONNECTION_TIMEOUT_MS, INIT_SPACE_CHECK,
    MAX_DATA_BUFFER, MAX_PLAYERS, RESPAWN_DELAY_MS, SCORE_KILL_POINTS, SCORE_SURVIVAL_RATE,
    SCORE_TRANSFER_RATE, SERVER_PORT, TICK_MS,
};

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("board must be at least {min}x{min} for spawn radius {radius}, got {width}x{height}")]
    BoardTooSmall {
        width: usize,
        height: usize,
        radius: usize,
        min: usize,
    },
    #[error("max players must be between 1 and 255, got {0}")]
    PlayerCount(usize),
    #[error("a {width}x{height} frame may reach {bytes} bytes, clients accept at most {limit}")]
    FrameTooLarge {
        width: usize,
        height: usize,
        bytes: usize,
        limit: usize,
    },
    #[error("tick period must be non-zero")]
    ZeroTick,
    #[error("transfer rate must be a finite non-negative number, got {0}")]
    TransferRate(f64),
}

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Authoritative lightcycle arena server")]
pub struct ServerConfig {
    /// Address to bind to
    #[arg(short = 'H', long, env = "TRON_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, env = "TRON_PORT", default_value_t = SERVER_PORT)]
    pub port: u16,

    /// Board width in cells
    #[arg(long, env = "TRON_WIDTH", default_value_t = BOARD_WIDTH)]
    pub width: usize,

    /// Board height in cells
    #[arg(long, env = "TRON_HEIGHT", default_value_t = BOARD_HEIGHT)]
    pub height: usize,

    /// Maximum number of seated players
    #[arg(long, env = "TRON_MAX_PLAYERS", default_value_t = MAX_PLAYERS)]
    pub max_players: usize,

    /// Milliseconds between simulation ticks
    #[arg(long, env = "TRON_TICK_MS", default_value_t = TICK_MS)]
    pub tick_ms: u64,

    /// Milliseconds a dead player waits before respawning
    #[arg(long, env = "TRON_RESPAWN_MS", default_value_t = RESPAWN_DELAY_MS)]
    pub respawn_ms: u64,

    /// Points credited per whole second alive
    #[arg(long, env = "TRON_SURVIVAL_RATE", default_value_t = SCORE_SURVIVAL_RATE)]
    pub survival_rate: u32,

    /// Flat bonus awarded for a kill
    #[arg(long, env = "TRON_KILL_BONUS", default_value_t = SCORE_KILL_POINTS)]
    pub kill_bonus: u32,

    /// Fraction of the victim's final score handed to the killer
    #[arg(long, env = "TRON_TRANSFER_RATE", default_value_t = SCORE_TRANSFER_RATE)]
    pub transfer_rate: f64,

    /// Radius around a spawn cell that must be empty
    #[arg(long, env = "TRON_SPAWN_RADIUS", default_value_t = INIT_SPACE_CHECK)]
    pub spawn_radius: usize,

    /// Milliseconds without any client byte before the connection is dropped
    #[arg(long, env = "TRON_TIMEOUT_MS", default_value_t = CONNECTION_TIMEOUT_MS)]
    pub timeout_ms: u64,

    /// High-score ledger file
    #[arg(long, env = "TRON_HIGHSCORES", default_value = "highscores.txt")]
    pub highscores: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: SERVER_PORT,
            width: BOARD_WIDTH,
            height: BOARD_HEIGHT,
            max_players: MAX_PLAYERS,
            tick_ms: TICK_MS,
            respawn_ms: RESPAWN_DELAY_MS,
            survival_rate: SCORE_SURVIVAL_RATE,
            kill_bonus: SCORE_KILL_POINTS,
            transfer_rate: SCORE_TRANSFER_RATE,
            spawn_radius: INIT_SPACE_CHECK,
            timeout_ms: CONNECTION_TIMEOUT_MS,
            highscores: PathBuf::from("highscores.txt"),
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        // A spawn cell needs its full neighbourhood inside the board.
        let min = self.spawn_radius * 2 + 1;
        if self.width < min || self.height < min {
            return Err(ConfigError::BoardTooSmall {
                width: self.width,
                height: self.height,
                radius: self.spawn_radius,
                min,
            });
        }
        // Cells store color + 1 in a u8.
        if self.max_players == 0 || self.max_players > usize::from(u8::MAX) {
            return Err(ConfigError::PlayerCount(self.max_players));
        }
        let bytes = max_frame_len(self.width, self.height, self.max_players);
        if bytes > MAX_DATA_BUFFER {
            return Err(ConfigError::FrameTooLarge {
                width: self.width,
                height: self.height,
                bytes,
                limit: MAX_DATA_BUFFER,
            });
        }
        if self.tick_ms == 0 {
            return Err(ConfigError::ZeroTick);
        }
        if !self.transfer_rate.is_finite() || self.transfer_rate < 0.0 {
            return Err(ConfigError::TransferRate(self.transfer_rate));
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    pub fn respawn_delay(&self) -> Duration {
        Duration::from_millis(self.respawn_ms)
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
