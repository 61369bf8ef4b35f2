//! Types and constants shared between the arena server and its clients.
//!
//! The server is authoritative; clients only ever send single raw bytes
//! (movement keys and a heartbeat) and receive textual state frames. The
//! frame format lives in [`protocol`].

pub mod protocol;

pub use protocol::{
    max_frame_len, Assignment, Frame, FrameBuffer, PlayerRow, ProtocolError, ServerMessage,
};

/// A single board cell: `0` is empty, anything else is `color_index + 1`.
pub type Cell = u8;
pub const EMPTY_CELL: Cell = 0;

pub const BOARD_WIDTH: usize = 78;
pub const BOARD_HEIGHT: usize = 22;
pub const MAX_PLAYERS: usize = 4;

/// Radius of the neighbourhood that must be empty around a spawn cell.
pub const INIT_SPACE_CHECK: usize = 3;
pub const SPAWN_ATTEMPTS: usize = 100;

pub const SERVER_PORT: u16 = 8888;
/// Hard cap on bytes a decoder may hold while waiting for a complete frame.
pub const MAX_DATA_BUFFER: usize = 16384;

pub const TICK_MS: u64 = 300;
pub const RESPAWN_DELAY_MS: u64 = 1000;
pub const HEARTBEAT_INTERVAL_MS: u64 = 1000;
pub const CONNECTION_TIMEOUT_MS: u64 = 10_000;
pub const POLL_INTERVAL_MS: u64 = 100;

pub const SCORE_SURVIVAL_RATE: u32 = 2;
pub const SCORE_KILL_POINTS: u32 = 50;
pub const SCORE_TRANSFER_RATE: f64 = 1.0;

pub const KEY_UP: u8 = b'w';
pub const KEY_DOWN: u8 = b's';
pub const KEY_LEFT: u8 = b'a';
pub const KEY_RIGHT: u8 = b'd';
pub const HEARTBEAT: u8 = b'h';

/// Cardinal heading of a lightcycle. Screen coordinates: `y` grows downwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
    ];

    pub fn delta(self) -> (i32, i32) {
        match self {
            Direction::Up => (0, -1),
            Direction::Down => (0, 1),
            Direction::Left => (-1, 0),
            Direction::Right => (1, 0),
        }
    }

    pub fn from_delta(dx: i32, dy: i32) -> Option<Self> {
        match (dx, dy) {
            (0, -1) => Some(Direction::Up),
            (0, 1) => Some(Direction::Down),
            (-1, 0) => Some(Direction::Left),
            (1, 0) => Some(Direction::Right),
            _ => None,
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
            Direction::Left => Direction::Right,
            Direction::Right => Direction::Left,
        }
    }

    /// The key byte a client sends to request this heading.
    pub fn key(self) -> u8 {
        match self {
            Direction::Up => KEY_UP,
            Direction::Down => KEY_DOWN,
            Direction::Left => KEY_LEFT,
            Direction::Right => KEY_RIGHT,
        }
    }
}

/// Classification of one inbound client byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Heartbeat,
    Turn(Direction),
    Ignored,
}

impl Command {
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            HEARTBEAT => Command::Heartbeat,
            KEY_UP => Command::Turn(Direction::Up),
            KEY_DOWN => Command::Turn(Direction::Down),
            KEY_LEFT => Command::Turn(Direction::Left),
            KEY_RIGHT => Command::Turn(Direction::Right),
            _ => Command::Ignored,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_delta_roundtrip() {
        for dir in Direction::ALL {
            let (dx, dy) = dir.delta();
            assert_eq!(Direction::from_delta(dx, dy), Some(dir));
        }
        assert_eq!(Direction::from_delta(1, 1), None);
        assert_eq!(Direction::from_delta(0, 0), None);
    }

    #[test]
    fn test_opposite_cancels_delta() {
        for dir in Direction::ALL {
            let (dx, dy) = dir.delta();
            let (ox, oy) = dir.opposite().delta();
            assert_eq!((dx + ox, dy + oy), (0, 0));
            assert_eq!(dir.opposite().opposite(), dir);
        }
    }

    #[test]
    fn test_command_classification() {
        assert_eq!(Command::from_byte(b'h'), Command::Heartbeat);
        assert_eq!(Command::from_byte(b'w'), Command::Turn(Direction::Up));
        assert_eq!(Command::from_byte(b's'), Command::Turn(Direction::Down));
        assert_eq!(Command::from_byte(b'a'), Command::Turn(Direction::Left));
        assert_eq!(Command::from_byte(b'd'), Command::Turn(Direction::Right));
        assert_eq!(Command::from_byte(b'q'), Command::Ignored);
        assert_eq!(Command::from_byte(b'\n'), Command::Ignored);
    }

    #[test]
    fn test_key_matches_classification() {
        for dir in Direction::ALL {
            assert_eq!(Command::from_byte(dir.key()), Command::Turn(dir));
        }
    }
}
