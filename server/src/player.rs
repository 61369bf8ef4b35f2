use crate::slots::Slot;
use std::fmt;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tron_shared::{Cell, Direction, PlayerRow};

/// Outbound text queued for one connection's writer task.
pub type Outbox = mpsc::Sender<String>;

/// Server-issued identity of one accepted connection. Never reused within a
/// process, so a stale handler cannot act on a seat handed to someone else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug)]
pub struct Player {
    pub connection: ConnectionId,
    /// Ledger key (peer IP address).
    pub identity: String,
    pub slot: Slot,
    pub x: i32,
    pub y: i32,
    pub direction: Direction,
    pub alive: bool,
    pub score: u32,
    pub high_score: u32,
    pub last_score_at: Instant,
    /// Set by the first tick that sees this player dead.
    pub death_recorded_at: Option<Instant>,
    pub outbox: Outbox,
}

impl Player {
    pub fn color_index(&self) -> usize {
        self.slot.color_index
    }

    pub fn player_index(&self) -> usize {
        self.slot.player_index
    }

    /// The board marker for this player's head and trail.
    pub fn marker(&self) -> Cell {
        marker_for(self.slot.color_index)
    }

    pub fn target(&self) -> (i32, i32) {
        let (dx, dy) = self.direction.delta();
        (self.x + dx, self.y + dy)
    }

    /// Applies a heading change unless it would reverse the cycle.
    /// Returns whether the heading changed.
    pub fn steer(&mut self, direction: Direction) -> bool {
        if direction == self.direction || direction == self.direction.opposite() {
            return false;
        }
        self.direction = direction;
        true
    }

    /// Credits whole elapsed seconds since the last scoring point. The
    /// fractional remainder carries over. Returns the points added.
    pub fn accrue(&mut self, now: Instant, rate: u32) -> u32 {
        let elapsed = now.saturating_duration_since(self.last_score_at).as_secs();
        if elapsed == 0 {
            return 0;
        }
        let gained = (elapsed.min(u64::from(u32::MAX)) as u32).saturating_mul(rate);
        self.score = self.score.saturating_add(gained);
        self.last_score_at += Duration::from_secs(elapsed);
        gained
    }

    pub fn to_row(&self) -> PlayerRow {
        let (dx, dy) = self.direction.delta();
        PlayerRow {
            color_index: self.slot.color_index,
            player_index: self.slot.player_index,
            score: self.score,
            high_score: self.high_score,
            alive: self.alive,
            x: self.x,
            y: self.y,
            dx,
            dy,
        }
    }
}

pub fn marker_for(color_index: usize) -> Cell {
    (color_index + 1) as Cell
}

/// Inverse of [`marker_for`]; `None` for the empty cell.
pub fn color_of(marker: Cell) -> Option<usize> {
    (marker as usize).checked_sub(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_player(direction: Direction) -> Player {
        let (outbox, _rx) = mpsc::channel(1);
        Player {
            connection: ConnectionId(1),
            identity: "127.0.0.1".to_string(),
            slot: Slot {
                player_index: 0,
                color_index: 2,
            },
            x: 5,
            y: 5,
            direction,
            alive: true,
            score: 0,
            high_score: 0,
            last_score_at: Instant::now(),
            death_recorded_at: None,
            outbox,
        }
    }

    #[test]
    fn test_marker_mapping() {
        assert_eq!(marker_for(0), 1);
        assert_eq!(color_of(1), Some(0));
        assert_eq!(color_of(0), None);
        assert_eq!(test_player(Direction::Up).marker(), 3);
    }

    #[test]
    fn test_steer_rejects_reversal() {
        let mut player = test_player(Direction::Down);
        assert!(!player.steer(Direction::Up));
        assert_eq!(player.direction, Direction::Down);
        assert!(!player.steer(Direction::Down));
        assert!(player.steer(Direction::Left));
        assert_eq!(player.direction.delta(), (-1, 0));
    }

    #[test]
    fn test_target_follows_heading() {
        let player = test_player(Direction::Right);
        assert_eq!(player.target(), (6, 5));
    }

    #[test]
    fn test_accrue_whole_seconds() {
        let mut player = test_player(Direction::Up);
        let start = player.last_score_at;

        assert_eq!(player.accrue(start + Duration::from_millis(900), 2), 0);
        assert_eq!(player.accrue(start + Duration::from_millis(2500), 2), 4);
        assert_eq!(player.score, 4);
        assert_eq!(player.last_score_at, start + Duration::from_secs(2));

        // The half second carried over completes the next second.
        assert_eq!(player.accrue(start + Duration::from_millis(3000), 2), 2);
        assert_eq!(player.score, 6);
    }

    #[test]
    fn test_row_snapshot() {
        let player = test_player(Direction::Left);
        let row = player.to_row();
        assert_eq!(row.color_index, 2);
        assert_eq!((row.dx, row.dy), (-1, 0));
        assert!(row.alive);
    }
}
