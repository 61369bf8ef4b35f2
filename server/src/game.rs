//! The authoritative arena.
//!
//! [`Engine`] owns the board, the roster, the seat allocator and the
//! high-score ledger. Every mutation goes through `&mut Engine`, and the
//! network layer keeps the engine behind a single mutex, so join, input,
//! tick and removal are serialized.

use crate::board::Board;
use crate::config::ServerConfig;
use crate::ledger::HighScoreLedger;
use crate::player::{color_of, marker_for, ConnectionId, Outbox, Player};
use crate::slots::{Slot, SlotAllocator};
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::mpsc::error::TrySendError;
use tron_shared::protocol::WELCOME_LINE;
use tron_shared::{Assignment, Direction, Frame, EMPTY_CELL, SPAWN_ATTEMPTS};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum JoinError {
    #[error("arena is full ({0} players)")]
    ServerFull(usize),
    #[error("no safe spawn cell found after {0} attempts")]
    NoSafeSpawn(usize),
    #[error("connection closed before the join completed")]
    Disconnected,
}

/// A seat handed to an accepted connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Seat {
    pub connection: ConnectionId,
    pub slot: Slot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeathCause {
    Wall,
    Trail { owner: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Death {
    pub victim: usize,
    pub cause: DeathCause,
    pub final_score: u32,
    /// The player credited with the kill, if any.
    pub killer: Option<usize>,
    pub transfer: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    Disconnected,
    TimedOut,
    SendFailed,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickReport {
    pub removed: Vec<ConnectionId>,
    pub deaths: Vec<Death>,
    pub respawned: Vec<usize>,
    pub broadcast: bool,
}

/// Scoring and timing knobs, lifted out of [`ServerConfig`].
#[derive(Debug, Clone)]
struct Rules {
    max_players: usize,
    respawn_delay: Duration,
    survival_rate: u32,
    kill_bonus: u32,
    transfer_rate: f64,
    spawn_radius: usize,
}

pub struct Engine {
    board: Board,
    players: BTreeMap<usize, Player>,
    slots: SlotAllocator,
    ledger: HighScoreLedger,
    rules: Rules,
    rng: StdRng,
    running: bool,
    next_connection: u64,
}

impl Engine {
    pub fn new(config: &ServerConfig, ledger: HighScoreLedger) -> Self {
        Self::with_rng(config, ledger, StdRng::from_entropy())
    }

    pub fn with_rng(config: &ServerConfig, ledger: HighScoreLedger, rng: StdRng) -> Self {
        Self {
            board: Board::new(config.width, config.height),
            players: BTreeMap::new(),
            slots: SlotAllocator::new(config.max_players),
            ledger,
            rules: Rules {
                max_players: config.max_players,
                respawn_delay: config.respawn_delay(),
                survival_rate: config.survival_rate,
                kill_bonus: config.kill_bonus,
                transfer_rate: config.transfer_rate,
                spawn_radius: config.spawn_radius,
            },
            rng,
            running: true,
            next_connection: 1,
        }
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn ledger(&self) -> &HighScoreLedger {
        &self.ledger
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn player(&self, color_index: usize) -> Option<&Player> {
        self.players.get(&color_index)
    }

    pub fn players(&self) -> impl Iterator<Item = &Player> {
        self.players.values()
    }

    pub fn is_seated(&self, connection: ConnectionId) -> bool {
        self.color_of_connection(connection).is_some()
    }

    fn color_of_connection(&self, connection: ConnectionId) -> Option<usize> {
        self.players
            .values()
            .find(|p| p.connection == connection)
            .map(Player::color_index)
    }

    /// Points the killer receives for a victim who died with `final_score`.
    pub fn kill_transfer(&self, final_score: u32) -> u32 {
        let share = (f64::from(final_score) * self.rules.transfer_rate).floor();
        self.rules
            .kill_bonus
            .saturating_add(share.min(f64::from(u32::MAX)) as u32)
    }

    pub fn snapshot(&self) -> Frame {
        Frame {
            running: self.running,
            players: self.players.values().map(Player::to_row).collect(),
            board: self.board.to_rows(),
        }
    }

    /// Samples interior cells until one has an empty neighbourhood.
    pub fn find_safe_spawn(&mut self) -> Option<(i32, i32)> {
        let radius = self.rules.spawn_radius;
        let (width, height) = (self.board.width(), self.board.height());
        if width < radius * 2 + 1 || height < radius * 2 + 1 {
            return None;
        }

        for _ in 0..SPAWN_ATTEMPTS {
            let x = self.rng.gen_range(radius..width - radius) as i32;
            let y = self.rng.gen_range(radius..height - radius) as i32;
            if self.board.is_area_empty(x, y, radius) {
                return Some((x, y));
            }
        }
        None
    }

    fn random_direction(&mut self) -> Direction {
        Direction::ALL[self.rng.gen_range(0..Direction::ALL.len())]
    }

    /// Seats a new connection: assignment line, welcome banner and a full
    /// frame are queued on `outbox` before this returns.
    pub fn join(
        &mut self,
        identity: &str,
        outbox: Outbox,
        now: Instant,
    ) -> Result<Seat, JoinError> {
        if self.players.len() >= self.rules.max_players {
            return Err(JoinError::ServerFull(self.players.len()));
        }
        let slot = self
            .slots
            .allocate()
            .ok_or(JoinError::ServerFull(self.players.len()))?;

        let Some((x, y)) = self.find_safe_spawn() else {
            self.slots.release(slot);
            warn!("No safe spawn for {}, join deferred", identity);
            return Err(JoinError::NoSafeSpawn(SPAWN_ATTEMPTS));
        };
        let direction = self.random_direction();

        self.ledger.register(identity);
        let connection = ConnectionId(self.next_connection);
        self.next_connection += 1;

        let player = Player {
            connection,
            identity: identity.to_string(),
            slot,
            x,
            y,
            direction,
            alive: true,
            score: 0,
            high_score: self.ledger.get(identity),
            last_score_at: now,
            death_recorded_at: None,
            outbox,
        };
        self.board.set(x, y, player.marker());
        self.players.insert(slot.color_index, player);

        let assignment = Assignment {
            player_index: slot.player_index,
            color_index: slot.color_index,
        };
        let greeting = [
            assignment.encode(),
            format!("{}\n", WELCOME_LINE),
            self.snapshot().encode(),
        ];
        let delivered = match self.players.get(&slot.color_index) {
            Some(player) => greeting.into_iter().all(|text| deliver(player, text)),
            None => false,
        };
        if !delivered {
            self.remove_seat(slot.color_index, Removal::SendFailed);
            return Err(JoinError::Disconnected);
        }

        info!(
            "Player {} joined as color {} from {} ({}) at ({}, {})",
            slot.player_index + 1,
            slot.color_index,
            identity,
            connection,
            x,
            y
        );
        Ok(Seat { connection, slot })
    }

    /// Removes a connection's seat and tells everyone else. Returns every
    /// connection that lost its seat, empty if `connection` was not seated.
    pub fn leave(&mut self, connection: ConnectionId, reason: Removal) -> Vec<ConnectionId> {
        let Some(color) = self.color_of_connection(connection) else {
            return Vec::new();
        };
        let mut removed = vec![connection];
        self.remove_seat(color, reason);
        removed.extend(self.broadcast());
        removed
    }

    /// Requests a heading change. Unknown, dead or reversing requests are
    /// ignored.
    pub fn steer(&mut self, connection: ConnectionId, direction: Direction) -> bool {
        let Some(color) = self.color_of_connection(connection) else {
            return false;
        };
        match self.players.get_mut(&color) {
            Some(player) if player.alive => {
                let changed = player.steer(direction);
                if changed {
                    debug!("Player {} now heading {:?}", player.player_index() + 1, direction);
                }
                changed
            }
            _ => false,
        }
    }

    /// One simulation step: outbox check, score, move, respawn, broadcast.
    pub fn tick(&mut self, now: Instant) -> TickReport {
        let mut report = TickReport::default();
        let mut changed = false;

        let closed: Vec<usize> = self
            .players
            .values()
            .filter(|p| p.outbox.is_closed())
            .map(Player::color_index)
            .collect();
        for color in closed {
            if let Some(player) = self.remove_seat(color, Removal::SendFailed) {
                report.removed.push(player.connection);
                changed = true;
            }
        }

        let rate = self.rules.survival_rate;
        for player in self.players.values_mut().filter(|p| p.alive) {
            if player.accrue(now, rate) > 0 {
                changed = true;
            }
        }

        let colors: Vec<usize> = self.players.keys().copied().collect();
        for color in colors {
            if let Some(death) = self.advance(color, now, &mut report) {
                report.deaths.push(death);
                changed = true;
            } else if self.players.get(&color).map_or(false, |p| p.alive) {
                changed = true;
            }
        }

        let delay = self.rules.respawn_delay;
        let colors: Vec<usize> = self.players.keys().copied().collect();
        for color in colors {
            let due = match self.players.get_mut(&color) {
                Some(player) if !player.alive => match player.death_recorded_at {
                    None => {
                        player.death_recorded_at = Some(now);
                        false
                    }
                    Some(at) => now.saturating_duration_since(at) >= delay,
                },
                _ => false,
            };
            if due && self.respawn(color, now) {
                report.respawned.push(color);
                changed = true;
            }
        }

        if changed {
            report.removed.extend(self.broadcast());
            report.broadcast = true;
        }
        report
    }

    /// Moves one alive player a single cell, resolving collisions.
    fn advance(&mut self, color: usize, now: Instant, report: &mut TickReport) -> Option<Death> {
        let player = self.players.get(&color).filter(|p| p.alive)?;
        let (x, y) = (player.x, player.y);
        let (tx, ty) = player.target();
        let marker = player.marker();

        let cause = match self.board.get(tx, ty) {
            None => Some(DeathCause::Wall),
            Some(EMPTY_CELL) => None,
            // Re-entering one's own trail is survivable.
            Some(cell) if cell == marker => None,
            Some(cell) => color_of(cell).map(|owner| DeathCause::Trail { owner }),
        };

        self.board.set(x, y, marker);

        match cause {
            Some(cause) => {
                let death = self.kill(color, cause, now);
                report.removed.extend(self.broadcast());
                death
            }
            None => {
                if let Some(player) = self.players.get_mut(&color) {
                    player.x = tx;
                    player.y = ty;
                }
                self.board.set(tx, ty, marker);
                debug!("Color {} moved to ({}, {})", color, tx, ty);
                None
            }
        }
    }

    fn kill(&mut self, color: usize, cause: DeathCause, now: Instant) -> Option<Death> {
        let rate = self.rules.survival_rate;
        let victim = self.players.get_mut(&color)?;

        victim.accrue(now, rate);
        let final_score = victim.score;
        if final_score > victim.high_score {
            victim.high_score = final_score;
            if self.ledger.record(&victim.identity, final_score) {
                self.ledger.persist();
            }
        }

        victim.alive = false;
        victim.score = 0;
        victim.last_score_at = now;
        victim.death_recorded_at = None;
        let victim_index = victim.player_index();
        self.board.clear_marker(marker_for(color));

        let transfer = self.kill_transfer(final_score);
        let killer = match cause {
            DeathCause::Trail { owner } if owner != color => self
                .players
                .get_mut(&owner)
                .filter(|k| k.alive)
                .map(|k| {
                    k.score = k.score.saturating_add(transfer);
                    k.player_index()
                })
                .map(|killer_index| (owner, killer_index)),
            _ => None,
        };

        match killer {
            Some((_, killer_index)) => info!(
                "Player {} killed player {} (+{} = {} + {} of {})",
                killer_index + 1,
                victim_index + 1,
                transfer,
                self.rules.kill_bonus,
                transfer - self.rules.kill_bonus,
                final_score
            ),
            None => info!(
                "Player {} died ({:?}) with score {}",
                victim_index + 1,
                cause,
                final_score
            ),
        }

        Some(Death {
            victim: color,
            cause,
            final_score,
            killer: killer.map(|(owner, _)| owner),
            transfer: if killer.is_some() { transfer } else { 0 },
        })
    }

    fn respawn(&mut self, color: usize, now: Instant) -> bool {
        let Some((x, y)) = self.find_safe_spawn() else {
            warn!("No safe spawn for color {}, retrying next tick", color);
            return false;
        };
        let direction = self.random_direction();
        let marker = marker_for(color);
        self.board.clear_marker(marker);

        let Some(player) = self.players.get_mut(&color) else {
            return false;
        };
        player.x = x;
        player.y = y;
        player.direction = direction;
        player.score = 0;
        player.alive = true;
        player.last_score_at = now;
        player.death_recorded_at = None;
        self.board.set(x, y, marker);

        info!(
            "Player {} respawned at ({}, {})",
            player.player_index() + 1,
            x,
            y
        );
        true
    }

    fn remove_seat(&mut self, color: usize, reason: Removal) -> Option<Player> {
        let player = self.players.remove(&color)?;
        self.slots.release(player.slot);

        self.ledger.record(&player.identity, player.score);
        self.ledger.persist();

        self.board.clear_marker(player.marker());
        info!(
            "Player {} ({}) removed: {:?}",
            player.player_index() + 1,
            player.connection,
            reason
        );
        Some(player)
    }

    /// Pushes the current frame to every seat, evicting any whose outbox is
    /// closed or full and re-sending until a pass completes cleanly.
    fn broadcast(&mut self) -> Vec<ConnectionId> {
        let mut evicted = Vec::new();
        loop {
            let text = self.snapshot().encode();
            let failed: Vec<usize> = self
                .players
                .values()
                .filter(|p| !deliver(p, text.clone()))
                .map(Player::color_index)
                .collect();
            if failed.is_empty() {
                return evicted;
            }
            for color in failed {
                if let Some(player) = self.remove_seat(color, Removal::SendFailed) {
                    evicted.push(player.connection);
                }
            }
        }
    }
}

fn deliver(player: &Player, text: String) -> bool {
    match player.outbox.try_send(text) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => {
            warn!("Outbox full for {}, evicting", player.connection);
            false
        }
        Err(TrySendError::Closed(_)) => {
            debug!("Outbox closed for {}", player.connection);
            false
        }
    }
}
