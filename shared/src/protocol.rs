//! Line-oriented server -> client wire format
//!
//! Every tick in which something visible changed, the server pushes one
//! state frame:
//!
//! ```text
//! BEGIN
//! STATUS:1
//! PLAYERS
//! <color>:<player>,<score>,<high>,<alive>,<x>,<y>,<dx>,<dy>
//! BOARD
//! 0,0,1,0,
//! END
//! ```
//!
//! A joining connection additionally receives `INDEX:<player>,<color>` once.
//! Anything else outside a frame (for example the welcome banner) is ignored
//! by [`FrameBuffer`].

use crate::{Cell, MAX_DATA_BUFFER};
use log::{debug, warn};
use std::fmt::Write;
use thiserror::Error;

pub const FRAME_BEGIN: &str = "BEGIN";
pub const FRAME_END: &str = "END";
pub const STATUS_PREFIX: &str = "STATUS:";
pub const PLAYERS_HEADER: &str = "PLAYERS";
pub const BOARD_HEADER: &str = "BOARD";
pub const INDEX_PREFIX: &str = "INDEX:";
pub const WELCOME_LINE: &str = "Welcome to TRON!";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("frame is missing the {0} section")]
    MissingSection(&'static str),
    #[error("invalid integer {value:?} in {context}")]
    BadInteger { context: &'static str, value: String },
    #[error("malformed player row {0:?}")]
    BadPlayerRow(String),
    #[error("malformed index line {0:?}")]
    BadAssignment(String),
    #[error("unexpected line {0:?}")]
    UnexpectedLine(String),
    #[error("board row {row} has {found} cells, expected {expected}")]
    RaggedBoard {
        row: usize,
        found: usize,
        expected: usize,
    },
}

fn parse_int<T: std::str::FromStr>(context: &'static str, value: &str) -> Result<T, ProtocolError> {
    value.trim().parse().map_err(|_| ProtocolError::BadInteger {
        context,
        value: value.to_string(),
    })
}

/// One seated player as seen on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerRow {
    pub color_index: usize,
    pub player_index: usize,
    pub score: u32,
    pub high_score: u32,
    pub alive: bool,
    pub x: i32,
    pub y: i32,
    pub dx: i32,
    pub dy: i32,
}

impl PlayerRow {
    fn write_to(&self, out: &mut String) {
        let _ = writeln!(
            out,
            "{}:{},{},{},{},{},{},{},{}",
            self.color_index,
            self.player_index,
            self.score,
            self.high_score,
            u8::from(self.alive),
            self.x,
            self.y,
            self.dx,
            self.dy
        );
    }

    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let (color, rest) = line
            .split_once(':')
            .ok_or_else(|| ProtocolError::BadPlayerRow(line.to_string()))?;
        let fields: Vec<&str> = rest.split(',').collect();
        if fields.len() != 8 {
            return Err(ProtocolError::BadPlayerRow(line.to_string()));
        }

        Ok(PlayerRow {
            color_index: parse_int("color index", color)?,
            player_index: parse_int("player index", fields[0])?,
            score: parse_int("score", fields[1])?,
            high_score: parse_int("high score", fields[2])?,
            alive: parse_int::<u8>("alive flag", fields[3])? != 0,
            x: parse_int("x", fields[4])?,
            y: parse_int("y", fields[5])?,
            dx: parse_int("dx", fields[6])?,
            dy: parse_int("dy", fields[7])?,
        })
    }
}

/// A complete world snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub running: bool,
    pub players: Vec<PlayerRow>,
    /// Row-major cells, `board[y][x]`.
    pub board: Vec<Vec<Cell>>,
}

impl Frame {
    pub fn encode(&self) -> String {
        let cells: usize = self.board.iter().map(Vec::len).sum();
        let mut out = String::with_capacity(64 + self.players.len() * 32 + cells * 2);

        let _ = writeln!(out, "{}", FRAME_BEGIN);
        let _ = writeln!(out, "{}{}", STATUS_PREFIX, u8::from(self.running));
        let _ = writeln!(out, "{}", PLAYERS_HEADER);
        for player in &self.players {
            player.write_to(&mut out);
        }
        let _ = writeln!(out, "{}", BOARD_HEADER);
        for row in &self.board {
            for cell in row {
                let _ = write!(out, "{},", cell);
            }
            out.push('\n');
        }
        let _ = writeln!(out, "{}", FRAME_END);
        out
    }

    /// Decodes one complete `BEGIN ... END` block.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let lines: Vec<&str> = text.lines().map(|l| l.trim_end_matches('\r')).collect();
        let begin = lines
            .iter()
            .position(|l| *l == FRAME_BEGIN)
            .ok_or(ProtocolError::MissingSection(FRAME_BEGIN))?;
        let end = lines[begin..]
            .iter()
            .position(|l| *l == FRAME_END)
            .map(|offset| begin + offset)
            .ok_or(ProtocolError::MissingSection(FRAME_END))?;

        Self::from_body(&lines[begin + 1..end])
    }

    /// Parses the lines strictly between `BEGIN` and `END`.
    pub fn from_body<S: AsRef<str>>(body: &[S]) -> Result<Self, ProtocolError> {
        let mut lines = body
            .iter()
            .map(|l| l.as_ref())
            .filter(|l: &&str| !l.is_empty());

        let status = lines
            .next()
            .and_then(|l| l.strip_prefix(STATUS_PREFIX))
            .ok_or(ProtocolError::MissingSection(STATUS_PREFIX))?;
        let running = parse_int::<u8>("status", status)? != 0;

        match lines.next() {
            Some(PLAYERS_HEADER) => {}
            _ => return Err(ProtocolError::MissingSection(PLAYERS_HEADER)),
        }

        let mut players = Vec::new();
        let mut saw_board = false;
        for line in lines.by_ref() {
            if line == BOARD_HEADER {
                saw_board = true;
                break;
            }
            players.push(PlayerRow::parse(line)?);
        }
        if !saw_board {
            return Err(ProtocolError::MissingSection(BOARD_HEADER));
        }

        let mut board: Vec<Vec<Cell>> = Vec::new();
        for line in lines {
            let row = line
                .strip_suffix(',')
                .ok_or_else(|| ProtocolError::UnexpectedLine(line.to_string()))?;
            let cells = row
                .split(',')
                .map(|cell| parse_int::<Cell>("board cell", cell))
                .collect::<Result<Vec<_>, _>>()?;
            if let Some(first) = board.first() {
                if first.len() != cells.len() {
                    return Err(ProtocolError::RaggedBoard {
                        row: board.len(),
                        found: cells.len(),
                        expected: first.len(),
                    });
                }
            }
            board.push(cells);
        }

        Ok(Frame {
            running,
            players,
            board,
        })
    }

    pub fn width(&self) -> usize {
        self.board.first().map_or(0, Vec::len)
    }

    pub fn height(&self) -> usize {
        self.board.len()
    }

    /// Cell at `(x, y)`, or `None` outside the board.
    pub fn cell(&self, x: i32, y: i32) -> Option<Cell> {
        if x < 0 || y < 0 {
            return None;
        }
        self.board.get(y as usize)?.get(x as usize).copied()
    }

    pub fn player(&self, color_index: usize) -> Option<&PlayerRow> {
        self.players.iter().find(|p| p.color_index == color_index)
    }
}

/// Longest player row: two index fields plus the widest score, flag,
/// coordinate and delta values, nine separators included.
const PLAYER_ROW_FIXED_LEN: usize = 10 + 10 + 1 + 11 + 11 + 2 + 2 + 9;

/// Upper bound on the encoded size of a frame for a `width` x `height`
/// board with up to `max_players` seats.
pub fn max_frame_len(width: usize, height: usize, max_players: usize) -> usize {
    let digits = decimal_digits(max_players);
    // The status line also carries one digit.
    let headers = [FRAME_BEGIN, STATUS_PREFIX, PLAYERS_HEADER, BOARD_HEADER, FRAME_END]
        .iter()
        .map(|line| line.len() + 1)
        .sum::<usize>()
        + 1;
    let rows = max_players.saturating_mul(2 * digits + PLAYER_ROW_FIXED_LEN);
    let board = height.saturating_mul(width.saturating_mul(digits + 1).saturating_add(1));
    headers.saturating_add(rows).saturating_add(board)
}

fn decimal_digits(mut value: usize) -> usize {
    let mut digits = 1;
    while value >= 10 {
        value /= 10;
        digits += 1;
    }
    digits
}

/// Per-connection seat assignment, sent once right after a join.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Assignment {
    pub player_index: usize,
    pub color_index: usize,
}

impl Assignment {
    pub fn encode(&self) -> String {
        format!("{}{},{}\n", INDEX_PREFIX, self.player_index, self.color_index)
    }

    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let body = line
            .trim_end()
            .strip_prefix(INDEX_PREFIX)
            .ok_or_else(|| ProtocolError::BadAssignment(line.to_string()))?;
        let (player, color) = body
            .split_once(',')
            .ok_or_else(|| ProtocolError::BadAssignment(line.to_string()))?;

        Ok(Assignment {
            player_index: parse_int("player index", player)?,
            color_index: parse_int("color index", color)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    Assigned(Assignment),
    State(Frame),
}

/// Reassembles server messages from arbitrarily split reads.
///
/// Bytes are buffered until a full line arrives; frame lines are held until
/// the closing `END`. If the held bytes ever exceed the limit, everything is
/// discarded and decoding resumes at the next `BEGIN`.
#[derive(Debug)]
pub struct FrameBuffer {
    pending: Vec<u8>,
    frame: Option<Vec<String>>,
    frame_bytes: usize,
    limit: usize,
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new(MAX_DATA_BUFFER)
    }
}

impl FrameBuffer {
    pub fn new(limit: usize) -> Self {
        Self {
            pending: Vec::new(),
            frame: None,
            frame_bytes: 0,
            limit,
        }
    }

    /// Bytes currently held: the partial line plus any open frame.
    pub fn buffered_len(&self) -> usize {
        self.pending.len() + self.frame_bytes
    }

    pub fn clear(&mut self) {
        self.pending.clear();
        self.frame = None;
        self.frame_bytes = 0;
    }

    pub fn push(&mut self, bytes: &[u8]) -> Vec<ServerMessage> {
        self.pending.extend_from_slice(bytes);
        let mut messages = Vec::new();

        while let Some(newline) = self.pending.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=newline).collect();
            let line = String::from_utf8_lossy(&raw[..raw.len() - 1])
                .trim_end_matches('\r')
                .to_string();

            if let Some(message) = self.accept_line(line) {
                messages.push(message);
            }
            if self.frame_bytes > self.limit {
                self.discard();
            }
        }
        if self.buffered_len() > self.limit {
            self.discard();
        }

        messages
    }

    fn discard(&mut self) {
        warn!(
            "Discarding {} buffered bytes (limit {})",
            self.buffered_len(),
            self.limit
        );
        self.clear();
    }

    fn accept_line(&mut self, line: String) -> Option<ServerMessage> {
        let Some(lines) = self.frame.as_mut() else {
            if line == FRAME_BEGIN {
                self.frame = Some(Vec::new());
                self.frame_bytes = line.len() + 1;
            } else if line.starts_with(INDEX_PREFIX) {
                match Assignment::parse(&line) {
                    Ok(assignment) => return Some(ServerMessage::Assigned(assignment)),
                    Err(e) => warn!("Dropping index line: {}", e),
                }
            } else if !line.is_empty() {
                debug!("Ignoring line outside frame: {:?}", line);
            }
            return None;
        };

        if line == FRAME_END {
            let body = self.frame.take().unwrap_or_default();
            self.frame_bytes = 0;
            return match Frame::from_body(&body) {
                Ok(frame) => Some(ServerMessage::State(frame)),
                Err(e) => {
                    warn!("Dropping malformed frame: {}", e);
                    None
                }
            };
        }

        if line == FRAME_BEGIN {
            // The previous frame never finished; start over.
            lines.clear();
            self.frame_bytes = line.len() + 1;
            return None;
        }

        self.frame_bytes += line.len() + 1;
        lines.push(line);
        None
    }
}
