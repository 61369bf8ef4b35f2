use log::{debug, info};
use tron_shared::{Assignment, Direction, Frame, PlayerRow, ServerMessage, EMPTY_CELL};

/// What the client knows about the arena: its own seat and the latest frame.
#[derive(Debug, Clone, Default)]
pub struct ClientGameState {
    pub assignment: Option<Assignment>,
    pub frame: Option<Frame>,
    pub frames_received: usize,
}

impl ClientGameState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, message: ServerMessage) {
        match message {
            ServerMessage::Assigned(assignment) => {
                info!(
                    "Seated as player {} (color {})",
                    assignment.player_index + 1,
                    assignment.color_index
                );
                self.assignment = Some(assignment);
            }
            ServerMessage::State(frame) => {
                self.frames_received += 1;
                self.frame = Some(frame);
            }
        }
    }

    /// This client's row in the latest frame.
    pub fn me(&self) -> Option<&PlayerRow> {
        let color = self.assignment?.color_index;
        self.frame.as_ref()?.player(color)
    }

    /// One-line description of the latest frame.
    pub fn summary(&self) -> String {
        let Some(frame) = &self.frame else {
            return "no frame yet".to_string();
        };
        let scores: Vec<String> = frame
            .players
            .iter()
            .map(|p| {
                format!(
                    "P{}:{}{}",
                    p.player_index + 1,
                    p.score,
                    if p.alive { "" } else { "(dead)" }
                )
            })
            .collect();

        match self.me() {
            Some(me) => format!(
                "frame {} at ({}, {}) score {} best {} | {}",
                self.frames_received,
                me.x,
                me.y,
                me.score,
                me.high_score,
                scores.join(" ")
            ),
            None => format!("frame {} | {}", self.frames_received, scores.join(" ")),
        }
    }

    /// Autopilot: keep going while the next cell is free, otherwise pick the
    /// first perpendicular heading that is. `None` means no turn is needed
    /// or none would help.
    pub fn choose_turn(&self) -> Option<Direction> {
        let frame = self.frame.as_ref()?;
        let me = self.me().filter(|me| me.alive)?;
        let heading = Direction::from_delta(me.dx, me.dy)?;

        let is_free = |direction: Direction| {
            let (dx, dy) = direction.delta();
            frame.cell(me.x + dx, me.y + dy) == Some(EMPTY_CELL)
        };

        if is_free(heading) {
            return None;
        }
        let turn = Direction::ALL
            .into_iter()
            .filter(|d| *d != heading && *d != heading.opposite())
            .find(|d| is_free(*d));
        debug!("Blocked heading {:?}, turning {:?}", heading, turn);
        turn
    }
}
