//! Persistent best-score table.
//!
//! One `<identity> <score>` record per line; the whole file is rewritten on
//! every change. Identities are peer IP addresses, so distinct sessions from
//! one host share a record.

use log::{info, warn};
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

#[derive(Debug, Default)]
pub struct HighScoreLedger {
    path: Option<PathBuf>,
    scores: BTreeMap<String, u32>,
}

impl HighScoreLedger {
    /// A ledger that never touches disk.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Loads the file at `path`. A missing file yields an empty ledger;
    /// malformed lines are skipped.
    pub fn load(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e),
        };

        let scores = Self::parse(&contents);
        info!(
            "Loaded {} high score records from {}",
            scores.len(),
            path.display()
        );

        Ok(Self {
            path: Some(path),
            scores,
        })
    }

    fn parse(contents: &str) -> BTreeMap<String, u32> {
        let mut scores = BTreeMap::new();
        for (number, line) in contents.lines().enumerate() {
            let mut fields = line.split_whitespace();
            let parsed = match (fields.next(), fields.next()) {
                (Some(identity), Some(score)) => {
                    score.parse::<u32>().ok().map(|s| (identity, s))
                }
                (None, _) => continue,
                _ => None,
            };

            match parsed {
                Some((identity, score)) => {
                    let best = scores.entry(identity.to_string()).or_insert(0);
                    *best = (*best).max(score);
                }
                None => warn!("Skipping malformed high score line {}: {:?}", number + 1, line),
            }
        }
        scores
    }

    pub fn get(&self, identity: &str) -> u32 {
        self.scores.get(identity).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    /// Makes sure `identity` has a record, starting at zero.
    pub fn register(&mut self, identity: &str) {
        self.scores.entry(identity.to_string()).or_insert(0);
    }

    /// Raises the stored best for `identity` to `score`. Never lowers it.
    /// Returns whether the record changed.
    pub fn record(&mut self, identity: &str, score: u32) -> bool {
        let best = self.scores.entry(identity.to_string()).or_insert(0);
        if score > *best {
            *best = score;
            true
        } else {
            false
        }
    }

    pub fn to_text(&self) -> String {
        self.scores
            .iter()
            .map(|(identity, score)| format!("{} {}\n", identity, score))
            .collect()
    }

    /// Rewrites the backing file. In-memory ledgers succeed trivially.
    pub fn flush(&self) -> io::Result<()> {
        match &self.path {
            Some(path) => fs::write(path, self.to_text()),
            None => Ok(()),
        }
    }

    /// Flushes and logs instead of failing; gameplay never stops on ledger I/O.
    pub fn persist(&self) {
        if let Err(e) = self.flush() {
            warn!("Failed to save high scores: {}", e);
        }
    }
}
