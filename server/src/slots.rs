//! Seat allocation.
//!
//! A seat is a `(player_index, color_index)` pair. Both halves are handed out
//! smallest-free-first so assignments are dense and deterministic, and both
//! are returned together when the seat is vacated.

use log::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Slot {
    pub player_index: usize,
    pub color_index: usize,
}

#[derive(Debug)]
pub struct SlotAllocator {
    players: Vec<bool>,
    colors: Vec<bool>,
}

impl SlotAllocator {
    pub fn new(capacity: usize) -> Self {
        Self {
            players: vec![false; capacity],
            colors: vec![false; capacity],
        }
    }

    pub fn in_use(&self) -> usize {
        self.colors.iter().filter(|used| **used).count()
    }

    /// Claims the smallest free index in each dimension, or `None` when full.
    pub fn allocate(&mut self) -> Option<Slot> {
        let player_index = self.players.iter().position(|used| !used)?;
        let color_index = self.colors.iter().position(|used| !used)?;

        self.players[player_index] = true;
        self.colors[color_index] = true;
        debug!(
            "Allocated slot player={} color={}",
            player_index, color_index
        );

        Some(Slot {
            player_index,
            color_index,
        })
    }

    /// Frees a seat. Returns false if either half was already free.
    pub fn release(&mut self, slot: Slot) -> bool {
        let player = self.players.get_mut(slot.player_index);
        let color = self.colors.get_mut(slot.color_index);

        match (player, color) {
            (Some(player), Some(color)) if *player && *color => {
                *player = false;
                *color = false;
                debug!(
                    "Released slot player={} color={}",
                    slot.player_index, slot.color_index
                );
                true
            }
            _ => false,
        }
    }

    pub fn is_color_used(&self, color_index: usize) -> bool {
        self.colors.get(color_index).copied().unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocates_smallest_free() {
        let mut slots = SlotAllocator::new(3);
        let a = slots.allocate().unwrap();
        let b = slots.allocate().unwrap();
        assert_eq!((a.player_index, a.color_index), (0, 0));
        assert_eq!((b.player_index, b.color_index), (1, 1));
        assert_eq!(slots.in_use(), 2);
    }

    #[test]
    fn test_exhaustion() {
        let mut slots = SlotAllocator::new(2);
        assert!(slots.allocate().is_some());
        assert!(slots.allocate().is_some());
        assert!(slots.allocate().is_none());
        assert_eq!(slots.in_use(), 2);
    }

    #[test]
    fn test_release_reuses_hole() {
        let mut slots = SlotAllocator::new(3);
        let a = slots.allocate().unwrap();
        let _b = slots.allocate().unwrap();
        let _c = slots.allocate().unwrap();

        assert!(slots.release(a));
        assert!(!slots.is_color_used(0));

        let d = slots.allocate().unwrap();
        assert_eq!(d, a);
    }

    #[test]
    fn test_release_is_once_only() {
        let mut slots = SlotAllocator::new(2);
        let a = slots.allocate().unwrap();
        assert!(slots.release(a));
        assert!(!slots.release(a));
        assert!(!slots.release(Slot {
            player_index: 7,
            color_index: 7
        }));
        assert_eq!(slots.in_use(), 0);
    }
}
