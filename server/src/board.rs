use tron_shared::{Cell, EMPTY_CELL};

/// Fixed-size occupancy grid. Cells hold `color_index + 1` or `EMPTY_CELL`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Board {
    width: usize,
    height: usize,
    cells: Vec<Cell>,
}

impl Board {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            cells: vec![EMPTY_CELL; width * height],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn in_bounds(&self, x: i32, y: i32) -> bool {
        x >= 0 && y >= 0 && (x as usize) < self.width && (y as usize) < self.height
    }

    fn offset(&self, x: i32, y: i32) -> Option<usize> {
        self.in_bounds(x, y)
            .then(|| y as usize * self.width + x as usize)
    }

    /// Returns `None` outside the board.
    pub fn get(&self, x: i32, y: i32) -> Option<Cell> {
        self.offset(x, y).map(|i| self.cells[i])
    }

    /// Writes a cell; out-of-bounds writes are ignored.
    pub fn set(&mut self, x: i32, y: i32, cell: Cell) {
        if let Some(i) = self.offset(x, y) {
            self.cells[i] = cell;
        }
    }

    /// Erases every cell bearing `marker`. Returns how many were cleared.
    pub fn clear_marker(&mut self, marker: Cell) -> usize {
        let mut cleared = 0;
        for cell in self.cells.iter_mut().filter(|c| **c == marker) {
            *cell = EMPTY_CELL;
            cleared += 1;
        }
        cleared
    }

    pub fn count_marker(&self, marker: Cell) -> usize {
        self.cells.iter().filter(|c| **c == marker).count()
    }

    /// True when every in-bounds cell within `radius` (Chebyshev) of
    /// `(x, y)`, the centre included, is empty.
    pub fn is_area_empty(&self, x: i32, y: i32, radius: usize) -> bool {
        let r = radius as i32;
        (-r..=r).all(|oy| {
            (-r..=r).all(|ox| self.get(x + ox, y + oy).map_or(true, |c| c == EMPTY_CELL))
        })
    }

    pub fn rows(&self) -> impl Iterator<Item = &[Cell]> {
        self.cells.chunks(self.width.max(1))
    }

    pub fn to_rows(&self) -> Vec<Vec<Cell>> {
        self.rows().map(<[Cell]>::to_vec).collect()
    }

    /// Every distinct non-empty marker currently on the board.
    pub fn markers(&self) -> Vec<Cell> {
        let mut seen: Vec<Cell> = self
            .cells
            .iter()
            .copied()
            .filter(|c| *c != EMPTY_CELL)
            .collect();
        seen.sort_unstable();
        seen.dedup();
        seen
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_board_is_empty() {
        let board = Board::new(5, 3);
        assert_eq!(board.width(), 5);
        assert_eq!(board.height(), 3);
        assert!(board.markers().is_empty());
        assert_eq!(board.to_rows(), vec![vec![0; 5]; 3]);
    }

    #[test]
    fn test_bounds() {
        let board = Board::new(5, 3);
        assert!(board.in_bounds(0, 0));
        assert!(board.in_bounds(4, 2));
        assert!(!board.in_bounds(5, 0));
        assert!(!board.in_bounds(0, 3));
        assert!(!board.in_bounds(-1, 0));
        assert_eq!(board.get(-1, 0), None);
        assert_eq!(board.get(2, 1), Some(EMPTY_CELL));
    }

    #[test]
    fn test_set_and_clear_marker() {
        let mut board = Board::new(4, 4);
        board.set(0, 0, 1);
        board.set(1, 0, 1);
        board.set(2, 2, 2);
        board.set(9, 9, 1);

        assert_eq!(board.count_marker(1), 2);
        assert_eq!(board.markers(), vec![1, 2]);
        assert_eq!(board.clear_marker(1), 2);
        assert_eq!(board.count_marker(1), 0);
        assert_eq!(board.get(2, 2), Some(2));
    }

    #[test]
    fn test_row_major_layout() {
        let mut board = Board::new(3, 2);
        board.set(2, 1, 4);
        let rows = board.to_rows();
        assert_eq!(rows[1][2], 4);
        assert_eq!(rows[0], vec![0, 0, 0]);
    }

    #[test]
    fn test_area_empty() {
        let mut board = Board::new(10, 10);
        assert!(board.is_area_empty(5, 5, 3));

        board.set(8, 8, 1);
        assert!(!board.is_area_empty(5, 5, 3));
        assert!(board.is_area_empty(4, 4, 3));

        // Cells off the board do not count as occupied.
        assert!(board.is_area_empty(0, 0, 2));
    }
}
