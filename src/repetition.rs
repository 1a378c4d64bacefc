use crate::board::Board;

/// Sliding window of zobrist keys used for draw detection inside search.
///
/// Each entry carries a reset index: the earliest entry still reachable
/// without crossing an irreversible move. `contains` only scans that window,
/// and reports a draw on the first repeat it finds.
pub struct RepetitionTable {
    keys: Vec<u64>,
    reset: Vec<usize>,
}

impl RepetitionTable {
    pub fn new() -> Self {
        RepetitionTable {
            keys: Vec::with_capacity(256),
            reset: Vec::with_capacity(256),
        }
    }

    /// Seed from the game history: every position since the last
    /// irreversible move, derived from the fifty-move counter.
    pub fn init(&mut self, board: &Board) {
        self.keys.clear();
        self.reset.clear();

        let window = (board.state.fifty as usize + 1).min(board.repetition_history.len());
        let start = board.repetition_history.len() - window;
        for (i, &key) in board.repetition_history[start..].iter().enumerate() {
            self.push(key, i == 0);
        }
    }

    #[inline(always)]
    pub fn push(&mut self, key: u64, is_reset: bool) {
        let reset_index = if is_reset {
            self.keys.len()
        } else {
            self.reset.last().copied().unwrap_or(0)
        };
        self.keys.push(key);
        self.reset.push(reset_index);
    }

    #[inline(always)]
    pub fn try_pop(&mut self) {
        self.keys.pop();
        self.reset.pop();
    }

    /// Scan from the top entry's reset index up to, but not including, the
    /// top itself.
    #[inline(always)]
    pub fn contains(&self, key: u64) -> bool {
        let top = match self.keys.len() {
            0 => return false,
            n => n,
        };
        let start = self.reset[top - 1];
        self.keys[start..top - 1].iter().any(|&k| k == key)
    }
}

impl Default for RepetitionTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test_repetition {
    use super::*;
    use crate::types::{Move, MoveFlag};

    #[test]
    fn test_first_repeat_is_found() {
        let mut table = RepetitionTable::new();
        table.push(100, true);
        table.push(200, false);
        table.push(100, false);
        // The top entry itself is excluded; the earlier 100 is seen.
        assert!(table.contains(100));
        assert!(table.contains(200));
        assert!(!table.contains(300));
    }

    #[test]
    fn test_reset_cuts_off_history() {
        let mut table = RepetitionTable::new();
        table.push(100, true);
        table.push(200, false);
        // A capture or pawn move makes earlier positions unreachable.
        table.push(300, true);
        table.push(400, false);
        assert!(!table.contains(100));
        assert!(!table.contains(200));
        assert!(table.contains(300));
    }

    #[test]
    fn test_pop_restores_window() {
        let mut table = RepetitionTable::new();
        table.push(100, true);
        table.push(200, true);
        table.push(300, false);
        assert!(!table.contains(100));
        table.try_pop();
        table.try_pop();
        // Back at the first entry; nothing below it to find.
        assert!(!table.contains(100));
        table.push(250, false);
        assert!(table.contains(100));
    }

    #[test]
    fn test_init_window_from_fifty_counter() {
        use crate::board::Board;
        let mut board = Board::new();
        // Four reversible knight moves return to the start position.
        let moves = [
            Move::new(6, 21, MoveFlag::Quiet),
            Move::new(62, 45, MoveFlag::Quiet),
            Move::new(21, 6, MoveFlag::Quiet),
            Move::new(45, 62, MoveFlag::Quiet),
        ];
        let start_key = board.zobrist();
        for m in moves {
            board.make_move(m, false);
        }
        assert_eq!(board.zobrist(), start_key);

        let mut table = RepetitionTable::new();
        table.init(&board);
        // The final position (top) repeats the start key pushed earlier.
        assert!(table.contains(start_key));
    }

    #[test]
    fn test_threefold_shuttle_sequence() {
        use crate::board::Board;
        let mut board = Board::new();
        let start_key = board.zobrist();
        // g1f3 g8f6 f3g1 f6g8 g1f3 g8f6 f3g1 f6g8
        let shuttle = [
            Move::new(6, 21, MoveFlag::Quiet),
            Move::new(62, 45, MoveFlag::Quiet),
            Move::new(21, 6, MoveFlag::Quiet),
            Move::new(45, 62, MoveFlag::Quiet),
        ];
        for _ in 0..2 {
            for m in shuttle {
                board.make_move(m, false);
            }
        }
        assert_eq!(board.zobrist(), start_key);

        let mut table = RepetitionTable::new();
        table.init(&board);
        assert!(table.contains(start_key));
    }
}
