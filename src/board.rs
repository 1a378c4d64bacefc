use crate::attacks::{KING_ATTACKS, KNIGHT_ATTACKS, PAWN_ATTACKS};
use crate::magics;
use crate::types::*;
use crate::zobrist::{CASTLE_KEYS, EP_KEYS, PIECE_KEYS, SIDE_KEY};
use std::cell::Cell;

// ============================================================================
// GAME STATE
// ============================================================================

/// Immutable per-ply snapshot, pushed on make and popped on unmake. Restoring
/// it is what makes unmake exact; the zobrist key is never recomputed.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct GameState {
    pub captured: Option<Piece>,
    /// 0 = no en-passant, else 1..=8 for files a..h.
    pub ep_file: u8,
    pub castling: CastleRights,
    pub fifty: u16,
    pub zobrist: u64,
}

impl GameState {
    pub const fn empty() -> Self {
        GameState {
            captured: None,
            ep_file: 0,
            castling: CastleRights::NONE,
            fifty: 0,
            zobrist: 0,
        }
    }

    /// The en-passant target square for the side about to move, if any.
    #[inline(always)]
    pub fn ep_square(&self, side_to_move: Color) -> Option<usize> {
        if self.ep_file == 0 {
            return None;
        }
        let file = (self.ep_file - 1) as usize;
        Some(match side_to_move {
            Color::White => 40 + file, // rank 6
            Color::Black => 16 + file, // rank 3
        })
    }
}

// ============================================================================
// BOARD
// ============================================================================

#[derive(Clone, Debug)]
pub struct Board {
    /// Mailbox; kept in lockstep with the bitboards and piece lists.
    pub squares: [Option<(Piece, Color)>; 64],
    /// Per-piece-type bitboards, both colors mixed (intersect with `colors`).
    pub pieces: [Bitboard; 6],
    pub colors: [Bitboard; 2],
    pub all_pieces: Bitboard,
    /// Rooks and queens per color, refreshed after every state change.
    pub orth_sliders: [Bitboard; 2],
    /// Bishops and queens per color.
    pub diag_sliders: [Bitboard; 2],
    pub king_sq: [usize; 2],
    pub piece_lists: [[PieceList; 6]; 2],
    pub side_to_move: Color,
    /// Plies played since the loaded position.
    pub ply: u32,
    /// Plies implied by the loaded FEN's fullmove counter, for FEN output.
    pub ply_offset: u32,
    pub state: GameState,
    state_stack: Vec<GameState>,
    /// Zobrist keys of every position since the last load, newest last.
    /// Only maintained outside of search.
    pub repetition_history: Vec<u64>,
    /// Moves played outside of search since the last load.
    pub move_history: Vec<Move>,
    check_cache: Cell<Option<bool>>,
}

impl Board {
    pub fn empty() -> Self {
        Board {
            squares: [None; 64],
            pieces: [Bitboard::new(); 6],
            colors: [Bitboard::new(); 2],
            all_pieces: Bitboard::new(),
            orth_sliders: [Bitboard::new(); 2],
            diag_sliders: [Bitboard::new(); 2],
            king_sq: [0; 2],
            piece_lists: std::array::from_fn(|_| std::array::from_fn(|_| PieceList::new())),
            side_to_move: Color::White,
            ply: 0,
            ply_offset: 0,
            state: GameState::empty(),
            state_stack: Vec::with_capacity(256),
            repetition_history: Vec::with_capacity(64),
            move_history: Vec::new(),
            check_cache: Cell::new(None),
        }
    }

    /// Starting position.
    pub fn new() -> Self {
        Self::from_fen("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1")
            .expect("starting FEN is valid")
    }

    // ========================================================================
    // PIECE QUERIES
    // ========================================================================

    #[inline(always)]
    pub fn piece_bb(&self, color: Color, piece: Piece) -> u64 {
        self.pieces[piece as usize].0 & self.colors[color as usize].0
    }

    #[inline(always)]
    pub fn our(&self, piece: Piece) -> Bitboard {
        Bitboard(self.piece_bb(self.side_to_move, piece))
    }

    #[inline(always)]
    pub fn their(&self, piece: Piece) -> Bitboard {
        Bitboard(self.piece_bb(self.side_to_move.flip(), piece))
    }

    #[inline(always)]
    pub fn us(&self) -> Bitboard {
        self.colors[self.side_to_move as usize]
    }

    #[inline(always)]
    pub fn them(&self) -> Bitboard {
        self.colors[self.side_to_move.flip() as usize]
    }

    #[inline(always)]
    pub const fn occupied(&self) -> Bitboard {
        self.all_pieces
    }

    #[inline(always)]
    pub fn piece_at(&self, sq: usize) -> Option<(Piece, Color)> {
        self.squares[sq]
    }

    #[inline(always)]
    pub fn zobrist(&self) -> u64 {
        self.state.zobrist
    }

    // ========================================================================
    // PIECE MANIPULATION
    // ========================================================================

    #[inline(always)]
    pub(crate) fn add_piece(&mut self, color: Color, piece: Piece, sq: usize) {
        self.pieces[piece as usize].set(sq);
        self.colors[color as usize].set(sq);
        self.squares[sq] = Some((piece, color));
        self.piece_lists[color as usize][piece as usize].add(sq);
    }

    #[inline(always)]
    pub(crate) fn remove_piece(&mut self, color: Color, piece: Piece, sq: usize) {
        self.pieces[piece as usize].clear(sq);
        self.colors[color as usize].clear(sq);
        self.squares[sq] = None;
        self.piece_lists[color as usize][piece as usize].remove(sq);
    }

    #[inline(always)]
    fn move_piece(&mut self, color: Color, piece: Piece, from: usize, to: usize) {
        self.pieces[piece as usize].clear(from);
        self.pieces[piece as usize].set(to);
        self.colors[color as usize].clear(from);
        self.colors[color as usize].set(to);
        self.squares[from] = None;
        self.squares[to] = Some((piece, color));
        self.piece_lists[color as usize][piece as usize].relocate(from, to);
    }

    /// Rebuild the aggregate and slider convenience bitboards.
    #[inline(always)]
    pub(crate) fn refresh_aggregates(&mut self) {
        self.all_pieces = self.colors[0] | self.colors[1];
        let rq = self.pieces[Piece::Rook as usize].0 | self.pieces[Piece::Queen as usize].0;
        let bq = self.pieces[Piece::Bishop as usize].0 | self.pieces[Piece::Queen as usize].0;
        self.orth_sliders[0] = Bitboard(rq & self.colors[0].0);
        self.orth_sliders[1] = Bitboard(rq & self.colors[1].0);
        self.diag_sliders[0] = Bitboard(bq & self.colors[0].0);
        self.diag_sliders[1] = Bitboard(bq & self.colors[1].0);
    }

    // ========================================================================
    // MAKE / UNMAKE
    // ========================================================================

    /// Apply `m` for the side to move. With `in_search` the game history and
    /// repetition window are left untouched so unmake restores them for free.
    pub fn make_move(&mut self, m: Move, in_search: bool) {
        let from = m.from();
        let to = m.to();
        let flag = m.flag();
        let us = self.side_to_move;
        let them = us.flip();

        let (piece, _) = self.squares[from].expect("no piece on start square");

        let mut new_state = self.state;
        new_state.captured = None;
        let mut key = self.state.zobrist;

        // Capture, including the en-passant victim one rank behind the target.
        let capture_sq = match flag {
            MoveFlag::EnPassant => match us {
                Color::White => to - 8,
                Color::Black => to + 8,
            },
            _ => to,
        };
        let captured = match flag {
            MoveFlag::EnPassant => Some(Piece::Pawn),
            _ => self.squares[to].map(|(p, _)| p),
        };
        if let Some(cap) = captured {
            self.remove_piece(them, cap, capture_sq);
            key ^= PIECE_KEYS[them as usize][cap as usize][capture_sq];
            new_state.captured = Some(cap);
        }

        self.move_piece(us, piece, from, to);
        key ^= PIECE_KEYS[us as usize][piece as usize][from]
            ^ PIECE_KEYS[us as usize][piece as usize][to];

        match flag {
            MoveFlag::Castle => {
                let (rook_from, rook_to) = castle_rook_squares(to);
                self.move_piece(us, Piece::Rook, rook_from, rook_to);
                key ^= PIECE_KEYS[us as usize][Piece::Rook as usize][rook_from]
                    ^ PIECE_KEYS[us as usize][Piece::Rook as usize][rook_to];
            }
            _ if m.is_promotion() => {
                let promo = m.promotion_piece();
                self.remove_piece(us, Piece::Pawn, to);
                self.add_piece(us, promo, to);
                key ^= PIECE_KEYS[us as usize][Piece::Pawn as usize][to]
                    ^ PIECE_KEYS[us as usize][promo as usize][to];
            }
            _ => {}
        }

        if piece == Piece::King {
            self.king_sq[us as usize] = to;
            new_state.castling.remove_color(us);
        }
        new_state.castling.remove_rook(from);
        new_state.castling.remove_rook(to);

        let new_ep = match flag {
            MoveFlag::PawnTwoUp => (file_of(from) + 1) as u8,
            _ => 0,
        };
        key ^= EP_KEYS[self.state.ep_file as usize] ^ EP_KEYS[new_ep as usize];
        new_state.ep_file = new_ep;

        if new_state.castling != self.state.castling {
            key ^= CASTLE_KEYS[self.state.castling.0 as usize]
                ^ CASTLE_KEYS[new_state.castling.0 as usize];
        }

        key ^= SIDE_KEY;

        let irreversible = piece == Piece::Pawn || captured.is_some();
        new_state.fifty = if irreversible { 0 } else { self.state.fifty + 1 };
        new_state.zobrist = key;

        self.state_stack.push(self.state);
        self.state = new_state;
        self.side_to_move = them;
        self.ply += 1;
        self.refresh_aggregates();
        self.check_cache.set(None);

        if !in_search {
            self.move_history.push(m);
            self.repetition_history.push(key);
        }
    }

    /// Exact inverse of `make_move`; the board returns bitwise-identical.
    pub fn unmake_move(&mut self, m: Move, in_search: bool) {
        let us = self.side_to_move.flip(); // side that made the move
        let them = self.side_to_move;
        let from = m.from();
        let to = m.to();
        let flag = m.flag();
        let captured = self.state.captured;

        if m.is_promotion() {
            let promo = m.promotion_piece();
            self.remove_piece(us, promo, to);
            self.add_piece(us, Piece::Pawn, to);
        }

        let (piece, _) = self.squares[to].expect("no piece on target square");
        self.move_piece(us, piece, to, from);

        if piece == Piece::King {
            self.king_sq[us as usize] = from;
        }

        if flag == MoveFlag::Castle {
            let (rook_from, rook_to) = castle_rook_squares(to);
            self.move_piece(us, Piece::Rook, rook_to, rook_from);
        }

        if let Some(cap) = captured {
            let capture_sq = match flag {
                MoveFlag::EnPassant => match us {
                    Color::White => to - 8,
                    Color::Black => to + 8,
                },
                _ => to,
            };
            self.add_piece(them, cap, capture_sq);
        }

        self.state = self.state_stack.pop().expect("unmake without matching make");
        self.side_to_move = us;
        self.ply -= 1;
        self.refresh_aggregates();
        self.check_cache.set(None);

        if !in_search {
            self.move_history.pop();
            self.repetition_history.pop();
        }
    }

    /// Flip the side to move without moving; en-passant is cleared in the new
    /// state. Must not be called while in check.
    pub fn make_null_move(&mut self) {
        debug_assert!(!self.is_in_check());
        let mut new_state = self.state;
        new_state.captured = None;
        new_state.ep_file = 0;
        new_state.zobrist ^= EP_KEYS[self.state.ep_file as usize] ^ EP_KEYS[0] ^ SIDE_KEY;

        self.state_stack.push(self.state);
        self.state = new_state;
        self.side_to_move = self.side_to_move.flip();
        self.ply += 1;
        self.check_cache.set(None);
    }

    pub fn unmake_null_move(&mut self) {
        self.state = self.state_stack.pop().expect("unmake without matching make");
        self.side_to_move = self.side_to_move.flip();
        self.ply -= 1;
        self.check_cache.set(None);
    }

    // ========================================================================
    // ATTACK QUERIES
    // ========================================================================

    #[inline(always)]
    pub fn is_square_attacked(&self, sq: usize, by: Color) -> bool {
        self.is_square_attacked_with_blockers(sq, by, self.all_pieces.0)
    }

    #[inline(always)]
    pub fn is_square_attacked_with_blockers(&self, sq: usize, by: Color, blockers: u64) -> bool {
        let attackers = self.colors[by as usize].0;

        if KNIGHT_ATTACKS[sq] & self.pieces[Piece::Knight as usize].0 & attackers != 0 {
            return true;
        }
        if KING_ATTACKS[sq] & self.pieces[Piece::King as usize].0 & attackers != 0 {
            return true;
        }
        // A pawn of `by` attacks sq iff a pawn of the other color on sq
        // would attack the pawn's square.
        if PAWN_ATTACKS[by.flip() as usize][sq] & self.pieces[Piece::Pawn as usize].0 & attackers
            != 0
        {
            return true;
        }
        if magics::bishop_attacks(sq, blockers) & self.diag_sliders[by as usize].0 != 0 {
            return true;
        }
        if magics::rook_attacks(sq, blockers) & self.orth_sliders[by as usize].0 != 0 {
            return true;
        }

        false
    }

    /// Whether the side to move is in check. Memoized until the next
    /// make/unmake.
    #[inline(always)]
    pub fn is_in_check(&self) -> bool {
        if let Some(cached) = self.check_cache.get() {
            return cached;
        }
        let king = self.king_sq[self.side_to_move as usize];
        let in_check = self.is_square_attacked(king, self.side_to_move.flip());
        self.check_cache.set(Some(in_check));
        in_check
    }

    // ========================================================================
    // ZOBRIST
    // ========================================================================

    /// Recompute the zobrist key from nothing; the incremental key must
    /// always match this.
    pub fn calculate_zobrist(&self) -> u64 {
        let mut key = 0u64;
        for sq in 0..64 {
            if let Some((piece, color)) = self.squares[sq] {
                key ^= PIECE_KEYS[color as usize][piece as usize][sq];
            }
        }
        key ^= EP_KEYS[self.state.ep_file as usize];
        key ^= CASTLE_KEYS[self.state.castling.0 as usize];
        if self.side_to_move == Color::Black {
            key ^= SIDE_KEY;
        }
        key
    }

    /// Reset derived fields after the mailbox has been populated (FEN load).
    pub(crate) fn finish_load(&mut self) {
        self.refresh_aggregates();
        self.state.zobrist = self.calculate_zobrist();
        self.state_stack.clear();
        self.move_history.clear();
        self.repetition_history.clear();
        self.repetition_history.push(self.state.zobrist);
        self.ply = 0;
        self.check_cache.set(None);
    }

    #[cfg(test)]
    pub(crate) fn assert_consistent(&self) {
        for sq in 0..64 {
            match self.squares[sq] {
                Some((piece, color)) => {
                    assert!(self.pieces[piece as usize].contains(sq));
                    assert!(self.colors[color as usize].contains(sq));
                    assert!(self.piece_lists[color as usize][piece as usize]
                        .iter()
                        .any(|s| s == sq));
                }
                None => {
                    assert!(!self.all_pieces.contains(sq));
                }
            }
        }
        for color in [Color::White, Color::Black] {
            let mut union = 0u64;
            for piece in Piece::ALL {
                union |= self.piece_bb(color, piece);
            }
            assert_eq!(union, self.colors[color as usize].0);
            assert_eq!(
                self.piece_bb(color, Piece::King),
                1u64 << self.king_sq[color as usize]
            );
        }
        assert_eq!(self.all_pieces.0, self.colors[0].0 | self.colors[1].0);
        assert_eq!(self.state.zobrist, self.calculate_zobrist());
    }
}

impl Default for Board {
    fn default() -> Self {
        Self::new()
    }
}

/// Rook relocation for a castle move, keyed by the king's target square.
#[inline(always)]
fn castle_rook_squares(king_to: usize) -> (usize, usize) {
    match king_to {
        6 => (7, 5),
        2 => (0, 3),
        62 => (63, 61),
        58 => (56, 59),
        _ => unreachable!("invalid castle target"),
    }
}

// ============================================================================
// DISPLAY
// ============================================================================

impl std::fmt::Display for Board {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for rank in (0..8).rev() {
            write!(f, "{} ", rank + 1)?;
            for file in 0..8 {
                let c = match self.squares[rank * 8 + file] {
                    Some((piece, color)) => {
                        let c = match piece {
                            Piece::Pawn => 'p',
                            Piece::Knight => 'n',
                            Piece::Bishop => 'b',
                            Piece::Rook => 'r',
                            Piece::Queen => 'q',
                            Piece::King => 'k',
                        };
                        if color == Color::White {
                            c.to_ascii_uppercase()
                        } else {
                            c
                        }
                    }
                    None => '.',
                };
                write!(f, "{} ", c)?;
            }
            writeln!(f)?;
        }
        write!(f, "  a b c d e f g h")
    }
}
