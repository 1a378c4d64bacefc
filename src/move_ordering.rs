use crate::board::Board;
use crate::evaluate::{self, PIECE_VALUES};
use crate::move_history::{HistoryTable, KillerSlot, KillerTable};
use crate::types::*;

// Move ordering bands, highest searched first. Quiet moves score their
// history value plus a piece-square delta, which stays well inside
// (LOSING_CAPTURE, KILLER).
const SCORE_HASH_MOVE: i32 = 1_000_000;
const SCORE_WINNING_CAPTURE: i32 = 500_000;
const SCORE_PROMOTION: i32 = 400_000;
const SCORE_KILLER_PRIMARY: i32 = 300_000;
const SCORE_KILLER_SECONDARY: i32 = 290_000;
const SCORE_LOSING_CAPTURE: i32 = -500_000;

const PAWN_ATTACK_PENALTY: i32 = 50;
const PIECE_ATTACK_PENALTY: i32 = 25;

/// Opponent attack maps computed once per node for scoring.
pub struct OrderingContext {
    pub enemy_pawn_attacks: u64,
    pub enemy_attacks: u64,
}

impl OrderingContext {
    pub fn new(board: &Board) -> Self {
        OrderingContext {
            enemy_pawn_attacks: crate::movegen::enemy_pawn_attack_map(board),
            enemy_attacks: crate::movegen::enemy_attack_map(board),
        }
    }
}

/// Score a move for ordering. Higher scores are searched first.
pub fn score_move(
    m: Move,
    board: &Board,
    tt_move: Option<Move>,
    killers: &KillerTable,
    history: &HistoryTable,
    ply: usize,
    ctx: &OrderingContext,
) -> i32 {
    // Hash move gets highest priority
    if let Some(tt_mv) = tt_move {
        if m.0 == tt_mv.0 {
            return SCORE_HASH_MOVE;
        }
    }

    let to = m.to();
    let from = m.from();
    let (piece, side) = board.piece_at(from).expect("move from empty square");

    let victim = match m.flag() {
        MoveFlag::EnPassant => Some(Piece::Pawn),
        _ => board.piece_at(to).map(|(p, _)| p),
    };

    let mut score;
    if let Some(victim) = victim {
        // MVV-LVA, demoted to the losing band when the capture loses
        // material and the opponent covers the target square.
        let delta = PIECE_VALUES[victim as usize] - PIECE_VALUES[piece as usize];
        let recapturable = (ctx.enemy_attacks >> to) & 1 != 0;
        score = if recapturable && delta < 0 {
            SCORE_LOSING_CAPTURE + delta
        } else {
            SCORE_WINNING_CAPTURE + delta
        };
    } else if let Some(slot) = killers.slot(ply, m) {
        score = match slot {
            KillerSlot::First => SCORE_KILLER_PRIMARY,
            KillerSlot::Second => SCORE_KILLER_SECONDARY,
        };
    } else {
        score = history.score(side, from, to);
        score += piece_square_delta(piece, from, to, side);
        if (ctx.enemy_pawn_attacks >> to) & 1 != 0 {
            score -= PAWN_ATTACK_PENALTY;
        } else if (ctx.enemy_attacks >> to) & 1 != 0 {
            score -= PIECE_ATTACK_PENALTY;
        }
    }

    // Only non-capture queen promotions get the promotion bonus; the other
    // promotion flags keep their plain capture or quiet score.
    if m.flag() == MoveFlag::PromoteQueen && victim.is_none() {
        score += SCORE_PROMOTION;
    }

    score
}

#[inline(always)]
fn piece_square_delta(piece: Piece, from: usize, to: usize, side: Color) -> i32 {
    let table: &[i32; 64] = match piece {
        Piece::Pawn => &evaluate::PAWN_TABLE,
        Piece::Knight => &evaluate::KNIGHT_TABLE,
        Piece::Bishop => &evaluate::BISHOP_TABLE,
        Piece::Rook => &evaluate::ROOK_TABLE,
        Piece::Queen => &evaluate::QUEEN_TABLE,
        Piece::King => &evaluate::KING_TABLE,
    };
    evaluate::pst(table, to, side) - evaluate::pst(table, from, side)
}

/// Lazy selection step: swap the highest-scored remaining move into
/// position `index`. A beta cutoff usually arrives within the first few
/// moves, so fully sorting the list up front would be wasted work.
#[inline(always)]
pub fn select_next(moves: &mut [Move], scores: &mut [i32], index: usize) {
    let top = scores
        .iter()
        .enumerate()
        .skip(index)
        .max_by_key(|&(_, &score)| score)
        .map(|(i, _)| i);

    if let Some(top) = top {
        moves.swap(index, top);
        scores.swap(index, top);
    }
}
