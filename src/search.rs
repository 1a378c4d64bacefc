use crate::board::Board;
use crate::evaluate::evaluate;
use crate::move_history::{HistoryTable, KillerTable};
use crate::move_ordering::{score_move, select_next, OrderingContext};
use crate::movegen;
use crate::repetition::RepetitionTable;
use crate::time_control::TimeControl;
use crate::tpt::{TranspositionTable, EXACT, LOOKUP_FAILED, LOWER_BOUND, UPPER_BOUND};
use crate::types::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

pub const INFINITY: i32 = 1_000_000;
pub const MATE: i32 = 100_000;
pub const MAX_DEPTH: u8 = 255;

const MAX_EXTENSIONS: u8 = 16;
const MAX_MOVES: usize = 256;
const INFO_INTERVAL: Duration = Duration::from_millis(100);

/// Scores beyond this are mate-in-k encodings, not centipawns.
#[inline(always)]
pub fn is_mate_score(score: i32) -> bool {
    score.abs() >= MATE - 1000
}

/// Plies until mate implied by a mate score.
#[inline(always)]
pub fn mate_distance_plies(score: i32) -> i32 {
    MATE - score.abs()
}

/// Signed full moves until mate, the way UCI reports it.
pub fn mate_in_moves(score: i32) -> i32 {
    let moves = (mate_distance_plies(score) + 1) / 2;
    if score > 0 {
        moves
    } else {
        -moves
    }
}

// ============================================================================
// SEARCH TYPES
// ============================================================================

pub struct SearchLimits {
    pub time: TimeControl,
    pub max_depth: u8,
}

impl SearchLimits {
    pub fn movetime(ms: u64) -> Self {
        SearchLimits {
            time: TimeControl::new(ms),
            max_depth: MAX_DEPTH,
        }
    }

    pub fn infinite() -> Self {
        SearchLimits {
            time: TimeControl::infinite(),
            max_depth: MAX_DEPTH,
        }
    }

    pub fn depth(depth: u8) -> Self {
        SearchLimits {
            time: TimeControl::infinite(),
            max_depth: depth,
        }
    }
}

/// Payload for one `info` line.
pub struct SearchInfo {
    pub depth: u8,
    pub seldepth: u8,
    pub time_ms: u64,
    pub nodes: u64,
    pub nps: u64,
    pub score: i32,
    pub hashfull: usize,
    pub pv: Vec<Move>,
}

pub struct SearchResult {
    pub best_move: Move,
    pub ponder: Option<Move>,
    pub score: i32,
    pub depth: u8,
    pub nodes: u64,
}

// ============================================================================
// SEARCHER
// ============================================================================

pub struct Searcher {
    killers: KillerTable,
    history: HistoryTable,
    repetition: RepetitionTable,
    nodes: u64,
    seldepth: usize,
    /// Previous iteration's best move, ordered first at the root.
    root_hash_move: Move,
    best_move_this_iteration: Move,
    best_eval_this_iteration: i32,
    root_moves_completed: usize,
}

impl Searcher {
    pub fn new() -> Self {
        Searcher {
            killers: KillerTable::new(),
            history: HistoryTable::new(),
            repetition: RepetitionTable::new(),
            nodes: 0,
            seldepth: 0,
            root_hash_move: Move::NULL,
            best_move_this_iteration: Move::NULL,
            best_eval_this_iteration: -INFINITY,
            root_moves_completed: 0,
        }
    }

    /// Forget everything learned; used on `ucinewgame`.
    pub fn clear(&mut self) {
        self.killers.clear();
        self.history.clear();
    }

    /// Iterative-deepening driver. Returns `None` only when the position has
    /// no legal moves at all; cancellation always yields the best result of
    /// the last iteration that completed at least one root move.
    pub fn search(
        &mut self,
        board: &mut Board,
        tt: &mut TranspositionTable,
        limits: &SearchLimits,
        stop: &AtomicBool,
        mut on_info: impl FnMut(&SearchInfo),
    ) -> Option<SearchResult> {
        // History restarts each search; killers carry over.
        self.history.clear();
        self.repetition.init(board);
        self.nodes = 0;
        self.seldepth = 0;
        self.root_hash_move = Move::NULL;

        let mut best_move = Move::NULL;
        let mut best_eval = 0;
        let mut best_depth = 0u8;
        let mut last_info = Instant::now();

        for depth in 1..=limits.max_depth {
            self.best_move_this_iteration = Move::NULL;
            self.best_eval_this_iteration = -INFINITY;
            self.root_moves_completed = 0;

            self.alpha_beta(board, tt, depth as i32, 0, -INFINITY, INFINITY, 0, limits, stop);

            let cancelled = stop.load(Ordering::Relaxed) || limits.time.should_stop();
            if cancelled {
                // A partial iteration still counts if one root move finished.
                if self.root_moves_completed > 0 && !self.best_move_this_iteration.is_null() {
                    best_move = self.best_move_this_iteration;
                    best_eval = self.best_eval_this_iteration;
                    best_depth = depth;
                }
                break;
            }

            best_move = self.best_move_this_iteration;
            best_eval = self.best_eval_this_iteration;
            best_depth = depth;
            self.root_hash_move = best_move;

            if last_info.elapsed() >= INFO_INTERVAL {
                on_info(&self.build_info(board, tt, depth, best_eval, limits));
                last_info = Instant::now();
            }

            // A proven mate within this horizon cannot be improved.
            if is_mate_score(best_eval) && mate_distance_plies(best_eval) <= depth as i32 {
                break;
            }
        }

        if best_move.is_null() {
            // Cancelled before depth 1 finished a single move: fall back to
            // any legal move so a started go always answers.
            let mut collector = MoveCollector::new();
            movegen::generate_moves(board, &mut collector, false);
            if collector.is_empty() {
                return None;
            }
            best_move = collector.get(0);
        }

        // Always report the final state of the search.
        let final_info = self.build_info(board, tt, best_depth.max(1), best_eval, limits);
        let ponder = final_info.pv.get(1).copied();
        on_info(&final_info);

        Some(SearchResult {
            best_move,
            ponder,
            score: best_eval,
            depth: best_depth,
            nodes: self.nodes,
        })
    }

    fn build_info(
        &self,
        board: &mut Board,
        tt: &TranspositionTable,
        depth: u8,
        score: i32,
        limits: &SearchLimits,
    ) -> SearchInfo {
        let time_ms = limits.time.elapsed_ms();
        let nps = if time_ms > 0 {
            self.nodes * 1000 / time_ms
        } else {
            0
        };
        SearchInfo {
            depth,
            seldepth: self.seldepth.min(255) as u8,
            time_ms,
            nodes: self.nodes,
            nps,
            score,
            hashfull: tt.hashfull(),
            pv: extract_pv(board, tt, depth as usize),
        }
    }

    // ========================================================================
    // ALPHA-BETA
    // ========================================================================

    #[allow(clippy::too_many_arguments)]
    fn alpha_beta(
        &mut self,
        board: &mut Board,
        tt: &mut TranspositionTable,
        depth: i32,
        ply: usize,
        mut alpha: i32,
        mut beta: i32,
        extensions: u8,
        limits: &SearchLimits,
        stop: &AtomicBool,
    ) -> i32 {
        if stop.load(Ordering::Relaxed) {
            return 0;
        }
        if self.nodes & 2047 == 0 && limits.time.should_stop() {
            stop.store(true, Ordering::Relaxed);
            return 0;
        }
        self.seldepth = self.seldepth.max(ply);

        if ply > 0 {
            if board.state.fifty >= 100 || self.repetition.contains(board.zobrist()) {
                return 0;
            }

            // Mate-distance pruning: a shorter mate is already known, so
            // clamp the window and bail when it empties.
            alpha = alpha.max(-MATE + ply as i32);
            beta = beta.min(MATE - ply as i32);
            if alpha >= beta {
                return alpha;
            }
        }

        let hash = board.zobrist();
        let tt_score = tt.lookup(hash, depth.max(0) as u8, ply, alpha, beta);
        if tt_score != LOOKUP_FAILED {
            if ply == 0 {
                if let Some(mv) = tt.probe_move(hash) {
                    self.best_move_this_iteration = mv;
                    self.best_eval_this_iteration = tt_score;
                    self.root_moves_completed += 1;
                    return tt_score;
                }
            } else {
                return tt_score;
            }
        }

        if depth <= 0 {
            return self.quiescence(board, alpha, beta, ply, stop);
        }

        let mut collector = MoveCollector::new();
        movegen::generate_moves(board, &mut collector, false);
        let moves = collector.as_slice();

        if moves.is_empty() {
            return if board.is_in_check() {
                -(MATE - ply as i32)
            } else {
                0
            };
        }

        // Root nodes order the previous iteration's best first; interior
        // nodes use the table move.
        let tt_move = if ply == 0 && !self.root_hash_move.is_null() {
            Some(self.root_hash_move)
        } else {
            tt.probe_move(hash)
        };

        let ctx = OrderingContext::new(board);
        let move_count = moves.len();
        let mut move_list = [Move::NULL; MAX_MOVES];
        let mut scores = [0i32; MAX_MOVES];
        for i in 0..move_count {
            move_list[i] = moves[i];
            scores[i] = score_move(
                moves[i],
                board,
                tt_move,
                &self.killers,
                &self.history,
                ply,
                &ctx,
            );
        }

        // This position enters the repetition window before its children are
        // searched; reset when the move into it was irreversible.
        self.repetition.push(hash, board.state.fifty == 0);

        let side = board.side_to_move;
        let mut bound = UPPER_BOUND;
        let mut best_move_in_position = Move::NULL;

        for i in 0..move_count {
            select_next(&mut move_list[..move_count], &mut scores[..move_count], i);
            let mv = move_list[i];
            let is_capture =
                board.piece_at(mv.to()).is_some() || mv.flag() == MoveFlag::EnPassant;
            let moved_pawn = board.piece_at(mv.from()).map(|(p, _)| p) == Some(Piece::Pawn);

            board.make_move(mv, true);
            self.nodes += 1;

            // Extend checks and pawns one step from promotion, within a
            // fixed budget per root-to-leaf path.
            let mut extension = 0u8;
            if extensions < MAX_EXTENSIONS {
                let target_rank = rank_of(mv.to());
                if board.is_in_check() {
                    extension = 1;
                } else if moved_pawn && (target_rank == 1 || target_rank == 6) {
                    extension = 1;
                }
            }

            // Late-move reduction: probe late quiet moves two plies shallower
            // with a null window, and only re-search the ones that beat alpha.
            let mut eval = 0;
            let mut needs_full_search = true;
            if i >= 3 && extension == 0 && depth >= 3 && !is_capture {
                eval = -self.alpha_beta(
                    board,
                    tt,
                    depth - 2,
                    ply + 1,
                    -alpha - 1,
                    -alpha,
                    extensions,
                    limits,
                    stop,
                );
                needs_full_search = eval > alpha;
            }
            if needs_full_search {
                eval = -self.alpha_beta(
                    board,
                    tt,
                    depth - 1 + extension as i32,
                    ply + 1,
                    -beta,
                    -alpha,
                    extensions + extension,
                    limits,
                    stop,
                );
            }
            board.unmake_move(mv, true);

            if stop.load(Ordering::Relaxed) {
                self.repetition.try_pop();
                return 0;
            }

            if eval >= beta {
                tt.store(hash, mv, beta, depth as u8, ply, LOWER_BOUND);
                if !is_capture {
                    self.killers.promote(ply, mv);
                    self.history
                        .bump(side, mv.from(), mv.to(), depth * depth);
                }
                self.repetition.try_pop();
                return beta;
            }

            if eval > alpha {
                alpha = eval;
                best_move_in_position = mv;
                bound = EXACT;
                if ply == 0 {
                    self.best_move_this_iteration = mv;
                    self.best_eval_this_iteration = eval;
                }
            }

            if ply == 0 {
                self.root_moves_completed += 1;
            }
        }

        self.repetition.try_pop();
        tt.store(hash, best_move_in_position, alpha, depth as u8, ply, bound);
        alpha
    }

    // ========================================================================
    // QUIESCENCE
    // ========================================================================

    /// Captures-only search; stands pat on the static evaluation.
    fn quiescence(
        &mut self,
        board: &mut Board,
        mut alpha: i32,
        beta: i32,
        ply: usize,
        stop: &AtomicBool,
    ) -> i32 {
        if stop.load(Ordering::Relaxed) {
            return 0;
        }
        self.seldepth = self.seldepth.max(ply);

        let stand_pat = evaluate(board);
        if stand_pat >= beta {
            return beta;
        }
        if stand_pat > alpha {
            alpha = stand_pat;
        }

        let mut collector = MoveCollector::new();
        movegen::generate_moves(board, &mut collector, true);
        let moves = collector.as_slice();
        if moves.is_empty() {
            return alpha;
        }

        let ctx = OrderingContext::new(board);
        let move_count = moves.len();
        let mut move_list = [Move::NULL; MAX_MOVES];
        let mut scores = [0i32; MAX_MOVES];
        for i in 0..move_count {
            move_list[i] = moves[i];
            scores[i] = score_move(
                moves[i],
                board,
                None,
                &self.killers,
                &self.history,
                ply,
                &ctx,
            );
        }

        for i in 0..move_count {
            select_next(&mut move_list[..move_count], &mut scores[..move_count], i);
            let mv = move_list[i];

            board.make_move(mv, true);
            self.nodes += 1;
            let eval = -self.quiescence(board, -beta, -alpha, ply + 1, stop);
            board.unmake_move(mv, true);

            if eval >= beta {
                return beta;
            }
            if eval > alpha {
                alpha = eval;
            }
        }

        alpha
    }
}

impl Default for Searcher {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// PRINCIPAL VARIATION
// ============================================================================

/// Walk the table's best moves from the current position. The board is
/// restored before returning.
pub fn extract_pv(board: &mut Board, tt: &TranspositionTable, max_len: usize) -> Vec<Move> {
    let mut pv = Vec::new();
    let mut seen_keys = Vec::new();

    for _ in 0..max_len.max(1) {
        let key = board.zobrist();
        if seen_keys.contains(&key) {
            break;
        }
        let Some(mv) = tt.probe_move(key) else {
            break;
        };

        // Only follow moves that are actually legal here; a hash collision
        // must not corrupt the board.
        let mut collector = MoveCollector::new();
        movegen::generate_moves(board, &mut collector, false);
        if !collector.as_slice().contains(&mv) {
            break;
        }

        seen_keys.push(key);
        board.make_move(mv, true);
        pv.push(mv);
    }

    for &mv in pv.iter().rev() {
        board.unmake_move(mv, true);
    }
    pv
}

#[cfg(test)]
mod test_search {
    use super::*;

    fn run(fen: &str, limits: SearchLimits) -> Option<SearchResult> {
        let mut board = Board::from_fen(fen).unwrap();
        let mut tt = TranspositionTable::new_mb(16);
        let mut searcher = Searcher::new();
        let stop = AtomicBool::new(false);
        searcher.search(&mut board, &mut tt, &limits, &stop, |_| {})
    }

    #[test]
    fn test_finds_back_rank_mate_in_one() {
        let result = run("6k1/5ppp/8/8/8/8/5PPP/R5K1 w - - 0 1", SearchLimits::depth(4)).unwrap();
        assert_eq!(result.best_move, Move::new(0, 56, MoveFlag::Quiet));
        assert!(is_mate_score(result.score));
        assert_eq!(mate_in_moves(result.score), 1);
    }

    #[test]
    fn test_finds_fools_mate() {
        // The fools-mate sibling: after 1. f3 e5 2. g4 the side to move
        // mates on the spot with Qh4#.
        let result = run(
            "rnbqkbnr/pppp1ppp/8/4p3/6P1/5P2/PPPPP2P/RNBQKBNR b KQkq - 0 2",
            SearchLimits::depth(4),
        )
        .unwrap();
        assert!(is_mate_score(result.score));
        assert_eq!(mate_in_moves(result.score), 1);
        assert_eq!(result.best_move, Move::new(59, 31, MoveFlag::Quiet));
    }

    #[test]
    fn test_avoids_walking_into_fools_mate() {
        // After 1. f3 e5, the reply 2. g4?? loses to Qh4#. Any search deep
        // enough to see one move ahead for each side must avoid it.
        let result = run(
            "rnbqkbnr/pppp1ppp/8/4p3/8/5P2/PPPPP1PP/RNBQKBNR w KQkq - 0 2",
            SearchLimits::depth(4),
        )
        .unwrap();
        assert_ne!(result.best_move, Move::new(14, 30, MoveFlag::PawnTwoUp));
        assert!(!is_mate_score(result.score));
    }

    #[test]
    fn test_stalemate_is_no_result() {
        let mut board = Board::from_fen("7k/5Q2/6K1/8/8/8/8/8 b - - 0 1").unwrap();
        let mut tt = TranspositionTable::new_mb(1);
        let mut searcher = Searcher::new();
        let stop = AtomicBool::new(false);
        let result = searcher.search(&mut board, &mut tt, &SearchLimits::depth(3), &stop, |_| {});
        assert!(result.is_none());
    }

    #[test]
    fn test_repeated_position_scores_zero() {
        let mut board = Board::new();
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

        let mut tt = TranspositionTable::new_mb(1);
        let mut searcher = Searcher::new();
        searcher.repetition.init(&board);
        assert!(searcher.repetition.contains(board.zobrist()));
    }

    #[test]
    fn test_cancelled_search_still_moves() {
        let mut board = Board::new();
        let mut tt = TranspositionTable::new_mb(1);
        let mut searcher = Searcher::new();
        // Stop before the search even starts.
        let stop = AtomicBool::new(true);
        let result = searcher
            .search(&mut board, &mut tt, &SearchLimits::infinite(), &stop, |_| {})
            .unwrap();
        // Still a legal move from the start position.
        assert!(!result.best_move.is_null());
    }

    #[test]
    fn test_iterative_deepening_reports_progress() {
        let mut board = Board::new();
        let mut tt = TranspositionTable::new_mb(16);
        let mut searcher = Searcher::new();
        let stop = AtomicBool::new(false);
        let mut infos = 0;
        let result = searcher
            .search(
                &mut board,
                &mut tt,
                &SearchLimits::depth(5),
                &stop,
                |info| {
                    infos += 1;
                    assert!(info.depth >= 1);
                    assert!(info.seldepth >= 1);
                },
            )
            .unwrap();
        assert!(infos >= 1);
        assert!(result.depth >= 5);
        assert!(!result.best_move.is_null());
    }

    #[test]
    fn test_movetime_returns_promptly_with_legal_move() {
        let start = Instant::now();
        let result = run(
            "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1",
            SearchLimits::movetime(100),
        )
        .unwrap();
        // Generous slack over the 100ms budget for slow test machines.
        assert!(start.elapsed() < Duration::from_millis(2_000));

        // The chosen move is one of the twenty legal openers.
        let board = Board::new();
        let mut collector = MoveCollector::new();
        movegen::generate_moves(&board, &mut collector, false);
        assert!(collector.as_slice().contains(&result.best_move));
    }

    #[test]
    fn test_board_unchanged_after_search() {
        let fen = "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1";
        let mut board = Board::from_fen(fen).unwrap();
        let before = board.zobrist();
        let mut tt = TranspositionTable::new_mb(16);
        let mut searcher = Searcher::new();
        let stop = AtomicBool::new(false);
        searcher.search(&mut board, &mut tt, &SearchLimits::depth(4), &stop, |_| {});
        assert_eq!(board.zobrist(), before);
        assert_eq!(board.to_fen(), fen);
    }

    #[test]
    fn test_pv_starts_with_best_move() {
        let mut board = Board::new();
        let mut tt = TranspositionTable::new_mb(16);
        let mut searcher = Searcher::new();
        let stop = AtomicBool::new(false);
        let result = searcher
            .search(&mut board, &mut tt, &SearchLimits::depth(4), &stop, |_| {})
            .unwrap();
        let pv = extract_pv(&mut board, &tt, 4);
        assert!(!pv.is_empty());
        assert_eq!(pv[0], result.best_move);
    }
}
