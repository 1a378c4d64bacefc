pub mod attacks;
pub mod board;
pub mod evaluate;
pub mod fen;
pub mod magics;
pub mod move_history;
pub mod move_ordering;
pub mod movegen;
pub mod repetition;
pub mod search;
pub mod time_control;
pub mod tpt;
pub mod uci;
pub mod types;
pub mod zobrist;

pub use board::Board;
pub use types::*;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::movegen::perft;

    fn perft_from(fen: &str, depth: u32) -> u64 {
        let mut board = Board::from_fen(fen).unwrap();
        perft(&mut board, depth)
    }

    const STARTPOS: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";
    const KIWIPETE: &str = "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1";
    const POSITION_3: &str = "8/2p5/3p4/KP5r/1R3p1k/8/4P1P1/8 w - - 0 1";
    const POSITION_4: &str = "r3k2r/Pppp1ppp/1b3nbN/nP6/BBP1P3/q4N2/Pp1P2PP/R2Q1RK1 w kq - 0 1";
    const POSITION_5: &str = "rnbq1k1r/pp1Pbppp/2p5/8/2B5/8/PPP1NnPP/RNBQK2R w KQ - 1 8";
    const POSITION_6: &str =
        "r4rk1/1pp1qppp/p1np1n2/2b1p1B1/2B1P1b1/P1NP1N2/1PP1QPPP/R4RK1 w - - 0 10";

    #[test]
    fn test_perft_startpos_shallow() {
        assert_eq!(perft_from(STARTPOS, 1), 20);
        assert_eq!(perft_from(STARTPOS, 2), 400);
        assert_eq!(perft_from(STARTPOS, 3), 8_902);
        assert_eq!(perft_from(STARTPOS, 4), 197_281);
    }

    #[test]
    fn test_perft_startpos_depth_5() {
        assert_eq!(perft_from(STARTPOS, 5), 4_865_609);
    }

    #[test]
    fn test_perft_kiwipete() {
        assert_eq!(perft_from(KIWIPETE, 1), 48);
        assert_eq!(perft_from(KIWIPETE, 2), 2_039);
        assert_eq!(perft_from(KIWIPETE, 3), 97_862);
    }

    #[test]
    fn test_perft_kiwipete_depth_4() {
        assert_eq!(perft_from(KIWIPETE, 4), 4_085_603);
    }

    #[test]
    fn test_perft_position_3() {
        assert_eq!(perft_from(POSITION_3, 1), 14);
        assert_eq!(perft_from(POSITION_3, 2), 191);
        assert_eq!(perft_from(POSITION_3, 3), 2_812);
        assert_eq!(perft_from(POSITION_3, 4), 43_238);
        assert_eq!(perft_from(POSITION_3, 5), 674_624);
    }

    #[test]
    fn test_perft_position_4() {
        assert_eq!(perft_from(POSITION_4, 1), 6);
        assert_eq!(perft_from(POSITION_4, 2), 264);
        assert_eq!(perft_from(POSITION_4, 3), 9_467);
        assert_eq!(perft_from(POSITION_4, 4), 422_333);
    }

    #[test]
    fn test_perft_position_5() {
        assert_eq!(perft_from(POSITION_5, 1), 44);
        assert_eq!(perft_from(POSITION_5, 2), 1_486);
        assert_eq!(perft_from(POSITION_5, 3), 62_379);
    }

    #[test]
    fn test_perft_position_6() {
        assert_eq!(perft_from(POSITION_6, 1), 46);
        assert_eq!(perft_from(POSITION_6, 2), 2_079);
        assert_eq!(perft_from(POSITION_6, 3), 89_890);
    }

    /// Walk the whole tree to a shallow depth, checking after every unmake
    /// that the board is restored bitwise and that the incremental zobrist
    /// key matches a from-scratch recomputation.
    fn walk_and_verify(board: &mut Board, depth: u32) {
        if depth == 0 {
            return;
        }
        let mut collector = MoveCollector::new();
        movegen::generate_moves(board, &mut collector, false);

        for i in 0..collector.len() {
            let m = collector.get(i);
            let squares_before = board.squares;
            let state_before = board.state;

            board.make_move(m, true);
            assert_eq!(board.zobrist(), board.calculate_zobrist());
            walk_and_verify(board, depth - 1);
            board.unmake_move(m, true);

            assert_eq!(board.squares, squares_before);
            assert_eq!(board.state, state_before);
            assert_eq!(board.zobrist(), board.calculate_zobrist());
        }
    }

    #[test]
    fn test_make_unmake_restores_everything() {
        for fen in [STARTPOS, KIWIPETE, POSITION_3, POSITION_5] {
            let mut board = Board::from_fen(fen).unwrap();
            let original_fen = board.to_fen();
            walk_and_verify(&mut board, 3);
            assert_eq!(board.to_fen(), original_fen);
        }
    }
}
