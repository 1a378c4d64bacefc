//! FEN parsing and emission.

use crate::board::Board;
use crate::movegen;
use crate::types::*;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum FenError {
    #[error("FEN needs at least four fields, got {0}")]
    MissingFields(usize),
    #[error("invalid piece character '{0}'")]
    InvalidPiece(char),
    #[error("piece placement runs off the board")]
    BadPlacement,
    #[error("invalid side to move '{0}'")]
    InvalidSide(String),
    #[error("invalid castling character '{0}'")]
    InvalidCastling(char),
    #[error("invalid en-passant square '{0}'")]
    InvalidEnPassant(String),
    #[error("position has no {0:?} king")]
    MissingKing(Color),
}

impl Board {
    /// Parse a six-field FEN. The half-move clock and full-move counter are
    /// optional and default to 0 and 1.
    pub fn from_fen(fen: &str) -> Result<Self, FenError> {
        let parts: Vec<&str> = fen.split_whitespace().collect();
        if parts.len() < 4 {
            return Err(FenError::MissingFields(parts.len()));
        }

        let mut board = Board::empty();

        // Piece placement, a8 first.
        let mut sq = 56usize;
        for c in parts[0].chars() {
            match c {
                '/' => {
                    if sq < 16 {
                        return Err(FenError::BadPlacement);
                    }
                    sq -= 16;
                }
                '1'..='8' => sq += c.to_digit(10).unwrap() as usize,
                _ => {
                    let (piece, color) = match c {
                        'P' => (Piece::Pawn, Color::White),
                        'N' => (Piece::Knight, Color::White),
                        'B' => (Piece::Bishop, Color::White),
                        'R' => (Piece::Rook, Color::White),
                        'Q' => (Piece::Queen, Color::White),
                        'K' => (Piece::King, Color::White),
                        'p' => (Piece::Pawn, Color::Black),
                        'n' => (Piece::Knight, Color::Black),
                        'b' => (Piece::Bishop, Color::Black),
                        'r' => (Piece::Rook, Color::Black),
                        'q' => (Piece::Queen, Color::Black),
                        'k' => (Piece::King, Color::Black),
                        _ => return Err(FenError::InvalidPiece(c)),
                    };
                    if sq >= 64 {
                        return Err(FenError::BadPlacement);
                    }
                    board.add_piece(color, piece, sq);
                    if piece == Piece::King {
                        board.king_sq[color as usize] = sq;
                    }
                    sq += 1;
                }
            }
        }

        for color in [Color::White, Color::Black] {
            if board.piece_bb(color, Piece::King).count_ones() != 1 {
                return Err(FenError::MissingKing(color));
            }
        }

        board.side_to_move = match parts[1] {
            "w" => Color::White,
            "b" => Color::Black,
            other => return Err(FenError::InvalidSide(other.to_string())),
        };

        let mut rights = 0u8;
        for c in parts[2].chars() {
            rights |= match c {
                'K' => 1,
                'Q' => 2,
                'k' => 4,
                'q' => 8,
                '-' => 0,
                _ => return Err(FenError::InvalidCastling(c)),
            };
        }
        board.state.castling = CastleRights(rights);

        board.state.ep_file = if parts[3] == "-" {
            0
        } else {
            let bytes = parts[3].as_bytes();
            if bytes.len() != 2 || !(b'a'..=b'h').contains(&bytes[0]) {
                return Err(FenError::InvalidEnPassant(parts[3].to_string()));
            }
            (bytes[0] - b'a' + 1) as u8
        };

        board.state.fifty = parts
            .get(4)
            .and_then(|s| s.parse().ok())
            .unwrap_or(0);
        let fullmove: u32 = parts
            .get(5)
            .and_then(|s| s.parse().ok())
            .unwrap_or(1);
        board.ply_offset =
            (fullmove.saturating_sub(1)) * 2 + (board.side_to_move == Color::Black) as u32;

        board.finish_load();
        Ok(board)
    }

    /// Emit a canonical FEN. The en-passant square is included only when a
    /// pawn can actually capture onto it.
    pub fn to_fen(&self) -> String {
        let mut fen = String::with_capacity(80);

        for rank in (0..8).rev() {
            let mut empties = 0;
            for file in 0..8 {
                match self.squares[rank * 8 + file] {
                    Some((piece, color)) => {
                        if empties > 0 {
                            fen.push(char::from_digit(empties, 10).unwrap());
                            empties = 0;
                        }
                        let c = match piece {
                            Piece::Pawn => 'p',
                            Piece::Knight => 'n',
                            Piece::Bishop => 'b',
                            Piece::Rook => 'r',
                            Piece::Queen => 'q',
                            Piece::King => 'k',
                        };
                        fen.push(if color == Color::White {
                            c.to_ascii_uppercase()
                        } else {
                            c
                        });
                    }
                    None => empties += 1,
                }
            }
            if empties > 0 {
                fen.push(char::from_digit(empties, 10).unwrap());
            }
            if rank > 0 {
                fen.push('/');
            }
        }

        fen.push(' ');
        fen.push(if self.side_to_move == Color::White {
            'w'
        } else {
            'b'
        });

        fen.push(' ');
        let rights = self.state.castling;
        if rights == CastleRights::NONE {
            fen.push('-');
        } else {
            if rights.can_castle_kingside(Color::White) {
                fen.push('K');
            }
            if rights.can_castle_queenside(Color::White) {
                fen.push('Q');
            }
            if rights.can_castle_kingside(Color::Black) {
                fen.push('k');
            }
            if rights.can_castle_queenside(Color::Black) {
                fen.push('q');
            }
        }

        fen.push(' ');
        match self.legal_ep_square() {
            Some(sq) => fen.push_str(&square_name(sq)),
            None => fen.push('-'),
        }

        let fullmove = (self.ply_offset + self.ply) / 2 + 1;
        fen.push_str(&format!(" {} {}", self.state.fifty, fullmove));
        fen
    }

    /// The en-passant target square, but only if some pawn can legally
    /// capture onto it.
    fn legal_ep_square(&self) -> Option<usize> {
        let sq = self.state.ep_square(self.side_to_move)?;
        let mut collector = MoveCollector::new();
        movegen::generate_moves(self, &mut collector, false);
        collector
            .as_slice()
            .iter()
            .any(|m| m.flag() == MoveFlag::EnPassant)
            .then_some(sq)
    }
}

#[cfg(test)]
mod test_fen {
    use super::*;

    const KIWIPETE: &str = "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1";

    #[test]
    fn test_start_round_trip() {
        let fen = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";
        assert_eq!(Board::from_fen(fen).unwrap().to_fen(), fen);
    }

    #[test]
    fn test_kiwipete_round_trip() {
        assert_eq!(Board::from_fen(KIWIPETE).unwrap().to_fen(), KIWIPETE);
    }

    #[test]
    fn test_optional_counters_default() {
        let err = Board::from_fen("8/8/8/8/8/8/4k3/4K3 w -").unwrap_err();
        // Only three fields is an error ...
        assert!(matches!(err, FenError::MissingFields(3)));
        // ... but four is fine, with clocks defaulted.
        let board = Board::from_fen("8/8/8/8/8/8/4k3/4K3 w - -").unwrap();
        assert_eq!(board.state.fifty, 0);
        assert!(board.to_fen().ends_with("0 1"));
    }

    #[test]
    fn test_ep_square_only_when_capturable() {
        // After 1. e4 there is no black pawn that can take on e3, so the
        // canonical FEN omits the square.
        let mut board = Board::new();
        board.make_move(Move::new(12, 28, MoveFlag::PawnTwoUp), false);
        assert_eq!(board.state.ep_file, 5);
        assert!(board.to_fen().contains(" b KQkq - "));

        // With a black pawn on d4, e2e4 is capturable en passant.
        let mut board =
            Board::from_fen("rnbqkbnr/ppp1pppp/8/8/3p4/8/PPPPPPPP/RNBQKBNR w KQkq - 0 3").unwrap();
        board.make_move(Move::new(12, 28, MoveFlag::PawnTwoUp), false);
        assert!(board.to_fen().contains(" b KQkq e3 "));
    }

    #[test]
    fn test_invalid_fens_are_rejected() {
        assert!(Board::from_fen("").is_err());
        assert!(Board::from_fen("rnbqkbnr/pppppppp/8/8 w KQkq -").is_err());
        assert!(matches!(
            Board::from_fen("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR x KQkq - 0 1"),
            Err(FenError::InvalidSide(_))
        ));
        assert!(matches!(
            Board::from_fen("8/8/8/8/8/8/8/4K3 w - - 0 1"),
            Err(FenError::MissingKing(Color::Black))
        ));
    }

    #[test]
    fn test_fullmove_counts_from_offset() {
        let mut board =
            Board::from_fen("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR b KQkq - 0 12").unwrap();
        board.make_move(Move::new(52, 36, MoveFlag::PawnTwoUp), false);
        assert!(board.to_fen().ends_with(" 13"));
    }
}
