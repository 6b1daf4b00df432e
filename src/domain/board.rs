//! 8x8 board snapshot: a grid of optional pieces, no rules.

use std::fmt;

use thiserror::Error;

use super::chess::{Piece, PieceColor, PieceKind, Square};

/// Standard starting position in FEN
pub const START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

const BACK_RANK: [PieceKind; 8] = [
    PieceKind::Rook,
    PieceKind::Knight,
    PieceKind::Bishop,
    PieceKind::Queen,
    PieceKind::King,
    PieceKind::Bishop,
    PieceKind::Knight,
    PieceKind::Rook,
];

#[derive(Debug, Error)]
#[error("invalid board FEN {fen:?}: {reason}")]
pub struct BoardError {
    pub fen: String,
    pub reason: String,
}

/// Pieces indexed as `grid[rank][file]`, rank 0 = white's back rank.
///
/// No piece-count invariants: any position can be built.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct Board {
    grid: [[Option<Piece>; 8]; 8],
}

impl Board {
    /// An empty board
    pub fn empty() -> Self {
        Self::default()
    }

    /// The standard initial layout
    pub fn standard() -> Self {
        let mut board = Self::empty();
        for (file, kind) in BACK_RANK.into_iter().enumerate() {
            board.grid[0][file] = Some(Piece::new(kind, PieceColor::White));
            board.grid[1][file] = Some(Piece::new(PieceKind::Pawn, PieceColor::White));
            board.grid[6][file] = Some(Piece::new(PieceKind::Pawn, PieceColor::Black));
            board.grid[7][file] = Some(Piece::new(kind, PieceColor::Black));
        }
        board
    }

    /// Build a board from a FEN string. Only the piece placement field is read,
    /// the rest (side to move, castling, ...) is ignored.
    pub fn from_fen(fen: &str) -> Result<Self, BoardError> {
        let placement = fen.split_whitespace().next().unwrap_or_default();
        let parsed: shakmaty::Board = placement.parse().map_err(|e| BoardError {
            fen: fen.to_string(),
            reason: format!("{e}"),
        })?;

        let mut board = Self::empty();
        for sq in Square::all() {
            let piece = parsed.piece_at(sq.into()).map(Piece::from);
            board.set_piece(piece, sq);
        }
        Ok(board)
    }

    pub fn piece_at(&self, square: Square) -> Option<Piece> {
        self.grid[square.rank() as usize][square.file() as usize]
    }

    /// Lookup by raw coordinates; off-board coordinates hold no piece
    pub fn piece_at_coords(&self, file: i32, rank: i32) -> Option<Piece> {
        Square::new(file, rank).and_then(|sq| self.piece_at(sq))
    }

    pub fn is_empty_at(&self, square: Square) -> bool {
        self.piece_at(square).is_none()
    }

    /// Place (or clear, with `None`) a piece, overwriting whatever was there
    pub fn set_piece(&mut self, piece: Option<Piece>, square: Square) {
        self.grid[square.rank() as usize][square.file() as usize] = piece;
    }

    /// Placement by raw coordinates; off-board coordinates are ignored
    pub fn set_piece_at_coords(&mut self, piece: Option<Piece>, file: i32, rank: i32) {
        if let Some(sq) = Square::new(file, rank) {
            self.set_piece(piece, sq);
        }
    }

    /// Move whatever sits on `from` to `to`, capturing by overwrite.
    /// Returns the captured piece. No legality checks.
    pub fn relocate(&mut self, from: Square, to: Square) -> Option<Piece> {
        let piece = self.piece_at(from)?;
        let captured = self.piece_at(to);
        self.set_piece(None, from);
        self.set_piece(Some(piece), to);
        captured
    }

    /// Iterate occupied squares
    pub fn pieces(&self) -> impl Iterator<Item = (Square, Piece)> + '_ {
        Square::all().filter_map(|sq| self.piece_at(sq).map(|p| (sq, p)))
    }
}

/// Text diagram, rank 8 at the top
impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for rank in (0..8).rev() {
            write!(f, "{} ", rank + 1)?;
            for file in 0..8 {
                let symbol = match self.piece_at_coords(file, rank) {
                    Some(piece) => piece.symbol(),
                    None => '·',
                };
                write!(f, "{symbol} ")?;
            }
            writeln!(f)?;
        }
        write!(f, "  a b c d e f g h")
    }
}
