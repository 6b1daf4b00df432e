//! Move legality: per-piece geometry, path obstruction and castling
//! preconditions over a board snapshot.
//!
//! Deliberately NOT covered: check, checkmate, attacked squares (castling
//! through or out of check is accepted), en passant, promotion and draw rules.

use serde::{Deserialize, Serialize};

use super::board::Board;
use super::chess::{PieceColor, PieceKind, Square};

const KING_FILE: i32 = 4;

/// A candidate move to be judged
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct MoveRequest {
    pub from: Square,
    pub to: Square,
    pub color: PieceColor,
}

impl MoveRequest {
    pub fn is_legal(&self, board: &Board) -> bool {
        is_legal(board, self.from, self.to, self.color)
    }
}

/// Which side of the board a castling move goes to
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum CastleSide {
    King,
    Queen,
}

impl CastleSide {
    fn rook_file(self) -> i32 {
        match self {
            CastleSide::King => 7,
            CastleSide::Queen => 0,
        }
    }

    /// File the rook lands on, next to the king's destination
    fn rook_target_file(self) -> i32 {
        match self {
            CastleSide::King => 5,
            CastleSide::Queen => 3,
        }
    }
}

/// Returns true if `color` may move the piece on `from` to `to`.
///
/// Never fails: anything malformed is simply illegal.
pub fn is_legal(board: &Board, from: Square, to: Square, color: PieceColor) -> bool {
    let Some(piece) = board.piece_at(from) else {
        return false;
    };
    if piece.color != color {
        return false;
    }
    if board.piece_at(to).is_some_and(|target| target.color == color) {
        return false;
    }

    match piece.kind {
        PieceKind::Pawn => pawn_move(board, from, to, color),
        PieceKind::Knight => knight_move(from, to),
        PieceKind::Bishop => diagonal(from, to) && path_clear(board, from, to),
        PieceKind::Rook => straight(from, to) && path_clear(board, from, to),
        PieceKind::Queen => {
            (diagonal(from, to) || straight(from, to)) && path_clear(board, from, to)
        }
        PieceKind::King => king_move(board, from, to, color),
    }
}

/// Same as [`is_legal`] for raw coordinates; off-board coordinates are illegal
pub fn is_legal_coords(board: &Board, from: (i32, i32), to: (i32, i32), color: PieceColor) -> bool {
    match (Square::try_from(from), Square::try_from(to)) {
        (Ok(from), Ok(to)) => is_legal(board, from, to, color),
        _ => false,
    }
}

/// Every destination the piece on `from` may legally reach
pub fn legal_targets(board: &Board, from: Square, color: PieceColor) -> Vec<Square> {
    Square::all()
        .filter(|&to| is_legal(board, from, to, color))
        .collect()
}

/// If moving a king `from` -> `to` is a castling move, the side it castles to.
/// Purely geometric: the king's home square and a two-file step on its rank.
pub fn castle_side(from: Square, to: Square, color: PieceColor) -> Option<CastleSide> {
    let rank = color.home_rank();
    if from.rank() != rank || from.file() != KING_FILE || to.rank() != rank {
        return None;
    }
    match to.file() {
        6 => Some(CastleSide::King),
        2 => Some(CastleSide::Queen),
        _ => None,
    }
}

/// The rook's leg of a castling move: (rook from, rook to)
pub fn castle_rook_leg(side: CastleSide, color: PieceColor) -> Option<(Square, Square)> {
    let rank = color.home_rank();
    Some((
        Square::new(side.rook_file(), rank)?,
        Square::new(side.rook_target_file(), rank)?,
    ))
}

/// Castling rights lost by moving kings or rooks. Tracked by the game
/// session, since a board snapshot cannot tell a king that moved and came back.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct CastlingRights {
    white: [bool; 2],
    black: [bool; 2],
}

impl Default for CastlingRights {
    fn default() -> Self {
        Self {
            white: [true; 2],
            black: [true; 2],
        }
    }
}

impl CastlingRights {
    fn slot(side: CastleSide) -> usize {
        match side {
            CastleSide::Queen => 0,
            CastleSide::King => 1,
        }
    }

    pub fn allows(&self, color: PieceColor, side: CastleSide) -> bool {
        match color {
            PieceColor::White => self.white[Self::slot(side)],
            PieceColor::Black => self.black[Self::slot(side)],
        }
    }

    fn revoke(&mut self, color: PieceColor, side: CastleSide) {
        match color {
            PieceColor::White => self.white[Self::slot(side)] = false,
            PieceColor::Black => self.black[Self::slot(side)] = false,
        }
    }

    /// Update after a move from `from` to `to`.
    /// Anything leaving or landing on a king or rook home square revokes
    /// the rights tied to it.
    pub fn record_move(&mut self, from: Square, to: Square) {
        for color in [PieceColor::White, PieceColor::Black] {
            let rank = color.home_rank();
            for sq in [from, to] {
                if sq.rank() != rank {
                    continue;
                }
                match sq.file() {
                    KING_FILE => {
                        self.revoke(color, CastleSide::King);
                        self.revoke(color, CastleSide::Queen);
                    }
                    7 => self.revoke(color, CastleSide::King),
                    0 => self.revoke(color, CastleSide::Queen),
                    _ => {}
                }
            }
        }
    }
}

/// [`is_legal`], additionally refusing castling once the rights are gone
pub fn is_legal_with_rights(
    board: &Board,
    from: Square,
    to: Square,
    color: PieceColor,
    rights: &CastlingRights,
) -> bool {
    if !is_legal(board, from, to, color) {
        return false;
    }
    let is_king = board
        .piece_at(from)
        .is_some_and(|p| p.kind == PieceKind::King);
    match castle_side(from, to, color) {
        Some(side) if is_king => rights.allows(color, side),
        _ => true,
    }
}

fn deltas(from: Square, to: Square) -> (i32, i32) {
    (to.file() - from.file(), to.rank() - from.rank())
}

fn diagonal(from: Square, to: Square) -> bool {
    let (df, dr) = deltas(from, to);
    df != 0 && df.abs() == dr.abs()
}

fn straight(from: Square, to: Square) -> bool {
    let (df, dr) = deltas(from, to);
    (df == 0) != (dr == 0)
}

/// Every square strictly between `from` and `to` is empty. Only meaningful
/// for straight or diagonal lines.
fn path_clear(board: &Board, from: Square, to: Square) -> bool {
    let (df, dr) = deltas(from, to);
    let (step_f, step_r) = (df.signum(), dr.signum());

    let mut current = from;
    loop {
        let Some(next) = current.offset(step_f, step_r) else {
            return false;
        };
        if next == to {
            return true;
        }
        if !board.is_empty_at(next) {
            return false;
        }
        current = next;
    }
}

fn pawn_move(board: &Board, from: Square, to: Square, color: PieceColor) -> bool {
    let (df, dr) = deltas(from, to);
    let dir = color.forward();

    match (df.abs(), dr) {
        (0, d) if d == dir => board.is_empty_at(to),
        (0, d) if d == 2 * dir => {
            from.rank() == color.pawn_rank()
                && from.offset(0, dir).is_some_and(|mid| board.is_empty_at(mid))
                && board.is_empty_at(to)
        }
        // diagonal only as a capture, no en passant
        (1, d) if d == dir => board
            .piece_at(to)
            .is_some_and(|target| target.color == color.opposite()),
        _ => false,
    }
}

fn knight_move(from: Square, to: Square) -> bool {
    let (df, dr) = deltas(from, to);
    matches!((df.abs(), dr.abs()), (1, 2) | (2, 1))
}

fn king_move(board: &Board, from: Square, to: Square, color: PieceColor) -> bool {
    let (df, dr) = deltas(from, to);
    if df.abs().max(dr.abs()) == 1 {
        return true;
    }
    if dr == 0 && df.abs() == 2 {
        return can_castle(board, from, to, color);
    }
    false
}

/// Castling preconditions on the board alone: king on its home square,
/// nothing between king and rook, own rook in the corner.
/// Whether the king is in check or crosses an attacked square is not examined.
fn can_castle(board: &Board, from: Square, to: Square, color: PieceColor) -> bool {
    let Some(side) = castle_side(from, to, color) else {
        return false;
    };
    let rank = color.home_rank();
    let rook_file = side.rook_file();
    let step = (rook_file - KING_FILE).signum();

    let mut file = KING_FILE + step;
    while file != rook_file {
        if board.piece_at_coords(file, rank).is_some() {
            return false;
        }
        file += step;
    }

    board
        .piece_at_coords(rook_file, rank)
        .is_some_and(|rook| rook.kind == PieceKind::Rook && rook.color == color)
}
