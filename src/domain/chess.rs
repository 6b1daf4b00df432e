//! Pure chess domain types and utilities.
//! No I/O here - this is the domain layer.

use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use shakmaty::{Color as SColor, File, Rank, Role};
use thiserror::Error;

/// File letters, index 0 = a
const FILE_LETTERS: [char; 8] = ['a', 'b', 'c', 'd', 'e', 'f', 'g', 'h'];

/// Error returned when a square or move string is not valid coordinate notation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid notation: {0:?}")]
pub struct NotationError(pub String);

/// A coordinate on the board: file 0..8 (a-h) and rank 0..8 (1-8).
///
/// Values can only be built through checked constructors, so a `Square`
/// is always on the board.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Square {
    file: u8,
    rank: u8,
}

impl Square {
    /// Build a square from 0-based file/rank, `None` when off the board
    pub fn new(file: i32, rank: i32) -> Option<Self> {
        if (0..8).contains(&file) && (0..8).contains(&rank) {
            Some(Self {
                file: file as u8,
                rank: rank as u8,
            })
        } else {
            None
        }
    }

    pub fn file(self) -> i32 {
        i32::from(self.file)
    }

    pub fn rank(self) -> i32 {
        i32::from(self.rank)
    }

    /// The square `df` files and `dr` ranks away, if it is still on the board
    pub fn offset(self, df: i32, dr: i32) -> Option<Self> {
        Self::new(self.file() + df, self.rank() + dr)
    }

    /// Algebraic notation, e.g. "e4"
    pub fn notation(self) -> String {
        format!("{}{}", FILE_LETTERS[self.file as usize], self.rank + 1)
    }

    /// a1 is dark, h1 is light
    pub fn is_dark(self) -> bool {
        (self.file + self.rank) % 2 == 0
    }

    /// All 64 squares, a1, b1, ... h8
    pub fn all() -> impl Iterator<Item = Square> {
        (0..8u8).flat_map(|rank| (0..8u8).map(move |file| Square { file, rank }))
    }
}

impl fmt::Display for Square {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", FILE_LETTERS[self.file as usize], self.rank + 1)
    }
}

impl FromStr for Square {
    type Err = NotationError;

    /// Accepts exactly `[a-h][1-8]`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = s.as_bytes();
        if bytes.len() != 2 {
            return Err(NotationError(s.to_string()));
        }
        let (f, r) = (bytes[0], bytes[1]);
        if !(b'a'..=b'h').contains(&f) || !(b'1'..=b'8').contains(&r) {
            return Err(NotationError(s.to_string()));
        }
        Ok(Self {
            file: f - b'a',
            rank: r - b'1',
        })
    }
}

impl TryFrom<(i32, i32)> for Square {
    type Error = NotationError;

    fn try_from((file, rank): (i32, i32)) -> Result<Self, Self::Error> {
        Square::new(file, rank).ok_or_else(|| NotationError(format!("({file}, {rank})")))
    }
}

impl TryFrom<String> for Square {
    type Error = NotationError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Square> for String {
    fn from(sq: Square) -> Self {
        sq.notation()
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum PieceColor {
    White,
    Black,
}

impl PieceColor {
    pub fn opposite(self) -> Self {
        match self {
            PieceColor::White => PieceColor::Black,
            PieceColor::Black => PieceColor::White,
        }
    }

    /// Back rank for this side (0-based)
    pub fn home_rank(self) -> i32 {
        match self {
            PieceColor::White => 0,
            PieceColor::Black => 7,
        }
    }

    /// Rank direction pawns of this color advance in
    pub fn forward(self) -> i32 {
        match self {
            PieceColor::White => 1,
            PieceColor::Black => -1,
        }
    }

    /// Rank pawns start on, the only rank a double step is allowed from
    pub fn pawn_rank(self) -> i32 {
        self.home_rank() + self.forward()
    }

    pub fn display_name(self) -> &'static str {
        match self {
            PieceColor::White => "White",
            PieceColor::Black => "Black",
        }
    }
}

impl FromStr for PieceColor {
    type Err = NotationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "white" | "w" => Ok(PieceColor::White),
            "black" | "b" => Ok(PieceColor::Black),
            _ => Err(NotationError(s.to_string())),
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PieceKind {
    Pawn,
    Rook,
    Knight,
    Bishop,
    Queen,
    King,
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct Piece {
    pub kind: PieceKind,
    pub color: PieceColor,
}

impl Piece {
    pub const fn new(kind: PieceKind, color: PieceColor) -> Self {
        Self { kind, color }
    }

    /// Unicode chess glyph (white pieces hollow, black filled)
    pub fn symbol(self) -> char {
        match (self.color, self.kind) {
            (PieceColor::White, PieceKind::Pawn) => '♙',
            (PieceColor::White, PieceKind::Rook) => '♖',
            (PieceColor::White, PieceKind::Knight) => '♘',
            (PieceColor::White, PieceKind::Bishop) => '♗',
            (PieceColor::White, PieceKind::Queen) => '♕',
            (PieceColor::White, PieceKind::King) => '♔',
            (PieceColor::Black, PieceKind::Pawn) => '♟',
            (PieceColor::Black, PieceKind::Rook) => '♜',
            (PieceColor::Black, PieceKind::Knight) => '♞',
            (PieceColor::Black, PieceKind::Bishop) => '♝',
            (PieceColor::Black, PieceKind::Queen) => '♛',
            (PieceColor::Black, PieceKind::King) => '♚',
        }
    }
}

impl From<Square> for shakmaty::Square {
    fn from(sq: Square) -> Self {
        shakmaty::Square::from_coords(File::new(u32::from(sq.file)), Rank::new(u32::from(sq.rank)))
    }
}

/// Convert shakmaty piece to our domain Piece
impl From<shakmaty::Piece> for Piece {
    fn from(piece: shakmaty::Piece) -> Self {
        let kind = match piece.role {
            Role::Pawn => PieceKind::Pawn,
            Role::Knight => PieceKind::Knight,
            Role::Bishop => PieceKind::Bishop,
            Role::Rook => PieceKind::Rook,
            Role::Queen => PieceKind::Queen,
            Role::King => PieceKind::King,
        };
        let color = match piece.color {
            SColor::White => PieceColor::White,
            SColor::Black => PieceColor::Black,
        };
        Piece { kind, color }
    }
}

impl From<Piece> for shakmaty::Piece {
    fn from(piece: Piece) -> Self {
        let role = match piece.kind {
            PieceKind::Pawn => Role::Pawn,
            PieceKind::Knight => Role::Knight,
            PieceKind::Bishop => Role::Bishop,
            PieceKind::Rook => Role::Rook,
            PieceKind::Queen => Role::Queen,
            PieceKind::King => Role::King,
        };
        let color = match piece.color {
            PieceColor::White => SColor::White,
            PieceColor::Black => SColor::Black,
        };
        shakmaty::Piece { color, role }
    }
}
