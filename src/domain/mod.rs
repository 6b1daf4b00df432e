pub mod board;
pub mod chess;
pub mod rules;
pub mod uci;

pub use board::{Board, START_FEN};
pub use chess::{NotationError, Piece, PieceColor, PieceKind, Square};
pub use rules::{MoveRequest, is_legal, legal_targets};
pub use uci::{EngineSuggestion, UciMove};
