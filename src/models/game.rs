//! Game state model - the application layer for a single game.
//!
//! Moves are judged by the legality rules, applied to the board (including
//! the rook's leg of castling) and recorded in wire notation so the history
//! can be handed to the engine as is.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::domain::rules::{self, CastlingRights};
use crate::domain::uci::{EngineSuggestion, UciMove};
use crate::domain::{Board, PieceColor, PieceKind, Square};
use crate::error::MoveError;

/// A move as it was played
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveRecord {
    /// Full-move number, starting at 1 for white's first move
    pub index: u32,
    pub color: PieceColor,
    pub from: Square,
    pub to: Square,
}

impl MoveRecord {
    /// Wire notation, e.g. "e2e4"
    pub fn notation(&self) -> String {
        UciMove::new(self.from, self.to).to_string()
    }

    /// "1. e2e4" for white, "1... e7e5" for black
    pub fn display_text(&self) -> String {
        match self.color {
            PieceColor::White => format!("{}. {}", self.index, self.notation()),
            PieceColor::Black => format!("{}... {}", self.index, self.notation()),
        }
    }
}

/// The main game model: board, side to move and history
#[derive(Clone, Debug)]
pub struct GameSession {
    board: Board,
    turn: PieceColor,
    rights: CastlingRights,
    history: Vec<MoveRecord>,
}

impl GameSession {
    pub fn new() -> Self {
        Self {
            board: Board::standard(),
            turn: PieceColor::White,
            rights: CastlingRights::default(),
            history: Vec::new(),
        }
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    /// Side to move
    pub fn turn(&self) -> PieceColor {
        self.turn
    }

    pub fn history(&self) -> &[MoveRecord] {
        &self.history
    }

    /// History in wire notation, ready for a position command
    pub fn history_notations(&self) -> Vec<String> {
        self.history.iter().map(MoveRecord::notation).collect()
    }

    pub fn last_move(&self) -> Option<&MoveRecord> {
        self.history.last()
    }

    /// Destinations the side to move may reach from `from`
    pub fn legal_targets(&self, from: Square) -> Vec<Square> {
        Square::all()
            .filter(|&to| self.is_legal(from, to))
            .collect()
    }

    pub fn is_legal(&self, from: Square, to: Square) -> bool {
        rules::is_legal_with_rights(&self.board, from, to, self.turn, &self.rights)
    }

    /// Validate and play a move for the side to move
    pub fn try_move(&mut self, from: Square, to: Square) -> Result<MoveRecord, MoveError> {
        if !self.is_legal(from, to) {
            debug!(%from, %to, color = ?self.turn, "rejected move");
            return Err(MoveError::Illegal { from, to });
        }
        Ok(self.apply(from, to))
    }

    /// Play a move given in wire notation, e.g. "g1f3"
    pub fn play_notation(&mut self, notation: &str) -> Result<MoveRecord, MoveError> {
        let mv: UciMove = notation
            .parse()
            .map_err(|_| MoveError::BadNotation(notation.to_string()))?;
        self.try_move(mv.from, mv.to)
    }

    /// Play the engine's best move
    pub fn apply_suggestion(
        &mut self,
        suggestion: &EngineSuggestion,
    ) -> Result<MoveRecord, MoveError> {
        self.play_notation(&suggestion.best_move)
    }

    /// Move without validation. A king's two-file step also moves the rook.
    fn apply(&mut self, from: Square, to: Square) -> MoveRecord {
        let color = self.turn;
        let is_king = self
            .board
            .piece_at(from)
            .is_some_and(|p| p.kind == PieceKind::King);

        let captured = self.board.relocate(from, to);
        if let Some(piece) = captured {
            debug!(?piece, square = %to, "captured");
        }
        if is_king {
            let rook_leg = rules::castle_side(from, to, color)
                .and_then(|side| rules::castle_rook_leg(side, color));
            if let Some((rook_from, rook_to)) = rook_leg {
                self.board.relocate(rook_from, rook_to);
                debug!(%rook_from, %rook_to, "castled");
            }
        }
        self.rights.record_move(from, to);

        let record = MoveRecord {
            index: self.history.len() as u32 / 2 + 1,
            color,
            from,
            to,
        };
        self.history.push(record);
        self.turn = color.opposite();
        info!(mv = %record.display_text(), "move played");
        record
    }

    /// Take back the last move by replaying the rest from the start
    pub fn undo(&mut self) -> Option<MoveRecord> {
        let mut remaining = std::mem::take(&mut self.history);
        let undone = remaining.pop()?;

        let mut replay = GameSession::new();
        for record in &remaining {
            replay.apply(record.from, record.to);
        }
        *self = replay;
        info!(mv = %undone.display_text(), left = self.history.len(), "move undone");
        Some(undone)
    }

    /// Back to the initial position
    pub fn reset(&mut self) {
        *self = GameSession::new();
    }
}

impl Default for GameSession {
    fn default() -> Self {
        Self::new()
    }
}
