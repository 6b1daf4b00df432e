//! UCI (Universal Chess Interface) protocol types and utilities.
//!
//! This module handles the text side of the protocol: building command lines,
//! classifying output lines and folding a search's output into a result.
//! Process spawning and pipes live in the models layer.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::chess::{NotationError, Square};

/// UCI commands that can be sent to an engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UciCommand {
    /// Initialize UCI mode
    Uci,
    /// Check if engine is ready
    IsReady,
    /// Set a new game
    UciNewGame,
    /// Set an engine option
    SetOption { name: String, value: String },
    /// Set position (startpos or FEN, with optional moves)
    Position { fen: Option<String>, moves: Vec<String> },
    /// Start analysis with depth limit
    GoDepth(u32),
    /// Stop analysis
    Stop,
    /// Quit the engine
    Quit,
}

impl UciCommand {
    /// Position command for the standard start followed by `moves`
    pub fn startpos<S: AsRef<str>>(moves: &[S]) -> Self {
        UciCommand::Position {
            fen: None,
            moves: moves.iter().map(|m| m.as_ref().to_string()).collect(),
        }
    }

    /// Convert command to UCI protocol string
    pub fn to_uci_string(&self) -> String {
        match self {
            UciCommand::Uci => "uci".to_string(),
            UciCommand::IsReady => "isready".to_string(),
            UciCommand::UciNewGame => "ucinewgame".to_string(),
            UciCommand::SetOption { name, value } => {
                format!("setoption name {} value {}", name, value)
            }
            UciCommand::Position { fen, moves } => {
                let mut cmd = String::from("position ");
                match fen {
                    Some(f) => {
                        cmd.push_str("fen ");
                        cmd.push_str(f);
                    }
                    None => cmd.push_str("startpos"),
                }
                if !moves.is_empty() {
                    cmd.push_str(" moves ");
                    cmd.push_str(&moves.join(" "));
                }
                cmd
            }
            UciCommand::GoDepth(d) => format!("go depth {}", d),
            UciCommand::Stop => "stop".to_string(),
            UciCommand::Quit => "quit".to_string(),
        }
    }
}

impl fmt::Display for UciCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_uci_string())
    }
}

/// Raw UCI output line, categorized
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UciOutputKind {
    /// "uciok" - engine is ready for UCI
    UciOk,
    /// "readyok" - engine is ready
    ReadyOk,
    /// "info ..." - analysis information
    Info(String),
    /// "bestmove ..." - best move found
    BestMove(String),
    /// Engine identification
    Id(String),
    /// Unknown/other output
    Other(String),
}

impl UciOutputKind {
    /// Parse a raw UCI output line into a categorized type
    pub fn parse(line: &str) -> Self {
        let line = line.trim();

        if line == "uciok" {
            UciOutputKind::UciOk
        } else if line == "readyok" {
            UciOutputKind::ReadyOk
        } else if let Some(rest) = line.strip_prefix("info ") {
            UciOutputKind::Info(rest.to_string())
        } else if let Some(rest) = line.strip_prefix("bestmove ") {
            UciOutputKind::BestMove(rest.to_string())
        } else if let Some(rest) = line.strip_prefix("id ") {
            UciOutputKind::Id(rest.to_string())
        } else {
            UciOutputKind::Other(line.to_string())
        }
    }
}

/// Engine evaluation score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Score {
    /// Centipawn score (positive = side to move is better)
    Centipawns(i32),
    /// Mate in N moves (negative = side to move gets mated)
    Mate(i32),
}

impl Score {
    /// Format score for display (e.g., "+0.35" or "M3" or "-M2")
    pub fn display(&self) -> String {
        match self {
            Score::Centipawns(cp) => {
                let pawns = *cp as f64 / 100.0;
                if pawns >= 0.0 {
                    format!("+{:.2}", pawns)
                } else {
                    format!("{:.2}", pawns)
                }
            }
            Score::Mate(moves) => {
                if *moves > 0 {
                    format!("M{}", moves)
                } else {
                    format!("-M{}", moves.unsigned_abs())
                }
            }
        }
    }

    /// Get a numeric value for comparison (centipawns, or large value for mate)
    pub fn as_centipawns(&self) -> i32 {
        match self {
            Score::Centipawns(cp) => *cp,
            Score::Mate(moves) => {
                if *moves > 0 {
                    10000 - *moves // Mate in fewer moves is better
                } else {
                    -10000 - *moves // Being mated in fewer moves is worse
                }
            }
        }
    }
}

/// Tokens that end a `pv` run inside an info line
const INFO_KEYWORDS: &[&str] = &[
    "depth",
    "seldepth",
    "multipv",
    "score",
    "nodes",
    "nps",
    "time",
    "hashfull",
    "currmove",
    "currmovenumber",
    "string",
    "refutation",
    "currline",
];

/// Parsed UCI info line containing analysis data
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UciInfo {
    /// Search depth
    pub depth: Option<u32>,
    /// Selective search depth
    pub seldepth: Option<u32>,
    /// Multi-PV line number (1-indexed)
    pub multipv: Option<u32>,
    /// Evaluation score
    pub score: Option<Score>,
    /// Nodes searched
    pub nodes: Option<u64>,
    /// Nodes per second
    pub nps: Option<u64>,
    /// Time spent in milliseconds
    pub time: Option<u64>,
    /// Principal variation (best line) as UCI moves
    pub pv: Vec<String>,
    /// Current move being searched
    pub currmove: Option<String>,
    /// Hash table usage (per mille)
    pub hashfull: Option<u32>,
}

impl UciInfo {
    /// Parse a UCI info string (the part after "info ")
    pub fn parse(info_str: &str) -> Self {
        let mut info = UciInfo::default();
        let tokens: Vec<&str> = info_str.split_whitespace().collect();

        // the value after a keyword, if it parses
        fn value<T: FromStr>(tokens: &[&str], i: usize) -> Option<T> {
            tokens.get(i + 1).and_then(|t| t.parse().ok())
        }

        let mut i = 0;
        while i < tokens.len() {
            match tokens[i] {
                "depth" => info.depth = value(&tokens, i).or(info.depth),
                "seldepth" => info.seldepth = value(&tokens, i).or(info.seldepth),
                "multipv" => info.multipv = value(&tokens, i).or(info.multipv),
                "nodes" => info.nodes = value(&tokens, i).or(info.nodes),
                "nps" => info.nps = value(&tokens, i).or(info.nps),
                "time" => info.time = value(&tokens, i).or(info.time),
                "hashfull" => info.hashfull = value(&tokens, i).or(info.hashfull),
                "currmove" => {
                    if let Some(m) = tokens.get(i + 1) {
                        info.currmove = Some(m.to_string());
                    }
                }
                "cp" => {
                    if let Some(cp) = value(&tokens, i) {
                        info.score = Some(Score::Centipawns(cp));
                    }
                }
                "mate" => {
                    if let Some(m) = value(&tokens, i) {
                        info.score = Some(Score::Mate(m));
                    }
                }
                "pv" => {
                    // PV runs until the next keyword
                    let pv: Vec<String> = tokens[i + 1..]
                        .iter()
                        .take_while(|t| !INFO_KEYWORDS.contains(t))
                        .map(|t| t.to_string())
                        .collect();
                    i += pv.len();
                    if !pv.is_empty() {
                        info.pv = pv;
                    }
                }
                // free text, nothing after it is data
                "string" => break,
                _ => {}
            }
            i += 1;
        }

        info
    }
}

/// A move in the 4-character wire format, e.g. `e2e4`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UciMove {
    pub from: Square,
    pub to: Square,
}

impl UciMove {
    pub fn new(from: Square, to: Square) -> Self {
        Self { from, to }
    }
}

impl fmt::Display for UciMove {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.from, self.to)
    }
}

impl FromStr for UciMove {
    type Err = NotationError;

    /// Exactly two squares; promotion suffixes are not supported
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != 4 || !s.is_ascii() {
            return Err(NotationError(s.to_string()));
        }
        let from = s[..2].parse().map_err(|_| NotationError(s.to_string()))?;
        let to = s[2..].parse().map_err(|_| NotationError(s.to_string()))?;
        Ok(Self { from, to })
    }
}

/// Final result of one analysis request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineSuggestion {
    /// Best move in wire notation, e.g. "e7e5"
    pub best_move: String,
    /// Principal variation from the last info line
    pub pv: Vec<String>,
    /// Centipawn evaluation, if the engine reported one
    pub score: Option<i32>,
    /// Mate distance, if the engine reported a mate score instead
    pub mate: Option<i32>,
    /// Depth reached
    pub depth: u32,
    /// Expected reply, from `bestmove ... ponder <move>`
    pub ponder: Option<String>,
}

impl EngineSuggestion {
    /// The best move as squares, if it is a plain 4-character move
    pub fn best_move_squares(&self) -> Option<UciMove> {
        self.best_move.parse().ok()
    }

    pub fn score(&self) -> Option<Score> {
        match (self.mate, self.score) {
            (Some(m), _) => Some(Score::Mate(m)),
            (None, Some(cp)) => Some(Score::Centipawns(cp)),
            (None, None) => None,
        }
    }
}

/// Running state while consuming one request's output.
///
/// Each line produces the next state; the `bestmove` line ends the fold.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnalysisState {
    pub depth: u32,
    pub score: Option<i32>,
    pub mate: Option<i32>,
    pub pv: Vec<String>,
}

/// Outcome of folding one line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalysisStep {
    /// Keep reading
    Continue(AnalysisState),
    /// Request finished; `None` when the engine had no move to give
    Finished(Option<EngineSuggestion>),
}

impl AnalysisState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one output line into the state
    pub fn fold(self, line: &str) -> AnalysisStep {
        match UciOutputKind::parse(line) {
            UciOutputKind::Info(rest) => {
                AnalysisStep::Continue(self.with_info(&UciInfo::parse(&rest)))
            }
            UciOutputKind::BestMove(rest) => AnalysisStep::Finished(self.finish(&rest)),
            _ => AnalysisStep::Continue(self),
        }
    }

    fn with_info(self, info: &UciInfo) -> Self {
        let (score, mate) = match info.score {
            Some(Score::Centipawns(cp)) => (Some(cp), None),
            Some(Score::Mate(m)) => (self.score, Some(m)),
            None => (self.score, self.mate),
        };
        Self {
            depth: info.depth.unwrap_or(self.depth),
            score,
            mate,
            pv: if info.pv.is_empty() {
                self.pv
            } else {
                info.pv.clone()
            },
        }
    }

    fn finish(self, bestmove_args: &str) -> Option<EngineSuggestion> {
        let mut tokens = bestmove_args.split_whitespace();
        let best_move = tokens.next()?;
        if best_move == "(none)" {
            return None;
        }
        let ponder = match (tokens.next(), tokens.next()) {
            (Some("ponder"), Some(m)) => Some(m.to_string()),
            _ => None,
        };
        Some(EngineSuggestion {
            best_move: best_move.to_string(),
            pv: self.pv,
            score: self.score,
            mate: self.mate,
            depth: self.depth,
            ponder,
        })
    }
}
