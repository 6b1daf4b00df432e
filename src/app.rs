//! Terminal front end: reads commands from stdin, keeps a game and talks to
//! the engine.

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::domain::{EngineSuggestion, PieceColor, Square};
use crate::models::{EngineClient, EngineSettings, GameSession};

/// One line of user input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// A move in wire notation, e.g. "e2e4"
    Move(String),
    /// Legal destinations from a square
    Targets(Square),
    Hint,
    Undo,
    Reset,
    Board,
    History,
    Help,
    Quit,
}

impl Command {
    pub fn parse(input: &str) -> Option<Self> {
        let mut words = input.split_whitespace();
        let first = words.next()?;
        let command = match first {
            "hint" | "analyze" => Command::Hint,
            "undo" => Command::Undo,
            "reset" | "new" => Command::Reset,
            "board" => Command::Board,
            "history" => Command::History,
            "help" | "?" => Command::Help,
            "quit" | "exit" => Command::Quit,
            "moves" => Command::Targets(words.next()?.parse().ok()?),
            mv if mv.len() == 4 => Command::Move(mv.to_string()),
            _ => return None,
        };
        Some(command)
    }
}

const HELP: &str = "\
commands:
  e2e4         play a move
  moves <sq>   list legal destinations from a square
  hint         ask the engine for the best move
  undo         take back the last move
  reset        start a new game
  board        print the board
  history      print the moves so far
  quit         leave";

/// The running application
pub struct App {
    game: GameSession,
    engine: Option<EngineClient>,
    depth: u32,
    ai_color: Option<PieceColor>,
}

impl App {
    pub fn new(config: &AppConfig, settings: Option<EngineSettings>) -> Self {
        Self {
            game: GameSession::new(),
            engine: settings.map(EngineClient::new),
            depth: config.analysis.depth,
            ai_color: config.analysis.ai_color,
        }
    }

    pub fn game(&self) -> &GameSession {
        &self.game
    }

    /// The board diagram followed by whose turn it is
    fn position_text(&self) -> String {
        format!("{}\n{} to move", self.game.board(), self.game.turn().display_name())
    }

    /// Handle one command; returns false when the user wants to leave
    pub async fn handle(&mut self, command: Command) -> bool {
        match command {
            Command::Move(notation) => match self.game.play_notation(&notation) {
                Ok(record) => {
                    println!("{}", record.display_text());
                    println!("{}", self.position_text());
                    self.engine_reply().await;
                }
                Err(e) => println!("{e}"),
            },
            Command::Targets(from) => {
                let targets: Vec<String> = self
                    .game
                    .legal_targets(from)
                    .iter()
                    .map(|sq| sq.notation())
                    .collect();
                if targets.is_empty() {
                    println!("no legal moves from {from}");
                } else {
                    println!("{from}: {}", targets.join(" "));
                }
            }
            Command::Hint => {
                if let Some(suggestion) = self.analyze().await {
                    println!("{}", describe(&suggestion));
                }
            }
            Command::Undo => match self.game.undo() {
                Some(record) => {
                    println!("took back {}", record.display_text());
                    println!("{}", self.position_text());
                }
                None => println!("nothing to undo"),
            },
            Command::Reset => {
                self.game.reset();
                if let Some(engine) = self.engine.as_mut() {
                    if let Err(e) = engine.new_game().await {
                        warn!(error = %e, "engine did not take the new game");
                    }
                }
                println!("{}", self.position_text());
                self.engine_reply().await;
            }
            Command::Board => println!("{}", self.position_text()),
            Command::History => {
                let lines: Vec<String> = self
                    .game
                    .history()
                    .iter()
                    .map(|r| r.display_text())
                    .collect();
                println!("{}", lines.join("\n"));
            }
            Command::Help => println!("{HELP}"),
            Command::Quit => return false,
        }
        true
    }

    async fn analyze(&mut self) -> Option<EngineSuggestion> {
        let Some(engine) = self.engine.as_mut() else {
            println!("no engine configured");
            return None;
        };
        let history = self.game.history_notations();
        match engine.analyze(&history, self.depth).await {
            Ok(Some(suggestion)) => Some(suggestion),
            Ok(None) => {
                println!("no suggestion yet");
                None
            }
            Err(e) => {
                println!("engine error: {e}");
                None
            }
        }
    }

    /// Let the engine move when it is its turn
    async fn engine_reply(&mut self) {
        if self.ai_color != Some(self.game.turn()) {
            return;
        }
        let Some(suggestion) = self.analyze().await else {
            return;
        };
        match self.game.apply_suggestion(&suggestion) {
            Ok(record) => {
                println!("{}  ({})", record.display_text(), describe(&suggestion));
                println!("{}", self.position_text());
            }
            Err(e) => warn!(error = %e, best_move = %suggestion.best_move, "engine move rejected"),
        }
    }

    /// Start the engine up front so the first request already gets an answer
    pub async fn start_engine(&mut self) {
        if let Some(engine) = self.engine.as_mut() {
            if let Err(e) = engine.start().await {
                warn!(error = %e, "engine unavailable, analysis disabled until restart");
            }
        }
    }

    pub async fn shutdown(&mut self) {
        if let Some(engine) = self.engine.as_mut() {
            engine.shutdown().await;
        }
    }
}

fn describe(suggestion: &EngineSuggestion) -> String {
    let eval = suggestion
        .score()
        .map(|s| s.display())
        .unwrap_or_else(|| "?".to_string());
    let leaning = match suggestion.score().map(|s| s.as_centipawns().signum()) {
        Some(1) => ", side to move is better",
        Some(-1) => ", side to move is worse",
        _ => "",
    };
    format!(
        "best {} eval {}{} depth {} pv {}",
        suggestion.best_move,
        eval,
        leaning,
        suggestion.depth,
        suggestion.pv.join(" ")
    )
}

/// Run the read-eval-print loop until stdin closes or the user quits
pub async fn run(config: AppConfig, settings: Option<EngineSettings>) -> Result<()> {
    let mut app = App::new(&config, settings);
    app.start_engine().await;

    println!("{}", app.position_text());
    println!("type 'help' for commands");
    app.engine_reply().await;

    let mut input = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = input.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Some(command) = Command::parse(line) else {
            println!("unknown command {line:?}, try 'help'");
            continue;
        };
        if !app.handle(command).await {
            break;
        }
    }

    app.shutdown().await;
    info!("bye");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse("e2e4"), Some(Command::Move("e2e4".to_string())));
        assert_eq!(Command::parse("  undo "), Some(Command::Undo));
        assert_eq!(Command::parse("hint"), Some(Command::Hint));
        assert_eq!(
            Command::parse("moves g1"),
            Some(Command::Targets("g1".parse().unwrap()))
        );
        assert_eq!(Command::parse("moves z9"), None);
        assert_eq!(Command::parse("moves"), None);
        assert_eq!(Command::parse("dance"), None);
        assert_eq!(Command::parse(""), None);
    }

    #[tokio::test]
    async fn test_moves_without_engine() {
        let mut app = App::new(&AppConfig::default(), None);
        assert!(app.handle(Command::Move("e2e4".to_string())).await);
        assert!(app.handle(Command::Move("e2e4".to_string())).await);
        assert_eq!(app.game().history_notations(), vec!["e2e4"]);

        assert!(app.handle(Command::Hint).await);
        assert!(app.handle(Command::Undo).await);
        assert!(app.game().history().is_empty());
        assert!(!app.handle(Command::Quit).await);
    }

    #[tokio::test]
    async fn test_position_text_names_side_to_move() {
        let mut app = App::new(&AppConfig::default(), None);
        assert!(app.position_text().ends_with("White to move"));
        app.handle(Command::Move("e2e4".to_string())).await;
        assert!(app.position_text().ends_with("Black to move"));
    }

    #[test]
    fn test_describe() {
        let suggestion = EngineSuggestion {
            best_move: "e2e4".to_string(),
            pv: vec!["e2e4".to_string(), "e7e5".to_string()],
            score: Some(25),
            mate: None,
            depth: 10,
            ponder: None,
        };
        assert_eq!(
            describe(&suggestion),
            "best e2e4 eval +0.25, side to move is better depth 10 pv e2e4 e7e5"
        );
    }
}
