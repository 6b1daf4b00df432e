//! Engine protocol client - turns a move history into an analysis request
//! and folds the engine's answer into an [`EngineSuggestion`].
//!
//! One request at a time: `analyze` takes `&mut self`. Every `go` is counted
//! until its `bestmove` has been read. A request whose future was dropped
//! early stays counted, and its `bestmove` is skipped by whoever reads next,
//! so a late result can never be mistaken for a newer one.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::domain::uci::{
    AnalysisState, AnalysisStep, EngineSuggestion, UciCommand, UciOutputKind,
};
use crate::error::EngineResult;
use crate::models::process::{EngineProcess, EngineSettings, EngineState, LineReceiver};

/// The protocol client - wraps one engine process
pub struct EngineClient {
    process: EngineProcess,
    started: bool,
    /// `go`s sent whose `bestmove` has not been read yet
    unanswered: usize,
}

impl EngineClient {
    pub fn new(settings: EngineSettings) -> Self {
        Self {
            process: EngineProcess::new(settings),
            started: false,
            unanswered: 0,
        }
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn state(&self) -> EngineState {
        self.process.state()
    }

    pub async fn start(&mut self) -> EngineResult<()> {
        self.process.start().await?;
        self.started = true;
        Ok(())
    }

    pub fn stop(&mut self) {
        self.process.stop();
        self.started = false;
        self.unanswered = 0;
    }

    /// Ask the engine to quit, then stop it
    pub async fn shutdown(&mut self) {
        if self.started {
            if let Err(e) = self.process.send_command(&UciCommand::Quit).await {
                debug!(error = %e, "quit not delivered");
            }
        }
        self.stop();
    }

    /// Tell the engine a new game begins
    pub async fn new_game(&mut self) -> EngineResult<()> {
        if !self.started {
            return Ok(());
        }
        self.cancel_outstanding().await?;
        self.process.send_command(&UciCommand::UciNewGame).await
    }

    /// Analyze the position reached by `moves` from the standard start.
    ///
    /// If the engine was never started this launches it without waiting for
    /// the handshake and returns `Ok(None)`: there is no result for this
    /// call. `Ok(None)` is also returned when the engine output ends without
    /// a `bestmove`.
    pub async fn analyze<S: AsRef<str>>(
        &mut self,
        moves: &[S],
        depth: u32,
    ) -> EngineResult<Option<EngineSuggestion>> {
        if !self.started {
            info!("engine not started yet, starting it; no analysis for this request");
            self.process.spawn().await?;
            self.started = true;
            return Ok(None);
        }

        self.cancel_outstanding().await?;

        let position = UciCommand::startpos(moves);
        debug!(moves = moves.len(), depth, "requesting analysis");
        self.process.send_command(&position).await?;
        self.process.send_command(&UciCommand::GoDepth(depth)).await?;
        self.unanswered += 1;

        let result = match self.process.lines() {
            Some(lines) => {
                let stale = self.unanswered - 1;
                let caught_up = discard_answers(lines, &mut self.unanswered, 1).await;
                if stale > 0 {
                    debug!(stale, "skipped late results of abandoned requests");
                }
                if caught_up {
                    collect_suggestion(lines).await
                } else {
                    None
                }
            }
            None => None,
        };
        // answered, or the stream is gone and nothing more will arrive
        self.unanswered = 0;

        match &result {
            Some(s) => info!(
                best_move = %s.best_move,
                score = ?s.score,
                depth = s.depth,
                "engine suggestion"
            ),
            None => warn!("no suggestion from engine"),
        }
        Ok(result)
    }

    /// Stop abandoned searches and swallow their output up to their
    /// `bestmove`. Gives up after the handshake timeout; whatever is still
    /// unanswered then gets skipped by the next request.
    async fn cancel_outstanding(&mut self) -> EngineResult<()> {
        if self.unanswered == 0 {
            return Ok(());
        }
        debug!(unanswered = self.unanswered, "cancelling abandoned request");
        self.process.send_command(&UciCommand::Stop).await?;

        let limit: Duration = self.process.settings().handshake_timeout;
        let Some(lines) = self.process.lines() else {
            self.unanswered = 0;
            return Ok(());
        };
        let drained =
            tokio::time::timeout(limit, discard_answers(lines, &mut self.unanswered, 0)).await;
        match drained {
            Ok(true) => {}
            Ok(false) => self.unanswered = 0,
            Err(_) => warn!(
                unanswered = self.unanswered,
                ?limit,
                "abandoned request did not finish, its result will be skipped later"
            ),
        }
        Ok(())
    }
}

/// Read output until `unanswered` is down to `keep`, counting one down per
/// `bestmove` line. Returns false if the stream ended first.
pub async fn discard_answers(
    lines: &mut LineReceiver,
    unanswered: &mut usize,
    keep: usize,
) -> bool {
    while *unanswered > keep {
        let Some(line) = lines.recv().await else {
            return false;
        };
        if matches!(UciOutputKind::parse(&line), UciOutputKind::BestMove(_)) {
            debug!(%line, "discarded stale result");
            *unanswered -= 1;
        }
    }
    true
}

/// Fold lines until a `bestmove` line or the end of the stream
pub async fn collect_suggestion(lines: &mut LineReceiver) -> Option<EngineSuggestion> {
    let mut state = AnalysisState::new();
    while let Some(line) = lines.recv().await {
        match state.fold(&line) {
            AnalysisStep::Continue(next) => state = next,
            AnalysisStep::Finished(result) => return result,
        }
    }
    debug!("engine output ended before bestmove");
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn scripted(lines: &[&str]) -> LineReceiver {
        let (tx, rx) = mpsc::unbounded_channel();
        for line in lines {
            tx.send(line.to_string()).unwrap();
        }
        rx
    }

    #[tokio::test]
    async fn test_collect_scripted_suggestion() {
        let mut rx = scripted(&["info depth 10 cp 25 pv e2e4 e7e5", "bestmove e2e4"]);
        let s = collect_suggestion(&mut rx).await.unwrap();
        assert_eq!(s.best_move, "e2e4");
        assert_eq!(s.depth, 10);
        assert_eq!(s.score, Some(25));
        assert_eq!(s.pv, vec!["e2e4", "e7e5"]);
    }

    #[tokio::test]
    async fn test_collect_stream_ends_without_bestmove() {
        let mut rx = scripted(&["info depth 10 cp 25 pv e2e4 e7e5", "info depth 11"]);
        assert_eq!(collect_suggestion(&mut rx).await, None);
    }

    #[tokio::test]
    async fn test_collect_stops_at_bestmove() {
        let mut rx = scripted(&["bestmove e2e4", "info depth 3", "bestmove d2d4"]);
        assert_eq!(collect_suggestion(&mut rx).await.unwrap().best_move, "e2e4");
        // the rest is still there for the next reader
        assert_eq!(collect_suggestion(&mut rx).await.unwrap().best_move, "d2d4");
    }

    #[tokio::test]
    async fn test_discard_answers_skips_stale_results() {
        let mut rx = scripted(&[
            "info depth 9 score cp 40 pv e2e4",
            "bestmove e2e4",
            "info depth 4 score cp -5 pv d2d4",
            "bestmove d2d4",
        ]);
        let mut unanswered = 2;
        assert!(discard_answers(&mut rx, &mut unanswered, 1).await);
        assert_eq!(unanswered, 1);

        let s = collect_suggestion(&mut rx).await.unwrap();
        assert_eq!(s.best_move, "d2d4");
        assert_eq!(s.score, Some(-5));
    }

    #[tokio::test]
    async fn test_discard_answers_stream_end() {
        let mut rx = scripted(&["info depth 9", "bestmove e2e4"]);
        let mut unanswered = 3;
        assert!(!discard_answers(&mut rx, &mut unanswered, 0).await);
        assert_eq!(unanswered, 2);
    }

    #[cfg(unix)]
    mod unix {
        use super::super::*;

        /// Answers `go` with a bestmove echoing the last token of the last
        /// `position` line, after an optional delay
        fn fake_engine(go_delay: &str) -> EngineSettings {
            let body = format!(
                r#"
last=none
while read -r line; do
  case "$line" in
    uci) echo uciok ;;
    isready) echo readyok ;;
    position*) last="${{line##* }}" ;;
    go*) sleep {go_delay}; echo "info depth 10 score cp 25 pv $last e7e5"; echo "bestmove $last" ;;
    quit) exit 0 ;;
  esac
done
"#
            );
            let mut settings = EngineSettings::new("/bin/sh");
            settings.args = vec!["-c".to_string(), body];
            settings.handshake_timeout = Duration::from_secs(5);
            settings
        }

        #[tokio::test]
        async fn test_analyze_round_trip() {
            let mut client = EngineClient::new(fake_engine("0"));
            client.start().await.unwrap();

            let s = client.analyze(&["e2e4"], 12).await.unwrap().unwrap();
            assert_eq!(s.best_move, "e2e4");
            assert_eq!(s.depth, 10);
            assert_eq!(s.score, Some(25));
            assert_eq!(s.pv, vec!["e2e4", "e7e5"]);

            let s = client.analyze::<&str>(&[], 12).await.unwrap().unwrap();
            assert_eq!(s.best_move, "startpos");
            client.shutdown().await;
            assert!(!client.is_started());
        }

        #[tokio::test]
        async fn test_analyze_auto_starts_without_result() {
            let mut settings = fake_engine("0");
            settings.args[1] = settings.args[1].replace("uci) echo", "uci) sleep 1; echo");
            let mut client = EngineClient::new(settings);
            assert!(!client.is_started());

            // does not sit through the slow handshake
            let first =
                tokio::time::timeout(Duration::from_millis(500), client.analyze(&["e2e4"], 5))
                    .await;
            assert_eq!(first.unwrap().unwrap(), None);
            assert!(client.is_started());
            assert_eq!(client.state(), EngineState::Ready);

            let s = client.analyze(&["e2e4", "e7e5"], 5).await.unwrap();
            assert_eq!(s.map(|s| s.best_move).as_deref(), Some("e7e5"));
            client.stop();
        }

        #[tokio::test]
        async fn test_analyze_stream_end_is_no_result() {
            let mut settings = fake_engine("0");
            settings.args[1] = r#"
while read -r line; do
  case "$line" in
    uci) echo uciok ;;
    isready) echo readyok ;;
    go*) echo "info depth 3 score cp 7 pv a2a3"; exit 0 ;;
  esac
done
"#
            .to_string();
            let mut client = EngineClient::new(settings);
            client.start().await.unwrap();
            assert_eq!(client.analyze(&["a2a3"], 3).await.unwrap(), None);
        }

        #[tokio::test]
        async fn test_abandoned_request_is_discarded() {
            let mut client = EngineClient::new(fake_engine("0.3"));
            client.start().await.unwrap();

            // dropped before the engine answers
            let abandoned =
                tokio::time::timeout(Duration::from_millis(50), client.analyze(&["e2e4"], 5)).await;
            assert!(abandoned.is_err());

            let s = client.analyze(&["d2d4"], 5).await.unwrap().unwrap();
            assert_eq!(s.best_move, "d2d4");
            client.stop();
        }

        #[tokio::test]
        async fn test_late_result_after_cancel_timeout_is_skipped() {
            let mut settings = fake_engine("0.6");
            settings.handshake_timeout = Duration::from_millis(200);
            let mut client = EngineClient::new(settings);
            client.start().await.unwrap();

            let abandoned =
                tokio::time::timeout(Duration::from_millis(50), client.analyze(&["e2e4"], 5)).await;
            assert!(abandoned.is_err());

            // the abandoned search outlives the cancel drain
            let s = client.analyze(&["d2d4"], 5).await.unwrap().unwrap();
            assert_eq!(s.best_move, "d2d4");
            assert_eq!(client.unanswered, 0);
            client.stop();
        }

        #[tokio::test]
        async fn test_analyze_after_stop_fails_to_write() {
            let mut client = EngineClient::new(fake_engine("0"));
            client.start().await.unwrap();
            client.process.stop();

            let err = client.analyze(&["e2e4"], 5).await.unwrap_err();
            assert!(matches!(err, crate::error::EngineError::WriteFailure { .. }));
        }
    }
}
