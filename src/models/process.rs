//! Engine process supervisor - owns the child process and its pipes.
//!
//! Architecture:
//! - One reader task per output pipe decodes bytes into lines and pushes them
//!   into a single channel; the supervisor holds the only receiver
//! - A watcher task owns the `Child`, kills it on request and reports
//!   unexpected exits through a `watch` channel
//! - Commands are written straight to stdin from the caller's task

use std::io;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, trace, warn};

use crate::domain::uci::{UciCommand, UciOutputKind};
use crate::error::{EngineError, EngineResult};

/// Decoded engine output, one non-blank line per message
pub type LineReceiver = mpsc::UnboundedReceiver<String>;

const READ_CHUNK: usize = 4096;

/// Everything needed to launch and greet an engine. The path is already
/// resolved; discovery is the configuration layer's job.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub path: PathBuf,
    pub args: Vec<String>,
    /// Block in `start` until `uciok` and `readyok` were seen
    pub wait_for_ready: bool,
    pub handshake_timeout: Duration,
    /// Publish stderr lines into the same stream as stdout
    pub merge_stderr: bool,
    /// `setoption` pairs sent during the handshake
    pub options: Vec<(String, String)>,
}

impl EngineSettings {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            args: Vec::new(),
            wait_for_ready: true,
            handshake_timeout: Duration::from_secs(5),
            merge_stderr: true,
            options: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Stopped,
    Starting,
    Ready,
}

/// Splits a byte stream into trimmed, non-blank text lines
#[derive(Debug, Default)]
pub struct LineDecoder {
    pending: Vec<u8>,
}

impl LineDecoder {
    /// Buffer `bytes` and return every line completed by them
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            push_line(&mut lines, &raw);
        }
        lines
    }

    /// Flush a trailing line that never got its newline
    pub fn finish(&mut self) -> Option<String> {
        let raw = std::mem::take(&mut self.pending);
        let mut lines = Vec::new();
        push_line(&mut lines, &raw);
        lines.pop()
    }
}

fn push_line(lines: &mut Vec<String>, raw: &[u8]) {
    let text = String::from_utf8_lossy(raw);
    let text = text.trim();
    if !text.is_empty() {
        lines.push(text.to_string());
    }
}

/// Supervisor for one external engine process
pub struct EngineProcess {
    settings: EngineSettings,
    state: Arc<watch::Sender<EngineState>>,
    /// Bumped on every launch so a stale watcher cannot touch a newer process
    generation: Arc<AtomicU64>,
    stdin: Option<ChildStdin>,
    lines: Option<LineReceiver>,
    kill: Option<oneshot::Sender<()>>,
    pid: Option<u32>,
}

impl EngineProcess {
    pub fn new(settings: EngineSettings) -> Self {
        let (state, _) = watch::channel(EngineState::Stopped);
        Self {
            settings,
            state: Arc::new(state),
            generation: Arc::new(AtomicU64::new(0)),
            stdin: None,
            lines: None,
            kill: None,
            pid: None,
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn state(&self) -> EngineState {
        *self.state.borrow()
    }

    /// Watch state transitions, including unexpected exits
    pub fn subscribe_state(&self) -> watch::Receiver<EngineState> {
        self.state.subscribe()
    }

    /// OS process id of the running engine
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Launch the engine and run the handshake.
    ///
    /// Does nothing if the engine is already starting or ready.
    pub async fn start(&mut self) -> EngineResult<()> {
        self.start_with(self.settings.wait_for_ready).await
    }

    /// Launch the engine and send the handshake without waiting for the
    /// answers; they arrive on the line stream like any other output.
    pub async fn spawn(&mut self) -> EngineResult<()> {
        self.start_with(false).await
    }

    async fn start_with(&mut self, wait_for_ready: bool) -> EngineResult<()> {
        if self.state() != EngineState::Stopped {
            debug!(pid = ?self.pid, "engine already running");
            return Ok(());
        }
        // leftovers from a process that died on its own
        self.release();

        self.state.send_replace(EngineState::Starting);
        match self.launch(wait_for_ready).await {
            Ok(()) => {
                // unless the engine already died again
                self.state.send_if_modified(|s| {
                    let starting = *s == EngineState::Starting;
                    if starting {
                        *s = EngineState::Ready;
                    }
                    starting
                });
                Ok(())
            }
            Err(e) => {
                self.stop();
                Err(e)
            }
        }
    }

    async fn launch(&mut self, wait_for_ready: bool) -> EngineResult<()> {
        let path = self.settings.path.clone();
        let stderr = if self.settings.merge_stderr {
            Stdio::piped()
        } else {
            Stdio::null()
        };

        info!(path = %path.display(), "launching engine");
        let mut child = Command::new(&path)
            .args(&self.settings.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(stderr)
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| {
                error!(path = %path.display(), %source, "failed to launch engine");
                EngineError::LaunchFailure {
                    path: path.clone(),
                    source,
                }
            })?;

        let missing = |pipe: &str| EngineError::LaunchFailure {
            path: path.clone(),
            source: io::Error::other(format!("engine {pipe} was not captured")),
        };
        let stdin = child.stdin.take().ok_or_else(|| missing("stdin"))?;
        let stdout = child.stdout.take().ok_or_else(|| missing("stdout"))?;

        let (line_tx, line_rx) = mpsc::unbounded_channel();
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(pump_lines(stderr, line_tx.clone(), "stderr"));
        }
        tokio::spawn(pump_lines(stdout, line_tx, "stdout"));

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let (kill_tx, kill_rx) = oneshot::channel();
        self.pid = child.id();
        tokio::spawn(watch_exit(
            child,
            kill_rx,
            Arc::clone(&self.state),
            Arc::clone(&self.generation),
            generation,
        ));

        self.stdin = Some(stdin);
        self.lines = Some(line_rx);
        self.kill = Some(kill_tx);
        info!(pid = ?self.pid, "engine process started");

        self.send_command(&UciCommand::Uci).await?;
        for (name, value) in self.settings.options.clone() {
            self.send_command(&UciCommand::SetOption { name, value }).await?;
        }
        self.send_command(&UciCommand::IsReady).await?;

        if wait_for_ready {
            let waited = self.settings.handshake_timeout;
            match tokio::time::timeout(waited, self.await_handshake()).await {
                Ok(result) => result?,
                Err(_) => {
                    error!(?waited, "engine handshake timed out");
                    return Err(EngineError::Timeout { waited });
                }
            }
        }
        Ok(())
    }

    /// Consume output until both `uciok` and `readyok` were seen
    async fn await_handshake(&mut self) -> EngineResult<()> {
        let (mut uci_ok, mut ready_ok) = (false, false);
        while !(uci_ok && ready_ok) {
            let Some(line) = self.next_line().await else {
                return Err(EngineError::LaunchFailure {
                    path: self.settings.path.clone(),
                    source: io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "engine closed its output during the handshake",
                    ),
                });
            };
            match UciOutputKind::parse(&line) {
                UciOutputKind::UciOk => uci_ok = true,
                UciOutputKind::ReadyOk => ready_ok = true,
                UciOutputKind::Id(id) => info!("engine {id}"),
                _ => {}
            }
        }
        debug!("engine handshake complete");
        Ok(())
    }

    /// Kill the engine and drop the pipes. Returns immediately; the exit is
    /// reaped in the background.
    pub fn stop(&mut self) {
        if self.kill.is_none() && self.state() == EngineState::Stopped {
            debug!("stop called but engine is not running");
            return;
        }
        // invalidate the watcher before it sees the exit
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(kill) = self.kill.take() {
            let _ = kill.send(());
        }
        info!(pid = ?self.pid, "engine stopped");
        self.release();
        self.state.send_replace(EngineState::Stopped);
    }

    fn release(&mut self) {
        self.stdin = None;
        self.lines = None;
        self.kill = None;
        self.pid = None;
    }

    /// Write `command` plus a newline to the engine's stdin
    pub async fn send(&mut self, command: &str) -> EngineResult<()> {
        let write_failure = |source| EngineError::WriteFailure {
            command: command.to_string(),
            source,
        };
        let Some(stdin) = self.stdin.as_mut() else {
            warn!(command, "engine is not running, command dropped");
            return Err(write_failure(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "engine stdin is closed",
            )));
        };

        debug!(target: "engine::io", "> {command}");
        let line = format!("{command}\n");
        let written = match stdin.write_all(line.as_bytes()).await {
            Ok(()) => stdin.flush().await,
            Err(e) => Err(e),
        };
        written.map_err(|e| {
            warn!(command, error = %e, "engine write failed");
            write_failure(e)
        })
    }

    pub async fn send_command(&mut self, command: &UciCommand) -> EngineResult<()> {
        self.send(&command.to_uci_string()).await
    }

    /// The decoded output stream. Borrowing it mutably keeps a single reader;
    /// lines taken from it are gone for everyone else.
    pub fn lines(&mut self) -> Option<&mut LineReceiver> {
        self.lines.as_mut()
    }

    /// Next output line, `None` once the engine closed its output or was stopped
    pub async fn next_line(&mut self) -> Option<String> {
        match self.lines.as_mut() {
            Some(rx) => rx.recv().await,
            None => None,
        }
    }
}

impl Drop for EngineProcess {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn pump_lines<R>(mut reader: R, tx: mpsc::UnboundedSender<String>, source: &'static str)
where
    R: AsyncRead + Unpin,
{
    let mut decoder = LineDecoder::default();
    let mut buf = [0u8; READ_CHUNK];
    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                warn!(source, error = %e, "engine read failed");
                break;
            }
        };
        for line in decoder.feed(&buf[..n]) {
            trace!(target: "engine::io", source, "< {line}");
            if tx.send(line).is_err() {
                return;
            }
        }
    }
    if let Some(line) = decoder.finish() {
        let _ = tx.send(line);
    }
    debug!(source, "engine output closed");
}

async fn watch_exit(
    mut child: Child,
    kill: oneshot::Receiver<()>,
    state: Arc<watch::Sender<EngineState>>,
    current: Arc<AtomicU64>,
    generation: u64,
) {
    // a dropped sender counts as a kill request too
    let exited = tokio::select! {
        biased;
        _ = kill => None,
        status = child.wait() => Some(status),
    };

    match exited {
        None => {
            if let Err(e) = child.start_kill() {
                debug!(error = %e, "engine already gone");
            }
            let status = child.wait().await;
            debug!(?status, "engine reaped");
        }
        Some(status) => {
            warn!(?status, "engine exited unexpectedly");
            state.send_if_modified(|s| {
                if current.load(Ordering::SeqCst) == generation && *s != EngineState::Stopped {
                    *s = EngineState::Stopped;
                    true
                } else {
                    false
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decoder_splits_and_drops_blank_lines() {
        let mut decoder = LineDecoder::default();
        assert_eq!(decoder.feed(b"uciok\n\n   \nready"), vec!["uciok"]);
        assert_eq!(decoder.feed(b"ok\r\ninfo depth 1\n"), vec!["readyok", "info depth 1"]);
        assert_eq!(decoder.finish(), None);
    }

    #[test]
    fn test_decoder_flushes_partial_line() {
        let mut decoder = LineDecoder::default();
        assert!(decoder.feed(b"bestmove e2").is_empty());
        assert!(decoder.feed(b"e4").is_empty());
        assert_eq!(decoder.finish().as_deref(), Some("bestmove e2e4"));
        assert_eq!(decoder.finish(), None);
    }

    #[test]
    fn test_decoder_lossy_utf8() {
        let mut decoder = LineDecoder::default();
        let lines = decoder.feed(b"id name \xffFish\n");
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("id name"));
    }

    #[cfg(unix)]
    mod unix {
        use super::super::*;

        pub(crate) const FAKE_ENGINE: &str = r#"
while read -r line; do
  case "$line" in
    uci) echo "id name FakeFish"; echo ""; echo uciok ;;
    isready) echo readyok ;;
    quit) exit 0 ;;
  esac
done
"#;

        fn script(body: &str) -> EngineSettings {
            let mut settings = EngineSettings::new("/bin/sh");
            settings.args = vec!["-c".to_string(), body.to_string()];
            settings.handshake_timeout = Duration::from_secs(5);
            settings
        }

        #[tokio::test]
        async fn test_start_is_idempotent() {
            let mut engine = EngineProcess::new(script(FAKE_ENGINE));
            engine.start().await.unwrap();
            assert_eq!(engine.state(), EngineState::Ready);
            let pid = engine.pid();
            assert!(pid.is_some());

            engine.start().await.unwrap();
            assert_eq!(engine.pid(), pid);
            engine.stop();
        }

        #[tokio::test]
        async fn test_restart_spawns_new_process() {
            let mut engine = EngineProcess::new(script(FAKE_ENGINE));
            engine.start().await.unwrap();
            let first = engine.pid();
            engine.stop();
            assert_eq!(engine.state(), EngineState::Stopped);
            assert_eq!(engine.pid(), None);

            engine.start().await.unwrap();
            assert_eq!(engine.state(), EngineState::Ready);
            assert_ne!(engine.pid(), first);
        }

        #[tokio::test]
        async fn test_launch_failure() {
            let mut engine = EngineProcess::new(EngineSettings::new("/nonexistent/engine-binary"));
            let err = engine.start().await.unwrap_err();
            assert!(matches!(err, EngineError::LaunchFailure { .. }), "{err:?}");
            assert_eq!(engine.state(), EngineState::Stopped);
            assert!(engine.lines().is_none());
        }

        #[tokio::test]
        async fn test_handshake_timeout() {
            let mut settings = script("cat > /dev/null");
            settings.handshake_timeout = Duration::from_millis(200);
            let mut engine = EngineProcess::new(settings);

            let err = engine.start().await.unwrap_err();
            assert!(matches!(err, EngineError::Timeout { .. }), "{err:?}");
            assert_eq!(engine.state(), EngineState::Stopped);
        }

        #[tokio::test]
        async fn test_no_wait_skips_handshake() {
            let mut settings = script("cat > /dev/null");
            settings.wait_for_ready = false;
            let mut engine = EngineProcess::new(settings);

            engine.start().await.unwrap();
            assert_eq!(engine.state(), EngineState::Ready);
            engine.stop();
        }

        #[tokio::test]
        async fn test_spawn_leaves_handshake_on_the_stream() {
            // answers only after a pause longer than the caller is willing to wait
            let mut engine = EngineProcess::new(script(
                r#"read -r a; read -r b; sleep 1; echo uciok; echo readyok; cat > /dev/null"#,
            ));
            let spawned = tokio::time::timeout(Duration::from_millis(500), engine.spawn()).await;
            assert!(matches!(spawned, Ok(Ok(()))));
            assert_eq!(engine.state(), EngineState::Ready);

            assert_eq!(engine.next_line().await.as_deref(), Some("uciok"));
            assert_eq!(engine.next_line().await.as_deref(), Some("readyok"));
            engine.stop();
        }

        #[tokio::test]
        async fn test_send_after_stop_fails() {
            let mut engine = EngineProcess::new(script(FAKE_ENGINE));
            engine.start().await.unwrap();
            engine.stop();
            engine.stop();

            let err = engine.send("isready").await.unwrap_err();
            assert!(matches!(err, EngineError::WriteFailure { .. }), "{err:?}");
            assert_eq!(engine.next_line().await, None);
        }

        #[tokio::test]
        async fn test_lines_in_order_without_blanks() {
            let mut settings = script(r#"printf 'one\n\n  \ntwo\nthree\n'; cat > /dev/null"#);
            settings.wait_for_ready = false;
            settings.merge_stderr = false;
            let mut engine = EngineProcess::new(settings);
            engine.start().await.unwrap();

            let mut seen = Vec::new();
            for _ in 0..3 {
                seen.extend(engine.next_line().await);
            }
            assert_eq!(seen, vec!["one", "two", "three"]);
            engine.stop();
        }

        #[tokio::test]
        async fn test_stderr_is_merged() {
            let mut settings = script("echo oops >&2; cat > /dev/null");
            settings.wait_for_ready = false;
            let mut engine = EngineProcess::new(settings);
            engine.start().await.unwrap();
            assert_eq!(engine.next_line().await.as_deref(), Some("oops"));
            engine.stop();
        }

        #[tokio::test]
        async fn test_unexpected_exit_marks_stopped() {
            let mut engine = EngineProcess::new(script(
                r#"read -r a; echo uciok; read -r b; echo readyok; exit 3"#,
            ));
            let mut state = engine.subscribe_state();
            engine.start().await.unwrap();

            let stopped = tokio::time::timeout(
                Duration::from_secs(5),
                state.wait_for(|s| *s == EngineState::Stopped),
            )
            .await;
            assert!(stopped.is_ok());
            // release the watch read guard before `start` needs to write
            drop(stopped);
            assert_eq!(engine.state(), EngineState::Stopped);

            // a fresh start after the crash launches a new process
            engine.settings.args = vec!["-c".to_string(), FAKE_ENGINE.to_string()];
            engine.start().await.unwrap();
            assert_eq!(engine.state(), EngineState::Ready);
        }
    }
}
