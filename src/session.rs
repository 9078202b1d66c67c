//! One wrapped run: spawns the child, drives the live view until it exits and
//! puts the terminal back the way it was found.

use std::io::{self, IsTerminal, Read, Stdout};
use std::os::fd::AsFd;
use std::path::PathBuf;
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use nix::sys::signal::Signal;
use nix::sys::termios::{self, LocalFlags, SetArg, Termios};

use crate::config::Config;
use crate::logging::trace_bytes;
use crate::process_manager::{
    ChildInput, ChildKiller, ChildProcess, ExitOutcome, OutputChunk, ProcessManagerError,
    ProcessSpec, POLL_INTERVAL,
};
use crate::signals::{self, signal_name, SignalWatcher};
use crate::stats::StatSampler;
use crate::terminal::{
    DisplayGuard, LineRenderer, RedrawCoordinator, RenderMode, StatusLine, TerminalState,
};
use crate::ticker::Ticker;
use crate::transcript::Transcript;
use crate::ui::{NoticeLevel, OutputMode, PlainRenderer, Renderer, StatusReport};

pub const RUN_SCHEMA: &str = "procprog.run.v1";
pub const RUN_SCHEMA_VERSION: u64 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptOptions {
    pub path: PathBuf,
    pub append: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    pub spec: ProcessSpec,
    pub mode: RenderMode,
    pub transcript: Option<TranscriptOptions>,
    /// Colors in the status line.
    pub color: bool,
    pub json: bool,
}

#[derive(Debug)]
pub enum SessionError {
    Spawn(ProcessManagerError),
    TerminalWrite(io::Error),
    Transcript { path: PathBuf, error: io::Error },
    Signals(io::Error),
    RenderLoop,
    Io(io::Error),
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::Spawn(error) => write!(f, "{error}"),
            SessionError::TerminalWrite(error) => {
                write!(f, "failed writing to the terminal: {error}")
            }
            SessionError::Transcript { path, error } => {
                write!(f, "failed to open transcript {}: {error}", path.display())
            }
            SessionError::Signals(error) => {
                write!(f, "failed to install signal handlers: {error}")
            }
            SessionError::RenderLoop => write!(f, "the output render loop panicked"),
            SessionError::Io(error) => write!(f, "{error}"),
        }
    }
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SessionError::Spawn(error) => Some(error),
            SessionError::TerminalWrite(error)
            | SessionError::Transcript { error, .. }
            | SessionError::Signals(error)
            | SessionError::Io(error) => Some(error),
            SessionError::RenderLoop => None,
        }
    }
}

impl From<ProcessManagerError> for SessionError {
    fn from(value: ProcessManagerError) -> Self {
        Self::Spawn(value)
    }
}

impl From<io::Error> for SessionError {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub command: String,
    pub outcome: ExitOutcome,
    pub elapsed: Duration,
}

impl RunOutcome {
    pub fn summary_line(&self) -> String {
        format!(
            "({}) {} in {:.3}s",
            self.command,
            self.outcome.describe(),
            self.elapsed.as_secs_f64()
        )
    }

    pub fn report(&self) -> StatusReport {
        let level = match self.outcome {
            ExitOutcome::Finished => NoticeLevel::Success,
            ExitOutcome::Stopped(_) => NoticeLevel::Warning,
            ExitOutcome::NonZero(_) | ExitOutcome::Signaled(_) => NoticeLevel::Error,
        };
        StatusReport::new(level, self.summary_line())
    }

    pub fn exit_code(&self) -> i32 {
        self.outcome.exit_code()
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "schema": RUN_SCHEMA,
            "schema_version": RUN_SCHEMA_VERSION,
            "ok": self.outcome.is_success(),
            "command": self.command,
            "status": self.outcome.status_label(),
            "code": self.outcome.code(),
            "signal": self.outcome.signal(),
            "elapsed_secs": round_millis(self.elapsed),
        })
    }
}

/// A run cut short by a termination signal delivered to procprog itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interrupted {
    pub command: String,
    pub signal: i32,
    pub elapsed: Duration,
}

impl Interrupted {
    pub fn summary_line(&self) -> String {
        format!(
            "({}) {} (signal {}) after {:.3}s",
            self.command,
            signal_name(self.signal),
            self.signal,
            self.elapsed.as_secs_f64()
        )
    }

    pub fn exit_code(&self) -> i32 {
        128 + self.signal
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "schema": RUN_SCHEMA,
            "schema_version": RUN_SCHEMA_VERSION,
            "ok": false,
            "command": self.command,
            "status": "interrupted",
            "code": serde_json::Value::Null,
            "signal": self.signal,
            "elapsed_secs": round_millis(self.elapsed),
        })
    }
}

fn round_millis(elapsed: Duration) -> f64 {
    (elapsed.as_secs_f64() * 1000.0).round() / 1000.0
}

/// Terminal line discipline for stdin: canonical mode and echo are switched
/// off so keystrokes reach the child immediately and are echoed by the
/// renderer instead.
struct ConsoleMode {
    saved: Mutex<Option<Termios>>,
}

impl ConsoleMode {
    fn inactive() -> Self {
        Self {
            saved: Mutex::new(None),
        }
    }

    fn enter() -> Self {
        let stdin = io::stdin();
        if !stdin.is_terminal() {
            return Self::inactive();
        }
        let original = match termios::tcgetattr(stdin.as_fd()) {
            Ok(original) => original,
            Err(error) => {
                tracing::debug!(%error, "stdin console mode unavailable");
                return Self::inactive();
            }
        };
        let mut adjusted = original.clone();
        adjusted
            .local_flags
            .remove(LocalFlags::ICANON | LocalFlags::ECHO);
        if let Err(error) = termios::tcsetattr(stdin.as_fd(), SetArg::TCSANOW, &adjusted) {
            tracing::debug!(%error, "failed to switch stdin console mode");
            return Self::inactive();
        }
        Self {
            saved: Mutex::new(Some(original)),
        }
    }

    fn restore(&self) {
        let saved = self
            .saved
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(original) = saved {
            if let Err(error) = termios::tcsetattr(io::stdin().as_fd(), SetArg::TCSANOW, &original)
            {
                tracing::warn!(%error, "failed to restore stdin console mode");
            }
        }
    }
}

impl Drop for ConsoleMode {
    fn drop(&mut self) {
        self.restore();
    }
}

type SharedTranscript = Option<Arc<Mutex<Transcript>>>;

fn record(transcript: &SharedTranscript, bytes: &[u8]) {
    if let Some(transcript) = transcript {
        transcript
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .record(bytes);
    }
}

fn flush_transcript(transcript: &SharedTranscript) {
    if let Some(transcript) = transcript {
        transcript
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .flush();
    }
}

struct InterruptContext {
    guard: DisplayGuard<Stdout>,
    console: Arc<ConsoleMode>,
    transcript: SharedTranscript,
    killer: ChildKiller,
    command: String,
    start: Instant,
    json: bool,
}

impl InterruptContext {
    fn handle(&self, signal: i32) {
        self.guard.with(|renderer| {
            if let Err(error) = renderer.abort() {
                tracing::debug!(%error, "cleanup after interrupt failed");
            }
        });
        self.console.restore();
        flush_transcript(&self.transcript);
        if let Ok(forwarded) = Signal::try_from(signal) {
            if let Err(error) = self.killer.signal(forwarded) {
                tracing::debug!(%error, "failed to forward signal to child");
            }
        }

        let interrupted = Interrupted {
            command: self.command.clone(),
            signal,
            elapsed: self.start.elapsed(),
        };
        let mut renderer = PlainRenderer::stdout(OutputMode::from_env());
        let printed = if self.json {
            renderer.text(&interrupted.to_json().to_string())
        } else {
            renderer.report(&StatusReport::new(
                NoticeLevel::Warning,
                interrupted.summary_line(),
            ))
        };
        if let Err(error) = printed {
            tracing::debug!(%error, "failed to print interrupt summary");
        }
        std::process::exit(interrupted.exit_code());
    }
}

/// Runs the command to completion behind the live view.
pub fn run(options: &RunOptions, config: &Config) -> Result<RunOutcome, SessionError> {
    let start = Instant::now();
    let command = options.spec.display_name();

    let transcript = match &options.transcript {
        Some(target) => {
            let transcript = Transcript::open(&target.path, target.append).map_err(|error| {
                SessionError::Transcript {
                    path: target.path.clone(),
                    error,
                }
            })?;
            Some(Arc::new(Mutex::new(transcript)))
        }
        None => None,
    };

    let mut child = ChildProcess::spawn(&options.spec)?;
    tracing::info!(
        command = %options.spec.command_line(),
        pid = child.id(),
        mode = ?options.mode,
        "run started"
    );
    let killer = child.killer();
    let output = child.take_output();
    let input = child.take_input();

    let fallback = config.render.fallback_size();
    let size = signals::query_size(fallback);
    let console = Arc::new(ConsoleMode::enter());

    let renderer = LineRenderer::new(
        io::stdout(),
        TerminalState::new(size, start, options.mode),
        StatusLine::new(options.color),
        StatSampler::procfs(config.thresholds),
    );
    let guard = DisplayGuard::new(renderer);
    guard.run("start", LineRenderer::start);

    let redraw = RedrawCoordinator::spawn(guard.clone(), config.render.debounce())?;
    let interrupt = InterruptContext {
        guard: guard.clone(),
        console: Arc::clone(&console),
        transcript: transcript.clone(),
        killer,
        command: command.clone(),
        start,
        json: options.json,
    };
    let watcher = SignalWatcher::spawn(redraw.sender(), fallback, move |signal| {
        interrupt.handle(signal)
    })
    .map_err(SessionError::Signals)?;

    if let Some(input) = input {
        spawn_passthrough(input, guard.clone(), transcript.clone(), start)?;
    }

    let tick_guard = guard.clone();
    let ticker = Ticker::every("tick", config.render.tick(), move || {
        tick_guard.run("tick", |renderer| renderer.tick(Instant::now()))
    })?;
    let warmup_guard = guard.clone();
    let warmup = Ticker::once("warmup", config.render.cpu_warmup(), move || {
        warmup_guard.run("tick", |renderer| renderer.tick(Instant::now()));
    })?;

    let render_loop = match output {
        Some(output) => Some(spawn_render_loop(
            output,
            guard.clone(),
            transcript.clone(),
            killer,
            start,
        )?),
        None => None,
    };

    let outcome = wait_for_exit(&child, &guard, killer)?;
    let elapsed = start.elapsed();
    tracing::info!(
        outcome = %outcome.describe(),
        elapsed_secs = elapsed.as_secs_f64(),
        "child exited"
    );

    // A stopped child still holds the output pipe, so its reader would never
    // finish; the closed guard keeps late output off the screen instead.
    let drained = if matches!(outcome, ExitOutcome::Stopped(_)) {
        Ok(())
    } else {
        let drained = join_render_loop(render_loop);
        child.join_reader();
        drained
    };
    warmup.stop();
    ticker.stop();
    drop(watcher);
    redraw.shutdown();

    guard.close("finish", LineRenderer::finish);
    console.restore();
    flush_transcript(&transcript);

    if let Some(error) = guard.take_failure() {
        return Err(SessionError::TerminalWrite(error));
    }
    drained?;
    Ok(RunOutcome {
        command,
        outcome,
        elapsed,
    })
}

fn join_render_loop(render_loop: Option<JoinHandle<()>>) -> Result<(), SessionError> {
    match render_loop.map(JoinHandle::join) {
        Some(Err(_)) => {
            tracing::error!("render loop panicked");
            Err(SessionError::RenderLoop)
        }
        _ => Ok(()),
    }
}

fn wait_for_exit(
    child: &ChildProcess,
    guard: &DisplayGuard<Stdout>,
    killer: ChildKiller,
) -> io::Result<ExitOutcome> {
    let mut terminated = false;
    loop {
        if let Some(outcome) = child.try_wait()? {
            return Ok(outcome);
        }
        if guard.failed() && !terminated {
            tracing::error!("terminal unusable, terminating child");
            if let Err(error) = killer.signal(Signal::SIGTERM) {
                tracing::debug!(%error, "failed to terminate child");
            }
            terminated = true;
        }
        thread::sleep(POLL_INTERVAL);
    }
}

fn spawn_render_loop(
    output: Receiver<OutputChunk>,
    guard: DisplayGuard<Stdout>,
    transcript: SharedTranscript,
    killer: ChildKiller,
    start: Instant,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("procprog-render".to_owned())
        .spawn(move || {
            for chunk in output.iter() {
                record(&transcript, &chunk.bytes);
                trace_bytes("child", start.elapsed(), &chunk.bytes);
                if !guard.run("render", |renderer| renderer.feed(&chunk.bytes)) {
                    if guard.failed() {
                        if let Err(error) = killer.signal(Signal::SIGTERM) {
                            tracing::debug!(%error, "failed to terminate child");
                        }
                    }
                    break;
                }
            }
        })
}

/// Forwards our stdin to the child. Keystrokes are echoed through the
/// renderer when stdin is a terminal; at end of file the child's stdin is
/// closed.
fn spawn_passthrough(
    mut input: ChildInput,
    guard: DisplayGuard<Stdout>,
    transcript: SharedTranscript,
    start: Instant,
) -> io::Result<()> {
    let echo = io::stdin().is_terminal();
    thread::Builder::new()
        .name("procprog-stdin".to_owned())
        .spawn(move || {
            let mut stdin = io::stdin();
            let mut buffer = [0u8; 256];
            loop {
                let read = match stdin.read(&mut buffer) {
                    Ok(0) => break,
                    Ok(read) => read,
                    Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
                    Err(error) => {
                        tracing::debug!(%error, "stdin read failed");
                        break;
                    }
                };
                let bytes = &buffer[..read];
                record(&transcript, bytes);
                trace_bytes("stdin", start.elapsed(), bytes);
                if let Err(error) = input.send(bytes) {
                    tracing::debug!(%error, "child stopped accepting input");
                    break;
                }
                if echo {
                    guard.run("echo", |renderer| {
                        bytes.iter().try_for_each(|&byte| renderer.echo_input(byte))
                    });
                }
            }
        })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_lines_follow_the_outcome() {
        let run = |outcome| RunOutcome {
            command: "make".to_owned(),
            outcome,
            elapsed: Duration::from_millis(1250),
        };
        assert_eq!(
            run(ExitOutcome::Finished).summary_line(),
            "(make) finished in 1.250s"
        );
        assert_eq!(
            run(ExitOutcome::NonZero(2)).summary_line(),
            "(make) exited with non-zero status 2 in 1.250s"
        );
        assert_eq!(
            run(ExitOutcome::Signaled(9)).summary_line(),
            "(make) terminated by signal 9 in 1.250s"
        );
        assert_eq!(
            run(ExitOutcome::Stopped(19)).summary_line(),
            "(make) stopped by signal 19 in 1.250s"
        );
        assert_eq!(run(ExitOutcome::Signaled(9)).exit_code(), 137);
        assert_eq!(run(ExitOutcome::Finished).report().level, NoticeLevel::Success);
    }

    #[test]
    fn run_json_carries_schema_and_outcome() {
        let outcome = RunOutcome {
            command: "sh".to_owned(),
            outcome: ExitOutcome::NonZero(3),
            elapsed: Duration::from_millis(20),
        };
        let json = outcome.to_json();
        assert_eq!(json["schema"], RUN_SCHEMA);
        assert_eq!(json["schema_version"], 1);
        assert_eq!(json["ok"], false);
        assert_eq!(json["status"], "failed");
        assert_eq!(json["code"], 3);
        assert!(json["signal"].is_null());
        assert_eq!(json["elapsed_secs"], 0.02);
    }

    #[test]
    fn render_loop_panic_is_an_error() {
        let panicked = thread::spawn(|| panic!("render loop failure"));
        assert!(matches!(
            join_render_loop(Some(panicked)),
            Err(SessionError::RenderLoop)
        ));
        assert!(join_render_loop(Some(thread::spawn(|| ()))).is_ok());
        assert!(join_render_loop(None).is_ok());
    }

    #[test]
    fn interrupt_summary_names_the_signal() {
        let interrupted = Interrupted {
            command: "make".to_owned(),
            signal: 2,
            elapsed: Duration::from_millis(3500),
        };
        assert_eq!(
            interrupted.summary_line(),
            "(make) Interrupt (signal 2) after 3.500s"
        );
        assert_eq!(interrupted.exit_code(), 130);
        assert_eq!(interrupted.to_json()["status"], "interrupted");
    }
}
