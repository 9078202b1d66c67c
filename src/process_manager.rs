use std::io::{ErrorKind, PipeReader, PipeWriter, Read, Write};
use std::path::Path;
use std::process::{ChildStdin, Command as ProcessCommand, Stdio};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use nix::sys::signal::{kill, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;

const READ_CHUNK: usize = 4096;
pub const POLL_INTERVAL: Duration = Duration::from_millis(40);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl ProcessSpec {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Basename of the program, used in summaries and log file names.
    pub fn display_name(&self) -> String {
        Path::new(&self.program)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| self.program.clone())
    }

    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<&str>>()
            .join(" ")
    }
}

/// Bytes the child wrote to stdout or stderr, in the order it wrote them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputChunk {
    pub bytes: Vec<u8>,
}

#[derive(Debug)]
pub enum ProcessManagerError {
    Pipe {
        command: String,
        error: std::io::Error,
    },
    Spawn {
        command: String,
        error: std::io::Error,
    },
    MissingStdio {
        command: String,
    },
    InputWrite {
        command: String,
        error: std::io::Error,
    },
}

impl std::fmt::Display for ProcessManagerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProcessManagerError::Pipe { command, error } => {
                write!(f, "failed to create output pipe for `{command}`: {error}")
            }
            ProcessManagerError::Spawn { command, error } => {
                write!(f, "failed to spawn `{command}`: {error}")
            }
            ProcessManagerError::MissingStdio { command } => {
                write!(f, "process `{command}` missing stdin pipe")
            }
            ProcessManagerError::InputWrite { command, error } => {
                write!(f, "failed writing input to `{command}`: {error}")
            }
        }
    }
}

impl std::error::Error for ProcessManagerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ProcessManagerError::Pipe { error, .. }
            | ProcessManagerError::Spawn { error, .. }
            | ProcessManagerError::InputWrite { error, .. } => Some(error),
            ProcessManagerError::MissingStdio { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitOutcome {
    Finished,
    NonZero(i32),
    Signaled(i32),
    Stopped(i32),
}

impl ExitOutcome {
    /// Maps a `waitpid` report to an outcome. `None` while the child runs.
    pub fn from_wait_status(status: WaitStatus) -> Option<Self> {
        match status {
            WaitStatus::Exited(_, 0) => Some(ExitOutcome::Finished),
            WaitStatus::Exited(_, code) => Some(ExitOutcome::NonZero(code)),
            WaitStatus::Signaled(_, signal, _) => Some(ExitOutcome::Signaled(signal as i32)),
            WaitStatus::Stopped(_, signal) => Some(ExitOutcome::Stopped(signal as i32)),
            _ => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ExitOutcome::Finished)
    }

    /// Status to exit with so callers see the child's result.
    pub fn exit_code(&self) -> i32 {
        match self {
            ExitOutcome::Finished => 0,
            ExitOutcome::NonZero(code) => *code,
            ExitOutcome::Signaled(signal) | ExitOutcome::Stopped(signal) => 128 + signal,
        }
    }

    pub fn status_label(&self) -> &'static str {
        match self {
            ExitOutcome::Finished => "finished",
            ExitOutcome::NonZero(_) => "failed",
            ExitOutcome::Signaled(_) => "signaled",
            ExitOutcome::Stopped(_) => "stopped",
        }
    }

    pub fn code(&self) -> Option<i32> {
        match self {
            ExitOutcome::Finished => Some(0),
            ExitOutcome::NonZero(code) => Some(*code),
            ExitOutcome::Signaled(_) | ExitOutcome::Stopped(_) => None,
        }
    }

    pub fn signal(&self) -> Option<i32> {
        match self {
            ExitOutcome::Signaled(signal) | ExitOutcome::Stopped(signal) => Some(*signal),
            ExitOutcome::Finished | ExitOutcome::NonZero(_) => None,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            ExitOutcome::Finished => "finished".to_owned(),
            ExitOutcome::NonZero(code) => format!("exited with non-zero status {code}"),
            ExitOutcome::Signaled(signal) => format!("terminated by signal {signal}"),
            ExitOutcome::Stopped(signal) => format!("stopped by signal {signal}"),
        }
    }
}

/// Write end of the child's stdin.
pub struct ChildInput {
    command: String,
    stdin: ChildStdin,
}

impl ChildInput {
    pub fn send(&mut self, bytes: &[u8]) -> Result<(), ProcessManagerError> {
        self.stdin
            .write_all(bytes)
            .and_then(|_| self.stdin.flush())
            .map_err(|error| ProcessManagerError::InputWrite {
                command: self.command.clone(),
                error,
            })
    }
}

pub struct ChildProcess {
    pid: Pid,
    outcome: Mutex<Option<ExitOutcome>>,
    input: Option<ChildInput>,
    output: Option<Receiver<OutputChunk>>,
    reader: Option<JoinHandle<()>>,
}

impl ChildProcess {
    /// Spawns the command with stdin piped and stdout and stderr sharing one
    /// pipe, so the output channel carries the child's merged stream in
    /// write order. The child stays in our process group and keeps the
    /// controlling terminal.
    pub fn spawn(spec: &ProcessSpec) -> Result<Self, ProcessManagerError> {
        let command = spec.command_line();
        let pipe_error = |error| ProcessManagerError::Pipe {
            command: command.clone(),
            error,
        };
        let (reader, writer) = std::io::pipe().map_err(pipe_error)?;
        let stderr_writer = writer.try_clone().map_err(pipe_error)?;

        // The command owns the parent's copies of the write end; dropping it
        // right after the spawn lets the reader see end of file once the
        // child and its descendants close theirs.
        let mut process = build_command(spec, writer, stderr_writer);
        let spawned = process.spawn();
        drop(process);
        let mut child = spawned.map_err(|error| ProcessManagerError::Spawn {
            command: command.clone(),
            error,
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ProcessManagerError::MissingStdio {
                command: command.clone(),
            })?;
        let (output_tx, output_rx) = mpsc::channel::<OutputChunk>();
        let reader = spawn_reader(reader, output_tx);
        let pid = Pid::from_raw(child.id() as i32);
        tracing::debug!(pid = pid.as_raw(), command = %command, "child spawned");

        Ok(Self {
            pid,
            outcome: Mutex::new(None),
            input: Some(ChildInput { command, stdin }),
            output: Some(output_rx),
            reader: Some(reader),
        })
    }

    pub fn id(&self) -> u32 {
        self.pid.as_raw() as u32
    }

    pub fn take_input(&mut self) -> Option<ChildInput> {
        self.input.take()
    }

    /// The receiving end of the output channel. It disconnects once every
    /// holder of the pipe's write end has closed it.
    pub fn take_output(&mut self) -> Option<Receiver<OutputChunk>> {
        self.output.take()
    }

    /// Reports exits, deaths by signal and stops without blocking.
    pub fn try_wait(&self) -> std::io::Result<Option<ExitOutcome>> {
        let mut outcome = self.outcome.lock().unwrap_or_else(PoisonError::into_inner);
        if outcome.is_some() {
            return Ok(*outcome);
        }
        let status = waitpid(
            self.pid,
            Some(WaitPidFlag::WNOHANG | WaitPidFlag::WUNTRACED),
        )?;
        *outcome = ExitOutcome::from_wait_status(status);
        Ok(*outcome)
    }

    /// Polls until the child exits or stops.
    pub fn wait(&self) -> std::io::Result<ExitOutcome> {
        loop {
            if let Some(outcome) = self.try_wait()? {
                return Ok(outcome);
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    pub fn signal(&self, signal: Signal) -> Result<(), nix::Error> {
        self.killer().signal(signal)
    }

    /// A handle that can signal the child from another thread.
    pub fn killer(&self) -> ChildKiller {
        ChildKiller { pid: self.pid }
    }

    pub fn join_reader(&mut self) {
        if let Some(reader) = self.reader.take() {
            if reader.join().is_err() {
                tracing::error!("child output reader panicked");
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ChildKiller {
    pid: Pid,
}

impl ChildKiller {
    pub fn signal(&self, signal: Signal) -> Result<(), nix::Error> {
        kill(self.pid, signal)
    }
}

fn build_command(spec: &ProcessSpec, stdout: PipeWriter, stderr: PipeWriter) -> ProcessCommand {
    let mut process = ProcessCommand::new(&spec.program);
    process
        .args(&spec.args)
        .stdin(Stdio::piped())
        .stdout(Stdio::from(stdout))
        .stderr(Stdio::from(stderr));
    process
}

fn spawn_reader(mut stream: PipeReader, tx: Sender<OutputChunk>) -> JoinHandle<()> {
    thread::spawn(move || {
        let mut buffer = [0u8; READ_CHUNK];
        loop {
            match stream.read(&mut buffer) {
                Ok(0) => break,
                Ok(read) => {
                    let chunk = OutputChunk {
                        bytes: buffer[..read].to_vec(),
                    };
                    if tx.send(chunk).is_err() {
                        break;
                    }
                }
                Err(error) if error.kind() == ErrorKind::Interrupted => continue,
                Err(error) => {
                    tracing::debug!(%error, "child output read failed");
                    break;
                }
            }
        }
    })
}
