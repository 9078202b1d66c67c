pub mod config;
pub mod logging;
pub mod process_manager;
pub mod session;
pub mod signals;
pub mod stats;
pub mod terminal;
pub mod ticker;
pub mod transcript;
pub mod ui;

use std::path::PathBuf;

use crate::process_manager::ProcessSpec;
use crate::session::{RunOptions, TranscriptOptions};
use crate::terminal::RenderMode;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Run(RunArgs),
    Help,
    Version,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunArgs {
    pub spec: ProcessSpec,
    pub verbose: bool,
    pub output: Option<PathBuf>,
    pub append: bool,
    pub debug: bool,
    pub json: bool,
}

impl RunArgs {
    pub fn run_options(&self, color: bool) -> RunOptions {
        RunOptions {
            spec: self.spec.clone(),
            mode: if self.verbose {
                RenderMode::Verbose
            } else {
                RenderMode::Compact
            },
            transcript: self.output.as_ref().map(|path| TranscriptOptions {
                path: path.clone(),
                append: self.append,
            }),
            color,
            json: self.json,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliParseError {
    MissingCommand,
    MissingOutputValue,
    AppendWithoutOutput,
    UnknownArgument(String),
}

impl std::fmt::Display for CliParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliParseError::MissingCommand => write!(f, "no command given"),
            CliParseError::MissingOutputValue => write!(f, "--output requires a file name"),
            CliParseError::AppendWithoutOutput => {
                write!(f, "--append only makes sense together with --output FILE")
            }
            CliParseError::UnknownArgument(arg) => write!(f, "unknown argument: {arg}"),
        }
    }
}

impl std::error::Error for CliParseError {}

pub fn parse_command<I>(args: I) -> Result<Command, CliParseError>
where
    I: IntoIterator<Item = String>,
{
    let mut args = args.into_iter();
    let mut verbose = false;
    let mut output: Option<PathBuf> = None;
    let mut append = false;
    let mut debug = false;
    let mut json = false;

    let program = loop {
        let Some(arg) = args.next() else {
            return Err(CliParseError::MissingCommand);
        };
        match arg.as_str() {
            "--help" | "-h" => return Ok(Command::Help),
            "--version" => return Ok(Command::Version),
            "--verbose" | "-v" => verbose = true,
            "--append" | "-a" => append = true,
            "--debug" | "-d" => debug = true,
            "--json" => json = true,
            "--output" | "-o" => {
                let Some(path) = args.next() else {
                    return Err(CliParseError::MissingOutputValue);
                };
                output = Some(PathBuf::from(path));
            }
            "--" => match args.next() {
                Some(program) => break program,
                None => return Err(CliParseError::MissingCommand),
            },
            other => {
                if let Some(path) = other.strip_prefix("--output=") {
                    if path.is_empty() {
                        return Err(CliParseError::MissingOutputValue);
                    }
                    output = Some(PathBuf::from(path));
                } else if other.starts_with('-') && other != "-" {
                    return Err(CliParseError::UnknownArgument(other.to_owned()));
                } else {
                    break arg;
                }
            }
        }
    };

    if append && output.is_none() {
        return Err(CliParseError::AppendWithoutOutput);
    }

    Ok(Command::Run(RunArgs {
        spec: ProcessSpec::new(program, args.collect()),
        verbose,
        output,
        append,
        debug,
        json,
    }))
}

pub fn render_help() -> String {
    let name = env!("CARGO_PKG_NAME");
    format!(
        "{name}\n\nUSAGE:\n  {name} [OPTIONS] [--] COMMAND [ARG]...\n\nRuns COMMAND and shows its output as one rolling line, with a status line\n(elapsed time, cpu, memory, network and disk load) pinned to the bottom.\n\nOPTIONS:\n  -v, --verbose        Keep the full scrollback instead of a single line\n  -o, --output FILE    Write a raw transcript of the run to FILE (also --output=FILE)\n  -a, --append         With --output, append to FILE instead of overwriting it\n  -d, --debug          Write a debug log to <command>_<unix-seconds>.log\n      --json           Print the final run summary as JSON\n  -h, --help           Print help\n      --version        Print version\n\nENVIRONMENT:\n  PROCPROG_CONFIG      Config file (default: $XDG_CONFIG_HOME/procprog/config.toml)\n  PROCPROG_COLOR       auto | always | never\n  PROCPROG_LOG         Debug log filter directives (default: procprog=trace)\n"
    )
}

pub fn render_version() -> String {
    format!("{} {}\n", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
}

pub fn print_usage() {
    eprint!("{}", render_help());
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
