use std::io;
use std::sync::mpsc::Sender;
use std::thread::{self, JoinHandle};

use signal_hook::consts::signal::{SIGINT, SIGQUIT, SIGTERM, SIGWINCH};
use signal_hook::iterator::{Handle, Signals};

use crate::terminal::TermSize;

pub fn signal_name(signal: i32) -> &'static str {
    match signal {
        SIGINT => "Interrupt",
        SIGTERM => "Terminated",
        SIGQUIT => "Quit",
        SIGWINCH => "Window changed",
        _ => "Signal",
    }
}

/// Current terminal size, or `fallback` when stdout is not a terminal.
pub fn query_size(fallback: TermSize) -> TermSize {
    match crossterm::terminal::size() {
        Ok((columns, rows)) if columns > 0 && rows > 0 => TermSize::new(columns, rows),
        Ok(_) => fallback,
        Err(error) => {
            tracing::debug!(%error, "terminal size unavailable, using fallback");
            fallback
        }
    }
}

/// Turns asynchronous signals into ordinary events handled on a dedicated
/// thread: window changes become resize messages, termination signals run
/// `on_terminate`.
pub struct SignalWatcher {
    handle: Handle,
    thread: Option<JoinHandle<()>>,
}

impl SignalWatcher {
    pub fn spawn<F>(
        resizes: Sender<TermSize>,
        fallback: TermSize,
        on_terminate: F,
    ) -> io::Result<Self>
    where
        F: Fn(i32) + Send + 'static,
    {
        let mut signals =
            Signals::new([SIGWINCH, SIGINT, SIGTERM, SIGQUIT]).map_err(io::Error::other)?;
        let handle = signals.handle();
        let thread = thread::Builder::new()
            .name("procprog-signals".to_owned())
            .spawn(move || {
                for signal in signals.forever() {
                    match signal {
                        SIGWINCH => {
                            let size = query_size(fallback);
                            tracing::debug!(
                                columns = size.columns,
                                rows = size.rows,
                                "SIGWINCH received"
                            );
                            if resizes.send(size).is_err() {
                                break;
                            }
                        }
                        SIGINT | SIGTERM | SIGQUIT => {
                            tracing::warn!(
                                signal,
                                name = signal_name(signal),
                                "termination signal received"
                            );
                            on_terminate(signal);
                        }
                        _ => {}
                    }
                }
            })?;
        Ok(Self {
            handle,
            thread: Some(thread),
        })
    }
}

impl Drop for SignalWatcher {
    fn drop(&mut self) {
        self.handle.close();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn termination_signals_have_readable_names() {
        assert_eq!(signal_name(SIGINT), "Interrupt");
        assert_eq!(signal_name(SIGTERM), "Terminated");
        assert_eq!(signal_name(SIGQUIT), "Quit");
        assert_eq!(signal_name(64), "Signal");
    }
}
