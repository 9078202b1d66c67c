use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::redraw::RedrawTarget;
use super::render::LineRenderer;
use super::state::TermSize;

/// Shared handle to the one renderer. Every thread that touches the terminal
/// goes through [`DisplayGuard::with`] or [`DisplayGuard::run`].
pub struct DisplayGuard<W: Write> {
    renderer: Arc<Mutex<LineRenderer<W>>>,
    failure: Arc<Mutex<Option<io::Error>>>,
    closed: Arc<AtomicBool>,
}

impl<W: Write> Clone for DisplayGuard<W> {
    fn clone(&self) -> Self {
        Self {
            renderer: Arc::clone(&self.renderer),
            failure: Arc::clone(&self.failure),
            closed: Arc::clone(&self.closed),
        }
    }
}

impl<W: Write> DisplayGuard<W> {
    pub fn new(renderer: LineRenderer<W>) -> Self {
        Self {
            renderer: Arc::new(Mutex::new(renderer)),
            failure: Arc::new(Mutex::new(None)),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LineRenderer<W>> {
        // A panicking holder leaves the renderer usable for cleanup.
        self.renderer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut LineRenderer<W>) -> R) -> R {
        let mut renderer = self.lock();
        f(&mut renderer)
    }

    /// Runs a terminal operation, recording the first failure. Returns false
    /// without running `f` once the terminal has failed or been closed.
    pub fn run(
        &self,
        action: &'static str,
        f: impl FnOnce(&mut LineRenderer<W>) -> io::Result<()>,
    ) -> bool {
        let mut renderer = self.lock();
        if self.failed() || self.is_closed() {
            return false;
        }
        self.record(action, f(&mut renderer))
    }

    /// Runs the last operation on the terminal. Every later `run` is refused,
    /// so threads still holding a clone cannot write after it.
    pub fn close(
        &self,
        action: &'static str,
        f: impl FnOnce(&mut LineRenderer<W>) -> io::Result<()>,
    ) -> bool {
        let mut renderer = self.lock();
        if self.closed.swap(true, Ordering::SeqCst) || self.failed() {
            return false;
        }
        self.record(action, f(&mut renderer))
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn record(&self, action: &'static str, result: io::Result<()>) -> bool {
        match result {
            Ok(()) => true,
            Err(error) => {
                tracing::error!(action, %error, "terminal write failed");
                self.mark_failed(error);
                false
            }
        }
    }

    pub fn mark_failed(&self, error: io::Error) {
        let mut failure = self.failure.lock().unwrap_or_else(PoisonError::into_inner);
        if failure.is_none() {
            *failure = Some(error);
        }
    }

    pub fn failed(&self) -> bool {
        self.failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    pub fn take_failure(&self) -> Option<io::Error> {
        self.failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

impl<W: Write + Send + 'static> RedrawTarget for DisplayGuard<W> {
    fn resize_pending(&self, size: TermSize, first_in_burst: bool) {
        self.run("resize", |renderer| {
            renderer.begin_resize(size, first_in_burst)
        });
    }

    fn repaint(&self) {
        self.run("repaint", LineRenderer::repaint);
    }
}
