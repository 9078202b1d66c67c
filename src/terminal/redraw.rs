use std::io;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::state::TermSize;

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

pub trait RedrawTarget: Send + Sync + 'static {
    /// Called for every resize event. `first_in_burst` is true when no
    /// repaint is pending yet.
    fn resize_pending(&self, size: TermSize, first_in_burst: bool);
    /// Called once a burst of resizes has been quiet for the debounce window.
    fn repaint(&self);
}

/// Coalesces bursts of resize events into a single repaint.
pub struct RedrawCoordinator {
    sender: Sender<TermSize>,
    handle: JoinHandle<()>,
}

impl RedrawCoordinator {
    pub fn spawn<T: RedrawTarget>(target: T, debounce: Duration) -> io::Result<Self> {
        let (sender, receiver) = mpsc::channel();
        let handle = thread::Builder::new()
            .name("procprog-redraw".to_owned())
            .spawn(move || coordinate(&target, &receiver, debounce))?;
        Ok(Self { sender, handle })
    }

    pub fn sender(&self) -> Sender<TermSize> {
        self.sender.clone()
    }

    /// Stops once every sender is gone. A pending repaint is dropped.
    pub fn shutdown(self) {
        drop(self.sender);
        let _ = self.handle.join();
    }
}

fn coordinate<T: RedrawTarget>(target: &T, events: &Receiver<TermSize>, debounce: Duration) {
    while let Ok(size) = events.recv() {
        target.resize_pending(size, true);
        loop {
            match events.recv_timeout(debounce) {
                Ok(size) => target.resize_pending(size, false),
                Err(RecvTimeoutError::Timeout) => {
                    target.repaint();
                    break;
                }
                Err(RecvTimeoutError::Disconnected) => return,
            }
        }
    }
}
