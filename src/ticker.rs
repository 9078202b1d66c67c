use std::io;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// A timer thread. Dropping the stop channel or calling [`Ticker::stop`]
/// ends it without waiting out the current interval.
pub struct Ticker {
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

impl Ticker {
    /// Calls `tick` right away and then every `interval` until stopped or
    /// until `tick` returns false.
    pub fn every<F>(name: &str, interval: Duration, mut tick: F) -> io::Result<Self>
    where
        F: FnMut() -> bool + Send + 'static,
    {
        let (stop, stopped) = mpsc::channel::<()>();
        let handle = thread::Builder::new()
            .name(format!("procprog-{name}"))
            .spawn(move || {
                while tick() {
                    match stopped.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => continue,
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
            })?;
        Ok(Self { stop, handle })
    }

    /// Calls `fire` once after `delay` unless stopped first.
    pub fn once<F>(name: &str, delay: Duration, fire: F) -> io::Result<Self>
    where
        F: FnOnce() + Send + 'static,
    {
        let (stop, stopped) = mpsc::channel::<()>();
        let handle = thread::Builder::new()
            .name(format!("procprog-{name}"))
            .spawn(move || {
                if let Err(RecvTimeoutError::Timeout) = stopped.recv_timeout(delay) {
                    fire();
                }
            })?;
        Ok(Self { stop, handle })
    }

    pub fn stop(self) {
        let _ = self.stop.send(());
        let _ = self.handle.join();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Instant;

    fn wait_until(deadline: Duration, condition: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + deadline;
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        condition()
    }

    #[test]
    fn periodic_ticker_fires_immediately() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let ticker = Ticker::every("test-tick", Duration::from_secs(60), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            true
        })
        .expect("spawn ticker");
        assert!(wait_until(Duration::from_secs(2), || count.load(Ordering::SeqCst) == 1));
        ticker.stop();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn periodic_ticker_repeats_until_callback_declines() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let ticker = Ticker::every("test-repeat", Duration::from_millis(5), move || {
            counter.fetch_add(1, Ordering::SeqCst) < 2
        })
        .expect("spawn ticker");
        assert!(wait_until(Duration::from_secs(2), || count.load(Ordering::SeqCst) == 3));
        ticker.stop();
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn one_shot_fires_after_delay() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let ticker = Ticker::once("test-once", Duration::from_millis(10), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .expect("spawn ticker");
        assert!(wait_until(Duration::from_secs(2), || count.load(Ordering::SeqCst) == 1));
        ticker.stop();
    }

    #[test]
    fn stopped_one_shot_never_fires() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let ticker = Ticker::once("test-cancel", Duration::from_secs(60), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .expect("spawn ticker");
        ticker.stop();
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
