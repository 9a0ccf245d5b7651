//! Debounced background saves
//!
//! A dedicated thread waits for `schedule` calls and runs the flush callback
//! once the oldest unsaved change is `debounce` old. Bursts of changes inside
//! that window collapse into one save. Dropping the persister flushes any
//! pending change before the thread exits.

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::debug;

#[derive(Debug, Default)]
struct FlushState {
    /// When the oldest unsaved change happened, `None` when clean
    dirty_since: Option<Instant>,
    shutdown: bool,
}

#[derive(Debug, Default)]
struct Signal {
    state: Mutex<FlushState>,
    cond: Condvar,
}

/// Handle to the background save thread
pub(crate) struct Persister {
    signal: Arc<Signal>,
    handle: Option<JoinHandle<()>>,
}

impl Persister {
    /// Start the save thread
    pub(crate) fn spawn<F>(debounce: Duration, flush: F) -> io::Result<Self>
    where
        F: Fn() + Send + 'static,
    {
        let signal = Arc::new(Signal::default());
        let thread_signal = Arc::clone(&signal);
        let handle = thread::Builder::new()
            .name("tm-persister".to_string())
            .spawn(move || run(&thread_signal, debounce, flush))?;

        Ok(Self {
            signal,
            handle: Some(handle),
        })
    }

    /// Note an unsaved change
    pub(crate) fn schedule(&self) {
        let mut state = self.signal.state.lock();
        if state.dirty_since.is_none() {
            state.dirty_since = Some(Instant::now());
            self.signal.cond.notify_one();
        }
    }

    /// Forget pending changes; the caller is about to save synchronously
    pub(crate) fn mark_flushed(&self) {
        self.signal.state.lock().dirty_since = None;
    }
}

impl Drop for Persister {
    fn drop(&mut self) {
        self.signal.state.lock().shutdown = true;
        self.signal.cond.notify_one();

        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn run<F: Fn()>(signal: &Signal, debounce: Duration, flush: F) {
    let mut state = signal.state.lock();

    loop {
        if state.shutdown {
            break;
        }

        let Some(since) = state.dirty_since else {
            signal.cond.wait(&mut state);
            continue;
        };

        let due = since + debounce;
        if Instant::now() < due {
            signal.cond.wait_until(&mut state, due);
            continue;
        }

        state.dirty_since = None;
        MutexGuard::unlocked(&mut state, &flush);
    }

    let pending = state.dirty_since.take().is_some();
    drop(state);

    if pending {
        debug!("Flushing pending changes before persister shutdown");
        flush();
    }
}
