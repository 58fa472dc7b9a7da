//! Cooperative cancellation and per-call deadlines.
//!
//! Model calls and query execution run on a worker thread while the caller
//! polls for completion, for the cancel flag and for the deadline.
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::mpsc;
use std::sync::mpsc::RecvTimeoutError;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use std::time::Instant;

/// How often a waiting caller checks the cancel flag.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Shared flag signalling that a question should stop.
///
/// Clones observe the same flag, so one can be handed to another thread
/// and set from there.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Why a call run through [`run_with_deadline`] produced no value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Interrupted {
    Timeout,
    Cancelled,
    /// The worker thread ended without a result (it panicked)
    Failed,
}

/// Runs `task` on a worker thread and waits at most `timeout` for it.
///
/// On timeout or cancellation `on_interrupt` is called so the caller can stop
/// the in-flight work; the worker's eventual result is then discarded.
pub(crate) fn run_with_deadline<T, F, I>(
    task: F,
    timeout: Duration,
    cancel: &CancelToken,
    on_interrupt: I,
) -> Result<T, Interrupted>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
    I: FnOnce(),
{
    if cancel.is_cancelled() {
        return Err(Interrupted::Cancelled);
    }
    let (sender, receiver) = mpsc::channel();
    thread::spawn(move || {
        let _ = sender.send(task());
    });

    let deadline = Instant::now() + timeout;
    loop {
        let wait = deadline.saturating_duration_since(Instant::now()).min(POLL_INTERVAL);
        match receiver.recv_timeout(wait) {
            Ok(value) => return Ok(value),
            Err(RecvTimeoutError::Disconnected) => return Err(Interrupted::Failed),
            Err(RecvTimeoutError::Timeout) => {
                if cancel.is_cancelled() {
                    on_interrupt();
                    return Err(Interrupted::Cancelled);
                }
                if Instant::now() >= deadline {
                    on_interrupt();
                    return Err(Interrupted::Timeout);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn returns_the_value() {
        let value = run_with_deadline(|| 42, Duration::from_secs(1), &CancelToken::new(), || {});
        assert_eq!(value, Ok(42));
    }

    #[test]
    fn times_out_and_interrupts() {
        let interrupts = AtomicUsize::new(0);
        let result = run_with_deadline(
            || thread::sleep(Duration::from_millis(500)),
            Duration::from_millis(50),
            &CancelToken::new(),
            || {
                interrupts.fetch_add(1, Ordering::SeqCst);
            },
        );
        assert_eq!(result, Err(Interrupted::Timeout));
        assert_eq!(interrupts.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn cancellation_from_another_thread() {
        let cancel = CancelToken::new();
        let remote = cancel.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            remote.cancel();
        });
        let result = run_with_deadline(|| thread::sleep(Duration::from_secs(2)), Duration::from_secs(5), &cancel, || {});
        assert_eq!(result, Err(Interrupted::Cancelled));
    }

    #[test]
    fn already_cancelled_never_starts() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let result = run_with_deadline(|| panic!("should not run"), Duration::from_secs(1), &cancel, || {});
        assert_eq!(result, Err::<(), _>(Interrupted::Cancelled));
    }

    #[test]
    fn panicking_task_fails() {
        let result = run_with_deadline(|| -> u8 { panic!("boom") }, Duration::from_secs(1), &CancelToken::new(), || {});
        assert_eq!(result, Err(Interrupted::Failed));
    }
}
