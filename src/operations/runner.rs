//! Operation runner

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, bounded};
use tracing::{info, warn};

use super::OperationError;
use crate::cancel::CancelToken;

/// What an operation does, for display
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Delete,
    GenerateTree,
}

impl OperationKind {
    pub fn label(self) -> &'static str {
        match self {
            OperationKind::Delete => "delete",
            OperationKind::GenerateTree => "generate tree",
        }
    }
}

/// Progress counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Progress {
    pub total: usize,
    pub done: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Items currently being worked on, in start order
    pub processing: Vec<String>,
}

/// How an operation ended
#[derive(Debug, Clone)]
pub enum Outcome {
    Completed,
    Failed(OperationError),
    Cancelled,
}

impl Outcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Outcome::Completed)
    }
}

/// Events delivered to the progress sink
#[derive(Debug, Clone)]
pub enum OperationEvent {
    Progress(Progress),
    /// Always the last event, delivered exactly once
    Finished(Outcome),
}

/// Receives every event of an operation, on the operation's threads
pub type ProgressSink = Box<dyn FnMut(OperationEvent) + Send>;

/// Handed to the running action
pub struct OperationContext {
    cancel: CancelToken,
    progress: Arc<Mutex<Progress>>,
    sink: Mutex<Option<ProgressSink>>,
}

impl OperationContext {
    fn new(cancel: CancelToken, progress: Arc<Mutex<Progress>>, sink: Option<ProgressSink>) -> Self {
        Self {
            cancel,
            progress,
            sink: Mutex::new(sink),
        }
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Fail with [`OperationError::Cancelled`] once cancellation was requested
    pub fn check_cancelled(&self) -> Result<(), OperationError> {
        if self.is_cancelled() {
            Err(OperationError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Modify the progress counters and report the result to the sink
    pub fn update(&self, f: impl FnOnce(&mut Progress)) {
        let snapshot = {
            let mut progress = self.progress.lock().unwrap_or_else(PoisonError::into_inner);
            f(&mut progress);
            progress.clone()
        };
        self.emit(OperationEvent::Progress(snapshot));
    }

    /// Mark `item` as being worked on
    pub fn begin_item(&self, item: &str) {
        self.update(|p| p.processing.push(item.to_string()));
    }

    /// Mark `item` as no longer being worked on, then apply `f`
    pub fn end_item(&self, item: &str, f: impl FnOnce(&mut Progress)) {
        self.update(|p| {
            if let Some(pos) = p.processing.iter().position(|i| i == item) {
                p.processing.remove(pos);
            }
            f(p);
        });
    }

    /// Replace the progress counters
    pub fn report(&self, progress: Progress) {
        self.update(|p| *p = progress);
    }

    fn emit(&self, event: OperationEvent) {
        let mut sink = self.sink.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(sink) = sink.as_mut() {
            sink(event);
        }
    }
}

/// Starts operations
pub struct Operation;

impl Operation {
    /// Run `action` on a background thread and return immediately.
    ///
    /// The sink sees every progress update and then exactly one
    /// [`OperationEvent::Finished`].
    pub fn run<F>(kind: OperationKind, action: F, on_progress: Option<ProgressSink>) -> OperationHandle
    where
        F: FnOnce(&OperationContext) -> Result<(), OperationError> + Send + 'static,
    {
        let cancel = CancelToken::new();
        let progress = Arc::new(Mutex::new(Progress::default()));
        let finished = Arc::new(AtomicBool::new(false));
        let (done_tx, done_rx) = bounded::<Outcome>(1);

        let ctx = OperationContext::new(cancel.clone(), Arc::clone(&progress), on_progress);
        let thread_finished = Arc::clone(&finished);
        info!("starting {}", kind.label());

        thread::spawn(move || {
            let outcome = match panic::catch_unwind(AssertUnwindSafe(|| action(&ctx))) {
                Ok(Ok(())) => Outcome::Completed,
                Ok(Err(OperationError::Cancelled)) => Outcome::Cancelled,
                Ok(Err(e)) => Outcome::Failed(e),
                Err(_) => Outcome::Failed(OperationError::Aborted),
            };
            match &outcome {
                Outcome::Completed => info!("{} completed", kind.label()),
                Outcome::Cancelled => info!("{} cancelled", kind.label()),
                Outcome::Failed(e) => warn!("{} failed: {}", kind.label(), e),
            }
            ctx.emit(OperationEvent::Finished(outcome.clone()));
            thread_finished.store(true, Ordering::Release);
            let _ = done_tx.send(outcome);
        });

        OperationHandle {
            kind,
            cancel,
            progress,
            finished,
            done_rx,
        }
    }
}

/// Handle to a running operation. Dropping it before the operation finished
/// cancels the operation.
pub struct OperationHandle {
    kind: OperationKind,
    cancel: CancelToken,
    progress: Arc<Mutex<Progress>>,
    finished: Arc<AtomicBool>,
    done_rx: Receiver<Outcome>,
}

impl OperationHandle {
    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// Latest reported progress
    pub fn progress(&self) -> Progress {
        self.progress
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Block until the operation ends
    pub fn wait(self) -> Outcome {
        self.done_rx
            .recv()
            .unwrap_or(Outcome::Failed(OperationError::Aborted))
    }

    /// Block up to `timeout`; gives the handle back if still running.
    pub fn wait_timeout(self, timeout: Duration) -> Result<Outcome, OperationHandle> {
        match self.done_rx.recv_timeout(timeout) {
            Ok(outcome) => Ok(outcome),
            Err(RecvTimeoutError::Timeout) => Err(self),
            Err(RecvTimeoutError::Disconnected) => Ok(Outcome::Failed(OperationError::Aborted)),
        }
    }
}

impl Drop for OperationHandle {
    fn drop(&mut self) {
        if !self.is_finished() {
            self.cancel.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Instant;

    #[test]
    fn sink_sees_progress_then_one_finish() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&events);
        let handle = Operation::run(
            OperationKind::Delete,
            |ctx| {
                for i in 1..=3 {
                    ctx.update(|p| {
                        p.total = 3;
                        p.done = i;
                    });
                }
                Ok(())
            },
            Some(Box::new(move |e| seen.lock().unwrap().push(e))),
        );
        assert!(handle.wait().is_completed());

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 4);
        assert!(matches!(events[2], OperationEvent::Progress(Progress { done: 3, .. })));
        assert!(matches!(events[3], OperationEvent::Finished(Outcome::Completed)));
    }

    #[test]
    fn dropping_the_handle_cancels() {
        let (tx, rx) = bounded(1);
        let handle = Operation::run(
            OperationKind::GenerateTree,
            move |ctx| {
                let start = Instant::now();
                while !ctx.is_cancelled() {
                    if start.elapsed() > Duration::from_secs(5) {
                        let _ = tx.send(false);
                        return Ok(());
                    }
                    thread::sleep(Duration::from_millis(5));
                }
                let _ = tx.send(true);
                ctx.check_cancelled()
            },
            None,
        );
        assert_eq!(handle.kind(), OperationKind::GenerateTree);
        drop(handle);
        assert_eq!(rx.recv_timeout(Duration::from_secs(10)), Ok(true));
    }

    #[test]
    fn cancel_maps_to_cancelled_outcome() {
        let handle = Operation::run(
            OperationKind::Delete,
            |ctx| {
                while !ctx.is_cancelled() {
                    thread::sleep(Duration::from_millis(2));
                }
                ctx.check_cancelled()
            },
            None,
        );
        handle.cancel();
        assert!(matches!(handle.wait(), Outcome::Cancelled));
    }

    #[test]
    fn panicking_action_still_finishes() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&events);
        let handle = Operation::run(
            OperationKind::Delete,
            |ctx| {
                ctx.begin_item("/d/a");
                panic!("backend contract violated");
            },
            Some(Box::new(move |e| seen.lock().unwrap().push(e))),
        );

        let start = Instant::now();
        while !handle.is_finished() && start.elapsed() < Duration::from_secs(5) {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(handle.is_finished());
        assert!(matches!(
            handle.wait(),
            Outcome::Failed(OperationError::Aborted)
        ));

        let events = events.lock().unwrap();
        let finished = events
            .iter()
            .filter(|e| matches!(e, OperationEvent::Finished(_)))
            .count();
        assert_eq!(finished, 1);
        assert!(matches!(
            events.last(),
            Some(OperationEvent::Finished(Outcome::Failed(OperationError::Aborted)))
        ));
    }

    #[test]
    fn items_in_flight_are_tracked_together() {
        let handle = Operation::run(
            OperationKind::GenerateTree,
            |ctx| {
                ctx.begin_item("/r/a");
                ctx.begin_item("/r/b");
                ctx.end_item("/r/a", |p| p.done += 1);
                Ok(())
            },
            None,
        );
        let start = Instant::now();
        while !handle.is_finished() && start.elapsed() < Duration::from_secs(5) {
            thread::sleep(Duration::from_millis(5));
        }
        let progress = handle.progress();
        assert_eq!(progress.processing, vec!["/r/b".to_string()]);
        assert_eq!(progress.done, 1);
    }

    #[test]
    fn handle_reports_latest_progress() {
        let handle = Operation::run(
            OperationKind::Delete,
            |ctx| {
                ctx.report(Progress {
                    total: 2,
                    done: 2,
                    ..Default::default()
                });
                Ok(())
            },
            None,
        );
        let start = Instant::now();
        while !handle.is_finished() && start.elapsed() < Duration::from_secs(5) {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(handle.is_finished());
        assert_eq!(handle.progress().done, 2);
        assert!(handle.wait().is_completed());
    }
}
