//! Bounded pool of status worker threads

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{Receiver, Sender, unbounded};
use tracing::{debug, warn};

use super::{StatusRecord, StatusSource};

/// Callback invoked exactly once with the computed status
pub type StatusCallback = Box<dyn FnOnce(Option<StatusRecord>) + Send>;

/// One status computation
pub struct StatusRequest {
    /// Local path to compute status for
    pub path: PathBuf,
    pub is_dir: bool,
    /// Called from a worker thread with the result
    pub on_result: StatusCallback,
}

impl fmt::Debug for StatusRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatusRequest")
            .field("path", &self.path)
            .field("is_dir", &self.is_dir)
            .finish()
    }
}

/// Fixed set of threads draining a shared request queue.
///
/// Threads exit once the pool is dropped and the queue is drained.
pub struct StatusWorkers {
    tx: Sender<StatusRequest>,
    workers: usize,
}

impl StatusWorkers {
    /// Start `workers` threads (at least one) computing status with `source`.
    pub fn spawn(source: Arc<dyn StatusSource>, workers: usize) -> Self {
        let workers = workers.max(1);
        let (tx, rx) = unbounded::<StatusRequest>();
        for id in 0..workers {
            start_status_worker(id, rx.clone(), Arc::clone(&source));
        }
        Self { tx, workers }
    }

    /// Queue a request. If the pool is gone the callback still runs, with
    /// `None`.
    pub fn submit(&self, request: StatusRequest) {
        if let Err(err) = self.tx.send(request) {
            warn!("status pool is closed; dropping request");
            (err.into_inner().on_result)(None);
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }
}

fn start_status_worker(id: usize, rx: Receiver<StatusRequest>, source: Arc<dyn StatusSource>) {
    thread::spawn(move || {
        while let Ok(request) = rx.recv() {
            let StatusRequest {
                path,
                is_dir,
                on_result,
            } = request;
            let result = panic::catch_unwind(AssertUnwindSafe(|| source.status(&path, is_dir)))
                .unwrap_or_else(|_| {
                    warn!("status source panicked for {}", path.display());
                    None
                });
            on_result(result);
        }
        debug!(worker = id, "status worker exiting");
    });
}
