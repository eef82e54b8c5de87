//! The navigation engine
//!
//! A [`Navigator`] lives on the presentation thread. It owns the current
//! snapshot, issues background loads against the active backend and merges
//! their results in [`Navigator::process_updates`]. Every load is tagged with
//! a generation number; a result whose generation is not the latest is
//! dropped, so the last navigation always wins regardless of completion
//! order.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, unbounded};
use tracing::{debug, info, warn};

use super::breadcrumb::{Breadcrumb, breadcrumbs};
use super::session::{NavState, StateStore};
use super::snapshot::DirectorySnapshot;
use crate::async_io::{IoRequest, IoResponse, Loader};
use crate::backends::{BackendError, StorageBackend};
use crate::cancel::CancelToken;
use crate::status::{Lookup, StatusCache, StatusRequest, StatusWorkers};
use crate::utils;

/// Presentation-side observer of navigation events. All methods run on the
/// presentation thread.
pub trait NavigationListener {
    /// A new snapshot (placeholder, loaded or failed) became current
    fn snapshot_published(&mut self, snapshot: &Arc<DirectorySnapshot>) {
        let _ = snapshot;
    }

    /// Listing `path` failed
    fn load_failed(&mut self, path: &str, error: &BackendError) {
        let _ = (path, error);
    }

    /// Badge text for the entry at `path` changed
    fn status_updated(&mut self, path: &str, text: &str) {
        let _ = (path, text);
    }
}

/// Last load failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadFailure {
    pub path: String,
    pub message: String,
}

/// Messages from background threads to the presentation thread
enum Update {
    Listed(IoResponse),
    /// A status request finished; `changed` is whether the cached badge
    /// text moved
    Status {
        path: String,
        key: String,
        generation: u64,
        changed: bool,
    },
}

struct StatusEnrichment {
    cache: Arc<StatusCache>,
    workers: StatusWorkers,
}

pub struct Navigator {
    backend: Option<Arc<dyn StorageBackend>>,
    current: Option<Arc<DirectorySnapshot>>,
    generation: u64,
    load_cancel: Option<CancelToken>,
    in_flight_loads: usize,
    /// Generation of a load replaying a saved session
    restoring: Option<u64>,
    failure: Option<LoadFailure>,
    selected_entry: Option<String>,
    listeners: Vec<Box<dyn NavigationListener>>,
    status: Option<StatusEnrichment>,
    pending_status: Arc<AtomicUsize>,
    /// Status keys of the current snapshot answered by a request an earlier
    /// snapshot started
    waiting: HashSet<String>,
    store: Option<Box<dyn StateStore>>,
    loader: Loader,
    tx: Sender<Update>,
    rx: Receiver<Update>,
}

impl Default for Navigator {
    fn default() -> Self {
        Self::new()
    }
}

impl Navigator {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self {
            backend: None,
            current: None,
            generation: 0,
            load_cancel: None,
            in_flight_loads: 0,
            restoring: None,
            failure: None,
            selected_entry: None,
            listeners: Vec::new(),
            status: None,
            pending_status: Arc::new(AtomicUsize::new(0)),
            waiting: HashSet::new(),
            store: None,
            loader: Loader::new(),
            tx,
            rx,
        }
    }

    /// Enable status enrichment for entries on local backends
    pub fn with_status(mut self, cache: Arc<StatusCache>, workers: StatusWorkers) -> Self {
        self.status = Some(StatusEnrichment { cache, workers });
        self
    }

    /// Persist the location after every successful navigation
    pub fn with_state_store(mut self, store: Box<dyn StateStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn add_listener(&mut self, listener: Box<dyn NavigationListener>) {
        self.listeners.push(listener);
    }

    pub fn current(&self) -> Option<&Arc<DirectorySnapshot>> {
        self.current.as_ref()
    }

    pub fn backend(&self) -> Option<&Arc<dyn StorageBackend>> {
        self.backend.as_ref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn last_failure(&self) -> Option<&LoadFailure> {
        self.failure.as_ref()
    }

    pub fn selected_entry(&self) -> Option<&str> {
        self.selected_entry.as_deref()
    }

    pub fn status_cache(&self) -> Option<&Arc<StatusCache>> {
        self.status.as_ref().map(|s| &s.cache)
    }

    /// Badge text cached for a backend path, if status enrichment applies
    pub fn status_text(&self, path: &str) -> String {
        let (Some(status), Some(backend)) = (&self.status, &self.backend) else {
            return String::new();
        };
        backend
            .to_local_path(path)
            .map(|local| status.cache.text_for(&local.to_string_lossy()))
            .unwrap_or_default()
    }

    /// Navigate to `path` on `backend`.
    ///
    /// Returns `false` when the call was a no-op: the expanded path and the
    /// backend root match the current snapshot and `root_change` is unset.
    pub fn navigate_to(
        &mut self,
        backend: Arc<dyn StorageBackend>,
        path: &str,
        root_change: bool,
    ) -> bool {
        let home = backend.home_path();
        let path = utils::normalize_path(&utils::expand_home(path, home.as_deref()));

        if !root_change
            && let Some(current) = &self.current
            && current.path() == path
            && current.root().key() == backend.root().key()
        {
            debug!(path = %path, "already current; skipping reload");
            return false;
        }

        if let Some(cancel) = self.load_cancel.take() {
            cancel.cancel();
        }
        self.generation += 1;
        self.restoring = None;
        self.selected_entry = None;
        self.waiting.clear();
        let generation = self.generation;
        info!(path = %path, generation, root = %backend.root().title, "navigating");

        let placeholder = Arc::new(DirectorySnapshot::loading(
            Arc::clone(&backend),
            path.clone(),
            generation,
        ));
        self.backend = Some(Arc::clone(&backend));
        self.publish(placeholder);

        let cancel = CancelToken::new();
        self.load_cancel = Some(cancel.clone());
        self.in_flight_loads += 1;
        let tx = self.tx.clone();
        self.loader.dispatch(
            IoRequest {
                generation,
                path,
                backend,
                cancel,
            },
            move |response| {
                let _ = tx.send(Update::Listed(response));
            },
        );
        true
    }

    /// Reload the current directory, dropping cached status below it.
    pub fn refresh(&mut self) -> bool {
        let (Some(backend), Some(current)) = (self.backend.clone(), self.current.clone()) else {
            return false;
        };
        let selected = self.selected_entry.clone();
        self.navigate_to(Arc::clone(&backend), current.path(), true);
        self.selected_entry = selected;

        if let Some(status) = &self.status
            && let Some(local) = backend.to_local_path(current.path())
        {
            status
                .cache
                .invalidate_under(&local.to_string_lossy(), self.generation);
        }
        true
    }

    /// Navigate to the parent directory. No-op at the backend root.
    pub fn go_up(&mut self) -> bool {
        let (Some(backend), Some(current)) = (self.backend.clone(), self.current.clone()) else {
            return false;
        };
        let root = utils::normalize_path(&current.root().path);
        if utils::normalize_path(current.path()) == root {
            return false;
        }
        match utils::parent_path(current.path()) {
            Some(parent) => self.navigate_to(backend, &parent, false),
            None => false,
        }
    }

    /// Navigate into the child directory `name` of the current snapshot.
    pub fn enter(&mut self, name: &str) -> bool {
        let (Some(backend), Some(current)) = (self.backend.clone(), self.current.clone()) else {
            return false;
        };
        match current.child(name) {
            Some(entry) if entry.is_dir() => {
                let target = backend.join_path(current.path(), name);
                self.navigate_to(backend, &target, false)
            }
            _ => false,
        }
    }

    /// Record `name` as the entry under the cursor and persist it.
    pub fn select_entry(&mut self, name: &str) -> bool {
        let exists = self
            .current
            .as_ref()
            .is_some_and(|c| c.child(name).is_some());
        if !exists {
            return false;
        }
        self.selected_entry = Some(name.to_string());
        self.persist();
        true
    }

    /// Trail from the backend root to the current directory
    pub fn breadcrumbs(&self) -> Vec<Breadcrumb> {
        match &self.current {
            Some(current) => {
                let root = current.root();
                breadcrumbs(&root.title, &root.path, current.path())
            }
            None => Vec::new(),
        }
    }

    /// Replay a saved location.
    ///
    /// The backend is picked by root URL. An unknown backend, a path outside
    /// the backend root, or a failing load falls back to the root of the
    /// chosen backend (the first one when none matches).
    pub fn restore(&mut self, backends: &[Arc<dyn StorageBackend>], state: &NavState) -> bool {
        let matching = backends
            .iter()
            .find(|b| b.root().key() == state.backend_root_url);
        let Some(backend) = matching.or(backends.first()).cloned() else {
            return false;
        };
        let root = backend.root();

        if matching.is_none() {
            warn!(saved = %state.backend_root_url, "saved backend not available; opening {}", root.title);
            return self.navigate_to(backend, &root.path, true);
        }

        let path = utils::normalize_path(&state.current_dir_path);
        if !path.starts_with('/') || utils::relative_to(&root.path, &path).is_none() {
            warn!(path = %path, "saved path is outside {}; opening the root", root.title);
            return self.navigate_to(backend, &root.path, true);
        }

        self.navigate_to(backend, &path, true);
        self.restoring = Some(self.generation);
        self.selected_entry = state.current_entry_name.clone();
        true
    }

    /// Replay the location saved in the state store, if any.
    pub fn restore_saved(&mut self, backends: &[Arc<dyn StorageBackend>]) -> bool {
        let Some(state) = self.store.as_ref().and_then(|s| s.load()) else {
            return false;
        };
        self.restore(backends, &state)
    }

    /// Apply all pending background results without blocking. Returns the
    /// number of updates handled.
    pub fn process_updates(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(update) = self.rx.try_recv() {
            self.handle(update);
            handled += 1;
        }
        handled
    }

    /// Block up to `timeout` for the next update, then drain the rest.
    pub fn wait_for_updates(&mut self, timeout: Duration) -> usize {
        match self.rx.recv_timeout(timeout) {
            Ok(update) => {
                self.handle(update);
                1 + self.process_updates()
            }
            Err(_) => 0,
        }
    }

    /// No load or status work outstanding
    pub fn is_idle(&self) -> bool {
        // Callbacks post before decrementing, so checking the counter first
        // cannot miss a queued update.
        self.in_flight_loads == 0
            && self.pending_status.load(Ordering::Acquire) == 0
            && self.rx.is_empty()
    }

    /// Pump updates until idle or until `timeout` elapses. Returns whether
    /// idle was reached.
    pub fn run_until_idle(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            self.process_updates();
            if self.is_idle() {
                return true;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            self.wait_for_updates(remaining.min(Duration::from_millis(50)));
        }
    }

    fn handle(&mut self, update: Update) {
        match update {
            Update::Listed(response) => {
                self.in_flight_loads = self.in_flight_loads.saturating_sub(1);
                self.handle_listing(response);
            }
            Update::Status {
                path,
                key,
                generation,
                changed,
            } => self.handle_status(&path, &key, generation, changed),
        }
    }

    fn handle_listing(&mut self, response: IoResponse) {
        let IoResponse {
            generation,
            path,
            result,
        } = response;

        if generation != self.generation {
            debug!(path = %path, generation, latest = self.generation, "discarding stale listing");
            return;
        }
        let Some(backend) = self.backend.clone() else {
            return;
        };
        self.load_cancel = None;

        match result {
            Ok(children) => {
                let snapshot = Arc::new(DirectorySnapshot::loaded(
                    Arc::clone(&backend),
                    path,
                    children,
                    generation,
                ));
                info!(path = %snapshot.path(), entries = snapshot.children().len(), "loaded");
                self.failure = None;
                self.restoring = None;
                if let Some(name) = &self.selected_entry
                    && snapshot.child(name).is_none()
                {
                    self.selected_entry = None;
                }
                self.publish(Arc::clone(&snapshot));
                self.persist();
                self.request_status(&snapshot);
            }
            Err(err) if err.is_cancelled() => {
                debug!(path = %path, "listing cancelled");
            }
            Err(err) => {
                if self.restoring.take() == Some(generation) {
                    let root = backend.root().path;
                    warn!("restoring {} failed: {}; opening the root", path, err);
                    self.navigate_to(backend, &root, true);
                    return;
                }

                warn!("listing {} failed: {}", path, err);
                self.failure = Some(LoadFailure {
                    path: path.clone(),
                    message: err.to_string(),
                });
                let snapshot = Arc::new(DirectorySnapshot::failed(
                    backend,
                    path.clone(),
                    err.to_string(),
                    generation,
                ));
                self.publish(snapshot);
                for listener in &mut self.listeners {
                    listener.load_failed(&path, &err);
                }
            }
        }
    }

    fn handle_status(&mut self, path: &str, key: &str, generation: u64, changed: bool) {
        let waited = self.waiting.remove(key);
        let Some(status) = &self.status else {
            return;
        };
        let text = status.cache.text_for(key);

        // The current snapshot has not shown a badge for a waited key yet,
        // so any non-empty text is news to it.
        let notify = if generation == self.generation {
            changed
        } else if waited {
            !text.is_empty()
        } else {
            debug!(path, generation, "status for a superseded snapshot; cached only");
            false
        };
        if !notify {
            return;
        }
        for listener in &mut self.listeners {
            listener.status_updated(path, &text);
        }
    }

    fn publish(&mut self, snapshot: Arc<DirectorySnapshot>) {
        self.current = Some(Arc::clone(&snapshot));
        for listener in &mut self.listeners {
            listener.snapshot_published(&snapshot);
        }
    }

    fn persist(&mut self) {
        let (Some(store), Some(current)) = (self.store.as_mut(), self.current.as_ref()) else {
            return;
        };
        if !current.is_loaded() {
            return;
        }
        let state = NavState {
            backend_root_url: current.root().key(),
            current_dir_path: current.path().to_string(),
            selected_tree_dir: current.path().to_string(),
            current_entry_name: self.selected_entry.clone(),
        };
        if let Err(e) = store.save(&state) {
            warn!("could not save navigation state: {}", e);
        }
    }

    /// Fan out status requests for the children of a freshly loaded
    /// snapshot.
    fn request_status(&mut self, snapshot: &DirectorySnapshot) {
        let Some(status) = &self.status else {
            return;
        };
        let backend = snapshot.store();
        let generation = snapshot.generation();
        let mut hits = Vec::new();

        for entry in snapshot.children() {
            let path = backend.join_path(snapshot.path(), entry.name());
            let Some(local) = backend.to_local_path(&path) else {
                continue;
            };
            let key = local.to_string_lossy().into_owned();

            match status.cache.lookup(&key) {
                Lookup::Hit(_) => {
                    let text = status.cache.text_for(&key);
                    if !text.is_empty() {
                        hits.push((path, text));
                    }
                }
                Lookup::InFlight => {
                    self.waiting.insert(key);
                }
                Lookup::Miss => {
                    if !status.cache.begin(&key, entry.is_dir(), generation) {
                        continue;
                    }
                    self.pending_status.fetch_add(1, Ordering::AcqRel);
                    let cache = Arc::clone(&status.cache);
                    let pending = Arc::clone(&self.pending_status);
                    let tx = self.tx.clone();
                    status.workers.submit(StatusRequest {
                        path: local,
                        is_dir: entry.is_dir(),
                        on_result: Box::new(move |record| {
                            let completion = cache.complete(&key, generation, record);
                            let _ = tx.send(Update::Status {
                                path,
                                key,
                                generation,
                                changed: completion.changed,
                            });
                            pending.fetch_sub(1, Ordering::AcqRel);
                        }),
                    });
                }
            }
        }

        for (path, text) in hits {
            for listener in &mut self.listeners {
                listener.status_updated(&path, &text);
            }
        }
    }
}

impl Drop for Navigator {
    fn drop(&mut self) {
        if let Some(cancel) = self.load_cancel.take() {
            cancel.cancel();
        }
    }
}
