//! End-to-end navigation scenarios

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, bounded};

use burrow::backends::{BackendError, BackendResult, LocalBackend, MemoryBackend, RootIdentity};
use burrow::cancel::CancelToken;
use burrow::fs::Entry;
use burrow::state::{
    DirectorySnapshot, MemoryStateStore, NavState, NavigationListener, Navigator, SnapshotState,
};
use burrow::status::{StatusCache, StatusRecord, StatusSource, StatusWorkers};
use burrow::StorageBackend;

const IDLE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
enum Event {
    Published(String, SnapshotState),
    Failed(String),
    Status(String, String),
}

#[derive(Clone, Default)]
struct Recorder(Arc<Mutex<Vec<Event>>>);

impl Recorder {
    fn events(&self) -> Vec<Event> {
        self.0.lock().unwrap().clone()
    }

    fn statuses(&self) -> Vec<(String, String)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Status(p, t) => Some((p, t)),
                _ => None,
            })
            .collect()
    }
}

impl NavigationListener for Recorder {
    fn snapshot_published(&mut self, snapshot: &Arc<DirectorySnapshot>) {
        self.0.lock().unwrap().push(Event::Published(
            snapshot.path().to_string(),
            snapshot.state().clone(),
        ));
    }

    fn load_failed(&mut self, path: &str, _error: &BackendError) {
        self.0.lock().unwrap().push(Event::Failed(path.to_string()));
    }

    fn status_updated(&mut self, path: &str, text: &str) {
        self.0
            .lock()
            .unwrap()
            .push(Event::Status(path.to_string(), text.to_string()));
    }
}

/// Memory backend whose listings can be held back per path and which counts
/// `list` calls.
struct Gated {
    inner: MemoryBackend,
    gates: Mutex<HashMap<String, Receiver<()>>>,
    calls: AtomicUsize,
}

impl Gated {
    fn new(inner: MemoryBackend) -> Self {
        Self {
            inner,
            gates: Mutex::new(HashMap::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Hold listings of `path` until the returned sender fires
    fn gate(&self, path: &str) -> Sender<()> {
        let (tx, rx) = bounded(1);
        self.gates.lock().unwrap().insert(path.to_string(), rx);
        tx
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl StorageBackend for Gated {
    fn root(&self) -> RootIdentity {
        self.inner.root()
    }

    fn list(&self, cancel: &CancelToken, path: &str) -> BackendResult<Vec<Entry>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.gates.lock().unwrap().remove(path);
        if let Some(gate) = gate {
            let _ = gate.recv_timeout(Duration::from_secs(10));
        }
        // A superseded load is still allowed to complete
        let _ = cancel;
        self.inner.list(&CancelToken::new(), path)
    }

    fn home_path(&self) -> Option<String> {
        self.inner.home_path()
    }
}

fn tree() -> MemoryBackend {
    MemoryBackend::default()
        .with_file("/tmp/a.txt")
        .with_dir("/tmp/subdir")
        .with_file("/a/one.txt")
        .with_file("/b/two.txt")
}

fn names(nav: &Navigator) -> Vec<String> {
    nav.current()
        .map(|s| s.children().iter().map(|e| e.name().to_string()).collect())
        .unwrap_or_default()
}

#[test]
fn directory_first_listing_and_breadcrumbs() {
    let backend: Arc<dyn StorageBackend> = Arc::new(tree());
    let mut nav = Navigator::new();
    assert!(nav.navigate_to(backend, "/tmp", false));
    assert!(nav.run_until_idle(IDLE));

    let current = nav.current().unwrap();
    assert!(current.is_loaded());
    assert_eq!(names(&nav), vec!["subdir", "a.txt"]);

    let crumbs: Vec<_> = nav.breadcrumbs().into_iter().map(|c| c.label).collect();
    assert_eq!(crumbs, vec!["memory", "tmp"]);
}

#[test]
fn later_navigation_wins_when_it_finishes_first() {
    let backend = Arc::new(Gated::new(tree()));
    let release_a = backend.gate("/a");
    let release_b = backend.gate("/b");

    let mut nav = Navigator::new();
    nav.navigate_to(backend.clone(), "/a", false);
    nav.navigate_to(backend.clone(), "/b", false);

    release_b.send(()).unwrap();
    assert_eq!(nav.wait_for_updates(IDLE), 1);
    assert_eq!(nav.current().unwrap().path(), "/b");
    assert_eq!(names(&nav), vec!["two.txt"]);

    release_a.send(()).unwrap();
    assert!(nav.run_until_idle(IDLE));
    assert_eq!(nav.current().unwrap().path(), "/b");
    assert_eq!(names(&nav), vec!["two.txt"]);
}

#[test]
fn later_navigation_wins_when_it_finishes_last() {
    let backend = Arc::new(Gated::new(tree()));
    let release_a = backend.gate("/a");
    let release_b = backend.gate("/b");

    let recorder = Recorder::default();
    let mut nav = Navigator::new();
    nav.add_listener(Box::new(recorder.clone()));
    nav.navigate_to(backend.clone(), "/a", false);
    nav.navigate_to(backend.clone(), "/b", false);

    release_a.send(()).unwrap();
    assert_eq!(nav.wait_for_updates(IDLE), 1);
    assert_eq!(nav.current().unwrap().path(), "/b");
    assert_eq!(nav.current().unwrap().state(), &SnapshotState::Loading);

    release_b.send(()).unwrap();
    assert!(nav.run_until_idle(IDLE));
    assert_eq!(names(&nav), vec!["two.txt"]);

    assert!(
        !recorder
            .events()
            .contains(&Event::Published("/a".to_string(), SnapshotState::Loaded))
    );
}

#[test]
fn reselecting_current_path_does_not_reload() {
    let backend = Arc::new(Gated::new(tree()));
    let mut nav = Navigator::new();

    assert!(nav.navigate_to(backend.clone(), "/tmp", false));
    assert!(nav.run_until_idle(IDLE));
    assert_eq!(backend.calls(), 1);

    assert!(!nav.navigate_to(backend.clone(), "/tmp", false));
    assert!(!nav.navigate_to(backend.clone(), "/tmp/", false));
    assert!(nav.run_until_idle(IDLE));
    assert_eq!(backend.calls(), 1);

    assert!(nav.navigate_to(backend.clone(), "/tmp", true));
    assert!(nav.run_until_idle(IDLE));
    assert_eq!(backend.calls(), 2);
}

#[test]
fn same_path_on_another_backend_is_a_navigation() {
    let one: Arc<dyn StorageBackend> = Arc::new(MemoryBackend::new("one").with_dir("/tmp"));
    let two: Arc<dyn StorageBackend> =
        Arc::new(MemoryBackend::new("two").with_file("/tmp/x.txt"));
    let mut nav = Navigator::new();

    nav.navigate_to(one, "/tmp", false);
    assert!(nav.run_until_idle(IDLE));
    assert!(nav.navigate_to(two, "/tmp", false));
    assert!(nav.run_until_idle(IDLE));
    assert_eq!(names(&nav), vec!["x.txt"]);
}

#[test]
fn tilde_expands_to_backend_home() {
    let backend: Arc<dyn StorageBackend> = Arc::new(
        MemoryBackend::default()
            .with_home("/home/u")
            .with_file("/home/u/notes.md"),
    );
    let mut nav = Navigator::new();
    nav.navigate_to(backend.clone(), "~", false);
    assert!(nav.run_until_idle(IDLE));
    assert_eq!(nav.current().unwrap().path(), "/home/u");

    nav.navigate_to(backend, "~/", false);
    assert_eq!(nav.current().unwrap().path(), "/home/u");
}

#[test]
fn failed_load_clears_rows_and_reports() {
    let backend: Arc<dyn StorageBackend> = Arc::new(tree());
    let recorder = Recorder::default();
    let mut nav = Navigator::new();
    nav.add_listener(Box::new(recorder.clone()));

    nav.navigate_to(backend.clone(), "/tmp", false);
    assert!(nav.run_until_idle(IDLE));
    nav.navigate_to(backend.clone(), "/missing", false);
    assert!(nav.run_until_idle(IDLE));

    let current = nav.current().unwrap();
    assert!(matches!(current.state(), SnapshotState::Failed(_)));
    assert!(current.children().is_empty());
    assert_eq!(nav.last_failure().unwrap().path, "/missing");
    assert!(recorder.events().contains(&Event::Failed("/missing".to_string())));

    // Navigation elsewhere still works
    nav.navigate_to(backend, "/a", false);
    assert!(nav.run_until_idle(IDLE));
    assert!(nav.last_failure().is_none());
    assert_eq!(names(&nav), vec!["one.txt"]);
}

#[test]
fn go_up_and_enter() {
    let backend: Arc<dyn StorageBackend> = Arc::new(tree());
    let mut nav = Navigator::new();
    nav.navigate_to(backend, "/tmp", false);
    assert!(nav.run_until_idle(IDLE));

    assert!(!nav.enter("a.txt"));
    assert!(!nav.enter("nope"));
    assert!(nav.enter("subdir"));
    assert!(nav.run_until_idle(IDLE));
    assert_eq!(nav.current().unwrap().path(), "/tmp/subdir");

    assert!(nav.go_up());
    assert!(nav.run_until_idle(IDLE));
    assert!(nav.go_up());
    assert!(nav.run_until_idle(IDLE));
    assert_eq!(nav.current().unwrap().path(), "/");
    assert!(!nav.go_up());
}

#[test]
fn location_and_selection_are_persisted() {
    let store = MemoryStateStore::default();
    let backend: Arc<dyn StorageBackend> = Arc::new(tree());
    let mut nav = Navigator::new().with_state_store(Box::new(store.clone()));

    nav.navigate_to(backend, "/tmp", false);
    assert!(store.current().is_none());
    assert!(nav.run_until_idle(IDLE));

    let saved = store.current().unwrap();
    assert_eq!(saved.backend_root_url, "memory://memory/");
    assert_eq!(saved.current_dir_path, "/tmp");
    assert_eq!(saved.current_entry_name, None);

    assert!(nav.select_entry("a.txt"));
    assert!(!nav.select_entry("ghost"));
    assert_eq!(
        store.current().unwrap().current_entry_name.as_deref(),
        Some("a.txt")
    );
}

fn saved(root: &str, path: &str) -> NavState {
    NavState {
        backend_root_url: root.to_string(),
        current_dir_path: path.to_string(),
        selected_tree_dir: path.to_string(),
        current_entry_name: Some("a.txt".to_string()),
    }
}

#[test]
fn restore_replays_saved_location() {
    let backends: Vec<Arc<dyn StorageBackend>> =
        vec![Arc::new(MemoryBackend::new("other")), Arc::new(tree())];
    let store = MemoryStateStore::new(Some(saved("memory://memory/", "/tmp")));
    let mut nav = Navigator::new().with_state_store(Box::new(store.clone()));

    assert!(nav.restore_saved(&backends));
    assert!(nav.run_until_idle(IDLE));
    assert_eq!(nav.current().unwrap().root().title, "memory");
    assert_eq!(nav.current().unwrap().path(), "/tmp");
    assert_eq!(nav.selected_entry(), Some("a.txt"));
    assert_eq!(
        store.current().unwrap().current_entry_name.as_deref(),
        Some("a.txt")
    );
}

#[test]
fn restore_degrades_to_root() {
    let backends: Vec<Arc<dyn StorageBackend>> = vec![Arc::new(tree())];

    // Unknown backend
    let mut nav = Navigator::new();
    assert!(nav.restore(&backends, &saved("ftp://gone.example/", "/pub")));
    assert!(nav.run_until_idle(IDLE));
    assert_eq!(nav.current().unwrap().path(), "/");

    // Path not under the root
    let mut nav = Navigator::new();
    nav.restore(&backends, &saved("memory://memory/", "relative/dir"));
    assert!(nav.run_until_idle(IDLE));
    assert_eq!(nav.current().unwrap().path(), "/");

    // Path that no longer exists
    let mut nav = Navigator::new();
    nav.restore(&backends, &saved("memory://memory/", "/vanished"));
    assert!(nav.run_until_idle(IDLE));
    let current = nav.current().unwrap();
    assert_eq!(current.path(), "/");
    assert!(current.is_loaded());
    assert!(nav.last_failure().is_none());

    // Nothing to restore onto
    let mut nav = Navigator::new();
    assert!(!nav.restore(&[], &saved("memory://memory/", "/tmp")));
}

/// Marks files dirty and counts computations
struct FakeGit {
    root: String,
    calls: AtomicUsize,
}

impl StatusSource for FakeGit {
    fn status(&self, path: &Path, is_dir: bool) -> Option<StatusRecord> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Some(StatusRecord {
            repo_root: self.root.clone(),
            branch: Some("main".to_string()),
            changed: usize::from(!is_dir),
            dirty: !is_dir,
            ..Default::default()
        })
        .filter(|_| path.starts_with(&self.root))
    }
}

#[test]
fn status_badges_are_cached_and_refreshed() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    fs::write(dir.path().join("a.txt"), "x")?;
    fs::create_dir(dir.path().join("clean"))?;
    let root = dir.path().to_string_lossy().into_owned();

    let source = Arc::new(FakeGit {
        root: root.clone(),
        calls: AtomicUsize::new(0),
    });
    let recorder = Recorder::default();
    let mut nav = Navigator::new().with_status(
        Arc::new(StatusCache::new()),
        StatusWorkers::spawn(source.clone(), 2),
    );
    nav.add_listener(Box::new(recorder.clone()));
    let backend: Arc<dyn StorageBackend> = Arc::new(LocalBackend::new().with_home("/"));

    nav.navigate_to(backend.clone(), &root, false);
    assert!(nav.run_until_idle(IDLE));
    assert_eq!(source.calls.load(Ordering::SeqCst), 2);

    let file = format!("{}/a.txt", root.trim_end_matches('/'));
    // Clean non-root directory: no badge, no update
    assert_eq!(recorder.statuses(), vec![(file.clone(), "*".to_string())]);
    assert_eq!(nav.status_text(&file), "*");

    // Coming back hits the cache
    nav.navigate_to(backend.clone(), "/", false);
    assert!(nav.run_until_idle(IDLE));
    let before = source.calls.load(Ordering::SeqCst);
    nav.navigate_to(backend.clone(), &root, false);
    assert!(nav.run_until_idle(IDLE));
    assert_eq!(source.calls.load(Ordering::SeqCst), before);
    assert_eq!(recorder.statuses().len(), 2);

    // Refresh recomputes
    assert!(nav.refresh());
    assert!(nav.run_until_idle(IDLE));
    assert_eq!(source.calls.load(Ordering::SeqCst), before + 2);
    Ok(())
}

/// Holds the first file computation until released
struct HeldSource {
    root: String,
    held: Mutex<Option<Receiver<()>>>,
    file_calls: AtomicUsize,
}

impl HeldSource {
    fn new(root: &str) -> (Arc<Self>, Sender<()>) {
        let (tx, rx) = bounded(1);
        let source = Arc::new(Self {
            root: root.to_string(),
            held: Mutex::new(Some(rx)),
            file_calls: AtomicUsize::new(0),
        });
        (source, tx)
    }
}

impl StatusSource for HeldSource {
    fn status(&self, _path: &Path, is_dir: bool) -> Option<StatusRecord> {
        if !is_dir {
            self.file_calls.fetch_add(1, Ordering::SeqCst);
            let gate = self.held.lock().ok().and_then(|mut held| held.take());
            if let Some(gate) = gate {
                let _ = gate.recv_timeout(Duration::from_secs(10));
            }
        }
        Some(StatusRecord {
            repo_root: self.root.clone(),
            branch: Some("main".to_string()),
            changed: usize::from(!is_dir),
            dirty: !is_dir,
            ..Default::default()
        })
    }
}

/// Pump until the current snapshot has its listing
fn wait_loaded(nav: &mut Navigator) {
    let deadline = Instant::now() + IDLE;
    while !nav.current().is_some_and(|s| s.is_loaded()) && Instant::now() < deadline {
        nav.wait_for_updates(Duration::from_millis(20));
    }
    assert!(nav.current().is_some_and(|s| s.is_loaded()));
}

fn held_navigator(
    source: Arc<HeldSource>,
) -> Result<(tempfile::TempDir, String, Navigator, Recorder), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    fs::write(dir.path().join("a.txt"), "x")?;
    fs::create_dir(dir.path().join("sub"))?;
    let root = dir.path().to_string_lossy().into_owned();
    let recorder = Recorder::default();
    let mut nav = Navigator::new().with_status(
        Arc::new(StatusCache::new()),
        StatusWorkers::spawn(source, 2),
    );
    nav.add_listener(Box::new(recorder.clone()));
    Ok((dir, root, nav, recorder))
}

#[test]
fn in_flight_status_reaches_the_snapshot_that_waited() -> Result<(), Box<dyn std::error::Error>> {
    let (source, release) = HeldSource::new("/");
    let (_dir, root, mut nav, recorder) = held_navigator(source.clone())?;
    let backend: Arc<dyn StorageBackend> = Arc::new(LocalBackend::new().with_home("/"));
    let file = format!("{}/a.txt", root.trim_end_matches('/'));

    nav.navigate_to(backend.clone(), &root, false);
    wait_loaded(&mut nav);
    nav.navigate_to(backend.clone(), &format!("{}/sub", root), false);
    wait_loaded(&mut nav);
    // Back while the first request for a.txt is still running
    nav.navigate_to(backend.clone(), &root, false);
    wait_loaded(&mut nav);
    assert!(recorder.statuses().is_empty());

    release.send(())?;
    assert!(nav.run_until_idle(IDLE));
    assert_eq!(recorder.statuses(), vec![(file.clone(), "*".to_string())]);
    // One computation served both snapshots
    assert_eq!(source.file_calls.load(Ordering::SeqCst), 1);
    assert_eq!(nav.status_text(&file), "*");
    Ok(())
}

#[test]
fn superseded_status_is_cached_without_notifying() -> Result<(), Box<dyn std::error::Error>> {
    let (source, release) = HeldSource::new("/");
    let (_dir, root, mut nav, recorder) = held_navigator(source.clone())?;
    let backend: Arc<dyn StorageBackend> = Arc::new(LocalBackend::new().with_home("/"));
    let file = format!("{}/a.txt", root.trim_end_matches('/'));

    nav.navigate_to(backend.clone(), &root, false);
    wait_loaded(&mut nav);
    nav.navigate_to(backend.clone(), &format!("{}/sub", root), false);
    wait_loaded(&mut nav);

    release.send(())?;
    assert!(nav.run_until_idle(IDLE));
    assert!(recorder.statuses().is_empty());
    assert_eq!(nav.status_text(&file), "*");

    // The cached badge shows up on return without recomputing
    nav.navigate_to(backend.clone(), &root, false);
    assert!(nav.run_until_idle(IDLE));
    assert_eq!(recorder.statuses(), vec![(file, "*".to_string())]);
    assert_eq!(source.file_calls.load(Ordering::SeqCst), 1);
    Ok(())
}

#[test]
fn remote_backends_get_no_status() {
    let source = Arc::new(FakeGit {
        root: "/".to_string(),
        calls: AtomicUsize::new(0),
    });
    let mut nav = Navigator::new().with_status(
        Arc::new(StatusCache::new()),
        StatusWorkers::spawn(source.clone(), 1),
    );
    nav.navigate_to(Arc::new(tree()), "/tmp", false);
    assert!(nav.run_until_idle(IDLE));
    assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    assert!(nav.status_cache().unwrap().is_empty());
}
