//! Filesystem event emitter (§4.10): a recursive watch that turns raw
//! notify events into a refined `{Modify, Delete, Move}` stream for a
//! single subscriber.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use gitops_core::{ContentType, Error, Result};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;

use crate::excluder::{GitExcluder, PathExcluder};

const SWEEP_TICK: Duration = Duration::from_millis(50);

/// Kind of a refined, path-level event (§4.10).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FileEventKind {
    Modify,
    Delete,
    Move { from: PathBuf },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileEvent {
    /// Relative to the watch root. The destination path for `Move`, the
    /// written path for `Modify`, the removed path for `Delete`.
    pub path: PathBuf,
    pub kind: FileEventKind,
}

/// Emitter options (§6 "Watcher" configuration row).
#[derive(Clone)]
pub struct WatcherOptions {
    pub path_excluder: Arc<dyn PathExcluder>,
    pub batch_timeout: Duration,
    pub move_timeout: Duration,
    /// True iff the path's content type is one the caller recognizes.
    pub content_typer: Arc<dyn Fn(&Path) -> bool + Send + Sync>,
    pub event_buffer_size: usize,
}

impl Default for WatcherOptions {
    fn default() -> Self {
        Self {
            path_excluder: Arc::new(GitExcluder),
            batch_timeout: Duration::from_secs(1),
            move_timeout: Duration::from_secs(1),
            content_typer: Arc::new(default_content_typer),
            event_buffer_size: 4096,
        }
    }
}

fn default_content_typer(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| ContentType::from_extension(&format!(".{e}")).is_some())
        .unwrap_or(false)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RawKind {
    Write,
    Remove,
}

/// Fold a path's accumulated raw event sequence into at most one kind,
/// per the two known noise patterns (§4.10): a delete immediately
/// followed by a modify is really just a modify (atomic-replace editors);
/// a modify immediately followed by a delete cancels out entirely.
/// Anything else keeps the latest kind.
fn fold_events(kinds: &[RawKind]) -> Option<RawKind> {
    kinds.iter().fold(None, |acc, &k| match (acc, k) {
        (None, k) => Some(k),
        (Some(RawKind::Remove), RawKind::Write) => Some(RawKind::Write),
        (Some(RawKind::Write), RawKind::Remove) => None,
        (Some(_), k) => Some(k),
    })
}

struct BatchEntry {
    kinds: Vec<RawKind>,
    last_seen: Instant,
}

struct CookieEntry {
    from: Option<PathBuf>,
    to: Option<PathBuf>,
    first_seen: Instant,
}

enum BatchItem {
    Raw { path: PathBuf, kinds: Vec<RawKind> },
    Resolved { path: PathBuf, kind: FileEventKind },
}

/// A recursive filesystem watch feeding a refined, single-subscriber event
/// stream (§4.10).
pub struct Emitter {
    _watcher: RecommendedWatcher,
    outbound_rx: Mutex<Option<Receiver<FileEvent>>>,
    subscribed: AtomicBool,
    suspended: Arc<Mutex<std::collections::HashSet<PathBuf>>>,
    shutdown: Arc<AtomicBool>,
    batcher: Option<JoinHandle<()>>,
    dispatcher: Option<JoinHandle<()>>,
}

impl Emitter {
    pub fn new(root: impl Into<PathBuf>, options: WatcherOptions) -> Result<Self> {
        let root = root.into();
        let (raw_tx, raw_rx) = crossbeam_channel::unbounded::<notify::Result<notify::Event>>();
        let (ready_tx, ready_rx) = crossbeam_channel::unbounded::<BatchItem>();
        let (out_tx, out_rx) = crossbeam_channel::bounded::<FileEvent>(options.event_buffer_size);

        let shutdown = Arc::new(AtomicBool::new(false));
        let suspended = Arc::new(Mutex::new(std::collections::HashSet::new()));

        let mut watcher = notify::recommended_watcher(move |res| {
            let _ = raw_tx.send(res);
        })
        .map_err(|e| Error::other(format!("failed to start watcher: {e}")))?;
        watcher
            .watch(&root, RecursiveMode::Recursive)
            .map_err(|e| Error::other(format!("failed to watch {}: {e}", root.display())))?;

        let batcher = {
            let root = root.clone();
            let options = options.clone();
            let shutdown = shutdown.clone();
            std::thread::spawn(move || batcher_loop(root, raw_rx, ready_tx, options, shutdown))
        };

        let dispatcher = {
            let options = options.clone();
            let suspended = suspended.clone();
            let shutdown = shutdown.clone();
            std::thread::spawn(move || dispatcher_loop(ready_rx, out_tx, suspended, options, shutdown))
        };

        Ok(Self {
            _watcher: watcher,
            outbound_rx: Mutex::new(Some(out_rx)),
            subscribed: AtomicBool::new(false),
            suspended,
            shutdown,
            batcher: Some(batcher),
            dispatcher: Some(dispatcher),
        })
    }

    /// At most one subscriber is supported (§4.10, §7 `TooManyWatches`).
    pub fn subscribe(&self) -> Result<Receiver<FileEvent>> {
        if self.subscribed.swap(true, Ordering::SeqCst) {
            return Err(Error::TooManyWatches);
        }
        Ok(self.outbound_rx.lock().take().expect("subscribed exactly once"))
    }

    /// The next dispatch for `path` is dropped, preventing self-echo when
    /// the storage layer itself writes (§4.10).
    pub fn suspend(&self, path: PathBuf) {
        self.suspended.lock().insert(path);
    }

    /// Stop the underlying watch, drain, and wait for both stages to
    /// return (§4.10, §5 shutdown).
    pub fn close(mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(h) = self.batcher.take() {
            let _ = h.join();
        }
        if let Some(h) = self.dispatcher.take() {
            let _ = h.join();
        }
    }
}

fn relative_path(root: &Path, path: &Path) -> Option<PathBuf> {
    path.strip_prefix(root).ok().map(|p| p.to_path_buf())
}

fn handle_raw_event(
    event: notify::Event,
    root: &Path,
    excluder: &dyn PathExcluder,
    table: &mut HashMap<PathBuf, BatchEntry>,
    cookies: &mut HashMap<usize, CookieEntry>,
    ready_tx: &Sender<BatchItem>,
) {
    use notify::event::{CreateKind, ModifyKind, RemoveKind, RenameMode};

    let tracker = event.attrs.tracker();

    match event.kind {
        EventKind::Create(CreateKind::Folder) | EventKind::Remove(RemoveKind::Folder) => {}

        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) if event.paths.len() == 2 => {
            let (Some(from), Some(to)) = (
                relative_path(root, &event.paths[0]),
                relative_path(root, &event.paths[1]),
            ) else {
                return;
            };
            if excluder.is_excluded(&to) {
                return;
            }
            let _ = ready_tx.send(BatchItem::Resolved {
                path: to,
                kind: FileEventKind::Move { from },
            });
        }

        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            let Some(path) = event.paths.first().and_then(|p| relative_path(root, p)) else {
                return;
            };
            let Some(cookie) = tracker else { return };
            let entry = cookies.entry(cookie).or_insert_with(|| CookieEntry {
                from: None,
                to: None,
                first_seen: Instant::now(),
            });
            entry.from = Some(path);
            resolve_cookie_if_complete(cookie, cookies, excluder, ready_tx);
        }

        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            let Some(path) = event.paths.first().and_then(|p| relative_path(root, p)) else {
                return;
            };
            let Some(cookie) = tracker else { return };
            let entry = cookies.entry(cookie).or_insert_with(|| CookieEntry {
                from: None,
                to: None,
                first_seen: Instant::now(),
            });
            entry.to = Some(path);
            resolve_cookie_if_complete(cookie, cookies, excluder, ready_tx);
        }

        EventKind::Remove(_) => {
            push_raw(root, &event.paths, excluder, table, RawKind::Remove);
        }

        EventKind::Create(_) | EventKind::Modify(ModifyKind::Data(_)) | EventKind::Modify(ModifyKind::Any) | EventKind::Modify(ModifyKind::Metadata(_)) => {
            push_raw(root, &event.paths, excluder, table, RawKind::Write);
        }

        _ => {}
    }
}

fn resolve_cookie_if_complete(
    cookie: usize,
    cookies: &mut HashMap<usize, CookieEntry>,
    excluder: &dyn PathExcluder,
    ready_tx: &Sender<BatchItem>,
) {
    let complete = cookies.get(&cookie).map(|e| e.from.is_some() && e.to.is_some()).unwrap_or(false);
    if !complete {
        return;
    }
    let entry = cookies.remove(&cookie).expect("checked complete above");
    let (from, to) = (entry.from.unwrap(), entry.to.unwrap());
    if excluder.is_excluded(&to) {
        return;
    }
    let _ = ready_tx.send(BatchItem::Resolved {
        path: to,
        kind: FileEventKind::Move { from },
    });
}

fn push_raw(
    root: &Path,
    paths: &[PathBuf],
    excluder: &dyn PathExcluder,
    table: &mut HashMap<PathBuf, BatchEntry>,
    kind: RawKind,
) {
    for raw_path in paths {
        let Some(path) = relative_path(root, raw_path) else { continue };
        if excluder.is_excluded(&path) {
            continue;
        }
        let entry = table.entry(path).or_insert_with(|| BatchEntry {
            kinds: Vec::new(),
            last_seen: Instant::now(),
        });
        entry.kinds.push(kind);
        entry.last_seen = Instant::now();
    }
}

fn sweep_batches(table: &mut HashMap<PathBuf, BatchEntry>, batch_timeout: Duration, ready_tx: &Sender<BatchItem>) {
    let now = Instant::now();
    let ready: Vec<PathBuf> = table
        .iter()
        .filter(|(_, entry)| now.duration_since(entry.last_seen) >= batch_timeout)
        .map(|(path, _)| path.clone())
        .collect();
    for path in ready {
        if let Some(entry) = table.remove(&path) {
            let _ = ready_tx.send(BatchItem::Raw { path, kinds: entry.kinds });
        }
    }
}

fn sweep_cookies(cookies: &mut HashMap<usize, CookieEntry>, move_timeout: Duration, ready_tx: &Sender<BatchItem>) {
    let now = Instant::now();
    let expired: Vec<usize> = cookies
        .iter()
        .filter(|(_, entry)| now.duration_since(entry.first_seen) >= move_timeout)
        .map(|(cookie, _)| *cookie)
        .collect();
    for cookie in expired {
        let Some(entry) = cookies.remove(&cookie) else { continue };
        match (entry.from, entry.to) {
            (Some(from), None) => {
                let _ = ready_tx.send(BatchItem::Resolved {
                    path: from,
                    kind: FileEventKind::Delete,
                });
            }
            (None, Some(to)) => {
                let _ = ready_tx.send(BatchItem::Resolved {
                    path: to,
                    kind: FileEventKind::Modify,
                });
            }
            _ => {}
        }
    }
}

fn batcher_loop(
    root: PathBuf,
    raw_rx: Receiver<notify::Result<notify::Event>>,
    ready_tx: Sender<BatchItem>,
    options: WatcherOptions,
    shutdown: Arc<AtomicBool>,
) {
    let mut table: HashMap<PathBuf, BatchEntry> = HashMap::new();
    let mut cookies: HashMap<usize, CookieEntry> = HashMap::new();

    loop {
        match raw_rx.recv_timeout(SWEEP_TICK) {
            Ok(Ok(event)) => handle_raw_event(
                event,
                &root,
                options.path_excluder.as_ref(),
                &mut table,
                &mut cookies,
                &ready_tx,
            ),
            Ok(Err(e)) => tracing::warn!(error = %e, "filesystem watch error"),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                if shutdown.load(Ordering::SeqCst) {
                    break;
                }
            }
        }
        sweep_batches(&mut table, options.batch_timeout, &ready_tx);
        sweep_cookies(&mut cookies, options.move_timeout, &ready_tx);
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
    }
}

fn dispatcher_loop(
    ready_rx: Receiver<BatchItem>,
    out_tx: Sender<FileEvent>,
    suspended: Arc<Mutex<std::collections::HashSet<PathBuf>>>,
    options: WatcherOptions,
    shutdown: Arc<AtomicBool>,
) {
    loop {
        let item = match ready_rx.recv_timeout(SWEEP_TICK) {
            Ok(item) => item,
            Err(RecvTimeoutError::Timeout) => {
                if shutdown.load(Ordering::SeqCst) {
                    break;
                }
                continue;
            }
            Err(RecvTimeoutError::Disconnected) => break,
        };

        let (path, kind) = match item {
            BatchItem::Raw { path, kinds } => match fold_events(&kinds) {
                Some(RawKind::Write) => (path, FileEventKind::Modify),
                Some(RawKind::Remove) => (path, FileEventKind::Delete),
                None => continue,
            },
            BatchItem::Resolved { path, kind } => (path, kind),
        };

        if !(options.content_typer)(&path) {
            continue;
        }
        if suspended.lock().remove(&path) {
            continue;
        }
        if out_tx.send(FileEvent { path, kind }).is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn options_with_short_timeouts() -> WatcherOptions {
        WatcherOptions {
            batch_timeout: Duration::from_millis(150),
            move_timeout: Duration::from_millis(150),
            ..WatcherOptions::default()
        }
    }

    fn recv(rx: &Receiver<FileEvent>) -> FileEvent {
        rx.recv_timeout(Duration::from_secs(5)).expect("expected an event")
    }

    #[test]
    fn modify_is_reported_after_the_batch_window() {
        let dir = tempfile::tempdir().unwrap();
        let emitter = Emitter::new(dir.path(), options_with_short_timeouts()).unwrap();
        let rx = emitter.subscribe().unwrap();

        fs::write(dir.path().join("a.yaml"), b"test_string: x\n").unwrap();

        let event = recv(&rx);
        assert_eq!(event.path, PathBuf::from("a.yaml"));
        assert_eq!(event.kind, FileEventKind::Modify);
        emitter.close();
    }

    #[test]
    fn second_subscriber_fails_with_too_many_watches() {
        let dir = tempfile::tempdir().unwrap();
        let emitter = Emitter::new(dir.path(), options_with_short_timeouts()).unwrap();
        let _rx = emitter.subscribe().unwrap();
        let err = emitter.subscribe().unwrap_err();
        assert!(matches!(err, Error::TooManyWatches));
        emitter.close();
    }

    #[test]
    fn excluded_paths_never_reach_the_subscriber() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join(".git")).unwrap();
        let emitter = Emitter::new(dir.path(), options_with_short_timeouts()).unwrap();
        let rx = emitter.subscribe().unwrap();

        fs::write(dir.path().join(".git/HEAD"), b"ref: refs/heads/main\n").unwrap();
        fs::write(dir.path().join("a.yaml"), b"test_string: x\n").unwrap();

        let event = recv(&rx);
        assert_eq!(event.path, PathBuf::from("a.yaml"));
        emitter.close();
    }

    #[test]
    fn suspended_path_drops_its_next_event() {
        let dir = tempfile::tempdir().unwrap();
        let emitter = Emitter::new(dir.path(), options_with_short_timeouts()).unwrap();
        let rx = emitter.subscribe().unwrap();

        emitter.suspend(PathBuf::from("a.yaml"));
        fs::write(dir.path().join("a.yaml"), b"test_string: x\n").unwrap();
        fs::write(dir.path().join("b.yaml"), b"test_string: y\n").unwrap();

        let event = recv(&rx);
        assert_eq!(event.path, PathBuf::from("b.yaml"));
        emitter.close();
    }
}
