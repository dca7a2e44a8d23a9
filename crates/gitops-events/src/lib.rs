//! Object-level change events (§4.11): layers a recognizer and a mapped
//! FileFinder's cache over the filesystem watcher so subscribers see
//! `{Create, Update, Delete, Sync}` against object identity rather than
//! raw paths.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender};
use gitops_core::{Cancellation, ContentType, Error, Result, UnversionedObjectId, Version};
use gitops_fs::{content_type_of, Filesystem};
use gitops_frame::{FrameReader, IoFrameReader};
use gitops_recognizer::{Recognizer, RecognizerOptions};
use gitops_registry::Registry;
use gitops_storage::{ChecksumPath, FileFinder, MappedFileFinder, RawStorage};
use gitops_watch::{Emitter, FileEvent, FileEventKind, WatcherOptions};
use parking_lot::Mutex;
use tracing::{debug, warn};

/// Kind of a high-level object change (§4.11).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ObjectEventKind {
    Create,
    Update,
    Delete,
    Sync,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectEvent {
    pub id: UnversionedObjectId,
    pub kind: ObjectEventKind,
}

/// Wraps raw storage plus an emitter, keeping a mapped FileFinder's cache
/// in sync and translating the resulting file events into object events
/// for a single subscriber (§4.11).
pub struct EventStorage {
    root: PathBuf,
    raw: RawStorage,
    finder: Arc<MappedFileFinder>,
    fs: Arc<dyn Filesystem>,
    registry: Registry,
    recognizer_options: RecognizerOptions,
    emitter: Emitter,
    out_tx: Sender<ObjectEvent>,
    out_rx: Mutex<Option<Receiver<ObjectEvent>>>,
    subscribed: AtomicBool,
    processor: Mutex<Option<JoinHandle<()>>>,
}

impl EventStorage {
    /// `raw` and `finder` must share the same mapped FileFinder: `raw`
    /// holds it behind the `FileFinder` trait object, `finder` is kept
    /// here in its concrete form so this type can mutate the cache
    /// directly instead of going through a second trait-object layer.
    pub fn new(
        root: impl Into<PathBuf>,
        raw: RawStorage,
        finder: Arc<MappedFileFinder>,
        fs: Arc<dyn Filesystem>,
        registry: Registry,
        recognizer_options: RecognizerOptions,
        options: WatcherOptions,
    ) -> Result<Self> {
        let root = root.into();
        let event_buffer_size = options.event_buffer_size;
        let emitter = Emitter::new(root.clone(), options)?;
        let file_events = emitter.subscribe()?;
        let (out_tx, out_rx) = crossbeam_channel::bounded::<ObjectEvent>(event_buffer_size);

        let processor = {
            let root = root.clone();
            let finder = finder.clone();
            let fs = fs.clone();
            let registry = registry.clone();
            let out_tx = out_tx.clone();
            std::thread::spawn(move || processor_loop(root, finder, fs, registry, recognizer_options, file_events, out_tx))
        };

        Ok(Self {
            root,
            raw,
            finder,
            fs,
            registry,
            recognizer_options,
            emitter,
            out_tx,
            out_rx: Mutex::new(Some(out_rx)),
            subscribed: AtomicBool::new(false),
            processor: Mutex::new(Some(processor)),
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// At most one subscriber is supported (§4.11, §7 `TooManyWatches`).
    pub fn subscribe(&self) -> Result<Receiver<ObjectEvent>> {
        if self.subscribed.swap(true, Ordering::SeqCst) {
            return Err(Error::TooManyWatches);
        }
        Ok(self.out_rx.lock().take().expect("subscribed exactly once"))
    }

    /// Enumerate every valid file under the root, recognize its identity,
    /// refresh the mapping cache, and emit `Sync` for each (§4.11 "Sync").
    pub fn sync(&self, cancel: &Cancellation) -> Result<usize> {
        let mut count = 0;
        for path in self.fs.walk(&self.root, cancel)? {
            cancel.check()?;
            let Some(content_type) = content_type_of(&path) else {
                continue;
            };
            let bytes = self.fs.read_file(&path, cancel)?;
            if let Err(e) = reject_multi_frame(content_type, &bytes, &path) {
                warn!(path = %path.display(), error = %e, "skipping unrecognizable file during sync");
                continue;
            }
            let recognizer = Recognizer::new(&self.registry, self.recognizer_options);
            let object_id = match recognizer.recognize(content_type, &bytes) {
                Ok(object_id) => object_id,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping unrecognizable file during sync");
                    continue;
                }
            };
            let unversioned = object_id.without_version();
            let checksum = self.fs.stat(&path, cancel)?.checksum;
            self.finder.set_mapping(unversioned.clone(), ChecksumPath::new(path.clone(), checksum));
            let _ = self.out_tx.send(ObjectEvent {
                id: unversioned,
                kind: ObjectEventKind::Sync,
            });
            count += 1;
        }
        Ok(count)
    }

    fn pinned(&self, id: &UnversionedObjectId) -> gitops_core::ObjectId {
        id.with_version(Version::hub())
    }

    fn relative(&self, path: &Path) -> PathBuf {
        path.strip_prefix(&self.root).unwrap_or(path).to_path_buf()
    }

    /// Write `content` to `id`'s file at `path` (relative to the root),
    /// registering the mapping if `id` is new. Suspends the emitter for
    /// this path before delegating so the write doesn't echo back as a
    /// `Modify` file event (§4.11 "Self-suppression").
    pub fn write(&self, id: &UnversionedObjectId, path: impl AsRef<Path>, content: &[u8], cancel: &Cancellation) -> Result<()> {
        let relative = path.as_ref().to_path_buf();
        let absolute = self.root.join(&relative);
        self.finder.set_mapping(id.clone(), ChecksumPath::new(absolute.clone(), String::new()));
        self.emitter.suspend(relative);
        self.raw.write(id, content, cancel)?;
        let checksum = self.fs.stat(&absolute, cancel)?.checksum;
        self.finder.set_mapping(id.clone(), ChecksumPath::new(absolute, checksum));
        Ok(())
    }

    /// Delete `id`'s file, suspending the emitter for its current path
    /// before delegating (§4.11 "Self-suppression").
    pub fn delete(&self, id: &UnversionedObjectId, cancel: &Cancellation) -> Result<()> {
        let absolute = self
            .finder
            .object_path(&self.pinned(id))
            .map_err(|_| Error::NotFound(id.clone()))?;
        self.emitter.suspend(self.relative(&absolute));
        self.raw.delete(id, cancel)?;
        self.finder.delete_mapping(id);
        Ok(())
    }

    /// Stop the watch, join the processor thread, and close the outbound
    /// channel (§4.11, §5 shutdown).
    pub fn close(self) {
        self.emitter.close();
        if let Some(handle) = self.processor.lock().take() {
            let _ = handle.join();
        }
    }
}

/// Mapped storage assumes one frame per file (§9); a file holding more
/// than one is rejected at recognition time rather than silently
/// recognized from its first document.
fn reject_multi_frame(content_type: ContentType, bytes: &[u8], path: &Path) -> Result<()> {
    let mut reader = IoFrameReader::new(content_type, std::io::Cursor::new(bytes));
    if reader.read_all()?.len() > 1 {
        return Err(Error::MultiFrameFile(path.to_path_buf()));
    }
    Ok(())
}

fn processor_loop(
    root: PathBuf,
    finder: Arc<MappedFileFinder>,
    fs: Arc<dyn Filesystem>,
    registry: Registry,
    recognizer_options: RecognizerOptions,
    file_events: Receiver<FileEvent>,
    out_tx: Sender<ObjectEvent>,
) {
    while let Ok(event) = file_events.recv() {
        match event.kind {
            FileEventKind::Modify => handle_modify(&root, &finder, &fs, &registry, recognizer_options, event.path, &out_tx),
            FileEventKind::Move { from } => handle_move(&root, &finder, event.path, from),
            FileEventKind::Delete => handle_delete(&root, &finder, event.path, &out_tx),
        }
    }
}

fn handle_modify(
    root: &Path,
    finder: &MappedFileFinder,
    fs: &Arc<dyn Filesystem>,
    registry: &Registry,
    recognizer_options: RecognizerOptions,
    relative: PathBuf,
    out_tx: &Sender<ObjectEvent>,
) {
    let absolute = root.join(&relative);
    let Some(content_type) = content_type_of(&absolute) else {
        return;
    };
    let cancel = Cancellation::new();
    let bytes = match fs.read_file(&absolute, &cancel) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(path = %absolute.display(), error = %e, "failed to read modified file");
            return;
        }
    };
    if let Err(e) = reject_multi_frame(content_type, &bytes, &absolute) {
        warn!(path = %absolute.display(), error = %e, "failed to recognize modified file");
        return;
    }
    let recognizer = Recognizer::new(registry, recognizer_options);
    let object_id = match recognizer.recognize(content_type, &bytes) {
        Ok(object_id) => object_id,
        Err(e) => {
            warn!(path = %absolute.display(), error = %e, "failed to recognize modified file");
            return;
        }
    };
    let unversioned = object_id.without_version();
    let checksum = fs.stat(&absolute, &cancel).map(|s| s.checksum).unwrap_or_default();
    let pinned = unversioned.with_version(Version::hub());
    let kind = if finder.object_path(&pinned).is_ok() {
        ObjectEventKind::Update
    } else {
        ObjectEventKind::Create
    };
    finder.set_mapping(unversioned.clone(), ChecksumPath::new(absolute, checksum));
    debug!(id = %unversioned, ?kind, "dispatching object event");
    let _ = out_tx.send(ObjectEvent { id: unversioned, kind });
}

fn handle_move(root: &Path, finder: &MappedFileFinder, to: PathBuf, from: PathBuf) {
    let from_absolute = root.join(&from);
    let to_absolute = root.join(&to);
    let Ok(object_id) = finder.object_at(&from_absolute) else {
        warn!(path = %from_absolute.display(), "ignoring move of an untracked path");
        return;
    };
    let unversioned = object_id.without_version();
    let checksum = finder.mapping(&unversioned).map(|cp| cp.checksum).unwrap_or_default();
    finder.set_mapping(unversioned, ChecksumPath::new(to_absolute, checksum));
}

fn handle_delete(root: &Path, finder: &MappedFileFinder, relative: PathBuf, out_tx: &Sender<ObjectEvent>) {
    let absolute = root.join(&relative);
    let Ok(object_id) = finder.object_at(&absolute) else {
        warn!(path = %absolute.display(), "ignoring delete of an untracked path");
        return;
    };
    let unversioned = object_id.without_version();
    finder.delete_mapping(&unversioned);
    let _ = out_tx.send(ObjectEvent {
        id: unversioned,
        kind: ObjectEventKind::Delete,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use gitops_core::GroupKind;
    use gitops_fs::LocalFilesystem;
    use gitops_storage::NamespaceScope;
    use gitops_testing::{registry, TempRoot};
    use std::time::Duration;

    fn storage(root: &Path) -> EventStorage {
        let fs: Arc<dyn Filesystem> = Arc::new(LocalFilesystem::new());
        let finder = Arc::new(MappedFileFinder::new());
        let scope = NamespaceScope::new();
        let raw = RawStorage::new(finder.clone(), fs.clone(), scope);
        let options = WatcherOptions {
            batch_timeout: Duration::from_millis(150),
            move_timeout: Duration::from_millis(150),
            ..WatcherOptions::default()
        };
        EventStorage::new(root, raw, finder, fs, registry(), RecognizerOptions::default(), options).unwrap()
    }

    fn gk() -> GroupKind {
        GroupKind::new("foogroup", "Simple")
    }

    fn simple_yaml(name: &str) -> Vec<u8> {
        format!("apiVersion: foogroup/v1alpha1\nkind: Simple\nmetadata:\n  name: {name}\n").into_bytes()
    }

    #[test]
    fn sync_populates_mapping_and_emits_for_existing_files() {
        let temp = TempRoot::new();
        std::fs::write(temp.path().join("a.yaml"), simple_yaml("a")).unwrap();
        let storage = storage(temp.path());
        let cancel = Cancellation::new();

        let count = storage.sync(&cancel).unwrap();
        assert_eq!(count, 1);

        let id = UnversionedObjectId::new(gk(), "a", "");
        assert!(storage.finder.object_path(&id.with_version(Version::hub())).is_ok());
    }

    #[test]
    fn a_new_file_on_disk_is_reported_as_create() {
        let temp = TempRoot::new();
        let storage = storage(temp.path());
        let events = storage.subscribe().unwrap();

        std::fs::write(temp.path().join("a.yaml"), simple_yaml("a")).unwrap();

        let event = events.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(event.kind, ObjectEventKind::Create);
        assert_eq!(event.id.name, "a");
    }

    #[test]
    fn sync_skips_a_multi_frame_file() {
        let temp = TempRoot::new();
        let multi = format!("{}---\n{}", String::from_utf8(simple_yaml("a")).unwrap(), String::from_utf8(simple_yaml("b")).unwrap());
        std::fs::write(temp.path().join("a.yaml"), multi).unwrap();
        let storage = storage(temp.path());

        let count = storage.sync(&Cancellation::new()).unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn second_subscriber_fails_with_too_many_watches() {
        let temp = TempRoot::new();
        let storage = storage(temp.path());
        let _first = storage.subscribe().unwrap();
        let err = storage.subscribe().unwrap_err();
        assert!(matches!(err, Error::TooManyWatches));
    }

    #[test]
    fn write_through_this_storage_does_not_emit_an_event() {
        let temp = TempRoot::new();
        let storage = storage(temp.path());
        let events = storage.subscribe().unwrap();

        let id = UnversionedObjectId::new(gk(), "a", "");
        storage.write(&id, "a.yaml", &simple_yaml("a"), &Cancellation::new()).unwrap();

        assert!(events.recv_timeout(Duration::from_millis(400)).is_err());
    }

    #[test]
    fn delete_through_this_storage_removes_the_mapping() {
        let temp = TempRoot::new();
        let storage = storage(temp.path());
        let id = UnversionedObjectId::new(gk(), "a", "");
        storage.write(&id, "a.yaml", &simple_yaml("a"), &Cancellation::new()).unwrap();

        storage.delete(&id, &Cancellation::new()).unwrap();
        assert!(storage.finder.object_path(&id.with_version(Version::hub())).is_err());
    }
}
