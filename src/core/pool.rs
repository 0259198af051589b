// Keyed pool of buffered append writers with lazy creation, timers, and drain-on-close.
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, trace, warn};

use crate::core::config::PoolConfig;
use crate::core::error::{Error, ErrorKind};
use crate::core::key::ResourceKey;
use crate::core::report::{FailureReporter, LogReporter, TimerKind};
use crate::core::resource::{AppendOutcome, WriteResource};
use crate::core::storage::{FsStorage, Storage};
use crate::core::timer;

// A write only retries when eviction retired its resource between lookup and
// lock; the replacement lives for a full eviction delay.
const MAX_RESOLVE_ATTEMPTS: usize = 4;

pub(crate) type Resource<S> = WriteResource<<S as Storage>::Handle>;
type ResourceMap<S> = HashMap<ResourceKey, Arc<Resource<S>>>;

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct PoolStatus {
    pub storage_root: PathBuf,
    pub buffer_capacity: usize,
    pub flush_threshold: usize,
    pub flush_delay_ms: u64,
    pub evict_delay_ms: u64,
    pub open_resource_count: usize,
    pub closed: bool,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct ResourceInfo {
    pub directory: String,
    pub name: String,
    pub path: PathBuf,
    pub id: u64,
    pub buffered_bytes: usize,
    pub age_ms: u64,
}

pub(crate) struct Shared<S: Storage> {
    config: PoolConfig,
    storage: S,
    reporter: Arc<dyn FailureReporter>,
    // The write side is the pool-wide lock: creation, eviction, and close.
    resources: RwLock<ResourceMap<S>>,
    closed: Mutex<bool>,
    wake: Condvar,
    timers: Mutex<Vec<JoinHandle<()>>>,
    next_id: AtomicU64,
}

impl<S: Storage> Shared<S> {
    pub(crate) fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub(crate) fn reporter(&self) -> &dyn FailureReporter {
        self.reporter.as_ref()
    }

    fn read_resources(&self) -> Result<RwLockReadGuard<'_, ResourceMap<S>>, Error> {
        self.resources.read().map_err(|_| Error::poisoned("pool"))
    }

    fn write_resources(&self) -> Result<RwLockWriteGuard<'_, ResourceMap<S>>, Error> {
        self.resources.write().map_err(|_| Error::poisoned("pool"))
    }

    fn is_closed(&self) -> Result<bool, Error> {
        self.closed
            .lock()
            .map(|closed| *closed)
            .map_err(|_| Error::poisoned("shutdown"))
    }

    /// Sleeps for `delay` unless the pool closes first. Returns `Ok(true)` when
    /// the full delay elapsed with the pool still open.
    pub(crate) fn sleep_unless_closed(&self, delay: Duration) -> Result<bool, Error> {
        let closed = self
            .closed
            .lock()
            .map_err(|_| Error::poisoned("shutdown"))?;
        let (closed, _) = self
            .wake
            .wait_timeout_while(closed, delay, |closed| !*closed)
            .map_err(|_| Error::poisoned("shutdown"))?;
        Ok(!*closed)
    }

    /// Flushes, closes, and unregisters `resource`. Holds the pool lock and then
    /// the resource lock, the same order creation and close use.
    pub(crate) fn evict(&self, resource: &Arc<Resource<S>>) -> Result<(), Error> {
        let mut resources = self.write_resources()?;
        if self.is_closed()? {
            return Ok(());
        }
        let retired = resource.retire(&self.storage);
        if matches!(&retired, Err(err) if err.kind() == ErrorKind::FlushFailed) {
            return retired;
        }
        let registered = resources
            .get(resource.key())
            .is_some_and(|current| Arc::ptr_eq(current, resource));
        if registered {
            resources.remove(resource.key());
        }
        debug!(
            key = %resource.key(),
            resource_id = resource.id(),
            open = resources.len(),
            "evicted resource"
        );
        retired
    }

    fn drain(&self) -> Result<(), Error> {
        let mut resources = self.write_resources()?;
        let mut first_err = None;
        // Every buffer is flushed before the first handle is closed.
        for resource in resources.values() {
            if let Err(err) = resource.flush_pending() {
                if first_err.is_none() {
                    first_err = Some(err);
                }
            }
        }
        for resource in resources.values() {
            if let Err(err) = resource.retire(&self.storage) {
                if first_err.is_none() {
                    first_err = Some(err);
                }
            }
        }
        let count = resources.len();
        resources.clear();
        info!(closed = count, root = %self.config.storage_root.display(), "writer pool closed");
        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn join_timers(&self) {
        let handles = match self.timers.lock() {
            Ok(mut timers) => std::mem::take(&mut *timers),
            Err(_) => {
                warn!("timer registry lock poisoned; timers left detached");
                return;
            }
        };
        let current = thread::current().id();
        for handle in handles {
            if handle.thread().id() == current {
                continue;
            }
            if handle.join().is_err() {
                warn!("maintenance timer thread panicked outside supervision");
            }
        }
    }
}

pub struct WriterPool<S: Storage = FsStorage> {
    shared: Arc<Shared<S>>,
}

impl WriterPool<FsStorage> {
    pub fn new(config: PoolConfig) -> Result<Self, Error> {
        Self::with_storage(config, FsStorage, Arc::new(LogReporter))
    }
}

impl<S: Storage> WriterPool<S> {
    pub fn with_storage(
        config: PoolConfig,
        storage: S,
        reporter: Arc<dyn FailureReporter>,
    ) -> Result<Self, Error> {
        config.validate()?;
        Ok(Self {
            shared: Arc::new(Shared {
                config,
                storage,
                reporter,
                resources: RwLock::new(HashMap::new()),
                closed: Mutex::new(false),
                wake: Condvar::new(),
                timers: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(1),
            }),
        })
    }

    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }

    pub fn is_closed(&self) -> bool {
        self.shared.is_closed().unwrap_or(true)
    }

    /// Buffers `data` for `<root>/<directory>/<name>.txt`, opening the file on
    /// first use. Bytes are durable only after a flush.
    pub fn write(&self, directory: &str, name: &str, data: &[u8]) -> Result<(), Error> {
        let key = ResourceKey::new(directory, name)?;
        let threshold = self.shared.config.flush_threshold;
        for _ in 0..MAX_RESOLVE_ATTEMPTS {
            let resource = self.resolve_or_create(&key)?;
            match resource.append(data, threshold)? {
                AppendOutcome::Buffered { flushed_first } => {
                    if flushed_first {
                        trace!(key = %key, resource_id = resource.id(), "threshold flush before append");
                    }
                    return Ok(());
                }
                AppendOutcome::Retired => {
                    debug!(key = %key, resource_id = resource.id(), "resource retired before write; resolving again");
                }
            }
        }
        Err(Error::new(ErrorKind::Internal)
            .with_message("resource kept retiring while writing")
            .with_key(&key))
    }

    pub fn write_str(&self, directory: &str, name: &str, data: &str) -> Result<(), Error> {
        self.write(directory, name, data.as_bytes())
    }

    fn resolve_or_create(&self, key: &ResourceKey) -> Result<Arc<Resource<S>>, Error> {
        if let Some(resource) = self.shared.read_resources()?.get(key) {
            return Ok(Arc::clone(resource));
        }

        let mut resources = self.shared.write_resources()?;
        if let Some(resource) = resources.get(key) {
            return Ok(Arc::clone(resource));
        }
        if self.shared.is_closed()? {
            return Err(Error::new(ErrorKind::PoolClosed)
                .with_message("writer pool is closed")
                .with_key(key));
        }

        let resource = Arc::new(self.open_resource(key)?);
        self.schedule_timers(&resource)?;
        resources.insert(key.clone(), Arc::clone(&resource));
        debug!(
            key = %key,
            path = %resource.path().display(),
            resource_id = resource.id(),
            open = resources.len(),
            "opened resource"
        );
        Ok(resource)
    }

    fn open_resource(&self, key: &ResourceKey) -> Result<Resource<S>, Error> {
        let root = self.shared.config.storage_root();
        let dir = key.dir_path(root);
        self.shared.storage.create_dir_all(&dir).map_err(|err| {
            Error::new(ErrorKind::DirectoryCreateFailed)
                .with_message("failed to create directory")
                .with_key(key)
                .with_path(&dir)
                .with_source(err)
        })?;

        let path = key.file_path(root);
        let handle = self.shared.storage.open_append(&path).map_err(|err| {
            Error::new(ErrorKind::FileOpenFailed)
                .with_message("failed to open destination for append")
                .with_key(key)
                .with_path(&path)
                .with_source(err)
        })?;

        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        Ok(WriteResource::new(
            id,
            key.clone(),
            path,
            handle,
            self.shared.config.buffer_capacity,
        ))
    }

    fn schedule_timers(&self, resource: &Arc<Resource<S>>) -> Result<(), Error> {
        let mut timers = self
            .shared
            .timers
            .lock()
            .map_err(|_| Error::poisoned("timer registry"))?;
        timers.retain(|handle| !handle.is_finished());
        for kind in [TimerKind::Flush, TimerKind::Evict] {
            match timer::spawn(&self.shared, resource, kind) {
                Ok(handle) => timers.push(handle),
                Err(err) => {
                    // An already-started flush timer finds the resource retired.
                    if let Err(close_err) = resource.retire(&self.shared.storage) {
                        warn!(key = %resource.key(), error = %close_err, "failed to close unscheduled resource");
                    }
                    return Err(Error::new(ErrorKind::Internal)
                        .with_message(format!("failed to start {kind} timer"))
                        .with_key(resource.key())
                        .with_source(err));
                }
            }
        }
        Ok(())
    }

    /// Flushes every open buffer without closing any handle.
    pub fn flush_all(&self) -> Result<(), Error> {
        let resources = self.shared.read_resources()?;
        let mut first_err = None;
        for resource in resources.values() {
            if let Err(err) = resource.flush_pending() {
                if first_err.is_none() {
                    first_err = Some(err);
                }
            }
        }
        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Flushes every buffer, closes every handle, and stops the timers. Later
    /// writes fail with `PoolClosed`; closing twice is a no-op.
    pub fn close(&self) -> Result<(), Error> {
        {
            let mut closed = self
                .shared
                .closed
                .lock()
                .map_err(|_| Error::poisoned("shutdown"))?;
            if *closed {
                return Ok(());
            }
            *closed = true;
        }
        self.shared.wake.notify_all();

        let drained = self.shared.drain();
        self.shared.join_timers();
        drained
    }

    pub fn status(&self) -> Result<PoolStatus, Error> {
        let config = &self.shared.config;
        let open_resource_count = self.shared.read_resources()?.len();
        Ok(PoolStatus {
            storage_root: config.storage_root.clone(),
            buffer_capacity: config.buffer_capacity,
            flush_threshold: config.flush_threshold,
            flush_delay_ms: duration_ms(config.flush_delay),
            evict_delay_ms: duration_ms(config.evict_delay),
            open_resource_count,
            closed: self.shared.is_closed()?,
        })
    }

    /// Snapshot of open resources, ordered by key.
    pub fn resources(&self) -> Result<Vec<ResourceInfo>, Error> {
        let resources = self.shared.read_resources()?;
        let mut infos = Vec::with_capacity(resources.len());
        for resource in resources.values() {
            let Some(buffered_bytes) = resource.buffered()? else {
                continue;
            };
            let key = resource.key();
            infos.push(ResourceInfo {
                directory: key.directory().to_string(),
                name: key.name().to_string(),
                path: resource.path().to_path_buf(),
                id: resource.id(),
                buffered_bytes,
                age_ms: duration_ms(resource.age()),
            });
        }
        infos.sort_by(|a, b| (&a.directory, &a.name).cmp(&(&b.directory, &b.name)));
        Ok(infos)
    }
}

impl<S: Storage> Drop for WriterPool<S> {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!(error = %err, "closing writer pool on drop failed");
        }
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::WriterPool;
    use crate::core::config::PoolConfig;
    use crate::core::error::ErrorKind;
    use crate::core::key::ResourceKey;
    use crate::core::report::{FailureReporter, MaintenanceFailure, TimerKind};
    use crate::core::resource::{AppendOutcome, WriteResource};
    use crate::core::storage::Storage;
    use std::collections::HashMap;
    use std::io::{self, Write};
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::thread;
    use std::time::Duration;

    type Files = Arc<Mutex<HashMap<PathBuf, Vec<u8>>>>;
    type Events = Arc<Mutex<Vec<String>>>;

    #[derive(Clone, Default)]
    struct MemStorage {
        files: Files,
        opens: Arc<AtomicUsize>,
        closes: Arc<AtomicUsize>,
        fail_mkdir: bool,
        fail_open: bool,
        fail_close: Option<PathBuf>,
        fail_writes: Arc<Mutex<bool>>,
        events: Events,
    }

    struct MemHandle {
        path: PathBuf,
        files: Files,
        fail_writes: Arc<Mutex<bool>>,
        events: Events,
    }

    impl Write for MemHandle {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if *self.fail_writes.lock().unwrap() {
                return Err(io::Error::new(io::ErrorKind::Other, "injected write failure"));
            }
            let mut files = self.files.lock().unwrap();
            files.entry(self.path.clone()).or_default().extend_from_slice(buf);
            self.events
                .lock()
                .unwrap()
                .push(format!("write {}", self.path.display()));
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Storage for MemStorage {
        type Handle = MemHandle;

        fn create_dir_all(&self, _path: &Path) -> io::Result<()> {
            if self.fail_mkdir {
                return Err(io::Error::new(io::ErrorKind::PermissionDenied, "mkdir denied"));
            }
            Ok(())
        }

        fn open_append(&self, path: &Path) -> io::Result<MemHandle> {
            if self.fail_open {
                return Err(io::Error::new(io::ErrorKind::PermissionDenied, "open denied"));
            }
            self.opens.fetch_add(1, Ordering::SeqCst);
            self.files.lock().unwrap().entry(path.to_path_buf()).or_default();
            Ok(MemHandle {
                path: path.to_path_buf(),
                files: self.files.clone(),
                fail_writes: self.fail_writes.clone(),
                events: self.events.clone(),
            })
        }

        fn close(&self, handle: MemHandle) -> io::Result<()> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            self.events
                .lock()
                .unwrap()
                .push(format!("close {}", handle.path.display()));
            if self.fail_close.as_deref() == Some(handle.path.as_path()) {
                return Err(io::Error::new(io::ErrorKind::Other, "injected close failure"));
            }
            Ok(())
        }
    }

    impl MemStorage {
        fn contents(&self, path: &str) -> Vec<u8> {
            self.files
                .lock()
                .unwrap()
                .get(Path::new(path))
                .cloned()
                .unwrap_or_default()
        }

        fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }
    }

    #[derive(Default)]
    struct Collect(Mutex<Vec<MaintenanceFailure>>);

    impl FailureReporter for Collect {
        fn report(&self, failure: MaintenanceFailure) {
            self.0.lock().unwrap().push(failure);
        }
    }

    fn config() -> PoolConfig {
        PoolConfig::new("root")
            .with_buffer_capacity(64)
            .with_flush_threshold(16)
    }

    fn pool(storage: &MemStorage, config: PoolConfig) -> (WriterPool<MemStorage>, Arc<Collect>) {
        let reporter = Arc::new(Collect::default());
        let pool = WriterPool::with_storage(config, storage.clone(), reporter.clone())
            .expect("pool");
        (pool, reporter)
    }

    #[test]
    fn same_key_shares_one_handle() {
        let storage = MemStorage::default();
        let (pool, _) = pool(&storage, config());
        pool.write_str("d", "n", "a").expect("write");
        pool.write_str("d", "n", "b").expect("write");
        pool.write_str("d", "m", "c").expect("write");
        assert_eq!(storage.opens.load(Ordering::SeqCst), 2);
        assert_eq!(pool.status().expect("status").open_resource_count, 2);

        pool.close().expect("close");
        assert_eq!(storage.contents("root/d/n.txt"), b"ab");
        assert_eq!(storage.contents("root/d/m.txt"), b"c");
        assert_eq!(storage.closes.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn concurrent_first_writes_open_once() {
        let storage = MemStorage::default();
        let (pool, _) = pool(&storage, config());
        thread::scope(|scope| {
            for _ in 0..16 {
                scope.spawn(|| pool.write_str("d", "n", "x").expect("write"));
            }
        });
        assert_eq!(storage.opens.load(Ordering::SeqCst), 1);
        pool.close().expect("close");
        assert_eq!(storage.contents("root/d/n.txt"), vec![b'x'; 16]);
    }

    #[test]
    fn mkdir_failure_registers_nothing() {
        let storage = MemStorage {
            fail_mkdir: true,
            ..MemStorage::default()
        };
        let (pool, _) = pool(&storage, config());
        let err = pool.write_str("d", "n", "x").expect_err("mkdir fails");
        assert_eq!(err.kind(), ErrorKind::DirectoryCreateFailed);
        assert_eq!(pool.status().expect("status").open_resource_count, 0);
    }

    #[test]
    fn open_failure_registers_nothing() {
        let storage = MemStorage {
            fail_open: true,
            ..MemStorage::default()
        };
        let (pool, _) = pool(&storage, config());
        let err = pool.write_str("d", "n", "x").expect_err("open fails");
        assert_eq!(err.kind(), ErrorKind::FileOpenFailed);
        assert!(err.path().is_some());
        assert!(pool.resources().expect("resources").is_empty());
    }

    #[test]
    fn threshold_flush_failure_surfaces_to_writer() {
        let storage = MemStorage::default();
        let (pool, _) = pool(&storage, config());
        pool.write("d", "n", &[b'x'; 17]).expect("buffered");
        *storage.fail_writes.lock().unwrap() = true;
        let err = pool.write_str("d", "n", "y").expect_err("flush fails");
        assert_eq!(err.kind(), ErrorKind::FlushFailed);
        *storage.fail_writes.lock().unwrap() = false;
        pool.close().expect("close");
        assert_eq!(storage.contents("root/d/n.txt"), vec![b'x'; 17]);
    }

    #[test]
    fn close_reports_flush_failure_and_rejects_writes() {
        let storage = MemStorage::default();
        let (pool, _) = pool(&storage, config());
        pool.write_str("d", "n", "x").expect("write");
        *storage.fail_writes.lock().unwrap() = true;
        let err = pool.close().expect_err("flush fails during close");
        assert_eq!(err.kind(), ErrorKind::FlushFailed);
        assert!(pool.is_closed());

        let err = pool.write_str("d", "n", "late").expect_err("closed");
        assert_eq!(err.kind(), ErrorKind::PoolClosed);
        pool.close().expect("second close is a no-op");
    }

    #[test]
    fn close_flushes_every_buffer_before_closing_any_handle() {
        let storage = MemStorage::default();
        let (pool, _) = pool(&storage, config());
        for directory in ["a", "b", "c"] {
            pool.write_str(directory, "1", directory).expect("write");
        }
        assert!(storage.events().is_empty());

        pool.close().expect("close");
        let events = storage.events();
        assert_eq!(events.len(), 6, "{events:?}");
        let last_write = events
            .iter()
            .rposition(|event| event.starts_with("write "))
            .expect("writes");
        let first_close = events
            .iter()
            .position(|event| event.starts_with("close "))
            .expect("closes");
        assert!(last_write < first_close, "{events:?}");
    }

    #[test]
    fn close_returns_handle_close_failure_and_closes_the_rest() {
        let storage = MemStorage {
            fail_close: Some(PathBuf::from("root/b/1.txt")),
            ..MemStorage::default()
        };
        let (pool, _) = pool(&storage, config());
        for directory in ["a", "b", "c"] {
            pool.write_str(directory, "1", directory).expect("write");
        }

        let err = pool.close().expect_err("close fails for one handle");
        assert_eq!(err.kind(), ErrorKind::HandleCloseFailed);
        assert_eq!(err.path(), Some(Path::new("root/b/1.txt")));
        assert_eq!(storage.closes.load(Ordering::SeqCst), 3);
        for directory in ["a", "b", "c"] {
            let path = format!("root/{directory}/1.txt");
            assert_eq!(storage.contents(&path), directory.as_bytes());
        }
        assert_eq!(pool.status().expect("status").open_resource_count, 0);

        let err = pool.write_str("a", "1", "late").expect_err("closed");
        assert_eq!(err.kind(), ErrorKind::PoolClosed);
    }

    #[test]
    fn write_after_eviction_lands_in_fresh_resource() {
        let storage = MemStorage::default();
        let (pool, _) = pool(&storage, config());
        pool.write_str("d", "n", "a").expect("write");
        let key = ResourceKey::new("d", "n").expect("key");
        let stale = pool.resolve_or_create(&key).expect("resolve");

        pool.shared.evict(&stale).expect("evict");
        assert_eq!(pool.status().expect("status").open_resource_count, 0);
        assert_eq!(stale.append(b"x", 16).expect("append"), AppendOutcome::Retired);

        pool.write_str("d", "n", "b").expect("write");
        let resources = pool.resources().expect("resources");
        assert_eq!(resources.len(), 1);
        assert_ne!(resources[0].id, stale.id());
        assert_eq!(storage.opens.load(Ordering::SeqCst), 2);

        pool.close().expect("close");
        assert_eq!(storage.contents("root/d/n.txt"), b"ab");
    }

    #[test]
    fn write_gives_up_when_resource_stays_retired() {
        let storage = MemStorage::default();
        let (pool, _) = pool(&storage, config());
        let key = ResourceKey::new("d", "n").expect("key");
        let path = PathBuf::from("root/d/n.txt");
        let handle = storage.open_append(&path).expect("open");
        let stale = Arc::new(WriteResource::new(99, key.clone(), path, handle, 64));
        stale.retire(&storage).expect("retire");
        pool.shared
            .resources
            .write()
            .unwrap()
            .insert(key, Arc::clone(&stale));

        let err = pool.write_str("d", "n", "x").expect_err("retries exhausted");
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert_eq!(err.key(), Some("d/n"));
        assert!(storage.contents("root/d/n.txt").is_empty());
    }

    #[test]
    fn writes_racing_rapid_eviction_keep_every_byte() {
        let storage = MemStorage::default();
        let config = config()
            .with_flush_delay(Duration::from_millis(1))
            .with_evict_delay(Duration::from_millis(1));
        let (pool, reporter) = pool(&storage, config);
        thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    for _ in 0..2000 {
                        pool.write("d", "n", b"x").expect("write");
                    }
                });
            }
        });
        pool.close().expect("close");

        let bytes = storage.contents("root/d/n.txt");
        assert_eq!(bytes.len(), 16_000);
        assert!(bytes.iter().all(|byte| *byte == b'x'));
        assert_eq!(
            storage.opens.load(Ordering::SeqCst),
            storage.closes.load(Ordering::SeqCst)
        );
        assert!(reporter.0.lock().unwrap().is_empty());
    }

    #[test]
    fn flush_all_makes_bytes_visible_without_closing() {
        let storage = MemStorage::default();
        let (pool, _) = pool(&storage, config());
        pool.write_str("d", "n", "abc").expect("write");
        assert!(storage.contents("root/d/n.txt").is_empty());
        pool.flush_all().expect("flush");
        assert_eq!(storage.contents("root/d/n.txt"), b"abc");
        assert_eq!(pool.status().expect("status").open_resource_count, 1);
        assert_eq!(storage.closes.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn flush_timer_failure_reaches_reporter() {
        let storage = MemStorage::default();
        let config = config().with_flush_delay(Duration::from_millis(50));
        let (pool, reporter) = pool(&storage, config);
        pool.write_str("d", "n", "x").expect("write");
        *storage.fail_writes.lock().unwrap() = true;
        thread::sleep(Duration::from_millis(400));

        let failures = reporter.0.lock().unwrap();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].timer, TimerKind::Flush);
        assert_eq!(failures[0].key.to_string(), "d/n");
        assert_eq!(failures[0].error.kind(), ErrorKind::FlushFailed);
        drop(failures);

        // The bytes stay buffered and are drained once storage recovers.
        *storage.fail_writes.lock().unwrap() = false;
        pool.close().expect("close");
        assert_eq!(storage.contents("root/d/n.txt"), b"x");
    }

    #[test]
    fn failed_eviction_flush_keeps_resource_registered() {
        let storage = MemStorage::default();
        let config = config().with_evict_delay(Duration::from_millis(50));
        let (pool, reporter) = pool(&storage, config);
        pool.write_str("d", "n", "x").expect("write");
        *storage.fail_writes.lock().unwrap() = true;
        thread::sleep(Duration::from_millis(400));

        assert_eq!(pool.status().expect("status").open_resource_count, 1);
        {
            let failures = reporter.0.lock().unwrap();
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].timer, TimerKind::Evict);
        }
        *storage.fail_writes.lock().unwrap() = false;
        pool.close().expect("close");
        assert_eq!(storage.contents("root/d/n.txt"), b"x");
    }

    #[test]
    fn eviction_recreates_resource_on_next_write() {
        let storage = MemStorage::default();
        let config = config().with_evict_delay(Duration::from_millis(50));
        let (pool, reporter) = pool(&storage, config);
        pool.write_str("d", "n", "a").expect("write");
        let first = pool.resources().expect("resources")[0].id;
        thread::sleep(Duration::from_millis(400));

        assert_eq!(pool.status().expect("status").open_resource_count, 0);
        assert_eq!(storage.closes.load(Ordering::SeqCst), 1);
        assert_eq!(storage.contents("root/d/n.txt"), b"a");

        pool.write_str("d", "n", "b").expect("write");
        let second = pool.resources().expect("resources")[0].id;
        assert_ne!(first, second);
        assert_eq!(storage.opens.load(Ordering::SeqCst), 2);
        pool.close().expect("close");
        assert_eq!(storage.contents("root/d/n.txt"), b"ab");
        assert!(reporter.0.lock().unwrap().is_empty());
    }

    #[test]
    fn close_wakes_sleeping_timers() {
        let storage = MemStorage::default();
        let (pool, _) = pool(&storage, config());
        pool.write_str("d", "n", "x").expect("write");
        let started = std::time::Instant::now();
        pool.close().expect("close");
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn invalid_config_is_rejected() {
        let storage = MemStorage::default();
        let reporter = Arc::new(Collect::default());
        let result = WriterPool::with_storage(
            config().with_flush_threshold(64),
            storage,
            reporter,
        );
        match result {
            Ok(_) => panic!("expected usage error"),
            Err(err) => assert_eq!(err.kind(), ErrorKind::Usage),
        }
    }
}
