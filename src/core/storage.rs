//! Purpose: Abstract the durable-storage calls the pool depends on.
//! Exports: `Storage`, `FsStorage`.
//! Role: Seam between pool bookkeeping and the file system; tests swap in fakes.
//! Invariants: Handles are opened for append only; writes never seek.
//! Invariants: `close` consumes the handle so a closed handle cannot be reused.
//! Notes: `FsStorage::close` fsyncs. The pool calls it with its write lock held
//! (eviction and close), so lookups on every key wait out that fsync.
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

pub trait Storage: Send + Sync + 'static {
    type Handle: Write + Send + 'static;

    fn create_dir_all(&self, path: &Path) -> io::Result<()>;
    fn open_append(&self, path: &Path) -> io::Result<Self::Handle>;
    fn close(&self, handle: Self::Handle) -> io::Result<()>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct FsStorage;

impl Storage for FsStorage {
    type Handle = File;

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(path)
    }

    fn open_append(&self, path: &Path) -> io::Result<File> {
        OpenOptions::new().create(true).append(true).open(path)
    }

    fn close(&self, mut handle: File) -> io::Result<()> {
        handle.flush()?;
        // Dropping a `File` swallows close errors; syncing first surfaces them.
        handle.sync_all()
    }
}
