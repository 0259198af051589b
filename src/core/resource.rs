// One open destination: append handle, write buffer, and the lock guarding both.
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::core::error::{Error, ErrorKind};
use crate::core::key::ResourceKey;
use crate::core::storage::Storage;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum AppendOutcome {
    Buffered { flushed_first: bool },
    Retired,
}

type Slot<H> = Option<BufWriter<H>>;

pub(crate) struct WriteResource<H: Write> {
    id: u64,
    key: ResourceKey,
    path: PathBuf,
    opened_at: Instant,
    // `None` once the handle has been closed by eviction or pool close.
    state: Mutex<Slot<H>>,
}

impl<H: Write> WriteResource<H> {
    pub(crate) fn new(id: u64, key: ResourceKey, path: PathBuf, handle: H, capacity: usize) -> Self {
        Self {
            id,
            key,
            path,
            opened_at: Instant::now(),
            state: Mutex::new(Some(BufWriter::with_capacity(capacity, handle))),
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn key(&self) -> &ResourceKey {
        &self.key
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn age(&self) -> Duration {
        self.opened_at.elapsed()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Slot<H>>, Error> {
        self.state
            .lock()
            .map_err(|_| Error::poisoned("resource").with_key(&self.key))
    }

    /// Buffered byte count, or `None` when the resource has been retired.
    pub(crate) fn buffered(&self) -> Result<Option<usize>, Error> {
        let slot = self.lock()?;
        Ok(slot.as_ref().map(|writer| writer.buffer().len()))
    }

    /// Appends `data`, flushing first when the buffer already holds more than
    /// `threshold` bytes.
    pub(crate) fn append(&self, data: &[u8], threshold: usize) -> Result<AppendOutcome, Error> {
        let mut slot = self.lock()?;
        let Some(writer) = slot.as_mut() else {
            return Ok(AppendOutcome::Retired);
        };
        let flushed_first = writer.buffer().len() > threshold;
        if flushed_first {
            writer.flush().map_err(|err| self.io_error(ErrorKind::FlushFailed, err))?;
        }
        writer
            .write_all(data)
            .map_err(|err| self.io_error(ErrorKind::WriteFailed, err))?;
        Ok(AppendOutcome::Buffered { flushed_first })
    }

    /// Flushes pending bytes; returns whether anything was written out.
    pub(crate) fn flush_pending(&self) -> Result<bool, Error> {
        let mut slot = self.lock()?;
        match slot.as_mut() {
            Some(writer) if !writer.buffer().is_empty() => {
                writer.flush().map_err(|err| self.io_error(ErrorKind::FlushFailed, err))?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Flushes and closes the handle. A failed flush leaves the resource open;
    /// once the handle reaches `Storage::close` the resource is retired even if
    /// closing fails.
    pub(crate) fn retire<S>(&self, storage: &S) -> Result<(), Error>
    where
        S: Storage<Handle = H>,
    {
        let mut slot = self.lock()?;
        let Some(writer) = slot.take() else {
            return Ok(());
        };
        // `into_inner` flushes; on failure the writer comes back with its buffer.
        let handle = match writer.into_inner() {
            Ok(handle) => handle,
            Err(err) => {
                let (io_err, writer) = err.into_parts();
                *slot = Some(writer);
                return Err(self.io_error(ErrorKind::FlushFailed, io_err));
            }
        };
        storage
            .close(handle)
            .map_err(|err| self.io_error(ErrorKind::HandleCloseFailed, err))
    }

    fn io_error(&self, kind: ErrorKind, err: std::io::Error) -> Error {
        let message = match kind {
            ErrorKind::FlushFailed => "failed to flush buffer",
            ErrorKind::WriteFailed => "failed to append to buffer",
            ErrorKind::HandleCloseFailed => "failed to close handle",
            _ => "storage operation failed",
        };
        Error::new(kind)
            .with_message(message)
            .with_key(&self.key)
            .with_path(&self.path)
            .with_source(err)
    }
}
