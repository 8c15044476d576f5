//! Sorted run files and run cursors.

use std::cmp::Ordering;
use std::fmt;
use std::fs;
use std::io::{self, prelude::*};
use std::path::Path;
use std::sync::Arc;

use log;
use tempfile;

use crate::serializer::Serializer;
use crate::sort::{SortError, SortErrorOf};

/// Run file origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunKind {
    /// Run written from a sorted in-memory chunk.
    Sorted,
    /// Run written by a partial merge of other runs.
    Merged,
}

impl RunKind {
    /// Run file name prefix.
    pub fn prefix(&self) -> &'static str {
        match self {
            RunKind::Sorted => "ext-sort-sorted-",
            RunKind::Merged => "ext-sort-merged-",
        }
    }
}

/// Sorted run stored on file system.
/// The file is removed when the run is dropped unless it was explicitly kept.
pub struct SortedRun {
    path: tempfile::TempPath,
    kind: RunKind,
    len: usize,
}

impl SortedRun {
    /// Saves already sorted items to a new run file.
    pub fn build<T, S, I>(
        dir: &Path,
        items: I,
        serializer: &S,
        buf_size: usize,
    ) -> Result<Self, SortErrorOf<T, S>>
    where
        S: Serializer<T>,
        I: IntoIterator<Item = T>,
        I::IntoIter: ExactSizeIterator,
    {
        let items = items.into_iter();
        let len = items.len();

        Self::create::<T, S, _>(dir, RunKind::Sorted, buf_size, |writer| {
            serializer.encode(items, writer).map_err(SortError::SerializationError)?;
            return Ok(len);
        })
    }

    /// Drains a merged stream to a new run file.
    pub fn build_merged<T, S, I>(
        dir: &Path,
        items: I,
        serializer: &S,
        buf_size: usize,
    ) -> Result<Self, SortErrorOf<T, S>>
    where
        S: Serializer<T>,
        I: IntoIterator<Item = Result<T, SortErrorOf<T, S>>>,
    {
        Self::create::<T, S, _>(dir, RunKind::Merged, buf_size, |writer| {
            let mut len = 0;
            for item in items.into_iter() {
                serializer.write(writer, &item?).map_err(SortError::SerializationError)?;
                len += 1;
            }
            return Ok(len);
        })
    }

    fn create<T, S, F>(dir: &Path, kind: RunKind, buf_size: usize, dump: F) -> Result<Self, SortErrorOf<T, S>>
    where
        S: Serializer<T>,
        F: FnOnce(&mut io::BufWriter<tempfile::NamedTempFile>) -> Result<usize, SortErrorOf<T, S>>,
    {
        let tmp_file = tempfile::Builder::new()
            .prefix(kind.prefix())
            .tempfile_in(dir)
            .map_err(SortError::TempFile)?;
        log::debug!("saving run data to {}", tmp_file.path().display());

        // the partially written file is removed on failure when the writer is dropped
        let mut run_writer = io::BufWriter::with_capacity(buf_size, tmp_file);
        let len = dump(&mut run_writer)?;
        let tmp_file = run_writer.into_inner().map_err(|err| SortError::IO(err.into_error()))?;

        return Ok(SortedRun {
            path: tmp_file.into_temp_path(),
            kind,
            len,
        });
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn kind(&self) -> RunKind {
        self.kind
    }

    /// Number of records stored in the run.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Removes the run file.
    pub fn delete(self) -> io::Result<()> {
        log::trace!("removing run file {}", self.path.display());
        self.path.close()
    }

    /// Leaves the run file on file system.
    pub fn keep(self) -> io::Result<()> {
        self.path.keep().map(|_| ()).map_err(|err| err.error)
    }
}

impl fmt::Debug for SortedRun {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SortedRun")
            .field("path", &self.path())
            .field("kind", &self.kind)
            .field("len", &self.len)
            .finish()
    }
}

/// Look-ahead reader over a single run file.
/// The next record is always decoded in advance so that cursors can be compared before consumption.
/// A look-ahead decoding error is kept and returned by the [`RunCursor::advance`] call following
/// the one that returned the last good record.
pub struct RunCursor<T, S>
where
    S: Serializer<T>,
{
    run: Option<SortedRun>,
    reader: Option<io::BufReader<fs::File>>,
    current: Option<T>,
    error: Option<SortErrorOf<T, S>>,
    serializer: Arc<S>,
}

impl<T, S> RunCursor<T, S>
where
    S: Serializer<T>,
{
    /// Opens the run and decodes its first record.
    pub fn open(run: SortedRun, serializer: Arc<S>, buf_size: usize) -> Result<Self, SortErrorOf<T, S>> {
        let file = fs::File::open(run.path()).map_err(SortError::IO)?;

        let mut cursor = RunCursor {
            run: Some(run),
            reader: Some(io::BufReader::with_capacity(buf_size, file)),
            current: None,
            error: None,
            serializer,
        };
        cursor.read_next();
        if let Some(err) = cursor.error.take() {
            return Err(err);
        }

        return Ok(cursor);
    }

    pub fn has_current(&self) -> bool {
        self.current.is_some()
    }

    /// Checks whether the next [`RunCursor::advance`] call returns a record or an error.
    pub fn has_next(&self) -> bool {
        self.current.is_some() || self.error.is_some()
    }

    /// Returns the look-ahead record, [`None`] if the cursor is exhausted.
    pub fn current(&self) -> Option<&T> {
        self.current.as_ref()
    }

    /// Returns the look-ahead record and decodes the next one.
    pub fn advance(&mut self) -> Result<Option<T>, SortErrorOf<T, S>> {
        if let Some(item) = self.current.take() {
            self.read_next();
            return Ok(Some(item));
        }

        match self.error.take() {
            Some(err) => Err(err),
            None => Ok(None),
        }
    }

    /// Compares the look-ahead records of two cursors.
    /// Cursors holding a read error are ordered first, exhausted cursors last.
    pub fn compare(&self, other: &Self) -> Ordering {
        match (&self.current, &other.current) {
            (Some(a), Some(b)) => self.serializer.compare(a, b),
            _ => self.state_rank().cmp(&other.state_rank()),
        }
    }

    /// Checks whether the look-ahead record is a duplicate of `item`.
    pub fn current_eq(&self, item: &T) -> bool {
        match &self.current {
            Some(current) => self.serializer.equal(current, item),
            None => false,
        }
    }

    /// Releases the file handle and removes the run file if `delete` is set, otherwise keeps it.
    /// Unread records are discarded. Closing a closed cursor does nothing.
    pub fn close(&mut self, delete: bool) -> io::Result<()> {
        self.reader = None;
        self.current = None;
        self.error = None;

        match self.run.take() {
            Some(run) if delete => run.delete(),
            Some(run) => run.keep(),
            None => Ok(()),
        }
    }

    fn state_rank(&self) -> u8 {
        match (&self.error, &self.current) {
            (Some(_), _) => 0,
            (None, Some(_)) => 1,
            (None, None) => 2,
        }
    }

    fn read_next(&mut self) {
        let reader = match self.reader.as_mut() {
            Some(reader) => reader,
            None => return,
        };

        match self.serializer.read(reader) {
            Some(Ok(item)) => self.current = Some(item),
            Some(Err(err)) => {
                self.error = Some(SortError::DeserializationError(err));
                self.reader = None;
            }
            // drained runs release their handle right away
            None => self.reader = None,
        }
    }
}
