//! Sorter configuration.

use std::path::{Path, PathBuf};

/// Default maximum number of records kept in memory per chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;
/// Default maximum number of run files merged at once.
pub const DEFAULT_MAX_OPEN_FILES: usize = 25;
/// Default run file read/write buffer size in bytes.
pub const DEFAULT_BUF_SIZE: usize = 8192;

/// Immutable sorter configuration. Built by [`crate::ExternalSorterBuilder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortConfig {
    chunk_size: usize,
    max_open_files: usize,
    buf_size: usize,
    distinct: bool,
    cleanup: bool,
    tmp_dir: PathBuf,
    threads_number: Option<usize>,
}

impl SortConfig {
    pub(crate) fn new(
        chunk_size: usize,
        max_open_files: usize,
        buf_size: usize,
        distinct: bool,
        cleanup: bool,
        tmp_dir: PathBuf,
        threads_number: Option<usize>,
    ) -> Result<Self, String> {
        if chunk_size == 0 {
            return Err("chunk size must be at least 1".to_string());
        }
        if max_open_files < 2 {
            return Err(format!("max open files must be at least 2, got {}", max_open_files));
        }
        if buf_size == 0 {
            return Err("read/write buffer size must be at least 1 byte".to_string());
        }
        if threads_number == Some(0) {
            return Err("threads number must be at least 1".to_string());
        }

        return Ok(SortConfig {
            chunk_size,
            max_open_files,
            buf_size,
            distinct,
            cleanup,
            tmp_dir,
            threads_number,
        });
    }

    /// Maximum number of records sorted in memory before they are saved to a run file.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Maximum number of run files opened by a single merge.
    pub fn max_open_files(&self) -> usize {
        self.max_open_files
    }

    /// Run file read/write buffer size.
    pub fn buf_size(&self) -> usize {
        self.buf_size
    }

    /// Whether adjacent duplicates are dropped from the output.
    pub fn distinct(&self) -> bool {
        self.distinct
    }

    /// Whether run files are deleted when the output iterator is closed.
    pub fn cleanup(&self) -> bool {
        self.cleanup
    }

    /// Directory run files are created in.
    pub fn tmp_dir(&self) -> &Path {
        &self.tmp_dir
    }

    /// Number of threads used to sort chunks, [`None`] to sort on the caller thread.
    pub fn threads_number(&self) -> Option<usize> {
        self.threads_number
    }
}

impl Default for SortConfig {
    fn default() -> Self {
        SortConfig {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_open_files: DEFAULT_MAX_OPEN_FILES,
            buf_size: DEFAULT_BUF_SIZE,
            distinct: false,
            cleanup: true,
            tmp_dir: std::env::temp_dir(),
            threads_number: None,
        }
    }
}
