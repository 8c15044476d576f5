//! External sorter.

use log;
use std::convert::Infallible;
use std::error::Error;
use std::fmt;
use std::fmt::Display;
use std::fs;
use std::io::{self, prelude::*};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::buffer::LimitedBuffer;
use crate::chunk::SortedRun;
use crate::config::{SortConfig, DEFAULT_BUF_SIZE, DEFAULT_CHUNK_SIZE, DEFAULT_MAX_OPEN_FILES};
use crate::fanin::FanInLimiter;
use crate::iter::MergeIterator;
use crate::serializer::{RmpSerializer, Serializer};

/// Sorting error.
#[derive(Debug)]
pub enum SortError<S: Error, D: Error> {
    /// Temporary directory or file creation error.
    TempFile(io::Error),
    /// Workers thread pool initialization error.
    ThreadPoolBuildError(rayon::ThreadPoolBuildError),
    /// Common I/O error.
    IO(io::Error),
    /// Data serialization error.
    SerializationError(S),
    /// Data deserialization error.
    DeserializationError(D),
    /// Input data stream error.
    InputError(Box<dyn Error + Send + Sync>),
    /// Run file release or removal error.
    Cleanup(io::Error),
    /// Sorter configuration error.
    InvalidConfig(String),
}

/// Sorting error produced with serializer `S` of records `T`.
pub type SortErrorOf<T, S> =
    SortError<<S as Serializer<T>>::SerializationError, <S as Serializer<T>>::DeserializationError>;

impl<S, D> Error for SortError<S, D>
where
    S: Error + 'static,
    D: Error + 'static,
{
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self {
            SortError::TempFile(err) => Some(err),
            SortError::ThreadPoolBuildError(err) => Some(err),
            SortError::IO(err) => Some(err),
            SortError::SerializationError(err) => Some(err),
            SortError::DeserializationError(err) => Some(err),
            SortError::InputError(err) => Some(err.as_ref()),
            SortError::Cleanup(err) => Some(err),
            SortError::InvalidConfig(_) => None,
        }
    }
}

impl<S: Error, D: Error> Display for SortError<S, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self {
            SortError::TempFile(err) => write!(f, "temporary directory or file not created: {}", err),
            SortError::ThreadPoolBuildError(err) => write!(f, "thread pool initialization failed: {}", err),
            SortError::IO(err) => write!(f, "I/O operation failed: {}", err),
            SortError::SerializationError(err) => write!(f, "data serialization error: {}", err),
            SortError::DeserializationError(err) => write!(f, "data deserialization error: {}", err),
            SortError::InputError(err) => write!(f, "input data stream error: {}", err),
            SortError::Cleanup(err) => write!(f, "run file cleanup failed: {}", err),
            SortError::InvalidConfig(err) => write!(f, "invalid sorter configuration: {}", err),
        }
    }
}

/// External sorter builder. Provides methods for [`ExternalSorter`] initialization.
#[derive(Clone)]
pub struct ExternalSorterBuilder<T, S = RmpSerializer<T>> {
    /// Maximum number of records sorted in memory at once.
    chunk_size: usize,
    /// Maximum number of run files merged at once.
    max_open_files: usize,
    /// Run file read/write buffer size.
    rw_buf_size: usize,
    /// Drop adjacent duplicates.
    distinct: bool,
    /// Remove run files when the output is closed.
    cleanup: bool,
    /// Directory to be used to store temporary data.
    tmp_dir: Option<PathBuf>,
    /// Number of threads to be used to sort chunks in parallel.
    threads_number: Option<usize>,
    /// Record serializer.
    serializer: S,

    /// Input item type.
    item_type: PhantomData<fn() -> T>,
}

impl<T, S> ExternalSorterBuilder<T, S>
where
    S: Serializer<T>,
{
    /// Creates an instance of a builder with default parameters.
    pub fn new() -> Self
    where
        S: Default,
    {
        ExternalSorterBuilder::default()
    }

    /// Creates an instance of a builder with default parameters using a custom record serializer.
    pub fn with_serializer(serializer: S) -> Self {
        ExternalSorterBuilder {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_open_files: DEFAULT_MAX_OPEN_FILES,
            rw_buf_size: DEFAULT_BUF_SIZE,
            distinct: false,
            cleanup: true,
            tmp_dir: None,
            threads_number: None,
            serializer,
            item_type: PhantomData,
        }
    }

    /// Builds an [`ExternalSorter`] instance using provided configuration.
    pub fn build(self) -> Result<ExternalSorter<T, S>, SortErrorOf<T, S>> {
        let tmp_dir = self.tmp_dir.unwrap_or_else(std::env::temp_dir);
        let config = SortConfig::new(
            self.chunk_size,
            self.max_open_files,
            self.rw_buf_size,
            self.distinct,
            self.cleanup,
            tmp_dir,
            self.threads_number,
        )
        .map_err(SortError::InvalidConfig)?;

        ExternalSorter::new(config, self.serializer)
    }

    /// Sets maximum number of records sorted in memory at once.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> ExternalSorterBuilder<T, S> {
        self.chunk_size = chunk_size;
        return self;
    }

    /// Sets maximum number of run files merged at once.
    pub fn with_max_open_files(mut self, max_open_files: usize) -> ExternalSorterBuilder<T, S> {
        self.max_open_files = max_open_files;
        return self;
    }

    /// Sets run file read/write buffer size.
    pub fn with_rw_buf_size(mut self, buf_size: usize) -> ExternalSorterBuilder<T, S> {
        self.rw_buf_size = buf_size;
        return self;
    }

    /// Enables dropping of records equal to the previously returned one.
    pub fn with_distinct(mut self, distinct: bool) -> ExternalSorterBuilder<T, S> {
        self.distinct = distinct;
        return self;
    }

    /// Sets whether run files are removed when the output is closed.
    pub fn with_cleanup(mut self, cleanup: bool) -> ExternalSorterBuilder<T, S> {
        self.cleanup = cleanup;
        return self;
    }

    /// Sets directory to be used to store temporary data.
    pub fn with_tmp_dir(mut self, path: &Path) -> ExternalSorterBuilder<T, S> {
        self.tmp_dir = Some(path.into());
        return self;
    }

    /// Sets number of threads to be used to sort chunks in parallel.
    pub fn with_threads_number(mut self, threads_number: usize) -> ExternalSorterBuilder<T, S> {
        self.threads_number = Some(threads_number);
        return self;
    }
}

impl<T, S> Default for ExternalSorterBuilder<T, S>
where
    S: Serializer<T> + Default,
{
    fn default() -> Self {
        ExternalSorterBuilder::with_serializer(S::default())
    }
}

/// External sorter.
pub struct ExternalSorter<T, S = RmpSerializer<T>> {
    /// Sorter configuration.
    config: SortConfig,
    /// Record serializer shared with run cursors.
    serializer: Arc<S>,
    /// Chunk sorting thread pool, chunks are sorted on the caller thread if not set.
    thread_pool: Option<rayon::ThreadPool>,

    /// Input item type.
    item_type: PhantomData<fn() -> T>,
}

impl<T, S> ExternalSorter<T, S>
where
    S: Serializer<T>,
{
    /// Creates a new external sorter instance.
    ///
    /// # Arguments
    /// * `config` - Sorter configuration
    /// * `serializer` - Serializer used to order records and to save them to run files
    pub fn new(config: SortConfig, serializer: S) -> Result<Self, SortErrorOf<T, S>> {
        return Ok(ExternalSorter {
            thread_pool: Self::init_thread_pool(config.threads_number())?,
            config: Self::init_tmp_directory(config)?,
            serializer: Arc::new(serializer),
            item_type: PhantomData,
        });
    }

    fn init_thread_pool(threads_number: Option<usize>) -> Result<Option<rayon::ThreadPool>, SortErrorOf<T, S>> {
        let threads_number = match threads_number {
            Some(threads_number) => threads_number,
            None => {
                log::info!("sorting chunks on the caller thread");
                return Ok(None);
            }
        };

        log::info!("initializing thread-pool (threads: {})", threads_number);
        let thread_pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads_number)
            .build()
            .map_err(|err| SortError::ThreadPoolBuildError(err))?;

        return Ok(Some(thread_pool));
    }

    fn init_tmp_directory(config: SortConfig) -> Result<SortConfig, SortErrorOf<T, S>> {
        fs::create_dir_all(config.tmp_dir()).map_err(|err| SortError::TempFile(err))?;

        log::info!("using {} as a temporary directory", config.tmp_dir().display());

        return Ok(config);
    }

    /// Returns sorter configuration.
    pub fn config(&self) -> &SortConfig {
        &self.config
    }

    /// Sorts data from the input.
    /// Returns an iterator that can be used to get sorted data stream.
    ///
    /// # Arguments
    /// * `input` - Input stream data to be fetched from
    pub fn sort<I, E>(&self, input: I) -> Result<MergeIterator<T, S>, SortErrorOf<T, S>>
    where
        T: Send,
        S: Sync,
        I: IntoIterator<Item = Result<T, E>>,
        E: Error + Send + Sync + 'static,
    {
        let items = input
            .into_iter()
            .map(|item| item.map_err(|err| SortError::InputError(Box::new(err))));

        let runs = self.create_runs(items)?;
        self.merge(runs)
    }

    /// Sorts infallible data from the input.
    ///
    /// # Arguments
    /// * `input` - Items to be sorted
    pub fn sort_values<I>(&self, input: I) -> Result<MergeIterator<T, S>, SortErrorOf<T, S>>
    where
        T: Send,
        S: Sync,
        I: IntoIterator<Item = T>,
    {
        self.sort(input.into_iter().map(Ok::<T, Infallible>))
    }

    /// Sorts records decoded from a byte stream by the serializer.
    ///
    /// # Arguments
    /// * `input` - Encoded input stream
    pub fn sort_stream<R>(&self, input: R) -> Result<MergeIterator<T, S>, SortErrorOf<T, S>>
    where
        T: Send,
        S: Sync,
        R: Read,
    {
        let reader = io::BufReader::with_capacity(self.config.buf_size(), input);
        let items = self
            .serializer
            .decode(reader)
            .map(|item| item.map_err(SortError::DeserializationError));

        let runs = self.create_runs(items)?;
        self.merge(runs)
    }

    fn create_runs<I>(&self, items: I) -> Result<Vec<SortedRun>, SortErrorOf<T, S>>
    where
        T: Send,
        S: Sync,
        I: Iterator<Item = Result<T, SortErrorOf<T, S>>>,
    {
        let mut chunk_buf = LimitedBuffer::new(self.config.chunk_size());
        let mut runs = Vec::new();

        for item in items {
            chunk_buf.push(item?);

            if chunk_buf.is_full() {
                runs.push(self.create_run(chunk_buf)?);
                chunk_buf = LimitedBuffer::new(self.config.chunk_size());
            }
        }

        if !chunk_buf.is_empty() {
            runs.push(self.create_run(chunk_buf)?);
        }

        log::debug!("external sort preparation done (runs: {})", runs.len());

        return Ok(runs);
    }

    fn create_run(&self, mut buffer: LimitedBuffer<T>) -> Result<SortedRun, SortErrorOf<T, S>>
    where
        T: Send,
        S: Sync,
    {
        log::debug!("sorting chunk data ({} records) ...", buffer.len());
        buffer.sort(self.serializer.as_ref(), self.thread_pool.as_ref());

        log::debug!("saving chunk data");
        SortedRun::build::<T, S, _>(
            self.config.tmp_dir(),
            buffer,
            self.serializer.as_ref(),
            self.config.buf_size(),
        )
    }

    fn merge(&self, runs: Vec<SortedRun>) -> Result<MergeIterator<T, S>, SortErrorOf<T, S>> {
        let runs = FanInLimiter::new(&self.config, &self.serializer).limit::<T>(runs)?;

        MergeIterator::open(
            runs,
            self.serializer.clone(),
            self.config.buf_size(),
            self.config.distinct(),
            self.config.cleanup(),
        )
    }
}
