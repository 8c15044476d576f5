//! Sorted output iterator.

use std::sync::Arc;

use log;

use crate::chunk::{RunCursor, SortedRun};
use crate::merger::BinaryHeapMerger;
use crate::serializer::Serializer;
use crate::sort::{SortError, SortErrorOf};

enum MergeSource<T, S>
where
    S: Serializer<T>,
{
    Empty,
    Single(RunCursor<T, S>),
    Multi(BinaryHeapMerger<T, S>),
}

/// Lazy sorted output of an external sort.
///
/// The iterator owns the run files it reads from. They are released by [`MergeIterator::close`], which also
/// removes them if cleanup is enabled. An iterator dropped without being closed is closed implicitly.
pub struct MergeIterator<T, S>
where
    S: Serializer<T>,
{
    source: MergeSource<T, S>,
    runs: usize,
    distinct: bool,
    cleanup: bool,
    closed: bool,
    failed: bool,
}

impl<T, S> MergeIterator<T, S>
where
    S: Serializer<T>,
{
    /// Opens all the runs for merging. A single run is read directly without a merge heap.
    ///
    /// # Arguments
    /// * `runs` - Sorted runs to be merged
    /// * `serializer` - Serializer the runs were written with
    /// * `buf_size` - Run file read buffer size
    /// * `distinct` - Drop records equal to the previously returned one
    /// * `cleanup` - Remove run files on close
    pub fn open(
        runs: Vec<SortedRun>,
        serializer: Arc<S>,
        buf_size: usize,
        distinct: bool,
        cleanup: bool,
    ) -> Result<Self, SortErrorOf<T, S>> {
        let run_count = runs.len();
        log::debug!("merging {} runs", run_count);

        let mut cursors = Vec::with_capacity(run_count);
        for run in runs {
            cursors.push(RunCursor::open(run, serializer.clone(), buf_size)?);
        }

        let source = match cursors.len() {
            0 => MergeSource::Empty,
            1 => MergeSource::Single(cursors.remove(0)),
            _ => MergeSource::Multi(BinaryHeapMerger::new(cursors, distinct)),
        };

        return Ok(MergeIterator {
            source,
            runs: run_count,
            distinct,
            cleanup,
            closed: false,
            failed: false,
        });
    }

    /// Number of runs the output is merged from.
    pub fn run_count(&self) -> usize {
        self.runs
    }

    /// Checks whether records are read from a single run without merging.
    pub fn is_passthrough(&self) -> bool {
        matches!(self.source, MergeSource::Single(_))
    }

    /// Checks whether more records can be read without advancing the iterator.
    pub fn has_next(&self) -> bool {
        if self.failed {
            return false;
        }

        match &self.source {
            MergeSource::Empty => false,
            MergeSource::Single(cursor) => cursor.has_next(),
            MergeSource::Multi(merger) => merger.active_runs() > 0,
        }
    }

    /// Releases all run files. Run files are removed if cleanup is enabled.
    ///
    /// Every run is closed even if closing some of them fails; the first failure is returned and the rest
    /// are logged. Closing a closed iterator does nothing.
    pub fn close(&mut self) -> Result<(), SortErrorOf<T, S>> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let mut errors = match std::mem::replace(&mut self.source, MergeSource::Empty) {
            MergeSource::Empty => Vec::new(),
            MergeSource::Single(mut cursor) => cursor.close(self.cleanup).err().into_iter().collect(),
            MergeSource::Multi(mut merger) => merger.close(self.cleanup),
        }
        .into_iter();

        log::debug!("merge output closed (runs: {}, cleanup: {})", self.runs, self.cleanup);

        let first = match errors.next() {
            Some(err) => err,
            None => return Ok(()),
        };
        for err in errors {
            log::warn!("run file release failed: {}", err);
        }

        return Err(SortError::Cleanup(first));
    }

    fn next_single(cursor: &mut RunCursor<T, S>, distinct: bool) -> Result<Option<T>, SortErrorOf<T, S>> {
        let result = match cursor.advance()? {
            Some(result) => result,
            None => return Ok(None),
        };

        if distinct {
            while cursor.current_eq(&result) {
                cursor.advance()?;
            }
        }

        return Ok(Some(result));
    }
}

impl<T, S> Iterator for MergeIterator<T, S>
where
    S: Serializer<T>,
{
    type Item = Result<T, SortErrorOf<T, S>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }

        let result = match &mut self.source {
            MergeSource::Empty => None,
            MergeSource::Single(cursor) => Self::next_single(cursor, self.distinct).transpose(),
            MergeSource::Multi(merger) => merger.next(),
        };

        if let Some(Err(_)) = result {
            self.failed = true;
        }

        return result;
    }
}

impl<T, S> Drop for MergeIterator<T, S>
where
    S: Serializer<T>,
{
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            log::warn!("merge output closing failed: {}", err);
        }
    }
}

#[cfg(test)]
mod test {
    use std::fs;
    use std::io;
    use std::sync::Arc;

    use rstest::*;

    use super::MergeIterator;
    use crate::chunk::SortedRun;
    use crate::serializer::RmpSerializer;
    use crate::sort::SortError;

    #[fixture]
    fn tmp_dir() -> tempfile::TempDir {
        tempfile::tempdir().unwrap()
    }

    fn build_runs(dir: &tempfile::TempDir, runs: Vec<Vec<i32>>, serializer: &RmpSerializer<i32>) -> Vec<SortedRun> {
        runs.into_iter()
            .map(|items| SortedRun::build(dir.path(), items, serializer, 64).unwrap())
            .collect()
    }

    fn files_count(dir: &tempfile::TempDir) -> usize {
        fs::read_dir(dir.path()).unwrap().count()
    }

    #[rstest]
    #[case(vec![], false, vec![], false)]
    #[case(vec![vec![1, 1, 2]], false, vec![1, 1, 2], true)]
    #[case(vec![vec![1, 1, 2, 2, 2, 3]], true, vec![1, 2, 3], true)]
    #[case(vec![vec![1, 3], vec![1, 2]], false, vec![1, 1, 2, 3], false)]
    #[case(vec![vec![1, 3], vec![1, 2]], true, vec![1, 2, 3], false)]
    fn test_merge_iterator(
        tmp_dir: tempfile::TempDir,
        #[case] runs: Vec<Vec<i32>>,
        #[case] distinct: bool,
        #[case] expected_result: Vec<i32>,
        #[case] passthrough: bool,
    ) {
        let serializer = Arc::new(RmpSerializer::<i32>::default());
        let run_count = runs.len();
        let runs = build_runs(&tmp_dir, runs, &serializer);

        let mut iter = MergeIterator::open(runs, serializer, 64, distinct, true).unwrap();
        assert_eq!(iter.run_count(), run_count);
        assert_eq!(iter.is_passthrough(), passthrough);

        assert_eq!(iter.has_next(), !expected_result.is_empty());

        let actual_result: Result<Vec<i32>, _> = iter.by_ref().collect();
        assert_eq!(actual_result.unwrap(), expected_result);
        assert_eq!(iter.has_next(), false);

        iter.close().unwrap();
        assert_eq!(files_count(&tmp_dir), 0);
    }

    #[rstest]
    #[case(vec![vec![1, 2, 3]])]
    #[case(vec![vec![1, 2, 3], vec![4, 5], vec![0]])]
    fn test_close_before_drained(tmp_dir: tempfile::TempDir, #[case] runs: Vec<Vec<i32>>) {
        let serializer = Arc::new(RmpSerializer::<i32>::default());
        let runs = build_runs(&tmp_dir, runs, &serializer);

        let mut iter = MergeIterator::open(runs, serializer, 64, false, true).unwrap();
        assert!(iter.next().unwrap().is_ok());

        iter.close().unwrap();
        assert_eq!(files_count(&tmp_dir), 0);
        assert!(iter.next().is_none());

        // closing twice is allowed
        iter.close().unwrap();
    }

    #[rstest]
    fn test_close_without_cleanup(tmp_dir: tempfile::TempDir) {
        let serializer = Arc::new(RmpSerializer::<i32>::default());
        let runs = build_runs(&tmp_dir, vec![vec![1, 2], vec![3]], &serializer);

        let mut iter = MergeIterator::open(runs, serializer, 64, false, false).unwrap();
        iter.close().unwrap();
        drop(iter);

        assert_eq!(files_count(&tmp_dir), 2);
    }

    #[rstest]
    fn test_drop_closes(tmp_dir: tempfile::TempDir) {
        let serializer = Arc::new(RmpSerializer::<i32>::default());
        let runs = build_runs(&tmp_dir, vec![vec![1, 2], vec![3]], &serializer);

        let mut iter = MergeIterator::open(runs, serializer, 64, false, true).unwrap();
        assert_eq!(iter.next().unwrap().unwrap(), 1);
        drop(iter);

        assert_eq!(files_count(&tmp_dir), 0);
    }

    #[rstest]
    fn test_broken_run(tmp_dir: tempfile::TempDir) {
        let serializer = Arc::new(RmpSerializer::<String>::default());
        let run = SortedRun::build(
            tmp_dir.path(),
            vec!["first".to_string(), "second".to_string()],
            serializer.as_ref(),
            64,
        )
        .unwrap();

        let len = fs::metadata(run.path()).unwrap().len();
        fs::OpenOptions::new()
            .write(true)
            .open(run.path())
            .unwrap()
            .set_len(len - 2)
            .unwrap();

        // the record read before the broken one is still returned
        let mut iter = MergeIterator::open(vec![run], serializer, 64, false, true).unwrap();
        assert_eq!(iter.next().unwrap().unwrap(), "first");
        assert_eq!(iter.has_next(), true);
        assert!(iter.next().unwrap().is_err());
        assert_eq!(iter.has_next(), false);
        assert!(iter.next().is_none());

        iter.close().unwrap();
        assert_eq!(files_count(&tmp_dir), 0);
    }
    #[rstest]
    fn test_close_after_release_failure(tmp_dir: tempfile::TempDir) {
        let serializer = Arc::new(RmpSerializer::<i32>::default());
        let runs = build_runs(&tmp_dir, vec![vec![1, 4], vec![2, 5], vec![3, 6]], &serializer);
        let removed = runs[0].path().to_path_buf();

        let mut iter = MergeIterator::open(runs, serializer, 64, false, true).unwrap();
        assert_eq!(iter.next().unwrap().unwrap(), 1);

        // the file disappears while the iterator still owns it
        fs::remove_file(&removed).unwrap();
        assert_eq!(files_count(&tmp_dir), 2);

        match iter.close() {
            Err(SortError::Cleanup(err)) => assert_eq!(err.kind(), io::ErrorKind::NotFound),
            Err(err) => panic!("unexpected error: {}", err),
            Ok(_) => panic!("cleanup error expected"),
        }
        // the remaining runs are still removed
        assert_eq!(files_count(&tmp_dir), 0);
        iter.close().unwrap();
    }

    #[rstest]
    fn test_distinct_error_after_record(tmp_dir: tempfile::TempDir) {
        let serializer = Arc::new(RmpSerializer::<String>::default());
        let run = SortedRun::build(
            tmp_dir.path(),
            vec!["a".to_string(), "a".to_string(), "b".to_string()],
            serializer.as_ref(),
            64,
        )
        .unwrap();

        // the duplicate is intact, only the last byte of "b" is cut
        let len = fs::metadata(run.path()).unwrap().len();
        fs::OpenOptions::new()
            .write(true)
            .open(run.path())
            .unwrap()
            .set_len(len - 1)
            .unwrap();

        let mut iter = MergeIterator::open(vec![run], serializer, 64, true, true).unwrap();
        assert_eq!(iter.next().unwrap().unwrap(), "a");
        assert_eq!(iter.has_next(), true);
        assert!(iter.next().unwrap().is_err());
        assert!(iter.next().is_none());
    }
}
