//! Merge fan-in limiting.
//!
//! When there are more runs than files allowed to be open at once, leading runs are merged into intermediate
//! runs until the rest can be merged in a single pass.

use std::sync::Arc;

use log;

use crate::chunk::SortedRun;
use crate::config::SortConfig;
use crate::iter::MergeIterator;
use crate::serializer::Serializer;
use crate::sort::SortErrorOf;

/// Returns the number of leading runs merged in one partial merge round.
/// At least two runs are merged so that every round reduces the run count,
/// and never more than `max_open_files`.
pub fn chunks_to_merge(run_count: usize, max_open_files: usize) -> usize {
    std::cmp::min(
        std::cmp::max(2, run_count.saturating_sub(max_open_files)),
        max_open_files,
    )
}

/// Fan-in limiter. Reduces the number of runs to the configured maximum number of open files.
pub struct FanInLimiter<'a, S> {
    config: &'a SortConfig,
    serializer: &'a Arc<S>,
}

impl<'a, S> FanInLimiter<'a, S> {
    pub fn new(config: &'a SortConfig, serializer: &'a Arc<S>) -> Self {
        FanInLimiter { config, serializer }
    }

    /// Merges leading runs until no more than `max_open_files` runs are left.
    /// Merging the returned runs yields the same output as merging the input runs.
    pub fn limit<T>(&self, runs: Vec<SortedRun>) -> Result<Vec<SortedRun>, SortErrorOf<T, S>>
    where
        S: Serializer<T>,
    {
        let max_open_files = self.config.max_open_files();
        if runs.len() <= max_open_files {
            return Ok(runs);
        }

        log::info!("partial merge start (runs: {}, max open files: {})", runs.len(), max_open_files);

        let mut runs = runs;
        let mut round = 0;
        while runs.len() > max_open_files {
            round += 1;
            runs = self.merge_head::<T>(runs, round)?;
        }

        log::info!("partial merge done (runs: {}, rounds: {})", runs.len(), round);

        return Ok(runs);
    }

    fn merge_head<T>(&self, mut runs: Vec<SortedRun>, round: usize) -> Result<Vec<SortedRun>, SortErrorOf<T, S>>
    where
        S: Serializer<T>,
    {
        let chunks_to_merge = chunks_to_merge(runs.len(), self.config.max_open_files());
        let mut tail = runs.split_off(chunks_to_merge);
        log::debug!(
            "partial merge round {}: merging {} runs, {} left",
            round,
            runs.len(),
            tail.len()
        );

        tail.push(self.merge_runs::<T>(runs)?);

        return Ok(tail);
    }

    fn merge_runs<T>(&self, runs: Vec<SortedRun>) -> Result<SortedRun, SortErrorOf<T, S>>
    where
        S: Serializer<T>,
    {
        // consumed runs are always removed, cleanup only affects the runs of the final output
        let mut merged = MergeIterator::<T, S>::open(
            runs,
            self.serializer.clone(),
            self.config.buf_size(),
            self.config.distinct(),
            true,
        )?;

        let result = SortedRun::build_merged::<T, S, _>(
            self.config.tmp_dir(),
            merged.by_ref(),
            self.serializer.as_ref(),
            self.config.buf_size(),
        );
        let closed = merged.close();

        let run = result?;
        closed?;

        return Ok(run);
    }
}
