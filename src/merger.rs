//! Binary heap merger.

use std::cmp::Ordering;
use std::collections::binary_heap::{BinaryHeap, PeekMut};

use crate::chunk::RunCursor;
use crate::serializer::Serializer;
use crate::sort::SortErrorOf;

/// Heap entry ordering cursors by their look-ahead records.
/// Equal records are taken from the cursor added first.
struct HeapEntry<T, S>
where
    S: Serializer<T>,
{
    cursor: RunCursor<T, S>,
    idx: usize,
}

impl<T, S: Serializer<T>> PartialEq for HeapEntry<T, S> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<T, S: Serializer<T>> Eq for HeapEntry<T, S> {}

impl<T, S: Serializer<T>> PartialOrd for HeapEntry<T, S> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T, S: Serializer<T>> Ord for HeapEntry<T, S> {
    fn cmp(&self, other: &Self) -> Ordering {
        // binary heap is max-heap by default so the order is reversed to convert it to min-heap
        other
            .cursor
            .compare(&self.cursor)
            .then_with(|| other.idx.cmp(&self.idx))
    }
}

/// Binary heap merger implementation.
/// Merges multiple sorted runs into a single sorted output.
/// Time complexity is *m* \* log(*n*) in worst case where *m* is the number of items,
/// *n* is the number of runs.
pub struct BinaryHeapMerger<T, S>
where
    S: Serializer<T>,
{
    items: BinaryHeap<HeapEntry<T, S>>,
    drained: Vec<RunCursor<T, S>>,
    distinct: bool,
}

impl<T, S> BinaryHeapMerger<T, S>
where
    S: Serializer<T>,
{
    /// Creates an instance of a binary heap merger using run cursors as inputs.
    /// Run records should be sorted in ascending order otherwise the result is undefined.
    ///
    /// # Arguments
    /// * `cursors` - Cursors to be merged in a single sorted output
    /// * `distinct` - Drop records equal to the previously returned one
    pub fn new<I>(cursors: I, distinct: bool) -> Self
    where
        I: IntoIterator<Item = RunCursor<T, S>>,
    {
        let mut merger = BinaryHeapMerger {
            items: BinaryHeap::new(),
            drained: Vec::new(),
            distinct,
        };

        for (idx, cursor) in cursors.into_iter().enumerate() {
            merger.restore(HeapEntry { cursor, idx });
        }

        return merger;
    }

    /// Number of runs not drained yet.
    pub fn active_runs(&self) -> usize {
        self.items.len()
    }

    /// Closes every cursor, removing run files if `delete` is set.
    /// All cursors are closed even if some of them fail, the errors are returned in order.
    pub fn close(&mut self, delete: bool) -> Vec<std::io::Error> {
        let cursors = self
            .items
            .drain()
            .map(|entry| entry.cursor)
            .chain(self.drained.drain(..));

        let mut errors = Vec::new();
        for mut cursor in cursors {
            if let Err(err) = cursor.close(delete) {
                errors.push(err);
            }
        }

        return errors;
    }

    fn restore(&mut self, entry: HeapEntry<T, S>) {
        if entry.cursor.has_next() {
            self.items.push(entry);
        } else {
            self.drained.push(entry.cursor);
        }
    }

    fn skip_equal(&mut self, item: &T) -> Result<(), SortErrorOf<T, S>> {
        while let Some(mut top) = self.items.peek_mut() {
            if !top.cursor.current_eq(item) {
                break;
            }

            top.cursor.advance()?;
            if !top.cursor.has_next() {
                let entry = PeekMut::pop(top);
                self.drained.push(entry.cursor);
            }
        }

        return Ok(());
    }
}

impl<T, S> Iterator for BinaryHeapMerger<T, S>
where
    S: Serializer<T>,
{
    type Item = Result<T, SortErrorOf<T, S>>;

    /// Returns the next item from the inputs in ascending order.
    fn next(&mut self) -> Option<Self::Item> {
        let mut entry = self.items.pop()?;

        let result = match entry.cursor.advance() {
            Ok(result) => result,
            Err(err) => {
                self.drained.push(entry.cursor);
                return Some(Err(err));
            }
        };
        self.restore(entry);

        // cursors in the heap hold either a record or a read error
        let result = result?;
        if self.distinct {
            if let Err(err) = self.skip_equal(&result) {
                return Some(Err(err));
            }
        }

        return Some(Ok(result));
    }
}
