//! Limited chunk buffer.

use rayon::slice::ParallelSliceMut;

use crate::serializer::Serializer;

/// In-memory chunk buffer limited by elements count.
pub struct LimitedBuffer<T> {
    limit: usize,
    inner: Vec<T>,
}

impl<T> LimitedBuffer<T> {
    /// Creates an empty buffer holding at most `limit` elements.
    pub fn new(limit: usize) -> Self {
        LimitedBuffer {
            limit,
            inner: Vec::with_capacity(std::cmp::max(2, limit / 4)),
        }
    }

    /// Adds a new element to the buffer.
    pub fn push(&mut self, item: T) {
        self.inner.push(item);
    }

    /// Returns buffer length.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Checks if the buffer reached the limit.
    pub fn is_full(&self) -> bool {
        self.inner.len() >= self.limit
    }

    /// Sorts buffered elements with the serializer's ordering.
    /// If a thread pool is passed the elements are sorted in parallel using it.
    pub fn sort<S>(&mut self, serializer: &S, thread_pool: Option<&rayon::ThreadPool>)
    where
        T: Send,
        S: Serializer<T> + Sync,
    {
        match thread_pool {
            Some(thread_pool) => thread_pool.install(|| {
                self.inner.par_sort_by(|a, b| serializer.compare(a, b));
            }),
            None => serializer.sort(&mut self.inner),
        }
    }
}

impl<T> IntoIterator for LimitedBuffer<T> {
    type Item = T;
    type IntoIter = <Vec<T> as IntoIterator>::IntoIter;

    fn into_iter(self) -> Self::IntoIter {
        self.inner.into_iter()
    }
}
