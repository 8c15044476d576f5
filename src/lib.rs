//! `ext-merge-sort` is a rust external merge sort implementation.
//!
//! External sorting is a class of sorting algorithms that can handle massive amounts of data. External sorting
//! is required when the data being sorted do not fit into the main memory (RAM) of a computer and instead must be
//! resided in slower external memory, usually a hard disk drive. Sorting is achieved in two passes. During the
//! first pass it sorts chunks of data that each fit in RAM, during the second pass it merges the sorted chunks
//! together. For more information see [External Sorting](https://en.wikipedia.org/wiki/External_sorting).
//!
//! # Overview
//!
//! `ext-merge-sort` supports the following features:
//!
//! * **Data agnostic:**
//!   it supports all data types that implement `serde` serialization/deserialization by default,
//!   otherwise you can implement your own [`Serializer`].
//! * **Bounded memory:**
//!   no more than `chunk_size` records are kept in memory while runs are produced.
//! * **Bounded open files:**
//!   when there are more sorted runs than `max_open_files`, leading runs are merged into intermediate ones
//!   so that no merge ever opens more than `max_open_files` run files.
//! * **Lazy output:**
//!   the sorted output is a [`MergeIterator`] pulling records from the run files on demand. It may be closed
//!   at any time, releasing and (optionally) removing all temporary files.
//! * **Duplicates suppression:**
//!   equal adjacent records can be collapsed to one (`distinct` option).
//!
//! # Example
//!
//! ```no_run
//! use std::fs;
//! use std::io::{self, prelude::*};
//! use std::path;
//!
//! use ext_merge_sort::{ExternalSorter, ExternalSorterBuilder, LineSerializer};
//!
//! fn main() {
//!     let input_reader = io::BufReader::new(fs::File::open("input.txt").unwrap());
//!     let mut output_writer = io::BufWriter::new(fs::File::create("output.txt").unwrap());
//!
//!     let sorter: ExternalSorter<String, LineSerializer> =
//!         ExternalSorterBuilder::with_serializer(LineSerializer::default())
//!             .with_tmp_dir(path::Path::new("./"))
//!             .with_chunk_size(1_000_000)
//!             .with_distinct(true)
//!             .build()
//!             .unwrap();
//!
//!     let mut sorted = sorter.sort(input_reader.lines()).unwrap();
//!
//!     for item in sorted.by_ref().map(Result::unwrap) {
//!         output_writer.write_all(format!("{}\n", item).as_bytes()).unwrap();
//!     }
//!     output_writer.flush().unwrap();
//!     sorted.close().unwrap();
//! }
//! ```

pub mod buffer;
pub mod chunk;
pub mod config;
pub mod fanin;
pub mod iter;
pub mod merger;
pub mod serializer;
pub mod sort;

pub use buffer::LimitedBuffer;
pub use chunk::{RunCursor, RunKind, SortedRun};
pub use config::SortConfig;
pub use fanin::FanInLimiter;
pub use iter::MergeIterator;
pub use merger::BinaryHeapMerger;
pub use serializer::{Decoder, LineSerializer, RmpSerializer, Serializer};
pub use sort::{ExternalSorter, ExternalSorterBuilder, SortError, SortErrorOf};
