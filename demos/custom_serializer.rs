use std::cmp::Ordering;
use std::fs;
use std::io::{self, prelude::*};
use std::path;

use env_logger;
use log;

use ext_merge_sort::{ExternalSorter, ExternalSorterBuilder, Serializer};

/// Fixed width little-endian `u32` encoding sorted in descending order.
#[derive(Default)]
struct U32DescSerializer;

impl Serializer<u32> for U32DescSerializer {
    type SerializationError = io::Error;
    type DeserializationError = io::Error;

    fn compare(&self, a: &u32, b: &u32) -> Ordering {
        b.cmp(a)
    }

    fn write<W: Write>(&self, writer: &mut W, item: &u32) -> Result<(), Self::SerializationError> {
        writer.write_all(&item.to_le_bytes())
    }

    fn read<R: BufRead>(&self, reader: &mut R) -> Option<Result<u32, Self::DeserializationError>> {
        match reader.fill_buf() {
            Ok(buf) if buf.is_empty() => return None,
            Ok(_) => {}
            Err(err) => return Some(Err(err)),
        }

        let mut buf = [0u8; 4];
        return Some(reader.read_exact(&mut buf).map(|_| u32::from_le_bytes(buf)));
    }
}

fn main() {
    env_logger::Builder::new().filter_level(log::LevelFilter::Debug).init();

    let input_reader = io::BufReader::new(fs::File::open("input.txt").unwrap());
    let mut output_writer = io::BufWriter::new(fs::File::create("output.txt").unwrap());

    let sorter: ExternalSorter<u32, U32DescSerializer> = ExternalSorterBuilder::new()
        .with_tmp_dir(path::Path::new("./"))
        .with_chunk_size(1_000_000)
        .with_max_open_files(16)
        .build()
        .unwrap();

    let sorted = sorter
        .sort(input_reader.lines().map(|line| {
            let line = line.unwrap();
            let number = line.parse().unwrap();

            return Ok::<u32, io::Error>(number);
        }))
        .unwrap();

    for item in sorted.map(Result::unwrap) {
        output_writer.write_all(format!("{}\n", item).as_bytes()).unwrap();
    }
    output_writer.flush().unwrap();
}
