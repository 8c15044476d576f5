use std::cmp::Ordering;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::fs;
use std::io::{self, prelude::*};
use std::path;

use env_logger;
use log;
use serde;

use ext_merge_sort::{ExternalSorter, ExternalSorterBuilder};

#[derive(Debug)]
enum RecordError {
    Read(io::Error),
    Format(String),
}

impl Display for RecordError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordError::Read(err) => write!(f, "record reading error: {}", err),
            RecordError::Format(err) => write!(f, "record format error: {}", err),
        }
    }
}

impl Error for RecordError {}

#[derive(Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
struct Visit {
    host: String,
    path: String,
    status: u16,
}

impl Visit {
    fn as_tsv(&self) -> String {
        format!("{}\t{}\t{}", self.host, self.path, self.status)
    }

    fn parse(line: &str) -> Result<Self, RecordError> {
        let mut fields = line.split('\t');
        match (fields.next(), fields.next(), fields.next(), fields.next()) {
            (Some(host), Some(path), Some(status), None) => Ok(Visit {
                host: host.to_string(),
                path: path.to_string(),
                status: status
                    .parse()
                    .map_err(|err| RecordError::Format(format!("status field: {}", err)))?,
            }),
            _ => Err(RecordError::Format(format!("three fields expected: {:?}", line))),
        }
    }
}

impl PartialOrd for Visit {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Visit {
    fn cmp(&self, other: &Self) -> Ordering {
        self.host
            .cmp(&other.host)
            .then(self.path.cmp(&other.path))
            .then(self.status.cmp(&other.status))
    }
}

fn main() {
    env_logger::Builder::new().filter_level(log::LevelFilter::Debug).init();

    let input_reader = io::BufReader::new(fs::File::open("visits.tsv").unwrap());
    let mut output_writer = io::BufWriter::new(fs::File::create("visits.sorted.tsv").unwrap());

    let sorter: ExternalSorter<Visit> = ExternalSorterBuilder::new()
        .with_tmp_dir(path::Path::new("./"))
        .with_chunk_size(100_000)
        .with_distinct(true)
        .build()
        .unwrap();

    let records = input_reader
        .lines()
        .map(|line| line.map_err(RecordError::Read).and_then(|line| Visit::parse(&line)));

    let mut sorted = sorter.sort(records).unwrap();

    for item in sorted.by_ref().map(Result::unwrap) {
        output_writer.write_all(format!("{}\n", item.as_tsv()).as_bytes()).unwrap();
    }
    output_writer.flush().unwrap();
    sorted.close().unwrap();
}
