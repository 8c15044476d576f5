use std::cmp::Ordering;
use std::fs;
use std::io::{self, prelude::*};
use std::path::PathBuf;
use std::process;

use bytesize::ByteSize;
use clap::Parser;
use env_logger;
use log;

use ext_merge_sort::{ExternalSorter, ExternalSorterBuilder, LineSerializer, MergeIterator};

/// External merge sort of text lines.
#[derive(Parser)]
#[clap(name = "ext-sort")]
struct Args {
    /// File to be sorted
    #[clap(short, long)]
    input: PathBuf,
    /// Result file
    #[clap(short, long)]
    output: PathBuf,
    /// Sorting order
    #[clap(short, long, arg_enum, default_value = "asc")]
    sort: Order,
    /// Logging level
    #[clap(short, long = "loglevel", arg_enum, default_value = "info")]
    log_level: LogLevel,
    /// Number of threads sorting chunks in parallel, chunks are sorted on the main thread if omitted
    #[clap(short, long)]
    threads: Option<usize>,
    /// Directory to be used to store temporary data
    #[clap(short = 'd', long)]
    tmp_dir: Option<PathBuf>,
    /// Number of lines sorted in memory at once
    #[clap(short, long, default_value_t = 1000)]
    chunk_size: usize,
    /// Maximum number of temporary files merged at once
    #[clap(short = 'f', long, default_value_t = 25)]
    max_open_files: usize,
    /// Temporary file read/write buffer size
    #[clap(short, long, default_value = "8KiB")]
    buf_size: ByteSize,
    /// Output only the first of equal lines
    #[clap(short = 'u', long)]
    distinct: bool,
    /// Do not remove temporary files
    #[clap(short, long)]
    keep_tmp: bool,
}

#[derive(Copy, Clone, clap::ArgEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for log::LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => log::LevelFilter::Off,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

#[derive(Copy, Clone, clap::ArgEnum)]
enum Order {
    Asc,
    Desc,
}

impl Order {
    fn compare(self) -> fn(&String, &String) -> Ordering {
        match self {
            Order::Asc => |a, b| a.cmp(b),
            Order::Desc => |a, b| a.cmp(b).reverse(),
        }
    }
}

fn main() {
    let args = Args::parse();

    env_logger::Builder::new()
        .filter_level(args.log_level.into())
        .format_timestamp_millis()
        .init();

    if let Err(err) = run(&args) {
        log::error!("{}", err);
        process::exit(1);
    }
}

fn run(args: &Args) -> Result<(), String> {
    let input = fs::File::open(&args.input).map_err(|err| format!("input file opening error: {}", err))?;
    let output = fs::File::create(&args.output).map_err(|err| format!("output file creation error: {}", err))?;

    let mut builder = ExternalSorterBuilder::with_serializer(LineSerializer::with_compare(args.sort.compare()))
        .with_chunk_size(args.chunk_size)
        .with_max_open_files(args.max_open_files)
        .with_rw_buf_size(args.buf_size.as_u64() as usize)
        .with_distinct(args.distinct)
        .with_cleanup(!args.keep_tmp);
    if let Some(threads) = args.threads {
        builder = builder.with_threads_number(threads);
    }
    if let Some(tmp_dir) = &args.tmp_dir {
        builder = builder.with_tmp_dir(tmp_dir);
    }

    let sorter: ExternalSorter<String, _> =
        builder.build().map_err(|err| format!("sorter initialization error: {}", err))?;

    let mut sorted = sorter
        .sort(io::BufReader::new(input).lines())
        .map_err(|err| format!("data sorting error: {}", err))?;
    log::info!("merging {} sorted runs", sorted.run_count());

    let saved = save(&mut sorted, io::BufWriter::new(output));
    // temporary files are released even if saving failed
    let closed = sorted.close();

    saved?;
    closed.map_err(|err| format!("temporary data cleanup error: {}", err))?;

    return Ok(());
}

fn save<F, W>(sorted: &mut MergeIterator<String, LineSerializer<F>>, mut writer: W) -> Result<(), String>
where
    F: Fn(&String, &String) -> Ordering,
    W: Write,
{
    for line in sorted {
        let line = line.map_err(|err| format!("sorting stream error: {}", err))?;
        writeln!(writer, "{}", line).map_err(|err| format!("data saving error: {}", err))?;
    }
    writer.flush().map_err(|err| format!("data flushing error: {}", err))?;

    return Ok(());
}
