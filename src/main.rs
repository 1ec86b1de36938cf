//! Command-line front end.
//!
//! Usage:
//!   tabagg 'key(_1) => count' < input.txt
//!   tabagg -i input.txt k1 s2

use std::{io, path::PathBuf, process};

use clap::Parser;
use jemallocator::Jemalloc;
use tabagg::{
    config::Config,
    processor::{ProcessorError, spec_parser::parse_pipeline, stream_processor::StreamProcessor},
};

#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

#[derive(Parser, Debug)]
#[command(name = "tabagg")]
#[command(about = "Streaming group-by aggregation over whitespace-separated text")]
#[command(version)]
struct Args {
    /// Pipeline spec; several arguments are joined with spaces
    spec: Vec<String>,

    /// Read this file instead of standard input
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Output bytes buffered before each write
    #[arg(long = "flush-bytes")]
    flush_bytes: Option<usize>,

    /// Print the parsed pipeline to stderr before running
    #[arg(long)]
    explain: bool,
}

impl From<Args> for Config {
    fn from(args: Args) -> Self {
        let mut config = Config::with_spec_tokens(&args.spec);
        config.input = args.input;
        if let Some(bytes) = args.flush_bytes {
            config.flush_threshold = bytes;
        }
        config.explain = args.explain;
        config
    }
}

fn run(config: &Config) -> Result<u64, ProcessorError> {
    let pipeline = parse_pipeline(&config.spec)?;
    if config.explain {
        eprintln!("{pipeline}");
    }

    let sink = Box::new(io::stdout().lock());
    let mut processor = StreamProcessor::new(&pipeline, sink, &config.pipeline_options())?;
    match &config.input {
        Some(path) => processor.process_path(path)?,
        None => processor.process_reader(io::stdin().lock())?,
    }
    processor.finish()
}

fn main() {
    env_logger::init();

    let config = Config::from(Args::parse());
    log::debug!("{config:?}");

    if let Err(e) = run(&config) {
        if let ProcessorError::Parse { position, .. } = &e {
            eprintln!("{}", config.spec);
            eprintln!("{:>width$}", "^", width = position + 1);
        }
        eprintln!("Error: {e}");
        process::exit(1);
    }
}
