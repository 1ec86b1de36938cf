use std::io;

use tabagg::processor::{pipeline::PipelineOptions, stream_processor::StreamProcessor};

use crate::utils::sample_path;
mod utils;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let path = sample_path();
    let options = PipelineOptions::default();

    // Row count, total volume, lowest and highest close
    let spec = "count sum(_3) min(_2) max(_2)";
    println!("{spec}");
    let mut processor = StreamProcessor::from_spec(spec, Box::new(io::stdout()), &options)?;
    processor.process_path(&path)?;
    processor.finish()?;

    Ok(())
}
