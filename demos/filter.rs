use std::io;

use crate::utils::sample_path;
use tabagg::processor::{pipeline::PipelineOptions, stream_processor::StreamProcessor};
mod utils;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let path = sample_path();
    let options = PipelineOptions::default();

    // Days on which a ticker starting with "A" traded more than 60M shares
    let spec = "filter(_0~^A) filter(_3~^([6-9][0-9]|[1-9][0-9]{2,})[0-9]{6}$) _0 _1 _3";
    let mut processor = StreamProcessor::from_spec(spec, Box::new(io::stdout()), &options)?;
    processor.process_path(&path)?;
    processor.finish()?;

    Ok(())
}
