use std::io;

use crate::utils::sample_path;
use tabagg::processor::{pipeline::PipelineOptions, stream_processor::StreamProcessor};
mod utils;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let path = sample_path();
    let options = PipelineOptions::default();

    // Per ticker: trading days, total volume and the day of the highest close
    for spec in ["k0 c s3 M2_1", "key(_4) count(distinct, _0)"] {
        println!("{spec}");
        let mut processor = StreamProcessor::from_spec(spec, Box::new(io::stdout()), &options)?;
        processor.process_path(&path)?;
        processor.finish()?;
    }

    Ok(())
}
