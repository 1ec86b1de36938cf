use std::{env, io, path::Path};

use tabagg::processor::{pipeline::PipelineOptions, stream_processor::StreamProcessor};

#[global_allocator]
static ALLOC: dhat::Alloc = dhat::Alloc;

fn main() {
    let _profiler = dhat::Profiler::new_heap();

    let mut args = env::args().skip(1);
    let path = args.next().unwrap_or_else(|| "data/trades_10m.txt".to_string());
    let spec = args.next().unwrap_or_else(|| "k0 c s3 M2_1".to_string());

    let options = PipelineOptions::default();
    let mut processor =
        StreamProcessor::from_spec(&spec, Box::new(io::sink()), &options).unwrap();
    processor.process_path(Path::new(&path)).unwrap();
    let rows = processor.finish().unwrap();

    println!("Memory benchmark finished ({rows} rows). See dhat-heap.json for details");
}
