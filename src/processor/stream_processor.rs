use std::{
    fs::File,
    io::{ErrorKind, Read, Write},
    path::Path,
};

use memchr::memchr_iter;
use memmap2::Mmap;

use crate::{
    helpers::field_split::split_fields,
    processor::{
        ProcessorError, Table,
        pipeline::{PipelineOptions, build_pipeline},
        row::InputRow,
        spec::Pipeline,
        spec_parser::parse_pipeline,
    },
};

/// Bytes requested per `read` call in [`StreamProcessor::process_reader`].
const READ_CHUNK: usize = 1 << 16;

/// Drives input lines through a compiled pipeline.
///
/// # Example
///
/// ```rust
/// use tabagg::processor::{pipeline::PipelineOptions, stream_processor::StreamProcessor};
///
/// let options = PipelineOptions::default();
/// let mut processor = StreamProcessor::from_spec("k0 c", Box::new(std::io::stdout()), &options)?;
/// processor.process_bytes(b"AAPL 1\nMSFT 2\nAAPL 3\n")?;
/// assert_eq!(processor.finish()?, 3);
/// # Ok::<(), tabagg::processor::ProcessorError>(())
/// ```
pub struct StreamProcessor {
    table: Box<dyn Table>,
    spans: Vec<(usize, usize)>,
    rows: u64,
}

impl StreamProcessor {
    /// Compiles `pipeline`; result rows are written to `sink`.
    pub fn new(
        pipeline: &Pipeline,
        sink: Box<dyn Write>,
        options: &PipelineOptions,
    ) -> Result<Self, ProcessorError> {
        Ok(StreamProcessor {
            table: build_pipeline(pipeline, sink, options)?,
            spans: Vec::new(),
            rows: 0,
        })
    }

    /// Parses and compiles spec text such as `"key(_1) => count"`.
    pub fn from_spec(
        spec: &str,
        sink: Box<dyn Write>,
        options: &PipelineOptions,
    ) -> Result<Self, ProcessorError> {
        Self::new(&parse_pipeline(spec)?, sink, options)
    }

    /// Pushes one line, without its terminating newline.
    pub fn push_line(&mut self, line: &[u8]) -> Result<(), ProcessorError> {
        split_fields(line, &mut self.spans);
        self.rows += 1;
        self.table.push_row(&InputRow::new(line, &self.spans))
    }

    /// Pushes every line of `data`. A trailing line without `\n` counts if non-empty.
    pub fn process_bytes(&mut self, data: &[u8]) -> Result<(), ProcessorError> {
        let mut start = 0;
        for end in memchr_iter(b'\n', data) {
            self.push_line(&data[start..end])?;
            start = end + 1;
        }
        if start < data.len() {
            self.push_line(&data[start..])?;
        }
        Ok(())
    }

    /// Reads `reader` to the end in fixed-size chunks.
    pub fn process_reader<R: Read>(&mut self, mut reader: R) -> Result<(), ProcessorError> {
        let mut chunk = vec![0u8; READ_CHUNK];
        // Start of a line split across chunks.
        let mut partial = Vec::new();

        loop {
            let n = match reader.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };
            let data = &chunk[..n];
            let mut start = 0;
            for end in memchr_iter(b'\n', data) {
                if partial.is_empty() {
                    self.push_line(&data[start..end])?;
                } else {
                    partial.extend_from_slice(&data[start..end]);
                    self.push_line(&partial)?;
                    partial.clear();
                }
                start = end + 1;
            }
            partial.extend_from_slice(&data[start..]);
        }

        if !partial.is_empty() {
            self.push_line(&partial)?;
        }
        Ok(())
    }

    /// Memory-maps the file at `path` and processes its contents.
    pub fn process_path(&mut self, path: &Path) -> Result<(), ProcessorError> {
        let file = File::open(path)?;
        if file.metadata()?.len() == 0 {
            return Ok(());
        }
        // SAFETY: the mapping is read-only and dropped before returning; the
        // file is not expected to be truncated while it is being processed.
        let mmap = unsafe { Mmap::map(&file)? };
        self.process_bytes(&mmap)
    }

    /// Renders every stage and flushes the output. Returns the number of input rows.
    pub fn finish(mut self) -> Result<u64, ProcessorError> {
        self.table.finish()?;
        log::info!("processed {} input rows", self.rows);
        Ok(self.rows)
    }
}
