use std::io::Write;

use crate::processor::{ProcessorError, Table, row::InputRow};

/// Default size at which buffered output is handed to the sink.
pub const DEFAULT_FLUSH_THRESHOLD: usize = 1 << 15;

/// Batches output bytes and writes them to the final sink.
pub struct BufferedOutput {
    buf: Vec<u8>,
    sink: Box<dyn Write>,
    flush_threshold: usize,
}

impl BufferedOutput {
    pub fn new(sink: Box<dyn Write>, flush_threshold: usize) -> Self {
        BufferedOutput {
            buf: Vec::with_capacity(flush_threshold.min(DEFAULT_FLUSH_THRESHOLD) + 1),
            sink,
            flush_threshold,
        }
    }

    pub fn buf(&mut self) -> &mut Vec<u8> {
        &mut self.buf
    }

    pub fn maybe_flush(&mut self) -> Result<(), ProcessorError> {
        if self.buf.len() > self.flush_threshold {
            self.flush()?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), ProcessorError> {
        self.sink.write_all(&self.buf)?;
        self.sink.flush()?;
        self.buf.clear();
        Ok(())
    }
}

/// Where a stage's result rows go.
pub enum OutputSink {
    /// Terminal stage: tab-separated lines to the writer.
    Writer(BufferedOutput),
    /// Inner stage: rows are re-assembled and pushed into the downstream table.
    Pipe {
        table: Box<dyn Table>,
        line: Vec<u8>,
        spans: Vec<(usize, usize)>,
    },
}

/// Fixed-width row under construction, emitted with [`OutputTable::end_line`].
pub struct OutputTable {
    columns: Vec<Vec<u8>>,
    sink: OutputSink,
}

impl OutputTable {
    pub fn to_writer(num_columns: usize, out: BufferedOutput) -> Self {
        OutputTable {
            columns: vec![Vec::new(); num_columns],
            sink: OutputSink::Writer(out),
        }
    }

    pub fn to_table(num_columns: usize, table: Box<dyn Table>) -> Self {
        OutputTable {
            columns: vec![Vec::new(); num_columns],
            sink: OutputSink::Pipe {
                table,
                line: Vec::new(),
                spans: Vec::with_capacity(num_columns),
            },
        }
    }

    pub fn set(&mut self, column: usize, value: &[u8]) {
        let col = &mut self.columns[column];
        col.clear();
        col.extend_from_slice(value);
    }

    /// Cleared buffer for `column`, for values formatted in place.
    pub fn column_mut(&mut self, column: usize) -> &mut Vec<u8> {
        let col = &mut self.columns[column];
        col.clear();
        col
    }

    pub fn end_line(&mut self) -> Result<(), ProcessorError> {
        match &mut self.sink {
            OutputSink::Writer(out) => {
                let buf = out.buf();
                for (i, col) in self.columns.iter().enumerate() {
                    if i != 0 {
                        buf.push(b'\t');
                    }
                    buf.extend_from_slice(col);
                }
                buf.push(b'\n');
                out.maybe_flush()
            }
            OutputSink::Pipe { table, line, spans } => {
                line.clear();
                spans.clear();
                for col in &self.columns {
                    let start = line.len();
                    line.extend_from_slice(col);
                    spans.push((start, line.len()));
                }
                table.push_row(&InputRow::new(line, spans))
            }
        }
    }

    pub fn finish(&mut self) -> Result<(), ProcessorError> {
        match &mut self.sink {
            OutputSink::Writer(out) => out.flush(),
            OutputSink::Pipe { table, .. } => table.finish(),
        }
    }
}
