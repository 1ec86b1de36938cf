use crate::processor::{
    ProcessorError, Table,
    output::{BufferedOutput, OutputTable},
    row::InputRow,
};

/// Emits the listed input fields of every row, in order.
pub struct ProjectionTable {
    fields: Vec<usize>,
    output: OutputTable,
}

impl ProjectionTable {
    pub fn new(fields: Vec<usize>, output: OutputTable) -> Self {
        ProjectionTable { fields, output }
    }
}

impl Table for ProjectionTable {
    fn push_row(&mut self, row: &InputRow<'_>) -> Result<(), ProcessorError> {
        for (column, &field) in self.fields.iter().enumerate() {
            self.output.set(column, row.field(field));
        }
        self.output.end_line()
    }

    fn finish(&mut self) -> Result<(), ProcessorError> {
        self.output.finish()
    }
}

/// Terminal stage without columns: writes field 0 of every row.
pub struct PassthroughTable {
    out: BufferedOutput,
}

impl PassthroughTable {
    pub fn new(out: BufferedOutput) -> Self {
        PassthroughTable { out }
    }
}

impl Table for PassthroughTable {
    fn push_row(&mut self, row: &InputRow<'_>) -> Result<(), ProcessorError> {
        let buf = self.out.buf();
        buf.extend_from_slice(row.field(0));
        buf.push(b'\n');
        self.out.maybe_flush()
    }

    fn finish(&mut self) -> Result<(), ProcessorError> {
        self.out.flush()
    }
}
