/// One input row: a line plus the byte spans of its positional fields.
///
/// Fields are 0-indexed. Reading a field past the end of the row yields an
/// empty slice.
#[derive(Debug, Clone, Copy)]
pub struct InputRow<'a> {
    line: &'a [u8],
    spans: &'a [(usize, usize)],
}

impl<'a> InputRow<'a> {
    pub fn new(line: &'a [u8], spans: &'a [(usize, usize)]) -> Self {
        InputRow { line, spans }
    }

    #[inline]
    pub fn field(&self, index: usize) -> &'a [u8] {
        match self.spans.get(index) {
            Some(&(start, end)) => &self.line[start..end],
            None => b"",
        }
    }

    pub fn num_fields(&self) -> usize {
        self.spans.len()
    }

    pub fn line(&self) -> &'a [u8] {
        self.line
    }
}
