use regex::bytes::Regex;

use crate::processor::{ProcessorError, Table, row::InputRow, spec::Filter};

/// Drops rows unless every filter's regex matches its field.
///
/// Filters run in declaration order and stop at the first mismatch.
pub struct FilterTable {
    filters: Vec<(usize, Regex)>,
    inner: Box<dyn Table>,
    dropped: u64,
}

impl FilterTable {
    pub fn new(filters: &[Filter], inner: Box<dyn Table>) -> Result<Self, ProcessorError> {
        let filters = filters
            .iter()
            .map(|f| Ok((f.expr.field, Regex::new(&f.regexp)?)))
            .collect::<Result<Vec<_>, ProcessorError>>()?;
        Ok(FilterTable {
            filters,
            inner,
            dropped: 0,
        })
    }

    fn matches(&self, row: &InputRow<'_>) -> bool {
        self.filters
            .iter()
            .all(|(field, regex)| regex.is_match(row.field(*field)))
    }
}

impl Table for FilterTable {
    fn push_row(&mut self, row: &InputRow<'_>) -> Result<(), ProcessorError> {
        if self.matches(row) {
            self.inner.push_row(row)
        } else {
            self.dropped += 1;
            Ok(())
        }
    }

    fn finish(&mut self) -> Result<(), ProcessorError> {
        log::debug!("filters dropped {} rows", self.dropped);
        self.inner.finish()
    }
}

/// Wraps `table` in a [`FilterTable`] if there is anything to filter on.
pub fn wrap_filter(
    filters: &[Filter],
    table: Box<dyn Table>,
) -> Result<Box<dyn Table>, ProcessorError> {
    if filters.is_empty() {
        return Ok(table);
    }
    Ok(Box::new(FilterTable::new(filters, table)?))
}
