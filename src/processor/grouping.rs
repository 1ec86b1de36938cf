use ahash::AHashMap;

use crate::processor::{
    Key, ProcessorError, Table,
    aggregators::{Aggregator, NoAggregator},
    composite_key::{key_fields, serialize_key},
    output::OutputTable,
    row::InputRow,
};

/// Per-stage group states, specialized by the number of grouping keys.
pub enum GroupingState<S> {
    /// No keys: every row belongs to one group.
    NoKey(Option<S>),
    /// Keyed on the raw bytes of one field.
    SingleKey {
        key: Key,
        groups: AHashMap<Box<[u8]>, S>,
    },
    /// Keyed on the composite encoding of several fields.
    CompositeKey {
        keys: Vec<Key>,
        groups: AHashMap<Box<[u8]>, S>,
        buf: Vec<u8>,
    },
}

impl<S: Copy> GroupingState<S> {
    pub fn for_keys(mut keys: Vec<Key>) -> Self {
        match keys.len() {
            0 => GroupingState::NoKey(None),
            1 => GroupingState::SingleKey {
                key: keys.remove(0),
                groups: AHashMap::new(),
            },
            _ => GroupingState::CompositeKey {
                keys,
                groups: AHashMap::new(),
                buf: Vec::new(),
            },
        }
    }

    pub fn num_groups(&self) -> usize {
        match self {
            GroupingState::NoKey(state) => usize::from(state.is_some()),
            GroupingState::SingleKey { groups, .. } => groups.len(),
            GroupingState::CompositeKey { groups, .. } => groups.len(),
        }
    }

    /// Routes `row` to its group: `init` for a new group, `update` otherwise.
    pub fn push<A>(&mut self, row: &InputRow<'_>, aggregator: &mut A) -> Result<(), ProcessorError>
    where
        A: Aggregator<State = S>,
    {
        match self {
            GroupingState::NoKey(Some(state)) => aggregator.update(row, state),
            GroupingState::NoKey(state) => {
                *state = Some(aggregator.init(row)?);
                Ok(())
            }
            GroupingState::SingleKey { key, groups } => {
                upsert(groups, row.field(key.field), row, aggregator)
            }
            GroupingState::CompositeKey { keys, groups, buf } => {
                serialize_key(row, keys, buf)?;
                upsert(groups, buf, row, aggregator)
            }
        }
    }

    /// Emits one output row per group: key columns first, then the aggregates.
    pub fn render<A>(&self, aggregator: &A, out: &mut OutputTable) -> Result<(), ProcessorError>
    where
        A: Aggregator<State = S>,
    {
        match self {
            GroupingState::NoKey(None) => Err(ProcessorError::NoData),
            GroupingState::NoKey(Some(state)) => {
                aggregator.print(state, out)?;
                out.end_line()
            }
            GroupingState::SingleKey { key, groups } => {
                for (value, state) in groups {
                    out.set(key.column, value);
                    aggregator.print(state, out)?;
                    out.end_line()?;
                }
                Ok(())
            }
            GroupingState::CompositeKey { keys, groups, .. } => {
                for (encoded, state) in groups {
                    for (key, value) in keys.iter().zip(key_fields(encoded)) {
                        out.set(key.column, value);
                    }
                    aggregator.print(state, out)?;
                    out.end_line()?;
                }
                Ok(())
            }
        }
    }

    /// Drops every group, keeping the key layout.
    pub fn clear(&mut self) {
        match self {
            GroupingState::NoKey(state) => *state = None,
            GroupingState::SingleKey { groups, .. } => *groups = AHashMap::new(),
            GroupingState::CompositeKey { groups, .. } => *groups = AHashMap::new(),
        }
    }
}

fn upsert<A: Aggregator>(
    groups: &mut AHashMap<Box<[u8]>, A::State>,
    key: &[u8],
    row: &InputRow<'_>,
    aggregator: &mut A,
) -> Result<(), ProcessorError> {
    if let Some(state) = groups.get_mut(key) {
        return aggregator.update(row, state);
    }
    let state = aggregator.init(row)?;
    groups.insert(key.into(), state);
    Ok(())
}

/// Aggregating stage: group rows by key, render once at `finish`.
pub struct GroupedTable<A: Aggregator> {
    groups: GroupingState<A::State>,
    aggregator: A,
    output: OutputTable,
    rows: u64,
}

impl<A: Aggregator> GroupedTable<A> {
    pub fn new(keys: Vec<Key>, aggregator: A, output: OutputTable) -> Self {
        GroupedTable {
            groups: GroupingState::for_keys(keys),
            aggregator,
            output,
            rows: 0,
        }
    }
}

impl<A: Aggregator> Table for GroupedTable<A> {
    fn push_row(&mut self, row: &InputRow<'_>) -> Result<(), ProcessorError> {
        self.rows += 1;
        self.groups.push(row, &mut self.aggregator)
    }

    fn finish(&mut self) -> Result<(), ProcessorError> {
        log::debug!(
            "rendering {} groups from {} rows",
            self.groups.num_groups(),
            self.rows
        );
        self.groups.render(&self.aggregator, &mut self.output)?;
        self.groups.clear();
        self.output.finish()
    }
}

/// Boxes a [`GroupedTable`] for the pipeline.
pub fn build_grouped_table<A: Aggregator + 'static>(
    keys: Vec<Key>,
    aggregator: A,
    output: OutputTable,
) -> Box<dyn Table> {
    Box::new(GroupedTable::new(keys, aggregator, output))
}

/// Distinct key tuples: one output row per unique combination of `keys`.
pub fn build_distinct_table(
    keys: Vec<Key>,
    output: OutputTable,
) -> Result<Box<dyn Table>, ProcessorError> {
    if keys.is_empty() {
        return Err(ProcessorError::logic("distinct table without keys"));
    }
    Ok(build_grouped_table(keys, NoAggregator, output))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        helpers::field_split::split_fields,
        processor::{
            aggregators::{CountAggregator, SumAggregator},
            output::{BufferedOutput, test_util::SharedBuffer},
        },
    };

    fn run(mut table: Box<dyn Table>, lines: &[&str]) -> Result<(), ProcessorError> {
        let mut spans = Vec::new();
        for line in lines {
            split_fields(line.as_bytes(), &mut spans);
            table.push_row(&InputRow::new(line.as_bytes(), &spans))?;
        }
        table.finish()
    }

    fn writer(num_columns: usize, sink: &SharedBuffer) -> OutputTable {
        OutputTable::to_writer(num_columns, BufferedOutput::new(Box::new(sink.clone()), 1024))
    }

    #[test]
    fn test_no_key() {
        let sink = SharedBuffer::default();
        let table = build_grouped_table(vec![], SumAggregator::new(1, 0), writer(1, &sink));
        run(table, &["a 1", "b 2", "c 3"]).unwrap();
        assert_eq!(sink.contents(), "6\n");
    }

    #[test]
    fn test_no_key_without_rows() {
        let sink = SharedBuffer::default();
        let table = build_grouped_table(vec![], CountAggregator::new(0), writer(1, &sink));
        assert!(matches!(run(table, &[]), Err(ProcessorError::NoData)));
        assert_eq!(sink.contents(), "");
    }

    #[test]
    fn test_single_key() {
        let sink = SharedBuffer::default();
        let table = build_grouped_table(
            vec![Key::new(0, 0)],
            CountAggregator::new(1),
            writer(2, &sink),
        );
        run(table, &["x 1", "y 2", "x 3"]).unwrap();
        assert_eq!(sink.sorted_lines(), vec!["x\t2", "y\t1"]);
    }

    #[test]
    fn test_composite_key() {
        let sink = SharedBuffer::default();
        let table = build_grouped_table(
            vec![Key::new(1, 0), Key::new(0, 1)],
            SumAggregator::new(2, 2),
            writer(3, &sink),
        );
        run(table, &["a x 1", "a y 2", "a x 3", "b x 4"]).unwrap();
        assert_eq!(sink.sorted_lines(), vec!["x\ta\t4", "x\tb\t4", "y\ta\t2"]);
    }

    #[test]
    fn test_composite_key_does_not_merge_shifted_fields() {
        let sink = SharedBuffer::default();
        let table = build_grouped_table(
            vec![Key::new(0, 0), Key::new(1, 1)],
            CountAggregator::new(2),
            writer(3, &sink),
        );
        run(table, &["ab c", "a bc"]).unwrap();
        assert_eq!(sink.sorted_lines(), vec!["a\tbc\t1", "ab\tc\t1"]);
    }

    #[test]
    fn test_distinct() {
        let sink = SharedBuffer::default();
        let table = build_distinct_table(vec![Key::new(1, 0)], writer(1, &sink)).unwrap();
        run(table, &["1 b", "2 a", "3 b"]).unwrap();
        assert_eq!(sink.sorted_lines(), vec!["a", "b"]);

        assert!(build_distinct_table(vec![], writer(0, &sink)).is_err());
    }
}
