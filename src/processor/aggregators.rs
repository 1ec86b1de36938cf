use std::{io::Write, marker::PhantomData};

use ahash::AHashSet;

use crate::processor::{
    ProcessorError,
    numeric::Numeric,
    output::OutputTable,
    row::InputRow,
    storage::{DynamicStorage, Handle, deserialize_fields, serialize_fields},
};

/// A per-group accumulator.
///
/// The aggregator itself is shared by all groups of a table; everything that
/// varies per group lives in `State`. States are moved around by plain byte
/// copies inside hash maps and packed buffers and are never dropped
/// individually, hence the `Copy` bound.
pub trait Aggregator {
    type State: Copy + 'static;

    /// Builds the state of a new group from its first row.
    fn init(&mut self, row: &InputRow<'_>) -> Result<Self::State, ProcessorError>;

    /// Folds a subsequent row of the same group into `state`.
    fn update(&mut self, row: &InputRow<'_>, state: &mut Self::State) -> Result<(), ProcessorError>;

    /// Writes the aggregate into its output column(s).
    fn print(&self, state: &Self::State, out: &mut OutputTable) -> Result<(), ProcessorError>;
}

/// Placeholder used by distinct-key tables, which aggregate nothing.
#[derive(Debug, Default)]
pub struct NoAggregator;

impl Aggregator for NoAggregator {
    type State = ();

    fn init(&mut self, _row: &InputRow<'_>) -> Result<(), ProcessorError> {
        Ok(())
    }

    fn update(&mut self, _row: &InputRow<'_>, _state: &mut ()) -> Result<(), ProcessorError> {
        Ok(())
    }

    fn print(&self, _state: &(), _out: &mut OutputTable) -> Result<(), ProcessorError> {
        Ok(())
    }
}

#[derive(Debug)]
pub struct CountAggregator {
    column: usize,
}

impl CountAggregator {
    pub fn new(column: usize) -> Self {
        CountAggregator { column }
    }
}

impl Aggregator for CountAggregator {
    type State = i64;

    fn init(&mut self, _row: &InputRow<'_>) -> Result<i64, ProcessorError> {
        Ok(1)
    }

    fn update(&mut self, _row: &InputRow<'_>, state: &mut i64) -> Result<(), ProcessorError> {
        *state += 1;
        Ok(())
    }

    fn print(&self, state: &i64, out: &mut OutputTable) -> Result<(), ProcessorError> {
        write!(out.column_mut(self.column), "{state}")?;
        Ok(())
    }
}

/// Sums a field as a [`Numeric`].
///
/// The state is 16 bytes (variant tag plus `i64`/`f64` payload), so `count`
/// with two sums packs into 40 bytes and lands in the 48-byte bucket.
#[derive(Debug)]
pub struct SumAggregator {
    field: usize,
    column: usize,
}

impl SumAggregator {
    pub fn new(field: usize, column: usize) -> Self {
        SumAggregator { field, column }
    }
}

impl Aggregator for SumAggregator {
    type State = Numeric;

    fn init(&mut self, row: &InputRow<'_>) -> Result<Numeric, ProcessorError> {
        let mut sum = Numeric::Int(0);
        sum.add(Numeric::make(row.field(self.field))?);
        Ok(sum)
    }

    fn update(&mut self, row: &InputRow<'_>, state: &mut Numeric) -> Result<(), ProcessorError> {
        state.add(Numeric::make(row.field(self.field))?);
        Ok(())
    }

    fn print(&self, state: &Numeric, out: &mut OutputTable) -> Result<(), ProcessorError> {
        write!(out.column_mut(self.column), "{state}")?;
        Ok(())
    }
}

/// Direction of a min/max aggregation.
pub trait Extremum {
    /// Replaces `current` with `candidate` if it is strictly better.
    fn improve(current: &mut Numeric, candidate: Numeric) -> bool;
}

#[derive(Debug)]
pub struct Lowest;

#[derive(Debug)]
pub struct Highest;

impl Extremum for Lowest {
    fn improve(current: &mut Numeric, candidate: Numeric) -> bool {
        current.min(candidate)
    }
}

impl Extremum for Highest {
    fn improve(current: &mut Numeric, candidate: Numeric) -> bool {
        current.max(candidate)
    }
}

#[derive(Debug)]
pub struct ExtremumAggregator<E> {
    field: usize,
    column: usize,
    _direction: PhantomData<E>,
}

pub type MinAggregator = ExtremumAggregator<Lowest>;
pub type MaxAggregator = ExtremumAggregator<Highest>;

impl<E: Extremum> ExtremumAggregator<E> {
    pub fn new(field: usize, column: usize) -> Self {
        ExtremumAggregator {
            field,
            column,
            _direction: PhantomData,
        }
    }
}

impl<E: Extremum> Aggregator for ExtremumAggregator<E> {
    type State = Numeric;

    fn init(&mut self, row: &InputRow<'_>) -> Result<Numeric, ProcessorError> {
        Numeric::make(row.field(self.field))
    }

    fn update(&mut self, row: &InputRow<'_>, state: &mut Numeric) -> Result<(), ProcessorError> {
        E::improve(state, Numeric::make(row.field(self.field))?);
        Ok(())
    }

    fn print(&self, state: &Numeric, out: &mut OutputTable) -> Result<(), ProcessorError> {
        write!(out.column_mut(self.column), "{state}")?;
        Ok(())
    }
}

/// An input field copied verbatim into an output column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CarriedField {
    pub field: usize,
    pub column: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct ArgState {
    value: Numeric,
    row: Handle,
}

/// Arg-min/arg-max: prints fields of the first row that reached the extremum.
///
/// The carried fields are variable length, so they live in a [`DynamicStorage`]
/// owned by the aggregator and the group state only holds a handle.
#[derive(Debug)]
pub struct ArgExtremumAggregator<E> {
    field: usize,
    carried: Vec<CarriedField>,
    storage: DynamicStorage,
    buf: Vec<u8>,
    _direction: PhantomData<E>,
}

pub type ArgMinAggregator = ArgExtremumAggregator<Lowest>;
pub type ArgMaxAggregator = ArgExtremumAggregator<Highest>;

impl<E: Extremum> ArgExtremumAggregator<E> {
    pub fn new(field: usize, carried: Vec<CarriedField>) -> Self {
        ArgExtremumAggregator {
            field,
            carried,
            storage: DynamicStorage::new(),
            buf: Vec::new(),
            _direction: PhantomData,
        }
    }

    fn serialize_row(&mut self, row: &InputRow<'_>) -> Result<(), ProcessorError> {
        serialize_fields(self.carried.iter().map(|c| row.field(c.field)), &mut self.buf)
    }
}

impl<E: Extremum> Aggregator for ArgExtremumAggregator<E> {
    type State = ArgState;

    fn init(&mut self, row: &InputRow<'_>) -> Result<ArgState, ProcessorError> {
        let value = Numeric::make(row.field(self.field))?;
        self.serialize_row(row)?;
        let handle = self.storage.store(&self.buf)?;
        Ok(ArgState { value, row: handle })
    }

    fn update(&mut self, row: &InputRow<'_>, state: &mut ArgState) -> Result<(), ProcessorError> {
        let candidate = Numeric::make(row.field(self.field))?;
        if E::improve(&mut state.value, candidate) {
            self.serialize_row(row)?;
            self.storage.update(state.row, &self.buf)?;
        }
        Ok(())
    }

    fn print(&self, state: &ArgState, out: &mut OutputTable) -> Result<(), ProcessorError> {
        let blob = self.storage.load(state.row);
        for (carried, value) in self
            .carried
            .iter()
            .zip(deserialize_fields(blob, self.carried.len()))
        {
            out.set(carried.column, value);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DistinctState {
    group: u32,
    count: u32,
}

/// `count(distinct, _N)`: number of distinct values of one field per group.
///
/// All groups share one set keyed by `group id ++ value`.
#[derive(Debug)]
pub struct CountDistinctAggregator {
    field: usize,
    column: usize,
    seen: AHashSet<Box<[u8]>>,
    next_group: u32,
    buf: Vec<u8>,
}

impl CountDistinctAggregator {
    pub fn new(field: usize, column: usize) -> Self {
        CountDistinctAggregator {
            field,
            column,
            seen: AHashSet::new(),
            next_group: 0,
            buf: Vec::new(),
        }
    }

    /// Records the row's value for `group`; returns whether it was new.
    fn insert(&mut self, group: u32, row: &InputRow<'_>) -> bool {
        self.buf.clear();
        self.buf.extend_from_slice(&group.to_le_bytes());
        self.buf.extend_from_slice(row.field(self.field));
        if self.seen.contains(self.buf.as_slice()) {
            return false;
        }
        self.seen.insert(self.buf.as_slice().into())
    }
}

impl Aggregator for CountDistinctAggregator {
    type State = DistinctState;

    fn init(&mut self, row: &InputRow<'_>) -> Result<DistinctState, ProcessorError> {
        let group = self.next_group;
        self.next_group = group
            .checked_add(1)
            .ok_or_else(|| ProcessorError::logic("too many groups for count(distinct)"))?;
        self.insert(group, row);
        Ok(DistinctState { group, count: 1 })
    }

    fn update(
        &mut self,
        row: &InputRow<'_>,
        state: &mut DistinctState,
    ) -> Result<(), ProcessorError> {
        if self.insert(state.group, row) {
            state.count += 1;
        }
        Ok(())
    }

    fn print(&self, state: &DistinctState, out: &mut OutputTable) -> Result<(), ProcessorError> {
        write!(out.column_mut(self.column), "{}", state.count)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        helpers::field_split::split_fields,
        processor::output::{BufferedOutput, test_util::SharedBuffer},
    };

    /// Feeds `lines` through one aggregator as a single group and returns the printed row.
    fn aggregate<A: Aggregator>(mut agg: A, num_columns: usize, lines: &[&str]) -> String {
        let mut spans = Vec::new();
        let mut state = None;
        for line in lines {
            split_fields(line.as_bytes(), &mut spans);
            let row = InputRow::new(line.as_bytes(), &spans);
            match state.as_mut() {
                None => state = Some(agg.init(&row).unwrap()),
                Some(s) => agg.update(&row, s).unwrap(),
            }
        }

        let sink = SharedBuffer::default();
        let mut out = OutputTable::to_writer(num_columns, BufferedOutput::new(Box::new(sink.clone()), 1024));
        agg.print(&state.unwrap(), &mut out).unwrap();
        out.end_line().unwrap();
        out.finish().unwrap();
        sink.contents().trim_end().to_string()
    }

    #[test]
    fn test_count() {
        assert_eq!(aggregate(CountAggregator::new(0), 1, &["a", "b", "c"]), "3");
    }

    #[test]
    fn test_sum() {
        let lines = ["x 3", "x 4", "x 0.5"];
        assert_eq!(aggregate(SumAggregator::new(1, 0), 1, &lines), "7.5");
    }

    #[test]
    fn test_sum_rejects_text() {
        let mut agg = SumAggregator::new(0, 0);
        let spans = [(0, 4)];
        let row = InputRow::new(b"AAPL", &spans);
        assert!(matches!(agg.init(&row), Err(ProcessorError::Value { .. })));
    }

    #[test]
    fn test_min_max() {
        let lines = ["5", "-2", "9", "3"];
        assert_eq!(aggregate(MinAggregator::new(0, 0), 1, &lines), "-2");
        assert_eq!(aggregate(MaxAggregator::new(0, 0), 1, &lines), "9");
    }

    #[test]
    fn test_arg_max_carries_first_extremal_row() {
        let lines = [
            "AAPL 2024-01-02 185.64",
            "AAPL 2024-01-03 184.25",
            "AAPL 2024-01-04 186.10",
            "AAPL 2024-01-05 186.10",
        ];
        let carried = vec![CarriedField { field: 1, column: 0 }];
        assert_eq!(aggregate(ArgMaxAggregator::new(2, carried), 1, &lines), "2024-01-04");
    }

    #[test]
    fn test_arg_min_multiple_columns() {
        let lines = ["b 7 long-name", "a 2 x", "c 5 yy"];
        let carried = vec![
            CarriedField { field: 0, column: 1 },
            CarriedField { field: 2, column: 0 },
        ];
        assert_eq!(aggregate(ArgMinAggregator::new(1, carried), 2, &lines), "x\ta");
    }

    #[test]
    fn test_count_distinct() {
        let lines = ["a", "b", "a", "c", "b"];
        assert_eq!(aggregate(CountDistinctAggregator::new(0, 0), 1, &lines), "3");
    }

    #[test]
    fn test_count_distinct_groups_are_independent() {
        let mut agg = CountDistinctAggregator::new(0, 0);
        let spans = [(0, 1)];
        let a = InputRow::new(b"a", &spans);
        let b = InputRow::new(b"b", &spans);

        let mut first = agg.init(&a).unwrap();
        let mut second = agg.init(&a).unwrap();
        agg.update(&a, &mut first).unwrap();
        agg.update(&b, &mut second).unwrap();
        assert_eq!(first.count, 1);
        assert_eq!(second.count, 2);
    }
}
