//! Turns a parsed [`Pipeline`] into a chain of [`Table`]s.

use std::{io::Write, iter};

use crate::processor::{
    Key, ProcessorError, Table,
    aggregators::{
        ArgMaxAggregator, ArgMinAggregator, CarriedField, CountAggregator, CountDistinctAggregator,
        MaxAggregator, MinAggregator, SumAggregator,
    },
    filter::wrap_filter,
    grouping::{build_distinct_table, build_grouped_table},
    layout::{AggregatorPort, build_packed_table, type_erased},
    output::{BufferedOutput, DEFAULT_FLUSH_THRESHOLD, OutputTable},
    projection::{PassthroughTable, ProjectionTable},
    spec::{AggregatedTable, Component, Expr, Pipeline, SimpleTable, Stage},
};

/// Knobs for [`build_pipeline`].
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Bytes of output buffered before writing to the sink.
    pub flush_threshold: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        PipelineOptions {
            flush_threshold: DEFAULT_FLUSH_THRESHOLD,
        }
    }
}

/// Simplifies a pipeline without changing its output.
///
/// Column-less simple stages that are not last only filter, so their filters
/// move into the following stage and the stage itself goes away. An empty
/// result becomes a single passthrough stage.
pub fn optimize(pipeline: Pipeline) -> Pipeline {
    let num_stages = pipeline.stages.len();
    let mut stages = Vec::with_capacity(num_stages);
    let mut pending = Vec::new();

    for (i, mut stage) in pipeline.stages.into_iter().enumerate() {
        let last = i + 1 == num_stages;
        if let Stage::Simple(SimpleTable { filters, columns }) = &mut stage {
            if columns.is_empty() && !last {
                pending.append(filters);
                continue;
            }
        }
        if !pending.is_empty() {
            let own = std::mem::replace(stage.filters_mut(), std::mem::take(&mut pending));
            stage.filters_mut().extend(own);
        }
        stages.push(stage);
    }

    stages.retain(|stage| {
        !matches!(stage, Stage::Simple(s) if s.columns.is_empty() && s.filters.is_empty())
    });
    if stages.is_empty() {
        stages.push(Stage::default());
    }
    Pipeline { stages }
}

/// Where a stage sends its output rows.
enum Downstream {
    Sink(BufferedOutput),
    Table(Box<dyn Table>),
}

impl Downstream {
    fn into_output(self, num_columns: usize) -> OutputTable {
        match self {
            Downstream::Sink(out) => OutputTable::to_writer(num_columns, out),
            Downstream::Table(table) => OutputTable::to_table(num_columns, table),
        }
    }
}

/// Compiles `pipeline` into its first stage; result rows go to `sink`.
///
/// Stages are built last to first so each one is created with its downstream
/// already in hand.
pub fn build_pipeline(
    pipeline: &Pipeline,
    sink: Box<dyn Write>,
    options: &PipelineOptions,
) -> Result<Box<dyn Table>, ProcessorError> {
    let pipeline = optimize(pipeline.clone());
    log::debug!("compiling pipeline: {pipeline}");

    let mut downstream = Downstream::Sink(BufferedOutput::new(sink, options.flush_threshold));
    for stage in pipeline.stages.iter().rev() {
        let table = match stage {
            Stage::Simple(simple) => build_simple(simple, downstream)?,
            Stage::Aggregated(aggregated) => build_aggregated(aggregated, downstream)?,
        };
        downstream = Downstream::Table(wrap_filter(stage.filters(), table)?);
    }

    match downstream {
        Downstream::Table(table) => Ok(table),
        Downstream::Sink(_) => Err(ProcessorError::logic("pipeline without stages")),
    }
}

fn build_simple(
    simple: &SimpleTable,
    downstream: Downstream,
) -> Result<Box<dyn Table>, ProcessorError> {
    if simple.columns.is_empty() {
        return match downstream {
            Downstream::Sink(out) => Ok(Box::new(PassthroughTable::new(out))),
            Downstream::Table(_) => Err(ProcessorError::logic(
                "implicit output inside the pipeline",
            )),
        };
    }
    let fields = simple.columns.iter().map(|e| e.field).collect::<Vec<_>>();
    let output = downstream.into_output(fields.len());
    Ok(Box::new(ProjectionTable::new(fields, output)))
}

/// An aggregate component with its output columns assigned.
#[derive(Debug)]
enum AggregatorKind {
    Count { column: usize },
    Sum { field: usize, column: usize },
    Min { field: usize, column: usize },
    Max { field: usize, column: usize },
    ArgMin { field: usize, carried: Vec<CarriedField> },
    ArgMax { field: usize, carried: Vec<CarriedField> },
    CountDistinct { field: usize, column: usize },
}

impl AggregatorKind {
    fn resolve(component: &Component, column: usize) -> Result<Self, ProcessorError> {
        let kind = match component {
            Component::Count => AggregatorKind::Count { column },
            Component::Sum(e) => AggregatorKind::Sum {
                field: e.field,
                column,
            },
            Component::CountDistinct(e) => AggregatorKind::CountDistinct {
                field: e.field,
                column,
            },
            Component::Min(exprs) | Component::Max(exprs) => {
                let min = matches!(component, Component::Min(_));
                let (value, carried) = exprs
                    .split_first()
                    .ok_or_else(|| ProcessorError::logic("min/max without a value field"))?;
                let field = value.field;
                match (min, carried.is_empty()) {
                    (true, true) => AggregatorKind::Min { field, column },
                    (false, true) => AggregatorKind::Max { field, column },
                    (true, false) => AggregatorKind::ArgMin {
                        field,
                        carried: carried_fields(carried, column),
                    },
                    (false, false) => AggregatorKind::ArgMax {
                        field,
                        carried: carried_fields(carried, column),
                    },
                }
            }
            Component::Key(_) => return Err(ProcessorError::logic("key used as aggregator")),
        };
        Ok(kind)
    }

    fn erased(self) -> Box<dyn AggregatorPort> {
        match self {
            AggregatorKind::Count { column } => type_erased(CountAggregator::new(column)),
            AggregatorKind::Sum { field, column } => type_erased(SumAggregator::new(field, column)),
            AggregatorKind::Min { field, column } => type_erased(MinAggregator::new(field, column)),
            AggregatorKind::Max { field, column } => type_erased(MaxAggregator::new(field, column)),
            AggregatorKind::ArgMin { field, carried } => {
                type_erased(ArgMinAggregator::new(field, carried))
            }
            AggregatorKind::ArgMax { field, carried } => {
                type_erased(ArgMaxAggregator::new(field, carried))
            }
            AggregatorKind::CountDistinct { field, column } => {
                type_erased(CountDistinctAggregator::new(field, column))
            }
        }
    }

    /// Grouped table over this aggregator alone, without type erasure.
    fn single_table(self, keys: Vec<Key>, output: OutputTable) -> Box<dyn Table> {
        match self {
            AggregatorKind::Count { column } => {
                build_grouped_table(keys, CountAggregator::new(column), output)
            }
            AggregatorKind::Sum { field, column } => {
                build_grouped_table(keys, SumAggregator::new(field, column), output)
            }
            AggregatorKind::Min { field, column } => {
                build_grouped_table(keys, MinAggregator::new(field, column), output)
            }
            AggregatorKind::Max { field, column } => {
                build_grouped_table(keys, MaxAggregator::new(field, column), output)
            }
            AggregatorKind::ArgMin { field, carried } => {
                build_grouped_table(keys, ArgMinAggregator::new(field, carried), output)
            }
            AggregatorKind::ArgMax { field, carried } => {
                build_grouped_table(keys, ArgMaxAggregator::new(field, carried), output)
            }
            AggregatorKind::CountDistinct { field, column } => {
                build_grouped_table(keys, CountDistinctAggregator::new(field, column), output)
            }
        }
    }
}

fn carried_fields(exprs: &[Expr], first_column: usize) -> Vec<CarriedField> {
    exprs
        .iter()
        .enumerate()
        .map(|(i, e)| CarriedField {
            field: e.field,
            column: first_column + i,
        })
        .collect()
}

fn build_aggregated(
    aggregated: &AggregatedTable,
    downstream: Downstream,
) -> Result<Box<dyn Table>, ProcessorError> {
    let mut keys = Vec::new();
    let mut aggregators = Vec::new();
    let mut column = 0;
    for component in &aggregated.components {
        match component {
            Component::Key(e) => keys.push(Key::new(e.field, column)),
            other => aggregators.push(AggregatorKind::resolve(other, column)?),
        }
        column += component.num_columns();
    }
    if column == 0 {
        return Err(ProcessorError::logic("aggregated stage without output columns"));
    }

    let output = downstream.into_output(column);
    log::debug!(
        "stage: {} keys, aggregators {aggregators:?}, {column} columns",
        keys.len()
    );
    let mut aggregators = aggregators.into_iter();
    match (aggregators.next(), aggregators.len()) {
        (None, _) => build_distinct_table(keys, output),
        (Some(single), 0) => Ok(single.single_table(keys, output)),
        (Some(first), _) => {
            let ports = iter::once(first)
                .chain(aggregators)
                .map(AggregatorKind::erased)
                .collect();
            build_packed_table(keys, ports, output)
        }
    }
}
