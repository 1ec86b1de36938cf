//! Packing several aggregators' states into one fixed-size buffer per group.
//!
//! Each aggregator is wrapped in an [`ErasedAggregator`] that exposes its state
//! as a slot of raw bytes. [`layout_aggregator_state`] assigns every slot an
//! offset, and the group state is a [`PackedState`] just large enough for the
//! whole layout, picked from a small ladder of sizes so that the hash map
//! values stay compact.
//!
//! All `unsafe` in the crate lives in this module.

use std::{
    cmp::Reverse,
    mem::{self, MaybeUninit},
};

use crate::processor::{
    Key, ProcessorError, Table,
    aggregators::Aggregator,
    grouping::build_grouped_table,
    output::OutputTable,
    row::InputRow,
};

/// Largest combined aggregator state per group, in bytes.
pub const MAX_PACKED_STATE: usize = 64;

/// Largest supported alignment of a single aggregator state.
pub const MAX_STATE_ALIGN: usize = 8;

const STATE_BUCKETS: [usize; 6] = [8, 16, 24, 32, 48, 64];

/// Dynamic interface over an aggregator whose state is stored as raw bytes.
pub trait AggregatorPort {
    /// Size of the state slot: the state size rounded up to a power of two.
    fn state_size(&self) -> usize;

    fn state_align(&self) -> usize;

    /// Writes a freshly initialized state into `slot`.
    ///
    /// Panics if `slot` is shorter than the state or misaligned for it.
    fn init(
        &mut self,
        row: &InputRow<'_>,
        slot: &mut [MaybeUninit<u8>],
    ) -> Result<(), ProcessorError>;

    /// # Safety
    ///
    /// `slot` must hold a state written by `init` of this same port.
    unsafe fn update(
        &mut self,
        row: &InputRow<'_>,
        slot: &mut [MaybeUninit<u8>],
    ) -> Result<(), ProcessorError>;

    /// # Safety
    ///
    /// `slot` must hold a state written by `init` of this same port.
    unsafe fn print(
        &self,
        slot: &[MaybeUninit<u8>],
        out: &mut OutputTable,
    ) -> Result<(), ProcessorError>;
}

/// Adapts a statically typed [`Aggregator`] to [`AggregatorPort`].
pub struct ErasedAggregator<A> {
    inner: A,
}

/// Boxes `aggregator` behind the byte-slot interface.
pub fn type_erased<A: Aggregator + 'static>(aggregator: A) -> Box<dyn AggregatorPort> {
    const {
        assert!(mem::align_of::<A::State>() <= MAX_STATE_ALIGN);
    }
    Box::new(ErasedAggregator { inner: aggregator })
}

impl<A: Aggregator> ErasedAggregator<A> {
    fn check_slot(slot: &[MaybeUninit<u8>]) {
        assert!(slot.len() >= mem::size_of::<A::State>(), "state slot too small");
        assert!(
            slot.as_ptr().cast::<A::State>().is_aligned(),
            "state slot misaligned"
        );
    }
}

impl<A: Aggregator> AggregatorPort for ErasedAggregator<A> {
    fn state_size(&self) -> usize {
        mem::size_of::<A::State>().next_power_of_two()
    }

    fn state_align(&self) -> usize {
        mem::align_of::<A::State>()
    }

    fn init(
        &mut self,
        row: &InputRow<'_>,
        slot: &mut [MaybeUninit<u8>],
    ) -> Result<(), ProcessorError> {
        Self::check_slot(slot);
        let state = self.inner.init(row)?;
        // SAFETY: the slot is large enough and aligned for `A::State`.
        unsafe { slot.as_mut_ptr().cast::<A::State>().write(state) };
        Ok(())
    }

    unsafe fn update(
        &mut self,
        row: &InputRow<'_>,
        slot: &mut [MaybeUninit<u8>],
    ) -> Result<(), ProcessorError> {
        Self::check_slot(slot);
        // SAFETY: the caller guarantees `init` stored an `A::State` here.
        let state = unsafe { &mut *slot.as_mut_ptr().cast::<A::State>() };
        self.inner.update(row, state)
    }

    unsafe fn print(
        &self,
        slot: &[MaybeUninit<u8>],
        out: &mut OutputTable,
    ) -> Result<(), ProcessorError> {
        Self::check_slot(slot);
        // SAFETY: the caller guarantees `init` stored an `A::State` here.
        let state = unsafe { &*slot.as_ptr().cast::<A::State>() };
        self.inner.print(state, out)
    }
}

/// Result of [`layout_aggregator_state`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateLayout {
    /// Sum of all slot sizes.
    pub total_size: usize,
    /// Byte offset of each slot, in input order.
    pub offsets: Vec<usize>,
}

/// Assigns offsets to `(size, align)` slots.
///
/// Slots are placed largest first (stable for equal sizes). Since every size
/// is a power of two, each running offset is a multiple of every size still to
/// come, so no padding is ever needed.
pub fn layout_aggregator_state(slots: &[(usize, usize)]) -> Result<StateLayout, ProcessorError> {
    for &(size, align) in slots {
        if !size.is_power_of_two() || size > MAX_PACKED_STATE {
            return Err(ProcessorError::logic(format!(
                "state slot size {size} is not a power of two up to {MAX_PACKED_STATE}"
            )));
        }
        if align > MAX_STATE_ALIGN || size % align != 0 {
            return Err(ProcessorError::logic(format!(
                "state alignment {align} incompatible with slot size {size}"
            )));
        }
    }

    let mut order: Vec<usize> = (0..slots.len()).collect();
    order.sort_by_key(|&i| Reverse(slots[i].0));

    let mut offsets = vec![0; slots.len()];
    let mut total_size = 0;
    for i in order {
        offsets[i] = total_size;
        total_size += slots[i].0;
    }

    if total_size > MAX_PACKED_STATE {
        return Err(ProcessorError::TooMuchState(total_size));
    }
    Ok(StateLayout {
        total_size,
        offsets,
    })
}

/// Smallest packed buffer size that fits `total_size` bytes.
pub fn state_bucket(total_size: usize) -> Result<usize, ProcessorError> {
    STATE_BUCKETS
        .into_iter()
        .find(|&bucket| total_size <= bucket)
        .ok_or(ProcessorError::TooMuchState(total_size))
}

/// Fixed-size, 8-byte aligned storage for one group's aggregator states.
#[derive(Clone, Copy)]
#[repr(C, align(8))]
struct PackedState<const N: usize>([MaybeUninit<u8>; N]);

impl<const N: usize> PackedState<N> {
    fn uninit() -> Self {
        PackedState([MaybeUninit::uninit(); N])
    }

    fn slot(&self, field: &PackedField) -> &[MaybeUninit<u8>] {
        &self.0[field.offset..field.offset + field.size]
    }

    fn slot_mut(&mut self, field: &PackedField) -> &mut [MaybeUninit<u8>] {
        &mut self.0[field.offset..field.offset + field.size]
    }
}

struct PackedField {
    aggregator: Box<dyn AggregatorPort>,
    offset: usize,
    size: usize,
}

/// Several aggregators sharing one [`PackedState`] per group.
///
/// Private to this module: a `PackedState` only ever reaches `update` or
/// `print` after `init` of the same `MultiAggregator` produced it.
struct MultiAggregator<const N: usize> {
    fields: Vec<PackedField>,
}

impl<const N: usize> Aggregator for MultiAggregator<N> {
    type State = PackedState<N>;

    fn init(&mut self, row: &InputRow<'_>) -> Result<PackedState<N>, ProcessorError> {
        let mut state = PackedState::uninit();
        for field in &mut self.fields {
            let slot = state.slot_mut(field);
            field.aggregator.init(row, slot)?;
        }
        Ok(state)
    }

    fn update(
        &mut self,
        row: &InputRow<'_>,
        state: &mut PackedState<N>,
    ) -> Result<(), ProcessorError> {
        for field in &mut self.fields {
            let slot = state.slot_mut(field);
            // SAFETY: `init` filled every slot of this layout.
            unsafe { field.aggregator.update(row, slot)? };
        }
        Ok(())
    }

    fn print(&self, state: &PackedState<N>, out: &mut OutputTable) -> Result<(), ProcessorError> {
        for field in &self.fields {
            // SAFETY: `init` filled every slot of this layout.
            unsafe { field.aggregator.print(state.slot(field), out)? };
        }
        Ok(())
    }
}

/// Builds a grouped table whose aggregators share one packed buffer per group.
pub fn build_packed_table(
    keys: Vec<Key>,
    aggregators: Vec<Box<dyn AggregatorPort>>,
    output: OutputTable,
) -> Result<Box<dyn Table>, ProcessorError> {
    let slots: Vec<(usize, usize)> = aggregators
        .iter()
        .map(|a| (a.state_size(), a.state_align()))
        .collect();
    let layout = layout_aggregator_state(&slots)?;
    let bucket = state_bucket(layout.total_size)?;
    log::debug!(
        "packing {} aggregators into {bucket} bytes (slots {slots:?}, offsets {:?})",
        aggregators.len(),
        layout.offsets
    );

    let fields: Vec<PackedField> = aggregators
        .into_iter()
        .zip(slots)
        .zip(layout.offsets)
        .map(|((aggregator, (size, _)), offset)| PackedField {
            aggregator,
            offset,
            size,
        })
        .collect();

    let table = match bucket {
        8 => build_grouped_table(keys, MultiAggregator::<8> { fields }, output),
        16 => build_grouped_table(keys, MultiAggregator::<16> { fields }, output),
        24 => build_grouped_table(keys, MultiAggregator::<24> { fields }, output),
        32 => build_grouped_table(keys, MultiAggregator::<32> { fields }, output),
        48 => build_grouped_table(keys, MultiAggregator::<48> { fields }, output),
        64 => build_grouped_table(keys, MultiAggregator::<64> { fields }, output),
        other => return Err(ProcessorError::TooMuchState(other)),
    };
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::aggregators::{
        CountAggregator, CountDistinctAggregator, MaxAggregator, SumAggregator,
    };

    #[test]
    fn test_layout_largest_first() {
        let layout = layout_aggregator_state(&[(8, 8), (16, 8), (4, 4), (16, 8)]).unwrap();
        assert_eq!(layout.total_size, 44);
        assert_eq!(layout.offsets, vec![32, 0, 40, 16]);
        for (&(size, align), &offset) in [(8, 8), (16, 8), (4, 4), (16, 8)]
            .iter()
            .zip(&layout.offsets)
        {
            assert_eq!(offset % align, 0);
            assert_eq!(offset % size, 0);
        }
    }

    #[test]
    fn test_three_eight_byte_states_fit_in_24() {
        let layout = layout_aggregator_state(&[(8, 8), (8, 8), (8, 8)]).unwrap();
        assert_eq!(layout.total_size, 24);
        assert_eq!(layout.offsets, vec![0, 8, 16]);
        assert_eq!(state_bucket(layout.total_size).unwrap(), 24);
    }

    #[test]
    fn test_count_and_two_sums_pack_into_48() {
        let ports = [
            type_erased(CountAggregator::new(0)),
            type_erased(SumAggregator::new(1, 1)),
            type_erased(SumAggregator::new(2, 2)),
        ];
        let slots: Vec<(usize, usize)> =
            ports.iter().map(|p| (p.state_size(), p.state_align())).collect();
        let layout = layout_aggregator_state(&slots).unwrap();
        assert_eq!(layout.total_size, 40);
        assert_eq!(layout.offsets, vec![32, 0, 16]);
        assert_eq!(state_bucket(layout.total_size).unwrap(), 48);
    }

    #[test]
    fn test_too_much_state() {
        let slots = [(16, 8); 5];
        assert!(matches!(
            layout_aggregator_state(&slots),
            Err(ProcessorError::TooMuchState(80))
        ));
        assert!(matches!(state_bucket(65), Err(ProcessorError::TooMuchState(65))));
    }

    #[test]
    fn test_rejects_bad_slots() {
        assert!(layout_aggregator_state(&[(12, 4)]).is_err());
        assert!(layout_aggregator_state(&[(16, 16)]).is_err());
    }

    #[test]
    fn test_buckets() {
        assert_eq!(state_bucket(0).unwrap(), 8);
        assert_eq!(state_bucket(8).unwrap(), 8);
        assert_eq!(state_bucket(40).unwrap(), 48);
        assert_eq!(state_bucket(64).unwrap(), 64);
    }

    #[test]
    fn test_port_sizes() {
        assert_eq!(type_erased(CountAggregator::new(0)).state_size(), 8);
        assert_eq!(type_erased(SumAggregator::new(0, 0)).state_size(), 16);
        assert_eq!(type_erased(MaxAggregator::new(0, 0)).state_align(), 8);
        assert_eq!(type_erased(CountDistinctAggregator::new(0, 0)).state_size(), 8);
    }

    #[test]
    fn test_multi_aggregator_slots_are_independent() {
        let fields = [CountAggregator::new(0)]
            .into_iter()
            .map(type_erased)
            .chain([SumAggregator::new(0, 1), SumAggregator::new(1, 2)].map(type_erased))
            .collect::<Vec<_>>();
        let slots: Vec<_> = fields.iter().map(|a| (a.state_size(), a.state_align())).collect();
        let layout = layout_aggregator_state(&slots).unwrap();
        let mut multi = MultiAggregator::<48> {
            fields: fields
                .into_iter()
                .zip(slots)
                .zip(layout.offsets)
                .map(|((aggregator, (size, _)), offset)| PackedField {
                    aggregator,
                    offset,
                    size,
                })
                .collect(),
        };

        let spans = [(0, 1), (2, 4)];
        let mut state = multi.init(&InputRow::new(b"1 10", &spans)).unwrap();
        multi.update(&InputRow::new(b"2 20", &spans), &mut state).unwrap();
        multi.update(&InputRow::new(b"3 30", &spans), &mut state).unwrap();

        let sink = crate::processor::output::test_util::SharedBuffer::default();
        let mut out = OutputTable::to_writer(
            3,
            crate::processor::output::BufferedOutput::new(Box::new(sink.clone()), 1024),
        );
        multi.print(&state, &mut out).unwrap();
        out.end_line().unwrap();
        out.finish().unwrap();
        assert_eq!(sink.contents(), "3\t6\t60\n");
    }
}
