use crate::descriptor::HeapId;

/// A single descriptor within a heap.
///
/// The `generation` tag changes every time the slot is handed out again, so a `DescriptorSlot` captured before its
/// slot was freed and reused can be told apart from the current occupant.
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq)]
pub struct DescriptorSlot {
	pub heap: HeapId,
	pub offset: u32,
	pub generation: u32,
}

impl DescriptorSlot {
	/// The (heap, offset) pair without its generation, identifying the physical slot.
	#[inline]
	pub fn location(&self) -> (HeapId, u32) {
		(self.heap, self.offset)
	}
}

/// Which region of a GPU-visible heap a range is allocated from.
#[derive(Copy, Clone, Debug, Default, Hash, Eq, PartialEq)]
pub enum Region {
	/// Stable descriptors, freed individually.
	#[default]
	Reserved,
	/// Per-submission descriptor tables, only freed in bulk by resetting the bump region.
	Transient,
}

/// A contiguous run of descriptors returned by the range allocator. `slot` is the first descriptor of the run.
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq)]
pub struct RangeAllocation {
	pub slot: DescriptorSlot,
	pub count: u32,
	pub region: Region,
}

impl RangeAllocation {
	#[inline]
	pub fn heap(&self) -> HeapId {
		self.slot.heap
	}

	#[inline]
	pub fn base_offset(&self) -> u32 {
		self.slot.offset
	}

	#[inline]
	pub fn offsets(&self) -> std::ops::Range<u32> {
		self.slot.offset..self.slot.offset + self.count
	}

	/// The slot at `index` within this run, carrying the run's generation.
	pub fn slot_at(&self, index: u32) -> Option<DescriptorSlot> {
		(index < self.count).then(|| DescriptorSlot {
			offset: self.slot.offset + index,
			..self.slot
		})
	}
}
