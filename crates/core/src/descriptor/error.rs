use crate::descriptor::{HeapId, HeapKind};
use std::error::Error;
use thiserror::Error;

/// Allocation failures that are returned to the caller, who decides whether to fall back or propagate further.
#[derive(Debug, Error)]
pub enum AllocationError {
	#[error("Ran out of {} descriptors while allocating {requested}, all {heaps} heaps are full", .kind.name())]
	OutOfDescriptors { kind: HeapKind, requested: u32, heaps: u32 },
	#[error("Requested {requested} contiguous {} descriptors, but a heap only holds {capacity}", .kind.name())]
	RequestTooLarge {
		kind: HeapKind,
		requested: u32,
		capacity: u32,
	},
	#[error("A {} descriptor heap with {reserved} reserved and {transient} transient slots exceeds the addressable slot count", .kind.name())]
	HeapTooLarge { kind: HeapKind, reserved: u32, transient: u32 },
	#[error("Requested an empty range of {} descriptors", .0.name())]
	EmptyRequest(HeapKind),
	#[error("Creating a {} descriptor heap failed: {source}", .kind.name())]
	HeapCreation {
		kind: HeapKind,
		#[source]
		source: Box<dyn Error + Send + Sync>,
	},
}

/// A collaborator broke the allocation contract. The offending operation was aborted without changing any state.
#[derive(Copy, Clone, Debug, Error, Eq, PartialEq)]
pub enum SlotViolation {
	#[error("Double free of descriptor slot {offset} in heap {heap:?}")]
	DoubleFree { heap: HeapId, offset: u32 },
	#[error("Descriptor slot {offset} in heap {heap:?} was already reused, generation {generation} is stale")]
	StaleSlot { heap: HeapId, offset: u32, generation: u32 },
	#[error("Heap {0:?} does not belong to this allocator")]
	ForeignHeap(HeapId),
	#[error("Descriptor range {offset}..{end} is outside of the reserved region of heap {heap:?}", end = .offset + .count)]
	OutOfBounds { heap: HeapId, offset: u32, count: u32 },
	#[error("Transient descriptor ranges can not be freed individually, heap {0:?}")]
	TransientFree(HeapId),
}

impl SlotViolation {
	/// Log the violation loudly and hand it back, for use in `Err(..)` position.
	#[cold]
	pub(crate) fn report(self) -> Self {
		log::error!("{}", self);
		self
	}
}
