use crate::backing::slot_array::SlotArray;
use crate::descriptor::{AllocationError, DescriptorHeapInfo, DescriptorSlot, HeapId, HeapKind, SlotViolation};
use crate::platform::NativeBackend;
use crossbeam_queue::SegQueue;
use crossbeam_utils::CachePadded;
use parking_lot::RwLock;
use std::sync::atomic::Ordering::{AcqRel, Acquire, Relaxed};
use std::sync::atomic::{AtomicU32, AtomicUsize};
use std::sync::Arc;

/// Highest generation a page slot can carry, one bit of the state is used as the in-use flag.
const MAX_PAGE_GENERATION: u32 = u32::MAX >> 1;

/// Hands out single descriptors of one [`HeapKind`] from a growable list of fixed capacity, CPU-only heaps.
///
/// Heaps are never shrunk, merged or moved, so the CPU address of an allocated descriptor never changes. Allocating and
/// freeing slots of existing heaps is lock free, only creating a new heap takes the heap list's write lock.
pub struct DescriptorPageAllocator<B: NativeBackend> {
	backend: Arc<B>,
	kind: HeapKind,
	heap_capacity: u32,
	max_heaps: u32,
	heaps: RwLock<Vec<PageHeap<B>>>,
	in_use: CachePadded<AtomicUsize>,
}

struct PageHeap<B: NativeBackend> {
	id: HeapId,
	/// always Some, Option is only needed for clean drop
	native: Option<B::DescriptorHeap>,
	info: DescriptorHeapInfo,
	/// `generation << 1 | in_use`
	states: SlotArray<AtomicU32>,
	dead_queue: SegQueue<u32>,
	next_free: CachePadded<AtomicU32>,
}

impl<B: NativeBackend> PageHeap<B> {
	fn try_alloc(&self) -> Option<DescriptorSlot> {
		let offset = if let Some(offset) = self.dead_queue.pop() {
			offset
		} else {
			let capacity = self.states.len() as u32;
			self.next_free
				.fetch_update(Relaxed, Relaxed, |next| (next < capacity).then_some(next + 1))
				.ok()?
		};

		// Safety of the state: popping the offset from the dead_queue or bumping next_free gave us exclusive ownership
		let previous = self.states[offset].fetch_or(1, AcqRel);
		debug_assert_eq!(previous & 1, 0, "slot {} of {:?} handed out while in use", offset, self.id);
		Some(DescriptorSlot {
			heap: self.id,
			offset,
			generation: previous >> 1,
		})
	}

	fn free(&self, slot: DescriptorSlot) -> Result<(), SlotViolation> {
		let state = self.states.get(slot.offset).ok_or(SlotViolation::OutOfBounds {
			heap: slot.heap,
			offset: slot.offset,
			count: 1,
		})?;
		if slot.generation > MAX_PAGE_GENERATION {
			return Err(SlotViolation::StaleSlot {
				heap: slot.heap,
				offset: slot.offset,
				generation: slot.generation,
			});
		}

		let expected = slot.generation << 1 | 1;
		let next_generation = slot.generation + 1;
		let retire = next_generation > MAX_PAGE_GENERATION;
		// a retired slot keeps its last generation with the in-use bit cleared
		let new = if retire { slot.generation << 1 } else { next_generation << 1 };
		match state.compare_exchange(expected, new, AcqRel, Acquire) {
			Ok(_) => {
				if retire {
					log::debug!("retiring slot {} of {:?}, out of generations", slot.offset, self.id);
				} else {
					self.dead_queue.push(slot.offset);
				}
				Ok(())
			}
			Err(current) if current & 1 == 0 && (current >> 1 == next_generation || retire) => {
				Err(SlotViolation::DoubleFree {
					heap: slot.heap,
					offset: slot.offset,
				})
			}
			Err(_) => Err(SlotViolation::StaleSlot {
				heap: slot.heap,
				offset: slot.offset,
				generation: slot.generation,
			}),
		}
	}

	fn is_current(&self, slot: DescriptorSlot) -> bool {
		slot.generation <= MAX_PAGE_GENERATION
			&& self
				.states
				.get(slot.offset)
				.is_some_and(|state| state.load(Acquire) == slot.generation << 1 | 1)
	}
}

impl<B: NativeBackend> DescriptorPageAllocator<B> {
	pub fn new(backend: Arc<B>, kind: HeapKind, heap_capacity: u32, max_heaps: u32) -> Self {
		Self {
			backend,
			kind,
			heap_capacity,
			max_heaps,
			heaps: RwLock::new(Vec::new()),
			in_use: CachePadded::new(AtomicUsize::new(0)),
		}
	}

	#[inline]
	pub fn kind(&self) -> HeapKind {
		self.kind
	}

	#[inline]
	pub fn heap_capacity(&self) -> u32 {
		self.heap_capacity
	}

	/// Number of slots currently handed out
	pub fn in_use(&self) -> usize {
		self.in_use.load(Relaxed)
	}

	pub fn heap_count(&self) -> u32 {
		self.heaps.read().len() as u32
	}

	/// Allocate a single descriptor slot, creating a new heap if all existing ones are full.
	pub fn allocate(&self) -> Result<DescriptorSlot, AllocationError> {
		profiling::function_scope!();
		{
			let heaps = self.heaps.read();
			if let Some(slot) = heaps.iter().find_map(PageHeap::try_alloc) {
				self.in_use.fetch_add(1, Relaxed);
				return Ok(slot);
			}
		}
		self.allocate_slow()
	}

	#[cold]
	#[inline(never)]
	fn allocate_slow(&self) -> Result<DescriptorSlot, AllocationError> {
		let mut heaps = self.heaps.write();
		// some other thread may have freed a slot or grown the heap list while we waited on the lock
		if let Some(slot) = heaps.iter().find_map(PageHeap::try_alloc) {
			self.in_use.fetch_add(1, Relaxed);
			return Ok(slot);
		}

		let index = heaps.len() as u32;
		if index >= self.max_heaps || self.heap_capacity == 0 {
			return Err(AllocationError::OutOfDescriptors {
				kind: self.kind,
				requested: 1,
				heaps: index,
			});
		}

		// Safety: CPU-only heaps are always allowed
		let (native, info) = unsafe { self.backend.create_descriptor_heap(self.kind, self.heap_capacity, false) }
			.map_err(|err| AllocationError::HeapCreation {
				kind: self.kind,
				source: Box::new(err),
			})?;
		log::debug!(
			"created {} descriptor page heap {} with {} slots",
			self.kind.name(),
			index,
			self.heap_capacity
		);
		let heap = PageHeap {
			id: HeapId {
				kind: self.kind,
				shader_visible: false,
				index,
			},
			native: Some(native),
			info,
			states: SlotArray::new(self.heap_capacity),
			dead_queue: SegQueue::new(),
			next_free: CachePadded::new(AtomicU32::new(0)),
		};
		let slot = heap.try_alloc();
		heaps.push(heap);
		self.in_use.fetch_add(1, Relaxed);
		// a fresh heap with a non-zero capacity always has a slot available
		slot.ok_or(AllocationError::OutOfDescriptors {
			kind: self.kind,
			requested: 1,
			heaps: index + 1,
		})
	}

	fn with_heap<R>(&self, heap: HeapId, f: impl FnOnce(&PageHeap<B>) -> R) -> Result<R, SlotViolation> {
		let heaps = self.heaps.read();
		match heaps.get(heap.index as usize) {
			Some(page) if page.id == heap => Ok(f(page)),
			_ => Err(SlotViolation::ForeignHeap(heap).report()),
		}
	}

	/// Return `slot` to its heap. Freeing a slot twice, or freeing a slot with an outdated generation, is reported
	/// and leaves the allocator untouched.
	pub fn free(&self, slot: DescriptorSlot) -> Result<(), SlotViolation> {
		profiling::function_scope!();
		self.with_heap(slot.heap, |heap| heap.free(slot))?
			.map_err(SlotViolation::report)?;
		self.in_use.fetch_sub(1, Relaxed);
		Ok(())
	}

	/// Whether `slot` is currently allocated with exactly this generation.
	pub fn is_current(&self, slot: DescriptorSlot) -> bool {
		let heaps = self.heaps.read();
		heaps
			.get(slot.heap.index as usize)
			.is_some_and(|heap| heap.id == slot.heap && heap.is_current(slot))
	}

	/// The CPU address of the descriptor at `slot`.
	pub fn cpu_address(&self, slot: DescriptorSlot) -> Option<u64> {
		let heaps = self.heaps.read();
		let heap = heaps.get(slot.heap.index as usize).filter(|heap| heap.id == slot.heap)?;
		(slot.offset < heap.states.len() as u32).then(|| heap.info.cpu_address(slot.offset))
	}
}

impl<B: NativeBackend> Drop for DescriptorPageAllocator<B> {
	fn drop(&mut self) {
		for heap in self.heaps.get_mut().iter_mut() {
			if let Some(native) = heap.native.take() {
				// Safety: the allocator is being dropped, so no slot of it can be used anymore
				unsafe { self.backend.destroy_descriptor_heap(native) };
			}
		}
	}
}
