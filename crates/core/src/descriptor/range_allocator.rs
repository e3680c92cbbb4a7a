use crate::backing::range_set::{FreeRangeSet, ReleaseError};
use crate::backing::slot_array::SlotArray;
use crate::descriptor::{
	AllocationError, DescriptorHeapInfo, DescriptorSlot, HeapId, HeapKind, RangeAllocation, Region, SlotViolation,
};
use crate::platform::NativeBackend;
use parking_lot::RwLock;
use smallvec::SmallVec;
use std::sync::Arc;

/// Hands out contiguous runs of descriptors from GPU-visible heaps of one [`HeapKind`].
///
/// Every heap is split in two: offsets `0..reserved` form the reserved region, where runs are found first-fit and
/// freed individually, and the following `transient` offsets form the bump region, which is only ever reset as a
/// whole by [`Self::reset_bump_region`].
///
/// A reserved run stamps every slot it covers with a fresh heap-wide generation, the stamp is cleared again when the
/// slot is freed. The bump region shares a single generation per heap that advances on every reset.
pub struct DescriptorRangeAllocator<B: NativeBackend> {
	backend: Arc<B>,
	kind: HeapKind,
	reserved_capacity: u32,
	transient_capacity: u32,
	max_heaps: u32,
	heaps: RwLock<Vec<GpuHeap<B>>>,
}

struct GpuHeap<B: NativeBackend> {
	id: HeapId,
	/// always Some, Option is only needed for clean drop
	native: Option<B::DescriptorHeap>,
	info: DescriptorHeapInfo,
	reserved: FreeRangeSet,
	/// generation stamp of each reserved slot, 0 while free
	stamps: SlotArray<u32>,
	next_generation: u32,
	transient_capacity: u32,
	bump_cursor: u32,
	bump_generation: u32,
}

/// Advance a generation counter, skipping 0.
fn next_nonzero(generation: u32) -> u32 {
	generation.checked_add(1).unwrap_or(1)
}

impl<B: NativeBackend> GpuHeap<B> {
	#[inline]
	fn reserved_capacity(&self) -> u32 {
		self.reserved.capacity()
	}

	#[inline]
	fn total_capacity(&self) -> u32 {
		self.reserved_capacity() + self.transient_capacity
	}

	fn try_alloc_reserved(&mut self, count: u32) -> Option<RangeAllocation> {
		let range = self.reserved.take_first_fit(count)?;
		let generation = self.next_generation;
		self.next_generation = next_nonzero(generation);
		for offset in range.clone() {
			self.stamps[offset] = generation;
		}
		Some(RangeAllocation {
			slot: DescriptorSlot {
				heap: self.id,
				offset: range.start,
				generation,
			},
			count,
			region: Region::Reserved,
		})
	}

	fn try_alloc_transient(&mut self, count: u32) -> Option<RangeAllocation> {
		let end = self.bump_cursor.checked_add(count)?;
		if end > self.transient_capacity {
			return None;
		}
		let offset = self.reserved_capacity() + self.bump_cursor;
		self.bump_cursor = end;
		Some(RangeAllocation {
			slot: DescriptorSlot {
				heap: self.id,
				offset,
				generation: self.bump_generation,
			},
			count,
			region: Region::Transient,
		})
	}

	fn try_alloc(&mut self, count: u32, region: Region) -> Option<RangeAllocation> {
		match region {
			Region::Reserved => self.try_alloc_reserved(count),
			Region::Transient => self.try_alloc_transient(count),
		}
	}

	fn free_range(&mut self, base_offset: u32, count: u32) -> Result<(), SlotViolation> {
		let reserved = self.reserved_capacity();
		if base_offset >= reserved && base_offset < self.total_capacity() {
			return Err(SlotViolation::TransientFree(self.id));
		}
		let out_of_bounds = SlotViolation::OutOfBounds {
			heap: self.id,
			offset: base_offset,
			count,
		};
		let end = base_offset.checked_add(count).ok_or(out_of_bounds)?;
		match self.reserved.release(base_offset..end) {
			Ok(()) => {
				for offset in base_offset..end {
					self.stamps[offset] = 0;
				}
				Ok(())
			}
			Err(ReleaseError::OutOfBounds) => Err(out_of_bounds),
			Err(ReleaseError::AlreadyFree) => Err(SlotViolation::DoubleFree {
				heap: self.id,
				offset: (base_offset..end)
					.find(|offset| self.reserved.is_free(*offset))
					.unwrap_or(base_offset),
			}),
		}
	}

	fn is_current(&self, allocation: &RangeAllocation) -> bool {
		let slot = allocation.slot;
		if allocation.count == 0 || slot.generation == 0 {
			return false;
		}
		let Some(end) = slot.offset.checked_add(allocation.count) else {
			return false;
		};
		match allocation.region {
			Region::Reserved => {
				end <= self.reserved_capacity() && (slot.offset..end).all(|offset| self.stamps[offset] == slot.generation)
			}
			Region::Transient => {
				slot.offset >= self.reserved_capacity()
					&& end <= self.reserved_capacity() + self.bump_cursor
					&& slot.generation == self.bump_generation
			}
		}
	}

	/// The slot at `offset` with the generation of its current occupant, None if unoccupied.
	fn occupied_slot(&self, offset: u32) -> Option<DescriptorSlot> {
		let reserved = self.reserved_capacity();
		let generation = if offset < reserved {
			Some(self.stamps[offset]).filter(|stamp| *stamp != 0)?
		} else if offset - reserved < self.bump_cursor {
			self.bump_generation
		} else {
			return None;
		};
		Some(DescriptorSlot {
			heap: self.id,
			offset,
			generation,
		})
	}
}

impl<B: NativeBackend> DescriptorRangeAllocator<B> {
	/// # Panics
	/// if `kind` can not be shader visible
	pub fn new(backend: Arc<B>, kind: HeapKind, reserved_capacity: u32, transient_capacity: u32, max_heaps: u32) -> Self {
		assert!(
			kind.is_shader_visible(),
			"{} descriptors can not be placed in shader visible heaps",
			kind.name()
		);
		Self {
			backend,
			kind,
			reserved_capacity,
			transient_capacity,
			max_heaps,
			heaps: RwLock::new(Vec::new()),
		}
	}

	#[inline]
	pub fn kind(&self) -> HeapKind {
		self.kind
	}

	#[inline]
	pub fn reserved_capacity(&self) -> u32 {
		self.reserved_capacity
	}

	#[inline]
	pub fn transient_capacity(&self) -> u32 {
		self.transient_capacity
	}

	pub fn heap_count(&self) -> u32 {
		self.heaps.read().len() as u32
	}

	/// Number of reserved descriptors currently handed out, across all heaps.
	pub fn reserved_in_use(&self) -> u32 {
		self.heaps
			.read()
			.iter()
			.map(|heap| heap.reserved_capacity() - heap.reserved.free_count())
			.sum()
	}

	fn region_capacity(&self, region: Region) -> u32 {
		match region {
			Region::Reserved => self.reserved_capacity,
			Region::Transient => self.transient_capacity,
		}
	}

	/// Reserve `count` contiguous descriptors from `region`. If no existing heap has a long enough run, a new heap is
	/// created, until the heap ceiling is hit.
	pub fn allocate_range(&self, count: u32, region: Region) -> Result<RangeAllocation, AllocationError> {
		profiling::function_scope!();
		let mut heaps = self.heaps.write();
		self.allocate_locked(&mut heaps, count, region)
	}

	/// Allocate one range per entry of `counts` from `region`. Either all ranges are allocated or none, reserved ranges
	/// taken before a failure are released again. Transient ranges are not rolled back and expire on the next reset.
	pub fn allocate_ranges(
		&self,
		counts: &[u32],
		region: Region,
	) -> Result<SmallVec<[RangeAllocation; 4]>, AllocationError> {
		profiling::function_scope!();
		let mut heaps = self.heaps.write();
		let mut out = SmallVec::<[RangeAllocation; 4]>::with_capacity(counts.len());
		for &count in counts {
			match self.allocate_locked(&mut heaps, count, region) {
				Ok(allocation) => out.push(allocation),
				Err(err) => {
					if region == Region::Reserved {
						for allocation in out {
							let heap = &mut heaps[allocation.heap().index as usize];
							// just allocated under the same lock, releasing can not fail
							let _ = heap.free_range(allocation.base_offset(), allocation.count);
						}
					}
					return Err(err);
				}
			}
		}
		Ok(out)
	}

	fn allocate_locked(
		&self,
		heaps: &mut Vec<GpuHeap<B>>,
		count: u32,
		region: Region,
	) -> Result<RangeAllocation, AllocationError> {
		if count == 0 {
			return Err(AllocationError::EmptyRequest(self.kind));
		}
		let capacity = self.region_capacity(region);
		if count > capacity {
			return Err(AllocationError::RequestTooLarge {
				kind: self.kind,
				requested: count,
				capacity,
			});
		}

		if let Some(allocation) = heaps.iter_mut().find_map(|heap| heap.try_alloc(count, region)) {
			return Ok(allocation);
		}

		let index = heaps.len() as u32;
		if index >= self.max_heaps {
			return Err(AllocationError::OutOfDescriptors {
				kind: self.kind,
				requested: count,
				heaps: index,
			});
		}
		let mut heap = self.create_heap(index)?;
		let allocation = heap.try_alloc(count, region);
		heaps.push(heap);
		// count fits the region of an empty heap, checked above
		allocation.ok_or(AllocationError::OutOfDescriptors {
			kind: self.kind,
			requested: count,
			heaps: index + 1,
		})
	}

	#[cold]
	fn create_heap(&self, index: u32) -> Result<GpuHeap<B>, AllocationError> {
		let total = self
			.reserved_capacity
			.checked_add(self.transient_capacity)
			.ok_or(AllocationError::HeapTooLarge {
				kind: self.kind,
				reserved: self.reserved_capacity,
				transient: self.transient_capacity,
			})?;
		// Safety: checked in new that kind may be shader visible
		let (native, info) = unsafe { self.backend.create_descriptor_heap(self.kind, total, true) }.map_err(|err| {
			AllocationError::HeapCreation {
				kind: self.kind,
				source: Box::new(err),
			}
		})?;
		log::debug!(
			"created shader visible {} descriptor heap {} with {} reserved and {} transient slots",
			self.kind.name(),
			index,
			self.reserved_capacity,
			self.transient_capacity
		);
		Ok(GpuHeap {
			id: HeapId {
				kind: self.kind,
				shader_visible: true,
				index,
			},
			native: Some(native),
			info,
			reserved: FreeRangeSet::new(0..self.reserved_capacity),
			stamps: SlotArray::new(self.reserved_capacity),
			next_generation: 1,
			transient_capacity: self.transient_capacity,
			bump_cursor: 0,
			bump_generation: 1,
		})
	}

	fn heap_index(heaps: &[GpuHeap<B>], heap: HeapId) -> Option<usize> {
		let index = heap.index as usize;
		heaps.get(index).filter(|h| h.id == heap).map(|_| index)
	}

	/// Release `count` reserved descriptors starting at `base_offset`. Any part of a previous allocation may be freed,
	/// which invalidates that whole allocation. Transient descriptors can not be freed individually.
	pub fn free_range(&self, heap: HeapId, base_offset: u32, count: u32) -> Result<(), SlotViolation> {
		profiling::function_scope!();
		let mut heaps = self.heaps.write();
		let index = Self::heap_index(&heaps, heap).ok_or_else(|| SlotViolation::ForeignHeap(heap).report())?;
		heaps[index]
			.free_range(base_offset, count)
			.map_err(SlotViolation::report)
	}

	/// Release a whole reserved allocation, verifying it is still current first.
	pub fn free(&self, allocation: RangeAllocation) -> Result<(), SlotViolation> {
		profiling::function_scope!();
		let slot = allocation.slot;
		let mut heaps = self.heaps.write();
		let index = Self::heap_index(&heaps, slot.heap).ok_or_else(|| SlotViolation::ForeignHeap(slot.heap).report())?;
		let heap = &mut heaps[index];
		if allocation.region == Region::Transient {
			return Err(SlotViolation::TransientFree(slot.heap).report());
		}
		if !heap.is_current(&allocation) {
			let all_free = slot.offset.checked_add(allocation.count).is_some_and(|end| {
				end <= heap.reserved_capacity() && (slot.offset..end).all(|offset| heap.reserved.is_free(offset))
			});
			let violation = if all_free {
				SlotViolation::DoubleFree {
					heap: slot.heap,
					offset: slot.offset,
				}
			} else {
				SlotViolation::StaleSlot {
					heap: slot.heap,
					offset: slot.offset,
					generation: slot.generation,
				}
			};
			return Err(violation.report());
		}
		heap.free_range(slot.offset, allocation.count)
			.map_err(SlotViolation::report)
	}

	/// Invalidate every transient allocation handed out since the last reset and make the whole bump region available
	/// again. Must be called exactly once per submission boundary.
	pub fn reset_bump_region(&self) {
		profiling::function_scope!();
		let mut heaps = self.heaps.write();
		for heap in heaps.iter_mut() {
			heap.bump_cursor = 0;
			heap.bump_generation = next_nonzero(heap.bump_generation);
		}
		log::debug!(
			"reset {} bump regions of {} descriptor heaps",
			heaps.len(),
			self.kind.name()
		);
	}

	/// The current generation of the bump region of `heap`.
	pub fn bump_generation(&self, heap: HeapId) -> Option<u32> {
		let heaps = self.heaps.read();
		Self::heap_index(&heaps, heap).map(|index| heaps[index].bump_generation)
	}

	/// Whether `allocation` was neither freed nor invalidated by a bump reset.
	pub fn is_current(&self, allocation: &RangeAllocation) -> bool {
		let heaps = self.heaps.read();
		Self::heap_index(&heaps, allocation.heap()).is_some_and(|index| heaps[index].is_current(allocation))
	}

	fn with_heap_offset<R>(&self, slot: DescriptorSlot, f: impl FnOnce(&GpuHeap<B>) -> R) -> Option<R> {
		let heaps = self.heaps.read();
		let heap = &heaps[Self::heap_index(&heaps, slot.heap)?];
		(slot.offset < heap.total_capacity()).then(|| f(heap))
	}

	pub fn gpu_address(&self, slot: DescriptorSlot) -> Option<u64> {
		self.with_heap_offset(slot, |heap| heap.info.gpu_address(slot.offset))?
	}

	pub fn cpu_address(&self, slot: DescriptorSlot) -> Option<u64> {
		self.with_heap_offset(slot, |heap| heap.info.cpu_address(slot.offset))
	}

	/// Find the occupied slot a raw GPU descriptor address points at, carrying the generation of its current
	/// occupant. Returns None for addresses outside of all heaps, misaligned addresses and unoccupied slots.
	pub fn slot_from_gpu_address(&self, address: u64) -> Option<DescriptorSlot> {
		profiling::function_scope!();
		let heaps = self.heaps.read();
		heaps.iter().find_map(|heap| {
			let offset = heap.info.gpu_offset_of(address, heap.total_capacity())?;
			heap.occupied_slot(offset)
		})
	}
}

impl<B: NativeBackend> Drop for DescriptorRangeAllocator<B> {
	fn drop(&mut self) {
		for heap in self.heaps.get_mut().iter_mut() {
			if let Some(native) = heap.native.take() {
				// Safety: the allocator is being dropped, so no slot of it can be used anymore
				unsafe { self.backend.destroy_descriptor_heap(native) };
			}
		}
	}
}
