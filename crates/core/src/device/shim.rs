use crate::descriptor::{
	DescriptorCounts, DescriptorPageAllocator, DescriptorRangeAllocator, DescriptorSlot, HeapKind, RangeAllocation,
	Region, SlotViolation,
};
use crate::device::{DeviceError, DeviceHooks, NoHooks};
use crate::platform::NativeBackend;
use crate::registry::{Registry, ResourceDesc, SamplerDesc, ViewDesc, ViewKind};
use gpu_shim_handle::{Handle, HandleCategory};
use parking_lot::Mutex;
use smallvec::SmallVec;
use std::collections::HashSet;
use std::sync::Arc;

/// The thin layer between a native backend and the handle based API: creates native objects through the backend,
/// places their descriptors with the allocators and registers them in the [`Registry`].
///
/// Nothing here waits on the GPU, so every `unsafe` operation requires the caller to guarantee the GPU is done with
/// whatever is being released.
pub struct Device<B: NativeBackend, H: DeviceHooks<B> = NoHooks> {
	backend: Arc<B>,
	counts: DescriptorCounts,
	registry: Registry<B>,
	/// indexed by [`HeapKind`]
	pages: [DescriptorPageAllocator<B>; 4],
	view_tables: DescriptorRangeAllocator<B>,
	sampler_tables: DescriptorRangeAllocator<B>,
	/// transient descriptor tables registered since the last submission boundary
	transient_tables: Mutex<Vec<Handle>>,
	hooks: H,
}

impl<B: NativeBackend> Device<B> {
	/// Create a device without lifecycle hooks, using [`DescriptorCounts::reasonable_defaults`].
	pub fn with_defaults(backend: B) -> Self {
		let counts = DescriptorCounts::reasonable_defaults(&backend);
		Self::new(backend, counts, NoHooks)
	}
}

impl<B: NativeBackend, H: DeviceHooks<B>> Device<B, H> {
	/// # Panics
	/// if `counts` exceed the limits of `backend`
	pub fn new(backend: B, counts: DescriptorCounts, hooks: H) -> Self {
		counts.assert_within_limits(&backend);
		let backend = Arc::new(backend);
		let pages = HeapKind::VALUES.map(|kind| {
			DescriptorPageAllocator::new(
				backend.clone(),
				kind,
				counts.cpu_heap_capacity,
				counts.max_heaps_per_kind,
			)
		});
		let view_tables = DescriptorRangeAllocator::new(
			backend.clone(),
			HeapKind::View,
			counts.view_reserved,
			counts.view_transient,
			counts.max_heaps_per_kind,
		);
		let sampler_tables = DescriptorRangeAllocator::new(
			backend.clone(),
			HeapKind::Sampler,
			counts.sampler_reserved,
			counts.sampler_transient,
			counts.max_heaps_per_kind,
		);
		let device = Self {
			backend,
			counts,
			registry: Registry::new(),
			pages,
			view_tables,
			sampler_tables,
			transient_tables: Mutex::new(Vec::new()),
			hooks,
		};
		device.hooks.init_device(&device.backend);
		device
	}

	#[inline]
	pub fn backend(&self) -> &B {
		&self.backend
	}

	#[inline]
	pub fn counts(&self) -> DescriptorCounts {
		self.counts
	}

	#[inline]
	pub fn registry(&self) -> &Registry<B> {
		&self.registry
	}

	#[inline]
	pub fn hooks(&self) -> &H {
		&self.hooks
	}

	#[inline]
	pub fn page_allocator(&self, kind: HeapKind) -> &DescriptorPageAllocator<B> {
		&self.pages[kind as usize]
	}

	/// The allocator of shader visible descriptor tables of `kind`, only exists for view and sampler descriptors.
	pub fn table_allocator(&self, kind: HeapKind) -> Option<&DescriptorRangeAllocator<B>> {
		match kind {
			HeapKind::View => Some(&self.view_tables),
			HeapKind::Sampler => Some(&self.sampler_tables),
			HeapKind::RenderTarget | HeapKind::DepthStencil => None,
		}
	}

	fn require(&self, handle: Handle, category: HandleCategory) -> Result<(), DeviceError<B>> {
		if self.registry.is_valid(handle, category) {
			Ok(())
		} else {
			Err(DeviceError::InvalidHandle { handle, category })
		}
	}

	fn page_cpu_address(&self, slot: DescriptorSlot) -> Result<u64, DeviceError<B>> {
		self.page_allocator(slot.heap.kind)
			.cpu_address(slot)
			.ok_or(DeviceError::Slot(SlotViolation::ForeignHeap(slot.heap)))
	}

	/// Free a page slot on a cleanup path where the original error is more important.
	fn free_page_slot(&self, slot: DescriptorSlot) {
		if let Err(err) = self.page_allocator(slot.heap.kind).free(slot) {
			log::error!("failed to release descriptor slot {:?}: {}", slot, err);
		}
	}

	// resources

	pub fn create_resource(&self, desc: &ResourceDesc) -> Result<Handle, DeviceError<B>> {
		profiling::function_scope!();
		let native = unsafe { self.backend.create_resource(desc) }.map_err(DeviceError::Backend)?;
		let desc = self.backend.describe_resource(native);
		let gpu_address = self.backend.resource_gpu_address(native);
		let handle = match self.registry.register_resource(native, desc, gpu_address) {
			Ok(handle) => handle,
			Err(err) => {
				// Safety: never handed out
				unsafe { self.backend.destroy_resource(native) };
				return Err(err.into());
			}
		};
		self.hooks.init_resource(handle, &desc);
		Ok(handle)
	}

	/// Unregister and release a resource. Views of it should be destroyed first, views that are still alive stay
	/// registered but their owner no longer resolves.
	///
	/// # Safety
	/// The GPU must not use the resource anymore.
	pub unsafe fn destroy_resource(&self, handle: Handle) -> Result<(), DeviceError<B>> {
		profiling::function_scope!();
		self.require(handle, HandleCategory::Resource)?;
		// only the caller that actually removed the entry runs the hook
		let entry = self.registry.unregister_resource(handle)?;
		self.hooks.destroy_resource(handle);
		unsafe { self.backend.destroy_resource(entry.native) };
		Ok(())
	}

	pub fn resource_desc(&self, handle: Handle) -> Option<ResourceDesc> {
		self.registry.resolve_resource(handle)
	}

	pub fn set_resource_name(&self, handle: Handle, name: impl Into<String>) -> Result<(), DeviceError<B>> {
		Ok(self.registry.set_resource_name(handle, name)?)
	}

	/// The resource whose device-visible memory contains `address`, and the offset into it.
	pub fn resolve_gpu_address(&self, address: u64) -> Option<(Handle, u64)> {
		self.registry.resource_from_address(address)
	}

	// views

	/// Create a view of `resource`. Its descriptor is written into a freshly allocated CPU descriptor slot.
	pub fn create_view(&self, resource: Handle, desc: &ViewDesc) -> Result<Handle, DeviceError<B>> {
		profiling::function_scope!();
		if desc.kind == ViewKind::Sampler {
			return Err(DeviceError::UnsupportedViewKind(desc.kind));
		}
		let entry = self.registry.resource(resource).ok_or(DeviceError::InvalidHandle {
			handle: resource,
			category: HandleCategory::Resource,
		})?;
		let required = desc.kind.required_usage();
		if !entry.desc.usage.contains(required) {
			return Err(DeviceError::MissingUsage {
				resource,
				kind: desc.kind,
				required,
			});
		}

		let slot = self.page_allocator(desc.kind.heap_kind()).allocate()?;
		let native = self.page_cpu_address(slot).and_then(|descriptor| {
			// Safety: descriptor is the CPU address of the slot we just allocated
			unsafe { self.backend.create_view(entry.native, desc, descriptor) }.map_err(DeviceError::Backend)
		});
		let native = match native {
			Ok(native) => native,
			Err(err) => {
				self.free_page_slot(slot);
				return Err(err);
			}
		};

		let desc = self.backend.describe_view(native);
		match self.registry.register_view(native, resource, desc, Some(slot)) {
			Ok(handle) => {
				self.hooks.init_view(handle, &desc);
				Ok(handle)
			}
			Err(err) => {
				// the resource got destroyed concurrently
				unsafe { self.backend.destroy_view(native) };
				self.free_page_slot(slot);
				Err(err.into())
			}
		}
	}

	/// Create a value copy of `source` with its own descriptor slot, sharing the native view. The native view is
	/// released once the last of all copies is destroyed.
	pub fn copy_view(&self, source: Handle) -> Result<Handle, DeviceError<B>> {
		profiling::function_scope!();
		let entry = self.registry.view(source).ok_or(DeviceError::InvalidHandle {
			handle: source,
			category: HandleCategory::View,
		})?;
		let kind = entry.kind().heap_kind();
		let slot = self.page_allocator(kind).allocate()?;
		let result = (|| -> Result<Handle, DeviceError<B>> {
			let dst = self.page_cpu_address(slot)?;
			if let Some(src) = entry.slot {
				let src = self.page_cpu_address(src)?;
				// Safety: both are allocated slots of heaps of kind
				unsafe { self.backend.copy_descriptors(kind, src, dst, 1) };
			}
			Ok(self.registry.register_view_copy(source, Some(slot))?)
		})();
		match result {
			Ok(handle) => {
				self.hooks.init_view(handle, &entry.desc);
				Ok(handle)
			}
			Err(err) => {
				self.free_page_slot(slot);
				Err(err)
			}
		}
	}

	/// # Safety
	/// The GPU must not use the view's descriptor anymore.
	pub unsafe fn destroy_view(&self, handle: Handle) -> Result<(), DeviceError<B>> {
		profiling::function_scope!();
		self.require(handle, HandleCategory::View)?;
		let (entry, last_reference) = self.registry.unregister_view(handle)?;
		self.hooks.destroy_view(handle);
		if last_reference {
			unsafe { self.backend.destroy_view(entry.native) };
		}
		if let Some(slot) = entry.slot {
			self.page_allocator(slot.heap.kind).free(slot)?;
		}
		Ok(())
	}

	/// The resource a view was created from, None if either the view or its resource is gone.
	pub fn resource_from_view(&self, view: Handle) -> Option<Handle> {
		self.registry
			.resolve_view(view)
			.map(|(resource, _)| resource)
			.filter(|resource| self.registry.is_valid(*resource, HandleCategory::Resource))
	}

	pub fn view_desc(&self, view: Handle) -> Option<ViewDesc> {
		self.registry.resolve_view(view).map(|(_, desc)| desc)
	}

	// samplers

	pub fn create_sampler(&self, desc: &SamplerDesc) -> Result<Handle, DeviceError<B>> {
		profiling::function_scope!();
		let slot = self.page_allocator(HeapKind::Sampler).allocate()?;
		let native = self.page_cpu_address(slot).and_then(|descriptor| {
			// Safety: descriptor is the CPU address of the slot we just allocated
			unsafe { self.backend.create_sampler(desc, descriptor) }.map_err(DeviceError::Backend)
		});
		let native = match native {
			Ok(native) => native,
			Err(err) => {
				self.free_page_slot(slot);
				return Err(err);
			}
		};
		match self.registry.register_sampler(native, *desc, Some(slot)) {
			Ok(handle) => Ok(handle),
			Err(err) => {
				unsafe { self.backend.destroy_sampler(native) };
				self.free_page_slot(slot);
				Err(err.into())
			}
		}
	}

	/// # Safety
	/// The GPU must not use the sampler's descriptor anymore.
	pub unsafe fn destroy_sampler(&self, handle: Handle) -> Result<(), DeviceError<B>> {
		self.require(handle, HandleCategory::Sampler)?;
		let entry = self.registry.unregister_sampler(handle)?;
		unsafe { self.backend.destroy_sampler(entry.native) };
		if let Some(slot) = entry.slot {
			self.page_allocator(HeapKind::Sampler).free(slot)?;
		}
		Ok(())
	}

	// descriptor tables

	/// Allocate one shader visible descriptor table per entry of `sizes`. Either all tables are allocated or none.
	/// Transient tables expire at the next [`Self::end_submission`].
	pub fn allocate_descriptor_tables(
		&self,
		kind: HeapKind,
		sizes: &[u32],
		region: Region,
	) -> Result<SmallVec<[Handle; 4]>, DeviceError<B>> {
		profiling::function_scope!();
		let tables = self.table_allocator(kind).ok_or(DeviceError::NoDescriptorTables(kind))?;
		let allocations = tables.allocate_ranges(sizes, region)?;

		let mut handles = SmallVec::<[Handle; 4]>::with_capacity(allocations.len());
		for allocation in &allocations {
			match self.registry.register_descriptor_set(*allocation) {
				Ok(handle) => handles.push(handle),
				Err(err) => {
					for handle in handles {
						let _ = self.registry.unregister_descriptor_set(handle);
					}
					if region == Region::Reserved {
						for allocation in allocations {
							let _ = tables.free(allocation);
						}
					}
					return Err(err.into());
				}
			}
		}
		if region == Region::Transient {
			self.transient_tables.lock().extend(handles.iter().copied());
		}
		Ok(handles)
	}

	/// Free descriptor tables. All handles are checked before anything is freed.
	///
	/// # Safety
	/// The GPU must not read any of the tables anymore.
	pub unsafe fn free_descriptor_tables(&self, handles: &[Handle]) -> Result<(), DeviceError<B>> {
		profiling::function_scope!();
		if let Some(handle) = handles
			.iter()
			.find(|handle| !self.registry.is_valid(**handle, HandleCategory::DescriptorSet))
		{
			return Err(DeviceError::InvalidHandle {
				handle: *handle,
				category: HandleCategory::DescriptorSet,
			});
		}
		let mut unique = HashSet::with_capacity(handles.len());
		if let Some(handle) = handles.iter().find(|handle| !unique.insert(**handle)) {
			return Err(DeviceError::DuplicateHandle(*handle));
		}

		let mut freed_transient = false;
		for handle in handles {
			let entry = self.registry.unregister_descriptor_set(*handle)?;
			let allocation = entry.allocation;
			match allocation.region {
				Region::Reserved => {
					let tables = self
						.table_allocator(allocation.heap().kind)
						.ok_or(DeviceError::NoDescriptorTables(allocation.heap().kind))?;
					tables.free(allocation)?;
				}
				Region::Transient => freed_transient = true,
			}
		}
		if freed_transient {
			self.transient_tables.lock().retain(|handle| !unique.contains(handle));
		}
		Ok(())
	}

	fn table_allocation(&self, table: Handle) -> Result<RangeAllocation, DeviceError<B>> {
		let allocation = self
			.registry
			.resolve_descriptor_set(table)
			.ok_or(DeviceError::InvalidHandle {
				handle: table,
				category: HandleCategory::DescriptorSet,
			})?;
		let current = self
			.table_allocator(allocation.heap().kind)
			.is_some_and(|tables| tables.is_current(&allocation));
		if current {
			Ok(allocation)
		} else {
			Err(DeviceError::ExpiredTable(table))
		}
	}

	/// The slot at `index` within the descriptor table `table`.
	pub fn descriptor_table_slot(&self, table: Handle, index: u32) -> Result<DescriptorSlot, DeviceError<B>> {
		let allocation = self.table_allocation(table)?;
		allocation.slot_at(index).ok_or(DeviceError::TableIndexOutOfRange {
			table,
			index,
			count: allocation.count,
		})
	}

	/// The GPU address of the first descriptor of `table`, to be bound on the native command list.
	pub fn descriptor_table_gpu_address(&self, table: Handle) -> Result<u64, DeviceError<B>> {
		let allocation = self.table_allocation(table)?;
		self.table_allocator(allocation.heap().kind)
			.and_then(|tables| tables.gpu_address(allocation.slot))
			.ok_or(DeviceError::Slot(SlotViolation::ForeignHeap(allocation.heap())))
	}

	/// Map a raw GPU descriptor address back to the descriptor table containing it, and the index within that table.
	pub fn descriptor_table_from_gpu_address(&self, address: u64) -> Option<(Handle, u32)> {
		profiling::function_scope!();
		[&self.view_tables, &self.sampler_tables]
			.into_iter()
			.find_map(|tables| tables.slot_from_gpu_address(address))
			.and_then(|slot| self.registry.descriptor_set_for_slot(slot))
	}

	fn publish(&self, table: Handle, index: u32, src: DescriptorSlot) -> Result<(), DeviceError<B>> {
		let dst = self.descriptor_table_slot(table, index)?;
		if dst.heap.kind != src.heap.kind {
			return Err(DeviceError::HeapKindMismatch {
				descriptor: src.heap.kind,
				table: dst.heap.kind,
			});
		}
		let src_address = self.page_cpu_address(src)?;
		let dst_address = self
			.table_allocator(dst.heap.kind)
			.and_then(|tables| tables.cpu_address(dst))
			.ok_or(DeviceError::Slot(SlotViolation::ForeignHeap(dst.heap)))?;
		// Safety: both addresses are allocated slots of the same kind
		unsafe {
			self.backend
				.copy_descriptors(dst.heap.kind, src_address, dst_address, 1)
		};
		Ok(())
	}

	/// Copy the descriptor of `view` into slot `index` of the descriptor table `table`.
	pub fn publish_view(&self, table: Handle, index: u32, view: Handle) -> Result<(), DeviceError<B>> {
		profiling::function_scope!();
		let invalid = DeviceError::InvalidHandle {
			handle: view,
			category: HandleCategory::View,
		};
		let src = self.registry.view(view).and_then(|entry| entry.slot).ok_or(invalid)?;
		self.publish(table, index, src)
	}

	/// Copy the descriptor of `sampler` into slot `index` of the descriptor table `table`.
	pub fn publish_sampler(&self, table: Handle, index: u32, sampler: Handle) -> Result<(), DeviceError<B>> {
		profiling::function_scope!();
		let invalid = DeviceError::InvalidHandle {
			handle: sampler,
			category: HandleCategory::Sampler,
		};
		let src = self.registry.sampler(sampler).and_then(|entry| entry.slot).ok_or(invalid)?;
		self.publish(table, index, src)
	}

	/// The submission boundary: every transient descriptor table handed out since the last call expires.
	///
	/// # Safety
	/// The GPU must not read any transient descriptor table allocated before this call anymore.
	pub unsafe fn end_submission(&self) {
		profiling::function_scope!();
		let expired = std::mem::take(&mut *self.transient_tables.lock());
		for handle in expired {
			if let Err(err) = self.registry.unregister_descriptor_set(handle) {
				log::error!("failed to expire transient descriptor table: {}", err);
			}
		}
		self.view_tables.reset_bump_region();
		self.sampler_tables.reset_bump_region();
	}
}

impl<B: NativeBackend, H: DeviceHooks<B>> Drop for Device<B, H> {
	fn drop(&mut self) {
		self.hooks.destroy_device(&self.backend);

		let leaked = self.registry.drain();
		if !leaked.resources.is_empty() || !leaked.views.is_empty() || !leaked.samplers.is_empty() {
			log::warn!(
				"device dropped with {} resources, {} views and {} samplers still alive",
				leaked.resources.len(),
				leaked.views.len(),
				leaked.samplers.len()
			);
		}
		// Safety: the device is dropped, nothing can reference these anymore
		unsafe {
			let natives = leaked.views.iter().map(|view| view.native).collect::<HashSet<_>>();
			for view in natives {
				self.backend.destroy_view(view);
			}
			for sampler in leaked.samplers {
				self.backend.destroy_sampler(sampler.native);
			}
			for resource in leaked.resources {
				self.backend.destroy_resource(resource.native);
			}
		}
		// descriptor heaps are released by the allocators, dropped right after
	}
}
