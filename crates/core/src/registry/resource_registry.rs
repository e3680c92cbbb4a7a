use crate::address::{AddressRange, AddressResolver};
use crate::backing::table::HandleTable;
use crate::descriptor::{DescriptorSlot, HeapId, RangeAllocation};
use crate::platform::NativeBackend;
use crate::registry::{
	RegisteredDescriptorSet, RegisteredResource, RegisteredSampler, RegisteredView, RegistryError, ResourceDesc,
	SamplerDesc, ViewDesc,
};
use gpu_shim_handle::{Handle, HandleCategory};
use parking_lot::RwLock;
use smallvec::SmallVec;
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;

pub type ResourceEntry<B> = RegisteredResource<<B as NativeBackend>::Resource>;
pub type ViewEntry<B> = RegisteredView<<B as NativeBackend>::View, <B as NativeBackend>::Resource>;
pub type SamplerEntry<B> = RegisteredSampler<<B as NativeBackend>::Sampler>;

/// The identity registry: maps opaque handles to the native objects and cached metadata behind them.
///
/// All maps sit behind a single reader/writer lock. Lookups only take it shared, so concurrent lookups from recording
/// threads never block each other, while registration and unregistration are exclusive. The [`AddressResolver`] has
/// its own lock, which is only ever taken while already holding the map lock, never the other way around.
pub struct Registry<B: NativeBackend> {
	maps: RwLock<RegistryMaps<B>>,
	resolver: AddressResolver,
}

struct RegistryMaps<B: NativeBackend> {
	resources: HandleTable<ResourceEntry<B>>,
	views: HandleTable<ViewEntry<B>>,
	samplers: HandleTable<SamplerEntry<B>>,
	descriptor_sets: HandleTable<RegisteredDescriptorSet>,
	/// the view whose descriptor occupies a CPU slot, latest registration wins
	slot_to_view: HashMap<(HeapId, u32), Handle>,
	/// descriptor sets keyed by their first slot
	sets_by_base: BTreeMap<(HeapId, u32), Handle>,
	/// views registered against a resource
	dependents: HashMap<Handle, SmallVec<[Handle; 4]>>,
	/// number of registered views per native view, copies share their source's native view
	native_views: HashMap<B::View, u32>,
}

/// Everything that was still registered when the registry was drained.
pub struct DrainedEntries<B: NativeBackend> {
	pub resources: Vec<ResourceEntry<B>>,
	pub views: Vec<ViewEntry<B>>,
	pub samplers: Vec<SamplerEntry<B>>,
	pub descriptor_sets: Vec<RegisteredDescriptorSet>,
}

impl<B: NativeBackend> DrainedEntries<B> {
	pub fn is_empty(&self) -> bool {
		self.resources.is_empty() && self.views.is_empty() && self.samplers.is_empty() && self.descriptor_sets.is_empty()
	}
}

impl<B: NativeBackend> RegistryMaps<B> {
	fn remember_view(&mut self, view: Handle, resource: Handle, native: B::View, slot: Option<DescriptorSlot>) {
		if let Some(slot) = slot {
			self.slot_to_view.insert(slot.location(), view);
		}
		self.dependents.entry(resource).or_default().push(view);
		*self.native_views.entry(native).or_default() += 1;
	}

	/// Returns true if no other registered view references the native view anymore.
	fn forget_view(&mut self, view: &ViewEntry<B>) -> bool {
		if let Some(slot) = view.slot {
			if self.slot_to_view.get(&slot.location()) == Some(&view.handle) {
				self.slot_to_view.remove(&slot.location());
			}
		}
		if let Some(dependents) = self.dependents.get_mut(&view.resource) {
			dependents.retain(|h| *h != view.handle);
			if dependents.is_empty() {
				self.dependents.remove(&view.resource);
			}
		}
		match self.native_views.get_mut(&view.native) {
			Some(count) if *count > 1 => {
				*count -= 1;
				false
			}
			_ => {
				self.native_views.remove(&view.native);
				true
			}
		}
	}
}

impl<B: NativeBackend> Default for Registry<B> {
	fn default() -> Self {
		Self::new()
	}
}

impl<B: NativeBackend> Registry<B> {
	pub fn new() -> Self {
		Self {
			maps: RwLock::new(RegistryMaps {
				resources: HandleTable::new(HandleCategory::Resource),
				views: HandleTable::new(HandleCategory::View),
				samplers: HandleTable::new(HandleCategory::Sampler),
				descriptor_sets: HandleTable::new(HandleCategory::DescriptorSet),
				slot_to_view: HashMap::new(),
				sets_by_base: BTreeMap::new(),
				dependents: HashMap::new(),
				native_views: HashMap::new(),
			}),
			resolver: AddressResolver::new(),
		}
	}

	#[inline]
	pub fn resolver(&self) -> &AddressResolver {
		&self.resolver
	}

	/// Whether `handle` is a live handle of `category`. The null handle and handles of other categories are rejected
	/// without taking any lock.
	pub fn is_valid(&self, handle: Handle, category: HandleCategory) -> bool {
		if handle.is_null() || !handle.is_category(category) {
			return false;
		}
		let maps = self.maps.read();
		match category {
			HandleCategory::Resource => maps.resources.contains(handle),
			HandleCategory::View => maps.views.contains(handle),
			HandleCategory::Sampler => maps.samplers.contains(handle),
			HandleCategory::DescriptorSet => maps.descriptor_sets.contains(handle),
			HandleCategory::Pipeline => false,
		}
	}

	// resources

	/// Register a native resource. If the resource has a device-visible address, its range is indexed in the
	/// [`AddressResolver`] as part of the same exclusive section, so no lookup sees the handle without its range.
	pub fn register_resource(
		&self,
		native: B::Resource,
		desc: ResourceDesc,
		gpu_address: Option<u64>,
	) -> Result<Handle, RegistryError> {
		profiling::function_scope!();
		let address = gpu_address
			.zip(desc.byte_len())
			.filter(|(_, len)| *len > 0)
			.map(|(base, len)| AddressRange { base, len });

		let mut maps = self.maps.write();
		let handle = maps
			.resources
			.insert_with(|handle| RegisteredResource {
				handle,
				native,
				desc,
				address,
				name: None,
			})
			.map_err(|err| RegistryError::from(err).report())?;
		if let Some(address) = address {
			if let Err(err) = self.resolver.register_range(address.base, address.len, handle) {
				maps.resources.remove(handle);
				return Err(RegistryError::from(err).report());
			}
		}
		log::trace!("registered resource {:?} as {:?}", native, handle);
		Ok(handle)
	}

	/// Remove a resource and its address range. Views still registered against it stay registered, but their owner
	/// no longer resolves.
	pub fn unregister_resource(&self, handle: Handle) -> Result<ResourceEntry<B>, RegistryError> {
		profiling::function_scope!();
		let mut maps = self.maps.write();
		let entry = maps.resources.remove(handle).ok_or_else(|| {
			RegistryError::NotRegistered {
				handle,
				category: HandleCategory::Resource,
			}
			.report()
		})?;
		if let Some(address) = entry.address {
			if let Err(err) = self.resolver.unregister_range(address.base) {
				log::error!("address range of {:?} was already gone: {}", handle, err);
			}
		}
		if let Some(dependents) = maps.dependents.remove(&handle) {
			log::warn!(
				"unregistered resource {:?} while {} views still reference it",
				handle,
				dependents.len()
			);
		}
		log::trace!("unregistered resource {:?}", handle);
		Ok(entry)
	}

	pub fn resolve_resource(&self, handle: Handle) -> Option<ResourceDesc> {
		self.maps.read().resources.get(handle).map(|entry| entry.desc)
	}

	pub fn resource(&self, handle: Handle) -> Option<ResourceEntry<B>> {
		self.maps.read().resources.get(handle).cloned()
	}

	pub fn native_resource(&self, handle: Handle) -> Option<B::Resource> {
		self.maps.read().resources.get(handle).map(|entry| entry.native)
	}

	pub fn set_resource_name(&self, handle: Handle, name: impl Into<String>) -> Result<(), RegistryError> {
		let mut maps = self.maps.write();
		let entry = maps.resources.get_mut(handle).ok_or(RegistryError::NotRegistered {
			handle,
			category: HandleCategory::Resource,
		})?;
		entry.name = Some(name.into());
		Ok(())
	}

	pub fn resource_name(&self, handle: Handle) -> Option<String> {
		self.maps.read().resources.get(handle).and_then(|entry| entry.name.clone())
	}

	/// The resource whose device-visible memory contains `address`, and the offset into it.
	pub fn resource_from_address(&self, address: u64) -> Option<(Handle, u64)> {
		self.resolver.resolve(address)
	}

	// views

	/// Register a view of `owner`. The owner is checked under the same exclusive section the view is inserted in, so
	/// a concurrent unregistration of the owner either happens before and fails this call, or after.
	pub fn register_view(
		&self,
		native: B::View,
		owner: Handle,
		desc: ViewDesc,
		slot: Option<DescriptorSlot>,
	) -> Result<Handle, RegistryError> {
		profiling::function_scope!();
		if !owner.is_category(HandleCategory::Resource) {
			return Err(RegistryError::InvalidOwner(owner).report());
		}
		let mut maps = self.maps.write();
		let resource_native = maps
			.resources
			.get(owner)
			.map(|resource| resource.native)
			.ok_or_else(|| RegistryError::InvalidOwner(owner).report())?;
		let handle = maps
			.views
			.insert_with(|handle| RegisteredView {
				handle,
				native,
				resource: owner,
				resource_native,
				desc,
				slot,
			})
			.map_err(|err| RegistryError::from(err).report())?;
		maps.remember_view(handle, owner, native, slot);
		log::trace!("registered view {:?} of {:?} as {:?}", native, owner, handle);
		Ok(handle)
	}

	/// Register a copy of the view `source` under a new handle. The new entry is a value copy sharing the native view
	/// of `source`, unregistering either one leaves the other untouched. With `slot` set to None the copy aliases the
	/// descriptor slot of `source`.
	pub fn register_view_copy(&self, source: Handle, slot: Option<DescriptorSlot>) -> Result<Handle, RegistryError> {
		profiling::function_scope!();
		let mut maps = self.maps.write();
		let mut copy = maps.views.get(source).cloned().ok_or_else(|| {
			RegistryError::NotRegistered {
				handle: source,
				category: HandleCategory::View,
			}
			.report()
		})?;
		if !maps.resources.contains(copy.resource) {
			return Err(RegistryError::InvalidOwner(copy.resource).report());
		}
		copy.slot = slot.or(copy.slot);
		let handle = maps
			.views
			.insert_with(|handle| RegisteredView { handle, ..copy.clone() })
			.map_err(|err| RegistryError::from(err).report())?;
		// an alias does not take over the slot of its source
		maps.remember_view(handle, copy.resource, copy.native, slot);
		log::trace!("registered copy {:?} of view {:?}", handle, source);
		Ok(handle)
	}

	/// Remove a view. The returned flag is true if this was the last registered view referencing its native view, so
	/// the native view may be released.
	pub fn unregister_view(&self, handle: Handle) -> Result<(ViewEntry<B>, bool), RegistryError> {
		profiling::function_scope!();
		let mut maps = self.maps.write();
		let entry = maps.views.remove(handle).ok_or_else(|| {
			RegistryError::NotRegistered {
				handle,
				category: HandleCategory::View,
			}
			.report()
		})?;
		let last_reference = maps.forget_view(&entry);
		log::trace!("unregistered view {:?}", handle);
		Ok((entry, last_reference))
	}

	/// The owning resource and description of a view.
	pub fn resolve_view(&self, handle: Handle) -> Option<(Handle, ViewDesc)> {
		self.maps.read().views.get(handle).map(|entry| (entry.resource, entry.desc))
	}

	pub fn view(&self, handle: Handle) -> Option<ViewEntry<B>> {
		self.maps.read().views.get(handle).cloned()
	}

	pub fn native_view(&self, handle: Handle) -> Option<B::View> {
		self.maps.read().views.get(handle).map(|entry| entry.native)
	}

	/// The view whose descriptor occupies `(heap, offset)`.
	pub fn view_for_slot(&self, heap: HeapId, offset: u32) -> Option<Handle> {
		self.maps.read().slot_to_view.get(&(heap, offset)).copied()
	}

	/// All views currently registered against `resource`.
	pub fn views_of(&self, resource: Handle) -> SmallVec<[Handle; 4]> {
		self.maps
			.read()
			.dependents
			.get(&resource)
			.cloned()
			.unwrap_or_default()
	}

	// samplers

	pub fn register_sampler(
		&self,
		native: B::Sampler,
		desc: SamplerDesc,
		slot: Option<DescriptorSlot>,
	) -> Result<Handle, RegistryError> {
		let mut maps = self.maps.write();
		let handle = maps
			.samplers
			.insert_with(|handle| RegisteredSampler {
				handle,
				native,
				desc,
				slot,
			})
			.map_err(|err| RegistryError::from(err).report())?;
		log::trace!("registered sampler {:?} as {:?}", native, handle);
		Ok(handle)
	}

	pub fn unregister_sampler(&self, handle: Handle) -> Result<SamplerEntry<B>, RegistryError> {
		self.maps.write().samplers.remove(handle).ok_or_else(|| {
			RegistryError::NotRegistered {
				handle,
				category: HandleCategory::Sampler,
			}
			.report()
		})
	}

	pub fn resolve_sampler(&self, handle: Handle) -> Option<SamplerDesc> {
		self.maps.read().samplers.get(handle).map(|entry| entry.desc)
	}

	pub fn sampler(&self, handle: Handle) -> Option<SamplerEntry<B>> {
		self.maps.read().samplers.get(handle).cloned()
	}

	// descriptor sets

	pub fn register_descriptor_set(&self, allocation: RangeAllocation) -> Result<Handle, RegistryError> {
		let mut maps = self.maps.write();
		let handle = maps
			.descriptor_sets
			.insert_with(|handle| RegisteredDescriptorSet { handle, allocation })
			.map_err(|err| RegistryError::from(err).report())?;
		maps.sets_by_base
			.insert((allocation.heap(), allocation.base_offset()), handle);
		Ok(handle)
	}

	pub fn unregister_descriptor_set(&self, handle: Handle) -> Result<RegisteredDescriptorSet, RegistryError> {
		let mut maps = self.maps.write();
		let entry = maps.descriptor_sets.remove(handle).ok_or_else(|| {
			RegistryError::NotRegistered {
				handle,
				category: HandleCategory::DescriptorSet,
			}
			.report()
		})?;
		let key = (entry.allocation.heap(), entry.allocation.base_offset());
		if maps.sets_by_base.get(&key) == Some(&handle) {
			maps.sets_by_base.remove(&key);
		}
		Ok(entry)
	}

	pub fn resolve_descriptor_set(&self, handle: Handle) -> Option<RangeAllocation> {
		self.maps
			.read()
			.descriptor_sets
			.get(handle)
			.map(|entry| entry.allocation)
	}

	/// The descriptor set containing `slot` and the index of `slot` within it. The generation of `slot` must match
	/// the set's, so a slot of a reset or freed table does not resolve to a newer table at the same offsets.
	pub fn descriptor_set_for_slot(&self, slot: DescriptorSlot) -> Option<(Handle, u32)> {
		let maps = self.maps.read();
		let (_, handle) = maps
			.sets_by_base
			.range((Bound::Included((slot.heap, 0)), Bound::Included(slot.location())))
			.next_back()?;
		let allocation = maps.descriptor_sets.get(*handle)?.allocation;
		let index = slot.offset - allocation.base_offset();
		(index < allocation.count && allocation.slot.generation == slot.generation).then_some((*handle, index))
	}

	/// Unregister everything at once, including all address ranges.
	pub fn drain(&self) -> DrainedEntries<B> {
		let mut maps = self.maps.write();
		let drained = DrainedEntries {
			resources: maps.resources.drain(),
			views: maps.views.drain(),
			samplers: maps.samplers.drain(),
			descriptor_sets: maps.descriptor_sets.drain(),
		};
		for address in drained.resources.iter().filter_map(|entry| entry.address) {
			if let Err(err) = self.resolver.unregister_range(address.base) {
				log::error!("address range {:?} was already gone: {}", address, err);
			}
		}
		maps.slot_to_view.clear();
		maps.sets_by_base.clear();
		maps.dependents.clear();
		maps.native_views.clear();
		drained
	}

	// counts

	pub fn resource_count(&self) -> usize {
		self.maps.read().resources.len()
	}

	pub fn view_count(&self) -> usize {
		self.maps.read().views.len()
	}

	pub fn sampler_count(&self) -> usize {
		self.maps.read().samplers.len()
	}

	pub fn descriptor_set_count(&self) -> usize {
		self.maps.read().descriptor_sets.len()
	}

	/// Number of registered entries of all categories.
	pub fn len(&self) -> usize {
		let maps = self.maps.read();
		maps.resources.len() + maps.views.len() + maps.samplers.len() + maps.descriptor_sets.len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}
