use crate::address::AddressRange;
use crate::descriptor::{DescriptorSlot, RangeAllocation};
use crate::registry::{ResourceDesc, SamplerDesc, ViewDesc, ViewKind};
use gpu_shim_handle::Handle;

/// Cached metadata of a resource. `native` is a non-owning reference, the driver object is owned by whoever created it.
#[derive(Clone, Debug)]
pub struct RegisteredResource<R> {
	pub handle: Handle,
	pub native: R,
	pub desc: ResourceDesc,
	/// the device-visible address range, only for buffers
	pub address: Option<AddressRange>,
	pub name: Option<String>,
}

#[derive(Clone, Debug)]
pub struct RegisteredView<V, R> {
	pub handle: Handle,
	pub native: V,
	/// the owning resource as it was when the view was registered
	pub resource: Handle,
	pub resource_native: R,
	pub desc: ViewDesc,
	/// the CPU descriptor written when the view was created
	pub slot: Option<DescriptorSlot>,
}

impl<V, R> RegisteredView<V, R> {
	#[inline]
	pub fn kind(&self) -> ViewKind {
		self.desc.kind
	}
}

#[derive(Clone, Debug)]
pub struct RegisteredSampler<S> {
	pub handle: Handle,
	pub native: S,
	pub desc: SamplerDesc,
	pub slot: Option<DescriptorSlot>,
}

/// A table of descriptors in a GPU-visible heap.
#[derive(Copy, Clone, Debug)]
pub struct RegisteredDescriptorSet {
	pub handle: Handle,
	pub allocation: RangeAllocation,
}
