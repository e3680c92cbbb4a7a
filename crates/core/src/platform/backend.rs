use crate::descriptor::{DescriptorCounts, DescriptorHeapInfo, HeapKind};
use crate::registry::{ResourceDesc, SamplerDesc, ViewDesc};
use std::error::Error;
use std::fmt::Debug;
use std::hash::Hash;

/// A non-owning identifier of a native driver object. The driver owns the object, the registry only remembers which
/// one a handle refers to.
pub trait NativeObject: Copy + Eq + Hash + Debug + Send + Sync + 'static {}

impl<T: Copy + Eq + Hash + Debug + Send + Sync + 'static> NativeObject for T {}

/// The capabilities a native graphics API has to provide. The registry and allocators only ever talk to the driver
/// through this trait.
///
/// # Safety
/// * `create_*` must return objects that stay valid until passed to the matching `destroy_*`.
/// * `resource_gpu_address` ranges of live buffers must never overlap.
/// * descriptor heap addresses must stay fixed for the heap's lifetime.
pub unsafe trait NativeBackend: Sized + Send + Sync + 'static {
	type Resource: NativeObject;
	type View: NativeObject;
	type Sampler: NativeObject;
	type DescriptorHeap: 'static + Send + Sync;
	type Error: 'static + Error + Send + Sync;

	/// Highest capacities the device supports on its current feature tier.
	fn descriptor_limits(&self) -> DescriptorCounts;

	/// Create a heap of `capacity` descriptors of `kind`.
	///
	/// # Safety
	/// `shader_visible` may only be true if [`HeapKind::is_shader_visible`].
	unsafe fn create_descriptor_heap(
		&self,
		kind: HeapKind,
		capacity: u32,
		shader_visible: bool,
	) -> Result<(Self::DescriptorHeap, DescriptorHeapInfo), Self::Error>;

	/// # Safety
	/// No descriptor of this heap may be in use by the GPU anymore.
	unsafe fn destroy_descriptor_heap(&self, heap: Self::DescriptorHeap);

	unsafe fn create_resource(&self, desc: &ResourceDesc) -> Result<Self::Resource, Self::Error>;

	/// # Safety
	/// The resource must not be used by the GPU anymore and must not be accessed afterward.
	unsafe fn destroy_resource(&self, resource: Self::Resource);

	/// Query the description of a live resource.
	fn describe_resource(&self, resource: Self::Resource) -> ResourceDesc;

	/// The device-visible address of a live resource, if it has one. Only buffers have a device-visible address.
	fn resource_gpu_address(&self, resource: Self::Resource) -> Option<u64>;

	/// Create a view of `resource` and write its descriptor to the CPU descriptor at `descriptor`.
	///
	/// # Safety
	/// `descriptor` must be the CPU address of an allocated slot of the heap kind matching `desc.kind`.
	unsafe fn create_view(
		&self,
		resource: Self::Resource,
		desc: &ViewDesc,
		descriptor: u64,
	) -> Result<Self::View, Self::Error>;

	/// # Safety
	/// The view must not be used by the GPU anymore and must not be accessed afterward.
	unsafe fn destroy_view(&self, view: Self::View);

	fn describe_view(&self, view: Self::View) -> ViewDesc;

	/// Create a sampler and write its descriptor to the CPU descriptor at `descriptor`.
	///
	/// # Safety
	/// `descriptor` must be the CPU address of an allocated sampler slot.
	unsafe fn create_sampler(&self, desc: &SamplerDesc, descriptor: u64) -> Result<Self::Sampler, Self::Error>;

	/// # Safety
	/// The sampler must not be used by the GPU anymore and must not be accessed afterward.
	unsafe fn destroy_sampler(&self, sampler: Self::Sampler);

	/// Copy `count` descriptors of `kind` from the CPU addresses starting at `src` to the ones starting at `dst`.
	///
	/// # Safety
	/// Both ranges must be allocated slots of heaps of `kind`, and `dst` must not be read by the GPU concurrently.
	unsafe fn copy_descriptors(&self, kind: HeapKind, src: u64, dst: u64, count: u32);
}
