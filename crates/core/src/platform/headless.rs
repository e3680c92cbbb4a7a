//! A backend without any GPU. Native objects are plain counters, device addresses are handed out by a bump pointer and
//! descriptor copies are only recorded. Useful to exercise the registry and allocators in tests.

use crate::descriptor::{DescriptorCounts, DescriptorHeapInfo, HeapKind};
use crate::platform::NativeBackend;
use crate::registry::{ResourceDesc, SamplerDesc, ViewDesc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering::Relaxed;
use thiserror::Error;

pub const HEADLESS_DESCRIPTOR_STRIDE: u32 = 32;
/// Buffers are placed on this alignment, so address ranges of different buffers never touch.
pub const HEADLESS_BUFFER_ALIGNMENT: u64 = 64 * 1024;
const HEADLESS_BUFFER_ADDRESS_START: u64 = 0x1_0000_0000;
const HEADLESS_HEAP_CPU_START: u64 = 0x7f00_0000_0000;
const HEADLESS_HEAP_GPU_START: u64 = 0xd000_0000_0000;

#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq)]
pub struct HeadlessResource(pub u64);

#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq)]
pub struct HeadlessView(pub u64);

#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq)]
pub struct HeadlessSampler(pub u64);

#[derive(Debug)]
pub struct HeadlessHeap {
	pub id: u64,
	pub kind: HeapKind,
	pub capacity: u32,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct DescriptorCopy {
	pub kind: HeapKind,
	pub src: u64,
	pub dst: u64,
	pub count: u32,
}

#[derive(Debug, Error)]
pub enum HeadlessError {
	#[error("Injected failure")]
	InjectedFailure,
	#[error("Resource {0:?} is not alive")]
	DeadResource(HeadlessResource),
}

#[derive(Default)]
struct HeadlessState {
	resources: HashMap<HeadlessResource, (ResourceDesc, Option<u64>)>,
	views: HashMap<HeadlessView, ViewDesc>,
	samplers: HashMap<HeadlessSampler, SamplerDesc>,
	heaps: u32,
	copies: Vec<DescriptorCopy>,
}

pub struct HeadlessBackend {
	limits: DescriptorCounts,
	next_id: AtomicU64,
	next_buffer_address: AtomicU64,
	next_heap_address: AtomicU64,
	fail_creations: AtomicU32,
	state: Mutex<HeadlessState>,
}

impl HeadlessBackend {
	pub fn new() -> Self {
		Self::with_limits(DescriptorCounts::REASONABLE_DEFAULTS)
	}

	pub fn with_limits(limits: DescriptorCounts) -> Self {
		Self {
			limits,
			next_id: AtomicU64::new(1),
			next_buffer_address: AtomicU64::new(HEADLESS_BUFFER_ADDRESS_START),
			next_heap_address: AtomicU64::new(0),
			fail_creations: AtomicU32::new(0),
			state: Mutex::new(HeadlessState::default()),
		}
	}

	/// Let the next `count` creation calls of any kind fail.
	pub fn fail_next_creations(&self, count: u32) {
		self.fail_creations.store(count, Relaxed);
	}

	fn should_fail(&self) -> bool {
		self.fail_creations
			.fetch_update(Relaxed, Relaxed, |left| left.checked_sub(1))
			.is_ok()
	}

	fn next_id(&self) -> u64 {
		self.next_id.fetch_add(1, Relaxed)
	}

	pub fn live_resources(&self) -> usize {
		self.state.lock().resources.len()
	}

	pub fn live_views(&self) -> usize {
		self.state.lock().views.len()
	}

	pub fn live_samplers(&self) -> usize {
		self.state.lock().samplers.len()
	}

	pub fn live_heaps(&self) -> u32 {
		self.state.lock().heaps
	}

	pub fn descriptor_copies(&self) -> Vec<DescriptorCopy> {
		self.state.lock().copies.clone()
	}
}

impl Default for HeadlessBackend {
	fn default() -> Self {
		Self::new()
	}
}

unsafe impl NativeBackend for HeadlessBackend {
	type Resource = HeadlessResource;
	type View = HeadlessView;
	type Sampler = HeadlessSampler;
	type DescriptorHeap = HeadlessHeap;
	type Error = HeadlessError;

	fn descriptor_limits(&self) -> DescriptorCounts {
		self.limits
	}

	unsafe fn create_descriptor_heap(
		&self,
		kind: HeapKind,
		capacity: u32,
		shader_visible: bool,
	) -> Result<(Self::DescriptorHeap, DescriptorHeapInfo), Self::Error> {
		if self.should_fail() {
			return Err(HeadlessError::InjectedFailure);
		}
		let size = (capacity as u64 * HEADLESS_DESCRIPTOR_STRIDE as u64).next_multiple_of(HEADLESS_BUFFER_ALIGNMENT);
		let relative = self.next_heap_address.fetch_add(size, Relaxed);
		let info = DescriptorHeapInfo {
			cpu_start: HEADLESS_HEAP_CPU_START + relative,
			gpu_start: shader_visible.then_some(HEADLESS_HEAP_GPU_START + relative),
			stride: HEADLESS_DESCRIPTOR_STRIDE,
		};
		self.state.lock().heaps += 1;
		let heap = HeadlessHeap {
			id: self.next_id(),
			kind,
			capacity,
		};
		Ok((heap, info))
	}

	unsafe fn destroy_descriptor_heap(&self, _heap: Self::DescriptorHeap) {
		self.state.lock().heaps -= 1;
	}

	unsafe fn create_resource(&self, desc: &ResourceDesc) -> Result<Self::Resource, Self::Error> {
		if self.should_fail() {
			return Err(HeadlessError::InjectedFailure);
		}
		let address = desc.byte_len().map(|len| {
			let size = len.max(1).next_multiple_of(HEADLESS_BUFFER_ALIGNMENT);
			self.next_buffer_address.fetch_add(size, Relaxed)
		});
		let resource = HeadlessResource(self.next_id());
		self.state.lock().resources.insert(resource, (*desc, address));
		Ok(resource)
	}

	unsafe fn destroy_resource(&self, resource: Self::Resource) {
		let removed = self.state.lock().resources.remove(&resource);
		assert!(removed.is_some(), "destroyed dead resource {:?}", resource);
	}

	fn describe_resource(&self, resource: Self::Resource) -> ResourceDesc {
		self.state.lock().resources[&resource].0
	}

	fn resource_gpu_address(&self, resource: Self::Resource) -> Option<u64> {
		self.state.lock().resources.get(&resource).and_then(|(_, address)| *address)
	}

	unsafe fn create_view(
		&self,
		resource: Self::Resource,
		desc: &ViewDesc,
		_descriptor: u64,
	) -> Result<Self::View, Self::Error> {
		if self.should_fail() {
			return Err(HeadlessError::InjectedFailure);
		}
		let mut state = self.state.lock();
		if !state.resources.contains_key(&resource) {
			return Err(HeadlessError::DeadResource(resource));
		}
		let view = HeadlessView(self.next_id());
		state.views.insert(view, *desc);
		Ok(view)
	}

	unsafe fn destroy_view(&self, view: Self::View) {
		let removed = self.state.lock().views.remove(&view);
		assert!(removed.is_some(), "destroyed dead view {:?}", view);
	}

	fn describe_view(&self, view: Self::View) -> ViewDesc {
		self.state.lock().views[&view]
	}

	unsafe fn create_sampler(&self, desc: &SamplerDesc, _descriptor: u64) -> Result<Self::Sampler, Self::Error> {
		if self.should_fail() {
			return Err(HeadlessError::InjectedFailure);
		}
		let sampler = HeadlessSampler(self.next_id());
		self.state.lock().samplers.insert(sampler, *desc);
		Ok(sampler)
	}

	unsafe fn destroy_sampler(&self, sampler: Self::Sampler) {
		let removed = self.state.lock().samplers.remove(&sampler);
		assert!(removed.is_some(), "destroyed dead sampler {:?}", sampler);
	}

	unsafe fn copy_descriptors(&self, kind: HeapKind, src: u64, dst: u64, count: u32) {
		self.state.lock().copies.push(DescriptorCopy { kind, src, dst, count });
	}
}
