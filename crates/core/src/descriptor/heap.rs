/// The class of descriptors a heap stores. Descriptors of different kinds have different native capacity limits and
/// can never share a heap.
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub enum HeapKind {
	/// shader resource, unordered access and constant buffer views
	View,
	Sampler,
	/// only exists in CPU-only heaps
	RenderTarget,
	/// only exists in CPU-only heaps
	DepthStencil,
}

impl HeapKind {
	pub const VALUES: [HeapKind; 4] = [
		HeapKind::View,
		HeapKind::Sampler,
		HeapKind::RenderTarget,
		HeapKind::DepthStencil,
	];

	/// Whether descriptors of this kind may live in a shader-visible heap
	pub const fn is_shader_visible(&self) -> bool {
		matches!(self, HeapKind::View | HeapKind::Sampler)
	}

	pub const fn name(&self) -> &'static str {
		match self {
			HeapKind::View => "view",
			HeapKind::Sampler => "sampler",
			HeapKind::RenderTarget => "render target",
			HeapKind::DepthStencil => "depth stencil",
		}
	}
}

/// Identifies a descriptor heap created by one of the allocators. The `index` is the position within the allocator's
/// heap list, which never shrinks, so a `HeapId` stays valid for the allocator's lifetime.
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct HeapId {
	pub kind: HeapKind,
	pub shader_visible: bool,
	pub index: u32,
}

/// Native addresses of a descriptor heap as reported by the backend.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct DescriptorHeapInfo {
	/// address of the first descriptor as seen by the CPU
	pub cpu_start: u64,
	/// address of the first descriptor as seen by the GPU, only for shader-visible heaps
	pub gpu_start: Option<u64>,
	/// distance in bytes between two consecutive descriptors
	pub stride: u32,
}

impl DescriptorHeapInfo {
	#[inline]
	pub fn cpu_address(&self, offset: u32) -> u64 {
		self.cpu_start + offset as u64 * self.stride as u64
	}

	#[inline]
	pub fn gpu_address(&self, offset: u32) -> Option<u64> {
		self.gpu_start.map(|start| start + offset as u64 * self.stride as u64)
	}

	/// The offset of the descriptor at GPU address `address`, if it lies within the first `capacity` descriptors and
	/// is aligned to a descriptor boundary.
	pub fn gpu_offset_of(&self, address: u64, capacity: u32) -> Option<u32> {
		let start = self.gpu_start?;
		let relative = address.checked_sub(start)?;
		let stride = self.stride as u64;
		if stride == 0 || relative % stride != 0 {
			return None;
		}
		let offset = relative / stride;
		(offset < capacity as u64).then_some(offset as u32)
	}
}
