use crate::descriptor::HeapKind;
use crate::platform::NativeBackend;

/// Capacities of every descriptor heap the device creates.
///
/// CPU heaps are handed out by the page allocator one descriptor at a time, GPU-visible heaps are split into a reserved
/// region followed by a transient region.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct DescriptorCounts {
	/// descriptors per CPU-only heap, for every [`HeapKind`]
	pub cpu_heap_capacity: u32,
	pub view_reserved: u32,
	pub view_transient: u32,
	pub sampler_reserved: u32,
	pub sampler_transient: u32,
	/// how many heaps a single allocator may create, CPU-only and GPU-visible heaps of a kind are counted separately
	pub max_heaps_per_kind: u32,
}

impl DescriptorCounts {
	pub fn limits<B: NativeBackend>(backend: &B) -> Self {
		backend.descriptor_limits()
	}

	pub const REASONABLE_DEFAULTS: Self = DescriptorCounts {
		cpu_heap_capacity: 128,
		view_reserved: 50_000,
		view_transient: 2048,
		sampler_reserved: 128,
		sampler_transient: 128,
		max_heaps_per_kind: 4,
	};

	pub fn reasonable_defaults<B: NativeBackend>(backend: &B) -> Self {
		Self::REASONABLE_DEFAULTS.min(Self::limits(backend))
	}

	pub fn assert_within_limits<B: NativeBackend>(&self, backend: &B) {
		let limit = DescriptorCounts::limits(backend);
		assert!(
			self.is_within_limit(limit),
			"{:?} must be within limit of {:?}",
			self,
			limit
		);
	}

	pub fn is_within_limit(&self, limit: Self) -> bool {
		// just to make sure this is updated as well
		let DescriptorCounts {
			cpu_heap_capacity,
			view_reserved,
			view_transient,
			sampler_reserved,
			sampler_transient,
			max_heaps_per_kind,
		} = *self;
		// widened, so huge counts are rejected instead of overflowing
		let sum = |a: u32, b: u32| a as u64 + b as u64;
		cpu_heap_capacity <= limit.cpu_heap_capacity
			&& sum(view_reserved, view_transient) <= sum(limit.view_reserved, limit.view_transient)
			&& view_transient <= limit.view_transient
			&& sum(sampler_reserved, sampler_transient) <= sum(limit.sampler_reserved, limit.sampler_transient)
			&& sampler_transient <= limit.sampler_transient
			&& max_heaps_per_kind <= limit.max_heaps_per_kind
	}

	pub fn min(self, other: Self) -> Self {
		Self {
			cpu_heap_capacity: self.cpu_heap_capacity.min(other.cpu_heap_capacity),
			view_reserved: self.view_reserved.min(other.view_reserved),
			view_transient: self.view_transient.min(other.view_transient),
			sampler_reserved: self.sampler_reserved.min(other.sampler_reserved),
			sampler_transient: self.sampler_transient.min(other.sampler_transient),
			max_heaps_per_kind: self.max_heaps_per_kind.min(other.max_heaps_per_kind),
		}
	}

	/// Reserved and transient capacity of a GPU-visible heap of `kind`, or None if `kind` has no GPU-visible heaps.
	pub fn gpu_region_capacities(&self, kind: HeapKind) -> Option<(u32, u32)> {
		match kind {
			HeapKind::View => Some((self.view_reserved, self.view_transient)),
			HeapKind::Sampler => Some((self.sampler_reserved, self.sampler_transient)),
			HeapKind::RenderTarget | HeapKind::DepthStencil => None,
		}
	}
}
