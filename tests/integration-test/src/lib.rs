use gpu_shim_core::descriptor::DescriptorCounts;
use gpu_shim_core::device::{Device, NoHooks};
use gpu_shim_core::platform::headless::HeadlessBackend;

pub mod address_translation;
pub mod concurrency;
pub mod descriptor_tables;
pub mod lifecycle;

/// Small capacities, so tests run into heap growth and exhaustion quickly.
pub const TEST_COUNTS: DescriptorCounts = DescriptorCounts {
	cpu_heap_capacity: 16,
	view_reserved: 8,
	view_transient: 8,
	sampler_reserved: 4,
	sampler_transient: 4,
	max_heaps_per_kind: 4,
};

pub fn init_logger() {
	let _ = env_logger::builder().is_test(true).try_init();
}

pub fn headless_device(counts: DescriptorCounts) -> Device<HeadlessBackend> {
	init_logger();
	Device::new(HeadlessBackend::with_limits(DescriptorCounts::REASONABLE_DEFAULTS), counts, NoHooks)
}
