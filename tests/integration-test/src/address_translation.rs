#![cfg(test)]

use crate::{headless_device, init_logger, TEST_COUNTS};
use gpu_shim_core::address::AddressResolver;
use gpu_shim_core::handle::HandleCategory;
use gpu_shim_core::platform::headless::{HeadlessBackend, HeadlessResource, HEADLESS_BUFFER_ALIGNMENT};
use gpu_shim_core::registry::{Registry, ResourceDesc, ResourceUsage};

#[test]
fn test_resolve_registered_range() -> anyhow::Result<()> {
	init_logger();
	let registry = Registry::<HeadlessBackend>::new();
	let r = registry.register_resource(
		HeadlessResource(7),
		ResourceDesc::buffer(256, ResourceUsage::CONSTANT_BUFFER),
		Some(0x1000),
	)?;
	assert_eq!(registry.resource_from_address(0x1080), Some((r, 0x80)));

	registry.unregister_resource(r)?;
	assert_eq!(registry.resource_from_address(0x1080), None);
	assert!(!registry.is_valid(r, HandleCategory::Resource));
	Ok(())
}

#[test]
fn test_resolve_device_buffers() -> anyhow::Result<()> {
	let device = headless_device(TEST_COUNTS);
	let sizes = [16u64, 1000, 64 * 1024, 100_000, 1];
	let buffers = sizes
		.iter()
		.map(|size| device.create_resource(&ResourceDesc::buffer(*size, ResourceUsage::VERTEX_BUFFER)))
		.collect::<Result<Vec<_>, _>>()?;

	let ranges = buffers
		.iter()
		.map(|buffer| device.registry().resource(*buffer).and_then(|entry| entry.address).unwrap())
		.collect::<Vec<_>>();
	for ((buffer, range), size) in buffers.iter().zip(&ranges).zip(sizes) {
		assert_eq!(range.len, size);
		assert_eq!(device.resolve_gpu_address(range.base), Some((*buffer, 0)));
		assert_eq!(device.resolve_gpu_address(range.base + size - 1), Some((*buffer, size - 1)));
		// buffers are placed on a coarse alignment, so there is a gap behind every buffer not filling it
		if size % HEADLESS_BUFFER_ALIGNMENT != 0 {
			assert_eq!(device.resolve_gpu_address(range.end()), None);
		}
	}

	// textures never show up in the address index
	device.create_resource(&ResourceDesc::texture_2d(
		64,
		64,
		1,
		Default::default(),
		ResourceUsage::SHADER_RESOURCE,
	))?;
	assert_eq!(device.registry().resolver().len(), buffers.len());

	unsafe { device.destroy_resource(buffers[1])? };
	assert_eq!(device.resolve_gpu_address(ranges[1].base + 10), None);
	assert_eq!(device.resolve_gpu_address(ranges[2].base + 10), Some((buffers[2], 10)));
	Ok(())
}

#[test]
fn test_resolver_under_concurrent_mutation() -> anyhow::Result<()> {
	const WRITERS: u64 = 4;
	const RANGES: u64 = 2000;
	let registry = Registry::<HeadlessBackend>::new();
	let stable = registry.register_resource(
		HeadlessResource(0),
		ResourceDesc::buffer(0x100, ResourceUsage::empty()),
		Some(0x10),
	)?;

	std::thread::scope(|s| {
		for w in 0..WRITERS {
			let registry = &registry;
			s.spawn(move || {
				for i in 0..RANGES {
					let base = 0x10_0000 + (w * RANGES + i) * 0x200;
					let desc = ResourceDesc::buffer(0x200, ResourceUsage::empty());
					let handle = registry
						.register_resource(HeadlessResource(1 + w * RANGES + i), desc, Some(base))
						.unwrap();
					registry.unregister_resource(handle).unwrap();
				}
			});
		}
		s.spawn(|| {
			// a lookup never observes a partially inserted or removed range
			let resolver: &AddressResolver = registry.resolver();
			for i in 0..RANGES * 4 {
				assert_eq!(resolver.resolve(0x10 + i % 0x100), Some((stable, i % 0x100)));
				if let Some((handle, offset)) = resolver.resolve(0x10_0000 + i * 0x80) {
					assert!(offset < 0x200);
					assert!(handle.is_category(HandleCategory::Resource));
				}
			}
		});
	});
	assert_eq!(registry.resolver().len(), 1);
	Ok(())
}
