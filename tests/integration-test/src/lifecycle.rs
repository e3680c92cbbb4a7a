#![cfg(test)]

use crate::{headless_device, TEST_COUNTS};
use gpu_shim_core::descriptor::{AllocationError, HeapKind};
use gpu_shim_core::device::{Device, DeviceError, DeviceHooks};
use gpu_shim_core::handle::HandleCategory;
use gpu_shim_core::platform::NativeBackend;
use gpu_shim_core::registry::{Format, ResourceDesc, ResourceUsage, ViewDesc, ViewKind};

fn storage_buffer(size: u64) -> ResourceDesc {
	ResourceDesc::buffer(size, ResourceUsage::SHADER_RESOURCE | ResourceUsage::UNORDERED_ACCESS)
}

#[test]
fn test_resource_view_lifecycle_headless() -> anyhow::Result<()> {
	test_resource_view_lifecycle(&headless_device(TEST_COUNTS))
}

fn test_resource_view_lifecycle<B: NativeBackend, H: DeviceHooks<B>>(device: &Device<B, H>) -> anyhow::Result<()> {
	let registry = device.registry();
	let buffer = device.create_resource(&storage_buffer(4096))?;
	let texture = device.create_resource(&ResourceDesc::texture_2d(
		256,
		256,
		4,
		Format(28),
		ResourceUsage::SHADER_RESOURCE | ResourceUsage::RENDER_TARGET,
	))?;
	device.set_resource_name(texture, "albedo")?;

	let srv = device.create_view(buffer, &ViewDesc::buffer(ViewKind::ShaderResource, 0, 4096))?;
	let uav = device.create_view(buffer, &ViewDesc::buffer(ViewKind::UnorderedAccess, 1024, 1024))?;
	let rtv = device.create_view(texture, &ViewDesc::texture_2d(ViewKind::RenderTarget, Format(28), 0, 1))?;
	assert!(registry.is_valid(srv, HandleCategory::View));
	assert!(!registry.is_valid(srv, HandleCategory::Resource));
	assert_eq!(registry.resource_name(texture).as_deref(), Some("albedo"));
	assert_eq!(registry.views_of(buffer).len(), 2);
	assert_eq!(device.resource_from_view(rtv), Some(texture));
	assert_eq!(device.page_allocator(HeapKind::View).in_use(), 2);
	assert_eq!(device.page_allocator(HeapKind::RenderTarget).in_use(), 1);

	let rtv_slot = registry.view(rtv).and_then(|entry| entry.slot).unwrap();
	assert_eq!(registry.view_for_slot(rtv_slot.heap, rtv_slot.offset), Some(rtv));

	unsafe {
		for view in [srv, uav, rtv] {
			device.destroy_view(view)?;
			assert!(!registry.is_valid(view, HandleCategory::View));
		}
		device.destroy_resource(buffer)?;
		device.destroy_resource(texture)?;
	}
	assert!(!registry.is_valid(buffer, HandleCategory::Resource));
	assert!(registry.is_empty());
	for kind in HeapKind::VALUES {
		assert_eq!(device.page_allocator(kind).in_use(), 0);
	}
	Ok(())
}

#[test]
fn test_destroy_resource_before_view() -> anyhow::Result<()> {
	let device = headless_device(TEST_COUNTS);
	let buffer = device.create_resource(&storage_buffer(256))?;
	let view = device.create_view(buffer, &ViewDesc::buffer(ViewKind::ShaderResource, 0, 256))?;

	unsafe { device.destroy_resource(buffer)? };
	// the view is stale: still registered, but its owner is gone
	assert!(device.registry().is_valid(view, HandleCategory::View));
	assert_eq!(device.resource_from_view(view), None);
	assert!(matches!(
		device.create_view(buffer, &ViewDesc::buffer(ViewKind::ShaderResource, 0, 256)),
		Err(DeviceError::InvalidHandle { .. })
	));
	assert!(device.copy_view(view).is_err());

	unsafe { device.destroy_view(view)? };
	assert_eq!(device.backend().live_views(), 0);
	assert_eq!(device.backend().live_resources(), 0);
	Ok(())
}

#[test]
fn test_page_heaps_grow_and_are_reused() -> anyhow::Result<()> {
	let device = headless_device(TEST_COUNTS);
	let buffer = device.create_resource(&storage_buffer(256))?;
	let desc = ViewDesc::buffer(ViewKind::ShaderResource, 0, 256);
	let pages = device.page_allocator(HeapKind::View);

	let views = (0..40)
		.map(|_| device.create_view(buffer, &desc))
		.collect::<Result<Vec<_>, _>>()?;
	assert_eq!(pages.heap_count(), 3);
	assert_eq!(pages.in_use(), 40);

	let mut slots = Vec::new();
	for view in &views {
		slots.push(device.registry().view(*view).and_then(|entry| entry.slot).unwrap());
		unsafe { device.destroy_view(*view)? };
	}
	assert_eq!(pages.in_use(), 0);
	assert!(slots.iter().all(|slot| !pages.is_current(*slot)));

	let again = (0..40)
		.map(|_| device.create_view(buffer, &desc))
		.collect::<Result<Vec<_>, _>>()?;
	assert_eq!(pages.heap_count(), 3);
	for view in again {
		let slot = device.registry().view(view).and_then(|entry| entry.slot).unwrap();
		assert!(pages.is_current(slot));
		assert!(!slots.contains(&slot));
	}
	Ok(())
}

#[test]
fn test_page_heaps_exhausted() -> anyhow::Result<()> {
	let device = headless_device(TEST_COUNTS);
	let texture = device.create_resource(&ResourceDesc::texture_2d(
		64,
		64,
		1,
		Format(40),
		ResourceUsage::DEPTH_STENCIL,
	))?;
	let desc = ViewDesc::texture_2d(ViewKind::DepthStencil, Format(40), 0, 1);
	let capacity = TEST_COUNTS.cpu_heap_capacity * TEST_COUNTS.max_heaps_per_kind;
	for _ in 0..capacity {
		device.create_view(texture, &desc)?;
	}
	assert!(matches!(
		device.create_view(texture, &desc),
		Err(DeviceError::Allocation(AllocationError::OutOfDescriptors {
			kind: HeapKind::DepthStencil,
			..
		}))
	));
	// other kinds are unaffected
	let buffer = device.create_resource(&storage_buffer(16))?;
	device.create_view(buffer, &ViewDesc::buffer(ViewKind::ShaderResource, 0, 16))?;
	Ok(())
}

#[test]
fn test_backend_failures_roll_back() -> anyhow::Result<()> {
	let device = headless_device(TEST_COUNTS);
	let buffer = device.create_resource(&storage_buffer(256))?;

	device.backend().fail_next_creations(1);
	assert!(matches!(
		device.create_view(buffer, &ViewDesc::buffer(ViewKind::ShaderResource, 0, 256)),
		Err(DeviceError::Allocation(AllocationError::HeapCreation { .. }))
	));
	assert_eq!(device.page_allocator(HeapKind::View).heap_count(), 0);

	// the heap exists now, so the view creation itself fails
	device.create_view(buffer, &ViewDesc::buffer(ViewKind::ShaderResource, 0, 256))?;
	device.backend().fail_next_creations(1);
	assert!(matches!(
		device.create_view(buffer, &ViewDesc::buffer(ViewKind::ShaderResource, 0, 256)),
		Err(DeviceError::Backend(_))
	));
	assert_eq!(device.page_allocator(HeapKind::View).in_use(), 1);
	assert_eq!(device.registry().view_count(), 1);
	Ok(())
}
