#![cfg(test)]

use crate::{headless_device, init_logger, TEST_COUNTS};
use gpu_shim_core::descriptor::{AllocationError, DescriptorRangeAllocator, HeapKind, RangeAllocation, Region};
use gpu_shim_core::device::DeviceError;
use gpu_shim_core::handle::HandleCategory;
use gpu_shim_core::platform::headless::{HeadlessBackend, HEADLESS_DESCRIPTOR_STRIDE};
use gpu_shim_core::registry::{ResourceDesc, ResourceUsage, SamplerDesc, ViewDesc, ViewKind};
use std::sync::Arc;

#[test]
fn test_reserved_partial_free_never_reuses_live_slots() -> anyhow::Result<()> {
	init_logger();
	let tables = DescriptorRangeAllocator::new(Arc::new(HeadlessBackend::new()), HeapKind::View, 8, 0, 1);
	let first = tables.allocate_range(4, Region::Reserved)?;
	assert_eq!(first.offsets(), 0..4);

	tables.free_range(first.heap(), 1, 2)?;
	let second = tables.allocate_range(2, Region::Reserved)?;
	assert!(second.offsets() == (1..3) || second.offsets() == (4..6));
	assert_ne!(second.slot.generation, first.slot.generation);
	for offset in [0, 3] {
		assert!(!second.offsets().contains(&offset));
	}
	Ok(())
}

#[test]
fn test_transient_tables_across_submissions() -> anyhow::Result<()> {
	let device = headless_device(TEST_COUNTS);
	let allocator = device.table_allocator(HeapKind::View).unwrap();
	let buffer = device.create_resource(&ResourceDesc::buffer(64, ResourceUsage::SHADER_RESOURCE))?;
	let view = device.create_view(buffer, &ViewDesc::buffer(ViewKind::ShaderResource, 0, 64))?;

	let mut previous: Option<RangeAllocation> = None;
	for _frame in 0..3 {
		let tables = device.allocate_descriptor_tables(HeapKind::View, &[2, 3], Region::Transient)?;
		let allocation = device.registry().resolve_descriptor_set(tables[0]).unwrap();
		assert_eq!(allocator.bump_generation(allocation.heap()), Some(allocation.slot.generation));
		device.publish_view(tables[1], 2, view)?;

		if let Some(previous) = previous {
			// the same offsets are handed out again every submission, under a new generation
			assert_ne!(previous, allocation);
			assert_eq!(previous.offsets(), allocation.offsets());
			assert!(!allocator.is_current(&previous));
		}
		previous = Some(allocation);
		unsafe { device.end_submission() };
		for table in tables {
			assert!(!device.registry().is_valid(table, HandleCategory::DescriptorSet));
		}
	}
	assert_eq!(device.backend().descriptor_copies().len(), 3);
	Ok(())
}

#[test]
fn test_transient_region_overflow_grows_heap() -> anyhow::Result<()> {
	let device = headless_device(TEST_COUNTS);
	let tables = device.allocate_descriptor_tables(HeapKind::View, &[6, 6], Region::Transient)?;
	let a = device.registry().resolve_descriptor_set(tables[0]).unwrap();
	let b = device.registry().resolve_descriptor_set(tables[1]).unwrap();
	assert_ne!(a.heap(), b.heap());
	assert!(matches!(
		device.allocate_descriptor_tables(HeapKind::View, &[9], Region::Transient),
		Err(DeviceError::Allocation(AllocationError::RequestTooLarge { capacity: 8, .. }))
	));
	Ok(())
}

#[test]
fn test_reserved_tables_exhausted() -> anyhow::Result<()> {
	let device = headless_device(TEST_COUNTS);
	let heaps = TEST_COUNTS.max_heaps_per_kind as usize;
	let sizes = vec![TEST_COUNTS.view_reserved; heaps];
	let full = device.allocate_descriptor_tables(HeapKind::View, &sizes, Region::Reserved)?;
	assert_eq!(full.len(), heaps);

	assert!(matches!(
		device.allocate_descriptor_tables(HeapKind::View, &[1], Region::Reserved),
		Err(DeviceError::Allocation(AllocationError::OutOfDescriptors { .. }))
	));
	// the transient region of every heap is still available
	device.allocate_descriptor_tables(HeapKind::View, &[TEST_COUNTS.view_transient], Region::Transient)?;

	unsafe { device.free_descriptor_tables(&full[..1])? };
	device.allocate_descriptor_tables(HeapKind::View, &[1], Region::Reserved)?;
	Ok(())
}

#[test]
fn test_free_descriptor_tables_checks_all_handles_first() -> anyhow::Result<()> {
	let device = headless_device(TEST_COUNTS);
	let tables = device.allocate_descriptor_tables(HeapKind::Sampler, &[1, 1], Region::Reserved)?;
	unsafe {
		device.free_descriptor_tables(&tables[1..])?;
		assert!(matches!(
			device.free_descriptor_tables(&tables),
			Err(DeviceError::InvalidHandle { .. })
		));
	}
	// the valid handle was not freed by the failed call
	assert!(device.registry().is_valid(tables[0], HandleCategory::DescriptorSet));
	assert_eq!(device.table_allocator(HeapKind::Sampler).unwrap().reserved_in_use(), 1);
	Ok(())
}

#[test]
fn test_free_descriptor_tables_rejects_duplicates() -> anyhow::Result<()> {
	let device = headless_device(TEST_COUNTS);
	let tables = device.allocate_descriptor_tables(HeapKind::View, &[2, 2], Region::Reserved)?;
	let twice = [tables[0], tables[1], tables[0]];
	unsafe {
		assert!(matches!(
			device.free_descriptor_tables(&twice),
			Err(DeviceError::DuplicateHandle(handle)) if handle == tables[0]
		));
	}
	// nothing was freed by the failed call
	for table in &tables {
		assert!(device.registry().is_valid(*table, HandleCategory::DescriptorSet));
	}
	assert_eq!(device.table_allocator(HeapKind::View).unwrap().reserved_in_use(), 4);
	unsafe { device.free_descriptor_tables(&tables)? };
	assert_eq!(device.table_allocator(HeapKind::View).unwrap().reserved_in_use(), 0);
	Ok(())
}

#[test]
fn test_gpu_descriptor_address_round_trip() -> anyhow::Result<()> {
	let device = headless_device(TEST_COUNTS);
	let sampler = device.create_sampler(&SamplerDesc::default())?;
	let view_tables = device.allocate_descriptor_tables(HeapKind::View, &[3], Region::Reserved)?;
	let sampler_tables = device.allocate_descriptor_tables(HeapKind::Sampler, &[2], Region::Transient)?;
	device.publish_sampler(sampler_tables[0], 1, sampler)?;

	let stride = HEADLESS_DESCRIPTOR_STRIDE as u64;
	for (table, count) in [(view_tables[0], 3), (sampler_tables[0], 2)] {
		let base = device.descriptor_table_gpu_address(table)?;
		for index in 0..count {
			assert_eq!(
				device.descriptor_table_from_gpu_address(base + index as u64 * stride),
				Some((table, index))
			);
		}
	}

	let sampler_base = device.descriptor_table_gpu_address(sampler_tables[0])?;
	unsafe { device.end_submission() };
	assert_eq!(device.descriptor_table_from_gpu_address(sampler_base), None);
	assert!(matches!(
		device.descriptor_table_gpu_address(sampler_tables[0]),
		Err(DeviceError::InvalidHandle { .. })
	));
	Ok(())
}
