#![cfg(test)]

use crate::{headless_device, TEST_COUNTS};
use gpu_shim_core::descriptor::{DescriptorCounts, HeapKind, Region};
use gpu_shim_core::handle::{Handle, HandleCategory};
use gpu_shim_core::registry::{ResourceDesc, ResourceUsage, ViewDesc, ViewKind};
use std::collections::HashSet;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering::Relaxed;
use std::sync::Barrier;

#[test]
fn test_concurrent_create_destroy_resources() -> anyhow::Result<()> {
	const THREADS: usize = 8;
	const RESOURCES: usize = 1000;

	let device = headless_device(TEST_COUNTS);
	let barrier = Barrier::new(THREADS);
	let handles = std::thread::scope(|s| {
		let threads = (0..THREADS)
			.map(|t| {
				let device = &device;
				let barrier = &barrier;
				s.spawn(move || -> anyhow::Result<Vec<Handle>> {
					barrier.wait();
					let mut created = Vec::with_capacity(RESOURCES);
					for i in 0..RESOURCES {
						let desc = ResourceDesc::buffer(64 + (t * RESOURCES + i) as u64, ResourceUsage::COPY_DEST);
						let handle = device.create_resource(&desc)?;
						assert_eq!(device.resource_desc(handle), Some(desc));
						unsafe { device.destroy_resource(handle)? };
						assert!(!device.registry().is_valid(handle, HandleCategory::Resource));
						created.push(handle);
					}
					Ok(created)
				})
			})
			.collect::<Vec<_>>();
		threads
			.into_iter()
			.map(|t| t.join().unwrap())
			.collect::<anyhow::Result<Vec<_>>>()
	})?;

	assert_eq!(device.registry().resource_count(), 0);
	assert!(device.registry().resolver().is_empty());
	assert_eq!(device.backend().live_resources(), 0);
	// a slot is reused under a new generation, so no handle is ever handed out twice
	let all = handles.iter().flatten().copied().collect::<HashSet<_>>();
	assert_eq!(all.len(), THREADS * RESOURCES);
	Ok(())
}

#[test]
fn test_lookups_during_view_churn() -> anyhow::Result<()> {
	const WRITERS: usize = 4;
	const ROUNDS: usize = 500;

	let counts = DescriptorCounts {
		cpu_heap_capacity: 64,
		..TEST_COUNTS
	};
	let device = headless_device(counts);
	let buffer = device.create_resource(&ResourceDesc::buffer(4096, ResourceUsage::SHADER_RESOURCE))?;
	let desc = ViewDesc::buffer(ViewKind::ShaderResource, 0, 4096);
	let stable = device.create_view(buffer, &desc)?;
	let done = AtomicBool::new(false);

	std::thread::scope(|s| {
		let writers = (0..WRITERS)
			.map(|_| {
				s.spawn(|| -> anyhow::Result<()> {
					for _ in 0..ROUNDS {
						let view = device.create_view(buffer, &desc)?;
						let copy = device.copy_view(view)?;
						assert_eq!(device.resource_from_view(copy), Some(buffer));
						unsafe {
							device.destroy_view(view)?;
							device.destroy_view(copy)?;
						}
					}
					Ok(())
				})
			})
			.collect::<Vec<_>>();
		s.spawn(|| {
			while !done.load(Relaxed) {
				assert_eq!(device.registry().resolve_view(stable), Some((buffer, desc)));
				assert!(device.registry().is_valid(buffer, HandleCategory::Resource));
				assert!(!device.registry().is_valid(Handle::NULL, HandleCategory::View));
			}
		});
		let result = writers.into_iter().map(|w| w.join().unwrap()).collect::<anyhow::Result<()>>();
		done.store(true, Relaxed);
		result
	})?;

	assert_eq!(device.registry().view_count(), 1);
	assert_eq!(device.page_allocator(HeapKind::View).in_use(), 1);
	assert_eq!(device.backend().live_views(), 1);
	Ok(())
}

#[test]
fn test_concurrent_descriptor_tables() -> anyhow::Result<()> {
	const THREADS: usize = 4;
	const ROUNDS: usize = 200;

	let device = headless_device(TEST_COUNTS);
	std::thread::scope(|s| {
		let threads = (0..THREADS)
			.map(|_| {
				s.spawn(|| -> anyhow::Result<()> {
					for _ in 0..ROUNDS {
						let tables = device.allocate_descriptor_tables(HeapKind::View, &[1, 2], Region::Reserved)?;
						let slots = tables
							.iter()
							.map(|table| device.descriptor_table_slot(*table, 0))
							.collect::<Result<Vec<_>, _>>()?;
						assert_ne!(slots[0].location(), slots[1].location());
						unsafe { device.free_descriptor_tables(&tables)? };
					}
					Ok(())
				})
			})
			.collect::<Vec<_>>();
		threads.into_iter().map(|t| t.join().unwrap()).collect::<anyhow::Result<()>>()
	})?;

	let allocator = device.table_allocator(HeapKind::View).unwrap();
	assert_eq!(allocator.reserved_in_use(), 0);
	assert_eq!(device.registry().descriptor_set_count(), 0);
	Ok(())
}
