use crate::descriptor::{AllocationError, HeapKind, SlotViolation};
use crate::platform::NativeBackend;
use crate::registry::{RegistryError, ResourceUsage, ViewKind};
use gpu_shim_handle::{Handle, HandleCategory};
use std::fmt::{Debug, Display, Formatter};
use thiserror::Error;

#[derive(Error)]
pub enum DeviceError<B: NativeBackend> {
	#[error("Backend Error: {0}")]
	Backend(#[source] B::Error),
	#[error("Allocation Error: {0}")]
	Allocation(#[from] AllocationError),
	#[error("Slot Violation: {0}")]
	Slot(#[from] SlotViolation),
	#[error("Registry Error: {0}")]
	Registry(#[from] RegistryError),
	#[error("{handle:?} is not a valid {}", .category.name())]
	InvalidHandle { handle: Handle, category: HandleCategory },
	#[error("Resource {resource:?} lacks usage {required:?} to create {kind:?} views")]
	MissingUsage {
		resource: Handle,
		kind: ViewKind,
		required: ResourceUsage,
	},
	#[error("{0:?} views can not be created from resources")]
	UnsupportedViewKind(ViewKind),
	#[error("There are no shader visible {} descriptor tables", .0.name())]
	NoDescriptorTables(HeapKind),
	#[error("Can not publish a {} descriptor into a {} descriptor table", .descriptor.name(), .table.name())]
	HeapKindMismatch { descriptor: HeapKind, table: HeapKind },
	#[error("Index {index} is out of range for descriptor table {table:?} of {count} descriptors")]
	TableIndexOutOfRange { table: Handle, index: u32, count: u32 },
	#[error("Transient descriptor table {0:?} expired at a submission boundary")]
	ExpiredTable(Handle),
	#[error("Handle {0:?} was passed more than once")]
	DuplicateHandle(Handle),
}

impl<B: NativeBackend> Debug for DeviceError<B> {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		Display::fmt(&self, f)
	}
}
