use crate::address::AddressRangeError;
use crate::backing::table::TableInsertError;
use gpu_shim_handle::{Handle, HandleCategory};
use thiserror::Error;

#[derive(Copy, Clone, Debug, Error, Eq, PartialEq)]
pub enum RegistryError {
	#[error("{handle:?} is not a registered {}", .category.name())]
	NotRegistered { handle: Handle, category: HandleCategory },
	#[error("Owning resource {0:?} of a view is not registered")]
	InvalidOwner(Handle),
	#[error(transparent)]
	Exhausted(#[from] TableInsertError),
	#[error(transparent)]
	AddressRange(#[from] AddressRangeError),
}

impl RegistryError {
	/// Log the violation loudly and hand it back, for use in `Err(..)` position.
	#[cold]
	pub(crate) fn report(self) -> Self {
		log::error!("{}", self);
		self
	}
}
