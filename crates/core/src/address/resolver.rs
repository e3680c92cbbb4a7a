use gpu_shim_handle::Handle;
use parking_lot::RwLock;
use rangemap::RangeMap;
use thiserror::Error;

/// A device-visible address range `base..base + len`.
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq)]
pub struct AddressRange {
	pub base: u64,
	pub len: u64,
}

impl AddressRange {
	#[inline]
	pub fn end(&self) -> u64 {
		self.base.saturating_add(self.len)
	}

	#[inline]
	pub fn contains(&self, address: u64) -> bool {
		address >= self.base && address < self.end()
	}
}

#[derive(Copy, Clone, Debug, Error, Eq, PartialEq)]
pub enum AddressRangeError {
	#[error("Address range at {base:#x} is empty")]
	Empty { base: u64 },
	#[error("Address range at {base:#x} with length {len:#x} overflows the address space")]
	Overflow { base: u64, len: u64 },
	#[error("Address range {base:#x}..{end:#x} overlaps the range of {existing:?}", end = .base + .len)]
	Overlap { base: u64, len: u64, existing: Handle },
	#[error("No address range starts at {0:#x}")]
	NotRegistered(u64),
}

/// Maps device-visible addresses back to the resource whose memory contains them.
///
/// Ranges are disjoint and kept in a sorted interval map, so [`Self::resolve`] is a single logarithmic lookup. The
/// whole index sits behind one reader/writer lock: a lookup either sees a range completely or not at all.
#[derive(Debug, Default)]
pub struct AddressResolver {
	/// values carry their own base, so touching ranges of the same handle are never coalesced
	ranges: RwLock<RangeMap<u64, (u64, Handle)>>,
}

impl AddressResolver {
	pub fn new() -> Self {
		Self::default()
	}

	/// Index `base..base + len` as belonging to `handle`.
	pub fn register_range(&self, base: u64, len: u64, handle: Handle) -> Result<(), AddressRangeError> {
		profiling::function_scope!();
		if len == 0 {
			return Err(AddressRangeError::Empty { base });
		}
		let end = base.checked_add(len).ok_or(AddressRangeError::Overflow { base, len })?;
		let mut ranges = self.ranges.write();
		if let Some((_, (_, existing))) = ranges.overlapping(&(base..end)).next() {
			return Err(AddressRangeError::Overlap {
				base,
				len,
				existing: *existing,
			});
		}
		ranges.insert(base..end, (base, handle));
		Ok(())
	}

	/// Remove the range starting exactly at `base`, returning the handle it belonged to.
	pub fn unregister_range(&self, base: u64) -> Result<Handle, AddressRangeError> {
		profiling::function_scope!();
		let mut ranges = self.ranges.write();
		let (range, handle) = match ranges.get_key_value(&base) {
			Some((range, (start, handle))) if *start == base => (range.clone(), *handle),
			_ => return Err(AddressRangeError::NotRegistered(base)),
		};
		ranges.remove(range);
		Ok(handle)
	}

	/// The handle owning `address` and the offset of `address` from the start of its range.
	pub fn resolve(&self, address: u64) -> Option<(Handle, u64)> {
		profiling::function_scope!();
		let ranges = self.ranges.read();
		let (base, handle) = ranges.get(&address)?;
		Some((*handle, address - base))
	}

	/// Number of registered ranges
	pub fn len(&self) -> usize {
		self.ranges.read().iter().count()
	}

	pub fn is_empty(&self) -> bool {
		self.ranges.read().iter().next().is_none()
	}
}
