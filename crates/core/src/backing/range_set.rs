use rangemap::RangeSet;
use std::ops::Range;

/// The set of currently free descriptor offsets within a region, stored as coalesced ranges so contiguous runs can be
/// found without scanning individual slots.
#[derive(Clone, Debug)]
pub struct FreeRangeSet {
	bounds: Range<u32>,
	free: RangeSet<u32>,
}

impl FreeRangeSet {
	/// Creates a set where all of `bounds` is free.
	pub fn new(bounds: Range<u32>) -> Self {
		let mut free = RangeSet::new();
		if !bounds.is_empty() {
			free.insert(bounds.clone());
		}
		Self { bounds, free }
	}

	#[inline]
	pub fn bounds(&self) -> Range<u32> {
		self.bounds.clone()
	}

	#[inline]
	pub fn capacity(&self) -> u32 {
		self.bounds.end - self.bounds.start
	}

	pub fn free_count(&self) -> u32 {
		self.free.iter().map(|r| r.end - r.start).sum()
	}

	/// The length of the longest contiguous free run.
	pub fn largest_run(&self) -> u32 {
		self.free.iter().map(|r| r.end - r.start).max().unwrap_or(0)
	}

	/// Reserve the lowest `count` contiguous offsets that are free, or None if no run is long enough.
	pub fn take_first_fit(&mut self, count: u32) -> Option<Range<u32>> {
		if count == 0 {
			return None;
		}
		let start = self.free.iter().find(|r| r.end - r.start >= count)?.start;
		let taken = start..start + count;
		self.free.remove(taken.clone());
		Some(taken)
	}

	/// Return `range` to the set. Fails without modifying the set if any part of `range` is already free or lies
	/// outside of the bounds, as that would mean a double free.
	pub fn release(&mut self, range: Range<u32>) -> Result<(), ReleaseError> {
		if range.is_empty() || range.start < self.bounds.start || range.end > self.bounds.end {
			return Err(ReleaseError::OutOfBounds);
		}
		if self.free.overlaps(&range) {
			return Err(ReleaseError::AlreadyFree);
		}
		self.free.insert(range);
		Ok(())
	}

	pub fn is_free(&self, offset: u32) -> bool {
		self.free.contains(&offset)
	}
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ReleaseError {
	OutOfBounds,
	AlreadyFree,
}
