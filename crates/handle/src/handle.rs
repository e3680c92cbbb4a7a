use crate::HandleCategory;
use bytemuck_derive::{Pod, Zeroable};
use core::fmt::{Debug, Formatter};
use core::mem;
use num_traits::FromPrimitive;
use static_assertions::const_assert_eq;

pub const HANDLE_INDEX_BITS: u32 = 32;
pub const HANDLE_CATEGORY_BITS: u32 = 3;
pub const HANDLE_GENERATION_BITS: u32 = 29;

const HANDLE_INDEX_MASK: u64 = (1 << HANDLE_INDEX_BITS) - 1;
const HANDLE_CATEGORY_MASK: u64 = (1 << HANDLE_CATEGORY_BITS) - 1;
const HANDLE_GENERATION_MASK: u64 = (1 << HANDLE_GENERATION_BITS) - 1;

const HANDLE_INDEX_SHIFT: u32 = 0;
const HANDLE_CATEGORY_SHIFT: u32 = HANDLE_INDEX_BITS;
const HANDLE_GENERATION_SHIFT: u32 = HANDLE_INDEX_BITS + HANDLE_CATEGORY_BITS;

// uses all 64 bits
const_assert_eq!(HANDLE_INDEX_BITS + HANDLE_CATEGORY_BITS + HANDLE_GENERATION_BITS, 64);
// masks use entire 64 bit range
const_assert_eq!(
	HANDLE_INDEX_MASK << HANDLE_INDEX_SHIFT
		| HANDLE_CATEGORY_MASK << HANDLE_CATEGORY_SHIFT
		| HANDLE_GENERATION_MASK << HANDLE_GENERATION_SHIFT,
	!0
);
// masks do not overlap
const_assert_eq!(HANDLE_INDEX_MASK << HANDLE_INDEX_SHIFT & HANDLE_CATEGORY_MASK << HANDLE_CATEGORY_SHIFT, 0);
const_assert_eq!(HANDLE_INDEX_MASK << HANDLE_INDEX_SHIFT & HANDLE_GENERATION_MASK << HANDLE_GENERATION_SHIFT, 0);
const_assert_eq!(HANDLE_CATEGORY_MASK << HANDLE_CATEGORY_SHIFT & HANDLE_GENERATION_MASK << HANDLE_GENERATION_SHIFT, 0);
// every category must be representable
const_assert_eq!(HandleCategory::DescriptorSet as u64 & !HANDLE_CATEGORY_MASK, 0);

/// An opaque, pointer sized identifier for a driver object. Internally it's a bit packed u64 containing the
/// [`HandleIndex`], [`HandleCategory`] and [`HandleGeneration`].
///
/// Generations of live objects start at 1, so no live object ever encodes to [`Handle::NULL`].
#[repr(transparent)]
#[derive(Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Zeroable, Pod)]
pub struct Handle(u64);
const_assert_eq!(mem::size_of::<Handle>(), 8);

impl Handle {
	pub const NULL: Handle = Handle(0);

	pub const fn new(category: HandleCategory, index: HandleIndex, generation: HandleGeneration) -> Self {
		let mut value = 0;
		value |= (index.0 as u64 & HANDLE_INDEX_MASK) << HANDLE_INDEX_SHIFT;
		value |= (category as u64 & HANDLE_CATEGORY_MASK) << HANDLE_CATEGORY_SHIFT;
		value |= (generation.0 as u64 & HANDLE_GENERATION_MASK) << HANDLE_GENERATION_SHIFT;
		Self(value)
	}

	/// Reinterpret a raw value received from across an API boundary. The result may be any garbage, so every use
	/// must go through a validity check of whichever registry is supposed to own it.
	pub const fn from_raw(raw: u64) -> Self {
		Self(raw)
	}

	pub const fn to_raw(&self) -> u64 {
		self.0
	}

	#[inline]
	pub const fn is_null(&self) -> bool {
		self.0 == 0
	}

	/// The category this handle was created for, or None if the category bits do not name any known category.
	pub fn category(&self) -> Option<HandleCategory> {
		HandleCategory::from_u64((self.0 >> HANDLE_CATEGORY_SHIFT) & HANDLE_CATEGORY_MASK)
	}

	pub const fn index(&self) -> HandleIndex {
		HandleIndex(((self.0 >> HANDLE_INDEX_SHIFT) & HANDLE_INDEX_MASK) as u32)
	}

	pub const fn generation(&self) -> HandleGeneration {
		HandleGeneration(((self.0 >> HANDLE_GENERATION_SHIFT) & HANDLE_GENERATION_MASK) as u32)
	}

	/// Returns true if this handle is non-null and was created for `category`.
	#[inline]
	pub fn is_category(&self, category: HandleCategory) -> bool {
		!self.is_null() && self.category() == Some(category)
	}
}

impl Default for Handle {
	fn default() -> Self {
		Self::NULL
	}
}

impl Debug for Handle {
	fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
		if self.is_null() {
			return f.write_str("Handle(null)");
		}
		f.debug_struct("Handle")
			.field("category", &self.category())
			.field("index", &self.index().0)
			.field("generation", &self.generation().0)
			.finish()
	}
}

/// The index of [`Handle`] into the arena of its category.
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct HandleIndex(u32);
const_assert_eq!(mem::size_of::<HandleIndex>(), 4);

impl HandleIndex {
	/// Creates a new `HandleIndex`. All u32 values are representable.
	pub const fn new(index: u32) -> Self {
		Self(index)
	}

	pub const fn to_u32(&self) -> u32 {
		self.0
	}

	pub const fn to_usize(&self) -> usize {
		self.0 as usize
	}
}

/// The generation of [`Handle`]. Incremented every time an arena slot is reused.
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct HandleGeneration(u32);
const_assert_eq!(mem::size_of::<HandleGeneration>(), 4);

impl HandleGeneration {
	/// The generation of a slot that has never been handed out.
	pub const FIRST: HandleGeneration = HandleGeneration(1);

	/// Creates a new `HandleGeneration` or None if the generation is zero or too large to be represented by
	/// [`HANDLE_GENERATION_BITS`] bits.
	pub const fn new(generation: u32) -> Option<Self> {
		if generation != 0 && generation as u64 == generation as u64 & HANDLE_GENERATION_MASK {
			Some(Self(generation))
		} else {
			None
		}
	}

	pub const fn to_u32(&self) -> u32 {
		self.0
	}

	/// The generation following this one, or None if it would no longer fit into [`HANDLE_GENERATION_BITS`]. A slot
	/// without a next generation must be retired.
	pub const fn next(&self) -> Option<Self> {
		Self::new(self.0 + 1)
	}
}
