use gpu_shim_handle::HandleIndex;
use std::ops::{Index, IndexMut};

/// A fixed size array of slots, sized once at creation and never resized, so references into it stay stable.
pub struct SlotArray<T>(pub Box<[T]>);

impl<T: Default> SlotArray<T> {
	pub fn new(count: u32) -> Self {
		Self::new_generator(count, |_| T::default())
	}
}

impl<T> SlotArray<T> {
	pub fn new_generator(count: u32, f: impl FnMut(u32) -> T) -> Self {
		Self((0..count).map(f).collect::<Vec<_>>().into_boxed_slice())
	}

	pub fn len(&self) -> usize {
		self.0.len()
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	pub fn get(&self, offset: u32) -> Option<&T> {
		self.0.get(offset as usize)
	}

	pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
		self.0.iter()
	}
}

impl<T> Index<u32> for SlotArray<T> {
	type Output = T;

	fn index(&self, offset: u32) -> &Self::Output {
		self.0.index(offset as usize)
	}
}

impl<T> IndexMut<u32> for SlotArray<T> {
	fn index_mut(&mut self, offset: u32) -> &mut Self::Output {
		self.0.index_mut(offset as usize)
	}
}

impl<T> Index<HandleIndex> for SlotArray<T> {
	type Output = T;

	fn index(&self, index: HandleIndex) -> &Self::Output {
		self.0.index(index.to_usize())
	}
}

impl<T> IndexMut<HandleIndex> for SlotArray<T> {
	fn index_mut(&mut self, index: HandleIndex) -> &mut Self::Output {
		self.0.index_mut(index.to_usize())
	}
}
