use gpu_shim_handle::{Handle, HandleCategory, HandleGeneration, HandleIndex};
use std::fmt::{Debug, Formatter};
use thiserror::Error;

/// An arena of values addressed by generation-tagged [`Handle`]s of a single [`HandleCategory`].
///
/// Removing a value advances the generation of its slot before the slot is put on the free list, so a handle captured
/// before the removal can never address whatever gets inserted into the slot afterward. Slots whose generation would
/// overflow are retired and never handed out again.
///
/// The table itself is not synchronized, owners are expected to put it behind a lock.
pub struct HandleTable<T> {
	category: HandleCategory,
	slots: Vec<TableSlot<T>>,
	dead_queue: Vec<HandleIndex>,
	len: usize,
	retired: usize,
}

struct TableSlot<T> {
	generation: HandleGeneration,
	value: Option<T>,
}

impl<T> HandleTable<T> {
	pub fn new(category: HandleCategory) -> Self {
		Self {
			category,
			slots: Vec::new(),
			dead_queue: Vec::new(),
			len: 0,
			retired: 0,
		}
	}

	#[inline]
	pub fn category(&self) -> HandleCategory {
		self.category
	}

	/// Number of live values
	#[inline]
	pub fn len(&self) -> usize {
		self.len
	}

	#[inline]
	pub fn is_empty(&self) -> bool {
		self.len == 0
	}

	/// Number of slots that ran out of generations and will never be reused
	pub fn retired(&self) -> usize {
		self.retired
	}

	pub fn insert(&mut self, value: T) -> Result<Handle, TableInsertError> {
		self.insert_with(|_| value)
	}

	/// Insert a value constructed from the handle it will be stored under.
	pub fn insert_with(&mut self, f: impl FnOnce(Handle) -> T) -> Result<Handle, TableInsertError> {
		let index = if let Some(index) = self.dead_queue.pop() {
			index
		} else {
			let index = u32::try_from(self.slots.len()).map_err(|_| TableInsertError::Exhausted(self.category))?;
			self.slots.push(TableSlot {
				generation: HandleGeneration::FIRST,
				value: None,
			});
			HandleIndex::new(index)
		};

		let slot = &mut self.slots[index.to_usize()];
		debug_assert!(slot.value.is_none(), "dead slot {:?} still holds a value", index);
		let handle = Handle::new(self.category, index, slot.generation);
		slot.value = Some(f(handle));
		self.len += 1;
		Ok(handle)
	}

	fn slot(&self, handle: Handle) -> Option<&TableSlot<T>> {
		if !handle.is_category(self.category) {
			return None;
		}
		self.slots
			.get(handle.index().to_usize())
			.filter(|slot| slot.generation == handle.generation())
	}

	#[inline]
	pub fn contains(&self, handle: Handle) -> bool {
		self.get(handle).is_some()
	}

	pub fn get(&self, handle: Handle) -> Option<&T> {
		self.slot(handle).and_then(|slot| slot.value.as_ref())
	}

	pub fn get_mut(&mut self, handle: Handle) -> Option<&mut T> {
		if self.slot(handle).is_none() {
			return None;
		}
		self.slots[handle.index().to_usize()].value.as_mut()
	}

	/// Remove the value `handle` points to. Returns None if the handle does not point to a live value.
	pub fn remove(&mut self, handle: Handle) -> Option<T> {
		self.slot(handle)?;
		let index = handle.index();
		let slot = &mut self.slots[index.to_usize()];
		let value = slot.value.take()?;
		self.len -= 1;

		match slot.generation.next() {
			Some(next) => {
				slot.generation = next;
				self.dead_queue.push(index);
			}
			None => {
				log::debug!("retiring {} slot {:?}, out of generations", self.category.name(), index);
				self.retired += 1;
			}
		}
		Some(value)
	}

	/// Remove all values, advancing generations just like [`Self::remove`] does.
	pub fn drain(&mut self) -> Vec<T> {
		let handles = self.iter().map(|(handle, _)| handle).collect::<Vec<_>>();
		handles.into_iter().filter_map(|handle| self.remove(handle)).collect()
	}

	pub fn iter(&self) -> impl Iterator<Item = (Handle, &T)> + '_ {
		self.slots.iter().enumerate().filter_map(|(i, slot)| {
			slot.value
				.as_ref()
				.map(|value| (Handle::new(self.category, HandleIndex::new(i as u32), slot.generation), value))
		})
	}
}

impl<T> Debug for HandleTable<T> {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("HandleTable")
			.field("category", &self.category)
			.field("len", &self.len)
			.field("slots", &self.slots.len())
			.field("retired", &self.retired)
			.finish()
	}
}

#[derive(Copy, Clone, Debug, Error, Eq, PartialEq)]
pub enum TableInsertError {
	#[error("Ran out of {} handles", .0.name())]
	Exhausted(HandleCategory),
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::collections::HashSet;

	#[test]
	fn test_insert_get() -> anyhow::Result<()> {
		let mut table = HandleTable::new(HandleCategory::Resource);
		let a = table.insert(42)?;
		let b = table.insert(69)?;
		assert_ne!(a, b);
		assert_eq!(table.get(a), Some(&42));
		assert_eq!(table.get(b), Some(&69));
		assert_eq!(table.len(), 2);
		assert_eq!(a.index().to_u32(), 0);
		assert_eq!(a.generation(), HandleGeneration::FIRST);
		Ok(())
	}

	#[test]
	fn test_reuse_bumps_generation() -> anyhow::Result<()> {
		let mut table = HandleTable::new(HandleCategory::View);
		let a = table.insert("a")?;
		assert_eq!(table.remove(a), Some("a"));
		assert!(!table.contains(a));

		let b = table.insert("b")?;
		assert_eq!(a.index(), b.index());
		assert_ne!(a.generation(), b.generation());
		assert_eq!(table.get(a), None);
		assert_eq!(table.get(b), Some(&"b"));
		Ok(())
	}

	#[test]
	fn test_remove_twice() -> anyhow::Result<()> {
		let mut table = HandleTable::new(HandleCategory::Resource);
		let a = table.insert(1)?;
		assert_eq!(table.remove(a), Some(1));
		assert_eq!(table.remove(a), None);
		assert!(table.is_empty());
		Ok(())
	}

	#[test]
	fn test_wrong_category_and_null() -> anyhow::Result<()> {
		let mut table = HandleTable::new(HandleCategory::Resource);
		let a = table.insert(1)?;
		let as_view = Handle::new(HandleCategory::View, a.index(), a.generation());
		assert_eq!(table.get(as_view), None);
		assert_eq!(table.get(Handle::NULL), None);
		assert_eq!(table.get(Handle::from_raw(u64::MAX)), None);
		Ok(())
	}

	#[test]
	fn test_insert_with_sees_own_handle() -> anyhow::Result<()> {
		let mut table = HandleTable::new(HandleCategory::Sampler);
		let handle = table.insert_with(|h| h)?;
		assert_eq!(table.get(handle), Some(&handle));
		Ok(())
	}

	#[test]
	fn test_iter() -> anyhow::Result<()> {
		let mut table = HandleTable::new(HandleCategory::Resource);
		let handles = (0..8).map(|i| table.insert(i)).collect::<Result<Vec<_>, _>>()?;
		for h in handles.iter().step_by(2) {
			table.remove(*h);
		}
		let live = table.iter().map(|(h, v)| (h, *v)).collect::<Vec<_>>();
		assert_eq!(live.len(), 4);
		for (h, v) in live {
			assert_eq!(handles[v as usize], h);
		}
		Ok(())
	}

	#[test]
	fn test_unique_while_live() -> anyhow::Result<()> {
		let mut table = HandleTable::new(HandleCategory::Resource);
		let mut live = Vec::new();
		let mut seen = HashSet::new();
		for round in 0..50u32 {
			for _ in 0..(round % 7 + 1) {
				let handle = table.insert(round)?;
				assert!(seen.insert(handle), "handle {:?} was handed out twice", handle);
				live.push(handle);
			}
			for _ in 0..(round % 5) {
				if let Some(handle) = live.pop() {
					table.remove(handle).unwrap();
				}
			}
		}
		assert_eq!(table.len(), live.len());
		Ok(())
	}

	#[test]
	fn test_drain_invalidates() -> anyhow::Result<()> {
		let mut table = HandleTable::new(HandleCategory::View);
		let a = table.insert('a')?;
		let b = table.insert('b')?;
		let mut drained = table.drain();
		drained.sort();
		assert_eq!(drained, vec!['a', 'b']);
		assert!(table.is_empty());
		assert!(!table.contains(a));
		let c = table.insert('c')?;
		assert_ne!(c, a);
		assert_ne!(c, b);
		Ok(())
	}
}
