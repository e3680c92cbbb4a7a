//! Backing data structures for managing slots: generation-tagged handle arenas, fixed size slot arrays and sets of
//! free descriptor ranges.

pub mod range_set;
pub mod slot_array;
pub mod table;
