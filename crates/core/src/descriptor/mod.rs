mod descriptor_counts;
mod error;
mod heap;
mod page_allocator;
mod range_allocator;
mod slot;

pub use descriptor_counts::*;
pub use error::*;
pub use heap::*;
pub use page_allocator::*;
pub use range_allocator::*;
pub use slot::*;
