mod desc;
mod entry;
mod error;
mod resource_registry;

pub use desc::*;
pub use entry::*;
pub use error::*;
pub use resource_registry::*;
