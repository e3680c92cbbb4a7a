mod error;
mod hooks;
mod shim;

pub use error::*;
pub use hooks::*;
pub use shim::*;
