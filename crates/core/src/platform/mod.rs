mod backend;
#[cfg(any(test, feature = "headless"))]
pub mod headless;

pub use backend::*;
