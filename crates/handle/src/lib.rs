#![no_std]

#[cfg(test)]
extern crate alloc;

mod category;
mod handle;

pub use category::*;
pub use handle::*;
