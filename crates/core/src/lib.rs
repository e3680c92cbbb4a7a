pub mod address;
pub mod backing;
pub mod descriptor;
pub mod device;
pub mod platform;
pub mod registry;

pub use gpu_shim_handle as handle;

#[cfg(test)]
pub(crate) fn init_test_logger() {
	let _ = env_logger::builder().is_test(true).try_init();
}
