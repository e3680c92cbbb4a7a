use crate::platform::NativeBackend;
use crate::registry::{ResourceDesc, ViewDesc};
use gpu_shim_handle::Handle;

/// Lifecycle callbacks for whatever is layered on top of a [`Device`](crate::device::Device).
///
/// `init_device` runs once the device is fully constructed, before it is handed out, and `destroy_device` runs first
/// thing when it is dropped, while every allocator and registry entry is still alive. Object init hooks run after the
/// object is registered, destroy hooks run before it is unregistered, so a hook can always resolve the handle it is
/// given.
pub trait DeviceHooks<B: NativeBackend>: Send + Sync + 'static {
	fn init_device(&self, _backend: &B) {}

	fn destroy_device(&self, _backend: &B) {}

	fn init_resource(&self, _handle: Handle, _desc: &ResourceDesc) {}

	fn destroy_resource(&self, _handle: Handle) {}

	fn init_view(&self, _handle: Handle, _desc: &ViewDesc) {}

	fn destroy_view(&self, _handle: Handle) {}
}

/// No lifecycle callbacks.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoHooks;

impl<B: NativeBackend> DeviceHooks<B> for NoHooks {}
