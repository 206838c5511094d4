//! Access to host device information, injected by the platform shell at startup.

use std::sync::Arc;

use once_cell::sync::OnceCell;

#[uniffi::export(callback_interface)]
pub trait DeviceAccess: Send + Sync + std::fmt::Debug + 'static {
    fn os_name(&self) -> String;
    fn os_version(&self) -> String;
}

static REF: OnceCell<Device> = OnceCell::new();

#[derive(Debug, Clone, uniffi::Object)]
pub struct Device(Arc<Box<dyn DeviceAccess>>);

impl Device {
    /// Returns the global device instance
    ///
    /// # Panics
    ///
    /// Panics if the device has not been initialized
    pub fn global() -> &'static Device {
        #[cfg(test)]
        {
            REF.get_or_init(|| Device(Arc::new(Box::new(TestDevice))))
        }

        #[cfg(not(test))]
        REF.get().expect("device is not initialized")
    }

    /// OS name and release, e.g. "Android 15"
    pub fn platform_version(&self) -> String {
        format!("{} {}", self.0.os_name(), self.0.os_version())
    }
}

#[uniffi::export]
impl Device {
    #[uniffi::constructor]
    pub fn new(device: Box<dyn DeviceAccess>) -> Self {
        if let Some(me) = REF.get() {
            tracing::warn!("device is already initialized");
            return me.clone();
        }

        let me = Self(Arc::new(device));
        REF.set(me).expect("failed to set device");

        Device::global().clone()
    }
}

#[cfg(test)]
#[derive(Debug)]
struct TestDevice;

#[cfg(test)]
impl DeviceAccess for TestDevice {
    fn os_name(&self) -> String {
        "Android".to_string()
    }

    fn os_version(&self) -> String {
        "15".to_string()
    }
}
