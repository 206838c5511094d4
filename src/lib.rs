pub mod bridge;
pub mod decoder;
pub mod device;
pub mod frame;
pub mod method;
pub mod session;

pub(crate) mod logging;

uniffi::setup_scaffolding!();
