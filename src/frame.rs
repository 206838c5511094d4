//! Camera frame types and the frame source seam.
//!
//! The platform shell owns the camera pipeline; this crate only sees it as a
//! [`FrameSource`] it can subscribe a [`FrameSink`] to. The active
//! [`crate::session::ScanSession`] is the sink.

use std::sync::Arc;

/// One image captured from the camera pipeline, handed to the decoder
#[derive(Debug, Clone, uniffi::Record)]
pub struct Frame {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Rotation the decoder needs to apply, in degrees
    pub rotation_degrees: u32,
}

/// Opaque handle identifying one active frame subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, derive_more::From, derive_more::Into)]
pub struct SubscriptionHandle(pub u64);

uniffi::custom_newtype!(SubscriptionHandle, u64);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, uniffi::Error)]
#[uniffi::export(Display)]
pub enum FrameSourceError {
    #[error("camera unavailable: {0}")]
    CameraUnavailable(String),

    #[error("camera binding failed: {0}")]
    BindingFailed(String),
}

/// Consumer of camera frames, registered with a [`FrameSource`]
#[uniffi::export(with_foreign)]
pub trait FrameSink: Send + Sync + std::fmt::Debug + 'static {
    fn on_frame(&self, frame: Frame);
}

/// The camera pipeline, implemented by the platform shell.
///
/// Implementations must tolerate `unsubscribe` being called from within a
/// frame-sink callback. The session guarantees it unsubscribes each handle at
/// most once.
#[uniffi::export(with_foreign)]
pub trait FrameSource: Send + Sync + std::fmt::Debug + 'static {
    fn subscribe(&self, sink: Arc<dyn FrameSink>) -> Result<SubscriptionHandle, FrameSourceError>;
    fn unsubscribe(&self, handle: SubscriptionHandle);
}
