//! The barcode decoder seam.
//!
//! The platform shell wraps its ML barcode library behind [`BarcodeDecoder`].
//! Decoding is asynchronous and callback style: completions for different
//! frames may arrive in any order and on any thread.

use std::sync::Arc;

use crate::frame::Frame;

/// Receives the result of decoding one frame.
///
/// Exactly one of the two methods is called per `decode` call.
#[uniffi::export(with_foreign)]
pub trait DecodeListener: Send + Sync + std::fmt::Debug + 'static {
    /// Decode succeeded. `payloads` holds the recognized barcode payloads in
    /// the order the decoder supplied them, and may be empty.
    fn on_payloads(&self, payloads: Vec<String>);

    /// Decode of this one frame failed. Never fatal to the scan session.
    fn on_decode_error(&self, message: String);
}

/// The barcode recognition library, implemented by the platform shell
#[uniffi::export(with_foreign)]
pub trait BarcodeDecoder: Send + Sync + std::fmt::Debug + 'static {
    fn decode(&self, frame: Frame, listener: Arc<dyn DecodeListener>);
}
