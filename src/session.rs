//! Scan session state machine.
//!
//! A [`ScanSession`] lives for one presentation of the platform scanning
//! surface. It subscribes to the camera [`FrameSource`] once permission is
//! granted, forwards frames to the [`BarcodeDecoder`], and reports the first
//! successfully decoded payload exactly once, even when decode completions for
//! several in-flight frames race. The terminal outcome is handed back to the
//! bridge through a single-use channel sender.
//!
//! State machine: `Idle → AwaitingPermission → Scanning → Completed`.
//! `Scanning` is the only state in which frames reach the decoder. Entering
//! `Completed` tears down the frame subscription exactly once; anything that
//! arrives afterwards is a no-op.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, error, warn};

use crate::{
    decoder::{BarcodeDecoder, DecodeListener},
    frame::{Frame, FrameSink, FrameSource, SubscriptionHandle},
};

/// Terminal result of one scan session
#[derive(Debug, Clone, PartialEq, Eq, uniffi::Enum)]
pub enum ScanOutcome {
    /// A barcode was recognized
    Decoded { payload: String },
    /// The user closed the surface without a result, or denied the camera
    /// permission
    Cancelled,
    /// The session could not run (camera unavailable, surface failure)
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum SessionState {
    Idle,
    AwaitingPermission,
    Scanning,
    Completed(ScanOutcome),
}

/// State owned exclusively by one session, guarded by one mutex.
///
/// The terminal check-and-set in [`SessionInner::complete`] happens under this
/// mutex, which is what makes "first decode wins" safe under concurrent
/// completions.
#[derive(Debug)]
struct SessionShared {
    state: SessionState,
    subscription: Option<SubscriptionHandle>,
    reporter: Option<flume::Sender<ScanOutcome>>,
}

#[derive(Debug)]
struct SessionInner {
    source: Arc<dyn FrameSource>,
    decoder: Arc<dyn BarcodeDecoder>,
    shared: Mutex<SessionShared>,
}

/// One scan session, driven by the platform scanning surface via the bridge
#[derive(Debug, uniffi::Object)]
pub struct ScanSession {
    inner: Arc<SessionInner>,
}

impl ScanSession {
    pub(crate) fn new(
        source: Arc<dyn FrameSource>,
        decoder: Arc<dyn BarcodeDecoder>,
        reporter: flume::Sender<ScanOutcome>,
    ) -> Arc<Self> {
        Arc::new(Self {
            inner: Arc::new(SessionInner {
                source,
                decoder,
                shared: Mutex::new(SessionShared {
                    state: SessionState::Idle,
                    subscription: None,
                    reporter: Some(reporter),
                }),
            }),
        })
    }

    /// Move out of `Idle`; the surface requests the camera permission next
    pub(crate) fn begin(&self) {
        let mut shared = self.inner.shared.lock();
        match shared.state {
            SessionState::Idle => {
                debug!("session awaiting camera permission");
                shared.state = SessionState::AwaitingPermission;
            }
            ref state => warn!("begin called in state {state:?}, ignoring"),
        }
    }

    pub(crate) fn is_finished(&self) -> bool {
        matches!(self.inner.shared.lock().state, SessionState::Completed(_))
    }
}

#[uniffi::export]
impl ScanSession {
    /// Camera permission granted, bind to the frame source and start scanning
    pub fn permission_granted(&self) {
        {
            let mut shared = self.inner.shared.lock();
            match shared.state {
                SessionState::AwaitingPermission => shared.state = SessionState::Scanning,
                ref state => {
                    warn!("permission granted in state {state:?}, ignoring");
                    return;
                }
            }
        }

        // subscribe outside the lock, the source may deliver frames
        // synchronously
        let sink: Arc<dyn FrameSink> = Arc::new(SessionSink(self.inner.clone()));
        match self.inner.source.subscribe(sink) {
            Ok(handle) => {
                let mut shared = self.inner.shared.lock();
                if shared.state == SessionState::Scanning {
                    debug!("subscribed to frame source");
                    shared.subscription = Some(handle);
                } else {
                    // completed while we were binding, release immediately
                    drop(shared);
                    self.inner.source.unsubscribe(handle);
                }
            }
            Err(err) => {
                error!("unable to subscribe to frame source: {err}");
                self.inner.complete(ScanOutcome::Failed { reason: err.to_string() });
            }
        }
    }

    /// Camera permission denied, the scan resolves as cancelled
    pub fn permission_denied(&self) {
        debug!("camera permission denied");
        self.inner.complete(ScanOutcome::Cancelled);
    }

    /// User closed the scanning surface without a result
    pub fn cancel(&self) {
        debug!("scan cancelled by user");
        self.inner.complete(ScanOutcome::Cancelled);
    }

    /// Unrecoverable surface or camera failure
    pub fn fail(&self, reason: String) {
        error!("scan session failed: {reason}");
        self.inner.complete(ScanOutcome::Failed { reason });
    }
}

/// Frame sink registered with the frame source for one session
#[derive(Debug)]
struct SessionSink(Arc<SessionInner>);

impl FrameSink for SessionSink {
    fn on_frame(&self, frame: Frame) {
        SessionInner::handle_frame(&self.0, frame);
    }
}

/// Decode listener for one submitted frame
#[derive(Debug)]
struct FrameListener(Arc<SessionInner>);

impl DecodeListener for FrameListener {
    fn on_payloads(&self, payloads: Vec<String>) {
        match payloads.into_iter().next() {
            Some(payload) => {
                debug!("barcode detected: {payload}");
                self.0.complete(ScanOutcome::Decoded { payload });
            }
            None => debug!("frame carried no barcodes"),
        }
    }

    fn on_decode_error(&self, message: String) {
        // one frame failing to decode is not fatal, keep scanning
        debug!("frame decode failed: {message}");
    }
}

impl SessionInner {
    fn handle_frame(self: &Arc<Self>, frame: Frame) {
        {
            let shared = self.shared.lock();
            if shared.state != SessionState::Scanning {
                return;
            }
        }

        let listener: Arc<dyn DecodeListener> = Arc::new(FrameListener(self.clone()));
        self.decoder.decode(frame, listener);
    }

    /// Terminal check-and-set. The first caller wins; everything after is a
    /// no-op. Takes the subscription and the reporter out of the shared state
    /// so teardown and the outcome handoff each happen exactly once.
    fn complete(&self, outcome: ScanOutcome) {
        let (subscription, reporter) = {
            let mut shared = self.shared.lock();
            if let SessionState::Completed(ref first) = shared.state {
                debug!("session already completed with {first:?}, discarding {outcome:?}");
                return;
            }

            shared.state = SessionState::Completed(outcome.clone());
            (shared.subscription.take(), shared.reporter.take())
        };

        if let Some(handle) = subscription {
            self.source.unsubscribe(handle);
        }

        if let Some(reporter) = reporter {
            if reporter.send(outcome).is_err() {
                warn!("bridge dropped the outcome receiver");
            }
        }
    }
}
