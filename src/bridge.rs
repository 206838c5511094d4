//! The scan bridge: request/reply mediator between the application layer and
//! the native scanning surface.
//!
//! [`ScanBridge`] accepts a single logical "start scan" request at a time,
//! launches a [`ScanSession`] on the host scanning surface, and maps the
//! session's eventual outcome to one reply. The host context (the
//! activity-equivalent) is injected explicitly through [`ScanBridge::attach_host`]
//! and [`ScanBridge::detach_host`] rather than inherited from a platform
//! lifecycle base class; re-attaching after a configuration change never
//! disturbs an outstanding request.

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Instant,
};

use parking_lot::{Mutex, RwLock};
use tap::TapFallible as _;
use tracing::{debug, error, warn};

use crate::{
    decoder::BarcodeDecoder,
    device::Device,
    frame::FrameSource,
    method::{Method, MethodReply},
    session::{ScanOutcome, ScanSession},
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, uniffi::Error)]
#[uniffi::export(Display)]
pub enum ScanError {
    #[error("plugin not attached to an activity")]
    NoActivity,

    #[error("a barcode scan is already in progress")]
    AlreadyActive,

    #[error("failed to start scanner: {0}")]
    StartFailed(String),

    #[error("method not implemented: {0}")]
    NotImplemented(String),
}

impl ScanError {
    /// Stable error code reported over the method channel
    pub fn code(&self) -> &'static str {
        match self {
            ScanError::NoActivity => "NO_ACTIVITY",
            ScanError::AlreadyActive => "ALREADY_ACTIVE",
            ScanError::StartFailed(_) => "START_FAILED",
            ScanError::NotImplemented(_) => "NOT_IMPLEMENTED",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, uniffi::Error)]
#[uniffi::export(Display)]
pub enum LaunchError {
    #[error("unable to launch scanner: {0}")]
    Launch(String),
}

/// The platform scanning surface, implemented by the platform shell.
///
/// After a successful `launch_scanner` the surface requests the camera
/// permission and drives the active session through the bridge
/// ([`ScanBridge::permission_result`], [`ScanBridge::cancel_scan`],
/// [`ScanBridge::fail_scan`]) and the [`crate::frame::FrameSource`] seam.
#[uniffi::export(callback_interface)]
pub trait HostSurface: Send + Sync + std::fmt::Debug + 'static {
    /// Present the scanning screen
    fn launch_scanner(&self) -> Result<(), LaunchError>;

    /// Close the scanning screen, called once per finished request
    fn dismiss_scanner(&self);

    /// Short user-facing notice, e.g. a toast
    fn show_notice(&self, message: String);
}

/// The single outstanding scan request, owned exclusively by the bridge
#[derive(Debug)]
struct PendingScan {
    id: u64,
    started_at: Instant,
    session: Arc<ScanSession>,
}

#[derive(Debug, uniffi::Object)]
pub struct ScanBridge {
    source: Arc<dyn FrameSource>,
    decoder: Arc<dyn BarcodeDecoder>,
    host: RwLock<Option<Arc<Box<dyn HostSurface>>>>,
    pending: Mutex<Option<PendingScan>>,
    next_request_id: AtomicU64,
}

#[uniffi::export]
impl ScanBridge {
    #[uniffi::constructor]
    pub fn new(source: Arc<dyn FrameSource>, decoder: Arc<dyn BarcodeDecoder>) -> Self {
        crate::logging::init();

        Self {
            source,
            decoder,
            host: RwLock::new(None),
            pending: Mutex::new(None),
            next_request_id: AtomicU64::new(1),
        }
    }

    // MARK: host lifecycle

    /// Inject the current host context, also called on re-attach after a
    /// configuration change
    pub fn attach_host(&self, host: Box<dyn HostSurface>) {
        debug!("host attached");
        *self.host.write() = Some(Arc::new(host));
    }

    pub fn detach_host(&self) {
        debug!("host detached");
        *self.host.write() = None;
    }

    // MARK: session driving, called by the scanning surface

    /// Outcome of the camera permission request for the active scan
    pub fn permission_result(&self, granted: bool) {
        let Some(session) = self.active_session() else {
            warn!("permission result received with no scan outstanding");
            return;
        };

        if granted {
            session.permission_granted();
        } else {
            session.permission_denied();
        }
    }

    /// User closed the scanning surface without a result
    pub fn cancel_scan(&self) {
        let Some(session) = self.active_session() else {
            warn!("cancel received with no scan outstanding");
            return;
        };

        session.cancel();
    }

    /// Unrecoverable scanning surface failure
    pub fn fail_scan(&self, reason: String) {
        let Some(session) = self.active_session() else {
            warn!("failure received with no scan outstanding: {reason}");
            return;
        };

        session.fail(reason);
    }

    /// The session for the outstanding scan request, if any
    pub fn active_session(&self) -> Option<Arc<ScanSession>> {
        self.pending.lock().as_ref().map(|pending| pending.session.clone())
    }

    // MARK: queries

    /// Host OS version string, e.g. "Android 15"
    pub fn platform_version(&self) -> String {
        let version = Device::global().platform_version();
        debug!("platform version: {version}");

        version
    }
}

#[uniffi::export(async_runtime = "tokio")]
impl ScanBridge {
    /// Start a scan and suspend until it resolves.
    ///
    /// Returns the decoded payload, `None` when the user cancelled (or denied
    /// the camera permission), or a [`ScanError`] when no host is attached,
    /// a scan is already outstanding, or the scanner could not run. At most
    /// one request is outstanding at any time; a rejected call never disturbs
    /// the outstanding one.
    pub async fn scan_barcode(&self) -> Result<Option<String>, ScanError> {
        let host = self
            .host
            .read()
            .clone()
            .ok_or(ScanError::NoActivity)
            .tap_err(|_| error!("scan requested but no host is attached"))?;

        let (reporter, outcomes) = flume::bounded(1);

        {
            let mut pending = self.pending.lock();
            if let Some(active) = pending.as_ref() {
                warn!(request = active.id, "scan already in progress");
                return Err(ScanError::AlreadyActive);
            }

            let id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
            let session = ScanSession::new(self.source.clone(), self.decoder.clone(), reporter);
            session.begin();

            debug!(request = id, "scan request accepted");
            *pending = Some(PendingScan { id, started_at: Instant::now(), session });
        }

        if let Err(err) = host.launch_scanner() {
            error!("scanner launch failed: {err}");
            self.clear_pending();
            return Err(ScanError::StartFailed(err.to_string()));
        }

        // suspends until the session reaches a terminal state, bounded only
        // by user action
        let outcome = outcomes.recv_async().await.unwrap_or_else(|_| ScanOutcome::Failed {
            reason: "scan session dropped without an outcome".to_string(),
        });

        self.clear_pending();
        host.dismiss_scanner();

        match outcome {
            ScanOutcome::Decoded { payload } => {
                debug!("barcode scanned: {payload}");
                Ok(Some(payload))
            }
            ScanOutcome::Cancelled => {
                debug!("scan resolved as cancelled");
                Ok(None)
            }
            ScanOutcome::Failed { reason } => {
                error!("scan failed: {reason}");
                host.show_notice(reason.clone());
                Err(ScanError::StartFailed(reason))
            }
        }
    }

    /// String-keyed entry point for the host framework's method channel
    pub async fn handle_method(&self, name: String) -> Result<MethodReply, ScanError> {
        debug!("method called: {name}");

        match Method::parse(&name)? {
            Method::ScanBarcode => {
                let payload = self.scan_barcode().await?;
                Ok(MethodReply::Barcode { payload })
            }
            Method::GetPlatformVersion => {
                Ok(MethodReply::PlatformVersion { version: self.platform_version() })
            }
        }
    }
}

impl ScanBridge {
    /// Clears the outstanding request slot, exactly once per request
    fn clear_pending(&self) {
        if let Some(finished) = self.pending.lock().take() {
            debug!(
                request = finished.id,
                elapsed_ms = finished.started_at.elapsed().as_millis() as u64,
                "scan request finished"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicBool, AtomicU32},
        time::Duration,
    };

    use super::*;
    use crate::{
        decoder::DecodeListener,
        frame::{Frame, FrameSink, FrameSourceError, SubscriptionHandle},
    };

    fn frame() -> Frame {
        Frame { bytes: vec![0; 16], width: 4, height: 4, rotation_degrees: 0 }
    }

    #[derive(Debug, Default)]
    struct SharedSource {
        sinks: Mutex<Vec<Arc<dyn FrameSink>>>,
        unsubscribes: AtomicU32,
    }

    impl FrameSource for SharedSource {
        fn subscribe(
            &self,
            sink: Arc<dyn FrameSink>,
        ) -> Result<SubscriptionHandle, FrameSourceError> {
            self.sinks.lock().push(sink);
            Ok(SubscriptionHandle(1))
        }

        fn unsubscribe(&self, _handle: SubscriptionHandle) {
            self.unsubscribes.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Decoder that completes every frame immediately with one payload
    #[derive(Debug)]
    struct EchoDecoder(String);

    impl BarcodeDecoder for EchoDecoder {
        fn decode(&self, _frame: Frame, listener: Arc<dyn DecodeListener>) {
            listener.on_payloads(vec![self.0.clone()]);
        }
    }

    #[derive(Debug, Default)]
    struct HostStats {
        launches: AtomicU32,
        dismissals: AtomicU32,
        notices: Mutex<Vec<String>>,
        fail_launch: AtomicBool,
    }

    #[derive(Debug)]
    struct FakeHost(Arc<HostStats>);

    impl HostSurface for FakeHost {
        fn launch_scanner(&self) -> Result<(), LaunchError> {
            self.0.launches.fetch_add(1, Ordering::SeqCst);

            if self.0.fail_launch.load(Ordering::SeqCst) {
                return Err(LaunchError::Launch("no scanner activity".to_string()));
            }

            Ok(())
        }

        fn dismiss_scanner(&self) {
            self.0.dismissals.fetch_add(1, Ordering::SeqCst);
        }

        fn show_notice(&self, message: String) {
            self.0.notices.lock().push(message);
        }
    }

    fn bridge_with(payload: &str) -> (Arc<ScanBridge>, Arc<SharedSource>, Arc<HostStats>) {
        let source = Arc::new(SharedSource::default());
        let decoder = Arc::new(EchoDecoder(payload.to_string()));
        let stats = Arc::new(HostStats::default());

        let bridge = Arc::new(ScanBridge::new(source.clone(), decoder));
        bridge.attach_host(Box::new(FakeHost(stats.clone())));

        (bridge, source, stats)
    }

    async fn wait_for_active_scan(bridge: &ScanBridge) -> Arc<ScanSession> {
        for _ in 0..500 {
            if let Some(session) = bridge.active_session() {
                return session;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        panic!("scan never became active");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_scan_resolves_with_first_decoded_payload() {
        let (bridge, source, stats) = bridge_with("abc123");

        let task = tokio::spawn({
            let bridge = bridge.clone();
            async move { bridge.scan_barcode().await }
        });

        wait_for_active_scan(&bridge).await;
        bridge.permission_result(true);

        let sink = source.sinks.lock().first().expect("subscribed").clone();
        sink.on_frame(frame());

        let reply = task.await.unwrap();
        assert_eq!(reply, Ok(Some("abc123".to_string())));
        assert_eq!(stats.launches.load(Ordering::SeqCst), 1);
        assert_eq!(stats.dismissals.load(Ordering::SeqCst), 1);
        assert_eq!(source.unsubscribes.load(Ordering::SeqCst), 1);

        // the slot is free again
        assert!(bridge.active_session().is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_second_scan_is_rejected_without_disturbing_the_first() {
        let (bridge, source, stats) = bridge_with("abc123");

        let task = tokio::spawn({
            let bridge = bridge.clone();
            async move { bridge.scan_barcode().await }
        });

        wait_for_active_scan(&bridge).await;

        // rapid second call fails immediately
        assert_eq!(bridge.scan_barcode().await, Err(ScanError::AlreadyActive));
        assert_eq!(stats.launches.load(Ordering::SeqCst), 1);

        // first request still resolves normally
        bridge.permission_result(true);
        let sink = source.sinks.lock().first().expect("subscribed").clone();
        sink.on_frame(frame());

        assert_eq!(task.await.unwrap(), Ok(Some("abc123".to_string())));
        assert_eq!(stats.dismissals.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_cancelled_scan_resolves_to_none() {
        let (bridge, _source, stats) = bridge_with("unused");

        let task = tokio::spawn({
            let bridge = bridge.clone();
            async move { bridge.scan_barcode().await }
        });

        wait_for_active_scan(&bridge).await;
        bridge.cancel_scan();

        assert_eq!(task.await.unwrap(), Ok(None));
        assert_eq!(stats.dismissals.load(Ordering::SeqCst), 1);
        assert!(stats.notices.lock().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_permission_denied_resolves_to_none_not_an_error() {
        let (bridge, source, _stats) = bridge_with("unused");

        let task = tokio::spawn({
            let bridge = bridge.clone();
            async move { bridge.scan_barcode().await }
        });

        wait_for_active_scan(&bridge).await;
        bridge.permission_result(false);

        assert_eq!(task.await.unwrap(), Ok(None));
        assert!(source.sinks.lock().is_empty(), "camera must never be bound");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_surface_failure_resolves_to_error_with_notice() {
        let (bridge, _source, stats) = bridge_with("unused");

        let task = tokio::spawn({
            let bridge = bridge.clone();
            async move { bridge.scan_barcode().await }
        });

        wait_for_active_scan(&bridge).await;
        bridge.fail_scan("camera binding failed".to_string());

        let reply = task.await.unwrap();
        assert_eq!(reply, Err(ScanError::StartFailed("camera binding failed".to_string())));
        assert_eq!(reply.unwrap_err().code(), "START_FAILED");
        assert_eq!(stats.notices.lock().clone(), vec!["camera binding failed".to_string()]);
    }

    #[tokio::test]
    async fn test_scan_without_host_fails_with_no_activity() {
        let (bridge, _source, _stats) = bridge_with("unused");
        bridge.detach_host();

        let err = bridge.scan_barcode().await.unwrap_err();
        assert_eq!(err, ScanError::NoActivity);
        assert_eq!(err.code(), "NO_ACTIVITY");
    }

    #[tokio::test]
    async fn test_launch_failure_clears_the_request_slot() {
        let (bridge, _source, stats) = bridge_with("unused");
        stats.fail_launch.store(true, Ordering::SeqCst);

        let first = bridge.scan_barcode().await.unwrap_err();
        assert!(matches!(first, ScanError::StartFailed(_)));
        assert!(bridge.active_session().is_none());

        // a retry is rejected for the same reason, not as AlreadyActive
        let second = bridge.scan_barcode().await.unwrap_err();
        assert!(matches!(second, ScanError::StartFailed(_)));
        assert_eq!(stats.launches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_reattach_during_scan_does_not_disturb_the_request() {
        let (bridge, source, _stats) = bridge_with("abc123");

        let task = tokio::spawn({
            let bridge = bridge.clone();
            async move { bridge.scan_barcode().await }
        });

        wait_for_active_scan(&bridge).await;

        // configuration change: host detaches and a new one attaches
        bridge.detach_host();
        let new_stats = Arc::new(HostStats::default());
        bridge.attach_host(Box::new(FakeHost(new_stats.clone())));

        bridge.permission_result(true);
        let sink = source.sinks.lock().first().expect("subscribed").clone();
        sink.on_frame(frame());

        assert_eq!(task.await.unwrap(), Ok(Some("abc123".to_string())));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_handle_method_dispatch() {
        let (bridge, source, _stats) = bridge_with("abc123");

        assert_eq!(
            bridge.handle_method("getPlatformVersion".to_string()).await,
            Ok(MethodReply::PlatformVersion { version: "Android 15".to_string() })
        );

        assert_eq!(
            bridge.handle_method("openSettings".to_string()).await,
            Err(ScanError::NotImplemented("openSettings".to_string()))
        );

        let task = tokio::spawn({
            let bridge = bridge.clone();
            async move { bridge.handle_method("scanBarcode".to_string()).await }
        });

        wait_for_active_scan(&bridge).await;
        bridge.permission_result(true);
        let sink = source.sinks.lock().first().expect("subscribed").clone();
        sink.on_frame(frame());

        assert_eq!(
            task.await.unwrap(),
            Ok(MethodReply::Barcode { payload: Some("abc123".to_string()) })
        );
    }

    #[test]
    fn test_driving_calls_without_a_scan_are_no_ops() {
        let (bridge, source, stats) = bridge_with("unused");

        bridge.permission_result(true);
        bridge.cancel_scan();
        bridge.fail_scan("stray".to_string());

        assert!(source.sinks.lock().is_empty());
        assert_eq!(stats.dismissals.load(Ordering::SeqCst), 0);
    }
}
