//! Hardware key source
//!
//! A hardware device is modelled by what it can do rather than how it is
//! reached: report a public key for a path and sign a payload at a path.
//! [`DeviceKeySource`] adds the host-side guarantees: every request has a
//! finite timeout and can be cancelled, e.g. on Ctrl-C.
//!
//! [`MemoryDevice`] is an in-memory device backed by a seed, used in tests and
//! for exercising the hardware path without a physical device.

use crate::hd::{ExtendedKey, HdPath};
use crate::key_source::{KeySource, KeySourceKind};
use crate::keypair::{PUBLIC_KEY_LEN, SIGNATURE_LEN};
use crate::mnemonic::Seed;
use crate::wallet::{Wallet, WalletError};
use ed25519_dalek::{Signer, SigningKey};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;

/// Time allowed for a single device request.
pub const DEFAULT_DEVICE_TIMEOUT: Duration = Duration::from_secs(30);

/// Exit status used when an interrupt arrives outside a device request.
pub const INTERRUPT_EXIT_CODE: i32 = 130;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("No compatible hardware device found")]
    DeviceNotFound,

    #[error("Hardware device is locked or the wallet app is not open")]
    DeviceLocked,

    #[error("Hardware device communication error: {0}")]
    DeviceCommunicationError(String),

    #[error("Hardware device did not respond within {0:?}")]
    DeviceTimeout(Duration),

    #[error("Request was rejected on the device")]
    DeviceRejected,

    #[error("Hardware device request was cancelled")]
    DeviceCancelled,
}

/// Capabilities of a connected signing device.
///
/// Implementations may block; callers go through [`DeviceKeySource`], which
/// bounds every call with a timeout.
pub trait HardwareDevice: Send + Sync {
    /// Check that the device is attached and ready to answer requests.
    fn probe(&self) -> Result<(), DeviceError>;

    fn public_key(&self, path: &HdPath) -> Result<[u8; PUBLIC_KEY_LEN], DeviceError>;

    fn sign(&self, path: &HdPath, payload: &[u8]) -> Result<[u8; SIGNATURE_LEN], DeviceError>;
}

/// Key source backed by a hardware device.
pub struct DeviceKeySource {
    device: Arc<dyn HardwareDevice>,
    timeout: Duration,
    cancel: CancellationToken,
    in_flight: Arc<AtomicBool>,
    interrupt_wired: AtomicBool,
    // Option so Drop can shut it down without waiting on stuck device calls
    runtime: Option<Runtime>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InterruptAction {
    CancelRequest,
    Terminate,
}

/// A first interrupt during a pending request cancels it. Any other
/// interrupt ends the process, as the default handler would have.
fn interrupt_action(cancel: &CancellationToken, in_flight: &AtomicBool) -> InterruptAction {
    if in_flight.load(Ordering::SeqCst) && !cancel.is_cancelled() {
        InterruptAction::CancelRequest
    } else {
        InterruptAction::Terminate
    }
}

async fn watch_interrupts(cancel: CancellationToken, in_flight: Arc<AtomicBool>) {
    while tokio::signal::ctrl_c().await.is_ok() {
        let action = interrupt_action(&cancel, &in_flight);
        cancel.cancel();
        match action {
            InterruptAction::CancelRequest => {
                log::warn!("interrupt received, cancelling hardware device request");
            }
            InterruptAction::Terminate => {
                log::warn!("interrupt received, exiting");
                std::process::exit(INTERRUPT_EXIT_CODE);
            }
        }
    }
}

struct PendingRequest<'a>(&'a AtomicBool);

impl<'a> PendingRequest<'a> {
    fn start(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for PendingRequest<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl DeviceKeySource {
    /// Connect to `device`, failing if it is absent or not ready.
    pub fn connect(device: Arc<dyn HardwareDevice>, timeout: Duration) -> Result<Self, DeviceError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| DeviceError::DeviceCommunicationError(e.to_string()))?;

        let source = Self {
            device,
            timeout,
            cancel: CancellationToken::new(),
            in_flight: Arc::new(AtomicBool::new(false)),
            interrupt_wired: AtomicBool::new(false),
            runtime: Some(runtime),
        };
        source.request(|device| device.probe())?;
        log::debug!("hardware device connected (timeout {:?})", timeout);
        Ok(source)
    }

    /// Token that aborts in-flight and future requests when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancel device requests when the process receives Ctrl-C.
    ///
    /// Installing the handler replaces the default SIGINT behaviour for the
    /// rest of the process. The listener runs on its own thread, so an
    /// interrupt between requests (at a later password prompt, say) still
    /// ends the process with [`INTERRUPT_EXIT_CODE`].
    pub fn cancel_on_interrupt(&self) -> Result<(), DeviceError> {
        if self.interrupt_wired.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let cancel = self.cancel.clone();
        let in_flight = Arc::clone(&self.in_flight);
        std::thread::Builder::new()
            .name("device-interrupt".to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        log::warn!("interrupt listener unavailable: {}", e);
                        return;
                    }
                };
                runtime.block_on(watch_interrupts(cancel, in_flight));
            })
            .map_err(|e| DeviceError::DeviceCommunicationError(e.to_string()))?;
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn request<T, F>(&self, call: F) -> Result<T, DeviceError>
    where
        T: Send + 'static,
        F: FnOnce(&dyn HardwareDevice) -> Result<T, DeviceError> + Send + 'static,
    {
        if self.cancel.is_cancelled() {
            return Err(DeviceError::DeviceCancelled);
        }
        let runtime = self
            .runtime
            .as_ref()
            .ok_or(DeviceError::DeviceCancelled)?;

        let device = Arc::clone(&self.device);
        let cancel = self.cancel.clone();
        let timeout = self.timeout;
        let _pending = PendingRequest::start(&self.in_flight);

        runtime.block_on(async move {
            let task = tokio::task::spawn_blocking(move || call(device.as_ref()));
            tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(DeviceError::DeviceCancelled),
                result = tokio::time::timeout(timeout, task) => match result {
                    Err(_) => {
                        log::warn!("hardware device request timed out after {:?}", timeout);
                        Err(DeviceError::DeviceTimeout(timeout))
                    }
                    Ok(Err(join)) => Err(DeviceError::DeviceCommunicationError(join.to_string())),
                    Ok(Ok(reply)) => reply,
                },
            }
        })
    }
}

impl KeySource for DeviceKeySource {
    fn kind(&self) -> KeySourceKind {
        KeySourceKind::Hardware
    }

    fn public_key(&self, path: &HdPath) -> Result<[u8; PUBLIC_KEY_LEN], WalletError> {
        let path = path.clone();
        Ok(self.request(move |device| device.public_key(&path))?)
    }

    fn sign(&self, path: &HdPath, payload: &[u8]) -> Result<[u8; SIGNATURE_LEN], WalletError> {
        let path = path.clone();
        let payload = payload.to_vec();
        Ok(self.request(move |device| device.sign(&path, &payload))?)
    }
}

impl Drop for DeviceKeySource {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

impl std::fmt::Debug for DeviceKeySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceKeySource")
            .field("timeout", &self.timeout)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// Build a public-key-only wallet of `n` accounts from a device.
pub fn derive_from_device(source: &DeviceKeySource, n: usize) -> Result<Wallet, WalletError> {
    Wallet::from_key_source(source, n, None)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    Ready,
    Locked,
    Disconnected,
}

/// In-memory stand-in for a hardware wallet.
pub struct MemoryDevice {
    seed: Seed,
    state: DeviceState,
    reject_signing: bool,
    latency: Duration,
}

impl MemoryDevice {
    pub fn from_seed(seed: Seed) -> Self {
        Self {
            seed,
            state: DeviceState::Ready,
            reject_signing: false,
            latency: Duration::ZERO,
        }
    }

    pub fn with_state(mut self, state: DeviceState) -> Self {
        self.state = state;
        self
    }

    /// Simulate the user declining every signing request on the device.
    pub fn rejecting_signatures(mut self) -> Self {
        self.reject_signing = true;
        self
    }

    /// Delay every answer, to exercise timeouts.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    fn ready(&self) -> Result<(), DeviceError> {
        if !self.latency.is_zero() {
            std::thread::sleep(self.latency);
        }
        match self.state {
            DeviceState::Ready => Ok(()),
            DeviceState::Locked => Err(DeviceError::DeviceLocked),
            DeviceState::Disconnected => Err(DeviceError::DeviceNotFound),
        }
    }

    fn signing_key(&self, path: &HdPath) -> SigningKey {
        SigningKey::from_bytes(ExtendedKey::derive_path(&self.seed, path).private_key())
    }
}

impl HardwareDevice for MemoryDevice {
    fn probe(&self) -> Result<(), DeviceError> {
        self.ready()
    }

    fn public_key(&self, path: &HdPath) -> Result<[u8; PUBLIC_KEY_LEN], DeviceError> {
        self.ready()?;
        Ok(self.signing_key(path).verifying_key().to_bytes())
    }

    fn sign(&self, path: &HdPath, payload: &[u8]) -> Result<[u8; SIGNATURE_LEN], DeviceError> {
        self.ready()?;
        if self.reject_signing {
            return Err(DeviceError::DeviceRejected);
        }
        Ok(self.signing_key(path).sign(payload).to_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keypair::verify_signature;

    fn device() -> MemoryDevice {
        MemoryDevice::from_seed(Seed::from_bytes([5u8; 64]))
    }

    fn connect(device: MemoryDevice) -> Result<DeviceKeySource, DeviceError> {
        DeviceKeySource::connect(Arc::new(device), Duration::from_secs(5))
    }

    #[test]
    fn test_disconnected_device_not_found() {
        let result = connect(device().with_state(DeviceState::Disconnected));
        assert_eq!(result.err(), Some(DeviceError::DeviceNotFound));
    }

    #[test]
    fn test_locked_device() {
        let result = connect(device().with_state(DeviceState::Locked));
        assert_eq!(result.err(), Some(DeviceError::DeviceLocked));
    }

    #[test]
    fn test_public_key_matches_seed_derivation() {
        let source = connect(device()).unwrap();
        let expected = crate::keypair::Keypair::derive(
            &Seed::from_bytes([5u8; 64]),
            HdPath::account(0),
            "",
        );
        assert_eq!(
            &source.public_key(&HdPath::account(0)).unwrap(),
            expected.public_key()
        );
        assert_eq!(source.kind(), KeySourceKind::Hardware);
    }

    #[test]
    fn test_sign_through_device() {
        let source = connect(device()).unwrap();
        let path = HdPath::account(2);
        let signature = source.sign(&path, b"spend").unwrap();
        let public = source.public_key(&path).unwrap();
        assert!(verify_signature(&public, b"spend", &signature).is_ok());
    }

    #[test]
    fn test_rejected_signature() {
        let source = connect(device().rejecting_signatures()).unwrap();
        match source.sign(&HdPath::account(0), b"spend") {
            Err(WalletError::Device(DeviceError::DeviceRejected)) => {}
            other => panic!("Expected DeviceRejected, got {:?}", other),
        }
    }

    #[test]
    fn test_request_times_out() {
        let slow = device().with_latency(Duration::from_millis(500));
        let result = DeviceKeySource::connect(Arc::new(slow), Duration::from_millis(20));
        assert_eq!(
            result.err(),
            Some(DeviceError::DeviceTimeout(Duration::from_millis(20)))
        );
    }

    #[test]
    fn test_cancelled_source_fails_fast() {
        let source = connect(device()).unwrap();
        source.cancellation_token().cancel();
        match source.public_key(&HdPath::account(0)) {
            Err(WalletError::Device(DeviceError::DeviceCancelled)) => {}
            other => panic!("Expected DeviceCancelled, got {:?}", other),
        }
    }

    #[test]
    fn test_interrupt_cancels_only_pending_request() {
        let cancel = CancellationToken::new();
        let in_flight = AtomicBool::new(false);
        assert_eq!(interrupt_action(&cancel, &in_flight), InterruptAction::Terminate);

        in_flight.store(true, Ordering::SeqCst);
        assert_eq!(
            interrupt_action(&cancel, &in_flight),
            InterruptAction::CancelRequest
        );

        // a second interrupt while the request winds down ends the process
        cancel.cancel();
        assert_eq!(interrupt_action(&cancel, &in_flight), InterruptAction::Terminate);
    }

    #[test]
    fn test_request_marks_itself_pending() {
        let slow = device().with_latency(Duration::from_millis(200));
        let source = DeviceKeySource::connect(Arc::new(slow), Duration::from_secs(10)).unwrap();
        assert!(!source.in_flight.load(Ordering::SeqCst));

        let flag = Arc::clone(&source.in_flight);
        let observer = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            flag.load(Ordering::SeqCst)
        });
        source.public_key(&HdPath::account(0)).unwrap();
        assert!(observer.join().unwrap());
        assert!(!source.in_flight.load(Ordering::SeqCst));
    }

    #[test]
    fn test_cancel_on_interrupt_keeps_source_usable() {
        let source = connect(device()).unwrap();
        source.cancel_on_interrupt().unwrap();
        source.cancel_on_interrupt().unwrap();
        assert!(source.public_key(&HdPath::account(1)).is_ok());
        assert!(!source.cancellation_token().is_cancelled());
    }

    #[test]
    fn test_cancel_interrupts_in_flight_request() {
        let slow = device().with_latency(Duration::from_millis(300));
        // connect with a generous timeout, then cancel while a request is pending
        let source = DeviceKeySource::connect(Arc::new(slow), Duration::from_secs(10)).unwrap();
        let token = source.cancellation_token();
        let canceller = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            token.cancel();
        });
        let result = source.public_key(&HdPath::account(0));
        canceller.join().unwrap();
        assert!(matches!(
            result,
            Err(WalletError::Device(DeviceError::DeviceCancelled))
        ));
    }
}
