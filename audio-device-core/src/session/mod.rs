//! Device sessions: lifecycle of one open playback or capture endpoint.

pub mod capture;
pub mod negotiation;
pub mod playback;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use uuid::Uuid;

use crate::models::config::DeviceConfig;
use crate::models::device::{frames_to_duration, ClockLatency, Device};
use crate::models::diagnostics::{SessionCounters, SessionDiagnostics, XrunReport};
use crate::models::error::{BackendError, DeviceError};
use crate::models::format::{Direction, NativeFormat};
use crate::models::state::SessionState;
use crate::traits::backend::{DeviceBackend, NativeStream, StreamCallback, StreamConfig};
use crate::traits::config_store::ConfigStore;
use crate::traits::device_delegate::DeviceDelegate;

pub use capture::CaptureSession;
pub use playback::PlaybackSession;

/// Operations shared by playback and capture sessions.
///
/// Everything here runs on the control thread.
pub trait SessionControl {
    /// Bind the session to a device. `None` selects the default device.
    fn open(&mut self, name: Option<&str>) -> Result<(), DeviceError>;

    /// Read back the format the backend actually opened.
    fn reset(&mut self) -> Result<(), DeviceError>;

    fn start(&mut self) -> Result<(), DeviceError>;

    /// Disarm the callback and stop the stream. Never fails; backend errors
    /// are logged and the session always ends up `Open`.
    fn stop(&mut self);

    /// Stop if running and release the stream. A no-op when already closed.
    fn close(&mut self);

    fn state(&self) -> SessionState;

    /// The opened device, `None` while closed.
    fn device(&self) -> Option<&Device>;

    fn diagnostics(&self) -> SessionDiagnostics;

    fn clock_latency(&self) -> ClockLatency;

    /// Report xruns accumulated since the previous poll.
    fn poll_xruns(&self) -> XrunReport;

    fn set_delegate(&mut self, delegate: Arc<dyn DeviceDelegate>);
}

/// A session of either direction, as handed out by a factory.
pub enum DeviceSession {
    Playback(PlaybackSession),
    Capture(CaptureSession),
}

impl DeviceSession {
    pub fn new(
        direction: Direction,
        backend: Arc<dyn DeviceBackend>,
        config: DeviceConfig,
        store: Arc<dyn ConfigStore>,
    ) -> Self {
        match direction {
            Direction::Playback => Self::Playback(PlaybackSession::new(backend, config, store)),
            Direction::Capture => Self::Capture(CaptureSession::new(backend, config, store)),
        }
    }

    pub fn direction(&self) -> Direction {
        match self {
            Self::Playback(_) => Direction::Playback,
            Self::Capture(_) => Direction::Capture,
        }
    }

    pub fn as_playback(&mut self) -> Option<&mut PlaybackSession> {
        match self {
            Self::Playback(session) => Some(session),
            Self::Capture(_) => None,
        }
    }

    pub fn as_capture(&mut self) -> Option<&mut CaptureSession> {
        match self {
            Self::Capture(session) => Some(session),
            Self::Playback(_) => None,
        }
    }

    pub fn into_playback(self) -> Option<PlaybackSession> {
        match self {
            Self::Playback(session) => Some(session),
            Self::Capture(_) => None,
        }
    }

    pub fn into_capture(self) -> Option<CaptureSession> {
        match self {
            Self::Capture(session) => Some(session),
            Self::Playback(_) => None,
        }
    }

    fn control(&self) -> &dyn SessionControl {
        match self {
            Self::Playback(session) => session,
            Self::Capture(session) => session,
        }
    }

    fn control_mut(&mut self) -> &mut dyn SessionControl {
        match self {
            Self::Playback(session) => session,
            Self::Capture(session) => session,
        }
    }
}

impl SessionControl for DeviceSession {
    fn open(&mut self, name: Option<&str>) -> Result<(), DeviceError> {
        self.control_mut().open(name)
    }

    fn reset(&mut self) -> Result<(), DeviceError> {
        self.control_mut().reset()
    }

    fn start(&mut self) -> Result<(), DeviceError> {
        self.control_mut().start()
    }

    fn stop(&mut self) {
        self.control_mut().stop()
    }

    fn close(&mut self) {
        self.control_mut().close()
    }

    fn state(&self) -> SessionState {
        self.control().state()
    }

    fn device(&self) -> Option<&Device> {
        self.control().device()
    }

    fn diagnostics(&self) -> SessionDiagnostics {
        self.control().diagnostics()
    }

    fn clock_latency(&self) -> ClockLatency {
        self.control().clock_latency()
    }

    fn poll_xruns(&self) -> XrunReport {
        self.control().poll_xruns()
    }

    fn set_delegate(&mut self, delegate: Arc<dyn DeviceDelegate>) {
        self.control_mut().set_delegate(delegate)
    }
}

/// State shared between the control thread and the real-time callback.
///
/// The callback only touches `T` while the gate is armed, and re-checks
/// the flag after taking the lock. `disarm` clears the flag and then takes
/// the lock once, so when it returns any in-flight callback has finished
/// and no later callback will touch `T`.
pub(crate) struct CallbackGate<T> {
    armed: AtomicBool,
    inner: Mutex<T>,
}

impl<T> CallbackGate<T> {
    pub(crate) fn new(inner: T) -> Self {
        Self {
            armed: AtomicBool::new(false),
            inner: Mutex::new(inner),
        }
    }

    pub(crate) fn arm(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }

    pub(crate) fn disarm(&self) {
        self.armed.store(false, Ordering::SeqCst);
        drop(self.inner.lock());
    }

    pub(crate) fn is_armed(&self) -> bool {
        self.armed.load(Ordering::SeqCst)
    }

    /// Control-thread access. Keep the guard for constant-time work only.
    pub(crate) fn lock(&self) -> MutexGuard<'_, T> {
        self.inner.lock()
    }

    /// Real-time access: runs `f` only while armed.
    pub(crate) fn with_armed<R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        if !self.is_armed() {
            return None;
        }
        let mut inner = self.inner.lock();
        if !self.is_armed() {
            return None;
        }
        Some(f(&mut inner))
    }
}

/// Lifecycle bookkeeping common to both session kinds.
pub(crate) struct SessionCore {
    pub(crate) id: Uuid,
    pub(crate) direction: Direction,
    pub(crate) backend: Arc<dyn DeviceBackend>,
    pub(crate) store: Arc<dyn ConfigStore>,
    pub(crate) config: DeviceConfig,
    pub(crate) state: SessionState,
    pub(crate) device: Option<Device>,
    pub(crate) stream: Option<Box<dyn NativeStream>>,
    pub(crate) native_format: Option<NativeFormat>,
    pub(crate) counters: Arc<SessionCounters>,
    pub(crate) delegate: Option<Arc<dyn DeviceDelegate>>,
    /// `reset` has run since `open`.
    pub(crate) configured: bool,
}

impl SessionCore {
    pub(crate) fn new(
        direction: Direction,
        backend: Arc<dyn DeviceBackend>,
        config: DeviceConfig,
        store: Arc<dyn ConfigStore>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            direction,
            backend,
            store,
            config,
            state: SessionState::Closed,
            device: None,
            stream: None,
            native_format: None,
            counters: Arc::new(SessionCounters::default()),
            delegate: None,
            configured: false,
        }
    }

    pub(crate) fn set_state(&mut self, state: SessionState) {
        if self.state == state {
            return;
        }
        log::debug!("{} session {}: {} -> {}", self.direction, self.id, self.state, state);
        self.state = state;
        if let Some(delegate) = &self.delegate {
            delegate.on_state_changed(state);
        }
    }

    pub(crate) fn require(&self, operation: &'static str, allowed: &[SessionState]) -> Result<(), DeviceError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(DeviceError::InvalidState {
                operation,
                state: self.state,
            })
        }
    }

    /// Log an error that is not returned to the caller and forward it to
    /// the delegate.
    pub(crate) fn report(&self, error: DeviceError) {
        log::error!("{} session {}: {}", self.direction, self.id, error);
        if let Some(delegate) = &self.delegate {
            delegate.on_error(&error);
        }
    }

    /// Resolve a requested device name to a backend index and the name the
    /// session will report.
    ///
    /// The default name (or `None`) honors the config store's index
    /// override before falling back to the backend's default device.
    pub(crate) fn resolve_device(&self, name: Option<&str>) -> Result<(usize, String), DeviceError> {
        let backend = &self.backend;
        let default_name = backend.default_device_name(self.direction);
        let names = backend.device_names(self.direction)?;

        match name {
            Some(name) if name != default_name => {
                let index = names
                    .iter()
                    .position(|n| n == name)
                    .ok_or_else(|| DeviceError::InvalidDevice(name.to_string()))?;
                Ok((index, name.to_string()))
            }
            _ => {
                let key = match self.direction {
                    Direction::Playback => "device",
                    Direction::Capture => "capture",
                };
                let index = match self.store.device_index(backend.config_block(), key) {
                    Some(index) if index < names.len() => {
                        log::debug!("{}.{} selects device {}", backend.config_block(), key, index);
                        index
                    }
                    Some(index) => {
                        return Err(DeviceError::InvalidDevice(format!(
                            "{}.{} = {} but only {} devices",
                            backend.config_block(),
                            key,
                            index,
                            names.len()
                        )))
                    }
                    None => {
                        let default = match self.direction {
                            Direction::Playback => backend.default_output_device(),
                            Direction::Capture => backend.default_input_device(),
                        };
                        default.ok_or_else(|| DeviceError::InvalidDevice(default_name.clone()))?
                    }
                };
                Ok((index, default_name))
            }
        }
    }

    /// Open a stream trying each format of `chain` in order.
    ///
    /// `callback` builds a fresh callback for each attempt, told which
    /// native format it will receive. Only format rejections move on to the
    /// next entry; any other backend failure ends the attempt.
    pub(crate) fn open_stream(
        &self,
        device_index: usize,
        device: &Device,
        channels: u16,
        update_size: Option<u32>,
        chain: &[NativeFormat],
        mut callback: impl FnMut(NativeFormat) -> StreamCallback,
    ) -> Result<(Box<dyn NativeStream>, NativeFormat), DeviceError> {
        let mut last_rejected = None;

        for (attempt, &format) in chain.iter().enumerate() {
            if attempt > 0 {
                log::info!(
                    "{}: {} rejected, retrying with {}",
                    device.name,
                    chain[attempt - 1],
                    format
                );
            }

            let config = StreamConfig {
                direction: self.direction,
                device: device_index,
                sample_rate: device.sample_rate,
                channels,
                format,
                update_size,
                suggested_latency: device.suggested_latency(),
            };
            log::debug!("opening {:?}", config);

            match self.backend.open_stream(&config, callback(format)) {
                Ok(stream) => return Ok((stream, format)),
                Err(BackendError::FormatRejected(rejected)) => last_rejected = Some(rejected),
                Err(e) => return Err(DeviceError::Backend(e)),
            }
        }

        log::debug!("{}: last rejected format {:?}", device.name, last_rejected);
        Err(DeviceError::UnsupportedFormat(device.sample_type))
    }

    /// Stop the native stream, logging instead of returning failures.
    pub(crate) fn stop_stream(&mut self) {
        let result = match self.stream.as_mut() {
            Some(stream) => stream.stop(),
            None => Ok(()),
        };
        if let Err(e) = result {
            self.report(e.into());
        }
    }

    pub(crate) fn close_stream(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.close() {
                self.report(e.into());
            }
        }
        self.device = None;
        self.native_format = None;
        self.configured = false;
    }

    pub(crate) fn format_description(&self) -> String {
        match &self.device {
            Some(device) => format!(
                "{} {} @ {} Hz",
                device.channels, device.sample_type, device.sample_rate
            ),
            None => "closed".into(),
        }
    }

    pub(crate) fn diagnostics(&self) -> SessionDiagnostics {
        self.counters.snapshot(self.id, self.format_description())
    }

    /// Clock from frames processed, paired with `latency_frames`.
    pub(crate) fn clock_latency(&self, latency_frames: u64) -> ClockLatency {
        let Some(device) = &self.device else {
            return ClockLatency::default();
        };
        ClockLatency {
            clock_time: frames_to_duration(self.counters.frames_processed(), device.sample_rate),
            latency: frames_to_duration(latency_frames, device.sample_rate),
        }
    }

    pub(crate) fn poll_xruns(&self) -> XrunReport {
        let report = self.counters.take_unreported();
        if !report.is_empty() {
            log::warn!(
                "{} session {}: {} frames dropped, {} frames padded",
                self.direction,
                self.id,
                report.overflow_frames,
                report.underflow_frames
            );
            if let Some(delegate) = &self.delegate {
                delegate.on_xrun(&report);
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn unarmed_gate_skips_work() {
        let gate = CallbackGate::new(0u32);
        assert_eq!(gate.with_armed(|n| *n += 1), None);
        gate.arm();
        assert_eq!(gate.with_armed(|n| *n += 1), Some(()));
        gate.disarm();
        assert_eq!(gate.with_armed(|n| *n += 1), None);
        assert_eq!(*gate.lock(), 1);
    }

    #[test]
    fn disarm_waits_for_in_flight_callback() {
        let gate = Arc::new(CallbackGate::new(Vec::<u32>::new()));
        gate.arm();

        let worker = Arc::clone(&gate);
        let (entered_tx, entered_rx) = std::sync::mpsc::channel();
        let handle = thread::spawn(move || {
            worker.with_armed(|log| {
                entered_tx.send(()).unwrap();
                thread::sleep(Duration::from_millis(50));
                log.push(1);
            });
        });

        entered_rx.recv().unwrap();
        gate.disarm();
        // the callback finished before disarm returned
        assert_eq!(*gate.lock(), vec![1]);
        handle.join().unwrap();
    }
}
