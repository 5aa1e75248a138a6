//! Application-driven backend.
//!
//! Nothing runs on its own: the application calls [`LoopbackBackend::render`]
//! to pull a block from the open playback stream and
//! [`LoopbackBackend::push_capture`] to feed the open capture stream. Useful
//! for offline rendering and for exercising sessions without hardware.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::factory::lifecycle::BackendLifecycle;
use crate::models::error::{BackendError, DeviceError};
use crate::models::format::Direction;
use crate::traits::backend::{
    CaptureCallback, DeviceBackend, NativeStream, RenderCallback, StreamCallback, StreamConfig,
    StreamInfo,
};
use crate::traits::backend_factory::{BackendFactory, DeviceNames};

pub const LOOPBACK_DEVICE_NAME: &str = "Loopback";

struct Slot<C> {
    callback: Option<C>,
    info: Option<StreamInfo>,
    running: bool,
}

impl<C> Slot<C> {
    fn empty() -> Self {
        Self {
            callback: None,
            info: None,
            running: false,
        }
    }
}

/// One playback and one capture stream, driven by the caller.
pub struct LoopbackBackend {
    playback: Arc<Mutex<Slot<RenderCallback>>>,
    capture: Arc<Mutex<Slot<CaptureCallback>>>,
}

impl LoopbackBackend {
    pub fn new() -> Self {
        Self {
            playback: Arc::new(Mutex::new(Slot::empty())),
            capture: Arc::new(Mutex::new(Slot::empty())),
        }
    }

    /// Pull `frames` frames from the running playback stream into `out`.
    ///
    /// Returns false, leaving `out` untouched, when no playback stream is
    /// running.
    pub fn render(&self, out: &mut [u8], frames: usize) -> bool {
        let mut slot = self.playback.lock();
        if !slot.running {
            return false;
        }
        match slot.callback.as_mut() {
            Some(callback) => {
                callback(out, frames);
                true
            }
            None => false,
        }
    }

    /// Feed `frames` recorded frames to the running capture stream.
    pub fn push_capture(&self, data: &[u8], frames: usize) -> bool {
        let mut slot = self.capture.lock();
        if !slot.running {
            return false;
        }
        match slot.callback.as_mut() {
            Some(callback) => {
                callback(data, frames);
                true
            }
            None => false,
        }
    }

    /// Format of the open stream for `direction`.
    pub fn stream_info(&self, direction: Direction) -> Option<StreamInfo> {
        match direction {
            Direction::Playback => self.playback.lock().info,
            Direction::Capture => self.capture.lock().info,
        }
    }
}

impl Default for LoopbackBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn claim<C: Send + 'static>(
    slot: &Arc<Mutex<Slot<C>>>,
    config: &StreamConfig,
    callback: C,
) -> Result<Box<dyn NativeStream>, BackendError> {
    let mut guard = slot.lock();
    if guard.callback.is_some() {
        return Err(BackendError::DeviceUnavailable(format!(
            "loopback {} stream already open",
            config.direction
        )));
    }
    let info = StreamInfo {
        sample_rate: config.sample_rate,
        channels: config.channels,
        format: config.format,
    };
    guard.callback = Some(callback);
    guard.info = Some(info);
    guard.running = false;

    Ok(Box::new(LoopbackStream {
        slot: Arc::clone(slot),
        info,
        closed: false,
    }))
}

impl DeviceBackend for LoopbackBackend {
    fn name(&self) -> &str {
        "loopback"
    }

    fn config_block(&self) -> &str {
        "loopback"
    }

    fn default_device_name(&self, _direction: Direction) -> String {
        LOOPBACK_DEVICE_NAME.into()
    }

    fn device_names(&self, _direction: Direction) -> Result<Vec<String>, BackendError> {
        Ok(vec![LOOPBACK_DEVICE_NAME.into()])
    }

    fn default_output_device(&self) -> Option<usize> {
        Some(0)
    }

    fn default_input_device(&self) -> Option<usize> {
        Some(0)
    }

    fn open_stream(
        &self,
        config: &StreamConfig,
        callback: StreamCallback,
    ) -> Result<Box<dyn NativeStream>, BackendError> {
        match callback {
            StreamCallback::Render(callback) => claim(&self.playback, config, callback),
            StreamCallback::Capture(callback) => claim(&self.capture, config, callback),
        }
    }
}

struct LoopbackStream<C> {
    slot: Arc<Mutex<Slot<C>>>,
    info: StreamInfo,
    closed: bool,
}

impl<C: Send> NativeStream for LoopbackStream<C> {
    fn start(&mut self) -> Result<(), BackendError> {
        if self.closed {
            return Err(BackendError::Stream("stream is closed".into()));
        }
        self.slot.lock().running = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), BackendError> {
        if !self.closed {
            self.slot.lock().running = false;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), BackendError> {
        if !self.closed {
            self.closed = true;
            *self.slot.lock() = Slot::empty();
        }
        Ok(())
    }

    fn info(&self) -> StreamInfo {
        self.info
    }
}

impl<C> Drop for LoopbackStream<C> {
    fn drop(&mut self) {
        if !self.closed {
            *self.slot.lock() = Slot::empty();
        }
    }
}

/// Factory sharing one [`LoopbackBackend`] between all its sessions, so the
/// application can drive them through [`backend`](Self::backend).
pub struct LoopbackBackendFactory {
    lifecycle: BackendLifecycle,
    backend: Arc<LoopbackBackend>,
}

impl LoopbackBackendFactory {
    pub fn new() -> Self {
        Self {
            lifecycle: BackendLifecycle::new(),
            backend: Arc::new(LoopbackBackend::new()),
        }
    }

    pub fn backend(&self) -> Arc<LoopbackBackend> {
        Arc::clone(&self.backend)
    }
}

impl Default for LoopbackBackendFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl BackendFactory for LoopbackBackendFactory {
    fn name(&self) -> &'static str {
        "loopback"
    }

    fn init(&self) -> Result<(), DeviceError> {
        self.lifecycle.init(|| Ok(()))
    }

    fn deinit(&self) {
        self.lifecycle.deinit(|| {});
    }

    fn is_initialized(&self) -> bool {
        self.lifecycle.is_initialized()
    }

    fn query_support(&self, _direction: Direction) -> bool {
        true
    }

    fn probe(&self, _direction: Direction) -> DeviceNames {
        DeviceNames::lazy(|| vec![LOOPBACK_DEVICE_NAME.to_string()])
    }

    fn create_backend(&self) -> Result<Arc<dyn DeviceBackend>, DeviceError> {
        Ok(self.backend.clone())
    }
}
