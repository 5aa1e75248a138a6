use std::time::Duration;

use crate::models::error::BackendError;
use crate::models::format::{Direction, NativeFormat};

/// Render callback: fill `buffer` with `frames` frames in the stream format.
///
/// Runs on the backend's real-time thread. It must not block, allocate or
/// do I/O.
pub type RenderCallback = Box<dyn FnMut(&mut [u8], usize) + Send + 'static>;

/// Capture callback: consume `frames` frames of recorded data from `buffer`.
///
/// Same real-time rules as [`RenderCallback`].
pub type CaptureCallback = Box<dyn FnMut(&[u8], usize) + Send + 'static>;

/// The callback a stream drives, one per direction.
pub enum StreamCallback {
    Render(RenderCallback),
    Capture(CaptureCallback),
}

/// Parameters for opening a native stream.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamConfig {
    pub direction: Direction,
    /// Index into `DeviceBackend::device_names(direction)`.
    pub device: usize,
    pub sample_rate: u32,
    pub channels: u16,
    pub format: NativeFormat,
    /// Frames per callback; `None` lets the backend choose.
    pub update_size: Option<u32>,
    pub suggested_latency: Duration,
}

/// What the backend actually opened, read back after `open_stream`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamInfo {
    pub sample_rate: u32,
    pub channels: u16,
    pub format: NativeFormat,
}

/// Interface to a native audio I/O library.
///
/// Implemented by:
/// - `NullBackend` and `LoopbackBackend` (this crate)
/// - `CpalBackend` (audio-device-cpal)
pub trait DeviceBackend: Send + Sync {
    /// Short backend name, also used as the device name prefix in logs.
    fn name(&self) -> &str;

    /// Block of the config store holding this backend's overrides.
    fn config_block(&self) -> &str;

    /// Name reported for the default device of `direction`.
    fn default_device_name(&self, direction: Direction) -> String;

    /// Names of the devices available for `direction`, in index order.
    fn device_names(&self, direction: Direction) -> Result<Vec<String>, BackendError>;

    fn default_output_device(&self) -> Option<usize>;

    fn default_input_device(&self) -> Option<usize>;

    /// Open a stream driving `callback`. The stream starts stopped.
    fn open_stream(
        &self,
        config: &StreamConfig,
        callback: StreamCallback,
    ) -> Result<Box<dyn NativeStream>, BackendError>;
}

/// An opened native stream.
///
/// After `stop` returns the backend may still be unwinding its thread; the
/// session's callback gate is what guarantees no further callback work.
pub trait NativeStream: Send {
    fn start(&mut self) -> Result<(), BackendError>;

    fn stop(&mut self) -> Result<(), BackendError>;

    /// Release native resources. Later calls are no-ops.
    fn close(&mut self) -> Result<(), BackendError>;

    fn info(&self) -> StreamInfo;
}
