//! Test doubles for sessions: a backend whose behavior is scripted per
//! test, and a delegate that records what it is told.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::models::diagnostics::XrunReport;
use crate::models::error::{BackendError, DeviceError};
use crate::models::format::{Direction, NativeFormat};
use crate::models::state::SessionState;
use crate::traits::backend::{DeviceBackend, NativeStream, StreamCallback, StreamConfig, StreamInfo};
use crate::traits::device_delegate::DeviceDelegate;

#[derive(Default)]
struct Script {
    accepted: Option<Vec<NativeFormat>>,
    open_error: Option<BackendError>,
    fail_start: bool,
    fail_stop: bool,
    rate: Option<u32>,
    channels: Option<u16>,
}

#[derive(Default)]
struct Shared {
    attempts: Vec<NativeFormat>,
    last_config: Option<StreamConfig>,
    callback: Option<StreamCallback>,
    closed: usize,
}

/// Backend that never touches hardware. Tests drive the callbacks by hand.
#[derive(Default)]
pub(crate) struct ScriptedBackend {
    script: Script,
    shared: Arc<Mutex<Shared>>,
}

impl ScriptedBackend {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Reject every format not listed with `FormatRejected`.
    pub(crate) fn accepting(mut self, formats: &[NativeFormat]) -> Self {
        self.script.accepted = Some(formats.to_vec());
        self
    }

    pub(crate) fn failing_open(mut self, error: BackendError) -> Self {
        self.script.open_error = Some(error);
        self
    }

    pub(crate) fn failing_start(mut self) -> Self {
        self.script.fail_start = true;
        self
    }

    pub(crate) fn failing_stop(mut self) -> Self {
        self.script.fail_stop = true;
        self
    }

    /// Report this rate from `info` regardless of the request.
    pub(crate) fn reporting_rate(mut self, rate: u32) -> Self {
        self.script.rate = Some(rate);
        self
    }

    pub(crate) fn reporting_channels(mut self, channels: u16) -> Self {
        self.script.channels = Some(channels);
        self
    }

    pub(crate) fn attempted_formats(&self) -> Vec<NativeFormat> {
        self.shared.lock().attempts.clone()
    }

    pub(crate) fn last_config(&self) -> Option<StreamConfig> {
        self.shared.lock().last_config.clone()
    }

    pub(crate) fn closed_streams(&self) -> usize {
        self.shared.lock().closed
    }

    /// Invoke the open stream's render callback. False if there is none.
    pub(crate) fn drive_render(&self, out: &mut [u8], frames: usize) -> bool {
        match self.shared.lock().callback.as_mut() {
            Some(StreamCallback::Render(callback)) => {
                callback(out, frames);
                true
            }
            _ => false,
        }
    }

    pub(crate) fn drive_capture(&self, data: &[u8], frames: usize) -> bool {
        match self.shared.lock().callback.as_mut() {
            Some(StreamCallback::Capture(callback)) => {
                callback(data, frames);
                true
            }
            _ => false,
        }
    }
}

impl DeviceBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    fn config_block(&self) -> &str {
        "scripted"
    }

    fn default_device_name(&self, _direction: Direction) -> String {
        "Scripted Default".into()
    }

    fn device_names(&self, direction: Direction) -> Result<Vec<String>, BackendError> {
        let kind = match direction {
            Direction::Playback => "Output",
            Direction::Capture => "Input",
        };
        Ok((1..=2).map(|i| format!("Scripted {kind} {i}")).collect())
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
        let mut shared = self.shared.lock();
        shared.attempts.push(config.format);
        shared.last_config = Some(config.clone());

        if let Some(error) = &self.script.open_error {
            return Err(error.clone());
        }
        if let Some(accepted) = &self.script.accepted {
            if !accepted.contains(&config.format) {
                return Err(BackendError::FormatRejected(config.format));
            }
        }

        shared.callback = Some(callback);
        Ok(Box::new(ScriptedStream {
            info: StreamInfo {
                sample_rate: self.script.rate.unwrap_or(config.sample_rate),
                channels: self.script.channels.unwrap_or(config.channels),
                format: config.format,
            },
            fail_start: self.script.fail_start,
            fail_stop: self.script.fail_stop,
            closed: false,
            shared: Arc::clone(&self.shared),
        }))
    }
}

struct ScriptedStream {
    info: StreamInfo,
    fail_start: bool,
    fail_stop: bool,
    closed: bool,
    shared: Arc<Mutex<Shared>>,
}

impl NativeStream for ScriptedStream {
    fn start(&mut self) -> Result<(), BackendError> {
        if self.fail_start {
            return Err(BackendError::Stream("scripted start failure".into()));
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<(), BackendError> {
        if self.fail_stop {
            return Err(BackendError::Stream("scripted stop failure".into()));
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), BackendError> {
        if !self.closed {
            self.closed = true;
            let mut shared = self.shared.lock();
            shared.callback = None;
            shared.closed += 1;
        }
        Ok(())
    }

    fn info(&self) -> StreamInfo {
        self.info
    }
}

/// Delegate that records every notification.
#[derive(Default)]
pub(crate) struct Recorder {
    states: Mutex<Vec<SessionState>>,
    errors: Mutex<Vec<String>>,
    xruns: Mutex<Vec<XrunReport>>,
}

impl Recorder {
    pub(crate) fn states(&self) -> Vec<SessionState> {
        self.states.lock().clone()
    }

    pub(crate) fn errors(&self) -> usize {
        self.errors.lock().len()
    }

    pub(crate) fn xruns(&self) -> Vec<XrunReport> {
        self.xruns.lock().clone()
    }
}

impl DeviceDelegate for Recorder {
    fn on_state_changed(&self, state: SessionState) {
        self.states.lock().push(state);
    }

    fn on_error(&self, error: &DeviceError) {
        self.errors.lock().push(error.to_string());
    }

    fn on_xrun(&self, report: &XrunReport) {
        self.xruns.lock().push(*report);
    }
}
