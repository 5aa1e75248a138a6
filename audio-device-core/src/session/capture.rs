use std::sync::Arc;

use crate::models::config::DeviceConfig;
use crate::models::device::{ClockLatency, Device};
use crate::models::diagnostics::{SessionCounters, SessionDiagnostics, XrunKind, XrunReport};
use crate::models::error::DeviceError;
use crate::models::format::{Direction, NativeFormat};
use crate::models::state::SessionState;
use crate::processing::format_converter::{fill_silence, unpack};
use crate::processing::ring_buffer::{RingBuffer, RingConsumer, RingProducer};
use crate::session::negotiation;
use crate::session::{CallbackGate, SessionControl, SessionCore};
use crate::traits::backend::{DeviceBackend, StreamCallback};
use crate::traits::config_store::ConfigStore;
use crate::traits::device_delegate::DeviceDelegate;

/// Minimum ring length, in milliseconds of audio.
const MIN_RING_MS: u32 = 100;

fn capture_callback(
    gate: Arc<CallbackGate<Option<RingProducer>>>,
    counters: Arc<SessionCounters>,
) -> StreamCallback {
    StreamCallback::Capture(Box::new(move |data: &[u8], frames: usize| {
        gate.with_armed(|producer| {
            let Some(producer) = producer.as_mut() else {
                return;
            };
            let written = producer.write(data, frames);
            if written < frames {
                counters.record_xrun(XrunKind::Overflow, frames - written);
            }
            counters.record_callback(frames);
        });
    }))
}

/// Input device session.
///
/// The capture callback copies raw device frames into a ring buffer; the
/// application drains it from the control thread with
/// [`capture_samples`](Self::capture_samples) (device format) or
/// [`capture_canonical`](Self::capture_canonical) (f32). When the ring is
/// full, new frames are dropped and counted as overflow; reading more than
/// is buffered pads with silence and counts underflow.
pub struct CaptureSession {
    core: SessionCore,
    gate: Arc<CallbackGate<Option<RingProducer>>>,
    consumer: Option<RingConsumer>,
    scratch: Vec<u8>,
}

impl CaptureSession {
    pub fn new(backend: Arc<dyn DeviceBackend>, config: DeviceConfig, store: Arc<dyn ConfigStore>) -> Self {
        Self {
            core: SessionCore::new(Direction::Capture, backend, config, store),
            gate: Arc::new(CallbackGate::new(None)),
            consumer: None,
            scratch: Vec::new(),
        }
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.core.config
    }

    /// Frames ready to be read.
    pub fn available_samples(&self) -> usize {
        self.consumer.as_ref().map_or(0, RingConsumer::read_space)
    }

    /// Ring capacity in frames, 0 while closed.
    pub fn ring_capacity(&self) -> usize {
        self.consumer.as_ref().map_or(0, RingConsumer::capacity)
    }

    /// Read `frames` frames in the device sample format into `out`.
    ///
    /// Frames beyond what is buffered are filled with silence and counted
    /// as underflow.
    pub fn capture_samples(&mut self, out: &mut [u8], frames: usize) -> Result<(), DeviceError> {
        let format = self.opened_format("capture")?;
        let Some(consumer) = self.consumer.as_mut() else {
            return Err(DeviceError::InvalidState {
                operation: "capture",
                state: self.core.state,
            });
        };

        let frame_size = consumer.frame_size();
        let len = out.len();
        let Some(out) = out.get_mut(..frames * frame_size) else {
            return Err(DeviceError::ConfigurationFailed(format!(
                "buffer of {len} bytes cannot hold {frames} frames"
            )));
        };

        let read = consumer.read(out, frames);
        if read < frames {
            fill_silence(&mut out[read * frame_size..], format.sample_type());
            self.core.counters.record_xrun(XrunKind::Underflow, frames - read);
        }
        Ok(())
    }

    /// Read `frames` frames as interleaved canonical f32.
    pub fn capture_canonical(&mut self, out: &mut [f32], frames: usize) -> Result<(), DeviceError> {
        let format = self.opened_format("capture")?;
        let channels = self.core.device.as_ref().map_or(0, Device::channel_count);
        if out.len() < frames * channels {
            return Err(DeviceError::ConfigurationFailed(format!(
                "buffer of {} samples cannot hold {} frames",
                out.len(),
                frames
            )));
        }

        let frame_size = channels * format.bytes();
        let chunk = (self.scratch.len() / frame_size.max(1)).max(1);
        let mut scratch = std::mem::take(&mut self.scratch);
        let mut done = 0;
        let mut result = Ok(());
        while done < frames {
            let n = (frames - done).min(chunk);
            if scratch.len() < n * frame_size {
                scratch.resize(n * frame_size, 0);
            }
            if let Err(e) = self.capture_samples(&mut scratch, n) {
                result = Err(e);
                break;
            }
            unpack(
                &scratch[..n * frame_size],
                &mut out[done * channels..(done + n) * channels],
                format.sample_type(),
            );
            done += n;
        }
        self.scratch = scratch;
        result
    }

    fn opened_format(&self, operation: &'static str) -> Result<NativeFormat, DeviceError> {
        self.core.native_format.ok_or_else(|| self.not_open(operation))
    }

    fn not_open(&self, operation: &'static str) -> DeviceError {
        DeviceError::InvalidState {
            operation,
            state: self.core.state,
        }
    }
}

impl SessionControl for CaptureSession {
    fn open(&mut self, name: Option<&str>) -> Result<(), DeviceError> {
        self.core.require("open", &[SessionState::Closed])?;
        self.core
            .config
            .validate()
            .map_err(DeviceError::ConfigurationFailed)?;

        let (index, device_name) = self.core.resolve_device(name)?;
        let mut device = Device::from_config(Direction::Capture, &self.core.config, device_name);
        let requested = negotiation::native_format_for(Direction::Capture, device.sample_type)?;
        let chain = negotiation::fallback_chain(Direction::Capture, requested);
        let channels = device.channel_count() as u16;

        let gate = Arc::clone(&self.gate);
        let counters = Arc::clone(&self.core.counters);
        let (stream, format) = self.core.open_stream(
            index,
            &device,
            channels,
            None,
            chain,
            |_| capture_callback(Arc::clone(&gate), Arc::clone(&counters)),
        )?;
        if format != requested {
            log::info!("{}: capturing {} instead of {}", device.name, format, requested);
            device.sample_type = format.sample_type();
        }

        // the gate is still disarmed; the producer is in place before start
        let ring_frames = (device.update_size as usize * device.num_updates as usize)
            .max(device.sample_rate as usize * MIN_RING_MS as usize / 1000);
        let (producer, consumer) = RingBuffer::new(ring_frames, device.frame_size()).split();
        *self.gate.lock() = Some(producer);

        log::info!(
            "opened capture device \"{}\": {} {} @ {} Hz, {} frame ring",
            device.name,
            device.channels,
            device.sample_type,
            device.sample_rate,
            consumer.capacity()
        );
        self.scratch = vec![0; device.update_size as usize * device.frame_size()];
        self.consumer = Some(consumer);
        self.core.device = Some(device);
        self.core.native_format = Some(format);
        self.core.stream = Some(stream);
        self.core.configured = false;
        self.core.set_state(SessionState::Open);
        Ok(())
    }

    /// Capture keeps the opened frame layout; only the rate may change.
    fn reset(&mut self) -> Result<(), DeviceError> {
        self.core
            .require("reset", &[SessionState::Open, SessionState::Configured])?;
        let (Some(stream), Some(device), Some(format)) = (
            self.core.stream.as_ref(),
            self.core.device.as_mut(),
            self.core.native_format,
        ) else {
            return Err(DeviceError::InvalidState {
                operation: "reset",
                state: self.core.state,
            });
        };

        let info = stream.info();
        if usize::from(info.channels) != device.channel_count() || info.format != format {
            return Err(DeviceError::FormatMismatch(format!(
                "capture opened as {} x {} but backend reports {} x {}",
                device.channel_count(),
                format,
                info.channels,
                info.format
            )));
        }
        device.sample_rate = info.sample_rate;
        let stale = self.consumer.as_mut().map_or(0, RingConsumer::discard);
        log::debug!(
            "capture device \"{}\" reset @ {} Hz, dropped {} stale frames",
            device.name,
            info.sample_rate,
            stale
        );

        self.core.configured = true;
        self.core.set_state(SessionState::Configured);
        Ok(())
    }

    fn start(&mut self) -> Result<(), DeviceError> {
        self.core
            .require("start", &[SessionState::Open, SessionState::Configured])?;
        if !self.core.configured {
            log::warn!("capture session {}: started without reset, resetting now", self.core.id);
            self.reset()?;
        }

        self.gate.arm();
        let result = match self.core.stream.as_mut() {
            Some(stream) => stream.start(),
            None => Ok(()),
        };
        if let Err(e) = result {
            self.gate.disarm();
            log::error!("failed to start capture stream: {}", e);
            return Err(e.into());
        }

        log::info!("capture session {} started", self.core.id);
        self.core.set_state(SessionState::Running);
        Ok(())
    }

    fn stop(&mut self) {
        if !self.core.state.is_running() {
            return;
        }
        self.gate.disarm();
        self.core.stop_stream();
        log::info!("capture session {} stopped", self.core.id);
        self.core.set_state(SessionState::Open);
    }

    fn close(&mut self) {
        if self.core.state.is_closed() {
            return;
        }
        self.stop();
        self.gate.disarm();
        self.core.close_stream();
        *self.gate.lock() = None;
        self.consumer = None;
        self.scratch = Vec::new();
        log::info!("capture session {} closed", self.core.id);
        self.core.set_state(SessionState::Closed);
    }

    fn state(&self) -> SessionState {
        self.core.state
    }

    fn device(&self) -> Option<&Device> {
        self.core.device.as_ref()
    }

    fn diagnostics(&self) -> SessionDiagnostics {
        self.core.diagnostics()
    }

    /// Latency is the audio waiting in the ring.
    fn clock_latency(&self) -> ClockLatency {
        self.core.clock_latency(self.available_samples() as u64)
    }

    fn poll_xruns(&self) -> XrunReport {
        self.core.poll_xruns()
    }

    fn set_delegate(&mut self, delegate: Arc<dyn DeviceDelegate>) {
        self.core.delegate = Some(delegate);
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.close();
    }
}
