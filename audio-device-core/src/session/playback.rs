use std::sync::Arc;

use crate::models::config::{DeviceConfig, MAX_SOURCES, MAX_UPDATE_SIZE};
use crate::models::device::{ClockLatency, Device};
use crate::models::diagnostics::{SessionCounters, SessionDiagnostics, XrunReport};
use crate::models::error::DeviceError;
use crate::models::format::{ChannelLayout, Direction, NativeFormat, SampleType, MAX_OUTPUT_CHANNELS};
use crate::models::state::SessionState;
use crate::processing::format_converter::{fill_silence, pack_planar};
use crate::processing::mix_buffer::MixBuffer;
use crate::processing::source_mixer::{Source, SourceId, SourceMixer, SourceState};
use crate::session::negotiation;
use crate::session::{CallbackGate, SessionControl, SessionCore};
use crate::traits::backend::{DeviceBackend, StreamCallback};
use crate::traits::config_store::ConfigStore;
use crate::traits::device_delegate::DeviceDelegate;

/// Mixer state owned by the render callback while the session runs.
pub(crate) struct PlaybackEngine {
    mixer: SourceMixer,
    mix: MixBuffer,
    format: SampleType,
}

impl PlaybackEngine {
    /// Sized from a config that may not be validated yet, so the
    /// preallocation is capped at the limits `validate` enforces.
    fn new(config: &DeviceConfig) -> Self {
        let block = config.update_size.clamp(1, MAX_UPDATE_SIZE) as usize;
        let max_sources = config.max_sources.min(MAX_SOURCES);
        let mut mix = MixBuffer::new(MAX_OUTPUT_CHANNELS, block);
        mix.set_channels(config.channels.count());
        Self {
            mixer: SourceMixer::new(config.sample_rate, config.channels, max_sources, block),
            mix,
            format: config.sample_type,
        }
    }

    fn set_format(&mut self, sample_rate: u32, layout: ChannelLayout, format: SampleType) {
        self.mixer.set_output_format(sample_rate, layout);
        self.mix.set_channels(layout.count());
        self.format = format;
    }

    /// Fill `out` with `frames` frames, rendering in mix-buffer sized chunks.
    fn render(&mut self, out: &mut [u8], frames: usize) {
        let frame_size = self.mix.channels() * self.format.bytes();
        let mut done = 0;
        while done < frames {
            let n = (frames - done).min(self.mix.capacity());
            let Some(dst) = out.get_mut(done * frame_size..(done + n) * frame_size) else {
                break;
            };
            self.mixer.render_block(&mut self.mix, n);
            pack_planar(&self.mix, n, dst, self.format);
            done += n;
        }
        if let Some(rest) = out.get_mut(done * frame_size..) {
            fill_silence(rest, self.format);
        }
    }
}

fn render_callback(
    gate: Arc<CallbackGate<PlaybackEngine>>,
    counters: Arc<SessionCounters>,
    format: NativeFormat,
) -> StreamCallback {
    let silence = format.sample_type();
    StreamCallback::Render(Box::new(move |out: &mut [u8], frames: usize| {
        let rendered = gate.with_armed(|engine| {
            engine.render(out, frames);
            counters.record_callback(frames);
        });
        if rendered.is_none() {
            fill_silence(out, silence);
        }
    }))
}

/// Output device session.
///
/// Owns a [`SourceMixer`] that the render callback drives. Sources can be
/// attached, detached and adjusted from the control thread in any state;
/// those operations hold the callback lock only for constant-time work.
///
/// ```text
/// [SampleProvider]… → [SourceMixer] → [MixBuffer] → pack → [NativeStream]
/// ```
pub struct PlaybackSession {
    core: SessionCore,
    gate: Arc<CallbackGate<PlaybackEngine>>,
}

impl PlaybackSession {
    pub fn new(backend: Arc<dyn DeviceBackend>, config: DeviceConfig, store: Arc<dyn ConfigStore>) -> Self {
        let gate = Arc::new(CallbackGate::new(PlaybackEngine::new(&config)));
        Self {
            core: SessionCore::new(Direction::Playback, backend, config, store),
            gate,
        }
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.core.config
    }

    /// Attach a source; it starts playing on the next rendered block.
    pub fn add_source(&mut self, mut source: Source) -> Result<SourceId, DeviceError> {
        let (rate, layout, max_block) = {
            let engine = self.gate.lock();
            (engine.mixer.output_rate(), engine.mixer.layout(), engine.mixer.max_block())
        };
        // scratch allocation happens before the lock is taken again
        source.prepare(rate, layout, max_block);

        let id = self.gate.lock().mixer.add_source(source)?;
        log::debug!("playback session {}: attached source {}", self.core.id, id);
        Ok(id)
    }

    /// Detach a source and hand it back; it is dropped outside the lock.
    pub fn remove_source(&mut self, id: SourceId) -> Result<Source, DeviceError> {
        let removed = self.gate.lock().mixer.remove_source(id);
        removed.ok_or(DeviceError::UnknownSource(id))
    }

    /// Detach every stopped source.
    pub fn remove_stopped_sources(&mut self) -> Vec<(SourceId, Source)> {
        // reserved before taking the lock so the render thread never waits
        // on an allocation
        let mut removed = Vec::with_capacity(self.source_count());
        self.gate.lock().mixer.remove_stopped_into(&mut removed);
        if !removed.is_empty() {
            log::debug!(
                "playback session {}: removed {} stopped sources",
                self.core.id,
                removed.len()
            );
        }
        removed
    }

    pub fn source_count(&self) -> usize {
        self.gate.lock().mixer.len()
    }

    pub fn source_state(&self, id: SourceId) -> Result<SourceState, DeviceError> {
        self.with_source(id, |source| source.state())
    }

    pub fn source_position(&self, id: SourceId) -> Result<u64, DeviceError> {
        self.with_source(id, |source| source.position())
    }

    pub fn set_source_gain(&self, id: SourceId, gain: f32) -> Result<(), DeviceError> {
        self.with_source(id, |source| source.set_gain(gain))
    }

    pub fn set_source_pitch(&self, id: SourceId, pitch: f32) -> Result<(), DeviceError> {
        self.with_source(id, |source| source.set_pitch(pitch))
    }

    pub fn play_source(&self, id: SourceId) -> Result<(), DeviceError> {
        self.with_source(id, Source::play)
    }

    pub fn pause_source(&self, id: SourceId) -> Result<(), DeviceError> {
        self.with_source(id, Source::pause)
    }

    pub fn stop_source(&self, id: SourceId) -> Result<(), DeviceError> {
        self.with_source(id, Source::stop)
    }

    pub fn set_master_gain(&self, gain: f32) {
        self.gate.lock().mixer.set_master_gain(gain);
    }

    fn with_source<R>(&self, id: SourceId, f: impl FnOnce(&mut Source) -> R) -> Result<R, DeviceError> {
        let mut engine = self.gate.lock();
        engine
            .mixer
            .source_mut(id)
            .map(f)
            .ok_or(DeviceError::UnknownSource(id))
    }
}

impl SessionControl for PlaybackSession {
    fn open(&mut self, name: Option<&str>) -> Result<(), DeviceError> {
        self.core.require("open", &[SessionState::Closed])?;
        self.core
            .config
            .validate()
            .map_err(DeviceError::ConfigurationFailed)?;

        let (index, device_name) = self.core.resolve_device(name)?;
        let mut device = Device::from_config(Direction::Playback, &self.core.config, device_name);
        let requested = negotiation::native_format_for(Direction::Playback, device.sample_type)?;
        let chain = negotiation::fallback_chain(Direction::Playback, requested);
        let channels = negotiation::playback_channels(device.channels);

        let gate = Arc::clone(&self.gate);
        let counters = Arc::clone(&self.core.counters);
        let (stream, format) = self.core.open_stream(
            index,
            &device,
            channels,
            Some(device.update_size),
            chain,
            |format| render_callback(Arc::clone(&gate), Arc::clone(&counters), format),
        )?;

        if format != requested {
            log::info!("{}: opened with {} instead of {}", device.name, format, requested);
            device.sample_type = format.sample_type();
        }
        let layout = ChannelLayout::from_count(channels).unwrap_or(ChannelLayout::Stereo);
        if layout != device.channels {
            log::info!("{}: {} output opened as {}", device.name, device.channels, layout);
            device.channels = layout;
        }
        self.gate
            .lock()
            .set_format(device.sample_rate, layout, format.sample_type());

        log::info!(
            "opened playback device \"{}\": {} {} @ {} Hz",
            device.name,
            device.channels,
            device.sample_type,
            device.sample_rate
        );
        self.core.device = Some(device);
        self.core.native_format = Some(format);
        self.core.stream = Some(stream);
        self.core.configured = false;
        self.core.set_state(SessionState::Open);
        Ok(())
    }

    fn reset(&mut self) -> Result<(), DeviceError> {
        self.core
            .require("reset", &[SessionState::Open, SessionState::Configured])?;
        let (Some(stream), Some(device)) = (self.core.stream.as_ref(), self.core.device.as_mut()) else {
            return Err(DeviceError::InvalidState {
                operation: "reset",
                state: self.core.state,
            });
        };

        let info = stream.info();
        let layout = negotiation::playback_layout(info.channels)?;
        let sample_type = info.format.sample_type();

        device.sample_rate = info.sample_rate;
        device.channels = layout;
        device.sample_type = sample_type;
        self.gate.lock().set_format(info.sample_rate, layout, sample_type);
        log::debug!(
            "playback device \"{}\" reset: {} {} @ {} Hz",
            device.name,
            layout,
            sample_type,
            info.sample_rate
        );

        self.core.native_format = Some(info.format);
        self.core.configured = true;
        self.core.set_state(SessionState::Configured);
        Ok(())
    }

    fn start(&mut self) -> Result<(), DeviceError> {
        self.core
            .require("start", &[SessionState::Open, SessionState::Configured])?;
        if !self.core.configured {
            log::warn!("playback session {}: started without reset, resetting now", self.core.id);
            self.reset()?;
        }

        self.gate.arm();
        let result = match self.core.stream.as_mut() {
            Some(stream) => stream.start(),
            None => Ok(()),
        };
        if let Err(e) = result {
            self.gate.disarm();
            log::error!("failed to start playback stream: {}", e);
            return Err(e.into());
        }

        log::info!("playback session {} started", self.core.id);
        self.core.set_state(SessionState::Running);
        Ok(())
    }

    fn stop(&mut self) {
        if !self.core.state.is_running() {
            return;
        }
        self.gate.disarm();
        self.core.stop_stream();
        log::info!("playback session {} stopped", self.core.id);
        self.core.set_state(SessionState::Open);
    }

    fn close(&mut self) {
        if self.core.state.is_closed() {
            return;
        }
        self.stop();
        self.gate.disarm();
        self.core.close_stream();
        log::info!("playback session {} closed", self.core.id);
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

    fn clock_latency(&self) -> ClockLatency {
        let latency = self
            .core
            .device
            .as_ref()
            .map(|d| u64::from(d.update_size) * u64::from(d.num_updates))
            .unwrap_or(0);
        self.core.clock_latency(latency)
    }

    fn poll_xruns(&self) -> XrunReport {
        self.core.poll_xruns()
    }

    fn set_delegate(&mut self, delegate: Arc<dyn DeviceDelegate>) {
        self.core.delegate = Some(delegate);
    }
}

impl Drop for PlaybackSession {
    fn drop(&mut self) {
        self.close();
    }
}
