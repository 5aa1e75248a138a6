//! `DeviceBackend` implementation over cpal streams.
//!
//! Streams are built with the cpal sample type matching the negotiated
//! `NativeFormat`; the typed buffer is handed to the session callback as
//! raw bytes through `bytemuck`.

use bytemuck::Pod;
use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::SizedSample;

use audio_device_core::models::error::BackendError;
use audio_device_core::models::format::{Direction, NativeFormat};
use audio_device_core::traits::backend::{
    CaptureCallback, DeviceBackend, NativeStream, RenderCallback, StreamCallback, StreamConfig,
    StreamInfo,
};

use crate::device_enumerator::DeviceEnumerator;

/// Backend bound to one cpal host (ALSA, WASAPI, CoreAudio, ...).
pub struct CpalBackend {
    host_id: cpal::HostId,
}

impl CpalBackend {
    pub fn new(host_id: cpal::HostId) -> Self {
        Self { host_id }
    }

    fn enumerator(&self) -> Result<DeviceEnumerator, BackendError> {
        DeviceEnumerator::new(self.host_id)
    }
}

impl DeviceBackend for CpalBackend {
    fn name(&self) -> &str {
        "cpal"
    }

    fn config_block(&self) -> &str {
        "cpal"
    }

    fn default_device_name(&self, _direction: Direction) -> String {
        format!("{} Default", self.host_id.name())
    }

    fn device_names(&self, direction: Direction) -> Result<Vec<String>, BackendError> {
        self.enumerator()?.device_names(direction)
    }

    fn default_output_device(&self) -> Option<usize> {
        self.enumerator().ok()?.default_index(Direction::Playback)
    }

    fn default_input_device(&self) -> Option<usize> {
        self.enumerator().ok()?.default_index(Direction::Capture)
    }

    fn open_stream(
        &self,
        config: &StreamConfig,
        callback: StreamCallback,
    ) -> Result<Box<dyn NativeStream>, BackendError> {
        let device = self.enumerator()?.device(config.direction, config.device)?;
        let stream_config = cpal_stream_config(config);

        let stream = match callback {
            StreamCallback::Render(callback) => {
                build_output(&device, &stream_config, config.format, callback)
            }
            StreamCallback::Capture(callback) => {
                build_input(&device, &stream_config, config.format, callback)
            }
        }
        .map_err(|e| map_build_error(e, config.format))?;

        log::debug!(
            "cpal {} stream built: {} ch, {} Hz, {}, {:?}",
            config.direction,
            stream_config.channels,
            stream_config.sample_rate.0,
            config.format,
            stream_config.buffer_size
        );

        Ok(Box::new(CpalStream {
            stream: Some(stream),
            info: StreamInfo {
                sample_rate: config.sample_rate,
                channels: config.channels,
                format: config.format,
            },
        }))
    }
}

fn cpal_stream_config(config: &StreamConfig) -> cpal::StreamConfig {
    cpal::StreamConfig {
        channels: config.channels,
        sample_rate: cpal::SampleRate(config.sample_rate),
        buffer_size: match config.update_size {
            Some(frames) => cpal::BufferSize::Fixed(frames),
            None => cpal::BufferSize::Default,
        },
    }
}

fn map_build_error(error: cpal::BuildStreamError, format: NativeFormat) -> BackendError {
    match error {
        cpal::BuildStreamError::StreamConfigNotSupported => BackendError::FormatRejected(format),
        cpal::BuildStreamError::DeviceNotAvailable => {
            BackendError::DeviceUnavailable(error.to_string())
        }
        other => BackendError::Stream(other.to_string()),
    }
}

fn build_output(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    format: NativeFormat,
    callback: RenderCallback,
) -> Result<cpal::Stream, cpal::BuildStreamError> {
    match format {
        NativeFormat::Int8 => output_stream::<i8>(device, config, callback),
        NativeFormat::UInt8 => output_stream::<u8>(device, config, callback),
        NativeFormat::Int16 => output_stream::<i16>(device, config, callback),
        NativeFormat::Int32 => output_stream::<i32>(device, config, callback),
        NativeFormat::Float32 => output_stream::<f32>(device, config, callback),
    }
}

fn build_input(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    format: NativeFormat,
    callback: CaptureCallback,
) -> Result<cpal::Stream, cpal::BuildStreamError> {
    match format {
        NativeFormat::Int8 => input_stream::<i8>(device, config, callback),
        NativeFormat::UInt8 => input_stream::<u8>(device, config, callback),
        NativeFormat::Int16 => input_stream::<i16>(device, config, callback),
        NativeFormat::Int32 => input_stream::<i32>(device, config, callback),
        NativeFormat::Float32 => input_stream::<f32>(device, config, callback),
    }
}

fn output_stream<T: SizedSample + Pod>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut callback: RenderCallback,
) -> Result<cpal::Stream, cpal::BuildStreamError> {
    let channels = usize::from(config.channels.max(1));
    device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            let frames = data.len() / channels;
            callback(bytemuck::cast_slice_mut(data), frames);
        },
        |err| log::error!("cpal output stream error: {}", err),
        None,
    )
}

fn input_stream<T: SizedSample + Pod>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut callback: CaptureCallback,
) -> Result<cpal::Stream, cpal::BuildStreamError> {
    let channels = usize::from(config.channels.max(1));
    device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            let frames = data.len() / channels;
            callback(bytemuck::cast_slice(data), frames);
        },
        |err| log::error!("cpal input stream error: {}", err),
        None,
    )
}

/// An opened cpal stream. Created paused.
struct CpalStream {
    stream: Option<cpal::Stream>,
    info: StreamInfo,
}

// SAFETY: cpal::Stream is !Send on some hosts because its handle must not
// be used from two threads at once. The session owns the stream and only
// calls it from the control thread; the real-time callback never touches it.
unsafe impl Send for CpalStream {}

impl NativeStream for CpalStream {
    fn start(&mut self) -> Result<(), BackendError> {
        match &self.stream {
            Some(stream) => stream
                .play()
                .map_err(|e| BackendError::Stream(format!("play failed: {}", e))),
            None => Err(BackendError::Stream("stream is closed".into())),
        }
    }

    fn stop(&mut self) -> Result<(), BackendError> {
        match &self.stream {
            Some(stream) => stream
                .pause()
                .map_err(|e| BackendError::Stream(format!("pause failed: {}", e))),
            None => Ok(()),
        }
    }

    fn close(&mut self) -> Result<(), BackendError> {
        // dropping the stream stops it and joins the host's audio thread
        self.stream = None;
        Ok(())
    }

    fn info(&self) -> StreamInfo {
        self.info
    }
}
