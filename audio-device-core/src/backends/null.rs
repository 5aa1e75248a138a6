//! Null output: renders on its own timer thread and discards the result.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::factory::lifecycle::BackendLifecycle;
use crate::models::device::frames_to_duration;
use crate::models::error::{BackendError, DeviceError};
use crate::models::format::Direction;
use crate::traits::backend::{
    DeviceBackend, NativeStream, RenderCallback, StreamCallback, StreamConfig, StreamInfo,
};
use crate::traits::backend_factory::{BackendFactory, DeviceNames};

pub const NULL_DEVICE_NAME: &str = "No Output";

/// Block size used when the session leaves it to the backend.
const DEFAULT_UPDATE_SIZE: u32 = 1024;

/// Playback-only backend with one device that plays nothing.
#[derive(Debug, Default)]
pub struct NullBackend;

impl DeviceBackend for NullBackend {
    fn name(&self) -> &str {
        "null"
    }

    fn config_block(&self) -> &str {
        "null"
    }

    fn default_device_name(&self, _direction: Direction) -> String {
        NULL_DEVICE_NAME.into()
    }

    fn device_names(&self, direction: Direction) -> Result<Vec<String>, BackendError> {
        Ok(match direction {
            Direction::Playback => vec![NULL_DEVICE_NAME.into()],
            Direction::Capture => Vec::new(),
        })
    }

    fn default_output_device(&self) -> Option<usize> {
        Some(0)
    }

    fn default_input_device(&self) -> Option<usize> {
        None
    }

    fn open_stream(
        &self,
        config: &StreamConfig,
        callback: StreamCallback,
    ) -> Result<Box<dyn NativeStream>, BackendError> {
        let StreamCallback::Render(callback) = callback else {
            return Err(BackendError::DeviceUnavailable(
                "null backend has no capture devices".into(),
            ));
        };
        let update_size = config.update_size.unwrap_or(DEFAULT_UPDATE_SIZE).max(1);

        Ok(Box::new(NullStream {
            info: StreamInfo {
                sample_rate: config.sample_rate,
                channels: config.channels,
                format: config.format,
            },
            update_size,
            callback: Arc::new(Mutex::new(callback)),
            running: Arc::new(AtomicBool::new(false)),
            render_handle: None,
        }))
    }
}

/// Stream driven by a sleeping thread at the block cadence.
struct NullStream {
    info: StreamInfo,
    update_size: u32,
    callback: Arc<Mutex<RenderCallback>>,
    running: Arc<AtomicBool>,
    render_handle: Option<thread::JoinHandle<()>>,
}

impl NativeStream for NullStream {
    fn start(&mut self) -> Result<(), BackendError> {
        if self.running.load(Ordering::SeqCst) {
            return Ok(());
        }

        self.running.store(true, Ordering::SeqCst);
        let running = Arc::clone(&self.running);
        let callback = Arc::clone(&self.callback);
        let frames = self.update_size as usize;
        let block_len = frames * usize::from(self.info.channels) * self.info.format.bytes();
        let period = frames_to_duration(u64::from(self.update_size), self.info.sample_rate);

        let handle = thread::Builder::new()
            .name("null-backend-render".into())
            .spawn(move || {
                let mut buffer = vec![0u8; block_len];
                let mut next = Instant::now();
                while running.load(Ordering::SeqCst) {
                    {
                        let mut render = callback.lock();
                        (*render)(&mut buffer, frames);
                    }
                    next += period;
                    if let Some(wait) = next.checked_duration_since(Instant::now()) {
                        thread::sleep(wait);
                    } else {
                        // fell behind; skip ahead instead of bursting
                        next = Instant::now();
                    }
                }
            });

        match handle {
            Ok(handle) => {
                self.render_handle = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                Err(BackendError::Io(format!("failed to spawn render thread: {}", e)))
            }
        }
    }

    fn stop(&mut self) -> Result<(), BackendError> {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.render_handle.take() {
            handle
                .join()
                .map_err(|_| BackendError::Stream("render thread panicked".into()))?;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), BackendError> {
        self.stop()
    }

    fn info(&self) -> StreamInfo {
        self.info
    }
}

impl Drop for NullStream {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            log::error!("null stream: {}", e);
        }
    }
}

/// Factory for [`NullBackend`]. Always initializes.
#[derive(Debug, Default)]
pub struct NullBackendFactory {
    lifecycle: BackendLifecycle,
}

impl NullBackendFactory {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BackendFactory for NullBackendFactory {
    fn name(&self) -> &'static str {
        "null"
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

    fn query_support(&self, direction: Direction) -> bool {
        direction == Direction::Playback
    }

    fn probe(&self, direction: Direction) -> DeviceNames {
        match direction {
            Direction::Playback => DeviceNames::lazy(|| vec![NULL_DEVICE_NAME.to_string()]),
            Direction::Capture => DeviceNames::empty(),
        }
    }

    fn create_backend(&self) -> Result<Arc<dyn DeviceBackend>, DeviceError> {
        Ok(Arc::new(NullBackend))
    }
}
