//! # audio-device-core
//!
//! Backend-agnostic core for real-time audio devices.
//!
//! Mixes any number of sources into a playback device and buffers captured
//! audio from an input device. Native audio libraries implement the
//! `DeviceBackend` trait and are reached through a `BackendFactory`; the
//! sessions never talk to a driver directly.
//!
//! ## Architecture
//!
//! ```text
//! audio-device-core (this crate)
//! ├── traits/       ← DeviceBackend, NativeStream, BackendFactory, SampleProvider, ConfigStore, DeviceDelegate
//! ├── models/       ← DeviceError, SessionState, DeviceConfig, Device, formats, diagnostics
//! ├── processing/   ← RingBuffer, format conversion, Resampler, SourceMixer
//! ├── session/      ← PlaybackSession, CaptureSession, format negotiation
//! ├── factory/      ← BackendLifecycle, BackendRegistry
//! └── backends/     ← NullBackend, LoopbackBackend
//! ```
//!
//! ## Threads
//!
//! Sessions are driven from one control thread. The backend calls the
//! render/capture callback on its own real-time thread; that path never
//! allocates or does I/O, and the only lock it takes is held by the control
//! thread for constant-time source bookkeeping.

pub mod backends;
pub mod factory;
pub mod models;
pub mod processing;
pub mod session;
pub mod traits;

#[cfg(test)]
mod testing;

// Re-export key types at crate root for convenience.
pub use backends::loopback::{LoopbackBackend, LoopbackBackendFactory};
pub use backends::null::{NullBackend, NullBackendFactory};
pub use factory::lifecycle::BackendLifecycle;
pub use factory::registry::BackendRegistry;
pub use models::config::{DeviceConfig, JsonConfigStore};
pub use models::device::{ClockLatency, Device};
pub use models::diagnostics::{SessionDiagnostics, XrunKind, XrunReport};
pub use models::error::{BackendError, DeviceError};
pub use models::format::{Channel, ChannelLayout, Direction, NativeFormat, SampleType};
pub use models::state::SessionState;
pub use processing::ring_buffer::RingBuffer;
pub use processing::source_mixer::{ChannelRouting, Source, SourceId, SourceMixer, SourceState};
pub use session::{CaptureSession, DeviceSession, PlaybackSession, SessionControl};
pub use traits::backend::{
    CaptureCallback, DeviceBackend, NativeStream, RenderCallback, StreamCallback, StreamConfig,
    StreamInfo,
};
pub use traits::backend_factory::{BackendFactory, DeviceNames};
pub use traits::config_store::{ConfigStore, EmptyConfig};
pub use traits::device_delegate::DeviceDelegate;
pub use traits::sample_provider::{Pulled, SampleProvider, SourceEffect};
