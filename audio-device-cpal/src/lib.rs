//! # audio-device-cpal
//!
//! cpal backend for audio-device-core.
//!
//! Provides:
//! - `CpalBackendFactory`: process-wide factory bound to the default cpal host
//! - `CpalBackend`: opens playback/capture streams in any `NativeFormat`
//! - `DeviceEnumerator`: index-addressed device lists per direction
//!
//! ## Usage
//! ```ignore
//! use std::sync::Arc;
//! use audio_device_core::{BackendFactory, DeviceConfig, Direction, EmptyConfig, SessionControl};
//! use audio_device_cpal::CpalBackendFactory;
//!
//! let factory = CpalBackendFactory::get();
//! factory.init()?;
//! let mut session =
//!     factory.create_session(Direction::Playback, DeviceConfig::default(), Arc::new(EmptyConfig))?;
//! session.open(None)?;
//! session.start()?;
//! ```

pub mod cpal_backend;
pub mod device_enumerator;
pub mod factory;

pub use cpal_backend::CpalBackend;
pub use device_enumerator::DeviceEnumerator;
pub use factory::CpalBackendFactory;
