use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;

use audio_device_core::factory::lifecycle::BackendLifecycle;
use audio_device_core::models::error::DeviceError;
use audio_device_core::models::format::Direction;
use audio_device_core::traits::backend::DeviceBackend;
use audio_device_core::traits::backend_factory::{BackendFactory, DeviceNames};

use crate::cpal_backend::CpalBackend;
use crate::device_enumerator::DeviceEnumerator;

static FACTORY: OnceLock<Arc<CpalBackendFactory>> = OnceLock::new();

/// Process-wide factory for the cpal backend.
///
/// `init` picks the platform's default cpal host; every backend created
/// afterwards talks to that host.
pub struct CpalBackendFactory {
    lifecycle: BackendLifecycle,
    host: Mutex<Option<cpal::HostId>>,
}

impl CpalBackendFactory {
    /// The shared factory instance.
    pub fn get() -> Arc<Self> {
        Arc::clone(FACTORY.get_or_init(|| Arc::new(Self::new())))
    }

    fn new() -> Self {
        Self {
            lifecycle: BackendLifecycle::new(),
            host: Mutex::new(None),
        }
    }

    /// Host selected by `init`, if initialized.
    pub fn host_id(&self) -> Option<cpal::HostId> {
        *self.host.lock()
    }
}

impl BackendFactory for CpalBackendFactory {
    fn name(&self) -> &'static str {
        "cpal"
    }

    fn init(&self) -> Result<(), DeviceError> {
        self.lifecycle.init(|| {
            if cpal::available_hosts().is_empty() {
                return Err(DeviceError::ConfigurationFailed(
                    "no cpal audio host available".into(),
                ));
            }
            let id = cpal::default_host().id();
            log::info!("cpal backend using host {}", id.name());
            *self.host.lock() = Some(id);
            Ok(())
        })
    }

    fn deinit(&self) {
        self.lifecycle.deinit(|| {
            *self.host.lock() = None;
        });
    }

    fn is_initialized(&self) -> bool {
        self.lifecycle.is_initialized()
    }

    fn query_support(&self, _direction: Direction) -> bool {
        self.is_initialized()
    }

    fn probe(&self, direction: Direction) -> DeviceNames {
        let Some(host_id) = self.host_id() else {
            return DeviceNames::empty();
        };
        DeviceNames::lazy(move || match DeviceEnumerator::new(host_id) {
            Ok(enumerator) => enumerator.device_names(direction).unwrap_or_else(|e| {
                log::warn!("cpal {} device listing failed: {}", direction, e);
                Vec::new()
            }),
            Err(e) => {
                log::warn!("cpal host unavailable: {}", e);
                Vec::new()
            }
        })
    }

    fn create_backend(&self) -> Result<Arc<dyn DeviceBackend>, DeviceError> {
        let host_id = self.host_id().ok_or_else(|| {
            DeviceError::ConfigurationFailed("cpal backend is not initialized".into())
        })?;
        Ok(Arc::new(CpalBackend::new(host_id)))
    }
}
