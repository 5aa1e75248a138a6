use std::fmt;
use std::sync::Arc;

use crate::models::config::DeviceConfig;
use crate::models::error::DeviceError;
use crate::models::format::Direction;
use crate::session::DeviceSession;
use crate::traits::backend::DeviceBackend;
use crate::traits::config_store::ConfigStore;

/// Device names produced by `BackendFactory::probe`.
///
/// Enumeration runs on the first `next()`; the iterator is finite and
/// single-pass. Probe again to get a fresh list.
pub struct DeviceNames {
    pending: Option<Box<dyn FnOnce() -> Vec<String> + Send>>,
    names: std::vec::IntoIter<String>,
}

impl DeviceNames {
    pub fn lazy(enumerate: impl FnOnce() -> Vec<String> + Send + 'static) -> Self {
        Self {
            pending: Some(Box::new(enumerate)),
            names: Vec::new().into_iter(),
        }
    }

    pub fn empty() -> Self {
        Self {
            pending: None,
            names: Vec::new().into_iter(),
        }
    }
}

impl Iterator for DeviceNames {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        if let Some(enumerate) = self.pending.take() {
            self.names = enumerate().into_iter();
        }
        self.names.next()
    }
}

impl fmt::Debug for DeviceNames {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceNames")
            .field("enumerated", &self.pending.is_none())
            .finish()
    }
}

/// Entry point for one kind of backend.
///
/// `init` must succeed before sessions are created. It is idempotent, and
/// `deinit` is safe after a failed or partial `init`.
pub trait BackendFactory: Send + Sync {
    fn name(&self) -> &'static str;

    fn init(&self) -> Result<(), DeviceError>;

    fn deinit(&self);

    fn is_initialized(&self) -> bool;

    /// Whether sessions of `direction` can be created.
    fn query_support(&self, direction: Direction) -> bool;

    /// Device names for `direction`.
    fn probe(&self, direction: Direction) -> DeviceNames;

    /// A backend instance sessions can open streams on.
    fn create_backend(&self) -> Result<Arc<dyn DeviceBackend>, DeviceError>;

    /// A closed session bound to a fresh backend instance.
    fn create_session(
        &self,
        direction: Direction,
        config: DeviceConfig,
        store: Arc<dyn ConfigStore>,
    ) -> Result<DeviceSession, DeviceError> {
        if !self.is_initialized() || !self.query_support(direction) {
            return Err(DeviceError::BackendUnavailable {
                name: self.name().to_string(),
                direction,
            });
        }
        let backend = self.create_backend()?;
        Ok(DeviceSession::new(direction, backend, config, store))
    }
}
