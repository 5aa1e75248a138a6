use std::sync::Arc;

use crate::models::format::Direction;
use crate::traits::backend_factory::BackendFactory;

/// Ordered set of backend factories, most preferred first.
///
/// `init_all` initializes every factory and keeps only the ones that came
/// up; the rest are deinitialized and dropped.
#[derive(Default)]
pub struct BackendRegistry {
    factories: Vec<Arc<dyn BackendFactory>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, factory: Arc<dyn BackendFactory>) {
        self.factories.push(factory);
    }

    pub fn with(mut self, factory: Arc<dyn BackendFactory>) -> Self {
        self.register(factory);
        self
    }

    /// Initialize all factories; returns how many are usable.
    pub fn init_all(&mut self) -> usize {
        self.factories.retain(|factory| match factory.init() {
            Ok(()) => {
                log::info!("backend {} initialized", factory.name());
                true
            }
            Err(e) => {
                log::error!("backend {} failed to initialize: {}", factory.name(), e);
                factory.deinit();
                false
            }
        });
        self.factories.len()
    }

    pub fn deinit_all(&mut self) {
        for factory in self.factories.drain(..).rev() {
            factory.deinit();
            log::debug!("backend {} deinitialized", factory.name());
        }
    }

    pub fn find(&self, name: &str) -> Option<Arc<dyn BackendFactory>> {
        self.factories.iter().find(|f| f.name() == name).cloned()
    }

    /// First initialized factory that can open `direction`.
    pub fn first_supporting(&self, direction: Direction) -> Option<Arc<dyn BackendFactory>> {
        self.factories
            .iter()
            .find(|f| f.is_initialized() && f.query_support(direction))
            .cloned()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.factories.iter().map(|f| f.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::loopback::LoopbackBackendFactory;
    use crate::backends::null::NullBackendFactory;
    use crate::factory::lifecycle::BackendLifecycle;
    use crate::models::error::DeviceError;
    use crate::traits::backend::DeviceBackend;
    use crate::traits::backend_factory::DeviceNames;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Factory whose init always fails.
    #[derive(Default)]
    struct Broken {
        lifecycle: BackendLifecycle,
        deinits: AtomicUsize,
    }

    impl BackendFactory for Broken {
        fn name(&self) -> &'static str {
            "broken"
        }

        fn init(&self) -> Result<(), DeviceError> {
            self.lifecycle
                .init(|| Err(DeviceError::ConfigurationFailed("library missing".into())))
        }

        fn deinit(&self) {
            self.lifecycle.deinit(|| {
                self.deinits.fetch_add(1, Ordering::SeqCst);
            });
        }

        fn is_initialized(&self) -> bool {
            self.lifecycle.is_initialized()
        }

        fn query_support(&self, _direction: Direction) -> bool {
            true
        }

        fn probe(&self, _direction: Direction) -> DeviceNames {
            DeviceNames::empty()
        }

        fn create_backend(&self) -> Result<Arc<dyn DeviceBackend>, DeviceError> {
            Err(DeviceError::ConfigurationFailed("library missing".into()))
        }
    }

    #[test]
    fn init_all_drops_failed_factories() {
        let broken = Arc::new(Broken::default());
        let mut registry = BackendRegistry::new()
            .with(broken.clone())
            .with(Arc::new(NullBackendFactory::new()))
            .with(Arc::new(LoopbackBackendFactory::new()));

        assert_eq!(registry.init_all(), 2);
        assert_eq!(registry.names(), vec!["null", "loopback"]);
        assert!(registry.find("broken").is_none());
        // partial init was cleaned up
        assert_eq!(broken.deinits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn first_supporting_respects_order_and_direction() {
        let mut registry = BackendRegistry::new()
            .with(Arc::new(NullBackendFactory::new()))
            .with(Arc::new(LoopbackBackendFactory::new()));
        assert!(registry.first_supporting(Direction::Playback).is_none());

        registry.init_all();
        let playback = registry.first_supporting(Direction::Playback).unwrap();
        assert_eq!(playback.name(), "null");
        let capture = registry.first_supporting(Direction::Capture).unwrap();
        assert_eq!(capture.name(), "loopback");

        registry.deinit_all();
        assert!(registry.is_empty());
    }
}
