/// Read-only view of the external configuration store.
///
/// Values are grouped in per-backend blocks (e.g. `"cpal"`) and read once,
/// at open time.
pub trait ConfigStore: Send + Sync {
    fn int_value(&self, block: &str, key: &str) -> Option<i64>;

    /// Device index override; missing or negative means "use the default".
    fn device_index(&self, block: &str, key: &str) -> Option<usize> {
        self.int_value(block, key)
            .and_then(|v| usize::try_from(v).ok())
    }
}

/// A store with no values: every lookup falls back to defaults.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyConfig;

impl ConfigStore for EmptyConfig {
    fn int_value(&self, _block: &str, _key: &str) -> Option<i64> {
        None
    }
}
