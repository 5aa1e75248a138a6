use parking_lot::Mutex;

use crate::models::error::DeviceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Uninitialized,
    Ready,
    /// `init` ran and failed part way; `deinit` still has to clean up.
    Failed,
}

/// Process-wide init/deinit guard for a backend factory.
///
/// ```text
/// uninitialized ── init ok ──→ ready ── deinit ──→ uninitialized
///       │                                              ↑
///       └──── init err ──→ failed ──── deinit ─────────┘
/// ```
///
/// `init` runs its closure only from `uninitialized` or `failed`, so it is
/// idempotent once it succeeds. `deinit` runs its closure for `ready` and
/// `failed` and does nothing otherwise.
#[derive(Debug)]
pub struct BackendLifecycle {
    phase: Mutex<Phase>,
}

impl BackendLifecycle {
    pub const fn new() -> Self {
        Self {
            phase: parking_lot::const_mutex(Phase::Uninitialized),
        }
    }

    pub fn init(&self, init: impl FnOnce() -> Result<(), DeviceError>) -> Result<(), DeviceError> {
        let mut phase = self.phase.lock();
        if *phase == Phase::Ready {
            return Ok(());
        }
        match init() {
            Ok(()) => {
                *phase = Phase::Ready;
                Ok(())
            }
            Err(e) => {
                *phase = Phase::Failed;
                Err(e)
            }
        }
    }

    pub fn deinit(&self, deinit: impl FnOnce()) {
        let mut phase = self.phase.lock();
        if *phase != Phase::Uninitialized {
            deinit();
            *phase = Phase::Uninitialized;
        }
    }

    pub fn is_initialized(&self) -> bool {
        *self.phase.lock() == Phase::Ready
    }
}

impl Default for BackendLifecycle {
    fn default() -> Self {
        Self::new()
    }
}
