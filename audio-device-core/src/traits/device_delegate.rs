use crate::models::diagnostics::XrunReport;
use crate::models::error::DeviceError;
use crate::models::state::SessionState;

/// Event delegate for device session notifications.
///
/// All methods are called from the control thread that drives the session,
/// never from the real-time callback.
pub trait DeviceDelegate: Send + Sync {
    /// Called when the session state changes.
    fn on_state_changed(&self, state: SessionState);

    /// Called for errors that are logged instead of returned (stop/close).
    fn on_error(&self, error: &DeviceError);

    /// Called by `poll_xruns` when frames were dropped or padded.
    fn on_xrun(&self, report: &XrunReport);
}
