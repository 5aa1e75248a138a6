use std::fmt;

/// Device session state machine.
///
/// State transitions:
/// ```text
/// closed → open → configured → running
///            ↑                    │
///            └────── stop ────────┘
/// any state ── close ──→ closed
/// ```
///
/// `reset` moves `open` to `configured`. A session that was configured once
/// may be started again straight from `open` after a stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Closed,
    Open,
    Configured,
    Running,
}

impl SessionState {
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }

    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::Configured => "configured",
            Self::Running => "running",
        };
        f.write_str(name)
    }
}
