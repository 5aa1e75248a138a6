use std::sync::atomic::{AtomicU64, Ordering};

use uuid::Uuid;

/// Kind of real-time data loss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum XrunKind {
    /// Capture ring was full; incoming frames were dropped.
    Overflow,
    /// A read asked for more frames than were buffered; the rest was silence.
    Underflow,
}

/// Xruns accumulated since the previous `poll_xruns` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct XrunReport {
    pub overflow_frames: u64,
    pub underflow_frames: u64,
}

impl XrunReport {
    pub fn is_empty(&self) -> bool {
        self.overflow_frames == 0 && self.underflow_frames == 0
    }

    pub fn frames(&self, kind: XrunKind) -> u64 {
        match kind {
            XrunKind::Overflow => self.overflow_frames,
            XrunKind::Underflow => self.underflow_frames,
        }
    }
}

/// Diagnostics snapshot for debugging device sessions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDiagnostics {
    pub session_id: Uuid,
    pub callback_count: u64,
    pub frames_processed: u64,
    pub overflow_frames: u64,
    pub underflow_frames: u64,
    pub format: String,
}

/// Counters written by the real-time callback and read by the control thread.
#[derive(Debug, Default)]
pub(crate) struct SessionCounters {
    callbacks: AtomicU64,
    frames: AtomicU64,
    overflow: AtomicU64,
    underflow: AtomicU64,
    reported_overflow: AtomicU64,
    reported_underflow: AtomicU64,
}

impl SessionCounters {
    pub(crate) fn record_callback(&self, frames: usize) {
        self.callbacks.fetch_add(1, Ordering::Relaxed);
        self.frames.fetch_add(frames as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_xrun(&self, kind: XrunKind, frames: usize) {
        let counter = match kind {
            XrunKind::Overflow => &self.overflow,
            XrunKind::Underflow => &self.underflow,
        };
        counter.fetch_add(frames as u64, Ordering::Relaxed);
    }

    pub(crate) fn frames_processed(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    /// Xruns since the last call; only the control thread calls this.
    pub(crate) fn take_unreported(&self) -> XrunReport {
        let overflow = self.overflow.load(Ordering::Relaxed);
        let underflow = self.underflow.load(Ordering::Relaxed);
        let prev_overflow = self.reported_overflow.swap(overflow, Ordering::Relaxed);
        let prev_underflow = self.reported_underflow.swap(underflow, Ordering::Relaxed);
        XrunReport {
            overflow_frames: overflow - prev_overflow,
            underflow_frames: underflow - prev_underflow,
        }
    }

    pub(crate) fn snapshot(&self, session_id: Uuid, format: String) -> SessionDiagnostics {
        SessionDiagnostics {
            session_id,
            callback_count: self.callbacks.load(Ordering::Relaxed),
            frames_processed: self.frames.load(Ordering::Relaxed),
            overflow_frames: self.overflow.load(Ordering::Relaxed),
            underflow_frames: self.underflow.load(Ordering::Relaxed),
            format,
        }
    }
}
