use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::config::DeviceConfig;
use super::format::{ChannelLayout, Direction, SampleType};

/// One open audio endpoint.
///
/// Created by `open`, updated only by `reset`. The name is fixed once the
/// session has opened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub direction: Direction,
    pub sample_rate: u32,
    pub channels: ChannelLayout,
    pub sample_type: SampleType,
    pub update_size: u32,
    pub num_updates: u32,
    pub name: String,
}

impl Device {
    pub(crate) fn from_config(direction: Direction, config: &DeviceConfig, name: String) -> Self {
        Self {
            direction,
            sample_rate: config.sample_rate,
            channels: config.channels,
            sample_type: config.sample_type,
            update_size: config.update_size,
            num_updates: config.num_updates,
            name,
        }
    }

    pub fn channel_count(&self) -> usize {
        self.channels.count()
    }

    /// Bytes per frame in the device sample type.
    pub fn frame_size(&self) -> usize {
        self.channel_count() * self.sample_type.bytes()
    }

    /// Latency the backend is asked for: the whole update ring.
    pub fn suggested_latency(&self) -> Duration {
        frames_to_duration(
            u64::from(self.update_size) * u64::from(self.num_updates),
            self.sample_rate,
        )
    }
}

/// Device clock paired with the current output/input latency estimate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClockLatency {
    /// Time represented by the frames processed since the session opened.
    pub clock_time: Duration,
    pub latency: Duration,
}

pub(crate) fn frames_to_duration(frames: u64, sample_rate: u32) -> Duration {
    if sample_rate == 0 {
        return Duration::ZERO;
    }
    let rate = u64::from(sample_rate);
    let secs = frames / rate;
    let rem = frames % rate;
    Duration::from_secs(secs) + Duration::from_nanos(rem * 1_000_000_000 / rate)
}
