use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::format::{ChannelLayout, SampleType};
use crate::traits::config_store::ConfigStore;

/// Largest accepted `update_size`, in frames.
pub const MAX_UPDATE_SIZE: u32 = 1 << 16;

/// Largest accepted `num_updates`.
pub const MAX_NUM_UPDATES: u32 = 64;

/// Largest accepted `max_sources`.
pub const MAX_SOURCES: usize = 4096;

/// Requested format and buffering for a device session.
///
/// This is what the application asks for; the negotiated result ends up in
/// `Device` after `open`/`reset`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Sample rate in Hz (default: 44100).
    pub sample_rate: u32,

    /// Channel layout (default: stereo).
    pub channels: ChannelLayout,

    /// Device sample type (default: float32, the canonical format).
    pub sample_type: SampleType,

    /// Frames per callback block (default: 1024).
    pub update_size: u32,

    /// Number of blocks in the device ring (default: 3).
    pub num_updates: u32,

    /// Maximum number of simultaneously attached sources (default: 256).
    pub max_sources: usize,
}

impl DeviceConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.sample_rate == 0 {
            return Err("sample rate must be positive".into());
        }
        if self.update_size == 0 {
            return Err("update size must be positive".into());
        }
        if self.update_size > MAX_UPDATE_SIZE {
            return Err(format!(
                "update size {} exceeds {} frames",
                self.update_size, MAX_UPDATE_SIZE
            ));
        }
        if self.num_updates < 2 {
            return Err(format!("need at least 2 updates, got {}", self.num_updates));
        }
        if self.num_updates > MAX_NUM_UPDATES {
            return Err(format!(
                "{} updates exceeds the limit of {}",
                self.num_updates, MAX_NUM_UPDATES
            ));
        }
        if self.max_sources == 0 || self.max_sources > MAX_SOURCES {
            return Err(format!(
                "source limit must be within 1..={}, got {}",
                MAX_SOURCES, self.max_sources
            ));
        }
        Ok(())
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            channels: ChannelLayout::Stereo,
            sample_type: SampleType::Float32,
            update_size: 1024,
            num_updates: 3,
            max_sources: 256,
        }
    }
}

/// Config store backed by a JSON document of per-backend blocks:
///
/// ```json
/// { "cpal": { "device": 2, "capture": 0 }, "null": {} }
/// ```
#[derive(Debug, Clone, Default)]
pub struct JsonConfigStore {
    blocks: HashMap<String, HashMap<String, serde_json::Value>>,
}

impl JsonConfigStore {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        let blocks = serde_json::from_str(text)?;
        Ok(Self { blocks })
    }

    pub fn set_int(&mut self, block: &str, key: &str, value: i64) {
        self.blocks
            .entry(block.to_string())
            .or_default()
            .insert(key.to_string(), serde_json::Value::from(value));
    }
}

impl ConfigStore for JsonConfigStore {
    fn int_value(&self, block: &str, key: &str) -> Option<i64> {
        self.blocks.get(block)?.get(key)?.as_i64()
    }
}
