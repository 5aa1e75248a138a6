use std::fmt;

use serde::{Deserialize, Serialize};

/// Whether a device renders or records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Playback,
    Capture,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Playback => f.write_str("playback"),
            Self::Capture => f.write_str("capture"),
        }
    }
}

/// Device-side sample representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleType {
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Float32,
}

impl SampleType {
    /// Bytes per sample.
    pub fn bytes(self) -> usize {
        match self {
            Self::Int8 | Self::UInt8 => 1,
            Self::Int16 | Self::UInt16 => 2,
            Self::Int32 | Self::UInt32 | Self::Float32 => 4,
        }
    }

    pub fn is_unsigned(self) -> bool {
        matches!(self, Self::UInt8 | Self::UInt16 | Self::UInt32)
    }
}

impl fmt::Display for SampleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Int8 => "int8",
            Self::UInt8 => "uint8",
            Self::Int16 => "int16",
            Self::UInt16 => "uint16",
            Self::Int32 => "int32",
            Self::UInt32 => "uint32",
            Self::Float32 => "float32",
        };
        f.write_str(name)
    }
}

/// Sample formats a native backend can be asked to open a stream with.
///
/// Narrower than `SampleType`: there is no native 16/32-bit unsigned format,
/// playback maps those onto the signed counterpart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NativeFormat {
    Int8,
    UInt8,
    Int16,
    Int32,
    Float32,
}

impl NativeFormat {
    pub fn bytes(self) -> usize {
        self.sample_type().bytes()
    }

    /// The device sample type matching this native format exactly.
    pub fn sample_type(self) -> SampleType {
        match self {
            Self::Int8 => SampleType::Int8,
            Self::UInt8 => SampleType::UInt8,
            Self::Int16 => SampleType::Int16,
            Self::Int32 => SampleType::Int32,
            Self::Float32 => SampleType::Float32,
        }
    }
}

impl fmt::Display for NativeFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.sample_type(), f)
    }
}

/// Speaker position of one channel in a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Channel {
    FrontLeft,
    FrontRight,
    FrontCenter,
    Lfe,
    BackLeft,
    BackRight,
    BackCenter,
    SideLeft,
    SideRight,
}

/// Channel layouts a device can be opened with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelLayout {
    Mono,
    Stereo,
    Quad,
    X51,
    X61,
    X71,
}

/// Upper bound on `ChannelLayout::count()`.
pub const MAX_OUTPUT_CHANNELS: usize = 8;

impl ChannelLayout {
    pub fn count(self) -> usize {
        self.channel_order().len()
    }

    /// Interleaving order of the channels in one frame.
    pub fn channel_order(self) -> &'static [Channel] {
        use Channel::*;
        match self {
            Self::Mono => &[FrontCenter],
            Self::Stereo => &[FrontLeft, FrontRight],
            Self::Quad => &[FrontLeft, FrontRight, BackLeft, BackRight],
            Self::X51 => &[FrontLeft, FrontRight, FrontCenter, Lfe, SideLeft, SideRight],
            Self::X61 => &[FrontLeft, FrontRight, FrontCenter, Lfe, BackCenter, SideLeft, SideRight],
            Self::X71 => &[
                FrontLeft, FrontRight, FrontCenter, Lfe, BackLeft, BackRight, SideLeft, SideRight,
            ],
        }
    }

    /// Index of `channel` in this layout's frame, if present.
    pub fn index_of(self, channel: Channel) -> Option<usize> {
        self.channel_order().iter().position(|&c| c == channel)
    }

    /// Layout for a plain channel count, as reported back by a backend.
    pub fn from_count(count: u16) -> Option<Self> {
        match count {
            1 => Some(Self::Mono),
            2 => Some(Self::Stereo),
            4 => Some(Self::Quad),
            6 => Some(Self::X51),
            7 => Some(Self::X61),
            8 => Some(Self::X71),
            _ => None,
        }
    }
}

impl fmt::Display for ChannelLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Mono => "mono",
            Self::Stereo => "stereo",
            Self::Quad => "quad",
            Self::X51 => "5.1 surround",
            Self::X61 => "6.1 surround",
            Self::X71 => "7.1 surround",
        };
        f.write_str(name)
    }
}
