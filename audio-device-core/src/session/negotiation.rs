//! Sample format negotiation between a requested `SampleType` and the
//! formats a native backend can open.

use crate::models::error::DeviceError;
use crate::models::format::{ChannelLayout, Direction, NativeFormat, SampleType};

/// Native format used to open a stream for `requested`.
///
/// Playback maps 16/32-bit unsigned onto the signed format of the same width
/// and converts on output. Capture delivers raw device frames, so it cannot
/// stand in a signed format for an unsigned request.
pub fn native_format_for(direction: Direction, requested: SampleType) -> Result<NativeFormat, DeviceError> {
    let format = match requested {
        SampleType::Int8 => NativeFormat::Int8,
        SampleType::UInt8 => NativeFormat::UInt8,
        SampleType::Int16 => NativeFormat::Int16,
        SampleType::Int32 => NativeFormat::Int32,
        SampleType::Float32 => NativeFormat::Float32,
        SampleType::UInt16 | SampleType::UInt32 => match direction {
            Direction::Playback if requested == SampleType::UInt16 => NativeFormat::Int16,
            Direction::Playback => NativeFormat::Int32,
            Direction::Capture => return Err(DeviceError::UnsupportedFormat(requested)),
        },
    };
    Ok(format)
}

/// Formats to try, in order, when opening a stream.
///
/// Float32 falls back to Int16 in both directions; every other request is
/// tried once. Capture readers see the accepted format through
/// `Device::sample_type` and `capture_canonical` unpacks either.
pub fn fallback_chain(_direction: Direction, first: NativeFormat) -> &'static [NativeFormat] {
    match first {
        NativeFormat::Float32 => &[NativeFormat::Float32, NativeFormat::Int16],
        NativeFormat::Int8 => &[NativeFormat::Int8],
        NativeFormat::UInt8 => &[NativeFormat::UInt8],
        NativeFormat::Int16 => &[NativeFormat::Int16],
        NativeFormat::Int32 => &[NativeFormat::Int32],
    }
}

/// Channel count a playback stream is opened with.
///
/// Multichannel layouts are opened as stereo; `reset` reports the result.
pub fn playback_channels(layout: ChannelLayout) -> u16 {
    match layout {
        ChannelLayout::Mono => 1,
        _ => 2,
    }
}

/// Layout of an opened playback stream.
pub fn playback_layout(channels: u16) -> Result<ChannelLayout, DeviceError> {
    match channels {
        1 => Ok(ChannelLayout::Mono),
        2 => Ok(ChannelLayout::Stereo),
        n => Err(DeviceError::FormatMismatch(format!(
            "unhandled channel count {n} for playback"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn playback_maps_unsigned_wide_types_to_signed() {
        assert_eq!(
            native_format_for(Direction::Playback, SampleType::UInt16),
            Ok(NativeFormat::Int16)
        );
        assert_eq!(
            native_format_for(Direction::Playback, SampleType::UInt32),
            Ok(NativeFormat::Int32)
        );
        assert_eq!(
            native_format_for(Direction::Playback, SampleType::UInt8),
            Ok(NativeFormat::UInt8)
        );
    }

    #[test]
    fn capture_rejects_unsigned_wide_types() {
        assert_eq!(
            native_format_for(Direction::Capture, SampleType::UInt16),
            Err(DeviceError::UnsupportedFormat(SampleType::UInt16))
        );
        assert_eq!(
            native_format_for(Direction::Capture, SampleType::UInt32),
            Err(DeviceError::UnsupportedFormat(SampleType::UInt32))
        );
        assert_eq!(
            native_format_for(Direction::Capture, SampleType::Float32),
            Ok(NativeFormat::Float32)
        );
    }

    #[test]
    fn only_float_has_a_fallback() {
        assert_eq!(
            fallback_chain(Direction::Playback, NativeFormat::Float32),
            &[NativeFormat::Float32, NativeFormat::Int16]
        );
        assert_eq!(
            fallback_chain(Direction::Capture, NativeFormat::Float32),
            &[NativeFormat::Float32, NativeFormat::Int16]
        );
        assert_eq!(
            fallback_chain(Direction::Capture, NativeFormat::UInt8),
            &[NativeFormat::UInt8]
        );
        assert_eq!(
            fallback_chain(Direction::Playback, NativeFormat::Int32),
            &[NativeFormat::Int32]
        );
    }

    #[test]
    fn playback_channel_mapping() {
        assert_eq!(playback_channels(ChannelLayout::Mono), 1);
        assert_eq!(playback_channels(ChannelLayout::X71), 2);
        assert_eq!(playback_layout(2), Ok(ChannelLayout::Stereo));
        assert!(matches!(playback_layout(6), Err(DeviceError::FormatMismatch(_))));
    }
}
