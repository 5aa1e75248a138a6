//! Conversion between the canonical f32 representation and device formats.
//!
//! Integer formats use full-range scaling: `x * 2^(bits-1)` rounded to
//! nearest and clamped to `[min, max]`, so -1.0 maps to the most negative
//! value and +1.0 saturates at the most positive one. Unsigned formats are
//! offset binary (silence = midpoint). Float output is clamped to
//! `[-1.0, 1.0]`. All device data is native-endian.

use crate::models::format::SampleType;
use crate::processing::mix_buffer::MixBuffer;

/// Pack interleaved canonical samples into `out`.
///
/// Returns the number of samples written; stops at whichever of `samples`
/// or `out` runs out first.
pub fn pack(samples: &[f32], out: &mut [u8], format: SampleType) -> usize {
    match format {
        SampleType::Int8 => pack_with(samples, out, encode_i8),
        SampleType::UInt8 => pack_with(samples, out, encode_u8),
        SampleType::Int16 => pack_with(samples, out, encode_i16),
        SampleType::UInt16 => pack_with(samples, out, encode_u16),
        SampleType::Int32 => pack_with(samples, out, encode_i32),
        SampleType::UInt32 => pack_with(samples, out, encode_u32),
        SampleType::Float32 => pack_with(samples, out, encode_f32),
    }
}

/// Unpack device samples from `data` into canonical f32.
///
/// Returns the number of samples written to `out`.
pub fn unpack(data: &[u8], out: &mut [f32], format: SampleType) -> usize {
    match format {
        SampleType::Int8 => unpack_with(data, out, decode_i8),
        SampleType::UInt8 => unpack_with(data, out, decode_u8),
        SampleType::Int16 => unpack_with(data, out, decode_i16),
        SampleType::UInt16 => unpack_with(data, out, decode_u16),
        SampleType::Int32 => unpack_with(data, out, decode_i32),
        SampleType::UInt32 => unpack_with(data, out, decode_u32),
        SampleType::Float32 => unpack_with(data, out, decode_f32),
    }
}

/// Interleave the first `frames` frames of a planar mix into `out`.
pub fn pack_planar(mix: &MixBuffer, frames: usize, out: &mut [u8], format: SampleType) {
    match format {
        SampleType::Int8 => pack_planar_with(mix, frames, out, encode_i8),
        SampleType::UInt8 => pack_planar_with(mix, frames, out, encode_u8),
        SampleType::Int16 => pack_planar_with(mix, frames, out, encode_i16),
        SampleType::UInt16 => pack_planar_with(mix, frames, out, encode_u16),
        SampleType::Int32 => pack_planar_with(mix, frames, out, encode_i32),
        SampleType::UInt32 => pack_planar_with(mix, frames, out, encode_u32),
        SampleType::Float32 => pack_planar_with(mix, frames, out, encode_f32),
    }
}

/// Fill `out` with the silence value of `format`.
pub fn fill_silence(out: &mut [u8], format: SampleType) {
    match format {
        SampleType::UInt8 => out.fill(0x80),
        SampleType::UInt16 => fill_pattern(out, &0x8000u16.to_ne_bytes()),
        SampleType::UInt32 => fill_pattern(out, &0x8000_0000u32.to_ne_bytes()),
        _ => out.fill(0),
    }
}

fn fill_pattern(out: &mut [u8], pattern: &[u8]) {
    for chunk in out.chunks_mut(pattern.len()) {
        chunk.copy_from_slice(&pattern[..chunk.len()]);
    }
}

fn pack_with<const N: usize>(samples: &[f32], out: &mut [u8], encode: fn(f32) -> [u8; N]) -> usize {
    let mut written = 0;
    for (dst, &sample) in out.chunks_exact_mut(N).zip(samples) {
        dst.copy_from_slice(&encode(sample));
        written += 1;
    }
    written
}

fn unpack_with<const N: usize>(data: &[u8], out: &mut [f32], decode: fn([u8; N]) -> f32) -> usize {
    let mut written = 0;
    for (src, dst) in data.chunks_exact(N).zip(out.iter_mut()) {
        let mut bytes = [0u8; N];
        bytes.copy_from_slice(src);
        *dst = decode(bytes);
        written += 1;
    }
    written
}

fn pack_planar_with<const N: usize>(
    mix: &MixBuffer,
    frames: usize,
    out: &mut [u8],
    encode: fn(f32) -> [u8; N],
) {
    let channels = mix.channels();
    if channels == 0 {
        return;
    }
    for (frame, dst) in out.chunks_exact_mut(N * channels).take(frames).enumerate() {
        for (channel, sample) in dst.chunks_exact_mut(N).enumerate() {
            sample.copy_from_slice(&encode(mix.channel(channel)[frame]));
        }
    }
}

fn scale(sample: f32, full_scale: f32, min: f32, max: f32) -> f32 {
    (sample * full_scale).round().clamp(min, max)
}

fn encode_i8(sample: f32) -> [u8; 1] {
    (scale(sample, 128.0, -128.0, 127.0) as i8).to_ne_bytes()
}

fn encode_u8(sample: f32) -> [u8; 1] {
    [(scale(sample, 128.0, -128.0, 127.0) as i8 as u8) ^ 0x80]
}

fn encode_i16(sample: f32) -> [u8; 2] {
    (scale(sample, 32768.0, -32768.0, 32767.0) as i16).to_ne_bytes()
}

fn encode_u16(sample: f32) -> [u8; 2] {
    ((scale(sample, 32768.0, -32768.0, 32767.0) as i16 as u16) ^ 0x8000).to_ne_bytes()
}

fn encode_i32(sample: f32) -> [u8; 4] {
    // f32 cannot hold 2^31 - 1 exactly; scale in f64.
    let value = (f64::from(sample) * 2_147_483_648.0)
        .round()
        .clamp(-2_147_483_648.0, 2_147_483_647.0);
    (value as i32).to_ne_bytes()
}

fn encode_u32(sample: f32) -> [u8; 4] {
    let signed = i32::from_ne_bytes(encode_i32(sample));
    ((signed as u32) ^ 0x8000_0000).to_ne_bytes()
}

fn encode_f32(sample: f32) -> [u8; 4] {
    sample.clamp(-1.0, 1.0).to_ne_bytes()
}

fn decode_i8(bytes: [u8; 1]) -> f32 {
    f32::from(i8::from_ne_bytes(bytes)) / 128.0
}

fn decode_u8(bytes: [u8; 1]) -> f32 {
    f32::from((bytes[0] ^ 0x80) as i8) / 128.0
}

fn decode_i16(bytes: [u8; 2]) -> f32 {
    f32::from(i16::from_ne_bytes(bytes)) / 32768.0
}

fn decode_u16(bytes: [u8; 2]) -> f32 {
    f32::from((u16::from_ne_bytes(bytes) ^ 0x8000) as i16) / 32768.0
}

fn decode_i32(bytes: [u8; 4]) -> f32 {
    (f64::from(i32::from_ne_bytes(bytes)) / 2_147_483_648.0) as f32
}

fn decode_u32(bytes: [u8; 4]) -> f32 {
    (f64::from((u32::from_ne_bytes(bytes) ^ 0x8000_0000) as i32) / 2_147_483_648.0) as f32
}

fn decode_f32(bytes: [u8; 4]) -> f32 {
    f32::from_ne_bytes(bytes)
}
