pub mod format_converter;
pub mod mix_buffer;
pub mod resampler;
pub mod ring_buffer;
pub mod source_mixer;
