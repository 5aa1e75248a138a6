/// Result of one `SampleProvider::pull`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pulled {
    /// Frames written to the front of the output slice.
    pub frames: usize,
    /// No more data will ever follow.
    pub end_of_stream: bool,
}

impl Pulled {
    pub fn frames(frames: usize) -> Self {
        Self {
            frames,
            end_of_stream: false,
        }
    }

    pub fn end(frames: usize) -> Self {
        Self {
            frames,
            end_of_stream: true,
        }
    }
}

/// Application-side sample data for one source.
///
/// Called from the mixer on the real-time thread. A provider that has no
/// data ready returns fewer frames than asked for without blocking; the
/// missing frames are mixed as silence.
pub trait SampleProvider: Send {
    /// Native sample rate of the delivered frames.
    fn sample_rate(&self) -> u32;

    /// Interleaved channels per frame (1 or 2).
    fn channels(&self) -> usize;

    /// Fill up to `out.len() / channels()` interleaved frames.
    fn pull(&mut self, out: &mut [f32]) -> Pulled;
}

/// Opaque per-source render stage (HRTF, reverb send, filters).
///
/// Receives the resampled block, interleaved in source channels, before gain
/// and routing. Same real-time rules as `SampleProvider::pull`.
pub trait SourceEffect: Send {
    fn process(&mut self, block: &mut [f32], channels: usize);
}
