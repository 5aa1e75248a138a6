/// Fixed-point linear-interpolation resampler.
///
/// The read position is kept as an integer frame counter plus a 32-bit
/// fraction, and the per-output step is a 32.32 fixed-point value. Position
/// advances exactly by `step` per output frame, so no phase error builds up
/// across blocks; the only error is the 2^-32 rounding of the ratio itself.
///
/// The resampler holds the two input frames surrounding the read position,
/// which lets consecutive `process` calls join seamlessly.
#[derive(Debug, Clone)]
pub struct Resampler {
    channels: usize,
    step: u64,
    frac: u64,
    cur: [f32; MAX_SOURCE_CHANNELS],
    next: [f32; MAX_SOURCE_CHANNELS],
    primed: bool,
}

pub const FRAC_BITS: u32 = 32;
pub const FRAC_ONE: u64 = 1 << FRAC_BITS;

/// Upper bound of the combined rate ratio and pitch.
pub const MAX_STEP_RATIO: u64 = 16;
const MAX_STEP: u64 = MAX_STEP_RATIO << FRAC_BITS;

/// Most channels a source may deliver per frame.
pub const MAX_SOURCE_CHANNELS: usize = 2;

/// Input frames consumed before the first output frame.
const PRIME_FRAMES: usize = 2;

impl Resampler {
    pub fn new(channels: usize) -> Self {
        Self {
            channels: channels.clamp(1, MAX_SOURCE_CHANNELS),
            step: FRAC_ONE,
            frac: 0,
            cur: [0.0; MAX_SOURCE_CHANNELS],
            next: [0.0; MAX_SOURCE_CHANNELS],
            primed: false,
        }
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Read `source_rate` input to produce `target_rate` output, times `pitch`.
    pub fn set_ratio(&mut self, source_rate: u32, target_rate: u32, pitch: f32) {
        let ratio = f64::from(source_rate) / f64::from(target_rate.max(1)) * f64::from(pitch);
        let step = (ratio * FRAC_ONE as f64).round();
        self.step = if step.is_finite() {
            (step as u64).clamp(1, MAX_STEP)
        } else {
            FRAC_ONE
        };
    }

    /// Fixed-point step per output frame.
    pub fn step(&self) -> u64 {
        self.step
    }

    /// Input frames the next `frames` output frames will consume.
    pub fn input_needed(&self, frames: usize) -> usize {
        let advance = ((self.frac + self.step * frames as u64) >> FRAC_BITS) as usize;
        if self.primed {
            advance
        } else {
            advance + PRIME_FRAMES
        }
    }

    /// Most output frames whose input fits in `input_frames`.
    pub fn output_for_input(&self, input_frames: usize) -> usize {
        let prime = if self.primed { 0 } else { PRIME_FRAMES };
        if input_frames < prime {
            return 0;
        }
        // largest n with frac + step * (n - 1) < (available + 1) * ONE,
        // i.e. the n-th advance consumes at most `available` frames.
        let available = (input_frames - prime) as u64;
        let budget = ((available + 1) << FRAC_BITS) - self.frac;
        ((budget - 1) / self.step + 1) as usize - 1
    }

    /// Produce `frames` interleaved frames into `out`.
    ///
    /// `input` holds interleaved frames at the source rate, starting at the
    /// next unread frame. Missing input reads as silence. Returns the number
    /// of input frames consumed (including ones that were missing).
    pub fn process(&mut self, input: &[f32], out: &mut [f32], frames: usize) -> usize {
        let channels = self.channels;
        let available = input.len() / channels;
        let mut pos = 0usize;

        if !self.primed {
            load_frame(input, channels, available, &mut pos, &mut self.cur);
            load_frame(input, channels, available, &mut pos, &mut self.next);
            self.primed = true;
        }

        let inv_one = 1.0 / FRAC_ONE as f64;
        for frame in out.chunks_exact_mut(channels).take(frames) {
            let t = (self.frac as f64 * inv_one) as f32;
            for (c, sample) in frame.iter_mut().enumerate() {
                *sample = self.cur[c] + (self.next[c] - self.cur[c]) * t;
            }

            self.frac += self.step;
            while self.frac >= FRAC_ONE {
                self.frac -= FRAC_ONE;
                self.cur = self.next;
                load_frame(input, channels, available, &mut pos, &mut self.next);
            }
        }
        pos
    }

    /// Forget history and phase, as if no input had been read.
    pub fn reset(&mut self) {
        self.frac = 0;
        self.cur = [0.0; MAX_SOURCE_CHANNELS];
        self.next = [0.0; MAX_SOURCE_CHANNELS];
        self.primed = false;
    }
}

fn load_frame(
    input: &[f32],
    channels: usize,
    available: usize,
    pos: &mut usize,
    dst: &mut [f32; MAX_SOURCE_CHANNELS],
) {
    for (c, sample) in dst.iter_mut().take(channels).enumerate() {
        *sample = if *pos < available {
            input[*pos * channels + c]
        } else {
            0.0
        };
    }
    *pos += 1;
}
