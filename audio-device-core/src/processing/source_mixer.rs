use std::fmt;

use crate::models::error::DeviceError;
use crate::models::format::{Channel, ChannelLayout, MAX_OUTPUT_CHANNELS};
use crate::processing::mix_buffer::MixBuffer;
use crate::processing::resampler::{Resampler, MAX_SOURCE_CHANNELS, MAX_STEP_RATIO};
use crate::traits::sample_provider::{SampleProvider, SourceEffect};

/// Upper bound for `Source::set_pitch`.
pub const MAX_PITCH: f32 = 8.0;

/// Handle of a source attached to a mixer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(u64);

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceState {
    Playing,
    Paused,
    /// Finished or stopped by the application; stays attached until removed.
    Stopped,
}

/// Gain from each source channel to each output channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelRouting {
    gains: [[f32; MAX_OUTPUT_CHANNELS]; MAX_SOURCE_CHANNELS],
}

impl ChannelRouting {
    pub fn silent() -> Self {
        Self {
            gains: [[0.0; MAX_OUTPUT_CHANNELS]; MAX_SOURCE_CHANNELS],
        }
    }

    /// Mono to both front speakers (or the center of a mono device), stereo
    /// left/right to front left/right.
    pub fn for_layout(source_channels: usize, layout: ChannelLayout) -> Self {
        let mut routing = Self::silent();
        let left = layout.index_of(Channel::FrontLeft);
        let right = layout.index_of(Channel::FrontRight);

        match (source_channels, left, right) {
            (1, Some(l), Some(r)) => {
                routing.set(0, l, 1.0);
                routing.set(0, r, 1.0);
            }
            (_, Some(l), Some(r)) => {
                routing.set(0, l, 1.0);
                routing.set(1, r, 1.0);
            }
            (1, _, _) => routing.set(0, 0, 1.0),
            _ => {
                routing.set(0, 0, 0.5);
                routing.set(1, 0, 0.5);
            }
        }
        routing
    }

    pub fn set(&mut self, source_channel: usize, output_channel: usize, gain: f32) {
        if source_channel < MAX_SOURCE_CHANNELS && output_channel < MAX_OUTPUT_CHANNELS {
            self.gains[source_channel][output_channel] = gain;
        }
    }

    pub fn gain(&self, source_channel: usize, output_channel: usize) -> f32 {
        self.gains
            .get(source_channel)
            .and_then(|row| row.get(output_channel))
            .copied()
            .unwrap_or(0.0)
    }
}

/// One sound emitter contributing to the mix.
pub struct Source {
    provider: Box<dyn SampleProvider>,
    effect: Option<Box<dyn SourceEffect>>,
    gain: f32,
    pitch: f32,
    routing: ChannelRouting,
    custom_routing: bool,
    state: SourceState,
    position: u64,
    resampler: Resampler,
    output_rate: u32,
    input: Vec<f32>,
    block: Vec<f32>,
}

impl Source {
    pub fn new(provider: Box<dyn SampleProvider>) -> Self {
        let channels = provider.channels().clamp(1, MAX_SOURCE_CHANNELS);
        Self {
            provider,
            effect: None,
            gain: 1.0,
            pitch: 1.0,
            routing: ChannelRouting::for_layout(channels, ChannelLayout::Stereo),
            custom_routing: false,
            state: SourceState::Playing,
            position: 0,
            resampler: Resampler::new(channels),
            output_rate: 0,
            input: Vec::new(),
            block: Vec::new(),
        }
    }

    pub fn with_gain(mut self, gain: f32) -> Self {
        self.set_gain(gain);
        self
    }

    pub fn with_pitch(mut self, pitch: f32) -> Self {
        self.set_pitch(pitch);
        self
    }

    pub fn with_routing(mut self, routing: ChannelRouting) -> Self {
        self.set_routing(routing);
        self
    }

    pub fn with_effect(mut self, effect: Box<dyn SourceEffect>) -> Self {
        self.effect = Some(effect);
        self
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }

    pub fn set_gain(&mut self, gain: f32) {
        self.gain = gain.max(0.0);
    }

    pub fn pitch(&self) -> f32 {
        self.pitch
    }

    pub fn set_pitch(&mut self, pitch: f32) {
        self.pitch = pitch.clamp(0.0, MAX_PITCH);
        self.update_step();
    }

    pub fn routing(&self) -> &ChannelRouting {
        &self.routing
    }

    pub fn set_routing(&mut self, routing: ChannelRouting) {
        self.routing = routing;
        self.custom_routing = true;
    }

    pub fn state(&self) -> SourceState {
        self.state
    }

    pub fn play(&mut self) {
        self.state = SourceState::Playing;
    }

    pub fn pause(&mut self) {
        if self.state == SourceState::Playing {
            self.state = SourceState::Paused;
        }
    }

    pub fn stop(&mut self) {
        self.state = SourceState::Stopped;
    }

    /// Source frames pulled from the provider so far.
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn channels(&self) -> usize {
        self.resampler.channels()
    }

    /// Size scratch buffers and rate conversion for a mixer.
    ///
    /// Allocates; call on the control thread before the source is handed to
    /// a mixer that the real-time thread renders.
    pub fn prepare(&mut self, output_rate: u32, layout: ChannelLayout, max_block: usize) {
        let channels = self.channels();
        // enough input for at least one output frame at the largest step
        let input_frames = max_block.max(MAX_STEP_RATIO as usize * 2) + 3;
        if self.input.len() < input_frames * channels {
            self.input.resize(input_frames * channels, 0.0);
        }
        if self.block.len() < max_block * channels {
            self.block.resize(max_block * channels, 0.0);
        }
        self.set_output_format(output_rate, layout);
    }

    fn is_prepared_for(&self, max_block: usize) -> bool {
        let channels = self.channels();
        self.block.len() >= max_block * channels && !self.input.is_empty()
    }

    fn set_output_format(&mut self, output_rate: u32, layout: ChannelLayout) {
        self.output_rate = output_rate;
        if !self.custom_routing {
            self.routing = ChannelRouting::for_layout(self.channels(), layout);
        }
        self.update_step();
    }

    fn update_step(&mut self) {
        if self.output_rate > 0 {
            self.resampler
                .set_ratio(self.provider.sample_rate(), self.output_rate, self.pitch);
        }
    }

    /// Add `frames` frames of this source into `mix`.
    fn render(&mut self, mix: &mut MixBuffer, frames: usize, master_gain: f32) {
        let channels = self.channels();
        let frames = frames.min(self.block.len() / channels);
        let input_capacity = self.input.len() / channels;
        let mut done = 0;
        let mut ended = false;

        while done < frames && !ended {
            let want = (frames - done).min(self.resampler.output_for_input(input_capacity).max(1));
            let need = self.resampler.input_needed(want).min(input_capacity);

            let pulled = self.provider.pull(&mut self.input[..need * channels]);
            let got = pulled.frames.min(need);
            self.position += got as u64;
            ended = pulled.end_of_stream;

            // frames the provider did not deliver play as silence
            self.input[got * channels..need * channels].fill(0.0);
            let out = &mut self.block[done * channels..(done + want) * channels];
            self.resampler.process(&self.input[..need * channels], out, want);
            done += want;
        }

        if done < frames {
            self.block[done * channels..frames * channels].fill(0.0);
        }

        if let Some(effect) = self.effect.as_mut() {
            effect.process(&mut self.block[..frames * channels], channels);
        }

        let gain = self.gain * master_gain;
        for out_channel in 0..mix.channels() {
            let dst = &mut mix.channel_mut(out_channel)[..frames];
            for src_channel in 0..channels {
                let g = gain * self.routing.gain(src_channel, out_channel);
                if g == 0.0 {
                    continue;
                }
                let src = self.block[..frames * channels].chunks_exact(channels);
                for (acc, frame) in dst.iter_mut().zip(src) {
                    *acc += g * frame[src_channel];
                }
            }
        }

        if ended {
            self.state = SourceState::Stopped;
        }
    }
}

impl fmt::Debug for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Source")
            .field("state", &self.state)
            .field("gain", &self.gain)
            .field("pitch", &self.pitch)
            .field("position", &self.position)
            .field("channels", &self.channels())
            .finish()
    }
}

/// Accumulates every playing source into one canonical output block.
///
/// The attached-source list has a fixed capacity reserved up front, so
/// `add_source` never reallocates and `render_block` never allocates.
/// Rendering cost is linear in playing sources × frames.
#[derive(Debug)]
pub struct SourceMixer {
    sources: Vec<(SourceId, Source)>,
    max_sources: usize,
    next_id: u64,
    output_rate: u32,
    layout: ChannelLayout,
    max_block: usize,
    master_gain: f32,
}

impl SourceMixer {
    pub fn new(output_rate: u32, layout: ChannelLayout, max_sources: usize, max_block: usize) -> Self {
        Self {
            sources: Vec::with_capacity(max_sources),
            max_sources,
            next_id: 1,
            output_rate,
            layout,
            max_block,
            master_gain: 1.0,
        }
    }

    pub fn output_rate(&self) -> u32 {
        self.output_rate
    }

    pub fn layout(&self) -> ChannelLayout {
        self.layout
    }

    pub fn max_block(&self) -> usize {
        self.max_block
    }

    pub fn master_gain(&self) -> f32 {
        self.master_gain
    }

    pub fn set_master_gain(&mut self, gain: f32) {
        self.master_gain = gain.max(0.0);
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn playing_count(&self) -> usize {
        self.sources
            .iter()
            .filter(|(_, s)| s.state == SourceState::Playing)
            .count()
    }

    /// Attach a source. Prepares it first if the caller did not.
    ///
    /// Providers must deliver 1 to `MAX_SOURCE_CHANNELS` channels.
    pub fn add_source(&mut self, mut source: Source) -> Result<SourceId, DeviceError> {
        let channels = source.provider.channels();
        if !(1..=MAX_SOURCE_CHANNELS).contains(&channels) {
            return Err(DeviceError::FormatMismatch(format!(
                "source delivers {} channels, at most {} supported",
                channels, MAX_SOURCE_CHANNELS
            )));
        }
        if self.sources.len() >= self.max_sources {
            return Err(DeviceError::TooManySources(self.max_sources));
        }
        if !source.is_prepared_for(self.max_block) {
            source.prepare(self.output_rate, self.layout, self.max_block);
        } else {
            source.set_output_format(self.output_rate, self.layout);
        }

        let id = SourceId(self.next_id);
        self.next_id += 1;
        self.sources.push((id, source));
        Ok(id)
    }

    pub fn remove_source(&mut self, id: SourceId) -> Option<Source> {
        let index = self.sources.iter().position(|(sid, _)| *sid == id)?;
        Some(self.sources.swap_remove(index).1)
    }

    pub fn source(&self, id: SourceId) -> Option<&Source> {
        self.sources.iter().find(|(sid, _)| *sid == id).map(|(_, s)| s)
    }

    pub fn source_mut(&mut self, id: SourceId) -> Option<&mut Source> {
        self.sources
            .iter_mut()
            .find(|(sid, _)| *sid == id)
            .map(|(_, s)| s)
    }

    /// Detach every stopped source and hand them back to the caller.
    pub fn remove_stopped(&mut self) -> Vec<(SourceId, Source)> {
        let mut removed = Vec::with_capacity(self.sources.len());
        self.remove_stopped_into(&mut removed);
        removed
    }

    /// Move every stopped source into `out`.
    ///
    /// Does not allocate when `out` has room for `len()` more entries.
    pub fn remove_stopped_into(&mut self, out: &mut Vec<(SourceId, Source)>) {
        let mut index = 0;
        while index < self.sources.len() {
            if self.sources[index].1.state == SourceState::Stopped {
                out.push(self.sources.swap_remove(index));
            } else {
                index += 1;
            }
        }
    }

    /// Follow a renegotiated device rate or layout.
    pub fn set_output_format(&mut self, output_rate: u32, layout: ChannelLayout) {
        self.output_rate = output_rate;
        self.layout = layout;
        for (_, source) in &mut self.sources {
            source.set_output_format(output_rate, layout);
        }
    }

    /// Render `frames` frames of all playing sources into `mix`.
    ///
    /// `mix` is cleared first. `frames` is capped at the mixer's block size
    /// and the buffer capacity.
    pub fn render_block(&mut self, mix: &mut MixBuffer, frames: usize) {
        let frames = frames.min(self.max_block).min(mix.capacity());
        mix.clear(frames);
        for (_, source) in &mut self.sources {
            if source.state == SourceState::Playing {
                source.render(mix, frames, self.master_gain);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::sample_provider::Pulled;
    use approx::assert_abs_diff_eq;

    /// Constant value, optionally finite.
    struct Constant {
        rate: u32,
        channels: usize,
        value: f32,
        remaining: Option<usize>,
    }

    impl Constant {
        fn endless(value: f32) -> Box<Self> {
            Box::new(Self {
                rate: 48000,
                channels: 1,
                value,
                remaining: None,
            })
        }

        fn finite(value: f32, frames: usize) -> Box<Self> {
            Box::new(Self {
                rate: 48000,
                channels: 1,
                value,
                remaining: Some(frames),
            })
        }
    }

    impl SampleProvider for Constant {
        fn sample_rate(&self) -> u32 {
            self.rate
        }

        fn channels(&self) -> usize {
            self.channels
        }

        fn pull(&mut self, out: &mut [f32]) -> Pulled {
            let wanted = out.len() / self.channels;
            match self.remaining.as_mut() {
                None => {
                    out.fill(self.value);
                    Pulled::frames(wanted)
                }
                Some(left) => {
                    let n = wanted.min(*left);
                    out[..n * self.channels].fill(self.value);
                    *left -= n;
                    if *left == 0 {
                        Pulled::end(n)
                    } else {
                        Pulled::frames(n)
                    }
                }
            }
        }
    }

    /// Never has data ready.
    struct Starved;

    impl SampleProvider for Starved {
        fn sample_rate(&self) -> u32 {
            48000
        }

        fn channels(&self) -> usize {
            1
        }

        fn pull(&mut self, _out: &mut [f32]) -> Pulled {
            Pulled::frames(0)
        }
    }

    /// Sine at a given frequency; exercises non-trivial sample values.
    struct Sine {
        rate: u32,
        freq: f32,
        phase: f32,
    }

    impl SampleProvider for Sine {
        fn sample_rate(&self) -> u32 {
            self.rate
        }

        fn channels(&self) -> usize {
            1
        }

        fn pull(&mut self, out: &mut [f32]) -> Pulled {
            for sample in out.iter_mut() {
                *sample = (self.phase * std::f32::consts::TAU).sin() * 0.25;
                self.phase = (self.phase + self.freq / self.rate as f32).fract();
            }
            Pulled::frames(out.len())
        }
    }

    struct Invert;

    impl SourceEffect for Invert {
        fn process(&mut self, block: &mut [f32], _channels: usize) {
            block.iter_mut().for_each(|s| *s = -*s);
        }
    }

    fn mixer() -> SourceMixer {
        SourceMixer::new(48000, ChannelLayout::Stereo, 8, 256)
    }

    #[test]
    fn silent_sources_render_exact_silence() {
        let mut mixer = mixer();
        for _ in 0..4 {
            mixer.add_source(Source::new(Constant::endless(0.0))).unwrap();
        }
        let mut mix = MixBuffer::new(2, 256);
        mix.channel_mut(0).fill(1.0);

        mixer.render_block(&mut mix, 200);
        for c in 0..2 {
            assert!(mix.channel(c)[..200].iter().all(|&s| s == 0.0));
        }
    }

    #[test]
    fn sources_sum_with_gain() {
        let mut mixer = mixer();
        mixer.add_source(Source::new(Constant::endless(0.25))).unwrap();
        mixer
            .add_source(Source::new(Constant::endless(0.5)).with_gain(0.5))
            .unwrap();
        let mut mix = MixBuffer::new(2, 256);

        mixer.render_block(&mut mix, 64);
        assert_abs_diff_eq!(mix.channel(0)[10], 0.5, epsilon = 1e-6);
        assert_abs_diff_eq!(mix.channel(1)[63], 0.5, epsilon = 1e-6);
    }

    #[test]
    fn order_does_not_change_energy() {
        let build = |order: &[usize]| {
            let mut mixer = mixer();
            for &i in order {
                let sine = Sine {
                    rate: 44100 + i as u32 * 1000,
                    freq: 220.0 * (i + 1) as f32,
                    phase: 0.0,
                };
                mixer
                    .add_source(Source::new(Box::new(sine)).with_gain(0.5 + i as f32 * 0.1))
                    .unwrap();
            }
            let mut mix = MixBuffer::new(2, 256);
            mixer.render_block(&mut mix, 256);
            mix.energy(256)
        };

        let forward = build(&[0, 1, 2, 3]);
        let reversed = build(&[3, 2, 1, 0]);
        assert_abs_diff_eq!(forward, reversed, epsilon = 1e-6 * forward.max(1.0));
    }

    #[test]
    fn exhausted_source_stops_and_pads_silence() {
        let mut mixer = mixer();
        let id = mixer.add_source(Source::new(Constant::finite(0.5, 10))).unwrap();
        let mut mix = MixBuffer::new(2, 256);

        mixer.render_block(&mut mix, 64);
        assert_eq!(mixer.source(id).unwrap().state(), SourceState::Stopped);
        assert_abs_diff_eq!(mix.channel(0)[0], 0.5, epsilon = 1e-6);
        assert!(mix.channel(0)[16..64].iter().all(|&s| s == 0.0));

        // stopped sources no longer contribute
        mix.channel_mut(0).fill(1.0);
        mixer.render_block(&mut mix, 64);
        assert!(mix.channel(0)[..64].iter().all(|&s| s == 0.0));
        assert_eq!(mixer.source(id).unwrap().position(), 10);
    }

    #[test]
    fn starved_source_contributes_silence_and_keeps_playing() {
        let mut mixer = mixer();
        let starved = mixer.add_source(Source::new(Box::new(Starved))).unwrap();
        mixer.add_source(Source::new(Constant::endless(0.25))).unwrap();
        let mut mix = MixBuffer::new(2, 256);

        mixer.render_block(&mut mix, 128);
        assert_eq!(mixer.source(starved).unwrap().state(), SourceState::Playing);
        assert_abs_diff_eq!(mix.channel(1)[100], 0.25, epsilon = 1e-6);
    }

    #[test]
    fn paused_sources_are_skipped() {
        let mut mixer = mixer();
        let id = mixer.add_source(Source::new(Constant::endless(0.5))).unwrap();
        mixer.source_mut(id).unwrap().pause();
        let mut mix = MixBuffer::new(2, 256);

        mixer.render_block(&mut mix, 32);
        assert!(mix.channel(0)[..32].iter().all(|&s| s == 0.0));
        assert_eq!(mixer.source(id).unwrap().position(), 0);
        assert_eq!(mixer.playing_count(), 0);
    }

    #[test]
    fn source_limit_is_enforced() {
        let mut mixer = SourceMixer::new(48000, ChannelLayout::Stereo, 2, 64);
        mixer.add_source(Source::new(Constant::endless(0.0))).unwrap();
        mixer.add_source(Source::new(Constant::endless(0.0))).unwrap();
        let err = mixer.add_source(Source::new(Constant::endless(0.0))).unwrap_err();
        assert_eq!(err, DeviceError::TooManySources(2));
    }

    #[test]
    fn remove_stopped_detaches_only_stopped() {
        let mut mixer = mixer();
        let a = mixer.add_source(Source::new(Constant::endless(0.1))).unwrap();
        let b = mixer.add_source(Source::new(Constant::endless(0.1))).unwrap();
        mixer.source_mut(a).unwrap().stop();

        let removed = mixer.remove_stopped();
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].0, a);
        assert!(mixer.source(b).is_some());
        assert!(mixer.remove_source(a).is_none());
    }

    #[test]
    fn remove_stopped_into_fills_reserved_buffer() {
        let mut mixer = mixer();
        for _ in 0..3 {
            let id = mixer.add_source(Source::new(Constant::endless(0.1))).unwrap();
            mixer.source_mut(id).unwrap().stop();
        }
        mixer.add_source(Source::new(Constant::endless(0.1))).unwrap();

        let mut removed = Vec::with_capacity(mixer.len());
        let capacity = removed.capacity();
        mixer.remove_stopped_into(&mut removed);
        assert_eq!(removed.len(), 3);
        assert_eq!(removed.capacity(), capacity);
        assert_eq!(mixer.len(), 1);
    }

    #[test]
    fn wide_providers_are_rejected() {
        let mut mixer = mixer();
        let surround = Box::new(Constant {
            rate: 48000,
            channels: 6,
            value: 0.0,
            remaining: None,
        });
        assert!(matches!(
            mixer.add_source(Source::new(surround)),
            Err(DeviceError::FormatMismatch(_))
        ));
        assert!(mixer.is_empty());
    }

    #[test]
    fn mono_device_downmixes_stereo_routing() {
        let routing = ChannelRouting::for_layout(2, ChannelLayout::Mono);
        assert_eq!(routing.gain(0, 0), 0.5);
        assert_eq!(routing.gain(1, 0), 0.5);

        let routing = ChannelRouting::for_layout(1, ChannelLayout::X51);
        assert_eq!(routing.gain(0, 0), 1.0);
        assert_eq!(routing.gain(0, 1), 1.0);
        assert_eq!(routing.gain(0, 2), 0.0);
    }

    #[test]
    fn custom_routing_survives_format_change() {
        let mut mixer = mixer();
        let mut routing = ChannelRouting::silent();
        routing.set(0, 1, 1.0);
        let id = mixer
            .add_source(Source::new(Constant::endless(0.5)).with_routing(routing))
            .unwrap();

        mixer.set_output_format(44100, ChannelLayout::Stereo);
        let mut mix = MixBuffer::new(2, 256);
        mixer.render_block(&mut mix, 16);
        assert_eq!(mix.channel(0)[8], 0.0);
        assert_abs_diff_eq!(mix.channel(1)[8], 0.5, epsilon = 1e-6);
        assert_eq!(mixer.source(id).unwrap().routing().gain(0, 1), 1.0);
    }

    #[test]
    fn effect_runs_before_routing() {
        let mut mixer = mixer();
        mixer
            .add_source(Source::new(Constant::endless(0.5)).with_effect(Box::new(Invert)))
            .unwrap();
        let mut mix = MixBuffer::new(2, 256);
        mixer.render_block(&mut mix, 8);
        assert_abs_diff_eq!(mix.channel(0)[4], -0.5, epsilon = 1e-6);
    }

    #[test]
    fn high_pitch_renders_full_block() {
        let mut mixer = SourceMixer::new(8000, ChannelLayout::Stereo, 4, 256);
        let id = mixer
            .add_source(Source::new(Constant::endless(0.5)).with_pitch(MAX_PITCH))
            .unwrap();
        let mut mix = MixBuffer::new(2, 256);

        mixer.render_block(&mut mix, 256);
        assert!(mix.channel(0)[..256].iter().all(|&s| (s - 0.5).abs() < 1e-6));
        // 48k source at 8k output and pitch 8 is clamped to a 16x step
        let position = mixer.source(id).unwrap().position();
        assert_eq!(position, 256 * MAX_STEP_RATIO + 2);
    }

    #[test]
    fn master_gain_scales_everything() {
        let mut mixer = mixer();
        mixer.add_source(Source::new(Constant::endless(0.5))).unwrap();
        mixer.set_master_gain(0.5);
        let mut mix = MixBuffer::new(2, 256);
        mixer.render_block(&mut mix, 8);
        assert_abs_diff_eq!(mix.channel(0)[0], 0.25, epsilon = 1e-6);
    }
}
