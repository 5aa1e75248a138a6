/// Planar f32 accumulator for one block of output frames.
///
/// Allocated once per session; `clear` and the channel accessors never
/// allocate, so the buffer can be used on the real-time thread.
#[derive(Debug, Clone)]
pub struct MixBuffer {
    data: Vec<f32>,
    channels: usize,
    capacity: usize,
}

impl MixBuffer {
    pub fn new(channels: usize, capacity: usize) -> Self {
        Self {
            data: vec![0.0; channels * capacity],
            channels,
            capacity,
        }
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Maximum frames per block.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn channel(&self, index: usize) -> &[f32] {
        let start = index * self.capacity;
        &self.data[start..start + self.capacity]
    }

    pub fn channel_mut(&mut self, index: usize) -> &mut [f32] {
        let start = index * self.capacity;
        &mut self.data[start..start + self.capacity]
    }

    /// Zero the first `frames` frames of every channel.
    pub fn clear(&mut self, frames: usize) {
        let frames = frames.min(self.capacity);
        for channel in 0..self.channels {
            self.channel_mut(channel)[..frames].fill(0.0);
        }
    }

    /// Use only the first `channels` channels from now on.
    ///
    /// Never grows past the channel count the buffer was allocated with.
    pub fn set_channels(&mut self, channels: usize) {
        self.channels = channels.min(self.data.len() / self.capacity.max(1));
    }

    /// Sum of squares over the first `frames` frames of all channels.
    pub fn energy(&self, frames: usize) -> f64 {
        let frames = frames.min(self.capacity);
        (0..self.channels)
            .flat_map(|c| self.channel(c)[..frames].iter())
            .map(|&s| f64::from(s) * f64::from(s))
            .sum()
    }
}
