//! Decoded audio

/// Decoded source audio, planar `f32`.
///
/// Immutable once decoded and shared by `Arc` between the cache, the
/// scheduler and the render path.
#[derive(Clone, Debug, PartialEq)]
pub struct AudioBuffer {
    sample_rate: u32,
    channels: Vec<Vec<f32>>,
    frames: usize,
}

impl AudioBuffer {
    /// Build a buffer from planar channel data
    ///
    /// Channels shorter than the longest one are padded with silence.
    pub fn new(sample_rate: u32, mut channels: Vec<Vec<f32>>) -> Self {
        let frames = channels.iter().map(Vec::len).max().unwrap_or(0);
        for channel in channels.iter_mut() {
            channel.resize(frames, 0.0);
        }
        Self {
            sample_rate: sample_rate.max(1),
            channels,
            frames,
        }
    }

    /// Build a buffer from interleaved samples
    pub fn from_interleaved(sample_rate: u32, channel_count: usize, samples: &[f32]) -> Self {
        let channel_count = channel_count.max(1);
        let mut channels = vec![Vec::with_capacity(samples.len() / channel_count); channel_count];
        for frame in samples.chunks(channel_count) {
            for (channel, &sample) in channels.iter_mut().zip(frame) {
                channel.push(sample);
            }
        }
        Self::new(sample_rate, channels)
    }

    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    #[inline]
    pub fn channels(&self) -> usize {
        self.channels.len()
    }

    /// Length in frames
    #[inline]
    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Length in seconds
    pub fn duration(&self) -> f64 {
        self.frames as f64 / self.sample_rate as f64
    }

    pub fn channel(&self, index: usize) -> Option<&[f32]> {
        self.channels.get(index).map(Vec::as_slice)
    }
}
