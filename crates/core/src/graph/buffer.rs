//! Immutable decoded audio buffers shared between the core and the runtime.

use std::sync::Arc;

/// Decoded audio, interleaved, normalized to -1.0..1.0.
///
/// Cloning is cheap: the sample data is reference counted and never mutated.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    samples: Arc<[f32]>,
    sample_rate: u32,
    channels: u16,
}

impl AudioBuffer {
    /// Wrap interleaved samples. A channel count of zero is treated as mono.
    pub fn new(samples: impl Into<Arc<[f32]>>, sample_rate: u32, channels: u16) -> Self {
        Self {
            samples: samples.into(),
            sample_rate,
            channels: channels.max(1),
        }
    }

    /// Single-channel buffer.
    pub fn mono(samples: impl Into<Arc<[f32]>>, sample_rate: u32) -> Self {
        Self::new(samples, sample_rate, 1)
    }

    /// Empty buffer at the given rate.
    pub fn empty(sample_rate: u32) -> Self {
        Self::new(Vec::new(), sample_rate, 1)
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Number of frames (samples per channel).
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    pub fn is_empty(&self) -> bool {
        self.frames() == 0
    }

    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }

    /// Iterate the samples of one channel. Yields nothing for an out-of-range channel.
    pub fn channel(&self, index: u16) -> impl Iterator<Item = f32> + '_ {
        let stride = self.channels as usize;
        let take = if index < self.channels {
            self.frames()
        } else {
            0
        };
        self.samples
            .iter()
            .skip(index as usize)
            .step_by(stride)
            .take(take)
            .copied()
    }
}
