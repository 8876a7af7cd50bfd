//! Gain/volume control effect

use dasp_graph::{Buffer, Input};
use crate::graph::BLOCK_SIZE;
use crate::node::{AudioNode, ProcessContext};

/// Default ramp time for gain changes
pub const DEFAULT_SMOOTHING_MS: f32 = 7.0;

/// Messages to control gain
#[derive(Clone, Copy, Debug)]
pub enum GainMessage {
    /// Set the target gain multiplier (1.0 = unity, 0.0 = silence); ramped
    SetGain(f32),
}

/// A gain (volume) control that passes audio through with amplitude scaling
///
/// Used for both the per-track gain (carrying the track's effective gain) and
/// the master gain. Target changes are approached with one-pole smoothing so a
/// mute or volume change never clicks.
pub struct Gain {
    gain: f32,
    /// Smoothing to prevent clicks on rapid gain changes
    smoothed_gain: f32,
    /// Smoothing coefficient (0.0 = instant, 1.0 = no change)
    smooth_coeff: f32,
}

impl Gain {
    pub fn new(gain: f32) -> Self {
        let gain = gain.max(0.0);
        Self {
            gain,
            smoothed_gain: gain,
            smooth_coeff: smoothing_coefficient(DEFAULT_SMOOTHING_MS, 48_000),
        }
    }

    /// Ramp time for target changes at `sample_rate`
    pub fn with_smoothing_ms(mut self, ms: f32, sample_rate: u32) -> Self {
        self.smooth_coeff = smoothing_coefficient(ms, sample_rate);
        self
    }

    pub fn without_smoothing(mut self) -> Self {
        self.smooth_coeff = 0.0;
        self
    }

    /// Target gain (the ramp may still be on its way there)
    #[inline]
    pub fn gain(&self) -> f32 {
        self.gain
    }

    /// Advance the ramp over one block, one gain per frame
    fn ramp(&mut self, frames: usize) -> [f32; BLOCK_SIZE] {
        let mut gains = [self.gain; BLOCK_SIZE];
        if self.smoothed_gain == self.gain {
            return gains;
        }
        let mut current = self.smoothed_gain;
        for g in gains.iter_mut().take(frames) {
            current = self.gain + self.smooth_coeff * (current - self.gain);
            *g = current;
        }
        // settle once inaudibly close
        self.smoothed_gain = if (current - self.gain).abs() < 1e-6 { self.gain } else { current };
        gains
    }
}

/// One-pole coefficient reaching ~63% of a step after `ms` milliseconds.
pub(crate) fn smoothing_coefficient(ms: f32, sample_rate: u32) -> f32 {
    if ms <= 0.0 {
        return 0.0;
    }
    let samples = (ms / 1000.0) * sample_rate as f32;
    (-1.0 / samples).exp()
}

impl AudioNode for Gain {
    type Message = GainMessage;

    fn process(
        &mut self,
        _ctx: &ProcessContext,
        messages: impl Iterator<Item = GainMessage>,
        inputs: &[Input],
        outputs: &mut [Buffer],
    ) {
        for GainMessage::SetGain(g) in messages {
            self.gain = g.max(0.0);
        }

        let Some(sources) = inputs.first().map(Input::buffers).filter(|b| !b.is_empty()) else {
            outputs.iter_mut().for_each(|out| out.fill(0.0));
            return;
        };

        let frames = outputs.first().map_or(0, |out| out.len()).min(BLOCK_SIZE);
        let gains = self.ramp(frames);
        let last = sources.len() - 1;
        for (ch, out) in outputs.iter_mut().enumerate() {
            let source = &sources[ch.min(last)];
            for ((o, s), g) in out.iter_mut().zip(source.iter()).zip(gains.iter()) {
                *o = s * g;
            }
        }
    }

    #[inline]
    fn num_inputs(&self) -> usize { 1 }

    #[inline]
    fn num_outputs(&self) -> usize { 2 }
}
