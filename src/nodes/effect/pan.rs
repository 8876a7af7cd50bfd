//! Equal-power stereo panner

use core::f32::consts::FRAC_PI_2;

use dasp_graph::{Buffer, Input};
use crate::node::{AudioNode, ProcessContext};

/// Messages to control a [`Pan`] node
#[derive(Clone, Copy, Debug)]
pub enum PanMessage {
    /// Set the pan position (-1.0 = hard left, 0.0 = centre, 1.0 = hard right); ramped
    SetPan(f32),
}

/// A stereo panner with the same smoothing behaviour as [`Gain`](super::Gain).
///
/// Stereo input is balanced the way a stereo panner node does it: panning left
/// folds part of the right channel into the left with an equal-power curve, and
/// vice versa. Mono input is treated as identical left and right.
pub struct Pan {
    pan: f32,
    smoothed_pan: f32,
    smooth_coeff: f32,
}

impl Pan {
    pub fn new(pan: f32) -> Self {
        let pan = pan.clamp(-1.0, 1.0);
        Self {
            pan,
            smoothed_pan: pan,
            smooth_coeff: 0.995,
        }
    }

    /// Set the smoothing time in milliseconds
    pub fn with_smoothing_ms(mut self, ms: f32, sample_rate: u32) -> Self {
        self.smooth_coeff = super::gain::smoothing_coefficient(ms, sample_rate);
        self
    }

    #[inline]
    pub fn pan(&self) -> f32 {
        self.pan
    }
}

#[inline]
fn balance(pan: f32, left: f32, right: f32) -> (f32, f32) {
    if pan <= 0.0 {
        let x = (pan + 1.0) * FRAC_PI_2;
        (left + right * x.cos(), right * x.sin())
    } else {
        let x = pan * FRAC_PI_2;
        (left * x.cos(), right + left * x.sin())
    }
}

impl AudioNode for Pan {
    type Message = PanMessage;

    fn process(
        &mut self,
        _ctx: &ProcessContext,
        messages: impl Iterator<Item = PanMessage>,
        inputs: &[Input],
        outputs: &mut [Buffer],
    ) {
        for msg in messages {
            match msg {
                PanMessage::SetPan(p) => self.pan = p.clamp(-1.0, 1.0),
            }
        }

        let in_buffers = match inputs.first() {
            Some(input) if !input.buffers().is_empty() => input.buffers(),
            _ => {
                for buffer in outputs.iter_mut() {
                    buffer.iter_mut().for_each(|s| *s = 0.0);
                }
                return;
            }
        };

        let [out_left, out_right] = outputs else {
            return;
        };
        let in_left = &in_buffers[0];
        let in_right = &in_buffers[in_buffers.len().min(2) - 1];

        let target = self.pan;
        let mut pan = self.smoothed_pan;
        for i in 0..out_left.len() {
            pan = target + self.smooth_coeff * (pan - target);
            let (l, r) = balance(pan, in_left[i], in_right[i]);
            out_left[i] = l;
            out_right[i] = r;
        }
        self.smoothed_pan = pan;
    }

    #[inline]
    fn num_inputs(&self) -> usize { 1 }

    #[inline]
    fn num_outputs(&self) -> usize { 2 }
}
