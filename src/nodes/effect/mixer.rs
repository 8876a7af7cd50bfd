//! The track bus

use dasp_graph::{Buffer, Input};
use crate::node::{AudioNode, ProcessContext};

/// Sums every connected track strip into one stereo (or `channels`-wide) bus.
///
/// Inputs narrower than the bus reuse their last channel, so a mono strip
/// lands in both sides.
pub struct Mixer {
    channels: usize,
}

impl Mixer {
    pub fn new(channels: usize) -> Self {
        Self { channels: channels.max(1) }
    }

    pub fn stereo() -> Self {
        Self::new(2)
    }
}

fn accumulate(into: &mut Buffer, from: &Buffer) {
    into.iter_mut().zip(from.iter()).for_each(|(acc, s)| *acc += *s);
}

impl AudioNode for Mixer {
    type Message = ();

    fn process(
        &mut self,
        _ctx: &ProcessContext,
        _messages: impl Iterator<Item = ()>,
        inputs: &[Input],
        outputs: &mut [Buffer],
    ) {
        outputs.iter_mut().for_each(|bus| bus.fill(0.0));

        for strip in inputs.iter().map(Input::buffers).filter(|b| !b.is_empty()) {
            let last = strip.len() - 1;
            for (ch, bus) in outputs.iter_mut().enumerate() {
                accumulate(bus, &strip[ch.min(last)]);
            }
        }
    }

    fn num_inputs(&self) -> usize {
        usize::MAX
    }

    fn num_outputs(&self) -> usize {
        self.channels
    }
}
