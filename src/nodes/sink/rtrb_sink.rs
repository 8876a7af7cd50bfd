//! In-memory output

use dasp_graph::{Buffer, Input};
use rtrb::Producer;

use crate::node::{AudioNode, ProcessContext};

/// Writes the master bus, interleaved, into an rtrb ring buffer.
///
/// Backs [`RingBufferOutput`](crate::output::RingBufferOutput): whoever holds
/// the consumer (a host with its own device code, a test, an offline bounce)
/// drains it. A block that does not fit is dropped whole.
pub struct RtrbSink {
    producer: Producer<f32>,
    channels: usize,
    written_frames: u64,
    skipped_blocks: u64,
}

impl RtrbSink {
    pub fn new(producer: Producer<f32>, channels: usize) -> Self {
        Self {
            producer,
            channels: channels.max(1),
            written_frames: 0,
            skipped_blocks: 0,
        }
    }

    pub fn stereo(producer: Producer<f32>) -> Self {
        Self::new(producer, 2)
    }

    /// Free sample slots in the ring
    #[inline]
    pub fn available(&self) -> usize {
        self.producer.slots()
    }

    /// Frames delivered so far
    #[inline]
    pub fn written_frames(&self) -> u64 {
        self.written_frames
    }

    /// Blocks dropped because the consumer fell behind
    #[inline]
    pub fn skipped_blocks(&self) -> u64 {
        self.skipped_blocks
    }

    #[inline]
    pub fn channels(&self) -> usize {
        self.channels
    }
}

impl AudioNode for RtrbSink {
    type Message = ();

    fn process(
        &mut self,
        _ctx: &ProcessContext,
        _messages: impl Iterator<Item = ()>,
        inputs: &[Input],
        _outputs: &mut [Buffer],
    ) {
        let Some(bus) = inputs.first().map(Input::buffers).filter(|b| !b.is_empty()) else {
            return;
        };
        let frames = bus[0].len();
        let channels = self.channels;
        let last = bus.len() - 1;

        let Ok(chunk) = self.producer.write_chunk_uninit(frames * channels) else {
            self.skipped_blocks += 1;
            return;
        };
        let interleaved = (0..frames * channels).map(|i| bus[(i % channels).min(last)][i / channels]);
        chunk.fill_from_iter(interleaved);
        self.written_frames += frames as u64;
    }

    #[inline]
    fn num_inputs(&self) -> usize { 1 }

    #[inline]
    fn num_outputs(&self) -> usize { 0 }
}
