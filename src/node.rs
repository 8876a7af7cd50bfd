//! Render-path node trait and block context.

use dasp_graph::{Buffer, Input};

/// The block being rendered.
///
/// Every node sees the same context within one block: the graph's sample
/// rate, the block length and the engine frame of the block's first sample.
#[derive(Clone, Copy, Debug)]
pub struct ProcessContext {
    pub sample_rate: u32,
    /// Frames per block, always [`BLOCK_SIZE`](crate::BLOCK_SIZE)
    pub buffer_size: usize,
    /// Engine frame of the first sample in this block
    pub frame: u64,
}

impl ProcessContext {
    /// Engine time in seconds at the start of this block.
    #[inline]
    pub fn time(&self) -> f64 {
        self.frame as f64 / self.sample_rate as f64
    }

    /// First engine frame after this block
    #[inline]
    pub fn end_frame(&self) -> u64 {
        self.frame + self.buffer_size as u64
    }
}

/// Identifies a node within one [`AudioGraph`](crate::AudioGraph).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct NodeId(pub(crate) u32);

/// A stage of the render graph.
///
/// The engine's own graph is built from three kinds of node: a
/// [`ClipPlayer`](crate::nodes::ClipPlayer) per track as the source, gain, pan
/// and the bus [`Mixer`](crate::nodes::Mixer) as effects, and one
/// [`OutputSink`](crate::OutputSink) at the end.
///
/// Nodes share no state with the controlling thread. Everything they need to
/// know arrives as a `Message` through the node's queue and is drained at the
/// start of the next block:
///
/// ```
/// use mehrspur::{AudioNode, ProcessContext};
/// use dasp_graph::{Buffer, Input};
///
/// enum TrimMessage {
///     SetTrim(f32),
/// }
///
/// struct Trim {
///     trim: f32,
/// }
///
/// impl AudioNode for Trim {
///     type Message = TrimMessage;
///
///     fn process(
///         &mut self,
///         _ctx: &ProcessContext,
///         messages: impl Iterator<Item = TrimMessage>,
///         inputs: &[Input],
///         outputs: &mut [Buffer],
///     ) {
///         if let Some(TrimMessage::SetTrim(trim)) = messages.last() {
///             self.trim = trim;
///         }
///         let Some(input) = inputs.first() else { return };
///         for (out, inp) in outputs.iter_mut().zip(input.buffers()) {
///             for (o, i) in out.iter_mut().zip(inp.iter()) {
///                 *o = *i * self.trim;
///             }
///         }
///     }
///
///     fn num_inputs(&self) -> usize { 1 }
/// }
/// ```
pub trait AudioNode: Send + 'static {
    /// Parameter updates; `()` for nodes without any.
    type Message: Send + 'static;

    /// Render one block: drain `messages`, read `inputs`, fill `outputs`.
    fn process(
        &mut self,
        ctx: &ProcessContext,
        messages: impl Iterator<Item = Self::Message>,
        inputs: &[Input],
        outputs: &mut [Buffer],
    );

    /// Input channels (0 for sources).
    fn num_inputs(&self) -> usize { 0 }

    /// Output channels.
    fn num_outputs(&self) -> usize { 1 }
}
