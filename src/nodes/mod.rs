//! The nodes a track strip and the master chain are built from.
//!
//! - [`ClipPlayer`] sources the scheduled voices of one track ([`PlayerMessage`])
//! - [`Gain`] carries a track's effective gain, or the master volume ([`GainMessage`])
//! - [`Pan`] places a track in the stereo field ([`PanMessage`])
//! - [`Mixer`] is the bus every strip feeds
//! - [`RtrbSink`] and, with the `cpal_sink` feature, `CpalSink` end the graph

pub mod source;
pub mod effect;
pub mod sink;

pub use source::{ClipPlayer, PlayerMessage, Voice, VoiceEvent, VoiceId};
pub use effect::{Gain, GainMessage, Mixer, Pan, PanMessage};
pub use sink::RtrbSink;

#[cfg(feature = "cpal_sink")]
pub use sink::CpalSink;

#[cfg(test)]
pub(crate) mod testing {
    //! Small rig for driving one effect node through a real graph.

    use dasp_graph::{Buffer, Input};
    use rtrb::{Consumer, RingBuffer};

    use crate::graph::{AudioGraph, NodeHandle};
    use crate::node::{AudioNode, ProcessContext};
    use crate::nodes::RtrbSink;

    /// Stereo source emitting fixed values
    pub(crate) struct Constant {
        pub left: f32,
        pub right: f32,
    }

    impl AudioNode for Constant {
        type Message = ();

        fn process(
            &mut self,
            _ctx: &ProcessContext,
            _messages: impl Iterator<Item = ()>,
            _inputs: &[Input],
            outputs: &mut [Buffer],
        ) {
            let values = [self.left, self.right];
            for (buffer, value) in outputs.iter_mut().zip(values) {
                buffer.iter_mut().for_each(|s| *s = value);
            }
        }

        fn num_outputs(&self) -> usize { 2 }
    }

    /// Constant -> effect -> stereo ring-buffer sink
    pub(crate) struct EffectRig<M: Send + 'static> {
        graph: AudioGraph,
        pub handle: NodeHandle<M>,
        output: Consumer<f32>,
    }

    impl<M: Send + 'static> EffectRig<M> {
        pub(crate) fn new<N: AudioNode<Message = M>>(node: N, left: f32, right: f32) -> Self {
            let mut graph = AudioGraph::new(48_000);
            let (producer, output) = RingBuffer::new(1 << 14);
            let source = graph.add(Constant { left, right });
            let handle = graph.add(node);
            let sink = graph.add(RtrbSink::stereo(producer));
            graph.connect(source.id(), handle.id());
            graph.connect(handle.id(), sink.id());
            graph.set_terminal(sink.id());
            Self { graph, handle, output }
        }

        /// Render one block, returning (left, right)
        pub(crate) fn block(&mut self) -> (Vec<f32>, Vec<f32>) {
            self.graph.process();
            let mut left = Vec::new();
            let mut right = Vec::new();
            while let (Ok(l), Ok(r)) = (self.output.pop(), self.output.pop()) {
                left.push(l);
                right.push(r);
            }
            (left, right)
        }
    }
}
