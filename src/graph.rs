//! The render graph: owns the nodes and their message queues

use core::marker::PhantomData;

use dasp_graph::{Buffer, Input, NodeData, Processor};
use hashbrown::HashMap;
use petgraph::stable_graph::{NodeIndex, StableGraph};
use rtrb::{Consumer, Producer, RingBuffer};

use crate::node::{AudioNode, NodeId, ProcessContext};

/// Frames rendered per block (dasp_graph's fixed buffer length).
pub const BLOCK_SIZE: usize = 64;

const DEFAULT_QUEUE: usize = 64;

/// Sends messages to one node of an [`AudioGraph`]
pub struct NodeHandle<M: Send + 'static> {
    pub(crate) id: NodeId,
    pub(crate) sender: Producer<M>,
    pub(crate) _marker: PhantomData<M>,
}

impl<M: Send + 'static> NodeHandle<M> {
    /// Queue a message for the node's next block.
    ///
    /// Hands the message back when the queue is full.
    pub fn send(&mut self, msg: M) -> Result<(), M> {
        self.sender.push(msg).map_err(|rtrb::PushError::Full(v)| v)
    }

    pub fn id(&self) -> NodeId {
        self.id
    }
}

/// A node together with its inbox and the context of the block being rendered
struct Slot<N: AudioNode> {
    node: N,
    inbox: Consumer<N::Message>,
    ctx: ProcessContext,
}

/// Object-safe face of a [`Slot`]
trait Render: Send {
    fn begin_block(&mut self, ctx: ProcessContext);
    fn render(&mut self, inputs: &[Input], outputs: &mut [Buffer]);
}

impl<N: AudioNode> Render for Slot<N> {
    fn begin_block(&mut self, ctx: ProcessContext) {
        self.ctx = ctx;
    }

    fn render(&mut self, inputs: &[Input], outputs: &mut [Buffer]) {
        let Slot { node, inbox, ctx } = self;
        let messages = core::iter::from_fn(|| inbox.pop().ok());
        node.process(ctx, messages, inputs, outputs);
    }
}

struct Erased(Box<dyn Render>);

impl dasp_graph::Node for Erased {
    fn process(&mut self, inputs: &[Input], outputs: &mut [Buffer]) {
        self.0.render(inputs, outputs);
    }
}

// Stable indices: removing a track's nodes must not move anyone else's.
type InnerGraph = StableGraph<NodeData<Erased>, ()>;

/// An audio processing graph at a fixed sample rate.
///
/// Every [`process`](Self::process) renders one [`BLOCK_SIZE`] block into the
/// terminal node and advances the graph's frame counter, which is the engine
/// clock everything else is scheduled against.
pub struct AudioGraph {
    graph: InnerGraph,
    processor: Processor<InnerGraph>,
    ctx: ProcessContext,
    indices: HashMap<NodeId, NodeIndex>,
    next_id: u32,
    terminal: Option<NodeIndex>,
}

impl AudioGraph {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            graph: InnerGraph::with_capacity(64, 64),
            processor: Processor::with_capacity(64),
            ctx: ProcessContext {
                sample_rate,
                buffer_size: BLOCK_SIZE,
                frame: 0,
            },
            indices: HashMap::new(),
            next_id: 0,
            terminal: None,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.ctx.sample_rate
    }

    /// Absolute frame at which the next block starts
    pub fn frame(&self) -> u64 {
        self.ctx.frame
    }

    /// Number of live nodes
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Add a node, returning the handle that talks to it
    pub fn add<N: AudioNode>(&mut self, node: N) -> NodeHandle<N::Message> {
        self.add_with_queue_size(node, DEFAULT_QUEUE)
    }

    pub fn add_with_queue_size<N: AudioNode>(&mut self, node: N, queue_size: usize) -> NodeHandle<N::Message> {
        let id = NodeId(self.next_id);
        self.next_id += 1;

        let (sender, inbox) = RingBuffer::new(queue_size);
        let outputs = node.num_outputs();
        let slot = Erased(Box::new(Slot { node, inbox, ctx: self.ctx }));

        // sinks still need one buffer for dasp_graph to sum their inputs into
        let data = if outputs == 2 { NodeData::new2(slot) } else { NodeData::new1(slot) };
        self.indices.insert(id, self.graph.add_node(data));

        NodeHandle { id, sender, _marker: PhantomData }
    }

    /// Feed the output of `from` into `to`; unknown ids are ignored
    pub fn connect(&mut self, from: NodeId, to: NodeId) {
        if let (Some(&a), Some(&b)) = (self.indices.get(&from), self.indices.get(&to)) {
            self.graph.add_edge(a, b, ());
        }
    }

    /// Remove a node and every edge touching it
    pub fn remove(&mut self, id: NodeId) -> bool {
        let Some(index) = self.indices.remove(&id) else {
            return false;
        };
        if self.terminal == Some(index) {
            self.terminal = None;
        }
        self.graph.remove_node(index).is_some()
    }

    /// The node rendering pulls from, typically the sink
    pub fn set_terminal(&mut self, id: NodeId) {
        self.terminal = self.indices.get(&id).copied();
    }

    /// Render one block
    pub fn process(&mut self) {
        let ctx = self.ctx;
        for &index in self.indices.values() {
            if let Some(data) = self.graph.node_weight_mut(index) {
                data.node.0.begin_block(ctx);
            }
        }

        if let Some(terminal) = self.terminal {
            self.processor.process(&mut self.graph, terminal);
        }
        self.ctx.frame += BLOCK_SIZE as u64;
    }
}
