//! Host audio outputs.
//!
//! The engine does not open an output until it has been activated; an
//! [`OutputProvider`] is what it opens at that point.

use dasp_graph::{Buffer, Input};
use rtrb::{Consumer, RingBuffer};

use crate::error::{EngineError, EngineResult};
use crate::node::{AudioNode, ProcessContext};
use crate::nodes::RtrbSink;

#[cfg(feature = "cpal_sink")]
use crate::nodes::CpalSink;

/// The terminal node of the render graph
pub enum OutputSink {
    Ring(RtrbSink),
    #[cfg(feature = "cpal_sink")]
    Cpal(CpalSink),
}

impl AudioNode for OutputSink {
    type Message = ();

    fn process(
        &mut self,
        ctx: &ProcessContext,
        messages: impl Iterator<Item = ()>,
        inputs: &[Input],
        outputs: &mut [Buffer],
    ) {
        match self {
            OutputSink::Ring(s) => s.process(ctx, messages, inputs, outputs),
            #[cfg(feature = "cpal_sink")]
            OutputSink::Cpal(s) => s.process(ctx, messages, inputs, outputs),
        }
    }

    fn num_inputs(&self) -> usize { 1 }

    fn num_outputs(&self) -> usize { 0 }
}

/// An opened output and the rate it runs at
pub struct OpenedOutput {
    pub sink: OutputSink,
    pub sample_rate: u32,
}

/// Opens the host audio output once the engine is activated.
///
/// Failing with [`EngineError::ContextUnavailable`] is expected while the host
/// is not ready yet.
pub trait OutputProvider: Send {
    fn open(&mut self) -> EngineResult<OpenedOutput>;
}

/// Output into an in-memory ring buffer.
///
/// The consumer half is handed to whoever plays or inspects the audio
/// (tests, offline bounces, a host with its own device code).
pub struct RingBufferOutput {
    sample_rate: u32,
    sink: Option<RtrbSink>,
}

impl RingBufferOutput {
    /// Stereo output with room for `capacity_frames` frames
    pub fn stereo(sample_rate: u32, capacity_frames: usize) -> (Self, Consumer<f32>) {
        let (producer, consumer) = RingBuffer::new(capacity_frames.max(1) * 2);
        let output = Self {
            sample_rate,
            sink: Some(RtrbSink::stereo(producer)),
        };
        (output, consumer)
    }
}

impl OutputProvider for RingBufferOutput {
    fn open(&mut self) -> EngineResult<OpenedOutput> {
        let sink = self
            .sink
            .take()
            .ok_or_else(|| EngineError::ContextUnavailable("ring buffer output already opened".into()))?;
        Ok(OpenedOutput {
            sink: OutputSink::Ring(sink),
            sample_rate: self.sample_rate,
        })
    }
}

/// The system's default CPAL output device
#[cfg(feature = "cpal_sink")]
#[derive(Default)]
pub struct CpalOutput {
    device: Option<crate::device::CpalDevice>,
}

#[cfg(feature = "cpal_sink")]
impl CpalOutput {
    /// Use the default device, looked up when the output is opened
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_device(device: crate::device::CpalDevice) -> Self {
        Self { device: Some(device) }
    }
}

#[cfg(feature = "cpal_sink")]
impl OutputProvider for CpalOutput {
    fn open(&mut self) -> EngineResult<OpenedOutput> {
        let device = match self.device.take() {
            Some(device) => device,
            None => crate::device::CpalDevice::default_output()
                .ok_or_else(|| EngineError::ContextUnavailable("no default output device".into()))?,
        };
        let sample_rate = device.sample_rate();
        let sink = device.open_sink()?;
        Ok(OpenedOutput {
            sink: OutputSink::Cpal(sink),
            sample_rate,
        })
    }
}
