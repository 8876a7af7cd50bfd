//! System audio output through CPAL

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample, SupportedStreamConfig};
use dasp_graph::{Buffer, Input};
use rtrb::{Consumer, RingBuffer};

use crate::error::EngineError;
use crate::node::{AudioNode, ProcessContext};
use crate::nodes::RtrbSink;

/// Written by the device callback, read by the controlling thread
#[derive(Default)]
struct StreamStats {
    played: AtomicU64,
    underrun: AtomicBool,
}

/// Feeds a CPAL output stream.
///
/// The graph side is an [`RtrbSink`]; the device callback drains the other
/// end of its ring on the stream's own thread and plays silence when the
/// graph falls behind.
pub struct CpalSink {
    ring: RtrbSink,
    sample_rate: u32,
    stats: Arc<StreamStats>,
}

impl CpalSink {
    /// Build and start a stream on `device`.
    ///
    /// The stream lives on a dedicated thread; this blocks until that thread
    /// reports whether the stream is playing.
    pub fn open(device: &cpal::Device, config: &SupportedStreamConfig) -> Result<Self, EngineError> {
        let channels = config.channels() as usize;
        let format = config.sample_format();
        let stream_config = config.config();
        let sample_rate = stream_config.sample_rate.0;

        // ~100ms of headroom
        let capacity = (sample_rate as usize / 10 * channels).next_power_of_two().max(8192);
        let (producer, consumer) = RingBuffer::<f32>::new(capacity);
        let stats = Arc::new(StreamStats::default());

        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<(), String>>(1);
        let device = device.clone();
        let thread_stats = stats.clone();

        std::thread::Builder::new()
            .name("mehrspur-cpal".into())
            .spawn(move || {
                let stream = open_stream(&device, format, &stream_config, consumer, thread_stats)
                    .and_then(|stream| stream.play().map(|()| stream).map_err(|e| e.to_string()));
                match stream {
                    Ok(_stream) => {
                        let _ = ready_tx.send(Ok(()));
                        // dropping the stream would stop it
                        loop {
                            std::thread::park();
                        }
                    }
                    Err(reason) => {
                        let _ = ready_tx.send(Err(reason));
                    }
                }
            })
            .map_err(|e| EngineError::ContextUnavailable(e.to_string()))?;

        ready_rx
            .recv()
            .map_err(|_| EngineError::ContextUnavailable("stream thread exited".into()))?
            .map_err(EngineError::ContextUnavailable)?;

        tracing::info!(sample_rate, channels, ?format, "cpal output stream started");
        Ok(Self {
            ring: RtrbSink::new(producer, channels),
            sample_rate,
            stats,
        })
    }

    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    #[inline]
    pub fn channels(&self) -> usize {
        self.ring.channels()
    }

    /// Samples the device has played
    pub fn samples_played(&self) -> u64 {
        self.stats.played.load(Ordering::Relaxed)
    }

    /// Free sample slots between the graph and the device
    #[inline]
    pub fn buffer_available(&self) -> usize {
        self.ring.available()
    }

    /// Whether the device ran dry since the last call
    pub fn take_underrun(&self) -> bool {
        self.stats.underrun.swap(false, Ordering::Relaxed)
    }
}

fn open_stream(
    device: &cpal::Device,
    format: SampleFormat,
    config: &cpal::StreamConfig,
    consumer: Consumer<f32>,
    stats: Arc<StreamStats>,
) -> Result<cpal::Stream, String> {
    match format {
        SampleFormat::F32 => stream_of::<f32>(device, config, consumer, stats),
        SampleFormat::I16 => stream_of::<i16>(device, config, consumer, stats),
        SampleFormat::U16 => stream_of::<u16>(device, config, consumer, stats),
        other => Err(format!("unsupported sample format: {other:?}")),
    }
}

fn stream_of<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut consumer: Consumer<f32>,
    stats: Arc<StreamStats>,
) -> Result<cpal::Stream, String>
where
    T: SizedSample + FromSample<f32>,
{
    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                let ready = consumer.slots().min(data.len());
                if let Ok(chunk) = consumer.read_chunk(ready) {
                    for (out, sample) in data.iter_mut().zip(chunk) {
                        *out = T::from_sample(sample.clamp(-1.0, 1.0));
                    }
                }
                if ready < data.len() {
                    data[ready..].iter_mut().for_each(|out| *out = T::EQUILIBRIUM);
                    stats.underrun.store(true, Ordering::Relaxed);
                }
                stats.played.fetch_add(data.len() as u64, Ordering::Relaxed);
            },
            |err: cpal::StreamError| tracing::error!(?err, "cpal stream error"),
            None,
        )
        .map_err(|e| e.to_string())
}

impl AudioNode for CpalSink {
    type Message = ();

    fn process(
        &mut self,
        ctx: &ProcessContext,
        messages: impl Iterator<Item = ()>,
        inputs: &[Input],
        outputs: &mut [Buffer],
    ) {
        self.ring.process(ctx, messages, inputs, outputs);
    }

    #[inline]
    fn num_inputs(&self) -> usize { 1 }

    #[inline]
    fn num_outputs(&self) -> usize { 0 }
}
