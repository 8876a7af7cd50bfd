#![allow(dead_code)]

use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use mehrspur::{Blob, Engine, EngineConfig, MediaResult, RingBufferOutput};
use parking_lot::Mutex;
use rtrb::Consumer;

/// Low rate keeps renders short: one second is under 16 blocks
pub const RATE: u32 = 1_000;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// A mono 16 bit WAV of `seconds` at [`RATE`], every sample `level`
pub fn wav_bytes(seconds: f64, level: f32) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut bytes = Vec::new();
    let mut writer = hound::WavWriter::new(Cursor::new(&mut bytes), spec).unwrap();
    let value = (level * 32768.0) as i16;
    for _ in 0..(seconds * RATE as f64) as usize {
        writer.write_sample(value).unwrap();
    }
    writer.finalize().unwrap();
    bytes
}

pub fn wav_blob(name: &str, seconds: f64, level: f32) -> Blob {
    Blob::new(name, wav_bytes(seconds, level))
}

/// Config with instant parameter changes and unity master
pub fn config() -> EngineConfig {
    EngineConfig::default().with_smoothing_ms(0.0).with_master_volume(1.0)
}

pub struct Rig {
    pub engine: Engine,
    pub audio: Consumer<f32>,
}

impl Rig {
    pub fn ready(config: EngineConfig) -> Self {
        Self::ready_with(Engine::new(config))
    }

    pub fn ready_with(mut engine: Engine) -> Self {
        init_tracing();
        let (output, audio) = RingBufferOutput::stereo(RATE, 4 * RATE as usize);
        engine.initialize(output);
        engine.signal_activation().unwrap();
        Self { engine, audio }
    }

    /// Render `blocks` blocks, returning the left channel
    pub fn render(&mut self, blocks: usize) -> Vec<f32> {
        let mut left = Vec::with_capacity(blocks * 64);
        for _ in 0..blocks {
            self.engine.process();
            while let (Ok(l), Ok(_r)) = (self.audio.pop(), self.audio.pop()) {
                left.push(l);
            }
        }
        left
    }

    /// Render at least `seconds` of audio
    pub fn render_seconds(&mut self, seconds: f64) -> Vec<f32> {
        let blocks = (seconds * RATE as f64 / 64.0).ceil() as usize;
        self.render(blocks)
    }
}

pub fn approx(a: f32, b: f32) -> bool {
    (a - b).abs() < 1e-3
}

/// A fetcher that serves fixed bytes, counts calls and records the URLs
/// requested. While `gate` holds the sender, fetches block.
pub struct GatedFetcher {
    pub calls: Arc<AtomicUsize>,
    pub urls: Arc<Mutex<Vec<String>>>,
    gate: Option<crossbeam_channel::Sender<()>>,
}

impl GatedFetcher {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Let every blocked and future fetch through
    pub fn open(&mut self) {
        self.gate.take();
    }
}

pub fn gated_fetcher(bytes: Vec<u8>) -> (GatedFetcher, impl Fn(&str) -> MediaResult<Vec<u8>> + Send + Sync + 'static) {
    let (gate_tx, gate_rx) = crossbeam_channel::bounded::<()>(0);
    let calls = Arc::new(AtomicUsize::new(0));
    let urls = Arc::new(Mutex::new(Vec::new()));

    let fetch = {
        let calls = calls.clone();
        let urls = urls.clone();
        move |url: &str| {
            calls.fetch_add(1, Ordering::SeqCst);
            urls.lock().push(url.to_string());
            // blocks until the sender is dropped
            let _ = gate_rx.recv();
            Ok(bytes.clone())
        }
    };

    let control = GatedFetcher {
        calls,
        urls,
        gate: Some(gate_tx),
    };
    (control, fetch)
}
