//! mehrspur - multi-track timeline engine
//!
//! Design principles:
//! - The timeline is plain data; every edit is a pure, clamping mutation
//! - Undo/redo keeps snapshots that share untouched tracks by `Arc`
//! - One render graph per engine: a player, gain and pan per track into a master bus
//! - Voices and parameters reach the render path through message ring buffers
//! - Source audio is decoded off the render path and cached per engine
//!
//! ```no_run
//! use mehrspur::{Engine, EngineConfig, MediaSource, RingBufferOutput};
//!
//! let (output, mut audio) = RingBufferOutput::stereo(48_000, 48_000);
//! let mut engine = Engine::new(EngineConfig::default());
//! engine.initialize(output);
//! engine.signal_activation().unwrap();
//!
//! let bytes = std::fs::read("loop.wav").unwrap();
//! let source = MediaSource::from_blob(mehrspur::Blob::new("loop.wav", bytes));
//! engine.add_track("Loop", Some(source), None, None);
//! engine.settle_media();
//!
//! engine.set_playing(true);
//! loop {
//!     engine.process();
//!     while let Ok(_sample) = audio.pop() {}
//! }
//! ```

mod node;
mod graph;
mod config;
mod error;
#[cfg(feature = "cpal_sink")]
mod device;

pub mod nodes;
pub mod media;
pub mod timeline;
pub mod history;
pub mod mixing;
pub mod scheduler;
pub mod transport;
pub mod output;
pub mod engine;

pub use node::{AudioNode, ProcessContext, NodeId};
pub use graph::{AudioGraph, NodeHandle, BLOCK_SIZE};
pub use config::{EngineConfig, MediaConfig, DEFAULT_PROXY_PATH};
pub use error::{EngineError, EngineResult, MediaError, MediaResult};
pub use media::{AudioBuffer, Blob, Fetcher, MediaCache, MediaSource, OfflineFetcher, SourceKey};
pub use timeline::{Clip, ClipId, Effect, Timeline, Track, TrackId, TrackPatch};
pub use history::History;
pub use mixing::{effective_gain, MixingGraph};
pub use scheduler::{PlaybackState, ScheduledVoice, Scheduler};
pub use transport::Transport;
pub use output::{OpenedOutput, OutputProvider, OutputSink, RingBufferOutput};
pub use engine::{Engine, EngineState, Lifecycle, Notification};

#[cfg(feature = "cpal_sink")]
pub use device::CpalDevice;
#[cfg(feature = "cpal_sink")]
pub use output::CpalOutput;
#[cfg(feature = "http_fetch")]
pub use media::HttpFetcher;
