//! Per-track strips feeding the master bus.
//!
//! ```text
//! player -> gain -> pan ─┐
//! player -> gain -> pan ─┼─> bus mixer -> master gain -> output
//! player -> gain -> pan ─┘
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use hashbrown::HashMap;
use rtrb::{Consumer, RingBuffer};

use crate::graph::{AudioGraph, NodeHandle};
use crate::node::NodeId;
use crate::nodes::{ClipPlayer, Gain, GainMessage, Mixer, Pan, PanMessage, PlayerMessage, Voice, VoiceEvent};
use crate::output::OutputSink;
use crate::timeline::{Timeline, Track, TrackId};

pub(crate) const PLAYER_QUEUE: usize = 1024;
const EVENT_QUEUE: usize = 1024;

/// The gain a track should sound at.
///
/// Muted tracks are silent; while any track is soloed, every track that is
/// not soloed is silent; otherwise the track's own volume.
pub fn effective_gain(track: &Track, any_solo: bool) -> f32 {
    if track.mute || (any_solo && !track.solo) {
        0.0
    } else {
        track.volume
    }
}

/// Outcome of handing a voice to a track's player
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Delivery {
    Sent,
    /// The track has no strip (it was removed)
    NoStrip,
    /// The player's queue is full; try again after a block
    QueueFull,
}

struct TrackStrip {
    player: NodeHandle<PlayerMessage>,
    gain: NodeHandle<GainMessage>,
    pan: NodeHandle<PanMessage>,
    events: Consumer<VoiceEvent>,
    applied_gain: f32,
    applied_pan: f32,
}

/// The render graph of one engine: a strip per track plus the master chain
pub struct MixingGraph {
    graph: AudioGraph,
    bus: NodeId,
    master: NodeHandle<GainMessage>,
    master_volume: f32,
    strips: HashMap<TrackId, TrackStrip>,
    smoothing_ms: f32,
    /// Shared with every player; bumped to silence them all
    epoch: Arc<AtomicU64>,
}

impl MixingGraph {
    pub fn new(sample_rate: u32, sink: OutputSink, master_volume: f32, smoothing_ms: f32) -> Self {
        let mut graph = AudioGraph::new(sample_rate);

        let bus = graph.add(Mixer::stereo());
        let master = graph.add(Gain::new(master_volume).with_smoothing_ms(smoothing_ms, sample_rate));
        let sink = graph.add(sink);
        graph.connect(bus.id(), master.id());
        graph.connect(master.id(), sink.id());
        graph.set_terminal(sink.id());

        Self {
            graph,
            bus: bus.id(),
            master,
            master_volume,
            strips: HashMap::new(),
            smoothing_ms,
            epoch: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.graph.sample_rate()
    }

    /// Engine frame at which the next block starts
    pub fn frame(&self) -> u64 {
        self.graph.frame()
    }

    /// Engine clock in seconds
    pub fn clock(&self) -> f64 {
        self.graph.frame() as f64 / self.graph.sample_rate() as f64
    }

    /// Render one block
    pub fn process(&mut self) {
        self.graph.process();
    }

    pub fn node_count(&self) -> usize {
        self.graph.len()
    }

    pub fn has_strip(&self, track: TrackId) -> bool {
        self.strips.contains_key(&track)
    }

    pub fn strip_count(&self) -> usize {
        self.strips.len()
    }

    /// Last gain sent to a track's gain node
    pub fn track_gain(&self, track: TrackId) -> Option<f32> {
        self.strips.get(&track).map(|strip| strip.applied_gain)
    }

    pub fn track_pan(&self, track: TrackId) -> Option<f32> {
        self.strips.get(&track).map(|strip| strip.applied_pan)
    }

    pub fn master_volume(&self) -> f32 {
        self.master_volume
    }

    fn ensure_strip(&mut self, track: &Track, gain: f32) -> &mut TrackStrip {
        let graph = &mut self.graph;
        let bus = self.bus;
        let smoothing_ms = self.smoothing_ms;
        let epoch = self.epoch.clone();

        self.strips.entry(track.id).or_insert_with(|| {
            let rate = graph.sample_rate();
            let (events_tx, events) = RingBuffer::new(EVENT_QUEUE);
            let player = graph.add_with_queue_size(ClipPlayer::with_epoch(events_tx, epoch), PLAYER_QUEUE);
            let gain_node = graph.add(Gain::new(gain).with_smoothing_ms(smoothing_ms, rate));
            let pan = graph.add(Pan::new(track.pan).with_smoothing_ms(smoothing_ms, rate));
            graph.connect(player.id(), gain_node.id());
            graph.connect(gain_node.id(), pan.id());
            graph.connect(pan.id(), bus);
            tracing::debug!(track = track.id.0, "created track strip");

            TrackStrip {
                player,
                gain: gain_node,
                pan,
                events,
                applied_gain: gain,
                applied_pan: track.pan,
            }
        })
    }

    /// Bring every strip in line with the timeline.
    ///
    /// Creates strips for new tracks, removes strips of tracks that are gone
    /// and sends effective gain and pan wherever they changed.
    pub fn sync(&mut self, timeline: &Timeline) {
        self.retain(|id| timeline.track(id).is_some());

        let any_solo = timeline.any_solo();
        for track in timeline.tracks() {
            let gain = effective_gain(track, any_solo);
            let strip = self.ensure_strip(track, gain);

            if strip.applied_gain != gain {
                if strip.gain.send(GainMessage::SetGain(gain)).is_ok() {
                    strip.applied_gain = gain;
                } else {
                    tracing::warn!(track = track.id.0, "gain queue full");
                }
            }
            if strip.applied_pan != track.pan {
                if strip.pan.send(PanMessage::SetPan(track.pan)).is_ok() {
                    strip.applied_pan = track.pan;
                } else {
                    tracing::warn!(track = track.id.0, "pan queue full");
                }
            }
        }
    }

    /// Remove the strip of `track` from the render graph
    pub fn remove_strip(&mut self, track: TrackId) -> bool {
        let Some(strip) = self.strips.remove(&track) else {
            return false;
        };
        self.graph.remove(strip.player.id());
        self.graph.remove(strip.gain.id());
        self.graph.remove(strip.pan.id());
        tracing::debug!(track = track.0, "removed track strip");
        true
    }

    /// Keep only the strips whose track satisfies `keep`
    pub fn retain(&mut self, keep: impl Fn(TrackId) -> bool) {
        let gone: Vec<TrackId> = self.strips.keys().copied().filter(|&id| !keep(id)).collect();
        for id in gone {
            self.remove_strip(id);
        }
    }

    pub fn set_master_volume(&mut self, volume: f32) {
        let volume = volume.max(0.0);
        if self.master.send(GainMessage::SetGain(volume)).is_ok() {
            self.master_volume = volume;
        } else {
            tracing::warn!("master gain queue full");
        }
    }

    /// Hand a copy of `voice` to the track's player, stamped with the current epoch
    pub fn start_voice(&mut self, track: TrackId, voice: &Voice) -> Delivery {
        let Some(strip) = self.strips.get_mut(&track) else {
            return Delivery::NoStrip;
        };
        let voice = Voice {
            epoch: self.epoch.load(Ordering::Acquire),
            ..voice.clone()
        };
        match strip.player.send(PlayerMessage::Start(Box::new(voice))) {
            Ok(()) => Delivery::Sent,
            Err(_) => Delivery::QueueFull,
        }
    }

    pub fn set_looping(&mut self, track: TrackId, looping: bool) {
        if let Some(strip) = self.strips.get_mut(&track) {
            if strip.player.send(PlayerMessage::SetLooping(looping)).is_err() {
                tracing::warn!(track = track.0, "player queue full, loop toggle dropped");
            }
        }
    }

    /// Silence every player at its next block, along with any start still queued
    pub fn stop_all(&mut self) {
        self.epoch.fetch_add(1, Ordering::AcqRel);
    }

    /// Epoch stamped onto voices sent from now on
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::Acquire)
    }

    /// Natural voice ends reported since the last call, per track
    pub fn drain_events(&mut self) -> Vec<(TrackId, VoiceEvent)> {
        let mut events = Vec::new();
        for (&track, strip) in self.strips.iter_mut() {
            while let Ok(event) = strip.events.pop() {
                events.push((track, event));
            }
        }
        events
    }
}
