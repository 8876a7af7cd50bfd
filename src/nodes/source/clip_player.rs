//! Per-track clip player.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dasp_graph::{Buffer, Input};
use rtrb::Producer;

use crate::media::AudioBuffer;
use crate::node::{AudioNode, ProcessContext};
use crate::timeline::ClipId;

/// Identifies one scheduled playback of a clip.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct VoiceId(pub u64);

/// A scheduled playback of one clip's span of source audio.
///
/// All source positions are in seconds of the decoded buffer. The voice is
/// silent until the render path reaches `start_frame`, then reads from
/// `read_offset` until `source_end`, or loops over `[source_start, source_end)`
/// while looping is enabled.
#[derive(Clone, Debug)]
pub struct Voice {
    pub id: VoiceId,
    pub clip_id: ClipId,
    pub buffer: Arc<AudioBuffer>,
    /// Engine frame at which the first sample sounds
    pub start_frame: u64,
    pub read_offset: f64,
    pub source_start: f64,
    pub source_end: f64,
    pub looping: bool,
    /// Session the voice belongs to; see [`ClipPlayer::with_epoch`]
    pub epoch: u64,
}

impl Voice {
    /// Seconds of audio this voice plays before ending naturally (ignoring looping).
    pub fn remaining(&self) -> f64 {
        (self.source_end - self.read_offset).max(0.0)
    }
}

/// Messages to control a [`ClipPlayer`].
#[derive(Clone, Debug)]
pub enum PlayerMessage {
    /// Add a voice to the player. Ignored unless it carries the current epoch.
    Start(Box<Voice>),
    /// Enable or disable native looping for the voices already sounding.
    SetLooping(bool),
}

/// Reported back to the controlling thread when a voice finishes on its own.
#[derive(Clone, Copy, Debug)]
pub enum VoiceEvent {
    Ended {
        voice: VoiceId,
        clip: ClipId,
        /// Engine frame just past the last rendered sample
        frame: u64,
    },
}

struct ActiveVoice {
    voice: Voice,
    /// Current read position in source frames (fractional)
    position: f64,
}

/// Plays the scheduled voices of a single track.
///
/// One player feeds each track's gain node. Voices are mixed additively, so
/// overlapping clips on a track both sound if both were scheduled.
///
/// Stopping never goes through the message queue: the controlling side bumps
/// the shared epoch, and at its next block the player drops every voice and
/// every queued start from an older epoch.
pub struct ClipPlayer {
    voices: Vec<ActiveVoice>,
    events: Producer<VoiceEvent>,
    epoch: Arc<AtomicU64>,
    seen_epoch: u64,
}

impl ClipPlayer {
    /// Create a player that reports natural voice ends into `events`
    pub fn new(events: Producer<VoiceEvent>) -> Self {
        Self::with_epoch(events, Arc::new(AtomicU64::new(0)))
    }

    /// Create a player following a session epoch shared with the controller
    pub fn with_epoch(events: Producer<VoiceEvent>, epoch: Arc<AtomicU64>) -> Self {
        let seen_epoch = epoch.load(Ordering::Acquire);
        Self {
            voices: Vec::with_capacity(64),
            events,
            epoch,
            seen_epoch,
        }
    }

    /// Number of voices waiting or sounding
    #[inline]
    pub fn voice_count(&self) -> usize {
        self.voices.len()
    }
}

#[inline]
fn sample_at(channel: &[f32], position: f64) -> f32 {
    let index = position as usize;
    let Some(&a) = channel.get(index) else {
        return 0.0;
    };
    let b = channel.get(index + 1).copied().unwrap_or(a);
    let t = (position - index as f64) as f32;
    a + t * (b - a)
}

impl AudioNode for ClipPlayer {
    type Message = PlayerMessage;

    fn process(
        &mut self,
        ctx: &ProcessContext,
        messages: impl Iterator<Item = PlayerMessage>,
        _inputs: &[Input],
        outputs: &mut [Buffer],
    ) {
        let epoch = self.epoch.load(Ordering::Acquire);
        if epoch != self.seen_epoch {
            self.voices.clear();
            self.seen_epoch = epoch;
        }

        for msg in messages {
            match msg {
                PlayerMessage::Start(voice) if voice.epoch == epoch => {
                    let position = voice.read_offset * voice.buffer.sample_rate() as f64;
                    self.voices.push(ActiveVoice { voice: *voice, position });
                }
                PlayerMessage::Start(_) => {}
                PlayerMessage::SetLooping(looping) => {
                    for active in self.voices.iter_mut().filter(|a| a.voice.start_frame <= ctx.frame) {
                        active.voice.looping = looping;
                    }
                }
            }
        }

        for buffer in outputs.iter_mut() {
            buffer.iter_mut().for_each(|s| *s = 0.0);
        }

        if outputs.is_empty() || self.voices.is_empty() {
            return;
        }

        let buffer_len = outputs[0].len();
        let block_start = ctx.frame;
        let block_end = ctx.end_frame();
        let events = &mut self.events;

        self.voices.retain_mut(|active| {
            let voice = &active.voice;
            if voice.start_frame >= block_end {
                return true;
            }

            let source = &voice.buffer;
            let rate = source.sample_rate() as f64;
            let step = rate / ctx.sample_rate as f64;
            let start = voice.source_start * rate;
            let end = (voice.source_end * rate).min(source.frames() as f64);
            let loop_len = end - start;
            let channels = source.channels();

            let first = voice.start_frame.saturating_sub(block_start) as usize;

            for i in first..buffer_len {
                if active.position >= end {
                    if voice.looping && loop_len > 0.0 {
                        active.position = start + (active.position - end) % loop_len;
                    } else {
                        let _ = events.push(VoiceEvent::Ended {
                            voice: voice.id,
                            clip: voice.clip_id,
                            frame: block_start + i as u64,
                        });
                        return false;
                    }
                }

                for (ch, buffer) in outputs.iter_mut().enumerate() {
                    let src_ch = ch.min(channels.saturating_sub(1));
                    if let Some(data) = source.channel(src_ch) {
                        buffer[i] += sample_at(data, active.position);
                    }
                }

                active.position += step;
            }

            true
        });
    }

    #[inline]
    fn num_inputs(&self) -> usize { 0 }

    #[inline]
    fn num_outputs(&self) -> usize { 2 }
}
