//! Turns the timeline into scheduled voices.
//!
//! A session runs from [`Scheduler::start`] to [`Scheduler::stop`]. Starting
//! maps project time `t0` onto the current engine frame; every clip that is
//! active at `t0` starts immediately part way in, every clip that begins later
//! is placed at its exact engine frame. Clips whose audio is not decoded yet
//! are skipped for the whole session.
//!
//! A voice the track's player cannot take yet (its queue is full) waits in the
//! scheduler and is offered again after every block.

use std::collections::VecDeque;
use std::sync::Arc;

use hashbrown::{HashMap, HashSet};

use crate::media::{AudioBuffer, MediaCache, MediaSource};
use crate::mixing::{Delivery, MixingGraph};
use crate::nodes::{Voice, VoiceEvent, VoiceId};
use crate::timeline::{Clip, ClipId, Timeline, Track, TrackId};

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum PlaybackState {
    #[default]
    Stopped,
    Playing,
}

/// A voice handed to the render path and not yet reported ended
#[derive(Clone, Debug, PartialEq)]
pub struct ScheduledVoice {
    pub voice: VoiceId,
    pub track: TrackId,
    pub clip: ClipId,
    pub start_frame: u64,
    pub read_offset: f64,
    /// Seconds of audio before a natural end (ignoring looping)
    pub remaining: f64,
    pub looping: bool,
}

/// What one scheduling pass did
#[derive(Debug, Default)]
pub struct ScheduleReport {
    pub started: Vec<ScheduledVoice>,
    /// Clips left out because their audio is not available
    pub skipped: Vec<ClipId>,
    /// Sources worth probing so a later session can play them
    pub missing: Vec<MediaSource>,
}

#[derive(Clone, Copy, Debug)]
struct Session {
    project_start: f64,
    frame_start: u64,
    sample_rate: u32,
}

impl Session {
    fn frame_at(&self, project_time: f64) -> u64 {
        let delta = ((project_time - self.project_start) * self.sample_rate as f64).round();
        if delta <= 0.0 {
            self.frame_start
        } else {
            self.frame_start + delta as u64
        }
    }

    fn project_time_at(&self, frame: u64) -> f64 {
        self.project_start + frame.saturating_sub(self.frame_start) as f64 / self.sample_rate as f64
    }
}

#[derive(Clone, Debug)]
struct PendingVoice {
    track: TrackId,
    voice: Voice,
    scheduled: ScheduledVoice,
}

impl PendingVoice {
    /// Shift a voice whose start frame has passed onto `frame`, reading further
    /// in by the lateness. False once there is nothing left to play.
    fn catch_up(&mut self, frame: u64, sample_rate: u32) -> bool {
        let voice = &mut self.voice;
        if voice.start_frame >= frame {
            return true;
        }
        let late = (frame - voice.start_frame) as f64 / sample_rate as f64;
        let span = voice.source_end - voice.source_start;
        let mut offset = voice.read_offset + late;
        if offset >= voice.source_end {
            if !voice.looping || span <= 0.0 {
                return false;
            }
            offset = voice.source_start + (offset - voice.source_start) % span;
        }

        voice.read_offset = offset;
        voice.start_frame = frame;
        self.scheduled.read_offset = offset;
        self.scheduled.start_frame = frame;
        self.scheduled.remaining = voice.remaining();
        true
    }
}

/// Owns the registry of sounding voices
pub struct Scheduler {
    state: PlaybackState,
    session: Option<Session>,
    horizon: Option<f64>,
    voices: HashMap<VoiceId, ScheduledVoice>,
    /// Every clip whose voice reached its player this session
    scheduled: HashSet<ClipId>,
    skipped: HashSet<ClipId>,
    /// Voices refused by a full player queue, in scheduling order
    pending: VecDeque<PendingVoice>,
    waiting: HashSet<ClipId>,
    next_voice: u64,
}

impl Scheduler {
    pub fn new(horizon: Option<f64>) -> Self {
        Self {
            state: PlaybackState::Stopped,
            session: None,
            horizon,
            voices: HashMap::new(),
            scheduled: HashSet::new(),
            skipped: HashSet::new(),
            pending: VecDeque::new(),
            waiting: HashSet::new(),
            next_voice: 1,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == PlaybackState::Playing
    }

    /// Voices handed out and not yet ended
    pub fn voices(&self) -> impl Iterator<Item = &ScheduledVoice> + '_ {
        self.voices.values()
    }

    pub fn voice_for_clip(&self, clip: ClipId) -> Option<&ScheduledVoice> {
        self.voices.values().find(|voice| voice.clip == clip)
    }

    pub fn was_skipped(&self, clip: ClipId) -> bool {
        self.skipped.contains(&clip)
    }

    /// Voices waiting for room in their player's queue
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    fn is_claimed(&self, clip: ClipId) -> bool {
        self.scheduled.contains(&clip) || self.waiting.contains(&clip) || self.skipped.contains(&clip)
    }

    /// Begin a session at project time `t0`, mapped onto the mixing graph's
    /// next engine frame.
    pub fn start(
        &mut self,
        timeline: &Timeline,
        t0: f64,
        looping: &HashSet<TrackId>,
        media: &MediaCache,
        mixing: &mut MixingGraph,
    ) -> ScheduleReport {
        self.stop(mixing);

        let session = Session {
            project_start: t0.max(0.0),
            frame_start: mixing.frame(),
            sample_rate: mixing.sample_rate(),
        };
        self.session = Some(session);
        self.state = PlaybackState::Playing;

        let mut report = ScheduleReport::default();
        for track in timeline.tracks() {
            if looping.contains(&track.id) {
                let looped = track
                    .active_clip(session.project_start)
                    .or_else(|| first_future_clip(track, session.project_start));
                if let Some(clip) = looped {
                    self.schedule(track.id, clip, true, media, mixing, &mut report);
                }
                continue;
            }

            for clip in track.clips.iter() {
                let active = track
                    .active_clip(session.project_start)
                    .map_or(false, |active| active.id == clip.id);
                let future = clip.start_time > session.project_start;
                let within_horizon = self
                    .horizon
                    .map_or(true, |h| clip.start_time - session.project_start <= h);

                if active || (future && within_horizon) {
                    self.schedule(track.id, clip, false, media, mixing, &mut report);
                }
            }
        }

        tracing::debug!(
            t0 = session.project_start,
            frame = session.frame_start,
            started = report.started.len(),
            skipped = report.skipped.len(),
            "scheduled session"
        );
        report
    }

    /// Halt every voice and forget the session. Idempotent.
    pub fn stop(&mut self, mixing: &mut MixingGraph) {
        if self.state == PlaybackState::Playing {
            mixing.stop_all();
            tracing::debug!(voices = self.voices.len(), pending = self.pending.len(), "stopped session");
        }
        self.state = PlaybackState::Stopped;
        self.session = None;
        self.voices.clear();
        self.scheduled.clear();
        self.skipped.clear();
        self.pending.clear();
        self.waiting.clear();
    }

    /// Handle natural voice ends: unregister and chain each track's next clip.
    pub fn on_voice_events(
        &mut self,
        events: Vec<(TrackId, VoiceEvent)>,
        timeline: &Timeline,
        media: &MediaCache,
        mixing: &mut MixingGraph,
    ) -> ScheduleReport {
        let mut report = ScheduleReport::default();
        for (track_id, event) in events {
            let VoiceEvent::Ended { voice, frame, .. } = event;
            // stale ends from an earlier session are not in the registry
            let Some(ended) = self.voices.remove(&voice) else {
                continue;
            };
            let (Some(session), Some(track)) = (self.session, timeline.track(track_id)) else {
                continue;
            };
            let Some(clip) = track.clip(ended.clip) else {
                continue;
            };

            let clip_end = clip.end_time();
            let next = track
                .clips
                .iter()
                .filter(|next| next.start_time >= clip_end - 1e-9)
                .filter(|next| !self.is_claimed(next.id))
                .fold(None::<&Clip>, |best, next| match best {
                    Some(best) if best.start_time <= next.start_time => Some(best),
                    _ => Some(next),
                });

            if let Some(next) = next {
                let now = session.project_time_at(frame);
                tracing::debug!(clip = next.id.0, track = track_id.0, now, "chaining next clip");
                self.schedule_at(track_id, next, now, false, session, media, mixing, &mut report);
            }
        }
        report
    }

    /// Offer waiting voices again and pick up clips that have come within the
    /// schedule horizon
    pub fn top_up(&mut self, timeline: &Timeline, looping: &HashSet<TrackId>, media: &MediaCache, mixing: &mut MixingGraph) -> ScheduleReport {
        let mut report = ScheduleReport::default();
        self.flush_pending(mixing, &mut report);

        let (Some(horizon), Some(session)) = (self.horizon, self.session) else {
            return report;
        };
        let now = session.project_time_at(mixing.frame());

        for track in timeline.tracks().filter(|track| !looping.contains(&track.id)) {
            for clip in track.clips.iter() {
                if clip.start_time > now && clip.start_time - now <= horizon && !self.is_claimed(clip.id) {
                    self.schedule_at(track.id, clip, now, false, session, media, mixing, &mut report);
                }
            }
        }
        report
    }

    fn schedule(
        &mut self,
        track: TrackId,
        clip: &Clip,
        looping: bool,
        media: &MediaCache,
        mixing: &mut MixingGraph,
        report: &mut ScheduleReport,
    ) {
        if let Some(session) = self.session {
            self.schedule_at(track, clip, session.project_start, looping, session, media, mixing, report);
        }
    }

    /// Give `clip` a voice as seen from project time `now`
    #[allow(clippy::too_many_arguments)]
    fn schedule_at(
        &mut self,
        track: TrackId,
        clip: &Clip,
        now: f64,
        looping: bool,
        session: Session,
        media: &MediaCache,
        mixing: &mut MixingGraph,
        report: &mut ScheduleReport,
    ) {
        let Some(buffer) = self.resolve(clip, media, report) else {
            return;
        };

        let elapsed = (now - clip.start_time).max(0.0);
        let start_frame = session.frame_at(clip.start_time).max(mixing.frame());
        let voice = Voice {
            id: VoiceId(self.next_voice),
            clip_id: clip.id,
            buffer,
            start_frame,
            read_offset: clip.offset + elapsed,
            source_start: clip.offset,
            source_end: clip.offset + clip.duration,
            looping,
            epoch: mixing.epoch(),
        };
        self.next_voice += 1;

        let scheduled = ScheduledVoice {
            voice: voice.id,
            track,
            clip: clip.id,
            start_frame,
            read_offset: voice.read_offset,
            remaining: voice.remaining(),
            looping,
        };

        self.deliver(PendingVoice { track, voice, scheduled }, mixing, report);
    }

    /// Send a voice to its player, or keep it for a later block when the
    /// player's queue is full
    fn deliver(&mut self, mut pending: PendingVoice, mixing: &mut MixingGraph, report: &mut ScheduleReport) {
        let clip = pending.scheduled.clip;
        if !pending.catch_up(mixing.frame(), mixing.sample_rate()) {
            tracing::debug!(clip = clip.0, "voice ran out before it could be delivered");
            self.waiting.remove(&clip);
            self.scheduled.insert(clip);
            return;
        }

        match mixing.start_voice(pending.track, &pending.voice) {
            Delivery::Sent => {
                let scheduled = pending.scheduled;
                tracing::debug!(
                    clip = clip.0,
                    start_frame = scheduled.start_frame,
                    offset = scheduled.read_offset,
                    looping = scheduled.looping,
                    "voice scheduled"
                );
                self.waiting.remove(&clip);
                self.scheduled.insert(clip);
                self.voices.insert(scheduled.voice, scheduled.clone());
                report.started.push(scheduled);
            }
            Delivery::QueueFull => {
                if self.waiting.insert(clip) {
                    tracing::debug!(clip = clip.0, track = pending.track.0, "player queue full, voice deferred");
                }
                self.pending.push_back(pending);
            }
            Delivery::NoStrip => {
                tracing::debug!(clip = clip.0, track = pending.track.0, "track has no strip, voice dropped");
                self.waiting.remove(&clip);
            }
        }
    }

    fn flush_pending(&mut self, mixing: &mut MixingGraph, report: &mut ScheduleReport) {
        if self.pending.is_empty() {
            return;
        }
        let mut full: HashSet<TrackId> = HashSet::new();
        for pending in std::mem::take(&mut self.pending) {
            if full.contains(&pending.track) {
                self.pending.push_back(pending);
                continue;
            }
            let track = pending.track;
            let waiting = self.pending.len();
            self.deliver(pending, mixing, report);
            if self.pending.len() > waiting {
                full.insert(track);
            }
        }
    }

    fn resolve(&mut self, clip: &Clip, media: &MediaCache, report: &mut ScheduleReport) -> Option<Arc<AudioBuffer>> {
        let buffer = clip.key().and_then(|key| media.try_get(&key));
        if buffer.is_none() {
            tracing::debug!(clip = clip.id.0, "buffer not ready, skipping clip");
            self.skipped.insert(clip.id);
            report.skipped.push(clip.id);
            if clip.key().is_some() {
                report.missing.push(clip.source.clone());
            }
        }
        buffer
    }
}

fn first_future_clip(track: &Track, t: f64) -> Option<&Clip> {
    track
        .clips
        .iter()
        .filter(|clip| clip.start_time > t)
        .fold(None::<&Clip>, |best, clip| match best {
            Some(best) if best.start_time <= clip.start_time => Some(best),
            _ => Some(clip),
        })
}
