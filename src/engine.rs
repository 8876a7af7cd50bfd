//! The engine: one owning state object for timeline, history, media,
//! mixing and playback.
//!
//! Everything runs on the controlling thread through `&mut self`; the host
//! calls [`Engine::process`] in a loop to render audio, the same way a bare
//! [`AudioGraph`](crate::AudioGraph) is driven. Media probes are the only
//! background work and report back through a channel drained in `process`.

use std::collections::VecDeque;
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};
use hashbrown::HashSet;
use itertools::Itertools;

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult, MediaError, MediaResult};
use crate::history::History;
use crate::media::{AudioBuffer, Fetcher, MediaCache, MediaSource, OfflineFetcher, SourceKey};
use crate::mixing::MixingGraph;
use crate::output::OutputProvider;
use crate::scheduler::{ScheduleReport, Scheduler};
use crate::timeline::{Clip, ClipId, Timeline, Track, TrackId, TrackPatch, TRACK_COLORS};
use crate::transport::Transport;

/// Where the engine is in bringing up its audio output
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Lifecycle {
    /// No output provider yet
    Uninitialized,
    /// Provider known, waiting for the host's activation signal
    AwaitingActivation,
    /// Output open, render graph built
    Ready,
}

/// Something the host should tell the user about
#[derive(Clone, Debug, PartialEq)]
pub enum Notification {
    Info(String),
    /// A source failed to load; its clips stay silent, everything else plays
    MediaFailed {
        key: SourceKey,
        clips: Vec<ClipId>,
        error: MediaError,
    },
    /// Playback could not be started at all
    Fatal(EngineError),
}

/// Read-only view of the engine's user-facing state
#[derive(Clone, Debug, PartialEq)]
pub struct EngineState {
    pub timeline: Timeline,
    pub is_playing: bool,
    pub current_time: f64,
    pub master_volume: f32,
    pub zoom: f64,
    pub duration: f64,
    pub selected_track: Option<TrackId>,
    pub selected_clip: Option<ClipId>,
    pub looping_tracks: Vec<TrackId>,
}

struct ProbeDone {
    key: SourceKey,
    result: MediaResult<Arc<AudioBuffer>>,
}

/// A multi-track timeline with mixing, sample-accurate playback and undo/redo
///
/// ```
/// use mehrspur::{Engine, EngineConfig, RingBufferOutput};
///
/// let (output, _audio) = RingBufferOutput::stereo(48_000, 48_000);
/// let mut engine = Engine::new(EngineConfig::default());
/// engine.initialize(output);
/// engine.signal_activation().unwrap();
///
/// let drums = engine.add_empty_track();
/// engine.set_track_volume(drums, 0.5);
/// assert_eq!(engine.track(drums).map(|t| t.volume), Some(0.5));
/// assert!(engine.can_undo());
/// ```
pub struct Engine {
    config: EngineConfig,
    lifecycle: Lifecycle,
    provider: Option<Box<dyn OutputProvider>>,
    mixing: Option<MixingGraph>,

    timeline: Timeline,
    history: History,
    media: Arc<MediaCache>,
    scheduler: Scheduler,
    transport: Transport,
    start_deferred: bool,

    looping: HashSet<TrackId>,
    master_volume: f32,
    zoom: f64,
    selected_track: Option<TrackId>,
    selected_clip: Option<ClipId>,

    notifications: VecDeque<Notification>,
    probe_tx: Sender<ProbeDone>,
    probe_rx: Receiver<ProbeDone>,
    probing: HashSet<SourceKey>,
    next_id: u64,
}

impl Engine {
    /// An engine that can only load in-memory sources
    pub fn new(config: EngineConfig) -> Self {
        Self::with_fetcher(config, OfflineFetcher)
    }

    pub fn with_fetcher(config: EngineConfig, fetcher: impl Fetcher) -> Self {
        let (probe_tx, probe_rx) = crossbeam_channel::unbounded();
        let media = Arc::new(MediaCache::new(config.media.clone(), Arc::new(fetcher)));
        Self {
            lifecycle: Lifecycle::Uninitialized,
            provider: None,
            mixing: None,
            timeline: Timeline::new(),
            history: History::new(config.history_capacity, Timeline::new()),
            media,
            scheduler: Scheduler::new(config.schedule_horizon),
            transport: Transport::new(),
            start_deferred: false,
            looping: HashSet::new(),
            master_volume: config.master_volume,
            zoom: 1.0,
            selected_track: None,
            selected_clip: None,
            notifications: VecDeque::new(),
            probe_tx,
            probe_rx,
            probing: HashSet::new(),
            next_id: 1,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn alloc_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    // ---- lifecycle ----

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn is_ready(&self) -> bool {
        self.lifecycle == Lifecycle::Ready
    }

    /// Hand over the output to open on activation
    pub fn initialize(&mut self, provider: impl OutputProvider + 'static) {
        if self.lifecycle != Lifecycle::Uninitialized {
            tracing::debug!(lifecycle = ?self.lifecycle, "already initialized");
            return;
        }
        self.provider = Some(Box::new(provider));
        self.lifecycle = Lifecycle::AwaitingActivation;
        tracing::info!("engine initialized, awaiting activation");
    }

    /// The host's go-ahead to open audio output.
    ///
    /// A start requested before this point is attempted now, once; if it
    /// cannot happen a [`Notification::Fatal`] is queued and the engine
    /// stays stopped.
    pub fn signal_activation(&mut self) -> EngineResult<()> {
        let provider = match self.lifecycle {
            Lifecycle::Ready => return Ok(()),
            Lifecycle::Uninitialized => None,
            Lifecycle::AwaitingActivation => self.provider.as_mut(),
        };

        let opened = match provider {
            Some(provider) => provider.open(),
            None => Err(EngineError::ContextUnavailable("engine not initialized".into())),
        };

        let opened = match opened {
            Ok(opened) => opened,
            Err(err) => {
                tracing::warn!(%err, "activation failed");
                if std::mem::take(&mut self.start_deferred) {
                    self.notifications.push_back(Notification::Fatal(err.clone()));
                }
                return Err(err);
            }
        };

        let mut mixing = MixingGraph::new(
            opened.sample_rate,
            opened.sink,
            self.master_volume,
            self.config.smoothing_ms,
        );
        mixing.sync(&self.timeline);
        self.mixing = Some(mixing);
        self.provider = None;
        self.lifecycle = Lifecycle::Ready;
        tracing::info!(sample_rate = opened.sample_rate, "audio output ready");

        if std::mem::take(&mut self.start_deferred) {
            if !self.timeline.has_clips() {
                self.notify_info("No audio clips on timeline");
            } else if let Err(err) = self.begin_playback() {
                tracing::warn!(%err, "deferred start failed");
                self.notifications.push_back(Notification::Fatal(err));
            }
        }
        Ok(())
    }

    // ---- read-only state ----

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    pub fn tracks(&self) -> impl Iterator<Item = &Track> + '_ {
        self.timeline.tracks()
    }

    pub fn track(&self, id: TrackId) -> Option<&Track> {
        self.timeline.track(id)
    }

    pub fn clip(&self, id: ClipId) -> Option<&Clip> {
        self.timeline.find_clip(id).map(|(_, clip)| clip)
    }

    pub fn is_playing(&self) -> bool {
        self.scheduler.is_playing()
    }

    /// Engine clock in seconds; 0 before activation
    pub fn clock(&self) -> f64 {
        self.mixing.as_ref().map_or(0.0, MixingGraph::clock)
    }

    pub fn current_time(&self) -> f64 {
        self.transport.current_time(self.clock())
    }

    pub fn master_volume(&self) -> f32 {
        self.master_volume
    }

    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    /// Latest clip end over all tracks
    pub fn duration(&self) -> f64 {
        self.timeline.duration()
    }

    pub fn selected_track(&self) -> Option<TrackId> {
        self.selected_track
    }

    pub fn selected_clip(&self) -> Option<ClipId> {
        self.selected_clip
    }

    pub fn is_track_looping(&self, id: TrackId) -> bool {
        self.looping.contains(&id)
    }

    pub fn mixing(&self) -> Option<&MixingGraph> {
        self.mixing.as_ref()
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn media(&self) -> &Arc<MediaCache> {
        &self.media
    }

    pub fn state(&self) -> EngineState {
        let looping_tracks = self.looping.iter().copied().sorted().collect();
        EngineState {
            timeline: self.timeline.clone(),
            is_playing: self.is_playing(),
            current_time: self.current_time(),
            master_volume: self.master_volume,
            zoom: self.zoom,
            duration: self.duration(),
            selected_track: self.selected_track,
            selected_clip: self.selected_clip,
            looping_tracks,
        }
    }

    /// Drain queued notifications
    pub fn take_notifications(&mut self) -> Vec<Notification> {
        self.notifications.drain(..).collect()
    }

    fn notify_info(&mut self, message: &str) {
        tracing::info!(text = message, "notification");
        self.notifications.push_back(Notification::Info(message.to_string()));
    }

    // ---- rendering ----

    /// Render one block and handle everything that happened meanwhile
    pub fn process(&mut self) {
        self.poll_media();

        let Some(mixing) = self.mixing.as_mut() else {
            return;
        };
        mixing.process();

        let events = mixing.drain_events();
        if !self.scheduler.is_playing() {
            return;
        }
        let mut report = self.scheduler.on_voice_events(events, &self.timeline, &self.media, mixing);
        let topped = self.scheduler.top_up(&self.timeline, &self.looping, &self.media, mixing);
        report.started.extend(topped.started);
        report.skipped.extend(topped.skipped);
        report.missing.extend(topped.missing);
        self.handle_report(report);
    }

    // ---- transport ----

    /// Start or stop playback; redundant transitions do nothing
    pub fn set_playing(&mut self, playing: bool) {
        if !playing {
            self.start_deferred = false;
            if self.scheduler.is_playing() {
                self.halt_playback();
                tracing::info!(at = self.current_time(), "playback stopped");
            }
            return;
        }

        if self.scheduler.is_playing() {
            return;
        }
        if !self.timeline.has_clips() {
            self.notify_info("No audio clips on timeline");
            return;
        }
        if !self.is_ready() {
            tracing::info!("start deferred until activation");
            self.start_deferred = true;
            return;
        }
        if let Err(err) = self.begin_playback() {
            tracing::warn!(%err, "playback start failed");
            self.notifications.push_back(Notification::Fatal(err));
        }
    }

    pub fn toggle_playback(&mut self) {
        let playing = self.is_playing() || self.start_deferred;
        self.set_playing(!playing);
    }

    /// Move the play position; while playing, playback continues from there
    pub fn set_current_time(&mut self, time: f64) {
        match self.pause_for_edit() {
            Some(_) => self.resume_after_edit(Some(time.max(0.0))),
            None => self.transport.set_current_time(time),
        }
    }

    pub fn skip_forward(&mut self, seconds: f64) {
        self.skip_by(seconds.abs());
    }

    pub fn skip_backward(&mut self, seconds: f64) {
        self.skip_by(-seconds.abs());
    }

    fn skip_by(&mut self, delta: f64) {
        let target = self.transport.skipped_by(delta, self.clock());
        let was_playing = self.scheduler.is_playing();
        if was_playing {
            self.halt_playback();
        }
        self.transport.set_current_time(target);
        tracing::info!(target, was_playing, "skipped");

        if was_playing && self.config.resume_after_skip {
            self.resume_after_edit(Some(target));
        }
    }

    fn begin_playback(&mut self) -> EngineResult<()> {
        let Some(mixing) = self.mixing.as_mut() else {
            return Err(EngineError::ContextUnavailable("audio output not open".into()));
        };

        let clock = mixing.clock();
        let at = self.transport.current_time(clock);
        mixing.sync(&self.timeline);
        let report = self.scheduler.start(&self.timeline, at, &self.looping, &self.media, mixing);
        self.transport.play(at, clock);
        tracing::info!(at, voices = report.started.len(), skipped = report.skipped.len(), "playback started");
        self.handle_report(report);
        Ok(())
    }

    fn halt_playback(&mut self) {
        let clock = self.clock();
        if let Some(mixing) = self.mixing.as_mut() {
            self.scheduler.stop(mixing);
        }
        self.transport.stop(clock);
    }

    /// Stop for a structural edit, returning where to resume
    fn pause_for_edit(&mut self) -> Option<f64> {
        if !self.scheduler.is_playing() {
            return None;
        }
        let at = self.current_time();
        self.halt_playback();
        Some(at)
    }

    fn resume_after_edit(&mut self, at: Option<f64>) {
        let Some(at) = at else {
            return;
        };
        self.transport.set_current_time(at);
        if !self.timeline.has_clips() {
            tracing::info!("nothing left to play");
            return;
        }
        if let Err(err) = self.begin_playback() {
            tracing::warn!(%err, "restart after edit failed");
            self.notifications.push_back(Notification::Fatal(err));
        }
    }

    fn handle_report(&mut self, report: ScheduleReport) {
        for source in report.missing {
            self.probe(source);
        }
    }

    // ---- structural edits ----

    /// Apply a structural edit: pause, edit, record history, resume
    fn restructure<R>(&mut self, edit: impl FnOnce(&mut Timeline) -> Option<R>) -> Option<R> {
        let resume = self.pause_for_edit();
        let outcome = edit(&mut self.timeline);
        if outcome.is_some() {
            self.history.push(self.timeline.clone());
        }
        self.sync_mix();
        self.resume_after_edit(resume);
        outcome
    }

    fn sync_mix(&mut self) {
        if let Some(mixing) = self.mixing.as_mut() {
            mixing.sync(&self.timeline);
        }
    }

    /// Create a track, optionally with one clip of `source` at time zero.
    ///
    /// Without `initial_duration` the clip gets a placeholder length until its
    /// source has been probed.
    pub fn add_track(
        &mut self,
        name: &str,
        source: Option<MediaSource>,
        color: Option<&str>,
        initial_duration: Option<f64>,
    ) -> TrackId {
        let id = TrackId(self.alloc_id());
        let color = color
            .map(str::to_string)
            .unwrap_or_else(|| TRACK_COLORS[self.timeline.len() % TRACK_COLORS.len()].to_string());
        let mut track = Track::new(id, name, color);

        if let Some(source) = source.clone() {
            let clip = Clip::new(ClipId(self.alloc_id()), id, source, name);
            let clip = match initial_duration {
                Some(duration) => clip.with_duration(duration),
                None => clip,
            };
            track.clips.push(Clip { color: track.color.clone(), ..clip });
        }

        self.restructure(|timeline| {
            timeline.add_track(track);
            Some(())
        });
        tracing::info!(track = id.0, name, "track added");

        if let Some(source) = source {
            self.probe(source);
        }
        id
    }

    /// Add a track named `Track {n}`
    pub fn add_empty_track(&mut self) -> TrackId {
        let name = format!("Track {}", self.timeline.len() + 1);
        self.add_track(&name, None, None, None)
    }

    /// Append a clip to a track; `None` if the track does not exist
    pub fn add_clip_to_track(
        &mut self,
        track_id: TrackId,
        source: MediaSource,
        name: &str,
        start_time: f64,
        duration_override: Option<f64>,
    ) -> Option<ClipId> {
        if self.timeline.track(track_id).is_none() {
            tracing::debug!(track = track_id.0, "add clip: unknown track");
            return None;
        }
        let id = ClipId(self.alloc_id());
        let clip = Clip::new(id, track_id, source.clone(), name).with_start_time(start_time);
        let clip = match duration_override {
            Some(duration) => clip.with_duration(duration),
            None => clip,
        };

        let added = self.restructure(|timeline| timeline.add_clip(track_id, clip).then_some(id));
        if added.is_some() {
            self.probe(source);
        }
        added
    }

    pub fn move_clip(&mut self, clip_id: ClipId, new_start_time: f64) {
        self.restructure_clip(clip_id, |timeline| timeline.move_clip(clip_id, new_start_time));
    }

    pub fn move_clip_to_track(&mut self, clip_id: ClipId, target: TrackId, new_start_time: Option<f64>) {
        self.restructure_clip(clip_id, |timeline| timeline.move_clip_to_track(clip_id, target, new_start_time));
    }

    pub fn resize_clip(&mut self, clip_id: ClipId, new_duration: f64, new_offset: f64, new_start_time: Option<f64>) {
        self.restructure_clip(clip_id, |timeline| {
            timeline.resize_clip(clip_id, new_duration, new_offset, new_start_time)
        });
    }

    /// Split a clip at project time `at`, returning the id of the right half
    pub fn split_clip(&mut self, clip_id: ClipId, at: f64) -> Option<ClipId> {
        let (start, end) = self.clip(clip_id).map(|clip| (clip.start_time, clip.end_time()))?;
        if !(at > start && at < end) {
            tracing::debug!(clip = clip_id.0, at, "split outside clip");
            return None;
        }
        let right = ClipId(self.alloc_id());
        self.restructure(|timeline| timeline.split_clip(clip_id, at, right).then_some(right))
    }

    fn restructure_clip(&mut self, clip_id: ClipId, edit: impl FnOnce(&mut Timeline) -> bool) {
        if self.clip(clip_id).is_none() {
            tracing::debug!(clip = clip_id.0, "unknown clip");
            return;
        }
        self.restructure(|timeline| edit(timeline).then_some(()));
    }

    pub fn remove_clip(&mut self, clip_id: ClipId) {
        if self.clip(clip_id).is_none() {
            tracing::debug!(clip = clip_id.0, "remove: unknown clip");
            return;
        }
        let removed = self.restructure(|timeline| timeline.remove_clip(clip_id));
        if self.selected_clip == Some(clip_id) {
            self.selected_clip = None;
        }
        if let Some(clip) = removed {
            self.release_unreferenced([clip.source]);
        }
    }

    pub fn remove_track(&mut self, track_id: TrackId) {
        if self.timeline.track(track_id).is_none() {
            tracing::debug!(track = track_id.0, "remove: unknown track");
            return;
        }
        let removed = self.restructure(|timeline| timeline.remove_track(track_id));
        self.looping.remove(&track_id);
        if self.selected_track == Some(track_id) {
            self.selected_track = None;
        }
        if let Some(track) = removed {
            if self.selected_clip.map_or(false, |clip| track.clip(clip).is_some()) {
                self.selected_clip = None;
            }
            tracing::info!(track = track_id.0, "track removed");
            self.release_unreferenced(track.clips.into_iter().map(|clip| clip.source));
        }
    }

    /// Move a track in display order; index clamped
    pub fn reorder_track(&mut self, track_id: TrackId, new_index: usize) {
        if self.timeline.track(track_id).is_none() {
            return;
        }
        self.restructure(|timeline| timeline.reorder_track(track_id, new_index).then_some(()));
    }

    /// Drop cached media of in-memory sources no live clip uses any more
    fn release_unreferenced(&mut self, sources: impl IntoIterator<Item = MediaSource>) {
        for source in sources {
            if !source.is_in_memory_only() {
                continue;
            }
            if let Some(key) = source.key() {
                if !self.timeline.references(&key) {
                    self.media.release(&key);
                }
            }
        }
    }

    // ---- parameter edits ----

    /// Patch track fields directly: no history, no reschedule
    pub fn update_track(&mut self, track_id: TrackId, patch: TrackPatch) {
        if !self.timeline.patch_track(track_id, &patch, self.config.max_track_volume) {
            tracing::debug!(track = track_id.0, "update: unknown track");
            return;
        }
        if patch.touches_mix() {
            self.sync_mix();
        }
    }

    pub fn rename_track(&mut self, track_id: TrackId, name: &str) {
        let patch = TrackPatch { name: Some(name.to_string()), ..TrackPatch::default() };
        self.update_track(track_id, patch);
    }

    pub fn set_track_volume(&mut self, track_id: TrackId, volume: f32) {
        self.update_track(track_id, TrackPatch::volume(volume));
    }

    pub fn set_track_pan(&mut self, track_id: TrackId, pan: f32) {
        self.update_track(track_id, TrackPatch::pan(pan));
    }

    pub fn toggle_mute(&mut self, track_id: TrackId) {
        if self.timeline.toggle_mute(track_id).is_some() {
            self.sync_mix();
        }
    }

    pub fn toggle_solo(&mut self, track_id: TrackId) {
        if self.timeline.toggle_solo(track_id).is_some() {
            self.sync_mix();
        }
    }

    pub fn set_master_volume(&mut self, volume: f32) {
        self.master_volume = volume.max(0.0);
        if let Some(mixing) = self.mixing.as_mut() {
            mixing.set_master_volume(self.master_volume);
        }
    }

    pub fn set_zoom(&mut self, zoom: f64) {
        if zoom.is_finite() && zoom > 0.0 {
            self.zoom = zoom;
        }
    }

    pub fn set_selected_track(&mut self, track_id: Option<TrackId>) {
        self.selected_track = track_id;
    }

    pub fn set_selected_clip(&mut self, clip_id: Option<ClipId>) {
        self.selected_clip = clip_id;
    }

    /// Select the track after the selected one, wrapping; the first if none
    pub fn select_next_track(&mut self) {
        let len = self.timeline.len();
        if len == 0 {
            return;
        }
        let next = match self.selected_track.and_then(|id| self.timeline.index_of(id)) {
            Some(index) => (index + 1) % len,
            None => 0,
        };
        self.selected_track = self.timeline.track_at(next).map(|track| track.id);
    }

    /// Select the track before the selected one, wrapping; the last if none
    pub fn select_previous_track(&mut self) {
        let len = self.timeline.len();
        if len == 0 {
            return;
        }
        let index = self.selected_track.and_then(|id| self.timeline.index_of(id)).unwrap_or(0);
        let previous = (index + len - 1) % len;
        self.selected_track = self.timeline.track_at(previous).map(|track| track.id);
    }

    /// Flip a track's loop flag, returning the new state.
    ///
    /// The sounding voice picks the change up live; the full loop schedule
    /// applies from the next start.
    pub fn toggle_track_loop(&mut self, track_id: TrackId) -> bool {
        if self.timeline.track(track_id).is_none() {
            return false;
        }
        let looping = if self.looping.remove(&track_id) {
            false
        } else {
            self.looping.insert(track_id);
            true
        };
        if self.scheduler.is_playing() {
            if let Some(mixing) = self.mixing.as_mut() {
                mixing.set_looping(track_id, looping);
            }
        }
        looping
    }

    // ---- history ----

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn undo(&mut self) -> bool {
        match self.history.undo().cloned() {
            Some(snapshot) => {
                self.replace_timeline(snapshot);
                true
            }
            None => false,
        }
    }

    pub fn redo(&mut self) -> bool {
        match self.history.redo().cloned() {
            Some(snapshot) => {
                self.replace_timeline(snapshot);
                true
            }
            None => false,
        }
    }

    fn replace_timeline(&mut self, timeline: Timeline) {
        let resume = self.pause_for_edit();
        self.timeline = timeline;

        let live = &self.timeline;
        self.looping.retain(|id| live.track(*id).is_some());
        if self.selected_track.map_or(false, |id| live.track(id).is_none()) {
            self.selected_track = None;
        }
        if self.selected_clip.map_or(false, |id| live.find_clip(id).is_none()) {
            self.selected_clip = None;
        }

        self.sync_mix();
        self.resume_after_edit(resume);
    }

    // ---- media ----

    /// Decode `source` on this thread (or wait for its in-flight decode)
    pub fn ensure_buffer(&mut self, source: &MediaSource) -> MediaResult<Arc<AudioBuffer>> {
        let result = self.media.ensure_buffer(source);
        if let (Ok(buffer), Some(key)) = (&result, source.key()) {
            self.resolve_durations(&key, buffer);
        }
        result
    }

    /// Peak envelope in `sample_count` buckets
    pub fn peaks(&mut self, source: &MediaSource, sample_count: usize) -> MediaResult<Arc<[f32]>> {
        let peaks = self.media.peaks(source, sample_count)?;
        if let Some(key) = source.key() {
            if let Some(buffer) = self.media.try_get(&key) {
                self.resolve_durations(&key, &buffer);
            }
        }
        Ok(peaks)
    }

    /// Peak envelope at the configured default resolution
    pub fn default_peaks(&mut self, source: &MediaSource) -> MediaResult<Arc<[f32]>> {
        let count = self.config.media.default_peak_count;
        self.peaks(source, count)
    }

    /// Number of probes still running
    pub fn pending_probes(&self) -> usize {
        self.probing.len()
    }

    /// Load `source` in the background unless it is cached or already loading
    fn probe(&mut self, source: MediaSource) {
        let Some(key) = source.key() else {
            return;
        };
        if let Some(buffer) = self.media.try_get(&key) {
            self.resolve_durations(&key, &buffer);
            return;
        }
        if !self.probing.insert(key.clone()) {
            return;
        }

        let media = self.media.clone();
        let tx = self.probe_tx.clone();
        let probe_key = key.clone();
        let spawned = std::thread::Builder::new()
            .name("mehrspur-probe".into())
            .spawn(move || {
                let result = media.ensure_buffer(&source);
                let _ = tx.send(ProbeDone { key: probe_key, result });
            });

        match spawned {
            Ok(_) => tracing::debug!(%key, "probe started"),
            Err(err) => {
                tracing::warn!(%key, %err, "could not spawn probe");
                self.probing.remove(&key);
            }
        }
    }

    /// Apply finished probes; returns how many were handled
    pub fn poll_media(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(done) = self.probe_rx.try_recv() {
            self.finish_probe(done);
            handled += 1;
        }
        handled
    }

    /// Block until every outstanding probe has finished
    pub fn settle_media(&mut self) {
        while !self.probing.is_empty() {
            match self.probe_rx.recv() {
                Ok(done) => self.finish_probe(done),
                Err(_) => break,
            }
        }
    }

    fn finish_probe(&mut self, done: ProbeDone) {
        self.probing.remove(&done.key);
        match done.result {
            Ok(buffer) => {
                self.resolve_durations(&done.key, &buffer);
                // the last clip may have gone before the probe thread got to run
                if matches!(done.key, SourceKey::Blob(_)) && !self.timeline.references(&done.key) {
                    self.media.release(&done.key);
                }
            }
            Err(error) => {
                let clips: Vec<ClipId> = self
                    .timeline
                    .clips()
                    .filter(|clip| clip.key().as_ref() == Some(&done.key))
                    .map(|clip| clip.id)
                    .collect();
                tracing::warn!(key = %done.key, %error, clips = clips.len(), "source unavailable");
                self.notifications.push_back(Notification::MediaFailed {
                    key: done.key,
                    clips,
                    error,
                });
            }
        }
    }

    /// Replace placeholder durations of clips using `key`, live and in history
    fn resolve_durations(&mut self, key: &SourceKey, buffer: &AudioBuffer) {
        let seconds = buffer.duration();
        let resolved = self.timeline.resolve_duration(key, seconds);
        self.history.patch_all(|snapshot| {
            snapshot.resolve_duration(key, seconds);
        });
        if resolved > 0 {
            tracing::debug!(%key, seconds, clips = resolved, "resolved placeholder durations");
        }
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}
