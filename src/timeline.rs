//! Tracks and clips.
//!
//! Plain data plus the pure mutation functions that keep its invariants:
//! clip durations never drop below [`MIN_CLIP_DURATION`], offsets and start
//! times never go negative. Mutations clamp rather than reject, and report
//! whether anything changed so the caller can decide on history and
//! rescheduling.
//!
//! Tracks are held as `Arc<Track>`; a mutation copies only the track it
//! touches, so history snapshots share every untouched track.

use std::collections::BTreeMap;
use std::sync::Arc;

pub use crate::media::{Blob, MediaSource, SourceKey};

/// Shortest clip the timeline allows, in seconds
pub const MIN_CLIP_DURATION: f64 = 0.05;

/// Duration given to a clip whose source length is not known yet
pub const PLACEHOLDER_DURATION: f64 = 60.0;

/// Default track colours, picked by track count
pub const TRACK_COLORS: [&str; 10] = [
    "#22d3ee", "#ec4899", "#67e8f9", "#f59e0b", "#10b981",
    "#ef4444", "#06b6d4", "#fb7185", "#0ea5e9", "#fbbf24",
];

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, PartialOrd, Ord)]
pub struct TrackId(pub u64);

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, PartialOrd, Ord)]
pub struct ClipId(pub u64);

/// Opaque effect metadata carried along with a track
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Effect {
    pub id: String,
    pub name: String,
    pub kind: String,
    pub enabled: bool,
    pub parameters: BTreeMap<String, f64>,
}

/// A placement of a span of source audio on a track
#[derive(Clone, Debug, PartialEq)]
pub struct Clip {
    pub id: ClipId,
    pub track_id: TrackId,
    pub source: MediaSource,
    pub name: String,
    pub color: String,
    /// Position on the timeline, seconds
    pub start_time: f64,
    pub duration: f64,
    /// Where in the source the clip begins, seconds
    pub offset: f64,
    /// `duration` is a placeholder until the source has been decoded
    pub duration_pending: bool,
}

impl Clip {
    pub fn new(id: ClipId, track_id: TrackId, source: MediaSource, name: impl Into<String>) -> Self {
        Self {
            id,
            track_id,
            source,
            name: name.into(),
            color: TRACK_COLORS[0].to_string(),
            start_time: 0.0,
            duration: PLACEHOLDER_DURATION,
            offset: 0.0,
            duration_pending: true,
        }
    }

    pub fn with_start_time(mut self, start_time: f64) -> Self {
        self.start_time = start_time.max(0.0);
        self
    }

    /// A known duration; clears the pending flag
    pub fn with_duration(mut self, duration: f64) -> Self {
        self.duration = duration.max(MIN_CLIP_DURATION);
        self.duration_pending = false;
        self
    }

    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = color.into();
        self
    }

    #[inline]
    pub fn end_time(&self) -> f64 {
        self.start_time + self.duration
    }

    /// Whether `[start_time, start_time + duration)` contains `time`
    #[inline]
    pub fn contains(&self, time: f64) -> bool {
        time >= self.start_time && time < self.end_time()
    }

    pub fn key(&self) -> Option<SourceKey> {
        self.source.key()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Track {
    pub id: TrackId,
    pub name: String,
    pub color: String,
    pub clips: Vec<Clip>,
    pub volume: f32,
    pub pan: f32,
    pub mute: bool,
    pub solo: bool,
    pub effects: Vec<Effect>,
}

impl Track {
    pub fn new(id: TrackId, name: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            color: color.into(),
            clips: Vec::new(),
            volume: 1.0,
            pan: 0.0,
            mute: false,
            solo: false,
            effects: Vec::new(),
        }
    }

    /// The clip sounding at `time`: first in list order whose span contains it
    pub fn active_clip(&self, time: f64) -> Option<&Clip> {
        self.clips.iter().find(|clip| clip.contains(time))
    }

    pub fn clip(&self, id: ClipId) -> Option<&Clip> {
        self.clips.iter().find(|clip| clip.id == id)
    }

    /// End of the last clip, 0 when empty
    pub fn end_time(&self) -> f64 {
        self.clips.iter().map(Clip::end_time).fold(0.0, f64::max)
    }
}

/// A partial update of a track's fields
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TrackPatch {
    pub name: Option<String>,
    pub color: Option<String>,
    pub volume: Option<f32>,
    pub pan: Option<f32>,
    pub mute: Option<bool>,
    pub solo: Option<bool>,
    pub effects: Option<Vec<Effect>>,
}

impl TrackPatch {
    pub fn volume(volume: f32) -> Self {
        Self { volume: Some(volume), ..Self::default() }
    }

    pub fn pan(pan: f32) -> Self {
        Self { pan: Some(pan), ..Self::default() }
    }

    /// Whether applying this patch changes what the track sounds like
    pub fn touches_mix(&self) -> bool {
        self.volume.is_some() || self.pan.is_some() || self.mute.is_some() || self.solo.is_some()
    }
}

/// The ordered list of tracks
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Timeline {
    tracks: Vec<Arc<Track>>,
}

impl Timeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tracks(&self) -> impl Iterator<Item = &Track> + '_ {
        self.tracks.iter().map(|track| &**track)
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn track(&self, id: TrackId) -> Option<&Track> {
        self.tracks().find(|track| track.id == id)
    }

    pub fn track_at(&self, index: usize) -> Option<&Track> {
        self.tracks.get(index).map(|track| &**track)
    }

    pub fn index_of(&self, id: TrackId) -> Option<usize> {
        self.tracks.iter().position(|track| track.id == id)
    }

    /// The clip with `id` and the track that owns it
    pub fn find_clip(&self, id: ClipId) -> Option<(&Track, &Clip)> {
        self.tracks()
            .find_map(|track| track.clip(id).map(|clip| (track, clip)))
    }

    pub fn clips(&self) -> impl Iterator<Item = &Clip> + '_ {
        self.tracks().flat_map(|track| track.clips.iter())
    }

    pub fn has_clips(&self) -> bool {
        self.clips().next().is_some()
    }

    pub fn any_solo(&self) -> bool {
        self.tracks().any(|track| track.solo)
    }

    /// Latest clip end over all tracks, 0 when there are none
    pub fn duration(&self) -> f64 {
        self.tracks().map(Track::end_time).fold(0.0, f64::max)
    }

    /// Whether `self` and `other` hold the very same track allocation for `id`
    pub fn shares_track(&self, other: &Timeline, id: TrackId) -> bool {
        let find = |timeline: &Timeline| timeline.tracks.iter().find(|t| t.id == id).cloned();
        match (find(self), find(other)) {
            (Some(a), Some(b)) => Arc::ptr_eq(&a, &b),
            _ => false,
        }
    }

    fn track_mut(&mut self, id: TrackId) -> Option<&mut Track> {
        self.tracks
            .iter_mut()
            .find(|track| track.id == id)
            .map(Arc::make_mut)
    }

    /// Apply `f` to the clip with `id`, copying only its track
    fn with_clip_mut(&mut self, id: ClipId, f: impl FnOnce(&mut Clip) -> bool) -> bool {
        let Some(index) = self.tracks.iter().position(|track| track.clip(id).is_some()) else {
            return false;
        };
        let track = Arc::make_mut(&mut self.tracks[index]);
        match track.clips.iter_mut().find(|clip| clip.id == id) {
            Some(clip) => f(clip),
            None => false,
        }
    }

    pub fn add_track(&mut self, track: Track) {
        self.tracks.push(Arc::new(track));
    }

    pub fn remove_track(&mut self, id: TrackId) -> Option<Track> {
        let index = self.index_of(id)?;
        let track = self.tracks.remove(index);
        Some(Arc::try_unwrap(track).unwrap_or_else(|shared| (*shared).clone()))
    }

    /// Append `clip` to a track, taking over the track's id and colour
    pub fn add_clip(&mut self, track_id: TrackId, mut clip: Clip) -> bool {
        let Some(track) = self.track_mut(track_id) else {
            return false;
        };
        clip.track_id = track_id;
        clip.color = track.color.clone();
        clip.start_time = clip.start_time.max(0.0);
        clip.duration = clip.duration.max(MIN_CLIP_DURATION);
        clip.offset = clip.offset.max(0.0);
        track.clips.push(clip);
        true
    }

    pub fn move_clip(&mut self, id: ClipId, start_time: f64) -> bool {
        let start_time = start_time.max(0.0);
        self.with_clip_mut(id, |clip| {
            clip.start_time = start_time;
            true
        })
    }

    /// Move a clip to another track; no-op for the same track or unknown ids
    pub fn move_clip_to_track(&mut self, id: ClipId, target: TrackId, start_time: Option<f64>) -> bool {
        let Some(source_index) = self.tracks.iter().position(|track| track.clip(id).is_some()) else {
            return false;
        };
        let Some(target_index) = self.index_of(target) else {
            return false;
        };
        if source_index == target_index {
            return false;
        }

        let source = Arc::make_mut(&mut self.tracks[source_index]);
        let Some(position) = source.clips.iter().position(|clip| clip.id == id) else {
            return false;
        };
        let mut clip = source.clips.remove(position);
        clip.track_id = target;
        if let Some(start_time) = start_time {
            clip.start_time = start_time.max(0.0);
        }
        Arc::make_mut(&mut self.tracks[target_index]).clips.push(clip);
        true
    }

    /// Set a clip's duration and offset, and optionally its start; clamped
    pub fn resize_clip(&mut self, id: ClipId, duration: f64, offset: f64, start_time: Option<f64>) -> bool {
        self.with_clip_mut(id, |clip| {
            clip.duration = duration.max(MIN_CLIP_DURATION);
            clip.offset = offset.max(0.0);
            if let Some(start_time) = start_time {
                clip.start_time = start_time.max(0.0);
            }
            clip.duration_pending = false;
            true
        })
    }

    /// Split a clip at project time `at`, the right half getting `right_id`.
    ///
    /// No-op unless `at` lies strictly inside the clip and both halves are at
    /// least [`MIN_CLIP_DURATION`] long.
    pub fn split_clip(&mut self, id: ClipId, at: f64, right_id: ClipId) -> bool {
        let Some(index) = self.tracks.iter().position(|track| track.clip(id).is_some()) else {
            return false;
        };
        let Some(clip) = self.tracks[index].clip(id) else {
            return false;
        };

        let (left_duration, right_duration) = split_span(clip.duration, at - clip.start_time);
        if !(left_duration >= MIN_CLIP_DURATION && right_duration >= MIN_CLIP_DURATION) {
            return false;
        }

        let track = Arc::make_mut(&mut self.tracks[index]);
        let Some(position) = track.clips.iter().position(|clip| clip.id == id) else {
            return false;
        };
        let left = &mut track.clips[position];
        left.duration = left_duration;
        let right = Clip {
            id: right_id,
            name: format!("{} (part 2)", left.name),
            start_time: at,
            duration: right_duration,
            offset: left.offset + left_duration,
            ..left.clone()
        };
        track.clips.insert(position + 1, right);
        true
    }

    pub fn remove_clip(&mut self, id: ClipId) -> Option<Clip> {
        let index = self.tracks.iter().position(|track| track.clip(id).is_some())?;
        let track = Arc::make_mut(&mut self.tracks[index]);
        let position = track.clips.iter().position(|clip| clip.id == id)?;
        Some(track.clips.remove(position))
    }

    /// Apply a field patch; volume is clamped to `[0, max_volume]`, pan to `[-1, 1]`
    pub fn patch_track(&mut self, id: TrackId, patch: &TrackPatch, max_volume: f32) -> bool {
        let Some(track) = self.track_mut(id) else {
            return false;
        };
        if let Some(name) = &patch.name {
            track.name = name.clone();
        }
        if let Some(color) = &patch.color {
            track.color = color.clone();
        }
        if let Some(volume) = patch.volume {
            track.volume = volume.clamp(0.0, max_volume);
        }
        if let Some(pan) = patch.pan {
            track.pan = pan.clamp(-1.0, 1.0);
        }
        if let Some(mute) = patch.mute {
            track.mute = mute;
        }
        if let Some(solo) = patch.solo {
            track.solo = solo;
        }
        if let Some(effects) = &patch.effects {
            track.effects = effects.clone();
        }
        true
    }

    /// Flip mute, returning the new value
    pub fn toggle_mute(&mut self, id: TrackId) -> Option<bool> {
        let track = self.track_mut(id)?;
        track.mute = !track.mute;
        Some(track.mute)
    }

    /// Flip solo, returning the new value
    pub fn toggle_solo(&mut self, id: TrackId) -> Option<bool> {
        let track = self.track_mut(id)?;
        track.solo = !track.solo;
        Some(track.solo)
    }

    /// Move a track to `index`, clamped into range
    pub fn reorder_track(&mut self, id: TrackId, index: usize) -> bool {
        let Some(current) = self.index_of(id) else {
            return false;
        };
        let index = index.min(self.tracks.len() - 1);
        if current == index {
            return false;
        }
        let track = self.tracks.remove(current);
        self.tracks.insert(index, track);
        true
    }

    /// Give every pending clip of `key` its real length, returning how many changed
    pub fn resolve_duration(&mut self, key: &SourceKey, source_duration: f64) -> usize {
        let mut resolved = 0;
        for track in self.tracks.iter_mut() {
            let pending = |clip: &Clip| clip.duration_pending && clip.key().as_ref() == Some(key);
            if !track.clips.iter().any(pending) {
                continue;
            }
            for clip in Arc::make_mut(track).clips.iter_mut().filter(|clip| pending(clip)) {
                clip.duration = (source_duration - clip.offset).max(MIN_CLIP_DURATION);
                clip.duration_pending = false;
                resolved += 1;
            }
        }
        resolved
    }

    /// Whether any clip still refers to `key`
    pub fn references(&self, key: &SourceKey) -> bool {
        self.clips().any(|clip| clip.key().as_ref() == Some(key))
    }
}

/// Cut `duration` after `left`, returning halves whose sum is exactly `duration`.
///
/// The larger half is taken as computed and the smaller one is its exact
/// remainder: subtracting a value at least half of `duration` never rounds.
fn split_span(duration: f64, left: f64) -> (f64, f64) {
    if left >= duration / 2.0 {
        (left, duration - left)
    } else {
        let right = duration - left;
        (duration - right, right)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(name: &str) -> MediaSource {
        MediaSource::from_url(format!("https://cdn.example.com/{name}.mp3"))
    }

    fn two_tracks() -> Timeline {
        let mut timeline = Timeline::new();
        timeline.add_track(Track::new(TrackId(1), "Drums", TRACK_COLORS[0]));
        timeline.add_track(Track::new(TrackId(2), "Bass", TRACK_COLORS[1]));
        timeline.add_clip(TrackId(1), Clip::new(ClipId(10), TrackId(1), url("a"), "A").with_duration(5.0));
        timeline.add_clip(
            TrackId(1),
            Clip::new(ClipId(11), TrackId(1), url("b"), "B").with_start_time(5.0).with_duration(3.0),
        );
        timeline
    }

    #[test]
    fn first_match_wins_for_overlaps() {
        let mut timeline = two_tracks();
        timeline.add_clip(
            TrackId(1),
            Clip::new(ClipId(12), TrackId(1), url("c"), "C").with_start_time(4.0).with_duration(4.0),
        );
        let track = timeline.track(TrackId(1)).unwrap();
        assert_eq!(track.active_clip(4.5).map(|c| c.id), Some(ClipId(10)));
        assert_eq!(track.active_clip(5.0).map(|c| c.id), Some(ClipId(11)));
        assert_eq!(track.active_clip(8.0), None);
    }

    #[test]
    fn resize_clamps() {
        let mut timeline = two_tracks();
        assert!(timeline.resize_clip(ClipId(10), 0.0, -3.0, Some(-1.0)));
        let (_, clip) = timeline.find_clip(ClipId(10)).unwrap();
        assert_eq!(clip.duration, MIN_CLIP_DURATION);
        assert_eq!(clip.offset, 0.0);
        assert_eq!(clip.start_time, 0.0);
    }

    #[test]
    fn move_clamps_to_zero() {
        let mut timeline = two_tracks();
        assert!(timeline.move_clip(ClipId(11), -2.0));
        assert_eq!(timeline.find_clip(ClipId(11)).unwrap().1.start_time, 0.0);
        assert!(!timeline.move_clip(ClipId(99), 1.0));
    }

    #[test]
    fn split_preserves_coverage() {
        let mut timeline = two_tracks();
        timeline.resize_clip(ClipId(10), 5.0, 1.5, None);
        assert!(timeline.split_clip(ClipId(10), 2.0, ClipId(20)));

        let track = timeline.track(TrackId(1)).unwrap();
        let (left, right) = (&track.clips[0], &track.clips[1]);
        assert_eq!(left.duration + right.duration, 5.0);
        assert_eq!(right.offset, left.offset + left.duration);
        assert_eq!(right.start_time, 2.0);
        assert_eq!(right.name, "A (part 2)");
        assert_eq!(right.id, ClipId(20));
        assert_eq!(track.clips[2].id, ClipId(11));
    }

    fn one_clip(start: f64, duration: f64) -> Timeline {
        let mut timeline = Timeline::new();
        timeline.add_track(Track::new(TrackId(1), "Keys", TRACK_COLORS[0]));
        let clip = Clip::new(ClipId(10), TrackId(1), url("k"), "K").with_start_time(start).with_duration(duration);
        timeline.add_clip(TrackId(1), clip);
        timeline
    }

    #[test]
    fn split_halves_sum_exactly_for_decimal_times() {
        let mut timeline = one_clip(0.3, 0.9);
        assert!(timeline.split_clip(ClipId(10), 0.5, ClipId(20)));

        let track = timeline.track(TrackId(1)).unwrap();
        assert_eq!(track.clips[0].duration + track.clips[1].duration, 0.9);
        assert_eq!(track.clips[1].start_time, 0.5);
    }

    proptest::proptest! {
        #[test]
        fn split_halves_always_sum_to_the_original(
            start in 0.0f64..600.0,
            duration in 0.2f64..300.0,
            fraction in 0.0f64..1.0,
        ) {
            let mut timeline = one_clip(start, duration);
            let at = start + duration * fraction;
            if timeline.split_clip(ClipId(10), at, ClipId(20)) {
                let track = timeline.track(TrackId(1)).unwrap();
                let (left, right) = (&track.clips[0], &track.clips[1]);
                proptest::prop_assert_eq!(left.duration + right.duration, duration);
                proptest::prop_assert_eq!(right.offset, left.offset + left.duration);
                proptest::prop_assert!(left.duration >= MIN_CLIP_DURATION);
                proptest::prop_assert!(right.duration >= MIN_CLIP_DURATION);
            }
        }
    }

    #[test]
    fn split_outside_is_a_no_op() {
        let mut timeline = two_tracks();
        let before = timeline.clone();
        for at in [-1.0, 0.0, 5.0, 7.0] {
            assert!(!timeline.split_clip(ClipId(10), at, ClipId(20)));
        }
        assert_eq!(timeline, before);
    }

    #[test]
    fn move_to_track_is_atomic() {
        let mut timeline = two_tracks();
        assert!(!timeline.move_clip_to_track(ClipId(10), TrackId(1), None));
        assert!(!timeline.move_clip_to_track(ClipId(10), TrackId(9), None));
        assert!(timeline.move_clip_to_track(ClipId(10), TrackId(2), Some(3.0)));

        assert!(timeline.track(TrackId(1)).unwrap().clip(ClipId(10)).is_none());
        let (track, clip) = timeline.find_clip(ClipId(10)).unwrap();
        assert_eq!(track.id, TrackId(2));
        assert_eq!(clip.track_id, TrackId(2));
        assert_eq!(clip.start_time, 3.0);
    }

    #[test]
    fn reorder_clamps_index() {
        let mut timeline = two_tracks();
        assert!(timeline.reorder_track(TrackId(1), 40));
        assert_eq!(timeline.track_at(1).unwrap().id, TrackId(1));
        assert!(!timeline.reorder_track(TrackId(1), 1));
    }

    #[test]
    fn edits_copy_only_the_touched_track() {
        let mut timeline = two_tracks();
        let snapshot = timeline.clone();
        timeline.move_clip(ClipId(10), 1.0);

        assert!(timeline.shares_track(&snapshot, TrackId(2)));
        assert!(!timeline.shares_track(&snapshot, TrackId(1)));
        assert_eq!(snapshot.find_clip(ClipId(10)).unwrap().1.start_time, 0.0);
    }

    #[test]
    fn pending_durations_resolve_once() {
        let mut timeline = two_tracks();
        timeline.add_clip(TrackId(2), Clip::new(ClipId(30), TrackId(2), url("c"), "C"));
        let key = url("c").key().unwrap();

        assert_eq!(timeline.find_clip(ClipId(30)).unwrap().1.duration, PLACEHOLDER_DURATION);
        assert_eq!(timeline.resolve_duration(&key, 12.5), 1);
        assert_eq!(timeline.find_clip(ClipId(30)).unwrap().1.duration, 12.5);
        assert_eq!(timeline.resolve_duration(&key, 99.0), 0);
    }

    #[test]
    fn patch_clamps_mix_fields() {
        let mut timeline = two_tracks();
        let patch = TrackPatch { volume: Some(9.0), pan: Some(-4.0), ..TrackPatch::default() };
        assert!(timeline.patch_track(TrackId(2), &patch, 2.0));
        let track = timeline.track(TrackId(2)).unwrap();
        assert_eq!((track.volume, track.pan), (2.0, -1.0));
        assert_eq!(timeline.duration(), 8.0);
    }
}
