mod common;

use common::{approx, config, wav_blob, Rig, RATE};
use mehrspur::{
    ClipId, Engine, EngineError, EngineResult, Lifecycle, MediaSource, Notification, OpenedOutput, OutputProvider,
    RingBufferOutput, TrackId,
};

/// Two tracks: A [0,5) at 0.5 and B [5,8) at 0.25 on the first, all decoded
fn two_clip_rig() -> (Rig, TrackId, ClipId, ClipId) {
    let mut rig = Rig::ready(config());
    let track = rig.engine.add_empty_track();
    let a = MediaSource::from_blob(wav_blob("a.wav", 10.0, 0.5));
    let b = MediaSource::from_blob(wav_blob("b.wav", 10.0, 0.25));
    let clip_a = rig.engine.add_clip_to_track(track, a, "A", 0.0, Some(5.0)).unwrap();
    let clip_b = rig.engine.add_clip_to_track(track, b, "B", 5.0, Some(3.0)).unwrap();
    rig.engine.settle_media();
    (rig, track, clip_a, clip_b)
}

#[test]
fn start_mid_clip_reads_from_the_elapsed_offset() {
    let (mut rig, _, a, b) = two_clip_rig();
    rig.engine.set_current_time(3.0);
    rig.engine.set_playing(true);
    assert!(rig.engine.is_playing());

    let now = rig.engine.mixing().unwrap().frame();
    let voice_a = rig.engine.scheduler().voice_for_clip(a).unwrap().clone();
    assert_eq!(voice_a.start_frame, now);
    assert!((voice_a.read_offset - 3.0).abs() < 1e-9);
    assert!((voice_a.remaining - 2.0).abs() < 1e-9);

    let voice_b = rig.engine.scheduler().voice_for_clip(b).unwrap();
    assert_eq!(voice_b.start_frame, now + 2 * RATE as u64);

    let left = rig.render_seconds(2.5);
    assert!(approx(left[1_000], 0.5));
    assert!(approx(left[2_200], 0.25));
    assert!((rig.engine.current_time() - (3.0 + left.len() as f64 / RATE as f64)).abs() < 1e-9);
}

#[test]
fn solo_silences_the_other_track() {
    let mut rig = Rig::ready(config());
    let one = rig.engine.add_empty_track();
    let two = rig.engine.add_empty_track();
    rig.engine.add_clip_to_track(one, MediaSource::from_blob(wav_blob("1.wav", 2.0, 0.5)), "1", 0.0, Some(2.0));
    rig.engine.add_clip_to_track(two, MediaSource::from_blob(wav_blob("2.wav", 2.0, 0.25)), "2", 0.0, Some(2.0));
    rig.engine.settle_media();

    rig.engine.toggle_solo(one);
    rig.engine.set_playing(true);

    let mixing = rig.engine.mixing().unwrap();
    assert_eq!(mixing.track_gain(one), Some(1.0));
    assert_eq!(mixing.track_gain(two), Some(0.0));

    let left = rig.render(4);
    assert!(approx(left[100], 0.5));

    // un-solo while playing: both audible, no reschedule
    let mut voices_before: Vec<_> = rig.engine.scheduler().voices().map(|v| v.voice).collect();
    rig.engine.toggle_solo(one);
    let left = rig.render(2);
    assert!(approx(left[100], 0.75));
    let mut voices_after: Vec<_> = rig.engine.scheduler().voices().map(|v| v.voice).collect();
    voices_before.sort_by_key(|v| v.0);
    voices_after.sort_by_key(|v| v.0);
    assert_eq!(voices_before, voices_after);
}

#[test]
fn mute_and_volume_apply_live() {
    let (mut rig, track, _, _) = two_clip_rig();
    rig.engine.set_playing(true);
    rig.render(2);

    rig.engine.set_track_volume(track, 0.5);
    assert!(approx(rig.render(2)[10], 0.25));
    rig.engine.toggle_mute(track);
    assert!(rig.render(2).iter().all(|s| s.abs() < 1e-6));
    assert!(rig.engine.is_playing());
}

#[test]
fn master_volume_scales_the_mix() {
    let (mut rig, _, _, _) = two_clip_rig();
    rig.engine.set_playing(true);
    rig.engine.set_master_volume(0.5);
    assert!(approx(rig.render(2)[10], 0.25));
    assert_eq!(rig.engine.master_volume(), 0.5);
}

#[test]
fn structural_edit_while_playing_resumes_at_the_same_time() {
    let (mut rig, _, a, _) = two_clip_rig();
    rig.engine.set_playing(true);
    rig.render(10);

    let before = rig.engine.current_time();
    let old_voice = rig.engine.scheduler().voice_for_clip(a).unwrap().voice;
    rig.engine.move_clip(a, 0.5);

    assert!(rig.engine.is_playing());
    assert!((rig.engine.current_time() - before).abs() < 1e-9);
    let new_voice = rig.engine.scheduler().voice_for_clip(a).unwrap();
    assert_ne!(new_voice.voice, old_voice);
    assert!((new_voice.read_offset - (before - 0.5)).abs() < 1e-9);
}

#[test]
fn playing_an_empty_timeline_is_refused() {
    let mut rig = Rig::ready(config());
    rig.engine.add_empty_track();
    rig.engine.set_playing(true);

    assert!(!rig.engine.is_playing());
    assert!(matches!(rig.engine.take_notifications().as_slice(), [Notification::Info(_)]));
}

#[test]
fn skip_stops_by_default() {
    let (mut rig, _, _, _) = two_clip_rig();
    rig.engine.set_playing(true);
    rig.render(4);
    let at = rig.engine.current_time();

    rig.engine.skip_forward(10.0);
    assert!(!rig.engine.is_playing());
    assert!((rig.engine.current_time() - (at + 10.0)).abs() < 1e-9);

    rig.engine.skip_backward(100.0);
    assert_eq!(rig.engine.current_time(), 0.0);
}

#[test]
fn skip_can_resume_at_the_new_position() {
    let mut rig = Rig::ready(config().resume_after_skip(true));
    let track = rig.engine.add_empty_track();
    let clip = rig
        .engine
        .add_clip_to_track(track, MediaSource::from_blob(wav_blob("a.wav", 30.0, 0.5)), "A", 0.0, Some(30.0))
        .unwrap();
    rig.engine.settle_media();

    rig.engine.set_playing(true);
    rig.engine.skip_forward(10.0);
    assert!(rig.engine.is_playing());
    let voice = rig.engine.scheduler().voice_for_clip(clip).unwrap();
    assert!((voice.read_offset - 10.0).abs() < 1e-9);
}

#[test]
fn stop_silences_and_freezes_the_clock() {
    let (mut rig, _, _, _) = two_clip_rig();
    rig.engine.set_playing(true);
    rig.render(4);
    rig.engine.set_playing(false);
    rig.engine.set_playing(false);

    let at = rig.engine.current_time();
    assert!(rig.render(4).iter().all(|s| s.abs() < 1e-6));
    assert_eq!(rig.engine.current_time(), at);
    assert_eq!(rig.engine.scheduler().voices().count(), 0);
}

#[test]
fn looping_track_keeps_sounding_past_the_clip_end() {
    let mut rig = Rig::ready(config());
    let track = rig.engine.add_empty_track();
    rig.engine.add_clip_to_track(track, MediaSource::from_blob(wav_blob("l.wav", 2.0, 0.5)), "L", 0.0, Some(0.5));
    rig.engine.settle_media();

    assert!(rig.engine.toggle_track_loop(track));
    assert!(rig.engine.is_track_looping(track));
    assert_eq!(rig.engine.state().looping_tracks, vec![track]);
    rig.engine.set_playing(true);

    let left = rig.render_seconds(1.5);
    assert!(approx(left[1_200], 0.5));
    assert_eq!(rig.engine.scheduler().voices().count(), 1);

    assert!(!rig.engine.toggle_track_loop(track));
    let left = rig.render_seconds(1.0);
    assert!(left[left.len() - 1].abs() < 1e-6);
}

#[test]
fn more_clips_than_the_player_queue_all_play_after_an_edit() {
    let mut rig = Rig::ready(config());
    let track = rig.engine.add_empty_track();
    let tick = wav_blob("tick.wav", 0.1, 0.5);
    let clips: Vec<ClipId> = (0..1100)
        .filter_map(|i| {
            let source = MediaSource::from_blob(tick.clone());
            rig.engine.add_clip_to_track(track, source, "tick", i as f64 * 0.1, Some(0.1))
        })
        .collect();
    assert_eq!(clips.len(), 1100);
    rig.engine.settle_media();

    rig.engine.set_playing(true);
    // restructure before the render path has drained a single start
    rig.engine.move_clip(clips[0], 120.0);
    assert!(rig.engine.is_playing());

    let left = rig.render_seconds(1.0);
    assert!(left[..100].iter().all(|s| s.abs() < 1e-6));
    // one clip at a time: nothing from the first session is doubled on top
    assert!(left[100..].iter().all(|&s| approx(s, 0.5)));

    let scheduler = rig.engine.scheduler();
    assert_eq!(scheduler.pending_count(), 0);
    assert!(scheduler.voice_for_clip(clips[1099]).is_some());
    assert!(scheduler.voice_for_clip(clips[0]).is_some());
}

#[test]
fn removing_a_track_during_playback_removes_its_strip() {
    let (mut rig, track, _, _) = two_clip_rig();
    let other = rig.engine.add_empty_track();
    rig.engine.set_playing(true);
    rig.render(2);

    let nodes = rig.engine.mixing().unwrap().node_count();
    rig.engine.remove_track(track);
    assert!(!rig.engine.mixing().unwrap().has_strip(track));
    assert_eq!(rig.engine.mixing().unwrap().node_count(), nodes - 3);
    assert!(rig.engine.mixing().unwrap().has_strip(other));
    // nothing left to play
    assert!(!rig.engine.is_playing());
}

#[test]
fn start_before_activation_is_deferred() {
    common::init_tracing();
    let mut engine = Engine::new(config());
    let track = engine.add_empty_track();
    engine.add_clip_to_track(track, MediaSource::from_blob(wav_blob("a.wav", 2.0, 0.5)), "A", 0.0, Some(2.0));
    engine.settle_media();

    let (output, _audio) = RingBufferOutput::stereo(RATE, 4096);
    engine.initialize(output);
    engine.set_playing(true);
    assert!(!engine.is_playing());
    assert_eq!(engine.lifecycle(), Lifecycle::AwaitingActivation);

    engine.signal_activation().unwrap();
    assert_eq!(engine.lifecycle(), Lifecycle::Ready);
    assert!(engine.is_playing());
}

struct Unavailable;

impl OutputProvider for Unavailable {
    fn open(&mut self) -> EngineResult<OpenedOutput> {
        Err(EngineError::ContextUnavailable("device busy".into()))
    }
}

#[test]
fn failed_activation_is_fatal_for_a_deferred_start() {
    let mut engine = Engine::new(config());
    let track = engine.add_empty_track();
    engine.add_clip_to_track(track, MediaSource::from_blob(wav_blob("a.wav", 1.0, 0.5)), "A", 0.0, Some(1.0));
    engine.settle_media();

    assert!(engine.signal_activation().is_err());

    engine.initialize(Unavailable);
    engine.set_playing(true);
    assert!(matches!(engine.signal_activation(), Err(EngineError::ContextUnavailable(_))));
    assert!(!engine.is_playing());
    let notes = engine.take_notifications();
    assert!(notes.iter().any(|n| matches!(n, Notification::Fatal(EngineError::ContextUnavailable(_)))));

    // retried exactly once: a second failure is not another fatal start
    assert!(engine.signal_activation().is_err());
    assert!(engine.take_notifications().is_empty());
}

#[test]
fn clips_without_audio_are_skipped_and_reported() {
    let mut rig = Rig::ready(config());
    let good = rig.engine.add_empty_track();
    let bad = rig.engine.add_empty_track();
    rig.engine.add_clip_to_track(good, MediaSource::from_blob(wav_blob("a.wav", 2.0, 0.5)), "A", 0.0, Some(2.0));
    let missing = rig
        .engine
        .add_clip_to_track(bad, MediaSource::from_url("https://cdn.example.com/gone.mp3"), "Gone", 0.0, Some(2.0))
        .unwrap();
    rig.engine.settle_media();

    let failures: Vec<_> = rig
        .engine
        .take_notifications()
        .into_iter()
        .filter_map(|n| match n {
            Notification::MediaFailed { clips, .. } => Some(clips),
            _ => None,
        })
        .collect();
    assert_eq!(failures, vec![vec![missing]]);

    rig.engine.set_playing(true);
    assert!(rig.engine.scheduler().was_skipped(missing));
    assert!(approx(rig.render(2)[10], 0.5));
}
