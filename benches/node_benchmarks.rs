use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use dasp_graph::Buffer;
use mehrspur::nodes::{ClipPlayer, PlayerMessage, Voice, VoiceId};
use mehrspur::{AudioBuffer, AudioNode, ClipId, Engine, EngineConfig, ProcessContext, RingBufferOutput};

fn noise(frames: usize) -> Vec<f32> {
    let mut state = 0x1234_5678u32;
    (0..frames)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            state as f32 / u32::MAX as f32 * 2.0 - 1.0
        })
        .collect()
}

pub fn criterion_benchmark(c: &mut Criterion) {
    c.bench_function("ClipPlayer.process() 4 voices", |b| {
        let buffer = Arc::new(AudioBuffer::new(44_100, vec![noise(441_000), noise(441_000)]));
        let (events, _rx) = rtrb::RingBuffer::new(64);
        let mut player = ClipPlayer::new(events);
        let mut out = [Buffer::default(), Buffer::default()];

        let start: Vec<PlayerMessage> = (0..4)
            .map(|i| {
                PlayerMessage::Start(Box::new(Voice {
                    id: VoiceId(i),
                    clip_id: ClipId(i),
                    buffer: buffer.clone(),
                    start_frame: 0,
                    read_offset: i as f64,
                    source_start: 0.0,
                    source_end: 10.0,
                    looping: true,
                    epoch: 0,
                }))
            })
            .collect();
        let mut ctx = ProcessContext { sample_rate: 48_000, buffer_size: 64, frame: 0 };
        player.process(&ctx, start.into_iter(), &[], &mut out);

        b.iter(|| {
            ctx.frame += 64;
            player.process(&ctx, std::iter::empty(), &[], &mut out);
            black_box(&out);
        })
    });

    c.bench_function("Engine.process() 8 tracks", |b| {
        let (output, mut audio) = RingBufferOutput::stereo(48_000, 4096);
        let mut engine = Engine::new(EngineConfig::default());
        engine.initialize(output);
        let _ = engine.signal_activation();

        let source = mehrspur::MediaSource::from_blob(mehrspur::Blob::new("noise.wav", wav(&noise(480_000))));
        for i in 0..8 {
            let track = engine.add_empty_track();
            engine.add_clip_to_track(track, source.clone(), "noise", 0.0, Some(10.0));
            engine.set_track_pan(track, i as f32 / 4.0 - 1.0);
        }
        engine.settle_media();
        for track in engine.tracks().map(|t| t.id).collect::<Vec<_>>() {
            engine.toggle_track_loop(track);
        }
        engine.set_playing(true);

        b.iter(|| {
            engine.process();
            while audio.pop().is_ok() {}
        })
    });
}

fn wav(samples: &[f32]) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 48_000,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut bytes = Vec::new();
    let mut writer = hound::WavWriter::new(std::io::Cursor::new(&mut bytes), spec).unwrap();
    for &s in samples {
        writer.write_sample(s).unwrap();
    }
    writer.finalize().unwrap();
    bytes
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
