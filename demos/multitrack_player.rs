//! Plays audio files side by side, one track each
//!
//! Run with: cargo run --example multitrack_player --features cpal_sink -- drums.wav bass.ogg
//!
//! Set `MEHRSPUR_DEVICE` to part of a device name to play somewhere other than the default.

use std::thread::sleep;
use std::time::{Duration, Instant};

use mehrspur::{Blob, CpalDevice, CpalOutput, Engine, EngineConfig, MediaSource, Notification};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_max_level(tracing::Level::INFO).init();

    let paths: Vec<String> = std::env::args().skip(1).collect();
    if paths.is_empty() {
        return Err("usage: multitrack_player <file>...".into());
    }

    let mut engine = Engine::new(EngineConfig::default());
    for path in &paths {
        let name = std::path::Path::new(path)
            .file_name()
            .map_or(path.clone(), |n| n.to_string_lossy().into_owned());
        let blob = Blob::new(name.as_str(), std::fs::read(path)?);
        engine.add_track(&name, Some(MediaSource::from_blob(blob)), None, None);
    }
    engine.settle_media();

    let output = match std::env::var("MEHRSPUR_DEVICE") {
        Ok(pattern) => CpalOutput::with_device(CpalDevice::find_output(&pattern).ok_or("no such device")?),
        Err(_) => CpalOutput::new(),
    };
    engine.initialize(output);
    engine.signal_activation()?;
    engine.set_playing(true);

    for note in engine.take_notifications() {
        match note {
            Notification::MediaFailed { key, error, .. } => eprintln!("{key}: {error}"),
            other => eprintln!("{other:?}"),
        }
    }

    let duration = engine.duration();
    println!("Playing {} tracks, {duration:.1}s... Ctrl+C to stop", paths.len());

    let start = Instant::now();
    let rate = engine.mixing().map_or(48_000, |m| m.sample_rate()) as f64;
    let mut blocks = 0u64;

    while engine.current_time() < duration {
        let target = (start.elapsed().as_secs_f64() * rate / 64.0) as u64 + 6; // 6 blocks buffer
        while blocks < target {
            engine.process();
            blocks += 1;
        }
        sleep(Duration::from_micros(500));
    }
    // let the device drain
    sleep(Duration::from_millis(200));
    Ok(())
}
