//! Symphonia decoding into planar buffers

use std::io::Cursor;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::error::{MediaError, MediaResult};
use crate::media::AudioBuffer;

/// Extension of the last path segment, ignoring any query string
fn extension_hint(name: &str) -> Option<&str> {
    let path = name.split(['?', '#']).next().unwrap_or(name);
    let file = path.rsplit('/').next().unwrap_or(path);
    let (_, ext) = file.rsplit_once('.')?;
    (!ext.is_empty() && ext.len() <= 5).then_some(ext)
}

/// Decode a complete encoded file.
///
/// `key` names the source in errors, `name` (file name or URL) feeds the
/// format hint.
pub fn decode(bytes: Vec<u8>, name: &str, key: &str) -> MediaResult<AudioBuffer> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = extension_hint(name) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| MediaError::decode(key, format!("unrecognised format: {e}")))?;

    let mut format = probed.format;
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| MediaError::decode(key, "no audio track"))?;

    let track_id = track.id;
    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| MediaError::decode(key, format!("unsupported codec: {e}")))?;

    let mut sample_rate = track.codec_params.sample_rate;
    let mut channel_count = track.codec_params.channels.map(|c| c.count());
    let mut interleaved: Vec<f32> = Vec::new();
    let mut scratch: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(MediaError::decode(key, e)),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            // a corrupt packet is skipped, not fatal
            Err(SymphoniaError::DecodeError(reason)) => {
                tracing::debug!(key, reason, "skipping undecodable packet");
                continue;
            }
            Err(e) => return Err(MediaError::decode(key, e)),
        };

        let spec = *decoded.spec();
        sample_rate.get_or_insert(spec.rate);
        channel_count.get_or_insert(spec.channels.count());

        let frames = decoded.capacity();
        let needed = frames * spec.channels.count();
        if scratch.as_ref().map_or(true, |buf| buf.capacity() < needed) {
            scratch = Some(SampleBuffer::new(frames as u64, spec));
        }
        if let Some(buf) = scratch.as_mut() {
            buf.copy_interleaved_ref(decoded);
            interleaved.extend_from_slice(buf.samples());
        }
    }

    let (Some(sample_rate), Some(channel_count)) = (sample_rate, channel_count) else {
        return Err(MediaError::decode(key, "stream carries no audio parameters"));
    };
    if interleaved.is_empty() {
        return Err(MediaError::decode(key, "stream decoded to no audio"));
    }

    Ok(AudioBuffer::from_interleaved(sample_rate, channel_count, &interleaved))
}
