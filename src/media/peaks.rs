//! Downsampled peak envelopes for waveform display

use crate::media::AudioBuffer;

/// Reduce the first channel of `buffer` into `count` buckets of max |sample|.
///
/// Bucket `i` covers frames `[i * len / count, (i + 1) * len / count)` and
/// always spans at least one frame when the buffer is not empty, so short
/// buffers repeat frames rather than produce empty buckets.
pub fn compute_peaks(buffer: &AudioBuffer, count: usize) -> Vec<f32> {
    let data = buffer.channel(0).unwrap_or(&[]);
    let len = data.len();
    if len == 0 {
        return vec![0.0; count];
    }

    (0..count)
        .map(|i| {
            let start = (i * len / count).min(len - 1);
            let end = ((i + 1) * len / count).clamp(start + 1, len);
            data[start..end].iter().fold(0.0f32, |peak, s| peak.max(s.abs()))
        })
        .collect()
}
