//! Shared buffer, peak and blob caches

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::{Condvar, Mutex, RwLock};

use crate::config::MediaConfig;
use crate::error::{MediaError, MediaResult};
use crate::media::fetch::{route_url, Fetcher};
use crate::media::{compute_peaks, decode, AudioBuffer, Blob, MediaSource, SourceKey};

type Shared = MediaResult<Arc<AudioBuffer>>;

/// A decode in progress; later callers for the same key wait on it
#[derive(Default)]
struct InFlight {
    result: Mutex<Option<Shared>>,
    ready: Condvar,
    /// Set when the key is released mid-load; the result is then not kept
    released: AtomicBool,
}

impl InFlight {
    fn wait(&self) -> Shared {
        let mut result = self.result.lock();
        loop {
            if let Some(result) = result.as_ref() {
                return result.clone();
            }
            self.ready.wait(&mut result);
        }
    }

    fn finish(&self, outcome: Shared) {
        *self.result.lock() = Some(outcome);
        self.ready.notify_all();
    }
}

/// Decoded audio and peak envelopes keyed by [`SourceKey`].
///
/// One cache belongs to one engine and is shared by `Arc` with its probe
/// workers. Entries live as long as the cache, except in-memory-only sources
/// which are [released](Self::release) once no clip references them.
/// Failures are never cached.
pub struct MediaCache {
    config: MediaConfig,
    fetcher: Arc<dyn Fetcher>,
    buffers: RwLock<HashMap<SourceKey, Arc<AudioBuffer>>>,
    peaks: RwLock<HashMap<(SourceKey, usize), Arc<[f32]>>>,
    blobs: RwLock<HashMap<SourceKey, Blob>>,
    in_flight: Mutex<HashMap<SourceKey, Arc<InFlight>>>,
    loads: AtomicUsize,
}

impl MediaCache {
    pub fn new(config: MediaConfig, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            config,
            fetcher,
            buffers: RwLock::new(HashMap::new()),
            peaks: RwLock::new(HashMap::new()),
            blobs: RwLock::new(HashMap::new()),
            in_flight: Mutex::new(HashMap::new()),
            loads: AtomicUsize::new(0),
        }
    }

    pub fn config(&self) -> &MediaConfig {
        &self.config
    }

    /// Remember the blob behind `key` so later loads can skip the network
    pub fn register_blob(&self, key: SourceKey, blob: Blob) {
        self.blobs.write().entry(key).or_insert(blob);
    }

    /// The cached buffer for `key`, without loading
    pub fn try_get(&self, key: &SourceKey) -> Option<Arc<AudioBuffer>> {
        self.buffers.read().get(key).cloned()
    }

    pub fn is_loading(&self, key: &SourceKey) -> bool {
        self.in_flight.lock().contains_key(key)
    }

    /// Number of fetch+decode passes actually performed
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::Relaxed)
    }

    /// The decoded buffer for `source`, loading it if needed.
    ///
    /// Blocks the calling thread for the duration of the load. Concurrent
    /// calls for one key share a single load and its result.
    pub fn ensure_buffer(&self, source: &MediaSource) -> MediaResult<Arc<AudioBuffer>> {
        let key = source
            .key()
            .ok_or_else(|| MediaError::fetch("<empty source>", "source has neither blob nor url"))?;

        if let Some(blob) = &source.blob {
            self.register_blob(key.clone(), blob.clone());
        }
        if let Some(buffer) = self.try_get(&key) {
            return Ok(buffer);
        }

        let (pending, leader) = {
            let mut in_flight = self.in_flight.lock();
            // checked again under the lock: a leader may have finished meanwhile
            if let Some(buffer) = self.try_get(&key) {
                return Ok(buffer);
            }
            match in_flight.get(&key) {
                Some(pending) => (pending.clone(), false),
                None => {
                    let pending = Arc::new(InFlight::default());
                    in_flight.insert(key.clone(), pending.clone());
                    (pending, true)
                }
            }
        };

        if !leader {
            tracing::debug!(%key, "joining in-flight load");
            return pending.wait();
        }

        let outcome = self.load(&key, source).map(Arc::new);
        {
            let mut in_flight = self.in_flight.lock();
            match &outcome {
                Ok(_) if pending.released.load(Ordering::Acquire) => {
                    tracing::debug!(%key, "released while loading, not cached");
                }
                Ok(buffer) => {
                    tracing::debug!(%key, frames = buffer.frames(), rate = buffer.sample_rate(), "decoded");
                    self.buffers.write().insert(key.clone(), buffer.clone());
                }
                Err(err) => tracing::warn!(%key, %err, "media load failed"),
            }
            in_flight.remove(&key);
        }
        pending.finish(outcome.clone());
        outcome
    }

    fn load(&self, key: &SourceKey, source: &MediaSource) -> MediaResult<AudioBuffer> {
        self.loads.fetch_add(1, Ordering::Relaxed);
        let label = key.to_string();

        let blob = source.blob.clone().or_else(|| self.blobs.read().get(key).cloned());
        if let Some(blob) = blob {
            return decode(blob.bytes().to_vec(), blob.name(), &label);
        }

        let Some(url) = source.url.as_deref() else {
            return Err(MediaError::fetch(&label, "source has neither blob nor url"));
        };
        let routed = route_url(url, &self.config);
        let bytes = self.fetcher.fetch(&routed).map_err(|err| match err {
            // report against the clip's url, not the proxy's
            MediaError::Fetch { reason, .. } => MediaError::fetch(&label, reason),
            other => other,
        })?;
        decode(bytes, url, &label)
    }

    /// Peak envelope of the first channel in `sample_count` buckets; cached per count
    pub fn peaks(&self, source: &MediaSource, sample_count: usize) -> MediaResult<Arc<[f32]>> {
        let key = source
            .key()
            .ok_or_else(|| MediaError::fetch("<empty source>", "source has neither blob nor url"))?;
        if let Some(peaks) = self.peaks.read().get(&(key.clone(), sample_count)) {
            return Ok(peaks.clone());
        }

        let buffer = self.ensure_buffer(source)?;
        let peaks: Arc<[f32]> = compute_peaks(&buffer, sample_count).into();
        Ok(self
            .peaks
            .write()
            .entry((key, sample_count))
            .or_insert(peaks)
            .clone())
    }

    /// Drop the buffer, peaks and blob of `key`.
    ///
    /// A load of `key` still in progress completes for its callers but its
    /// result is not cached.
    pub fn release(&self, key: &SourceKey) {
        if let Some(pending) = self.in_flight.lock().get(key) {
            pending.released.store(true, Ordering::Release);
        }
        let had_buffer = self.buffers.write().remove(key).is_some();
        self.peaks.write().retain(|(k, _), _| k != key);
        self.blobs.write().remove(key);
        tracing::debug!(%key, had_buffer, "released media");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wav_bytes(frames: usize) -> Vec<u8> {
        crate::media::testing::wav_bytes(8000, frames, 8192)
    }

    fn cache() -> MediaCache {
        MediaCache::new(MediaConfig::default(), Arc::new(crate::media::OfflineFetcher))
    }

    #[test]
    fn blob_sources_decode_and_cache() {
        let cache = cache();
        let source = MediaSource::from_blob(Blob::new("take.wav", wav_bytes(8000)));

        let first = cache.ensure_buffer(&source).unwrap();
        let second = cache.ensure_buffer(&source).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.load_count(), 1);
        assert_eq!(first.frames(), 8000);
        assert!((first.duration() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn failures_are_not_cached() {
        let cache = cache();
        let source = MediaSource::from_url("https://cdn.example.com/missing.mp3");

        assert!(matches!(cache.ensure_buffer(&source), Err(MediaError::Fetch { .. })));
        assert!(cache.ensure_buffer(&source).is_err());
        assert_eq!(cache.load_count(), 2);
        assert!(cache.try_get(&source.key().unwrap()).is_none());
    }

    #[test]
    fn peaks_are_cached_per_count() {
        let cache = cache();
        let source = MediaSource::from_blob(Blob::new("take.wav", wav_bytes(1234)));

        let a = cache.peaks(&source, 300).unwrap();
        let b = cache.peaks(&source, 300).unwrap();
        assert_eq!(a.len(), 300);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.peaks(&source, 17).unwrap().len(), 17);
        assert!(a.iter().all(|&p| (p - 0.25).abs() < 1e-3));
    }

    #[test]
    fn release_forgets_everything() {
        let cache = cache();
        let source = MediaSource::from_blob(Blob::new("take.wav", wav_bytes(100)));
        let key = source.key().unwrap();
        cache.peaks(&source, 10).unwrap();

        cache.release(&key);
        assert!(cache.try_get(&key).is_none());
        assert!(!cache.is_loading(&key));

        cache.peaks(&source, 10).unwrap();
        assert_eq!(cache.load_count(), 2);
    }

    #[test]
    fn release_during_a_load_keeps_the_result_out() {
        let (started_tx, started_rx) = crossbeam_channel::bounded(1);
        let (gate_tx, gate_rx) = crossbeam_channel::bounded::<()>(0);
        let bytes = wav_bytes(100);
        let fetch = move |_: &str| -> MediaResult<Vec<u8>> {
            let _ = started_tx.send(());
            let _ = gate_rx.recv();
            Ok(bytes.clone())
        };
        let cache = Arc::new(MediaCache::new(MediaConfig::default(), Arc::new(fetch)));
        let source = MediaSource::from_url("https://cdn.example.com/take.wav");
        let key = source.key().unwrap();

        let loader = {
            let cache = cache.clone();
            let source = source.clone();
            std::thread::spawn(move || cache.ensure_buffer(&source))
        };
        started_rx.recv().unwrap();
        cache.release(&key);
        drop(gate_tx);

        assert_eq!(loader.join().unwrap().unwrap().frames(), 100);
        assert!(cache.try_get(&key).is_none());
        assert!(!cache.is_loading(&key));
    }
}
