//! Source audio: references, decoding, fetching and the shared caches.

mod buffer;
mod cache;
mod decode;
mod fetch;
mod peaks;
mod source;

pub use buffer::AudioBuffer;
pub use cache::MediaCache;
pub use decode::decode;
pub use fetch::{route_url, Fetcher, OfflineFetcher};
pub use peaks::compute_peaks;
pub use source::{Blob, BlobId, MediaSource, SourceKey};

#[cfg(feature = "http_fetch")]
pub use fetch::HttpFetcher;
