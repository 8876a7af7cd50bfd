//! Source references for clips

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Identity of an in-memory blob
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, PartialOrd, Ord)]
pub struct BlobId(pub u64);

static NEXT_BLOB: AtomicU64 = AtomicU64::new(1);

/// Encoded audio bytes held in memory (an uploaded or recorded file)
#[derive(Clone)]
pub struct Blob {
    id: BlobId,
    name: Arc<str>,
    bytes: Arc<[u8]>,
}

impl Blob {
    pub fn new(name: impl Into<Arc<str>>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            id: BlobId(NEXT_BLOB.fetch_add(1, Ordering::Relaxed)),
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    #[inline]
    pub fn id(&self) -> BlobId {
        self.id
    }

    /// File name, used as a format hint when decoding
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Debug for Blob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Blob")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl PartialEq for Blob {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

/// Where a clip's audio comes from: a URL, an in-memory blob, or both.
///
/// When both are present the blob is decoded and the URL only names the
/// cache entry.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MediaSource {
    pub url: Option<String>,
    pub blob: Option<Blob>,
}

impl MediaSource {
    pub fn from_url(url: impl Into<String>) -> Self {
        Self { url: Some(url.into()), blob: None }
    }

    pub fn from_blob(blob: Blob) -> Self {
        Self { url: None, blob: Some(blob) }
    }

    pub fn with_blob(mut self, blob: Blob) -> Self {
        self.blob = Some(blob);
        self
    }

    /// Cache key, `None` when there is nothing to load
    pub fn key(&self) -> Option<SourceKey> {
        match (&self.url, &self.blob) {
            (Some(url), _) => Some(SourceKey::Url(url.clone())),
            (None, Some(blob)) => Some(SourceKey::Blob(blob.id())),
            (None, None) => None,
        }
    }

    /// A blob with no URL behind it; its cache entries can be released
    pub fn is_in_memory_only(&self) -> bool {
        self.url.is_none() && self.blob.is_some()
    }
}

/// Key of the buffer, peak and blob caches
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum SourceKey {
    Url(String),
    Blob(BlobId),
}

impl SourceKey {
    pub fn is_in_memory_only(&self) -> bool {
        matches!(self, SourceKey::Blob(_))
    }
}

impl fmt::Display for SourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKey::Url(url) => f.write_str(url),
            SourceKey::Blob(id) => write!(f, "blob:{}", id.0),
        }
    }
}
