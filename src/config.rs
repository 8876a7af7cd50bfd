//! Engine and media configuration

/// Default same-origin proxy path for hosts that do not send CORS headers
pub const DEFAULT_PROXY_PATH: &str = "/api/r2/audio-proxy";

/// Media cache settings
#[derive(Clone, Debug)]
pub struct MediaConfig {
    /// Proxy endpoint; fetches for proxied hosts go to `{proxy_url}?url={encoded}`
    pub proxy_url: Option<String>,
    /// Hosts routed through the proxy (subdomains included)
    pub proxied_hosts: Vec<String>,
    /// Bucket count used when a caller does not ask for a specific one
    pub default_peak_count: usize,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            proxy_url: Some(DEFAULT_PROXY_PATH.to_string()),
            proxied_hosts: Vec::new(),
            default_peak_count: 1000,
        }
    }
}

impl MediaConfig {
    pub fn with_proxy(mut self, proxy_url: impl Into<String>) -> Self {
        self.proxy_url = Some(proxy_url.into());
        self
    }

    pub fn without_proxy(mut self) -> Self {
        self.proxy_url = None;
        self
    }

    pub fn with_proxied_host(mut self, host: impl Into<String>) -> Self {
        self.proxied_hosts.push(host.into());
        self
    }

    pub fn with_default_peak_count(mut self, count: usize) -> Self {
        self.default_peak_count = count.max(1);
        self
    }
}

/// Engine settings
///
/// ```
/// use mehrspur::EngineConfig;
///
/// let config = EngineConfig::default()
///     .with_master_volume(1.0)
///     .with_schedule_horizon(30.0)
///     .resume_after_skip(true);
/// assert_eq!(config.schedule_horizon, Some(30.0));
/// ```
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Upper bound for a track's linear volume
    pub max_track_volume: f32,
    pub master_volume: f32,
    /// Ramp time for gain and pan changes
    pub smoothing_ms: f32,
    /// Only pre-schedule future clips starting within this many seconds;
    /// later clips are chained as earlier ones end. `None` schedules everything.
    pub schedule_horizon: Option<f64>,
    /// Keep playing from the new position after a skip instead of stopping
    pub resume_after_skip: bool,
    /// Number of undoable steps
    pub history_capacity: usize,
    pub media: MediaConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_track_volume: 2.0,
            master_volume: 0.8,
            smoothing_ms: crate::nodes::effect::DEFAULT_SMOOTHING_MS,
            schedule_horizon: None,
            resume_after_skip: false,
            history_capacity: crate::history::DEFAULT_CAPACITY,
            media: MediaConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn with_max_track_volume(mut self, max: f32) -> Self {
        self.max_track_volume = max.max(0.0);
        self
    }

    pub fn with_master_volume(mut self, volume: f32) -> Self {
        self.master_volume = volume.max(0.0);
        self
    }

    pub fn with_smoothing_ms(mut self, ms: f32) -> Self {
        self.smoothing_ms = ms.max(0.0);
        self
    }

    pub fn with_schedule_horizon(mut self, seconds: f64) -> Self {
        self.schedule_horizon = Some(seconds.max(0.0));
        self
    }

    pub fn resume_after_skip(mut self, resume: bool) -> Self {
        self.resume_after_skip = resume;
        self
    }

    pub fn with_history_capacity(mut self, steps: usize) -> Self {
        self.history_capacity = steps.max(1);
        self
    }

    pub fn with_media(mut self, media: MediaConfig) -> Self {
        self.media = media;
        self
    }
}
