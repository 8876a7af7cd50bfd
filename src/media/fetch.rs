//! Fetching encoded bytes for URL sources

use url::Url;

use crate::config::MediaConfig;
use crate::error::{MediaError, MediaResult};

/// Retrieves the encoded bytes behind a URL.
///
/// Called from probe worker threads, never from the render path.
pub trait Fetcher: Send + Sync + 'static {
    fn fetch(&self, url: &str) -> MediaResult<Vec<u8>>;
}

/// A fetcher for hosts without network access; every URL fails to fetch.
#[derive(Clone, Copy, Debug, Default)]
pub struct OfflineFetcher;

impl Fetcher for OfflineFetcher {
    fn fetch(&self, url: &str) -> MediaResult<Vec<u8>> {
        Err(MediaError::fetch(url, "no fetcher configured"))
    }
}

impl<F> Fetcher for F
where
    F: Fn(&str) -> MediaResult<Vec<u8>> + Send + Sync + 'static,
{
    fn fetch(&self, url: &str) -> MediaResult<Vec<u8>> {
        self(url)
    }
}

fn host_matches(host: &str, pattern: &str) -> bool {
    let pattern = pattern.trim_start_matches("*.");
    host.eq_ignore_ascii_case(pattern)
        || host
            .len()
            .checked_sub(pattern.len() + 1)
            .map_or(false, |split| {
                host.as_bytes()[split] == b'.' && host[split + 1..].eq_ignore_ascii_case(pattern)
            })
}

/// The URL actually requested for `url`.
///
/// URLs on a proxied host go through the same-origin proxy as
/// `{proxy}?url={percent-encoded url}`; everything else is fetched directly.
pub fn route_url(url: &str, config: &MediaConfig) -> String {
    let Some(proxy) = config.proxy_url.as_deref() else {
        return url.to_string();
    };
    let Ok(parsed) = Url::parse(url) else {
        return url.to_string();
    };
    let Some(host) = parsed.host_str() else {
        return url.to_string();
    };

    if config.proxied_hosts.iter().any(|pattern| host_matches(host, pattern)) {
        let encoded: String = url::form_urlencoded::byte_serialize(url.as_bytes()).collect();
        format!("{proxy}?url={encoded}")
    } else {
        url.to_string()
    }
}

#[cfg(feature = "http_fetch")]
pub use http::HttpFetcher;

#[cfg(feature = "http_fetch")]
mod http {
    use super::*;

    /// Blocking HTTP fetcher
    ///
    /// Relative URLs (such as the default proxy path) are resolved against
    /// the base URL when one is set.
    pub struct HttpFetcher {
        client: reqwest::blocking::Client,
        base: Option<Url>,
    }

    impl HttpFetcher {
        pub fn new() -> Self {
            Self {
                client: reqwest::blocking::Client::new(),
                base: None,
            }
        }

        pub fn with_base_url(mut self, base: &str) -> MediaResult<Self> {
            let base = Url::parse(base).map_err(|e| MediaError::fetch(base, e))?;
            self.base = Some(base);
            Ok(self)
        }

        fn absolute(&self, url: &str) -> MediaResult<Url> {
            match (Url::parse(url), &self.base) {
                (Ok(url), _) => Ok(url),
                (Err(url::ParseError::RelativeUrlWithoutBase), Some(base)) => {
                    base.join(url).map_err(|e| MediaError::fetch(url, e))
                }
                (Err(e), _) => Err(MediaError::fetch(url, e)),
            }
        }
    }

    impl Default for HttpFetcher {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Fetcher for HttpFetcher {
        fn fetch(&self, url: &str) -> MediaResult<Vec<u8>> {
            let target = self.absolute(url)?;
            let response = self
                .client
                .get(target)
                .send()
                .and_then(|r| r.error_for_status())
                .map_err(|e| MediaError::fetch(url, e))?;
            let bytes = response.bytes().map_err(|e| MediaError::fetch(url, e))?;
            Ok(bytes.to_vec())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proxied() -> MediaConfig {
        MediaConfig::default().with_proxied_host("r2.example.dev")
    }

    #[test]
    fn proxied_hosts_go_through_the_proxy() {
        let routed = route_url("https://audio.r2.example.dev/a b.mp3?x=1&y=2", &proxied());
        assert!(routed.starts_with("/api/r2/audio-proxy?url=https%3A%2F%2Faudio.r2.example.dev%2Fa"));
        assert!(routed.contains("%3Fx%3D1%26y%3D2"));
    }

    #[test]
    fn other_hosts_are_fetched_directly() {
        let url = "https://cdn.example.com/a.mp3";
        assert_eq!(route_url(url, &proxied()), url);
        // lookalike domain is not a subdomain
        assert_eq!(route_url("https://evilr2.example.dev/a.mp3", &proxied()), "https://evilr2.example.dev/a.mp3");
        assert_eq!(route_url("https://audio.r2.example.dev/a.mp3", &proxied().without_proxy()), "https://audio.r2.example.dev/a.mp3");
    }

    #[test]
    fn offline_fetcher_reports_fetch_errors() {
        let err = OfflineFetcher.fetch("https://cdn.example.com/a.mp3").unwrap_err();
        assert!(matches!(err, MediaError::Fetch { .. }));
    }
}
