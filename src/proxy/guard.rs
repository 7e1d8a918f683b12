//! SSRF guard.
//!
//! Classifies the target by its parsed host, never by searching the raw
//! string, so userinfo, path and numeric-host tricks resolve to the host the
//! client would actually contact.

use crate::error::ProxyError;
use std::net::{Ipv4Addr, Ipv6Addr};
use url::{Host, Url};

#[derive(Debug, Clone, Copy, Default)]
pub struct SsrfGuard {
    allow_internal: bool,
}

impl SsrfGuard {
    pub fn new(allow_internal: bool) -> Self {
        Self { allow_internal }
    }

    /// Accepts an absolute http(s) URL whose host is public, or any host
    /// when internal targets are explicitly allowed.
    ///
    /// # Arguments
    ///
    /// * `raw` - The `url` query parameter as received, if any
    ///
    /// # Returns
    ///
    /// The parsed URL, `InvalidUrl` when it is missing, unparsable, not
    /// http(s) or hostless, and `ForbiddenTarget` when the host is
    /// loopback, private, link-local or otherwise internal.
    pub fn validate(&self, raw: Option<&str>) -> Result<Url, ProxyError> {
        let raw = raw
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ProxyError::InvalidUrl("URL parameter is missing".to_string()))?;

        let url = Url::parse(raw)
            .map_err(|e| ProxyError::InvalidUrl(format!("Invalid URL provided: {}", e)))?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(ProxyError::InvalidUrl(format!(
                "Invalid URL provided: unsupported scheme '{}'",
                url.scheme()
            )));
        }

        let host = url
            .host()
            .ok_or_else(|| ProxyError::InvalidUrl("Invalid URL provided: no host".to_string()))?;

        if !self.allow_internal && is_internal_host(&host) {
            return Err(ProxyError::ForbiddenTarget(host.to_string()));
        }

        Ok(url)
    }
}

pub fn is_internal_host(host: &Host<&str>) -> bool {
    match host {
        Host::Domain(domain) => {
            let domain = domain.trim_end_matches('.').to_ascii_lowercase();
            domain == "localhost" || domain.ends_with(".localhost")
        }
        Host::Ipv4(addr) => is_internal_ipv4(addr),
        Host::Ipv6(addr) => is_internal_ipv6(addr),
    }
}

fn is_internal_ipv4(addr: &Ipv4Addr) -> bool {
    addr.is_loopback() || addr.is_private() || addr.is_link_local() || addr.is_unspecified()
}

fn is_internal_ipv6(addr: &Ipv6Addr) -> bool {
    if let Some(v4) = addr.to_ipv4_mapped() {
        return is_internal_ipv4(&v4);
    }
    let first = addr.segments()[0];
    addr.is_loopback()
        || addr.is_unspecified()
        || (first & 0xfe00) == 0xfc00
        || (first & 0xffc0) == 0xfe80
}
