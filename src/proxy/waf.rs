//! WAF challenge detection.

use std::fmt;

/// Statuses that bot protection commonly answers with.
pub const WAF_STATUS_CODES: [u16; 4] = [403, 429, 503, 415];

/// Case-sensitive markers of challenge and block pages.
pub const WAF_BODY_SIGNATURES: [&str; 6] = [
    "security check",
    "blocked",
    "captcha",
    "imunify",
    "cloudflare",
    "firewall",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WafSignal {
    Status(u16),
    Signature(&'static str),
}

impl fmt::Display for WafSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WafSignal::Status(code) => write!(f, "status code {}", code),
            WafSignal::Signature(marker) => write!(f, "body contains '{}'", marker),
        }
    }
}

/// Status is checked before the body.
pub fn detect(status: u16, body: &[u8]) -> Option<WafSignal> {
    if WAF_STATUS_CODES.contains(&status) {
        return Some(WafSignal::Status(status));
    }
    WAF_BODY_SIGNATURES
        .iter()
        .find(|marker| contains_bytes(body, marker.as_bytes()))
        .map(|marker| WafSignal::Signature(*marker))
}

fn contains_bytes(haystack: &[u8], needle: &[u8]) -> bool {
    !needle.is_empty() && haystack.windows(needle.len()).any(|w| w == needle)
}
