//! Browser-like request header profiles.
//!
//! `Accept-Encoding` is never listed here: the transport negotiates it
//! whenever decompression is on, and omits it on the encoding-fallback path.

const BASELINE: &[(&str, &str)] = &[
    (
        "Accept",
        "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
    ),
    ("Accept-Language", "en-US,en;q=0.5"),
    ("Connection", "keep-alive"),
    ("Upgrade-Insecure-Requests", "1"),
    ("Cache-Control", "max-age=0"),
];

const BYPASS: &[(&str, &str)] = &[
    (
        "Accept",
        "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8,application/signed-exchange;v=b3;q=0.7",
    ),
    ("Accept-Language", "en-US,en;q=0.9"),
    ("Connection", "keep-alive"),
    ("Upgrade-Insecure-Requests", "1"),
    (
        "Sec-Ch-Ua",
        "\"Chromium\";v=\"112\", \"Google Chrome\";v=\"112\", \"Not:A-Brand\";v=\"99\"",
    ),
    ("Sec-Ch-Ua-Mobile", "?0"),
    ("Sec-Ch-Ua-Platform", "\"Windows\""),
    ("Sec-Fetch-Dest", "document"),
    ("Sec-Fetch-Mode", "navigate"),
    ("Sec-Fetch-Site", "none"),
    ("Sec-Fetch-User", "?1"),
    ("Cache-Control", "max-age=0"),
    ("DNT", "1"),
];

const NAVIGATION_ACCEPT: &str =
    "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8";

const WARMUP: &[(&str, &str)] = &[
    ("Accept", NAVIGATION_ACCEPT),
    ("Accept-Language", "en-US,en;q=0.9"),
    ("Connection", "keep-alive"),
    ("Cache-Control", "max-age=0"),
    ("Upgrade-Insecure-Requests", "1"),
    ("Sec-Fetch-Dest", "document"),
    ("Sec-Fetch-Mode", "navigate"),
    ("Sec-Fetch-Site", "none"),
    ("Sec-Fetch-User", "?1"),
];

const SAME_ORIGIN: &[(&str, &str)] = &[
    ("Accept", NAVIGATION_ACCEPT),
    ("Accept-Language", "en-US,en;q=0.9"),
    ("Connection", "keep-alive"),
    ("Cache-Control", "no-cache"),
    ("Pragma", "no-cache"),
    ("Upgrade-Insecure-Requests", "1"),
    ("Sec-Fetch-Dest", "document"),
    ("Sec-Fetch-Mode", "navigate"),
    ("Sec-Fetch-Site", "same-origin"),
    ("Sec-Fetch-User", "?1"),
];

/// Plain browser headers for the standard attempt.
pub fn baseline_headers() -> Vec<(String, String)> {
    owned(BASELINE)
}

/// Chrome headers with client hints for WAF escalation.
pub fn bypass_headers() -> Vec<(String, String)> {
    owned(BYPASS)
}

/// First visit to a landing page.
pub fn warmup_headers() -> Vec<(String, String)> {
    owned(WARMUP)
}

/// Follow-up navigation within an established session.
pub fn same_origin_headers() -> Vec<(String, String)> {
    owned(SAME_ORIGIN)
}

/// Referer of a search results page for `host`.
pub fn search_referer(host: &str) -> String {
    let query: String = url::form_urlencoded::byte_serialize(host.as_bytes()).collect();
    format!("https://www.google.com/search?q={}", query)
}

fn owned(profile: &[(&str, &str)]) -> Vec<(String, String)> {
    profile
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}
