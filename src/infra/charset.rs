//! Charset conversion backed by `encoding_rs`.

use crate::error::ProxyError;
use encoding_rs::{Encoding, UTF_8};

pub const DEFAULT_CHARSET: &str = "UTF-8";

/// Extracts the `charset=` parameter from a Content-Type value.
pub fn extract_charset(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|param| {
        let (name, value) = param.split_once('=')?;
        if !name.trim().eq_ignore_ascii_case("charset") {
            return None;
        }
        let value = value.trim().trim_matches('"');
        (!value.is_empty()).then(|| value.to_string())
    })
}

/// Replaces (or appends) the charset parameter of a Content-Type value.
pub fn with_charset(content_type: &str, charset: &str) -> String {
    let mut parts: Vec<String> = content_type
        .split(';')
        .map(|p| p.trim().to_string())
        .filter(|p| {
            !p.is_empty()
                && !p
                    .split_once('=')
                    .is_some_and(|(n, _)| n.trim().eq_ignore_ascii_case("charset"))
        })
        .collect();
    parts.push(format!("charset={}", charset));
    parts.join("; ")
}

/// Two labels naming the same encoding ("utf8" and "UTF-8", say).
pub fn same_charset(a: &str, b: &str) -> bool {
    match (lookup(a), lookup(b)) {
        (Some(x), Some(y)) => x == y,
        _ => a.trim().eq_ignore_ascii_case(b.trim()),
    }
}

/// Converts `bytes` from one charset to another.
///
/// Unknown labels, malformed input and characters the target cannot
/// represent are all failures; the caller keeps the original bytes.
pub fn transcode(bytes: &[u8], from: &str, to: &str) -> Result<Vec<u8>, ProxyError> {
    let source = lookup(from)
        .ok_or_else(|| ProxyError::Transcode(format!("unknown source charset '{}'", from)))?;
    let target =
        lookup(to).ok_or_else(|| ProxyError::Transcode(format!("unknown target charset '{}'", to)))?;

    if source == target {
        return Ok(bytes.to_vec());
    }
    if target.output_encoding() != target {
        return Err(ProxyError::Transcode(format!(
            "cannot encode output as '{}'",
            to
        )));
    }

    let (text, malformed) = source.decode_without_bom_handling(bytes);
    if malformed {
        return Err(ProxyError::Transcode(format!("input is not valid '{}'", from)));
    }

    let (encoded, _, unmappable) = target.encode(&text);
    if unmappable {
        return Err(ProxyError::Transcode(format!(
            "content has characters not representable in '{}'",
            to
        )));
    }
    Ok(encoded.into_owned())
}

/// Lossy decode for embedding a body into a JSON string.
pub fn decode_text(bytes: &[u8], charset: &str) -> String {
    let encoding = lookup(charset).unwrap_or(UTF_8);
    encoding.decode_without_bom_handling(bytes).0.into_owned()
}

/// Encodes serialized envelope text for the wire. Characters the charset
/// cannot hold become numeric character references.
pub fn encode_text(text: &str, charset: &str) -> Vec<u8> {
    match lookup(charset) {
        Some(encoding) if encoding.output_encoding() == encoding => {
            encoding.encode(text).0.into_owned()
        }
        _ => text.as_bytes().to_vec(),
    }
}

/// True when `label` names an encoding that can also be used for output.
pub fn is_output_charset(label: &str) -> bool {
    lookup(label).is_some_and(|e| e.output_encoding() == e)
}

fn lookup(label: &str) -> Option<&'static Encoding> {
    Encoding::for_label(label.trim().as_bytes())
}
