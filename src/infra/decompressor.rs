//! Content decoding for bodies fetched without automatic decompression.
//!
//! The encoding-fallback retry disables the client's own decoder. Some
//! origins still send an encoded body; this module decodes the codings it
//! knows and leaves everything else untouched.

use std::io::Read;

/// Trait for a single content coding.
pub trait Decompressor: Send + Sync {
    /// `Content-Encoding` tokens this decoder accepts.
    fn accepts(&self, coding: &str) -> bool;

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, String>;
}

#[derive(Default)]
pub struct GzipDecompressor;

impl Decompressor for GzipDecompressor {
    fn accepts(&self, coding: &str) -> bool {
        coding == "gzip" || coding == "x-gzip"
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, String> {
        let mut out = Vec::new();
        flate2::read::GzDecoder::new(data)
            .read_to_end(&mut out)
            .map_err(|e| format!("gzip decode failed: {}", e))?;
        Ok(out)
    }
}

/// `deflate` is zlib-wrapped per RFC 9110, but raw deflate streams are
/// common in the wild; both are tried.
#[derive(Default)]
pub struct DeflateDecompressor;

impl Decompressor for DeflateDecompressor {
    fn accepts(&self, coding: &str) -> bool {
        coding == "deflate"
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, String> {
        let mut out = Vec::new();
        if flate2::read::ZlibDecoder::new(data).read_to_end(&mut out).is_ok() {
            return Ok(out);
        }
        out.clear();
        flate2::read::DeflateDecoder::new(data)
            .read_to_end(&mut out)
            .map_err(|e| format!("deflate decode failed: {}", e))?;
        Ok(out)
    }
}

#[derive(Default)]
pub struct BrotliDecompressor;

impl Decompressor for BrotliDecompressor {
    fn accepts(&self, coding: &str) -> bool {
        coding == "br"
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, String> {
        let mut out = Vec::new();
        brotli::BrotliDecompress(&mut std::io::Cursor::new(data), &mut out)
            .map_err(|e| format!("brotli decode failed: {}", e))?;
        Ok(out)
    }
}

/// Applies a `Content-Encoding` header value, which may list several codings
/// in the order they were applied.
pub struct ContentDecoder {
    decoders: Vec<Box<dyn Decompressor>>,
}

impl Default for ContentDecoder {
    fn default() -> Self {
        Self {
            decoders: vec![
                Box::new(GzipDecompressor),
                Box::new(DeflateDecompressor),
                Box::new(BrotliDecompressor),
            ],
        }
    }
}

impl ContentDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// `identity` is skipped; an unknown coding is an error.
    pub fn decode(&self, data: &[u8], encoding: Option<&str>) -> Result<Vec<u8>, String> {
        let Some(encoding) = encoding else {
            return Ok(data.to_vec());
        };

        let mut current = data.to_vec();
        for coding in encoding.rsplit(',') {
            let coding = coding.trim().to_ascii_lowercase();
            if coding.is_empty() || coding == "identity" {
                continue;
            }
            match self.decoders.iter().find(|d| d.accepts(&coding)) {
                Some(decoder) => current = decoder.decompress(&current)?,
                None => return Err(format!("unsupported content encoding: {}", coding)),
            }
        }
        Ok(current)
    }
}

pub fn decompress_body(body: &[u8], encoding: Option<&str>) -> Result<Vec<u8>, String> {
    ContentDecoder::new().decode(body, encoding)
}
