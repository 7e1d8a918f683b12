//! Infrastructure layer providing abstractions for external collaborators.
//!
//! This module contains traits and implementations for:
//! - The upstream HTTP transport
//! - The flat-file response cache
//! - Charset conversion
//! - Content decoding on the encoding-fallback path

pub mod cache;
pub mod charset;
pub mod decompressor;
pub mod transport;

pub use cache::{is_cacheable, CacheEntry, CacheLookup, CacheStore};
pub use decompressor::{decompress_body, ContentDecoder, Decompressor};
pub use transport::{
    HttpTransport, ReqwestTransport, TransportError, TransportErrorKind, TransportFuture,
    TransportRequest, TransportResponse,
};
