//! Shared utilities used across the proxy pipeline.

pub mod timing;

pub use timing::{elapsed_ms, PipelineTiming};
