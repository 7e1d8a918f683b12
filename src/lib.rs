pub mod config;
pub mod error;
pub mod infra;
pub mod proxy;
pub mod routes;
pub mod shared;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::Config;
pub use error::ProxyError;
pub use proxy::{HttpProxyService, ProxyParams, ProxyService, RenderedResponse};
pub use routes::build_router;
