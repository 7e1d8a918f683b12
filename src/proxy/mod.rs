pub mod executor;
pub mod fingerprint;
pub mod guard;
mod handlers;
pub mod policy;
pub mod response_builder;
pub mod service;
pub mod types;
pub mod waf;

pub use executor::{EngineSettings, FetchEngine, FetchOutcome};
pub use guard::SsrfGuard;
pub use policy::PolicyRegistry;
pub use response_builder::{sanitize_callback, RenderedResponse, ResponseFormatter};
pub use service::{HttpProxyService, ProxyFuture, ProxyService};
pub use types::*;
pub use waf::WafSignal;
