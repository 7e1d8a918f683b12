//! Site policy registry.
//!
//! An ordered table of (substring, policy) pairs. The first entry whose token
//! occurs in the URL wins; URLs matching nothing get the default policy.
//! New sites are added as rows, not branches.

use super::types::{SiteHandler, SitePolicy};
use std::time::Duration;

const CHALLENGING_TIMEOUT: Duration = Duration::from_secs(40);
const CHALLENGING_REDIRECTS: usize = 15;

#[derive(Debug, Clone)]
pub struct PolicyRegistry {
    policies: Vec<SitePolicy>,
}

impl PolicyRegistry {
    pub fn new(policies: Vec<SitePolicy>) -> Self {
        Self { policies }
    }

    /// Known bot-protected sites.
    pub fn builtin() -> Self {
        Self::new(vec![
            SitePolicy {
                match_token: "martijndebie.nl",
                timeout_override: Some(CHALLENGING_TIMEOUT),
                redirect_override: Some(CHALLENGING_REDIRECTS),
                dedicated_handler: Some(SiteHandler::SessionWarmup {
                    landing_page: "https://www.martijndebie.nl/",
                }),
                skip_cache: true,
                challenging_profile: true,
            },
            SitePolicy {
                match_token: "imunify360",
                timeout_override: Some(CHALLENGING_TIMEOUT),
                redirect_override: Some(CHALLENGING_REDIRECTS),
                dedicated_handler: None,
                skip_cache: true,
                challenging_profile: true,
            },
        ])
    }

    pub fn resolve(&self, url: &str) -> SitePolicy {
        self.policies
            .iter()
            .find(|p| !p.match_token.is_empty() && url.contains(p.match_token))
            .cloned()
            .unwrap_or_default()
    }

    pub fn policies(&self) -> &[SitePolicy] {
        &self.policies
    }
}

impl Default for PolicyRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
