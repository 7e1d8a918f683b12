use std::env;
use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/112.0.0.0 Safari/537.36";

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub allow_internal_targets: bool,
    pub cors_allow_origin: String,
    pub cache: CacheConfig,
    pub fetch: FetchConfig,
    pub pacing: PacingConfig,
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub enabled: bool,
    pub dir: PathBuf,
    pub ttl: Duration,
}

/// Defaults for a single upstream attempt, before site policy overrides.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub timeout: Duration,
    pub max_redirects: usize,
    pub user_agent: String,
    pub verify_ssl: bool,
}

/// Millisecond ranges for the human-pacing sleeps.
#[derive(Debug, Clone)]
pub struct PacingConfig {
    pub bypass_delay_ms: RangeInclusive<u64>,
    pub handler_delay_ms: RangeInclusive<u64>,
}

impl PacingConfig {
    pub fn disabled() -> Self {
        Self {
            bypass_delay_ms: 0..=0,
            handler_delay_ms: 0..=0,
        }
    }
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            bypass_delay_ms: 500..=1500,
            handler_delay_ms: 800..=1500,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            allow_internal_targets: false,
            cors_allow_origin: "*".to_string(),
            cache: CacheConfig {
                enabled: true,
                dir: PathBuf::from("cache"),
                ttl: Duration::from_secs(3600),
            },
            fetch: FetchConfig {
                timeout: Duration::from_secs(30),
                max_redirects: 10,
                user_agent: DEFAULT_USER_AGENT.to_string(),
                verify_ssl: true,
            },
            pacing: PacingConfig::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let pacing = if env_flag("PACING_ENABLED").unwrap_or(true) {
            PacingConfig::default()
        } else {
            PacingConfig::disabled()
        };

        Self {
            port: env_parse("PORT").unwrap_or(defaults.port),
            allow_internal_targets: env_flag("ALLOW_INTERNAL_TARGETS")
                .unwrap_or(defaults.allow_internal_targets),
            cors_allow_origin: env::var("CORS_ALLOW_ORIGIN").unwrap_or(defaults.cors_allow_origin),
            cache: CacheConfig {
                enabled: env_flag("CACHE_ENABLED").unwrap_or(defaults.cache.enabled),
                dir: env::var("CACHE_DIR")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.cache.dir),
                ttl: env_parse("CACHE_TTL_SECS")
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.cache.ttl),
            },
            fetch: FetchConfig {
                timeout: env_parse("FETCH_TIMEOUT_SECS")
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.fetch.timeout),
                max_redirects: env_parse("FETCH_MAX_REDIRECTS")
                    .unwrap_or(defaults.fetch.max_redirects),
                user_agent: env::var("FETCH_USER_AGENT").unwrap_or(defaults.fetch.user_agent),
                verify_ssl: env_flag("VERIFY_SSL").unwrap_or(defaults.fetch.verify_ssl),
            },
            pacing,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

fn env_flag(key: &str) -> Option<bool> {
    env::var(key).ok().and_then(|v| parse_flag(&v))
}

pub(crate) fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
