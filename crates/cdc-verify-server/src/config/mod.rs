//! Configuration loading and resolution.
//!
//! Every setting resolves as: explicit CLI value, then environment variable,
//! then the built-in default.

use std::time::Duration;

use cdc_verify::SiteConfig;

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3200";

pub const ENV_BIND_ADDR: &str = "CDC_BIND_ADDR";
pub const ENV_SITE_URL: &str = "CDC_SITE_URL";
pub const ENV_VESSEL_DIRECTORY_URL: &str = "VESSEL_DIRECTORY_URL";
pub const ENV_HTTP_TIMEOUT_MS: &str = "CDC_HTTP_TIMEOUT_MS";
pub const ENV_SESSION_TTL_SECS: &str = "CDC_SESSION_TTL_SECS";
pub const ENV_LOOKUP_TIMEOUT_SECS: &str = "CDC_LOOKUP_TIMEOUT_SECS";

/// Values given explicitly on the command line.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub site_url: Option<String>,
    pub vessel_directory_url: Option<String>,
    pub http_timeout_ms: Option<u64>,
    pub session_ttl_secs: Option<u64>,
    pub lookup_timeout_secs: Option<u64>,
}

/// Resolve the listen address.
pub fn resolve_bind_addr(explicit: Option<&str>) -> String {
    if let Some(addr) = explicit {
        return addr.to_string();
    }

    if let Ok(env_addr) = std::env::var(ENV_BIND_ADDR) {
        return env_addr;
    }

    DEFAULT_BIND_ADDR.to_string()
}

/// Resolve the site configuration from the process environment.
pub fn resolve_site_config(overrides: &ConfigOverrides) -> SiteConfig {
    resolve_site_config_with(overrides, |key| std::env::var(key).ok())
}

/// Resolve the site configuration against an arbitrary environment lookup.
pub fn resolve_site_config_with(
    overrides: &ConfigOverrides,
    env: impl Fn(&str) -> Option<String>,
) -> SiteConfig {
    let defaults = SiteConfig::default();

    let number = |explicit: Option<u64>, key: &str| {
        explicit.or_else(|| {
            let raw = env(key)?;
            match raw.trim().parse::<u64>() {
                Ok(n) => Some(n),
                Err(_) => {
                    tracing::warn!("Ignoring {key}={raw}: not a whole number");
                    None
                }
            }
        })
    };

    let site_url = overrides
        .site_url
        .clone()
        .or_else(|| env(ENV_SITE_URL))
        .unwrap_or_else(|| defaults.base_url.clone());
    let vessel_url = overrides
        .vessel_directory_url
        .clone()
        .or_else(|| env(ENV_VESSEL_DIRECTORY_URL))
        .unwrap_or_else(|| defaults.vessel_directory_url.clone());

    let http_timeout = number(overrides.http_timeout_ms, ENV_HTTP_TIMEOUT_MS)
        .map(Duration::from_millis)
        .unwrap_or(defaults.http_timeout);
    let session_ttl = number(overrides.session_ttl_secs, ENV_SESSION_TTL_SECS)
        .map(Duration::from_secs)
        .unwrap_or(defaults.session_ttl);
    let lookup_timeout = number(overrides.lookup_timeout_secs, ENV_LOOKUP_TIMEOUT_SECS)
        .map(Duration::from_secs)
        .unwrap_or(defaults.lookup_timeout);

    SiteConfig {
        http_timeout,
        session_ttl,
        lookup_timeout,
        ..defaults
    }
    .with_base_url(site_url)
    .with_vessel_directory_url(vessel_url)
}
