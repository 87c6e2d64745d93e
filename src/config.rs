use std::{collections::HashSet, env, fmt, io, net::IpAddr, time::Duration};

use thiserror::Error;
use tokio::net::TcpListener;

use crate::{
    domain::{FilterConfig, Reason, RenderConfig},
    github::{GitHubSettings, MAX_PER_PAGE},
};

const DEFAULT_API_URL: &str = "https://api.github.com";
const DEFAULT_TTL_SECS: i64 = 60;
const DEFAULT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_BIND_ADDR: &str = "0.0.0.0";
const DEFAULT_BIND_PORT: u16 = 8000;

#[derive(Clone, Debug)]
pub struct Config {
    pub github: GitHubSettings,
    pub filter: FilterConfig,
    pub render: RenderConfig,
    pub cache_ttl: Duration,
    pub bind: BindAddr,
}

/// Where the HTTP server listens. The host may be an IP literal or a name
/// such as `localhost`; names are resolved when the listener is opened.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BindAddr {
    pub host: String,
    pub port: u16,
}

impl BindAddr {
    fn parse(raw: &str, port: u16) -> Result<Self, ConfigError> {
        let host = raw.trim();
        let host = host
            .strip_prefix('[')
            .and_then(|rest| rest.strip_suffix(']'))
            .unwrap_or(host);

        let is_hostname = !host.is_empty()
            && host
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.');
        if host.parse::<IpAddr>().is_err() && !is_hostname {
            return Err(ConfigError::InvalidBindHost {
                value: raw.to_owned(),
            });
        }
        Ok(Self {
            host: host.to_owned(),
            port,
        })
    }

    pub async fn listen(&self) -> io::Result<TcpListener> {
        TcpListener::bind((self.host.as_str(), self.port)).await
    }
}

impl fmt::Display for BindAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} must be an integer, got {value:?}")]
    InvalidNumber { name: &'static str, value: String },
    #[error("BIND_ADDR must be an IP address or host name, got {value:?}")]
    InvalidBindHost { value: String },
    #[error("BIND_PORT must be between 0 and 65535, got {value}")]
    InvalidPort { value: i64 },
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build the configuration from any variable source; `from_env` passes
    /// the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let token = lookup("GITHUB_TOKEN")
            .map(|token| token.trim().to_owned())
            .filter(|token| !token.is_empty());
        let api_url = lookup("GITHUB_API_URL")
            .unwrap_or_else(|| DEFAULT_API_URL.to_owned())
            .trim_end_matches('/')
            .to_owned();

        let participating_only = env_bool(&lookup, "GITHUB_NOTIF_PARTICIPATING_ONLY", true);
        let include_read = env_bool(&lookup, "GITHUB_NOTIF_INCLUDE_READ", false);
        let per_page = env_number(&lookup, "GITHUB_NOTIF_PER_PAGE", i64::from(MAX_PER_PAGE))?
            .clamp(1, i64::from(MAX_PER_PAGE)) as u32;
        let ttl_secs = env_number(&lookup, "CACHE_TTL_SECONDS", DEFAULT_TTL_SECS)?.max(0) as u64;
        let timeout_secs =
            env_number(&lookup, "FETCH_TIMEOUT_SECONDS", DEFAULT_TIMEOUT_SECS as i64)?.max(1) as u64;

        let filter = FilterConfig {
            participating_only,
            include_read,
            reasons_include: env_list(&lookup, "GITHUB_NOTIF_REASONS_INCLUDE")
                .map(Reason::from)
                .collect(),
            reasons_exclude: env_list(&lookup, "GITHUB_NOTIF_REASONS_EXCLUDE")
                .map(Reason::from)
                .collect(),
            repos_include: env_list(&lookup, "GITHUB_NOTIF_REPOS_INCLUDE").collect(),
            repos_exclude: env_list(&lookup, "GITHUB_NOTIF_REPOS_EXCLUDE").collect(),
        };

        let defaults = RenderConfig::default();
        let render = RenderConfig {
            title: lookup("RSS_TITLE").unwrap_or(defaults.title),
            link: lookup("RSS_LINK").unwrap_or(defaults.link),
            description: lookup("RSS_DESCRIPTION").unwrap_or(defaults.description),
            html_description: env_bool(&lookup, "RSS_HTML_DESCRIPTION", defaults.html_description),
        };

        let host = lookup("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_owned());
        let port = env_number(&lookup, "BIND_PORT", i64::from(DEFAULT_BIND_PORT))?;
        let port = u16::try_from(port).map_err(|_| ConfigError::InvalidPort { value: port })?;
        let bind = BindAddr::parse(&host, port)?;

        Ok(Self {
            github: GitHubSettings {
                token,
                api_url,
                per_page,
                participating_only,
                include_read,
                timeout: Duration::from_secs(timeout_secs),
            },
            filter,
            render,
            cache_ttl: Duration::from_secs(ttl_secs),
            bind,
        })
    }

    pub fn log_summary(&self) {
        if self.github.token.is_none() {
            tracing::warn!("GITHUB_TOKEN is not set; every refresh will fail until it is configured");
        }
        tracing::info!("Config loaded:");
        tracing::info!("  api_url = {}", self.github.api_url);
        tracing::info!("  participating_only = {}", self.filter.participating_only);
        tracing::info!("  include_read = {}", self.filter.include_read);
        tracing::info!("  per_page = {}", self.github.per_page);
        tracing::info!(
            "  include_reasons = {}, exclude_reasons = {}",
            describe(self.filter.reasons_include.iter().map(Reason::as_str)),
            describe(self.filter.reasons_exclude.iter().map(Reason::as_str)),
        );
        tracing::info!(
            "  include_repos = {}, exclude_repos = {}",
            describe(self.filter.repos_include.iter().map(String::as_str)),
            describe(self.filter.repos_exclude.iter().map(String::as_str)),
        );
        tracing::info!("  cache_ttl_seconds = {}", self.cache_ttl.as_secs());
        tracing::info!("  fetch_timeout_seconds = {}", self.github.timeout.as_secs());
        tracing::info!("  rss_html_description = {}", self.render.html_description);
    }
}

fn describe<'a>(values: impl Iterator<Item = &'a str>) -> String {
    let mut values: Vec<&str> = values.collect();
    if values.is_empty() {
        return "(none)".to_owned();
    }
    values.sort_unstable();
    values.join(",")
}

fn env_bool<F>(lookup: &F, name: &str, default: bool) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        None => default,
        Some(value) => matches!(
            value.trim().to_lowercase().as_str(),
            "1" | "true" | "yes" | "y" | "on"
        ),
    }
}

fn env_number<F>(lookup: &F, name: &'static str, default: i64) -> Result<i64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidNumber { name, value }),
    }
}

fn env_list<F>(lookup: &F, name: &str) -> impl Iterator<Item = String>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(name).unwrap_or_default();
    raw.split(',')
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_owned)
        .collect::<HashSet<_>>()
        .into_iter()
}
