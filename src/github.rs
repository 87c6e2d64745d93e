use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{
    Client, StatusCode,
    header::{ACCEPT, HeaderMap},
};
use serde::Deserialize;
use thiserror::Error;

use crate::domain::{NotificationThread, Reason, Repository};

const USER_AGENT_HEADER: &str = "gh-notify-feed/0.1";
const API_VERSION_HEADER: &str = "X-GitHub-Api-Version";
const API_VERSION: &str = "2022-11-28";
const RATE_LIMIT_REMAINING: &str = "x-ratelimit-remaining";
const API_REPOS_PREFIX: &str = "https://api.github.com/repos/";
pub const MAX_PER_PAGE: u32 = 50;

/// Anything that can produce one batch of raw notification threads.
#[async_trait]
pub trait NotificationSource: Send + Sync {
    async fn fetch(&self) -> Result<Vec<NotificationThread>, FetchError>;
}

#[derive(Clone, Debug)]
pub struct GitHubSettings {
    pub token: Option<String>,
    pub api_url: String,
    pub per_page: u32,
    pub participating_only: bool,
    pub include_read: bool,
    pub timeout: Duration,
}

pub struct GitHubClient {
    client: Client,
    settings: GitHubSettings,
}

impl GitHubClient {
    pub fn new(settings: GitHubSettings) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(USER_AGENT_HEADER)
            .timeout(settings.timeout)
            .build()
            .map_err(|err| FetchError::network(format!("failed to build HTTP client: {err}")))?;
        Ok(Self { client, settings })
    }

    fn notifications_url(&self) -> String {
        format!("{}/notifications", self.settings.api_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl NotificationSource for GitHubClient {
    async fn fetch(&self) -> Result<Vec<NotificationThread>, FetchError> {
        let token = match self.settings.token.as_deref() {
            Some(token) if !token.is_empty() => token,
            _ => return Err(FetchError::missing_token()),
        };

        let per_page = self.settings.per_page.clamp(1, MAX_PER_PAGE).to_string();
        let all = bool_param(self.settings.include_read);
        let participating = bool_param(self.settings.participating_only);

        tracing::info!("Requesting notifications from {}", self.notifications_url());
        let response = self
            .client
            .get(self.notifications_url())
            .query(&[
                ("per_page", per_page.as_str()),
                ("all", all),
                ("participating", participating),
            ])
            .header(ACCEPT, "application/vnd.github+json")
            .header(API_VERSION_HEADER, API_VERSION)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|err| FetchError::network(err.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_MODIFIED {
            tracing::info!("GitHub returned 304 Not Modified");
            return Ok(Vec::new());
        }
        if !status.is_success() {
            return Err(classify_status(status, response.headers()));
        }

        let body = response
            .bytes()
            .await
            .map_err(|err| FetchError::network(err.to_string()))?;
        let threads = parse_notifications(&body)?;
        tracing::info!("Fetched {} notifications from GitHub", threads.len());
        Ok(threads)
    }
}

fn bool_param(value: bool) -> &'static str {
    if value { "true" } else { "false" }
}

fn classify_status(status: StatusCode, headers: &HeaderMap) -> FetchError {
    let rate_limited = headers
        .get(RATE_LIMIT_REMAINING)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.trim() == "0");

    let kind = match status {
        StatusCode::TOO_MANY_REQUESTS => FetchErrorKind::RateLimited,
        StatusCode::FORBIDDEN if rate_limited => FetchErrorKind::RateLimited,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => FetchErrorKind::Auth,
        _ => FetchErrorKind::ServerError,
    };
    FetchError::new(kind, format!("GitHub API responded with {status}"))
}

/// The body must be a JSON array; individual entries that do not decode are
/// logged and skipped so the rest of the batch still reaches the cache.
fn parse_notifications(body: &[u8]) -> Result<Vec<NotificationThread>, FetchError> {
    let items: Vec<serde_json::Value> = serde_json::from_slice(body)
        .map_err(|err| FetchError::new(FetchErrorKind::MalformedResponse, err.to_string()))?;

    let threads = items
        .into_iter()
        .enumerate()
        .filter_map(
            |(idx, item)| match serde_json::from_value::<NotificationResponse>(item) {
                Ok(response) => Some(NotificationThread::from(response)),
                Err(err) => {
                    tracing::warn!("Skipping malformed notification at index {}: {}", idx, err);
                    None
                }
            },
        )
        .collect();
    Ok(threads)
}

impl From<NotificationResponse> for NotificationThread {
    fn from(item: NotificationResponse) -> Self {
        let repository = item.repository.map(|repo| Repository {
            full_name: repo.full_name,
            html_url: repo.html_url,
        });
        let subject = item.subject.unwrap_or_default();
        let html_url = subject_html_url(
            subject.url.as_deref(),
            repository.as_ref().and_then(|repo| repo.html_url.as_deref()),
        );
        NotificationThread {
            id: item.id,
            repository,
            title: subject.title,
            subject_type: subject.kind,
            reason: item.reason,
            updated_at: item.updated_at,
            unread: item.unread,
            url: subject.url,
            html_url,
        }
    }
}

/// Turn a subject API url into the page a human would open, falling back to
/// the repository page when the subject has no usable url.
fn subject_html_url(api_url: Option<&str>, repo_html: Option<&str>) -> Option<String> {
    let repo_html = repo_html.filter(|url| !url.is_empty())?;
    let tail = api_url
        .and_then(|url| url.strip_prefix(API_REPOS_PREFIX))
        .and_then(|rest| rest.splitn(3, '/').nth(2))
        .filter(|tail| !tail.is_empty());

    let Some(tail) = tail else {
        return Some(repo_html.to_owned());
    };

    // The API addresses commits and pulls in plural; the web UI does not.
    let tail = if let Some(sha) = tail.strip_prefix("commits/") {
        format!("commit/{sha}")
    } else if let Some(number) = tail.strip_prefix("pulls/") {
        format!("pull/{number}")
    } else {
        tail.to_owned()
    };
    Some(format!("{repo_html}/{tail}"))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FetchErrorKind {
    Network,
    Auth,
    RateLimited,
    ServerError,
    MalformedResponse,
}

impl FetchErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FetchErrorKind::Network => "network",
            FetchErrorKind::Auth => "auth",
            FetchErrorKind::RateLimited => "rate-limited",
            FetchErrorKind::ServerError => "server-error",
            FetchErrorKind::MalformedResponse => "malformed-response",
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("GitHub API request failed ({}): {message}", .kind.as_str())]
pub struct FetchError {
    pub kind: FetchErrorKind,
    pub message: String,
}

impl FetchError {
    pub fn new(kind: FetchErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::Network, message)
    }

    pub fn missing_token() -> Self {
        Self::new(FetchErrorKind::Auth, "GITHUB_TOKEN is not configured")
    }
}

// Response payloads ---------------------------------------------------------

#[derive(Debug, Deserialize)]
struct NotificationResponse {
    id: String,
    reason: Reason,
    updated_at: DateTime<Utc>,
    #[serde(default)]
    unread: bool,
    subject: Option<NotificationSubject>,
    repository: Option<NotificationRepository>,
}

#[derive(Debug, Default, Deserialize)]
struct NotificationSubject {
    title: Option<String>,
    url: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NotificationRepository {
    full_name: String,
    html_url: Option<String>,
}

// -------------------------------------------------------------------------
// Tests
// -------------------------------------------------------------------------
