use std::{collections::HashSet, convert::Infallible, fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// Domain data structures shared across modules.

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Repository {
    pub full_name: String,
    pub html_url: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NotificationThread {
    pub id: String,
    pub repository: Option<Repository>,
    pub title: Option<String>,
    pub subject_type: Option<String>,
    pub reason: Reason,
    pub updated_at: DateTime<Utc>,
    pub unread: bool,
    pub url: Option<String>,
    pub html_url: Option<String>,
}

impl NotificationThread {
    pub fn repo_name(&self) -> Option<&str> {
        self.repository.as_ref().map(|repo| repo.full_name.as_str())
    }
}

/// Why GitHub delivered a thread. Unknown upstream values are kept verbatim
/// in [`Reason::Other`] so new reasons still flow through filters by name.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Reason {
    ApprovalRequested,
    Assign,
    Author,
    CiActivity,
    Comment,
    Invitation,
    Manual,
    MemberFeatureRequested,
    Mention,
    ReviewRequested,
    SecurityAdvisoryCredit,
    SecurityAlert,
    StateChange,
    Subscribed,
    TeamMention,
    Other(String),
}

impl Reason {
    pub fn as_str(&self) -> &str {
        match self {
            Reason::ApprovalRequested => "approval_requested",
            Reason::Assign => "assign",
            Reason::Author => "author",
            Reason::CiActivity => "ci_activity",
            Reason::Comment => "comment",
            Reason::Invitation => "invitation",
            Reason::Manual => "manual",
            Reason::MemberFeatureRequested => "member_feature_requested",
            Reason::Mention => "mention",
            Reason::ReviewRequested => "review_requested",
            Reason::SecurityAdvisoryCredit => "security_advisory_credit",
            Reason::SecurityAlert => "security_alert",
            Reason::StateChange => "state_change",
            Reason::Subscribed => "subscribed",
            Reason::TeamMention => "team_mention",
            Reason::Other(name) => name,
        }
    }

    /// Whether the user is directly involved in the thread, as opposed to
    /// seeing it only because they watch the repository or subscribed to it.
    pub fn is_participating(&self) -> bool {
        !matches!(
            self,
            Reason::Subscribed | Reason::Manual | Reason::SecurityAlert | Reason::Other(_)
        )
    }

    pub fn label(&self) -> &str {
        match self {
            Reason::Assign => "assigned",
            Reason::ReviewRequested => "review requested",
            Reason::ApprovalRequested => "approval requested",
            Reason::StateChange => "state change",
            Reason::CiActivity => "CI",
            Reason::TeamMention => "team mention",
            Reason::SecurityAlert => "security alert",
            other => other.as_str(),
        }
    }
}

impl FromStr for Reason {
    type Err = Infallible;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let reason = match raw {
            "approval_requested" => Reason::ApprovalRequested,
            "assign" => Reason::Assign,
            "author" => Reason::Author,
            "ci_activity" => Reason::CiActivity,
            "comment" => Reason::Comment,
            "invitation" => Reason::Invitation,
            "manual" => Reason::Manual,
            "member_feature_requested" => Reason::MemberFeatureRequested,
            "mention" => Reason::Mention,
            "review_requested" => Reason::ReviewRequested,
            "security_advisory_credit" => Reason::SecurityAdvisoryCredit,
            "security_alert" => Reason::SecurityAlert,
            "state_change" => Reason::StateChange,
            "subscribed" => Reason::Subscribed,
            "team_mention" => Reason::TeamMention,
            other => Reason::Other(other.to_owned()),
        };
        Ok(reason)
    }
}

impl From<String> for Reason {
    fn from(raw: String) -> Self {
        match raw.parse() {
            Ok(reason) => reason,
            Err(never) => match never {},
        }
    }
}

impl From<Reason> for String {
    fn from(reason: Reason) -> Self {
        reason.as_str().to_owned()
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn subject_type_label(subject_type: Option<&str>) -> &str {
    match subject_type {
        None | Some("") => "Other",
        Some("PullRequest") => "Pull request",
        Some(other) => other,
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FilterConfig {
    pub participating_only: bool,
    pub include_read: bool,
    pub reasons_include: HashSet<Reason>,
    pub reasons_exclude: HashSet<Reason>,
    pub repos_include: HashSet<String>,
    pub repos_exclude: HashSet<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderConfig {
    pub title: String,
    pub link: String,
    pub description: String,
    pub html_description: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            title: "GitHub notifications RSS".to_owned(),
            link: "https://github.com/notifications".to_owned(),
            description: "Custom feed built from your GitHub notifications".to_owned(),
            html_description: true,
        }
    }
}
