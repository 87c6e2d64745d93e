use std::{sync::Arc, time::Duration};

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};

use crate::{
    domain::NotificationThread,
    github::FetchError,
    health::{HealthState, HealthStatus, LastAttempt},
};

pub type RefreshResult = Result<Vec<NotificationThread>, FetchError>;

#[derive(Debug)]
pub struct CacheEntry {
    pub threads: Arc<[NotificationThread]>,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Clone, Debug)]
enum Attempt {
    Succeeded,
    Failed(FetchError),
}

#[derive(Debug)]
struct Attempted {
    at: DateTime<Utc>,
    outcome: Attempt,
}

/// Everything readers can observe, swapped in as one unit.
#[derive(Debug, Default)]
struct Snapshot {
    entry: Option<Arc<CacheEntry>>,
    last_attempt: Option<Attempted>,
}

#[derive(Clone, Debug)]
pub enum CacheView {
    /// No fetch has ever succeeded. Distinct from a successful empty fetch.
    NoData,
    Ready {
        threads: Arc<[NotificationThread]>,
        fetched_at: DateTime<Utc>,
        is_stale: bool,
    },
}

impl CacheView {
    pub fn needs_refresh(&self) -> bool {
        match self {
            CacheView::NoData => true,
            CacheView::Ready { is_stale, .. } => *is_stale,
        }
    }
}

/// Holds the last good filtered batch plus the outcome of the latest fetch.
pub struct FeedCache {
    ttl: Duration,
    snap: ArcSwap<Snapshot>,
}

impl FeedCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            snap: ArcSwap::from_pointee(Snapshot::default()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn current_view(&self, now: DateTime<Utc>) -> CacheView {
        let snap = self.snap.load();
        match &snap.entry {
            None => CacheView::NoData,
            Some(entry) => CacheView::Ready {
                threads: Arc::clone(&entry.threads),
                fetched_at: entry.fetched_at,
                is_stale: self.is_expired(entry.fetched_at, now),
            },
        }
    }

    pub fn record(&self, result: RefreshResult, now: DateTime<Utc>) {
        let (entry, outcome) = match result {
            Ok(threads) => {
                tracing::debug!("Caching {} filtered notifications", threads.len());
                let entry = CacheEntry {
                    threads: threads.into(),
                    fetched_at: now,
                };
                (Some(Arc::new(entry)), Attempt::Succeeded)
            }
            Err(err) => (None, Attempt::Failed(err)),
        };

        if entry.is_none() && self.snap.load().entry.is_some() {
            tracing::warn!("Keeping last good notifications after failed refresh");
        }

        self.snap.rcu(|previous| Snapshot {
            entry: entry.clone().or_else(|| previous.entry.clone()),
            last_attempt: Some(Attempted {
                at: now,
                outcome: outcome.clone(),
            }),
        });
    }

    pub fn health(&self) -> HealthStatus {
        let snap = self.snap.load();
        let (last_attempt, last_error) = match &snap.last_attempt {
            None => (LastAttempt::Never, None),
            Some(Attempted {
                outcome: Attempt::Succeeded,
                ..
            }) => (LastAttempt::Succeeded, None),
            Some(Attempted {
                outcome: Attempt::Failed(err),
                ..
            }) => (LastAttempt::Failed, Some(err.to_string())),
        };

        HealthStatus {
            state: HealthState::derive(snap.entry.is_some(), last_attempt),
            last_fetch: snap.entry.as_ref().map(|entry| entry.fetched_at),
            last_error,
        }
    }

    /// True when the view needs refreshing and no attempt, successful or
    /// not, has been made within the last TTL window.
    pub fn refresh_due(&self, now: DateTime<Utc>) -> bool {
        if !self.current_view(now).needs_refresh() {
            return false;
        }
        match &self.snap.load().last_attempt {
            None => true,
            Some(attempt) => self.is_expired(attempt.at, now),
        }
    }

    fn is_expired(&self, fetched_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        match chrono::Duration::from_std(self.ttl) {
            Ok(ttl) => now - fetched_at > ttl,
            Err(_) => false,
        }
    }
}
