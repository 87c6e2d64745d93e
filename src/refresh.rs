use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use chrono::Utc;
use tokio::{task::JoinHandle, time::MissedTickBehavior};

use crate::{
    cache::FeedCache,
    domain::FilterConfig,
    filter,
    github::{FetchError, NotificationSource},
    health::HealthState,
};

const MIN_LOOP_PERIOD: Duration = Duration::from_secs(1);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefreshOutcome {
    Completed(HealthState),
    /// Another refresh was already running; nothing was fetched.
    Coalesced,
}

/// Drives fetch -> filter -> record, allowing at most one fetch in flight.
pub struct Refresher {
    source: Arc<dyn NotificationSource>,
    filter: FilterConfig,
    cache: Arc<FeedCache>,
    timeout: Duration,
    in_flight: AtomicBool,
}

impl Refresher {
    pub fn new(
        source: Arc<dyn NotificationSource>,
        filter: FilterConfig,
        cache: Arc<FeedCache>,
        timeout: Duration,
    ) -> Self {
        Self {
            source,
            filter,
            cache,
            timeout,
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn cache(&self) -> &Arc<FeedCache> {
        &self.cache
    }

    pub fn is_refreshing(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    fn try_begin(&self) -> Option<InFlightGuard<'_>> {
        self.in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| InFlightGuard {
                flag: &self.in_flight,
            })
    }

    pub async fn refresh(&self) -> RefreshOutcome {
        let Some(_guard) = self.try_begin() else {
            tracing::debug!("Refresh already in progress, skipping this trigger");
            return RefreshOutcome::Coalesced;
        };

        let result = match tokio::time::timeout(self.timeout, self.source.fetch()).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::network(format!(
                "request timed out after {}s",
                self.timeout.as_secs_f32()
            ))),
        };

        let result = match result {
            Ok(raw) => Ok(filter::apply(raw, &self.filter)),
            Err(err) => {
                tracing::error!("{}", err);
                Err(err)
            }
        };
        self.cache.record(result, Utc::now());

        let state = self.cache.health().state;
        tracing::info!("Refresh finished, health is {:?}", state);
        RefreshOutcome::Completed(state)
    }

    /// Kick off a background refresh when the cached view is stale and the
    /// last attempt is older than the TTL. Never waits for the fetch.
    pub fn refresh_if_stale(self: &Arc<Self>) {
        if self.is_refreshing() || !self.cache.refresh_due(Utc::now()) {
            return;
        }
        tracing::info!("Cache expired or empty, refreshing in the background");
        let refresher = Arc::clone(self);
        tokio::spawn(async move {
            refresher.refresh().await;
        });
    }

    /// Refresh once immediately, then once per TTL.
    pub fn spawn_loop(self: &Arc<Self>) -> JoinHandle<()> {
        let period = self.cache.ttl().max(MIN_LOOP_PERIOD);
        let refresher = Arc::clone(self);
        tokio::spawn(async move {
            let mut timer = tokio::time::interval(period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                timer.tick().await;
                refresher.refresh().await;
            }
        })
    }
}

struct InFlightGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}
