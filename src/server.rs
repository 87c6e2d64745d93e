use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::header::CONTENT_TYPE,
    response::IntoResponse,
    routing::get,
};
use chrono::Utc;
use serde::Serialize;

use crate::{
    cache::CacheView,
    config::BindAddr,
    domain::RenderConfig,
    health::HealthState,
    refresh::Refresher,
    render,
};

const RSS_CONTENT_TYPE: &str = "application/rss+xml; charset=utf-8";

#[derive(Clone)]
pub struct AppState {
    pub refresher: Arc<Refresher>,
    pub presentation: Arc<RenderConfig>,
}

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub status: HealthState,
    pub last_fetch: Option<String>,
    pub last_error: Option<String>,
    pub cache_ttl_seconds: u64,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(feed))
        .route("/feed", get(feed))
        .route("/health", get(health))
        .with_state(state)
}

pub async fn serve(bind: &BindAddr, state: AppState) -> std::io::Result<()> {
    let app = create_router(state);
    tracing::info!("Starting server on {}", bind);
    let listener = bind.listen().await?;
    axum::serve(listener, app.into_make_service()).await
}

/// Always answers with the cached view; a stale cache only schedules a refresh.
pub async fn feed(State(state): State<AppState>) -> impl IntoResponse {
    state.refresher.refresh_if_stale();

    let now = Utc::now();
    let document = match state.refresher.cache().current_view(now) {
        CacheView::NoData => {
            tracing::info!("No notifications fetched yet, serving an empty feed");
            render::render(&[], &state.presentation, now)
        }
        CacheView::Ready {
            threads, is_stale, ..
        } => {
            if is_stale {
                tracing::info!("Serving stale notifications from cache");
            } else {
                tracing::debug!("Serving notifications from cache");
            }
            render::render(&threads, &state.presentation, now)
        }
    };

    ([(CONTENT_TYPE, RSS_CONTENT_TYPE)], document.to_xml())
}

pub async fn health(State(state): State<AppState>) -> Json<HealthReport> {
    let cache = state.refresher.cache();
    let status = cache.health();
    Json(HealthReport {
        status: status.state,
        last_fetch: status.last_fetch.map(|at| at.to_rfc3339()),
        last_error: status.last_error,
        cache_ttl_seconds: cache.ttl().as_secs(),
    })
}
