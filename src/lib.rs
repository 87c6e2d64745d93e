pub mod cache;
pub mod config;
pub mod domain;
pub mod filter;
pub mod github;
pub mod health;
pub mod refresh;
pub mod render;
pub mod server;

use std::sync::Arc;

use crate::{
    cache::FeedCache,
    config::Config,
    github::GitHubClient,
    refresh::Refresher,
    server::AppState,
};

pub async fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    config.log_summary();

    let client = GitHubClient::new(config.github.clone())?;
    let cache = Arc::new(FeedCache::new(config.cache_ttl));
    let refresher = Arc::new(Refresher::new(
        Arc::new(client),
        config.filter.clone(),
        cache,
        config.github.timeout,
    ));
    refresher.spawn_loop();

    let state = AppState {
        refresher,
        presentation: Arc::new(config.render.clone()),
    };
    server::serve(&config.bind, state).await?;
    Ok(())
}
