mod catalog;
mod config;
mod db;
mod entities;
mod error;
mod models;
mod reference;
mod routes;
#[cfg(test)]
mod test_support;
mod uploads;

use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::{config::Config, uploads::PosterStore};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db: DatabaseConnection,
    pub posters: PosterStore,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "info,cinecatalog=debug,sqlx=warn".to_string()),
        )
        .init();

    let config = Arc::new(Config::from_env()?);

    let db = db::connect_and_migrate(&config.database_url).await?;
    let posters = PosterStore::new(config.uploads_dir.clone());

    let state = Arc::new(AppState { config: config.clone(), db, posters });
    let app = routes::router(state);

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    tracing::info!(addr = %config.addr, uploads = %config.uploads_dir.display(), "listening");
    axum::serve(listener, app).await?;

    Ok(())
}
