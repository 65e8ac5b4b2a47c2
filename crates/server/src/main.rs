use std::{net::SocketAddr, sync::Arc};

use server_api::{auth::AuthConfig, ApiContext};
use storage::Storage;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod api;
mod app_state;
mod config;

use app_state::AppState;
use config::{load_settings, prepare_database_url, Settings, DEFAULT_JWT_SECRET};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = load_settings();
    let state = build_state(&settings).await?;
    let app = api::build_router(Arc::new(state));

    let addr: SocketAddr = settings.server_bind.parse()?;
    info!(%addr, "server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn build_state(settings: &Settings) -> anyhow::Result<AppState> {
    if settings.jwt_secret == DEFAULT_JWT_SECRET {
        warn!("using the built-in development JWT secret; set JWT_SECRET in production");
    }

    let database_url = prepare_database_url(&settings.database_url)?;
    let storage = Storage::new(&database_url).await.map_err(|error| {
        error!(
            %database_url,
            %error,
            "failed to open SQLite database; verify parent directory exists and permissions are correct"
        );
        error
    })?;

    let api = ApiContext {
        storage,
        auth: AuthConfig {
            jwt_secret: settings.jwt_secret.clone(),
            token_ttl_seconds: settings.token_ttl_seconds,
        },
    };
    Ok(AppState::new(api))
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
