use anyhow::Result;
use authz_core::LdapDirectory;
use ldapgate::{router, AppState, Settings};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = Settings::from_env()?;
    let port = settings.port;
    info!(
        port,
        cache_expiration_secs = settings.cache_expiration.as_secs(),
        brute_force_protection = settings.guard.enabled,
        "Starting ldapgate"
    );

    let state = AppState::new(settings, Arc::new(LdapDirectory::new()));
    let listener = tokio::net::TcpListener::bind(SocketAddr::from(([0, 0, 0, 0], port))).await?;
    axum::serve(
        listener,
        router(state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
