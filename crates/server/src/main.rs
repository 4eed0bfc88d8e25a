use std::{net::SocketAddr, sync::Arc};

use analysis::AnalysisSession;
use anyhow::Context;
use predictor::GradioPredictor;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod api;
mod app_state;
mod config;

use crate::app_state::AppState;
use crate::config::load_settings;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = load_settings()?;
    let predictor = GradioPredictor::new(settings.predictor_config()).map_err(|error| {
        error!(
            predictor_url = %settings.predictor_url,
            %error,
            "failed to configure predictor client; verify predictor_url and predictor_api_name"
        );
        error
    })?;
    info!(api_root = %predictor.api_root(), "predictor configured");

    let policy = settings.upload_policy();
    let state = AppState::new(AnalysisSession::new(policy), Arc::new(predictor));
    let app = api::build_router(Arc::new(state), policy.max_bytes);

    let addr: SocketAddr = settings
        .bind_addr
        .parse()
        .with_context(|| format!("invalid bind address '{}'", settings.bind_addr))?;
    info!(%addr, "server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
