pub mod commands;
pub mod config;
pub mod doc_processor;
pub mod error;
pub mod llm;
pub mod session;
pub mod view;

use std::sync::Arc;

use anyhow::Context;

use commands::AppState;
use config::Config;
use doc_processor::ocr::TesseractCli;
use llm::Provider;

/// Serve the viewer until Ctrl-C.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let provider = match Provider::from_config(&config.chat) {
        Ok(provider) => {
            tracing::info!(provider = provider.name(), model = %config.chat.model, "Chat assistant enabled");
            Some(provider)
        }
        Err(e) => {
            tracing::warn!(error = %e, "Chat assistant disabled");
            None
        }
    };

    let ocr = Arc::new(TesseractCli::new(&config.ocr));
    let state = AppState::new(&config, ocr, provider);
    let app = commands::router(state, config.server.body_limit_bytes);

    let listener = tokio::net::TcpListener::bind(config.server.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind))?;
    let addr = listener.local_addr()?;
    tracing::info!(%addr, "{} listening", config::APP_NAME);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown signal received");
        })
        .await
        .context("Server error")?;

    Ok(())
}
