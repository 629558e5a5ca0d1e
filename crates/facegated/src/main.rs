use anyhow::{Context, Result};
use facegate_core::onnx::InsightFaceAnalyzer;
use facegated::{api, spawn_engine, AppContext, Config};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("facegated starting");

    let config = Config::from_env();

    let analyzer = InsightFaceAnalyzer::load(&config.model_dir)
        .with_context(|| format!("loading face models from {}", config.model_dir.display()))?;
    tracing::info!(dir = %config.model_dir.display(), "face models loaded");

    let engine = spawn_engine(analyzer)?;
    let backend = config.build_backend()?;
    let ctx = Arc::new(AppContext::new(backend, engine));

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("binding {}", config.bind))?;
    tracing::info!(
        addr = %config.bind,
        mode = %ctx.storage_mode(),
        threshold = facegate_core::VERIFICATION_THRESHOLD,
        "facegated ready"
    );

    api::serve(listener, api::router(ctx, config.max_upload_bytes), shutdown_signal()).await?;

    tracing::info!("facegated shutting down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}
