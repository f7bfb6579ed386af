use anyhow::{Context, Result};
use facematch_core::OnnxEncoder;
use tracing_subscriber::EnvFilter;

mod config;
mod engine;
mod http;
mod store;
#[cfg(test)]
mod test_support;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = config::Config::from_env();
    tracing::info!(
        bind = %config.bind_addr,
        gallery_dir = %config.gallery_dir.display(),
        model_dir = %config.model_dir.display(),
        threshold = config.match_threshold,
        timeout_secs = config.request_timeout_secs,
        workers = config.workers,
        "facematchd starting"
    );

    let model_dir = config.model_dir.clone();
    let engine = engine::spawn_engine(config.workers, |_| OnnxEncoder::from_model_dir(&model_dir))
        .context("starting recognition engine")?;

    let state = http::AppState::new(engine, &config);

    // Queries are answered with "Encodings not loaded" until this finishes.
    let loader = state.clone();
    tokio::spawn(async move {
        if let Err(err) = loader.reload_gallery().await {
            tracing::error!(error = %err, "initial gallery build failed");
        }
    });

    let app = http::router(state, config.max_upload_bytes);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.bind_addr))?;
    tracing::info!(addr = %listener.local_addr()?, "facematchd ready");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("facematchd shutting down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for ctrl-c; running until killed");
        std::future::pending::<()>().await;
    }
}
