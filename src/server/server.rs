use anyhow::{Context, Result};
use axum::Router;
use tracing::info;

use crate::config::settings::SettingsConfig;
use crate::observability::metrics::get_metrics;
use crate::observability::routes::MetricsState;

/// Serves the metrics route until the listener fails. Returns right away
/// when metrics are disabled.
pub async fn start(settings_config: &SettingsConfig) -> Result<()> {
    let metrics = get_metrics().await;
    let state = MetricsState::new(metrics.registry.clone());

    let app: Router = Router::new().merge(state.router(&settings_config.metrics));

    if app.has_routes() {
        let bind_addr = &settings_config.server.host;
        let port = &settings_config.server.port;
        info!("metrics server listening on {}:{}", bind_addr, port);
        let listener = tokio::net::TcpListener::bind(format!("{}:{}", bind_addr, port))
            .await
            .with_context(|| format!("binding {}:{}", bind_addr, port))?;
        metrics.up.set(1);
        axum::serve(listener, app).await?;
    }

    Ok(())
}
