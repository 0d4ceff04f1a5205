use std::time::Duration;

use axum::{routing::get, Router};
use seo4ajax_http::{ClientConfig, PrerenderClient, PrerenderLayer};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("seo4ajax_http=debug")),
        )
        .init();

    let token = std::env::var("SEO4AJAX_TOKEN")?;

    let client = PrerenderClient::new(
        ClientConfig::new(token)
            .with_retry_unavailable(true)
            .with_retry_budget(Duration::from_secs(20))
            .with_fetch_timeout(Duration::from_secs(5)),
    )?;

    let app = Router::new()
        .route("/", get(|| async { "<html><body><div id=\"app\"></div></body></html>" }))
        .route("/app.js", get(|| async { "document.getElementById('app').textContent = 'hi'" }))
        .layer(PrerenderLayer::new(client));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:3000").await?;
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
