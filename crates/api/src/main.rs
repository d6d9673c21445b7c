use anyhow::Context;

use scholar_api::app::{build_app, services};
use scholar_infra::{AppConfig, seed};
use scholar_observability::LogFormat;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let format = match std::env::var("SCHOLAR_LOG_FORMAT") {
        Ok(raw) => raw.parse::<LogFormat>()?,
        Err(_) => LogFormat::default(),
    };
    scholar_observability::init(format);

    let config = AppConfig::from_env()?;

    match std::env::args().nth(1).as_deref() {
        Some("seed") => {
            let store = services::open_store(&config).await?;
            let outcome = seed(&*store, &config.admin).await?;
            tracing::info!(?outcome, "seed finished");
            return Ok(());
        }
        Some(other) => anyhow::bail!("unknown command '{other}' (expected: seed)"),
        None => {}
    }

    let services = services::build_services(&config).await?;
    let app = build_app(services, &config);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, app).await?;
    Ok(())
}
