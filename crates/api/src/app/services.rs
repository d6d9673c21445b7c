use std::sync::Arc;

use anyhow::Context;

use scholar_infra::{AppConfig, InMemoryStore, PostgresStore, Services, Store, seed};

/// Open the configured store, applying the schema to Postgres.
pub async fn open_store(config: &AppConfig) -> anyhow::Result<Arc<dyn Store>> {
    match &config.database_url {
        Some(url) => {
            let store = PostgresStore::connect(url)
                .await
                .context("connect to postgres")?;
            store.migrate().await.context("apply schema")?;
            Ok(Arc::new(store))
        }
        None => Ok(Arc::new(InMemoryStore::new())),
    }
}

/// Store + seed + services, as the server runs them.
///
/// The in-memory store starts empty on every run, so it is always seeded.
pub async fn build_services(config: &AppConfig) -> anyhow::Result<Services> {
    let store = open_store(config).await?;
    if config.seed_on_start || config.database_url.is_none() {
        let outcome = seed(&*store, &config.admin).await.context("seed store")?;
        tracing::info!(?outcome, "seed finished");
    }
    Ok(Services::new(store, config.session_ttl))
}
