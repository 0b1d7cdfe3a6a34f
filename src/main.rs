use std::sync::Arc;

use dotenv::dotenv;
use tracing_subscriber::EnvFilter;

use filegate::bot::run_bot;
use filegate::config::AppConfig;
use filegate::db::create_pool;
use filegate::http_server::run_http_server;
use filegate::store::{PgStore, Store};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::from_env()?;
    let pool = Arc::new(create_pool(&config.database_url)?);
    let store: Store = Arc::new(PgStore::new(pool));

    tokio::task::spawn(run_bot(store.clone(), config.clone()));
    run_http_server(store, config).await?;

    Ok(())
}
