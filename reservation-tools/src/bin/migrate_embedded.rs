//! Move `addons` / `payments` arrays embedded in reservation documents into
//! their own collections. Safe to re-run.

use reservation_service::services::MongoStore;
use reservation_tools::config::ToolConfig;
use reservation_tools::init_cli_tracing;
use reservation_tools::migrate::Migrator;
use secrecy::ExposeSecret;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_cli_tracing("info");

    let config = ToolConfig::from_env()?;
    let store = MongoStore::connect(
        config.mongodb_uri.expose_secret(),
        &config.mongodb_database,
        config.use_transactions,
    )
    .await?;
    store.init_indexes().await?;

    let summary = Migrator::new(&store, config.use_transactions).run().await?;
    println!("{}", summary);
    Ok(())
}
