//! Import legacy CSV exports (`reservations.csv`, `addons.csv`,
//! `payments.csv`) from the working directory.

use reservation_service::services::MongoStore;
use reservation_tools::config::ToolConfig;
use reservation_tools::import::Importer;
use reservation_tools::init_cli_tracing;
use secrecy::ExposeSecret;
use std::path::Path;

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

    tracing::info!(database = %config.mongodb_database, "Starting legacy import");
    let summary = Importer::new(&store).run(Path::new(".")).await?;
    println!("{}", summary);
    Ok(())
}
