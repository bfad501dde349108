//! spread-reversion - Rolling band research for commodity futures differentials

use anyhow::Result;

use spread_reversion::adapters::cli;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if it exists (SPREAD_DATA_DIR, RUST_LOG)
    dotenvy::dotenv().ok();

    let app = cli::init();
    cli::execute(app).await
}
