use anyhow::Result;
use chain_gateway::db::schema;
use dotenv::dotenv;
use sqlx::postgres::PgPoolOptions;

/// Standalone schema bootstrap, useful for provisioning a database ahead
/// of the first `chain-gateway` run (e.g. in a migration/deploy step).
#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    let database_url =
        std::env::var("DATABASE_URL").expect("DATABASE_URL must be set to run init_schema");

    let pool = PgPoolOptions::new().connect(&database_url).await?;

    println!("creating schema...");
    schema::initialize_database(&pool).await?;
    println!("schema ready");

    Ok(())
}
