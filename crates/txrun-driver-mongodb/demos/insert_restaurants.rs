//! Insert two restaurants in one transaction
//!
//! ```bash
//! TXRUN_MONGODB_URI="mongodb+srv://user:pw@cluster0.example.net" \
//!     cargo run -p txrun-driver-mongodb --example insert_restaurants
//! ```
//!
//! `TXRUN_CONFIG` may point at a runner configuration file, and
//! `TXRUN_LOG_FORMAT=json` switches log output to JSON lines. `RUST_LOG`
//! takes precedence over the default filter.

use anyhow::Context;
use bson::doc;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};
use txrun_core::{ReadConcernLevel, TransactionOptions, WriteConcern};
use txrun_driver_mongodb::{ConnectionSettings, MongoClient, MongoSession};
use txrun_runner::{RunnerConfig, TransactionRunner};

const DATABASE: &str = "sample_restaurants";
const COLLECTION: &str = "restaurants";

fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,txrun_runner=debug,txrun_driver_mongodb=debug"));

    let json = std::env::var("TXRUN_LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));
    let layer = if json {
        fmt::layer()
            .with_target(true)
            .json()
            .with_current_span(true)
            .with_filter(env_filter)
            .boxed()
    } else {
        fmt::layer()
            .with_target(true)
            .with_ansi(true)
            .with_filter(env_filter)
            .boxed()
    };

    tracing_subscriber::registry().with(layer).init();
}

async fn insert_documents(session: &mut MongoSession) -> txrun_core::Result<()> {
    session
        .insert_one(COLLECTION, doc! { "name": "Rust Sync Pizza", "cuisine": "Pizza" })
        .await?;
    session
        .insert_one(COLLECTION, doc! { "name": "Rust Sync Burger", "cuisine": "Burger" })
        .await?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    let uri = std::env::var("TXRUN_MONGODB_URI")
        .unwrap_or_else(|_| "mongodb://localhost:27017/?replicaSet=rs0".to_string());
    let config = match std::env::var("TXRUN_CONFIG") {
        Ok(path) => RunnerConfig::load(&path).with_context(|| format!("loading {path}"))?,
        Err(_) => RunnerConfig::default(),
    };

    let settings = ConnectionSettings::from_uri(uri, DATABASE).with_app_name("txrun-demo");
    let client = MongoClient::connect(&settings).await?;
    client.ping().await.context("pinging deployment")?;
    tracing::info!("Pinged your deployment. You successfully connected to MongoDB!");

    let options = TransactionOptions::new()
        .with_read_concern(ReadConcernLevel::Local)
        .with_write_concern(WriteConcern::majority());
    let runner = TransactionRunner::from_config(&config);

    let mut session = client.start_session().await?;
    match runner
        .execute(&mut session, &options, |s| Box::pin(insert_documents(s)))
        .await
    {
        Ok(report) => tracing::info!(
            attempts = report.attempts,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Transaction succeeded"
        ),
        Err(e) => tracing::error!(error = %e, "Transaction failed"),
    }

    drop(session);
    client.shutdown().await;
    Ok(())
}
