mod cli;

use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use registry_core::metrics::{AtomicMetrics, Counter, MetricsSink};
use registry_postgres::PostgresStore;
use registry_transform::{Consolidator, StagingStore};

use cli::{Cli, Command};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    let args = Cli::parse();

    let rt = tokio::runtime::Runtime::new().context("starting tokio runtime")?;
    let store = rt
        .block_on(PostgresStore::connect(&args.database_url, &args.schema))
        .context("connecting to postgres")?;

    match args.command {
        Command::Create => rt.block_on(store.create())?,
        Command::Drop => rt.block_on(store.drop())?,
        Command::Load { staging_dir, batch_size } => {
            let staging = StagingStore::open(&staging_dir)
                .with_context(|| format!("opening staging dir {staging_dir:?}"))?;
            let metrics = Arc::new(AtomicMetrics::default());
            rt.block_on(store.pre_load())?;
            let stats = Consolidator::new(&staging, batch_size)
                .with_metrics(Arc::clone(&metrics) as Arc<dyn MetricsSink>)
                .run(&mut |batch| rt.block_on(store.create_companies(&batch)))?;
            rt.block_on(store.post_load())?;
            rt.block_on(store.meta_save("imported_at", &Utc::now().to_rfc3339()))?;
            info!(
                produced = stats.produced,
                skipped = stats.skipped,
                batches = metrics.get(Counter::BatchesLoaded),
                "import finished"
            );
        }
        Command::Index { names } => rt.block_on(store.create_extra_indexes(&names))?,
        Command::Get { cnpj } => {
            let doc = rt.block_on(store.get_company(&cnpj))?;
            println!("{doc}");
        }
    }
    rt.block_on(store.close());
    Ok(())
}
