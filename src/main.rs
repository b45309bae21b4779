mod args;
mod client;
mod database;
mod metrics;
mod properties;
mod runner;
mod tarantool;
mod workload;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::args::Args;
use crate::client::Client;
use crate::database::Database;
use crate::metrics::Metrics;
use crate::properties::Properties;
use crate::runner::Runner;
use crate::tarantool::TarantoolClient;
use crate::workload::{CoreWorkload, FieldLengthConfig, WorkloadConfig};

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing();

    let props = Properties::load(args.property_file.as_deref(), &args.properties)?;
    let config = create_workload_config(&args)?;
    let runtime = configure_runtime(&args)?;

    runtime.block_on(async {
        match args.database {
            Database::Tarantool => run_bench(TarantoolClient::new, &args, props, config).await,
        }
    })
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn configure_runtime(args: &Args) -> Result<tokio::runtime::Runtime> {
    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.worker_threads(args.worker_threads.max(1)).enable_all();

    if let Some(stack_size) = args.thread_stack_size {
        builder.thread_stack_size(stack_size);
    }

    if let Some(max_threads) = args.max_blocking_threads {
        builder.max_blocking_threads(max_threads);
    }

    builder.build().context("building tokio runtime")
}

fn create_workload_config(args: &Args) -> Result<WorkloadConfig> {
    let mut config = WorkloadConfig::for_workload(args.workload);
    config.table = args.table.clone();
    config.record_count = args.record_count;
    config.operation_count = args.operation_count;
    config.field_count = args.field_count;
    config.field_length = FieldLengthConfig::parse(&args.field_length)
        .with_context(|| format!("invalid --field-length {:?}", args.field_length))?;
    config.max_scan_length = args.max_scan_length;
    config.read_all_fields = args.read_all_fields;
    if let Some(distribution) = args.request_distribution {
        config.request_distribution = distribution;
    }
    Ok(config)
}

async fn run_bench<C, F>(factory: F, args: &Args, props: Properties, config: WorkloadConfig) -> Result<()>
where
    C: Client,
    F: Fn() -> C,
{
    println!(
        "Starting {:?} benchmark: workload {:?}, {} records, {} operations, {} clients",
        args.database, args.workload, config.record_count, config.operation_count, args.num_clients
    );

    let workload = CoreWorkload::new(config)?;
    let runner = Runner::new(factory, props, workload, args.num_clients).with_seed(args.seed);

    if args.phase.loads() {
        let metrics = runner.load().await?;
        report("Load", &metrics, args.json)?;
    }
    if args.phase.runs() {
        let metrics = runner.run().await?;
        report("Run", &metrics, args.json)?;
    }
    Ok(())
}

fn report(phase: &str, metrics: &Metrics, json: bool) -> Result<()> {
    if json {
        let summary = serde_json::json!({
            "phase": phase,
            "metrics": metrics.summary(),
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("\n{} Phase Results:", phase);
        println!("{}", metrics);
    }
    Ok(())
}
