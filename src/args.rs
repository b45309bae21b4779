use std::path::PathBuf;

use crate::database::Database;
use crate::properties::parse_key_value;
use crate::workload::{RequestDistribution, WorkloadType};
use clap::ArgAction;
use clap::Parser;
use clap::ValueEnum;

#[derive(Parser, Debug)]
#[command(term_width = 0)]
pub struct Args {
    /// The database to benchmark
    #[arg(short, long, default_value = "tarantool")]
    pub database: Database,

    /// YCSB core workload
    #[arg(long)]
    pub workload: WorkloadType,

    /// Which phases to execute
    #[arg(long, default_value = "all")]
    pub phase: Phase,

    /// Number of records to load initially
    #[arg(long, default_value = "1000")]
    pub record_count: u64,

    /// Number of operations to perform in the run phase
    #[arg(long, default_value = "1000")]
    pub operation_count: u64,

    /// Number of concurrent clients, each with its own connection
    #[arg(long, default_value = "1")]
    pub num_clients: u32,

    /// Table name passed to the binding
    #[arg(long, default_value = "usertable")]
    pub table: String,

    /// Fields per record
    #[arg(long, default_value = "10")]
    pub field_count: usize,

    /// Field length (min:max or fixed)
    #[arg(long, default_value = "100")]
    pub field_length: String,

    /// Upper bound of a scan length
    #[arg(long, default_value = "100")]
    pub max_scan_length: usize,

    /// Read every field instead of a single random one
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    pub read_all_fields: bool,

    /// Key chooser; defaults to the workload's own
    #[arg(long)]
    pub request_distribution: Option<RequestDistribution>,

    /// Seed for reproducible key and value generation
    #[arg(long)]
    pub seed: Option<u64>,

    /// Property file of key=value lines
    #[arg(short = 'P', long)]
    pub property_file: Option<PathBuf>,

    /// Property override, e.g. -p tarantool.port=3302
    #[arg(short = 'p', long = "property", value_parser = parse_key_value)]
    pub properties: Vec<(String, String)>,

    /// Tokio worker threads
    #[arg(long, default_value_t = num_cpus::get())]
    pub worker_threads: usize,

    /// Stack size of runtime threads in bytes
    #[arg(long)]
    pub thread_stack_size: Option<usize>,

    /// Upper bound on blocking threads
    #[arg(long)]
    pub max_blocking_threads: Option<usize>,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq)]
pub enum Phase {
    Load,
    Run,
    All,
}

impl Phase {
    pub fn loads(self) -> bool {
        matches!(self, Phase::Load | Phase::All)
    }

    pub fn runs(self) -> bool {
        matches!(self, Phase::Run | Phase::All)
    }
}
