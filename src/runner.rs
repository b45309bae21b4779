use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::task::JoinSet;
use tracing::{debug, info};

use crate::client::{Client, Status};
use crate::metrics::{ConcurrentMetrics, Metrics};
use crate::properties::Properties;
use crate::workload::{CoreWorkload, Operation};

/// Drives a workload over `num_clients` tasks. Every task builds its own
/// binding from `factory`, so no connection is shared between tasks.
pub struct Runner<F> {
    factory: F,
    props: Properties,
    workload: Arc<CoreWorkload>,
    num_clients: u32,
    seed: Option<u64>,
}

impl<C, F> Runner<F>
where
    C: Client,
    F: Fn() -> C,
{
    pub fn new(factory: F, props: Properties, workload: CoreWorkload, num_clients: u32) -> Self {
        Self {
            factory,
            props,
            workload: Arc::new(workload),
            num_clients: num_clients.max(1),
            seed: None,
        }
    }

    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    fn rng(&self, client_id: u32) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(client_id as u64)),
            None => StdRng::from_entropy(),
        }
    }

    /// Insert `record_count` records, interleaving key numbers across tasks.
    pub async fn load(&self) -> Result<Metrics> {
        let record_count = self.workload.config().record_count;
        info!(
            record_count,
            clients = self.num_clients,
            "Loading initial dataset"
        );

        let metrics = ConcurrentMetrics::default();
        let started = Instant::now();
        let mut tasks = JoinSet::new();

        for client_id in 0..self.num_clients {
            let client = (self.factory)();
            let props = self.props.clone();
            let workload = self.workload.clone();
            let metrics = metrics.clone();
            let mut rng = self.rng(client_id);
            let stride = self.num_clients as usize;

            tasks.spawn(async move {
                let keys = (client_id as u64..record_count).step_by(stride);
                let local = load_worker(client, &props, &workload, keys, &mut rng).await?;
                metrics.merge(local).await;
                Ok::<_, anyhow::Error>(())
            });
        }

        // returning early drops the set, which aborts the remaining tasks
        while let Some(joined) = tasks.join_next().await {
            joined.context("load task panicked")??;
        }

        let mut result = metrics.get_metrics().await;
        result.set_elapsed(started.elapsed());
        Ok(result)
    }

    /// Execute `operation_count` operations drawn from the workload mix.
    pub async fn run(&self) -> Result<Metrics> {
        let operation_count = self.workload.config().operation_count;
        info!(
            operation_count,
            clients = self.num_clients,
            "Running transaction phase"
        );

        let metrics = ConcurrentMetrics::default();
        let started = Instant::now();
        let mut tasks = JoinSet::new();
        let per_client = operation_count / self.num_clients as u64;
        let remainder = operation_count % self.num_clients as u64;

        for client_id in 0..self.num_clients {
            let client = (self.factory)();
            let props = self.props.clone();
            let workload = self.workload.clone();
            let metrics = metrics.clone();
            let mut rng = self.rng(client_id);
            let ops = per_client + u64::from((client_id as u64) < remainder);

            tasks.spawn(async move {
                let local = run_worker(client, client_id, &props, &workload, ops, &mut rng).await?;
                metrics.merge(local).await;
                Ok::<_, anyhow::Error>(())
            });
        }

        // returning early drops the set, which aborts the remaining tasks
        while let Some(joined) = tasks.join_next().await {
            joined.context("run task panicked")??;
        }

        let mut result = metrics.get_metrics().await;
        result.set_elapsed(started.elapsed());
        Ok(result)
    }
}

async fn load_worker<C: Client>(
    mut client: C,
    props: &Properties,
    workload: &CoreWorkload,
    keys: impl Iterator<Item = u64>,
    rng: &mut StdRng,
) -> Result<Metrics> {
    client.init(props).await?;
    let mut local = Metrics::default();
    for key_num in keys {
        insert_record(&mut client, workload, key_num, rng, &mut local).await;
    }
    client.cleanup().await?;
    Ok(local)
}

async fn run_worker<C: Client>(
    mut client: C,
    client_id: u32,
    props: &Properties,
    workload: &CoreWorkload,
    ops: u64,
    rng: &mut StdRng,
) -> Result<Metrics> {
    client.init(props).await?;
    let mut local = Metrics::default();
    let report_every = (ops / 10).max(1);
    for i in 0..ops {
        if i % report_every == 0 {
            debug!(client_id, done = i, total = ops, "progress");
        }
        do_transaction(&mut client, workload, rng, &mut local).await;
    }
    client.cleanup().await?;
    Ok(local)
}

async fn insert_record<C: Client>(
    client: &mut C,
    workload: &CoreWorkload,
    key_num: u64,
    rng: &mut StdRng,
    metrics: &mut Metrics,
) {
    let key = workload.build_key(key_num);
    let values = workload.build_values(rng);
    let start = Instant::now();
    let status = client.insert(workload.table(), &key, &values).await;
    metrics.record(Operation::Insert, status, start.elapsed());
}

async fn do_transaction<C: Client>(
    client: &mut C,
    workload: &CoreWorkload,
    rng: &mut StdRng,
    metrics: &mut Metrics,
) {
    let table = workload.table();
    match workload.next_operation(rng) {
        Operation::Read => {
            let key = workload.build_key(workload.next_key_num(rng));
            let fields = workload.field_set(rng);
            let start = Instant::now();
            let lookup = client.read(table, &key, fields.as_ref()).await;
            let status = if lookup.is_not_found() {
                Status::NotFound
            } else {
                lookup.status()
            };
            metrics.record(Operation::Read, status, start.elapsed());
        }
        Operation::Update => {
            let key = workload.build_key(workload.next_key_num(rng));
            let values = workload.build_values(rng);
            let start = Instant::now();
            let status = client.update(table, &key, &values).await;
            metrics.record(Operation::Update, status, start.elapsed());
        }
        Operation::Insert => {
            let key_num = workload.next_insert_key_num();
            insert_record(client, workload, key_num, rng, metrics).await;
        }
        Operation::Scan => {
            let start_key = workload.build_key(workload.next_key_num(rng));
            let len = workload.scan_length(rng);
            let fields = workload.field_set(rng);
            let start = Instant::now();
            let status = match client.scan(table, &start_key, len, fields.as_ref()).await {
                Ok(_) => Status::Ok,
                Err(status) => status,
            };
            metrics.record(Operation::Scan, status, start.elapsed());
        }
        Operation::ReadModifyWrite => {
            let key = workload.build_key(workload.next_key_num(rng));
            let fields = workload.field_set(rng);
            let values = workload.build_values(rng);
            let start = Instant::now();
            let lookup = client.read(table, &key, fields.as_ref()).await;
            let written = client.update(table, &key, &values).await;
            let status = match (lookup.status(), written) {
                (Status::Ok, Status::Ok) => Status::Ok,
                _ if lookup.is_not_found() => Status::NotFound,
                _ => Status::Error,
            };
            metrics.record(Operation::ReadModifyWrite, status, start.elapsed());
        }
    }
}
