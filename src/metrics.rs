use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex;

use crate::client::Status;
use crate::workload::Operation;

#[derive(Default, Clone, Debug)]
struct OpStats {
    latencies: Vec<Duration>,
    statuses: BTreeMap<Status, u64>,
}

#[derive(Default, Clone, Debug)]
pub struct Metrics {
    ops: BTreeMap<Operation, OpStats>,
    elapsed: Duration,
}

/// Shared sink the client tasks merge their local metrics into.
#[derive(Default, Clone)]
pub struct ConcurrentMetrics {
    metrics: Arc<Mutex<Metrics>>,
}

impl ConcurrentMetrics {
    pub async fn merge(&self, local: Metrics) {
        self.metrics.lock().await.merge(local);
    }

    pub async fn get_metrics(&self) -> Metrics {
        self.metrics.lock().await.clone()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatencyStats {
    pub count: u64,
    pub min_us: f64,
    pub max_us: f64,
    pub avg_us: f64,
    pub p50_us: f64,
    pub p95_us: f64,
    pub p99_us: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct OpSummary {
    pub operation: Operation,
    pub ok: u64,
    pub error: u64,
    pub not_found: u64,
    pub latency: LatencyStats,
}

#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub operations: u64,
    pub elapsed_secs: f64,
    pub throughput: f64,
    pub finished_at: String,
    pub per_operation: Vec<OpSummary>,
}

impl Metrics {
    pub fn record(&mut self, op: Operation, status: Status, duration: Duration) {
        let stats = self.ops.entry(op).or_default();
        stats.latencies.push(duration);
        *stats.statuses.entry(status).or_default() += 1;
    }

    pub fn merge(&mut self, other: Metrics) {
        for (op, theirs) in other.ops {
            let ours = self.ops.entry(op).or_default();
            ours.latencies.extend(theirs.latencies);
            for (status, count) in theirs.statuses {
                *ours.statuses.entry(status).or_default() += count;
            }
        }
        self.elapsed = self.elapsed.max(other.elapsed);
    }

    pub fn set_elapsed(&mut self, elapsed: Duration) {
        self.elapsed = elapsed;
    }

    pub fn operations(&self) -> u64 {
        self.ops.values().map(|s| s.latencies.len() as u64).sum()
    }

    pub fn count(&self, op: Operation, status: Status) -> u64 {
        self.ops
            .get(&op)
            .and_then(|s| s.statuses.get(&status))
            .copied()
            .unwrap_or(0)
    }

    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.operations() as f64 / secs
        } else {
            0.0
        }
    }

    pub fn summary(&self) -> Summary {
        let per_operation = self
            .ops
            .iter()
            .filter_map(|(op, stats)| {
                let latency = Self::calculate_stats(&stats.latencies)?;
                let count = |status: Status| stats.statuses.get(&status).copied().unwrap_or(0);
                Some(OpSummary {
                    operation: *op,
                    ok: count(Status::Ok),
                    error: count(Status::Error),
                    not_found: count(Status::NotFound),
                    latency,
                })
            })
            .collect();

        Summary {
            operations: self.operations(),
            elapsed_secs: self.elapsed.as_secs_f64(),
            throughput: self.throughput(),
            finished_at: chrono::Utc::now().to_rfc3339(),
            per_operation,
        }
    }

    fn format_duration(nanos: f64) -> String {
        if nanos < 1_000.0 {
            format!("{:.2} ns", nanos)
        } else if nanos < 1_000_000.0 {
            format!("{:.2} µs", nanos / 1_000.0)
        } else if nanos < 1_000_000_000.0 {
            format!("{:.2} ms", nanos / 1_000_000.0)
        } else {
            format!("{:.2} s", nanos / 1_000_000_000.0)
        }
    }

    fn calculate_stats(latencies: &[Duration]) -> Option<LatencyStats> {
        if latencies.is_empty() {
            return None;
        }
        let count = latencies.len() as u64;

        // Streaming mean avoids overflow on long runs
        let mut avg = 0.0;
        for (i, d) in latencies.iter().enumerate() {
            avg += (d.as_nanos() as f64 - avg) / (i + 1) as f64;
        }

        let mut sorted: Vec<_> = latencies.to_vec();
        sorted.sort_unstable();
        let at = |pct: u64| sorted[((count - 1) * pct / 100) as usize].as_nanos() as f64 / 1_000.0;

        Some(LatencyStats {
            count,
            min_us: sorted[0].as_nanos() as f64 / 1_000.0,
            max_us: sorted[sorted.len() - 1].as_nanos() as f64 / 1_000.0,
            avg_us: avg / 1_000.0,
            p50_us: at(50),
            p95_us: at(95),
            p99_us: at(99),
        })
    }
}

fn operation_label(op: Operation) -> &'static str {
    match op {
        Operation::Read => "Reads",
        Operation::Update => "Updates",
        Operation::Insert => "Inserts",
        Operation::Scan => "Scans",
        Operation::ReadModifyWrite => "Read-Modify",
    }
}

impl Display for Metrics {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "Operations: {}  Elapsed: {}  Throughput: {:.2} ops/sec",
            self.operations(),
            Self::format_duration(self.elapsed.as_nanos() as f64),
            self.throughput()
        )?;
        writeln!(f, "\nDetailed Latency Statistics:")?;
        writeln!(
            f,
            "{:<15} {:<10} {:<10} {:<10} {:<12} {:<12} {:<12} {:<12} {:<12}",
            "Operation", "OK", "Error", "NotFound", "Min", "Max", "Median", "P95", "P99"
        )?;
        writeln!(f, "{:-<111}", "")?;

        for (op, stats) in &self.ops {
            let Some(s) = Self::calculate_stats(&stats.latencies) else {
                continue;
            };
            let count = |status: Status| stats.statuses.get(&status).copied().unwrap_or(0);
            let us = |v: f64| Self::format_duration(v * 1_000.0);
            writeln!(
                f,
                "{:<15} {:<10} {:<10} {:<10} {:<12} {:<12} {:<12} {:<12} {:<12}",
                operation_label(*op),
                count(Status::Ok),
                count(Status::Error),
                count(Status::NotFound),
                us(s.min_us),
                us(s.max_us),
                us(s.p50_us),
                us(s.p95_us),
                us(s.p99_us)
            )?;
        }

        Ok(())
    }
}
