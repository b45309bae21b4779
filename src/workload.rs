use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{anyhow, bail, Result};
use clap::ValueEnum;
use rand::distributions::{Distribution, Uniform};
use rand::rngs::StdRng;
use rand::Rng;
use rand_distr::Zipf;
use serde::{Deserialize, Serialize};

use crate::client::Fields;

/// Skew of the zipfian request distribution.
const ZIPFIAN_CONSTANT: f64 = 0.99;

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkloadType {
    A, // 50% read, 50% update
    B, // 95% read, 5% update
    C, // 100% read
    D, // 95% read, 5% insert latest
    E, // 95% scan, 5% insert
    F, // 50% read, 50% read-modify-write
}

impl WorkloadType {
    pub fn proportions(self) -> Proportions {
        let base = Proportions::default();
        match self {
            WorkloadType::A => Proportions {
                read: 0.5,
                update: 0.5,
                ..base
            },
            WorkloadType::B => Proportions {
                read: 0.95,
                update: 0.05,
                ..base
            },
            WorkloadType::C => Proportions { read: 1.0, ..base },
            WorkloadType::D => Proportions {
                read: 0.95,
                insert: 0.05,
                ..base
            },
            WorkloadType::E => Proportions {
                scan: 0.95,
                insert: 0.05,
                ..base
            },
            WorkloadType::F => Proportions {
                read: 0.5,
                read_modify_write: 0.5,
                ..base
            },
        }
    }

    pub fn request_distribution(self) -> RequestDistribution {
        match self {
            WorkloadType::D => RequestDistribution::Latest,
            _ => RequestDistribution::Zipfian,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestDistribution {
    Uniform,
    Zipfian,
    Latest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Operation {
    Read,
    Update,
    Insert,
    Scan,
    ReadModifyWrite,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Proportions {
    pub read: f64,
    pub update: f64,
    pub insert: f64,
    pub scan: f64,
    pub read_modify_write: f64,
}

impl Proportions {
    fn weighted(&self) -> [(Operation, f64); 5] {
        [
            (Operation::Read, self.read),
            (Operation::Update, self.update),
            (Operation::Insert, self.insert),
            (Operation::Scan, self.scan),
            (Operation::ReadModifyWrite, self.read_modify_write),
        ]
    }

    pub fn total(&self) -> f64 {
        self.weighted().iter().map(|(_, w)| w).sum()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SizeDistribution {
    Fixed(usize),
    Uniform,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldLengthConfig {
    pub min_size: usize,
    pub max_size: usize,
    pub distribution: SizeDistribution,
}

impl FieldLengthConfig {
    /// Parse `N` (fixed) or `min:max` (uniform).
    pub fn parse(size_str: &str) -> Result<Self> {
        if let Some((min, max)) = size_str.split_once(':') {
            let (min_size, max_size): (usize, usize) = (min.trim().parse()?, max.trim().parse()?);
            if min_size > max_size {
                bail!("field length range {}:{} is empty", min_size, max_size);
            }
            Ok(FieldLengthConfig {
                min_size,
                max_size,
                distribution: SizeDistribution::Uniform,
            })
        } else {
            let size = size_str.trim().parse()?;
            Ok(FieldLengthConfig {
                min_size: size,
                max_size: size,
                distribution: SizeDistribution::Fixed(size),
            })
        }
    }

    fn sample(&self, rng: &mut StdRng) -> usize {
        match &self.distribution {
            SizeDistribution::Fixed(size) => *size,
            SizeDistribution::Uniform => Uniform::new_inclusive(self.min_size, self.max_size).sample(rng),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WorkloadConfig {
    pub table: String,
    pub record_count: u64,
    pub operation_count: u64,
    pub field_count: usize,
    pub field_length: FieldLengthConfig,
    pub max_scan_length: usize,
    pub read_all_fields: bool,
    pub proportions: Proportions,
    pub request_distribution: RequestDistribution,
}

impl WorkloadConfig {
    pub fn for_workload(workload: WorkloadType) -> Self {
        Self {
            table: "usertable".to_string(),
            record_count: 1000,
            operation_count: 1000,
            field_count: 10,
            field_length: FieldLengthConfig {
                min_size: 100,
                max_size: 100,
                distribution: SizeDistribution::Fixed(100),
            },
            max_scan_length: 100,
            read_all_fields: true,
            proportions: workload.proportions(),
            request_distribution: workload.request_distribution(),
        }
    }
}

/// Key, value and operation generator shared by all client tasks.
pub struct CoreWorkload {
    config: WorkloadConfig,
    field_names: Vec<String>,
    next_insert: AtomicU64,
    zipf: Option<Zipf<f64>>,
}

impl CoreWorkload {
    pub fn new(config: WorkloadConfig) -> Result<Self> {
        if config.field_count == 0 {
            bail!("field count must be positive");
        }
        if config.max_scan_length == 0 {
            bail!("max scan length must be positive");
        }
        if config.proportions.total() <= 0.0 {
            bail!("operation proportions must not all be zero");
        }

        let zipf = match config.record_count {
            0 => None,
            n => Some(Zipf::new(n, ZIPFIAN_CONSTANT).map_err(|e| anyhow!("zipfian: {}", e))?),
        };
        let field_names = (0..config.field_count)
            .map(|i| format!("field{}", i))
            .collect();

        Ok(Self {
            next_insert: AtomicU64::new(config.record_count),
            config,
            field_names,
            zipf,
        })
    }

    pub fn config(&self) -> &WorkloadConfig {
        &self.config
    }

    pub fn table(&self) -> &str {
        &self.config.table
    }

    pub fn build_key(&self, key_num: u64) -> String {
        format!("user{}", key_num)
    }

    pub fn build_values(&self, rng: &mut StdRng) -> Fields {
        self.field_names
            .iter()
            .map(|name| {
                let len = self.config.field_length.sample(rng);
                (name.clone(), random_string(rng, len))
            })
            .collect()
    }

    pub fn next_operation(&self, rng: &mut StdRng) -> Operation {
        let weighted = self.config.proportions.weighted();
        let mut point = rng.gen::<f64>() * self.config.proportions.total();
        for (op, weight) in weighted {
            if point < weight {
                return op;
            }
            point -= weight;
        }
        // rounding can leave `point` just past the last bucket
        weighted
            .iter()
            .rev()
            .find(|(_, w)| *w > 0.0)
            .map(|(op, _)| *op)
            .unwrap_or(Operation::Read)
    }

    /// Key number of an existing record for reads, updates and scans.
    pub fn next_key_num(&self, rng: &mut StdRng) -> u64 {
        let inserted = self.next_insert.load(Ordering::Relaxed).max(1);
        match (self.config.request_distribution, &self.zipf) {
            (RequestDistribution::Uniform, _) | (_, None) => rng.gen_range(0..inserted),
            (RequestDistribution::Zipfian, Some(zipf)) => {
                (zipf.sample(rng) as u64).saturating_sub(1).min(inserted - 1)
            }
            (RequestDistribution::Latest, Some(zipf)) => {
                let offset = (zipf.sample(rng) as u64).saturating_sub(1);
                (inserted - 1).saturating_sub(offset)
            }
        }
    }

    /// Reserve the key number for the next run-phase insert.
    pub fn next_insert_key_num(&self) -> u64 {
        self.next_insert.fetch_add(1, Ordering::Relaxed)
    }

    /// `None` requests every field.
    pub fn field_set(&self, rng: &mut StdRng) -> Option<HashSet<String>> {
        if self.config.read_all_fields {
            return None;
        }
        let idx = rng.gen_range(0..self.field_names.len());
        Some(HashSet::from([self.field_names[idx].clone()]))
    }

    pub fn scan_length(&self, rng: &mut StdRng) -> usize {
        rng.gen_range(1..=self.config.max_scan_length)
    }
}

pub fn random_string(rng: &mut StdRng, size: usize) -> String {
    (0..size)
        .map(|_| {
            let idx = rng.gen_range(0..62);
            match idx {
                0..=9 => (b'0' + idx as u8) as char,
                10..=35 => (b'A' + (idx - 10) as u8) as char,
                _ => (b'a' + (idx - 36) as u8) as char,
            }
        })
        .collect()
}
