use std::collections::{HashMap, HashSet};
use std::fmt::{Display, Formatter};

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;

use crate::properties::Properties;

/// Field name to field value for a single record.
pub type Fields = HashMap<String, String>;

/// Outcome reported to the workload for every operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Status {
    Ok,
    Error,
    NotFound,
}

impl Display for Status {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Status::Ok => write!(f, "OK"),
            Status::Error => write!(f, "ERROR"),
            Status::NotFound => write!(f, "NOT_FOUND"),
        }
    }
}

/// Result of a single-key read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    Found(Fields),
    NotFound,
    Error(String),
}

impl Lookup {
    /// Status the framework sees. A miss is reported as an error, the
    /// distinction stays available on the `Lookup` itself.
    pub fn status(&self) -> Status {
        match self {
            Lookup::Found(_) => Status::Ok,
            Lookup::NotFound | Lookup::Error(_) => Status::Error,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Lookup::NotFound)
    }
}

/// Storage binding driven by the workload. One instance per worker; the
/// `&mut self` receivers keep a binding from being shared between tasks.
#[async_trait]
pub trait Client: Send + 'static {
    /// Open the binding. Must succeed before any other call.
    async fn init(&mut self, props: &Properties) -> Result<()>;

    /// Release the binding's resources.
    async fn cleanup(&mut self) -> Result<()>;

    /// Read a single record, keeping only `fields` when given.
    async fn read(&mut self, table: &str, key: &str, fields: Option<&HashSet<String>>) -> Lookup;

    /// Read up to `record_count` records starting at `start_key`.
    async fn scan(
        &mut self,
        table: &str,
        start_key: &str,
        record_count: usize,
        fields: Option<&HashSet<String>>,
    ) -> std::result::Result<Vec<Fields>, Status>;

    /// Insert a record, overwriting any existing one under `key`.
    async fn insert(&mut self, table: &str, key: &str, values: &Fields) -> Status;

    /// Update a record.
    async fn update(&mut self, table: &str, key: &str, values: &Fields) -> Status;

    /// Delete a record
    async fn delete(&mut self, table: &str, key: &str) -> Status;
}
