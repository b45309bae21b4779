//! Tarantool binding: forwards every workload call to one `tarantool-rs`
//! connection bound to one space.

mod config;
#[cfg(test)]
pub(crate) mod mock;
mod tuple;

use std::collections::HashSet;

use anyhow::{Context, Result};
use async_trait::async_trait;
use rmpv::Value;
use tarantool_rs::{Connection, ExecutorExt, IteratorType, ReconnectInterval};
use tracing::{error, info, warn};

use crate::client::{Client, Fields, Lookup, Status};
use crate::properties::Properties;

pub use config::{TarantoolConfig, DEFAULT_SPACE};
pub use tuple::{fields_to_tuple, tuple_to_fields};

const PRIMARY_INDEX: u32 = 0;

/// Workload binding owning a single connection for its whole lifetime.
#[derive(Default)]
pub struct TarantoolClient {
    connection: Option<Connection>,
    config: TarantoolConfig,
}

impl TarantoolClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    fn connection(&self, op: &str) -> Option<&Connection> {
        if self.connection.is_none() {
            error!(op, "Tarantool binding used before init");
        }
        self.connection.as_ref()
    }

    async fn replace(&mut self, op: &str, key: &str, values: &Fields) -> Status {
        let Some(conn) = self.connection(op) else {
            return Status::Error;
        };
        match conn
            .replace(self.config.space, fields_to_tuple(key, values))
            .await
        {
            Ok(_) => Status::Ok,
            Err(e) => {
                error!(op, key, error = %e, "Can't replace element");
                Status::Error
            }
        }
    }
}

#[async_trait]
impl Client for TarantoolClient {
    async fn init(&mut self, props: &Properties) -> Result<()> {
        let config = TarantoolConfig::from_properties(props)?;
        let address = config.address();

        let connected = async {
            let conn = Connection::builder()
                .reconnect_interval(None::<ReconnectInterval>)
                .build(address.clone())
                .await?;
            conn.ping().await?;
            Ok::<_, tarantool_rs::Error>(conn)
        }
        .await;

        let conn = match connected {
            Ok(conn) => conn,
            Err(e) => {
                error!(%address, error = %e, "Can't initialize Tarantool connection");
                return Err(e).with_context(|| format!("connecting to Tarantool at {}", address));
            }
        };

        info!(
            %address,
            space = config.space,
            scan_iterator = %config.scan_iterator,
            "Tarantool binding initialized"
        );
        self.connection = Some(conn);
        self.config = config;
        Ok(())
    }

    async fn cleanup(&mut self) -> Result<()> {
        // dropping the last handle shuts the connection down
        self.connection.take();
        Ok(())
    }

    async fn read(&mut self, _table: &str, key: &str, fields: Option<&HashSet<String>>) -> Lookup {
        let Some(conn) = self.connection("read") else {
            return Lookup::Error("not initialized".to_string());
        };

        let response: tarantool_rs::Result<Vec<Vec<Value>>> = conn
            .select(
                self.config.space,
                PRIMARY_INDEX,
                Some(1),
                None,
                Some(IteratorType::Eq),
                vec![Value::from(key)],
            )
            .await;

        match response {
            Ok(tuples) => match tuples.first() {
                Some(tuple) => Lookup::Found(tuple_to_fields(Some(tuple.as_slice()), fields)),
                None => Lookup::NotFound,
            },
            Err(e) => {
                error!(key, error = %e, "Can't select element");
                Lookup::Error(e.to_string())
            }
        }
    }

    async fn scan(
        &mut self,
        _table: &str,
        start_key: &str,
        record_count: usize,
        fields: Option<&HashSet<String>>,
    ) -> std::result::Result<Vec<Fields>, Status> {
        let Some(conn) = self.connection("scan") else {
            return Err(Status::Error);
        };

        let limit = u32::try_from(record_count).unwrap_or(u32::MAX);
        let response: tarantool_rs::Result<Vec<Vec<Value>>> = conn
            .select(
                self.config.space,
                PRIMARY_INDEX,
                Some(limit),
                None,
                Some(self.config.scan_iterator.iterator_type()),
                vec![Value::from(start_key)],
            )
            .await;
        let tuples = response.map_err(|e| {
            error!(start_key, record_count, error = %e, "Can't select range elements");
            Status::Error
        })?;

        if tuples.len() > record_count {
            warn!(
                start_key,
                record_count,
                returned = tuples.len(),
                "server returned more rows than requested"
            );
        }

        Ok(tuples
            .iter()
            .take(record_count)
            .map(|tuple| tuple_to_fields(Some(tuple.as_slice()), fields))
            .filter(|record| !record.is_empty())
            .collect())
    }

    async fn insert(&mut self, _table: &str, key: &str, values: &Fields) -> Status {
        self.replace("insert", key, values).await
    }

    async fn update(&mut self, _table: &str, key: &str, values: &Fields) -> Status {
        self.replace("update", key, values).await
    }

    async fn delete(&mut self, _table: &str, key: &str) -> Status {
        let Some(conn) = self.connection("delete") else {
            return Status::Error;
        };
        match conn
            .delete(self.config.space, PRIMARY_INDEX, vec![Value::from(key)])
            .await
        {
            Ok(_) => Status::Ok,
            Err(e) => {
                error!(key, error = %e, "Can't delete element");
                Status::Error
            }
        }
    }
}
