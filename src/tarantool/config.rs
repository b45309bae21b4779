use std::fmt::{Display, Formatter};
use std::str::FromStr;

use anyhow::Result;
use tarantool_rs::IteratorType;

use crate::properties::Properties;

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 3301;
pub const DEFAULT_SPACE: u32 = 1024;

/// Index traversal used by `scan`, as named in `tarantool.scan_iterator`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanIterator {
    Eq,
    Req,
    All,
    Lt,
    Le,
    Ge,
    Gt,
}

impl ScanIterator {
    pub fn iterator_type(self) -> IteratorType {
        match self {
            ScanIterator::Eq => IteratorType::Eq,
            ScanIterator::Req => IteratorType::Req,
            ScanIterator::All => IteratorType::All,
            ScanIterator::Lt => IteratorType::Lt,
            ScanIterator::Le => IteratorType::Le,
            ScanIterator::Ge => IteratorType::Ge,
            ScanIterator::Gt => IteratorType::Gt,
        }
    }

    fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0 => ScanIterator::Eq,
            1 => ScanIterator::Req,
            2 => ScanIterator::All,
            3 => ScanIterator::Lt,
            4 => ScanIterator::Le,
            5 => ScanIterator::Ge,
            6 => ScanIterator::Gt,
            _ => return None,
        })
    }
}

impl Display for ScanIterator {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ScanIterator::Eq => "eq",
            ScanIterator::Req => "req",
            ScanIterator::All => "all",
            ScanIterator::Lt => "lt",
            ScanIterator::Le => "le",
            ScanIterator::Ge => "ge",
            ScanIterator::Gt => "gt",
        };
        f.write_str(name)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown iterator type {0:?}")]
pub struct ParseIteratorError(String);

/// Accepts the lowercase names as well as the numeric iterator codes.
impl FromStr for ScanIterator {
    type Err = ParseIteratorError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "eq" => Ok(ScanIterator::Eq),
            "req" => Ok(ScanIterator::Req),
            "all" => Ok(ScanIterator::All),
            "lt" => Ok(ScanIterator::Lt),
            "le" => Ok(ScanIterator::Le),
            "ge" => Ok(ScanIterator::Ge),
            "gt" => Ok(ScanIterator::Gt),
            other => other
                .parse::<u8>()
                .ok()
                .and_then(ScanIterator::from_code)
                .ok_or_else(|| ParseIteratorError(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TarantoolConfig {
    pub host: String,
    pub port: u16,
    pub space: u32,
    pub scan_iterator: ScanIterator,
}

impl Default for TarantoolConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            space: DEFAULT_SPACE,
            scan_iterator: ScanIterator::Ge,
        }
    }
}

impl TarantoolConfig {
    /// Read `tarantool.<name>`, falling back to the bare `<name>`.
    pub fn from_properties(props: &Properties) -> Result<Self> {
        let lookup = |name: &str| {
            let prefixed = format!("tarantool.{}", name);
            if props.get(&prefixed).is_some() {
                prefixed
            } else {
                name.to_string()
            }
        };

        let defaults = Self::default();
        Ok(Self {
            host: props.get_or(&lookup("host"), DEFAULT_HOST).to_string(),
            port: props.parse_or(&lookup("port"), defaults.port)?,
            space: props.parse_or(&lookup("space"), defaults.space)?,
            scan_iterator: props.parse_or(&lookup("scan_iterator"), defaults.scan_iterator)?,
        })
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
