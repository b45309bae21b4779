use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

use anyhow::{anyhow, Context, Result};

/// String-keyed configuration handed to every binding on `init`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Properties {
    values: HashMap<String, String>,
}

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a `-P` file, then apply `-p key=value` overrides on top.
    pub fn load(file: Option<&Path>, overrides: &[(String, String)]) -> Result<Self> {
        let mut props = match file {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("reading property file {}", path.display()))?;
                Self::parse(&text)?
            }
            None => Self::new(),
        };
        for (key, value) in overrides {
            props.set(key, value);
        }
        Ok(props)
    }

    /// Parse `key=value` lines. Blank lines and lines starting with `#` or
    /// `!` are skipped. The first `=` or `:` separates key from value.
    pub fn parse(text: &str) -> Result<Self> {
        let mut props = Self::new();
        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
                continue;
            }
            let at = line
                .find(|c: char| c == '=' || c == ':')
                .ok_or_else(|| anyhow!("line {}: expected key=value, got {:?}", lineno + 1, line))?;
            let (key, value) = (&line[..at], &line[at + 1..]);
            props.set(key.trim(), value.trim());
        }
        Ok(props)
    }

    pub fn set(&mut self, key: &str, value: &str) {
        self.values.insert(key.to_string(), value.to_string());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    /// Parse `key` as `T`, falling back to `default` when it is absent.
    pub fn parse_or<T>(&self, key: &str, default: T) -> Result<T>
    where
        T: FromStr,
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        match self.get(key) {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("invalid value {:?} for property {}", raw, key)),
            None => Ok(default),
        }
    }
}

/// clap value parser for `-p key=value`.
pub fn parse_key_value(raw: &str) -> std::result::Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .filter(|(k, _)| !k.is_empty())
        .ok_or_else(|| format!("expected key=value, got {:?}", raw))
}
