//! In-process IPROTO server backing one space with a `BTreeMap`, used by
//! the binding and runner tests. It speaks just enough of the protocol for
//! `tarantool-rs`: greeting, ID, ping, select, replace and delete.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::ops::Bound;
use std::sync::{Arc, Mutex};

use rmpv::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use super::tuple::value_to_string;
use crate::properties::Properties;

const GREETING_LINE: usize = 64;
const MAX_PACKET: u64 = 16 * 1024 * 1024;

const SELECT: u64 = 0x01;
const REPLACE: u64 = 0x03;
const DELETE: u64 = 0x05;
const PING: u64 = 0x40;
const ID: u64 = 0x49;

const REQUEST_TYPE: u64 = 0x00;
const SYNC: u64 = 0x01;
const SCHEMA_VERSION: u64 = 0x05;
const SPACE_ID: u64 = 0x10;
const LIMIT: u64 = 0x12;
const OFFSET: u64 = 0x13;
const ITERATOR: u64 = 0x14;
const KEY: u64 = 0x20;
const TUPLE: u64 = 0x21;
const DATA: u64 = 0x30;
const ERROR_24: u64 = 0x31;
const VERSION: u64 = 0x54;
const FEATURES: u64 = 0x55;
const AUTH_TYPE: u64 = 0x5b;

const ERROR_FLAG: u64 = 0x8000;
const ER_PROC_LUA: u64 = 32;
const ER_NO_SUCH_SPACE: u64 = 36;
const ER_FIELD_MISSING: u64 = 39;
const ER_UNKNOWN_REQUEST_TYPE: u64 = 48;

const ITER_EQ: u64 = 0;
const ITER_REQ: u64 = 1;
const ITER_ALL: u64 = 2;
const ITER_LT: u64 = 3;
const ITER_LE: u64 = 4;
const ITER_GE: u64 = 5;
const ITER_GT: u64 = 6;

#[derive(Default)]
struct State {
    space: u32,
    rows: BTreeMap<String, Vec<Value>>,
    failing: bool,
}

struct Packet {
    code: u64,
    sync: u64,
    body: Value,
}

impl Packet {
    fn new(code: u64, sync: u64, body: Vec<(u64, Value)>) -> Self {
        let body = body
            .into_iter()
            .map(|(k, v)| (Value::from(k), v))
            .collect();
        Self {
            code,
            sync,
            body: Value::Map(body),
        }
    }

    fn get(&self, key: u64) -> Option<&Value> {
        map_get(&self.body, key)
    }
}

pub struct MockServer {
    addr: SocketAddr,
    state: Arc<Mutex<State>>,
    handle: JoinHandle<()>,
}

impl MockServer {
    pub async fn start(space: u32) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(Mutex::new(State {
            space,
            ..Default::default()
        }));

        let shared = state.clone();
        let handle = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(serve(stream, shared.clone()));
            }
        });

        Self {
            addr,
            state,
            handle,
        }
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Properties pointing a binding at this server.
    pub fn props(&self) -> Properties {
        let mut props = Properties::new();
        props.set("tarantool.host", "127.0.0.1");
        props.set("tarantool.port", &self.port().to_string());
        props.set("tarantool.space", &self.state.lock().unwrap().space.to_string());
        props
    }

    /// Make every data request fail with a server error.
    pub fn set_failing(&self, failing: bool) {
        self.state.lock().unwrap().failing = failing;
    }

    pub fn len(&self) -> usize {
        self.state.lock().unwrap().rows.len()
    }

    pub fn get(&self, key: &str) -> Option<Vec<Value>> {
        self.state.lock().unwrap().rows.get(key).cloned()
    }

    pub fn put(&self, tuple: Vec<Value>) {
        let key = value_to_string(&tuple[0]);
        self.state.lock().unwrap().rows.insert(key, tuple);
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn serve(mut stream: TcpStream, state: Arc<Mutex<State>>) {
    let greeting = greeting(
        "Tarantool 2.11.1 (Binary) 00000000-0000-0000-0000-000000000000",
        "bW9jayBzYWx0IGZvciB0ZXN0cyBvbmx5AAAAAAAAAAA=",
    );
    if stream.write_all(&greeting).await.is_err() {
        return;
    }
    while let Some(request) = read_packet(&mut stream).await {
        let response = handle(&state, &request);
        if stream.write_all(&encode(&response)).await.is_err() {
            return;
        }
    }
}

/// Two 64-byte lines, the second carrying a base64 salt.
fn greeting(version: &str, salt: &str) -> Vec<u8> {
    let mut buf = vec![b' '; 2 * GREETING_LINE];
    buf[..version.len()].copy_from_slice(version.as_bytes());
    buf[GREETING_LINE - 1] = b'\n';
    buf[GREETING_LINE..GREETING_LINE + salt.len()].copy_from_slice(salt.as_bytes());
    buf[2 * GREETING_LINE - 1] = b'\n';
    buf
}

async fn read_packet(stream: &mut TcpStream) -> Option<Packet> {
    let len = match stream.read_u8().await.ok()? {
        marker @ 0x00..=0x7f => marker as u64,
        0xcc => stream.read_u8().await.ok()? as u64,
        0xcd => stream.read_u16().await.ok()? as u64,
        0xce => stream.read_u32().await.ok()? as u64,
        0xcf => stream.read_u64().await.ok()?,
        _ => return None,
    };
    if len > MAX_PACKET {
        return None;
    }
    let mut buf = vec![0u8; len as usize];
    stream.read_exact(&mut buf).await.ok()?;

    let mut cursor = buf.as_slice();
    let header = rmpv::decode::read_value(&mut cursor).ok()?;
    let body = if cursor.is_empty() {
        Value::Map(Vec::new())
    } else {
        rmpv::decode::read_value(&mut cursor).ok()?
    };
    Some(Packet {
        code: map_get(&header, REQUEST_TYPE).and_then(Value::as_u64)?,
        sync: map_get(&header, SYNC).and_then(Value::as_u64).unwrap_or(0),
        body,
    })
}

fn encode(packet: &Packet) -> Vec<u8> {
    let header = Value::Map(vec![
        (Value::from(REQUEST_TYPE), Value::from(packet.code)),
        (Value::from(SYNC), Value::from(packet.sync)),
        (Value::from(SCHEMA_VERSION), Value::from(1u64)),
    ]);
    let mut buf = vec![0xce, 0, 0, 0, 0];
    rmpv::encode::write_value(&mut buf, &header).unwrap();
    rmpv::encode::write_value(&mut buf, &packet.body).unwrap();
    let len = (buf.len() - 5) as u32;
    buf[1..5].copy_from_slice(&len.to_be_bytes());
    buf
}

fn map_get(map: &Value, key: u64) -> Option<&Value> {
    map.as_map()?
        .iter()
        .find(|(k, _)| k.as_u64() == Some(key))
        .map(|(_, v)| v)
}

fn handle(state: &Mutex<State>, req: &Packet) -> Packet {
    let mut state = state.lock().unwrap();
    match req.code {
        PING => return Packet::new(0, req.sync, Vec::new()),
        ID => {
            let features = (0u64..=5).map(Value::from).collect();
            return Packet::new(
                0,
                req.sync,
                vec![
                    (VERSION, Value::from(4u64)),
                    (FEATURES, Value::Array(features)),
                    (AUTH_TYPE, Value::from("chap-sha1")),
                ],
            );
        }
        _ => {}
    }
    if state.failing {
        return error(req.sync, ER_PROC_LUA, "injected failure".to_string());
    }
    let space = req.get(SPACE_ID).and_then(Value::as_u64).unwrap_or(0);
    if space != state.space as u64 {
        return error(
            req.sync,
            ER_NO_SUCH_SPACE,
            format!("Space '{}' does not exist", space),
        );
    }

    let search_key = req
        .get(KEY)
        .and_then(Value::as_array)
        .and_then(|keys| keys.first())
        .map(value_to_string);

    match req.code {
        SELECT => {
            let iterator = req.get(ITERATOR).and_then(Value::as_u64).unwrap_or(ITER_EQ);
            let limit = req
                .get(LIMIT)
                .and_then(Value::as_u64)
                .unwrap_or(u64::from(u32::MAX)) as usize;
            let offset = req.get(OFFSET).and_then(Value::as_u64).unwrap_or(0) as usize;
            let rows = select(&state.rows, search_key, iterator)
                .into_iter()
                .skip(offset)
                .take(limit)
                .map(|row| Value::Array(row.clone()))
                .collect();
            data(req.sync, rows)
        }
        REPLACE => {
            let tuple = req
                .get(TUPLE)
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            let Some(first) = tuple.first() else {
                return error(req.sync, ER_FIELD_MISSING, "Tuple field 1 required".to_string());
            };
            state.rows.insert(value_to_string(first), tuple.clone());
            data(req.sync, vec![Value::Array(tuple)])
        }
        DELETE => {
            let removed = search_key.and_then(|k| state.rows.remove(&k));
            data(req.sync, removed.map(Value::Array).into_iter().collect())
        }
        other => error(
            req.sync,
            ER_UNKNOWN_REQUEST_TYPE,
            format!("Unknown request type {}", other),
        ),
    }
}

fn select(
    rows: &BTreeMap<String, Vec<Value>>,
    search_key: Option<String>,
    iterator: u64,
) -> Vec<&Vec<Value>> {
    let Some(k) = search_key else {
        return match iterator {
            ITER_LT | ITER_LE => rows.values().rev().collect(),
            _ => rows.values().collect(),
        };
    };
    match iterator {
        ITER_EQ | ITER_REQ => rows.get(&k).into_iter().collect(),
        ITER_ALL => rows.values().collect(),
        ITER_GE => rows.range(k..).map(|(_, v)| v).collect(),
        ITER_GT => rows
            .range((Bound::Excluded(k), Bound::Unbounded))
            .map(|(_, v)| v)
            .collect(),
        ITER_LT => rows.range(..k).rev().map(|(_, v)| v).collect(),
        ITER_LE => rows.range(..=k).rev().map(|(_, v)| v).collect(),
        _ => Vec::new(),
    }
}

fn data(sync: u64, rows: Vec<Value>) -> Packet {
    Packet::new(0, sync, vec![(DATA, Value::Array(rows))])
}

fn error(sync: u64, code: u64, message: String) -> Packet {
    Packet::new(
        ERROR_FLAG | code,
        sync,
        vec![(ERROR_24, Value::from(message))],
    )
}
