//! Shared test doubles for integration tests
#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use sqlizer::client::{Method, RawResponse, Transport};
use sqlizer::{
    BackendClient, ConnectionFields, ConnectionRecord, CredentialCache, MemoryStore, Orchestrator, ReadinessSettings,
    RecentConnections, Result, SqlizerError,
};

/// One canned answer, optionally delivered late
pub struct Reply {
    pub delay: Duration,
    pub result: Result<RawResponse>,
}

pub fn json(body: Value) -> Reply {
    Reply { delay: Duration::ZERO, result: Ok(RawResponse::new(200, body.to_string())) }
}

pub fn status(code: u16, body: Value) -> Reply {
    Reply { delay: Duration::ZERO, result: Ok(RawResponse::new(code, body.to_string())) }
}

pub fn unreachable() -> Reply {
    Reply { delay: Duration::ZERO, result: Err(SqlizerError::transport_failure("connection refused")) }
}

pub fn delayed(delay: Duration, body: Value) -> Reply {
    Reply { delay, ..json(body) }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
}

type Handler = dyn Fn(Method, &str, Option<&Value>) -> Reply + Send + Sync;

/// Backend whose answers come from a routing closure
pub struct FakeBackend {
    handler: Box<Handler>,
    requests: Mutex<Vec<Request>>,
}

impl FakeBackend {
    pub fn new(handler: impl Fn(Method, &str, Option<&Value>) -> Reply + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self { handler: Box::new(handler), requests: Mutex::default() })
    }

    pub fn requests(&self) -> Vec<Request> {
        self.requests.lock().unwrap().clone()
    }

    /// Number of requests sent to `path`
    pub fn count(&self, path: &str) -> usize {
        self.requests.lock().unwrap().iter().filter(|r| r.path == path).count()
    }
}

#[async_trait]
impl Transport for FakeBackend {
    async fn send(&self, method: Method, path: &str, body: Option<&Value>) -> Result<RawResponse> {
        self.requests.lock().unwrap().push(Request { method, path: path.to_string(), body: body.cloned() });
        let reply = (self.handler)(method, path, body);
        if !reply.delay.is_zero() {
            tokio::time::sleep(reply.delay).await;
        }
        reply.result
    }
}

/// URL inside a `{"url": ...}` or `{"connection": {"url": ...}}` body
pub fn body_url(body: Option<&Value>) -> Option<String> {
    let body = body?;
    body.get("url")
        .or_else(|| body.get("connection").and_then(|c| c.get("url")))
        .and_then(Value::as_str)
        .map(str::to_string)
}

pub fn postgres(host: &str) -> ConnectionFields {
    ConnectionFields::new("postgresql+psycopg", host)
        .with_port(5432)
        .with_database("app")
        .with_user("app")
        .with_password("s3cret")
}

pub struct Harness {
    pub backend: Arc<FakeBackend>,
    pub client: BackendClient,
    pub recent: Arc<RecentConnections<MemoryStore>>,
    pub credentials: Arc<CredentialCache<MemoryStore>>,
    pub orchestrator: Orchestrator<MemoryStore, MemoryStore>,
}

impl Harness {
    pub fn new(backend: Arc<FakeBackend>) -> Self {
        let client = BackendClient::new(backend.clone());
        let recent = Arc::new(RecentConnections::new(MemoryStore::new()));
        let credentials = Arc::new(CredentialCache::new(MemoryStore::new()));
        let orchestrator = Orchestrator::new(
            client.clone(),
            Arc::clone(&recent),
            Arc::clone(&credentials),
            ReadinessSettings { poll_interval: Duration::from_secs(1), use_llm_for_training: true },
        );
        Self { backend, client, recent, credentials, orchestrator }
    }

    /// Remember `fields` as if the connect flow had run
    pub fn remember(&self, fields: &ConnectionFields) -> ConnectionRecord {
        let record = ConnectionRecord::from_fields(fields).unwrap();
        self.recent.save(record.clone()).unwrap();
        self.recent.set_current(Some(&record)).unwrap();
        self.credentials.put(&record.id, &sqlizer::build(fields).unwrap()).unwrap();
        record
    }
}
