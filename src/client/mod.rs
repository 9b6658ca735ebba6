//! Backend Client
//!
//! Request layer over the NL-to-SQL backend's HTTP surface.
//!
//! # Request contract
//! - [`BackendClient::request`] sends a POST with a JSON body. If the backend
//!   cannot be reached it retries once as a GET without a body. The GET cannot
//!   carry the payload, so it may answer for the backend's default target or
//!   with less data; it is only used for idempotent read endpoints
//!   (`/connect/test`, `/schema/overview`).
//! - Model and ask endpoints are POST-only; status and progress are GET.
//!
//! # Failure normalization
//! Non-2xx responses and `{"ok": false}` bodies become
//! [`SqlizerError::BackendError`] carrying the backend's `detail`, `error` or
//! `message` text verbatim. Unreachable backends are `TransportFailure`.

mod transport;
mod types;

pub use transport::{HttpTransport, Method, RawResponse, Transport};
pub use types::{
    AskReply, AskRequest, ColumnOverview, ConnectTestReply, ModelStatus, ModelStatusReply,
    ProgressStatus, SchemaIdReply, SchemaOverview, StageProgress, TableOverview, TrainReply,
    TrainRequest, TrainingProgress,
};

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::instrument;

use crate::config::ClientConfig;
use crate::dsn::ConnectionPayload;
use crate::error::{Result, SqlizerError};

/// Typed access to the backend
#[derive(Clone)]
pub struct BackendClient {
    transport: Arc<dyn Transport>,
}

impl std::fmt::Debug for BackendClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendClient").finish_non_exhaustive()
    }
}

impl BackendClient {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Client talking HTTP to `config.api_base_url`
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        Ok(Self::new(Arc::new(HttpTransport::new(config)?)))
    }

    /// POST `payload` to `path`, falling back to a bodiless GET when the
    /// backend is unreachable
    pub async fn request(&self, path: &str, payload: &Value) -> Result<Value> {
        match self.transport.send(Method::Post, path, Some(payload)).await {
            Ok(raw) => decode(path, raw),
            Err(e) if e.is_transport() => {
                tracing::warn!(path, error = %e, "POST failed, retrying as GET without payload");
                let raw = self.transport.send(Method::Get, path, None).await?;
                decode(path, raw)
            }
            Err(e) => Err(e),
        }
    }

    /// POST without fallback
    pub async fn post(&self, path: &str, payload: &Value) -> Result<Value> {
        let raw = self.transport.send(Method::Post, path, Some(payload)).await?;
        decode(path, raw)
    }

    /// Bodiless GET
    pub async fn get(&self, path: &str) -> Result<Value> {
        let raw = self.transport.send(Method::Get, path, None).await?;
        decode(path, raw)
    }

    /// `GET /healthz`
    #[instrument(level = "debug", skip(self))]
    pub async fn healthz(&self) -> Result<Value> {
        self.get("/healthz").await
    }

    /// `POST|GET /connect/test`
    #[instrument(level = "debug", skip_all)]
    pub async fn connect_test(&self, connection: &ConnectionPayload) -> Result<ConnectTestReply> {
        let value = self.request("/connect/test", &to_value(connection)?).await?;
        expect_ok("/connect/test", value)
    }

    /// `POST|GET /schema/overview`
    #[instrument(level = "debug", skip_all)]
    pub async fn schema_overview(&self, connection: &ConnectionPayload) -> Result<SchemaOverview> {
        let value = self.request("/schema/overview", &to_value(connection)?).await?;
        expect_ok("/schema/overview", value)
    }

    /// `POST /models/schema-id`
    #[instrument(level = "debug", skip_all)]
    pub async fn schema_id(&self, connection: &ConnectionPayload) -> Result<String> {
        let value = self.post("/models/schema-id", &json!({ "connection": connection })).await?;
        expect_ok::<SchemaIdReply>("/models/schema-id", value).map(|reply| reply.schema_id)
    }

    /// `POST /models/train`
    #[instrument(level = "debug", skip(self, connection))]
    pub async fn train(&self, connection: &ConnectionPayload, use_llm_for_training: bool) -> Result<TrainReply> {
        let body = to_value(&TrainRequest { connection, use_llm_for_training })?;
        let value = self.post("/models/train", &body).await?;
        expect_ok("/models/train", value)
    }

    /// `GET /models/{schema_id}/status`
    ///
    /// The backend answers `not_found` with `ok: false`; a recognizable
    /// `status` wins over the `ok` flag here.
    #[instrument(level = "debug", skip(self))]
    pub async fn model_status(&self, schema_id: &str) -> Result<ModelStatusReply> {
        let path = format!("/models/{schema_id}/status");
        let value = self.get(&path).await?;
        match serde_json::from_value::<ModelStatusReply>(value.clone()) {
            Ok(reply) => Ok(reply),
            Err(_) => expect_ok(&path, value),
        }
    }

    /// `GET /models/{schema_id}/progress`
    #[instrument(level = "debug", skip(self))]
    pub async fn progress(&self, schema_id: &str) -> Result<TrainingProgress> {
        let path = format!("/models/{schema_id}/progress");
        let value = self.get(&path).await?;
        expect_ok(&path, value)
    }

    /// `POST /ai/ask`
    #[instrument(level = "debug", skip(self, connection))]
    pub async fn ask(
        &self,
        question: &str,
        connection: &ConnectionPayload,
        limit: u32,
        timeout_ms: u64,
    ) -> Result<AskReply> {
        let body = to_value(&AskRequest { question, connection, limit, timeout_ms })?;
        let value = self.post("/ai/ask", &body).await?;
        expect_ok("/ai/ask", value)
    }
}

fn to_value<T: Serialize>(body: &T) -> Result<Value> {
    serde_json::to_value(body).map_err(|e| SqlizerError::invalid_input(format!("Could not encode request: {e}")))
}

/// Turn a raw response into JSON, normalizing non-2xx statuses
fn decode(path: &str, raw: RawResponse) -> Result<Value> {
    let parsed = serde_json::from_str::<Value>(&raw.body);

    if !raw.is_success() {
        let detail = parsed
            .ok()
            .and_then(|body| failure_text(&body))
            .unwrap_or_else(|| format!("{path} failed with HTTP {}", raw.status));
        tracing::debug!(path, status = raw.status, "backend returned failure status");
        return Err(SqlizerError::backend_error(Some(raw.status), detail));
    }

    parsed.map_err(|e| SqlizerError::backend_error(Some(raw.status), format!("{path} returned invalid JSON: {e}")))
}

/// Decode a 2xx body into `T`, treating `"ok": false` as a backend failure
fn expect_ok<T: DeserializeOwned>(path: &str, value: Value) -> Result<T> {
    if value.get("ok").and_then(Value::as_bool) == Some(false) {
        let detail = failure_text(&value).unwrap_or_else(|| format!("{path} reported failure"));
        return Err(SqlizerError::backend_error(None, detail));
    }
    serde_json::from_value(value)
        .map_err(|e| SqlizerError::backend_error(None, format!("Unexpected response from {path}: {e}")))
}

/// `detail`, `error` or `message`, in that order
fn failure_text(body: &Value) -> Option<String> {
    ["detail", "error", "message"].iter().find_map(|key| match body.get(*key)? {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        other => Some(other.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays canned results and records what was sent
    #[derive(Default)]
    struct Scripted {
        replies: Mutex<VecDeque<Result<RawResponse>>>,
        sent: Mutex<Vec<(Method, String, bool)>>,
    }

    impl Scripted {
        fn with(replies: Vec<Result<RawResponse>>) -> Arc<Self> {
            Arc::new(Self { replies: Mutex::new(replies.into()), sent: Mutex::default() })
        }
    }

    #[async_trait]
    impl Transport for Scripted {
        async fn send(&self, method: Method, path: &str, body: Option<&Value>) -> Result<RawResponse> {
            self.sent.lock().unwrap().push((method, path.to_string(), body.is_some()));
            self.replies.lock().unwrap().pop_front().expect("unexpected request")
        }
    }

    fn ok(body: Value) -> Result<RawResponse> {
        Ok(RawResponse::new(200, body.to_string()))
    }

    #[tokio::test]
    async fn test_request_falls_back_to_get_on_transport_failure() {
        let transport = Scripted::with(vec![
            Err(SqlizerError::transport_failure("connection refused")),
            ok(json!({"ok": true, "dialect": "sqlite"})),
        ]);
        let client = BackendClient::new(transport.clone());

        let reply = client.connect_test(&ConnectionPayload::url("sqlite:///x.db")).await.unwrap();
        assert_eq!(reply.dialect.as_deref(), Some("sqlite"));

        let sent = transport.sent.lock().unwrap().clone();
        assert_eq!(
            sent,
            vec![
                (Method::Post, "/connect/test".to_string(), true),
                (Method::Get, "/connect/test".to_string(), false),
            ]
        );
    }

    #[tokio::test]
    async fn test_no_fallback_on_backend_error() {
        let transport = Scripted::with(vec![Ok(RawResponse::new(
            400,
            r#"{"detail": "Connection failed: password authentication failed"}"#,
        ))]);
        let client = BackendClient::new(transport.clone());

        let err = client.connect_test(&ConnectionPayload::url("postgresql://u@h/d")).await.unwrap_err();
        assert_eq!(
            err,
            SqlizerError::backend_error(Some(400), "Connection failed: password authentication failed")
        );
        assert_eq!(transport.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_post_only_endpoints_do_not_fall_back() {
        let transport = Scripted::with(vec![Err(SqlizerError::transport_failure("timeout"))]);
        let client = BackendClient::new(transport.clone());

        let err = client.schema_id(&ConnectionPayload::url("sqlite:///x.db")).await.unwrap_err();
        assert!(err.is_transport());
        assert_eq!(transport.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_non_json_failure_is_normalized() {
        let transport = Scripted::with(vec![Ok(RawResponse::new(502, "<html>bad gateway</html>"))]);
        let client = BackendClient::new(transport);

        let err = client.healthz().await.unwrap_err();
        assert_eq!(err, SqlizerError::backend_error(Some(502), "/healthz failed with HTTP 502"));
    }

    #[tokio::test]
    async fn test_ok_false_body_is_backend_error() {
        let transport = Scripted::with(vec![ok(json!({
            "ok": false, "schema_id": "s", "status": "not_found",
            "message": "No training in progress and no model found"
        }))]);
        let client = BackendClient::new(transport);

        let err = client.progress("s").await.unwrap_err();
        assert_eq!(err.message(), "No training in progress and no model found");
    }

    #[tokio::test]
    async fn test_model_status_not_found_is_a_status_not_an_error() {
        let transport = Scripted::with(vec![ok(json!({
            "ok": false, "schema_id": "s1", "status": "not_found", "message": "Model not found. Training required."
        }))]);
        let client = BackendClient::new(transport.clone());

        let reply = client.model_status("s1").await.unwrap();
        assert_eq!(reply.status, ModelStatus::NotFound);
        assert_eq!(transport.sent.lock().unwrap()[0].1, "/models/s1/status");
    }

    #[tokio::test]
    async fn test_model_status_without_status_and_ok_false_is_error() {
        let transport = Scripted::with(vec![ok(json!({"ok": false, "error": "boom"}))]);
        let client = BackendClient::new(transport);
        assert_eq!(client.model_status("s1").await.unwrap_err().message(), "boom");
    }

    #[tokio::test]
    async fn test_train_sends_connection_and_flag() {
        let transport = Scripted::with(vec![ok(json!({"ok": true, "status": "training", "schema_id": "s9"}))]);
        let client = BackendClient::new(transport.clone());

        let reply = client.train(&ConnectionPayload::url("sqlite:///x.db"), false).await.unwrap();
        assert_eq!(reply, TrainReply { status: ModelStatus::Training, schema_id: "s9".to_string(), message: None });
        assert_eq!(transport.sent.lock().unwrap()[0].0, Method::Post);
    }

    #[test]
    fn test_failure_text_precedence() {
        assert_eq!(failure_text(&json!({"detail": "d", "error": "e"})).as_deref(), Some("d"));
        assert_eq!(failure_text(&json!({"error": "e", "message": "m"})).as_deref(), Some("e"));
        assert_eq!(failure_text(&json!({"detail": [{"loc": ["body"]}]})).as_deref(), Some(r#"[{"loc":["body"]}]"#));
        assert_eq!(failure_text(&json!({"ok": false})), None);
    }
}
