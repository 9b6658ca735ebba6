//! Backend wire types

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::dsn::ConnectionPayload;

/// `/connect/test` reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectTestReply {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dialect: Option<String>,
    /// Backend's own rendering of the URL, password hidden
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// `/schema/overview` reply
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SchemaOverview {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dialect: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    #[serde(default)]
    pub tables: Vec<TableOverview>,
}

impl SchemaOverview {
    #[must_use]
    pub fn column_count(&self) -> usize {
        self.tables.iter().map(|t| t.columns.len()).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableOverview {
    pub table: String,
    #[serde(default)]
    pub columns: Vec<ColumnOverview>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnOverview {
    pub name: String,
    #[serde(rename = "type", default)]
    pub data_type: String,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
}

const fn default_nullable() -> bool {
    true
}

/// `/models/schema-id` reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaIdReply {
    pub schema_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tables_count: Option<usize>,
}

/// Trained-model state as reported by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelStatus {
    NotFound,
    Training,
    /// `exists` is what `/models/train` answers for an already-trained model
    #[serde(alias = "exists")]
    Ready,
    Error,
}

/// `/models/{schema_id}/status` reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelStatusReply {
    pub status: ModelStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// `/models/train` request body
#[derive(Debug, Clone, Serialize)]
pub struct TrainRequest<'a> {
    pub connection: &'a ConnectionPayload,
    pub use_llm_for_training: bool,
}

/// `/models/train` reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainReply {
    pub status: ModelStatus,
    pub schema_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Training state inside a progress report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    Training,
    Completed,
    Error,
}

/// Per-stage progress
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageProgress {
    #[serde(default)]
    pub progress: f64,
    #[serde(default)]
    pub message: String,
}

/// `/models/{schema_id}/progress` reply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingProgress {
    #[serde(default)]
    pub schema_id: String,
    pub status: ProgressStatus,
    #[serde(default)]
    pub overall_progress: f64,
    #[serde(default)]
    pub stages: BTreeMap<String, StageProgress>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TrainingProgress {
    /// Empty report for a training run that just started
    pub fn started(schema_id: impl Into<String>) -> Self {
        Self {
            schema_id: schema_id.into(),
            status: ProgressStatus::Training,
            overall_progress: 0.0,
            stages: BTreeMap::new(),
            error: None,
        }
    }

    /// Overall progress as a whole percentage, clamped to 0-100
    #[must_use]
    pub fn percent(&self) -> u8 {
        if self.status == ProgressStatus::Completed {
            return 100;
        }
        // Clamped first, so the cast cannot truncate
        self.overall_progress.clamp(0.0, 100.0).round() as u8
    }
}

/// `/ai/ask` request body
#[derive(Debug, Clone, Serialize)]
pub struct AskRequest<'a> {
    pub question: &'a str,
    pub connection: &'a ConnectionPayload,
    pub limit: u32,
    pub timeout_ms: u64,
}

/// `/ai/ask` reply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AskReply {
    pub sql: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columns: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows: Option<Vec<Value>>,
}
