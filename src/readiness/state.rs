//! Readiness state machine
//!
//! One [`Readiness`] value per orchestrator, changed only through [`reduce`].
//! Schema discovery and model readiness are two independent sub-machines:
//!
//! ```text
//! schema: Idle -> Loading -> Ready | Error
//! model:  Unknown -> NotFound -> Training -> Ready
//!         Unknown -> Training -> Ready
//!         Unknown -> Ready
//!         any -> Error
//! ```
//!
//! Events that do not fit the current state leave it unchanged.

use serde::Serialize;

use crate::client::{ModelStatus, ProgressStatus, SchemaOverview, TrainingProgress};

/// Which credential source the active payload came from, best first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialSource {
    /// Full URL from this session's credential cache
    Session,
    /// Stored non-secret fields; fails for targets that need a password
    StoredFields,
    /// Masked URL; always fails for targets that need a password
    MaskedUrl,
}

/// Identifies one activation of one target
///
/// `generation` grows on every activation, so re-activating the same target
/// still invalidates responses from the earlier activation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ActivationToken {
    pub identity: String,
    pub generation: u64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SchemaState {
    #[default]
    Idle,
    Loading,
    Ready { overview: SchemaOverview },
    Error { message: String },
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ModelState {
    #[default]
    Unknown,
    NotFound { schema_id: String },
    Training { schema_id: String, progress: TrainingProgress },
    Ready { schema_id: String },
    Error { message: String },
}

impl ModelState {
    /// Schema id the model state refers to, when known
    #[must_use]
    pub fn schema_id(&self) -> Option<&str> {
        match self {
            Self::NotFound { schema_id } | Self::Training { schema_id, .. } | Self::Ready { schema_id } => {
                Some(schema_id)
            }
            Self::Unknown | Self::Error { .. } => None,
        }
    }
}

/// Snapshot of the readiness pipeline for the active target
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Readiness {
    /// Active target, `None` when nothing is active
    pub token: Option<ActivationToken>,
    pub credential_source: Option<CredentialSource>,
    pub schema: SchemaState,
    pub model: ModelState,
    /// Schema discovery progress, 0-100
    pub index_progress: u8,
    /// Model training progress, 0-100
    pub train_progress: u8,
}

impl Readiness {
    /// Schema and model are both ready: the chat entry point is unlocked
    #[must_use]
    pub fn chat_ready(&self) -> bool {
        matches!(self.schema, SchemaState::Ready { .. }) && matches!(self.model, ModelState::Ready { .. })
    }

    /// Nothing more will happen without user action
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.chat_ready()
            || matches!(self.schema, SchemaState::Error { .. })
            || matches!(self.model, ModelState::Error { .. })
    }

    /// First error message, schema before model
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        match (&self.schema, &self.model) {
            (SchemaState::Error { message }, _) | (_, ModelState::Error { message }) => Some(message),
            _ => None,
        }
    }
}

/// Inputs to the state machine
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// A target became active; everything resets
    Activated { token: ActivationToken, source: CredentialSource },
    /// No target is active any more
    Deactivated,
    SchemaRequested,
    SchemaLoaded(SchemaOverview),
    SchemaFailed(String),
    /// First model status check answered
    ModelStatus { schema_id: String, status: ModelStatus, message: Option<String> },
    /// Train kickoff accepted
    TrainingStarted { schema_id: String },
    ProgressReported(TrainingProgress),
    /// Train kickoff found the model already trained
    ModelReady { schema_id: String },
    ModelFailed(String),
}

/// Pure transition function
#[must_use]
pub fn reduce(state: Readiness, event: Event) -> Readiness {
    match event {
        Event::Activated { token, source } => Readiness {
            token: Some(token),
            credential_source: Some(source),
            ..Readiness::default()
        },
        Event::Deactivated => Readiness::default(),
        Event::SchemaRequested => match state.schema {
            SchemaState::Idle | SchemaState::Error { .. } => {
                Readiness { schema: SchemaState::Loading, index_progress: 0, ..state }
            }
            SchemaState::Loading | SchemaState::Ready { .. } => state,
        },
        Event::SchemaLoaded(overview) => match state.schema {
            SchemaState::Loading => {
                Readiness { schema: SchemaState::Ready { overview }, index_progress: 100, ..state }
            }
            SchemaState::Idle | SchemaState::Ready { .. } | SchemaState::Error { .. } => state,
        },
        Event::SchemaFailed(message) => Readiness { schema: SchemaState::Error { message }, ..state },
        Event::ModelStatus { schema_id, status, message } => reduce_status(state, schema_id, status, message),
        Event::TrainingStarted { schema_id } => match state.model {
            ModelState::Unknown | ModelState::NotFound { .. } => Readiness {
                model: ModelState::Training { progress: TrainingProgress::started(&schema_id), schema_id },
                train_progress: 0,
                ..state
            },
            ModelState::Training { .. } | ModelState::Ready { .. } | ModelState::Error { .. } => state,
        },
        Event::ProgressReported(progress) => reduce_progress(state, progress),
        Event::ModelReady { schema_id } => match state.model {
            ModelState::Unknown | ModelState::NotFound { .. } | ModelState::Training { .. } => {
                Readiness { model: ModelState::Ready { schema_id }, train_progress: 100, ..state }
            }
            ModelState::Ready { .. } | ModelState::Error { .. } => state,
        },
        Event::ModelFailed(message) => Readiness { model: ModelState::Error { message }, ..state },
    }
}

fn reduce_status(state: Readiness, schema_id: String, status: ModelStatus, message: Option<String>) -> Readiness {
    // Only the first status check moves the model out of Unknown
    if !matches!(state.model, ModelState::Unknown) {
        return state;
    }
    match status {
        ModelStatus::NotFound => Readiness { model: ModelState::NotFound { schema_id }, ..state },
        ModelStatus::Training => Readiness {
            model: ModelState::Training { progress: TrainingProgress::started(&schema_id), schema_id },
            ..state
        },
        ModelStatus::Ready => Readiness { model: ModelState::Ready { schema_id }, train_progress: 100, ..state },
        ModelStatus::Error => Readiness {
            model: ModelState::Error { message: message.unwrap_or_else(|| "Model is in an error state".to_string()) },
            ..state
        },
    }
}

fn reduce_progress(state: Readiness, mut progress: TrainingProgress) -> Readiness {
    let ModelState::Training { schema_id, .. } = &state.model else {
        return state;
    };
    if progress.schema_id.is_empty() {
        progress.schema_id = schema_id.clone();
    } else if &progress.schema_id != schema_id {
        return state;
    }

    match progress.status {
        ProgressStatus::Training => {
            let train_progress = progress.percent();
            Readiness {
                model: ModelState::Training { schema_id: progress.schema_id.clone(), progress },
                train_progress,
                ..state
            }
        }
        ProgressStatus::Completed => {
            Readiness { model: ModelState::Ready { schema_id: progress.schema_id }, train_progress: 100, ..state }
        }
        ProgressStatus::Error => Readiness {
            model: ModelState::Error {
                message: progress.error.unwrap_or_else(|| "Model training failed".to_string()),
            },
            ..state
        },
    }
}
