//! Readiness Orchestrator
//!
//! Drives one active target from "just selected" to "chat ready": schema
//! discovery and model readiness run concurrently, training progress is
//! polled until completion, and every result is applied through
//! [`reduce`] to one [`Readiness`] snapshot published on a `watch` channel.
//!
//! # Activation
//! [`Orchestrator::activate`] resets the snapshot and issues a fresh
//! [`ActivationToken`] before any request for the target is spawned. Every
//! response is compared with the active token before it is applied; a
//! response for an abandoned activation is dropped.
//!
//! # Credential precedence
//! The payload sent to the backend is resolved in this order, and the
//! chosen [`CredentialSource`] is part of the snapshot:
//! 1. `Session`: the full URL from the credential cache
//! 2. `StoredFields`: the stored fields, which carry no password
//! 3. `MaskedUrl`: the masked URL, logged as a warning
//!
//! Failures on 2 and 3 carry a hint to reconnect with a password.
//!
//! # Polling
//! Training progress is polled immediately and then every
//! `poll_interval` until the backend reports `completed` or `error`. The
//! poll task is aborted when another target is activated, on
//! [`Orchestrator::deactivate`], and when the orchestrator is dropped.

mod state;

pub use state::{reduce, ActivationToken, CredentialSource, Event, ModelState, Readiness, SchemaState};

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::client::{AskReply, BackendClient, ModelStatus, ProgressStatus};
use crate::config::ClientConfig;
use crate::credentials::CredentialCache;
use crate::dsn::{self, ConnectionPayload, Grammar};
use crate::error::{Result, SqlizerError};
use crate::store::{ConnectionRecord, KeyValueStore, RecentConnections, SessionScoped};

const RECONNECT_HINT: &str = "no password for this connection in this session; reconnect to supply it";

/// Orchestrator tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessSettings {
    pub poll_interval: Duration,
    pub use_llm_for_training: bool,
}

impl Default for ReadinessSettings {
    fn default() -> Self {
        Self { poll_interval: Duration::from_secs(1), use_llm_for_training: true }
    }
}

impl From<&ClientConfig> for ReadinessSettings {
    fn from(config: &ClientConfig) -> Self {
        Self { poll_interval: config.poll_interval(), use_llm_for_training: config.use_llm_for_training }
    }
}

/// Pick the payload for `record`, best credential first
pub fn resolve_payload<S: SessionScoped>(
    record: &ConnectionRecord,
    credentials: &CredentialCache<S>,
) -> (ConnectionPayload, CredentialSource) {
    if let Some(url) = credentials.get(&record.id) {
        return (ConnectionPayload::url(url), CredentialSource::Session);
    }

    let fields = record.fields_sans_password.to_fields();
    if let Some(url) = dsn::build(&fields) {
        let payload = match fields.dialect().grammar {
            Grammar::Generic => ConnectionPayload::parts(&fields),
            Grammar::FilePath | Grammar::Cluster => ConnectionPayload::url(url),
        };
        return (payload, CredentialSource::StoredFields);
    }

    tracing::warn!(id = %record.id, "no usable credential, falling back to the masked URL");
    (ConnectionPayload::url(record.masked_url.clone()), CredentialSource::MaskedUrl)
}

/// Human-readable failure text, with a reconnect hint when the payload had
/// no password
fn describe(error: &SqlizerError, source: CredentialSource) -> String {
    match (source, error) {
        (CredentialSource::StoredFields | CredentialSource::MaskedUrl, SqlizerError::BackendError { .. }) => {
            format!("{} ({RECONNECT_HINT})", error.message())
        }
        _ => error.message(),
    }
}

struct Active {
    token: ActivationToken,
    record: ConnectionRecord,
}

#[derive(Default)]
struct Control {
    generation: u64,
    active: Option<Active>,
    poll: Option<JoinHandle<()>>,
}

impl Control {
    fn is_active(&self, token: &ActivationToken) -> bool {
        self.active.as_ref().is_some_and(|active| &active.token == token)
    }

    fn stop_polling(&mut self) {
        if let Some(poll) = self.poll.take() {
            poll.abort();
        }
    }
}

struct Shared<D, S> {
    client: BackendClient,
    recent: Arc<RecentConnections<D>>,
    credentials: Arc<CredentialCache<S>>,
    settings: ReadinessSettings,
    state: watch::Sender<Readiness>,
    control: Mutex<Control>,
}

impl<D, S> Shared<D, S>
where
    D: KeyValueStore + 'static,
    S: SessionScoped + 'static,
{
    fn control(&self) -> MutexGuard<'_, Control> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_active(&self, token: &ActivationToken) -> bool {
        self.control().is_active(token)
    }

    /// Apply `event` if `token` is still the active activation
    ///
    /// Returns whether the event was applied. Progress changes are mirrored
    /// into the stored record.
    fn apply(&self, token: &ActivationToken, event: Event) -> bool {
        let control = self.control();
        if !control.is_active(token) {
            tracing::debug!(id = %token.identity, generation = token.generation, "discarding stale response");
            return false;
        }

        let mut progress = None;
        self.state.send_modify(|state| {
            let before = (state.index_progress, state.train_progress);
            *state = reduce(std::mem::take(state), event);
            let after = (state.index_progress, state.train_progress);
            if before != after {
                progress = Some(after);
            }
        });

        if let Some((index, train)) = progress {
            if let Err(e) = self.recent.update_progress(&token.identity, Some(index), Some(train)) {
                tracing::warn!(error = %e, "could not record progress");
            }
        }
        drop(control);
        true
    }

    fn start_polling(self: &Arc<Self>, token: &ActivationToken, schema_id: String) {
        let mut control = self.control();
        if !control.is_active(token) {
            return;
        }
        control.stop_polling();
        control.poll = Some(tokio::spawn(poll_loop(Arc::clone(self), token.clone(), schema_id)));
    }
}

#[tracing::instrument(level = "debug", skip_all, fields(id = %token.identity, generation = token.generation))]
async fn load_schema<D, S>(
    shared: Arc<Shared<D, S>>,
    token: ActivationToken,
    payload: ConnectionPayload,
    source: CredentialSource,
) where
    D: KeyValueStore + 'static,
    S: SessionScoped + 'static,
{
    let event = match shared.client.schema_overview(&payload).await {
        Ok(overview) => {
            tracing::debug!(tables = overview.tables.len(), "schema loaded");
            Event::SchemaLoaded(overview)
        }
        Err(e) => Event::SchemaFailed(describe(&e, source)),
    };
    shared.apply(&token, event);
}

#[tracing::instrument(level = "debug", skip_all, fields(id = %token.identity, generation = token.generation))]
async fn prepare_model<D, S>(
    shared: Arc<Shared<D, S>>,
    token: ActivationToken,
    payload: ConnectionPayload,
    source: CredentialSource,
) where
    D: KeyValueStore + 'static,
    S: SessionScoped + 'static,
{
    if let Err(e) = check_model(&shared, &token, &payload).await {
        shared.apply(&token, Event::ModelFailed(describe(&e, source)));
    }
}

async fn check_model<D, S>(shared: &Arc<Shared<D, S>>, token: &ActivationToken, payload: &ConnectionPayload) -> Result<()>
where
    D: KeyValueStore + 'static,
    S: SessionScoped + 'static,
{
    let schema_id = shared.client.schema_id(payload).await?;
    if !shared.is_active(token) {
        return Ok(());
    }

    let status = shared.client.model_status(&schema_id).await?;
    let schema_id = status.schema_id.clone().unwrap_or(schema_id);
    tracing::debug!(%schema_id, status = ?status.status, "model status");

    let applied = shared.apply(
        token,
        Event::ModelStatus { schema_id: schema_id.clone(), status: status.status, message: status.message },
    );
    if !applied {
        return Ok(());
    }

    match status.status {
        ModelStatus::NotFound => {
            let reply = shared.client.train(payload, shared.settings.use_llm_for_training).await?;
            match reply.status {
                ModelStatus::Training => {
                    if shared.apply(token, Event::TrainingStarted { schema_id: reply.schema_id.clone() }) {
                        shared.start_polling(token, reply.schema_id);
                    }
                }
                ModelStatus::Ready => {
                    // Trained by someone else between the status check and the kickoff
                    shared.apply(token, Event::ModelReady { schema_id: reply.schema_id });
                }
                ModelStatus::NotFound | ModelStatus::Error => {
                    let message = reply.message.unwrap_or_else(|| "Model training could not be started".to_string());
                    return Err(SqlizerError::backend_error(None, message));
                }
            }
        }
        ModelStatus::Training => shared.start_polling(token, schema_id),
        ModelStatus::Ready | ModelStatus::Error => {}
    }
    Ok(())
}

#[tracing::instrument(level = "debug", skip_all, fields(id = %token.identity, generation = token.generation))]
async fn poll_loop<D, S>(shared: Arc<Shared<D, S>>, token: ActivationToken, schema_id: String)
where
    D: KeyValueStore + 'static,
    S: SessionScoped + 'static,
{
    let mut ticker = tokio::time::interval(shared.settings.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        // First tick completes immediately
        ticker.tick().await;
        if !shared.is_active(&token) {
            break;
        }

        match shared.client.progress(&schema_id).await {
            Ok(progress) => {
                let status = progress.status;
                tracing::debug!(%schema_id, percent = progress.percent(), ?status, "training progress");
                if !shared.apply(&token, Event::ProgressReported(progress)) {
                    break;
                }
                if status != ProgressStatus::Training {
                    break;
                }
            }
            Err(e) => {
                shared.apply(&token, Event::ModelFailed(e.message()));
                break;
            }
        }
    }
}

/// Readiness pipeline for one target at a time
pub struct Orchestrator<D, S>
where
    D: KeyValueStore + 'static,
    S: SessionScoped + 'static,
{
    shared: Arc<Shared<D, S>>,
}

impl<D, S> std::fmt::Debug for Orchestrator<D, S>
where
    D: KeyValueStore + 'static,
    S: SessionScoped + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator").field("state", &*self.shared.state.borrow()).finish_non_exhaustive()
    }
}

impl<D, S> Orchestrator<D, S>
where
    D: KeyValueStore + 'static,
    S: SessionScoped + 'static,
{
    pub fn new(
        client: BackendClient,
        recent: Arc<RecentConnections<D>>,
        credentials: Arc<CredentialCache<S>>,
        settings: ReadinessSettings,
    ) -> Self {
        let (state, _) = watch::channel(Readiness::default());
        Self {
            shared: Arc::new(Shared {
                client,
                recent,
                credentials,
                settings,
                state,
                control: Mutex::new(Control::default()),
            }),
        }
    }

    /// Make `record` the active target and start bringing it to readiness
    ///
    /// Must be called from within a Tokio runtime.
    pub fn activate(&self, record: &ConnectionRecord) -> ActivationToken {
        let (payload, source) = resolve_payload(record, &self.shared.credentials);

        let token = {
            let mut control = self.shared.control();
            control.stop_polling();
            control.generation += 1;
            let token = ActivationToken { identity: record.id.clone(), generation: control.generation };
            control.active = Some(Active { token: token.clone(), record: record.clone() });

            self.shared.state.send_modify(|state| {
                let reset = reduce(std::mem::take(state), Event::Activated { token: token.clone(), source });
                *state = reduce(reset, Event::SchemaRequested);
            });
            token
        };
        tracing::debug!(id = %token.identity, generation = token.generation, ?source, "activated target");

        tokio::spawn(load_schema(Arc::clone(&self.shared), token.clone(), payload.clone(), source));
        tokio::spawn(prepare_model(Arc::clone(&self.shared), token.clone(), payload, source));
        token
    }

    /// Activate the store's current target, if any
    pub fn activate_current(&self) -> Option<ActivationToken> {
        let record = self.shared.recent.current()?;
        Some(self.activate(&record))
    }

    /// Drop the active target; late responses for it are discarded
    pub fn deactivate(&self) {
        let mut control = self.shared.control();
        control.stop_polling();
        control.active = None;
        self.shared.state.send_modify(|state| *state = reduce(std::mem::take(state), Event::Deactivated));
    }

    /// Stop all background work
    pub fn shutdown(self) {
        self.deactivate();
    }

    /// Record of the active target
    #[must_use]
    pub fn active_record(&self) -> Option<ConnectionRecord> {
        self.shared.control().active.as_ref().map(|active| active.record.clone())
    }

    /// Current snapshot
    #[must_use]
    pub fn snapshot(&self) -> Readiness {
        self.shared.state.borrow().clone()
    }

    /// Receiver for every published snapshot
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Readiness> {
        self.shared.state.subscribe()
    }

    /// Wait until the active target is chat ready or has failed
    ///
    /// Returns immediately when no target is active.
    pub async fn wait_until_settled(&self) -> Readiness {
        let mut receiver = self.subscribe();
        let settled = receiver.wait_for(|state| state.token.is_none() || state.is_settled()).await;
        match settled {
            Ok(state) => state.clone(),
            Err(_) => self.snapshot(),
        }
    }

    /// Ask the backend a question about the active target
    ///
    /// Fails with `NotReady` until both schema and model are ready, and when
    /// this session holds no full URL for a target that needs a password.
    pub async fn ask(&self, question: &str, limit: u32, timeout_ms: u64) -> Result<AskReply> {
        let question = question.trim();
        if question.is_empty() {
            return Err(SqlizerError::invalid_input("Question cannot be empty"));
        }

        let (token, url) = {
            let control = self.shared.control();
            let active = control.active.as_ref().ok_or_else(|| SqlizerError::not_ready("No active connection"))?;
            if !self.shared.state.borrow().chat_ready() {
                return Err(SqlizerError::not_ready("Schema and model are not ready yet"));
            }
            let url = self.shared.credentials.get(&active.record.id).or_else(|| {
                let fields = active.record.fields_sans_password.to_fields();
                (fields.dialect().grammar == Grammar::FilePath).then(|| dsn::build(&fields)).flatten()
            });
            let url = url.ok_or_else(|| SqlizerError::not_ready(format!("Cannot ask: {RECONNECT_HINT}")))?;
            (active.token.clone(), url)
        };

        let reply = self.shared.client.ask(question, &ConnectionPayload::url(url), limit, timeout_ms).await?;
        if !self.shared.is_active(&token) {
            return Err(SqlizerError::stale_response(token.identity));
        }
        Ok(reply)
    }
}

impl<D, S> Drop for Orchestrator<D, S>
where
    D: KeyValueStore + 'static,
    S: SessionScoped + 'static,
{
    fn drop(&mut self) {
        let mut control = self.shared.control();
        control.stop_polling();
        control.active = None;
    }
}
