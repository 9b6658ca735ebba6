//! Sqlizer - connection client for a natural-language SQL backend
//!
//! Sqlizer turns the connection strings people paste into structured
//! targets, remembers the last few targets, and drives a selected target to
//! "chat ready": schema discovered and NL-to-SQL model trained.
//!
//! # Module Organization
//! - [`error`] - Error types and stable error codes
//! - [`output`] - JSON output envelopes for the CLI
//! - [`dsn`] - Connection URL codec and dialect table
//! - [`identity`] - Stable connection identity
//! - [`store`] - Key-value stores and the recent-connections list
//! - [`credentials`] - Session-only credential cache
//! - [`client`] - Backend HTTP client
//! - [`readiness`] - Readiness state machine and orchestrator
//! - [`connect`] - Connection test and save flow
//! - [`config`] - Configuration management
//!
//! # Secrets
//! Passwords live only in the session credential cache. Everything written
//! to durable storage, logged, or printed uses the masked form.

pub mod client;
pub mod config;
pub mod connect;
pub mod credentials;
pub mod dsn;
pub mod error;
pub mod identity;
pub mod output;
pub mod readiness;
pub mod store;

pub use client::{BackendClient, HttpTransport, Transport};
pub use config::{resolve_config, ClientConfig, ConfigOverrides};
pub use connect::{connect, ConnectInput};
pub use credentials::CredentialCache;
pub use dsn::{build, mask_url, parse, ConnectionFields, ConnectionPayload, Dialect};
pub use error::{Result, SqlizerError};
pub use identity::identity;
pub use output::{ErrorEnvelope, ErrorInfo, Metadata, SuccessEnvelope};
pub use readiness::{Orchestrator, Readiness, ReadinessSettings};
pub use store::{ConnectionRecord, FileStore, KeyValueStore, MemoryStore, RecentConnections, SessionScoped};
