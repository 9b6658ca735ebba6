//! Connect Flow
//!
//! Tests a connection target against the backend and, when the backend
//! accepts it, remembers it:
//!
//! 1. Normalize the input through the codec. Input that matches no grammar
//!    is `MalformedInput` and nothing is sent.
//! 2. `/connect/test` with `{"url": ...}`.
//! 3. Save the record (most recent first), cache the full URL for this
//!    session, point `current` at it.
//!
//! A backend failure surfaces verbatim and writes nothing.

use crate::client::BackendClient;
use crate::credentials::CredentialCache;
use crate::dsn::{self, ConnectionFields, ConnectionPayload};
use crate::error::{Result, SqlizerError};
use crate::store::{ConnectionRecord, KeyValueStore, RecentConnections, SessionScoped};

/// What the user typed: a whole URL or discrete fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectInput {
    Url(String),
    Fields(ConnectionFields),
}

impl ConnectInput {
    /// Canonical URL and fields for the input
    ///
    /// The fields are re-parsed from the built URL, so a URL and the
    /// equivalent fields produce the same identity (including the injected
    /// default port).
    pub fn normalize(&self) -> Result<(String, ConnectionFields)> {
        let fields = match self {
            Self::Url(url) => dsn::parse(url).ok_or_else(|| {
                SqlizerError::malformed_input("URL does not match any supported connection format")
            })?,
            Self::Fields(fields) => fields.clone(),
        };

        let url = dsn::build(&fields).ok_or_else(|| {
            SqlizerError::malformed_input("Connection fields do not describe a database target")
        })?;
        let fields = dsn::parse(&url).ok_or_else(|| {
            SqlizerError::malformed_input("Connection fields do not describe a database target")
        })?;
        Ok((url, fields))
    }
}

/// Test `input` and remember it on success
#[tracing::instrument(level = "debug", skip_all)]
pub async fn connect<D, S>(
    input: &ConnectInput,
    client: &BackendClient,
    recent: &RecentConnections<D>,
    credentials: &CredentialCache<S>,
) -> Result<ConnectionRecord>
where
    D: KeyValueStore,
    S: SessionScoped,
{
    let (url, fields) = input.normalize()?;
    let record = ConnectionRecord::from_fields(&fields)
        .ok_or_else(|| SqlizerError::malformed_input("Connection fields do not describe a database target"))?;
    tracing::debug!(id = %record.id, url = %record.masked_url, "testing connection");

    let reply = client.connect_test(&ConnectionPayload::url(url.as_str())).await?;
    if !reply.ok {
        return Err(SqlizerError::backend_error(None, "Connection test failed"));
    }

    recent.save(record.clone())?;
    credentials.put(&record.id, &url)?;
    recent.set_current(Some(&record))?;
    tracing::debug!(id = %record.id, dialect = ?reply.dialect, "connection saved");

    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::identity_of_url;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_normalize_url_and_fields_agree() {
        let from_url = ConnectInput::Url("postgresql://app:pw@db.local/app".to_string()).normalize().unwrap();
        let from_fields = ConnectInput::Fields(
            ConnectionFields::new("postgresql", "db.local").with_database("app").with_user("app").with_password("pw"),
        )
        .normalize()
        .unwrap();

        assert_eq!(from_url, from_fields);
        assert_eq!(from_url.0, "postgresql://app:pw@db.local:5432/app");
        assert_eq!(from_url.1.port, Some(5432));
        assert_eq!(identity_of_url(&from_url.0).as_deref(), Some("postgresql|db.local|5432|app"));
    }

    #[test]
    fn test_normalize_rejects_garbage() {
        let err = ConnectInput::Url("not a url".to_string()).normalize().unwrap_err();
        assert_eq!(err.error_code(), "MALFORMED_INPUT");

        let err = ConnectInput::Fields(ConnectionFields::new("postgresql", "")).normalize().unwrap_err();
        assert_eq!(err.error_code(), "MALFORMED_INPUT");
    }
}
