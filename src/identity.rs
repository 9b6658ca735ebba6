//! Connection Identity
//!
//! A secret-free key for a connection target, used to deduplicate the recent
//! list and to key the credential cache.
//!
//! The identity is a pure function of four components: driver family, host,
//! port and database. User, password and options never take part. Absent
//! port and absent database normalize to the empty string, so `None` and
//! `Some("")` for the database give the same identity.

use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};

use crate::dsn::ConnectionFields;

/// Separator between components; escaped inside components
const SEPARATOR: char = '|';

const COMPONENT: &AsciiSet = &CONTROLS.add(b'|').add(b'%').add(b' ');

/// Derive the identity of a connection target
///
/// Family and host are lowercased (both are case-insensitive names);
/// the database is kept as-is because several engines treat it case-sensitively.
#[must_use]
pub fn identity(fields: &ConnectionFields) -> String {
    let family = fields.family();
    let host = fields.host.trim().to_ascii_lowercase();
    let port = fields.port.map(|p| p.to_string()).unwrap_or_default();
    let database = fields.database.as_deref().unwrap_or_default().trim();

    [family.as_str(), host.as_str(), port.as_str(), database]
        .iter()
        .map(|part| utf8_percent_encode(part, COMPONENT).to_string())
        .collect::<Vec<_>>()
        .join(&SEPARATOR.to_string())
}

/// Identity of a URL, if it parses
#[must_use]
pub fn identity_of_url(url: &str) -> Option<String> {
    crate::dsn::parse(url).map(|fields| identity(&fields))
}
