//! Ordered dialect table
//!
//! Every supported driver family is one row of `DIALECTS`: a matcher over the
//! driver string, an extractor for the text after `://`, and a renderer.
//! Rows are tried top to bottom and the first match wins, so file-path and
//! cluster grammars are always detected before the generic catch-all.
//! Adding a dialect means adding a row.

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use super::ConnectionFields;

/// Characters left unescaped in user and password (RFC 3986 unreserved)
const USERINFO: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'.').remove(b'_').remove(b'~');

/// Characters left unescaped in the database segment
const SEGMENT: &AsciiSet = &USERINFO.remove(b'$').remove(b'+').remove(b'=');

/// Placeholder rendered instead of a password in masked URLs
pub const MASK: &str = "***";

/// URL grammar family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grammar {
    /// `driver:///<path>`; host, port and credentials are ignored
    FilePath,
    /// `driver://[user[:pass]@]host[:port]/[database]`, database segment optional
    Cluster,
    /// `driver://[user[:pass]@]host[:port]/database`
    Generic,
}

/// Whether the password is written out or masked when rendering
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Secret {
    Reveal,
    Mask,
}

/// One row of the dialect table
pub struct Dialect {
    /// Stable lowercase name
    pub name: &'static str,
    /// Human-readable engine name used in display names
    pub label: &'static str,
    pub grammar: Grammar,
    /// Port injected by `build` when the fields carry none
    pub default_port: Option<u16>,
    matches: fn(&str) -> bool,
    extract: fn(&str, &str) -> Option<ConnectionFields>,
    render: fn(&Dialect, &ConnectionFields, Secret) -> String,
}

impl std::fmt::Debug for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dialect")
            .field("name", &self.name)
            .field("grammar", &self.grammar)
            .field("default_port", &self.default_port)
            .finish()
    }
}

impl PartialEq for Dialect {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Dialect {
    /// First table row whose matcher accepts `driver`
    #[must_use]
    pub fn for_driver(driver: &str) -> &'static Dialect {
        DIALECTS
            .iter()
            .find(|d| (d.matches)(driver))
            .unwrap_or(&DIALECTS[DIALECTS.len() - 1])
    }

    /// The full table, in match order
    #[must_use]
    pub fn all() -> &'static [Dialect] {
        &DIALECTS
    }

    pub(crate) fn extract(&self, driver: &str, rest: &str) -> Option<ConnectionFields> {
        (self.extract)(driver, rest)
    }

    pub(crate) fn render(&self, fields: &ConnectionFields, secret: Secret) -> String {
        (self.render)(self, fields, secret)
    }

    /// Port written by `build`: the explicit one, else the conventional default.
    /// Host lists (`h1:1,h2:2`) carry their own ports and never get one injected.
    fn effective_port(&self, fields: &ConnectionFields) -> Option<u16> {
        if fields.host.contains(',') {
            return fields.port;
        }
        fields.port.or(self.default_port)
    }
}

static DIALECTS: [Dialect; 9] = [
    Dialect {
        name: "sqlite",
        label: "SQLite",
        grammar: Grammar::FilePath,
        default_port: None,
        matches: is_sqlite,
        extract: extract_file_path,
        render: render_file_path,
    },
    Dialect {
        name: "duckdb",
        label: "DuckDB",
        grammar: Grammar::FilePath,
        default_port: None,
        matches: is_duckdb,
        extract: extract_file_path,
        render: render_file_path,
    },
    Dialect {
        name: "mongodb+srv",
        label: "MongoDB Atlas",
        grammar: Grammar::Cluster,
        default_port: None,
        matches: is_mongodb_srv,
        extract: extract_cluster,
        render: render_cluster,
    },
    Dialect {
        name: "mongodb",
        label: "MongoDB",
        grammar: Grammar::Cluster,
        default_port: Some(27017),
        matches: is_mongodb,
        extract: extract_cluster,
        render: render_cluster,
    },
    Dialect {
        name: "postgresql",
        label: "PostgreSQL",
        grammar: Grammar::Generic,
        default_port: Some(5432),
        matches: is_postgres,
        extract: extract_generic,
        render: render_generic,
    },
    Dialect {
        name: "mysql",
        label: "MySQL",
        grammar: Grammar::Generic,
        default_port: Some(3306),
        matches: is_mysql,
        extract: extract_generic,
        render: render_generic,
    },
    Dialect {
        name: "mssql",
        label: "SQL Server",
        grammar: Grammar::Generic,
        default_port: Some(1433),
        matches: is_mssql,
        extract: extract_generic,
        render: render_generic,
    },
    Dialect {
        name: "oracle",
        label: "Oracle",
        grammar: Grammar::Generic,
        default_port: Some(1521),
        matches: is_oracle,
        extract: extract_generic,
        render: render_generic,
    },
    // Catch-all, must stay last
    Dialect {
        name: "generic",
        label: "SQL",
        grammar: Grammar::Generic,
        default_port: None,
        matches: any_driver,
        extract: extract_generic,
        render: render_generic,
    },
];

/// Driver family: the text before any `+` qualifier, lowercased
#[must_use]
pub fn driver_family(driver: &str) -> String {
    driver.split('+').next().unwrap_or_default().trim().to_ascii_lowercase()
}

/// `scheme` characters accepted as a driver name
pub(crate) fn is_valid_driver(driver: &str) -> bool {
    let mut chars = driver.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.' | '_'))
}

// ============================================================================
// Matchers
// ============================================================================

fn is_sqlite(driver: &str) -> bool {
    driver_family(driver) == "sqlite"
}

fn is_duckdb(driver: &str) -> bool {
    driver_family(driver) == "duckdb"
}

fn is_mongodb_srv(driver: &str) -> bool {
    driver.eq_ignore_ascii_case("mongodb+srv")
}

fn is_mongodb(driver: &str) -> bool {
    driver_family(driver) == "mongodb"
}

fn is_postgres(driver: &str) -> bool {
    matches!(driver_family(driver).as_str(), "postgresql" | "postgres")
}

fn is_mysql(driver: &str) -> bool {
    matches!(driver_family(driver).as_str(), "mysql" | "mariadb")
}

fn is_mssql(driver: &str) -> bool {
    driver_family(driver) == "mssql"
}

fn is_oracle(driver: &str) -> bool {
    driver_family(driver) == "oracle"
}

fn any_driver(_driver: &str) -> bool {
    true
}

// ============================================================================
// Extractors
// ============================================================================

fn extract_file_path(driver: &str, rest: &str) -> Option<ConnectionFields> {
    // `driver:///path` leaves `/path` after the scheme separator
    let path = rest.strip_prefix('/')?;
    Some(ConnectionFields {
        driver: driver.to_string(),
        host: String::new(),
        port: None,
        database: (!path.is_empty()).then(|| path.to_string()),
        user: None,
        password: None,
        options: None,
    })
}

fn extract_cluster(driver: &str, rest: &str) -> Option<ConnectionFields> {
    let parts = split_url(rest)?;
    Some(ConnectionFields {
        driver: driver.to_string(),
        host: parts.host,
        port: parts.port,
        // Cluster targets defer database naming: a missing segment is ""
        database: Some(parts.database.unwrap_or_default()),
        user: parts.user,
        password: parts.password,
        options: parts.options,
    })
}

fn extract_generic(driver: &str, rest: &str) -> Option<ConnectionFields> {
    let parts = split_url(rest)?;
    Some(ConnectionFields {
        driver: driver.to_string(),
        host: parts.host,
        port: parts.port,
        database: parts.database,
        user: parts.user,
        password: parts.password,
        options: parts.options,
    })
}

struct UrlParts {
    user: Option<String>,
    password: Option<String>,
    host: String,
    port: Option<u16>,
    database: Option<String>,
    options: Option<String>,
}

/// Split `[user[:pass]@]host[:port][/database][?options]`
///
/// The authority ends at the first `/` or `?`; within it the last `@` ends
/// the userinfo, so an unescaped `@` inside a password still parses while
/// `@` in the database or options never does. An empty user reads as absent.
fn split_url(rest: &str) -> Option<UrlParts> {
    let authority_end = rest.find(['/', '?']).unwrap_or(rest.len());
    let (authority, tail) = rest.split_at(authority_end);

    let (userinfo, hostport) = match authority.rfind('@') {
        Some(at) => (Some(&authority[..at]), &authority[at + 1..]),
        None => (None, authority),
    };

    let (user, password) = match userinfo {
        Some(info) => match info.split_once(':') {
            Some((user, pass)) => (decode(user)?, Some(decode(pass)?)),
            None => (decode(info)?, None),
        },
        None => (String::new(), None),
    };
    let user = (!user.is_empty()).then_some(user);

    let (host, port) = split_host_port(hostport)?;

    let (path, options) = match tail.split_once('?') {
        Some((path, query)) => (path, (!query.is_empty()).then(|| query.to_string())),
        None => (tail, None),
    };
    let database = match path.strip_prefix('/') {
        Some(segment) => Some(decode(segment)?),
        None => None,
    };

    Some(UrlParts { user, password, host, port, database, options })
}

fn split_host_port(authority: &str) -> Option<(String, Option<u16>)> {
    if authority.is_empty() {
        return None;
    }

    // Bracketed IPv6 literal
    if let Some(inner) = authority.strip_prefix('[') {
        let (host, after) = inner.split_once(']')?;
        let port = match after.strip_prefix(':') {
            Some(p) => parse_port(p)?,
            None if after.is_empty() => None,
            None => return None,
        };
        return Some((host.to_string(), port));
    }

    // Replica-set host lists keep their per-host ports inside `host`
    if authority.contains(',') {
        return Some((authority.to_string(), None));
    }

    match authority.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() => Some((host.to_string(), parse_port(port)?)),
        Some(_) => None,
        None => Some((authority.to_string(), None)),
    }
}

/// `Some(None)` for an empty port, `None` for a non-numeric one
fn parse_port(port: &str) -> Option<Option<u16>> {
    if port.is_empty() {
        return Some(None);
    }
    port.parse::<u16>().ok().map(Some)
}

fn decode(raw: &str) -> Option<String> {
    percent_decode_str(raw).decode_utf8().ok().map(|s| s.into_owned())
}

fn encode(raw: &str) -> String {
    utf8_percent_encode(raw, USERINFO).to_string()
}

fn encode_segment(raw: &str) -> String {
    utf8_percent_encode(raw, SEGMENT).to_string()
}

// ============================================================================
// Renderers
// ============================================================================

fn render_file_path(_dialect: &Dialect, fields: &ConnectionFields, _secret: Secret) -> String {
    format!("{}:///{}", fields.driver, fields.database.as_deref().unwrap_or_default())
}

fn render_cluster(dialect: &Dialect, fields: &ConnectionFields, secret: Secret) -> String {
    let mut url = render_authority(dialect, fields, secret);
    // Empty database means "no segment", not an empty segment
    if let Some(database) = fields.database.as_deref().filter(|d| !d.is_empty()) {
        url.push('/');
        url.push_str(&encode_segment(database));
    }
    push_options(&mut url, fields);
    url
}

fn render_generic(dialect: &Dialect, fields: &ConnectionFields, secret: Secret) -> String {
    let mut url = render_authority(dialect, fields, secret);
    if let Some(database) = fields.database.as_deref() {
        url.push('/');
        url.push_str(&encode_segment(database));
    }
    push_options(&mut url, fields);
    url
}

fn render_authority(dialect: &Dialect, fields: &ConnectionFields, secret: Secret) -> String {
    let mut url = format!("{}://", fields.driver);

    let user = fields.user.as_deref().unwrap_or_default();
    if !user.is_empty() || fields.password.is_some() {
        url.push_str(&encode(user));
        if let Some(password) = fields.password.as_deref() {
            url.push(':');
            match secret {
                Secret::Reveal => url.push_str(&encode(password)),
                Secret::Mask => url.push_str(MASK),
            }
        }
        url.push('@');
    }

    if fields.host.contains(':') && !fields.host.contains(',') {
        url.push('[');
        url.push_str(&fields.host);
        url.push(']');
    } else {
        url.push_str(&fields.host);
    }

    if let Some(port) = dialect.effective_port(fields) {
        url.push(':');
        url.push_str(&port.to_string());
    }
    url
}

fn push_options(url: &mut String, fields: &ConnectionFields) {
    if let Some(options) = fields.options.as_deref().filter(|o| !o.is_empty()) {
        url.push('?');
        url.push_str(options);
    }
}
