//! Codec round-trip law across the dialect table

use pretty_assertions::assert_eq;

use sqlizer::dsn::{build, parse, Dialect, Grammar};
use sqlizer::{identity, ConnectionFields};

/// Fully specified fields for every dialect in the table
fn well_formed() -> Vec<ConnectionFields> {
    vec![
        ConnectionFields::file("sqlite", "./demo.db"),
        ConnectionFields::file("duckdb", "/var/lib/warehouse.duckdb"),
        ConnectionFields::new("mongodb+srv", "cluster0.abc.mongodb.net")
            .with_database("mydb")
            .with_user("u")
            .with_password("p")
            .with_options("retryWrites=true&w=majority"),
        ConnectionFields::new("mongodb", "mongo.local").with_port(27018).with_database("events"),
        ConnectionFields::new("postgresql+psycopg", "localhost")
            .with_port(5432)
            .with_database("postgres")
            .with_user("postgres")
            .with_password(""),
        ConnectionFields::new("postgres", "10.0.0.5")
            .with_port(6543)
            .with_database("app")
            .with_user("svc")
            .with_password("p@ss:w/rd?#"),
        ConnectionFields::new("mysql+pymysql", "db.internal")
            .with_port(3306)
            .with_database("shop")
            .with_user("root")
            .with_password("root"),
        ConnectionFields::new("mariadb", "maria").with_port(3307).with_database("m").with_user("u"),
        ConnectionFields::new("mssql+pyodbc", "sql.corp")
            .with_port(1433)
            .with_database("crm")
            .with_user("sa")
            .with_password("Str0ng!")
            .with_options("driver=ODBC+Driver+18+for+SQL+Server"),
        ConnectionFields::new("oracle+oracledb", "ora").with_port(1521).with_database("XEPDB1").with_user("hr"),
        ConnectionFields::new("postgresql", "::1").with_port(5433).with_database("local"),
        ConnectionFields::new("clickhouse+http", "ch.local").with_port(8123).with_database("logs"),
        ConnectionFields::new("postgresql", "h").with_port(5432).with_database("sales@eu"),
        ConnectionFields::new("mongodb+srv", "cluster0.abc.mongodb.net")
            .with_database("mydb")
            .with_user("u")
            .with_password("p")
            .with_options("appName=ops@team"),
        ConnectionFields::new("mysql", "db").with_port(3306).with_database("a/b?c").with_password("only"),
    ]
}

#[test]
fn test_every_dialect_is_covered() {
    let covered: Vec<&str> = well_formed().iter().map(|f| f.dialect().name).collect();
    for dialect in Dialect::all() {
        assert!(covered.contains(&dialect.name), "no round-trip case for {}", dialect.name);
    }
}

#[test]
fn test_parse_inverts_build() {
    for fields in well_formed() {
        let url = build(&fields).unwrap_or_else(|| panic!("could not build {fields:?}"));
        assert_eq!(parse(&url), Some(fields), "round trip through {url}");
    }
}

/// Exception 1: an absent port comes back as the dialect's default port
#[test]
fn test_exception_default_port_injection() {
    for (driver, port) in [("mongodb", 27017), ("postgresql", 5432), ("mysql", 3306), ("mssql", 1433), ("oracle", 1521)]
    {
        let fields = ConnectionFields::new(driver, "h").with_database("d");
        let parsed = parse(&build(&fields).unwrap()).unwrap();
        assert_eq!(parsed.port, Some(port), "{driver}");
        assert_eq!(ConnectionFields { port: None, ..parsed }, fields);
    }

    // Dialects without a conventional port round-trip an absent port exactly
    for fields in [
        ConnectionFields::new("mongodb+srv", "c.net").with_database("d"),
        ConnectionFields::new("snowflake", "acct").with_database("wh"),
    ] {
        assert_eq!(parse(&build(&fields).unwrap()), Some(fields));
    }
}

/// Exception 2: a cluster URL with no database comes back with an empty one
#[test]
fn test_exception_cluster_absent_database() {
    let fields = ConnectionFields::new("mongodb+srv", "cluster0.abc.mongodb.net").with_user("u").with_password("p");
    let url = build(&fields).unwrap();
    assert_eq!(url, "mongodb+srv://u:p@cluster0.abc.mongodb.net");

    let parsed = parse(&url).unwrap();
    assert_eq!(parsed.database.as_deref(), Some(""));
    assert_eq!(ConnectionFields { database: None, ..parsed }, fields);
}

/// Exception 3: an empty user reads back as an absent one
#[test]
fn test_exception_empty_user_reads_as_absent() {
    let fields = ConnectionFields::new("postgresql", "h").with_port(5432).with_database("d").with_user("").with_password("p");
    let url = build(&fields).unwrap();
    assert_eq!(url, "postgresql://:p@h:5432/d");
    assert_eq!(parse(&url), Some(ConnectionFields { user: None, ..fields }));
}

#[test]
fn test_at_sign_outside_authority_keeps_host() {
    let fields = parse("postgresql://db.local:5432/app?application_name=me@laptop").unwrap();
    assert_eq!(fields.host, "db.local");
    assert_eq!(fields.user, None);
    assert_eq!(fields.password, None);
    assert_eq!(fields.options.as_deref(), Some("application_name=me@laptop"));
    assert_eq!(identity(&fields), "postgresql|db.local|5432|app");
}

#[test]
fn test_build_postgres_with_empty_password() {
    let fields = ConnectionFields::new("postgresql+psycopg", "localhost")
        .with_port(5432)
        .with_database("postgres")
        .with_user("postgres")
        .with_password("");
    assert_eq!(build(&fields).as_deref(), Some("postgresql+psycopg://postgres:@localhost:5432/postgres"));
}

#[test]
fn test_parse_mongodb_srv() {
    let fields = parse("mongodb+srv://u:p@cluster.abc.mongodb.net/mydb").unwrap();
    assert_eq!(fields.driver, "mongodb+srv");
    assert_eq!(fields.host, "cluster.abc.mongodb.net");
    assert_eq!(fields.port, None);
    assert_eq!(fields.database.as_deref(), Some("mydb"));
    assert_eq!(fields.user.as_deref(), Some("u"));
    assert_eq!(fields.password.as_deref(), Some("p"));
    assert_eq!(fields.dialect().grammar, Grammar::Cluster);
}

#[test]
fn test_garbage_matches_no_grammar() {
    for input in ["", "localhost:5432", "://h/d", "postgresql://", "sqlite://relative.db", "pg sql://h/d", "mysql://u@"] {
        assert_eq!(parse(input), None, "{input:?}");
    }
}

#[test]
fn test_identity_is_stable_across_construction_order() {
    let a = ConnectionFields::new("postgresql", "DB.local").with_database("app").with_port(5432).with_user("x");
    let b = ConnectionFields::new("postgresql+asyncpg", "db.local").with_user("y").with_port(5432).with_database("app");
    assert_eq!(identity(&a), identity(&b));
}
