//! Sqlizer CLI Entry Point
//!
//! Subcommands:
//! - `health` - Backend liveness
//! - `parse`, `build`, `identity` - Offline connection URL tools
//! - `connect` - Test a target and remember it
//! - `recent`, `current`, `use`, `forget` - Remembered targets
//! - `status` - Bring the current target to readiness and report it
//! - `chat` - Interactive question loop once the target is ready
//! - `config` - Resolved configuration
//!
//! All output to stdout is JSON. Logs go to stderr.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use clap::{ArgAction, Args, Parser, Subcommand};
use dialoguer::{Input, Password};
use serde::Serialize;
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;

use sqlizer::{
    connect, identity, resolve_config, BackendClient, ClientConfig, ConfigOverrides, ConnectInput,
    ConnectionFields, ConnectionRecord, CredentialCache, ErrorEnvelope, ErrorInfo, FileStore, MemoryStore,
    Metadata, Orchestrator, ReadinessSettings, RecentConnections, SqlizerError, SuccessEnvelope,
};

/// Sqlizer - connection client for a natural-language SQL backend
#[derive(Parser)]
#[command(name = "sqlizer")]
#[command(about = "Normalize database connection strings and drive them to NL-to-SQL readiness")]
#[command(version)]
struct Cli {
    /// Backend base URL (overrides SQLIZER_API_URL and the config file)
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Directory for durable state (overrides SQLIZER_STATE_DIR)
    #[arg(long, global = true)]
    state_dir: Option<PathBuf>,

    /// More logging on stderr (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// Discrete connection fields
#[derive(Args, Debug, Default)]
struct FieldArgs {
    /// Driver name, e.g. `postgresql+psycopg`, `sqlite`, `mongodb+srv`
    #[arg(long)]
    driver: Option<String>,

    /// Host name; for file databases use --database for the path
    #[arg(long)]
    host: Option<String>,

    #[arg(long)]
    port: Option<u16>,

    /// Database name or file path
    #[arg(long)]
    database: Option<String>,

    #[arg(long)]
    user: Option<String>,

    #[arg(long)]
    password: Option<String>,
}

impl FieldArgs {
    fn into_fields(self) -> Option<ConnectionFields> {
        Some(ConnectionFields {
            driver: self.driver?,
            host: self.host.unwrap_or_default(),
            port: self.port,
            database: self.database,
            user: self.user,
            password: self.password,
            options: None,
        })
    }
}

/// Target given on the command line: a URL or field flags
#[derive(Args, Debug)]
struct TargetArgs {
    /// Connection URL
    url: Option<String>,

    #[command(flatten)]
    fields: FieldArgs,

    /// Ask for the password interactively
    #[arg(long)]
    prompt_password: bool,
}

impl TargetArgs {
    fn is_given(&self) -> bool {
        self.url.is_some() || self.fields.driver.is_some()
    }

    fn into_input(self) -> anyhow::Result<ConnectInput> {
        let prompt = self.prompt_password;
        let input = match (self.url, self.fields.into_fields()) {
            (Some(url), _) if !prompt => return Ok(ConnectInput::Url(url)),
            (Some(url), _) => parse_url(&url)?,
            (None, Some(fields)) => fields,
            (None, None) => {
                return Err(SqlizerError::invalid_input("Provide a connection URL or --driver and field flags").into())
            }
        };

        if !prompt {
            return Ok(ConnectInput::Fields(input));
        }
        let password = Password::new()
            .with_prompt("Password")
            .allow_empty_password(true)
            .interact()
            .context("Could not read password")?;
        Ok(ConnectInput::Fields(ConnectionFields { password: Some(password), ..input }))
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the backend is reachable
    Health,

    /// Parse a connection URL into fields (password masked)
    Parse { url: String },

    /// Build a connection URL from fields (password masked)
    Build {
        #[command(flatten)]
        fields: FieldArgs,
    },

    /// Print the stable identity of a connection URL
    Identity { url: String },

    /// Test a connection and remember it
    Connect {
        #[command(flatten)]
        target: TargetArgs,
    },

    /// List remembered connections, newest first
    Recent,

    /// Show the current connection
    Current,

    /// Make a remembered connection current
    Use { id: String },

    /// Forget a remembered connection
    Forget { id: String },

    /// Bring the current connection to readiness and print the result
    Status,

    /// Ask questions interactively once the connection is ready
    Chat {
        #[command(flatten)]
        target: TargetArgs,

        /// Maximum rows per answer
        #[arg(long, default_value_t = 100)]
        limit: u32,

        /// Backend query timeout in milliseconds
        #[arg(long, default_value_t = 30_000)]
        timeout_ms: u64,
    },

    /// Print the resolved configuration
    Config,
}

impl Commands {
    const fn name(&self) -> &'static str {
        match self {
            Self::Health => "health",
            Self::Parse { .. } => "parse",
            Self::Build { .. } => "build",
            Self::Identity { .. } => "identity",
            Self::Connect { .. } => "connect",
            Self::Recent => "recent",
            Self::Current => "current",
            Self::Use { .. } => "use",
            Self::Forget { .. } => "forget",
            Self::Status => "status",
            Self::Chat { .. } => "chat",
            Self::Config => "config",
        }
    }
}

/// Command result before it is wrapped in an envelope
struct Output {
    data: Value,
    items: Option<usize>,
}

impl Output {
    fn of<T: Serialize>(data: &T) -> anyhow::Result<Self> {
        Ok(Self { data: serde_json::to_value(data)?, items: None })
    }

    fn list<T: Serialize>(data: &[T]) -> anyhow::Result<Self> {
        Ok(Self { data: serde_json::to_value(data)?, items: Some(data.len()) })
    }
}

/// Everything an online command needs
struct App {
    config: ClientConfig,
    client: BackendClient,
    recent: Arc<RecentConnections<FileStore>>,
    credentials: Arc<CredentialCache<MemoryStore>>,
}

impl App {
    fn new(config: ClientConfig) -> anyhow::Result<Self> {
        let client = BackendClient::from_config(&config)?;
        let recent = Arc::new(RecentConnections::new(FileStore::new(&config.state_dir)));
        let credentials = Arc::new(CredentialCache::new(MemoryStore::new()));
        Ok(Self { config, client, recent, credentials })
    }

    fn orchestrator(&self) -> Orchestrator<FileStore, MemoryStore> {
        Orchestrator::new(
            self.client.clone(),
            Arc::clone(&self.recent),
            Arc::clone(&self.credentials),
            ReadinessSettings::from(&self.config),
        )
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let command = cli.command.name();
    let started = Instant::now();
    match run(cli).await {
        Ok(output) => {
            let elapsed = elapsed_ms(started);
            let meta = match output.items {
                Some(items) => Metadata::with_items(elapsed, items),
                None => Metadata::new(elapsed),
            };
            print_json(&SuccessEnvelope::new(command, output.data, meta));
            ExitCode::SUCCESS
        }
        Err(err) => {
            let envelope = match err.downcast_ref::<SqlizerError>() {
                Some(e) => ErrorEnvelope::from_error(command, e),
                None => ErrorEnvelope::new(command, ErrorInfo::new("INTERNAL_ERROR", format!("{err:#}"))),
            };
            print_json(&envelope);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "sqlizer=debug",
        _ => "sqlizer=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).with_target(false).init();
}

async fn run(cli: Cli) -> anyhow::Result<Output> {
    let overrides = ConfigOverrides { api_base_url: cli.api_url, state_dir: cli.state_dir };
    // Offline commands never resolve configuration
    let app = || -> anyhow::Result<App> { App::new(resolve_config(overrides)?) };

    match cli.command {
        Commands::Parse { url } => {
            let fields = parse_url(&url)?;
            Output::of(&json!({
                "fields": fields.without_password(),
                "has_password": fields.password.is_some(),
                "masked_url": sqlizer::dsn::masked(&fields),
                "dialect": fields.dialect().label,
            }))
        }
        Commands::Identity { url } => Output::of(&json!({ "id": identity(&parse_url(&url)?) })),
        Commands::Build { fields } => {
            let fields = fields.into_fields().ok_or_else(|| SqlizerError::invalid_input("--driver is required"))?;
            let url = sqlizer::dsn::masked(&fields)
                .ok_or_else(|| SqlizerError::malformed_input("Connection fields do not describe a database target"))?;
            Output::of(&json!({ "masked_url": url, "id": identity(&fields) }))
        }
        Commands::Health => Output::of(&app()?.client.healthz().await?),
        Commands::Connect { target } => {
            let app = app()?;
            let input = target.into_input()?;
            let record = connect(&input, &app.client, &app.recent, &app.credentials).await?;
            Output::of(&record)
        }
        Commands::Recent => Output::list(&app()?.recent.list()),
        Commands::Current => Output::of(&app()?.recent.current()),
        Commands::Use { id } => {
            let app = app()?;
            let record = remembered(&app, &id)?;
            app.recent.set_current(Some(&record))?;
            Output::of(&record)
        }
        Commands::Forget { id } => Output::list(&app()?.recent.delete(&id)?),
        Commands::Status => {
            let orchestrator = app()?.orchestrator();
            if orchestrator.activate_current().is_none() {
                return Err(SqlizerError::not_ready("No current connection; run `sqlizer connect` first").into());
            }
            let readiness = orchestrator.wait_until_settled().await;
            orchestrator.shutdown();
            Output::of(&readiness)
        }
        Commands::Chat { target, limit, timeout_ms } => chat(&app()?, target, limit, timeout_ms).await,
        Commands::Config => Output::of(&app()?.config),
    }
}

fn parse_url(url: &str) -> Result<ConnectionFields, SqlizerError> {
    sqlizer::parse(url).ok_or_else(|| SqlizerError::malformed_input("URL does not match any supported connection format"))
}

fn remembered(app: &App, id: &str) -> anyhow::Result<ConnectionRecord> {
    app.recent
        .get(id)
        .ok_or_else(|| SqlizerError::invalid_input(format!("No remembered connection with id '{id}'")).into())
}

async fn chat(app: &App, target: TargetArgs, limit: u32, timeout_ms: u64) -> anyhow::Result<Output> {
    let record = if target.is_given() {
        let input = target.into_input()?;
        connect(&input, &app.client, &app.recent, &app.credentials).await?
    } else {
        app.recent
            .current()
            .ok_or_else(|| SqlizerError::not_ready("No current connection; pass a URL or run `sqlizer connect`"))?
    };

    let orchestrator = app.orchestrator();
    orchestrator.activate(&record);
    eprintln!("Preparing {} ...", record.display_name);
    let readiness = orchestrator.wait_until_settled().await;
    if !readiness.chat_ready() {
        let reason = readiness.error().unwrap_or("Connection is not ready").to_string();
        return Err(SqlizerError::not_ready(reason).into());
    }

    let mut answered = 0usize;
    loop {
        let question: String = Input::new()
            .with_prompt("Question (empty to quit)")
            .allow_empty(true)
            .interact_text()
            .context("Could not read question")?;
        let question = question.trim();
        if question.is_empty() || question == "exit" || question == "quit" {
            break;
        }

        match orchestrator.ask(question, limit, timeout_ms).await {
            Ok(reply) => {
                answered += 1;
                print_json(&SuccessEnvelope::new("ask", reply, Metadata::default()));
            }
            Err(e) => print_json(&ErrorEnvelope::from_error("ask", &e)),
        }
    }

    orchestrator.shutdown();
    Output::of(&json!({ "id": record.id, "answered": answered }))
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string(value) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("could not serialize output: {e}"),
    }
}
