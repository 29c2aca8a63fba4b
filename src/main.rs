//! Purpose: `aerostep` CLI entry point; runs one record step per invocation.
//! Role: Binary crate root; parses args, builds the task context, emits JSON on stdout.
//! Invariants: Successful commands emit exactly one JSON document on stdout.
//! Invariants: Non-interactive errors are emitted as JSON on stderr.
//! Invariants: Process exit code is derived from `api::to_exit_code`.
//! Invariants: Every command releases its connection before the process exits.
#![allow(clippy::result_large_err)]
use std::io::{self, IsTerminal};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum, error::ErrorKind as ClapErrorKind};
use serde_json::{Map, Value, json};
use std::error::Error as StdError;
use tracing_subscriber::EnvFilter;

mod command_dispatch;

use aerostep::api::{
    ConnectionProfile, DEFAULT_CONN_ID, DEFAULT_PORT, EnvProfiles, Error, ErrorKind,
    ProfileRegistry, RestConnector, StaticProfiles, TaskContext, to_exit_code,
};

#[derive(Copy, Clone, Debug)]
struct RunOutcome {
    exit_code: i32,
}

impl RunOutcome {
    fn ok() -> Self {
        Self { exit_code: 0 }
    }

    fn with_code(exit_code: i32) -> Self {
        Self { exit_code }
    }
}

fn main() {
    let exit_code = match run() {
        Ok(outcome) => outcome.exit_code,
        Err(err) => {
            emit_error(&err);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn run() -> Result<RunOutcome, Error> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ClapErrorKind::DisplayHelp
            | ClapErrorKind::DisplayVersion
            | ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                err.print().map_err(|io_err| {
                    Error::new(ErrorKind::Io)
                        .with_message("failed to write help")
                        .with_source(io_err)
                })?;
                let exit_code = if matches!(
                    err.kind(),
                    ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
                ) {
                    2
                } else {
                    0
                };
                return Ok(RunOutcome::with_code(exit_code));
            }
            _ => {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message(clap_error_summary(&err))
                    .with_hint("Run `aerostep --help` for usage."));
            }
        },
    };

    init_tracing(cli.verbose);
    let context = build_context(&cli)?;
    command_dispatch::dispatch_command(cli.command, &context, &cli.conn_id)
}

#[derive(Parser)]
#[command(
    name = "aerostep",
    version,
    about = "Read, write and poll Aerospike records as pipeline steps",
    long_about = None,
    after_help = r#"EXAMPLES
  $ export AEROSTEP_CONN_AEROSPIKE_DEFAULT=aerospike://127.0.0.1:3000
  $ aerostep put test users u1 --bins '{"name": "ada"}'
  $ aerostep get test users u1 u2
  $ aerostep exists test users u1
  $ aerostep --host 10.0.0.5 --port 3000 test-connection"#,
    arg_required_else_help = true
)]
struct Cli {
    #[arg(
        long,
        default_value = DEFAULT_CONN_ID,
        help = "Connection profile id (resolved from AEROSTEP_CONN_<ID> unless --host is set)"
    )]
    conn_id: String,
    #[arg(long, help = "Seed node host; bypasses environment profile lookup")]
    host: Option<String>,
    #[arg(long, requires = "host", help = "Seed node port (default: 3000)")]
    port: Option<u16>,
    #[arg(long, value_enum, default_value = "http", help = "Gateway scheme")]
    scheme: Scheme,
    #[arg(long, default_value_t = 10_000, help = "Per-request timeout in milliseconds")]
    timeout_ms: u64,
    #[arg(short, long, help = "Log step progress to stderr")]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum Scheme {
    Http,
    Https,
}

impl Scheme {
    fn as_str(self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }
}

#[derive(Subcommand)]
enum Command {
    #[command(about = "Create a record or add/erase bins (a null bin value erases it)")]
    Put {
        namespace: String,
        set: String,
        key: String,
        #[arg(long, help = "Bins as a JSON object, e.g. '{\"bin\": 1}'")]
        bins: String,
        #[arg(long, help = "Write metadata as JSON, e.g. '{\"ttl\": 60}'")]
        metadata: Option<String>,
        #[arg(long, help = "Write policy as JSON (default: {\"exists\": \"ignore\"})")]
        policy: Option<String>,
    },
    #[command(about = "Read records; one key prints a one-element list")]
    Get {
        namespace: String,
        set: String,
        #[arg(required = true)]
        keys: Vec<String>,
        #[arg(long, help = "Treat a single key as a multi-key request")]
        list: bool,
        #[arg(long, help = "Read policy as JSON (default: {\"key\": \"send\"})")]
        policy: Option<String>,
    },
    #[command(about = "Check whether every key exists (one poll)")]
    Exists {
        namespace: String,
        set: String,
        #[arg(required = true)]
        keys: Vec<String>,
        #[arg(long, help = "Treat a single key as a multi-key request")]
        list: bool,
        #[arg(long, help = "Read policy as JSON (default: {\"key\": \"send\"})")]
        policy: Option<String>,
    },
    #[command(about = "Reset a record's expiration without changing its bins")]
    Touch {
        namespace: String,
        set: String,
        key: String,
        #[arg(long, allow_hyphen_values = true, help = "New ttl in seconds (-1 never expires)")]
        ttl: i64,
        #[arg(long, help = "Operate policy as JSON")]
        policy: Option<String>,
    },
    #[command(about = "Open and close a connection, reporting success or the failure reason")]
    TestConnection,
    #[command(about = "Print provider metadata and connection form behaviour")]
    ProviderInfo,
}

fn build_context(cli: &Cli) -> Result<TaskContext, Error> {
    let registry: Arc<dyn ProfileRegistry> = match &cli.host {
        Some(host) => Arc::new(StaticProfiles::new().with_profile(ConnectionProfile::new(
            cli.conn_id.clone(),
            host.clone(),
            cli.port.unwrap_or(DEFAULT_PORT),
        ))),
        None => Arc::new(EnvProfiles::new()),
    };
    let connector = RestConnector::new()
        .with_scheme(cli.scheme.as_str())
        .with_timeout(Duration::from_millis(cli.timeout_ms));
    Ok(TaskContext::new("cli", registry, Arc::new(connector)))
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "info" } else { "warn" };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

fn clap_error_summary(err: &clap::Error) -> String {
    let rendered = err.to_string();
    rendered
        .lines()
        .find(|line| !line.trim().is_empty())
        .map(|line| line.trim_start_matches("error: ").trim().to_string())
        .unwrap_or_else(|| "invalid arguments".to_string())
}

fn emit_json(value: Value) {
    let json = if io::stdout().is_terminal() {
        serde_json::to_string_pretty(&value)
    } else {
        serde_json::to_string(&value)
    }
    .unwrap_or_else(|_| "{\"error\":\"json encode failed\"}".to_string());
    println!("{json}");
}

fn emit_error(err: &Error) {
    if io::stderr().is_terminal() {
        eprintln!("{}", error_text(err));
        return;
    }

    let json = serde_json::to_string(&error_json(err)).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn error_json(err: &Error) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    inner.insert("message".to_string(), json!(error_message(err)));
    if let Some(hint) = err.hint() {
        inner.insert("hint".to_string(), json!(hint));
    }
    if let Some(key) = err.key() {
        inner.insert("key".to_string(), json!(key));
    }
    let causes = error_causes(err);
    if !causes.is_empty() {
        inner.insert("causes".to_string(), json!(causes));
    }

    let mut outer = Map::new();
    outer.insert("error".to_string(), Value::Object(inner));
    Value::Object(outer)
}

fn error_text(err: &Error) -> String {
    let mut lines = vec![format!("error: {}", error_message(err))];
    if let Some(hint) = err.hint() {
        lines.push(format!("hint: {hint}"));
    }
    if let Some(key) = err.key() {
        lines.push(format!("key: {key}"));
    }
    if let Some(cause) = error_causes(err).first() {
        lines.push(format!("caused by: {cause}"));
    }
    lines.join("\n")
}

fn error_message(err: &Error) -> String {
    if let Some(message) = err.message() {
        return message.to_string();
    }
    match err.kind() {
        ErrorKind::Internal => "internal error".to_string(),
        ErrorKind::Usage => "usage error".to_string(),
        ErrorKind::NotConnected => "not connected".to_string(),
        ErrorKind::Connection => "connection failed".to_string(),
        ErrorKind::ProfileNotFound => "connection profile not found".to_string(),
        ErrorKind::MalformedResult => "malformed result".to_string(),
        ErrorKind::Store => "store operation failed".to_string(),
        ErrorKind::Io => "i/o error".to_string(),
    }
}

fn error_causes(err: &Error) -> Vec<String> {
    let mut causes = Vec::new();
    let mut cur = err.source();
    while let Some(source) = cur {
        match source.downcast_ref::<Error>() {
            Some(inner) => causes.push(error_message(inner)),
            None => causes.push(source.to_string()),
        }
        cur = source.source();
    }
    causes
}
