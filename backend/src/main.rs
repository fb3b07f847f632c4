//! Traitload CLI - load hierarchical trait data sets into the store
//!
//! ```bash
//! traitload init-db                          # Create the tables
//! traitload validate data.json               # Check a document against the schema
//! traitload submit data.json --user-id 1     # Resolve and insert in one transaction
//! traitload submit data.json --dry-run       # Same, then always roll back
//! traitload schema                           # Print the document schema
//! ```

use clap::{Parser, Subcommand};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use traitload::{
    config::{DATABASE_URL_VAR, MAX_CONNECTIONS_VAR},
    connect, document_violations, init_schema, submit, Config, NodePath, SubmitOptions,
    DOCUMENT_SCHEMA,
};

#[derive(Parser)]
#[command(name = "traitload")]
#[command(about = "Load hierarchical trait data sets into a relational store", long_about = None)]
struct Cli {
    /// Database URL
    #[arg(long, global = true, env = DATABASE_URL_VAR)]
    database_url: Option<String>,

    /// Maximum pooled connections
    #[arg(long, global = true, env = MAX_CONNECTIONS_VAR)]
    max_connections: Option<u32>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the schema (idempotent)
    InitDb,

    /// Validate a document against the schema only
    Validate {
        /// Input JSON document
        input: PathBuf,
    },

    /// Resolve and insert a document in one transaction
    Submit {
        /// Input JSON document
        input: PathBuf,

        /// Acting user (falls back to TRAITLOAD_USER_ID)
        #[arg(short, long)]
        user_id: Option<i64>,

        /// Run everything, then roll back
        #[arg(long)]
        dry_run: bool,

        /// Output file for the outcome (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the embedded document schema
    Schema,
}

#[tokio::main]
async fn main() {
    // Load .env file (if present)
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "traitload=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let result = match load_config(&cli) {
        Ok(config) => match cli.command {
            Commands::InitDb => cmd_init_db(&config).await,
            Commands::Validate { input } => cmd_validate(&input),
            Commands::Submit {
                input,
                user_id,
                dry_run,
                output,
            } => cmd_submit(&config, &input, user_id, dry_run, output.as_deref()).await,
            Commands::Schema => cmd_schema(),
        },
        Err(e) => Err(e),
    };

    match result {
        Ok(true) => {}
        Ok(false) => std::process::exit(2),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

type CmdResult = Result<bool, Box<dyn std::error::Error>>;

fn load_config(cli: &Cli) -> Result<Config, Box<dyn std::error::Error>> {
    let mut config = Config::from_env()?;
    if let Some(url) = &cli.database_url {
        config.database_url = url.clone();
    }
    if let Some(n) = cli.max_connections {
        config.max_connections = n;
    }
    Ok(config)
}

fn read_document(input: &Path) -> Result<Value, Box<dyn std::error::Error>> {
    let content = fs::read_to_string(input)?;
    Ok(serde_json::from_str(&content)?)
}

async fn cmd_init_db(config: &Config) -> CmdResult {
    let pool = connect(&config.database_url, config.max_connections).await?;
    init_schema(&pool).await?;
    eprintln!("Schema ready at {}", config.database_url);
    Ok(true)
}

fn cmd_validate(input: &Path) -> CmdResult {
    eprintln!("Validating: {}", input.display());
    let document = read_document(input)?;

    match document_violations(&document) {
        Ok(()) => {
            eprintln!("Document is valid");
            Ok(true)
        }
        Err(errors) => {
            eprintln!("Document is invalid ({} errors):", errors.len());
            for error in errors {
                eprintln!("   - {}: {}", NodePath::from_pointer(&error.pointer), error.message);
            }
            Ok(false)
        }
    }
}

async fn cmd_submit(
    config: &Config,
    input: &Path,
    user_id: Option<i64>,
    dry_run: bool,
    output: Option<&Path>,
) -> CmdResult {
    let user_id = config.require_user_id(user_id)?;
    let document = read_document(input)?;

    let pool = connect(&config.database_url, config.max_connections).await?;
    init_schema(&pool).await?;

    eprintln!("Submitting: {}", input.display());
    let options = SubmitOptions::new(user_id).dry_run(dry_run);
    let outcome = submit(&pool, document, options).await?;

    let json = serde_json::to_string_pretty(&outcome)?;
    match output {
        Some(path) => {
            fs::write(path, &json)?;
            eprintln!("Outcome written to {}", path.display());
        }
        None => println!("{}", json),
    }

    eprintln!(
        "{:?}: {} traits, {} covariates ({})",
        outcome.status,
        outcome.created_trait_ids.len(),
        outcome.created_covariate_ids.len(),
        outcome.errors.summary()
    );
    if let Some(reason) = &outcome.aborted_by {
        eprintln!("   aborted by: {}", reason);
    }

    let flawless = outcome.errors.is_empty() && outcome.aborted_by.is_none();
    Ok(outcome.is_committed() || (dry_run && flawless))
}

fn cmd_schema() -> CmdResult {
    println!("{}", DOCUMENT_SCHEMA);
    Ok(true)
}
