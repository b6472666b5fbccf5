use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use sqlsieve::config::{SchemaFile, Settings};
use sqlsieve::db::{Database, PgManager, RecordingManager};
use sqlsieve::dialect::DialectKind;
use sqlsieve::schema::Schema;
use sqlsieve::sql::verify_all;

/// Schema tooling for sqlsieve table definitions
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Settings file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the DDL for a schema file without touching a database
    Ddl {
        schema: PathBuf,
        /// SQL dialect (generic, postgres, sqlite, mysql)
        #[arg(long)]
        dialect: Option<DialectKind>,
        /// Check that every statement parses
        #[arg(long)]
        check: bool,
    },
    /// Create the tables of a schema file on PostgreSQL
    Apply {
        schema: PathBuf,
        /// Saved connection to use (defaults to the first one)
        #[arg(long = "connect")]
        connect: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let cli = Cli::parse();
    let settings = match &cli.config {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    }
    .context("Failed to load settings")?;

    match cli.command {
        Command::Ddl {
            schema,
            dialect,
            check,
        } => print_ddl(&settings, &schema, dialect.unwrap_or(settings.dialect), check).await,
        Command::Apply { schema, connect } => apply(&settings, &schema, connect.as_deref()).await,
    }
}

fn load_schema(db: Arc<Database>, path: &Path) -> Result<Schema> {
    let file = SchemaFile::load(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let tables = file
        .into_tables(db.dialect(), db.typeset())
        .with_context(|| format!("Invalid schema in {}", path.display()))?;
    let mut schema = Schema::new(db);
    for table in tables {
        schema.add_table(table)?;
    }
    Ok(schema)
}

async fn print_ddl(settings: &Settings, path: &Path, dialect: DialectKind, check: bool) -> Result<()> {
    let recorder = RecordingManager::new();
    let mut effective = settings.clone();
    effective.dialect = dialect;
    let db = Arc::new(Database::from_settings(Arc::new(recorder.clone()), &effective));

    let mut schema = load_schema(Arc::clone(&db), path)?;
    schema.create_all().await?;

    let statements = recorder.statements();
    if check {
        verify_all(db.dialect(), &statements).context("Generated DDL does not parse")?;
        info!(statements = statements.len(), %dialect, "DDL parses");
    }
    for statement in statements {
        println!("{};", statement);
    }
    Ok(())
}

async fn apply(settings: &Settings, path: &Path, connect: Option<&str>) -> Result<()> {
    let mut config = match settings.connection(connect) {
        Ok(config) => config.clone(),
        Err(err) => {
            eprintln!("Error: {}", err);
            eprintln!("Saved connections:");
            for c in &settings.connections {
                eprintln!("  - {}", c.name);
            }
            std::process::exit(1);
        }
    };

    // Resolve password: PGPASSWORD env var, then interactive prompt
    if config.password.is_empty() {
        if let Ok(pw) = std::env::var("PGPASSWORD") {
            config.password = pw;
        } else {
            let prompt = format!("Password for {}: ", config.display_string());
            config.password = rpassword::read_password_from_tty(Some(&prompt))?;
        }
    }

    let manager = PgManager::new(&config)?;
    let mut effective = settings.clone();
    effective.dialect = DialectKind::Postgres;
    let db = Arc::new(Database::from_settings(Arc::new(manager), &effective));

    let mut schema = load_schema(Arc::clone(&db), path)?;
    schema
        .create_all()
        .await
        .with_context(|| format!("Failed to create schema on {}", config.display_string()))?;
    println!(
        "Created {} table(s) on {}",
        schema.tables().count(),
        config.display_string()
    );
    Ok(())
}
