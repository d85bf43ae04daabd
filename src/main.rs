use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::Level;

use nlsql::catalog::{self, ComponentCatalog, HashingEmbedder, JsonDirStorage};
use nlsql::config::Settings;
use nlsql::db::{SchemaProvider, SchemaSnapshot};
use nlsql::dsl::{ComponentKind, DslComponent, DslQuery, SqlGenerator};
use nlsql::{Pipeline, Translation};

/// Turn provisional query descriptions into SQL using a catalog of known
/// query fragments
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Config file (defaults to <config dir>/nlsql/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate SQL from a finished query (JSON)
    Compile { query: PathBuf },

    /// Enhance a provisional query (JSON) and generate SQL
    Translate {
        input: PathBuf,

        /// Run the SQL on a configured connection
        #[arg(long)]
        execute: Option<String>,
    },

    #[command(subcommand)]
    Catalog(CatalogCommand),
}

#[derive(Subcommand)]
enum CatalogCommand {
    /// Add components from a JSON array
    Add { components: PathBuf },

    /// Show the closest components of one kind
    Search {
        text: String,
        #[arg(long)]
        kind: String,
        #[arg(long, default_value_t = 5)]
        top_k: usize,
    },

    /// Remove one kind, or everything
    Clear {
        #[arg(long)]
        kind: Option<String>,
    },

    /// Generate components from a schema and/or predefined component files
    Seed {
        /// Schema snapshot (JSON object keyed by table)
        #[arg(long)]
        schema: Option<PathBuf>,

        /// Directory holding <kind>_components.json files
        #[arg(long)]
        components: Option<PathBuf>,

        /// Introspect a configured connection instead of reading a snapshot
        #[arg(long, conflicts_with = "schema")]
        connection: Option<String>,

        #[arg(long, default_value = "public")]
        db_schema: String,
    },

    /// Entry counts per kind
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?;

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        settings.log_level.parse().unwrap_or(Level::INFO)
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Compile { query } => {
            let query: DslQuery = serde_json::from_str(&read(&query)?)
                .context("Failed to parse query JSON")?;
            let sql = SqlGenerator::new(settings.generator).generate(&query)?;
            println!("{}", sql);
        }
        Command::Translate { input, execute } => {
            let catalog = open_catalog(&settings)?;
            let pipeline = Pipeline::from_settings(&settings, catalog);
            let translation = pipeline.translate(&read(&input)?)?;
            for sub in &translation.substitutions {
                eprintln!("filled {} with {} {} component(s)", sub.clause, sub.count, sub.kind);
            }
            println!("{}", translation.sql);
            if let Some(name) = execute {
                execute_on(&settings, &pipeline, &translation, &name).await?;
            }
        }
        Command::Catalog(command) => run_catalog(&settings, command).await?,
    }

    Ok(())
}

async fn run_catalog(settings: &Settings, command: CatalogCommand) -> Result<()> {
    let catalog = open_catalog(settings)?;

    match command {
        CatalogCommand::Add { components } => {
            let components: Vec<DslComponent> = serde_json::from_str(&read(&components)?)
                .context("Failed to parse components JSON")?;
            let count = components.len();
            catalog.add_batch(components)?;
            println!("added {} component(s)", count);
        }
        CatalogCommand::Search { text, kind, top_k } => {
            let kind = ComponentKind::parse(&kind);
            for hit in catalog.search_scored(&text, &kind, top_k)? {
                println!("{:.4}  {}", hit.score, hit.text);
            }
        }
        CatalogCommand::Clear { kind } => {
            let kind = kind.as_deref().map(ComponentKind::parse);
            catalog.clear(kind.as_ref())?;
        }
        CatalogCommand::Seed {
            schema,
            components,
            connection,
            db_schema,
        } => {
            let snapshot = match (schema, connection) {
                (Some(path), _) => Some(SchemaSnapshot::from_json(&read(&path)?)?),
                (None, Some(name)) => Some(introspect(settings, &name, &db_schema).await?),
                (None, None) => None,
            };
            if let Some(snapshot) = snapshot {
                let provider: Arc<dyn SchemaProvider> = Arc::new(snapshot);
                let pipeline = Pipeline::from_settings(settings, catalog.clone()).with_schema(provider);
                print_report(&pipeline.seed_catalog()?);
            }
            if let Some(dir) = components {
                print_report(&catalog::seed_predefined(&catalog, &dir)?);
            }
        }
        CatalogCommand::Stats => {
            for kind in catalog.kinds() {
                println!("{:<10} {}", kind, catalog.len(&kind));
            }
        }
    }
    Ok(())
}

fn open_catalog(settings: &Settings) -> Result<Arc<ComponentCatalog>> {
    let embedder = Arc::new(HashingEmbedder::new(settings.catalog.embedding_dimension));
    let storage = JsonDirStorage::open(settings.catalog.resolved_dir())?;
    Ok(Arc::new(ComponentCatalog::open(embedder, Box::new(storage))?))
}

fn read(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn print_report(report: &catalog::SeedReport) {
    for (kind, count) in report {
        println!("seeded {:<10} {}", kind, count);
    }
}

#[cfg(feature = "postgres")]
async fn connect(settings: &Settings, name: &str) -> Result<tokio_postgres::Client> {
    let mut config = settings.connection(name)?.clone();
    if config.resolved_password().is_empty() {
        let prompt = format!("Password for {}: ", config.display_string());
        config.password = rpassword::read_password_from_tty(Some(&prompt))?;
    }
    nlsql::db::connect(&config).await
}

#[cfg(feature = "postgres")]
async fn execute_on(
    settings: &Settings,
    pipeline: &Pipeline,
    translation: &Translation,
    name: &str,
) -> Result<()> {
    let sink = nlsql::db::PostgresSink::new(connect(settings, name).await?);
    match pipeline.execute(&sink, translation).await {
        Ok(rows) => {
            for row in rows {
                println!("{}", serde_json::to_string(&row)?);
            }
            Ok(())
        }
        Err(nlsql::Error::Execution(err)) => {
            eprintln!("{}", err.display_full());
            std::process::exit(1);
        }
        Err(err) => Err(err.into()),
    }
}

#[cfg(not(feature = "postgres"))]
async fn execute_on(
    _settings: &Settings,
    _pipeline: &Pipeline,
    _translation: &Translation,
    _name: &str,
) -> Result<()> {
    anyhow::bail!("nlsql was built without the `postgres` feature")
}

#[cfg(feature = "postgres")]
async fn introspect(settings: &Settings, name: &str, schema: &str) -> Result<SchemaSnapshot> {
    let client = connect(settings, name).await?;
    nlsql::db::introspect(&client, schema).await
}

#[cfg(not(feature = "postgres"))]
async fn introspect(_settings: &Settings, _name: &str, _schema: &str) -> Result<SchemaSnapshot> {
    anyhow::bail!("nlsql was built without the `postgres` feature")
}
