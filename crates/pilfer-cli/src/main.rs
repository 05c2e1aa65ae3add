//! pilfer CLI - clone a database with anonymised, sampled data.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use pilfer::{
    Anonymiser, Config, DriverRegistry, DumpEngine, DumpReport, Generators, PilferError,
};
use tokio::sync::oneshot;
use tracing::{info, warn, Level};
use tracing_subscriber::fmt::format::FmtSpan;

/// Configuration file picked up when `--config` is not given.
const DEFAULT_CONFIG: &str = "pilfer.yaml";

#[derive(Parser)]
#[command(name = "pilfer")]
#[command(about = "Clone a database while anonymising sensitive columns")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file [default: pilfer.yaml if present]
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Output JSON result to stdout
    #[arg(long, global = true)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text", global = true)]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info", global = true)]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Copy structure and data from one database into another
    Steal {
        /// Source connection string (overrides `source` in the config)
        #[arg(long, env = "PILFER_FROM")]
        from: Option<String>,

        /// Destination connection string (overrides `target` in the config)
        #[arg(long, env = "PILFER_TO")]
        to: Option<String>,

        /// Override number of tables loaded at once
        #[arg(long)]
        concurrency: Option<usize>,
    },

    /// Print the DDL of a source database
    Structure {
        /// Source connection string (overrides `source` in the config)
        #[arg(long, env = "PILFER_FROM")]
        from: Option<String>,
    },

    /// List the database drivers built into this binary
    Drivers,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), PilferError> {
    let cli = Cli::parse();

    // Setup logging
    setup_logging(&cli.verbosity, &cli.log_format).map_err(PilferError::Config)?;

    let registry = DriverRegistry::with_builtins();

    match cli.command {
        Commands::Drivers => {
            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&registry.driver_names())?);
            } else {
                for name in registry.driver_names() {
                    println!("{}", name);
                }
            }
        }
        Commands::Structure { from } => {
            let config = load_config(cli.config.as_deref())?;
            let source = dsn(from, config.source.as_ref(), "source", "--from")?;

            let reader = registry
                .open_reader(&config.connection.conn_opts(source))
                .await?;
            let ddl = reader.get_structure().await;
            reader.close().await;
            print!("{}", ddl?);
        }
        Commands::Steal {
            from,
            to,
            concurrency,
        } => {
            let mut config = load_config(cli.config.as_deref())?;
            if let Some(n) = concurrency {
                config.dump.concurrency = n;
                config.validate()?;
            }
            let source = dsn(from, config.source.as_ref(), "source", "--from")?;
            let target = dsn(to, config.target.as_ref(), "target", "--to")?;

            let report = steal(&registry, &config, source, target).await?;
            print_report(&report, cli.output_json)?;
        }
    }

    Ok(())
}

/// Run a full dump and wait for its report.
async fn steal(
    registry: &DriverRegistry,
    config: &Config,
    source: String,
    target: String,
) -> Result<DumpReport, PilferError> {
    let reader = registry
        .open_reader(&config.connection.conn_opts(source))
        .await?;
    let loader = registry
        .open_loader(&config.connection.conn_opts(target))
        .await?;

    let tables = config.tables();
    let reader = Arc::new(Anonymiser::new(
        reader,
        tables.clone(),
        Arc::new(Generators::with_builtins()),
    ));
    let engine = DumpEngine::new(reader, loader, config.dump.clone().into());

    let (done_tx, done_rx) = oneshot::channel();
    if let Err(e) = engine.dump(done_tx, &tables).await {
        engine.close().await;
        return Err(e);
    }

    let report = tokio::select! {
        report = done_rx => report
            .map_err(|e| PilferError::connection(e, "waiting for the dump to finish")),
        _ = tokio::signal::ctrl_c() => {
            eprintln!("\nReceived Ctrl-C. Open table transactions will be rolled back.");
            Err(PilferError::Io(std::io::Error::new(
                std::io::ErrorKind::Interrupted,
                "dump interrupted",
            )))
        }
    };
    engine.close().await;
    report
}

/// Load the configuration file, falling back to defaults.
///
/// An explicit `--config` must exist; the default file is optional.
fn load_config(path: Option<&Path>) -> Result<Config, PilferError> {
    match path {
        Some(path) => {
            let config = Config::load(path)?;
            info!("Loaded configuration from {:?}", path);
            Ok(config)
        }
        None if Path::new(DEFAULT_CONFIG).exists() => {
            let config = Config::load(DEFAULT_CONFIG)?;
            info!("Loaded configuration from {}", DEFAULT_CONFIG);
            Ok(config)
        }
        None => Ok(Config::default()),
    }
}

/// Pick the command line connection string over the configured one.
fn dsn(
    flag: Option<String>,
    configured: Option<&String>,
    key: &str,
    arg: &str,
) -> Result<String, PilferError> {
    flag.or_else(|| configured.cloned()).ok_or_else(|| {
        PilferError::Config(format!(
            "no {} connection string: pass {} or set `{}` in the config",
            key, arg, key
        ))
    })
}

fn print_report(report: &DumpReport, output_json: bool) -> Result<(), PilferError> {
    if output_json {
        println!("{}", report.to_json()?);
        return Ok(());
    }

    println!("\nDump completed!");
    println!("  Run ID: {}", report.run_id);
    println!("  Duration: {:.2}s", report.duration_seconds);
    println!(
        "  Tables: {}/{}",
        report.tables_completed(),
        report.tables.len()
    );
    println!("  Rows: {}", report.rows_total());
    for table in &report.tables {
        match &table.error {
            Some(error) => println!(
                "  {}: {:?} ({} rows) - {}",
                table.table, table.status, table.rows, error
            ),
            None => println!("  {}: {} rows", table.table, table.rows),
        }
    }

    let incomplete = report.incomplete_tables();
    if !incomplete.is_empty() {
        warn!("{} tables did not load in full: {:?}", incomplete.len(), incomplete);
    }
    Ok(())
}

fn setup_logging(verbosity: &str, format: &str) -> Result<(), String> {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        other => return Err(format!("unknown verbosity '{}'", other)),
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(std::io::stderr);

    match format {
        "json" => subscriber.json().init(),
        "text" => subscriber.init(),
        other => return Err(format!("unknown log format '{}'", other)),
    }

    Ok(())
}
