//! mysql-mongo-migrate CLI - MySQL to MongoDB migration with sampled validation.

use clap::{Parser, Subcommand};
use mysql_mongo_migrate::{Config, MigrateError, Orchestrator};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::sync::watch;
use tracing::{info, Level};

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

#[derive(Parser)]
#[command(name = "mysql-mongo-migrate")]
#[command(about = "MySQL to MongoDB migration with coreset-sampled validation")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download the hosted dump file into the working directory
    Prepare {
        /// Resource identifier on the hosting platform
        #[arg(long)]
        resource_id: String,

        /// Download URL of the dump file
        #[arg(long)]
        url: String,

        /// Dump file name (must end in .sql)
        #[arg(long)]
        file_name: String,
    },

    /// Import a generated schema description into the target
    ConvertSchema {
        /// Target database name
        #[arg(long)]
        database: String,

        /// Path to the JSON schema description
        #[arg(long)]
        schema_file: PathBuf,
    },

    /// Convert all table data in primary-key-ordered chunks
    ConvertData {
        /// Database to convert
        #[arg(long)]
        database: String,
    },

    /// Dump the converted database to a gzipped archive via mongodump
    DumpData {
        /// Database to dump
        #[arg(long)]
        database: String,

        /// Directory the archive is written into
        #[arg(long, default_value = "dumps")]
        out_dir: PathBuf,

        /// Upload the archive to the hosting platform as this resource
        #[arg(long)]
        resource_id: Option<String>,
    },

    /// Validate converted data with coreset-sampled comparison
    Validate {
        /// Resource identifier (cache namespace component)
        #[arg(long)]
        resource_id: String,

        /// Package identifier (cache namespace component)
        #[arg(long)]
        package_id: String,

        /// Database to validate
        #[arg(long)]
        database: String,

        /// Sampling seed for reproducible runs
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Export the validator log for a resource as CSV
    ExportReport {
        /// Resource identifier
        #[arg(long)]
        resource_id: String,

        /// Package identifier
        #[arg(long)]
        package_id: String,

        /// Directory the CSV is written into
        #[arg(long, default_value = "reports")]
        out_dir: PathBuf,

        /// Also upload the report to the hosting platform
        #[arg(long)]
        upload: bool,
    },
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

async fn run() -> Result<(), MigrateError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format)
        .map_err(MigrateError::Config)?;

    let mut config = Config::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);

    let cancel_rx = setup_signal_handler();

    match cli.command {
        Commands::Prepare {
            resource_id,
            url,
            file_name,
        } => {
            let orchestrator = Orchestrator::connect(config, cancel_rx).await?;
            let path = orchestrator.prepare_data(&resource_id, &url, &file_name).await?;
            orchestrator.shutdown().await;
            println!("Prepared dump file: {}", path.display());
        }

        Commands::ConvertSchema {
            database,
            schema_file,
        } => {
            let orchestrator = Orchestrator::connect(config, cancel_rx).await?;
            let tables = orchestrator.convert_schema(&database, &schema_file).await?;
            orchestrator.shutdown().await;
            println!("Schema conversion completed: {} tables", tables);
        }

        Commands::ConvertData { database } => {
            let orchestrator = Orchestrator::connect(config, cancel_rx).await?;
            let report = orchestrator.convert_data(&database).await?;
            orchestrator.shutdown().await;

            println!("\nData conversion completed!");
            println!("  Database: {}", report.database);
            println!("  Tables: {}", report.tables.len());
            println!("  Rows: {}", report.total_rows);
        }

        Commands::DumpData {
            database,
            out_dir,
            resource_id,
        } => {
            let orchestrator = Orchestrator::connect(config, cancel_rx).await?;
            let path = orchestrator.dump_data(&database, &out_dir).await?;
            if let Some(resource_id) = resource_id {
                orchestrator.upload_file(&resource_id, &path).await?;
            }
            orchestrator.shutdown().await;
            println!("Dump written to {}", path.display());
        }

        Commands::Validate {
            resource_id,
            package_id,
            database,
            seed,
        } => {
            if seed.is_some() {
                config.validation.seed = seed;
            }

            let orchestrator = Orchestrator::connect(config, cancel_rx).await?;
            let report = orchestrator
                .validate_data(&resource_id, &package_id, &database)
                .await?;
            orchestrator.shutdown().await;

            let flagged = report.flagged_tables();
            println!("\nValidation completed!");
            println!("  Database: {}", report.database);
            println!(
                "  Tables: {}/{} OK",
                report.tables.len() - flagged.len(),
                report.tables.len()
            );
            if !flagged.is_empty() {
                println!("  Flagged tables: {:?}", flagged);
            }
        }

        Commands::ExportReport {
            resource_id,
            package_id,
            out_dir,
            upload,
        } => {
            let orchestrator = Orchestrator::connect(config, cancel_rx).await?;
            let path = orchestrator
                .export_validator_report(&resource_id, &package_id, &out_dir)
                .await?;
            if upload {
                orchestrator.upload_file(&resource_id, &path).await?;
            }
            orchestrator.shutdown().await;
            println!("Report written to {}", path.display());
        }
    }

    Ok(())
}

fn setup_logging(verbosity: &str, format: &str) -> Result<(), String> {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    Ok(())
}

/// Setup signal handlers for graceful shutdown.
/// Handles both SIGINT (Ctrl-C) and SIGTERM (Kubernetes/Airflow shutdown).
/// Returns a watch receiver that flips to `true` when a signal is received.
#[cfg(unix)]
fn setup_signal_handler() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);

    let tx_int = tx.clone();
    tokio::spawn(async move {
        let mut sigint = signal(SignalKind::interrupt()).expect("Failed to setup SIGINT handler");
        sigint.recv().await;
        eprintln!("\nReceived SIGINT. Shutting down gracefully...");
        let _ = tx_int.send(true);
    });

    tokio::spawn(async move {
        let mut sigterm = signal(SignalKind::terminate()).expect("Failed to setup SIGTERM handler");
        sigterm.recv().await;
        eprintln!("\nReceived SIGTERM. Shutting down gracefully...");
        let _ = tx.send(true);
    });

    rx
}

/// Setup signal handler for Windows (only SIGINT/Ctrl-C)
#[cfg(not(unix))]
fn setup_signal_handler() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);

    tokio::spawn(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to setup Ctrl-C handler");
        eprintln!("\nReceived Ctrl-C. Shutting down gracefully...");
        let _ = tx.send(true);
    });

    rx
}
