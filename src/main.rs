use anyhow::Context;
use clap::{Parser, Subcommand};
use shapecheck::{build_router, AppState, EngineConfig, ServerConfig, ValidationService};
use std::path::{Path, PathBuf};
use std::process;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "shapecheck")]
#[command(about = "Validate zipped shapefiles before publishing", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP validation service
    Serve {
        /// Port to listen on (overrides PORT)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Validate a ZIP archive, or every ZIP in a directory with --batch
    Check {
        #[arg(value_name = "PATH")]
        path: PathBuf,

        /// Treat PATH as a directory of archives
        #[arg(long)]
        batch: bool,

        /// Print reports for passing archives too
        #[arg(short, long)]
        verbose: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { port } => {
            init_logging("shapecheck=info,tower_http=info");
            serve(port)
        }
        Commands::Check {
            path,
            batch,
            verbose,
        } => {
            init_logging("shapecheck=warn");
            let engine = ValidationService::new(EngineConfig::from_env());
            let passed = if batch {
                check_batch(&engine, &path, verbose)?
            } else {
                check_one(&engine, &path, true)
            };
            process::exit(if passed { 0 } else { 1 })
        }
    }
}

fn init_logging(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

#[tokio::main]
async fn serve(port: Option<u16>) -> anyhow::Result<()> {
    let mut config = ServerConfig::from_env();
    if let Some(port) = port {
        config.port = port;
    }

    if let Err(e) = tokio::fs::create_dir_all(&config.upload_dir).await {
        warn!(
            "Failed to ensure upload directory {} exists: {}",
            config.upload_dir.display(),
            e
        );
    }

    let engine = ValidationService::new(EngineConfig::from_env());
    let addr = format!("0.0.0.0:{}", config.port);
    info!(
        "Max upload size {}, validation timeout {}s",
        config.max_upload_size_label,
        config.validation_timeout.as_secs()
    );

    let app = build_router(AppState::new(config, engine));

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("ShapeCheck server listening on http://{}", addr);

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}

/// Prints the outcome for one archive; returns whether it passed.
fn check_one(engine: &ValidationService, path: &Path, print_report: bool) -> bool {
    match engine.validate(path) {
        Ok(result) => {
            if print_report || !result.valid {
                if !result.shapefiles.is_empty() {
                    println!("Found {} shapefile(s):", result.shapefiles.len());
                    for name in &result.shapefiles {
                        println!("  - {}", name);
                    }
                }
                println!("{}", result.report);
            }
            println!(
                "Validation {} for {}",
                if result.valid { "PASSED" } else { "FAILED" },
                path.display()
            );
            result.valid
        }
        Err(e) => {
            eprintln!("Could not validate {}: {} [{}]", path.display(), e, e.category());
            false
        }
    }
}

fn check_batch(engine: &ValidationService, dir: &Path, verbose: bool) -> anyhow::Result<bool> {
    let mut archives = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read directory {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("zip"))
        })
        .collect::<Vec<_>>();
    archives.sort();

    if archives.is_empty() {
        println!("No ZIP archives found in {}", dir.display());
        return Ok(false);
    }

    let mut failed = 0usize;
    for archive in &archives {
        if !check_one(engine, archive, verbose) {
            failed += 1;
        }
    }

    println!(
        "Batch summary: {} archive(s), {} passed, {} failed",
        archives.len(),
        archives.len() - failed,
        failed
    );
    Ok(failed == 0)
}
