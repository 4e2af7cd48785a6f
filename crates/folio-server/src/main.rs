//! Folio — consent service for the portfolio site.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use folio_consent::{EnvironmentProbe, RegionClassifier, SystemEnvironment};
use folio_core::{Clock, FolioConfig, SystemClock};
use folio_server::{build_router, AppState};
use folio_store::{ConsentStore, KeyValueBackend, MemoryBackend, SqliteBackend, UnavailableBackend};

fn resolve_data_dir() -> PathBuf {
    std::env::var("FOLIO_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("data"))
}

/// Open the consent database, falling back to no persistence at all.
fn open_backend(config: &FolioConfig) -> Arc<dyn KeyValueBackend> {
    match SqliteBackend::open(&config.data_paths.consent_db) {
        Ok(backend) => Arc::new(backend),
        Err(e) => {
            warn!("Consent storage unavailable, decisions will not persist: {}", e);
            Arc::new(UnavailableBackend)
        }
    }
}

fn print_usage() {
    println!("Folio — consent service for the portfolio site");
    println!();
    println!("Usage: folio [command]");
    println!();
    println!("Commands:");
    println!("  (none)                   Start the server");
    println!("  classify                 Classify this host's locale settings");
    println!("  status <visitor-id>      Show a visitor's stored consent records");
    println!("  reset <visitor-id>       Delete a visitor's stored consent records");
    println!("  help                     Show this help message");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    // Handle CLI subcommands
    if args.len() > 1 {
        match args[1].as_str() {
            "classify" => {
                let probe = SystemEnvironment;
                let store = ConsentStore::new(Arc::new(MemoryBackend::new()), clock);
                let classifier = RegionClassifier::new(store, Arc::new(probe));
                let result = classifier.classify();
                println!("timezone:  {:?}", probe.timezone().ok());
                println!("languages: {:?}", probe.languages().unwrap_or_default());
                println!("{}", serde_json::to_string_pretty(&result)?);
                return Ok(());
            }
            "status" | "reset" => {
                let Some(visitor) = args.get(2) else {
                    eprintln!("Usage: folio {} <visitor-id>", args[1]);
                    std::process::exit(1);
                };
                let config = FolioConfig::from_env(resolve_data_dir())?;
                let state = AppState::new(config.clone(), open_backend(&config), clock);
                let dev = state.dev_tools(visitor);
                if args[1] == "reset" {
                    dev.clear_all();
                    println!("Cleared consent records for {}", visitor);
                } else {
                    println!("{}", serde_json::to_string_pretty(&dev.status(None))?);
                }
                return Ok(());
            }
            "--help" | "-h" | "help" => {
                print_usage();
                return Ok(());
            }
            _ => {
                eprintln!("Unknown command: {}. Use 'folio help' for usage.", args[1]);
                std::process::exit(1);
            }
        }
    }

    // Normal server startup
    let data_dir = resolve_data_dir();
    info!("Data directory: {}", data_dir.display());

    let config = FolioConfig::from_env(&data_dir)?;
    let port = config.port;
    if config.dev_tools {
        warn!("Developer consent routes are enabled");
    }

    let backend = open_backend(&config);
    let state = Arc::new(AppState::new(config, backend, clock));
    let app = build_router(state);

    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Folio server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
