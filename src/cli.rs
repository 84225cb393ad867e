//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::error::SentinelError;
use crate::ports::config_port::ConfigPort;
use crate::ports::trade_store::TradeStore;

pub const DEFAULT_LISTEN: &str = "127.0.0.1:3000";

#[derive(Parser, Debug)]
#[command(name = "sentinel", about = "Trade admission control and risk dashboard")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the web server
    Serve {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Create the database schema
    InitDb {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Output an argon2 hash for a password read from stdin
    HashPassword,
}

pub fn run(cli: Cli) -> ExitCode {
    init_tracing();
    let result = match cli.command {
        Command::Serve { config } => run_serve(&config),
        Command::InitDb { config } => run_init_db(&config),
        Command::HashPassword => run_hash_password(),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "command failed");
            ExitCode::from(&e)
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // A second call (tests driving `run` twice) keeps the first subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, SentinelError> {
    info!(path = %path.display(), "loading config");
    FileConfigAdapter::from_file(path)
}

/// Opens the store selected by `[database] backend` (default `sqlite`).
pub fn open_store(
    config: &dyn ConfigPort,
) -> Result<Arc<dyn TradeStore + Send + Sync>, SentinelError> {
    let backend = config.get_string_or("database", "backend", "sqlite");
    match backend.trim().to_ascii_lowercase().as_str() {
        #[cfg(feature = "sqlite")]
        "sqlite" => {
            let store = crate::adapters::sqlite_adapter::SqliteAdapter::from_config(config)?;
            Ok(Arc::new(store))
        }
        #[cfg(feature = "postgres")]
        "postgres" | "postgresql" => {
            let store = crate::adapters::postgres_adapter::PostgresAdapter::from_config(config)?;
            Ok(Arc::new(store))
        }
        other => Err(SentinelError::ConfigInvalid {
            section: "database".into(),
            key: "backend".into(),
            reason: format!("unsupported or disabled backend '{other}'"),
        }),
    }
}

fn run_init_db(config_path: &Path) -> Result<(), SentinelError> {
    let config = load_config(config_path)?;
    let store = open_store(&config)?;
    store.initialize_schema()?;
    info!("schema ready");
    Ok(())
}

#[cfg(feature = "web")]
fn market_data(
    config: &dyn ConfigPort,
) -> Arc<dyn crate::ports::market_data_port::MarketDataPort> {
    use crate::adapters::finnhub_adapter::FinnhubAdapter;
    use crate::ports::market_data_port::NoMarketData;

    match FinnhubAdapter::from_config(config) {
        Ok(adapter) => Arc::new(adapter),
        Err(e) => {
            tracing::warn!(error = %e, "market data disabled");
            Arc::new(NoMarketData)
        }
    }
}

fn run_serve(config_path: &Path) -> Result<(), SentinelError> {
    #[cfg(feature = "web")]
    {
        use crate::adapters::web::{build_router, AppState};
        use std::net::SocketAddr;

        let config = load_config(config_path)?;
        let store = open_store(&config)?;
        store.initialize_schema()?;

        let listen = config.get_string_or("web", "listen", DEFAULT_LISTEN);
        let addr: SocketAddr = listen.parse().map_err(|e: std::net::AddrParseError| {
            SentinelError::ConfigInvalid {
                section: "web".into(),
                key: "listen".into(),
                reason: e.to_string(),
            }
        })?;

        let state = AppState {
            store,
            market_data: market_data(&config),
            config: Arc::new(config),
        };
        let router = build_router(state)?;

        let runtime = tokio::runtime::Runtime::new()?;
        runtime.block_on(async {
            let listener = tokio::net::TcpListener::bind(addr).await?;
            info!(%addr, "web server listening");
            axum::serve(listener, router).await
        })?;
        Ok(())
    }

    #[cfg(not(feature = "web"))]
    {
        let _ = config_path;
        Err(SentinelError::ConfigInvalid {
            section: "web".into(),
            key: "listen".into(),
            reason: "built without the web feature".into(),
        })
    }
}

fn run_hash_password() -> Result<(), SentinelError> {
    #[cfg(feature = "web")]
    {
        use std::io::BufRead;

        eprintln!("Enter password to hash:");
        let mut password = String::new();
        std::io::stdin().lock().read_line(&mut password)?;
        let password = password.trim_end_matches(['\r', '\n']);
        crate::domain::account::check_password_strength(password)?;

        println!("{}", crate::adapters::web::hash_password(password)?);
        Ok(())
    }

    #[cfg(not(feature = "web"))]
    {
        Err(SentinelError::invalid(
            "hash-password",
            "built without the web feature",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_subcommands() {
        let cli = Cli::try_parse_from(["sentinel", "serve", "--config", "sentinel.ini"]).unwrap();
        assert!(matches!(cli.command, Command::Serve { config } if config == PathBuf::from("sentinel.ini")));

        let cli = Cli::try_parse_from(["sentinel", "init-db", "-c", "x.ini"]).unwrap();
        assert!(matches!(cli.command, Command::InitDb { .. }));

        let cli = Cli::try_parse_from(["sentinel", "hash-password"]).unwrap();
        assert!(matches!(cli.command, Command::HashPassword));
    }

    #[test]
    fn serve_requires_config() {
        assert!(Cli::try_parse_from(["sentinel", "serve"]).is_err());
    }

    #[test]
    fn unknown_backend_is_rejected() {
        let config = FileConfigAdapter::from_string("[database]\nbackend = oracle\n").unwrap();
        assert!(matches!(
            open_store(&config),
            Err(SentinelError::ConfigInvalid { key, .. }) if key == "backend"
        ));
    }

    #[cfg(feature = "sqlite")]
    #[test]
    fn init_db_creates_schema_in_file() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("sentinel.db");
        let ini = dir.path().join("sentinel.ini");
        std::fs::write(
            &ini,
            format!("[database]\nbackend = sqlite\nsqlite_path = {}\n", db.display()),
        )
        .unwrap();

        run_init_db(&ini).unwrap();
        assert!(db.exists());
        // Idempotent.
        run_init_db(&ini).unwrap();
    }

    #[test]
    fn missing_config_file_is_a_parse_error() {
        assert!(matches!(
            run_init_db(Path::new("/nonexistent/sentinel.ini")),
            Err(SentinelError::ConfigParse { .. })
        ));
    }
}
