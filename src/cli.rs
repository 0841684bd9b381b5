use std::path::PathBuf;

use clap::{Parser, Subcommand};
use flexi_logger::{Logger, LoggerHandle};
use log::info;

use crate::answer_proxy::AnswerProxy;
use crate::config::Config;
use crate::db::Database;
use crate::error::QaDeskError;
use crate::qa::QaStore;
use crate::web::render::Renderer;
use crate::web::server::WebServer;
use crate::web::state::AppState;

#[derive(Parser)]
#[command(
    name = "qadesk",
    version,
    about = "qadesk: curate question/answer pairs and ask the answer service"
)]
pub struct Cli {
    /// Path to a TOML config file (default: qadesk.toml when present)
    #[arg(long = "config", short = 'c', global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Start the web server (default if no command specified)
    Serve,

    /// Apply pending schema migrations and exit
    Migrate,

    /// Print the effective configuration as TOML
    Config,
}

impl Cli {
    pub fn handle_command_line() -> Result<(), QaDeskError> {
        let args = Cli::parse();
        let config = Config::load(args.config.as_deref())?;

        // Default to Serve if no command specified
        match args.command.unwrap_or(Command::Serve) {
            Command::Serve => {
                let _logger = start_logger(&config)?;
                Self::start_server(config)
            }
            Command::Migrate => {
                let _logger = start_logger(&config)?;
                Self::migrate(&config)
            }
            Command::Config => {
                print!("{}", config.to_toml()?);
                Ok(())
            }
        }
    }

    fn open_database(config: &Config) -> Result<Database, QaDeskError> {
        let db = Database::connect(&config.database_path(), config.pool_size)?;
        let version = db.ensure_schema()?;
        info!("Schema at version {}", version);
        Ok(db)
    }

    fn migrate(config: &Config) -> Result<(), QaDeskError> {
        let db = Self::open_database(config)?;
        drop(db);
        println!("Database {} is up to date", config.database_path().display());
        Ok(())
    }

    fn start_server(config: Config) -> Result<(), QaDeskError> {
        info!("Starting server on {}:{}", config.host, config.port);

        let db = Self::open_database(&config)?;
        let renderer = Renderer::new()?;
        let answers = AnswerProxy::new(config.answer_service_base())?;
        let state = AppState::new(QaStore::new(db), renderer, answers);

        let rt = tokio::runtime::Runtime::new()?;

        rt.block_on(async {
            let web_server = WebServer::new(config.host.clone(), config.port);
            web_server.start(state).await
        })
    }
}

/// `RUST_LOG` wins over the configured level when set. The returned handle
/// must stay alive for as long as logging is needed.
fn start_logger(config: &Config) -> Result<LoggerHandle, QaDeskError> {
    Logger::try_with_env_or_str(&config.log_level)
        .and_then(|logger| logger.start())
        .map_err(|e| QaDeskError::Error(format!("Failed to start logger: {}", e)))
}
