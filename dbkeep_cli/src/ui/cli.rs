use clap::{Parser, Subcommand};
use dbkeep_core::core::errors::ManagerError;
use dbkeep_core::storage::settings::{JsonSettingsStore, SettingsStore};
use dbkeep_core::{ConnectionManager, CreateOptions, SqliteConnection, SqliteStore};
use log::{info, warn};
use std::error::Error;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

/// Command-line arguments.
#[derive(Parser, Debug)]
#[command(name = "dbkeep", version, subcommand_required = true)]
pub struct Args {
    /// Directory holding settings.json (defaults to the per-user config directory)
    #[arg(long, global = true)]
    pub config_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Open an existing database and remember it
    Open {
        /// Database file to open
        path: PathBuf,
    },
    /// Create a new database and remember it
    Create {
        /// Database file to create
        path: PathBuf,
        /// Delete any existing database at PATH first
        #[arg(long)]
        overwrite: bool,
    },
    /// Open the database remembered from the last run
    Reopen,
    /// Print the remembered database path
    Last,
}

pub async fn run_cli(args: Args) -> Result<(), ManagerError> {
    let settings = match args.config_dir {
        Some(dir) => JsonSettingsStore::in_dir(dir),
        None => JsonSettingsStore::new().map_err(ManagerError::SettingsLoad)?,
    };
    info!("Using settings file {:?}", settings.file());
    let settings = Arc::new(settings);

    let manager = ConnectionManager::new(SqliteStore::new(), settings.clone());
    manager.on_open(Arc::new(|| info!("Database connection is now active")));

    let result = match args.command {
        Command::Open { path } => {
            let path = absolute(path).map_err(|(path, source)| ManagerError::Open {
                path,
                source: source.into(),
            })?;
            manager.open_existing(path).await
        }
        Command::Create { path, overwrite } => {
            let path = absolute(path).map_err(|(path, source)| ManagerError::Create {
                path,
                source: source.into(),
            })?;
            manager.create_new(path, CreateOptions { overwrite }).await
        }
        Command::Reopen => manager.reopen_last().await,
        Command::Last => return print_last(settings.as_ref()).await,
    };
    report(&manager, result)
}

/// Anchor `path` to the working directory, so the remembered location still
/// resolves when a later run starts somewhere else.
fn absolute(path: PathBuf) -> Result<PathBuf, (PathBuf, io::Error)> {
    if path.as_os_str().is_empty() || path.is_absolute() {
        // Empty paths are left for the manager to reject.
        return Ok(path);
    }
    match std::path::absolute(&path) {
        Ok(resolved) => Ok(resolved),
        Err(e) => Err((path, e)),
    }
}

async fn print_last(settings: &dyn SettingsStore) -> Result<(), ManagerError> {
    match settings
        .database_path()
        .await
        .map_err(ManagerError::SettingsLoad)?
    {
        Some(path) => println!("{}", path.display()),
        None => println!("No database remembered yet"),
    }
    Ok(())
}

/// Print what is open now. A connection that could not be remembered is
/// still shown, but the command fails so the caller notices.
fn report(
    manager: &ConnectionManager<SqliteStore>,
    result: Result<Arc<SqliteConnection>, ManagerError>,
) -> Result<(), ManagerError> {
    match result {
        Ok(conn) => {
            print_summary(&conn);
            Ok(())
        }
        Err(e) if e.connection_installed() => {
            print_summary(&*manager.current()?);
            warn!("{}", describe(&e));
            Err(e)
        }
        Err(e) => Err(e),
    }
}

fn print_summary(conn: &SqliteConnection) {
    let tables = conn.with_connection(|c| {
        c.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table'",
            [],
            |row| row.get::<_, i64>(0),
        )
    });
    match tables {
        Ok(n) => println!("{} ({} tables)", conn.path().display(), n),
        Err(e) => {
            warn!("Could not count tables: {}", e);
            println!("{}", conn.path().display());
        }
    }
}

/// The error and every cause under it on one line.
pub fn describe(err: &ManagerError) -> String {
    let mut msg = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        msg.push_str(": ");
        msg.push_str(&cause.to_string());
        source = cause.source();
    }
    msg
}
