//! itslearning-dl: incrementally mirrors itslearning courses to local disk.
//!
//! Each run logs in with the OAuth2 password grant, lists the user's
//! courses, walks the resource tree of every course that changed since the
//! last run, and downloads all discovered files with bounded concurrency.
//! Per-course sync timestamps live in a small JSON state file.

#![warn(clippy::all)]

mod auth;
mod cli;
mod config;
mod download;
mod logging;
mod platform;
mod shutdown;
mod state;
mod sync;
mod types;

use std::io::IsTerminal;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;

use auth::{AccessToken, Authenticator, PasswordGrant};
use cli::Command;
use config::{expand_tilde, Config, Connection};
use download::DownloadConfig;
use platform::{Endpoints, ItslearningClient, ResolveError, ResourceResolver};
use state::StateStore;
use sync::{Connect, SyncEngine, SyncError};

/// Ask for the password on the terminal. Returns `None` when stdin is not
/// interactive, e.g. under cron.
fn password_provider() -> Option<String> {
    if !std::io::stdin().is_terminal() {
        return None;
    }
    tokio::task::block_in_place(|| rpassword::prompt_password("itslearning password: ").ok())
}

/// Run the default sync command.
async fn run_sync(args: cli::SyncArgs) -> anyhow::Result<()> {
    let config = Config::from_args(args, password_provider)?;
    tracing::debug!(?config, "Resolved configuration");

    let endpoints = Endpoints::for_instance(&config.connection.instance)?;
    let store = StateStore::open(&config.state_file).map_err(SyncError::from)?;
    let shutdown = shutdown::install_signal_handler()?;

    tracing::info!(
        workers = config.workers,
        output = %config.directory.display(),
        "Starting itslearning-dl"
    );

    let authenticator = PasswordGrant::new(&endpoints, config.connection.timeout)?;
    let mut engine = SyncEngine::new(
        store,
        DownloadConfig {
            directory: config.directory.clone(),
            max_workers: config.workers,
            no_progress_bar: config.no_progress_bar,
        },
        config.force_full,
        shutdown,
    );

    let timeout = config.connection.timeout;
    let connect: Connect<'_> = Box::new(move |token: AccessToken| {
        let client = ItslearningClient::new(endpoints, token, timeout)?;
        Ok::<_, ResolveError>(Arc::new(client) as Arc<dyn ResourceResolver>)
    });

    let credentials = &config.connection.credentials;
    let report = engine
        .run(
            &authenticator,
            &credentials.username,
            &credentials.password,
            connect,
        )
        .await?;

    if !report.is_complete() {
        return Err(SyncError::PartialFailure {
            failed: report.download.failed,
            total: report.download.total,
            courses: report.courses_failed,
        }
        .into());
    }
    Ok(())
}

/// Run the list-courses command.
async fn run_list_courses(args: cli::ListCoursesArgs) -> anyhow::Result<()> {
    let connection = Connection::from_args(args.auth, password_provider)?;
    let endpoints = Endpoints::for_instance(&connection.instance)?;
    let state = state::load(&expand_tilde(&args.state.state_file));

    let token = PasswordGrant::new(&endpoints, connection.timeout)?
        .authenticate(
            &connection.credentials.username,
            &connection.credentials.password,
        )
        .await
        .map_err(SyncError::Auth)?;
    let client = ItslearningClient::new(endpoints, token, connection.timeout)?;
    let courses = client.list_courses().await.map_err(SyncError::Listing)?;

    println!("{} courses:", courses.len());
    for course in &courses {
        let status = if state.is_stale(&course.id, course.last_updated_epoch()) {
            "changed"
        } else {
            "up to date"
        };
        println!(
            "  {:>8}  {}  {:<10}  {}",
            course.id,
            course.last_updated.format("%Y-%m-%d %H:%M:%S UTC"),
            status,
            course.title
        );
    }
    Ok(())
}

/// Run the status command.
fn run_status(args: cli::StateArgs) -> anyhow::Result<()> {
    let path = expand_tilde(&args.state_file);
    if !path.exists() {
        println!("No state file found at {}", path.display());
        println!("Run a sync first to create it.");
        return Ok(());
    }

    let state = state::load(&path);
    println!("State file: {}", path.display());
    println!();
    println!("Courses synced: {}", state.course.len());
    for (id, record) in &state.course {
        let when = chrono::DateTime::from_timestamp(record.last_updated, 0)
            .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_else(|| record.last_updated.to_string());
        println!("  {:>8}  last updated {}", id, when);
    }
    Ok(())
}

/// Run the reset-state command.
fn run_reset_state(args: cli::ResetStateArgs) -> anyhow::Result<()> {
    let path = expand_tilde(&args.state.state_file);
    if !path.exists() {
        println!("No state file found at {}", path.display());
        return Ok(());
    }

    if !args.yes {
        println!("This will set aside the state file at:");
        println!("  {}", path.display());
        println!("The next sync will download every course again.");
        println!();
        print!("Are you sure? [y/N] ");
        use std::io::Write;
        std::io::stdout().flush()?;

        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;
        if !input.trim().eq_ignore_ascii_case("y") {
            println!("Cancelled.");
            return Ok(());
        }
    }

    let mut store = StateStore::open(&path).map_err(SyncError::from)?;
    match store.reset().map_err(SyncError::from)? {
        Some(backup) => println!("State reset. Previous state saved to {}", backup.display()),
        None => println!("State reset."),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = cli::Cli::parse();

    let _log_guard = match logging::init(cli.log_level, cli.log_file.as_deref()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    let result = match cli.effective_command() {
        Command::Sync(args) => run_sync(args).await,
        Command::ListCourses(args) => run_list_courses(args).await,
        Command::Status(args) => run_status(args),
        Command::ResetState(args) => run_reset_state(args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let sync_error = e.downcast_ref::<SyncError>();
            if matches!(sync_error, Some(SyncError::Interrupted)) {
                tracing::warn!("{}", e);
            } else {
                tracing::error!("{:#}", e);
            }
            ExitCode::from(sync_error.map_or(1, SyncError::exit_code))
        }
    }
}
