use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::types::LogLevel;

#[derive(Parser, Debug)]
#[command(
    name = "itslearning-dl",
    version,
    about = "Incrementally mirror your itslearning courses to disk"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Options for the default `sync` command
    #[command(flatten)]
    pub sync: SyncArgs,

    /// Log level (overridden by RUST_LOG)
    #[arg(long, value_enum, default_value = "info", env = "LOGLVL", global = true)]
    pub log_level: LogLevel,

    /// Also write logs to this file
    #[arg(long, env = "ITSLEARNINGDL_LOGFILE", global = true)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Download everything that changed since the last run (default)
    Sync(SyncArgs),

    /// List enrolled courses and whether each has changed since the last run
    ListCourses(ListCoursesArgs),

    /// Show what the state file records
    Status(StateArgs),

    /// Forget all recorded sync state so the next run downloads everything
    ResetState(ResetStateArgs),
}

/// Credentials and platform instance.
#[derive(Args, Debug, Clone, Default)]
pub struct AuthArgs {
    /// itslearning username
    #[arg(short = 'u', long, env = "ITSLEARNING_USERNAME")]
    pub username: Option<String>,

    /// itslearning password (if not provided, will prompt).
    /// WARNING: passing via --password is visible in process listings.
    /// Prefer the ITSLEARNING_PASSWORD environment variable instead.
    #[arg(short = 'p', long, env = "ITSLEARNING_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Base URL of your itslearning instance, e.g. https://school.itslearning.com
    #[arg(long, env = "ITSLEARNING_INSTANCE")]
    pub instance: Option<String>,

    /// API request timeout in seconds
    #[arg(long, default_value_t = 30, value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout: u64,
}

#[derive(Args, Debug, Clone, Default)]
pub struct StateArgs {
    /// Path of the sync state file
    #[arg(long, default_value = "./state.json")]
    pub state_file: String,
}

#[derive(Args, Debug, Clone, Default)]
pub struct SyncArgs {
    #[command(flatten)]
    pub auth: AuthArgs,

    #[command(flatten)]
    pub state: StateArgs,

    /// Output directory for downloaded resources
    #[arg(long = "path", short = 'o', env = "ITSLEARNINGDL_OUT", default_value = "./out")]
    pub output: String,

    /// Ignore recorded state and download every course again
    #[arg(
        short = 'a',
        long = "all",
        env = "IGNORE_STATE",
        value_parser = clap::builder::FalseyValueParser::new()
    )]
    pub all: bool,

    /// Number of concurrent downloads
    #[arg(long, env = "WORKER_COUNT", default_value_t = 20, value_parser = clap::value_parser!(u16).range(1..))]
    pub workers: u16,

    /// Disable progress bar
    #[arg(long)]
    pub no_progress_bar: bool,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ListCoursesArgs {
    #[command(flatten)]
    pub auth: AuthArgs,

    #[command(flatten)]
    pub state: StateArgs,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ResetStateArgs {
    #[command(flatten)]
    pub state: StateArgs,

    /// Skip confirmation prompt
    #[arg(long)]
    pub yes: bool,
}

impl Cli {
    /// The subcommand to run; top-level sync flags apply when none is given.
    pub fn effective_command(&self) -> Command {
        match &self.command {
            Some(cmd) => cmd.clone(),
            None => Command::Sync(self.sync.clone()),
        }
    }
}
