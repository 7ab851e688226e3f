use std::path::PathBuf;
use std::time::Duration;

use crate::cli::{AuthArgs, SyncArgs};
use crate::sync::SyncError;

/// Username and password for the token exchange.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Everything needed to talk to one itslearning instance.
#[derive(Debug, Clone)]
pub struct Connection {
    pub credentials: Credentials,
    pub instance: String,
    pub timeout: Duration,
}

impl Connection {
    /// Validate credentials from flags/environment. A missing password is
    /// asked for through `password_provider`, which returns `None` when no
    /// terminal is available.
    pub fn from_args<F>(args: AuthArgs, password_provider: F) -> Result<Self, SyncError>
    where
        F: FnOnce() -> Option<String>,
    {
        let username = non_empty(args.username).ok_or(SyncError::MissingCredentials("username"))?;
        let instance =
            non_empty(args.instance).ok_or(SyncError::MissingCredentials("instance URL"))?;
        let password = non_empty(args.password)
            .or_else(|| non_empty(password_provider()))
            .ok_or(SyncError::MissingCredentials("password"))?;

        Ok(Self {
            credentials: Credentials { username, password },
            instance,
            timeout: Duration::from_secs(args.timeout),
        })
    }
}

/// Validated configuration for a sync run.
#[derive(Debug, Clone)]
pub struct Config {
    pub connection: Connection,
    pub directory: PathBuf,
    pub state_file: PathBuf,
    pub workers: usize,
    pub force_full: bool,
    pub no_progress_bar: bool,
}

impl Config {
    pub fn from_args<F>(args: SyncArgs, password_provider: F) -> Result<Self, SyncError>
    where
        F: FnOnce() -> Option<String>,
    {
        let connection = Connection::from_args(args.auth, password_provider)?;
        Ok(Self {
            connection,
            directory: expand_tilde(&args.output),
            state_file: expand_tilde(&args.state.state_file),
            workers: usize::from(args.workers.max(1)),
            force_full: args.all,
            no_progress_bar: args.no_progress_bar,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Expand ~ to the user's home directory.
pub(crate) fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}
