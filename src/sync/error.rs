use thiserror::Error;

use crate::auth::AuthError;
use crate::platform::ResolveError;
use crate::state::StateError;

/// Run-level failures, each mapped to a process exit code.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Missing {0}; set it with a flag or environment variable")]
    MissingCredentials(&'static str),

    #[error("Authentication failed: {0}")]
    Auth(#[source] AuthError),

    #[error("Could not list courses: {0}")]
    Listing(#[source] ResolveError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error("Interrupted; state may be stale but is not corrupt")]
    Interrupted,

    #[error("{failed} of {total} resources failed to download, {courses} courses could not be walked")]
    PartialFailure {
        failed: usize,
        total: usize,
        courses: usize,
    },
}

impl SyncError {
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::MissingCredentials(_) => 3,
            Self::Auth(_) => 4,
            Self::Interrupted => 130,
            Self::Listing(_) | Self::State(_) | Self::PartialFailure { .. } => 1,
        }
    }
}
