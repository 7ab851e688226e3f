use thiserror::Error;

use crate::platform::ResolveError;

/// Why one descriptor failed. Every variant is terminal for the run; the
/// owning course is retried only when it turns stale again or on `--all`.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("Could not resolve element: {0}")]
    Resolve(#[from] ResolveError),

    #[error("HTTP error {status} downloading {path}")]
    HttpStatus { status: u16, path: String },

    #[error("Transfer of {path} failed after {bytes_written} bytes: {source}")]
    Transfer {
        source: ResolveError,
        path: String,
        bytes_written: u64,
    },

    #[error("Disk error: {0}")]
    Disk(#[from] std::io::Error),

    #[error("{failed} of {total} files in block failed")]
    Block { failed: usize, total: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let e = DownloadError::HttpStatus {
            status: 404,
            path: "out/a.pdf".into(),
        };
        assert_eq!(e.to_string(), "HTTP error 404 downloading out/a.pdf");

        let e = DownloadError::Block {
            failed: 1,
            total: 3,
        };
        assert_eq!(e.to_string(), "1 of 3 files in block failed");
    }

    #[test]
    fn test_io_error_converts_to_disk() {
        let e: DownloadError = std::io::Error::other("disk full").into();
        assert!(matches!(e, DownloadError::Disk(_)));
    }
}
