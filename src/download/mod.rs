//! Download coordinator: fans resource descriptors out to a bounded pool of
//! concurrent fetch-and-write tasks and folds their outcomes into
//! [`DownloadStats`]. One failing descriptor never affects another.

pub mod error;
pub mod file;
pub mod paths;

use std::collections::HashSet;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::time::Duration;

use futures_util::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;

use self::error::DownloadError;
use crate::platform::{DownloadableContent, ResourceDescriptor, ResourceResolver};

/// Subset of application config consumed by the coordinator.
#[derive(Debug, Clone)]
pub struct DownloadConfig {
    pub(crate) directory: PathBuf,
    pub(crate) max_workers: usize,
    pub(crate) no_progress_bar: bool,
}

/// What a successful descriptor put on disk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Written {
    pub files: usize,
    pub bytes: u64,
}

/// Result of dispatching one descriptor.
#[derive(Debug)]
pub struct DownloadOutcome {
    pub descriptor: ResourceDescriptor,
    pub result: Result<Written, DownloadError>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DownloadStats {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub files_written: usize,
    pub bytes_written: u64,
}

impl DownloadStats {
    fn record(&mut self, outcome: &DownloadOutcome) {
        match &outcome.result {
            Ok(written) => {
                self.succeeded += 1;
                self.files_written += written.files;
                self.bytes_written += written.bytes;
            }
            Err(_) => self.failed += 1,
        }
    }

    /// Descriptors never dispatched because shutdown was requested.
    pub fn not_attempted(&self) -> usize {
        self.total.saturating_sub(self.succeeded + self.failed)
    }
}

/// Create a progress bar with a consistent template.
///
/// Returns `ProgressBar::hidden()` when the user passed `--no-progress-bar` or
/// stdout is not a TTY (e.g. piped output, cron jobs).
fn create_progress_bar(no_progress_bar: bool, total: u64) -> ProgressBar {
    if no_progress_bar || !std::io::stdout().is_terminal() {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::with_template(
            "[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
        )
        .expect("valid template")
        .progress_chars("=> "),
    );
    pb
}

/// Download every descriptor with at most `config.max_workers` in flight.
///
/// Completion order is unspecified. Once `shutdown` is cancelled no new
/// descriptor is dispatched; in-flight ones run to completion so no file is
/// left half-written under its final name.
pub async fn run(
    resolver: &dyn ResourceResolver,
    descriptors: Vec<ResourceDescriptor>,
    config: &DownloadConfig,
    shutdown: CancellationToken,
) -> DownloadStats {
    let mut stats = DownloadStats {
        total: descriptors.len(),
        ..DownloadStats::default()
    };
    if descriptors.is_empty() {
        return stats;
    }

    let pb = create_progress_bar(config.no_progress_bar, descriptors.len() as u64);
    let root = config.directory.as_path();

    let mut outcomes = stream::iter(descriptors)
        .take_while(|_| std::future::ready(!shutdown.is_cancelled()))
        .map(|descriptor| async move {
            let result = download_descriptor(resolver, &descriptor, root).await;
            DownloadOutcome { descriptor, result }
        })
        .buffer_unordered(config.max_workers.max(1));

    while let Some(outcome) = outcomes.next().await {
        stats.record(&outcome);
        match &outcome.result {
            Ok(written) => pb.suspend(|| {
                tracing::info!(
                    element_id = %outcome.descriptor.element_id,
                    files = written.files,
                    "Downloaded '{}'",
                    outcome.descriptor.logical_path()
                );
            }),
            Err(e) => pb.suspend(|| {
                tracing::error!(
                    element_id = %outcome.descriptor.element_id,
                    "Download failed: '{}': {}",
                    outcome.descriptor.logical_path(),
                    e
                );
            }),
        }
        pb.set_message(outcome.descriptor.title.clone());
        pb.inc(1);
    }
    pb.finish_and_clear();

    if shutdown.is_cancelled() && stats.not_attempted() > 0 {
        tracing::info!(
            "Shutdown requested, {} resources were not downloaded",
            stats.not_attempted()
        );
    }
    stats
}

/// Resolve one element and write each of its files beneath its logical path.
///
/// A block element keeps writing its remaining files after one fails, then
/// reports the descriptor as failed.
async fn download_descriptor(
    resolver: &dyn ResourceResolver,
    descriptor: &ResourceDescriptor,
    root: &Path,
) -> Result<Written, DownloadError> {
    let content = resolver.resolve(&descriptor.element_id).await?;
    let logical = descriptor.logical_path();

    match content {
        DownloadableContent::Single(remote) => {
            let path =
                paths::local_file_path(root, &logical, remote.filename.as_deref(), &descriptor.title);
            tracing::debug!(path = %path.display(), "downloading");
            let bytes = file::write_remote_file(remote, &path).await?;
            Ok(Written { files: 1, bytes })
        }
        DownloadableContent::Block(mut files) => {
            let mut written = Written::default();
            let mut total = 0;
            let mut failed = 0;
            // Files of one block share a directory; equal or missing names
            // must not overwrite each other.
            let mut taken = HashSet::new();
            while let Some(next) = files.next().await {
                total += 1;
                let remote = match next {
                    Ok(remote) => remote,
                    Err(e) => {
                        failed += 1;
                        tracing::warn!(
                            element_id = %descriptor.element_id,
                            "Block file {} failed: {}",
                            total,
                            e
                        );
                        continue;
                    }
                };
                let path = paths::disambiguate(
                    paths::local_file_path(
                        root,
                        &logical,
                        remote.filename.as_deref(),
                        &descriptor.title,
                    ),
                    &taken,
                );
                taken.insert(path.clone());
                tracing::debug!(path = %path.display(), "downloading block file");
                match file::write_remote_file(remote, &path).await {
                    Ok(bytes) => {
                        written.files += 1;
                        written.bytes += bytes;
                    }
                    Err(e) => {
                        failed += 1;
                        tracing::warn!("Block file failed: {}: {}", path.display(), e);
                    }
                }
            }
            if failed > 0 {
                return Err(DownloadError::Block { failed, total });
            }
            Ok(written)
        }
    }
}

pub(crate) fn format_duration(d: Duration) -> String {
    let total_secs = d.as_secs();
    let hours = total_secs / 3600;
    let mins = (total_secs % 3600) / 60;
    let secs = total_secs % 60;

    if hours > 0 {
        format!("{}h {:02}m {:02}s", hours, mins, secs)
    } else if mins > 0 {
        format!("{}m {:02}s", mins, secs)
    } else {
        format!("{}s", secs)
    }
}
