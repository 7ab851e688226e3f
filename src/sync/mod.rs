//! Sync orchestrator.
//!
//! One run moves through `Init -> Authenticating -> Listing -> per course
//! (skip, or walk and mark synced) -> Downloading -> Persisted -> Done`, or
//! ends in `Aborted` on a fatal error or shutdown. Every course is walked
//! before any file is downloaded, and all courses' files then go to the
//! download coordinator as one batch.
//!
//! A course is marked synced and the state flushed as soon as its walk
//! completes, independent of how its downloads later fare.

pub mod error;
pub mod walker;

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

pub use self::error::SyncError;
use self::walker::{TraversalError, Walker};
use crate::auth::{AccessToken, Authenticator};
use crate::download::{self, format_duration, DownloadConfig, DownloadStats};
use crate::platform::{Course, ResolveError, ResourceDescriptor, ResourceResolver};
use crate::state::StateStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    Authenticating,
    Listing,
    Walking,
    Downloading,
    Persisted,
    Done,
    Aborted,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub courses_total: usize,
    /// Courses walked because they changed remotely.
    pub courses_walked: usize,
    /// Courses skipped because their recorded timestamp is current.
    pub courses_unchanged: usize,
    /// Courses whose resource listing or walk failed.
    pub courses_failed: usize,
    pub download: DownloadStats,
    pub download_elapsed: Duration,
    pub total_elapsed: Duration,
}

impl SyncReport {
    /// True when every changed course was walked and every resource
    /// downloaded.
    pub fn is_complete(&self) -> bool {
        self.courses_failed == 0 && self.download.failed == 0 && self.download.not_attempted() == 0
    }

    fn log_summary(&self) {
        tracing::info!("── Summary ──");
        tracing::info!(
            "  {} courses: {} changed, {} unchanged, {} failed",
            self.courses_total,
            self.courses_walked,
            self.courses_unchanged,
            self.courses_failed
        );
        tracing::info!(
            "  {} downloaded, {} failed, {} total",
            self.download.succeeded,
            self.download.failed,
            self.download.total
        );
        if self.download.not_attempted() > 0 {
            tracing::info!("  {} not attempted", self.download.not_attempted());
        }
        tracing::info!(
            "  elapsed: download {}, total {}",
            format_duration(self.download_elapsed),
            format_duration(self.total_elapsed)
        );
    }
}

/// Builds the resolver once an access token is available.
pub type Connect<'a> =
    Box<dyn FnOnce(AccessToken) -> Result<Arc<dyn ResourceResolver>, ResolveError> + Send + 'a>;

pub struct SyncEngine {
    store: StateStore,
    download: DownloadConfig,
    force_full: bool,
    shutdown: CancellationToken,
    phase: Phase,
}

impl SyncEngine {
    pub fn new(
        store: StateStore,
        download: DownloadConfig,
        force_full: bool,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            store,
            download,
            force_full,
            shutdown,
            phase: Phase::Init,
        }
    }

    #[cfg(test)]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    fn enter(&mut self, phase: Phase) {
        tracing::debug!(from = ?self.phase, to = ?phase, "Sync phase");
        self.phase = phase;
    }

    fn check_shutdown(&self) -> Result<(), SyncError> {
        if self.shutdown.is_cancelled() {
            Err(SyncError::Interrupted)
        } else {
            Ok(())
        }
    }

    /// Perform one full run. Returns the report even when some courses or
    /// resources failed; only fatal errors and shutdown return `Err`.
    pub async fn run(
        &mut self,
        authenticator: &dyn Authenticator,
        username: &str,
        password: &str,
        connect: Connect<'_>,
    ) -> Result<SyncReport, SyncError> {
        let started = Instant::now();
        let mut report = SyncReport::default();
        let result = self
            .run_phases(authenticator, username, password, connect, &mut report)
            .await;
        report.total_elapsed = started.elapsed();

        match result {
            Ok(()) => {
                self.enter(Phase::Done);
                report.log_summary();
                Ok(report)
            }
            Err(e) => {
                self.enter(Phase::Aborted);
                if matches!(e, SyncError::Interrupted) {
                    report.log_summary();
                }
                Err(e)
            }
        }
    }

    async fn run_phases(
        &mut self,
        authenticator: &dyn Authenticator,
        username: &str,
        password: &str,
        connect: Connect<'_>,
        report: &mut SyncReport,
    ) -> Result<(), SyncError> {
        if self.force_full {
            tracing::info!("Forcing a full resync, ignoring previous state");
            self.store.reset()?;
        }

        self.check_shutdown()?;
        self.enter(Phase::Authenticating);
        let token = authenticator
            .authenticate(username, password)
            .await
            .map_err(SyncError::Auth)?;
        tracing::info!("Logged in as {}", username);
        let resolver = connect(token).map_err(SyncError::Listing)?;

        self.check_shutdown()?;
        self.enter(Phase::Listing);
        let courses = resolver.list_courses().await.map_err(SyncError::Listing)?;
        report.courses_total = courses.len();
        tracing::info!("Found {} courses", courses.len());

        self.enter(Phase::Walking);
        let mut work: Vec<ResourceDescriptor> = Vec::new();
        for course in &courses {
            self.check_shutdown()?;
            let remote = course.last_updated_epoch();
            if !self.store.is_stale(&course.id, remote) {
                tracing::debug!(course_id = %course.id, "Course '{}' unchanged, skipping", course.title);
                report.courses_unchanged += 1;
                continue;
            }

            match self.walk_course(resolver.as_ref(), course).await {
                Ok(files) => {
                    tracing::info!(
                        course_id = %course.id,
                        "Course '{}': {} resources to download",
                        course.title,
                        files.len()
                    );
                    work.extend(files);
                    self.store.mark_synced(&course.id, remote);
                    self.store.flush()?;
                    report.courses_walked += 1;
                }
                Err(CourseError::Traversal(TraversalError::Cancelled)) => {
                    return Err(SyncError::Interrupted)
                }
                Err(e) => {
                    tracing::error!(course_id = %course.id, "Skipping course '{}': {}", course.title, e);
                    report.courses_failed += 1;
                }
            }
        }

        self.check_shutdown()?;
        self.enter(Phase::Downloading);
        let download_started = Instant::now();
        report.download = download::run(
            resolver.as_ref(),
            work,
            &self.download,
            self.shutdown.clone(),
        )
        .await;
        report.download_elapsed = download_started.elapsed();
        self.check_shutdown()?;

        // State was flushed after each course walk; nothing is pending.
        self.enter(Phase::Persisted);
        Ok(())
    }

    async fn walk_course(
        &self,
        resolver: &dyn ResourceResolver,
        course: &Course,
    ) -> Result<Vec<ResourceDescriptor>, CourseError> {
        let mut roots = resolver.list_resources(&course.id).await?;
        // Top-level resources listed without a location go under the course.
        for root in &mut roots {
            if root.path.trim().is_empty() {
                root.path = format!("/{}", course.title);
            }
        }
        let walker = Walker::new(resolver, self.shutdown.clone());
        Ok(walker.walk(&course.id, roots).await?)
    }
}

#[derive(Debug, thiserror::Error)]
enum CourseError {
    #[error("could not list resources: {0}")]
    Listing(#[from] ResolveError),

    #[error(transparent)]
    Traversal(#[from] TraversalError),
}
