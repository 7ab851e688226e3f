//! The remote learning platform: domain model, the `ResourceResolver`
//! capability the sync engine consumes, and its HTTP implementation.

mod client;
pub mod endpoints;
pub mod error;
#[cfg(test)]
pub mod fake;
mod html;
pub mod types;

pub(crate) use client::build_http_client;
pub use client::ItslearningClient;
pub use endpoints::Endpoints;
pub use error::ResolveError;
pub use types::{Course, DownloadableContent, RemoteFile, ResourceDescriptor, ResourceKind};

/// Read access to a user's courses and their resource trees.
///
/// Listing calls never fetch file bytes; `resolve` turns one file element
/// into streams the download coordinator writes to disk. Implementations are
/// shared across download workers, hence `Send + Sync`.
#[async_trait::async_trait]
pub trait ResourceResolver: Send + Sync {
    async fn list_courses(&self) -> Result<Vec<Course>, ResolveError>;

    /// Top-level resources of a course.
    async fn list_resources(&self, course_id: &str)
        -> Result<Vec<ResourceDescriptor>, ResolveError>;

    /// Children of one folder.
    async fn list_folder(
        &self,
        course_id: &str,
        folder_id: &str,
    ) -> Result<Vec<ResourceDescriptor>, ResolveError>;

    async fn resolve(&self, element_id: &str) -> Result<DownloadableContent, ResolveError>;
}
