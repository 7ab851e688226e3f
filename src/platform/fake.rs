//! In-memory stand-ins for the platform capabilities, used by tests of the
//! walker, the download coordinator and the sync engine.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures_util::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;

use super::error::ResolveError;
use super::types::{Course, DownloadableContent, RemoteFile, ResourceDescriptor, ResourceKind};
use super::ResourceResolver;
use crate::auth::{AccessToken, AuthError, Authenticator};

/// A file the fake serves: raw filename as sent by the server, status and body.
#[derive(Debug, Clone)]
pub struct FakeFile {
    pub filename: Option<String>,
    pub status: u16,
    pub body: Vec<u8>,
}

impl FakeFile {
    pub fn ok(filename: &str, body: &[u8]) -> Self {
        Self {
            filename: Some(filename.to_string()),
            status: 200,
            body: body.to_vec(),
        }
    }
}

#[derive(Debug, Clone)]
enum FakeContent {
    Single(FakeFile),
    /// `None` entries fail to fetch, as a dropped connection would.
    Block(Vec<Option<FakeFile>>),
    /// Body stream yields the given bytes, then errors.
    Truncated(FakeFile),
}

#[derive(Default)]
pub struct FakeResolver {
    courses: Vec<Course>,
    resources: HashMap<String, Vec<ResourceDescriptor>>,
    folders: HashMap<(String, String), Vec<ResourceDescriptor>>,
    contents: HashMap<String, FakeContent>,
    failing_courses: HashSet<String>,
    failing_folders: HashSet<String>,
    failing_elements: HashSet<String>,
    fail_listing: bool,
    pub list_resources_calls: AtomicUsize,
    pub list_folder_calls: AtomicUsize,
    pub resolve_calls: AtomicUsize,
    cancel_on_resolve: Option<CancellationToken>,
}

pub fn course(id: &str, title: &str, last_updated: &str) -> Course {
    Course {
        id: id.to_string(),
        title: title.to_string(),
        last_updated: last_updated
            .parse::<DateTime<Utc>>()
            .expect("test timestamp"),
    }
}

pub fn folder(id: &str, title: &str, path: &str) -> ResourceDescriptor {
    ResourceDescriptor::new(id, title, path, ResourceKind::Folder)
}

pub fn element(id: &str, title: &str, path: &str) -> ResourceDescriptor {
    ResourceDescriptor::new(id, title, path, ResourceKind::FileElement)
}

impl FakeResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_course(mut self, course: Course, roots: Vec<ResourceDescriptor>) -> Self {
        self.resources.insert(course.id.clone(), roots);
        self.courses.push(course);
        self
    }

    pub fn with_folder(
        mut self,
        course_id: &str,
        folder_id: &str,
        children: Vec<ResourceDescriptor>,
    ) -> Self {
        self.folders
            .insert((course_id.to_string(), folder_id.to_string()), children);
        self
    }

    pub fn with_file(mut self, element_id: &str, file: FakeFile) -> Self {
        self.contents
            .insert(element_id.to_string(), FakeContent::Single(file));
        self
    }

    pub fn with_block(self, element_id: &str, files: Vec<FakeFile>) -> Self {
        self.with_block_entries(element_id, files.into_iter().map(Some).collect())
    }

    pub fn with_block_entries(mut self, element_id: &str, entries: Vec<Option<FakeFile>>) -> Self {
        self.contents
            .insert(element_id.to_string(), FakeContent::Block(entries));
        self
    }

    pub fn with_truncated_file(mut self, element_id: &str, file: FakeFile) -> Self {
        self.contents
            .insert(element_id.to_string(), FakeContent::Truncated(file));
        self
    }

    pub fn failing_course(mut self, course_id: &str) -> Self {
        self.failing_courses.insert(course_id.to_string());
        self
    }

    pub fn failing_folder(mut self, folder_id: &str) -> Self {
        self.failing_folders.insert(folder_id.to_string());
        self
    }

    pub fn failing_element(mut self, element_id: &str) -> Self {
        self.failing_elements.insert(element_id.to_string());
        self
    }

    pub fn failing_listing(mut self) -> Self {
        self.fail_listing = true;
        self
    }

    /// Cancel `token` as soon as the first element is resolved, while that
    /// download is still in flight.
    pub fn cancelling_on_resolve(mut self, token: CancellationToken) -> Self {
        self.cancel_on_resolve = Some(token);
        self
    }
}

fn injected(what: &str) -> ResolveError {
    ResolveError::HttpStatus {
        status: 500,
        url: format!("fake://{}", what),
    }
}

fn remote(file: FakeFile, truncated: bool) -> RemoteFile {
    let mut chunks: Vec<Result<Bytes, ResolveError>> = file
        .body
        .chunks(4)
        .map(|c| Ok(Bytes::copy_from_slice(c)))
        .collect();
    if truncated {
        chunks.push(Err(ResolveError::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "connection reset",
        ))));
    }
    RemoteFile {
        filename: file.filename,
        status: file.status,
        body: stream::iter(chunks).boxed(),
    }
}

#[async_trait::async_trait]
impl ResourceResolver for FakeResolver {
    async fn list_courses(&self) -> Result<Vec<Course>, ResolveError> {
        if self.fail_listing {
            return Err(injected("courses"));
        }
        Ok(self.courses.clone())
    }

    async fn list_resources(&self, course_id: &str) -> Result<Vec<ResourceDescriptor>, ResolveError> {
        self.list_resources_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_courses.contains(course_id) {
            return Err(injected(course_id));
        }
        Ok(self.resources.get(course_id).cloned().unwrap_or_default())
    }

    async fn list_folder(
        &self,
        course_id: &str,
        folder_id: &str,
    ) -> Result<Vec<ResourceDescriptor>, ResolveError> {
        self.list_folder_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_folders.contains(folder_id) {
            return Err(injected(folder_id));
        }
        Ok(self
            .folders
            .get(&(course_id.to_string(), folder_id.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    async fn resolve(&self, element_id: &str) -> Result<DownloadableContent, ResolveError> {
        self.resolve_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(token) = &self.cancel_on_resolve {
            token.cancel();
        }
        if self.failing_elements.contains(element_id) {
            return Err(injected(element_id));
        }
        match self.contents.get(element_id).cloned() {
            Some(FakeContent::Single(file)) => Ok(DownloadableContent::Single(remote(file, false))),
            Some(FakeContent::Truncated(file)) => {
                Ok(DownloadableContent::Single(remote(file, true)))
            }
            Some(FakeContent::Block(entries)) => {
                let files = entries
                    .into_iter()
                    .map(|entry| match entry {
                        Some(file) => Ok(remote(file, false)),
                        None => Err(injected("block link")),
                    })
                    .collect::<Vec<_>>();
                Ok(DownloadableContent::Block(stream::iter(files).boxed()))
            }
            None => Err(ResolveError::UnexpectedResponse {
                url: format!("fake://{}", element_id),
                reason: "no content registered".to_string(),
            }),
        }
    }
}

/// Authenticator that accepts exactly one username/password pair.
pub struct FakeAuthenticator {
    username: String,
    password: String,
    pub calls: AtomicUsize,
}

impl FakeAuthenticator {
    pub fn accepting(username: &str, password: &str) -> Self {
        Self {
            username: username.to_string(),
            password: password.to_string(),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait::async_trait]
impl Authenticator for FakeAuthenticator {
    async fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<AccessToken, AuthError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if username == self.username && password == self.password {
            Ok(AccessToken::new("fake-token"))
        } else {
            Err(AuthError::FailedLogin("invalid_grant".to_string()))
        }
    }
}
