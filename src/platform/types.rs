use bytes::Bytes;
use chrono::{DateTime, NaiveDateTime, Utc};
use futures_util::stream::BoxStream;
use serde::{Deserialize, Deserializer};

use super::error::ResolveError;

/// A course the user is enrolled in, as returned by the remote listing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Course {
    #[serde(rename = "CourseId", deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(rename = "Title", default)]
    pub title: String,
    #[serde(rename = "LastUpdatedUtc", deserialize_with = "utc_timestamp")]
    pub last_updated: DateTime<Utc>,
}

impl Course {
    /// Remote last-modified time in whole Unix seconds, the unit the state
    /// file records.
    pub fn last_updated_epoch(&self) -> i64 {
        self.last_updated.timestamp()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Folder,
    FileElement,
}

impl ResourceKind {
    /// Map the platform's `ElementType` to the kinds the walker understands.
    /// Anything else (links, assignments, notes, ...) has no file to mirror.
    pub fn from_element_type(element_type: &str) -> Option<Self> {
        match element_type {
            "Folder" => Some(Self::Folder),
            "LearningToolElement" => Some(Self::FileElement),
            _ => None,
        }
    }
}

/// One node of a course's resource tree, prior to fetching any bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceDescriptor {
    pub element_id: String,
    pub title: String,
    /// Slash-separated logical location of the node's parent container.
    pub path: String,
    pub kind: ResourceKind,
}

impl ResourceDescriptor {
    #[cfg(test)]
    pub fn new(
        element_id: impl Into<String>,
        title: impl Into<String>,
        path: impl Into<String>,
        kind: ResourceKind,
    ) -> Self {
        Self {
            element_id: element_id.into(),
            title: title.into(),
            path: path.into(),
            kind,
        }
    }

    /// Logical location of this node itself: its parent path plus its title.
    pub fn logical_path(&self) -> String {
        let parent = self.path.trim_end_matches('/');
        if self.title.is_empty() {
            parent.to_string()
        } else {
            format!("{}/{}", parent, self.title)
        }
    }
}

/// Raw resource entry as the REST API lists it.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ResourceEntity {
    #[serde(rename = "ElementId", deserialize_with = "string_or_number")]
    pub element_id: String,
    #[serde(rename = "Title", default)]
    pub title: String,
    #[serde(rename = "Path", default)]
    pub path: Option<String>,
    #[serde(rename = "ElementType", default)]
    pub element_type: String,
}

impl ResourceEntity {
    pub fn into_descriptor(self) -> Option<ResourceDescriptor> {
        let Some(kind) = ResourceKind::from_element_type(&self.element_type) else {
            tracing::debug!(
                element_id = %self.element_id,
                element_type = %self.element_type,
                "Skipping resource with unsupported element type"
            );
            return None;
        };
        Some(ResourceDescriptor {
            element_id: self.element_id,
            title: self.title,
            path: self.path.unwrap_or_default(),
            kind,
        })
    }
}

pub type ByteStream = BoxStream<'static, Result<Bytes, ResolveError>>;

/// One downloadable file produced by resolving an element.
pub struct RemoteFile {
    /// Filename as delivered by the server, possibly still percent-encoded.
    pub filename: Option<String>,
    /// HTTP status of the response carrying the body.
    pub status: u16,
    pub body: ByteStream,
}

impl RemoteFile {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

impl std::fmt::Debug for RemoteFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteFile")
            .field("filename", &self.filename)
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

/// Files of a block element. Each file is requested only when the stream
/// is polled, so one failing link fails only its own item.
pub type FileStream = BoxStream<'static, Result<RemoteFile, ResolveError>>;

/// What a single element resolves to: one file, or the files of a block.
pub enum DownloadableContent {
    Single(RemoteFile),
    Block(FileStream),
}

impl std::fmt::Debug for DownloadableContent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Single(file) => f.debug_tuple("Single").field(file).finish(),
            Self::Block(_) => f.write_str("Block(..)"),
        }
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Int(i64),
    }
    Ok(match Id::deserialize(deserializer)? {
        Id::Text(s) => s,
        Id::Int(n) => n.to_string(),
    })
}

fn utc_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_utc(&raw).ok_or_else(|| {
        serde::de::Error::custom(format!("invalid LastUpdatedUtc timestamp '{}'", raw))
    })
}

/// Parse the platform's UTC timestamps. The API normally sends
/// `2024-01-02T00:00:00Z`, but fractional seconds and a missing `Z` occur.
pub(crate) fn parse_utc(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw.trim_end_matches('Z'), "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}
