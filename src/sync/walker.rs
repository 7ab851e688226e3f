//! Expands a course's resource tree into the flat list of file elements to
//! download. Only listing calls are made; no bytes are fetched.

use std::collections::HashSet;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::download::paths::sanitize_logical_path;
use crate::platform::{ResourceDescriptor, ResourceKind, ResourceResolver};

/// Folders nested deeper than this abort the course walk.
pub const DEFAULT_MAX_DEPTH: usize = 64;

#[derive(Debug, Error)]
pub enum TraversalError {
    #[error("Folder '{path}' (id {folder_id}) is nested deeper than {max_depth} levels")]
    DepthExceeded {
        folder_id: String,
        path: String,
        max_depth: usize,
    },

    #[error("Walk cancelled")]
    Cancelled,
}

pub struct Walker<'a> {
    resolver: &'a dyn ResourceResolver,
    max_depth: usize,
    shutdown: CancellationToken,
}

impl<'a> Walker<'a> {
    pub fn new(resolver: &'a dyn ResourceResolver, shutdown: CancellationToken) -> Self {
        Self {
            resolver,
            max_depth: DEFAULT_MAX_DEPTH,
            shutdown,
        }
    }

    #[cfg(test)]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Depth-first expansion of `roots`, returning file elements only, in
    /// tree order.
    ///
    /// A folder whose listing fails is logged and skipped with its subtree;
    /// its siblings are still walked. A folder id seen twice in one walk is
    /// skipped. Exceeding the depth limit or a shutdown request aborts the
    /// whole walk, since the caller must not mark the course synced then.
    pub async fn walk(
        &self,
        course_id: &str,
        roots: Vec<ResourceDescriptor>,
    ) -> Result<Vec<ResourceDescriptor>, TraversalError> {
        let mut files = Vec::new();
        let mut visited: HashSet<String> = HashSet::new();
        let mut stack: Vec<(ResourceDescriptor, usize)> = roots
            .into_iter()
            .rev()
            .map(|d| (normalize(d, None), 0))
            .collect();

        while let Some((node, depth)) = stack.pop() {
            if self.shutdown.is_cancelled() {
                return Err(TraversalError::Cancelled);
            }
            match node.kind {
                ResourceKind::FileElement => files.push(node),
                ResourceKind::Folder => {
                    if depth >= self.max_depth {
                        let path = node.logical_path();
                        return Err(TraversalError::DepthExceeded {
                            folder_id: node.element_id,
                            path,
                            max_depth: self.max_depth,
                        });
                    }
                    if !visited.insert(node.element_id.clone()) {
                        tracing::warn!(
                            course_id,
                            folder_id = %node.element_id,
                            "Folder '{}' already visited in this walk, skipping",
                            node.logical_path()
                        );
                        continue;
                    }

                    let children = match self
                        .resolver
                        .list_folder(course_id, &node.element_id)
                        .await
                    {
                        Ok(children) => children,
                        Err(e) => {
                            tracing::error!(
                                course_id,
                                folder_id = %node.element_id,
                                "Failed to list folder '{}', skipping it: {}",
                                node.logical_path(),
                                e
                            );
                            continue;
                        }
                    };
                    tracing::debug!(
                        course_id,
                        folder_id = %node.element_id,
                        children = children.len(),
                        "Listed folder"
                    );

                    let folder_path = node.logical_path();
                    stack.extend(
                        children
                            .into_iter()
                            .rev()
                            .map(|child| (normalize(child, Some(&folder_path)), depth + 1)),
                    );
                }
            }
        }
        Ok(files)
    }
}

/// Sanitize a node's parent path. Children listed without a path inherit
/// the location of the folder they were listed from.
fn normalize(mut node: ResourceDescriptor, parent: Option<&str>) -> ResourceDescriptor {
    if node.path.trim().is_empty() {
        if let Some(parent) = parent {
            node.path = parent.to_string();
        }
    }
    node.path = sanitize_logical_path(&node.path);
    node.title = node.title.trim().to_string();
    node
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    use crate::platform::fake::{element, folder, FakeResolver};

    fn ids(files: &[ResourceDescriptor]) -> Vec<&str> {
        files.iter().map(|f| f.element_id.as_str()).collect()
    }

    #[tokio::test]
    async fn test_flattens_in_tree_order() {
        let resolver = FakeResolver::new()
            .with_folder("c", "A", vec![element("a1", "a1", "/A"), folder("B", "B", "/A")])
            .with_folder("c", "B", vec![element("b1", "b1", "/A/B")]);
        let walker = Walker::new(&resolver, CancellationToken::new());

        let files = walker
            .walk(
                "c",
                vec![
                    element("r1", "r1", "/"),
                    folder("A", "A", "/"),
                    element("r2", "r2", "/"),
                ],
            )
            .await
            .unwrap();

        assert_eq!(ids(&files), vec!["r1", "a1", "b1", "r2"]);
        assert!(files.iter().all(|f| f.kind == ResourceKind::FileElement));
        assert_eq!(resolver.list_folder_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failed_folder_skips_only_its_subtree() {
        let resolver = FakeResolver::new()
            .with_folder("c", "A", vec![element("a1", "a1", "/A")])
            .with_folder("c", "B", vec![element("b1", "b1", "/B")])
            .failing_folder("A");
        let walker = Walker::new(&resolver, CancellationToken::new());

        let files = walker
            .walk("c", vec![folder("A", "A", "/"), folder("B", "B", "/")])
            .await
            .unwrap();
        assert_eq!(ids(&files), vec!["b1"]);
    }

    #[tokio::test]
    async fn test_revisited_folder_is_skipped() {
        let resolver = FakeResolver::new()
            .with_folder("c", "A", vec![element("a1", "a1", "/A"), folder("A", "A", "/A")]);
        let walker = Walker::new(&resolver, CancellationToken::new());

        let files = walker.walk("c", vec![folder("A", "A", "/")]).await.unwrap();
        assert_eq!(ids(&files), vec!["a1"]);
        assert_eq!(resolver.list_folder_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_depth_limit() {
        // Each folder contains the next one: 0 -> 1 -> 2 -> ...
        let mut resolver = FakeResolver::new();
        for i in 0..10 {
            resolver = resolver.with_folder(
                "c",
                &i.to_string(),
                vec![folder(&(i + 1).to_string(), "sub", "")],
            );
        }
        let walker = Walker::new(&resolver, CancellationToken::new()).with_max_depth(3);
        let err = walker
            .walk("c", vec![folder("0", "root", "/")])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TraversalError::DepthExceeded { ref folder_id, max_depth: 3, .. } if folder_id == "3"
        ));
        assert!(err.to_string().contains("/root/sub/sub/sub"));
    }

    #[tokio::test]
    async fn test_paths_are_sanitized_and_inherited() {
        let resolver = FakeResolver::new()
            .with_folder("c", "F", vec![element("e", "Notes", "")]);
        let walker = Walker::new(&resolver, CancellationToken::new());

        let files = walker
            .walk(
                "c",
                vec![
                    folder("F", "Week 1", " / Example Path "),
                    element("x", " Slides ", "Maths / Lectures"),
                ],
            )
            .await
            .unwrap();
        assert_eq!(files[0].path, "/Example Path/Week 1");
        assert_eq!(files[0].logical_path(), "/Example Path/Week 1/Notes");
        assert_eq!(files[1].path, "Maths/Lectures");
        assert_eq!(files[1].title, "Slides");
    }

    #[tokio::test]
    async fn test_cancelled_walk_errors() {
        let resolver = FakeResolver::new();
        let token = CancellationToken::new();
        token.cancel();
        let walker = Walker::new(&resolver, token);
        assert!(matches!(
            walker.walk("c", vec![element("1", "1", "/")]).await,
            Err(TraversalError::Cancelled)
        ));
    }

    #[tokio::test]
    async fn test_empty_roots() {
        let resolver = FakeResolver::new();
        let walker = Walker::new(&resolver, CancellationToken::new());
        assert!(walker.walk("c", Vec::new()).await.unwrap().is_empty());
    }
}
