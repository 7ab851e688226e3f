use std::borrow::Cow;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;

/// Whitespace hugging a separator, as in `" / Example Path "`.
fn separator_whitespace() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s*/\s*").expect("valid separator pattern"))
}

/// Normalize a remote logical path: whitespace around `/` is collapsed so a
/// title like `"Week 1 / Slides"` does not produce `"Week 1 "` and
/// `" Slides"` directories. Leading and trailing whitespace is trimmed.
pub fn sanitize_logical_path(raw: &str) -> String {
    separator_whitespace()
        .replace_all(raw, "/")
        .trim()
        .to_string()
}

/// Clean a filename by removing characters that are invalid on common
/// filesystems: `/`, `\`, `:`, `*`, `?`, `"`, `<`, `>`, `|`.
pub fn clean_filename(filename: &str) -> String {
    filename
        .chars()
        .filter(|c| !matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|'))
        .filter(|c| !c.is_control())
        .collect()
}

/// Decode a server-supplied filename. Invalid percent sequences are kept
/// verbatim rather than failing the download.
pub fn decode_filename(raw: &str) -> String {
    let decoded = urlencoding::decode(raw).unwrap_or(Cow::Borrowed(raw));
    clean_filename(decoded.trim())
}

/// Join a slash-separated logical path under `root`, one component at a
/// time. Empty, `.` and `..` components are dropped so nothing can leave
/// `root`.
pub fn join_logical(root: &Path, logical: &str) -> PathBuf {
    let mut path = root.to_path_buf();
    for component in sanitize_logical_path(logical).split('/') {
        let clean = clean_filename(component.trim());
        if clean.is_empty() || clean == "." || clean == ".." {
            continue;
        }
        path.push(clean);
    }
    path
}

/// Final on-disk location of one file: `<root>/<logical path>/<filename>`.
/// Falls back to `fallback` (usually the element title) when the server sent
/// no usable filename.
pub fn local_file_path(
    root: &Path,
    logical: &str,
    filename: Option<&str>,
    fallback: &str,
) -> PathBuf {
    let name = filename
        .map(decode_filename)
        .filter(|n| !n.is_empty() && n != "." && n != "..")
        .unwrap_or_else(|| {
            let title = clean_filename(fallback.trim());
            if title.is_empty() || title == "." || title == ".." {
                "download".to_string()
            } else {
                title
            }
        });
    join_logical(root, logical).join(name)
}

/// Return `path` if it is not in `taken`, otherwise the first free
/// `name (n).ext` variant, counting from 2.
pub fn disambiguate(path: PathBuf, taken: &HashSet<PathBuf>) -> PathBuf {
    if !taken.contains(&path) {
        return path;
    }
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = path.extension().map(|e| e.to_string_lossy().into_owned());
    (2..)
        .map(|n| {
            let name = match &extension {
                Some(ext) => format!("{} ({}).{}", stem, n, ext),
                None => format!("{} ({})", stem, n),
            };
            path.with_file_name(name)
        })
        .find(|candidate| !taken.contains(candidate))
        .unwrap_or(path)
}
