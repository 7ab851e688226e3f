use std::path::{Path, PathBuf};

use futures_util::StreamExt;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

use super::error::DownloadError;
use crate::platform::RemoteFile;

/// Hidden, per-write unique temp name next to the destination so concurrent
/// writers in one directory never share a `.part` file.
fn temp_download_path(download_path: &Path) -> PathBuf {
    let download_dir = download_path.parent().unwrap_or_else(|| Path::new("."));
    let name = download_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    download_dir.join(format!(".{}.{}.part", name, uuid::Uuid::new_v4().simple()))
}

/// Write one resolved file to `download_path`.
///
/// Non-success responses are rejected before anything touches the disk.
/// Bytes stream into a `.part` file that is renamed over the destination
/// once the body is complete; on any error the `.part` file is removed and
/// an existing file at the destination is left untouched.
pub async fn write_remote_file(
    file: RemoteFile,
    download_path: &Path,
) -> Result<u64, DownloadError> {
    let path_str = download_path.display().to_string();
    if !file.is_success() {
        return Err(DownloadError::HttpStatus {
            status: file.status,
            path: path_str,
        });
    }

    if let Some(parent) = download_path.parent() {
        fs::create_dir_all(parent).await?;
    }

    let part_path = temp_download_path(download_path);
    match stream_to_part(file, &part_path, &path_str).await {
        Ok(bytes_written) => {
            if let Err(e) = fs::rename(&part_path, download_path).await {
                let _ = fs::remove_file(&part_path).await;
                return Err(e.into());
            }
            Ok(bytes_written)
        }
        Err(e) => {
            let _ = fs::remove_file(&part_path).await;
            Err(e)
        }
    }
}

async fn stream_to_part(
    file: RemoteFile,
    part_path: &Path,
    path_str: &str,
) -> Result<u64, DownloadError> {
    let mut out = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(part_path)
        .await?;

    let status = file.status;
    let mut bytes_written: u64 = 0;
    let mut stream = file.body;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| {
            tracing::warn!(
                "Body error for {} (status={}, bytes_so_far={}): {}",
                path_str,
                status,
                bytes_written,
                e
            );
            DownloadError::Transfer {
                source: e,
                path: path_str.to_string(),
                bytes_written,
            }
        })?;
        out.write_all(&chunk).await?;
        bytes_written += chunk.len() as u64;
    }
    out.flush().await?;
    out.sync_all().await?;
    Ok(bytes_written)
}
