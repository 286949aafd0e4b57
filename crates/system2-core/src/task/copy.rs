//! Local file copy

use super::TaskOutput;
use crate::error::Result;
use crate::types::TransferCounters;
use std::path::Path;

pub(crate) async fn copy_file(source: &Path, destination: &Path) -> Result<TaskOutput> {
    if let Some(parent) = destination.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    let copied = tokio::fs::copy(source, destination).await?;
    log::debug!("Copied {:?} to {:?} ({} bytes)", source, destination, copied);

    Ok(TaskOutput {
        counters: TransferCounters {
            upload_total: copied,
            upload_now: copied,
            ..Default::default()
        },
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[tokio::test]
    async fn test_copy_creates_missing_directories() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("source.txt");
        std::fs::write(&source, b"payload").unwrap();
        let destination = dir.path().join("a/b/c/dest.txt");

        let output = copy_file(&source, &destination).await.unwrap();

        assert_eq!(std::fs::read(&destination).unwrap(), b"payload");
        assert_eq!(output.status, 0);
        assert_eq!(output.counters.upload_now, 7);
    }

    #[tokio::test]
    async fn test_copy_missing_source_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = copy_file(&dir.path().join("missing"), &dir.path().join("dest"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Io(_)));
        assert_ne!(err.status_code(), 0);
    }
}
