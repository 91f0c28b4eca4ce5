//! Readiness check for files that may still be copied or downloaded.

use std::{io, path::Path, time::Duration};

/// A file is stable when its size is non-zero and unchanged across
/// `window`.
pub async fn is_stable(path: &Path, window: Duration) -> io::Result<bool> {
  let before = tokio::fs::metadata(path).await?.len();
  if before == 0 {
    return Ok(false);
  }
  if !window.is_zero() {
    tokio::time::sleep(window).await;
  }
  let after = tokio::fs::metadata(path).await?.len();
  Ok(before == after)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn empty_file_is_unstable() {
    let file = tempfile::NamedTempFile::new().unwrap();
    assert!(!is_stable(file.path(), Duration::ZERO).await.unwrap());
  }

  #[tokio::test]
  async fn growing_file_is_unstable() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("export.csv");
    std::fs::write(&path, "a,b\n").unwrap();

    let writer = {
      let path = path.clone();
      tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        tokio::fs::write(&path, "a,b\n1,2\n").await.unwrap();
      })
    };

    assert!(!is_stable(&path, Duration::from_millis(200)).await.unwrap());
    writer.await.unwrap();
  }

  #[tokio::test]
  async fn settled_file_is_stable() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("export.csv");
    std::fs::write(&path, "a,b\n").unwrap();
    assert!(is_stable(&path, Duration::from_millis(5)).await.unwrap());
  }

  #[tokio::test]
  async fn missing_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    assert!(is_stable(&dir.path().join("nope"), Duration::ZERO).await.is_err());
  }
}
