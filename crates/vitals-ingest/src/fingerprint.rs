//! Content fingerprints for file-level deduplication.

use std::{
  fs::File,
  io::{self, Read},
  path::{Path, PathBuf},
};

use sha2::{Digest, Sha256};

const CHUNK: usize = 64 * 1024;

/// Hex-encoded SHA-256 of everything `reader` yields, read in fixed chunks.
pub fn sha256_hex(mut reader: impl Read) -> io::Result<String> {
  let mut hasher = Sha256::new();
  let mut buf = vec![0u8; CHUNK];
  loop {
    let n = reader.read(&mut buf)?;
    if n == 0 {
      break;
    }
    hasher.update(&buf[..n]);
  }
  Ok(hex::encode(hasher.finalize()))
}

/// Fingerprint of the file at `path`, hashed on the blocking pool.
pub async fn fingerprint_file(path: &Path) -> io::Result<String> {
  let path: PathBuf = path.to_path_buf();
  tokio::task::spawn_blocking(move || sha256_hex(File::open(path)?))
    .await
    .map_err(io::Error::other)?
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn digest_of_known_input() {
    assert_eq!(
      sha256_hex(&b"abc"[..]).unwrap(),
      "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
    );
  }

  #[test]
  fn digest_spans_chunk_boundaries() {
    let data = vec![7u8; CHUNK * 2 + 13];
    let expected = hex::encode(Sha256::digest(&data));
    assert_eq!(sha256_hex(&data[..]).unwrap(), expected);
  }

  #[tokio::test]
  async fn identical_files_share_a_fingerprint() {
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("a.csv");
    let b = dir.path().join("b.csv");
    std::fs::write(&a, "date,score\n").unwrap();
    std::fs::write(&b, "date,score\n").unwrap();

    assert_eq!(fingerprint_file(&a).await.unwrap(), fingerprint_file(&b).await.unwrap());
  }
}
