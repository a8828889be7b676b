//! Content-addressed hashing of build inputs and outputs.

use std::fs;
use std::io::{self, Read};
use std::path::Path;

use sha2::{Digest, Sha256};

const CHUNK_SIZE: usize = 64 * 1024;

/// Hash the file or directory at `path`, returning a lowercase hex digest.
///
/// Symlinks are followed when classifying `path` as a file or a directory,
/// so a symlink to a directory is hashed as a directory listing rather than
/// failing to read as a file. A directory is hashed as the SHA-256 of its
/// immediate children's names, sorted and joined with NUL bytes — this
/// intentionally does not recurse into grandchildren, so only the
/// directory's own listing (not its contents' contents) affects the digest.
pub fn hash_path(path: &Path) -> io::Result<String> {
    let metadata = fs::metadata(path)?;
    if metadata.is_dir() {
        hash_dir(path)
    } else {
        hash_file(path)
    }
}

fn hash_file(path: &Path) -> io::Result<String> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

fn hash_dir(path: &Path) -> io::Result<String> {
    let mut names: Vec<String> = fs::read_dir(path)?
        .map(|entry| entry.map(|e| e.file_name().to_string_lossy().into_owned()))
        .collect::<io::Result<Vec<_>>>()?;
    names.sort();

    let mut hasher = Sha256::new();
    for (i, name) in names.iter().enumerate() {
        if i > 0 {
            hasher.update([0u8]);
        }
        hasher.update(name.as_bytes());
    }
    Ok(hex::encode(hasher.finalize()))
}
