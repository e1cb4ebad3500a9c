use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use sha2::{Digest as _, Sha256};

/// SHA-256 fingerprint of a set of source files, hex-encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFingerprint(pub String);

/// Fingerprint a file list from each file's path, size, and modified time.
///
/// Order-independent: the list is sorted before hashing. Files whose
/// metadata cannot be read still contribute their path.
pub fn fingerprint_files(files: &[PathBuf]) -> SourceFingerprint {
    let mut sorted: Vec<&PathBuf> = files.iter().collect();
    sorted.sort();

    let mut hasher = Sha256::new();
    for file in sorted {
        hasher.update(describe_file(file).as_bytes());
        hasher.update(b"\n");
    }
    return SourceFingerprint(format!("{:x}", hasher.finalize()));
}

/// `path|size|mtime` line for one file.
fn describe_file(path: &Path) -> String {
    let Ok(meta) = std::fs::metadata(path) else {
        return format!("{}|-|-", path.display());
    };
    let modified = meta
        .modified()
        .ok()
        .and_then(|t| return t.duration_since(UNIX_EPOCH).ok())
        .map_or(0, |d| return d.as_nanos());
    return format!("{}|{}|{modified}", path.display(), meta.len());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_ignores_order() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.xml");
        let b = dir.path().join("b.xml");
        std::fs::write(&a, "<a/>").unwrap();
        std::fs::write(&b, "<b/>").unwrap();
        assert_eq!(
            fingerprint_files(&[a.clone(), b.clone()]),
            fingerprint_files(&[b, a])
        );
    }

    #[test]
    fn fingerprint_tracks_content_size() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.xml");
        std::fs::write(&a, "<a/>").unwrap();
        let before = fingerprint_files(std::slice::from_ref(&a));
        std::fs::write(&a, "<a>longer</a>").unwrap();
        assert_ne!(before, fingerprint_files(&[a]));
    }

    #[test]
    fn fingerprint_is_hex_sha256() {
        let SourceFingerprint(hex) = fingerprint_files(&[]);
        assert_eq!(hex.len(), 64);
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
