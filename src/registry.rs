//! Enumerates local bundle archives in the bundle-storage directory without fully extracting
//! them.

use std::fs;
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use tar::Archive;
use tracing::warn;

use crate::error::RegistryError;
use crate::model::{satisfies_fingerprint, LocalBundleEntry, FINGERPRINT_DIRS};

const ARCHIVE_SUFFIXES: &[&str] = &[".tar.gz", ".tgz"];

/// Scan `storage_dir` for archives, newest modification time first.
pub fn scan(storage_dir: &Path) -> Result<Vec<LocalBundleEntry>, RegistryError> {
    if !storage_dir.exists() {
        return Ok(Vec::new());
    }

    let mut entries = Vec::new();
    for dirent in fs::read_dir(storage_dir)? {
        let dirent = dirent?;
        let path = dirent.path();
        if !path.is_file() {
            continue;
        }
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        if !ARCHIVE_SUFFIXES.iter().any(|suffix| name.ends_with(suffix)) {
            continue;
        }

        let metadata = dirent.metadata()?;
        let (valid, reason) = match peek_archive(&path) {
            Ok(true) => (true, None),
            Ok(false) => (false, Some("archive does not contain a recognizable bundle layout".to_string())),
            Err(e) => (false, Some(format!("failed to read archive: {}", e))),
        };

        entries.push(LocalBundleEntry {
            path,
            size_bytes: metadata.len(),
            modified: metadata.modified().ok(),
            valid,
            invalid_reason: reason,
        });
    }

    entries.sort_by(|a, b| b.modified.cmp(&a.modified));
    Ok(entries)
}

/// Open the archive and check its top-level entries against the layout fingerprint, without
/// extracting anything to disk.
fn peek_archive(path: &Path) -> std::io::Result<bool> {
    let file = fs::File::open(path)?;
    let decoder = GzDecoder::new(file);
    let mut archive = Archive::new(decoder);

    let mut top_level_dirs: Vec<String> = Vec::new();
    let mut second_level_dirs: Vec<String> = Vec::new();
    for entry in archive.entries()? {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping unreadable archive entry");
                continue;
            }
        };
        let entry_path = match entry.path() {
            Ok(p) => p.into_owned(),
            Err(_) => continue,
        };
        let mut components = entry_path.components();
        if let Some(first) = components.next() {
            top_level_dirs.push(first.as_os_str().to_string_lossy().into_owned());
        }
        if let Some(second) = components.next() {
            second_level_dirs.push(second.as_os_str().to_string_lossy().into_owned());
        }
    }

    if top_level_dirs
        .iter()
        .any(|d| FINGERPRINT_DIRS.contains(&d.as_str()))
    {
        return Ok(true);
    }

    // allow one level of wrapping directory: e.g. `support-bundle-2024/cluster-resources/...`
    let wrapper_ok = second_level_dirs
        .iter()
        .any(|d| FINGERPRINT_DIRS.contains(&d.as_str()));

    Ok(wrapper_ok)
}

/// Used by the Bundle Manager after extraction to decide whether the effective root should be
/// adjusted one level down.
pub fn effective_root(extracted_to: &Path) -> PathBuf {
    if satisfies_fingerprint(extracted_to) {
        return extracted_to.to_path_buf();
    }

    if let Ok(mut read) = fs::read_dir(extracted_to) {
        if let (Some(Ok(only_entry)), None) = (read.next(), read.next()) {
            let candidate = only_entry.path();
            if candidate.is_dir() && satisfies_fingerprint(&candidate) {
                return candidate;
            }
        }
    }

    extracted_to.to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_fixture_archive(dir: &Path, name: &str, top_dirs: &[&str]) -> PathBuf {
        let path = dir.join(name);
        let file = fs::File::create(&path).unwrap();
        let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::fast());
        let mut builder = tar::Builder::new(encoder);
        for d in top_dirs {
            let mut header = tar::Header::new_gnu();
            header.set_size(0);
            header.set_mode(0o755);
            header.set_entry_type(tar::EntryType::Directory);
            header.set_cksum();
            builder
                .append_data(&mut header, format!("{}/", d), std::io::empty())
                .unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap();
        let _ = Write::flush(&mut fs::File::open(&path).unwrap());
        path
    }

    #[test]
    fn scan_marks_fingerprinted_archive_valid() {
        let dir = tempfile::tempdir().unwrap();
        write_fixture_archive(dir.path(), "good.tar.gz", &["cluster-resources"]);
        write_fixture_archive(dir.path(), "bad.tar.gz", &["random-stuff"]);

        let entries = scan(dir.path()).unwrap();
        assert_eq!(entries.len(), 2);
        let good = entries.iter().find(|e| e.path.ends_with("good.tar.gz")).unwrap();
        assert!(good.valid);
        let bad = entries.iter().find(|e| e.path.ends_with("bad.tar.gz")).unwrap();
        assert!(!bad.valid);
    }

    #[test]
    fn scan_ignores_non_archive_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("notes.txt"), "hi").unwrap();
        let entries = scan(dir.path()).unwrap();
        assert!(entries.is_empty());
    }

    #[test]
    fn scan_missing_storage_dir_returns_empty() {
        let entries = scan(Path::new("/nonexistent/bundle-storage-dir")).unwrap();
        assert!(entries.is_empty());
    }
}
