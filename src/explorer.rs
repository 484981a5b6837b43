//! Lists, reads, and greps files under the active bundle's extraction root, all paths passed
//! through the Path Guard first.

use std::fs;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use regex::RegexBuilder;
use tracing::warn;
use walkdir::WalkDir;

use crate::error::ExplorerError;
use crate::model::{
    FileEntry, FileEntryKind, FileListResult, FileReadResult, GrepMatch, GrepResult,
};
use crate::path_guard;

const BINARY_SNIFF_BYTES: usize = 4096;
const HEX_DUMP_PREVIEW_BYTES: usize = 256;

fn is_binary(path: &Path) -> std::io::Result<bool> {
    let mut file = fs::File::open(path)?;
    let mut buf = vec![0u8; BINARY_SNIFF_BYTES];
    let n = file.read(&mut buf)?;
    let chunk = &buf[..n];
    if chunk.contains(&0) {
        return Ok(true);
    }
    Ok(std::str::from_utf8(chunk).is_err())
}

pub fn list(
    root: &Path,
    path: &str,
    recursive: bool,
    max_entries: usize,
    max_depth: Option<usize>,
) -> Result<FileListResult, ExplorerError> {
    let target = path_guard::guard(root, path).map_err(|_| ExplorerError::PathNotSafe)?;

    if !target.exists() {
        return Err(ExplorerError::PathNotFound(target));
    }
    if !target.is_dir() {
        return Err(ExplorerError::NotADirectory(target));
    }

    let mut entries = Vec::new();
    if recursive {
        let mut walker = WalkDir::new(&target).min_depth(1);
        if let Some(depth) = max_depth {
            walker = walker.max_depth(depth);
        }
        for dirent in walker.into_iter().filter_map(Result::ok) {
            if entries.len() >= max_entries {
                warn!(path = %target.display(), max_entries, "recursive listing truncated at the configured entry cap");
                break;
            }
            entries.push(to_file_entry(&target, dirent.path())?);
        }
    } else {
        for dirent in fs::read_dir(&target)? {
            if entries.len() >= max_entries {
                warn!(path = %target.display(), max_entries, "listing truncated at the configured entry cap");
                break;
            }
            let dirent = dirent?;
            entries.push(to_file_entry(&target, &dirent.path())?);
        }
    }

    entries.sort_by(|a, b| match (a.kind, b.kind) {
        (FileEntryKind::Directory, FileEntryKind::File) => std::cmp::Ordering::Less,
        (FileEntryKind::File, FileEntryKind::Directory) => std::cmp::Ordering::Greater,
        _ => a.name.cmp(&b.name),
    });

    let total = entries.len();
    Ok(FileListResult {
        entries,
        base_path: format!("/{}", path.trim_start_matches('/')),
        total,
    })
}

fn to_file_entry(base: &Path, entry_path: &Path) -> Result<FileEntry, ExplorerError> {
    let metadata = fs::symlink_metadata(entry_path)?;
    let name = entry_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let relative = entry_path.strip_prefix(base).unwrap_or(entry_path);
    let kind = if metadata.is_dir() {
        FileEntryKind::Directory
    } else {
        FileEntryKind::File
    };
    let is_binary_flag = if kind == FileEntryKind::File {
        is_binary(entry_path).unwrap_or(false)
    } else {
        false
    };

    Ok(FileEntry {
        name,
        path: format!("/{}", relative.to_string_lossy()),
        kind,
        size: if kind == FileEntryKind::File { Some(metadata.len()) } else { None },
        modified: metadata.modified().ok(),
        is_binary: is_binary_flag,
    })
}

pub fn read(
    root: &Path,
    path: &str,
    start_line: Option<usize>,
    end_line: Option<usize>,
) -> Result<FileReadResult, ExplorerError> {
    let target = path_guard::guard(root, path).map_err(|_| ExplorerError::PathNotSafe)?;

    if !target.exists() {
        return Err(ExplorerError::PathNotFound(target));
    }
    if !target.is_file() {
        return Err(ExplorerError::NotAFile(target));
    }

    let display_path = format!("/{}", path.trim_start_matches('/'));
    let size_bytes = fs::metadata(&target)?.len();

    if is_binary(&target)? {
        let mut file = fs::File::open(&target)?;
        let mut preview = vec![0u8; HEX_DUMP_PREVIEW_BYTES];
        let n = file.read(&mut preview)?;
        preview.truncate(n);
        return Ok(FileReadResult {
            content: String::new(),
            binary: true,
            start_line: 0,
            end_line: 0,
            total_lines: 0,
            path: display_path,
            preview_bytes: preview,
            size_bytes,
        });
    }

    let contents = fs::read_to_string(&target)?;
    let lines: Vec<&str> = contents.lines().collect();
    let total_lines = lines.len();

    let start = start_line.unwrap_or(0).min(total_lines.saturating_sub(1));
    let end = end_line
        .unwrap_or(total_lines.saturating_sub(1))
        .min(total_lines.saturating_sub(1));
    let end = end.max(start);

    let slice = if total_lines == 0 {
        String::new()
    } else {
        lines[start..=end].join("\n")
    };

    Ok(FileReadResult {
        content: slice,
        binary: false,
        start_line: start,
        end_line: end,
        total_lines,
        path: display_path,
        preview_bytes: Vec::new(),
        size_bytes,
    })
}

pub struct GrepOptions {
    pub recursive: bool,
    pub glob_pattern: Option<String>,
    pub case_sensitive: bool,
    pub max_results: usize,
    pub max_results_per_file: usize,
    pub max_files: usize,
}

impl Default for GrepOptions {
    fn default() -> Self {
        GrepOptions {
            recursive: true,
            glob_pattern: None,
            case_sensitive: false,
            max_results: 1000,
            max_results_per_file: 5,
            max_files: 10,
        }
    }
}

pub fn grep(
    root: &Path,
    pattern: &str,
    path: &str,
    opts: &GrepOptions,
) -> Result<GrepResult, ExplorerError> {
    let target = path_guard::guard(root, path).map_err(|_| ExplorerError::PathNotSafe)?;

    if !target.exists() {
        return Err(ExplorerError::PathNotFound(target));
    }

    let regex = RegexBuilder::new(pattern)
        .case_insensitive(!opts.case_sensitive)
        .build()?;

    let glob = opts
        .glob_pattern
        .as_ref()
        .map(|g| glob::Pattern::new(g))
        .transpose()
        .map_err(|_| ExplorerError::PathNotFound(target.clone()))?;

    let candidates: Vec<std::path::PathBuf> = if target.is_file() {
        vec![target.clone()]
    } else if opts.recursive {
        WalkDir::new(&target)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
            .map(|e| e.path().to_path_buf())
            .collect()
    } else {
        fs::read_dir(&target)?
            .filter_map(Result::ok)
            .map(|e| e.path())
            .filter(|p| p.is_file())
            .collect()
    };

    let mut matches = Vec::new();
    let mut files_searched = 0usize;
    let mut files_truncated = false;
    let mut truncated = false;

    'files: for file_path in &candidates {
        if let Some(pat) = &glob {
            let basename = file_path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
            if !pat.matches(&basename) {
                continue;
            }
        }

        if files_searched >= opts.max_files {
            files_truncated = true;
            break;
        }

        if is_binary(file_path).unwrap_or(true) {
            continue;
        }

        files_searched += 1;
        let display = format!("/{}", file_path.strip_prefix(root).unwrap_or(file_path).to_string_lossy());

        let Ok(file) = fs::File::open(file_path) else { continue };
        let reader = BufReader::new(file);
        let mut per_file_count = 0usize;

        for (idx, line) in reader.lines().enumerate() {
            let Ok(line) = line else { break };
            if let Some(m) = regex.find(&line) {
                let (match_start, match_end) = (m.start(), m.end());
                let is_last_allowed = per_file_count + 1 == opts.max_results_per_file;
                matches.push(GrepMatch {
                    file: display.clone(),
                    line: idx + 1,
                    content: line,
                    match_start,
                    match_end,
                    truncated: is_last_allowed,
                });
                per_file_count += 1;

                if matches.len() >= opts.max_results {
                    truncated = true;
                    break 'files;
                }
                if per_file_count >= opts.max_results_per_file {
                    break;
                }
            }
        }
    }

    Ok(GrepResult {
        matches,
        files_searched,
        files_truncated,
        truncated,
        pattern: pattern.to_string(),
        path: format!("/{}", path.trim_start_matches('/')),
        glob_pattern: opts.glob_pattern.clone(),
        case_sensitive: opts.case_sensitive,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn fixture_root() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("cluster-resources")).unwrap();
        fs::write(dir.path().join("cluster-resources/pods.json"), "line1\nline2\nERROR boom\n").unwrap();
        fs::write(dir.path().join("cluster-resources/events.json"), "nothing interesting\n").unwrap();
        fs::write(dir.path().join("binary.dat"), [0u8, 1, 2, 3, 255]).unwrap();
        dir
    }

    #[test]
    fn list_non_recursive_sorts_dirs_first() {
        let dir = fixture_root();
        let result = list(dir.path(), "", false, 5000, None).unwrap();
        assert_eq!(result.entries[0].kind, FileEntryKind::Directory);
    }

    #[test]
    fn list_rejects_missing_path() {
        let dir = fixture_root();
        assert!(list(dir.path(), "does-not-exist", false, 5000, None).is_err());
    }

    #[test]
    fn list_recursive_stops_at_entry_cap() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..20 {
            fs::write(dir.path().join(format!("file{i}.txt")), "x").unwrap();
        }
        let result = list(dir.path(), "", true, 5, None).unwrap();
        assert_eq!(result.entries.len(), 5);
    }

    #[test]
    fn list_recursive_respects_max_depth() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("a/b")).unwrap();
        fs::write(dir.path().join("a/b/deep.txt"), "x").unwrap();
        fs::write(dir.path().join("a/shallow.txt"), "x").unwrap();

        let result = list(dir.path(), "", true, 5000, Some(1)).unwrap();
        assert!(result.entries.iter().any(|e| e.name == "a"));
        assert!(!result.entries.iter().any(|e| e.name == "shallow.txt"));
        assert!(!result.entries.iter().any(|e| e.name == "deep.txt"));
    }

    #[test]
    fn read_returns_requested_line_slice() {
        let dir = fixture_root();
        let result = read(dir.path(), "cluster-resources/pods.json", Some(1), Some(2)).unwrap();
        assert_eq!(result.content, "line2\nERROR boom");
        assert_eq!(result.total_lines, 3);
    }

    #[test]
    fn read_detects_binary_file() {
        let dir = fixture_root();
        let result = read(dir.path(), "binary.dat", None, None).unwrap();
        assert!(result.binary);
    }

    #[test]
    fn grep_finds_matching_line_with_position() {
        let dir = fixture_root();
        let opts = GrepOptions::default();
        let result = grep(dir.path(), "error", "", &opts).unwrap();
        assert_eq!(result.matches.len(), 1);
        assert_eq!(result.matches[0].line, 3);
    }

    #[test]
    fn grep_skips_binary_files() {
        let dir = fixture_root();
        let opts = GrepOptions::default();
        let result = grep(dir.path(), ".", "", &opts).unwrap();
        assert!(result.matches.iter().all(|m| !m.file.contains("binary.dat")));
    }

    #[test]
    fn grep_caps_results_per_file() {
        let dir = tempfile::tempdir().unwrap();
        let content = (0..20).map(|i| format!("match {i}")).collect::<Vec<_>>().join("\n");
        fs::write(dir.path().join("many.log"), content).unwrap();

        let opts = GrepOptions {
            max_results_per_file: 3,
            ..GrepOptions::default()
        };
        let result = grep(dir.path(), "match", "", &opts).unwrap();
        assert_eq!(result.matches.len(), 3);
        assert!(result.matches.last().unwrap().truncated);
    }

    #[test]
    fn grep_rejects_invalid_regex() {
        let dir = fixture_root();
        let opts = GrepOptions::default();
        assert!(grep(dir.path(), "(unclosed", "", &opts).is_err());
    }
}
