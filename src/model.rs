//! Data model shared across components.

use std::path::PathBuf;
use std::time::SystemTime;

use serde::Serialize;

/// A value the agent provides identifying which bundle to load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BundleSource {
    /// An existing local archive file or already-extracted directory.
    Local(String),
    /// A vendor-portal URL of the shape `https://<host>/troubleshoot/analyze/<slug>`.
    VendorPortal { raw: String, slug: String },
    /// Any other `http(s)://` URL.
    Url(String),
}

impl BundleSource {
    pub fn classify(source: &str) -> Self {
        let trimmed: String = source.split_whitespace().collect::<Vec<_>>().join("");
        if let Some(slug) = vendor_portal_slug(&trimmed) {
            return BundleSource::VendorPortal { raw: trimmed, slug };
        }
        if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
            return BundleSource::Url(trimmed);
        }
        BundleSource::Local(trimmed)
    }
}

fn vendor_portal_slug(source: &str) -> Option<String> {
    const MARKER: &str = "/troubleshoot/analyze/";
    if !(source.starts_with("https://") || source.starts_with("http://")) {
        return None;
    }
    let idx = source.find(MARKER)?;
    let slug = &source[idx + MARKER.len()..];
    if slug.is_empty() {
        None
    } else {
        Some(slug.to_string())
    }
}

/// Metadata for the currently active bundle (populated once `initialize_bundle` succeeds).
#[derive(Debug, Clone)]
pub struct BundleMetadata {
    pub archive_path: Option<PathBuf>,
    pub extraction_root: PathBuf,
    pub source: String,
    pub serve_tool_pid: Option<u32>,
    pub kubeconfig_path: PathBuf,
    pub activated_at: SystemTime,
}

/// One candidate bundle found by the registry scan.
#[derive(Debug, Clone, Serialize)]
pub struct LocalBundleEntry {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub modified: Option<SystemTime>,
    pub valid: bool,
    pub invalid_reason: Option<String>,
}

/// `{cluster-info, cluster-resources, kubernetes}` -- a bundle is recognized by having at least
/// one of these directories at its root (or one level below a single wrapping directory).
pub const FINGERPRINT_DIRS: &[&str] = &["cluster-info", "cluster-resources", "kubernetes"];

pub fn satisfies_fingerprint(root: &std::path::Path) -> bool {
    FINGERPRINT_DIRS.iter().any(|name| root.join(name).is_dir())
}

/// A single kctl invocation's outcome.
#[derive(Debug, Clone)]
pub struct KctlResult {
    pub command: String,
    pub duration_ms: u128,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub parsed_json: Option<serde_json::Value>,
    pub is_json: bool,
    /// `KUBECONFIG` the command ran with; surfaced in the `debug`-tier environment snapshot.
    pub kubeconfig_path: PathBuf,
}

/// One entry returned by `list_files`.
#[derive(Debug, Clone, Serialize)]
pub struct FileEntry {
    pub name: String,
    pub path: String,
    #[serde(rename = "type")]
    pub kind: FileEntryKind,
    pub size: Option<u64>,
    pub modified: Option<SystemTime>,
    pub is_binary: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileEntryKind {
    File,
    Directory,
}

#[derive(Debug, Clone)]
pub struct FileListResult {
    pub entries: Vec<FileEntry>,
    pub base_path: String,
    pub total: usize,
}

#[derive(Debug, Clone)]
pub struct FileReadResult {
    pub content: String,
    pub binary: bool,
    pub start_line: usize,
    pub end_line: usize,
    pub total_lines: usize,
    pub path: String,
    /// First bytes of a binary file, for the verbose-tier hex dump; empty for text files.
    pub preview_bytes: Vec<u8>,
    /// Total size of the file on disk; used to note when the preview is truncated.
    pub size_bytes: u64,
}

#[derive(Debug, Clone)]
pub struct GrepMatch {
    pub file: String,
    pub line: usize,
    pub content: String,
    pub match_start: usize,
    pub match_end: usize,
    pub truncated: bool,
}

#[derive(Debug, Clone)]
pub struct GrepResult {
    pub matches: Vec<GrepMatch>,
    pub files_searched: usize,
    pub files_truncated: bool,
    pub truncated: bool,
    pub pattern: String,
    pub path: String,
    pub glob_pattern: Option<String>,
    pub case_sensitive: bool,
}

/// The diagnostics subrecord surfaced at `debug` tier.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    pub process_alive: bool,
    pub stdout_tail: Vec<String>,
    pub stderr_tail: Vec<String>,
    pub kubeconfig_exists: bool,
    pub kubeconfig_size: Option<u64>,
    pub serve_tool_binary: Option<PathBuf>,
    pub waited_ms: u128,
    pub last_probe_error: Option<String>,
}
