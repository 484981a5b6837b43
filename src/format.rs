//! Renders typed tool results into the text block the agent receives, at one of four verbosity
//! tiers. Pure: no I/O, deterministic given its inputs.

use std::fmt::Write as _;

use serde_json::json;

use crate::config::Verbosity;
use crate::model::{
    BundleMetadata, Diagnostics, FileListResult, FileReadResult, GrepResult, KctlResult,
    LocalBundleEntry,
};

fn gutter_width(total_lines: usize) -> usize {
    total_lines.max(1).to_string().len()
}

pub fn bundle_init(meta: &BundleMetadata, diagnostics: Option<&Diagnostics>, tier: Verbosity) -> String {
    let kubeconfig = meta.kubeconfig_path.display().to_string();
    let path = meta.extraction_root.display().to_string();

    match tier {
        Verbosity::Minimal => {
            json!({"path": path, "kubeconfig": kubeconfig}).to_string()
        }
        Verbosity::Standard => json!({
            "path": path,
            "kubeconfig": kubeconfig,
            "source": meta.source,
        })
        .to_string(),
        Verbosity::Verbose | Verbosity::Debug => {
            let mut out = String::new();
            let _ = writeln!(out, "# Bundle initialized");
            let _ = writeln!(out, "- source: {}", meta.source);
            let _ = writeln!(out, "- extraction root: {}", path);
            let _ = writeln!(out, "- kubeconfig: {}", kubeconfig);
            if let Some(pid) = meta.serve_tool_pid {
                let _ = writeln!(out, "- serve-tool pid: {}", pid);
            }
            if tier == Verbosity::Debug {
                if let Some(diag) = diagnostics {
                    out.push_str(&diagnostics_block(diag));
                }
            }
            out
        }
    }
}

fn diagnostics_block(diag: &Diagnostics) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "\n## Diagnostics");
    let _ = writeln!(out, "- process alive: {}", diag.process_alive);
    let _ = writeln!(out, "- kubeconfig exists: {}", diag.kubeconfig_exists);
    if let Some(size) = diag.kubeconfig_size {
        let _ = writeln!(out, "- kubeconfig size: {} bytes", size);
    }
    if let Some(bin) = &diag.serve_tool_binary {
        let _ = writeln!(out, "- serve-tool binary: {}", bin.display());
    } else {
        let _ = writeln!(out, "- serve-tool binary: not found");
    }
    let _ = writeln!(out, "- waited: {} ms", diag.waited_ms);
    if let Some(err) = &diag.last_probe_error {
        let _ = writeln!(out, "- last probe error: {}", err);
    }
    if !diag.stdout_tail.is_empty() {
        let _ = writeln!(out, "\n### stdout (tail)\n```\n{}\n```", diag.stdout_tail.join("\n"));
    }
    if !diag.stderr_tail.is_empty() {
        let _ = writeln!(out, "\n### stderr (tail)\n```\n{}\n```", diag.stderr_tail.join("\n"));
    }
    out
}

pub fn bundle_list(entries: &[LocalBundleEntry], tier: Verbosity) -> String {
    match tier {
        Verbosity::Minimal => {
            let paths: Vec<String> = entries
                .iter()
                .filter(|e| e.valid)
                .map(|e| e.path.display().to_string())
                .collect();
            json!(paths).to_string()
        }
        Verbosity::Standard => {
            let items: Vec<_> = entries
                .iter()
                .map(|e| {
                    json!({
                        "path": e.path.display().to_string(),
                        "valid": e.valid,
                        "size": e.size_bytes,
                    })
                })
                .collect();
            json!({"bundles": items, "count": entries.len()}).to_string()
        }
        Verbosity::Verbose | Verbosity::Debug => {
            let mut out = String::new();
            let _ = writeln!(out, "# Available bundles ({} found)", entries.len());
            for e in entries {
                if e.valid {
                    let _ = writeln!(out, "- {} ({} bytes)", e.path.display(), e.size_bytes);
                } else {
                    let _ = writeln!(
                        out,
                        "- {} [INVALID: {}]",
                        e.path.display(),
                        e.invalid_reason.as_deref().unwrap_or("unknown")
                    );
                }
            }
            out
        }
    }
}

pub fn kctl(result: &KctlResult, tier: Verbosity) -> String {
    let body = if result.is_json {
        result
            .parsed_json
            .as_ref()
            .map(|v| v.to_string())
            .unwrap_or_else(|| result.stdout.clone())
    } else {
        result.stdout.clone()
    };

    match tier {
        Verbosity::Minimal => body,
        Verbosity::Standard => json!({
            "output": body,
            "command": result.command,
            "exit_code": result.exit_code,
            "duration_ms": result.duration_ms,
        })
        .to_string(),
        Verbosity::Verbose | Verbosity::Debug => {
            let mut out = String::new();
            let _ = writeln!(out, "# kctl: `{}`", result.command);
            let _ = writeln!(out, "- exit code: {}", result.exit_code);
            let _ = writeln!(out, "- duration: {} ms", result.duration_ms);
            let _ = writeln!(out, "\n```\n{}\n```", body);
            if tier == Verbosity::Debug {
                if !result.stderr.is_empty() {
                    let _ = writeln!(out, "\n### stderr\n```\n{}\n```", result.stderr);
                }
                let _ = writeln!(
                    out,
                    "\n### environment\n- KUBECONFIG: {}",
                    result.kubeconfig_path.display()
                );
            }
            out
        }
    }
}

pub fn file_list(result: &FileListResult, tier: Verbosity) -> String {
    match tier {
        Verbosity::Minimal => {
            let names: Vec<String> = result
                .entries
                .iter()
                .map(|e| match e.kind {
                    crate::model::FileEntryKind::Directory => format!("{}/", e.name),
                    crate::model::FileEntryKind::File => e.name.clone(),
                })
                .collect();
            json!(names).to_string()
        }
        Verbosity::Standard => {
            let items: Vec<_> = result
                .entries
                .iter()
                .map(|e| {
                    json!({
                        "name": e.name,
                        "type": e.kind,
                    })
                })
                .collect();
            json!({"entries": items, "count": result.total}).to_string()
        }
        Verbosity::Verbose | Verbosity::Debug => {
            let mut out = String::new();
            let _ = writeln!(out, "# Listing of {} ({} entries)", result.base_path, result.total);
            for e in &result.entries {
                let suffix = match e.kind {
                    crate::model::FileEntryKind::Directory => "/",
                    crate::model::FileEntryKind::File => "",
                };
                let size = e.size.map(|s| format!(" ({} bytes)", s)).unwrap_or_default();
                let binary = if e.is_binary { " [binary]" } else { "" };
                let _ = writeln!(out, "- {}{}{}{}", e.name, suffix, size, binary);
            }
            out
        }
    }
}

/// 16-bytes-per-row offset/hex/ASCII hex dump, the conventional `xxd`-style layout.
fn hex_dump(bytes: &[u8]) -> String {
    let mut out = String::new();
    for (row, chunk) in bytes.chunks(16).enumerate() {
        let _ = write!(out, "{:08x}  ", row * 16);
        for (i, byte) in chunk.iter().enumerate() {
            let _ = write!(out, "{:02x} ", byte);
            if i == 7 {
                out.push(' ');
            }
        }
        let padding = 16usize.saturating_sub(chunk.len());
        for _ in 0..padding {
            out.push_str("   ");
        }
        out.push_str(" |");
        for byte in chunk {
            let c = if byte.is_ascii_graphic() || *byte == b' ' { *byte as char } else { '.' };
            out.push(c);
        }
        out.push_str("|\n");
    }
    out
}

pub fn file_read(result: &FileReadResult, tier: Verbosity) -> String {
    if result.binary {
        return match tier {
            Verbosity::Minimal | Verbosity::Standard => {
                json!({"binary": true, "path": result.path}).to_string()
            }
            Verbosity::Verbose | Verbosity::Debug => {
                let mut out = String::new();
                let _ = writeln!(out, "# {} (binary, {} bytes)", result.path, result.size_bytes);
                let _ = writeln!(out, "\n```\n{}```", hex_dump(&result.preview_bytes));
                if result.size_bytes > result.preview_bytes.len() as u64 {
                    let _ = writeln!(
                        out,
                        "\n(showing first {} of {} bytes)",
                        result.preview_bytes.len(),
                        result.size_bytes
                    );
                }
                out
            }
        };
    }

    match tier {
        Verbosity::Minimal => result.content.clone(),
        Verbosity::Standard => json!({
            "content": result.content,
            "total_lines": result.total_lines,
        })
        .to_string(),
        Verbosity::Verbose | Verbosity::Debug => {
            let mut out = String::new();
            let _ = writeln!(
                out,
                "# {} (lines {}-{} of {})",
                result.path,
                result.start_line + 1,
                result.end_line + 1,
                result.total_lines
            );
            let width = gutter_width(result.total_lines);
            out.push_str("```\n");
            for (offset, line) in result.content.lines().enumerate() {
                let lineno = result.start_line + offset + 1;
                let _ = writeln!(out, "{:>width$} | {}", lineno, line, width = width);
            }
            out.push_str("```\n");
            out
        }
    }
}

pub fn grep(result: &GrepResult, tier: Verbosity) -> String {
    match tier {
        Verbosity::Minimal | Verbosity::Standard => {
            let matches: Vec<_> = result
                .matches
                .iter()
                .map(|m| {
                    let mut obj = json!({
                        "file": m.file,
                        "line": m.line,
                        "content": m.content,
                    });
                    if m.truncated {
                        obj["truncated"] = json!(true);
                    }
                    obj
                })
                .collect();
            let mut payload = json!({"matches": matches});
            if result.files_truncated {
                payload["files_truncated"] = json!(true);
            }
            if tier == Verbosity::Standard {
                payload["files_searched"] = json!(result.files_searched);
                payload["total_matches"] = json!(result.matches.len());
            }
            payload.to_string()
        }
        Verbosity::Verbose | Verbosity::Debug => {
            let mut out = String::new();
            let _ = writeln!(
                out,
                "# grep `{}` in {} ({} matches across {} files)",
                result.pattern,
                result.path,
                result.matches.len(),
                result.files_searched
            );
            let mut current_file: Option<&str> = None;
            for m in &result.matches {
                if current_file != Some(m.file.as_str()) {
                    let _ = writeln!(out, "\n## {}", m.file);
                    current_file = Some(&m.file);
                }
                let mark = if m.truncated { " [truncated]" } else { "" };
                let _ = writeln!(out, "{:>6} | {}{}", m.line, m.content, mark);
            }
            let meta = json!({
                "pattern": result.pattern,
                "path": result.path,
                "glob_pattern": result.glob_pattern,
                "case_sensitive": result.case_sensitive,
                "files_searched": result.files_searched,
                "files_truncated": result.files_truncated,
                "truncated": result.truncated,
            });
            let _ = writeln!(out, "\n```json\n{}\n```", meta);
            out
        }
    }
}

/// The catch-all error renderer: short phrase at `minimal`, phrase plus cause chain otherwise.
pub fn error(err: &crate::error::BundleError, tier: Verbosity) -> String {
    match tier {
        Verbosity::Minimal => err.kind().to_string(),
        Verbosity::Standard => format!("{}: {}", err.kind(), err),
        Verbosity::Verbose | Verbosity::Debug => format!("error [{}]: {}", err.kind(), err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FileEntry, FileEntryKind};

    #[test]
    fn file_list_minimal_suffixes_directories() {
        let result = FileListResult {
            entries: vec![
                FileEntry {
                    name: "pods".to_string(),
                    path: "/pods".to_string(),
                    kind: FileEntryKind::Directory,
                    size: None,
                    modified: None,
                    is_binary: false,
                },
                FileEntry {
                    name: "notes.txt".to_string(),
                    path: "/notes.txt".to_string(),
                    kind: FileEntryKind::File,
                    size: Some(12),
                    modified: None,
                    is_binary: false,
                },
            ],
            base_path: "/".to_string(),
            total: 2,
        };
        let rendered = file_list(&result, Verbosity::Minimal);
        let parsed: Vec<String> = serde_json::from_str(&rendered).unwrap();
        assert_eq!(parsed, vec!["pods/".to_string(), "notes.txt".to_string()]);
    }

    #[test]
    fn file_read_verbose_has_gutter_and_range() {
        let result = FileReadResult {
            content: "a\nb\nc".to_string(),
            binary: false,
            start_line: 0,
            end_line: 2,
            total_lines: 3,
            path: "/x.txt".to_string(),
            preview_bytes: Vec::new(),
            size_bytes: 5,
        };
        let rendered = file_read(&result, Verbosity::Verbose);
        assert!(rendered.contains("lines 1-3 of 3"));
        assert!(rendered.contains("1 | a"));
    }

    #[test]
    fn file_read_verbose_renders_hex_dump_for_binary() {
        let result = FileReadResult {
            content: String::new(),
            binary: true,
            start_line: 0,
            end_line: 0,
            total_lines: 0,
            path: "/blob.dat".to_string(),
            preview_bytes: vec![0xde, 0xad, 0xbe, 0xef, b'h', b'i'],
            size_bytes: 6,
        };
        let rendered = file_read(&result, Verbosity::Verbose);
        assert!(rendered.contains("de ad be ef"));
        assert!(rendered.contains("|....hi|"));
    }

    #[test]
    fn minimal_tiers_produce_compact_json() {
        let result = FileListResult {
            entries: vec![],
            base_path: "/".to_string(),
            total: 0,
        };
        let rendered = file_list(&result, Verbosity::Minimal);
        assert!(!rendered.contains(' '));
    }

    fn sample_grep_result() -> GrepResult {
        GrepResult {
            matches: vec![crate::model::GrepMatch {
                file: "cluster-resources/pods.json".to_string(),
                line: 12,
                content: "  \"phase\": \"Running\"".to_string(),
                match_start: 2,
                match_end: 7,
                truncated: false,
            }],
            files_searched: 4,
            files_truncated: false,
            truncated: false,
            pattern: "Running".to_string(),
            path: "/".to_string(),
            glob_pattern: Some("*.json".to_string()),
            case_sensitive: false,
        }
    }

    #[test]
    fn grep_verbose_includes_metadata_block() {
        let rendered = grep(&sample_grep_result(), Verbosity::Verbose);
        assert!(rendered.contains("## cluster-resources/pods.json"));
        assert!(rendered.contains("```json"));
        assert!(rendered.contains("\"glob_pattern\":\"*.json\""));
    }

    #[test]
    fn grep_debug_includes_same_metadata_block_as_verbose() {
        let rendered = grep(&sample_grep_result(), Verbosity::Debug);
        assert!(rendered.contains("```json"));
        assert!(rendered.contains("\"case_sensitive\":false"));
    }
}
