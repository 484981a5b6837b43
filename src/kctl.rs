//! Validates and runs whitelisted read-only kctl subcommands against the active bundle's
//! emulated API server.

use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use tokio::process::Command;
use tokio::time::timeout;
use tracing::info;

use crate::error::KctlError;
use crate::model::KctlResult;

const ALLOWED_VERBS: &[&str] = &[
    "get",
    "describe",
    "explain",
    "config",
    "version",
    "api-resources",
    "api-versions",
    "cluster-info",
];

const SHELL_METACHARACTERS: &[char] = &[';', '&', '|', '>', '<', '`', '$', '\\'];

/// Validate a raw command string and split it into argv, rejecting anything that looks like
/// shell injection or a non-read-only verb.
pub fn validate(command: &str) -> Result<Vec<String>, KctlError> {
    let normalized = command
        .strip_prefix("kubectl ")
        .unwrap_or(command)
        .trim();

    if normalized.chars().any(|c| SHELL_METACHARACTERS.contains(&c)) {
        return Err(KctlError::CommandDisallowed(command.to_string()));
    }

    let args: Vec<String> = normalized.split_whitespace().map(str::to_string).collect();
    let verb = args.first().ok_or_else(|| KctlError::CommandDisallowed(command.to_string()))?;

    if !ALLOWED_VERBS.contains(&verb.as_str()) {
        return Err(KctlError::CommandDisallowed(command.to_string()));
    }

    Ok(args)
}

pub async fn execute(
    kctl_bin: &str,
    kubeconfig_path: &Path,
    command: &str,
    timeout_secs: u64,
    json_output: bool,
) -> Result<KctlResult, KctlError> {
    let mut args = validate(command)?;

    if json_output && !args.iter().any(|a| a == "-o" || a == "--output" || a.starts_with("-o=") || a.starts_with("--output=")) {
        args.push("-o".to_string());
        args.push("json".to_string());
    }

    info!(command = %command, "executing kctl command");

    let start = Instant::now();
    let run = Command::new(kctl_bin)
        .env("KUBECONFIG", kubeconfig_path)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output();

    let output = timeout(Duration::from_secs(timeout_secs), run)
        .await
        .map_err(|_| KctlError::Timeout(Duration::from_secs(timeout_secs)))??;

    let duration_ms = start.elapsed().as_millis();
    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
    let exit_code = output.status.code().unwrap_or(-1);

    if !output.status.success() {
        return Err(KctlError::Failed(stderr));
    }

    let (parsed_json, is_json) = if json_output {
        let trimmed = stdout.trim_start();
        if trimmed.starts_with('{') || trimmed.starts_with('[') {
            match serde_json::from_str::<serde_json::Value>(&stdout) {
                Ok(v) => (Some(v), true),
                Err(_) => (None, false),
            }
        } else {
            (None, false)
        }
    } else {
        (None, false)
    };

    Ok(KctlResult {
        command: std::iter::once(kctl_bin.to_string())
            .chain(args)
            .collect::<Vec<_>>()
            .join(" "),
        duration_ms,
        stdout,
        stderr,
        exit_code,
        parsed_json,
        is_json,
        kubeconfig_path: kubeconfig_path.to_path_buf(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_accepts_allowed_verb() {
        let args = validate("get pods -A").unwrap();
        assert_eq!(args, vec!["get", "pods", "-A"]);
    }

    #[test]
    fn validate_strips_leading_kubectl() {
        let args = validate("kubectl get nodes").unwrap();
        assert_eq!(args, vec!["get", "nodes"]);
    }

    #[test]
    fn validate_rejects_mutating_verb() {
        assert!(validate("delete pod foo").is_err());
        assert!(validate("apply -f x.yaml").is_err());
        assert!(validate("exec -it foo -- sh").is_err());
    }

    #[test]
    fn validate_rejects_shell_metacharacters() {
        assert!(validate("get pods; rm -rf /").is_err());
        assert!(validate("get pods | grep foo").is_err());
        assert!(validate("get pods > /tmp/out").is_err());
        assert!(validate("get pods $(whoami)").is_err());
    }

    #[test]
    fn validate_rejects_empty_command() {
        assert!(validate("   ").is_err());
    }
}
