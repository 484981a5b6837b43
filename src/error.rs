//! Error taxonomy shared by every component.
//!
//! Each component that can fail gets its own `thiserror` enum, mirroring the split between
//! `K8sError` and `ExecutorError` elsewhere in this codebase. `BundleError` is the union the
//! Tool Surface actually matches on when translating a failure into a rendered response.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PathGuardError {
    #[error("path escapes the bundle root")]
    NotSafe,
}

#[derive(Error, Debug)]
pub enum ResolverError {
    #[error("'{0}' is not a local archive, an extracted bundle directory, or a recognized URL")]
    SourceInvalid(String),
    #[error("vendor-portal source requires SBCTL_TOKEN or REPLICATED to be set")]
    AuthRequired,
    #[error("download failed: {0}")]
    DownloadFailed(#[from] DownloadFailure),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum DownloadFailure {
    #[error("unauthorized (401) fetching {0}")]
    Unauthorized(String),
    #[error("forbidden (403) fetching {0}")]
    Forbidden(String),
    #[error("not found (404) fetching {0}")]
    NotFound(String),
    #[error("timed out fetching {0}")]
    Timeout(String),
    #[error("response exceeded the {0} byte size cap")]
    SizeExceeded(u64),
    #[error("vendor-portal response had no signedUri field")]
    MissingSignedUrl,
    #[error("transport error fetching {0}: {1}")]
    Transport(String, String),
}

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("io error scanning bundle storage: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error("serve-tool binary not found or exited immediately: {0}")]
    StartFailed(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ManagerError {
    #[error("a bundle is already active; pass force=true to replace it")]
    AlreadyActive,
    #[error("no bundle is currently active")]
    NoBundleActive,
    #[error("resolving bundle source failed: {0}")]
    Resolver(#[from] ResolverError),
    #[error("extracting bundle failed: {0}")]
    ExtractionFailed(String),
    #[error("starting serve-tool failed: {0}")]
    Supervisor(#[from] SupervisorError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum KctlError {
    #[error("no bundle is currently active")]
    NoBundleActive,
    #[error("command '{0}' is not an allowed read-only kctl verb")]
    CommandDisallowed(String),
    #[error("kctl exited with a non-zero status: {0}")]
    Failed(String),
    #[error("kctl timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ExplorerError {
    #[error("no bundle is currently active")]
    NoBundleActive,
    #[error("path escapes the bundle root")]
    PathNotSafe,
    #[error("path not found: {0}")]
    PathNotFound(PathBuf),
    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),
    #[error("not a file: {0}")]
    NotAFile(PathBuf),
    #[error("invalid regex pattern: {0}")]
    RegexInvalid(#[from] regex::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// The union of component errors the Tool Surface matches on.
///
/// This is deliberately flat (one variant per recognized error kind) rather than a
/// wrapper around each component error, so that `BundleError::kind()` can return the exact
/// machine-readable tag the formatter needs at every verbosity tier.
#[derive(Error, Debug)]
pub enum BundleError {
    #[error("{0}")]
    PathGuard(#[from] PathGuardError),
    #[error("{0}")]
    Resolver(#[from] ResolverError),
    #[error("{0}")]
    Registry(#[from] RegistryError),
    #[error("{0}")]
    Supervisor(#[from] SupervisorError),
    #[error("{0}")]
    Manager(#[from] ManagerError),
    #[error("{0}")]
    Kctl(#[from] KctlError),
    #[error("{0}")]
    Explorer(#[from] ExplorerError),
    #[error("call deadline exceeded")]
    Timeout,
    #[error("internal error: {0}")]
    Internal(String),
}

/// `ResolverError` is surfaced through two paths -- directly as `BundleError::Resolver`, and
/// wrapped one level deeper as `ManagerError::Resolver` via `initialize_bundle`'s `#[from]`
/// conversion -- and both must classify it identically rather than only the never-reached direct
/// path getting the distinct kinds §7 requires.
fn resolver_kind(err: &ResolverError) -> &'static str {
    match err {
        ResolverError::SourceInvalid(_) => "bundle-source-invalid",
        ResolverError::AuthRequired => "auth-required",
        ResolverError::DownloadFailed(_) | ResolverError::Http(_) | ResolverError::Io(_) => {
            "download-failed"
        }
    }
}

impl BundleError {
    /// The short, stable machine-readable tag used at `minimal` verbosity and in tests.
    pub fn kind(&self) -> &'static str {
        match self {
            BundleError::PathGuard(_) => "path-not-safe",
            BundleError::Resolver(e) => resolver_kind(e),
            BundleError::Registry(_) => "registry-error",
            BundleError::Supervisor(_) => "serve-tool-start-failed",
            BundleError::Manager(ManagerError::AlreadyActive) => "bundle-already-active",
            BundleError::Manager(ManagerError::NoBundleActive) => "no-bundle-active",
            BundleError::Manager(ManagerError::ExtractionFailed(_)) => "extraction-failed",
            BundleError::Manager(ManagerError::Resolver(e)) => resolver_kind(e),
            BundleError::Manager(ManagerError::Supervisor(_)) => "serve-tool-start-failed",
            BundleError::Manager(ManagerError::Io(_)) => "extraction-failed",
            BundleError::Kctl(KctlError::NoBundleActive) => "no-bundle-active",
            BundleError::Kctl(KctlError::CommandDisallowed(_)) => "kctl-command-disallowed",
            BundleError::Kctl(KctlError::Failed(_)) => "kctl-failed",
            BundleError::Kctl(KctlError::Timeout(_)) => "kctl-timeout",
            BundleError::Kctl(KctlError::Io(_)) => "kctl-failed",
            BundleError::Explorer(ExplorerError::NoBundleActive) => "no-bundle-active",
            BundleError::Explorer(ExplorerError::PathNotSafe) => "path-not-safe",
            BundleError::Explorer(ExplorerError::PathNotFound(_)) => "path-not-found",
            BundleError::Explorer(ExplorerError::NotADirectory(_)) => "not-a-directory",
            BundleError::Explorer(ExplorerError::NotAFile(_)) => "not-a-file",
            BundleError::Explorer(ExplorerError::RegexInvalid(_)) => "regex-invalid",
            BundleError::Explorer(ExplorerError::Io(_)) => "path-not-found",
            BundleError::Timeout => "timeout",
            BundleError::Internal(_) => "internal-error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manager_wrapped_resolver_errors_keep_their_own_kind() {
        let auth: BundleError = ManagerError::Resolver(ResolverError::AuthRequired).into();
        assert_eq!(auth.kind(), "auth-required");

        let download: BundleError =
            ManagerError::Resolver(ResolverError::DownloadFailed(DownloadFailure::Timeout(
                "https://vendor.example.com/bundle.tar.gz".to_string(),
            )))
            .into();
        assert_eq!(download.kind(), "download-failed");

        let invalid: BundleError =
            ManagerError::Resolver(ResolverError::SourceInvalid("nope".to_string())).into();
        assert_eq!(invalid.kind(), "bundle-source-invalid");
    }

    #[test]
    fn direct_resolver_errors_match_the_manager_wrapped_kind() {
        let direct: BundleError = ResolverError::AuthRequired.into();
        let wrapped: BundleError = ManagerError::Resolver(ResolverError::AuthRequired).into();
        assert_eq!(direct.kind(), wrapped.kind());
    }
}
