//! Settings resolved from the environment, plus the verbosity tier and duration/size defaults
//! threaded through the rest of the crate.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Output verbosity requested by a tool call, resolved against the process-wide default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Verbosity {
    #[default]
    Minimal,
    Standard,
    Verbose,
    Debug,
}

impl Verbosity {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "minimal" => Some(Verbosity::Minimal),
            "standard" => Some(Verbosity::Standard),
            "verbose" => Some(Verbosity::Verbose),
            "debug" => Some(Verbosity::Debug),
            _ => None,
        }
    }

    /// Resolve the effective tier for a single tool call: explicit argument, then
    /// `MCP_VERBOSITY`, then the hardcoded default -- unless `MCP_DEBUG` is truthy, which wins
    /// over everything.
    pub fn resolve(explicit: Option<Verbosity>, settings: &Settings) -> Verbosity {
        if settings.force_debug {
            return Verbosity::Debug;
        }
        explicit.or(settings.default_verbosity).unwrap_or_default()
    }
}

fn env_truthy(name: &str) -> bool {
    std::env::var(name)
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}

fn env_duration_secs(name: &str, default: Duration) -> Duration {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}

fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

/// Process-wide settings, resolved once at startup from the environment.
#[derive(Debug, Clone)]
pub struct Settings {
    pub bundle_storage: PathBuf,
    pub default_verbosity: Option<Verbosity>,
    pub force_debug: bool,
    pub init_timeout: Duration,
    pub download_timeout: Duration,
    pub max_download_bytes: u64,
    pub cleanup_orphaned: bool,
    pub periodic_cleanup: bool,
    pub cleanup_interval: Duration,
    pub serve_tool_bin: String,
    pub kctl_bin: String,
    pub vendor_api_host: String,
    pub sbctl_token: Option<String>,
    pub max_list_entries: usize,
    pub max_list_depth: Option<usize>,
}

impl Settings {
    /// Resolve settings from the process environment. Pure with respect to everything except
    /// `std::env::var`, which keeps this cheap to call more than once in tests.
    pub fn from_env() -> Self {
        let bundle_storage = std::env::var("MCP_BUNDLE_STORAGE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_bundle_storage());

        let default_verbosity = std::env::var("MCP_VERBOSITY")
            .ok()
            .and_then(|v| Verbosity::parse(&v));

        let sbctl_token = std::env::var("SBCTL_TOKEN")
            .ok()
            .or_else(|| std::env::var("REPLICATED").ok());

        Settings {
            bundle_storage,
            default_verbosity,
            force_debug: env_truthy("MCP_DEBUG"),
            init_timeout: env_duration_secs("MAX_INITIALIZATION_TIMEOUT", Duration::from_secs(180)),
            download_timeout: env_duration_secs("MAX_DOWNLOAD_TIMEOUT", Duration::from_secs(300)),
            max_download_bytes: env_u64("MCP_MAX_DOWNLOAD_BYTES", 2 * 1024 * 1024 * 1024),
            cleanup_orphaned: env_truthy("SBCTL_CLEANUP_ORPHANED"),
            periodic_cleanup: env_truthy("ENABLE_PERIODIC_CLEANUP"),
            cleanup_interval: env_duration_secs("CLEANUP_INTERVAL", Duration::from_secs(300)),
            serve_tool_bin: std::env::var("MCP_SERVE_TOOL_BIN").unwrap_or_else(|_| "sbctl".to_string()),
            kctl_bin: std::env::var("MCP_KCTL_BIN").unwrap_or_else(|_| "kubectl".to_string()),
            vendor_api_host: std::env::var("MCP_VENDOR_API_HOST")
                .unwrap_or_else(|_| "api.replicated.com".to_string()),
            sbctl_token,
            max_list_entries: env_u64("MCP_MAX_LIST_ENTRIES", 5000) as usize,
            max_list_depth: std::env::var("MCP_MAX_LIST_DEPTH")
                .ok()
                .and_then(|v| v.trim().parse::<usize>().ok()),
        }
    }

    /// `MCP_LOG_LEVEL` is documented as one of DEBUG/INFO/WARNING/ERROR; translate to the
    /// directive names `tracing_subscriber::EnvFilter` understands (`warn`, not `warning`).
    pub fn log_filter(&self) -> String {
        std::env::var("MCP_LOG_LEVEL")
            .ok()
            .and_then(|v| match v.to_ascii_uppercase().as_str() {
                "DEBUG" => Some("debug".to_string()),
                "INFO" => Some("info".to_string()),
                "WARNING" | "WARN" => Some("warn".to_string()),
                "ERROR" => Some("error".to_string()),
                _ => None,
            })
            .unwrap_or_else(|| "info".to_string())
    }
}

fn default_bundle_storage() -> PathBuf {
    std::env::temp_dir().join("bundle-mcp")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_unbounded_depth_but_finite_entry_cap() {
        let settings = Settings::from_env();
        assert_eq!(settings.max_list_entries, 5000);
        assert_eq!(settings.max_list_depth, None);
    }

    #[test]
    fn verbosity_parses_case_insensitively() {
        assert_eq!(Verbosity::parse("VERBOSE"), Some(Verbosity::Verbose));
        assert_eq!(Verbosity::parse("bogus"), None);
    }

    #[test]
    fn resolve_prefers_explicit_over_default() {
        let mut settings = Settings::from_env();
        settings.default_verbosity = Some(Verbosity::Debug);
        settings.force_debug = false;
        assert_eq!(
            Verbosity::resolve(Some(Verbosity::Minimal), &settings),
            Verbosity::Minimal
        );
    }

    #[test]
    fn resolve_falls_back_to_default_then_minimal() {
        let mut settings = Settings::from_env();
        settings.force_debug = false;
        settings.default_verbosity = Some(Verbosity::Verbose);
        assert_eq!(Verbosity::resolve(None, &settings), Verbosity::Verbose);

        settings.default_verbosity = None;
        assert_eq!(Verbosity::resolve(None, &settings), Verbosity::Minimal);
    }

    #[test]
    fn force_debug_overrides_everything() {
        let mut settings = Settings::from_env();
        settings.force_debug = true;
        settings.default_verbosity = Some(Verbosity::Minimal);
        assert_eq!(
            Verbosity::resolve(Some(Verbosity::Minimal), &settings),
            Verbosity::Debug
        );
    }

    #[test]
    fn log_filter_maps_warning_to_warn_directive() {
        // SAFETY: test-only env mutation; no other test in this module reads MCP_LOG_LEVEL.
        unsafe {
            std::env::set_var("MCP_LOG_LEVEL", "WARNING");
        }
        let settings = Settings::from_env();
        assert_eq!(settings.log_filter(), "warn");
        unsafe {
            std::env::remove_var("MCP_LOG_LEVEL");
        }
    }
}
