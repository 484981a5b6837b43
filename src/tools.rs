//! Binds the five MCP tools and dispatches to the Bundle Manager / kctl Executor / File Explorer,
//! formatting every result through the Response Formatter. Uses the standard
//! `#[tool_router]`/`#[tool_handler]` shape and `Parameters<T>` argument structs for tool
//! arguments.

use rmcp::handler::server::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{CallToolResult, Content, ServerCapabilities, ServerInfo};
use rmcp::{tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler};
use schemars::JsonSchema;
use serde::Deserialize;

use crate::config::Verbosity;
use crate::context::AppContext;
use crate::error::BundleError;
use crate::{explorer, format, kctl};

#[derive(Debug, Deserialize, JsonSchema)]
pub struct InitializeBundleParams {
    /// Local archive/directory path, generic URL, or vendor-portal URL to load as the active bundle.
    pub source: String,
    /// Replace an already-active bundle instead of failing.
    #[serde(default)]
    pub force: bool,
    #[serde(default)]
    pub verbosity: Option<Verbosity>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ListAvailableBundlesParams {
    #[serde(default)]
    pub verbosity: Option<Verbosity>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct KubectlParams {
    /// A read-only kubectl command line, e.g. "get pods -A".
    pub command: String,
    #[serde(default = "default_kctl_timeout")]
    pub timeout: u64,
    #[serde(default)]
    pub json_output: bool,
    #[serde(default)]
    pub verbosity: Option<Verbosity>,
}

fn default_kctl_timeout() -> u64 {
    30
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ListFilesParams {
    pub path: String,
    #[serde(default)]
    pub recursive: bool,
    #[serde(default)]
    pub verbosity: Option<Verbosity>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ReadFileParams {
    pub path: String,
    #[serde(default)]
    pub start_line: usize,
    #[serde(default)]
    pub end_line: Option<usize>,
    #[serde(default)]
    pub verbosity: Option<Verbosity>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GrepFilesParams {
    pub pattern: String,
    pub path: String,
    #[serde(default = "default_true")]
    pub recursive: bool,
    #[serde(default)]
    pub glob_pattern: Option<String>,
    #[serde(default)]
    pub case_sensitive: bool,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default = "default_max_results_per_file")]
    pub max_results_per_file: usize,
    #[serde(default = "default_max_files")]
    pub max_files: usize,
    #[serde(default)]
    pub verbosity: Option<Verbosity>,
}

fn default_true() -> bool {
    true
}
fn default_max_results() -> usize {
    1000
}
fn default_max_results_per_file() -> usize {
    5
}
fn default_max_files() -> usize {
    10
}

/// File and grep operations carry no explicit `timeout` argument, but still need the generic
/// per-call deadline the concurrency model requires; the spec fixes this at 30s.
const IMPLICIT_EXPLORER_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

/// Run a blocking `Explorer` operation off the async executor thread, under the implicit 30s
/// deadline. A timeout or a panicked blocking task both surface as `BundleError::Timeout` /
/// `internal-error` rather than hanging the request.
async fn run_bounded<T, E, F>(f: F) -> Result<T, BundleError>
where
    T: Send + 'static,
    E: Into<BundleError> + Send + 'static,
    F: FnOnce() -> Result<T, E> + Send + 'static,
{
    match tokio::time::timeout(IMPLICIT_EXPLORER_TIMEOUT, tokio::task::spawn_blocking(f)).await {
        Ok(Ok(inner)) => inner.map_err(Into::into),
        Ok(Err(join_err)) => Err(BundleError::Internal(join_err.to_string())),
        Err(_) => Err(BundleError::Timeout),
    }
}

/// The MCP server itself: one per process, holding the shared `AppContext`.
#[derive(Clone)]
pub struct BundleServer {
    ctx: std::sync::Arc<AppContext>,
    tool_router: ToolRouter<Self>,
}

impl BundleServer {
    pub fn new(ctx: std::sync::Arc<AppContext>) -> Self {
        BundleServer {
            ctx,
            tool_router: Self::tool_router(),
        }
    }

    fn tier(&self, explicit: Option<Verbosity>) -> Verbosity {
        Verbosity::resolve(explicit, self.ctx.manager.settings())
    }

    fn ok(text: String) -> Result<CallToolResult, McpError> {
        Ok(CallToolResult::success(vec![Content::text(text)]))
    }

    /// Render a `BundleError` at the requested tier. Errors are never propagated as MCP protocol
    /// errors: every tool call returns a well-formed text result.
    fn err_result(err: BundleError, tier: Verbosity) -> Result<CallToolResult, McpError> {
        Ok(CallToolResult::success(vec![Content::text(format::error(
            &err, tier,
        ))]))
    }
}

#[tool_router]
impl BundleServer {
    #[tool(
        description = "Load a Kubernetes support-bundle (local archive/directory, generic URL, or \
vendor-portal URL) as the active bundle, extracting it and starting its emulated API server. \
Fails with 'bundle-already-active' if a bundle is already loaded, unless force=true."
    )]
    pub async fn initialize_bundle(
        &self,
        Parameters(params): Parameters<InitializeBundleParams>,
    ) -> Result<CallToolResult, McpError> {
        let tier = self.tier(params.verbosity);

        match self.ctx.manager.initialize(&params.source, params.force).await {
            Ok((metadata, _api_available)) => {
                let diagnostics = if tier == Verbosity::Debug {
                    self.ctx.manager.get_diagnostics().await
                } else {
                    None
                };
                Self::ok(format::bundle_init(&metadata, diagnostics.as_ref(), tier))
            }
            Err(e) => Self::err_result(BundleError::Manager(e), tier),
        }
    }

    #[tool(
        description = "List support-bundle archives found in the bundle-storage directory, newest \
first, with validity and size information."
    )]
    pub async fn list_available_bundles(
        &self,
        Parameters(params): Parameters<ListAvailableBundlesParams>,
    ) -> Result<CallToolResult, McpError> {
        let tier = self.tier(params.verbosity);
        match crate::registry::scan(&self.ctx.manager.settings().bundle_storage) {
            Ok(entries) => Self::ok(format::bundle_list(&entries, tier)),
            Err(e) => Self::err_result(BundleError::Registry(e), tier),
        }
    }

    #[tool(
        description = "Run a read-only kubectl command (get, describe, explain, config, version, \
api-resources, api-versions, cluster-info) against the active bundle's emulated API server. \
Mutating or exec verbs are rejected before anything is spawned."
    )]
    pub async fn kubectl(
        &self,
        Parameters(params): Parameters<KubectlParams>,
    ) -> Result<CallToolResult, McpError> {
        let tier = self.tier(params.verbosity);
        let active = self.ctx.manager.acquire_active().await;
        let kubeconfig = match active.kubeconfig_path() {
            Ok(path) => path,
            Err(e) => return Self::err_result(BundleError::Manager(e), tier),
        };

        let result = kctl::execute(
            &self.ctx.manager.settings().kctl_bin,
            kubeconfig,
            &params.command,
            params.timeout,
            params.json_output,
        )
        .await;

        match result {
            Ok(result) => Self::ok(format::kctl(&result, tier)),
            Err(e) => Self::err_result(BundleError::Kctl(e), tier),
        }
    }

    #[tool(
        description = "List files and directories under a path in the active bundle, bundle-relative \
and rooted at the extraction directory. Set recursive=true to walk subdirectories."
    )]
    pub async fn list_files(
        &self,
        Parameters(params): Parameters<ListFilesParams>,
    ) -> Result<CallToolResult, McpError> {
        let tier = self.tier(params.verbosity);
        let active = self.ctx.manager.acquire_active().await;
        let root = match active.root() {
            Ok(root) => root.to_path_buf(),
            Err(e) => return Self::err_result(BundleError::Manager(e), tier),
        };

        let path = params.path.clone();
        let recursive = params.recursive;
        let max_list_entries = self.ctx.manager.settings().max_list_entries;
        let max_list_depth = self.ctx.manager.settings().max_list_depth;
        match run_bounded(move || {
            explorer::list(&root, &path, recursive, max_list_entries, max_list_depth)
        })
        .await
        {
            Ok(result) => Self::ok(format::file_list(&result, tier)),
            Err(e) => Self::err_result(e, tier),
        }
    }

    #[tool(
        description = "Read a slice of a text file in the active bundle by 0-based inclusive line \
range. Binary files are detected and reported without their content."
    )]
    pub async fn read_file(
        &self,
        Parameters(params): Parameters<ReadFileParams>,
    ) -> Result<CallToolResult, McpError> {
        let tier = self.tier(params.verbosity);
        let active = self.ctx.manager.acquire_active().await;
        let root = match active.root() {
            Ok(root) => root.to_path_buf(),
            Err(e) => return Self::err_result(BundleError::Manager(e), tier),
        };

        let path = params.path.clone();
        let start_line = params.start_line;
        let end_line = params.end_line;
        match run_bounded(move || explorer::read(&root, &path, Some(start_line), end_line)).await {
            Ok(result) => Self::ok(format::file_read(&result, tier)),
            Err(e) => Self::err_result(e, tier),
        }
    }

    #[tool(
        description = "Regex search files under a path in the active bundle. Bounded by \
max_results, max_results_per_file, and max_files so results stay within a small token budget; \
truncation is reported explicitly rather than silently dropping matches."
    )]
    pub async fn grep_files(
        &self,
        Parameters(params): Parameters<GrepFilesParams>,
    ) -> Result<CallToolResult, McpError> {
        let tier = self.tier(params.verbosity);
        let active = self.ctx.manager.acquire_active().await;
        let root = match active.root() {
            Ok(root) => root.to_path_buf(),
            Err(e) => return Self::err_result(BundleError::Manager(e), tier),
        };

        let opts = explorer::GrepOptions {
            recursive: params.recursive,
            glob_pattern: params.glob_pattern.clone(),
            case_sensitive: params.case_sensitive,
            max_results: params.max_results,
            max_results_per_file: params.max_results_per_file,
            max_files: params.max_files,
        };
        let pattern = params.pattern.clone();
        let path = params.path.clone();

        match run_bounded(move || explorer::grep(&root, &pattern, &path, &opts)).await {
            Ok(result) => Self::ok(format::grep(&result, tier)),
            Err(e) => Self::err_result(e, tier),
        }
    }
}

#[tool_handler]
impl ServerHandler for BundleServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "Read-only analysis surface over a Kubernetes support-bundle.

**Tools:**
- `initialize_bundle`: load a bundle (local archive/directory, URL, or vendor-portal URL) as the \
active bundle. Only one bundle is active at a time; pass force=true to replace it.
- `list_available_bundles`: list archives already present in local bundle storage.
- `kubectl`: run a read-only kubectl command against the active bundle's emulated API server.
- `list_files` / `read_file` / `grep_files`: explore the active bundle's extracted contents, all \
paths bounded to the extraction root.

All tools accept an optional `verbosity` of minimal (default), standard, verbose, or debug, \
controlling how much structure and diagnostic detail comes back in the result."
                    .into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}
