//! Owns the single active-bundle slot and its state machine, coordinating the Resolver,
//! Registry, and Serve-Tool Supervisor. Modeled on `ServiceManager`: a `RwLock`-guarded shared
//! map there becomes a `RwLock`-guarded `Option` here, since exactly one bundle can be active
//! per process.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use flate2::read::GzDecoder;
use tar::Archive;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::config::Settings;
use crate::error::ManagerError;
use crate::model::BundleMetadata;
use crate::registry;
use crate::resolver::Resolver;
use crate::supervisor::ServeToolHandle;

enum Slot {
    Empty,
    Active {
        metadata: BundleMetadata,
        supervisor: Arc<ServeToolHandle>,
        api_available: bool,
        owns_extraction_root: bool,
        owns_archive: bool,
    },
}

pub struct BundleManager {
    slot: RwLock<Slot>,
    resolver: Resolver,
    settings: Settings,
}

/// Holds the active-bundle read lock for the lifetime of a single read-only tool call.
pub struct ActiveGuard<'a> {
    guard: tokio::sync::RwLockReadGuard<'a, Slot>,
}

impl ActiveGuard<'_> {
    pub fn root(&self) -> Result<&Path, ManagerError> {
        match &*self.guard {
            Slot::Active { metadata, .. } => Ok(&metadata.extraction_root),
            Slot::Empty => Err(ManagerError::NoBundleActive),
        }
    }

    pub fn kubeconfig_path(&self) -> Result<&Path, ManagerError> {
        match &*self.guard {
            Slot::Active { metadata, .. } => Ok(&metadata.kubeconfig_path),
            Slot::Empty => Err(ManagerError::NoBundleActive),
        }
    }
}

impl BundleManager {
    pub fn new(settings: Settings) -> Self {
        BundleManager {
            slot: RwLock::new(Slot::Empty),
            resolver: Resolver::new(),
            settings,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub async fn is_initialized(&self) -> bool {
        matches!(*self.slot.read().await, Slot::Active { .. })
    }

    pub async fn get_active(&self) -> Option<BundleMetadata> {
        match &*self.slot.read().await {
            Slot::Active { metadata, .. } => Some(metadata.clone()),
            Slot::Empty => None,
        }
    }

    pub async fn get_root(&self) -> Result<PathBuf, ManagerError> {
        match &*self.slot.read().await {
            Slot::Active { metadata, .. } => Ok(metadata.extraction_root.clone()),
            Slot::Empty => Err(ManagerError::NoBundleActive),
        }
    }

    /// Acquire the slot's read lock and hold it for the duration of a tool call:
    /// `initialize_bundle` takes the write lock, every other tool takes the read lock and holds
    /// it across its whole operation, not just the initial path lookup. This is what keeps a
    /// concurrent `force=true` re-initialize from tearing down the extraction root or
    /// kubeconfig file a `kubectl`/`list_files`/`read_file`/`grep_files` call is still using.
    pub async fn acquire_active(&self) -> ActiveGuard<'_> {
        ActiveGuard {
            guard: self.slot.read().await,
        }
    }

    /// Re-check API availability with a fresh probe rather than trusting the flag recorded at
    /// startup.
    pub async fn check_api_available(&self) -> bool {
        let Slot::Active { metadata, .. } = &*self.slot.read().await else {
            return false;
        };
        crate::supervisor::probe_once(&self.settings.kctl_bin, &metadata.kubeconfig_path).await
    }

    /// Diagnostics subrecord for the active bundle's serve-tool process, if any. `None` when no
    /// bundle is active.
    pub async fn get_diagnostics(&self) -> Option<crate::model::Diagnostics> {
        let Slot::Active { supervisor, .. } = &*self.slot.read().await else {
            return None;
        };
        Some(supervisor.current_diagnostics().await)
    }

    /// `initialize_bundle(source, force)`. Serializes against itself via the slot's write lock;
    /// readers see the pre-existing state until this completes.
    pub async fn initialize(
        &self,
        source: &str,
        force: bool,
    ) -> Result<(BundleMetadata, bool), ManagerError> {
        let mut slot = self.slot.write().await;

        if matches!(&*slot, Slot::Active { .. }) {
            if !force {
                return Err(ManagerError::AlreadyActive);
            }
            info!("replacing active bundle due to force=true");
            Self::teardown_slot(&mut slot).await;
        }

        info!(source = %source, "resolving bundle source");
        let archive_path = self.resolver.resolve(source, &self.settings).await?;

        let (extraction_root, owns_extraction_root, owns_archive) = if archive_path.is_dir() {
            (archive_path.clone(), false, false)
        } else {
            let root = extract_archive(&archive_path, &self.settings.bundle_storage)
                .map_err(|e| ManagerError::ExtractionFailed(e.to_string()))?;
            (root, true, true)
        };

        if !crate::model::satisfies_fingerprint(&extraction_root) {
            if owns_extraction_root {
                let _ = fs::remove_dir_all(&extraction_root);
            }
            return Err(ManagerError::ExtractionFailed(
                "extracted tree does not contain a recognizable bundle layout".to_string(),
            ));
        }

        let kubeconfig_path = tempfile::Builder::new()
            .prefix("bundle-mcp-kubeconfig-")
            .tempfile()
            .map_err(ManagerError::Io)?
            .into_temp_path()
            .keep()
            .map_err(|e| ManagerError::Io(e.error))?;

        info!(root = %extraction_root.display(), "starting serve-tool supervisor");
        let (supervisor, api_available, _diag) = ServeToolHandle::start(
            &self.settings.serve_tool_bin,
            &extraction_root,
            &kubeconfig_path,
            &self.settings.kctl_bin,
            self.settings.init_timeout,
        )
        .await
        .map_err(ManagerError::Supervisor)?;

        let metadata = BundleMetadata {
            archive_path: if owns_archive { Some(archive_path) } else { None },
            extraction_root,
            source: source.to_string(),
            serve_tool_pid: supervisor.pid,
            kubeconfig_path,
            activated_at: SystemTime::now(),
        };

        *slot = Slot::Active {
            metadata: metadata.clone(),
            supervisor: Arc::new(supervisor),
            api_available,
            owns_extraction_root,
            owns_archive,
        };

        Ok((metadata, api_available))
    }

    /// Tear down the active bundle (if any). Called on process teardown and before a forced
    /// re-initialize.
    pub async fn shutdown(&self) {
        let mut slot = self.slot.write().await;
        Self::teardown_slot(&mut slot).await;
    }

    async fn teardown_slot(slot: &mut Slot) {
        let previous = std::mem::replace(slot, Slot::Empty);
        if let Slot::Active {
            metadata,
            supervisor,
            owns_extraction_root,
            owns_archive,
            ..
        } = previous
        {
            supervisor.stop(Duration::from_secs(10), Duration::from_secs(5)).await;

            if let Err(e) = fs::remove_file(&metadata.kubeconfig_path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(error = %e, "failed to remove kubeconfig file");
                }
            }

            if owns_extraction_root {
                if let Err(e) = fs::remove_dir_all(&metadata.extraction_root) {
                    warn!(error = %e, "failed to remove extraction root");
                }
            }

            if owns_archive {
                if let Some(archive) = &metadata.archive_path {
                    if let Err(e) = fs::remove_file(archive) {
                        if e.kind() != std::io::ErrorKind::NotFound {
                            warn!(error = %e, "failed to remove downloaded archive");
                        }
                    }
                }
            }
        }
    }

    /// Background periodic cleanup: remove stale extraction directories that aren't the active
    /// one.
    pub async fn sweep_stale_extraction_dirs(&self, older_than: Duration) {
        let active_root = self.get_root().await.ok();
        let Ok(read_dir) = fs::read_dir(&self.settings.bundle_storage) else {
            return;
        };
        let now = SystemTime::now();
        for entry in read_dir.flatten() {
            let path = entry.path();
            if !path.is_dir() || Some(&path) == active_root.as_ref() {
                continue;
            }
            let Ok(meta) = entry.metadata() else { continue };
            let Ok(modified) = meta.modified() else { continue };
            if now.duration_since(modified).unwrap_or_default() > older_than {
                info!(path = %path.display(), "removing stale extraction directory");
                let _ = fs::remove_dir_all(&path);
            }
        }
    }
}

fn extract_archive(archive_path: &Path, storage_dir: &Path) -> std::io::Result<PathBuf> {
    fs::create_dir_all(storage_dir)?;

    let stem = archive_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("bundle")
        .trim_end_matches(".tar");

    let dest = tempfile::Builder::new()
        .prefix(&format!("{}-", stem))
        .tempdir_in(storage_dir)?
        .keep();

    let file = fs::File::open(archive_path)?;
    let decoder = GzDecoder::new(file);
    let mut archive = Archive::new(decoder);

    for entry in archive.entries()? {
        let mut entry = entry?;
        let entry_path = entry.path()?.into_owned();

        if entry_path
            .components()
            .any(|c| matches!(c, std::path::Component::ParentDir | std::path::Component::RootDir))
        {
            warn!(path = %entry_path.display(), "skipping archive entry with path-traversal attempt");
            let mut sink = std::io::sink();
            let _ = std::io::copy(&mut entry, &mut sink);
            continue;
        }

        if let Err(e) = entry.unpack_in(&dest) {
            warn!(path = %entry_path.display(), error = %e, "skipping archive entry that failed to unpack");
        }
    }

    Ok(registry::effective_root(&dest))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_archive(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        let file = fs::File::create(&path).unwrap();
        let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::fast());
        let mut builder = tar::Builder::new(encoder);

        let mut header = tar::Header::new_gnu();
        header.set_size(2);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, "cluster-resources/pods.json", "{}".as_bytes())
            .unwrap();
        builder.into_inner().unwrap().finish().unwrap();
        path
    }

    #[test]
    fn extract_archive_recognizes_top_level_fingerprint() {
        let src_dir = tempfile::tempdir().unwrap();
        let storage_dir = tempfile::tempdir().unwrap();
        let archive = make_archive(src_dir.path(), "bundle.tar.gz");

        let root = extract_archive(&archive, storage_dir.path()).unwrap();
        assert!(root.join("cluster-resources/pods.json").exists());
    }

    #[tokio::test]
    async fn initialize_rejects_concurrent_without_force() {
        let settings = Settings::from_env();
        let manager = BundleManager::new(settings);
        // no bundle active -- the NoBundleActive path
        assert!(!manager.is_initialized().await);
        assert!(manager.get_root().await.is_err());
    }
}
