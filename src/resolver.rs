//! Turns a Bundle Source into a local archive path, downloading it first if necessary.

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

use crate::config::Settings;
use crate::error::{DownloadFailure, ResolverError};
use crate::model::{satisfies_fingerprint, BundleSource};

pub struct Resolver {
    client: reqwest::Client,
}

impl Resolver {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .build()
            .expect("reqwest client construction cannot fail with default settings");
        Resolver { client }
    }

    /// Resolve `source` into a local archive path or extracted directory, downloading if needed.
    pub async fn resolve(&self, source: &str, settings: &Settings) -> Result<PathBuf, ResolverError> {
        match BundleSource::classify(source) {
            BundleSource::Local(path) => self.resolve_local(&path),
            BundleSource::VendorPortal { raw, slug } => {
                self.resolve_vendor_portal(&raw, &slug, settings).await
            }
            BundleSource::Url(url) => self.resolve_generic_url(&url, settings).await,
        }
    }

    fn resolve_local(&self, path: &str) -> Result<PathBuf, ResolverError> {
        let p = Path::new(path);
        if !p.exists() {
            return Err(ResolverError::SourceInvalid(path.to_string()));
        }
        if p.is_dir() {
            if satisfies_fingerprint(p) {
                return Ok(p.to_path_buf());
            }
            return Err(ResolverError::SourceInvalid(path.to_string()));
        }
        let name = p.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Ok(p.to_path_buf())
        } else {
            Err(ResolverError::SourceInvalid(path.to_string()))
        }
    }

    async fn resolve_vendor_portal(
        &self,
        raw: &str,
        slug: &str,
        settings: &Settings,
    ) -> Result<PathBuf, ResolverError> {
        let token = settings
            .sbctl_token
            .as_ref()
            .ok_or(ResolverError::AuthRequired)?;

        let api_url = format!(
            "https://{}/vendor/v3/supportbundle/{}",
            settings.vendor_api_host, slug
        );
        info!(url = %raw, "resolving vendor-portal bundle source");

        let response = self
            .client
            .get(&api_url)
            .header("Authorization", token)
            .timeout(Duration::from_secs(30))
            .send()
            .await
            .map_err(|e| classify_transport_error(&api_url, e))?;

        match response.status().as_u16() {
            200 => {}
            401 => return Err(DownloadFailure::Unauthorized(api_url).into()),
            403 => return Err(DownloadFailure::Forbidden(api_url).into()),
            404 => return Err(DownloadFailure::NotFound(api_url).into()),
            other => {
                return Err(DownloadFailure::Transport(api_url, format!("http {}", other)).into());
            }
        }

        let body: serde_json::Value = response.json().await?;
        let signed_uri = body
            .get("signedUri")
            .or_else(|| body.get("bundle").and_then(|b| b.get("signedUri")))
            .and_then(|v| v.as_str())
            .ok_or(DownloadFailure::MissingSignedUrl)?;

        let dest = settings.bundle_storage.join(format!("{}.tar.gz", slug));
        self.download_to(signed_uri, &dest, settings).await?;
        Ok(dest)
    }

    async fn resolve_generic_url(
        &self,
        url: &str,
        settings: &Settings,
    ) -> Result<PathBuf, ResolverError> {
        info!(url = %url, "resolving generic URL bundle source");
        let filename = url
            .rsplit('/')
            .next()
            .filter(|s| !s.is_empty())
            .unwrap_or("bundle.tar.gz");
        let dest = settings.bundle_storage.join(filename);
        self.download_to(url, &dest, settings).await?;
        Ok(dest)
    }

    async fn download_to(
        &self,
        url: &str,
        dest: &Path,
        settings: &Settings,
    ) -> Result<(), ResolverError> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let response = tokio::time::timeout(
            settings.download_timeout,
            self.client.get(url).send(),
        )
        .await
        .map_err(|_| DownloadFailure::Timeout(url.to_string()))?
        .map_err(|e| classify_transport_error(url, e))?;

        if !response.status().is_success() {
            return Err(match response.status().as_u16() {
                401 => DownloadFailure::Unauthorized(url.to_string()).into(),
                403 => DownloadFailure::Forbidden(url.to_string()).into(),
                404 => DownloadFailure::NotFound(url.to_string()).into(),
                other => DownloadFailure::Transport(url.to_string(), format!("http {}", other)).into(),
            });
        }

        let mut file = tokio::fs::File::create(dest).await?;
        let mut stream = response.bytes_stream();
        let mut written: u64 = 0;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| classify_transport_error(url, e))?;
            written += chunk.len() as u64;
            if written > settings.max_download_bytes {
                drop(file);
                let _ = tokio::fs::remove_file(dest).await;
                return Err(DownloadFailure::SizeExceeded(settings.max_download_bytes).into());
            }
            file.write_all(&chunk).await?;
        }
        file.flush().await?;

        info!(dest = %dest.display(), bytes = written, "downloaded bundle archive");
        Ok(())
    }
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new()
    }
}

fn classify_transport_error(url: &str, err: reqwest::Error) -> ResolverError {
    if err.is_timeout() {
        DownloadFailure::Timeout(url.to_string()).into()
    } else {
        warn!(url = %url, error = %err, "transport error resolving bundle source");
        DownloadFailure::Transport(url.to_string(), err.to_string()).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn classifies_vendor_portal_source() {
        let src = BundleSource::classify("https://vendor.example.com/troubleshoot/analyze/abc:123@v1");
        match src {
            BundleSource::VendorPortal { slug, .. } => assert_eq!(slug, "abc:123@v1"),
            _ => panic!("expected vendor portal classification"),
        }
    }

    #[test]
    fn classifies_generic_url() {
        let src = BundleSource::classify("https://example.com/bundle.tar.gz");
        assert!(matches!(src, BundleSource::Url(_)));
    }

    #[test]
    fn classifies_local_path() {
        let src = BundleSource::classify("/tmp/bundle.tar.gz");
        assert!(matches!(src, BundleSource::Local(_)));
    }

    #[test]
    fn strips_internal_whitespace_from_source() {
        let src = BundleSource::classify("https:// example.com/a.tar.gz");
        assert_eq!(src, BundleSource::Url("https://example.com/a.tar.gz".to_string()));
    }

    #[tokio::test]
    async fn resolve_local_accepts_existing_tarball() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("bundle.tar.gz");
        fs::write(&archive, b"not a real tarball").unwrap();

        let resolver = Resolver::new();
        let settings = Settings::from_env();
        let resolved = resolver
            .resolve(archive.to_str().unwrap(), &settings)
            .await
            .unwrap();
        assert_eq!(resolved, archive);
    }

    #[tokio::test]
    async fn resolve_local_rejects_missing_path() {
        let resolver = Resolver::new();
        let settings = Settings::from_env();
        let err = resolver
            .resolve("/nonexistent/path/bundle.tar.gz", &settings)
            .await
            .unwrap_err();
        assert!(matches!(err, ResolverError::SourceInvalid(_)));
    }

    #[tokio::test]
    async fn resolve_vendor_portal_without_token_fails_fast() {
        let resolver = Resolver::new();
        let mut settings = Settings::from_env();
        settings.sbctl_token = None;
        let err = resolver
            .resolve(
                "https://vendor.example.com/troubleshoot/analyze/some-slug",
                &settings,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ResolverError::AuthRequired));
    }
}
