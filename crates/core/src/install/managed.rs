//! Installing managed tool versions.

use std::sync::Arc;

use futures::FutureExt;
use tracing::info;

use super::config::{is_valid_version_dir, DownloadConfig};
use super::download::{DownloadHandle, DownloadJob};
use super::error::InstallError;
use super::resolver::ToolResolver;
use super::source::DownloadSource;
use super::types::Tool;

/// Downloads and expands `version` of `tool` into the managed root.
///
/// The package lands in `<managed_root>/<tool>/<version>/`. The resolver's
/// cached record for `tool` is invalidated before the job reports DONE, so a
/// resolution made after observing DONE sees the new install.
///
/// `version` must be a single directory name (see [`is_valid_version_dir`]).
pub async fn install_managed(
    resolver: Arc<ToolResolver>,
    tool: Tool,
    version: &str,
    source: Arc<dyn DownloadSource>,
    config: DownloadConfig,
) -> Result<DownloadHandle, InstallError> {
    if !is_valid_version_dir(version) {
        return Err(InstallError::InvalidVersion {
            version: version.to_string(),
        });
    }

    let tools = resolver.config().await;
    let target = tools
        .managed_dir(tool, version)
        .ok_or_else(|| InstallError::not_configured("tools.managed_root is not set"))?;

    info!("Installing {} {} into {}", tool, version, target.display());
    let job = DownloadJob::new(source, target, config).on_complete(Box::new(move || {
        async move { resolver.invalidate(tool).await }.boxed()
    }));

    Ok(job.start())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::install::{DownloadState, InstallSource, ToolsConfig};
    use crate::testing::{corrupt_zip_archive, zip_archive, ScriptedSource};

    #[cfg(unix)]
    fn write_script(path: &std::path::Path, body: &str) {
        use std::os::unix::fs::PermissionsExt;
        std::fs::write(path, body).unwrap();
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[tokio::test]
    async fn test_install_then_resolve() {
        let root = tempfile::tempdir().unwrap();
        let binary = format!("bin/{}", Tool::Ffprobe.binary_name());
        let package = zip_archive(&[(binary.as_str(), "probe")]).unwrap();

        let resolver = Arc::new(ToolResolver::new(ToolsConfig {
            ffprobe_version: Some("7.1".to_string()),
            managed_root: Some(root.path().to_path_buf()),
            ..Default::default()
        }));

        let handle = install_managed(
            Arc::clone(&resolver),
            Tool::Ffprobe,
            "7.1",
            Arc::new(ScriptedSource::from_bytes(&package, 32)),
            DownloadConfig::default(),
        )
        .await
        .unwrap();

        assert_eq!(handle.wait().await.state, DownloadState::Done);

        let record = resolver.resolve(Tool::Ffprobe).await.unwrap();
        assert_eq!(record.source, InstallSource::Managed);
        assert_eq!(record.version, "7.1");
        assert_eq!(
            resolver.list_managed_versions(Tool::Ffprobe).await.unwrap(),
            vec!["7.1"]
        );
    }

    #[tokio::test]
    async fn test_requires_managed_root() {
        let resolver = Arc::new(ToolResolver::new(ToolsConfig::default()));
        let err = install_managed(
            resolver,
            Tool::Ffmpeg,
            "7.0",
            Arc::new(ScriptedSource::default()),
            DownloadConfig::default(),
        )
        .await
        .unwrap_err();
        assert!(err.is_configuration());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_done_implies_fresh_resolution() {
        let managed = tempfile::tempdir().unwrap();
        let local = tempfile::tempdir().unwrap();
        write_script(
            &local.path().join(Tool::Ffprobe.binary_name()),
            "#!/bin/sh\necho \"ffprobe version 6.0-local\"\n",
        );

        let resolver = Arc::new(ToolResolver::new(ToolsConfig {
            ffprobe_version: Some("7.1".to_string()),
            managed_root: Some(managed.path().to_path_buf()),
            local_root: Some(local.path().to_path_buf()),
            ..Default::default()
        }));
        let record = resolver.resolve(Tool::Ffprobe).await.unwrap();
        assert_eq!(record.source, InstallSource::Local);

        let binary = format!("bin/{}", Tool::Ffprobe.binary_name());
        let package = zip_archive(&[(binary.as_str(), "probe")]).unwrap();
        let handle = install_managed(
            Arc::clone(&resolver),
            Tool::Ffprobe,
            "7.1",
            Arc::new(ScriptedSource::from_bytes(&package, 32)),
            DownloadConfig::default(),
        )
        .await
        .unwrap();
        assert_eq!(handle.wait().await.state, DownloadState::Done);

        // No retry: the cached local record is gone by the time DONE is visible.
        let record = resolver.resolve(Tool::Ffprobe).await.unwrap();
        assert_eq!(record.source, InstallSource::Managed);
        assert_eq!(record.version, "7.1");
    }

    #[tokio::test]
    async fn test_rejects_version_outside_managed_root() {
        let root = tempfile::tempdir().unwrap();
        let managed = root.path().join("managed");
        let resolver = Arc::new(ToolResolver::new(ToolsConfig {
            managed_root: Some(managed.clone()),
            ..Default::default()
        }));
        let package = zip_archive(&[("bin/ffmpeg", "x")]).unwrap();

        for version in ["../../escaped", "..", ".", "", "7.1/../../x", "a\\b", ".hidden"] {
            let source = Arc::new(ScriptedSource::from_bytes(&package, 32));
            let err = install_managed(
                Arc::clone(&resolver),
                Tool::Ffmpeg,
                version,
                Arc::clone(&source) as Arc<dyn DownloadSource>,
                DownloadConfig::default(),
            )
            .await
            .unwrap_err();
            assert!(matches!(err, InstallError::InvalidVersion { .. }), "{}", version);
            assert!(err.is_configuration());
            assert_eq!(source.open_count(), 0);
        }

        // Nothing was created anywhere under the scratch root.
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_failed_install_does_not_resolve_as_managed() {
        let root = tempfile::tempdir().unwrap();
        let resolver = Arc::new(ToolResolver::new(ToolsConfig {
            ffmpeg_version: Some("7.1".to_string()),
            managed_root: Some(root.path().to_path_buf()),
            ..Default::default()
        }));

        // bin/ffmpeg is extracted before the trailing entry fails.
        let package = corrupt_zip_archive(&[("bin/ffmpeg", "#!/bin/sh\n")]).unwrap();

        let handle = install_managed(
            Arc::clone(&resolver),
            Tool::Ffmpeg,
            "7.1",
            Arc::new(ScriptedSource::from_bytes(&package, 32)),
            DownloadConfig::default(),
        )
        .await
        .unwrap();
        assert_eq!(handle.wait().await.state, DownloadState::Failed);

        assert!(!root.path().join("ffmpeg/7.1").exists());
        assert!(resolver.list_managed_versions(Tool::Ffmpeg).await.unwrap().is_empty());
        if let Ok(record) = resolver.resolve(Tool::Ffmpeg).await {
            assert_ne!(record.source, InstallSource::Managed);
        }
    }
}
