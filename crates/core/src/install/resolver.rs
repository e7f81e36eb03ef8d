//! Binary resolution across managed, local and system installs.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::config::{is_valid_version_dir, ToolsConfig};
use super::error::InstallError;
use super::types::{InstallRecord, InstallSource, Tool};
use super::version::probe_version;

/// Resolves which binary to invoke for each [`Tool`], caching the result.
///
/// Create one per process and share it behind an `Arc`. The cache only
/// changes through [`invalidate`](Self::invalidate),
/// [`invalidate_all`](Self::invalidate_all) and
/// [`update_config`](Self::update_config).
#[derive(Debug, Default)]
pub struct ToolResolver {
    config: RwLock<ToolsConfig>,
    cache: RwLock<HashMap<Tool, InstallRecord>>,
}

impl ToolResolver {
    pub fn new(config: ToolsConfig) -> Self {
        Self {
            config: RwLock::new(config),
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Current settings.
    pub async fn config(&self) -> ToolsConfig {
        self.config.read().await.clone()
    }

    /// Replaces the settings and drops every cached record.
    pub async fn update_config(&self, config: ToolsConfig) {
        *self.config.write().await = config;
        self.invalidate_all().await;
    }

    /// Drops the cached record for `tool`.
    pub async fn invalidate(&self, tool: Tool) {
        if self.cache.write().await.remove(&tool).is_some() {
            debug!("Invalidated cached {} install", tool);
        }
    }

    /// Drops every cached record.
    pub async fn invalidate_all(&self) {
        self.cache.write().await.clear();
    }

    /// Cached record for `tool`, without resolving.
    pub async fn cached(&self, tool: Tool) -> Option<InstallRecord> {
        self.cache.read().await.get(&tool).cloned()
    }

    /// Path of the binary for `tool`.
    pub async fn binary_path(&self, tool: Tool) -> Result<PathBuf, InstallError> {
        Ok(self.resolve(tool).await?.path)
    }

    /// Resolves `tool`: managed install, then local install, then `PATH`.
    pub async fn resolve(&self, tool: Tool) -> Result<InstallRecord, InstallError> {
        if let Some(record) = self.cached(tool).await {
            return Ok(record);
        }

        let config = self.config().await;
        let record = match resolve_uncached(&config, tool).await {
            Some(record) => record,
            None => {
                warn!("No usable {} binary found", tool);
                return Err(InstallError::NotResolved { tool });
            }
        };

        info!(
            "Resolved {} {} ({}) at {}",
            tool,
            record.version,
            record.source,
            record.path.display()
        );
        self.cache.write().await.insert(tool, record.clone());
        Ok(record)
    }

    /// Versions installed under the managed root for `tool`, sorted.
    pub async fn list_managed_versions(&self, tool: Tool) -> Result<Vec<String>, InstallError> {
        let config = self.config().await;
        let Some(root) = config.managed_root else {
            return Ok(Vec::new());
        };

        let tool_dir = root.join(tool.as_str());
        let mut entries = match tokio::fs::read_dir(&tool_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut versions = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let dir = entry.path();
            let Some(version) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if version.starts_with('.') {
                continue;
            }
            if find_binary(&dir, tool).is_some() {
                versions.push(version);
            }
        }
        versions.sort();
        Ok(versions)
    }
}

async fn resolve_uncached(config: &ToolsConfig, tool: Tool) -> Option<InstallRecord> {
    if let Some(record) = resolve_managed(config, tool) {
        return Some(record);
    }

    if let Some(root) = &config.local_root {
        match find_binary(root, tool) {
            Some(path) => match probe_version(&path).await {
                Ok(version) => {
                    return Some(InstallRecord {
                        path,
                        version,
                        source: InstallSource::Local,
                    })
                }
                Err(e) => warn!("Ignoring local {}: {}", tool, e),
            },
            None => debug!("No {} in local root {}", tool, root.display()),
        }
    }

    match which::which(tool.binary_name()) {
        Ok(path) => match probe_version(&path).await {
            Ok(version) => Some(InstallRecord {
                path,
                version,
                source: InstallSource::System,
            }),
            Err(e) => {
                warn!("Ignoring {} on PATH: {}", tool, e);
                None
            }
        },
        Err(e) => {
            debug!("{} not on PATH: {}", tool, e);
            None
        }
    }
}

/// Managed installs are trusted without a probe; the version is the recorded one.
fn resolve_managed(config: &ToolsConfig, tool: Tool) -> Option<InstallRecord> {
    let version = config.default_version(tool)?;
    if !is_valid_version_dir(version) {
        warn!("Ignoring managed {} version '{}'", tool, version);
        return None;
    }
    let dir = config.managed_dir(tool, version)?;
    match find_binary(&dir, tool) {
        Some(path) => Some(InstallRecord {
            path,
            version: version.to_string(),
            source: InstallSource::Managed,
        }),
        None => {
            debug!("Managed {} {} not installed at {}", tool, version, dir.display());
            None
        }
    }
}

/// Looks for the binary in `dir/bin/` and then `dir/`.
fn find_binary(dir: &Path, tool: Tool) -> Option<PathBuf> {
    let name = tool.binary_name();
    [dir.join("bin").join(&name), dir.join(&name)]
        .into_iter()
        .find(|candidate| candidate.is_file())
}
