//! On-disk token persistence shared across processes
//!
//! Tokens live in a `.pb.tokens` JSON file. Reads walk a fixed list of
//! locations and take the first file holding an unexpired token. Writes go to
//! a temporary sibling that is renamed over the target, so a reader never sees
//! a half-written file. Concurrent writers are not coordinated: the last
//! rename wins.

use crate::auth::TokenCache;
use crate::error::{ProductboardError, Result};
use chrono::{DateTime, Utc};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info};

/// File name searched for in every well-known location
pub const TOKEN_FILE_NAME: &str = ".pb.tokens";

/// Serialized token file contents
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedTokens {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl PersistedTokens {
    /// Snapshot a token cache; `None` when there is nothing worth persisting
    pub fn from_cache(cache: &TokenCache) -> Option<Self> {
        let access_token = cache.access_token.as_ref()?.expose_secret().clone();
        let expires_at = cache.expires_at?;
        let now = Utc::now();
        Some(Self {
            access_token,
            refresh_token: cache.refresh_token.as_ref().map(|t| t.expose_secret().clone()),
            expires_at,
            created_at: Some(now),
            updated_at: Some(now),
        })
    }

    /// Convert back into an in-memory cache entry
    pub fn into_cache(self) -> TokenCache {
        TokenCache::new(self.access_token, self.refresh_token, Some(self.expires_at))
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

/// Locator and writer for the token file
#[derive(Debug)]
pub struct TokenFile {
    configured: Option<PathBuf>,
    loaded_from: Mutex<Option<PathBuf>>,
}

impl TokenFile {
    /// Create a locator; `configured` is searched first and always used for writes
    pub fn new(configured: Option<PathBuf>) -> Self {
        Self {
            configured,
            loaded_from: Mutex::new(None),
        }
    }

    /// Candidate paths in priority order: configured, working directory,
    /// executable directory, home directory
    pub fn candidates(&self) -> Vec<PathBuf> {
        let mut paths = Vec::new();
        if let Some(path) = &self.configured {
            paths.push(path.clone());
        }
        if let Ok(cwd) = std::env::current_dir() {
            paths.push(cwd.join(TOKEN_FILE_NAME));
        }
        if let Some(exe_dir) = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
        {
            paths.push(exe_dir.join(TOKEN_FILE_NAME));
        }
        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(TOKEN_FILE_NAME));
        }
        paths.dedup();
        paths
    }

    /// Where the next `save` will write
    pub fn target_path(&self) -> PathBuf {
        if let Some(path) = &self.configured {
            return path.clone();
        }
        let loaded = self
            .loaded_from
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone();
        loaded.unwrap_or_else(|| {
            std::env::current_dir()
                .unwrap_or_else(|_| PathBuf::from("."))
                .join(TOKEN_FILE_NAME)
        })
    }

    /// First candidate holding a token that has not expired yet
    pub async fn load(&self) -> Option<PersistedTokens> {
        self.load_from(self.candidates()).await
    }

    async fn load_from(&self, paths: Vec<PathBuf>) -> Option<PersistedTokens> {
        let now = Utc::now();
        for path in paths {
            let content = match tokio::fs::read_to_string(&path).await {
                Ok(content) => content,
                Err(e) => {
                    debug!("Token file {} not readable: {}", path.display(), e);
                    continue;
                }
            };

            let tokens: PersistedTokens = match serde_json::from_str(&content) {
                Ok(tokens) => tokens,
                Err(e) => {
                    debug!("Ignoring malformed token file {}: {}", path.display(), e);
                    continue;
                }
            };

            if !tokens.is_valid_at(now) {
                debug!(
                    "Ignoring expired token file {} (expired at {})",
                    path.display(),
                    tokens.expires_at
                );
                continue;
            }

            info!("Loaded persisted OAuth2 tokens from {}", path.display());
            *self.loaded_from.lock().unwrap_or_else(|p| p.into_inner()) = Some(path);
            return Some(tokens);
        }
        None
    }

    /// Write tokens via temp file + rename; keeps `createdAt` of an existing file
    pub async fn save(&self, tokens: &PersistedTokens) -> Result<PathBuf> {
        let path = self.target_path();
        let mut tokens = tokens.clone();

        if let Ok(existing) = tokio::fs::read_to_string(&path).await {
            if let Ok(previous) = serde_json::from_str::<PersistedTokens>(&existing) {
                if previous.created_at.is_some() {
                    tokens.created_at = previous.created_at;
                }
            }
        }
        tokens.updated_at = Some(Utc::now());

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| ProductboardError::config(format!("Invalid token file path {}", path.display())))?;
        let temp_path = path.with_file_name(format!("{}.{}.tmp", file_name, uuid::Uuid::new_v4().simple()));

        let content = serde_json::to_string_pretty(&tokens)?;
        tokio::fs::write(&temp_path, content).await?;
        set_owner_only(&temp_path).await?;

        if let Err(e) = tokio::fs::rename(&temp_path, &path).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(e.into());
        }

        debug!("Persisted OAuth2 tokens to {}", path.display());
        Ok(path)
    }
}

#[cfg(unix)]
async fn set_owner_only(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut permissions = tokio::fs::metadata(path).await?.permissions();
    permissions.set_mode(0o600);
    tokio::fs::set_permissions(path, permissions).await?;
    Ok(())
}

#[cfg(not(unix))]
async fn set_owner_only(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::TempDir;

    fn sample(expires_in: Duration) -> PersistedTokens {
        PersistedTokens {
            access_token: "access".to_string(),
            refresh_token: Some("refresh".to_string()),
            expires_at: Utc::now() + expires_in,
            created_at: None,
            updated_at: None,
        }
    }

    #[tokio::test]
    async fn test_save_then_load_from_configured_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tokens.json");
        let file = TokenFile::new(Some(path.clone()));

        let written = file.save(&sample(Duration::hours(1))).await.unwrap();
        assert_eq!(written, path);

        let raw: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["accessToken"], "access");
        assert_eq!(raw["refreshToken"], "refresh");
        assert!(raw["expiresAt"].is_string());
        assert!(raw["updatedAt"].is_string());

        let loaded = file.load().await.unwrap();
        assert_eq!(loaded.access_token, "access");
        assert_eq!(loaded.refresh_token.as_deref(), Some("refresh"));
    }

    #[tokio::test]
    async fn test_expired_and_malformed_files_are_skipped() {
        let dir = TempDir::new().unwrap();
        let expired = dir.path().join("expired.json");
        let malformed = dir.path().join("malformed.json");
        let valid = dir.path().join("valid.json");
        std::fs::write(&expired, serde_json::to_string(&sample(Duration::hours(-1))).unwrap()).unwrap();
        std::fs::write(&malformed, "{not json").unwrap();
        let mut fresh = sample(Duration::hours(1));
        fresh.access_token = "fresh".to_string();
        std::fs::write(&valid, serde_json::to_string(&fresh).unwrap()).unwrap();

        let file = TokenFile::new(None);
        let loaded = file
            .load_from(vec![dir.path().join("missing.json"), expired.clone(), malformed, valid.clone()])
            .await
            .unwrap();
        assert_eq!(loaded.access_token, "fresh");
        assert_eq!(file.target_path(), valid);

        let file = TokenFile::new(None);
        assert!(file.load_from(vec![expired]).await.is_none());
    }

    #[tokio::test]
    async fn test_save_leaves_no_temp_files() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(TOKEN_FILE_NAME);
        let file = TokenFile::new(Some(path));

        file.save(&sample(Duration::hours(1))).await.unwrap();
        file.save(&sample(Duration::hours(2))).await.unwrap();

        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_saved_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join(TOKEN_FILE_NAME);
        let file = TokenFile::new(Some(path.clone()));
        file.save(&sample(Duration::hours(1))).await.unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_configured_path_is_searched_first() {
        let file = TokenFile::new(Some(PathBuf::from("/tmp/custom.tokens")));
        let candidates = file.candidates();
        assert_eq!(candidates[0], PathBuf::from("/tmp/custom.tokens"));
        assert!(candidates[1..].iter().all(|p| p.ends_with(TOKEN_FILE_NAME)));
    }
}
