use std::path::Path;

use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Token material persisted between process runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct CachedToken {
    pub id_token: String,
    pub refresh_token: String,
    /// Seconds since the Unix epoch.
    pub expires_at: u64,
}

/// Read the cache file. A missing or unreadable cache is treated as empty.
pub(crate) fn load(path: &Path) -> Option<CachedToken> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return None,
        Err(error) => {
            tracing::warn!(path = %path.display(), %error, "failed to read token cache");
            return None;
        }
    };
    serde_json::from_slice(&bytes)
        .inspect_err(|error| {
            tracing::warn!(path = %path.display(), %error, "ignoring corrupt token cache");
        })
        .ok()
}

/// Write the cache file, owner-only on unix.
pub(crate) async fn save(path: &Path, token: &CachedToken) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let json = serde_json::to_vec_pretty(token)?;

    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(OWNER_ONLY);
    let mut file = options.open(path).await?;
    // `mode` only applies to newly created files.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, std::fs::Permissions::from_mode(OWNER_ONLY)).await?;
    }
    file.write_all(&json).await?;
    file.flush().await?;
    Ok(())
}

#[cfg(unix)]
const OWNER_ONLY: u32 = 0o600;

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_path() -> std::path::PathBuf {
        std::env::temp_dir()
            .join(format!("sesame-cache-{}", uuid::Uuid::new_v4()))
            .join("token.json")
    }

    #[tokio::test]
    async fn saved_token_loads_back() {
        let path = scratch_path();
        let token = CachedToken {
            id_token: "id".into(),
            refresh_token: "refresh".into(),
            expires_at: 1_700_000_000,
        };

        save(&path, &token).await.unwrap();
        assert_eq!(load(&path), Some(token));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn cache_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let path = scratch_path();
        fs::create_dir_all(path.parent().unwrap()).await.unwrap();
        fs::write(&path, b"{}").await.unwrap();
        fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644))
            .await
            .unwrap();

        let token = CachedToken {
            id_token: "id".into(),
            refresh_token: "refresh".into(),
            expires_at: 1,
        };
        save(&path, &token).await.unwrap();

        let mode = fs::metadata(&path).await.unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert_eq!(load(&path), Some(token));
    }

    #[test]
    fn missing_cache_is_empty() {
        assert_eq!(load(&scratch_path()), None);
    }

    #[tokio::test]
    async fn corrupt_cache_is_ignored() {
        let path = scratch_path();
        fs::create_dir_all(path.parent().unwrap()).await.unwrap();
        fs::write(&path, b"{not json").await.unwrap();
        assert_eq!(load(&path), None);
    }
}
