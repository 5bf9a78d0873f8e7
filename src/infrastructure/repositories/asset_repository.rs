use crate::domain::job::CellKey;
use crate::error::{AppError, AppResult};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use uuid::Uuid;

/// Write-once storage for assembled audio
#[async_trait]
pub trait AssetRepository: Send + Sync {
    /// Store the audio for a cell and return its location. Fails if the cell
    /// already has an asset.
    async fn store(&self, job_id: Uuid, key: &CellKey, audio: &[u8]) -> AppResult<String>;
}

/// Stores assets as `{root}/{job_id}/v{variant}_{language}.mp3`
pub struct FileAssetRepository {
    root: PathBuf,
}

impl FileAssetRepository {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, job_id: Uuid, key: &CellKey) -> PathBuf {
        self.root
            .join(job_id.to_string())
            .join(format!("v{}_{}.mp3", key.variant, key.language))
    }
}

#[async_trait]
impl AssetRepository for FileAssetRepository {
    async fn store(&self, job_id: Uuid, key: &CellKey, audio: &[u8]) -> AppResult<String> {
        let path = self.path_for(job_id, key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::AlreadyExists {
                    AppError::Conflict(format!("asset {} already exists", path.display()))
                } else {
                    AppError::from(e)
                }
            })?;
        write_or_discard(&mut file, &path, audio).await?;

        tracing::debug!(
            path = %path.display(),
            audio_size_bytes = audio.len(),
            "Audio asset written"
        );

        Ok(path.to_string_lossy().into_owned())
    }
}

/// Writes the whole asset or removes the partial file
async fn write_or_discard<W>(writer: &mut W, path: &Path, audio: &[u8]) -> AppResult<()>
where
    W: AsyncWrite + Unpin,
{
    let written = match writer.write_all(audio).await {
        Ok(()) => writer.flush().await,
        Err(e) => Err(e),
    };
    if let Err(e) = written {
        if let Err(cleanup) = tokio::fs::remove_file(path).await {
            tracing::warn!(path = %path.display(), error = %cleanup, "Partial asset left on disk");
        }
        return Err(AppError::from(e));
    }
    Ok(())
}
