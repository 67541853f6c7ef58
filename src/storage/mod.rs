use crate::error::Result;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tracing::{debug, info};

/// Destination file for a download, written at arbitrary offsets
pub struct OutputFile {
    path: PathBuf,
    file: File,
}

impl OutputFile {
    /// Create (or truncate) the file and pre-allocate `length` bytes
    pub async fn create<P: AsRef<Path>>(path: P, length: u64) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)
            .await?;
        file.set_len(length).await?;

        info!("Output file {:?} allocated ({} bytes)", path, length);

        Ok(Self { path, file })
    }

    /// Write `data` at byte `offset`
    pub async fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        self.file.seek(std::io::SeekFrom::Start(offset)).await?;
        self.file.write_all(data).await?;

        debug!(
            "Wrote {} bytes to {:?} at offset {}",
            data.len(),
            self.path,
            offset
        );
        Ok(())
    }

    /// Flush buffered writes to disk
    pub async fn finish(mut self) -> Result<()> {
        self.file.flush().await?;
        self.file.sync_all().await?;
        Ok(())
    }
}
