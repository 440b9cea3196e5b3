use std::path::PathBuf;

use ripline_core::JobId;

use crate::StorageError;

/// Per-job directories under one output root.
#[derive(Debug, Clone)]
pub struct OutputStore {
    root: PathBuf,
    public_prefix: String,
}

impl OutputStore {
    /// `public_prefix` is the URL path the static file layer serves `root` under.
    pub fn new(root: impl Into<PathBuf>, public_prefix: impl Into<String>) -> Self {
        let prefix = public_prefix.into();
        let trimmed = prefix.trim().trim_end_matches('/');
        let public_prefix = if trimmed.is_empty() {
            String::new()
        } else if trimmed.starts_with('/') {
            trimmed.to_string()
        } else {
            format!("/{trimmed}")
        };
        Self {
            root: root.into(),
            public_prefix,
        }
    }

    pub fn job_dir(&self, job_id: JobId) -> PathBuf {
        self.root.join(job_id.to_string())
    }

    /// Create the job's directory. Fails if it already exists, so two jobs
    /// can never share one.
    pub async fn create_job_dir(&self, job_id: JobId) -> Result<PathBuf, StorageError> {
        tokio::fs::create_dir_all(&self.root).await?;
        let dir = self.job_dir(job_id);
        tokio::fs::create_dir(&dir).await?;
        tracing::debug!(%job_id, dir = %dir.display(), "Created job directory");
        Ok(dir)
    }

    /// Remove the job's directory and everything in it. A directory that is
    /// already gone is not an error.
    pub async fn remove_job_dir(&self, job_id: JobId) -> Result<(), StorageError> {
        let dir = self.job_dir(job_id);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => {
                tracing::debug!(%job_id, "Removed job directory");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Public URL path of a file inside the job's directory.
    pub fn download_url(&self, job_id: JobId, filename: &str) -> String {
        format!("{}/{}/{}", self.public_prefix, job_id, filename)
    }
}
