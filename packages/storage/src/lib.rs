//! Local output storage for conversion jobs.
//!
//! Every job gets a private directory under a single output root. The
//! directory holds the utility's raw files while the job runs and the
//! packaged deliverable once it completes. A retention sweep removes
//! directories once they age out.

mod output_store;
mod packager;
mod retention;

pub use output_store::OutputStore;
pub use packager::{MEDIA_EXTENSIONS, Package, is_media_file, package, sanitize_title};
pub use retention::{SweepReport, sweep_expired};

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("no media files found in {0}")]
    NoMediaFiles(String),

    #[error("packaging task failed: {0}")]
    Task(String),
}
