//! Turns a job's raw output into one deliverable file.

use std::fs::File;
use std::path::{Path, PathBuf};

use zip::CompressionMethod;
use zip::write::{SimpleFileOptions, ZipWriter};

use crate::StorageError;

/// File extensions treated as converted media. Everything else in the
/// directory (logs, sidecars, partial downloads) is ignored.
pub const MEDIA_EXTENSIONS: &[&str] = &["mp3", "flac", "m4a", "opus", "ogg", "wav"];

const MAX_TITLE_CHARS: usize = 120;
const FALLBACK_TITLE: &str = "download";

/// The packaged deliverable of a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
    pub path: PathBuf,
    pub filename: String,
    pub file_count: usize,
}

pub fn is_media_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            MEDIA_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(ext))
        })
}

/// Filesystem-safe form of a display title.
///
/// Characters other than alphanumerics, space, `-` and `_` are dropped and
/// whitespace runs become a single `-`.
pub fn sanitize_title(title: &str) -> String {
    let kept: String = title
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '-' | '_') {
                c
            } else {
                ' '
            }
        })
        .collect();

    let joined = kept
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-");
    let capped: String = joined.chars().take(MAX_TITLE_CHARS).collect();
    let trimmed = capped.trim_matches(|c| c == '-' || c == '_');

    if trimmed.is_empty() {
        FALLBACK_TITLE.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Package the media files in `dir` under a name derived from `title`.
///
/// One file is renamed in place. Several are zipped into one archive,
/// which is flushed and synced before this returns.
pub async fn package(dir: &Path, title: &str) -> Result<Package, StorageError> {
    let mut media = list_media(dir).await?;
    let stem = sanitize_title(title);

    match media.len() {
        0 => Err(StorageError::NoMediaFiles(dir.display().to_string())),
        1 => {
            let source = media.remove(0);
            let ext = source
                .extension()
                .and_then(|e| e.to_str())
                .map(str::to_ascii_lowercase)
                .unwrap_or_default();
            let filename = format!("{stem}.{ext}");
            let path = dir.join(&filename);
            tokio::fs::rename(&source, &path).await?;
            tracing::debug!(file = %filename, "Packaged single file");
            Ok(Package {
                path,
                filename,
                file_count: 1,
            })
        }
        count => {
            let filename = format!("{stem}.zip");
            let path = dir.join(&filename);
            let archive_path = path.clone();
            tokio::task::spawn_blocking(move || write_archive(&archive_path, &media))
                .await
                .map_err(|e| StorageError::Task(e.to_string()))??;
            tracing::debug!(file = %filename, files = count, "Packaged archive");
            Ok(Package {
                path,
                filename,
                file_count: count,
            })
        }
    }
}

/// Media files directly inside `dir`, sorted by name.
async fn list_media(dir: &Path) -> Result<Vec<PathBuf>, StorageError> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut media = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if entry.file_type().await?.is_file() && is_media_file(&path) {
            media.push(path);
        }
    }
    media.sort();
    Ok(media)
}

fn write_archive(archive: &Path, files: &[PathBuf]) -> Result<(), StorageError> {
    let mut writer = ZipWriter::new(File::create(archive)?);
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(zip::DateTime::default());

    for file in files {
        let Some(name) = file.file_name() else {
            continue;
        };
        writer.start_file(name.to_string_lossy(), options)?;
        let mut source = File::open(file)?;
        std::io::copy(&mut source, &mut writer)?;
    }

    let out = writer.finish()?;
    out.sync_all()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::disallowed_methods)]

    use super::*;

    #[test]
    fn sanitized_titles_are_filesystem_safe() {
        let name = sanitize_title("Demo: Song / Test");
        assert_eq!(name, "Demo-Song-Test");
        assert!(!name.contains(':') && !name.contains('/'));

        assert_eq!(sanitize_title("  spaced   out  "), "spaced-out");
        assert_eq!(sanitize_title("keep_under-score"), "keep_under-score");
        assert_eq!(sanitize_title("../../etc/passwd"), "etc-passwd");
        assert_eq!(sanitize_title("???"), "download");
        assert_eq!(sanitize_title(""), "download");
        assert_eq!(sanitize_title(&"a".repeat(500)).len(), MAX_TITLE_CHARS);
    }

    #[test]
    fn media_detection_is_case_insensitive() {
        assert!(is_media_file(Path::new("a.mp3")));
        assert!(is_media_file(Path::new("a.FLAC")));
        assert!(is_media_file(Path::new("dir/a.m4a")));
        assert!(!is_media_file(Path::new("a.lrc")));
        assert!(!is_media_file(Path::new("a.zip")));
        assert!(!is_media_file(Path::new("mp3")));
    }
}
