#![allow(clippy::disallowed_methods)]

use std::fs::File;
use std::time::{Duration, SystemTime};

use ripline_core::JobId;
use storage::{OutputStore, StorageError, package, sweep_expired};

#[tokio::test]
async fn single_file_is_renamed_without_archive() -> Result<(), StorageError> {
    let tmp = tempfile::tempdir()?;
    let dir = tmp.path();
    tokio::fs::write(dir.join("Artist - Title.MP3"), b"audio").await?;
    tokio::fs::write(dir.join("spotdl.log"), b"noise").await?;

    let pkg = package(dir, "Demo: Song / Test").await?;

    assert_eq!(pkg.filename, "Demo-Song-Test.mp3");
    assert_eq!(pkg.file_count, 1);
    assert_eq!(pkg.path, dir.join("Demo-Song-Test.mp3"));
    assert_eq!(tokio::fs::read(&pkg.path).await?, b"audio");
    assert!(!dir.join("Artist - Title.MP3").exists());
    assert!(!dir.join("Demo-Song-Test.zip").exists());
    Ok(())
}

#[tokio::test]
async fn several_files_become_one_sorted_archive() -> Result<(), Box<dyn std::error::Error>> {
    let tmp = tempfile::tempdir()?;
    let dir = tmp.path();
    for name in ["b.mp3", "a.flac", "c.m4a"] {
        tokio::fs::write(dir.join(name), name.as_bytes()).await?;
    }
    tokio::fs::write(dir.join("cover.jpg"), b"img").await?;

    let pkg = package(dir, "Road Trip").await?;
    assert_eq!(pkg.filename, "Road-Trip.zip");
    assert_eq!(pkg.file_count, 3);

    let mut archive = zip::ZipArchive::new(File::open(&pkg.path)?)?;
    let names: Vec<String> = archive.file_names().map(str::to_string).collect();
    let mut sorted = names.clone();
    sorted.sort();
    assert_eq!(names.len(), 3);
    assert_eq!(sorted, vec!["a.flac", "b.mp3", "c.m4a"]);
    assert_eq!(archive.by_index(0)?.name(), "a.flac");
    assert_eq!(archive.by_name("b.mp3")?.size(), 5);
    Ok(())
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn archive_keeps_files_with_non_utf8_names() -> Result<(), Box<dyn std::error::Error>> {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let tmp = tempfile::tempdir()?;
    let dir = tmp.path();
    tokio::fs::write(dir.join("a.mp3"), b"a").await?;
    tokio::fs::write(dir.join(OsStr::from_bytes(b"b\xff.mp3")), b"b").await?;

    let pkg = package(dir, "Mixed").await?;
    assert_eq!(pkg.file_count, 2);

    let archive = zip::ZipArchive::new(File::open(&pkg.path)?)?;
    assert_eq!(archive.len(), pkg.file_count);
    assert!(archive.file_names().any(|n| n.starts_with('b') && n.ends_with(".mp3")));
    Ok(())
}

#[tokio::test]
async fn empty_output_is_reported() -> Result<(), StorageError> {
    let tmp = tempfile::tempdir()?;
    tokio::fs::write(tmp.path().join("errors.txt"), b"x").await?;
    let result = package(tmp.path(), "Nothing").await;
    assert!(matches!(result, Err(StorageError::NoMediaFiles(_))));
    Ok(())
}

#[tokio::test]
async fn sweep_removes_only_expired_entries() -> Result<(), StorageError> {
    let tmp = tempfile::tempdir()?;
    let store = OutputStore::new(tmp.path(), "/downloads");
    let old = store.create_job_dir(JobId::new()).await?;
    tokio::fs::write(old.join("a.mp3"), b"x").await?;
    tokio::fs::write(tmp.path().join("stray.zip"), b"x").await?;

    let retention = Duration::from_secs(300);

    // Everything is fresh right now.
    let report = sweep_expired(tmp.path(), retention, SystemTime::now()).await?;
    assert_eq!(report.scanned, 2);
    assert_eq!(report.removed, 0);
    assert!(old.exists());

    // Ten minutes later both entries are past the window.
    let later = SystemTime::now() + Duration::from_secs(600);
    let report = sweep_expired(tmp.path(), retention, later).await?;
    assert_eq!(report.removed, 2);
    assert_eq!(report.failed, 0);
    assert!(!old.exists());
    assert!(!tmp.path().join("stray.zip").exists());
    Ok(())
}

#[tokio::test]
async fn sweep_of_missing_root_is_a_no_op() -> Result<(), StorageError> {
    let tmp = tempfile::tempdir()?;
    let report = sweep_expired(
        &tmp.path().join("never-created"),
        Duration::from_secs(1),
        SystemTime::now(),
    )
    .await?;
    assert_eq!(report, storage::SweepReport::default());
    Ok(())
}
