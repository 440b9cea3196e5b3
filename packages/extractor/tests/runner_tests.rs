#![cfg(unix)]
#![allow(clippy::disallowed_methods)]

use std::error::Error;
use std::time::Duration;

use extractor::Extractor;
use ripline_core::{ExtractorSettings, JobError, ProgressSink, ProgressUpdate, Stage};
use tokio_util::sync::CancellationToken;

const TWO_TRACKS: &str = r#"
if [ "$1" = "--version" ]; then echo "4.2.5"; exit 0; fi
out="$3"
echo "Found 2 songs in Demo (Album)"
echo 'Downloading "A - One"'
printf 'one' > "$out/one.mp3"
echo 'Downloaded "A - One": https://music.example/1'
echo 'Downloading "B - Two"'
printf 'two' > "$out/two.mp3"
echo 'Downloaded "B - Two": https://music.example/2'
"#;

/// Settings that run `script` through `sh -c`; positional args start at `$1`.
fn fake_tool(script: &str) -> ExtractorSettings {
    ExtractorSettings {
        program: "sh".to_string(),
        base_args: vec!["-c".into(), script.into(), "fake-spotdl".into()],
        probe_timeout: Duration::from_secs(5),
        ..ExtractorSettings::default()
    }
}

#[tokio::test]
async fn probe_reports_version() -> Result<(), Box<dyn Error>> {
    let extractor = Extractor::new(fake_tool(TWO_TRACKS))?;
    assert_eq!(extractor.probe().await?, "4.2.5");
    Ok(())
}

#[tokio::test]
async fn probe_fails_for_missing_program() -> Result<(), Box<dyn Error>> {
    let settings = ExtractorSettings {
        program: "/definitely/not/installed/spotdl".into(),
        base_args: Vec::new(),
        ..ExtractorSettings::default()
    };
    let extractor = Extractor::new(settings)?;
    assert!(matches!(
        extractor.probe().await,
        Err(JobError::Configuration(_))
    ));
    Ok(())
}

#[tokio::test]
async fn probe_fails_on_nonzero_exit() -> Result<(), Box<dyn Error>> {
    let extractor = Extractor::new(fake_tool("exit 3"))?;
    match extractor.probe().await {
        Err(JobError::Configuration(msg)) => assert!(msg.contains("exit code 3")),
        other => panic!("unexpected probe result: {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn run_streams_progress_and_summarizes() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let extractor = Extractor::new(fake_tool(TWO_TRACKS))?;
    let mut updates: Vec<ProgressUpdate> = Vec::new();

    let summary = extractor
        .run(
            "https://open.example/album/1",
            dir.path(),
            &mut updates,
            &CancellationToken::new(),
            Duration::from_secs(10),
        )
        .await?;

    assert_eq!(summary.total_tracks, 2);
    assert_eq!(summary.completed_tracks, 2);
    assert!(dir.path().join("one.mp3").exists());
    assert!(dir.path().join("two.mp3").exists());

    let stages: Vec<Stage> = updates.iter().map(|u| u.stage).collect();
    assert_eq!(
        stages,
        vec![
            Stage::Parsing,
            Stage::Downloading,
            Stage::Downloading,
            Stage::Downloading,
            Stage::Downloading
        ]
    );
    let progress: Vec<f64> = updates.iter().map(|u| u.progress).collect();
    assert_eq!(progress, vec![10.0, 10.0, 50.0, 50.0, 90.0]);
    assert!(updates.iter().all(|u| u.completed_tracks <= u.total_tracks));
    Ok(())
}

#[tokio::test]
async fn carriage_return_fragments_are_parsed() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let script = r#"printf 'Found 1 song\rDownloading "Solo"\rDownloaded "Solo"\n'"#;
    let extractor = Extractor::new(fake_tool(script))?;
    let mut updates: Vec<ProgressUpdate> = Vec::new();

    let summary = extractor
        .run(
            "ref",
            dir.path(),
            &mut updates,
            &CancellationToken::new(),
            Duration::from_secs(10),
        )
        .await?;

    assert_eq!(summary.completed_tracks, 1);
    assert_eq!(updates.len(), 3);
    assert_eq!(updates[2].progress, 90.0);
    Ok(())
}

/// Records when each update arrived.
struct TimedSink {
    started: std::time::Instant,
    seen: Vec<(Duration, Stage)>,
}

impl ProgressSink for TimedSink {
    fn emit(&mut self, update: ProgressUpdate) {
        self.seen.push((self.started.elapsed(), update.stage));
    }
}

#[tokio::test]
async fn redrawn_progress_is_reported_before_the_line_ends() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let script = r#"printf 'Found 1 song\r'; sleep 2; printf 'Downloaded "a"\n'"#;
    let extractor = Extractor::new(fake_tool(script))?;
    let mut sink = TimedSink {
        started: std::time::Instant::now(),
        seen: Vec::new(),
    };

    extractor
        .run(
            "ref",
            dir.path(),
            &mut sink,
            &CancellationToken::new(),
            Duration::from_secs(10),
        )
        .await?;

    assert_eq!(sink.seen.len(), 2);
    let (parsed_at, stage) = sink.seen[0];
    assert_eq!(stage, Stage::Parsing);
    assert!(sink.seen[1].0 - parsed_at >= Duration::from_secs(1));
    Ok(())
}

/// Writes about 120 KiB of warnings to stderr.
const NOISY_STDERR: &str = r#"
i=0
while [ $i -lt 1600 ]; do
  echo "WARNING: retrying request number $i after a slow response from the provider" >&2
  i=$((i+1))
done
"#;

#[tokio::test]
async fn long_stderr_is_drained_without_failing_the_run() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let script = format!("{NOISY_STDERR}\nprintf x > \"$3/a.mp3\"\nexit 0");
    let extractor = Extractor::new(fake_tool(&script))?;
    let mut updates: Vec<ProgressUpdate> = Vec::new();

    extractor
        .run(
            "ref",
            dir.path(),
            &mut updates,
            &CancellationToken::new(),
            Duration::from_secs(30),
        )
        .await?;

    assert!(dir.path().join("a.mp3").exists());
    Ok(())
}

#[tokio::test]
async fn marker_after_long_stderr_is_still_seen() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let script = format!("{NOISY_STDERR}\necho 'LookupError: nothing left' >&2\nexit 0");
    let extractor = Extractor::new(fake_tool(&script))?;
    let mut updates: Vec<ProgressUpdate> = Vec::new();

    let result = extractor
        .run(
            "ref",
            dir.path(),
            &mut updates,
            &CancellationToken::new(),
            Duration::from_secs(30),
        )
        .await;

    match result {
        Err(JobError::ConversionFailed {
            exit_code: Some(0),
            diagnostics,
        }) => assert!(diagnostics.ends_with("LookupError: nothing left")),
        other => panic!("unexpected run result: {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn nonzero_exit_is_a_conversion_failure() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let script = r#"echo "LookupError: no results for $1" >&2; exit 1"#;
    let extractor = Extractor::new(fake_tool(script))?;
    let mut updates: Vec<ProgressUpdate> = Vec::new();

    let result = extractor
        .run(
            "missing-ref",
            dir.path(),
            &mut updates,
            &CancellationToken::new(),
            Duration::from_secs(10),
        )
        .await;

    match result {
        Err(JobError::ConversionFailed {
            exit_code,
            diagnostics,
        }) => {
            assert_eq!(exit_code, Some(1));
            assert!(diagnostics.contains("LookupError: no results for missing-ref"));
        }
        other => panic!("unexpected run result: {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn error_marker_fails_a_clean_exit() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let script = r#"echo "AudioProviderError: YT-DLP download error" >&2; exit 0"#;
    let extractor = Extractor::new(fake_tool(script))?;
    let mut updates: Vec<ProgressUpdate> = Vec::new();

    let result = extractor
        .run(
            "ref",
            dir.path(),
            &mut updates,
            &CancellationToken::new(),
            Duration::from_secs(10),
        )
        .await;
    assert!(matches!(
        result,
        Err(JobError::ConversionFailed {
            exit_code: Some(0),
            ..
        })
    ));
    Ok(())
}

#[tokio::test]
async fn harmless_stderr_does_not_fail_the_run() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let script = r#"echo "WARNING: slow provider" >&2; exit 0"#;
    let extractor = Extractor::new(fake_tool(script))?;
    let mut updates: Vec<ProgressUpdate> = Vec::new();

    let summary = extractor
        .run(
            "ref",
            dir.path(),
            &mut updates,
            &CancellationToken::new(),
            Duration::from_secs(10),
        )
        .await?;
    assert_eq!(summary.completed_tracks, 0);
    assert!(updates.is_empty());
    Ok(())
}

#[tokio::test]
async fn deadline_kills_a_hung_process() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let extractor = Extractor::new(fake_tool("exec sleep 30"))?;
    let mut updates: Vec<ProgressUpdate> = Vec::new();

    let started = std::time::Instant::now();
    let result = extractor
        .run(
            "ref",
            dir.path(),
            &mut updates,
            &CancellationToken::new(),
            Duration::from_millis(200),
        )
        .await;

    assert_eq!(result, Err(JobError::Timeout(Duration::from_millis(200))));
    assert!(started.elapsed() < Duration::from_secs(10));
    Ok(())
}

#[tokio::test]
async fn cancellation_stops_the_process() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let extractor = Extractor::new(fake_tool("exec sleep 30"))?;
    let mut updates: Vec<ProgressUpdate> = Vec::new();
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let result = extractor
        .run(
            "ref",
            dir.path(),
            &mut updates,
            &cancel,
            Duration::from_secs(30),
        )
        .await;
    assert!(matches!(result, Err(JobError::Cancelled)));
    Ok(())
}
