//! Supervision of one run of the extraction utility.

use std::collections::VecDeque;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use ripline_core::{ExtractorSettings, JobError, ProgressSink};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{ChildStdout, Command};
use tokio_util::sync::CancellationToken;

use crate::parser::{LineMatcher, SpotdlMatcher};
use crate::tracker::ProgressTracker;

/// Stderr kept per run (64 KiB), newest lines last.
const MAX_STDERR_BYTES: usize = 64 * 1024;
/// Longest output fragment kept; the rest of an overlong line is dropped.
const MAX_FRAGMENT_BYTES: usize = 8 * 1024;
const READ_CHUNK_BYTES: usize = 4 * 1024;
/// Maximum diagnostic text forwarded to the client.
const MAX_DIAGNOSTIC_CHARS: usize = 500;

/// Counters from a run that exited cleanly.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub total_tracks: u32,
    pub completed_tracks: u32,
}

/// Why a run stopped before the utility exited on its own.
enum Interruption {
    Cancelled,
    TimedOut,
}

/// Launches the utility and turns its output into progress.
pub struct Extractor {
    settings: ExtractorSettings,
    matcher: Arc<dyn LineMatcher>,
}

impl Extractor {
    /// Create an extractor with the spotDL output matcher.
    pub fn new(settings: ExtractorSettings) -> Result<Self, JobError> {
        let matcher = SpotdlMatcher::new()
            .map_err(|e| JobError::Configuration(format!("invalid output pattern: {e}")))?;
        Ok(Self::with_matcher(settings, Arc::new(matcher)))
    }

    /// Create an extractor with a custom output matcher.
    pub fn with_matcher(settings: ExtractorSettings, matcher: Arc<dyn LineMatcher>) -> Self {
        Self { settings, matcher }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.settings.program);
        cmd.args(&self.settings.base_args);
        cmd
    }

    /// Verify the utility can be invoked; returns its reported version.
    pub async fn probe(&self) -> Result<String, JobError> {
        let program = &self.settings.program;
        let mut cmd = self.command();
        cmd.arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(self.settings.probe_timeout, cmd.output())
            .await
            .map_err(|_| {
                JobError::Configuration(format!("{program} --version did not respond"))
            })?
            .map_err(|e| JobError::Configuration(format!("could not launch {program}: {e}")))?;

        if !output.status.success() {
            return Err(JobError::Configuration(format!(
                "{program} --version exited with {}",
                describe_status(output.status)
            )));
        }

        let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
        tracing::debug!(%program, %version, "Extraction utility available");
        Ok(version)
    }

    /// Run the utility for `reference`, writing into `output_dir`.
    ///
    /// Progress goes to `sink` as output arrives. The process is killed if
    /// `cancel` fires or `deadline` elapses.
    pub async fn run<S>(
        &self,
        reference: &str,
        output_dir: &Path,
        sink: &mut S,
        cancel: &CancellationToken,
        deadline: Duration,
    ) -> Result<RunSummary, JobError>
    where
        S: ProgressSink + Send,
    {
        let mut cmd = self.command();
        cmd.arg(reference)
            .arg("--output")
            .arg(output_dir)
            .arg("--format")
            .arg(&self.settings.format)
            .arg("--bitrate")
            .arg(&self.settings.bitrate);
        if let Some(threads) = self.settings.threads {
            cmd.arg("--threads").arg(threads.to_string());
        }
        cmd.arg("--print-errors")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            JobError::Configuration(format!("could not launch {}: {e}", self.settings.program))
        })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let stderr_task = tokio::spawn(drain_stderr(stderr, self.settings.error_markers.clone()));

        let mut tracker = ProgressTracker::new();
        let matcher = self.matcher.clone();

        let waited = {
            let work = async {
                if let Some(stdout) = stdout {
                    follow_stdout(stdout, matcher.as_ref(), &mut tracker, sink).await?;
                }
                child.wait().await
            };

            tokio::select! {
                status = work => Ok(status),
                _ = cancel.cancelled() => Err(Interruption::Cancelled),
                _ = tokio::time::sleep(deadline) => Err(Interruption::TimedOut),
            }
        };

        let status = match waited {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                stderr_task.abort();
                return Err(JobError::Internal(format!("reading utility output: {e}")));
            }
            Err(interruption) => {
                if let Err(e) = child.kill().await {
                    tracing::warn!("Failed to kill extraction utility: {}", e);
                }
                stderr_task.abort();
                return Err(match interruption {
                    Interruption::Cancelled => JobError::Cancelled,
                    Interruption::TimedOut => JobError::Timeout(deadline),
                });
            }
        };

        let stderr = stderr_task.await.unwrap_or_default();
        let marker = stderr.marker.as_deref();

        if !status.success() || marker.is_some() {
            tracing::warn!(
                status = %describe_status(status),
                marker = marker.unwrap_or(""),
                "Extraction utility failed"
            );
            return Err(JobError::ConversionFailed {
                exit_code: status.code(),
                diagnostics: sanitize_diagnostics(&stderr.text(), output_dir),
            });
        }

        Ok(RunSummary {
            total_tracks: tracker.total_tracks(),
            completed_tracks: tracker.completed_tracks(),
        })
    }
}

/// Splits a byte stream into `\r`/`\n` terminated fragments as bytes
/// arrive, so progress bars that redraw in place are seen live.
struct FragmentReader<R> {
    inner: R,
    chunk: Vec<u8>,
    pending: Vec<u8>,
    overlong: bool,
    ready: VecDeque<String>,
    eof: bool,
}

impl<R: AsyncRead + Unpin> FragmentReader<R> {
    fn new(inner: R) -> Self {
        Self {
            inner,
            chunk: vec![0; READ_CHUNK_BYTES],
            pending: Vec::new(),
            overlong: false,
            ready: VecDeque::new(),
            eof: false,
        }
    }

    /// Next non-empty, trimmed fragment; `None` once the stream ends.
    async fn next_fragment(&mut self) -> std::io::Result<Option<String>> {
        loop {
            if let Some(fragment) = self.ready.pop_front() {
                return Ok(Some(fragment));
            }
            if self.eof {
                return Ok(None);
            }

            let n = self.inner.read(&mut self.chunk).await?;
            if n == 0 {
                self.eof = true;
                self.end_fragment();
                continue;
            }
            for i in 0..n {
                let byte = self.chunk[i];
                match byte {
                    b'\r' | b'\n' => self.end_fragment(),
                    byte if self.pending.len() < MAX_FRAGMENT_BYTES => self.pending.push(byte),
                    _ => self.overlong = true,
                }
            }
        }
    }

    fn end_fragment(&mut self) {
        if self.overlong {
            tracing::debug!(kept = MAX_FRAGMENT_BYTES, "Truncated overlong output line");
            self.overlong = false;
        }
        let text = String::from_utf8_lossy(&self.pending);
        let trimmed = text.trim();
        if !trimmed.is_empty() {
            self.ready.push_back(trimmed.to_string());
        }
        self.pending.clear();
    }
}

/// Feed stdout through the matcher as it arrives.
async fn follow_stdout<S>(
    stdout: ChildStdout,
    matcher: &dyn LineMatcher,
    tracker: &mut ProgressTracker,
    sink: &mut S,
) -> std::io::Result<()>
where
    S: ProgressSink + Send,
{
    let mut reader = FragmentReader::new(stdout);
    while let Some(fragment) = reader.next_fragment().await? {
        tracing::debug!(line = %fragment, "Extraction utility output");
        if let Some(update) = tracker.observe(&matcher.classify(&fragment)) {
            sink.emit(update);
        }
    }
    Ok(())
}

/// What a run wrote to stderr: the most recent lines and the first error
/// marker seen anywhere in the stream.
#[derive(Debug, Default)]
struct StderrCapture {
    tail: VecDeque<String>,
    tail_bytes: usize,
    marker: Option<String>,
}

impl StderrCapture {
    fn record(&mut self, line: String, markers: &[String]) {
        if self.marker.is_none() {
            self.marker = markers.iter().find(|m| line.contains(m.as_str())).cloned();
        }
        self.tail_bytes += line.len() + 1;
        self.tail.push_back(line);
        while self.tail_bytes > MAX_STDERR_BYTES && self.tail.len() > 1 {
            if let Some(dropped) = self.tail.pop_front() {
                self.tail_bytes -= dropped.len() + 1;
            }
        }
    }

    fn text(&self) -> String {
        self.tail.iter().map(String::as_str).collect::<Vec<_>>().join("\n")
    }
}

/// Read stderr to the end so the utility never blocks on a full or closed
/// pipe, keeping only a bounded tail.
async fn drain_stderr<R: AsyncRead + Unpin>(
    handle: Option<R>,
    markers: Vec<String>,
) -> StderrCapture {
    let mut capture = StderrCapture::default();
    let Some(handle) = handle else {
        return capture;
    };

    let mut reader = FragmentReader::new(handle);
    loop {
        match reader.next_fragment().await {
            Ok(Some(line)) => {
                tracing::debug!(line = %line, "Extraction utility stderr");
                capture.record(line, &markers);
            }
            Ok(None) => break,
            Err(e) => {
                tracing::debug!("Stopped reading utility stderr: {}", e);
                break;
            }
        }
    }
    capture
}

fn describe_status(status: ExitStatus) -> String {
    match status.code() {
        Some(code) => format!("exit code {code}"),
        None => "no exit code (terminated by signal)".to_string(),
    }
}

/// Make stderr safe to show a client: no server paths, no control
/// characters, only the tail.
pub fn sanitize_diagnostics(raw: &str, output_dir: &Path) -> String {
    let dir = output_dir.to_string_lossy();
    let redacted = if dir.is_empty() {
        raw.to_string()
    } else {
        raw.replace(dir.as_ref(), "<output>")
    };

    let cleaned: String = redacted
        .chars()
        .map(|c| if c.is_control() && c != '\n' { ' ' } else { c })
        .collect();

    let lines: Vec<&str> = cleaned
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    let joined = lines.join(" | ");

    let count = joined.chars().count();
    if count <= MAX_DIAGNOSTIC_CHARS {
        joined
    } else {
        let tail: String = joined.chars().skip(count - MAX_DIAGNOSTIC_CHARS).collect();
        format!("…{tail}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostics_hide_paths_and_keep_the_tail() {
        let dir = Path::new("/srv/downloads/01HX");
        let raw = "Traceback (most recent call last):\n  File \"/srv/downloads/01HX/x\"\x1b[0m\nLookupError: nothing\n";
        let text = sanitize_diagnostics(raw, dir);
        assert!(!text.contains("/srv/downloads"));
        assert!(!text.contains('\x1b'));
        assert!(text.ends_with("LookupError: nothing"));

        let long = "x".repeat(2_000);
        let text = sanitize_diagnostics(&long, dir);
        assert_eq!(text.chars().count(), MAX_DIAGNOSTIC_CHARS + 1);
    }

    #[tokio::test]
    async fn fragments_split_on_carriage_return_and_newline() {
        let mut reader = FragmentReader::new(&b"Found 2 songs\r 45% \r\n\nDownloaded \"a\"\ntail"[..]);
        let mut seen = Vec::new();
        while let Ok(Some(fragment)) = reader.next_fragment().await {
            seen.push(fragment);
        }
        assert_eq!(seen, vec!["Found 2 songs", "45%", "Downloaded \"a\"", "tail"]);
    }

    #[tokio::test]
    async fn overlong_fragments_are_truncated() {
        let mut input = vec![b'x'; MAX_FRAGMENT_BYTES * 3];
        input.extend_from_slice(b"\nnext\n");
        let mut reader = FragmentReader::new(&input[..]);

        let first = reader.next_fragment().await.ok().flatten().unwrap_or_default();
        assert_eq!(first.len(), MAX_FRAGMENT_BYTES);
        assert_eq!(reader.next_fragment().await.ok().flatten().as_deref(), Some("next"));
    }

    #[test]
    fn stderr_keeps_the_newest_lines_and_the_first_marker() {
        let markers = vec!["LookupError".to_string()];
        let mut capture = StderrCapture::default();
        capture.record("LookupError: early".to_string(), &markers);
        for i in 0..10_000 {
            capture.record(format!("warning {i}"), &markers);
        }

        assert_eq!(capture.marker.as_deref(), Some("LookupError"));
        assert!(capture.tail_bytes <= MAX_STDERR_BYTES);
        let text = capture.text();
        assert!(text.ends_with("warning 9999"));
        assert!(!text.contains("early"));
    }
}
