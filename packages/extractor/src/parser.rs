//! Recognition of the extraction utility's free-form output.
//!
//! Text on stdout is the only status interface the utility offers, so
//! matching is tolerant: anything unrecognized is [`OutputLine::Other`].

use regex::Regex;

/// A classified line of utility output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputLine {
    /// The utility resolved the reference to `count` items.
    Found { count: u32 },
    /// The utility started fetching an item.
    Downloading { name: String },
    /// The utility finished an item.
    Downloaded { name: Option<String> },
    /// Anything else; logged but never surfaced as progress.
    Other,
}

/// Turns one line of utility output into an [`OutputLine`].
///
/// Swap implementations when the utility's output format changes; the
/// queue and progress channel never see raw text.
pub trait LineMatcher: Send + Sync + 'static {
    fn classify(&self, line: &str) -> OutputLine;
}

/// Matcher for spotDL-style output:
///
/// ```text
/// Found 12 songs in Some Playlist (Playlist)
/// Downloading "Artist - Title"
/// Downloaded "Artist - Title": https://...
/// ```
pub struct SpotdlMatcher {
    found: Regex,
    downloading: Regex,
    downloaded: Regex,
}

impl SpotdlMatcher {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            found: Regex::new(r"(?i)\bfound\s+(\d+)\s+(?:songs?|tracks?|items?)\b")?,
            downloading: Regex::new(r#"\bDownloading\s+"([^"]+)""#)?,
            downloaded: Regex::new(r#"\bDownloaded(?:\s+"([^"]+)")?"#)?,
        })
    }
}

impl LineMatcher for SpotdlMatcher {
    fn classify(&self, line: &str) -> OutputLine {
        if let Some(caps) = self.found.captures(line)
            && let Some(count) = caps.get(1).and_then(|m| m.as_str().parse::<u32>().ok())
        {
            return OutputLine::Found { count };
        }

        if let Some(caps) = self.downloaded.captures(line) {
            return OutputLine::Downloaded {
                name: caps.get(1).map(|m| m.as_str().to_string()),
            };
        }

        if let Some(caps) = self.downloading.captures(line)
            && let Some(name) = caps.get(1)
        {
            return OutputLine::Downloading {
                name: name.as_str().to_string(),
            };
        }

        OutputLine::Other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matcher() -> SpotdlMatcher {
        SpotdlMatcher::new().expect("patterns compile")
    }

    #[test]
    fn recognizes_track_count() {
        let m = matcher();
        assert_eq!(
            m.classify("Found 12 songs in Road Trip (Playlist)"),
            OutputLine::Found { count: 12 }
        );
        assert_eq!(m.classify("Found 1 song"), OutputLine::Found { count: 1 });
    }

    #[test]
    fn recognizes_download_start_and_finish() {
        let m = matcher();
        assert_eq!(
            m.classify(r#"Downloading "Artist - Title""#),
            OutputLine::Downloading {
                name: "Artist - Title".into()
            }
        );
        assert_eq!(
            m.classify(r#"Downloaded "Artist - Title": https://music.example/watch?v=1"#),
            OutputLine::Downloaded {
                name: Some("Artist - Title".into())
            }
        );
        assert_eq!(
            m.classify("Downloaded"),
            OutputLine::Downloaded { name: None }
        );
    }

    #[test]
    fn everything_else_is_other() {
        let m = matcher();
        assert_eq!(m.classify("Processing query: https://x"), OutputLine::Other);
        assert_eq!(m.classify("Found a bug"), OutputLine::Other);
        assert_eq!(m.classify("Downloading"), OutputLine::Other);
        assert_eq!(m.classify(""), OutputLine::Other);
    }
}
