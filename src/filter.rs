//! Turns raw spotdl output into what the details view shows.
//!
//! spotdl prints `Downloaded "Title": https://...` for every finished track and
//! then echoes the YouTube Music URL it matched on the following line. The
//! confirmation is shortened to the title and that one echo line is dropped. A
//! YouTube Music URL that does not directly follow a confirmation is kept.

use once_cell::sync::Lazy;
use regex::Regex;

static DOWNLOADED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^Downloaded\s+"([^"]+)"\s*:"#).expect("static regex"));

const ECHO_PREFIX: &str = "https://music.youtube.com";

/// What to do with one line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterAction {
    /// Show this instead of the line
    Rewrite(String),
    /// Show nothing
    Suppress,
    /// Show the line as-is
    PassThrough(String),
}

impl FilterAction {
    /// The text to append to the view, if any.
    pub fn into_visible(self) -> Option<String> {
        match self {
            FilterAction::Rewrite(text) | FilterAction::PassThrough(text) => Some(text),
            FilterAction::Suppress => None,
        }
    }
}

#[derive(Debug, Default)]
pub struct LogFilter {
    last_was_success: bool,
}

impl LogFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classifies the next line. Must be called in output order.
    pub fn classify(&mut self, line: &str) -> FilterAction {
        if let Some(caps) = DOWNLOADED.captures(line) {
            self.last_was_success = true;
            return FilterAction::Rewrite(format!("{}\n", &caps[1]));
        }

        let follows_success = std::mem::take(&mut self.last_was_success);
        if follows_success && line.trim().starts_with(ECHO_PREFIX) {
            return FilterAction::Suppress;
        }

        FilterAction::PassThrough(line.to_owned())
    }

    pub fn visible(&mut self, line: &str) -> Option<String> {
        self.classify(line).into_visible()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confirmation_is_rewritten_to_title() {
        let mut filter = LogFilter::new();
        let action = filter.classify("Downloaded \"Song Title\": https://open.spotify.com/track/1\n");
        assert_eq!(action, FilterAction::Rewrite("Song Title\n".to_string()));
        assert!(filter.last_was_success);
    }

    #[test]
    fn confirmation_without_trailing_newline() {
        let mut filter = LogFilter::new();
        assert_eq!(
            filter.visible("Downloaded \"A - B (Live)\":https://x").as_deref(),
            Some("A - B (Live)\n")
        );
    }

    #[test]
    fn echo_after_confirmation_is_suppressed() {
        let mut filter = LogFilter::new();
        filter.classify("Downloaded \"Foo\": https://open.spotify.com/track/abc\n");
        assert_eq!(
            filter.classify("  https://music.youtube.com/watch?v=xyz\n"),
            FilterAction::Suppress
        );
        assert!(!filter.last_was_success);
    }

    #[test]
    fn standalone_echo_passes_through() {
        let mut filter = LogFilter::new();
        let line = "https://music.youtube.com/watch?v=xyz\n";
        assert_eq!(filter.classify(line), FilterAction::PassThrough(line.to_string()));
    }

    #[test]
    fn only_one_echo_is_suppressed() {
        let mut filter = LogFilter::new();
        filter.classify("Downloaded \"Foo\": x\n");
        assert_eq!(filter.visible("https://music.youtube.com/a\n"), None);
        assert_eq!(
            filter.visible("https://music.youtube.com/b\n").as_deref(),
            Some("https://music.youtube.com/b\n")
        );
    }

    #[test]
    fn unrelated_line_between_resets_state() {
        let mut filter = LogFilter::new();
        filter.classify("Downloaded \"Foo\": x\n");
        filter.classify("Processing query\n");
        assert!(matches!(
            filter.classify("https://music.youtube.com/watch?v=1\n"),
            FilterAction::PassThrough(_)
        ));
    }

    #[test]
    fn repeated_plain_line_passes_through_both_times() {
        let mut filter = LogFilter::new();
        for _ in 0..2 {
            assert_eq!(
                filter.classify("Found 12 songs in playlist\n"),
                FilterAction::PassThrough("Found 12 songs in playlist\n".to_string())
            );
            assert!(!filter.last_was_success);
        }
    }

    #[test]
    fn confirmation_pattern_is_case_sensitive_and_anchored() {
        let mut filter = LogFilter::new();
        assert!(matches!(
            filter.classify("downloaded \"Foo\": x\n"),
            FilterAction::PassThrough(_)
        ));
        assert!(matches!(
            filter.classify("Skipping Downloaded \"Foo\": x\n"),
            FilterAction::PassThrough(_)
        ));
        assert!(!filter.last_was_success);
    }

    #[test]
    fn back_to_back_confirmations() {
        let mut filter = LogFilter::new();
        let shown: Vec<String> = [
            "Downloaded \"One\": a\n",
            "https://music.youtube.com/1\n",
            "Downloaded \"Two\": b\n",
            "Downloaded \"Three\": c\n",
            "https://music.youtube.com/3\n",
        ]
        .iter()
        .filter_map(|l| filter.visible(l))
        .collect();
        assert_eq!(shown, vec!["One\n", "Two\n", "Three\n"]);
    }
}
