//! Human-readable rendering of round logs and failures.
//!
//! The structured diagnostics in [`crate::diagnostics`] are the source of
//! truth; this module turns them into console-friendly text with optional
//! ANSI color. Color is controlled by [`FormatterMode`]: auto-detected from
//! the terminal, forced on, or forced off for log files.

use std::io::IsTerminal;

use crate::diagnostics::{FetchEnv, Round, RoundDetail};
use crate::errors::FetchFailure;

pub const CONTEXT_COLOR: &str = "\x1b[32m"; // green
pub const LINE_COLOR: &str = "\x1b[35m"; // magenta
pub const RESET_COLOR: &str = "\x1b[0m";

/// Formatter color mode.
///
/// - [`FormatterMode::Auto`]: detects TTY capability via `stderr.is_terminal()`
/// - [`FormatterMode::Colored`]: always include color codes
/// - [`FormatterMode::Plain`]: never include color codes (for logs/files)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FormatterMode {
    /// Auto-detect TTY capability.
    #[default]
    Auto,
    /// Always include ANSI color codes.
    Colored,
    /// Never include ANSI color codes.
    Plain,
}

impl FormatterMode {
    /// Auto-detect based on stderr TTY capability.
    pub fn auto_detect() -> Self {
        if std::io::stderr().is_terminal() {
            FormatterMode::Colored
        } else {
            FormatterMode::Plain
        }
    }

    /// Returns true if this mode should use colored output.
    pub fn is_colored(&self) -> bool {
        match self {
            FormatterMode::Auto => std::io::stderr().is_terminal(),
            FormatterMode::Colored => true,
            FormatterMode::Plain => false,
        }
    }
}

/// Rendered output for one round, consumable by sinks.
#[derive(Clone, Debug, Default)]
pub struct RoundRender {
    pub context: Option<String>,
    pub lines: Vec<String>,
}

impl RoundRender {
    pub fn join_lines(&self) -> String {
        self.lines.join("")
    }
}

pub trait TelemetryFormatter: Send + Sync {
    fn render_round(&self, index: usize, round: &Round) -> RoundRender;
    fn render_failure(&self, failure: &FetchFailure) -> Vec<RoundRender>;
}

/// Plain text formatter with optional ANSI color codes.
pub struct PlainFormatter {
    mode: FormatterMode,
}

impl PlainFormatter {
    /// Create a formatter with auto-detected color mode.
    pub fn new() -> Self {
        Self {
            mode: FormatterMode::Auto,
        }
    }

    /// Create a formatter with an explicit color mode.
    pub fn with_mode(mode: FormatterMode) -> Self {
        Self { mode }
    }

    fn color<'a>(&self, ansi_code: &'a str) -> &'a str {
        if self.mode.is_colored() {
            ansi_code
        } else {
            ""
        }
    }

    fn reset(&self) -> &str {
        if self.mode.is_colored() {
            RESET_COLOR
        } else {
            ""
        }
    }

    fn detail_lines(&self, detail: &RoundDetail) -> Vec<String> {
        let batches: Vec<(String, String)> = match detail {
            RoundDetail::One { source, request } => {
                vec![(source.clone(), format!("[{request:?}]"))]
            }
            RoundDetail::Many { source, requests } => {
                vec![(source.clone(), format!("{requests:?}"))]
            }
            RoundDetail::Concurrent { batches } => batches
                .iter()
                .map(|(source, requests)| (source.clone(), format!("{requests:?}")))
                .collect(),
        };
        batches
            .into_iter()
            .map(|(source, requests)| {
                format!(
                    "{}  {} <- {}{}\n",
                    self.color(LINE_COLOR),
                    source,
                    requests,
                    self.reset()
                )
            })
            .collect()
    }
}

impl Default for PlainFormatter {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetryFormatter for PlainFormatter {
    fn render_round(&self, index: usize, round: &Round) -> RoundRender {
        let outcome = if round.served_from_cache {
            "cached"
        } else {
            "fetched"
        };
        let mut lines = vec![format!(
            "[{}] {}{}{} | {} request(s) | {}us | {}\n",
            index,
            self.color(CONTEXT_COLOR),
            round.detail.source_label(),
            self.reset(),
            round.detail.request_count(),
            round.duration().as_micros(),
            outcome
        )];
        lines.extend(self.detail_lines(&round.detail));
        RoundRender {
            context: Some(round.detail.source_label().to_string()),
            lines,
        }
    }

    fn render_failure(&self, failure: &FetchFailure) -> Vec<RoundRender> {
        let mut renders = vec![RoundRender {
            context: Some("failure".to_string()),
            lines: vec![format!(
                "{}{}{}\n",
                self.color(LINE_COLOR),
                failure.kind,
                self.reset()
            )],
        }];
        renders.extend(
            failure
                .env
                .rounds
                .iter()
                .enumerate()
                .map(|(index, round)| self.render_round(index, round)),
        );
        renders
    }
}

/// Format a round log as human-readable text with explicit color control.
pub fn pretty_print_with_mode(env: &FetchEnv, mode: FormatterMode) -> String {
    let formatter = PlainFormatter::with_mode(mode);
    let mut out = String::new();
    for (index, round) in env.rounds.iter().enumerate() {
        out.push_str(&formatter.render_round(index, round).join_lines());
    }
    out
}

/// Format a round log with auto-detected color support.
pub fn pretty_print(env: &FetchEnv) -> String {
    pretty_print_with_mode(env, FormatterMode::Auto)
}

/// Format a failure (kind plus round history) with explicit color control.
pub fn pretty_print_failure_with_mode(failure: &FetchFailure, mode: FormatterMode) -> String {
    let formatter = PlainFormatter::with_mode(mode);
    formatter
        .render_failure(failure)
        .into_iter()
        .map(|render| render.join_lines())
        .collect()
}

/// Format a failure with auto-detected color support.
pub fn pretty_print_failure(failure: &FetchFailure) -> String {
    pretty_print_failure_with_mode(failure, FormatterMode::Auto)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::RequestCache;
    use crate::types::RequestKey;
    use chrono::Utc;
    use std::time::Instant;

    fn sample_round(served_from_cache: bool) -> Round {
        let now = Instant::now();
        Round {
            prev_cache: RequestCache::new(),
            detail: RoundDetail::Many {
                source: "ArticleSource".into(),
                requests: vec![RequestKey::new(1u32), RequestKey::new(2u32)],
            },
            when: Utc::now(),
            started: now,
            ended: now,
            served_from_cache,
        }
    }

    #[test]
    fn plain_mode_emits_no_ansi_codes() {
        let formatter = PlainFormatter::with_mode(FormatterMode::Plain);
        let render = formatter.render_round(0, &sample_round(false));
        let text = render.join_lines();
        assert!(!text.contains("\x1b["));
        assert!(text.contains("ArticleSource"));
        assert!(text.contains("fetched"));
    }

    #[test]
    fn colored_mode_wraps_the_label() {
        let formatter = PlainFormatter::with_mode(FormatterMode::Colored);
        let text = formatter.render_round(0, &sample_round(true)).join_lines();
        assert!(text.contains(CONTEXT_COLOR));
        assert!(text.contains("cached"));
    }

    #[test]
    fn round_log_renders_one_entry_per_round() {
        let mut env = FetchEnv::new();
        env.rounds.push(sample_round(false));
        env.rounds.push(sample_round(true));
        let text = pretty_print_with_mode(&env, FormatterMode::Plain);
        assert!(text.contains("[0]"));
        assert!(text.contains("[1]"));
    }
}
