//! Colored diagnostics on stderr.
//!
//! Program output goes straight to stdout; everything the tool itself says
//! (errors, summaries, statistics) goes through here.

use std::io::Write;
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

/// Resolve `ColorChoice` from the `--color` flag and environment.
///
/// `NO_COLOR` wins over the flag; without either, color only on a TTY.
pub fn resolve_color_choice(flag: Option<&str>) -> ColorChoice {
    if std::env::var_os("NO_COLOR").is_some() {
        return ColorChoice::Never;
    }
    match flag {
        Some("always") => ColorChoice::Always,
        Some("never") => ColorChoice::Never,
        _ => ColorChoice::Auto,
    }
}

pub struct StyledOutput {
    stderr: StandardStream,
}

impl StyledOutput {
    pub fn new(choice: ColorChoice) -> Self {
        Self {
            stderr: StandardStream::stderr(choice),
        }
    }

    fn label(&mut self, label: &str, color: Color, text: &str) {
        let mut spec = ColorSpec::new();
        spec.set_fg(Some(color)).set_bold(true);
        let _ = self.stderr.set_color(&spec);
        let _ = write!(self.stderr, "{}", label);
        let _ = self.stderr.reset();
        let _ = writeln!(self.stderr, " {}", text);
    }

    /// `error: <text>` in red
    pub fn error(&mut self, text: &str) {
        self.label("error:", Color::Red, text);
    }

    /// `<label> <text>` in green, for completed steps
    pub fn success(&mut self, label: &str, text: &str) {
        self.label(label, Color::Green, text);
    }

    /// Section heading
    pub fn heading(&mut self, text: &str) {
        let mut spec = ColorSpec::new();
        spec.set_fg(Some(Color::Cyan)).set_bold(true);
        let _ = self.stderr.set_color(&spec);
        let _ = writeln!(self.stderr, "{}", text);
        let _ = self.stderr.reset();
    }

    /// Aligned `name: value` row under a heading
    pub fn row(&mut self, name: &str, value: impl std::fmt::Display) {
        let _ = writeln!(self.stderr, "  {:<18} {}", format!("{}:", name), value);
    }
}
