//! Terminal styling for command outcomes, hints, and index paths.

use console::Style;
use is_terminal::IsTerminal;
use owo_colors::OwoColorize;
use std::sync::LazyLock;

/// Shared theme used by every command.
pub static THEME: LazyLock<Theme> = LazyLock::new(Theme::default);

/// Outcome a status line reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// A build, save, or query finished.
    Done,
    /// A command failed; the line carries the error.
    Failed,
    /// Nothing went wrong but the result is empty or partial.
    Notice,
}

impl Status {
    fn glyph(self) -> &'static str {
        match self {
            Self::Done => "✓",
            Self::Failed => "✗",
            Self::Notice => "⚠",
        }
    }
}

/// Styles for the pieces of CLI output.
#[derive(Debug, Clone)]
pub struct Theme {
    done: Style,
    failed: Style,
    notice: Style,
    /// Recovery suggestions under an error
    pub hint: Style,
    /// Index, corpus, and matrix paths
    pub path: Style,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            done: Style::new().green().bright(),
            failed: Style::new().red().bright(),
            notice: Style::new().yellow().bright(),
            hint: Style::new().dim(),
            path: Style::new().magenta(),
        }
    }
}

impl Theme {
    /// A status line: glyph, then `text` in the outcome's color.
    pub fn status(&self, status: Status, text: &str) -> String {
        self.render_status(status, text, Self::colors_enabled())
    }

    /// `text` in `style`, or plain when colors are off.
    pub fn paint<T: std::fmt::Display>(&self, style: &Style, text: T) -> String {
        if Self::colors_enabled() {
            style.apply_to(text).to_string()
        } else {
            text.to_string()
        }
    }

    /// Colors are on for an interactive stdout unless `NO_COLOR` is set.
    pub fn colors_enabled() -> bool {
        std::env::var_os("NO_COLOR").is_none() && std::io::stdout().is_terminal()
    }

    fn render_status(&self, status: Status, text: &str, colored: bool) -> String {
        let glyph = status.glyph();
        if !colored {
            return format!("{glyph} {text}");
        }
        match status {
            Status::Done => format!("{} {}", glyph.green(), self.done.apply_to(text)),
            Status::Failed => format!("{} {}", glyph.red(), self.failed.apply_to(text)),
            Status::Notice => format!("{} {}", glyph.yellow(), self.notice.apply_to(text)),
        }
    }
}
