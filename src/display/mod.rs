//! Rich terminal display utilities for CLI output.
//!
//! Provides styled tables, progress bars, and formatted output
//! for the `mongoose` binary.

pub mod help;
pub mod progress;
pub mod tables;
pub mod theme;

pub use help::{create_help_text, format_help_section};
pub use progress::{create_progress_bar, create_spinner, with_spinner};
pub use tables::{TableBuilder, create_build_table, create_recall_table, create_results_table};
pub use theme::{Status, THEME, Theme};
