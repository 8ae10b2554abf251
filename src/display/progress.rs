//! Progress bars for embedding and indexing runs.

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Progress bar counting indexed items.
///
/// Hidden when `visible` is false so library callers and `--json` output
/// stay clean.
pub fn create_progress_bar(total: u64, message: &str, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(total);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
    {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Spinner for steps of unknown length, such as loading a model.
pub fn create_spinner(message: &str, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        spinner.set_style(
            style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
    }
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(80));
    spinner
}

/// Runs `operation` behind a spinner and clears it afterwards.
pub fn with_spinner<F, T>(message: &str, visible: bool, operation: F) -> T
where
    F: FnOnce() -> T,
{
    let spinner = create_spinner(message, visible);
    let result = operation();
    spinner.finish_and_clear();
    result
}
