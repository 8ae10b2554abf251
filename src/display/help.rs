//! Custom help formatting for consistent CLI display.

use crate::display::theme::Theme;
use console::style;

/// Format help text with consistent styling
pub fn format_help_section(title: &str, content: &str, indent: bool) -> String {
    let mut output = String::new();

    if Theme::colors_enabled() {
        output.push_str(&format!("{}\n", style(title).cyan().bold()));
    } else {
        output.push_str(&format!("{title}\n"));
    }

    for line in content.lines() {
        if line.trim().is_empty() {
            output.push('\n');
        } else if indent && !line.starts_with("    ") {
            output.push_str(&format!("    {line}\n"));
        } else {
            output.push_str(&format!("{line}\n"));
        }
    }

    output
}

/// Create styled help text for the CLI
pub fn create_help_text() -> String {
    let mut help = String::new();

    let quick_start = r#"$ mongoose init                       # Write .mongoose/settings.toml
$ mongoose build corpus.jsonl         # Embed and index a corpus
$ mongoose query "add two tensors"    # Retrieve the closest items"#;

    help.push_str(&format_help_section("QUICK START", quick_start, true));
    help.push('\n');

    let examples = r#"# Try retrieval without a corpus
$ mongoose demo "elementwise product" -k 2

# Use a remote embedding service
$ MG_EMBEDDING__PROVIDER=http MG_EMBEDDING__MODEL=code-embed mongoose build corpus.txt

# Measure cross-modal recall between paired embeddings
$ mongoose eval code.hbin docs.hbin

# Machine-readable output
$ mongoose query "divide" -k 3 --json"#;

    help.push_str(&format_help_section("EXAMPLES", examples, true));
    help.push('\n');

    let exit_codes = r#"0 success   1 error   2 index/items out of sync   3 no results
5 I/O error   6 configuration error   7 index corrupted"#;

    help.push_str(&format_help_section("EXIT CODES", exit_codes, true));

    help
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_help_mentions_commands() {
        let help = create_help_text();
        assert!(help.contains("mongoose build"));
        assert!(help.contains("mongoose eval"));
        assert!(help.contains("EXIT CODES"));
    }

    #[test]
    fn test_section_indents_content() {
        let section = format_help_section("TITLE", "line", true);
        assert!(section.contains("    line"));
    }
}
