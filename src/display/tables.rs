//! Table formatting utilities for structured output.

use comfy_table::{
    Attribute, Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL,
};

use crate::semantic::{BuildReport, RecallReport, RetrievedItem};

/// Builder for creating formatted tables.
pub struct TableBuilder {
    table: Table,
}

impl Default for TableBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TableBuilder {
    /// Create a new table builder.
    pub fn new() -> Self {
        let mut table = Table::new();
        table.load_preset(UTF8_FULL);
        table.apply_modifier(UTF8_ROUND_CORNERS);
        Self { table }
    }

    /// Set the table headers.
    pub fn set_headers(mut self, headers: Vec<&str>) -> Self {
        let header_cells: Vec<Cell> = headers
            .into_iter()
            .map(|h| Cell::new(h).add_attribute(Attribute::Bold))
            .collect();
        self.table.set_header(header_cells);
        self
    }

    /// Add a row to the table.
    pub fn add_row(mut self, row: Vec<String>) -> Self {
        self.table.add_row(row);
        self
    }

    /// Add a row of pre-styled cells.
    pub fn add_cells(mut self, row: Vec<Cell>) -> Self {
        self.table.add_row(row);
        self
    }

    /// Build and return the formatted table.
    pub fn build(self) -> String {
        self.table.to_string()
    }
}

/// Ranked query results.
pub fn create_results_table(results: &[RetrievedItem]) -> String {
    let mut builder = TableBuilder::new().set_headers(vec!["Rank", "Key", "Similarity", "Item"]);
    for (rank, item) in results.iter().enumerate() {
        builder = builder.add_row(vec![
            (rank + 1).to_string(),
            item.key.to_string(),
            format!("{:.4}", item.similarity()),
            item.text.clone(),
        ]);
    }
    builder.build()
}

/// Recall metrics, one row per retrieval direction.
pub fn create_recall_table(rows: &[(&str, &RecallReport)]) -> String {
    let mut builder =
        TableBuilder::new().set_headers(vec!["Direction", "Queries", "Recall@1", "Recall@10"]);
    for (direction, report) in rows {
        builder = builder.add_cells(vec![
            Cell::new(direction).add_attribute(Attribute::Bold),
            Cell::new(report.queries),
            recall_cell(report.recall_at_1),
            recall_cell(report.recall_at_10),
        ]);
    }
    builder.build()
}

fn recall_cell(value: f64) -> Cell {
    let color = if value >= 0.9 {
        Color::Green
    } else if value >= 0.5 {
        Color::Yellow
    } else {
        Color::Red
    };
    Cell::new(format!("{value:.4}")).fg(color)
}

/// Summary of a build run.
pub fn create_build_table(report: &BuildReport, model: &str, output: &str) -> String {
    let rate = if report.elapsed.as_secs_f64() > 0.0 {
        report.indexed as f64 / report.elapsed.as_secs_f64()
    } else {
        0.0
    };
    TableBuilder::new()
        .set_headers(vec!["Metric", "Value"])
        .add_row(vec!["Model".to_string(), model.to_string()])
        .add_row(vec!["Dimension".to_string(), report.dimension.to_string()])
        .add_row(vec!["Items indexed".to_string(), report.indexed.to_string()])
        .add_row(vec!["Batches".to_string(), report.batches.to_string()])
        .add_row(vec!["Retries".to_string(), report.retries.to_string()])
        .add_row(vec!["Time".to_string(), format!("{:?}", report.elapsed)])
        .add_row(vec!["Rate".to_string(), format!("{rate:.0} items/s")])
        .add_row(vec!["Output".to_string(), output.to_string()])
        .build()
}
