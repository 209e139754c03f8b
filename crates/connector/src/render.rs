//! Textual result summaries.

use crate::cell::Cell;

pub const EMPTY_RESULT: &str = "Query completed successfully (0 rows)";

/// Render materialized rows into the summary stored with each run.
///
/// Zero rows yield [`EMPTY_RESULT`]. Otherwise a `Found <N> rows:` header is
/// followed by one 1-indexed line per row with cells joined by a space.
pub fn render_rows(rows: &[Vec<Cell>]) -> String {
    if rows.is_empty() {
        return EMPTY_RESULT.to_string();
    }

    let mut out = format!("Found {} rows:\n", rows.len());
    for (i, row) in rows.iter().enumerate() {
        let cells: Vec<String> = row.iter().map(Cell::to_string).collect();
        out.push_str(&format!("Row {}: {}\n", i + 1, cells.join(" ")));
    }
    out
}
