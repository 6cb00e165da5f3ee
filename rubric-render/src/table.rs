//! Table assembly.

use crate::markup::{escape_plain, sanitize_rich_text};
use rubric_core::RenderError;
use serde::{Deserialize, Serialize};

// ============================================================================
// LAYOUT
// ============================================================================

/// How a cell's text is sanitized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellFormat {
    /// Every markup character escaped.
    #[default]
    Plain,
    /// Allow-listed inline style tags survive.
    RichText,
}

/// One column of a summary table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub header: String,
    pub format: CellFormat,
}

impl ColumnSpec {
    pub fn plain(header: impl Into<String>) -> Self {
        Self {
            header: header.into(),
            format: CellFormat::Plain,
        }
    }

    pub fn rich(header: impl Into<String>) -> Self {
        Self {
            header: header.into(),
            format: CellFormat::RichText,
        }
    }
}

/// Ordered column declarations for one table.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ColumnLayout {
    pub columns: Vec<ColumnSpec>,
}

impl ColumnLayout {
    pub fn new(columns: Vec<ColumnSpec>) -> Self {
        Self { columns }
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }
}

// ============================================================================
// ROWS
// ============================================================================

/// Row section. Declaration order is render order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Section {
    /// Rows backed by reference-list entries.
    ListBacked,
    /// Discrete answer rows.
    DiscreteAnswer,
}

/// Caller-supplied ordering key within a section: group (e.g. the position
/// of the owning list), then sort order, then a textual tie-breaker so equal
/// sort orders still render deterministically.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct OrderKey {
    pub group: i64,
    pub rank: i64,
    pub tie: String,
}

impl OrderKey {
    pub fn new(rank: i64, tie: impl Into<String>) -> Self {
        Self::grouped(0, rank, tie)
    }

    pub fn grouped(group: i64, rank: i64, tie: impl Into<String>) -> Self {
        Self {
            group,
            rank,
            tie: tie.into(),
        }
    }
}

/// One row of raw (unsanitized) cell text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryRow {
    pub section: Section,
    pub order: OrderKey,
    pub cells: Vec<String>,
}

impl SummaryRow {
    pub fn new(section: Section, order: OrderKey, cells: Vec<String>) -> Self {
        Self {
            section,
            order,
            cells,
        }
    }
}

/// A rendered table body with an optional heading, ready to be joined.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedSection {
    pub title: Option<String>,
    pub body: String,
}

// ============================================================================
// RENDERING
// ============================================================================

fn render_cell(text: &str, format: CellFormat) -> String {
    match format {
        CellFormat::Plain => escape_plain(text),
        CellFormat::RichText => sanitize_rich_text(text),
    }
}

/// Render rows into a single-line HTML table.
///
/// Empty `rows` yields an empty string. List-backed rows come first, then
/// discrete answer rows, each ordered by its [`OrderKey`]. The input order of
/// `rows` never affects the output.
pub fn render_table(rows: &[SummaryRow], layout: &ColumnLayout) -> Result<String, RenderError> {
    if rows.is_empty() {
        return Ok(String::new());
    }
    if layout.columns.is_empty() {
        return Err(RenderError::EmptyLayout);
    }
    if let Some(bad) = rows.iter().find(|r| r.cells.len() != layout.width()) {
        return Err(RenderError::ColumnMismatch {
            expected: layout.width(),
            got: bad.cells.len(),
        });
    }

    let mut ordered: Vec<&SummaryRow> = rows.iter().collect();
    ordered.sort_by(|a, b| {
        (a.section, &a.order, &a.cells).cmp(&(b.section, &b.order, &b.cells))
    });

    let mut out = String::from("<table><thead><tr>");
    for column in &layout.columns {
        out.push_str("<th>");
        out.push_str(&escape_plain(&column.header));
        out.push_str("</th>");
    }
    out.push_str("</tr></thead><tbody>");
    for row in ordered {
        out.push_str("<tr>");
        for (cell, column) in row.cells.iter().zip(&layout.columns) {
            out.push_str("<td>");
            out.push_str(&render_cell(cell, column.format));
            out.push_str("</td>");
        }
        out.push_str("</tr>");
    }
    out.push_str("</tbody></table>");
    Ok(out)
}

/// Join rendered sections with `separator`, skipping empty bodies.
///
/// A titled section gets an escaped `<h4>` heading. Nothing in, or only
/// empty bodies in, gives an empty string.
pub fn render_sections(sections: &[RenderedSection], separator: &str) -> String {
    let parts: Vec<String> = sections
        .iter()
        .filter(|s| !s.body.is_empty())
        .map(|s| match &s.title {
            Some(title) => format!("<h4>{}</h4>{}", escape_plain(title), s.body),
            None => s.body.clone(),
        })
        .collect();
    parts.join(separator)
}

// ============================================================================
// TESTS
// ============================================================================
