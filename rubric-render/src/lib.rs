//! RUBRIC Render - Summary Table Rendering
//!
//! Pure functions turning ordered row data into the single text blob stored
//! in a cached summary field. No store access. Empty input renders as the
//! empty string, never a placeholder.

pub mod markup;
pub mod table;

pub use markup::{
    escape_markup, escape_plain, normalize_breaks, sanitize_rich_text, ALLOWED_TAGS, BREAK_MARKER,
};
pub use table::{
    render_sections, render_table, CellFormat, ColumnLayout, ColumnSpec, OrderKey,
    RenderedSection, Section, SummaryRow,
};
