//! Pure finance utilities: filtering, aggregation, formatting and export rows.
//!
//! Nothing in this module touches the database. Records are fetched by the caller, reduced here,
//! and thrown away.

mod export;
mod filter;
mod format;
mod summary;

pub use export::{export_rows, ExportRow, ExportTable, HEADERS};
pub use filter::{filter_transactions, parse_date, Filter};
pub use format::{format_currency, format_date};
pub use summary::{aggregate, branch_totals, category_totals, CategoryTotal, Summary};
