//! Draws an `ExportTable` onto A4 portrait pages with printpdf's built-in Helvetica.

use crate::error::Res;
use crate::finance::ExportTable;
use anyhow::anyhow;
use printpdf::{BuiltinFont, IndirectFontRef, Mm, PdfDocument, PdfLayerReference};
use std::ops::Range;

const PAGE_WIDTH: f32 = 210.0;
const PAGE_HEIGHT: f32 = 297.0;
const MARGIN: f32 = 12.0;
const ROW_HEIGHT: f32 = 5.0;
const TITLE_SIZE: f32 = 16.0;
const SUBTITLE_SIZE: f32 = 10.0;
const TABLE_SIZE: f32 = 8.0;
const TOTALS_SIZE: f32 = 10.0;

/// Column widths in millimetres, in `HEADERS` order. They add up to the printable width.
const COLUMNS: [f32; 7] = [22.0, 16.0, 28.0, 24.0, 48.0, 28.0, 20.0];

/// Table rows that fit under the title block on the first page.
const FIRST_PAGE_ROWS: usize = 48;
/// Table rows that fit on every following page.
const PAGE_ROWS: usize = 52;
/// Rows of space the totals block needs.
const TOTALS_ROWS: usize = 10;

/// Renders `table` and returns the PDF bytes.
pub(super) fn render(table: &ExportTable) -> Res<Vec<u8>> {
    let (doc, page, layer) = PdfDocument::new(
        table.title.as_str(),
        Mm(PAGE_WIDTH),
        Mm(PAGE_HEIGHT),
        "Layer 1",
    );
    let regular = doc
        .add_builtin_font(BuiltinFont::Helvetica)
        .map_err(|e| anyhow!("Unable to load the PDF font: {e:?}"))?;
    let bold = doc
        .add_builtin_font(BuiltinFont::HelveticaBold)
        .map_err(|e| anyhow!("Unable to load the PDF font: {e:?}"))?;
    let fonts = Fonts { regular, bold };

    let layout = paginate(table.rows.len());
    let page_count = layout.pages.len() + usize::from(layout.totals_on_new_page);

    let mut current = doc.get_page(page).get_layer(layer);
    let mut y = PAGE_HEIGHT - MARGIN - 6.0;
    current.use_text(table.title.as_str(), TITLE_SIZE, Mm(MARGIN), Mm(y), &fonts.bold);
    y -= 7.0;
    current.use_text(
        table.subtitle.as_str(),
        SUBTITLE_SIZE,
        Mm(MARGIN),
        Mm(y),
        &fonts.regular,
    );
    y -= 9.0;

    for (ix, rows) in layout.pages.iter().enumerate() {
        if ix > 0 {
            let (p, l) = doc.add_page(Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
            current = doc.get_page(p).get_layer(l);
            y = PAGE_HEIGHT - MARGIN - 4.0;
        }
        footer(&current, &fonts, ix + 1, page_count);
        let headers: Vec<&str> = table.headers.iter().map(String::as_str).collect();
        draw_row(&current, &fonts.bold, &headers, y);
        y -= ROW_HEIGHT + 1.0;
        for row in &table.rows[rows.clone()] {
            draw_row(&current, &fonts.regular, &row.cells(), y);
            y -= ROW_HEIGHT;
        }
    }

    if layout.totals_on_new_page {
        let (p, l) = doc.add_page(Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
        current = doc.get_page(p).get_layer(l);
        footer(&current, &fonts, page_count, page_count);
        y = PAGE_HEIGHT - MARGIN - 4.0;
    }

    y -= ROW_HEIGHT;
    current.use_text("Totals", TOTALS_SIZE, Mm(MARGIN), Mm(y), &fonts.bold);
    for (label, value) in &table.totals {
        y -= ROW_HEIGHT + 1.0;
        current.use_text(label.as_str(), TOTALS_SIZE, Mm(MARGIN), Mm(y), &fonts.regular);
        current.use_text(value.as_str(), TOTALS_SIZE, Mm(MARGIN + 50.0), Mm(y), &fonts.regular);
    }

    doc.save_to_bytes()
        .map_err(|e| anyhow!("Unable to write the PDF document: {e:?}"))
}

struct Fonts {
    regular: IndirectFontRef,
    bold: IndirectFontRef,
}

fn draw_row(layer: &PdfLayerReference, font: &IndirectFontRef, cells: &[&str], y: f32) {
    let mut x = MARGIN;
    for (cell, width) in cells.iter().zip(COLUMNS) {
        layer.use_text(fit(cell, width), TABLE_SIZE, Mm(x), Mm(y), font);
        x += width;
    }
}

fn footer(layer: &PdfLayerReference, fonts: &Fonts, page: usize, pages: usize) {
    layer.use_text(
        format!("Page {page} of {pages}"),
        TABLE_SIZE,
        Mm(PAGE_WIDTH - MARGIN - 22.0),
        Mm(MARGIN - 4.0),
        &fonts.regular,
    );
}

/// Shortens `text` to what fits in a column `width` millimetres wide at the table font size.
fn fit(text: &str, width: f32) -> String {
    // Helvetica averages about half an em per character; one point is 0.3528 mm.
    let char_width = TABLE_SIZE * 0.5 * 0.3528;
    let max = ((width - 1.5) / char_width).floor().max(3.0) as usize;
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let kept: String = text.chars().take(max - 3).collect();
        format!("{kept}...")
    }
}

#[derive(Debug, PartialEq, Eq)]
struct Layout {
    /// Row ranges, one per page. Always at least one page, possibly empty.
    pages: Vec<Range<usize>>,
    /// True when the last table page has no room for the totals block.
    totals_on_new_page: bool,
}

fn paginate(rows: usize) -> Layout {
    let mut pages = Vec::new();
    let mut start = 0;
    let mut capacity = FIRST_PAGE_ROWS;
    loop {
        let end = (start + capacity).min(rows);
        pages.push(start..end);
        if end == rows {
            break;
        }
        start = end;
        capacity = PAGE_ROWS;
    }
    let last_capacity = if pages.len() == 1 {
        FIRST_PAGE_ROWS
    } else {
        PAGE_ROWS
    };
    let used = pages.last().map(|r| r.len()).unwrap_or(0);
    Layout {
        pages,
        totals_on_new_page: used + TOTALS_ROWS > last_capacity,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::finance::Filter;
    use crate::model::{Amount, TransactionKind, TransactionRecord};
    use chrono::NaiveDate;
    use std::str::FromStr;

    fn table(n: usize) -> ExportTable {
        let date = NaiveDate::from_ymd_opt(2025, 3, 2).unwrap();
        let records: Vec<TransactionRecord> = (0..n)
            .map(|i| {
                TransactionRecord::new(
                    format!("txn-{i}"),
                    TransactionKind::Income,
                    Amount::from_str("100").unwrap(),
                    "Offering",
                    "Main",
                    date,
                    "ana@example.org",
                )
            })
            .collect();
        ExportTable::build("Grace Fellowship", &Filter::default(), &records, "PHP")
    }

    #[test]
    fn test_columns_fill_printable_width() {
        let total: f32 = COLUMNS.iter().sum();
        assert!((total - (PAGE_WIDTH - 2.0 * MARGIN)).abs() < 0.01);
    }

    #[test]
    fn test_paginate() {
        assert_eq!(
            paginate(0),
            Layout {
                pages: vec![0..0],
                totals_on_new_page: false
            }
        );
        assert_eq!(paginate(10).pages, vec![0..10]);

        let layout = paginate(FIRST_PAGE_ROWS + PAGE_ROWS + 1);
        assert_eq!(
            layout.pages,
            vec![
                0..FIRST_PAGE_ROWS,
                FIRST_PAGE_ROWS..FIRST_PAGE_ROWS + PAGE_ROWS,
                FIRST_PAGE_ROWS + PAGE_ROWS..FIRST_PAGE_ROWS + PAGE_ROWS + 1,
            ]
        );
        assert!(!layout.totals_on_new_page);

        // A full first page pushes the totals onto a page of their own.
        assert!(paginate(FIRST_PAGE_ROWS).totals_on_new_page);
    }

    #[test]
    fn test_fit() {
        assert_eq!(fit("Tithe", 28.0), "Tithe");
        let long = "A very long description that will never fit in the column";
        let shortened = fit(long, 20.0);
        assert!(shortened.ends_with("..."));
        assert!(shortened.chars().count() < long.chars().count());
    }

    #[test]
    fn test_render_produces_pdf() {
        let small = render(&table(3)).unwrap();
        assert!(small.starts_with(b"%PDF"));
        let large = render(&table(150)).unwrap();
        assert!(large.starts_with(b"%PDF"));
        assert!(large.len() > small.len());
    }
}
