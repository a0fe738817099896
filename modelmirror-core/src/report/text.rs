//! Plain-text report layout.
//!
//! Pages are separated by a form feed. Each page starts with the report title
//! and ends with a `Page N of M` footer; long lines are wrapped, never cut.

use super::Report;
use crate::error::{AuditError, Result};
use std::path::Path;
use textwrap::core::display_width;

/// Printable width of a text page.
pub const PAGE_WIDTH: usize = 88;
const INDENT: &str = "  ";

/// Lay the report body out into pages of at most `lines_per_page` lines.
pub fn paginate(report: &Report, lines_per_page: usize) -> Vec<Vec<String>> {
    let capacity = lines_per_page.max(1);
    // heading, rule and the first body line stay together
    let keep_together = capacity.min(3);
    let mut pages: Vec<Vec<String>> = vec![Vec::new()];

    for section in &report.sections {
        let current = pages.last().map_or(0, Vec::len);
        if current > 0 && capacity - current < keep_together {
            pages.push(Vec::new());
        }

        let mut lines = vec![section.title.clone(), "-".repeat(display_width(&section.title))];
        let body = section.lines();
        if body.is_empty() {
            lines.push(format!("{INDENT}(none)"));
        }
        for line in &body {
            let options = textwrap::Options::new(PAGE_WIDTH)
                .initial_indent(INDENT)
                .subsequent_indent("      ");
            lines.extend(textwrap::wrap(line, options).into_iter().map(|l| l.into_owned()));
        }

        for line in lines {
            if pages.last().is_some_and(|p| p.len() >= capacity) {
                pages.push(Vec::new());
            }
            if let Some(page) = pages.last_mut() {
                page.push(line);
            }
        }
        if let Some(page) = pages.last_mut().filter(|p| p.len() < capacity) {
            page.push(String::new());
        }
    }

    for page in &mut pages {
        while page.last().is_some_and(String::is_empty) {
            page.pop();
        }
    }
    pages.retain(|p| !p.is_empty());
    if pages.is_empty() {
        pages.push(Vec::new());
    }
    pages
}

fn centered(text: &str) -> String {
    let pad = PAGE_WIDTH.saturating_sub(display_width(text)) / 2;
    format!("{}{text}", " ".repeat(pad))
}

/// Render the full paginated document.
pub fn render(report: &Report, lines_per_page: usize) -> String {
    let pages = paginate(report, lines_per_page);
    let total = pages.len();
    let rendered: Vec<String> = pages
        .iter()
        .enumerate()
        .map(|(i, body)| {
            let mut out = String::new();
            out.push_str(&centered(&report.title));
            out.push('\n');
            out.push_str(&"=".repeat(PAGE_WIDTH));
            out.push_str("\n\n");
            for line in body {
                out.push_str(line);
                out.push('\n');
            }
            out.push('\n');
            out.push_str(&centered(&format!("Page {} of {total}", i + 1)));
            out.push('\n');
            out
        })
        .collect();
    rendered.join("\x0c\n")
}

/// Write the text report, returning the page count.
pub fn write_text(report: &Report, path: &Path, lines_per_page: usize) -> Result<usize> {
    let document = render(report, lines_per_page);
    let pages = document.matches("\x0c").count() + 1;
    std::fs::write(path, document)
        .map_err(|e| AuditError::export_failed(format!("Cannot write {}: {e}", path.display())))?;
    Ok(pages)
}
