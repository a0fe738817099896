//! PDF report rendering with genpdf.

use super::Report;
use crate::config::ReportConfig;
use crate::error::{AuditError, Result};
use genpdf::elements::{Break, Paragraph};
use genpdf::fonts::{FontData, FontFamily};
use genpdf::style::{Style, StyledString};
use genpdf::{Alignment, Context, Document, Element, Mm, PageDecorator, Position, render};
use std::cell::Cell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

const MARGIN_MM: i32 = 20;
const HEADER_GAP_MM: f64 = 6.0;
const FOOTER_MM: f64 = 10.0;

/// Draws the report title at the top and the page number at the bottom of
/// every page.
struct AuditPageDecorator {
    title: String,
    pages: Rc<Cell<usize>>,
}

impl PageDecorator for AuditPageDecorator {
    fn decorate_page<'a>(
        &mut self,
        context: &Context,
        mut area: render::Area<'a>,
        style: Style,
    ) -> std::result::Result<render::Area<'a>, genpdf::error::Error> {
        let page = self.pages.get() + 1;
        self.pages.set(page);
        area.add_margins(MARGIN_MM);

        let mut header = Paragraph::new(StyledString::new(
            self.title.clone(),
            Style::new().bold().with_font_size(14),
        ))
        .aligned(Alignment::Center);
        let rendered = header.render(context, area.clone(), style)?;
        area.add_offset(Position::new(0, rendered.size.height + Mm::from(HEADER_GAP_MM)));

        let height = area.size().height;
        let mut footer_area = area.clone();
        footer_area.add_offset(Position::new(0, height - Mm::from(FOOTER_MM)));
        let mut footer = Paragraph::new(StyledString::new(
            format!("Page {page}"),
            Style::new().italic().with_font_size(9),
        ))
        .aligned(Alignment::Center);
        footer.render(context, footer_area, style)?;
        area.set_height(height - Mm::from(FOOTER_MM));

        Ok(area)
    }
}

/// Where a font family can be loaded from.
#[derive(Debug, Clone, PartialEq)]
enum FontSource {
    /// `<dir>/<family>-{Regular,Bold,Italic,BoldItalic}.ttf`
    Family { dir: PathBuf, family: String },
    /// Explicit files, for fonts shipped under their own naming scheme.
    /// Only `regular` is required; missing variants reuse it.
    Files {
        regular: PathBuf,
        bold: PathBuf,
        italic: PathBuf,
        bold_italic: PathBuf,
    },
}

impl FontSource {
    fn files(dir: &str, regular: &str, bold: &str, italic: &str, bold_italic: &str) -> Self {
        let dir = Path::new(dir);
        FontSource::Files {
            regular: dir.join(regular),
            bold: dir.join(bold),
            italic: dir.join(italic),
            bold_italic: dir.join(bold_italic),
        }
    }

    fn load(&self) -> Option<FontFamily<FontData>> {
        match self {
            FontSource::Family { dir, family } => genpdf::fonts::from_files(dir, family, None).ok(),
            FontSource::Files {
                regular,
                bold,
                italic,
                bold_italic,
            } => {
                let regular = FontData::load(regular, None).ok()?;
                let variant = |path: &PathBuf| FontData::load(path, None).unwrap_or_else(|_| regular.clone());
                Some(FontFamily {
                    bold: variant(bold),
                    italic: variant(italic),
                    bold_italic: variant(bold_italic),
                    regular,
                })
            }
        }
    }

    fn describe(&self) -> String {
        match self {
            FontSource::Family { dir, family } => format!("{}/{family}-*.ttf", dir.display()),
            FontSource::Files { regular, .. } => regular.display().to_string(),
        }
    }
}

fn font_candidates(config: &ReportConfig) -> Vec<FontSource> {
    let family = &config.font_family;
    let mut candidates = Vec::new();
    if let Some(dir) = &config.font_dir {
        candidates.push(FontSource::Family {
            dir: dir.clone(),
            family: family.clone(),
        });
    }
    for dir in [
        "/usr/share/fonts/truetype/liberation",
        "/usr/share/fonts/liberation-sans",
        "/usr/share/fonts/liberation",
        "/usr/share/fonts/TTF",
    ] {
        candidates.push(FontSource::Family {
            dir: PathBuf::from(dir),
            family: family.clone(),
        });
    }
    for dir in [
        "/usr/share/fonts/truetype/dejavu",
        "/usr/share/fonts/dejavu-sans-fonts",
        "/usr/share/fonts/dejavu",
        "/usr/share/fonts/TTF",
    ] {
        candidates.push(FontSource::files(
            dir,
            "DejaVuSans.ttf",
            "DejaVuSans-Bold.ttf",
            "DejaVuSans-Oblique.ttf",
            "DejaVuSans-BoldOblique.ttf",
        ));
    }
    candidates.push(FontSource::files(
        "/usr/share/fonts/truetype/freefont",
        "FreeSans.ttf",
        "FreeSansBold.ttf",
        "FreeSansOblique.ttf",
        "FreeSansBoldOblique.ttf",
    ));
    candidates.push(FontSource::files(
        "/Library/Fonts",
        "Arial.ttf",
        "Arial Bold.ttf",
        "Arial Italic.ttf",
        "Arial Bold Italic.ttf",
    ));
    candidates.push(FontSource::files(
        "/System/Library/Fonts/Supplemental",
        "Arial.ttf",
        "Arial Bold.ttf",
        "Arial Italic.ttf",
        "Arial Bold Italic.ttf",
    ));
    candidates.push(FontSource::files(
        "C:\\Windows\\Fonts",
        "arial.ttf",
        "arialbd.ttf",
        "ariali.ttf",
        "arialbi.ttf",
    ));
    candidates
}

fn load_fonts(config: &ReportConfig) -> Result<FontFamily<FontData>> {
    let candidates = font_candidates(config);
    if let Some(fonts) = candidates.iter().find_map(FontSource::load) {
        return Ok(fonts);
    }
    let searched: Vec<String> = candidates.iter().map(FontSource::describe).collect();
    Err(AuditError::export_failed(format!(
        "No usable font found (searched {}); set report.font_dir or export to .txt",
        searched.join(", ")
    )))
}

/// Whether an export error came from the font search rather than rendering.
pub fn is_missing_fonts(err: &AuditError) -> bool {
    matches!(err, AuditError::ExportFailed(msg) if msg.starts_with("No usable font"))
}

/// Render the report to `path`, returning the number of pages written.
pub fn write_pdf(report: &Report, path: &Path, config: &ReportConfig) -> Result<usize> {
    let fonts = load_fonts(config)?;
    let mut doc = Document::new(fonts);
    doc.set_title(report.title.clone());
    doc.set_font_size(10);
    doc.set_line_spacing(1.25);

    let pages = Rc::new(Cell::new(0));
    doc.set_page_decorator(AuditPageDecorator {
        title: report.title.clone(),
        pages: Rc::clone(&pages),
    });

    for section in &report.sections {
        doc.push(Paragraph::new(StyledString::new(
            section.title.clone(),
            Style::new().bold().with_font_size(12),
        )));
        doc.push(Break::new(0.3));
        let lines = section.lines();
        if lines.is_empty() {
            doc.push(Paragraph::new("(none)"));
        }
        for line in lines {
            doc.push(Paragraph::new(line));
        }
        doc.push(Break::new(1));
    }

    doc.render_to_file(path)
        .map_err(|e| AuditError::export_failed(format!("Failed to render PDF: {e}")))?;
    Ok(pages.get())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{Section, SectionBody};

    fn report() -> Report {
        Report {
            title: "Audit".into(),
            sections: vec![Section {
                title: "Fairness Metrics".into(),
                body: SectionBody::KeyValues(vec![("overall.accuracy".into(), "0.7500".into())]),
            }],
        }
    }

    fn long_report(rows: usize) -> Report {
        Report {
            title: "Loan Model Audit".into(),
            sections: vec![
                Section {
                    title: "Fairness Metrics".into(),
                    body: SectionBody::KeyValues(
                        (0..rows)
                            .map(|i| (format!("by_group.g{i:03}.accuracy"), "0.7500".into()))
                            .collect(),
                    ),
                },
                Section {
                    title: "Leakage Signals".into(),
                    body: SectionBody::Rows(Vec::new()),
                },
            ],
        }
    }

    #[test]
    fn test_configured_font_dir_searched_first() {
        let config = ReportConfig {
            font_dir: Some(PathBuf::from("/opt/fonts")),
            ..ReportConfig::default()
        };
        let candidates = font_candidates(&config);
        assert_eq!(
            candidates[0],
            FontSource::Family {
                dir: PathBuf::from("/opt/fonts"),
                family: config.font_family.clone(),
            }
        );
    }

    #[test]
    fn test_dejavu_loaded_by_file_name() {
        let candidates = font_candidates(&ReportConfig::default());
        let dejavu = FontSource::files(
            "/usr/share/fonts/truetype/dejavu",
            "DejaVuSans.ttf",
            "DejaVuSans-Bold.ttf",
            "DejaVuSans-Oblique.ttf",
            "DejaVuSans-BoldOblique.ttf",
        );
        let liberation = candidates
            .iter()
            .position(|c| matches!(c, FontSource::Family { .. }))
            .unwrap();
        let dejavu_at = candidates.iter().position(|c| *c == dejavu).unwrap();
        assert!(liberation < dejavu_at);
    }

    #[test]
    fn test_missing_fonts_is_export_error() {
        let dir = tempfile::tempdir().unwrap();
        let source = FontSource::Family {
            dir: dir.path().to_path_buf(),
            family: "NoSuchFontFamily".into(),
        };
        assert!(source.load().is_none());

        let missing = FontSource::Files {
            regular: dir.path().join("Nope.ttf"),
            bold: dir.path().join("Nope-Bold.ttf"),
            italic: dir.path().join("Nope-Italic.ttf"),
            bold_italic: dir.path().join("Nope-BoldItalic.ttf"),
        };
        assert!(missing.load().is_none());

        let err = AuditError::export_failed(format!("No usable font found (searched {})", source.describe()));
        assert!(is_missing_fonts(&err));
        assert!(!is_missing_fonts(&AuditError::export_failed("Failed to render PDF: io")));
    }

    #[test]
    fn test_single_page_report() {
        let config = ReportConfig::default();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("r.pdf");
        let pages = write_pdf(&report(), &path, &config).unwrap();
        assert_eq!(pages, 1);
        let bytes = std::fs::read(&path).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[test]
    fn test_long_report_breaks_across_pages() {
        let config = ReportConfig::default();
        load_fonts(&config).expect("a system sans font (Liberation, DejaVu, FreeSans or Arial)");
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("long.pdf");

        let pages = write_pdf(&long_report(200), &path, &config).unwrap();
        assert!(pages > 1, "200 lines fit on {pages} page(s)");

        let bytes = std::fs::read(&path).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
        assert!(bytes.len() > 1024);

        // twice the rows, more pages
        let longer = write_pdf(&long_report(400), &dir.path().join("longer.pdf"), &config).unwrap();
        assert!(longer > pages);
    }
}
