//! Audit report export.
//!
//! A report is a title plus an ordered list of sections, laid out into pages
//! with the title repeated as a header and a page number as a footer. The
//! output format follows the destination extension: `.pdf` or `.txt`.

pub mod pdf;
pub mod text;

use crate::config::ReportConfig;
use crate::error::{AuditError, Result};
use crate::explain::AttributionResult;
use crate::fairness::{FairnessResult, format_score};
use crate::leakage::LeakageResult;
use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use tracing::info;

pub const TIMESTAMP_SECTION: &str = "Audit Timestamp";
pub const FAIRNESS_SECTION: &str = "Fairness Metrics";
pub const LEAKAGE_SECTION: &str = "Leakage Signals";
pub const ATTRIBUTION_SECTION: &str = "Feature Attributions";

/// Body of a report section.
#[derive(Debug, Clone, PartialEq)]
pub enum SectionBody {
    Text(String),
    KeyValues(Vec<(String, String)>),
    Rows(Vec<String>),
}

/// A titled block of report content.
#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    pub title: String,
    pub body: SectionBody,
}

impl Section {
    /// Body rendered as plain lines.
    pub fn lines(&self) -> Vec<String> {
        match &self.body {
            SectionBody::Text(text) => text.lines().map(str::to_string).collect(),
            SectionBody::KeyValues(pairs) => pairs.iter().map(|(k, v)| format!("{k}: {v}")).collect(),
            SectionBody::Rows(rows) => rows.clone(),
        }
    }
}

/// Everything that goes into one report.
#[derive(Debug, Clone, Copy)]
pub struct ReportContent<'a> {
    pub fairness: &'a FairnessResult,
    pub leakage: &'a LeakageResult,
    pub attributions: &'a [AttributionResult],
}

/// A laid-out report, built once per export.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub title: String,
    pub sections: Vec<Section>,
}

impl Report {
    pub fn build(content: &ReportContent<'_>, title: &str, generated_at: DateTime<Local>) -> Self {
        let mut sections = vec![
            Section {
                title: TIMESTAMP_SECTION.to_string(),
                body: SectionBody::Text(generated_at.format("%Y-%m-%d %H:%M:%S").to_string()),
            },
            Section {
                title: FAIRNESS_SECTION.to_string(),
                body: SectionBody::KeyValues(content.fairness.flatten()),
            },
            Section {
                title: LEAKAGE_SECTION.to_string(),
                body: SectionBody::Rows(
                    content
                        .leakage
                        .iter()
                        .map(|s| format!("{}: {}", s.feature, format_score(s.correlation)))
                        .collect(),
                ),
            },
        ];
        if !content.attributions.is_empty() {
            let rows = content
                .attributions
                .iter()
                .flat_map(|a| {
                    a.features.iter().map(move |f| {
                        format!(
                            "[{}] {}: {} (+/- {})",
                            a.scope,
                            f.feature,
                            format_score(f.importance),
                            format_score(f.std_dev)
                        )
                    })
                })
                .collect();
            sections.push(Section {
                title: ATTRIBUTION_SECTION.to_string(),
                body: SectionBody::Rows(rows),
            });
        }
        Self {
            title: title.to_string(),
            sections,
        }
    }
}

/// Output formats, chosen from the destination extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Pdf,
    Text,
}

impl ReportFormat {
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("pdf") => Ok(Self::Pdf),
            Some("txt" | "text") => Ok(Self::Text),
            _ => Err(AuditError::export_failed(format!(
                "Unsupported report destination {} (use .pdf or .txt)",
                path.display()
            ))),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Text => "text",
        }
    }
}

/// Export fairness and leakage results with default report settings.
pub fn export_report(
    fairness: &FairnessResult,
    leakage: &LeakageResult,
    destination: &Path,
) -> Result<PathBuf> {
    let content = ReportContent {
        fairness,
        leakage,
        attributions: &[],
    };
    export_report_with(&content, destination, &ReportConfig::default())
}

/// Export a report, overwriting `destination`. Returns the path written.
pub fn export_report_with(
    content: &ReportContent<'_>,
    destination: &Path,
    config: &ReportConfig,
) -> Result<PathBuf> {
    let format = ReportFormat::from_path(destination)?;
    let report = Report::build(content, &config.title, Local::now());

    if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| {
            AuditError::export_failed(format!("Cannot create {}: {e}", parent.display()))
        })?;
    }

    let pages = match format {
        ReportFormat::Text => text::write_text(&report, destination, config.lines_per_page)?,
        ReportFormat::Pdf => pdf::write_pdf(&report, destination, config)?,
    };

    info!(
        path = %destination.display(),
        format = format.name(),
        pages,
        "Exported audit report"
    );
    Ok(destination.to_path_buf())
}
