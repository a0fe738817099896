//! Terminal rendering of audit results.

use modelmirror_core::data::ColumnKind;
use modelmirror_core::{AttributionResult, Dataset, FairnessResult, LeakageResult, Metric};
use std::fmt::Write as _;
use unicode_width::UnicodeWidthStr;

const BAR_WIDTH: usize = 20;
const MAX_CELL: usize = 18;

/// Proportional bar for a value in [0, 1]; blank for NaN.
pub fn bar(value: f64, width: usize) -> String {
    if value.is_nan() {
        return " ".repeat(width);
    }
    let filled = (value.clamp(0.0, 1.0) * width as f64).round() as usize;
    format!("{}{}", "█".repeat(filled), "·".repeat(width - filled))
}

fn score(value: f64) -> String {
    if value.is_nan() {
        "  n/a ".to_string()
    } else {
        format!("{value:.4}")
    }
}

fn pad(text: &str, width: usize) -> String {
    let fill = width.saturating_sub(text.width());
    format!("{text}{}", " ".repeat(fill))
}

fn clip(text: &str, width: usize) -> String {
    if text.width() <= width {
        return text.to_string();
    }
    let mut out = String::new();
    for ch in text.chars() {
        if out.width() + 2 > width {
            break;
        }
        out.push(ch);
    }
    out.push('…');
    out
}

/// Per-group metrics with one bar per metric, then the overall row and the
/// demographic parity difference.
pub fn fairness_table(result: &FairnessResult) -> String {
    let names: Vec<String> = result.by_group.keys().map(ToString::to_string).collect();
    let name_width = names
        .iter()
        .map(|n| n.width())
        .chain(["group".len(), "overall".len()])
        .max()
        .unwrap_or(5);

    let mut out = String::new();
    let _ = write!(out, "  {}  {:>6}", pad("group", name_width), "rows");
    for metric in Metric::ALL {
        let _ = write!(out, "  {}", pad(metric.name(), BAR_WIDTH + 8));
    }
    out.push('\n');

    let mut row = |label: &str, rows: usize, metrics: &std::collections::BTreeMap<Metric, f64>| {
        let _ = write!(out, "  {}  {rows:>6}", pad(label, name_width));
        for metric in Metric::ALL {
            let value = metrics.get(&metric).copied().unwrap_or(f64::NAN);
            let _ = write!(out, "  {} {}", score(value), bar(value, BAR_WIDTH));
        }
        out.push('\n');
    };

    for ((group, metrics), name) in result.by_group.iter().zip(&names) {
        let rows = result.group_sizes.get(group).copied().unwrap_or(0);
        row(name, rows, metrics);
    }
    let total = result.group_sizes.values().sum();
    row("overall", total, &result.overall);

    let _ = writeln!(
        out,
        "\n  demographic parity difference: {}",
        score(result.demographic_parity_difference).trim()
    );
    out
}

/// Leakage signals, strongest first, with `!` on features at or above `threshold`.
pub fn leakage_table(result: &LeakageResult, threshold: f64) -> String {
    if result.is_empty() {
        return format!("  No numeric features to compare with '{}'\n", result.target);
    }
    let width = result
        .iter()
        .map(|s| s.feature.width())
        .max()
        .unwrap_or(0)
        .max("feature".len());

    let mut out = format!("  {}  {:>6}\n", pad("feature", width), "|r|");
    for signal in result.iter() {
        let flag = if signal.correlation >= threshold { " !" } else { "" };
        let _ = writeln!(
            out,
            "  {}  {} {}{flag}",
            pad(&signal.feature, width),
            score(signal.correlation),
            bar(signal.correlation, BAR_WIDTH)
        );
    }
    out
}

/// Top features of one attribution run.
pub fn attribution_table(result: &AttributionResult, top: usize) -> String {
    let mut out = format!(
        "  {} ({} rows, baseline accuracy {})\n",
        result.scope,
        result.rows,
        score(result.baseline_accuracy).trim()
    );
    let features = result.top(top);
    let width = features.iter().map(|f| f.feature.width()).max().unwrap_or(0);
    for f in features {
        let _ = writeln!(
            out,
            "    {}  {:>8.4} ± {:.4}",
            pad(&f.feature, width),
            f.importance,
            f.std_dev
        );
    }
    out
}

fn kind_name(kind: ColumnKind) -> &'static str {
    match kind {
        ColumnKind::Numeric => "numeric",
        ColumnKind::Boolean => "boolean",
        ColumnKind::Categorical => "categorical",
    }
}

/// Column summary followed by the first `rows` rows.
pub fn dataset_preview(dataset: &Dataset, rows: usize) -> String {
    let mut out = format!("  {} rows × {} columns\n\n", dataset.n_rows(), dataset.n_cols());

    let name_width = dataset
        .columns()
        .iter()
        .map(|c| c.name.width())
        .max()
        .unwrap_or(0)
        .max("column".len());
    let _ = writeln!(
        out,
        "  {}  {:<11}  {:>6}  {:>6}",
        pad("column", name_width),
        "kind",
        "nulls",
        "unique"
    );
    for column in dataset.columns() {
        let _ = writeln!(
            out,
            "  {}  {:<11}  {:>6}  {:>6}",
            pad(&column.name, name_width),
            kind_name(column.kind()),
            column.null_count(),
            column.unique_count()
        );
    }

    let head = dataset.head(rows);
    if head.n_rows() == 0 {
        return out;
    }
    let cells: Vec<Vec<String>> = (0..head.n_rows())
        .map(|i| head.row(i).iter().map(|v| clip(&v.to_string(), MAX_CELL)).collect())
        .collect();
    let widths: Vec<usize> = head
        .columns()
        .iter()
        .enumerate()
        .map(|(j, c)| {
            cells
                .iter()
                .map(|r| r[j].width())
                .chain([clip(&c.name, MAX_CELL).width()])
                .max()
                .unwrap_or(0)
        })
        .collect();

    out.push('\n');
    let header: Vec<String> = head
        .columns()
        .iter()
        .zip(&widths)
        .map(|(c, &w)| pad(&clip(&c.name, MAX_CELL), w))
        .collect();
    let _ = writeln!(out, "  {}", header.join("  ").trim_end());
    for row in &cells {
        let line: Vec<String> = row.iter().zip(&widths).map(|(v, &w)| pad(v, w)).collect();
        let _ = writeln!(out, "  {}", line.join("  ").trim_end());
    }
    out
}
