//! CLI subcommand handlers.

use crate::render;
use crate::select;
use crate::{AuditArgs, Commands, ConfigAction, FairnessArgs, InspectArgs, LeakageArgs};
use modelmirror_core::config::AuditConfig;
use modelmirror_core::explain::group_permutation_importance;
use modelmirror_core::fairness::FairnessOptions;
use modelmirror_core::model::{feature_frame, predict_checked};
use modelmirror_core::report::{ReportContent, pdf};
use modelmirror_core::{
    AttributionResult, AuditError, Dataset, FairnessResult, Label, LeakageResult, Predictor,
    PositiveClass, check_leakage, evaluate_fairness_with, export_report_with, load_dataset,
    load_model, permutation_importance,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Attribution rows shown per scope in the terminal.
const TOP_FEATURES: usize = 10;

/// State shared by every subcommand.
pub struct Context {
    pub workspace: PathBuf,
    pub config: AuditConfig,
    pub quiet: bool,
}

/// Handle a CLI subcommand.
pub async fn handle_command(command: Commands, ctx: &Context) -> anyhow::Result<()> {
    match command {
        Commands::Audit(args) => handle_audit(args, ctx).await,
        Commands::Fairness(args) => handle_fairness(args, ctx).await,
        Commands::Leakage(args) => handle_leakage(args, ctx).await,
        Commands::Inspect(args) => handle_inspect(args, ctx).await,
        Commands::Config { action } => handle_config(action, ctx),
    }
}

fn positive_class(flag: Option<&str>, config: &AuditConfig) -> PositiveClass {
    PositiveClass::from_option(
        flag.map(Label::parse)
            .or_else(|| config.fairness.positive_label()),
    )
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn report_fairness(result: &FairnessResult, quiet: bool) {
    println!("\n  Fairness Metrics\n");
    print!("{}", render::fairness_table(result));
    if result.is_degenerate() && !quiet {
        println!("  note: fewer than two groups, so the parity difference is trivially 0");
    }
}

fn report_leakage(result: &LeakageResult, threshold: f64, quiet: bool) {
    println!("\n  Leakage Signals (target: {})\n", result.target);
    print!("{}", render::leakage_table(result, threshold));
    let suspicious = result.suspicious(threshold);
    for signal in &suspicious {
        warn!(
            feature = %signal.feature,
            correlation = signal.correlation,
            threshold,
            "Possible target leakage"
        );
    }
    if !suspicious.is_empty() && !quiet {
        println!(
            "\n  ! {} feature(s) correlate with the target at |r| >= {threshold}; check them for leakage",
            suspicious.len()
        );
    }
}

/// Global attribution plus one run per non-empty group. Failures are logged
/// and skipped.
async fn collect_attributions(
    model: &dyn Predictor,
    features: &Dataset,
    y_true: &[Label],
    group: &[Label],
    fairness: &FairnessResult,
    ctx: &Context,
) -> Vec<AttributionResult> {
    let config = &ctx.config.explain;
    let mut results = Vec::new();
    match permutation_importance(model, features, y_true, config).await {
        Ok(result) => results.push(result),
        Err(e) => warn!(error = %e, "Global feature attribution failed"),
    }
    for (selected, &rows) in &fairness.group_sizes {
        if rows == 0 {
            continue;
        }
        match group_permutation_importance(model, features, y_true, group, selected, config).await {
            Ok(result) => results.push(result),
            Err(e) => warn!(group = %selected, error = %e, "Group feature attribution failed"),
        }
    }
    results
}

#[derive(Serialize)]
struct AuditSummary<'a> {
    model: String,
    rows: usize,
    target: &'a str,
    protected: &'a str,
    fairness: &'a FairnessResult,
    leakage: &'a LeakageResult,
    attributions: &'a [AttributionResult],
    report: &'a Path,
}

async fn handle_audit(args: AuditArgs, ctx: &Context) -> anyhow::Result<()> {
    let config = &ctx.config;
    let dataset = load_dataset(&args.data, &config.data).await?;
    let model = load_model(&args.model, &config.python).await?;

    let target = select::column(args.target, &dataset, "--target", "Target column")?;
    let protected = select::distinct_column(
        args.protected,
        &dataset,
        &[target.as_str()],
        "--protected",
        "Protected attribute",
    )?;

    let features = feature_frame(&dataset, model.as_ref(), &target)?;
    let y_pred = predict_checked(model.as_ref(), &features).await?;
    let y_true = dataset.labels(&target)?;
    let group = dataset.labels(&protected)?;

    let options = FairnessOptions {
        positive: positive_class(args.positive_label.as_deref(), config),
        ..FairnessOptions::default()
    };
    let fairness = evaluate_fairness_with(&y_true, &y_pred, &group, &options)?;

    let leakage = match check_leakage(&dataset, &target) {
        Ok(result) => result,
        Err(AuditError::NonNumericTarget(column)) => {
            warn!(target = %column, "Target is not numeric; skipping leakage signals");
            LeakageResult {
                target: column,
                signals: Vec::new(),
            }
        }
        Err(e) => return Err(e.into()),
    };

    let attributions = if config.explain.enabled && !args.no_explain {
        collect_attributions(model.as_ref(), &features, &y_true, &group, &fairness, ctx).await
    } else {
        Vec::new()
    };

    let destination = match args.output {
        Some(path) => path,
        None if config.report.default_output.is_relative() => {
            ctx.workspace.join(&config.report.default_output)
        }
        None => config.report.default_output.clone(),
    };
    let content = ReportContent {
        fairness: &fairness,
        leakage: &leakage,
        attributions: &attributions,
    };
    let written = export_with_text_fallback(&destination, |dest| {
        export_report_with(&content, dest, &config.report)
    })?;
    info!(
        model = %args.model.display(),
        data = %args.data.display(),
        target = %target,
        protected = %protected,
        report = %written.display(),
        "Audit complete"
    );

    if args.json {
        return print_json(&AuditSummary {
            model: model.kind().to_string(),
            rows: dataset.n_rows(),
            target: &target,
            protected: &protected,
            fairness: &fairness,
            leakage: &leakage,
            attributions: &attributions,
            report: &written,
        });
    }

    println!(
        "\n  Audited {} model on {} rows (target: {target}, protected: {protected})",
        model.kind(),
        dataset.n_rows()
    );
    report_fairness(&fairness, ctx.quiet);
    report_leakage(&leakage, config.leakage.suspicious_threshold, ctx.quiet);
    if !attributions.is_empty() {
        println!("\n  Feature Attributions (permutation importance)\n");
        for result in &attributions {
            print!("{}", render::attribution_table(result, TOP_FEATURES));
        }
    }
    if written != destination {
        println!("\n  No font available for PDF output; wrote a text report instead");
    }
    println!("\n  Report written to {}\n", written.display());
    Ok(())
}

/// Run `export`, retrying at the `.txt` sibling of `destination` when the PDF
/// writer finds no usable font.
fn export_with_text_fallback<F>(
    destination: &Path,
    mut export: F,
) -> modelmirror_core::Result<PathBuf>
where
    F: FnMut(&Path) -> modelmirror_core::Result<PathBuf>,
{
    match export(destination) {
        Err(err) if pdf::is_missing_fonts(&err) => {
            let fallback = destination.with_extension("txt");
            warn!(
                pdf = %destination.display(),
                text = %fallback.display(),
                error = %err,
                "PDF export unavailable, writing text report"
            );
            export(&fallback)
        }
        other => other,
    }
}

async fn handle_fairness(args: FairnessArgs, ctx: &Context) -> anyhow::Result<()> {
    let dataset = load_dataset(&args.data, &ctx.config.data).await?;
    let truth = select::column(args.truth, &dataset, "--truth", "Ground-truth column")?;
    let pred = select::distinct_column(args.pred, &dataset, &[truth.as_str()], "--pred", "Prediction column")?;
    let group = select::distinct_column(
        args.group,
        &dataset,
        &[truth.as_str(), pred.as_str()],
        "--group",
        "Protected attribute",
    )?;

    let options = FairnessOptions {
        positive: positive_class(args.positive_label.as_deref(), &ctx.config),
        ..FairnessOptions::default()
    };
    let result = evaluate_fairness_with(
        &dataset.labels(&truth)?,
        &dataset.labels(&pred)?,
        &dataset.labels(&group)?,
        &options,
    )?;

    if args.json {
        return print_json(&result);
    }
    report_fairness(&result, ctx.quiet);
    println!();
    Ok(())
}

async fn handle_leakage(args: LeakageArgs, ctx: &Context) -> anyhow::Result<()> {
    let dataset = load_dataset(&args.data, &ctx.config.data).await?;
    let target = select::column(args.target, &dataset, "--target", "Target column")?;
    let result = check_leakage(&dataset, &target)?;

    if args.json {
        return print_json(&result);
    }
    report_leakage(&result, ctx.config.leakage.suspicious_threshold, ctx.quiet);
    println!();
    Ok(())
}

async fn handle_inspect(args: InspectArgs, ctx: &Context) -> anyhow::Result<()> {
    let dataset = load_dataset(&args.data, &ctx.config.data).await?;
    println!("\n  {}\n", args.data.display());
    print!("{}", render::dataset_preview(&dataset, args.rows));

    if let Some(model_path) = args.model {
        let model = load_model(&model_path, &ctx.config.python).await?;
        println!("\n  Model: {} ({})", model_path.display(), model.kind());
        match model.feature_names() {
            None => println!("  The model does not declare its feature names"),
            Some(features) => {
                let missing: Vec<&str> = features
                    .iter()
                    .map(String::as_str)
                    .filter(|f| !dataset.has_column(f))
                    .collect();
                let unused: Vec<&str> = dataset
                    .column_names()
                    .into_iter()
                    .filter(|c| !features.iter().any(|f| f == c))
                    .collect();
                if missing.is_empty() {
                    println!("  All {} model features are present in the dataset", features.len());
                } else {
                    println!(
                        "  Mismatch between model features and dataset columns; missing: {}",
                        missing.join(", ")
                    );
                }
                if !unused.is_empty() {
                    println!("  Columns not used by the model: {}", unused.join(", "));
                }
            }
        }
    }
    println!();
    Ok(())
}

fn handle_config(action: ConfigAction, ctx: &Context) -> anyhow::Result<()> {
    let path = ctx.workspace.join(".modelmirror").join("config.toml");
    match action {
        ConfigAction::Init if path.exists() => {
            println!("  {} already exists; left unchanged", path.display());
        }
        ConfigAction::Init => {
            if let Some(dir) = path.parent() {
                std::fs::create_dir_all(dir)?;
            }
            std::fs::write(&path, toml::to_string_pretty(&AuditConfig::default())?)?;
            println!("  Wrote default audit settings to {}", path.display());
        }
        ConfigAction::Show => print!("{}", toml::to_string_pretty(&ctx.config)?),
    }
    Ok(())
}
