//! Property-based tests for the audit components using proptest.

use proptest::prelude::*;

use modelmirror_core::data::{Column, Dataset, Label};
use modelmirror_core::fairness::{Metric, evaluate_fairness};
use modelmirror_core::leakage::{check_leakage, pearson};
use modelmirror_core::report::text::paginate;
use modelmirror_core::report::{Report, Section, SectionBody};

fn labelled_rows() -> impl Strategy<Value = (Vec<Label>, Vec<Label>, Vec<Label>)> {
    (1usize..60).prop_flat_map(|n| {
        (
            prop::collection::vec(0i64..2, n),
            prop::collection::vec(0i64..2, n),
            prop::collection::vec(0u8..4, n),
        )
            .prop_map(|(t, p, g)| {
                (
                    t.into_iter().map(Label::Int).collect(),
                    p.into_iter().map(Label::Int).collect(),
                    g.into_iter().map(|g| Label::from(format!("g{g}").as_str())).collect(),
                )
            })
    })
}

// --- Fairness properties ---

proptest! {
    #[test]
    fn single_group_has_zero_parity_gap(
        truth in prop::collection::vec(0i64..2, 1..50),
        seed in 0i64..2,
    ) {
        let y_true: Vec<Label> = truth.iter().copied().map(Label::Int).collect();
        let y_pred: Vec<Label> = truth.iter().map(|t| Label::Int((t + seed) % 2)).collect();
        let group = vec![Label::from("only"); y_true.len()];
        let result = evaluate_fairness(&y_true, &y_pred, &group).unwrap();
        prop_assert_eq!(result.demographic_parity_difference, 0.0);
        prop_assert!(result.is_degenerate());
    }

    #[test]
    fn metrics_are_rates((y_true, y_pred, group) in labelled_rows()) {
        let result = evaluate_fairness(&y_true, &y_pred, &group).unwrap();
        for metrics in result.by_group.values().chain(std::iter::once(&result.overall)) {
            for metric in Metric::ALL {
                let v = metrics[&metric];
                prop_assert!((0.0..=1.0).contains(&v), "{metric} = {v}");
            }
        }
        prop_assert!((0.0..=1.0).contains(&result.demographic_parity_difference));
        let total: usize = result.group_sizes.values().sum();
        prop_assert_eq!(total, y_true.len());
    }

    #[test]
    fn row_order_does_not_matter((y_true, y_pred, group) in labelled_rows()) {
        let forward = evaluate_fairness(&y_true, &y_pred, &group).unwrap();
        let rev = |v: &[Label]| v.iter().rev().cloned().collect::<Vec<_>>();
        let backward = evaluate_fairness(&rev(&y_true), &rev(&y_pred), &rev(&group)).unwrap();
        prop_assert_eq!(forward.flatten(), backward.flatten());
    }

    #[test]
    fn mismatched_lengths_always_rejected(
        n in 1usize..20,
        extra in 1usize..5,
    ) {
        let a = vec![Label::Int(1); n];
        let b = vec![Label::Int(1); n + extra];
        prop_assert!(evaluate_fairness(&a, &b, &a).is_err());
        prop_assert!(evaluate_fairness(&a, &a, &b).is_err());
    }
}

// --- Leakage properties ---

proptest! {
    #[test]
    fn pearson_is_bounded_and_symmetric(
        pairs in prop::collection::vec((-100i32..100, -100i32..100), 2..40),
    ) {
        let x: Vec<Option<f64>> = pairs.iter().map(|p| Some(f64::from(p.0))).collect();
        let y: Vec<Option<f64>> = pairs.iter().map(|p| Some(f64::from(p.1))).collect();
        let r = pearson(&x, &y);
        let s = pearson(&y, &x);
        if r.is_nan() {
            prop_assert!(s.is_nan());
        } else {
            prop_assert!(r.abs() <= 1.0 + 1e-9);
            prop_assert!((r - s).abs() < 1e-12);
        }
    }

    #[test]
    fn leakage_ranks_every_numeric_feature(
        cols in (2usize..30).prop_flat_map(|n| prop::collection::vec(prop::collection::vec(-3i32..3, n), 2..6)),
    ) {
        let columns: Vec<Column> = cols
            .iter()
            .enumerate()
            .map(|(i, values)| {
                let name = if i == 0 { "target".to_string() } else { format!("f{i}") };
                Column::numeric(name, values.iter().map(|&v| f64::from(v)))
            })
            .collect();
        let mut with_text = columns.clone();
        with_text.push(Column::text("city", vec!["x"; cols[0].len()]));
        let ds = Dataset::new(with_text).unwrap();

        let result = check_leakage(&ds, "target").unwrap();
        prop_assert_eq!(result.len(), cols.len() - 1);
        prop_assert!(result.iter().all(|s| s.feature != "target" && s.feature != "city"));

        let values: Vec<f64> = result.iter().map(|s| s.correlation).collect();
        let first_nan = values.iter().position(|v| v.is_nan()).unwrap_or(values.len());
        prop_assert!(values[first_nan..].iter().all(|v| v.is_nan()));
        prop_assert!(values[..first_nan].windows(2).all(|w| w[0] >= w[1]));
        prop_assert!(values[..first_nan].iter().all(|v| (0.0..=1.0 + 1e-9).contains(v)));
    }
}

// --- Report layout properties ---

proptest! {
    #[test]
    fn pagination_respects_page_size_and_keeps_every_line(
        rows in 0usize..200,
        lines_per_page in 1usize..40,
    ) {
        let report = Report {
            title: "Audit".into(),
            sections: vec![Section {
                title: "Leakage Signals".into(),
                body: SectionBody::Rows((0..rows).map(|i| format!("f{i}: 0.5000")).collect()),
            }],
        };
        let pages = paginate(&report, lines_per_page);
        prop_assert!(!pages.is_empty());
        prop_assert!(pages.iter().all(|p| p.len() <= lines_per_page));
        let body_lines = pages.iter().flatten().filter(|l| l.starts_with("  f")).count();
        prop_assert_eq!(body_lines, rows);
    }
}
