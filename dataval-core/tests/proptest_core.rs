//! Property-based tests for core components using proptest.

use proptest::prelude::*;

use dataval_core::Matrix;
use dataval_core::SeedManager;
use dataval_core::experiment::methods::{bin_width, two_means_low_cluster};
use dataval_core::experiment::{MeanStdTime, ResultRow, ResultTable};
use dataval_core::reproducibility::{choose_distinct, seeded_rng};

// --- Bin width properties ---

proptest! {
    #[test]
    fn bin_width_has_floor_of_five(n in 0usize..5000, percentile in 0.001f64..=1.0) {
        let width = bin_width(n, percentile).unwrap();
        prop_assert!(width >= 5);
        prop_assert!(width <= n.max(5));
    }

    #[test]
    fn bin_width_rejects_out_of_range(n in 0usize..1000, percentile in 1.0001f64..10.0) {
        prop_assert!(bin_width(n, percentile).is_err());
        prop_assert!(bin_width(n, -percentile).is_err());
    }
}

// --- Two-means clustering properties ---

proptest! {
    #[test]
    fn two_means_keeps_minimum_in_low_cluster(
        values in prop::collection::vec(-100.0f64..100.0, 1..200),
    ) {
        let low = two_means_low_cluster(&values);
        prop_assert_eq!(low.len(), values.len());
        let min_pos = values
            .iter()
            .enumerate()
            .min_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap();
        prop_assert!(low[min_pos]);
    }

    #[test]
    fn two_means_separates_distant_groups(
        low_n in 1usize..50,
        high_n in 1usize..50,
        jitter in 0.0f64..0.5,
    ) {
        let mut values = vec![0.0 + jitter; low_n];
        values.extend(std::iter::repeat_n(10.0 - jitter, high_n));
        let low = two_means_low_cluster(&values);
        prop_assert_eq!(low.iter().filter(|f| **f).count(), low_n);
        prop_assert!(low[..low_n].iter().all(|f| *f));
    }
}

// --- Sweep statistics properties ---

proptest! {
    #[test]
    fn mean_lies_within_sample_range(
        scores in prop::collection::vec(0.0f64..1.0, 1..50),
    ) {
        let stats = MeanStdTime::from_samples(&scores, &[]);
        let min = scores.iter().copied().fold(f64::INFINITY, f64::min);
        let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        prop_assert!(stats.mean >= min - 1e-12 && stats.mean <= max + 1e-12);
        prop_assert!(stats.std >= 0.0);
        prop_assert_eq!(stats.avg_time, 0.0);
    }

    #[test]
    fn constant_samples_have_zero_std(value in -5.0f64..5.0, n in 1usize..30) {
        let stats = MeanStdTime::from_samples(&vec![value; n], &vec![0.5; n]);
        prop_assert!(stats.std.abs() < 1e-9);
        prop_assert!((stats.avg_time - 0.5).abs() < 1e-12);
    }
}

// --- Sampling and seeding properties ---

proptest! {
    #[test]
    fn choose_distinct_is_sorted_and_in_range(
        seed in any::<u64>(),
        n in 0usize..500,
        count in 0usize..600,
    ) {
        let picked = choose_distinct(&mut seeded_rng(seed), n, count);
        prop_assert_eq!(picked.len(), count.min(n));
        prop_assert!(picked.windows(2).all(|w| w[0] < w[1]));
        prop_assert!(picked.iter().all(|&i| i < n));
    }

    #[test]
    fn component_seeds_are_stable(global in any::<u64>(), name in "[a-z/_]{1,24}") {
        let mut a = SeedManager::new(global);
        let mut b = SeedManager::new(global);
        b.get_seed("other");
        prop_assert_eq!(a.get_seed(&name), b.get_seed(&name));
    }
}

// --- Matrix properties ---

proptest! {
    #[test]
    fn select_rows_copies_requested_rows(
        rows in 1usize..20,
        cols in 1usize..6,
        picks in prop::collection::vec(0usize..1000, 0..40),
    ) {
        let data: Vec<f64> = (0..rows * cols).map(|v| v as f64).collect();
        let m = Matrix::from_vec(rows, cols, data).unwrap();
        let indices: Vec<usize> = picks.iter().map(|p| p % rows).collect();
        let selected = m.select_rows(&indices);
        prop_assert_eq!(selected.rows(), indices.len());
        prop_assert_eq!(selected.cols(), cols);
        for (r, &i) in indices.iter().enumerate() {
            prop_assert_eq!(selected.row(r), m.row(i));
        }
    }
}

// --- Result table properties ---

fn result_table() -> impl Strategy<Value = ResultTable> {
    (1usize..5).prop_flat_map(|width| {
        (
            prop::collection::vec("[a-z_]{1,12}", width),
            prop::collection::vec(
                (
                    "[A-Za-z]{1,10}(\\([a-z_]{1,8}=[0-9]{1,3}(,[a-z]=[0-9])?\\))?",
                    prop::collection::vec(-1.0e6f64..1.0e6, width),
                ),
                0..20,
            ),
        )
            .prop_map(|(columns, rows)| ResultTable {
                columns,
                rows: rows
                    .into_iter()
                    .map(|(evaluator, values)| ResultRow { evaluator, values })
                    .collect(),
            })
    })
}

proptest! {
    #[test]
    fn result_table_survives_csv(table in result_table()) {
        let parsed = ResultTable::from_csv(&table.to_csv()).unwrap();
        prop_assert_eq!(parsed, table);
    }
}
