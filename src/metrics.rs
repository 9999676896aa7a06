//! Classification metrics computed per (version, fold, trainer).
//!
//! A row is truly defective when its bug count is > 0, predicted defective when its
//! score reaches the threshold. Ratios with an empty denominator are 0, except `mcc`,
//! `auc` and `aucec` which are NaN when undefined.

use std::cmp::Ordering;
use serde::{Serialize, Deserialize};

/// Metric names, in result-file column order
pub const METRIC_NAMES: [&str; 16] = [
    "error", "recall", "precision", "fscore", "gscore", "mcc", "auc", "aucec",
    "tpr", "tnr", "fpr", "fnr", "tp", "fn", "tn", "fp",
];

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Confusion {
    pub tp: f64,
    pub fp: f64,
    pub tn: f64,
    pub fn_: f64,
}

impl Confusion {
    pub fn new(scores: &[f64], actual: &[bool], threshold: f64) -> Confusion {
        let mut c = Confusion::default();
        for (score, defective) in scores.iter().zip(actual.iter()) {
            match (*score >= threshold, *defective) {
                (true, true) => c.tp += 1.0,
                (true, false) => c.fp += 1.0,
                (false, false) => c.tn += 1.0,
                (false, true) => c.fn_ += 1.0,
            }
        }
        c
    }

    pub fn total(&self) -> f64 {
        self.tp + self.fp + self.tn + self.fn_
    }
}

fn ratio(num: f64, den: f64) -> f64 {
    if den > 0.0 { num / den } else { 0.0 }
}

/// Area under the ROC curve through the rank-sum statistic, ties receive average ranks
pub fn auc(scores: &[f64], actual: &[bool]) -> f64 {
    let n1 = actual.iter().filter(|&&a| a).count() as f64;
    let n0 = actual.len() as f64 - n1;
    if n1 == 0.0 || n0 == 0.0 { return f64::NAN }

    let mut combined: Vec<(f64, bool)> = scores.iter().copied().zip(actual.iter().copied()).collect();
    combined.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));

    // Assign ranks
    let mut rank_sum_1 = 0.0;
    let mut i = 0;
    while i < combined.len() {
        let start = i;
        while i + 1 < combined.len() && combined[i].0 == combined[i + 1].0 {
            i += 1;
        }
        let rank = (start + i + 2) as f64 / 2.0;
        rank_sum_1 += rank * combined[start..=i].iter().filter(|(_, a)| *a).count() as f64;
        i += 1;
    }

    (rank_sum_1 - n1 * (n1 + 1.0) / 2.0) / (n1 * n0)
}

/// Area under the cost-effectiveness curve: rows are inspected by decreasing score,
/// x is the inspected share of effort, y the share of bugs found
pub fn aucec(scores: &[f64], bugs: &[f64], efforts: &[f64]) -> f64 {
    let total_effort: f64 = efforts.iter().sum();
    let total_bugs: f64 = bugs.iter().sum();
    if !(total_effort > 0.0) || !(total_bugs > 0.0) { return f64::NAN }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| {
        scores[b].partial_cmp(&scores[a]).unwrap_or(Ordering::Equal)
            .then_with(|| efforts[a].partial_cmp(&efforts[b]).unwrap_or(Ordering::Equal))
    });

    let (mut x, mut y, mut area) = (0.0, 0.0, 0.0);
    for i in order {
        let nx = x + efforts[i] / total_effort;
        let ny = y + bugs[i] / total_bugs;
        area += (nx - x) * (y + ny) / 2.0;
        x = nx;
        y = ny;
    }
    area
}

/// Every metric of [`METRIC_NAMES`], in that order
pub fn compute(scores: &[f64], bugs: &[f64], efforts: &[f64], threshold: f64) -> Vec<(String, f64)> {
    let actual: Vec<bool> = bugs.iter().map(|&b| b > 0.0).collect();
    let c = Confusion::new(scores, &actual, threshold);

    let recall = ratio(c.tp, c.tp + c.fn_);
    let precision = ratio(c.tp, c.tp + c.fp);
    let tnr = ratio(c.tn, c.tn + c.fp);
    let fpr = ratio(c.fp, c.fp + c.tn);
    let fnr = ratio(c.fn_, c.fn_ + c.tp);
    let fscore = ratio(2.0 * recall * precision, recall + precision);
    let gscore = ratio(2.0 * recall * (1.0 - fpr), recall + (1.0 - fpr));
    let mcc_den = ((c.tp + c.fp) * (c.tp + c.fn_) * (c.tn + c.fp) * (c.tn + c.fn_)).sqrt();
    let mcc = if mcc_den > 0.0 { (c.tp * c.tn - c.fp * c.fn_) / mcc_den } else { f64::NAN };

    let values = [
        ratio(c.fp + c.fn_, c.total()),
        recall,
        precision,
        fscore,
        gscore,
        mcc,
        auc(scores, &actual),
        aucec(scores, bugs, efforts),
        recall,
        tnr,
        fpr,
        fnr,
        c.tp,
        c.fn_,
        c.tn,
        c.fp,
    ];

    METRIC_NAMES.iter().zip(values.iter()).map(|(n, v)| (n.to_string(), *v)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn get(metrics: &[(String, f64)], name: &str) -> f64 {
        metrics.iter().find(|(n, _)| n == name).map(|(_, v)| *v).unwrap()
    }

    #[test]
    fn test_confusion_counts() {
        let c = Confusion::new(&[0.9, 0.8, 0.2, 0.1], &[true, false, true, false], 0.5);
        assert_eq!(c, Confusion { tp: 1.0, fp: 1.0, tn: 1.0, fn_: 1.0 });
    }

    #[test]
    fn test_auc_perfect_and_inverted_ranking() {
        assert_eq!(auc(&[0.9, 0.8, 0.2, 0.1], &[true, true, false, false]), 1.0);
        assert_eq!(auc(&[0.1, 0.2, 0.8, 0.9], &[true, true, false, false]), 0.0);
        assert_eq!(auc(&[0.5, 0.5, 0.5, 0.5], &[true, true, false, false]), 0.5);
    }

    #[test]
    fn test_auc_undefined_with_single_class() {
        assert!(auc(&[0.1, 0.9], &[false, false]).is_nan());
    }

    #[test]
    fn test_aucec() {
        let area = aucec(&[0.9, 0.1], &[1.0, 0.0], &[1.0, 1.0]);
        assert!((area - 0.75).abs() < 1e-12);
        assert!(aucec(&[0.9, 0.1], &[0.0, 0.0], &[1.0, 1.0]).is_nan());
    }

    #[test]
    fn test_compute_follows_metric_names() {
        let metrics = compute(&[0.9, 0.7, 0.3, 0.1], &[2.0, 0.0, 1.0, 0.0], &[1.0; 4], 0.5);
        let names: Vec<&str> = metrics.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, METRIC_NAMES.to_vec());
        assert_eq!(get(&metrics, "tp"), 1.0);
        assert_eq!(get(&metrics, "fp"), 1.0);
        assert_eq!(get(&metrics, "recall"), 0.5);
        assert_eq!(get(&metrics, "precision"), 0.5);
        assert_eq!(get(&metrics, "error"), 0.5);
        assert_eq!(get(&metrics, "auc"), 0.75);
    }

    #[test]
    fn test_mcc_undefined_when_nothing_predicted_defective() {
        let metrics = compute(&[0.1, 0.2], &[1.0, 0.0], &[1.0, 1.0], 0.5);
        assert!(get(&metrics, "mcc").is_nan());
        assert_eq!(get(&metrics, "precision"), 0.0);
    }
}
