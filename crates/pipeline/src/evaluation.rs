//! Held-out evaluation per task
//!
//! Metrics are emitted in a fixed order per task so reports read the same
//! from run to run.

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use tracing::warn;

use crate::labels::Labels;
use crate::trainers::{argmax, Scores};

/// Probability clamp used by every log-loss
pub const LOG_LOSS_EPSILON: f64 = 1e-15;

/// Decision threshold on the positive-class probability
pub const BINARY_THRESHOLD: f64 = 0.5;

const BINARY_CLASSES: [&str; 2] = ["false", "true"];

/// Named metric values in emission order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metrics {
    entries: Vec<(String, f64)>,
}

impl Metrics {
    pub fn push(&mut self, name: &str, value: f64) {
        self.entries.push((name.to_string(), value));
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| *v)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for Metrics {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, value) in &self.entries {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Counts of (actual, predicted) class pairs; rows are actual classes
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfusionMatrix {
    pub class_names: Vec<String>,
    pub counts: Vec<Vec<u64>>,
}

impl ConfusionMatrix {
    pub fn new(class_names: Vec<String>) -> Self {
        let k = class_names.len();
        Self {
            class_names,
            counts: vec![vec![0; k]; k],
        }
    }

    pub fn record(&mut self, actual: usize, predicted: usize) {
        if let Some(cell) = self.counts.get_mut(actual).and_then(|row| row.get_mut(predicted)) {
            *cell += 1;
        }
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().flatten().sum()
    }
}

/// Evaluator output
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Evaluation {
    pub metrics: Metrics,
    pub confusion_matrix: Option<ConfusionMatrix>,
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    sum / count as f64
}

fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

fn clamp_probability(p: f64) -> f64 {
    p.clamp(LOG_LOSS_EPSILON, 1.0 - LOG_LOSS_EPSILON)
}

fn report_dropped(task: &str, dropped: usize) {
    if dropped > 0 {
        warn!(task, dropped, "excluding test rows with a missing label or a non-finite score");
    }
}

fn mismatch(task: &str) -> Evaluation {
    warn!(task, "labels and scores do not match the task, no metrics computed");
    Evaluation::default()
}

/// R², MAE, MSE and RMSE over test rows with a finite label and prediction
pub fn evaluate_regression(
    labels: &Labels,
    scores: &Scores,
    _confusion_matrix: bool,
    _class_names: &[String],
) -> Evaluation {
    let (Labels::Float(actual), Scores::Regression(predicted)) = (labels, scores) else {
        return mismatch("regression");
    };

    let rows: Vec<(f64, f64)> = actual
        .iter()
        .map(|&a| a as f64)
        .zip(predicted.iter().copied())
        .filter(|(a, p)| a.is_finite() && p.is_finite())
        .collect();
    report_dropped("regression", actual.len() - rows.len());

    let label_mean = mean(rows.iter().map(|(a, _)| *a));
    let mae = mean(rows.iter().map(|(a, p)| (a - p).abs()));
    let mse = mean(rows.iter().map(|(a, p)| (a - p) * (a - p)));
    let ss_res: f64 = rows.iter().map(|(a, p)| (a - p) * (a - p)).sum();
    let ss_tot: f64 = rows
        .iter()
        .map(|(a, _)| (a - label_mean) * (a - label_mean))
        .sum();

    let mut metrics = Metrics::default();
    metrics.push("RSquared", 1.0 - ss_res / ss_tot);
    metrics.push("MeanAbsoluteError", mae);
    metrics.push("MeanSquaredError", mse);
    metrics.push("RootMeanSquaredError", mse.sqrt());

    Evaluation {
        metrics,
        confusion_matrix: None,
    }
}

/// Thresholded counts, log-loss family and ranking metrics
pub fn evaluate_binary(
    labels: &Labels,
    scores: &Scores,
    confusion_matrix: bool,
    _class_names: &[String],
) -> Evaluation {
    let (Labels::Bool(all_actual), Scores::Binary(all_probabilities)) = (labels, scores) else {
        return mismatch("binary classification");
    };
    let (actual, probabilities): (Vec<bool>, Vec<f64>) = all_actual
        .iter()
        .zip(all_probabilities)
        .filter(|(_, p)| p.is_finite())
        .map(|(&a, &p)| (a, p))
        .unzip();
    report_dropped("binary classification", all_actual.len() - actual.len());
    let (actual, probabilities) = (actual.as_slice(), probabilities.as_slice());

    let mut matrix = ConfusionMatrix::new(BINARY_CLASSES.iter().map(|s| s.to_string()).collect());
    for (&a, &p) in actual.iter().zip(probabilities) {
        matrix.record(a as usize, (p >= BINARY_THRESHOLD) as usize);
    }
    let tn = matrix.counts[0][0];
    let fp = matrix.counts[0][1];
    let fn_ = matrix.counts[1][0];
    let tp = matrix.counts[1][1];

    let positive_precision = ratio(tp, tp + fp);
    let positive_recall = ratio(tp, tp + fn_);
    let f1 = if positive_precision + positive_recall > 0.0 {
        2.0 * positive_precision * positive_recall / (positive_precision + positive_recall)
    } else {
        0.0
    };

    let log_loss = mean(actual.iter().zip(probabilities).map(|(&a, &p)| {
        let p = clamp_probability(p);
        -(if a { p.ln() } else { (1.0 - p).ln() })
    }));
    let positives = tp + fn_;
    let negatives = tn + fp;
    let log_loss_reduction = if positives > 0 && negatives > 0 {
        let prior = ratio(positives, positives + negatives);
        let prior_loss = -(prior * prior.ln() + (1.0 - prior) * (1.0 - prior).ln());
        (prior_loss - log_loss) / prior_loss
    } else {
        0.0
    };

    let mut metrics = Metrics::default();
    metrics.push("Accuracy", ratio(tp + tn, matrix.total()));
    metrics.push("F1Score", f1);
    metrics.push("PositivePrecision", positive_precision);
    metrics.push("PositiveRecall", positive_recall);
    metrics.push("NegativePrecision", ratio(tn, tn + fn_));
    metrics.push("NegativeRecall", ratio(tn, tn + fp));
    metrics.push("LogLoss", log_loss);
    metrics.push("LogLossReduction", log_loss_reduction);

    if positives > 0 && negatives > 0 {
        for (name, value) in [
            ("AUC", area_under_roc(actual, probabilities)),
            ("PRAUC", area_under_pr(actual, probabilities)),
        ] {
            if value.is_finite() && value > 0.0 {
                metrics.push(name, value);
            }
        }
    }

    Evaluation {
        metrics,
        confusion_matrix: confusion_matrix.then_some(matrix),
    }
}

/// Rows sorted by descending score, grouped into runs of equal scores
fn score_groups(actual: &[bool], scores: &[f64]) -> Vec<(u64, u64)> {
    let mut order: Vec<usize> = (0..actual.len()).collect();
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));

    let mut groups: Vec<(u64, u64)> = Vec::new();
    let mut last: Option<f64> = None;
    for i in order {
        if last != Some(scores[i]) {
            groups.push((0, 0));
            last = Some(scores[i]);
        }
        if let Some(group) = groups.last_mut() {
            if actual[i] {
                group.0 += 1;
            } else {
                group.1 += 1;
            }
        }
    }
    groups
}

/// Trapezoidal ROC area; tied scores contribute half credit
fn area_under_roc(actual: &[bool], scores: &[f64]) -> f64 {
    let positives = actual.iter().filter(|&&a| a).count() as f64;
    let negatives = actual.len() as f64 - positives;

    let mut area = 0.0;
    let mut positives_above = 0.0;
    for (pos, neg) in score_groups(actual, scores) {
        area += neg as f64 * (positives_above + pos as f64 / 2.0);
        positives_above += pos as f64;
    }
    area / (positives * negatives)
}

/// Average precision over descending score thresholds
fn area_under_pr(actual: &[bool], scores: &[f64]) -> f64 {
    let positives = actual.iter().filter(|&&a| a).count() as f64;

    let mut area = 0.0;
    let (mut tp, mut fp) = (0.0, 0.0);
    for (pos, neg) in score_groups(actual, scores) {
        tp += pos as f64;
        fp += neg as f64;
        area += (pos as f64 / positives) * (tp / (tp + fp));
    }
    area
}

/// Micro/macro accuracy and log-loss over rows with a known class key
pub fn evaluate_multiclass(
    labels: &Labels,
    scores: &Scores,
    confusion_matrix: bool,
    class_names: &[String],
) -> Evaluation {
    let (Labels::Key(actual), Scores::Multiclass(probabilities)) = (labels, scores) else {
        return mismatch("multiclass classification");
    };

    let mut matrix = ConfusionMatrix::new(class_names.to_vec());
    let mut losses = Vec::new();
    for (key, row) in actual.iter().zip(probabilities) {
        let Some(key) = key else {
            continue;
        };
        if !row.iter().all(|p| p.is_finite()) {
            continue;
        }
        let key = *key as usize;
        matrix.record(key, argmax(row));
        losses.push(-clamp_probability(row.get(key).copied().unwrap_or(0.0)).ln());
    }
    report_dropped("multiclass classification", actual.len() - losses.len());

    let correct: u64 = (0..matrix.counts.len()).map(|k| matrix.counts[k][k]).sum();
    let recalls: Vec<f64> = matrix
        .counts
        .iter()
        .enumerate()
        .filter_map(|(k, row)| {
            let support: u64 = row.iter().sum();
            (support > 0).then(|| row[k] as f64 / support as f64)
        })
        .collect();

    let mut metrics = Metrics::default();
    metrics.push("MicroAccuracy", correct as f64 / losses.len() as f64);
    metrics.push("MacroAccuracy", mean(recalls.into_iter()));
    metrics.push("LogLoss", mean(losses.into_iter()));

    Evaluation {
        metrics,
        confusion_matrix: confusion_matrix.then_some(matrix),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_regression_metrics() {
        let labels = Labels::Float(vec![1.0, 2.0, 3.0]);
        let scores = Scores::Regression(vec![1.0, 2.0, 4.0]);
        let eval = evaluate_regression(&labels, &scores, true, &[]);

        assert_eq!(
            eval.metrics.names().collect::<Vec<_>>(),
            ["RSquared", "MeanAbsoluteError", "MeanSquaredError", "RootMeanSquaredError"]
        );
        assert!(close(eval.metrics.get("RSquared").unwrap_or_default(), 0.5));
        assert!(close(eval.metrics.get("MeanAbsoluteError").unwrap_or_default(), 1.0 / 3.0));
        assert!(eval.confusion_matrix.is_none());
    }

    #[test]
    fn test_regression_skips_missing_labels_and_scores() {
        let labels = Labels::Float(vec![1.0, f32::NAN, 2.0, 3.0, 10.0]);
        let scores = Scores::Regression(vec![1.0, 5.0, 2.0, 4.0, f64::NAN]);
        let eval = evaluate_regression(&labels, &scores, false, &[]);

        for (name, value) in eval.metrics.iter() {
            assert!(value.is_finite(), "{name} is not finite");
        }
        assert!(close(eval.metrics.get("RSquared").unwrap_or_default(), 0.5));
        assert!(close(eval.metrics.get("MeanAbsoluteError").unwrap_or_default(), 1.0 / 3.0));
    }

    #[test]
    fn test_binary_skips_non_finite_scores() {
        let labels = Labels::Bool(vec![true, true, false, false, true]);
        let scores = Scores::Binary(vec![0.9, 0.4, 0.2, 0.6, f64::NAN]);
        let eval = evaluate_binary(&labels, &scores, true, &[]);

        assert!(eval.metrics.get("LogLoss").is_some_and(f64::is_finite));
        assert!(close(eval.metrics.get("Accuracy").unwrap_or_default(), 0.5));
        assert_eq!(eval.confusion_matrix.map(|m| m.total()), Some(4));
    }

    #[test]
    fn test_binary_metrics_and_matrix() {
        let labels = Labels::Bool(vec![true, true, false, false]);
        let scores = Scores::Binary(vec![0.9, 0.4, 0.2, 0.6]);
        let eval = evaluate_binary(&labels, &scores, true, &[]);

        assert_eq!(
            eval.metrics.names().collect::<Vec<_>>(),
            [
                "Accuracy",
                "F1Score",
                "PositivePrecision",
                "PositiveRecall",
                "NegativePrecision",
                "NegativeRecall",
                "LogLoss",
                "LogLossReduction",
                "AUC",
                "PRAUC"
            ]
        );
        assert!(close(eval.metrics.get("Accuracy").unwrap_or_default(), 0.5));
        assert!(close(eval.metrics.get("AUC").unwrap_or_default(), 0.75));

        let matrix = eval.confusion_matrix.expect("matrix requested");
        assert_eq!(matrix.class_names, ["false", "true"]);
        assert_eq!(matrix.counts, vec![vec![1, 1], vec![1, 1]]);
        assert_eq!(matrix.total(), 4);
    }

    #[test]
    fn test_single_class_split_omits_ranking_metrics() {
        let labels = Labels::Bool(vec![false, false]);
        let scores = Scores::Binary(vec![0.1, 0.7]);
        let eval = evaluate_binary(&labels, &scores, false, &[]);

        assert!(eval.metrics.get("AUC").is_none());
        assert!(eval.metrics.get("PRAUC").is_none());
        assert!(eval.confusion_matrix.is_none());
    }

    #[test]
    fn test_log_loss_is_clamped() {
        let labels = Labels::Bool(vec![true]);
        let scores = Scores::Binary(vec![0.0]);
        let eval = evaluate_binary(&labels, &scores, false, &[]);
        let log_loss = eval.metrics.get("LogLoss").unwrap_or_default();
        assert!(log_loss.is_finite());
        assert!(close(log_loss, -LOG_LOSS_EPSILON.ln()));
    }

    #[test]
    fn test_multiclass_metrics() {
        let classes: Vec<String> = ["a", "b", "c"].iter().map(|s| s.to_string()).collect();
        let labels = Labels::Key(vec![Some(0), Some(1), Some(1), None, Some(2)]);
        let scores = Scores::Multiclass(vec![
            vec![0.8, 0.1, 0.1],
            vec![0.1, 0.8, 0.1],
            vec![0.6, 0.3, 0.1],
            vec![0.3, 0.3, 0.4],
            vec![0.2, 0.2, 0.6],
        ]);
        let eval = evaluate_multiclass(&labels, &scores, true, &classes);

        assert!(close(eval.metrics.get("MicroAccuracy").unwrap_or_default(), 0.75));
        assert!(close(eval.metrics.get("MacroAccuracy").unwrap_or_default(), (1.0 + 0.5 + 1.0) / 3.0));

        let matrix = eval.confusion_matrix.expect("matrix requested");
        assert_eq!(matrix.total(), 4);
        assert_eq!(matrix.counts[1], vec![1, 1, 0]);
    }

    #[test]
    fn test_metrics_serialize_in_order() -> anyhow::Result<()> {
        let mut metrics = Metrics::default();
        metrics.push("Zeta", 1.0);
        metrics.push("Alpha", 2.0);
        assert_eq!(serde_json::to_string(&metrics)?, r#"{"Zeta":1.0,"Alpha":2.0}"#);
        Ok(())
    }
}
