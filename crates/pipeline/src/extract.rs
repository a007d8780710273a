//! Paired actual/predicted values for plotting

use crate::labels::Labels;
use crate::trainers::{argmax, Scores};

/// Actual and predicted values of equal length, in test row order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Predictions {
    pub actual: Vec<f64>,
    pub predicted: Vec<f64>,
}

/// Extract plot pairs from the scored test view.
///
/// Key labels pair the class key with the argmax key; boolean labels pair
/// 1.0/0.0 with the positive probability; float labels pair the label with
/// the raw score. Rows the evaluators exclude (unknown key, non-finite label
/// or score) are left out here too.
pub fn extract(labels: &Labels, scores: &Scores) -> Predictions {
    let mut out = Predictions::default();

    match (labels, scores) {
        (Labels::Key(keys), Scores::Multiclass(probabilities)) => {
            for (key, row) in keys.iter().zip(probabilities) {
                if let Some(key) = (*key).filter(|_| row.iter().all(|p| p.is_finite())) {
                    out.actual.push(key as f64);
                    out.predicted.push(argmax(row) as f64);
                }
            }
        }
        (Labels::Bool(values), Scores::Binary(probabilities)) => {
            for (value, p) in values.iter().zip(probabilities) {
                if !p.is_finite() {
                    continue;
                }
                out.actual.push(if *value { 1.0 } else { 0.0 });
                out.predicted.push(*p);
            }
        }
        (Labels::Float(values), Scores::Regression(predicted)) => {
            for (value, p) in values.iter().zip(predicted) {
                if !value.is_finite() || !p.is_finite() {
                    continue;
                }
                out.actual.push(*value as f64);
                out.predicted.push(*p);
            }
        }
        _ => {}
    }

    out
}
