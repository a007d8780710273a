//! One-versus-all reduction from multiclass to binary learners

use super::BinaryModel;
use crate::errors::Result;

/// One binary model per class key
#[derive(Debug, Clone)]
pub struct OneVersusAll {
    models: Vec<BinaryModel>,
}

impl OneVersusAll {
    /// Fit `class_count` binary models, the k-th separating key `k` from the
    /// rest of `keys`.
    pub fn fit<F>(class_count: usize, keys: &[u32], mut fit_binary: F) -> Result<Self>
    where
        F: FnMut(&[bool]) -> Result<BinaryModel>,
    {
        let mut models = Vec::with_capacity(class_count);
        for class in 0..class_count as u32 {
            let positives: Vec<bool> = keys.iter().map(|&k| k == class).collect();
            models.push(fit_binary(&positives)?);
        }
        Ok(Self { models })
    }

    /// Per-class scores normalized to sum to one
    pub fn probabilities(&self, row: &[f32]) -> Vec<f64> {
        let raw: Vec<f64> = self.models.iter().map(|m| m.probability(row)).collect();
        normalize(raw)
    }

    pub fn class_count(&self) -> usize {
        self.models.len()
    }

    pub fn is_finite(&self) -> bool {
        self.models.iter().all(BinaryModel::is_finite)
    }
}

fn normalize(mut scores: Vec<f64>) -> Vec<f64> {
    let sum: f64 = scores.iter().sum();
    if sum > 0.0 && sum.is_finite() {
        scores.iter_mut().for_each(|s| *s /= sum);
    } else if !scores.is_empty() {
        let uniform = 1.0 / scores.len() as f64;
        scores.iter_mut().for_each(|s| *s = uniform);
    }
    scores
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogisticConfig;
    use crate::trainers::LogisticRegression;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize(vec![1.0, 3.0]), vec![0.25, 0.75]);
        assert_eq!(normalize(vec![0.0, 0.0]), vec![0.5, 0.5]);
    }

    #[test]
    fn test_three_bands() -> Result<()> {
        let rows: Vec<Vec<f32>> = (0..90).map(|i| vec![i as f32]).collect();
        let x: Vec<&[f32]> = rows.iter().map(|r| r.as_slice()).collect();
        let keys: Vec<u32> = (0..90).map(|i| (i / 30) as u32).collect();

        let model = OneVersusAll::fit(3, &keys, |positives| {
            Ok(BinaryModel::Logistic(LogisticRegression::fit(
                &x,
                positives,
                &LogisticConfig::default(),
            )))
        })?;

        assert_eq!(model.class_count(), 3);
        let low = model.probabilities(&[2.0]);
        let high = model.probabilities(&[88.0]);
        assert!((low.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert!(low[0] > low[2]);
        assert!(high[2] > high[0]);
        Ok(())
    }
}
