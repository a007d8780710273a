//! Seeded train/test partitioning

use crate::deterministic::LcgRng;

/// Fraction of rows held out for evaluation
pub const TEST_FRACTION: f64 = 0.2;

/// Row indices of each side of the split, in table order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Split {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Partition `rows` row indices into train and test sets.
///
/// The test side gets `round(rows * TEST_FRACTION)` rows, reduced if needed
/// so the train side keeps at least one row.
pub fn train_test_split(rows: usize, rng: &mut LcgRng) -> Split {
    let mut indices: Vec<usize> = (0..rows).collect();
    rng.shuffle(&mut indices);

    let test_len = ((rows as f64) * TEST_FRACTION).round() as usize;
    let test_len = test_len.min(rows.saturating_sub(1));

    let mut test = indices[..test_len].to_vec();
    let mut train = indices[test_len..].to_vec();
    test.sort_unstable();
    train.sort_unstable();

    Split { train, test }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_sizes() {
        let split = train_test_split(100, &mut LcgRng::new(42));
        assert_eq!(split.test.len(), 20);
        assert_eq!(split.train.len(), 80);

        let mut all: Vec<usize> = split.train.iter().chain(&split.test).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn test_split_is_seeded() {
        let a = train_test_split(50, &mut LcgRng::new(7));
        let b = train_test_split(50, &mut LcgRng::new(7));
        let c = train_test_split(50, &mut LcgRng::new(8));
        assert_eq!(a, b);
        assert_ne!(a.test, c.test);
    }

    #[test]
    fn test_tiny_inputs_keep_a_training_row() {
        let one = train_test_split(1, &mut LcgRng::new(1));
        assert_eq!(one.train.len(), 1);
        assert!(one.test.is_empty());

        let three = train_test_split(3, &mut LcgRng::new(1));
        assert_eq!(three.test.len(), 1);
        assert_eq!(three.train.len(), 2);

        let none = train_test_split(0, &mut LcgRng::new(1));
        assert!(none.train.is_empty() && none.test.is_empty());
    }
}
