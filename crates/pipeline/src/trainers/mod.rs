//! Trainer dispatch
//!
//! A [`ModelKind`] (the external selection token) fixes the [`TaskKind`] and
//! the [`Learner`]. The task's [`TaskProfile`] supplies the label encoding and
//! the evaluator, so the orchestrator never branches on concrete models.

pub mod cart;
pub mod gbdt;
pub mod linear;
pub mod ova;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::config::PipelineConfig;
use crate::deterministic::LcgRng;
use crate::errors::{FitDiagnostics, PipelineError, PreviewRow, Result, DIAGNOSTIC_PREVIEW_ROWS};
use crate::evaluation::{self, Evaluation};
use crate::labels::{LabelEncoding, Labels};

pub use gbdt::GbdtClassifier;
pub use linear::{LinearRegressor, LogisticRegression};
pub use ova::OneVersusAll;

/// Statistical task solved by a model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskKind {
    Regression,
    BinaryClassification,
    MulticlassClassification,
}

/// Algorithm family used to fit a model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Learner {
    Sdca,
    Logistic,
    BoostedTrees,
}

/// Supported model selections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelKind {
    LinearRegression,
    LogisticRegression,
    DecisionTree,
    MulticlassLogisticRegression,
    MulticlassDecisionTree,
}

impl ModelKind {
    pub const ALL: [ModelKind; 5] = [
        ModelKind::LinearRegression,
        ModelKind::LogisticRegression,
        ModelKind::DecisionTree,
        ModelKind::MulticlassLogisticRegression,
        ModelKind::MulticlassDecisionTree,
    ];

    pub fn task(self) -> TaskKind {
        match self {
            ModelKind::LinearRegression => TaskKind::Regression,
            ModelKind::LogisticRegression | ModelKind::DecisionTree => {
                TaskKind::BinaryClassification
            }
            ModelKind::MulticlassLogisticRegression | ModelKind::MulticlassDecisionTree => {
                TaskKind::MulticlassClassification
            }
        }
    }

    pub fn learner(self) -> Learner {
        match self {
            ModelKind::LinearRegression => Learner::Sdca,
            ModelKind::LogisticRegression | ModelKind::MulticlassLogisticRegression => {
                Learner::Logistic
            }
            ModelKind::DecisionTree | ModelKind::MulticlassDecisionTree => Learner::BoostedTrees,
        }
    }

    /// Human readable name shown in reports
    pub fn display_name(self) -> &'static str {
        match self {
            ModelKind::LinearRegression => "Linear Regression Model",
            ModelKind::LogisticRegression => "Logistic Regression Model",
            ModelKind::DecisionTree => "Decision Tree Model",
            ModelKind::MulticlassLogisticRegression => "Multiclass Logistic Regression Model",
            ModelKind::MulticlassDecisionTree => "Multiclass Decision Tree Model",
        }
    }

    /// Selection token accepted from callers
    pub fn token(self) -> &'static str {
        match self {
            ModelKind::LinearRegression => "LinearRegression",
            ModelKind::LogisticRegression => "LogisticRegression",
            ModelKind::DecisionTree => "DecisionTree",
            ModelKind::MulticlassLogisticRegression => "MulticlassLogisticRegression",
            ModelKind::MulticlassDecisionTree => "MulticlassDecisionTree",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

impl FromStr for ModelKind {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        let token = s.trim();
        ModelKind::ALL
            .into_iter()
            .find(|kind| kind.token().eq_ignore_ascii_case(token))
            .ok_or_else(|| PipelineError::Config(format!("unknown model type '{token}'")))
    }
}

/// Evaluator signature shared by all tasks
pub type EvaluateFn = fn(&Labels, &Scores, bool, &[String]) -> Evaluation;

/// Per-task pieces plugged into the training template
pub struct TaskProfile {
    pub task: TaskKind,
    pub label_encoding: LabelEncoding,
    pub evaluate: EvaluateFn,
}

static PROFILES: [TaskProfile; 3] = [
    TaskProfile {
        task: TaskKind::Regression,
        label_encoding: LabelEncoding::Float,
        evaluate: evaluation::evaluate_regression,
    },
    TaskProfile {
        task: TaskKind::BinaryClassification,
        label_encoding: LabelEncoding::Boolean,
        evaluate: evaluation::evaluate_binary,
    },
    TaskProfile {
        task: TaskKind::MulticlassClassification,
        label_encoding: LabelEncoding::Key,
        evaluate: evaluation::evaluate_multiclass,
    },
];

impl TaskKind {
    pub fn profile(self) -> &'static TaskProfile {
        match self {
            TaskKind::Regression => &PROFILES[0],
            TaskKind::BinaryClassification => &PROFILES[1],
            TaskKind::MulticlassClassification => &PROFILES[2],
        }
    }
}

/// Model output for a batch of rows
#[derive(Debug, Clone, PartialEq)]
pub enum Scores {
    /// Predicted value per row
    Regression(Vec<f64>),
    /// Probability of the positive class per row
    Binary(Vec<f64>),
    /// Normalized class probabilities per row
    Multiclass(Vec<Vec<f64>>),
}

impl Scores {
    pub fn len(&self) -> usize {
        match self {
            Scores::Regression(v) | Scores::Binary(v) => v.len(),
            Scores::Multiclass(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Index of the largest probability; the lowest index wins ties
pub fn argmax(probabilities: &[f64]) -> usize {
    let mut best = 0;
    for (i, p) in probabilities.iter().enumerate() {
        if *p > probabilities[best] {
            best = i;
        }
    }
    best
}

/// Encoded training view handed to a trainer
pub struct TrainingSet<'a> {
    pub features: &'a [Vec<f32>],
    pub labels: &'a Labels,
    pub feature_names: &'a [String],
    /// Number of classes known to the label encoder (key labels only)
    pub class_count: usize,
}

impl TrainingSet<'_> {
    /// First rows of the encoded view, for error reports
    pub fn diagnostics(&self) -> FitDiagnostics {
        let rows = self
            .features
            .iter()
            .take(DIAGNOSTIC_PREVIEW_ROWS)
            .enumerate()
            .map(|(i, features)| PreviewRow {
                features: features.clone(),
                label: self.labels.display(i),
            })
            .collect();

        FitDiagnostics {
            feature_names: self.feature_names.to_vec(),
            rows,
            total_rows: self.features.len(),
        }
    }

    /// Rows with finite features and a usable label
    fn usable_rows(&self) -> Vec<usize> {
        (0..self.features.len())
            .filter(|&i| self.labels.is_usable(i) && self.features[i].iter().all(|v| v.is_finite()))
            .collect()
    }

    fn fail(&self, reason: &str) -> PipelineError {
        let diagnostics = self.diagnostics();
        error!(reason = %reason, "model fitting failed\n{}", diagnostics);
        PipelineError::fit(reason, diagnostics)
    }
}

/// A trained model of any supported kind
#[derive(Debug, Clone)]
pub enum FittedModel {
    Linear(LinearRegressor),
    Logistic(LogisticRegression),
    Trees(GbdtClassifier),
    OneVersusAll(OneVersusAll),
}

impl FittedModel {
    pub fn predict(&self, features: &[Vec<f32>]) -> Scores {
        match self {
            FittedModel::Linear(m) => Scores::Regression(features.iter().map(|r| m.predict(r)).collect()),
            FittedModel::Logistic(m) => {
                Scores::Binary(features.iter().map(|r| m.probability(r)).collect())
            }
            FittedModel::Trees(m) => Scores::Binary(features.iter().map(|r| m.probability(r)).collect()),
            FittedModel::OneVersusAll(m) => {
                Scores::Multiclass(features.iter().map(|r| m.probabilities(r)).collect())
            }
        }
    }

    fn is_finite(&self) -> bool {
        match self {
            FittedModel::Linear(m) => m.is_finite(),
            FittedModel::Logistic(m) => m.is_finite(),
            FittedModel::Trees(m) => m.is_finite(),
            FittedModel::OneVersusAll(m) => m.is_finite(),
        }
    }
}

/// A fitted binary learner, used directly or inside one-vs-all
#[derive(Debug, Clone)]
pub enum BinaryModel {
    Logistic(LogisticRegression),
    Trees(GbdtClassifier),
}

impl BinaryModel {
    pub fn probability(&self, row: &[f32]) -> f64 {
        match self {
            BinaryModel::Logistic(m) => m.probability(row),
            BinaryModel::Trees(m) => m.probability(row),
        }
    }

    fn is_finite(&self) -> bool {
        match self {
            BinaryModel::Logistic(m) => m.is_finite(),
            BinaryModel::Trees(m) => m.is_finite(),
        }
    }
}

fn fit_binary(
    learner: Learner,
    x: &[&[f32]],
    y: &[bool],
    config: &PipelineConfig,
) -> Result<BinaryModel> {
    match learner {
        Learner::Logistic => Ok(BinaryModel::Logistic(LogisticRegression::fit(x, y, &config.logistic))),
        Learner::BoostedTrees => Ok(BinaryModel::Trees(GbdtClassifier::fit(x, y, &config.trees))),
        Learner::Sdca => Err(PipelineError::Config(
            "SDCA regression cannot train a classifier".to_string(),
        )),
    }
}

/// Fit the model selected by `kind` on the encoded training view.
///
/// Rows with a non-finite feature or an unusable label are skipped. Fitting
/// fails, with a preview of the encoded rows, when nothing usable remains or
/// the labels cannot support the task.
pub fn fit(
    kind: ModelKind,
    set: &TrainingSet<'_>,
    config: &PipelineConfig,
    rng: &mut LcgRng,
) -> Result<FittedModel> {
    let usable = set.usable_rows();
    let skipped = set.features.len() - usable.len();
    if skipped > 0 {
        warn!(skipped, "skipping training rows with missing feature or label values");
    }
    if usable.is_empty() {
        return Err(set.fail("no training rows without missing values"));
    }

    let x: Vec<&[f32]> = usable.iter().map(|&i| set.features[i].as_slice()).collect();

    let model = match (kind.task(), set.labels) {
        (TaskKind::Regression, Labels::Float(labels)) => {
            let y: Vec<f64> = usable.iter().map(|&i| labels[i] as f64).collect();
            FittedModel::Linear(LinearRegressor::fit(&x, &y, &config.sdca, rng))
        }
        (TaskKind::BinaryClassification, Labels::Bool(labels)) => {
            let y: Vec<bool> = usable.iter().map(|&i| labels[i]).collect();
            if y.iter().all(|&v| v) || y.iter().all(|&v| !v) {
                return Err(set.fail("training split contains a single class"));
            }
            match fit_binary(kind.learner(), &x, &y, config)? {
                BinaryModel::Logistic(m) => FittedModel::Logistic(m),
                BinaryModel::Trees(m) => FittedModel::Trees(m),
            }
        }
        (TaskKind::MulticlassClassification, Labels::Key(labels)) => {
            let y: Vec<u32> = usable.iter().filter_map(|&i| labels[i]).collect();
            let mut present: Vec<u32> = y.clone();
            present.sort_unstable();
            present.dedup();
            if present.len() < 2 {
                return Err(set.fail("multiclass training requires at least two classes"));
            }
            let learner = kind.learner();
            FittedModel::OneVersusAll(OneVersusAll::fit(set.class_count, &y, |positives| {
                fit_binary(learner, &x, positives, config)
            })?)
        }
        (task, _) => {
            return Err(PipelineError::Config(format!(
                "label encoding does not match task {task:?}"
            )))
        }
    };

    if !model.is_finite() {
        return Err(set.fail("model parameters diverged to non-finite values"));
    }

    info!(rows = usable.len(), model = %kind, "model fitted");
    Ok(model)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_tokens_round_trip() -> Result<()> {
        for kind in ModelKind::ALL {
            assert_eq!(kind.token().parse::<ModelKind>()?, kind);
        }
        assert_eq!("linearregression".parse::<ModelKind>()?, ModelKind::LinearRegression);
        assert!("NeuralNet".parse::<ModelKind>().is_err());
        Ok(())
    }

    #[test]
    fn test_dispatch_table() {
        assert_eq!(ModelKind::LinearRegression.task(), TaskKind::Regression);
        assert_eq!(ModelKind::DecisionTree.learner(), Learner::BoostedTrees);
        assert_eq!(
            ModelKind::MulticlassLogisticRegression.task().profile().label_encoding,
            LabelEncoding::Key
        );
        for task in [
            TaskKind::Regression,
            TaskKind::BinaryClassification,
            TaskKind::MulticlassClassification,
        ] {
            assert_eq!(task.profile().task, task);
        }
    }

    #[test]
    fn test_argmax_prefers_lowest_index() {
        assert_eq!(argmax(&[0.2, 0.4, 0.4]), 1);
        assert_eq!(argmax(&[0.5]), 0);
    }

    #[test]
    fn test_single_class_fails_with_diagnostics() {
        let features = vec![vec![1.0], vec![2.0], vec![3.0]];
        let labels = Labels::Bool(vec![true, true, true]);
        let names = vec!["x_num".to_string()];
        let set = TrainingSet {
            features: &features,
            labels: &labels,
            feature_names: &names,
            class_count: 0,
        };

        let err = fit(
            ModelKind::LogisticRegression,
            &set,
            &PipelineConfig::default(),
            &mut LcgRng::new(1),
        )
        .unwrap_err();

        match err {
            PipelineError::Fit { diagnostics, .. } => {
                assert_eq!(diagnostics.rows.len(), 3);
                assert_eq!(diagnostics.rows[0].label, "true");
                assert_eq!(diagnostics.feature_names, names);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_all_nan_features_fail() {
        let features = vec![vec![f32::NAN]; 4];
        let labels = Labels::Float(vec![1.0, 2.0, 3.0, 4.0]);
        let names = vec!["x_num".to_string()];
        let set = TrainingSet {
            features: &features,
            labels: &labels,
            feature_names: &names,
            class_count: 0,
        };

        let result = fit(
            ModelKind::LinearRegression,
            &set,
            &PipelineConfig::default(),
            &mut LcgRng::new(1),
        );
        assert!(matches!(result, Err(PipelineError::Fit { .. })));
    }
}
