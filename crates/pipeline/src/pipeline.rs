//! Training orchestrator
//!
//! Sequences one training run: load the table, split it, fit the feature
//! and label transforms on the train rows, fit the model, evaluate on the
//! held-out rows and package a [`ModelResult`].

use std::fmt;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span};

use crate::config::PipelineConfig;
use crate::deterministic::{resolve_seed, LcgRng, UNSEEDED};
use crate::errors::{PipelineError, Result};
use crate::evaluation::{ConfusionMatrix, Metrics};
use crate::extract::extract;
use crate::features::FeaturePlan;
use crate::schema::{find_target, infer_schema};
use crate::split::train_test_split;
use crate::table::RawTable;
use crate::trainers::{self, ModelKind, TrainingSet};

/// Immutable per-run training options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingRequest {
    pub model: ModelKind,
    /// Explicit feature columns; `None` or empty selects every non-target column
    pub features: Option<Vec<String>>,
    pub target: String,
    /// `-1` requests an unseeded run
    pub seed: i64,
    pub confusion_matrix: bool,
}

impl TrainingRequest {
    pub fn new(model: ModelKind, target: impl Into<String>) -> Self {
        Self {
            model,
            features: None,
            target: target.into(),
            seed: UNSEEDED,
            confusion_matrix: false,
        }
    }

    pub fn with_features<I, S>(mut self, features: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.features = Some(features.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_seed(mut self, seed: i64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_confusion_matrix(mut self, enabled: bool) -> Self {
        self.confusion_matrix = enabled;
        self
    }
}

/// Outcome of a successful training run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelResult {
    model_name: String,
    metrics: Metrics,
    actual_values: Vec<f64>,
    predicted_values: Vec<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    confusion_matrix: Option<ConfusionMatrix>,
}

impl ModelResult {
    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn actual_values(&self) -> &[f64] {
        &self.actual_values
    }

    pub fn predicted_values(&self) -> &[f64] {
        &self.predicted_values
    }

    pub fn confusion_matrix(&self) -> Option<&ConfusionMatrix> {
        self.confusion_matrix.as_ref()
    }
}

/// Orchestrator progress, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Loaded,
    FeaturesBuilt,
    LabelBuilt,
    Trained,
    Evaluated,
    Extracted,
    Packaged,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Loaded => "loaded",
            Stage::FeaturesBuilt => "features-built",
            Stage::LabelBuilt => "label-built",
            Stage::Trained => "trained",
            Stage::Evaluated => "evaluated",
            Stage::Extracted => "extracted",
            Stage::Packaged => "packaged",
        };
        f.write_str(name)
    }
}

struct Progress {
    stage: Option<Stage>,
}

impl Progress {
    fn advance(&mut self, next: Stage) {
        debug_assert!(self.stage.map_or(next == Stage::Loaded, |s| s < next));
        debug!(stage = %next, "pipeline stage reached");
        self.stage = Some(next);
    }
}

/// Train from any CSV byte stream
pub fn train<R: Read>(reader: R, request: &TrainingRequest, config: &PipelineConfig) -> Result<ModelResult> {
    let table = RawTable::from_reader(reader)?;
    train_table(table, request, config)
}

/// Train from a CSV file on disk
pub fn train_from_path<P: AsRef<Path>>(
    path: P,
    request: &TrainingRequest,
    config: &PipelineConfig,
) -> Result<ModelResult> {
    let table = RawTable::from_path(path)?;
    train_table(table, request, config)
}

/// Train from an already parsed table
pub fn train_table(
    mut table: RawTable,
    request: &TrainingRequest,
    config: &PipelineConfig,
) -> Result<ModelResult> {
    let span = info_span!("training", model = %request.model, target = %request.target);
    let _enter = span.enter();
    let mut progress = Progress { stage: None };

    table.clean(&config.cleaning);
    if table.is_empty() {
        return Err(PipelineError::Data("dataset has no data rows".to_string()));
    }
    let schema = infer_schema(&table);
    let target_idx = find_target(&schema, &request.target)?;
    let seed = resolve_seed(request.seed);
    let split = train_test_split(table.len(), &mut LcgRng::new(seed));
    info!(
        rows = table.len(),
        columns = schema.len(),
        train = split.train.len(),
        test = split.test.len(),
        seed,
        "dataset loaded"
    );
    progress.advance(Stage::Loaded);

    let plan = FeaturePlan::resolve(&schema, target_idx, request.features.as_deref());
    if plan.is_empty() {
        return Err(PipelineError::Schema("no usable feature columns".to_string()));
    }
    let features = plan.fit(&table, &split.train, &config.text);
    let train_x = features.transform(&table, &split.train);
    let test_x = features.transform(&table, &split.test);
    let feature_names = features.feature_names();
    info!(columns = plan.len(), width = features.width(), "features encoded");
    progress.advance(Stage::FeaturesBuilt);

    let profile = request.model.task().profile();
    let train_cells = column_cells(&table, &split.train, target_idx);
    let fitted_labels = profile.label_encoding.fit(train_cells.iter().copied());
    let train_y = fitted_labels.transform(train_cells.iter().copied());
    let test_y = fitted_labels.transform(column_cells(&table, &split.test, target_idx).into_iter());
    progress.advance(Stage::LabelBuilt);

    let training_set = TrainingSet {
        features: &train_x,
        labels: &train_y,
        feature_names: &feature_names,
        class_count: fitted_labels.classes().len(),
    };
    let model = trainers::fit(request.model, &training_set, config, &mut LcgRng::new(seed))?;
    progress.advance(Stage::Trained);

    let scores = model.predict(&test_x);
    let evaluation = (profile.evaluate)(&test_y, &scores, request.confusion_matrix, fitted_labels.classes());
    progress.advance(Stage::Evaluated);

    let predictions = extract(&test_y, &scores);
    progress.advance(Stage::Extracted);

    let result = ModelResult {
        model_name: request.model.display_name().to_string(),
        metrics: evaluation.metrics,
        actual_values: predictions.actual,
        predicted_values: predictions.predicted,
        confusion_matrix: evaluation.confusion_matrix,
    };
    progress.advance(Stage::Packaged);

    info!(
        metrics = ?result.metrics.iter().collect::<Vec<_>>(),
        points = result.actual_values.len(),
        "training finished"
    );
    Ok(result)
}

fn column_cells<'t>(table: &'t RawTable, rows: &[usize], column: usize) -> Vec<&'t str> {
    rows.iter().map(|&r| table.cell(r, column)).collect()
}
