//! Request handlers

use std::sync::Arc;

use axum::{
    extract::{Multipart, State},
    response::{Html, Json},
};
use csvision_pipeline::{
    train_table, ModelKind, ModelResult, PipelineError, RawTable, StagedUpload, TrainingRequest,
    UNSEEDED,
};
use tracing::info;

use crate::error::{Result, ServerError};
use crate::html;
use crate::AppState;

pub async fn index(State(state): State<Arc<AppState>>) -> Html<String> {
    Html(html::index_page(state.config.server.min_rows))
}

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "service": "csvision-server"
    }))
}

/// Form fields of a prediction request
#[derive(Debug, Default)]
struct UploadForm {
    csv: Option<Vec<u8>>,
    file_name: Option<String>,
    model: Option<String>,
    features: Vec<String>,
    target: Option<String>,
    seed: Option<String>,
    confusion_matrix: bool,
}

impl UploadForm {
    async fn read(mut multipart: Multipart) -> Result<Self> {
        let mut form = UploadForm::default();

        while let Some(field) = multipart.next_field().await? {
            let name = field.name().unwrap_or_default().to_string();
            match name.as_str() {
                "csv_file" => {
                    form.file_name = field.file_name().map(str::to_string);
                    form.csv = Some(field.bytes().await?.to_vec());
                }
                "model" => form.model = Some(field.text().await?),
                "target" => form.target = Some(field.text().await?),
                "seed" => form.seed = Some(field.text().await?),
                "features" | "features[]" => {
                    let text = field.text().await?;
                    form.features.extend(
                        text.split(',')
                            .map(str::trim)
                            .filter(|f| !f.is_empty())
                            .map(str::to_string),
                    );
                }
                "confusion_matrix" => {
                    let value = field.text().await?;
                    form.confusion_matrix = matches!(
                        value.trim().to_ascii_lowercase().as_str(),
                        "true" | "on" | "1" | "yes"
                    );
                }
                other => tracing::debug!(field = %other, "ignoring unknown form field"),
            }
        }

        Ok(form)
    }

    fn into_request(self) -> Result<(Vec<u8>, TrainingRequest)> {
        let csv = self
            .csv
            .filter(|bytes| !bytes.is_empty())
            .ok_or_else(|| ServerError::BadRequest("Please upload a non-empty CSV file".to_string()))?;

        let model: ModelKind = self
            .model
            .as_deref()
            .ok_or_else(|| ServerError::BadRequest("Please choose a model".to_string()))?
            .parse()?;

        let target = self
            .target
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ServerError::BadRequest("Please name the target column".to_string()))?;

        let seed = match self.seed.as_deref().map(str::trim) {
            None | Some("") => UNSEEDED,
            Some(raw) => raw
                .parse::<i64>()
                .map_err(|_| ServerError::BadRequest(format!("Seed must be an integer, got '{raw}'")))?,
        };

        let mut request = TrainingRequest::new(model, target)
            .with_seed(seed)
            .with_confusion_matrix(self.confusion_matrix);
        if !self.features.is_empty() {
            request = request.with_features(self.features);
        }
        Ok((csv, request))
    }
}

/// Stage the upload, enforce the minimum row count and train off the async runtime
pub async fn predict(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Html<String>> {
    let form = UploadForm::read(multipart).await?;
    let file_name = form.file_name.clone().unwrap_or_else(|| "upload.csv".to_string());
    let (csv, request) = form.into_request()?;
    info!(
        file = %file_name,
        bytes = csv.len(),
        model = %request.model,
        target = %request.target,
        "Received training request"
    );

    let staged = StagedUpload::create(state.config.server.staging_dir.as_deref(), &csv)?;
    drop(csv);

    let config = Arc::clone(&state.config);
    let result = tokio::task::spawn_blocking(move || -> std::result::Result<ModelResult, PipelineError> {
        let table = RawTable::from_reader(staged.reopen()?)?;
        let min_rows = config.server.min_rows;
        if table.len() < min_rows {
            return Err(PipelineError::Data(format!(
                "dataset must contain at least {min_rows} data rows, found {}",
                table.len()
            )));
        }
        train_table(table, &request, &config)
    })
    .await
    .map_err(|e| ServerError::Internal(format!("training task failed: {e}")))??;

    Ok(Html(html::result_page(&result)?))
}
