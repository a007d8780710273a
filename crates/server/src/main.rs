//! CSVision upload service
//!
//! Accepts a CSV upload with a model selection and answers with an HTML
//! report of the trained model.

mod error;
mod graph;
mod handlers;
mod html;

use anyhow::{Context, Result};
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use clap::Parser;
use csvision_pipeline::PipelineConfig;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "csvision-server")]
#[command(about = "CSVision upload and training service")]
#[command(version)]
struct Cli {
    /// Optional TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bind address (overrides configuration)
    #[arg(long)]
    host: Option<String>,

    /// Bind port (overrides configuration)
    #[arg(short, long)]
    port: Option<u16>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,
}

pub struct AppState {
    pub config: Arc<PipelineConfig>,
}

fn router(state: Arc<AppState>) -> Router {
    let body_limit = state.config.server.max_upload_bytes;

    Router::new()
        .route("/", get(handlers::index))
        .route("/api/health", get(handlers::health))
        .route("/api/predictions", post(handlers::predict))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let mut config = match &cli.config {
        Some(path) => PipelineConfig::load(path).context("Failed to load configuration")?,
        None => PipelineConfig::default(),
    };
    config.apply_env().context("Invalid environment override")?;
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = Arc::new(AppState {
        config: Arc::new(config),
    });
    let app = router(state);

    tracing::info!("CSVision server v{} starting on {}", csvision_pipeline::VERSION, addr);

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use tower::ServiceExt;

    const BOUNDARY: &str = "csvision-test-boundary";

    fn app(min_rows: usize) -> Router {
        let mut config = PipelineConfig::default();
        config.server.min_rows = min_rows;
        router(Arc::new(AppState {
            config: Arc::new(config),
        }))
    }

    fn multipart_body(fields: &[(&str, &str)], csv: &str) -> String {
        let mut body = String::new();
        for (name, value) in fields {
            body.push_str(&format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            ));
        }
        body.push_str(&format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"csv_file\"; filename=\"data.csv\"\r\nContent-Type: text/csv\r\n\r\n{csv}\r\n--{BOUNDARY}--\r\n"
        ));
        body
    }

    fn upload(fields: &[(&str, &str)], csv: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/predictions")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(multipart_body(fields, csv)))
            .unwrap()
    }

    fn linear_csv(rows: usize) -> String {
        let mut csv = String::from("x,y\n");
        for i in 1..=rows {
            csv.push_str(&format!("{},{}\n", i, 2 * i));
        }
        csv
    }

    async fn body_text(response: axum::response::Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8_lossy(&bytes).into_owned()
    }

    #[tokio::test]
    async fn test_health() {
        let response = app(100)
            .oneshot(Request::get("/api/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_text(response).await.contains("healthy"));
    }

    #[tokio::test]
    async fn test_index_form() {
        let response = app(100)
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_text(response).await.contains("csv_file"));
    }

    #[tokio::test]
    async fn test_successful_upload_renders_report() {
        let request = upload(
            &[
                ("model", "LinearRegression"),
                ("target", "y"),
                ("features[]", "x"),
                ("seed", "42"),
            ],
            &linear_csv(120),
        );
        let response = app(100).oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let html = body_text(response).await;
        assert!(html.contains("Linear Regression Model"));
        assert!(html.contains("<td>RSquared</td>"));
    }

    #[tokio::test]
    async fn test_too_few_rows_is_rejected() {
        let request = upload(&[("model", "LinearRegression"), ("target", "y")], &linear_csv(20));
        let response = app(100).oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_text(response).await.contains("at least 100 data rows"));
    }

    #[tokio::test]
    async fn test_missing_target_column() {
        let request = upload(&[("model", "LinearRegression"), ("target", "price")], &linear_csv(20));
        let response = app(10).oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_text(response).await.contains("price"));
    }

    #[tokio::test]
    async fn test_fit_failure_hides_diagnostics() {
        let mut csv = String::from("x,label\n");
        for i in 0..30 {
            csv.push_str(&format!("{i},0\n"));
        }
        let request = upload(&[("model", "LogisticRegression"), ("target", "label"), ("seed", "1")], &csv);
        let response = app(10).oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let html = body_text(response).await;
        assert!(html.contains("model training failed"));
        assert!(!html.contains("x_num"));
    }
}
