//! HTML pages for the upload form, reports and errors

use std::fmt::Write;

use axum::http::StatusCode;
use csvision_pipeline::{ModelKind, ModelResult};

use crate::error::Result;
use crate::graph;

const STYLE: &str = r#"
        body {
            font-family: Arial, sans-serif;
            max-width: 900px;
            margin: 40px auto;
            padding: 20px;
            background: #f5f5f5;
        }
        .container {
            background: white;
            padding: 30px;
            border-radius: 8px;
            box-shadow: 0 2px 4px rgba(0,0,0,0.1);
        }
        h1 {
            color: #333;
            border-bottom: 3px solid #4CAF50;
            padding-bottom: 10px;
        }
        .error h1 {
            border-bottom-color: #d9534f;
        }
        table.metrics td {
            padding: 4px 12px;
            border-bottom: 1px solid #eee;
        }
        label {
            display: block;
            margin-top: 12px;
        }
"#;

/// Escape text for use in element content and attribute values
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

fn page(title: &str, class: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n    <meta charset=\"utf-8\">\n    <title>{}</title>\n    <style>{}</style>\n</head>\n<body>\n    <div class=\"container {}\">\n{}    </div>\n</body>\n</html>\n",
        escape(title),
        STYLE,
        class,
        body
    )
}

/// Upload form listing every model kind
pub fn index_page(min_rows: usize) -> String {
    let mut options = String::new();
    for kind in ModelKind::ALL {
        let _ = writeln!(
            options,
            "            <option value=\"{}\">{}</option>",
            kind.token(),
            kind.display_name()
        );
    }

    let body = format!(
        r#"        <h1>CSVision</h1>
        <p>Upload a CSV with at least {min_rows} data rows, choose a model and a target column.</p>
        <form action="/api/predictions" method="post" enctype="multipart/form-data">
            <label>CSV file <input type="file" name="csv_file" accept=".csv" required></label>
            <label>Model <select name="model">
{options}            </select></label>
            <label>Target column <input type="text" name="target" required></label>
            <label>Feature columns (comma separated, empty for all) <input type="text" name="features"></label>
            <label>Seed <input type="number" name="seed" value="-1"></label>
            <label><input type="checkbox" name="confusion_matrix" value="true"> Confusion matrix</label>
            <p><button type="submit">Train</button></p>
        </form>
"#
    );
    page("CSVision", "", &body)
}

/// Report for a successful run: graphs plus metrics to four decimals
pub fn result_page(result: &ModelResult) -> Result<String> {
    let mut body = String::new();
    let _ = writeln!(body, "        <h1>{}</h1>", escape(result.model_name()));

    let _ = writeln!(body, "        <h2>Predictions</h2>");
    body.push_str(&graph::scatter_svg(
        result.actual_values(),
        result.predicted_values(),
    )?);

    if let Some(matrix) = result.confusion_matrix() {
        let _ = writeln!(body, "        <h2>Confusion Matrix</h2>");
        body.push_str(&graph::confusion_svg(matrix)?);
    }

    let _ = writeln!(body, "        <h2>Metrics</h2>");
    let _ = writeln!(body, "        <table class=\"metrics\">");
    for (name, value) in result.metrics().iter() {
        let _ = writeln!(
            body,
            "            <tr><td>{}</td><td>{:.4}</td></tr>",
            escape(name),
            value
        );
    }
    let _ = writeln!(body, "        </table>");

    Ok(page(result.model_name(), "", &body))
}

/// Error report; never carries internal detail
pub fn error_page(status: StatusCode, message: &str) -> String {
    let body = format!(
        "        <h1>Training request failed</h1>\n        <p>{}</p>\n        <p><small>HTTP {}</small></p>\n        <p><a href=\"/\">Back</a></p>\n",
        escape(message),
        status.as_u16()
    );
    page("CSVision error", "error", &body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use csvision_pipeline::{train, PipelineConfig, TrainingRequest};

    #[test]
    fn test_escape() {
        assert_eq!(escape("<b>\"x\" & 'y'</b>"), "&lt;b&gt;&quot;x&quot; &amp; &#39;y&#39;&lt;/b&gt;");
    }

    #[test]
    fn test_index_lists_models() {
        let html = index_page(100);
        for kind in ModelKind::ALL {
            assert!(html.contains(kind.token()));
        }
        assert!(html.contains("at least 100 data rows"));
    }

    #[test]
    fn test_error_page_escapes_message() {
        let html = error_page(StatusCode::BAD_REQUEST, "column '<y>' missing");
        assert!(html.contains("&lt;y&gt;"));
        assert!(html.contains("HTTP 400"));
    }

    #[test]
    fn test_result_page_formats_metrics() -> anyhow::Result<()> {
        let mut csv = String::from("x,label\n");
        for i in 0..100 {
            csv.push_str(&format!("{},{}\n", i, u8::from(i >= 50)));
        }
        let request = TrainingRequest::new(ModelKind::LogisticRegression, "label")
            .with_seed(1)
            .with_confusion_matrix(true);
        let result = train(csv.as_bytes(), &request, &PipelineConfig::default())?;

        let html = result_page(&result)?;
        assert!(html.contains("Logistic Regression Model"));
        assert!(html.contains("<td>Accuracy</td>"));
        assert!(html.contains("Confusion Matrix"));
        assert_eq!(html.matches("<svg").count(), 2);

        let accuracy = result.metrics().get("Accuracy").unwrap_or_default();
        assert!(html.contains(&format!("<td>{accuracy:.4}</td>")));
        Ok(())
    }
}
