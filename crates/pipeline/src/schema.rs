//! Column type inference from sampled rows

use serde::{Deserialize, Serialize};

use crate::errors::{PipelineError, Result};
use crate::table::RawTable;

/// Number of leading data rows inspected per column
pub const SAMPLE_ROWS: usize = 10;

/// Coarse column type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnKind {
    Numeric,
    Text,
}

/// Inferred name and kind of one column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    pub kind: ColumnKind,
}

/// Infer one [`ColumnSchema`] per header cell, in header order.
///
/// A column is numeric iff every non-blank value among the first
/// [`SAMPLE_ROWS`] rows parses as `f32`. A column with only blank samples
/// is numeric as well.
pub fn infer_schema(table: &RawTable) -> Vec<ColumnSchema> {
    let sample = table.len().min(SAMPLE_ROWS);

    table
        .headers()
        .iter()
        .enumerate()
        .map(|(i, header)| {
            let name = if header.trim().is_empty() {
                format!("Column{i}")
            } else {
                header.clone()
            };

            let numeric = (0..sample)
                .map(|row| table.cell(row, i).trim())
                .filter(|v| !v.is_empty())
                .all(|v| v.parse::<f32>().is_ok());

            ColumnSchema {
                name,
                kind: if numeric {
                    ColumnKind::Numeric
                } else {
                    ColumnKind::Text
                },
            }
        })
        .collect()
}

/// Parse CSV text and infer its schema in one step
pub fn infer_schema_from_csv(text: &str) -> Result<Vec<ColumnSchema>> {
    let table = RawTable::parse(text)?;
    Ok(infer_schema(&table))
}

/// Index of the target column: exact name first, then a unique
/// case-insensitive match.
///
/// Several case-insensitive matches without an exact one are ambiguous and
/// reported as a [`PipelineError::Schema`] error.
pub fn find_target(schema: &[ColumnSchema], target: &str) -> Result<usize> {
    if let Some(index) = schema.iter().position(|c| c.name == target) {
        return Ok(index);
    }

    let mut matches = schema
        .iter()
        .enumerate()
        .filter(|(_, c)| c.name.eq_ignore_ascii_case(target))
        .map(|(i, _)| i);

    match (matches.next(), matches.next()) {
        (Some(index), None) => Ok(index),
        (Some(_), Some(_)) => Err(PipelineError::Schema(format!(
            "target column '{target}' matches several columns when case is ignored"
        ))),
        (None, _) => Err(PipelineError::SchemaMismatch {
            column: target.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_and_text_columns() -> Result<()> {
        let schema = infer_schema_from_csv("id,name,score\n1,alice,3.5\n2,bob,4\n")?;
        assert_eq!(
            schema,
            vec![
                ColumnSchema { name: "id".into(), kind: ColumnKind::Numeric },
                ColumnSchema { name: "name".into(), kind: ColumnKind::Text },
                ColumnSchema { name: "score".into(), kind: ColumnKind::Numeric },
            ]
        );
        Ok(())
    }

    #[test]
    fn test_blank_header_is_synthesized() -> Result<()> {
        let schema = infer_schema_from_csv("a,,c\n1,2,3\n")?;
        assert_eq!(schema[1].name, "Column1");
        Ok(())
    }

    #[test]
    fn test_all_blank_sample_defaults_to_numeric() -> Result<()> {
        let schema = infer_schema_from_csv("a,b\n1,\n2,\n")?;
        assert_eq!(schema[1].kind, ColumnKind::Numeric);
        Ok(())
    }

    #[test]
    fn test_blanks_are_ignored_when_sampling() -> Result<()> {
        let schema = infer_schema_from_csv("a,b\n1, \n2,x\n")?;
        assert_eq!(schema[0].kind, ColumnKind::Numeric);
        assert_eq!(schema[1].kind, ColumnKind::Text);
        Ok(())
    }

    #[test]
    fn test_only_first_rows_are_sampled() -> Result<()> {
        let mut csv = String::from("a\n");
        for i in 0..SAMPLE_ROWS {
            csv.push_str(&format!("{i}\n"));
        }
        csv.push_str("not-a-number\n");
        let schema = infer_schema_from_csv(&csv)?;
        assert_eq!(schema[0].kind, ColumnKind::Numeric);
        Ok(())
    }

    #[test]
    fn test_empty_input_fails() {
        assert!(matches!(
            infer_schema_from_csv(""),
            Err(PipelineError::EmptyInput)
        ));
    }

    #[test]
    fn test_find_target() -> Result<()> {
        let schema = infer_schema_from_csv("Price,price2\n1,2\n")?;
        assert_eq!(find_target(&schema, "Price")?, 0);
        assert_eq!(find_target(&schema, "price")?, 0);
        assert!(matches!(
            find_target(&schema, "missing"),
            Err(PipelineError::SchemaMismatch { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_find_target_rejects_ambiguous_case_match() -> Result<()> {
        let schema = infer_schema_from_csv("Price,PRICE,x
2,3,1
")?;
        assert!(matches!(
            find_target(&schema, "price"),
            Err(PipelineError::Schema(_))
        ));
        assert_eq!(find_target(&schema, "PRICE")?, 1);
        Ok(())
    }
}
