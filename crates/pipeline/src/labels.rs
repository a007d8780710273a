//! Target column encoding per task
//!
//! Regression labels are floats, binary labels are booleans and multiclass
//! labels are dense keys assigned in first-seen order over the training rows.

use std::collections::HashMap;

use crate::features::parse_f32;

/// Representation the task needs for its label
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelEncoding {
    Float,
    Boolean,
    Key,
}

/// Encoded label column
#[derive(Debug, Clone, PartialEq)]
pub enum Labels {
    Float(Vec<f32>),
    Bool(Vec<bool>),
    /// Class key per row; `None` for blank or unseen values
    Key(Vec<Option<u32>>),
}

impl Labels {
    pub fn len(&self) -> usize {
        match self {
            Labels::Float(v) => v.len(),
            Labels::Bool(v) => v.len(),
            Labels::Key(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether row `i` carries a label a trainer can learn from
    pub fn is_usable(&self, i: usize) -> bool {
        match self {
            Labels::Float(v) => v[i].is_finite(),
            Labels::Bool(_) => true,
            Labels::Key(v) => v[i].is_some(),
        }
    }

    /// Text rendering of row `i`, used in diagnostics
    pub fn display(&self, i: usize) -> String {
        match self {
            Labels::Float(v) => v[i].to_string(),
            Labels::Bool(v) => v[i].to_string(),
            Labels::Key(v) => v[i].map_or_else(|| "missing".to_string(), |k| k.to_string()),
        }
    }
}

/// Label transform fitted on the training split
#[derive(Debug, Clone, PartialEq)]
pub struct FittedLabels {
    encoding: LabelEncoding,
    classes: Vec<String>,
    keys: HashMap<String, u32>,
}

impl LabelEncoding {
    /// Fit the encoding on the training cells of the target column.
    ///
    /// Only the key encoding learns anything: each distinct non-blank value
    /// gets the next key in the order it is first seen.
    pub fn fit<'a>(self, cells: impl Iterator<Item = &'a str>) -> FittedLabels {
        let mut classes = Vec::new();
        let mut keys = HashMap::new();

        if self == LabelEncoding::Key {
            for cell in cells {
                let value = cell.trim();
                if value.is_empty() || keys.contains_key(value) {
                    continue;
                }
                keys.insert(value.to_string(), classes.len() as u32);
                classes.push(value.to_string());
            }
        }

        FittedLabels {
            encoding: self,
            classes,
            keys,
        }
    }
}

impl FittedLabels {
    pub fn encoding(&self) -> LabelEncoding {
        self.encoding
    }

    /// Class names in key order (key encoding only)
    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn transform<'a>(&self, cells: impl Iterator<Item = &'a str>) -> Labels {
        match self.encoding {
            LabelEncoding::Float => Labels::Float(cells.map(parse_f32).collect()),
            LabelEncoding::Boolean => Labels::Bool(cells.map(parse_bool).collect()),
            LabelEncoding::Key => Labels::Key(
                cells
                    .map(|cell| self.keys.get(cell.trim()).copied())
                    .collect(),
            ),
        }
    }
}

/// Truthiness of a binary label cell.
///
/// `true`/`yes` and `false`/`no` (any case) are recognized; otherwise any
/// finite non-zero number is true and everything else is false.
pub fn parse_bool(cell: &str) -> bool {
    let value = cell.trim();
    if value.eq_ignore_ascii_case("true") || value.eq_ignore_ascii_case("yes") {
        return true;
    }
    if value.eq_ignore_ascii_case("false") || value.eq_ignore_ascii_case("no") {
        return false;
    }
    value
        .parse::<f64>()
        .map(|v| v.is_finite() && v != 0.0)
        .unwrap_or(false)
}
