//! Feature plan resolution and encoding
//!
//! A [`FeaturePlan`] decides which columns feed the model and how each one is
//! encoded. Fitting the plan on the training rows yields [`FittedFeatures`],
//! which turns any row of the table into one concatenated `f32` vector:
//! numeric columns contribute one slot, text columns contribute one slot per
//! vocabulary entry.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::Serialize;

use crate::config::TextConfig;
use crate::schema::{ColumnKind, ColumnSchema};
use crate::table::RawTable;

/// Suffix appended to a source column to name its encoded output
pub const OUTPUT_SUFFIX: &str = "_num";

/// How a source column is turned into numbers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Encoding {
    /// Parse the cell as `f32`; blank or unparseable cells become NaN
    CastToFloat32,
    /// Bag-of-words vector over a vocabulary learned from the training rows
    Featurize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeatureColumn {
    pub source_column: String,
    /// Position of the source column in the schema
    pub source_index: usize,
    pub output_name: String,
    pub encoding: Encoding,
}

/// Ordered list of encoded feature columns
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FeaturePlan {
    columns: Vec<FeatureColumn>,
}

impl FeaturePlan {
    /// Resolve the feature columns for a run.
    ///
    /// `target` is the schema index of the resolved target column. With a
    /// non-empty explicit list, names equal to the target name
    /// (case-insensitive) are removed, duplicates keep their first
    /// occurrence and names missing from the schema are skipped. Without
    /// one, every schema column except the target column is used.
    pub fn resolve(schema: &[ColumnSchema], target: usize, features: Option<&[String]>) -> Self {
        let target_name = schema.get(target).map(|c| c.name.as_str());
        let is_target = |name: &str| target_name.is_some_and(|t| name.eq_ignore_ascii_case(t));

        let candidates: Vec<usize> = match features {
            Some(names) if !names.is_empty() => {
                let mut seen = BTreeSet::new();
                names
                    .iter()
                    .filter(|name| !is_target(name))
                    .filter(|name| seen.insert(name.as_str()))
                    .filter_map(|name| {
                        let found = schema.iter().position(|c| c.name == **name);
                        if found.is_none() {
                            tracing::debug!(feature = %name, "feature not in schema, skipping");
                        }
                        found
                    })
                    .filter(|&i| i != target)
                    .collect()
            }
            _ => (0..schema.len()).filter(|&i| i != target).collect(),
        };

        let columns = candidates
            .into_iter()
            .map(|i| {
                let column = &schema[i];
                FeatureColumn {
                    source_column: column.name.clone(),
                    source_index: i,
                    output_name: format!("{}{}", column.name, OUTPUT_SUFFIX),
                    encoding: match column.kind {
                        ColumnKind::Numeric => Encoding::CastToFloat32,
                        ColumnKind::Text => Encoding::Featurize,
                    },
                }
            })
            .collect();

        Self { columns }
    }

    pub fn columns(&self) -> &[FeatureColumn] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Learn per-column encoders from the given training rows only
    pub fn fit(&self, table: &RawTable, rows: &[usize], config: &TextConfig) -> FittedFeatures {
        let columns = self
            .columns
            .iter()
            .map(|column| match column.encoding {
                Encoding::CastToFloat32 => FittedColumn::Numeric {
                    source_index: column.source_index,
                    output_name: column.output_name.clone(),
                },
                Encoding::Featurize => {
                    let texts = rows.iter().map(|&r| table.cell(r, column.source_index));
                    FittedColumn::Text {
                        source_index: column.source_index,
                        output_name: column.output_name.clone(),
                        vocabulary: Vocabulary::fit(texts, config),
                    }
                }
            })
            .collect();

        FittedFeatures { columns }
    }
}

/// Feature transform fitted on the training split
#[derive(Debug, Clone)]
pub struct FittedFeatures {
    columns: Vec<FittedColumn>,
}

#[derive(Debug, Clone)]
enum FittedColumn {
    Numeric {
        source_index: usize,
        output_name: String,
    },
    Text {
        source_index: usize,
        output_name: String,
        vocabulary: Vocabulary,
    },
}

impl FittedColumn {
    fn width(&self) -> usize {
        match self {
            FittedColumn::Numeric { .. } => 1,
            FittedColumn::Text { vocabulary, .. } => vocabulary.len(),
        }
    }
}

impl FittedFeatures {
    /// Dimension of the concatenated feature vector
    pub fn width(&self) -> usize {
        self.columns.iter().map(FittedColumn::width).sum()
    }

    /// Name of every slot of the feature vector, in order
    pub fn feature_names(&self) -> Vec<String> {
        let mut names = Vec::with_capacity(self.width());
        for column in &self.columns {
            match column {
                FittedColumn::Numeric { output_name, .. } => names.push(output_name.clone()),
                FittedColumn::Text {
                    output_name,
                    vocabulary,
                    ..
                } => names.extend(
                    vocabulary
                        .tokens
                        .iter()
                        .map(|token| format!("{output_name}.{token}")),
                ),
            }
        }
        names
    }

    /// Encode one table row
    pub fn encode_row(&self, row: &[String]) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.width());
        for column in &self.columns {
            match column {
                FittedColumn::Numeric { source_index, .. } => {
                    out.push(parse_f32(&row[*source_index]));
                }
                FittedColumn::Text {
                    source_index,
                    vocabulary,
                    ..
                } => vocabulary.encode_into(&row[*source_index], &mut out),
            }
        }
        out
    }

    /// Encode the given rows of the table
    pub fn transform(&self, table: &RawTable, rows: &[usize]) -> Vec<Vec<f32>> {
        rows.iter().map(|&r| self.encode_row(table.row(r))).collect()
    }
}

/// Parse a numeric cell; blank or malformed cells are NaN
pub fn parse_f32(cell: &str) -> f32 {
    cell.trim().parse::<f32>().unwrap_or(f32::NAN)
}

/// Bag-of-words vocabulary for one text column
#[derive(Debug, Clone, Default)]
struct Vocabulary {
    /// Lexically ordered tokens
    tokens: Vec<String>,
    index: HashMap<String, usize>,
    bigrams: bool,
}

impl Vocabulary {
    fn fit<'a>(texts: impl Iterator<Item = &'a str>, config: &TextConfig) -> Self {
        let mut document_frequency: BTreeMap<String, usize> = BTreeMap::new();
        for text in texts {
            let distinct: BTreeSet<String> = terms(text, config.bigrams).into_iter().collect();
            for term in distinct {
                *document_frequency.entry(term).or_default() += 1;
            }
        }

        let mut ranked: Vec<(String, usize)> = document_frequency.into_iter().collect();
        // BTreeMap order makes ties lexical
        ranked.sort_by(|a, b| b.1.cmp(&a.1));
        ranked.truncate(config.max_vocabulary);

        let mut tokens: Vec<String> = ranked.into_iter().map(|(t, _)| t).collect();
        tokens.sort();
        let index = tokens
            .iter()
            .enumerate()
            .map(|(i, t)| (t.clone(), i))
            .collect();

        Self {
            tokens,
            index,
            bigrams: config.bigrams,
        }
    }

    fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Append L2-normalized term counts for `text`
    fn encode_into(&self, text: &str, out: &mut Vec<f32>) {
        let start = out.len();
        out.resize(start + self.len(), 0.0);
        let slots = &mut out[start..];

        for term in terms(text, self.bigrams) {
            if let Some(&i) = self.index.get(&term) {
                slots[i] += 1.0;
            }
        }

        let norm = slots.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in slots.iter_mut() {
                *v /= norm;
            }
        }
    }
}

/// Lower-cased alphanumeric words, plus adjacent-word bigrams when enabled
fn terms(text: &str, bigrams: bool) -> Vec<String> {
    let words: Vec<String> = text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect();

    let mut out = words.clone();
    if bigrams {
        out.extend(words.windows(2).map(|pair| format!("{} {}", pair[0], pair[1])));
    }
    out
}
