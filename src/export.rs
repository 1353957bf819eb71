use std::{
    collections::HashMap,
    fs::File,
    io::{BufRead, BufReader, Write},
    path::Path,
};

use log::info;
use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::{
    error::{Result, TrainErr},
    result::TrainingResult,
};

/// Name of the intercept entry in an exported model.
pub const INTERCEPT: &str = "(INTERCEPT)";

/// Model class written for logistic regression models.
pub const LOGISTIC_REGRESSION_CLASS: &str =
    "com.linkedin.photon.ml.supervised.classification.LogisticRegressionModel";

const MODEL_LOG_INTERVAL: usize = 1000;

/// A single named coefficient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NameTermValue {
    pub name: String,
    pub term: String,
    pub value: f64,
}

/// One entity's model, keyed by feature name instead of global index.
///
/// The intercept is always the first entry of `means`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelRecord {
    pub model_id: String,
    pub model_class: String,
    pub means: Vec<NameTermValue>,
    #[serde(default)]
    pub loss_function: String,
}

impl ModelRecord {
    /// Builds the record of a trained model.
    ///
    /// # Arguments
    /// * `model_id` - The entity's identifier.
    /// * `model_class` - The class written in the record.
    /// * `result` - The trained model.
    /// * `feature_list` - The `name,term` strings of every global feature, intercept excluded.
    ///
    /// # Errors
    /// `InvalidInput` if a global index falls outside `feature_list` or a feature string
    /// has more than one `,`.
    pub fn from_result(
        model_id: impl Into<String>,
        model_class: impl Into<String>,
        result: &TrainingResult,
        feature_list: &[String],
    ) -> Result<Self> {
        let mut means = Vec::with_capacity(result.coefficients().len());
        means.push(NameTermValue {
            name: INTERCEPT.to_string(),
            term: String::new(),
            value: result.intercept(),
        });

        for (index, value) in result.to_global_pairs() {
            let feature = feature_list.get(index).ok_or_else(|| {
                TrainErr::InvalidInput(format!(
                    "global index {index} outside a feature list of {} entries",
                    feature_list.len()
                ))
            })?;

            let (name, term) = name_term_from_string(feature)?;
            means.push(NameTermValue {
                name: name.to_string(),
                term: term.to_string(),
                value,
            });
        }

        Ok(Self {
            model_id: model_id.into(),
            model_class: model_class.into(),
            means,
            loss_function: String::new(),
        })
    }

    /// Dense coefficients over `num_features` global features, intercept last.
    ///
    /// Features missing from `feature_map` are dropped.
    pub fn coefficients(
        &self,
        feature_map: &HashMap<String, usize>,
        num_features: usize,
    ) -> Array1<f64> {
        let n = num_features;
        let mut coefficients = Array1::zeros(n + 1);

        for ntv in &self.means {
            if ntv.name == INTERCEPT && ntv.term.is_empty() {
                coefficients[n] = ntv.value;
            } else if let Some(&i) = feature_map.get(&name_term_to_string(&ntv.name, &ntv.term)) {
                if i < n {
                    coefficients[i] = ntv.value;
                }
            }
        }

        coefficients
    }
}

/// Splits a `name,term` string. A missing term is empty.
pub fn name_term_from_string(s: &str) -> Result<(&str, &str)> {
    let mut parts = s.split(',');
    let name = parts.next().unwrap_or_default();
    let term = parts.next().unwrap_or_default();

    if parts.next().is_some() {
        return Err(TrainErr::InvalidInput(format!(
            "expected at most one ',' in feature {s:?}"
        )));
    }

    Ok((name, term))
}

pub fn name_term_to_string(name: &str, term: &str) -> String {
    format!("{name},{term}")
}

/// Reads a feature list, one `name,term` per line.
///
/// A feature's global index is its line number, so blank lines are kept as empty entries.
pub fn read_feature_list<P: AsRef<Path>>(path: P) -> Result<Vec<String>> {
    parse_feature_list(BufReader::new(File::open(path)?))
}

fn parse_feature_list<R: BufRead>(reader: R) -> Result<Vec<String>> {
    let mut features = Vec::new();
    for line in reader.lines() {
        features.push(line?.trim().to_string());
    }
    Ok(features)
}

/// Maps every feature to its position in the list. Blank entries name no feature.
pub fn feature_map(feature_list: &[String]) -> HashMap<String, usize> {
    feature_list
        .iter()
        .enumerate()
        .filter(|(_, f)| !f.is_empty())
        .map(|(i, f)| (f.clone(), i))
        .collect()
}

/// Writes `records` as JSON lines.
///
/// # Returns
/// The amount of records written.
pub fn write_models<'a, W, I>(mut writer: W, records: I) -> Result<usize>
where
    W: Write,
    I: IntoIterator<Item = &'a ModelRecord>,
{
    let mut written = 0;
    for record in records {
        serde_json::to_writer(&mut writer, record)?;
        writer.write_all(b"\n")?;

        written += 1;
        if written % MODEL_LOG_INTERVAL == 0 {
            info!("wrote {written} models");
        }
    }

    writer.flush()?;
    Ok(written)
}

/// Reads JSON lines written by `write_models`.
pub fn read_models<R: BufRead>(reader: R) -> Result<Vec<ModelRecord>> {
    let mut records = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if !line.trim().is_empty() {
            records.push(serde_json::from_str(&line)?);
        }
    }
    Ok(records)
}
