//! Classifier bundle: a standardizing scaler followed by multinomial logistic
//! regression, plus the ordered class names.
//!
//! The artifact is JSON:
//!
//! ```json
//! {
//!   "target_names": ["setosa", "versicolor", "virginica"],
//!   "scaler": { "mean": [..4], "scale": [..4] },
//!   "coef": [[..4], [..4], [..4]],
//!   "intercept": [..3]
//! }
//! ```

use serde::Deserialize;

use super::ModelError;

pub const FEATURE_COUNT: usize = 4;

#[derive(Debug, Clone, Deserialize, PartialEq)]
struct Scaler {
    mean: Vec<f64>,
    scale: Vec<f64>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
struct RawBundle {
    target_names: Vec<String>,
    scaler: Scaler,
    coef: Vec<Vec<f64>>,
    intercept: Vec<f64>,
}

/// A validated bundle; shapes are guaranteed consistent.
#[derive(Debug, Clone, PartialEq)]
pub struct Bundle {
    target_names: Vec<String>,
    mean: [f64; FEATURE_COUNT],
    scale: [f64; FEATURE_COUNT],
    coef: Vec<[f64; FEATURE_COUNT]>,
    intercept: Vec<f64>,
}

fn features_of(values: &[f64], what: &str) -> Result<[f64; FEATURE_COUNT], ModelError> {
    <[f64; FEATURE_COUNT]>::try_from(values).map_err(|_| {
        ModelError::Shape(format!(
            "{what} has {} values, expected {FEATURE_COUNT}",
            values.len()
        ))
    })
}

impl Bundle {
    /// Parse and validate a JSON artifact.
    ///
    /// # Errors
    /// Returns [`ModelError::Decode`] for invalid JSON and [`ModelError::Shape`]
    /// when the parts do not line up.
    pub fn from_json(bytes: &[u8]) -> Result<Self, ModelError> {
        let raw: RawBundle = serde_json::from_slice(bytes)?;

        if raw.target_names.is_empty() {
            return Err(ModelError::Shape("bundle has no classes".to_string()));
        }
        if raw.coef.len() != raw.target_names.len() || raw.intercept.len() != raw.target_names.len()
        {
            return Err(ModelError::Shape(format!(
                "{} classes but {} coefficient rows and {} intercepts",
                raw.target_names.len(),
                raw.coef.len(),
                raw.intercept.len()
            )));
        }

        let mean = features_of(&raw.scaler.mean, "scaler mean")?;
        let scale = features_of(&raw.scaler.scale, "scaler scale")?;
        if scale.iter().any(|s| *s == 0.0 || !s.is_finite()) {
            return Err(ModelError::Shape(
                "scaler scale must be finite and non-zero".to_string(),
            ));
        }
        let coef = raw
            .coef
            .iter()
            .map(|row| features_of(row, "coefficient row"))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            target_names: raw.target_names,
            mean,
            scale,
            coef,
            intercept: raw.intercept,
        })
    }

    #[must_use]
    pub fn target_names(&self) -> &[String] {
        &self.target_names
    }

    /// Class probabilities in `target_names` order; they sum to 1.
    #[must_use]
    pub fn predict_proba(&self, x: &[f64; FEATURE_COUNT]) -> Vec<f64> {
        let mut z = [0.0; FEATURE_COUNT];
        for (i, value) in x.iter().enumerate() {
            z[i] = (value - self.mean[i]) / self.scale[i];
        }

        let logits: Vec<f64> = self
            .coef
            .iter()
            .zip(&self.intercept)
            .map(|(row, b)| row.iter().zip(&z).map(|(w, v)| w * v).sum::<f64>() + b)
            .collect();

        softmax(&logits)
    }
}

fn softmax(logits: &[f64]) -> Vec<f64> {
    let max = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = logits.iter().map(|l| (l - max).exp()).collect();
    let total: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / total).collect()
}

/// Index of the largest probability; ties go to the lowest index.
#[must_use]
pub fn argmax(probabilities: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (idx, p) in probabilities.iter().copied().enumerate() {
        match best {
            Some((_, current)) if p <= current => {}
            _ => best = Some((idx, p)),
        }
    }
    best.map(|(idx, _)| idx)
}
