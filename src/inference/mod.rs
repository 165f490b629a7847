//! Iris inference.
//!
//! The classifier bundle is read from disk on first use and then shared for the
//! life of the process. Concurrent first requests wait on a single load; a
//! failed load is not cached, so the next request retries.

pub mod bundle;

use serde::{Deserialize, Serialize, Serializer};
use std::{path::PathBuf, sync::Arc};
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{info, instrument};
use utoipa::ToSchema;

use crate::{
    error::{Error, FieldError, Result},
    store::{NewPrediction, PredictionRepository, User},
};

pub use bundle::Bundle;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("failed to read classifier bundle {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid classifier bundle: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("invalid classifier bundle: {0}")]
    Shape(String),
    #[error("classifier produced non-finite probabilities")]
    NonFinite,
}

/// Largest accepted measurement, in centimetres.
pub const MEASUREMENT_MAX_CM: f64 = 100.0;

/// The four iris measurements, in centimetres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct IrisFeatures {
    pub sepal_length: f64,
    pub sepal_width: f64,
    pub petal_length: f64,
    pub petal_width: f64,
}

impl IrisFeatures {
    fn as_array(&self) -> [f64; bundle::FEATURE_COUNT] {
        [
            self.sepal_length,
            self.sepal_width,
            self.petal_length,
            self.petal_width,
        ]
    }

    /// Every measurement must lie in `0..=MEASUREMENT_MAX_CM`.
    ///
    /// # Errors
    /// Returns [`Error::Validation`] naming each out-of-range measurement.
    pub fn validate(&self) -> Result<()> {
        let problems: Vec<FieldError> = [
            ("sepal_length", self.sepal_length),
            ("sepal_width", self.sepal_width),
            ("petal_length", self.petal_length),
            ("petal_width", self.petal_width),
        ]
        .into_iter()
        .filter(|(_, value)| !(0.0..=MEASUREMENT_MAX_CM).contains(value))
        .map(|(field, _)| FieldError::new(field, "Must be between 0 and 100 cm."))
        .collect();

        if problems.is_empty() {
            Ok(())
        } else {
            Err(Error::Validation(problems))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct Classification {
    pub label: String,
    /// Class name to probability, in the bundle's class order.
    #[serde(serialize_with = "in_class_order")]
    #[schema(value_type = std::collections::HashMap<String, f64>)]
    pub probabilities: Vec<(String, f64)>,
}

impl Classification {
    #[must_use]
    pub fn probability(&self, label: &str) -> Option<f64> {
        self.probabilities
            .iter()
            .find(|(name, _)| name == label)
            .map(|(_, p)| *p)
    }
}

fn in_class_order<S: Serializer>(
    probabilities: &[(String, f64)],
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_map(probabilities.iter().map(|(name, p)| (name, p)))
}

/// Lazily loaded, process-wide classifier bundle.
#[derive(Debug)]
pub struct ModelStore {
    path: PathBuf,
    bundle: OnceCell<Arc<Bundle>>,
}

impl ModelStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            bundle: OnceCell::new(),
        }
    }

    /// A store that is already loaded; nothing is read from disk.
    #[must_use]
    pub fn preloaded(bundle: Bundle) -> Self {
        Self {
            path: PathBuf::new(),
            bundle: OnceCell::new_with(Some(Arc::new(bundle))),
        }
    }

    #[must_use]
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.bundle.initialized()
    }

    /// Return the bundle, loading it on first call.
    ///
    /// # Errors
    /// Returns [`ModelError`] if the artifact cannot be read or is invalid.
    pub async fn get(&self) -> Result<Arc<Bundle>, ModelError> {
        self.bundle
            .get_or_try_init(|| async {
                let bytes =
                    tokio::fs::read(&self.path)
                        .await
                        .map_err(|source| ModelError::Io {
                            path: self.path.clone(),
                            source,
                        })?;
                let bundle = Bundle::from_json(&bytes)?;
                info!(
                    path = %self.path.display(),
                    classes = bundle.target_names().len(),
                    "classifier bundle loaded"
                );
                Ok::<_, ModelError>(Arc::new(bundle))
            })
            .await
            .cloned()
    }
}

/// Classify `features` and record the prediction for `user`.
///
/// # Errors
/// Returns a validation error for out-of-range measurements, a model error if
/// the bundle cannot be loaded or yields unusable probabilities, or a storage
/// error if the prediction row cannot be written.
#[instrument(skip(models, predictions, user), fields(user_id = user.id))]
pub async fn predict(
    models: &ModelStore,
    predictions: &dyn PredictionRepository,
    user: &User,
    features: IrisFeatures,
) -> Result<Classification> {
    features.validate()?;

    let bundle = models.get().await?;
    let proba = bundle.predict_proba(&features.as_array());
    if proba.iter().any(|p| !p.is_finite()) {
        return Err(ModelError::NonFinite.into());
    }
    let idx = bundle::argmax(&proba)
        .ok_or_else(|| ModelError::Shape("bundle produced no probabilities".to_string()))?;

    let names = bundle.target_names();
    let label = names[idx].clone();
    let confidence = proba[idx];

    predictions
        .insert(&NewPrediction {
            user_id: user.id,
            features,
            pred_label: label.clone(),
            pred_confidence: confidence,
        })
        .await?;

    info!(label = %label, confidence, "prediction recorded");

    Ok(Classification {
        label,
        probabilities: names.iter().cloned().zip(proba).collect(),
    })
}
