//! Prediction input model and canonical fingerprinting
//!
//! [`PredictionInput`] carries everything the engine needs to explain one
//! prediction: the feature vector, the situational context, and the entity
//! class and model identity that select domain knowledge. Inputs are
//! identified by a content-based [`Fingerprint`] over features, context,
//! class, and model; the caller-supplied `prediction_id` and the arrival
//! timestamp deliberately play no part in identity, so equivalent requests
//! deduplicate and share cache entries no matter who asks or when.

use std::collections::BTreeMap;
use std::fmt;
use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ExplicarError, Result};

/// Situational attributes accompanying a prediction
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PredictionContext {
    /// Categorical attributes, e.g. weather "rain" or venue "home"
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    /// Numeric attributes, e.g. temperature or line movement
    #[serde(default)]
    pub measurements: BTreeMap<String, f64>,
}

impl PredictionContext {
    /// Add a categorical attribute
    #[must_use]
    pub fn with_attribute(mut self, key: &str, value: &str) -> Self {
        self.attributes.insert(key.to_string(), value.to_string());
        self
    }

    /// Add a numeric attribute
    #[must_use]
    pub fn with_measurement(mut self, key: &str, value: f64) -> Self {
        self.measurements.insert(key.to_string(), value);
        self
    }

    /// True when the context carries no attributes at all
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty() && self.measurements.is_empty()
    }
}

/// One prediction to explain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionInput {
    /// Caller-supplied identifier, echoed into the explanation record
    pub prediction_id: String,
    /// Entity class selecting domain knowledge, e.g. "quarterback"
    pub entity_class: String,
    /// Identity of the model that produced the prediction
    pub model_id: String,
    /// Feature values the model saw
    #[serde(default)]
    pub features: BTreeMap<String, f64>,
    /// Situational context around the prediction
    #[serde(default)]
    pub context: PredictionContext,
    /// When the input was constructed
    pub created_at: DateTime<Utc>,
}

impl PredictionInput {
    /// Create an input with no features yet
    #[must_use]
    pub fn new(prediction_id: &str, entity_class: &str, model_id: &str) -> Self {
        Self {
            prediction_id: prediction_id.to_string(),
            entity_class: entity_class.to_string(),
            model_id: model_id.to_string(),
            features: BTreeMap::new(),
            context: PredictionContext::default(),
            created_at: Utc::now(),
        }
    }

    /// Add a single feature value
    #[must_use]
    pub fn with_feature(mut self, name: &str, value: f64) -> Self {
        self.features.insert(name.to_string(), value);
        self
    }

    /// Add many feature values at once
    #[must_use]
    pub fn with_features<I>(mut self, features: I) -> Self
    where
        I: IntoIterator<Item = (String, f64)>,
    {
        self.features.extend(features);
        self
    }

    /// Replace the whole context
    #[must_use]
    pub fn with_context(mut self, context: PredictionContext) -> Self {
        self.context = context;
        self
    }

    /// Add a categorical context attribute
    #[must_use]
    pub fn with_attribute(mut self, key: &str, value: &str) -> Self {
        self.context.attributes.insert(key.to_string(), value.to_string());
        self
    }

    /// Add a numeric context attribute
    #[must_use]
    pub fn with_measurement(mut self, key: &str, value: f64) -> Self {
        self.context.measurements.insert(key.to_string(), value);
        self
    }

    /// Boundary validation before any computation starts
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` when the feature map is empty, when the
    /// prediction id is blank, or when any feature or measurement value is
    /// not finite.
    pub fn validate(&self) -> Result<()> {
        if self.prediction_id.trim().is_empty() {
            return Err(ExplicarError::InvalidInput {
                reason: "prediction_id is empty".to_string(),
            });
        }
        if self.features.is_empty() {
            return Err(ExplicarError::InvalidInput {
                reason: "no features supplied".to_string(),
            });
        }
        for (name, value) in &self.features {
            if !value.is_finite() {
                return Err(ExplicarError::InvalidInput {
                    reason: format!("feature {name} is not finite"),
                });
            }
        }
        for (name, value) in &self.context.measurements {
            if !value.is_finite() {
                return Err(ExplicarError::InvalidInput {
                    reason: format!("measurement {name} is not finite"),
                });
            }
        }
        Ok(())
    }

    /// Content-based identity of this input
    #[must_use]
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::of(self)
    }
}

/// Canonical content fingerprint of a [`PredictionInput`]
///
/// Two inputs with the same features, context, entity class, and model id
/// produce byte-identical fingerprints regardless of construction order.
/// Distinct inputs produce distinct fingerprints: every component is
/// length-prefixed, so no choice of names or values can collide. The
/// `Display` form is a compact FNV-1a digest for logs and events; cache
/// and dedup keys use the full canonical text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    fn of(input: &PredictionInput) -> Self {
        let mut out = String::with_capacity(64);
        push_part(&mut out, 'c', "class", &input.entity_class);
        push_part(&mut out, 'd', "model", &input.model_id);
        for (name, value) in &input.features {
            push_part(&mut out, 'f', name, &value.to_string());
        }
        for (key, value) in &input.context.attributes {
            push_part(&mut out, 'a', key, value);
        }
        for (key, value) in &input.context.measurements {
            push_part(&mut out, 'm', key, &value.to_string());
        }
        Self(out)
    }

    /// Full canonical text, the collision-free cache and dedup key
    #[must_use]
    pub fn canonical(&self) -> &str {
        &self.0
    }

    /// FNV-1a hash of the canonical text, also the surrogate RNG seed
    #[must_use]
    pub fn hash64(&self) -> u64 {
        const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
        const FNV_PRIME: u64 = 0x0100_0000_01b3;

        let mut hash = FNV_OFFSET;
        for byte in self.0.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(FNV_PRIME);
        }
        hash
    }

    /// 16-hex-char FNV-1a digest of the canonical text
    #[must_use]
    pub fn digest(&self) -> String {
        format!("{:016x}", self.hash64())
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.digest())
    }
}

/// Append one length-prefixed `tag klen:key=vlen:value;` component
fn push_part(out: &mut String, tag: char, key: &str, value: &str) {
    out.push(tag);
    let _ = write!(out, "{}:{key}={}:{value};", key.len(), value.len());
}
