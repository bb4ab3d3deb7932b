//! Prediction values and prediction options

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Policy for traversing a tree when the input lacks a split field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MissingStrategy {
    /// Stop at the node whose split field is missing
    #[default]
    LastPrediction,
    /// Merge every branch weighted by its training count
    Proportional,
}

/// Predicted class or predicted numeric value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PredictionValue {
    Number(f64),
    Category(String),
}

impl PredictionValue {
    pub fn as_category(&self) -> Option<&str> {
        match self {
            PredictionValue::Category(name) => Some(name),
            PredictionValue::Number(_) => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PredictionValue::Number(value) => Some(*value),
            PredictionValue::Category(_) => None,
        }
    }
}

impl fmt::Display for PredictionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PredictionValue::Number(value) => write!(f, "{}", value),
            PredictionValue::Category(name) => f.write_str(name),
        }
    }
}

impl From<&str> for PredictionValue {
    fn from(name: &str) -> Self {
        PredictionValue::Category(name.to_string())
    }
}

impl From<f64> for PredictionValue {
    fn from(value: f64) -> Self {
        PredictionValue::Number(value)
    }
}

/// Per-class value reported by probability, confidence and votes queries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryScore {
    pub category: String,
    pub value: f64,
}

impl CategoryScore {
    pub fn new(category: impl Into<String>, value: f64) -> Self {
        Self {
            category: category.into(),
            value,
        }
    }
}

/// Result of a single prediction call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    pub prediction: PredictionValue,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probability: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    /// Vote share of the winner, ensembles only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub votes: Option<f64>,
    pub distribution: Vec<(PredictionValue, f64)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub median: Option<f64>,
    /// Rules followed from the root, for single trees
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub path: Vec<String>,
    /// Field the traversal would have examined next
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unused_fields: Option<Vec<String>>,
}

impl Prediction {
    pub fn new(prediction: PredictionValue) -> Self {
        Self {
            prediction,
            probability: None,
            confidence: None,
            votes: None,
            distribution: Vec::new(),
            count: None,
            median: None,
            path: Vec::new(),
            next: None,
            unused_fields: None,
        }
    }

    /// Predicted class, `None` for regressions
    pub fn category(&self) -> Option<&str> {
        self.prediction.as_category()
    }

    /// Predicted number, `None` for classifications
    pub fn value(&self) -> Option<f64> {
        self.prediction.as_f64()
    }
}

/// Measure an operating point or operating kind selects on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperatingKind {
    Probability,
    Confidence,
    Votes,
}

impl OperatingKind {
    pub fn as_str(self) -> &'static str {
        match self {
            OperatingKind::Probability => "probability",
            OperatingKind::Confidence => "confidence",
            OperatingKind::Votes => "votes",
        }
    }
}

impl std::str::FromStr for OperatingKind {
    type Err = Error;

    fn from_str(kind: &str) -> Result<Self> {
        match kind {
            "probability" => Ok(OperatingKind::Probability),
            "confidence" => Ok(OperatingKind::Confidence),
            "votes" => Ok(OperatingKind::Votes),
            other => Err(Error::configuration(format!(
                "unknown operating kind \"{}\"",
                other
            ))),
        }
    }
}

impl fmt::Display for OperatingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decision threshold on one positive class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatingPoint {
    pub kind: OperatingKind,
    pub threshold: f64,
    pub positive_class: String,
}

impl OperatingPoint {
    pub fn new(kind: OperatingKind, threshold: f64, positive_class: impl Into<String>) -> Self {
        Self {
            kind,
            threshold,
            positive_class: positive_class.into(),
        }
    }
}

/// How an ensemble combines the predictions of its models
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum CombinerMethod {
    /// Majority vote, or average for regressions
    #[default]
    Plurality,
    /// Confidence weighted vote, or error weighted average
    ConfidenceWeighted,
    /// Probability weighted vote
    ProbabilityWeighted,
    /// Fixed class when it collects enough votes
    Threshold,
}

impl CombinerMethod {
    pub fn code(self) -> u8 {
        match self {
            CombinerMethod::Plurality => 0,
            CombinerMethod::ConfidenceWeighted => 1,
            CombinerMethod::ProbabilityWeighted => 2,
            CombinerMethod::Threshold => 3,
        }
    }
}

impl TryFrom<u8> for CombinerMethod {
    type Error = Error;

    fn try_from(code: u8) -> Result<Self> {
        match code {
            0 => Ok(CombinerMethod::Plurality),
            1 => Ok(CombinerMethod::ConfidenceWeighted),
            2 => Ok(CombinerMethod::ProbabilityWeighted),
            3 => Ok(CombinerMethod::Threshold),
            other => Err(Error::configuration(format!(
                "unknown combination method {}",
                other
            ))),
        }
    }
}

impl From<CombinerMethod> for u8 {
    fn from(method: CombinerMethod) -> Self {
        method.code()
    }
}

/// Options of the threshold combiner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdOptions {
    /// Votes `category` needs to win outright
    pub threshold: usize,
    pub category: String,
}

/// Options shared by every prediction entry point
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PredictOptions {
    #[serde(default)]
    pub missing_strategy: MissingStrategy,
    /// Report the median instead of the mean for regressions
    #[serde(default)]
    pub use_median: bool,
    #[serde(default)]
    pub add_unused_fields: bool,
    #[serde(default)]
    pub operating_point: Option<OperatingPoint>,
    #[serde(default)]
    pub operating_kind: Option<OperatingKind>,
    /// Ensemble combiner, ignored by single models
    #[serde(default)]
    pub method: Option<CombinerMethod>,
    #[serde(default)]
    pub threshold: Option<ThresholdOptions>,
}

impl PredictOptions {
    pub fn with_missing_strategy(mut self, strategy: MissingStrategy) -> Self {
        self.missing_strategy = strategy;
        self
    }

    pub fn with_median(mut self) -> Self {
        self.use_median = true;
        self
    }

    pub fn with_unused_fields(mut self) -> Self {
        self.add_unused_fields = true;
        self
    }

    pub fn with_operating_point(mut self, point: OperatingPoint) -> Self {
        self.operating_point = Some(point);
        self
    }

    pub fn with_operating_kind(mut self, kind: OperatingKind) -> Self {
        self.operating_kind = Some(kind);
        self
    }

    pub fn with_method(mut self, method: CombinerMethod) -> Self {
        self.method = Some(method);
        self
    }

    pub fn with_threshold(mut self, threshold: usize, category: impl Into<String>) -> Self {
        self.method = Some(CombinerMethod::Threshold);
        self.threshold = Some(ThresholdOptions {
            threshold,
            category: category.into(),
        });
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_prediction_value_untagged() {
        let number: PredictionValue = serde_json::from_value(json!(1.5)).unwrap();
        assert_eq!(number, PredictionValue::Number(1.5));
        let category: PredictionValue = serde_json::from_value(json!("yes")).unwrap();
        assert_eq!(category.as_category(), Some("yes"));
    }

    #[test]
    fn test_options_from_json() {
        let options: PredictOptions = serde_json::from_value(json!({
            "missing_strategy": "PROPORTIONAL",
            "operating_point": {"kind": "probability", "threshold": 0.7, "positive_class": "yes"},
            "method": 2
        }))
        .unwrap();
        assert_eq!(options.missing_strategy, MissingStrategy::Proportional);
        assert_eq!(options.method, Some(CombinerMethod::ProbabilityWeighted));
        assert_eq!(
            options.operating_point.map(|p| p.kind),
            Some(OperatingKind::Probability)
        );
    }

    #[test]
    fn test_unknown_method_is_configuration_error() {
        assert!(matches!(
            CombinerMethod::try_from(7),
            Err(Error::Configuration(_))
        ));
        assert!("margin".parse::<OperatingKind>().is_err());
    }

    #[test]
    fn test_prediction_serialization_skips_empty() {
        let prediction = Prediction::new(PredictionValue::from("yes"));
        let value = serde_json::to_value(&prediction).unwrap();
        assert_eq!(value, json!({"prediction": "yes", "distribution": []}));
    }
}
