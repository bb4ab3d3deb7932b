//! Tree nodes parsed from model JSON

use super::predicate::Predicate;
use crate::error::LoadError;
use crate::prediction::PredictionValue;
use crate::util::dist_median;
use serde_json::Value;

/// Objective distribution stored in a node
#[derive(Debug, Clone, PartialEq)]
pub enum Distribution {
    /// Class counts of a classification node
    Categories(Vec<(String, f64)>),
    /// Value bins (or exact value counts) of a regression node
    Bins(Vec<(f64, f64)>),
}

impl Distribution {
    pub fn total(&self) -> f64 {
        match self {
            Distribution::Categories(counts) => counts.iter().map(|(_, c)| c).sum(),
            Distribution::Bins(bins) => bins.iter().map(|(_, c)| c).sum(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Distribution::Categories(counts) => counts.is_empty(),
            Distribution::Bins(bins) => bins.is_empty(),
        }
    }

    /// Pairs in the shape reported by predictions
    pub fn to_prediction_pairs(&self) -> Vec<(PredictionValue, f64)> {
        match self {
            Distribution::Categories(counts) => counts
                .iter()
                .map(|(name, count)| (PredictionValue::Category(name.clone()), *count))
                .collect(),
            Distribution::Bins(bins) => bins
                .iter()
                .map(|(value, count)| (PredictionValue::Number(*value), *count))
                .collect(),
        }
    }
}

/// How node JSON should be read
#[derive(Debug, Clone, Copy)]
pub(crate) struct NodeFormat {
    pub regression: bool,
    pub weighted: bool,
    /// Regularization of boosted trees, whose outputs may be derived from
    /// the gradient sums
    pub boosting_lambda: Option<f64>,
}

/// A decision tree node, owning its children
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub predicate: Predicate,
    pub children: Vec<Node>,
    pub output: PredictionValue,
    pub confidence: Option<f64>,
    pub count: f64,
    pub distribution: Distribution,
    pub median: Option<f64>,
    pub g_sum: Option<f64>,
    pub h_sum: Option<f64>,
}

impl Node {
    pub(crate) fn from_value(value: &Value, format: NodeFormat) -> Result<Self, LoadError> {
        let children = match value.get("children") {
            Some(Value::Array(children)) => children
                .iter()
                .map(|child| Node::from_value(child, format))
                .collect::<Result<Vec<_>, _>>()?,
            Some(Value::Null) | None => Vec::new(),
            Some(other) => {
                return Err(LoadError::Malformed(format!(
                    "node children must be a list, got {}",
                    other
                )))
            }
        };
        let predicate = Predicate::from_value(value.get("predicate").unwrap_or(&Value::Null))?;

        let summary = if format.weighted {
            value
                .get("weighted_objective_summary")
                .or_else(|| value.get("objective_summary"))
        } else {
            value.get("objective_summary")
        };
        let distribution = parse_distribution(summary, format.regression)?;

        let count = if format.weighted {
            value
                .get("weight")
                .and_then(Value::as_f64)
                .unwrap_or_else(|| distribution.total())
        } else {
            value
                .get("count")
                .and_then(Value::as_f64)
                .unwrap_or_else(|| distribution.total())
        };

        let g_sum = value.get("g_sum").and_then(Value::as_f64);
        let h_sum = value.get("h_sum").and_then(Value::as_f64);
        let numeric = format.regression || format.boosting_lambda.is_some();
        let output = match (value.get("output"), format.boosting_lambda, g_sum, h_sum) {
            (Some(output), _, _, _) if !output.is_null() => parse_output(output, numeric)?,
            (_, Some(lambda), Some(g), Some(h)) => PredictionValue::Number(-g / (h + lambda)),
            _ => return Err(LoadError::MissingKey("output".to_string())),
        };

        let median = match (&distribution, format.regression) {
            (_, false) => None,
            (Distribution::Bins(bins), true) => value
                .get("median")
                .and_then(Value::as_f64)
                .or_else(|| dist_median(bins, count))
                .or_else(|| output.as_f64()),
            _ => None,
        };

        Ok(Node {
            predicate,
            children,
            output,
            confidence: value.get("confidence").and_then(Value::as_f64),
            count,
            distribution,
            median,
            g_sum,
            h_sum,
        })
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Field examined by the children of this node
    pub fn split_field(&self) -> Option<&str> {
        self.children.first().and_then(|child| child.predicate.field())
    }
}

fn parse_output(output: &Value, numeric: bool) -> Result<PredictionValue, LoadError> {
    match output {
        Value::Number(n) if numeric => n
            .as_f64()
            .map(PredictionValue::Number)
            .ok_or_else(|| LoadError::Malformed(format!("bad node output {}", output))),
        Value::Number(n) => Ok(PredictionValue::Category(n.to_string())),
        Value::String(s) if !numeric => Ok(PredictionValue::Category(s.clone())),
        Value::Bool(b) if !numeric => Ok(PredictionValue::Category(b.to_string())),
        other => Err(LoadError::Malformed(format!("bad node output {}", other))),
    }
}

fn parse_distribution(summary: Option<&Value>, regression: bool) -> Result<Distribution, LoadError> {
    let pairs = |key: &str| -> Option<&Vec<Value>> {
        summary.and_then(|s| s.get(key)).and_then(Value::as_array)
    };
    if regression {
        let raw = pairs("bins").or_else(|| pairs("counts"));
        let bins = raw
            .map(|entries| {
                entries
                    .iter()
                    .map(|entry| match entry.as_array().map(Vec::as_slice) {
                        Some([value, count]) => match (value.as_f64(), count.as_f64()) {
                            (Some(v), Some(c)) => Ok((v, c)),
                            _ => Err(LoadError::Malformed(format!("bad bin {}", entry))),
                        },
                        _ => Err(LoadError::Malformed(format!("bad bin {}", entry))),
                    })
                    .collect::<Result<Vec<_>, _>>()
            })
            .transpose()?
            .unwrap_or_default();
        Ok(Distribution::Bins(bins))
    } else {
        let counts = pairs("categories")
            .map(|entries| {
                entries
                    .iter()
                    .map(|entry| match entry.as_array().map(Vec::as_slice) {
                        Some([name, count]) => count
                            .as_f64()
                            .map(|c| (category_name(name), c))
                            .ok_or_else(|| LoadError::Malformed(format!("bad category {}", entry))),
                        _ => Err(LoadError::Malformed(format!("bad category {}", entry))),
                    })
                    .collect::<Result<Vec<_>, _>>()
            })
            .transpose()?
            .unwrap_or_default();
        Ok(Distribution::Categories(counts))
    }
}

fn category_name(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
