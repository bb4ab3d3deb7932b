//! Decision tree structure and prediction traversal
//!
//! Two missing value strategies are supported. `LastPrediction` stops at the
//! first node whose children cannot be decided; `Proportional` keeps going
//! into every child and merges the distributions of the leaves it reaches.

mod boosted;
mod node;
mod predicate;

pub use boosted::BoostedTree;
pub use node::{Distribution, Node};
pub(crate) use node::NodeFormat;
pub use predicate::{Operator, Predicate};

use crate::error::LoadError;
use crate::fields::{Fields, Optype, ValidatedInput};
use crate::prediction::{MissingStrategy, Prediction, PredictionValue};
use crate::util::{
    dec_round, dist_median, merge_bins, regression_error, unbiased_sample_variance,
    weighted_mean, ws_confidence, BINS_LIMIT, DEFAULT_Z, PRECISION,
};
use serde_json::Value;

/// Classification or regression tree
#[derive(Debug, Clone, PartialEq)]
pub struct Tree {
    root: Node,
    regression: bool,
    weighted: bool,
}

impl Tree {
    pub fn from_value(root: &Value, regression: bool, weighted: bool) -> Result<Self, LoadError> {
        let root = Node::from_value(
            root,
            NodeFormat {
                regression,
                weighted,
                boosting_lambda: None,
            },
        )?;
        Ok(Self {
            root,
            regression,
            weighted,
        })
    }

    pub fn root(&self) -> &Node {
        &self.root
    }

    pub fn is_regression(&self) -> bool {
        self.regression
    }

    pub fn is_weighted(&self) -> bool {
        self.weighted
    }

    /// Predicts for already validated input
    pub fn predict(
        &self,
        input: &ValidatedInput,
        fields: &Fields,
        strategy: MissingStrategy,
    ) -> Prediction {
        let mut path = Vec::new();
        match strategy {
            MissingStrategy::LastPrediction => {
                let node = last_prediction(&self.root, input, fields, &mut path);
                node_prediction(node, path, fields)
            }
            MissingStrategy::Proportional => {
                let mut leaves = Vec::new();
                let last = proportional(&self.root, input, fields, &mut path, &mut leaves);
                if let [leaf] = leaves.as_slice() {
                    if std::ptr::eq(*leaf, last) {
                        return node_prediction(last, path, fields);
                    }
                }
                if self.regression {
                    merged_regression(&leaves, last, path, fields)
                } else {
                    merged_classification(&leaves, last, path, fields)
                }
            }
        }
    }
}

/// Follows the first accepting child until none accepts the input.
pub(crate) fn last_prediction<'a>(
    root: &'a Node,
    input: &ValidatedInput,
    fields: &Fields,
    path: &mut Vec<String>,
) -> &'a Node {
    let mut node = root;
    while let Some(child) = node
        .children
        .iter()
        .find(|child| child.predicate.apply(input, fields))
    {
        path.push(child.predicate.to_rule(fields));
        node = child;
    }
    node
}

/// Collects the nodes whose distributions make up a proportional prediction.
///
/// Returns the deepest node reached along the single decided path.
pub(crate) fn proportional<'a>(
    node: &'a Node,
    input: &ValidatedInput,
    fields: &Fields,
    path: &mut Vec<String>,
    leaves: &mut Vec<&'a Node>,
) -> &'a Node {
    if node.is_leaf() {
        leaves.push(node);
        return node;
    }
    if one_branch(node, input, fields) {
        return match node
            .children
            .iter()
            .find(|child| child.predicate.apply(input, fields))
        {
            Some(child) => {
                path.push(child.predicate.to_rule(fields));
                proportional(child, input, fields, path, leaves)
            }
            None => {
                leaves.push(node);
                node
            }
        };
    }
    for child in &node.children {
        // rules below a fan out are not part of the reported path
        let mut branch_path = Vec::new();
        proportional(child, input, fields, &mut branch_path, leaves);
    }
    node
}

/// True when the children of `node` can be decided for `input`
fn one_branch(node: &Node, input: &ValidatedInput, fields: &Fields) -> bool {
    let Some(field) = node.split_field() else {
        return true;
    };
    input.contains(field)
        || node.children.iter().any(|child| match &child.predicate {
            Predicate::Split { missing, value, .. } => *missing || value.is_null(),
            Predicate::True => false,
        })
        || fields
            .get(field)
            .is_some_and(|f| matches!(f.optype, Optype::Text | Optype::Items))
}

fn node_prediction(node: &Node, path: Vec<String>, fields: &Fields) -> Prediction {
    let mut prediction = Prediction::new(node.output.clone());
    prediction.confidence = node.confidence;
    prediction.distribution = node.distribution.to_prediction_pairs();
    prediction.count = Some(node.count);
    prediction.median = node.median;
    prediction.path = path;
    prediction.next = node.split_field().map(|id| fields.name(id).to_string());
    prediction
}

fn merged_classification(
    leaves: &[&Node],
    last: &Node,
    path: Vec<String>,
    fields: &Fields,
) -> Prediction {
    let mut merged: Vec<(String, f64)> = Vec::new();
    for leaf in leaves {
        if let Distribution::Categories(counts) = &leaf.distribution {
            for (category, count) in counts {
                match merged.iter_mut().find(|(name, _)| name == category) {
                    Some((_, total)) => *total += count,
                    None => merged.push((category.clone(), *count)),
                }
            }
        }
    }
    let total: f64 = merged.iter().map(|(_, c)| c).sum();
    if total <= 0.0 {
        return node_prediction(last, path, fields);
    }
    merged.sort_by(|(a_name, a), (b_name, b)| b.total_cmp(a).then_with(|| a_name.cmp(b_name)));
    let winner = merged[0].0.clone();
    let confidence = ws_confidence(&winner, &merged, Some(total), DEFAULT_Z);

    let mut prediction = Prediction::new(PredictionValue::Category(winner));
    prediction.confidence = Some(dec_round(confidence, PRECISION));
    prediction.distribution = Distribution::Categories(merged).to_prediction_pairs();
    prediction.count = Some(total);
    prediction.path = path;
    prediction.next = last.split_field().map(|id| fields.name(id).to_string());
    prediction
}

fn merged_regression(leaves: &[&Node], last: &Node, path: Vec<String>, fields: &Fields) -> Prediction {
    let mut merged: Vec<(f64, f64)> = Vec::new();
    for leaf in leaves {
        if let Distribution::Bins(bins) = &leaf.distribution {
            for (value, count) in bins {
                match merged.iter_mut().find(|(v, _)| v == value) {
                    Some((_, total)) => *total += count,
                    None => merged.push((*value, *count)),
                }
            }
        }
    }
    let total: f64 = merged.iter().map(|(_, c)| c).sum();
    if total <= 0.0 {
        return node_prediction(last, path, fields);
    }
    merged.sort_by(|(a, _), (b, _)| a.total_cmp(b));

    let mut prediction;
    if let [(value, _)] = merged.as_slice() {
        prediction = Prediction::new(PredictionValue::Number(*value));
        prediction.confidence = last.confidence;
        prediction.median = Some(*value);
    } else {
        let bins = merge_bins(merged, BINS_LIMIT);
        let mean = weighted_mean(&bins);
        let error = regression_error(unbiased_sample_variance(&bins, Some(mean)), total, DEFAULT_Z);
        prediction = Prediction::new(PredictionValue::Number(mean));
        prediction.confidence = error.is_finite().then(|| dec_round(error, PRECISION));
        prediction.median = dist_median(&bins, total);
        merged = bins;
    }
    prediction.distribution = Distribution::Bins(merged).to_prediction_pairs();
    prediction.count = Some(total);
    prediction.path = path;
    prediction.next = last.split_field().map(|id| fields.name(id).to_string());
    prediction
}

#[cfg(test)]
mod tests;
