//! Gradient boosted trees
//!
//! Nodes carry gradient and hessian sums instead of class counts. A tree
//! predicts the raw score `-g_sum / (h_sum + lambda)`; the ensemble adds the
//! weighted scores of every boosting round.

use super::node::{Node, NodeFormat};
use super::{last_prediction, proportional};
use crate::error::LoadError;
use crate::fields::{Fields, ValidatedInput};
use crate::prediction::{MissingStrategy, Prediction, PredictionValue};
use serde_json::Value;

/// One boosting round
#[derive(Debug, Clone, PartialEq)]
pub struct BoostedTree {
    root: Node,
    lambda: f64,
}

impl BoostedTree {
    pub fn from_value(root: &Value, lambda: f64) -> Result<Self, LoadError> {
        let root = Node::from_value(
            root,
            NodeFormat {
                regression: true,
                weighted: false,
                boosting_lambda: Some(lambda),
            },
        )?;
        Ok(Self { root, lambda })
    }

    pub fn root(&self) -> &Node {
        &self.root
    }

    pub fn lambda(&self) -> f64 {
        self.lambda
    }

    /// Raw score of the round for validated input
    pub fn predict(
        &self,
        input: &ValidatedInput,
        fields: &Fields,
        strategy: MissingStrategy,
    ) -> Prediction {
        let mut path = Vec::new();
        let (score, count, last) = match strategy {
            MissingStrategy::LastPrediction => {
                let node = last_prediction(&self.root, input, fields, &mut path);
                (node.output.as_f64().unwrap_or(0.0), node.count, node)
            }
            MissingStrategy::Proportional => {
                let mut leaves = Vec::new();
                let last = proportional(&self.root, input, fields, &mut path, &mut leaves);
                let (g_sum, h_sum, count) = leaves.iter().fold(
                    (0.0, 0.0, 0.0),
                    |(g, h, n), leaf| {
                        (
                            g + leaf.g_sum.unwrap_or(0.0),
                            h + leaf.h_sum.unwrap_or(0.0),
                            n + leaf.count,
                        )
                    },
                );
                let denominator = h_sum + self.lambda;
                let score = if denominator != 0.0 {
                    -g_sum / denominator
                } else {
                    last.output.as_f64().unwrap_or(0.0)
                };
                (score, count, last)
            }
        };
        let mut prediction = Prediction::new(PredictionValue::Number(score));
        prediction.count = Some(count);
        prediction.path = path;
        prediction.next = last.split_field().map(|id| fields.name(id).to_string());
        prediction
    }
}
