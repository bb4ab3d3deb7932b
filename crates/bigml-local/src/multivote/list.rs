//! Per-class score vectors of many models

use crate::util::{dec_round, PRECISION};

/// Score vectors, one per model, aligned on the ensemble class order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MultiVoteList {
    predictions: Vec<Vec<f64>>,
}

impl MultiVoteList {
    pub fn new(predictions: Vec<Vec<f64>>) -> Self {
        Self { predictions }
    }

    pub fn append(&mut self, prediction: Vec<f64>) {
        self.predictions.push(prediction);
    }

    pub fn extend(&mut self, predictions: Vec<Vec<f64>>) {
        self.predictions.extend(predictions);
    }

    /// Moves the vectors of `other` into this list
    pub fn merge(&mut self, other: MultiVoteList) {
        self.predictions.extend(other.predictions);
    }

    pub fn len(&self) -> usize {
        self.predictions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.predictions.is_empty()
    }

    /// Element-wise combination of every vector.
    ///
    /// With `normalize` the sums are divided by their total, otherwise by the
    /// number of vectors. Values are rounded to the crate precision.
    pub fn combine_to_distribution(&self, normalize: bool) -> Vec<f64> {
        let width = self.predictions.iter().map(Vec::len).max().unwrap_or(0);
        let mut combined = vec![0.0; width];
        for prediction in &self.predictions {
            for (slot, value) in combined.iter_mut().zip(prediction) {
                *slot += value;
            }
        }
        let divisor = if normalize {
            combined.iter().sum::<f64>()
        } else {
            self.predictions.len() as f64
        };
        combined
            .into_iter()
            .map(|value| {
                if divisor > 0.0 {
                    dec_round(value / divisor, PRECISION)
                } else {
                    0.0
                }
            })
            .collect()
    }
}
