//! Combination of many model predictions into one
//!
//! [`MultiVote`] merges single best predictions under the combiner methods,
//! and accumulates boosting rounds. [`MultiVoteList`] merges per-class score
//! vectors for ensemble probability, confidence and votes queries.

mod list;

pub use list::MultiVoteList;

use crate::error::{Error, Result};
use crate::prediction::{CombinerMethod, Prediction, PredictionValue, ThresholdOptions};
use crate::util::{dec_round, softmax, ws_confidence, DEFAULT_Z, PRECISION};

/// Spread of the exponential weights used by error weighted averages
const ERROR_WEIGHT_RANGE: f64 = 10.0;

/// Contribution of one boosting round
#[derive(Debug, Clone, PartialEq)]
pub struct BoostingRound {
    /// Raw `-g_sum / (h_sum + lambda)` score of the round
    pub score: f64,
    pub weight: f64,
    /// Class the round scores, classification only
    pub objective_class: Option<String>,
}

/// Starting point of boosted sums
#[derive(Debug, Clone, PartialEq)]
pub enum BoostingOffsets {
    Regression(f64),
    /// Offset per class, classes without one start at 0
    Classification(Vec<(String, f64)>),
}

/// Predictions of every model of an ensemble, in model order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MultiVote {
    predictions: Vec<Prediction>,
}

impl MultiVote {
    pub fn new(predictions: Vec<Prediction>) -> Self {
        Self { predictions }
    }

    pub fn append(&mut self, prediction: Prediction) {
        self.predictions.push(prediction);
    }

    pub fn predictions(&self) -> &[Prediction] {
        &self.predictions
    }

    pub fn len(&self) -> usize {
        self.predictions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.predictions.is_empty()
    }

    /// True when every prediction is numeric
    pub fn is_regression(&self) -> bool {
        !self.predictions.is_empty()
            && self
                .predictions
                .iter()
                .all(|p| matches!(p.prediction, PredictionValue::Number(_)))
    }

    /// Combines the predictions with `method`.
    ///
    /// `class_names` breaks ties between classes; `threshold` is required by
    /// [`CombinerMethod::Threshold`].
    pub fn combine(
        &self,
        method: CombinerMethod,
        threshold: Option<&ThresholdOptions>,
        class_names: &[String],
    ) -> Result<Prediction> {
        if self.predictions.is_empty() {
            return Err(Error::configuration("no predictions to combine"));
        }
        if self.is_regression() {
            return match method {
                CombinerMethod::ConfidenceWeighted => self.error_weighted(),
                _ => Ok(self.average()),
            };
        }
        match method {
            CombinerMethod::Plurality => Ok(self.plurality(class_names)),
            CombinerMethod::ConfidenceWeighted => self.confidence_weighted(class_names),
            CombinerMethod::ProbabilityWeighted => Ok(self.probability_weighted(class_names)),
            CombinerMethod::Threshold => {
                let options = threshold.ok_or_else(|| {
                    Error::configuration("the threshold combiner needs a threshold and a category")
                })?;
                self.threshold(options, class_names)
            }
        }
    }

    /// Per class boosted sums, in `class_names` order
    pub fn boosting_sums(
        rounds: &[BoostingRound],
        offsets: &[(String, f64)],
        class_names: &[String],
    ) -> Vec<f64> {
        let mut sums: Vec<f64> = class_names
            .iter()
            .map(|name| {
                offsets
                    .iter()
                    .find(|(class, _)| class == name)
                    .map_or(0.0, |(_, offset)| *offset)
            })
            .collect();
        for round in rounds {
            let Some(class) = &round.objective_class else {
                continue;
            };
            if let Some(index) = class_names.iter().position(|name| name == class) {
                sums[index] += round.score * round.weight;
            }
        }
        sums
    }

    /// Adds up boosting rounds.
    ///
    /// Regressions return the weighted sum plus the offset. Classifications
    /// apply softmax to the per class sums and predict the arg-max.
    pub fn boosted(
        rounds: &[BoostingRound],
        offsets: &BoostingOffsets,
        class_names: &[String],
    ) -> Result<Prediction> {
        match offsets {
            BoostingOffsets::Regression(offset) => {
                let sum = rounds
                    .iter()
                    .fold(*offset, |acc, round| acc + round.score * round.weight);
                Ok(Prediction::new(PredictionValue::Number(sum)))
            }
            BoostingOffsets::Classification(offsets) => {
                if class_names.is_empty() {
                    return Err(Error::configuration(
                        "boosted classifications need the objective classes",
                    ));
                }
                let sums = Self::boosting_sums(rounds, offsets, class_names);
                let probabilities: Vec<f64> = softmax(&sums)
                    .into_iter()
                    .map(|p| dec_round(p, PRECISION))
                    .collect();
                let mut best = 0;
                for (index, probability) in probabilities.iter().enumerate() {
                    if *probability > probabilities[best] {
                        best = index;
                    }
                }
                let mut prediction =
                    Prediction::new(PredictionValue::Category(class_names[best].clone()));
                prediction.probability = Some(probabilities[best]);
                prediction.distribution = class_names
                    .iter()
                    .zip(&probabilities)
                    .map(|(name, p)| (PredictionValue::Category(name.clone()), *p))
                    .collect();
                Ok(prediction)
            }
        }
    }

    fn average(&self) -> Prediction {
        let n = self.predictions.len() as f64;
        let value = self.numbers().sum::<f64>() / n;
        let mut prediction = Prediction::new(PredictionValue::Number(value));
        prediction.confidence = mean_of(self.predictions.iter().map(|p| p.confidence));
        prediction.median = mean_of(self.predictions.iter().map(|p| p.median));
        prediction.count = self.total_count();
        prediction
    }

    fn error_weighted(&self) -> Result<Prediction> {
        let confidences = self
            .predictions
            .iter()
            .map(|p| p.confidence)
            .collect::<Option<Vec<f64>>>()
            .ok_or_else(|| {
                Error::unsupported("error weighted averages need a confidence for every prediction")
            })?;
        let min = confidences.iter().copied().fold(f64::INFINITY, f64::min);
        let max = confidences.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let range = max - min;
        let weights: Vec<f64> = confidences
            .iter()
            .map(|c| {
                if range > 0.0 {
                    ((min - c) / range * ERROR_WEIGHT_RANGE).exp()
                } else {
                    1.0
                }
            })
            .collect();
        let normalization: f64 = weights.iter().sum();

        let weighted = |values: &mut dyn Iterator<Item = f64>| -> f64 {
            values.zip(&weights).map(|(v, w)| v * w).sum::<f64>() / normalization
        };
        let value = weighted(&mut self.numbers());
        let confidence = weighted(&mut confidences.iter().copied());
        let median = self
            .predictions
            .iter()
            .map(|p| p.median)
            .collect::<Option<Vec<f64>>>()
            .map(|medians| weighted(&mut medians.into_iter()));

        let mut prediction = Prediction::new(PredictionValue::Number(value));
        prediction.confidence = Some(confidence);
        prediction.median = median;
        prediction.count = self.total_count();
        Ok(prediction)
    }

    fn plurality(&self, class_names: &[String]) -> Prediction {
        let tally = self.tally(|_| 1.0);
        let ranked = rank(tally, class_names, |category| {
            self.weighted_confidence(category, |_| 1.0).unwrap_or(0.0)
        });
        let votes = ranked[0].1;
        let mut prediction = self.classification_result(&ranked, |_| 1.0);
        prediction.votes = Some(dec_round(votes / self.predictions.len() as f64, PRECISION));
        prediction
    }

    fn confidence_weighted(&self, class_names: &[String]) -> Result<Prediction> {
        if self.predictions.iter().any(|p| p.confidence.is_none()) {
            return Err(Error::unsupported(
                "confidence weighted votes need a confidence for every prediction",
            ));
        }
        let weight = |p: &Prediction| p.confidence.unwrap_or(0.0);
        let ranked = rank(self.tally(weight), class_names, |_| 0.0);
        Ok(self.classification_result(&ranked, weight))
    }

    fn probability_weighted(&self, class_names: &[String]) -> Prediction {
        let mut weights: Vec<(String, f64)> = Vec::new();
        let mut merged: Vec<(String, f64)> = Vec::new();
        for prediction in &self.predictions {
            let distribution: Vec<(&str, f64)> = prediction
                .distribution
                .iter()
                .filter_map(|(value, count)| value.as_category().map(|c| (c, *count)))
                .collect();
            let total: f64 = distribution.iter().map(|(_, c)| c).sum();
            if total > 0.0 {
                for (category, count) in distribution {
                    add_to(&mut weights, category, count / total);
                    add_to(&mut merged, category, count);
                }
            } else if let Some(category) = prediction.category() {
                add_to(&mut weights, category, 1.0);
                add_to(&mut merged, category, 1.0);
            }
        }
        let ranked = rank(weights, class_names, |_| 0.0);
        let winner = ranked[0].0.clone();
        let count: f64 = merged.iter().map(|(_, c)| c).sum();
        let total: f64 = ranked.iter().map(|(_, w)| w).sum();

        let mut prediction = Prediction::new(PredictionValue::Category(winner.clone()));
        prediction.confidence = Some(dec_round(
            ws_confidence(&winner, &merged, Some(count), DEFAULT_Z),
            PRECISION,
        ));
        prediction.probability = Some(dec_round(ranked[0].1 / total, PRECISION));
        prediction.distribution = normalized(&ranked);
        prediction.count = Some(count);
        prediction
    }

    fn threshold(&self, options: &ThresholdOptions, class_names: &[String]) -> Result<Prediction> {
        let n = self.predictions.len();
        if options.threshold < 1 || options.threshold > n {
            return Err(Error::configuration(format!(
                "threshold must be between 1 and the number of models ({}), got {}",
                n, options.threshold
            )));
        }
        let votes = self
            .predictions
            .iter()
            .filter(|p| p.category() == Some(options.category.as_str()))
            .count();
        if votes >= options.threshold {
            let mut prediction =
                Prediction::new(PredictionValue::Category(options.category.clone()));
            prediction.confidence = self.weighted_confidence(&options.category, |_| 1.0);
            prediction.probability = Some(dec_round(votes as f64 / n as f64, PRECISION));
            prediction.votes = prediction.probability;
            prediction.count = self.total_count();
            return Ok(prediction);
        }
        let rest: Vec<Prediction> = self
            .predictions
            .iter()
            .filter(|p| p.category() != Some(options.category.as_str()))
            .cloned()
            .collect();
        if rest.is_empty() {
            return Ok(self.plurality(class_names));
        }
        Ok(MultiVote::new(rest).plurality(class_names))
    }

    fn numbers(&self) -> impl Iterator<Item = f64> + '_ {
        self.predictions.iter().filter_map(|p| p.prediction.as_f64())
    }

    fn total_count(&self) -> Option<f64> {
        let counts: Vec<f64> = self.predictions.iter().filter_map(|p| p.count).collect();
        (!counts.is_empty()).then(|| counts.iter().sum())
    }

    fn tally(&self, weight: impl Fn(&Prediction) -> f64) -> Vec<(String, f64)> {
        let mut tally = Vec::new();
        for prediction in &self.predictions {
            if let Some(category) = prediction.category() {
                add_to(&mut tally, category, weight(prediction));
            }
        }
        tally
    }

    /// Mean confidence of the predictions voting for `category`
    fn weighted_confidence(&self, category: &str, weight: impl Fn(&Prediction) -> f64) -> Option<f64> {
        let (sum, total) = self
            .predictions
            .iter()
            .filter(|p| p.category() == Some(category))
            .filter_map(|p| p.confidence.map(|c| (c, weight(p))))
            .fold((0.0, 0.0), |(sum, total), (c, w)| (sum + c * w, total + w));
        (total > 0.0).then(|| dec_round(sum / total, PRECISION))
    }

    fn classification_result(
        &self,
        ranked: &[(String, f64)],
        weight: impl Fn(&Prediction) -> f64,
    ) -> Prediction {
        let (winner, winner_weight) = &ranked[0];
        let total: f64 = ranked.iter().map(|(_, w)| w).sum();
        let mut prediction = Prediction::new(PredictionValue::Category(winner.clone()));
        prediction.confidence = self.weighted_confidence(winner, weight);
        prediction.probability = (total > 0.0).then(|| dec_round(winner_weight / total, PRECISION));
        prediction.distribution = normalized(ranked);
        prediction.count = self.total_count();
        prediction
    }
}

fn add_to(tally: &mut Vec<(String, f64)>, category: &str, amount: f64) {
    match tally.iter_mut().find(|(name, _)| name == category) {
        Some((_, total)) => *total += amount,
        None => tally.push((category.to_string(), amount)),
    }
}

/// Sorts by decreasing weight, then by `tie_break`, then by class order
fn rank(
    mut tally: Vec<(String, f64)>,
    class_names: &[String],
    tie_break: impl Fn(&str) -> f64,
) -> Vec<(String, f64)> {
    let position = |name: &str| {
        class_names
            .iter()
            .position(|class| class == name)
            .unwrap_or(class_names.len())
    };
    tally.sort_by(|(a_name, a), (b_name, b)| {
        b.total_cmp(a)
            .then_with(|| tie_break(b_name).total_cmp(&tie_break(a_name)))
            .then_with(|| position(a_name).cmp(&position(b_name)))
            .then_with(|| a_name.cmp(b_name))
    });
    tally
}

fn normalized(ranked: &[(String, f64)]) -> Vec<(PredictionValue, f64)> {
    let total: f64 = ranked.iter().map(|(_, w)| w).sum();
    ranked
        .iter()
        .map(|(name, weight)| {
            let share = if total > 0.0 { weight / total } else { 0.0 };
            (PredictionValue::Category(name.clone()), dec_round(share, PRECISION))
        })
        .collect()
}

fn mean_of(values: impl Iterator<Item = Option<f64>>) -> Option<f64> {
    let values: Vec<f64> = values.flatten().collect();
    (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
}
