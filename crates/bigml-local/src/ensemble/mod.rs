//! Ensemble predictions
//!
//! An [`Ensemble`] is the parsed snapshot of an ensemble: its member
//! [`Model`]s plus the metadata needed to combine them. Plain ensembles vote
//! through [`MultiVote`]; boosted ensembles add up their rounds.

mod local;

pub use local::{EnsemblePhase, EnsembleSource, LocalEnsemble};

use crate::error::{Error, LoadError, Result};
use crate::fields::{Fields, InputData};
use crate::model::{
    check_operating_kind, check_operating_point, importance_list, objective_field_id, select_by_kind,
    select_by_point, Model,
};
use crate::multivote::{BoostingOffsets, BoostingRound, MultiVote, MultiVoteList};
use crate::prediction::{
    CategoryScore, CombinerMethod, MissingStrategy, OperatingKind, PredictOptions, Prediction,
    PredictionValue,
};
use crate::resource::{finished_body, resource_name};
use serde_json::Value;
use std::sync::Arc;

const ENSEMBLE_KINDS: &[OperatingKind] = &[
    OperatingKind::Probability,
    OperatingKind::Confidence,
    OperatingKind::Votes,
];

/// Boosted ensembles only score probabilities
const BOOSTED_KINDS: &[OperatingKind] = &[OperatingKind::Probability];

/// Parsed ensemble with every member model loaded
#[derive(Debug, Clone)]
pub struct Ensemble {
    resource_id: String,
    models: Vec<Arc<Model>>,
    fields: Fields,
    objective_id: String,
    class_names: Vec<String>,
    regression: bool,
    offsets: Option<BoostingOffsets>,
    importance: Vec<(String, f64)>,
}

impl Ensemble {
    /// Assembles an ensemble from its member models.
    ///
    /// `resource` is the ensemble resource JSON when there is one; without
    /// it the metadata is derived from the models. Mixing boosted and plain
    /// models is unsupported.
    pub fn from_models(resource: Option<&Value>, models: Vec<Arc<Model>>) -> Result<Self> {
        let first = models
            .first()
            .ok_or_else(|| LoadError::MissingKey("models".to_string()))?;
        let body = resource
            .map(|resource| finished_body(resource, "models"))
            .transpose()?;

        let boosted = models.iter().filter(|model| model.boosting().is_some()).count();
        if boosted != 0 && boosted != models.len() {
            return Err(Error::unsupported(
                "an ensemble cannot mix boosted and non boosted models",
            ));
        }

        let objective_id = match body {
            Some(body) => objective_field_id(body, body.get("ensemble").unwrap_or(&Value::Null))
                .unwrap_or_else(|_| first.objective_id().to_string()),
            None => first.objective_id().to_string(),
        };
        if let Some(stray) = models.iter().find(|model| model.objective_id() != objective_id) {
            return Err(LoadError::Malformed(format!(
                "model {} predicts {} instead of {}",
                stray.resource_id(),
                stray.objective_id(),
                objective_id
            ))
            .into());
        }

        let mut fields = match body.and_then(|body| body.pointer("/ensemble/fields")) {
            Some(raw) => Fields::from_value(raw, Some(objective_id.clone()))?,
            None => first.fields().clone(),
        };
        for model in &models {
            fields.merge(model.fields());
        }

        let regression = first.is_regression();
        let class_names = if regression {
            Vec::new()
        } else {
            let mut names = fields.objective().map(|f| f.category_names()).unwrap_or_default();
            if names.is_empty() {
                names = models
                    .iter()
                    .flat_map(|model| model.class_names().iter().cloned())
                    .collect();
            }
            names.sort();
            names.dedup();
            names
        };

        let offsets = (boosted > 0).then(|| {
            if regression {
                BoostingOffsets::Regression(
                    body.and_then(|body| body.get("initial_offset"))
                        .and_then(Value::as_f64)
                        .unwrap_or_default(),
                )
            } else {
                BoostingOffsets::Classification(class_offsets(
                    body.and_then(|body| body.get("initial_offsets")),
                ))
            }
        });

        let importance = match body.and_then(|body| body.get("importance")) {
            Some(raw) => importance_list(Some(raw)),
            None => averaged_importance(&models),
        };

        Ok(Self {
            resource_id: resource.map(resource_name).unwrap_or_default(),
            models,
            fields,
            objective_id,
            class_names,
            regression,
            offsets,
            importance,
        })
    }

    /// Builds a ready ensemble from finished resource JSON
    pub fn from_resources(resource: Option<&Value>, models: &[Value]) -> Result<Self> {
        let models = models
            .iter()
            .map(|model| Model::from_resource(model).map(Arc::new))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Self::from_models(resource, models)
    }

    /// Ensemble resource id, empty for ensembles built from a model list
    pub fn resource_id(&self) -> &str {
        &self.resource_id
    }

    pub fn models(&self) -> &[Arc<Model>] {
        &self.models
    }

    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    pub fn objective_id(&self) -> &str {
        &self.objective_id
    }

    /// Sorted objective classes, empty for regressions
    pub fn class_names(&self) -> &[String] {
        &self.class_names
    }

    pub fn is_regression(&self) -> bool {
        self.regression
    }

    pub fn is_boosted(&self) -> bool {
        self.offsets.is_some()
    }

    /// Field importance pairs sorted by decreasing importance
    pub fn field_importance(&self) -> &[(String, f64)] {
        &self.importance
    }

    /// Predicts by combining every member model.
    ///
    /// Operating points and kinds take precedence, then boosting. Plain
    /// ensembles use `options.method`, plurality by default.
    pub fn predict(&self, input: &InputData, options: &PredictOptions) -> Result<Prediction> {
        if self.regression && (options.operating_point.is_some() || options.operating_kind.is_some()) {
            return Err(Error::configuration(
                "operating points and operating kinds only apply to classifications",
            ));
        }
        let strategy = options.missing_strategy;
        let allowed = if self.is_boosted() {
            BOOSTED_KINDS
        } else {
            ENSEMBLE_KINDS
        };
        let mut prediction = if let Some(point) = &options.operating_point {
            check_operating_point(point, allowed, &self.class_names)?;
            let scores = self.scores_for_kind(input, strategy, point.kind)?;
            select_by_point(&scores, point)?
        } else if let Some(kind) = options.operating_kind {
            check_operating_kind(kind, allowed)?;
            let scores = self.scores_for_kind(input, strategy, kind)?;
            select_by_kind(&scores, kind)?
        } else if let Some(offsets) = &self.offsets {
            let rounds = self.boosting_rounds(input, strategy)?;
            MultiVote::boosted(&rounds, offsets, &self.class_names)?
        } else {
            let mut member_options = PredictOptions::default().with_missing_strategy(strategy);
            if options.use_median {
                member_options = member_options.with_median();
            }
            let votes = self
                .models
                .iter()
                .map(|model| model.predict(input, &member_options))
                .collect::<Result<Vec<_>>>()?;
            MultiVote::new(votes).combine(
                options.method.unwrap_or(CombinerMethod::Plurality),
                options.threshold.as_ref(),
                &self.class_names,
            )?
        };
        if options.add_unused_fields {
            prediction.unused_fields = Some(self.unused_fields(input)?);
        }
        Ok(prediction)
    }

    /// Per class probabilities averaged over the models, in `class_names` order
    pub fn predict_probability(
        &self,
        input: &InputData,
        strategy: MissingStrategy,
    ) -> Result<Vec<CategoryScore>> {
        self.require_classification("probability")?;
        if let Some(offsets) = &self.offsets {
            let rounds = self.boosting_rounds(input, strategy)?;
            let prediction = MultiVote::boosted(&rounds, offsets, &self.class_names)?;
            return Ok(self.aligned_scores(&prediction.distribution));
        }
        let mut list = MultiVoteList::default();
        for model in &self.models {
            let scores = model.predict_probability(input, strategy)?;
            list.append(self.aligned(&scores));
        }
        Ok(self.named(list.combine_to_distribution(false)))
    }

    /// Per class confidences averaged over the models; not defined for boosting
    pub fn predict_confidence(
        &self,
        input: &InputData,
        strategy: MissingStrategy,
    ) -> Result<Vec<CategoryScore>> {
        self.require_classification("confidence")?;
        self.require_votes("confidence")?;
        let mut list = MultiVoteList::default();
        for model in &self.models {
            let scores = model.predict_confidence(input, strategy)?;
            list.append(self.aligned(&scores));
        }
        Ok(self.named(list.combine_to_distribution(false)))
    }

    /// Share of models voting for each class; not defined for boosting
    pub fn predict_votes(
        &self,
        input: &InputData,
        strategy: MissingStrategy,
    ) -> Result<Vec<CategoryScore>> {
        self.require_classification("votes")?;
        self.require_votes("votes")?;
        let options = PredictOptions::default().with_missing_strategy(strategy);
        let mut list = MultiVoteList::default();
        for model in &self.models {
            let prediction = model.predict(input, &options)?;
            let one_hot = self
                .class_names
                .iter()
                .map(|name| if prediction.category() == Some(name.as_str()) { 1.0 } else { 0.0 })
                .collect();
            list.append(one_hot);
        }
        Ok(self.named(list.combine_to_distribution(true)))
    }

    /// Input fields no member model uses
    pub fn unused_fields(&self, input: &InputData) -> Result<Vec<String>> {
        let mut unused: Option<Vec<String>> = None;
        for model in &self.models {
            let validated = model.fields().validate(input)?;
            let fields = validated.unused_fields();
            unused = Some(match unused {
                None => fields.to_vec(),
                Some(mut common) => {
                    common.retain(|field| fields.contains(field));
                    common
                }
            });
        }
        Ok(unused.unwrap_or_default())
    }

    fn scores_for_kind(
        &self,
        input: &InputData,
        strategy: MissingStrategy,
        kind: OperatingKind,
    ) -> Result<Vec<CategoryScore>> {
        match kind {
            OperatingKind::Probability => self.predict_probability(input, strategy),
            OperatingKind::Confidence => self.predict_confidence(input, strategy),
            OperatingKind::Votes => self.predict_votes(input, strategy),
        }
    }

    fn boosting_rounds(&self, input: &InputData, strategy: MissingStrategy) -> Result<Vec<BoostingRound>> {
        let options = PredictOptions::default().with_missing_strategy(strategy);
        self.models
            .iter()
            .map(|model| {
                let prediction = model.predict(input, &options)?;
                let boosting = model.boosting();
                Ok(BoostingRound {
                    score: prediction.value().unwrap_or_default(),
                    weight: boosting.map_or(1.0, |b| b.weight),
                    objective_class: boosting.and_then(|b| b.objective_class.clone()),
                })
            })
            .collect()
    }

    fn require_classification(&self, operation: &str) -> Result<()> {
        if self.regression {
            return Err(Error::unsupported(format!(
                "{} is not available for regression ensembles",
                operation
            )));
        }
        Ok(())
    }

    fn require_votes(&self, operation: &str) -> Result<()> {
        if self.is_boosted() {
            return Err(Error::unsupported(format!(
                "{} is not available for boosted ensembles",
                operation
            )));
        }
        Ok(())
    }

    /// Scores re-ordered on the ensemble classes, 0 for unknown classes
    fn aligned(&self, scores: &[CategoryScore]) -> Vec<f64> {
        self.class_names
            .iter()
            .map(|name| {
                scores
                    .iter()
                    .find(|score| &score.category == name)
                    .map_or(0.0, |score| score.value)
            })
            .collect()
    }

    fn aligned_scores(&self, distribution: &[(PredictionValue, f64)]) -> Vec<CategoryScore> {
        self.class_names
            .iter()
            .map(|name| {
                let value = distribution
                    .iter()
                    .find(|(class, _)| class.as_category() == Some(name.as_str()))
                    .map_or(0.0, |(_, value)| *value);
                CategoryScore::new(name.clone(), value)
            })
            .collect()
    }

    fn named(&self, values: Vec<f64>) -> Vec<CategoryScore> {
        self.class_names
            .iter()
            .zip(values)
            .map(|(name, value)| CategoryScore::new(name.clone(), value))
            .collect()
    }
}

/// Ids listed under `models` in an ensemble resource
pub(crate) fn model_ids(resource: &Value) -> std::result::Result<Vec<String>, LoadError> {
    let body = finished_body(resource, "models")?;
    body["models"]
        .as_array()
        .ok_or_else(|| LoadError::Malformed("ensemble models must be a list".to_string()))?
        .iter()
        .map(|entry| match entry {
            Value::String(id) => Ok(id.clone()),
            other => other
                .get("resource")
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| LoadError::Malformed(format!("bad model reference {}", other))),
        })
        .collect()
}

/// Reads `[[class, offset], ...]` or `{class: offset}`
fn class_offsets(value: Option<&Value>) -> Vec<(String, f64)> {
    match value {
        Some(Value::Array(entries)) => entries
            .iter()
            .filter_map(|entry| match entry.as_array().map(Vec::as_slice) {
                Some([Value::String(class), offset]) => offset.as_f64().map(|o| (class.clone(), o)),
                _ => None,
            })
            .collect(),
        Some(Value::Object(map)) => map
            .iter()
            .filter_map(|(class, offset)| offset.as_f64().map(|o| (class.clone(), o)))
            .collect(),
        _ => Vec::new(),
    }
}

fn averaged_importance(models: &[Arc<Model>]) -> Vec<(String, f64)> {
    let mut totals: Vec<(String, f64)> = Vec::new();
    for model in models {
        for (field, weight) in model.field_importance() {
            match totals.iter_mut().find(|(known, _)| known == field) {
                Some((_, total)) => *total += weight,
                None => totals.push((field.clone(), *weight)),
            }
        }
    }
    let n = models.len().max(1) as f64;
    let mut averaged: Vec<(String, f64)> = totals
        .into_iter()
        .map(|(field, total)| (field, crate::util::dec_round(total / n, crate::util::PRECISION)))
        .collect();
    averaged.sort_by(|(a_id, a), (b_id, b)| b.total_cmp(a).then_with(|| a_id.cmp(b_id)));
    averaged
}

#[cfg(test)]
mod tests;
