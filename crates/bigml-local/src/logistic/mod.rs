//! Logistic regression predictions
//!
//! Input fields are expanded into coefficient slots (numeric values,
//! one-hot or matrix coded categories, text terms and items). Each class
//! scores `sigmoid(coefficients . features + bias)` and the scores are
//! normalized into probabilities.

mod layout;

pub use layout::FieldCoding;

use crate::error::{Error, LoadError, Result};
use crate::fields::{Field, FieldValue, Fields, InputData, Optype, ValidatedInput};
use crate::model::{
    check_operating_kind, check_operating_point, objective_field_id, select_by_kind, select_by_point,
};
use crate::prediction::{
    CategoryScore, OperatingKind, OperatingPoint, PredictOptions, Prediction, PredictionValue,
};
use crate::resource::{finished_body, resource_name};
use crate::util::{dec_round, parse_items, parse_terms, sigmoid, TokenMode, PRECISION};
use layout::{layout, parse_coefficients, parse_field_codings, Slot, SlotKind};
use serde_json::Value;
use std::collections::HashMap;
use tracing::warn;

/// Logistic regressions only score probabilities
const LOGISTIC_KINDS: &[OperatingKind] = &[OperatingKind::Probability];

/// Parsed logistic regression
#[derive(Debug, Clone)]
pub struct LogisticRegression {
    resource_id: String,
    fields: Fields,
    objective_id: String,
    /// Objective classes in training summary order
    categories: Vec<String>,
    class_names: Vec<String>,
    coefficients: Vec<(String, Vec<f64>)>,
    slots: Vec<Slot>,
    bias: bool,
    normalize: bool,
    balance_fields: bool,
    missing_numerics: bool,
    c: Option<f64>,
    eps: Option<f64>,
    regularization: Option<String>,
}

impl LogisticRegression {
    /// Builds a logistic regression from a finished resource JSON
    pub fn from_resource(resource: &Value) -> std::result::Result<Self, LoadError> {
        let body = finished_body(resource, "logistic_regression")?;
        let lr = &body["logistic_regression"];
        let objective_id = objective_field_id(body, lr)?;

        let mut fields = Fields::from_value(
            lr.get("fields")
                .ok_or_else(|| LoadError::MissingKey("logistic_regression.fields".to_string()))?,
            Some(objective_id.clone()),
        )?;
        let declared_inputs: Option<Vec<String>> = body
            .get("input_fields")
            .and_then(Value::as_array)
            .map(|ids| ids.iter().filter_map(Value::as_str).map(str::to_string).collect());
        if let Some(inputs) = &declared_inputs {
            fields = fields.with_inputs(inputs.clone());
        }
        let order: Vec<String> = match declared_inputs {
            Some(inputs) => inputs,
            None => fields.input_ids().cloned().collect(),
        };

        let objective = fields.objective().ok_or_else(|| {
            LoadError::Malformed(format!("objective field {} is not among the fields", objective_id))
        })?;
        let coefficients = parse_coefficients(lr.get("coefficients"))?;
        let mut categories = objective.category_names();
        if categories.is_empty() {
            categories = coefficients.iter().map(|(class, _)| class.clone()).collect();
        }
        if let Some(missing) = categories
            .iter()
            .find(|class| !coefficients.iter().any(|(name, _)| name == *class))
        {
            return Err(LoadError::Malformed(format!(
                "no coefficients for class \"{}\"",
                missing
            )));
        }
        let mut class_names = categories.clone();
        class_names.sort();

        let flag = |key: &str, default: bool| match lr.get(key) {
            Some(Value::Bool(value)) => *value,
            Some(Value::Number(value)) => value.as_f64().is_some_and(|v| v != 0.0),
            _ => default,
        };
        let bias = flag("bias", true);
        let missing_numerics = flag("missing_numerics", false);
        let codings = parse_field_codings(lr.get("field_codings"), &fields)?;
        let (slots, width) = layout(&fields, &order, &codings, missing_numerics);

        let expected = width + usize::from(bias);
        if let Some((class, values)) = coefficients.iter().find(|(_, values)| values.len() < expected) {
            return Err(LoadError::Malformed(format!(
                "class \"{}\" has {} coefficients, {} expected",
                class,
                values.len(),
                expected
            )));
        }

        Ok(Self {
            resource_id: resource_name(resource),
            fields,
            objective_id,
            categories,
            class_names,
            coefficients,
            slots,
            bias,
            normalize: flag("normalize", false),
            balance_fields: flag("balance_fields", false),
            missing_numerics,
            c: lr.get("c").and_then(Value::as_f64),
            eps: lr.get("eps").and_then(Value::as_f64),
            regularization: lr.get("regularization").and_then(Value::as_str).map(str::to_string),
        })
    }

    pub fn resource_id(&self) -> &str {
        &self.resource_id
    }

    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    pub fn objective_id(&self) -> &str {
        &self.objective_id
    }

    /// Sorted objective classes
    pub fn class_names(&self) -> &[String] {
        &self.class_names
    }

    /// Regularization strength used at training time
    pub fn c(&self) -> Option<f64> {
        self.c
    }

    pub fn eps(&self) -> Option<f64> {
        self.eps
    }

    /// `l1` or `l2`
    pub fn regularization(&self) -> Option<&str> {
        self.regularization.as_deref()
    }

    /// Predicts the most probable class.
    ///
    /// The distribution lists every class by decreasing probability, ties
    /// keeping the training class order.
    pub fn predict(&self, input: &InputData, options: &PredictOptions) -> Result<Prediction> {
        if let Some(point) = &options.operating_point {
            check_operating_point(point, LOGISTIC_KINDS, &self.class_names)?;
        } else if let Some(kind) = options.operating_kind {
            check_operating_kind(kind, LOGISTIC_KINDS)?;
        }
        let validated = self.validate(input)?;
        let ranked = self.ranked_probabilities(&validated);
        let mut prediction = if let Some(point) = &options.operating_point {
            select_by_point(&ranked, point)?
        } else if let Some(kind) = options.operating_kind {
            select_by_kind(&ranked, kind)?
        } else {
            let top = ranked
                .first()
                .ok_or_else(|| Error::unsupported("logistic regression without classes"))?;
            let mut prediction = Prediction::new(PredictionValue::Category(top.category.clone()));
            prediction.probability = Some(top.value);
            prediction
        };
        prediction.distribution = ranked
            .iter()
            .map(|score| (PredictionValue::Category(score.category.clone()), score.value))
            .collect();
        if options.add_unused_fields {
            prediction.unused_fields = Some(validated.unused_fields().to_vec());
        }
        Ok(prediction)
    }

    /// Per class probabilities, in `class_names` order
    pub fn predict_probability(&self, input: &InputData) -> Result<Vec<CategoryScore>> {
        let validated = self.validate(input)?;
        let ranked = self.ranked_probabilities(&validated);
        Ok(self
            .class_names
            .iter()
            .map(|name| {
                let value = ranked
                    .iter()
                    .find(|score| &score.category == name)
                    .map_or(0.0, |score| score.value);
                CategoryScore::new(name.clone(), value)
            })
            .collect())
    }

    /// Predicts the class selected by `point`; only probability points apply
    pub fn predict_operating(&self, input: &InputData, point: &OperatingPoint) -> Result<Prediction> {
        self.predict(input, &PredictOptions::default().with_operating_point(point.clone()))
    }

    fn validate(&self, input: &InputData) -> Result<ValidatedInput> {
        let validated = self.fields.validate(input)?;
        if !self.missing_numerics {
            if let Some(slot) = self
                .slots
                .iter()
                .find(|slot| slot.kind == SlotKind::Numeric && !validated.contains(&slot.field_id))
            {
                return Err(Error::validation(format!(
                    "the logistic regression does not accept missing numeric values, \"{}\" is missing",
                    self.fields.name(&slot.field_id)
                )));
            }
        }
        Ok(validated)
    }

    fn ranked_probabilities(&self, validated: &ValidatedInput) -> Vec<CategoryScore> {
        let terms: HashMap<&str, Vec<(String, f64)>> = self
            .slots
            .iter()
            .filter(|slot| slot.kind != SlotKind::Numeric)
            .filter_map(|slot| {
                let value = validated.get(&slot.field_id)?;
                let field = self.fields.get(&slot.field_id)?;
                Some((slot.field_id.as_str(), unique_terms(slot, field, value)))
            })
            .collect();

        let scores: Vec<f64> = self
            .categories
            .iter()
            .map(|class| {
                let coefficients = self
                    .coefficients
                    .iter()
                    .find(|(name, _)| name == class)
                    .map(|(_, values)| values.as_slice())
                    .unwrap_or_default();
                sigmoid(self.category_score(coefficients, validated, &terms))
            })
            .collect();
        let total: f64 = scores.iter().sum();

        let mut ranked: Vec<(usize, CategoryScore)> = self
            .categories
            .iter()
            .zip(scores)
            .enumerate()
            .map(|(order, (class, score))| {
                let probability = if total > 0.0 { score / total } else { 0.0 };
                (order, CategoryScore::new(class.clone(), dec_round(probability, PRECISION)))
            })
            .collect();
        ranked.sort_by(|(a_order, a), (b_order, b)| {
            b.value.total_cmp(&a.value).then_with(|| a_order.cmp(b_order))
        });
        ranked.into_iter().map(|(_, score)| score).collect()
    }

    fn category_score(
        &self,
        coefficients: &[f64],
        validated: &ValidatedInput,
        terms: &HashMap<&str, Vec<(String, f64)>>,
    ) -> f64 {
        let coefficient = |index: usize| coefficients.get(index).copied().unwrap_or_default();
        let mut score = 0.0;
        let mut norm2 = 0.0;
        for slot in &self.slots {
            if slot.kind == SlotKind::Numeric {
                match validated.get(&slot.field_id).and_then(FieldValue::as_f64) {
                    Some(value) => {
                        let value = self.balanced(&slot.field_id, value);
                        score += coefficient(slot.shift) * value;
                        norm2 += value * value;
                    }
                    None if self.missing_numerics => {
                        score += coefficient(slot.shift + 1);
                        norm2 += 1.0;
                    }
                    None => {}
                }
                continue;
            }

            let present = terms.get(slot.field_id.as_str());
            let known: Vec<(usize, f64)> = present
                .into_iter()
                .flatten()
                .filter_map(|(term, occurrences)| {
                    let index = slot.terms.iter().position(|t| t == term);
                    if index.is_none() && slot.kind == SlotKind::Categorical {
                        warn!(
                            field = %slot.field_id,
                            category = %term,
                            "category has no coefficient, ignoring it"
                        );
                    }
                    index.map(|i| (i, *occurrences))
                })
                .collect();

            // an unknown category is not a missing value
            let missing = match slot.kind {
                SlotKind::Categorical => present.is_none(),
                _ => known.is_empty(),
            };
            if missing {
                score += match &slot.coding {
                    FieldCoding::OneHot => coefficient(slot.shift + slot.terms.len()),
                    FieldCoding::Matrix(rows) => rows
                        .iter()
                        .enumerate()
                        .map(|(i, row)| coefficient(slot.shift + i) * row.last().copied().unwrap_or_default())
                        .sum(),
                };
                norm2 += 1.0;
                continue;
            }
            for (index, occurrences) in known {
                score += match &slot.coding {
                    FieldCoding::OneHot => coefficient(slot.shift + index) * occurrences,
                    FieldCoding::Matrix(rows) => rows
                        .iter()
                        .enumerate()
                        .map(|(i, row)| {
                            coefficient(slot.shift + i)
                                * row.get(index).copied().unwrap_or_default()
                                * occurrences
                        })
                        .sum(),
                };
                norm2 += occurrences * occurrences;
            }
        }
        if self.bias {
            score += coefficients.last().copied().unwrap_or_default();
            norm2 += 1.0;
        }
        if self.normalize && norm2 > 0.0 {
            score /= norm2.sqrt();
        }
        score
    }

    fn balanced(&self, field_id: &str, value: f64) -> f64 {
        if !self.balance_fields {
            return value;
        }
        let Some(summary) = self.fields.get(field_id).map(|f| &f.summary) else {
            return value;
        };
        match (summary.mean, summary.standard_deviation) {
            (Some(mean), Some(std)) if std > 0.0 => (value - mean) / std,
            (Some(mean), _) => value - mean,
            _ => value,
        }
    }
}

/// Known terms of a text, items or categorical value with their counts.
///
/// Terms keep their first appearance order. Text terms are mapped to their
/// base form through the field term forms.
pub(crate) fn unique_terms(slot: &Slot, field: &Field, value: &FieldValue) -> Vec<(String, f64)> {
    let text = value.to_string();
    let terms: Vec<String> = match field.optype {
        Optype::Text => {
            let case_sensitive = field.term_analysis.case_sensitive.unwrap_or(true);
            let mode = field.term_analysis.token_mode.unwrap_or_default();
            let mut terms = if mode == TokenMode::FullTermsOnly {
                Vec::new()
            } else {
                parse_terms(&text, case_sensitive)
            };
            if mode != TokenMode::TokensOnly {
                let full = if case_sensitive { text.clone() } else { text.to_lowercase() };
                // a single token text is already its own full term
                if mode == TokenMode::FullTermsOnly || terms.first() != Some(&full) {
                    terms.push(full);
                }
            }
            terms
        }
        Optype::Items => parse_items(&text, field.item_analysis.separator()),
        _ => return vec![(text, 1.0)],
    };

    let mut base_forms: HashMap<&str, &str> = HashMap::new();
    for (term, forms) in &field.summary.term_forms {
        base_forms.insert(term, term);
        for form in forms {
            base_forms.insert(form, term);
        }
    }
    let mut counts: Vec<(String, f64)> = Vec::new();
    for term in terms {
        let base = if slot.terms.contains(&term) {
            term.as_str()
        } else if let Some(base) = base_forms.get(term.as_str()) {
            *base
        } else {
            continue;
        };
        match counts.iter_mut().find(|(known, _)| known == base) {
            Some((_, count)) => *count += 1.0,
            None => counts.push((base.to_string(), 1.0)),
        }
    }
    counts
}

#[cfg(test)]
mod tests;
