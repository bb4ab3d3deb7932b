//! Single model predictions
//!
//! A [`Model`] is the immutable, parsed form of a finished model resource:
//! its tree (plain or boosted), its fields and the class metadata needed to
//! derive probabilities and confidences from the reached node.

mod operating;

pub(crate) use operating::{check_operating_kind, check_operating_point, select_by_kind, select_by_point};

use crate::error::{Error, LoadError, Result};
use crate::fields::{Fields, InputData, Optype, ValidatedInput};
use crate::prediction::{
    CategoryScore, MissingStrategy, OperatingKind, OperatingPoint, PredictOptions, Prediction,
    PredictionValue,
};
use crate::resource::{finished_body, resource_name};
use crate::tree::{BoostedTree, Distribution, Tree};
use crate::util::{dec_round, ws_confidence, DEFAULT_Z, PRECISION};
use serde::Deserialize;
use serde_json::Value;

/// Kinds an operating point may use on a single model
const MODEL_KINDS: &[OperatingKind] = &[OperatingKind::Probability, OperatingKind::Confidence];

/// Boosting metadata of a model that is one round of a boosted ensemble
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Boosting {
    /// Class whose score the round adds to, classification only
    #[serde(default)]
    pub objective_class: Option<String>,
    #[serde(default = "default_boosting_weight")]
    pub weight: f64,
    #[serde(default)]
    pub lambda: f64,
    #[serde(default)]
    pub iteration: u32,
}

fn default_boosting_weight() -> f64 {
    1.0
}

#[derive(Debug, Clone, PartialEq)]
enum Structure {
    Tree(Tree),
    Boosted(BoostedTree),
}

/// Parsed decision tree model
#[derive(Debug, Clone)]
pub struct Model {
    resource_id: String,
    structure: Structure,
    fields: Fields,
    objective_id: String,
    class_names: Vec<String>,
    regression: bool,
    boosting: Option<Boosting>,
    missing_numerics: bool,
    root_distribution: Vec<(String, f64)>,
    importance: Vec<(String, f64)>,
}

impl Model {
    /// Builds a model from a finished model resource JSON
    pub fn from_resource(resource: &Value) -> std::result::Result<Self, LoadError> {
        let body = finished_body(resource, "model")?;
        let model = &body["model"];
        let objective_id = objective_field_id(body, model)?;

        let mut fields = Fields::from_value(
            model
                .get("fields")
                .ok_or_else(|| LoadError::MissingKey("model.fields".to_string()))?,
            Some(objective_id.clone()),
        )?;
        if let Some(model_fields) = model.get("model_fields").filter(|v| v.is_object()) {
            let declared = Fields::from_value(model_fields, Some(objective_id.clone()))?;
            let inputs: Vec<String> = declared.input_ids().cloned().collect();
            fields.merge(&declared);
            fields = fields.with_inputs(inputs);
        }
        let missing_tokens = model
            .get("missing_tokens")
            .and_then(Value::as_array)
            .map(|tokens| {
                tokens
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        let weight_field = body
            .get("weight_field")
            .or_else(|| model.get("weight_field"))
            .and_then(Value::as_str)
            .map(str::to_string);
        let fields = fields
            .with_missing_tokens(missing_tokens)
            .with_weight_field(weight_field);

        let objective = fields.objective().ok_or_else(|| {
            LoadError::Malformed(format!("objective field {} is not among the fields", objective_id))
        })?;
        let regression = objective.optype == Optype::Numeric;

        let boosting = match model.get("boosting") {
            None | Some(Value::Null) => None,
            Some(raw) => Some(serde_json::from_value::<Boosting>(raw.clone())?),
        };
        let root = model
            .get("root")
            .ok_or_else(|| LoadError::MissingKey("model.root".to_string()))?;
        let weighted = root.get("weighted_objective_summary").is_some();
        let structure = match &boosting {
            Some(boosting) => Structure::Boosted(BoostedTree::from_value(root, boosting.lambda)?),
            None => Structure::Tree(Tree::from_value(root, regression, weighted)?),
        };

        let root_distribution = match &structure {
            Structure::Tree(tree) => match &tree.root().distribution {
                Distribution::Categories(counts) if !counts.is_empty() => counts.clone(),
                _ => training_categories(model),
            },
            Structure::Boosted(_) => training_categories(model),
        };

        let class_names = if regression {
            Vec::new()
        } else {
            let mut names = objective.category_names();
            if names.is_empty() {
                names = root_distribution.iter().map(|(name, _)| name.clone()).collect();
            }
            names.sort();
            names.dedup();
            names
        };

        let missing_numerics = model
            .get("missing_numerics")
            .and_then(Value::as_bool)
            .unwrap_or(true);

        Ok(Self {
            resource_id: resource_name(resource),
            structure,
            fields,
            objective_id,
            class_names,
            regression,
            boosting,
            missing_numerics,
            root_distribution,
            importance: importance_list(model.get("importance")),
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

    /// Sorted objective classes, empty for regressions
    pub fn class_names(&self) -> &[String] {
        &self.class_names
    }

    pub fn is_regression(&self) -> bool {
        self.regression
    }

    pub fn boosting(&self) -> Option<&Boosting> {
        self.boosting.as_ref()
    }

    pub fn is_weighted(&self) -> bool {
        match &self.structure {
            Structure::Tree(tree) => tree.is_weighted(),
            Structure::Boosted(_) => false,
        }
    }

    /// Field importance pairs sorted by decreasing importance
    pub fn field_importance(&self) -> &[(String, f64)] {
        &self.importance
    }

    /// Predicts for raw input data.
    ///
    /// Operating points take precedence over operating kinds; without
    /// either the tree is traversed directly and classifications report the
    /// probability of the predicted class.
    pub fn predict(&self, input: &InputData, options: &PredictOptions) -> Result<Prediction> {
        if self.regression && (options.operating_point.is_some() || options.operating_kind.is_some()) {
            return Err(Error::configuration(
                "operating points and operating kinds only apply to classifications",
            ));
        }
        if let Some(point) = &options.operating_point {
            check_operating_point(point, MODEL_KINDS, &self.class_names)?;
        } else if let Some(kind) = options.operating_kind {
            check_operating_kind(kind, MODEL_KINDS)?;
        }
        let validated = self.validate(input)?;
        let mut prediction = if let Some(point) = &options.operating_point {
            self.predict_operating_validated(&validated, options.missing_strategy, point)?
        } else if let Some(kind) = options.operating_kind {
            self.predict_operating_kind_validated(&validated, options.missing_strategy, kind)?
        } else {
            let mut prediction = self.traverse(&validated, options.missing_strategy);
            if options.use_median && self.regression {
                if let Some(median) = prediction.median {
                    prediction.prediction = PredictionValue::Number(median);
                }
            }
            if !self.regression && self.boosting.is_none() {
                let probabilities = self.laplace_probabilities(&prediction.distribution);
                prediction.probability = prediction
                    .category()
                    .and_then(|category| probabilities.iter().find(|s| s.category == category))
                    .map(|score| score.value);
            }
            prediction
        };
        if options.add_unused_fields {
            prediction.unused_fields = Some(validated.unused_fields().to_vec());
        }
        Ok(prediction)
    }

    /// Per class probabilities, in `class_names` order
    pub fn predict_probability(
        &self,
        input: &InputData,
        strategy: MissingStrategy,
    ) -> Result<Vec<CategoryScore>> {
        let validated = self.validate(input)?;
        self.probabilities_validated(&validated, strategy)
    }

    /// Per class Wilson score confidences, in `class_names` order
    pub fn predict_confidence(
        &self,
        input: &InputData,
        strategy: MissingStrategy,
    ) -> Result<Vec<CategoryScore>> {
        let validated = self.validate(input)?;
        self.confidences_validated(&validated, strategy)
    }

    /// Predicts the class selected by `point`
    pub fn predict_operating(
        &self,
        input: &InputData,
        strategy: MissingStrategy,
        point: &OperatingPoint,
    ) -> Result<Prediction> {
        check_operating_point(point, MODEL_KINDS, &self.class_names)?;
        let validated = self.validate(input)?;
        self.predict_operating_validated(&validated, strategy, point)
    }

    /// Predicts the class with the highest `kind` score
    pub fn predict_operating_kind(
        &self,
        input: &InputData,
        strategy: MissingStrategy,
        kind: OperatingKind,
    ) -> Result<Prediction> {
        check_operating_kind(kind, MODEL_KINDS)?;
        let validated = self.validate(input)?;
        self.predict_operating_kind_validated(&validated, strategy, kind)
    }

    pub(crate) fn validate(&self, input: &InputData) -> Result<ValidatedInput> {
        let validated = self.fields.validate(input)?;
        if !self.missing_numerics {
            if let Some(missing) = self.fields.input_ids().find(|id| {
                !validated.contains(id)
                    && self
                        .fields
                        .get(id)
                        .is_some_and(|field| field.optype == Optype::Numeric)
            }) {
                return Err(Error::validation(format!(
                    "the model does not accept missing numeric values, \"{}\" is missing",
                    self.fields.name(missing)
                )));
            }
        }
        Ok(validated)
    }

    fn traverse(&self, validated: &ValidatedInput, strategy: MissingStrategy) -> Prediction {
        match &self.structure {
            Structure::Tree(tree) => tree.predict(validated, &self.fields, strategy),
            Structure::Boosted(tree) => tree.predict(validated, &self.fields, strategy),
        }
    }

    fn require_classification(&self, operation: &str) -> Result<()> {
        if self.boosting.is_some() {
            return Err(Error::unsupported(format!(
                "{} is not available for boosted models",
                operation
            )));
        }
        if self.regression {
            return Err(Error::unsupported(format!(
                "{} is not available for regression models",
                operation
            )));
        }
        Ok(())
    }

    fn probabilities_validated(
        &self,
        validated: &ValidatedInput,
        strategy: MissingStrategy,
    ) -> Result<Vec<CategoryScore>> {
        self.require_classification("probability")?;
        let prediction = self.traverse(validated, strategy);
        Ok(self.laplace_probabilities(&prediction.distribution))
    }

    fn confidences_validated(
        &self,
        validated: &ValidatedInput,
        strategy: MissingStrategy,
    ) -> Result<Vec<CategoryScore>> {
        self.require_classification("confidence")?;
        let prediction = self.traverse(validated, strategy);
        let distribution: Vec<(String, f64)> = prediction
            .distribution
            .iter()
            .filter_map(|(value, count)| value.as_category().map(|c| (c.to_string(), *count)))
            .collect();
        let population = prediction.count.unwrap_or_else(|| distribution.iter().map(|(_, c)| c).sum());
        Ok(self
            .class_names
            .iter()
            .map(|name| {
                let confidence = ws_confidence(name, &distribution, Some(population), DEFAULT_Z);
                CategoryScore::new(name.clone(), dec_round(confidence, PRECISION))
            })
            .collect())
    }

    fn predict_operating_validated(
        &self,
        validated: &ValidatedInput,
        strategy: MissingStrategy,
        point: &OperatingPoint,
    ) -> Result<Prediction> {
        self.require_classification("operating point prediction")?;
        let scores = self.scores_for_kind(validated, strategy, point.kind)?;
        select_by_point(&scores, point)
    }

    fn predict_operating_kind_validated(
        &self,
        validated: &ValidatedInput,
        strategy: MissingStrategy,
        kind: OperatingKind,
    ) -> Result<Prediction> {
        self.require_classification("operating kind prediction")?;
        let scores = self.scores_for_kind(validated, strategy, kind)?;
        select_by_kind(&scores, kind)
    }

    fn scores_for_kind(
        &self,
        validated: &ValidatedInput,
        strategy: MissingStrategy,
        kind: OperatingKind,
    ) -> Result<Vec<CategoryScore>> {
        match kind {
            OperatingKind::Confidence => self.confidences_validated(validated, strategy),
            _ => self.probabilities_validated(validated, strategy),
        }
    }

    /// Probabilities smoothed with the training class prior.
    ///
    /// Weighted models use the leaf distribution alone.
    fn laplace_probabilities(&self, leaf: &[(PredictionValue, f64)]) -> Vec<CategoryScore> {
        let weighted = self.is_weighted();
        let root_total: f64 = self.root_distribution.iter().map(|(_, c)| c).sum();
        let mut instances = if weighted { 0.0 } else { 1.0 };
        let mut values: Vec<f64> = self
            .class_names
            .iter()
            .map(|name| {
                if weighted || root_total <= 0.0 {
                    return 0.0;
                }
                self.root_distribution
                    .iter()
                    .find(|(category, _)| category == name)
                    .map_or(0.0, |(_, count)| count / root_total)
            })
            .collect();
        for (value, count) in leaf {
            let Some(category) = value.as_category() else {
                continue;
            };
            if let Some(index) = self.class_names.iter().position(|name| name == category) {
                values[index] += count;
                instances += count;
            }
        }
        self.class_names
            .iter()
            .zip(values)
            .map(|(name, value)| {
                let probability = if instances > 0.0 { value / instances } else { 0.0 };
                CategoryScore::new(name.clone(), dec_round(probability, PRECISION))
            })
            .collect()
    }
}

pub(crate) fn objective_field_id(body: &Value, model: &Value) -> std::result::Result<String, LoadError> {
    let first = |value: Option<&Value>| -> Option<String> {
        match value? {
            Value::String(id) => Some(id.clone()),
            Value::Array(ids) => ids.first().and_then(Value::as_str).map(str::to_string),
            _ => None,
        }
    };
    first(body.get("objective_fields"))
        .or_else(|| first(body.get("objective_field")))
        .or_else(|| first(model.get("objective_fields")))
        .or_else(|| first(model.get("objective_field")))
        .ok_or_else(|| LoadError::MissingKey("objective_fields".to_string()))
}

fn training_categories(model: &Value) -> Vec<(String, f64)> {
    model
        .pointer("/distribution/training/categories")
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(|entry| match entry.as_array().map(Vec::as_slice) {
                    Some([name, count]) => count.as_f64().map(|c| {
                        let name = match name {
                            Value::String(s) => s.clone(),
                            other => other.to_string(),
                        };
                        (name, c)
                    }),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Reads `[[field_id, importance], ...]`, most important first
pub(crate) fn importance_list(value: Option<&Value>) -> Vec<(String, f64)> {
    let mut importance: Vec<(String, f64)> = value
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(|entry| match entry.as_array().map(Vec::as_slice) {
                    Some([Value::String(id), weight]) => weight.as_f64().map(|w| (id.clone(), w)),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default();
    importance.sort_by(|(a_id, a), (b_id, b)| b.total_cmp(a).then_with(|| a_id.cmp(b_id)));
    importance
}

#[cfg(test)]
mod tests;
