//! Common interface of parsed predictors

use crate::ensemble::Ensemble;
use crate::error::{LoadError, Result};
use crate::fields::InputData;
use crate::logistic::LogisticRegression;
use crate::model::Model;
use crate::prediction::{PredictOptions, Prediction};
use crate::resource::ResourceType;
use serde_json::Value;

/// Trait for prediction implementations
pub trait Predictor: Send + Sync {
    /// Predicts for raw input data
    fn predict(&self, input: &InputData, options: &PredictOptions) -> Result<Prediction>;

    /// Id of the backing resource
    fn resource_id(&self) -> &str;
}

/// Predictors buildable from a single finished resource JSON
pub trait FromResource: Predictor + Sized + 'static {
    /// Resource type the JSON must describe
    const KIND: ResourceType;

    fn from_resource(resource: &Value) -> std::result::Result<Self, LoadError>;
}

impl Predictor for Model {
    fn predict(&self, input: &InputData, options: &PredictOptions) -> Result<Prediction> {
        Model::predict(self, input, options)
    }

    fn resource_id(&self) -> &str {
        Model::resource_id(self)
    }
}

impl FromResource for Model {
    const KIND: ResourceType = ResourceType::Model;

    fn from_resource(resource: &Value) -> std::result::Result<Self, LoadError> {
        Model::from_resource(resource)
    }
}

impl Predictor for LogisticRegression {
    fn predict(&self, input: &InputData, options: &PredictOptions) -> Result<Prediction> {
        LogisticRegression::predict(self, input, options)
    }

    fn resource_id(&self) -> &str {
        LogisticRegression::resource_id(self)
    }
}

impl FromResource for LogisticRegression {
    const KIND: ResourceType = ResourceType::LogisticRegression;

    fn from_resource(resource: &Value) -> std::result::Result<Self, LoadError> {
        LogisticRegression::from_resource(resource)
    }
}

impl Predictor for Ensemble {
    fn predict(&self, input: &InputData, options: &PredictOptions) -> Result<Prediction> {
        Ensemble::predict(self, input, options)
    }

    fn resource_id(&self) -> &str {
        Ensemble::resource_id(self)
    }
}
