//! Locally held predictors that may still be loading
//!
//! A [`Local`] wraps a parsed predictor behind a [`Readiness`]. Finished
//! inline JSON is parsed on the spot; anything else is resolved by a task on
//! the current tokio runtime while predictions queue up.

use crate::error::{Error, Result};
use crate::fields::InputData;
use crate::loader::{Readiness, ResourceLoader, ResourceRef};
use crate::logistic::LogisticRegression;
use crate::model::Model;
use crate::observability::LocalMetrics;
use crate::prediction::{
    CategoryScore, MissingStrategy, OperatingKind, OperatingPoint, PredictOptions, Prediction,
};
use crate::predictor::{FromResource, Predictor};
use crate::resource::resource_name;
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

/// Local decision tree model
pub type LocalModel = Local<Model>;

/// Local logistic regression
pub type LocalLogisticRegression = Local<LogisticRegression>;

/// Predictor that becomes ready once its resource is resolved
pub struct Local<T> {
    readiness: Arc<Readiness<T>>,
    reference: String,
    metrics: LocalMetrics,
}

impl<T> Clone for Local<T> {
    fn clone(&self) -> Self {
        Self {
            readiness: Arc::clone(&self.readiness),
            reference: self.reference.clone(),
            metrics: self.metrics.clone(),
        }
    }
}

impl<T> std::fmt::Debug for Local<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Local")
            .field("reference", &self.reference)
            .field("readiness", &self.readiness)
            .finish()
    }
}

impl<T: FromResource> Local<T> {
    /// Parses a finished resource JSON into a ready predictor
    pub fn from_resource(resource: &Value) -> Result<Self> {
        let parsed = T::from_resource(resource)?;
        Ok(Self::resolved(Arc::new(parsed), resource_name(resource)))
    }

    /// Starts loading `reference`.
    ///
    /// Finished inline JSON is ready on return and parse failures are
    /// returned directly. Other references are resolved in the background,
    /// which needs a tokio runtime.
    pub fn load(reference: impl Into<ResourceRef>, loader: Arc<ResourceLoader>) -> Result<Self> {
        let reference = reference.into();
        let name = reference.describe();
        let kind = T::KIND;
        if let Some(resolved) = loader.resolve_inline(&reference, kind) {
            let parsed = T::from_resource(&resolved?)?;
            info!(resource = %name, kind = %kind, "Local predictor ready");
            return Ok(Self::resolved(Arc::new(parsed), name));
        }

        let handle = Handle::try_current().map_err(|_| {
            Error::configuration(format!(
                "loading {} needs a running tokio runtime",
                name
            ))
        })?;
        let readiness = Arc::new(Readiness::new());
        let task_readiness = Arc::clone(&readiness);
        let task_name = name.clone();
        handle.spawn(async move {
            let result = match loader.load(&reference, kind).await {
                Ok(value) => T::from_resource(&value).map(Arc::new).map_err(Error::from),
                Err(err) => Err(Error::from(err)),
            };
            match &result {
                Ok(_) => info!(resource = %task_name, kind = %kind, "Local predictor ready"),
                Err(err) => warn!(
                    resource = %task_name,
                    kind = %kind,
                    error = %err,
                    "Local predictor failed to load"
                ),
            }
            task_readiness.resolve(result);
        });

        Ok(Self {
            readiness,
            reference: name,
            metrics: LocalMetrics::new(),
        })
    }

    fn resolved(predictor: Arc<T>, reference: String) -> Self {
        Self {
            readiness: Arc::new(Readiness::resolved(Ok(predictor))),
            reference,
            metrics: LocalMetrics::new(),
        }
    }
}

impl<T: Predictor + 'static> Local<T> {
    pub fn is_ready(&self) -> bool {
        self.readiness.is_ready()
    }

    /// The reference this predictor was loaded from
    pub fn reference(&self) -> &str {
        &self.reference
    }

    /// The parsed predictor when ready
    pub fn get(&self) -> Option<Arc<T>> {
        self.readiness.get()
    }

    /// Waits until loading finished
    pub async fn ready(&self) -> Result<Arc<T>> {
        self.readiness.wait().await
    }

    /// Predicts once ready
    pub async fn predict(&self, input: &InputData, options: &PredictOptions) -> Result<Prediction> {
        let predictor = self.ready().await?;
        observed(&self.metrics, || predictor.predict(input, options))
    }

    /// Queues a prediction delivered to `callback` once ready.
    ///
    /// Runs before returning when already resolved. Queued callbacks fire in
    /// call order.
    pub fn predict_with<F>(&self, input: InputData, options: PredictOptions, callback: F)
    where
        F: FnOnce(Result<Prediction>) + Send + 'static,
    {
        let metrics = self.metrics.clone();
        if !self.readiness.is_resolved() {
            debug!(resource = %self.reference, "Prediction queued until ready");
        }
        self.readiness.on_ready(move |ready| {
            let result = ready.and_then(|predictor| {
                observed(&metrics, || predictor.predict(&input, &options))
            });
            callback(result);
        });
    }
}

impl Local<Model> {
    pub async fn predict_probability(
        &self,
        input: &InputData,
        strategy: MissingStrategy,
    ) -> Result<Vec<CategoryScore>> {
        let model = self.ready().await?;
        observed(&self.metrics, || model.predict_probability(input, strategy))
    }

    pub async fn predict_confidence(
        &self,
        input: &InputData,
        strategy: MissingStrategy,
    ) -> Result<Vec<CategoryScore>> {
        let model = self.ready().await?;
        observed(&self.metrics, || model.predict_confidence(input, strategy))
    }

    pub async fn predict_operating(
        &self,
        input: &InputData,
        strategy: MissingStrategy,
        point: &OperatingPoint,
    ) -> Result<Prediction> {
        let model = self.ready().await?;
        observed(&self.metrics, || model.predict_operating(input, strategy, point))
    }

    pub async fn predict_operating_kind(
        &self,
        input: &InputData,
        strategy: MissingStrategy,
        kind: OperatingKind,
    ) -> Result<Prediction> {
        let model = self.ready().await?;
        observed(&self.metrics, || model.predict_operating_kind(input, strategy, kind))
    }
}

impl Local<LogisticRegression> {
    pub async fn predict_probability(&self, input: &InputData) -> Result<Vec<CategoryScore>> {
        let regression = self.ready().await?;
        observed(&self.metrics, || regression.predict_probability(input))
    }

    pub async fn predict_operating(
        &self,
        input: &InputData,
        point: &OperatingPoint,
    ) -> Result<Prediction> {
        let regression = self.ready().await?;
        observed(&self.metrics, || regression.predict_operating(input, point))
    }
}

/// Runs a prediction and records its latency and outcome
pub(crate) fn observed<R>(metrics: &LocalMetrics, predict: impl FnOnce() -> Result<R>) -> Result<R> {
    let started = Instant::now();
    let result = predict();
    metrics.observe_prediction(started, result.is_ok());
    match &result {
        Ok(_) => debug!(elapsed_us = started.elapsed().as_micros() as u64, "Prediction computed"),
        Err(err) => debug!(error = %err, "Prediction failed"),
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LoadError;
    use serde_json::json;
    use std::sync::Mutex;

    fn stump() -> Value {
        json!({
            "resource": "model/5143a51a37203f2cf7000001",
            "object": {
                "status": {"code": 5, "message": "done"},
                "objective_field": "000001",
                "model": {
                    "fields": {
                        "000000": {"name": "x", "optype": "numeric", "column_number": 0},
                        "000001": {
                            "name": "label",
                            "optype": "categorical",
                            "column_number": 1,
                            "summary": {"categories": [["a", 3], ["b", 1]]}
                        }
                    },
                    "root": {
                        "output": "a",
                        "confidence": 0.30064,
                        "count": 4,
                        "objective_summary": {"categories": [["a", 3], ["b", 1]]},
                        "predicate": true
                    }
                }
            }
        })
    }

    #[test]
    fn test_inline_json_is_ready_without_runtime() {
        let local = LocalModel::load(stump(), Arc::new(ResourceLoader::new())).unwrap();
        assert!(local.is_ready());
        assert_eq!(local.reference(), "model/5143a51a37203f2cf7000001");
        assert_eq!(local.get().unwrap().class_names(), ["a", "b"]);
    }

    #[test]
    fn test_inline_parse_error_is_returned() {
        let mut resource = stump();
        resource["object"]["model"]
            .as_object_mut()
            .unwrap()
            .remove("root");
        let err = LocalModel::load(resource, Arc::new(ResourceLoader::new())).unwrap_err();
        assert_eq!(err, Error::Load(LoadError::MissingKey("model.root".to_string())));
    }

    #[test]
    fn test_reference_needs_runtime() {
        let err = LocalModel::load(
            "model/5143a51a37203f2cf7000001",
            Arc::new(ResourceLoader::new()),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_predict_with_runs_immediately_when_ready() {
        let local = LocalModel::from_resource(&stump()).unwrap();
        let seen = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&seen);
        local.predict_with(InputData::new(), PredictOptions::default(), move |result| {
            *sink.lock().unwrap() = Some(result.unwrap().category().map(str::to_string));
        });
        assert_eq!(*seen.lock().unwrap(), Some(Some("a".to_string())));
    }

    #[tokio::test]
    async fn test_unresolvable_reference_fails_every_caller() {
        let local = LocalModel::load(
            "model/5143a51a37203f2cf7000001",
            Arc::new(ResourceLoader::new()),
        )
        .unwrap();
        let err = local
            .predict(&InputData::new(), &PredictOptions::default())
            .await
            .unwrap_err();
        assert!(err.is_load_error());
        assert!(!local.is_ready());
        assert!(local.ready().await.is_err());
    }
}
