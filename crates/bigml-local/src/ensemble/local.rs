//! Ensembles loaded in the background

use super::{model_ids, Ensemble};
use crate::error::{Error, Result};
use crate::fields::InputData;
use crate::loader::{Readiness, ResourceLoader, ResourceRef};
use crate::local::{observed, LocalModel};
use crate::observability::LocalMetrics;
use crate::prediction::{
    CategoryScore, MissingStrategy, OperatingKind, OperatingPoint, PredictOptions, Prediction,
};
use crate::resource::{resource_name, ResourceType};
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

/// Loading phase of a [`LocalEnsemble`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EnsemblePhase {
    /// Resolving the ensemble resource
    Loading,
    /// Member models are being loaded
    Partial,
    Ready,
    Failed,
}

impl EnsemblePhase {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => EnsemblePhase::Partial,
            2 => EnsemblePhase::Ready,
            3 => EnsemblePhase::Failed,
            _ => EnsemblePhase::Loading,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            EnsemblePhase::Loading => 0,
            EnsemblePhase::Partial => 1,
            EnsemblePhase::Ready => 2,
            EnsemblePhase::Failed => 3,
        }
    }
}

/// What an ensemble is built from
#[derive(Debug, Clone, PartialEq)]
pub enum EnsembleSource {
    /// An ensemble resource whose models are loaded by id
    Resource(ResourceRef),
    /// A plain list of models
    Models(Vec<ResourceRef>),
    /// Finished JSON for the ensemble and every model
    Inline {
        ensemble: Option<Value>,
        models: Vec<Value>,
    },
}

impl From<ResourceRef> for EnsembleSource {
    fn from(reference: ResourceRef) -> Self {
        EnsembleSource::Resource(reference)
    }
}

impl From<&str> for EnsembleSource {
    fn from(reference: &str) -> Self {
        EnsembleSource::Resource(ResourceRef::from(reference))
    }
}

impl EnsembleSource {
    fn describe(&self) -> String {
        match self {
            EnsembleSource::Resource(reference) => reference.describe(),
            EnsembleSource::Models(models) => format!("{} models", models.len()),
            EnsembleSource::Inline { ensemble, models } => ensemble
                .as_ref()
                .map(resource_name)
                .unwrap_or_else(|| format!("{} models", models.len())),
        }
    }
}

#[derive(Debug, Default)]
struct Progress {
    phase: AtomicU8,
    ready_models: AtomicUsize,
    total_models: AtomicUsize,
}

impl Progress {
    fn set_phase(&self, phase: EnsemblePhase) {
        self.phase.store(phase.as_u8(), Ordering::SeqCst);
    }
}

/// Ensemble that becomes ready once every member model is loaded
#[derive(Clone)]
pub struct LocalEnsemble {
    readiness: Arc<Readiness<Ensemble>>,
    progress: Arc<Progress>,
    reference: String,
    metrics: LocalMetrics,
}

impl std::fmt::Debug for LocalEnsemble {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalEnsemble")
            .field("reference", &self.reference)
            .field("phase", &self.phase())
            .field("ready_models", &self.ready_models())
            .field("total_models", &self.total_models())
            .finish()
    }
}

impl LocalEnsemble {
    /// Builds a ready ensemble from finished JSON
    pub fn from_resources(ensemble: Option<&Value>, models: &[Value]) -> Result<Self> {
        let parsed = Ensemble::from_resources(ensemble, models)?;
        let reference = ensemble
            .map(resource_name)
            .unwrap_or_else(|| format!("{} models", models.len()));
        Ok(Self::resolved(parsed, reference))
    }

    /// Starts loading `source`.
    ///
    /// Inline sources whose JSON is all finished are ready on return.
    /// Everything else is resolved by a background task: the ensemble
    /// resource first, then its models in batches of at most
    /// [`ResourceLoader::max_models`].
    pub fn load(source: impl Into<EnsembleSource>, loader: Arc<ResourceLoader>) -> Result<Self> {
        let source = source.into();
        let reference = source.describe();
        if let Some(ensemble) = resolve_inline(&source, &loader)? {
            info!(ensemble = %reference, models = ensemble.models().len(), "Local ensemble ready");
            return Ok(Self::resolved(ensemble, reference));
        }

        let handle = Handle::try_current().map_err(|_| {
            Error::configuration(format!(
                "loading ensemble {} needs a running tokio runtime",
                reference
            ))
        })?;
        let readiness = Arc::new(Readiness::new());
        let progress = Arc::new(Progress::default());
        let task_readiness = Arc::clone(&readiness);
        let task_progress = Arc::clone(&progress);
        let task_reference = reference.clone();
        handle.spawn(async move {
            let result = assemble(source, loader, &task_progress).await.map(Arc::new);
            match &result {
                Ok(ensemble) => {
                    task_progress.set_phase(EnsemblePhase::Ready);
                    info!(
                        ensemble = %task_reference,
                        models = ensemble.models().len(),
                        "Local ensemble ready"
                    );
                }
                Err(err) => {
                    task_progress.set_phase(EnsemblePhase::Failed);
                    warn!(ensemble = %task_reference, error = %err, "Local ensemble failed to load");
                }
            }
            task_readiness.resolve(result);
        });

        Ok(Self {
            readiness,
            progress,
            reference,
            metrics: LocalMetrics::new(),
        })
    }

    fn resolved(ensemble: Ensemble, reference: String) -> Self {
        let progress = Progress::default();
        progress.set_phase(EnsemblePhase::Ready);
        progress
            .ready_models
            .store(ensemble.models().len(), Ordering::SeqCst);
        progress
            .total_models
            .store(ensemble.models().len(), Ordering::SeqCst);
        Self {
            readiness: Arc::new(Readiness::resolved(Ok(Arc::new(ensemble)))),
            progress: Arc::new(progress),
            reference,
            metrics: LocalMetrics::new(),
        }
    }

    pub fn phase(&self) -> EnsemblePhase {
        EnsemblePhase::from_u8(self.progress.phase.load(Ordering::SeqCst))
    }

    /// Member models loaded so far
    pub fn ready_models(&self) -> usize {
        self.progress.ready_models.load(Ordering::SeqCst)
    }

    /// Member models to load, 0 until the ensemble resource is resolved
    pub fn total_models(&self) -> usize {
        self.progress.total_models.load(Ordering::SeqCst)
    }

    pub fn is_ready(&self) -> bool {
        self.readiness.is_ready()
    }

    pub fn reference(&self) -> &str {
        &self.reference
    }

    pub fn get(&self) -> Option<Arc<Ensemble>> {
        self.readiness.get()
    }

    /// Waits until every model is loaded
    pub async fn ready(&self) -> Result<Arc<Ensemble>> {
        self.readiness.wait().await
    }

    pub async fn predict(&self, input: &InputData, options: &PredictOptions) -> Result<Prediction> {
        let ensemble = self.ready().await?;
        observed(&self.metrics, || ensemble.predict(input, options))
    }

    /// Queues a prediction delivered to `callback` once ready, in call order
    pub fn predict_with<F>(&self, input: InputData, options: PredictOptions, callback: F)
    where
        F: FnOnce(Result<Prediction>) + Send + 'static,
    {
        let metrics = self.metrics.clone();
        if !self.readiness.is_resolved() {
            debug!(ensemble = %self.reference, "Prediction queued until ready");
        }
        self.readiness.on_ready(move |ready| {
            let result =
                ready.and_then(|ensemble| observed(&metrics, || ensemble.predict(&input, &options)));
            callback(result);
        });
    }

    pub async fn predict_probability(
        &self,
        input: &InputData,
        strategy: MissingStrategy,
    ) -> Result<Vec<CategoryScore>> {
        let ensemble = self.ready().await?;
        observed(&self.metrics, || ensemble.predict_probability(input, strategy))
    }

    pub async fn predict_confidence(
        &self,
        input: &InputData,
        strategy: MissingStrategy,
    ) -> Result<Vec<CategoryScore>> {
        let ensemble = self.ready().await?;
        observed(&self.metrics, || ensemble.predict_confidence(input, strategy))
    }

    pub async fn predict_votes(
        &self,
        input: &InputData,
        strategy: MissingStrategy,
    ) -> Result<Vec<CategoryScore>> {
        let ensemble = self.ready().await?;
        observed(&self.metrics, || ensemble.predict_votes(input, strategy))
    }

    pub async fn predict_operating(
        &self,
        input: &InputData,
        strategy: MissingStrategy,
        point: &OperatingPoint,
    ) -> Result<Prediction> {
        let options = PredictOptions::default()
            .with_missing_strategy(strategy)
            .with_operating_point(point.clone());
        self.predict(input, &options).await
    }

    pub async fn predict_operating_kind(
        &self,
        input: &InputData,
        strategy: MissingStrategy,
        kind: OperatingKind,
    ) -> Result<Prediction> {
        let options = PredictOptions::default()
            .with_missing_strategy(strategy)
            .with_operating_kind(kind);
        self.predict(input, &options).await
    }
}

/// Builds the ensemble without suspending when every piece is finished JSON
fn resolve_inline(source: &EnsembleSource, loader: &ResourceLoader) -> Result<Option<Ensemble>> {
    let (ensemble, models): (Option<Value>, Vec<ResourceRef>) = match source {
        EnsembleSource::Inline { ensemble, models } => (
            ensemble.clone(),
            models.iter().cloned().map(ResourceRef::Json).collect(),
        ),
        EnsembleSource::Models(models) => (None, models.clone()),
        EnsembleSource::Resource(_) => return Ok(None),
    };
    if let Some(value) = &ensemble {
        match loader.resolve_inline(&ResourceRef::Json(value.clone()), ResourceType::Ensemble) {
            Some(resolved) => {
                resolved?;
            }
            None => return Ok(None),
        }
    }
    let mut parsed = Vec::with_capacity(models.len());
    for reference in &models {
        match loader.resolve_inline(reference, ResourceType::Model) {
            Some(resolved) => parsed.push(Arc::new(crate::model::Model::from_resource(&resolved?)?)),
            None => return Ok(None),
        }
    }
    Ensemble::from_models(ensemble.as_ref(), parsed).map(Some)
}

async fn assemble(
    source: EnsembleSource,
    loader: Arc<ResourceLoader>,
    progress: &Progress,
) -> Result<Ensemble> {
    let (ensemble, references) = match source {
        EnsembleSource::Resource(reference) => {
            let ensemble = loader.load(&reference, ResourceType::Ensemble).await?;
            let ids = model_ids(&ensemble)?;
            (Some(ensemble), ids.into_iter().map(ResourceRef::Reference).collect())
        }
        EnsembleSource::Models(references) => (None, references),
        EnsembleSource::Inline { ensemble, models } => {
            let ensemble = match ensemble {
                Some(value) => Some(
                    loader
                        .load(&ResourceRef::Json(value), ResourceType::Ensemble)
                        .await?,
                ),
                None => None,
            };
            (ensemble, models.into_iter().map(ResourceRef::Json).collect::<Vec<_>>())
        }
    };
    progress.total_models.store(references.len(), Ordering::SeqCst);
    progress.set_phase(EnsemblePhase::Partial);

    let mut models = Vec::with_capacity(references.len());
    for (batch, chunk) in references.chunks(loader.max_models()).enumerate() {
        let locals = chunk
            .iter()
            .cloned()
            .map(|reference| LocalModel::load(reference, Arc::clone(&loader)))
            .collect::<Result<Vec<_>>>()?;
        for local in locals {
            models.push(local.ready().await?);
            progress.ready_models.fetch_add(1, Ordering::SeqCst);
        }
        debug!(
            batch,
            loaded = models.len(),
            total = references.len(),
            "Ensemble model batch loaded"
        );
    }
    Ensemble::from_models(ensemble.as_ref(), models)
}
