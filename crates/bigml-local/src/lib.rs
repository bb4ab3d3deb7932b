//! Local predictions for BigML resources
//!
//! This crate provides:
//! - Decision tree and boosted tree models
//! - Ensembles combined by voting or boosting
//! - Logistic regressions
//! - Resource loading from JSON, files, storage, caches and the remote API
//! - Readiness tracking with queued predictions

pub mod client;
pub mod config;
pub mod ensemble;
pub mod error;
pub mod fields;
pub mod loader;
pub mod local;
pub mod logistic;
pub mod model;
pub mod multivote;
pub mod observability;
pub mod prediction;
pub mod predictor;
pub mod resource;
pub mod tree;
pub mod util;

pub use client::ApiClient;
pub use config::ClientConfig;
pub use ensemble::{Ensemble, EnsemblePhase, EnsembleSource, LocalEnsemble};
pub use error::{Error, LoadError, Result};
pub use fields::{Field, Fields, InputData, Optype};
pub use loader::{MemoryCache, Readiness, ResourceCache, ResourceFetcher, ResourceLoader, ResourceRef};
pub use local::{Local, LocalLogisticRegression, LocalModel};
pub use logistic::{FieldCoding, LogisticRegression};
pub use model::{Boosting, Model};
pub use multivote::{MultiVote, MultiVoteList};
pub use observability::LocalMetrics;
pub use prediction::{
    CategoryScore, CombinerMethod, MissingStrategy, OperatingKind, OperatingPoint, PredictOptions,
    Prediction, PredictionValue, ThresholdOptions,
};
pub use predictor::{FromResource, Predictor};
pub use resource::{ResourceId, ResourceType, Status, StatusCode};
