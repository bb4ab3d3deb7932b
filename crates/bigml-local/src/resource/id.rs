//! Resource id parsing

use crate::error::LoadError;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Known resource type tags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceType {
    Source,
    Dataset,
    Model,
    Ensemble,
    Prediction,
    BatchPrediction,
    Evaluation,
    Anomaly,
    AnomalyScore,
    BatchAnomalyScore,
    Cluster,
    Centroid,
    BatchCentroid,
    Sample,
    Correlation,
    StatisticalTest,
    LogisticRegression,
    LinearRegression,
    Association,
    AssociationSet,
    TopicModel,
    TopicDistribution,
    BatchTopicDistribution,
    TimeSeries,
    Forecast,
    Deepnet,
    Fusion,
    Optiml,
    Pca,
    Projection,
    BatchProjection,
    Project,
    Script,
    Execution,
    Library,
    Configuration,
    ExternalConnector,
}

const RESOURCE_TYPES: &[(ResourceType, &str)] = &[
    (ResourceType::Source, "source"),
    (ResourceType::Dataset, "dataset"),
    (ResourceType::Model, "model"),
    (ResourceType::Ensemble, "ensemble"),
    (ResourceType::Prediction, "prediction"),
    (ResourceType::BatchPrediction, "batchprediction"),
    (ResourceType::Evaluation, "evaluation"),
    (ResourceType::Anomaly, "anomaly"),
    (ResourceType::AnomalyScore, "anomalyscore"),
    (ResourceType::BatchAnomalyScore, "batchanomalyscore"),
    (ResourceType::Cluster, "cluster"),
    (ResourceType::Centroid, "centroid"),
    (ResourceType::BatchCentroid, "batchcentroid"),
    (ResourceType::Sample, "sample"),
    (ResourceType::Correlation, "correlation"),
    (ResourceType::StatisticalTest, "statisticaltest"),
    (ResourceType::LogisticRegression, "logisticregression"),
    (ResourceType::LinearRegression, "linearregression"),
    (ResourceType::Association, "association"),
    (ResourceType::AssociationSet, "associationset"),
    (ResourceType::TopicModel, "topicmodel"),
    (ResourceType::TopicDistribution, "topicdistribution"),
    (ResourceType::BatchTopicDistribution, "batchtopicdistribution"),
    (ResourceType::TimeSeries, "timeseries"),
    (ResourceType::Forecast, "forecast"),
    (ResourceType::Deepnet, "deepnet"),
    (ResourceType::Fusion, "fusion"),
    (ResourceType::Optiml, "optiml"),
    (ResourceType::Pca, "pca"),
    (ResourceType::Projection, "projection"),
    (ResourceType::BatchProjection, "batchprojection"),
    (ResourceType::Project, "project"),
    (ResourceType::Script, "script"),
    (ResourceType::Execution, "execution"),
    (ResourceType::Library, "library"),
    (ResourceType::Configuration, "configuration"),
    (ResourceType::ExternalConnector, "externalconnector"),
];

impl ResourceType {
    pub fn as_str(self) -> &'static str {
        RESOURCE_TYPES
            .iter()
            .find(|(kind, _)| *kind == self)
            .map(|(_, tag)| *tag)
            .unwrap_or("unknown")
    }

    /// Top-level key holding the structure of a locally usable resource
    pub fn structure_key(self) -> &'static str {
        match self {
            ResourceType::LogisticRegression => "logistic_regression",
            ResourceType::Ensemble => "models",
            other => other.as_str(),
        }
    }
}

impl FromStr for ResourceType {
    type Err = LoadError;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        RESOURCE_TYPES
            .iter()
            .find(|(_, name)| *name == tag)
            .map(|(kind, _)| *kind)
            .ok_or_else(|| LoadError::InvalidId(tag.to_string()))
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parsed `type/id` or `shared/type/id` reference
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceId {
    pub kind: ResourceType,
    pub id: String,
    pub shared: bool,
}

impl ResourceId {
    /// Parses a resource id, validating its type tag and id pattern.
    pub fn parse(reference: &str) -> Result<Self, LoadError> {
        let invalid = || LoadError::InvalidId(reference.to_string());
        let parts: Vec<&str> = reference.trim().split('/').collect();
        let (shared, tag, id) = match parts.as_slice() {
            ["shared", tag, id] => (true, *tag, *id),
            [tag, id] => (false, *tag, *id),
            _ => return Err(invalid()),
        };
        let kind = tag.parse::<ResourceType>().map_err(|_| invalid())?;
        let valid = if shared {
            (24..=30).contains(&id.len()) && id.chars().all(|c| c.is_ascii_alphanumeric())
        } else {
            id.len() == 24 && id.chars().all(|c| c.is_ascii_hexdigit())
        };
        if !valid {
            return Err(invalid());
        }
        Ok(Self {
            kind,
            id: id.to_string(),
            shared,
        })
    }

    /// Extracts the id of a resource given as a JSON string or resource object
    pub fn from_value(value: &Value) -> Result<Self, LoadError> {
        match value {
            Value::String(reference) => Self::parse(reference),
            Value::Object(map) => map
                .get("resource")
                .and_then(Value::as_str)
                .ok_or_else(|| LoadError::InvalidId(value.to_string()))
                .and_then(Self::parse),
            other => Err(LoadError::InvalidId(other.to_string())),
        }
    }

    /// File name used in local storage directories
    pub fn storage_name(&self) -> String {
        self.to_string().replace('/', "_")
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.shared {
            write!(f, "shared/{}/{}", self.kind, self.id)
        } else {
            write!(f, "{}/{}", self.kind, self.id)
        }
    }
}

impl FromStr for ResourceId {
    type Err = LoadError;

    fn from_str(reference: &str) -> Result<Self, Self::Err> {
        Self::parse(reference)
    }
}
