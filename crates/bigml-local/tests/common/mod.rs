//! Resource fixtures shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use bigml_local::{InputData, ResourceFetcher, ResourceId};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Notify;

pub const ENSEMBLE_ID: &str = "ensemble/5143a51a37203f2cf7000100";

pub fn model_id(n: u32) -> String {
    format!("model/5143a51a37203f2cf70001{:02}", n)
}

/// Single leaf classification model voting `output`
pub fn leaf_model(n: u32, output: &str, a: u32, b: u32) -> Value {
    json!({
        "resource": model_id(n),
        "object": {
            "status": {"code": 5, "message": "The model has been created"},
            "objective_fields": ["000002"],
            "model": {
                "fields": {
                    "000000": {"name": "sepal length", "optype": "numeric"},
                    "000002": {"name": "species", "optype": "categorical",
                                "summary": {"categories": [["A", a], ["B", b]]}}
                },
                "root": {
                    "output": output, "count": a + b, "confidence": 0.4,
                    "objective_summary": {"categories": [["A", a], ["B", b]]},
                    "predicate": true
                }
            }
        }
    })
}

/// Boosted regression round scoring `output`
pub fn boosted_round(n: u32, output: f64) -> Value {
    json!({
        "resource": model_id(n),
        "object": {
            "status": {"code": 5},
            "objective_fields": ["000001"],
            "model": {
                "boosting": {"weight": 1.0, "lambda": 1.0, "iteration": n},
                "fields": {
                    "000000": {"name": "sepal length", "optype": "numeric"},
                    "000001": {"name": "price", "optype": "numeric"}
                },
                "root": {"output": output, "count": 10}
            }
        }
    })
}

pub fn ensemble(models: &[String], objective: &str) -> Value {
    json!({
        "resource": ENSEMBLE_ID,
        "object": {
            "status": {"code": 5},
            "objective_field": objective,
            "models": models
        }
    })
}

pub fn logistic_regression() -> Value {
    json!({
        "resource": "logisticregression/5143a51a37203f2cf7000180",
        "object": {
            "status": {"code": 5, "message": "done"},
            "input_fields": ["000000", "000001"],
            "objective_fields": ["000002"],
            "logistic_regression": {
                "bias": true,
                "missing_numerics": false,
                "fields": {
                    "000000": {"name": "x", "optype": "numeric",
                                "summary": {"mean": 2.0, "standard_deviation": 1.0}},
                    "000001": {"name": "color", "optype": "categorical",
                                "summary": {"categories": [["red", 3], ["blue", 2]]}},
                    "000002": {"name": "target", "optype": "categorical",
                                "summary": {"categories": [["yes", 6], ["no", 4]]}}
                },
                "coefficients": [
                    ["yes", [1.0, 0.5, -0.5, 0.0, 0.2]],
                    ["no", [-1.0, -0.5, 0.5, 0.0, -0.2]]
                ]
            }
        }
    })
}

pub fn input(value: Value) -> InputData {
    value.as_object().cloned().unwrap_or_default()
}

/// Fetcher serving fixtures, optionally held back until released
#[derive(Default)]
pub struct FixtureFetcher {
    resources: HashMap<String, Value>,
    gate: Option<Notify>,
    pub calls: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub order: Mutex<Vec<String>>,
}

impl FixtureFetcher {
    pub fn new(resources: Vec<Value>) -> Self {
        let resources = resources
            .into_iter()
            .map(|resource| (resource["resource"].as_str().unwrap_or_default().to_string(), resource))
            .collect();
        Self {
            resources,
            ..Self::default()
        }
    }

    /// Holds every fetch until [`FixtureFetcher::release`]
    pub fn gated(mut self) -> Self {
        self.gate = Some(Notify::new());
        self
    }

    pub fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.notify_waiters();
            gate.notify_one();
        }
    }
}

#[async_trait]
impl ResourceFetcher for FixtureFetcher {
    async fn fetch_finished(&self, id: &ResourceId) -> anyhow::Result<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.order.lock().unwrap().push(id.to_string());
        self.resources
            .get(&id.to_string())
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("API error (404 Not Found): {}", id))
    }
}
