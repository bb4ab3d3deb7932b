use super::*;
use crate::prediction::OperatingPoint;
use serde_json::json;

fn stump(id: u32, output: &str, a: u32, b: u32) -> Value {
    json!({
        "resource": format!("model/5143a51a37203f2cf70009{:02}", id),
        "status": {"code": 5},
        "objective_fields": ["000002"],
        "model": {
            "fields": {
                "000000": {"name": "x", "optype": "numeric"},
                "000002": {"name": "target", "optype": "categorical",
                            "summary": {"categories": [["A", a], ["B", b]]}}
            },
            "importance": [["000000", 1.0]],
            "root": {
                "output": output, "count": a + b, "confidence": 0.4,
                "objective_summary": {"categories": [["A", a], ["B", b]]},
                "predicate": true
            }
        }
    })
}

fn boosted_regression(id: u32, output: f64) -> Value {
    json!({
        "resource": format!("model/5143a51a37203f2cf70008{:02}", id),
        "status": {"code": 5},
        "objective_fields": ["000001"],
        "model": {
            "boosting": {"weight": 1.0, "lambda": 1.0, "iteration": id},
            "fields": {
                "000000": {"name": "x", "optype": "numeric"},
                "000001": {"name": "price", "optype": "numeric"}
            },
            "root": {"output": output, "count": 10}
        }
    })
}

fn voting() -> Ensemble {
    Ensemble::from_resources(
        None,
        &[stump(1, "A", 3, 1), stump(2, "B", 1, 3), stump(3, "A", 3, 1)],
    )
    .unwrap()
}

fn input(value: Value) -> InputData {
    value.as_object().cloned().unwrap_or_default()
}

#[test]
fn test_unanimous_plurality() {
    let ensemble = Ensemble::from_resources(
        None,
        &[stump(1, "A", 3, 1), stump(2, "A", 3, 1), stump(3, "A", 3, 1)],
    )
    .unwrap();
    let prediction = ensemble
        .predict(&input(json!({"x": 1})), &PredictOptions::default())
        .unwrap();
    assert_eq!(prediction.category(), Some("A"));
    assert_eq!(prediction.probability, Some(1.0));
    assert_eq!(prediction.votes, Some(1.0));
}

#[test]
fn test_majority_vote() {
    let ensemble = voting();
    assert_eq!(ensemble.class_names(), ["A", "B"]);
    assert!(!ensemble.is_boosted());
    assert_eq!(ensemble.resource_id(), "");
    let prediction = ensemble.predict(&input(json!({})), &PredictOptions::default()).unwrap();
    assert_eq!(prediction.category(), Some("A"));
    assert_eq!(prediction.probability, Some(0.66667));
}

#[test]
fn test_probability_votes_and_confidence() {
    let ensemble = voting();
    let strategy = MissingStrategy::LastPrediction;
    assert_eq!(
        ensemble.predict_probability(&input(json!({})), strategy).unwrap(),
        vec![CategoryScore::new("A", 0.58333), CategoryScore::new("B", 0.41667)]
    );
    assert_eq!(
        ensemble.predict_votes(&input(json!({})), strategy).unwrap(),
        vec![CategoryScore::new("A", 0.66667), CategoryScore::new("B", 0.33333)]
    );
    let confidences = ensemble.predict_confidence(&input(json!({})), strategy).unwrap();
    assert_eq!(confidences.len(), 2);
    assert!(confidences[0].value > confidences[1].value);
}

#[test]
fn test_operating_kind_and_point() {
    let ensemble = voting();
    let options = PredictOptions::default().with_operating_kind(OperatingKind::Probability);
    let prediction = ensemble.predict(&input(json!({})), &options).unwrap();
    assert_eq!(prediction.category(), Some("A"));

    let point = OperatingPoint::new(OperatingKind::Votes, 0.5, "B");
    let options = PredictOptions::default().with_operating_point(point);
    let prediction = ensemble.predict(&input(json!({})), &options).unwrap();
    assert_eq!(prediction.category(), Some("A"));

    let point = OperatingPoint::new(OperatingKind::Votes, 0.3, "B");
    let options = PredictOptions::default().with_operating_point(point);
    let prediction = ensemble.predict(&input(json!({})), &options).unwrap();
    assert_eq!(prediction.category(), Some("B"));
}

#[test]
fn test_unused_fields_common_to_every_model() {
    let ensemble = voting();
    let options = PredictOptions::default().with_unused_fields();
    let prediction = ensemble
        .predict(&input(json!({"x": 1, "color": "red"})), &options)
        .unwrap();
    assert_eq!(prediction.unused_fields, Some(vec!["color".to_string()]));
}

#[test]
fn test_boosted_regression_sums_rounds() {
    let ensemble = Ensemble::from_resources(
        None,
        &[
            boosted_regression(1, 0.2),
            boosted_regression(2, -0.1),
            boosted_regression(3, 0.3),
        ],
    )
    .unwrap();
    assert!(ensemble.is_boosted());
    let prediction = ensemble.predict(&input(json!({})), &PredictOptions::default()).unwrap();
    assert!((prediction.value().unwrap() - 0.4).abs() < 1e-12);
}

#[test]
fn test_boosted_offset_from_resource() {
    let resource = json!({
        "resource": "ensemble/5143a51a37203f2cf7000001",
        "status": {"code": 5},
        "objective_field": "000001",
        "initial_offset": 1.0,
        "models": ["model/5143a51a37203f2cf7000801"]
    });
    let ensemble =
        Ensemble::from_resources(Some(&resource), &[boosted_regression(1, 0.5)]).unwrap();
    assert_eq!(ensemble.resource_id(), "ensemble/5143a51a37203f2cf7000001");
    let prediction = ensemble.predict(&input(json!({})), &PredictOptions::default()).unwrap();
    assert!((prediction.value().unwrap() - 1.5).abs() < 1e-12);
}

#[test]
fn test_boosted_ensembles_reject_votes() {
    let ensemble =
        Ensemble::from_resources(None, &[boosted_regression(1, 0.2), boosted_regression(2, 0.1)])
            .unwrap();
    let strategy = MissingStrategy::LastPrediction;
    assert!(matches!(
        ensemble.predict_votes(&input(json!({})), strategy),
        Err(Error::Unsupported(_))
    ));
    assert!(matches!(
        ensemble.predict_confidence(&input(json!({})), strategy),
        Err(Error::Unsupported(_))
    ));
    let options = PredictOptions::default().with_operating_kind(OperatingKind::Probability);
    assert!(matches!(
        ensemble.predict(&input(json!({})), &options),
        Err(Error::Configuration(_))
    ));
}

#[test]
fn test_mixed_boosting_is_unsupported() {
    let mut regression = stump(1, "A", 3, 1);
    regression["model"]["boosting"] = json!({"objective_class": "A", "weight": 1.0});
    regression["model"]["root"] = json!({"output": 0.3, "count": 4});
    let err = Ensemble::from_resources(None, &[regression, stump(2, "A", 3, 1)]).unwrap_err();
    assert!(matches!(err, Error::Unsupported(_)));
}

#[test]
fn test_different_objectives_are_rejected() {
    let mut other = stump(2, "A", 3, 1);
    other["objective_fields"] = json!(["000000"]);
    other["model"]["fields"]["000000"]["optype"] = json!("categorical");
    other["model"]["fields"]["000000"]["summary"] = json!({"categories": [["A", 1]]});
    let err = Ensemble::from_resources(None, &[stump(1, "A", 3, 1), other]).unwrap_err();
    assert!(matches!(err, Error::Load(LoadError::Malformed(_))));
}

#[test]
fn test_empty_model_list() {
    let err = Ensemble::from_models(None, Vec::new()).unwrap_err();
    assert_eq!(err, Error::Load(LoadError::MissingKey("models".to_string())));
}

#[test]
fn test_model_ids_and_offsets() {
    let resource = json!({
        "status": {"code": 5},
        "models": ["model/1", {"resource": "model/2"}]
    });
    assert_eq!(model_ids(&resource).unwrap(), vec!["model/1", "model/2"]);
    assert_eq!(
        class_offsets(Some(&json!([["A", 0.5], ["B", -0.5]]))),
        vec![("A".to_string(), 0.5), ("B".to_string(), -0.5)]
    );
    assert_eq!(
        class_offsets(Some(&json!({"A": 0.25}))),
        vec![("A".to_string(), 0.25)]
    );
}

#[test]
fn test_importance_is_averaged() {
    assert_eq!(voting().field_importance(), [("000000".to_string(), 1.0)]);
}
