use super::*;
use serde_json::json;

fn classification_resource() -> Value {
    json!({
        "resource": "model/5143a51a37203f2cf7000972",
        "object": {
            "status": {"code": 5, "message": "The model has been created"},
            "objective_fields": ["000002"],
            "model": {
                "fields": {
                    "000000": {"name": "x", "optype": "numeric"},
                    "000001": {"name": "y", "optype": "categorical",
                                "summary": {"categories": [["red", 50], ["blue", 50]]}},
                    "000002": {"name": "target", "optype": "categorical",
                                "summary": {"categories": [["A", 60], ["B", 40]]}}
                },
                "missing_tokens": ["?"],
                "importance": [["000000", 0.3], ["000001", 0.7]],
                "root": {
                    "output": "A", "count": 100, "confidence": 0.5,
                    "objective_summary": {"categories": [["A", 60], ["B", 40]]},
                    "predicate": true,
                    "children": [
                        {"output": "A", "count": 5, "confidence": 0.56551,
                         "objective_summary": {"categories": [["A", 5]]},
                         "predicate": {"operator": "<=", "field": "000000", "value": 5}},
                        {"output": "A", "count": 95, "confidence": 0.48,
                         "objective_summary": {"categories": [["A", 55], ["B", 40]]},
                         "predicate": {"operator": ">", "field": "000000", "value": 5}}
                    ]
                }
            }
        }
    })
}

fn regression_resource(missing_numerics: bool) -> Value {
    json!({
        "resource": "model/5143a51a37203f2cf7000973",
        "status": {"code": 5},
        "objective_field": "000001",
        "model": {
            "missing_numerics": missing_numerics,
            "fields": {
                "000000": {"name": "x", "optype": "numeric"},
                "000001": {"name": "price", "optype": "numeric"}
            },
            "root": {
                "output": 3.5, "count": 4, "confidence": 1.2,
                "objective_summary": {"counts": [[1, 1], [2, 1], [4, 1], [7, 1]]},
                "predicate": true,
                "children": [
                    {"output": 1.5, "count": 2, "confidence": 0.7,
                     "objective_summary": {"counts": [[1, 1], [2, 1]]},
                     "predicate": {"operator": "<=", "field": "000000", "value": 5}},
                    {"output": 5.5, "count": 2, "confidence": 2.1,
                     "objective_summary": {"counts": [[4, 1], [7, 1]]},
                     "predicate": {"operator": ">", "field": "000000", "value": 5}}
                ]
            }
        }
    })
}

fn input(value: Value) -> InputData {
    value.as_object().cloned().unwrap_or_default()
}

fn model() -> Model {
    Model::from_resource(&classification_resource()).unwrap()
}

#[test]
fn test_model_metadata() {
    let model = model();
    assert_eq!(model.resource_id(), "model/5143a51a37203f2cf7000972");
    assert_eq!(model.class_names(), &["A".to_string(), "B".to_string()]);
    assert!(!model.is_regression());
    assert!(model.boosting().is_none());
    assert_eq!(model.field_importance()[0], ("000001".to_string(), 0.7));
}

#[test]
fn test_laplace_probabilities() {
    let probabilities = model()
        .predict_probability(&input(json!({"x": 2})), MissingStrategy::LastPrediction)
        .unwrap();
    assert_eq!(
        probabilities,
        vec![CategoryScore::new("A", 0.93333), CategoryScore::new("B", 0.06667)]
    );
    let total: f64 = probabilities.iter().map(|s| s.value).sum();
    assert!((total - 1.0).abs() <= 1e-5);
}

#[test]
fn test_predict_reports_probability_of_winner() {
    let prediction = model()
        .predict(&input(json!({"x": 2})), &PredictOptions::default())
        .unwrap();
    assert_eq!(prediction.category(), Some("A"));
    assert_eq!(prediction.probability, Some(0.93333));
    assert_eq!(prediction.confidence, Some(0.56551));
    assert_eq!(prediction.path, vec!["x <= 5".to_string()]);
}

#[test]
fn test_confidences_per_class() {
    let confidences = model()
        .predict_confidence(&input(json!({"x": 2})), MissingStrategy::LastPrediction)
        .unwrap();
    assert_eq!(confidences[0], CategoryScore::new("A", 0.56551));
    assert_eq!(confidences[1], CategoryScore::new("B", 0.0));
}

#[test]
fn test_operating_point_threshold() {
    let model = model();
    let data = input(json!({"x": 2}));
    let low = PredictOptions::default()
        .with_operating_point(OperatingPoint::new(OperatingKind::Probability, 0.05, "B"));
    assert_eq!(model.predict(&data, &low).unwrap().category(), Some("B"));

    let high = PredictOptions::default()
        .with_operating_point(OperatingPoint::new(OperatingKind::Probability, 0.5, "B"));
    let prediction = model.predict(&data, &high).unwrap();
    assert_eq!(prediction.category(), Some("A"));
    assert_eq!(prediction.probability, Some(0.93333));
}

#[test]
fn test_operating_kind_confidence() {
    let options = PredictOptions::default().with_operating_kind(OperatingKind::Confidence);
    let prediction = model().predict(&input(json!({"x": 7})), &options).unwrap();
    assert_eq!(prediction.category(), Some("A"));
    assert!(prediction.confidence.is_some());
}

#[test]
fn test_votes_are_not_a_model_kind() {
    let options = PredictOptions::default().with_operating_kind(OperatingKind::Votes);
    let err = model().predict(&input(json!({"x": 7})), &options).unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));
}

#[test]
fn test_operating_options_checked_before_input() {
    let model = model();
    let bad_input = input(json!({"x": "not a number"}));
    let point = OperatingPoint::new(OperatingKind::Probability, 2.0, "B");
    let options = PredictOptions::default().with_operating_point(point.clone());
    assert!(matches!(model.predict(&bad_input, &options), Err(Error::Configuration(_))));
    assert!(matches!(
        model.predict_operating(&bad_input, MissingStrategy::LastPrediction, &point),
        Err(Error::Configuration(_))
    ));
    assert!(matches!(
        model.predict_operating_kind(&bad_input, MissingStrategy::LastPrediction, OperatingKind::Votes),
        Err(Error::Configuration(_))
    ));
    assert!(matches!(
        model.predict(&bad_input, &PredictOptions::default()),
        Err(Error::Validation(_))
    ));
}

#[test]
fn test_missing_token_stops_at_root() {
    let prediction = model()
        .predict(&input(json!({"x": "?"})), &PredictOptions::default())
        .unwrap();
    assert_eq!(prediction.count, Some(100.0));
    assert_eq!(prediction.probability, Some(0.6));
}

#[test]
fn test_unused_fields() {
    let options = PredictOptions::default().with_unused_fields();
    let prediction = model()
        .predict(&input(json!({"x": 2, "unknown": 1, "target": "A"})), &options)
        .unwrap();
    assert_eq!(
        prediction.unused_fields,
        Some(vec!["target".to_string(), "unknown".to_string()])
    );
}

#[test]
fn test_regression_median_and_errors() {
    let model = Model::from_resource(&regression_resource(true)).unwrap();
    assert!(model.is_regression());
    let data = input(json!({"x": 9}));
    let mean = model.predict(&data, &PredictOptions::default()).unwrap();
    assert_eq!(mean.value(), Some(5.5));
    let median = model.predict(&data, &PredictOptions::default().with_median()).unwrap();
    assert_eq!(median.value(), Some(5.5));
    assert!(median.probability.is_none());

    let operating = PredictOptions::default().with_operating_kind(OperatingKind::Probability);
    assert!(matches!(model.predict(&data, &operating), Err(Error::Configuration(_))));
    assert!(matches!(
        model.predict_probability(&data, MissingStrategy::LastPrediction),
        Err(Error::Unsupported(_))
    ));
}

#[test]
fn test_missing_numerics_not_allowed() {
    let model = Model::from_resource(&regression_resource(false)).unwrap();
    let err = model
        .predict(&input(json!({})), &PredictOptions::default())
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));

    let lenient = Model::from_resource(&regression_resource(true)).unwrap();
    let prediction = lenient.predict(&input(json!({})), &PredictOptions::default()).unwrap();
    assert_eq!(prediction.value(), Some(3.5));
}

#[test]
fn test_weighted_model_has_no_prior() {
    let mut resource = classification_resource();
    resource["object"]["model"]["root"]["weighted_objective_summary"] =
        json!({"categories": [["A", 120], ["B", 40]]});
    resource["object"]["model"]["root"]["children"][0]["weighted_objective_summary"] =
        json!({"categories": [["A", 10]]});
    let model = Model::from_resource(&resource).unwrap();
    assert!(model.is_weighted());
    let probabilities = model
        .predict_probability(&input(json!({"x": 1})), MissingStrategy::LastPrediction)
        .unwrap();
    assert_eq!(
        probabilities,
        vec![CategoryScore::new("A", 1.0), CategoryScore::new("B", 0.0)]
    );
}

#[test]
fn test_boosted_model_scores() {
    let resource = json!({
        "resource": "model/5143a51a37203f2cf7000974",
        "status": {"code": 5},
        "objective_fields": ["000001"],
        "model": {
            "boosting": {"objective_class": "A", "weight": 0.5, "lambda": 1.0, "iteration": 1},
            "fields": {
                "000000": {"name": "x", "optype": "numeric"},
                "000001": {"name": "target", "optype": "categorical",
                            "summary": {"categories": [["A", 1], ["B", 1]]}}
            },
            "root": {"output": 0.25, "count": 10, "g_sum": -0.5, "h_sum": 1.0}
        }
    });
    let model = Model::from_resource(&resource).unwrap();
    assert_eq!(model.boosting().map(|b| b.weight), Some(0.5));
    let prediction = model.predict(&input(json!({"x": 1})), &PredictOptions::default()).unwrap();
    assert_eq!(prediction.value(), Some(0.25));
    assert!(matches!(
        model.predict_confidence(&input(json!({})), MissingStrategy::LastPrediction),
        Err(Error::Unsupported(_))
    ));
}

#[test]
fn test_unfinished_model_fails_to_load() {
    let mut resource = classification_resource();
    resource["object"]["status"] = json!({"code": 2, "message": "started"});
    assert!(matches!(
        Model::from_resource(&resource),
        Err(LoadError::NotFinished { code: 2, .. })
    ));
}
