use super::*;
use crate::fields::FieldValue;
use serde_json::json;

fn fields() -> Fields {
    Fields::from_value(
        &json!({
            "000000": {"name": "x", "optype": "numeric"},
            "000001": {"name": "y", "optype": "categorical",
                        "summary": {"categories": [["red", 40], ["blue", 60]]}},
            "000002": {"name": "target", "optype": "categorical"}
        }),
        Some("000002".to_string()),
    )
    .unwrap()
}

fn classification_tree() -> Tree {
    Tree::from_value(
        &json!({
            "output": "A", "count": 100, "confidence": 0.5,
            "objective_summary": {"categories": [["A", 60], ["B", 40]]},
            "predicate": true,
            "children": [
                {"output": "A", "count": 55, "confidence": 0.8,
                 "objective_summary": {"categories": [["A", 50], ["B", 5]]},
                 "predicate": {"operator": "<=", "field": "000000", "value": 5},
                 "children": [
                    {"output": "A", "count": 30, "confidence": 0.9,
                     "objective_summary": {"categories": [["A", 30]]},
                     "predicate": {"operator": "=", "field": "000001", "value": "red"}},
                    {"output": "A", "count": 25, "confidence": 0.6,
                     "objective_summary": {"categories": [["A", 20], ["B", 5]]},
                     "predicate": {"operator": "!=", "field": "000001", "value": "red"}}
                 ]},
                {"output": "B", "count": 45, "confidence": 0.6,
                 "objective_summary": {"categories": [["A", 10], ["B", 35]]},
                 "predicate": {"operator": ">", "field": "000000", "value": 5}}
            ]
        }),
        false,
        false,
    )
    .unwrap()
}

fn regression_tree() -> Tree {
    Tree::from_value(
        &json!({
            "output": 3.0, "count": 4, "confidence": 2.5,
            "objective_summary": {"counts": [[1, 1], [2, 1], [4, 1], [5, 1]]},
            "predicate": true,
            "children": [
                {"output": 1.5, "count": 2, "confidence": 1.0,
                 "objective_summary": {"counts": [[1, 1], [2, 1]]},
                 "predicate": {"operator": "<=", "field": "000000", "value": 5}},
                {"output": 4.5, "count": 2, "confidence": 1.0,
                 "objective_summary": {"counts": [[4, 1], [5, 1]]},
                 "predicate": {"operator": ">", "field": "000000", "value": 5}}
            ]
        }),
        true,
        false,
    )
    .unwrap()
}

fn input(pairs: Vec<(&str, FieldValue)>) -> ValidatedInput {
    ValidatedInput::from_pairs(pairs)
}

#[test]
fn test_full_path_to_leaf() {
    let prediction = classification_tree().predict(
        &input(vec![
            ("000000", FieldValue::Number(3.0)),
            ("000001", FieldValue::Text("red".to_string())),
        ]),
        &fields(),
        MissingStrategy::LastPrediction,
    );
    assert_eq!(prediction.category(), Some("A"));
    assert_eq!(prediction.path, vec!["x <= 5".to_string(), "y = red".to_string()]);
    assert_eq!(prediction.count, Some(30.0));
    assert_eq!(prediction.confidence, Some(0.9));
    assert!(prediction.next.is_none());
}

#[test]
fn test_last_prediction_stops_at_missing_split() {
    let prediction = classification_tree().predict(
        &ValidatedInput::default(),
        &fields(),
        MissingStrategy::LastPrediction,
    );
    assert_eq!(prediction.category(), Some("A"));
    assert_eq!(prediction.count, Some(100.0));
    assert!(prediction.path.is_empty());
    assert_eq!(prediction.next.as_deref(), Some("x"));
}

#[test]
fn test_proportional_merges_every_branch() {
    let prediction = classification_tree().predict(
        &ValidatedInput::default(),
        &fields(),
        MissingStrategy::Proportional,
    );
    assert_eq!(prediction.category(), Some("A"));
    assert_eq!(prediction.count, Some(100.0));
    assert_eq!(
        prediction.distribution,
        vec![
            (PredictionValue::from("A"), 60.0),
            (PredictionValue::from("B"), 40.0)
        ]
    );
    let expected = ws_confidence(
        &"A".to_string(),
        &[("A".to_string(), 60.0), ("B".to_string(), 40.0)],
        Some(100.0),
        DEFAULT_Z,
    );
    assert_eq!(prediction.confidence, Some(dec_round(expected, PRECISION)));
}

#[test]
fn test_proportional_follows_decided_splits() {
    let prediction = classification_tree().predict(
        &input(vec![("000000", FieldValue::Number(3.0))]),
        &fields(),
        MissingStrategy::Proportional,
    );
    assert_eq!(prediction.path, vec!["x <= 5".to_string()]);
    assert_eq!(prediction.count, Some(55.0));
    assert_eq!(prediction.next.as_deref(), Some("y"));
}

#[test]
fn test_strategies_agree_on_a_single_branch() {
    let tree = classification_tree();
    let data = input(vec![
        ("000000", FieldValue::Number(8.0)),
        ("000001", FieldValue::Text("blue".to_string())),
    ]);
    let last = tree.predict(&data, &fields(), MissingStrategy::LastPrediction);
    let proportional = tree.predict(&data, &fields(), MissingStrategy::Proportional);
    assert_eq!(last, proportional);
    assert_eq!(last.category(), Some("B"));
}

#[test]
fn test_proportional_regression() {
    let prediction = regression_tree().predict(
        &ValidatedInput::default(),
        &fields(),
        MissingStrategy::Proportional,
    );
    assert_eq!(prediction.value(), Some(3.0));
    assert_eq!(prediction.median, Some(3.0));
    assert_eq!(prediction.count, Some(4.0));
    assert!(prediction.confidence.is_some());
}

#[test]
fn test_regression_leaf() {
    let prediction = regression_tree().predict(
        &input(vec![("000000", FieldValue::Number(7.0))]),
        &fields(),
        MissingStrategy::LastPrediction,
    );
    assert_eq!(prediction.value(), Some(4.5));
    assert_eq!(prediction.median, Some(4.5));
}

#[test]
fn test_proportional_with_empty_distributions_falls_back() {
    let tree = Tree::from_value(
        &json!({
            "output": "A", "count": 0, "predicate": true,
            "children": [
                {"output": "A", "count": 0, "predicate": {"operator": "<", "field": "000000", "value": 1}},
                {"output": "B", "count": 0, "predicate": {"operator": ">=", "field": "000000", "value": 1}}
            ]
        }),
        false,
        false,
    )
    .unwrap();
    let prediction = tree.predict(&ValidatedInput::default(), &fields(), MissingStrategy::Proportional);
    assert_eq!(prediction.category(), Some("A"));
    assert_eq!(prediction.count, Some(0.0));
}
