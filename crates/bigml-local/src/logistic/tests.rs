use super::*;
use serde_json::json;

fn resource(coefficients: Value, extra: Value) -> Value {
    let mut lr = json!({
        "bias": true,
        "c": 1,
        "eps": 1e-05,
        "normalize": false,
        "balance_fields": false,
        "regularization": "l2",
        "missing_numerics": false,
        "fields": {
            "000000": {"name": "x", "optype": "numeric",
                        "summary": {"mean": 2.0, "standard_deviation": 1.0}},
            "000001": {"name": "color", "optype": "categorical",
                        "summary": {"categories": [["red", 3], ["blue", 2]]}},
            "000002": {"name": "target", "optype": "categorical",
                        "summary": {"categories": [["yes", 6], ["no", 4]]}}
        },
        "coefficients": coefficients
    });
    if let (Some(lr), Some(extra)) = (lr.as_object_mut(), extra.as_object()) {
        for (key, value) in extra {
            lr.insert(key.clone(), value.clone());
        }
    }
    json!({
        "resource": "logisticregression/5143a51a37203f2cf7000980",
        "object": {
            "status": {"code": 5, "message": "done"},
            "input_fields": ["000000", "000001"],
            "objective_fields": ["000002"],
            "logistic_regression": lr
        }
    })
}

fn one_hot() -> LogisticRegression {
    LogisticRegression::from_resource(&resource(
        json!([["yes", [1.0, 0.5, -0.5, 0.0, 0.2]], ["no", [-1.0, -0.5, 0.5, 0.0, -0.2]]]),
        json!({}),
    ))
    .unwrap()
}

fn input(value: Value) -> InputData {
    value.as_object().cloned().unwrap_or_default()
}

#[test]
fn test_metadata() {
    let lr = one_hot();
    assert_eq!(lr.resource_id(), "logisticregression/5143a51a37203f2cf7000980");
    assert_eq!(lr.class_names(), &["no".to_string(), "yes".to_string()]);
    assert_eq!(lr.objective_id(), "000002");
    assert_eq!(lr.c(), Some(1.0));
    assert_eq!(lr.regularization(), Some("l2"));
}

#[test]
fn test_one_hot_prediction() {
    let prediction = one_hot()
        .predict(&input(json!({"x": 1, "color": "red"})), &PredictOptions::default())
        .unwrap();
    assert_eq!(prediction.category(), Some("yes"));
    assert_eq!(prediction.probability, Some(0.84553));
    assert_eq!(
        prediction.distribution,
        vec![
            (PredictionValue::from("yes"), 0.84553),
            (PredictionValue::from("no"), 0.15447)
        ]
    );
}

#[test]
fn test_missing_category_uses_missing_slot() {
    let probabilities = one_hot()
        .predict_probability(&input(json!({"x": 1})))
        .unwrap();
    assert_eq!(
        probabilities,
        vec![CategoryScore::new("no", 0.23148), CategoryScore::new("yes", 0.76852)]
    );
}

#[test]
fn test_missing_numeric_is_rejected() {
    let err = one_hot()
        .predict(&input(json!({"color": "red"})), &PredictOptions::default())
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
}

#[test]
fn test_balanced_fields() {
    let lr = LogisticRegression::from_resource(&resource(
        json!([["yes", [1.0, 0.5, -0.5, 0.0, 0.2]], ["no", [-1.0, -0.5, 0.5, 0.0, -0.2]]]),
        json!({"balance_fields": true}),
    ))
    .unwrap();
    let prediction = lr
        .predict(&input(json!({"x": 3, "color": "red"})), &PredictOptions::default())
        .unwrap();
    assert_eq!(prediction.probability, Some(0.84553));
}

#[test]
fn test_normalized_scores_shrink() {
    let lr = LogisticRegression::from_resource(&resource(
        json!([["yes", [1.0, 0.5, -0.5, 0.0, 0.2]], ["no", [-1.0, -0.5, 0.5, 0.0, -0.2]]]),
        json!({"normalize": true}),
    ))
    .unwrap();
    let prediction = lr
        .predict(&input(json!({"x": 1, "color": "red"})), &PredictOptions::default())
        .unwrap();
    let probability = prediction.probability.unwrap();
    assert!(probability > 0.5 && probability < 0.84553);
    let total: f64 = prediction.distribution.iter().map(|(_, p)| p).sum();
    assert!((total - 1.0).abs() <= 1e-5);
}

#[test]
fn test_contrast_coding() {
    let lr = LogisticRegression::from_resource(&resource(
        json!([["yes", [1.0, 0.5, 0.2, 0.1]], ["no", [-1.0, -0.5, -0.2, -0.1]]]),
        json!({"field_codings": [
            {"field": "000001", "coding": "contrast", "coefficients": [[1, -1, 0], [0.5, 0.5, 0]]}
        ]}),
    ))
    .unwrap();
    let prediction = lr
        .predict(&input(json!({"x": 1, "color": "red"})), &PredictOptions::default())
        .unwrap();
    assert_eq!(prediction.category(), Some("yes"));
    assert_eq!(prediction.probability, Some(0.84553));
}

#[test]
fn test_nested_coefficients() {
    let lr = LogisticRegression::from_resource(&resource(
        json!([["yes", [[1.0], [0.5, -0.5, 0.0], [0.2]]], ["no", [[-1.0], [-0.5, 0.5, 0.0], [-0.2]]]]),
        json!({}),
    ))
    .unwrap();
    let prediction = lr
        .predict(&input(json!({"x": 1, "color": "red"})), &PredictOptions::default())
        .unwrap();
    assert_eq!(prediction.probability, Some(0.84553));
}

#[test]
fn test_ties_keep_training_order() {
    let lr = LogisticRegression::from_resource(&resource(
        json!([["yes", [0.0, 0.0, 0.0, 0.0, 0.0]], ["no", [0.0, 0.0, 0.0, 0.0, 0.0]]]),
        json!({}),
    ))
    .unwrap();
    let prediction = lr
        .predict(&input(json!({"x": 1})), &PredictOptions::default())
        .unwrap();
    assert_eq!(prediction.category(), Some("yes"));
    assert_eq!(prediction.probability, Some(0.5));
}

#[test]
fn test_operating_points() {
    let lr = one_hot();
    let data = input(json!({"x": 1, "color": "red"}));
    let point = OperatingPoint::new(OperatingKind::Probability, 0.1, "no");
    assert_eq!(lr.predict_operating(&data, &point).unwrap().category(), Some("no"));

    let strict = OperatingPoint::new(OperatingKind::Probability, 0.9, "no");
    assert_eq!(lr.predict_operating(&data, &strict).unwrap().category(), Some("yes"));

    let confidence = OperatingPoint::new(OperatingKind::Confidence, 0.1, "no");
    assert!(matches!(
        lr.predict_operating(&data, &confidence),
        Err(Error::Configuration(_))
    ));
}

#[test]
fn test_operating_options_checked_before_input() {
    let lr = one_hot();
    let bad_input = input(json!({"x": "not a number", "color": "red"}));
    let point = OperatingPoint::new(OperatingKind::Probability, 2.0, "no");
    assert!(matches!(
        lr.predict_operating(&bad_input, &point),
        Err(Error::Configuration(_))
    ));
    let votes = PredictOptions::default().with_operating_kind(OperatingKind::Votes);
    assert!(matches!(lr.predict(&bad_input, &votes), Err(Error::Configuration(_))));
    assert!(matches!(
        lr.predict(&bad_input, &PredictOptions::default()),
        Err(Error::Validation(_))
    ));
}

#[test]
fn test_unused_fields_are_reported() {
    let options = PredictOptions::default().with_unused_fields();
    let prediction = one_hot()
        .predict(&input(json!({"x": 1, "color": "green", "extra": 3})), &options)
        .unwrap();
    assert_eq!(prediction.unused_fields, Some(vec!["extra".to_string()]));
}

#[test]
fn test_short_coefficients_fail_to_load() {
    let err = LogisticRegression::from_resource(&resource(
        json!([["yes", [1.0, 0.2]], ["no", [-1.0, -0.2]]]),
        json!({}),
    ))
    .unwrap_err();
    assert!(matches!(err, LoadError::Malformed(_)));
}

#[test]
fn test_unique_text_terms() {
    let fields = Fields::from_value(
        &json!({
            "000000": {"name": "review", "optype": "text",
                        "term_analysis": {"case_sensitive": false, "token_mode": "tokens_only"},
                        "summary": {"tag_cloud": [["good", 3], ["bad", 2]],
                                    "term_forms": {"good": ["goods"]}}},
            "000001": {"name": "basket", "optype": "items",
                        "item_analysis": {"separator": ";"},
                        "summary": {"items": [["milk", 3], ["eggs", 2]]}}
        }),
        None,
    )
    .unwrap();
    let (slots, _) = layout(
        &fields,
        &["000000".to_string(), "000001".to_string()],
        &HashMap::new(),
        false,
    );
    let review = fields.get("000000").unwrap();
    let terms = unique_terms(
        &slots[0],
        review,
        &FieldValue::Text("Good goods, bad movie".to_string()),
    );
    assert_eq!(terms, vec![("good".to_string(), 2.0), ("bad".to_string(), 1.0)]);

    let basket = fields.get("000001").unwrap();
    let items = unique_terms(&slots[1], basket, &FieldValue::Text("milk;bread;milk".to_string()));
    assert_eq!(items, vec![("milk".to_string(), 2.0)]);
}

fn review_field(term_analysis: Value) -> (Fields, Vec<Slot>) {
    let fields = Fields::from_value(
        &json!({
            "000000": {"name": "review", "optype": "text",
                        "term_analysis": term_analysis,
                        "summary": {"tag_cloud": [["good", 3], ["good movie", 2]]}}
        }),
        None,
    )
    .unwrap();
    let (slots, _) = layout(&fields, &["000000".to_string()], &HashMap::new(), false);
    (fields, slots)
}

#[test]
fn test_single_word_text_counted_once() {
    let (fields, slots) = review_field(json!({"case_sensitive": false, "token_mode": "all"}));
    let review = fields.get("000000").unwrap();
    let terms = unique_terms(&slots[0], review, &FieldValue::Text("good".to_string()));
    assert_eq!(terms, vec![("good".to_string(), 1.0)]);

    let terms = unique_terms(&slots[0], review, &FieldValue::Text("Good movie".to_string()));
    assert_eq!(
        terms,
        vec![("good".to_string(), 1.0), ("good movie".to_string(), 1.0)]
    );
}

#[test]
fn test_full_terms_only_keeps_whole_text() {
    let (fields, slots) =
        review_field(json!({"case_sensitive": false, "token_mode": "full_terms_only"}));
    let review = fields.get("000000").unwrap();
    let terms = unique_terms(&slots[0], review, &FieldValue::Text("good".to_string()));
    assert_eq!(terms, vec![("good".to_string(), 1.0)]);
}

#[test]
fn test_missing_token_mode_counts_tokens_and_full_terms() {
    let (fields, slots) = review_field(json!({"case_sensitive": false}));
    let review = fields.get("000000").unwrap();
    assert_eq!(review.term_analysis.token_mode.unwrap_or_default(), TokenMode::All);
    let terms = unique_terms(&slots[0], review, &FieldValue::Text("Good movie".to_string()));
    assert_eq!(
        terms,
        vec![("good".to_string(), 1.0), ("good movie".to_string(), 1.0)]
    );
}
