//! Operating point and operating kind selection
//!
//! Shared by models, ensembles and logistic regressions: each computes the
//! per-class scores for the requested kind and lets these helpers pick the
//! predicted class.

use crate::error::{Error, Result};
use crate::prediction::{CategoryScore, OperatingKind, OperatingPoint, Prediction, PredictionValue};

/// Rejects operating points the predictor cannot honour
pub(crate) fn check_operating_point(
    point: &OperatingPoint,
    allowed: &[OperatingKind],
    class_names: &[String],
) -> Result<()> {
    check_operating_kind(point.kind, allowed)?;
    if !(0.0..=1.0).contains(&point.threshold) {
        return Err(Error::configuration(format!(
            "operating point threshold must be in [0, 1], got {}",
            point.threshold
        )));
    }
    if !class_names.iter().any(|name| name == &point.positive_class) {
        return Err(Error::configuration(format!(
            "unknown positive class \"{}\", expected one of {:?}",
            point.positive_class, class_names
        )));
    }
    Ok(())
}

pub(crate) fn check_operating_kind(kind: OperatingKind, allowed: &[OperatingKind]) -> Result<()> {
    if allowed.contains(&kind) {
        Ok(())
    } else {
        Err(Error::configuration(format!(
            "operating kind \"{}\" is not allowed here, expected one of {:?}",
            kind,
            allowed.iter().map(|k| k.as_str()).collect::<Vec<_>>()
        )))
    }
}

/// Picks the positive class when its score beats the threshold, otherwise
/// the best scoring other class.
pub(crate) fn select_by_point(scores: &[CategoryScore], point: &OperatingPoint) -> Result<Prediction> {
    let positive = scores
        .iter()
        .find(|score| score.category == point.positive_class)
        .ok_or_else(|| {
            Error::configuration(format!("unknown positive class \"{}\"", point.positive_class))
        })?;
    if positive.value > point.threshold {
        return Ok(scored_prediction(positive, point.kind));
    }
    let mut ranked: Vec<&CategoryScore> = scores.iter().collect();
    ranked.sort_by(|a, b| {
        b.value
            .total_cmp(&a.value)
            .then_with(|| a.category.cmp(&b.category))
    });
    let chosen = ranked
        .into_iter()
        .find(|score| score.category != point.positive_class)
        .unwrap_or(positive);
    Ok(scored_prediction(chosen, point.kind))
}

/// Arg-max of `scores`, ties going to the earliest class
pub(crate) fn select_by_kind(scores: &[CategoryScore], kind: OperatingKind) -> Result<Prediction> {
    let mut best: Option<&CategoryScore> = None;
    for score in scores {
        if best.map_or(true, |b| score.value > b.value) {
            best = Some(score);
        }
    }
    best.map(|score| scored_prediction(score, kind))
        .ok_or_else(|| Error::configuration("no class scores to select from"))
}

fn scored_prediction(score: &CategoryScore, kind: OperatingKind) -> Prediction {
    let mut prediction = Prediction::new(PredictionValue::Category(score.category.clone()));
    match kind {
        OperatingKind::Probability => prediction.probability = Some(score.value),
        OperatingKind::Confidence => prediction.confidence = Some(score.value),
        OperatingKind::Votes => prediction.votes = Some(score.value),
    }
    prediction
}
