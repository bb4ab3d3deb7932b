//! Coefficient layout of a logistic regression
//!
//! Field codings and coefficient tables come in two JSON shapes each; both
//! are normalized here so scoring only sees [`FieldCoding`] and flat
//! coefficient vectors.

use crate::error::LoadError;
use crate::fields::{Fields, Optype};
use serde_json::Value;
use std::collections::HashMap;

/// How an expandable field maps onto its coefficients
#[derive(Debug, Clone, PartialEq)]
pub enum FieldCoding {
    /// One coefficient per category plus a missing slot (dummy coding)
    OneHot,
    /// One coefficient per matrix row; each row holds one contribution per
    /// category and a trailing missing contribution
    Matrix(Vec<Vec<f64>>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SlotKind {
    Numeric,
    Categorical,
    Text,
    Items,
}

/// Run of coefficients owned by one input field
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Slot {
    pub field_id: String,
    pub kind: SlotKind,
    pub shift: usize,
    pub length: usize,
    /// Categories, tag cloud terms or items, in summary order
    pub terms: Vec<String>,
    pub coding: FieldCoding,
}

/// Lays out the coefficient runs of every input field in `order`.
///
/// Returns the slots and the number of coefficients they take, bias excluded.
pub(crate) fn layout(
    fields: &Fields,
    order: &[String],
    codings: &HashMap<String, FieldCoding>,
    missing_numerics: bool,
) -> (Vec<Slot>, usize) {
    let mut slots = Vec::new();
    let mut shift = 0;
    for field_id in order {
        if Some(field_id.as_str()) == fields.objective_id() {
            continue;
        }
        let Some(field) = fields.get(field_id) else {
            continue;
        };
        let (kind, terms) = match field.optype {
            Optype::Numeric => (SlotKind::Numeric, Vec::new()),
            Optype::Categorical => (SlotKind::Categorical, names(&field.summary.categories)),
            Optype::Text => (SlotKind::Text, names(&field.summary.tag_cloud)),
            Optype::Items => (SlotKind::Items, names(&field.summary.items)),
            Optype::Datetime | Optype::Other => continue,
        };
        let coding = match kind {
            SlotKind::Categorical => codings.get(field_id).cloned().unwrap_or(FieldCoding::OneHot),
            _ => FieldCoding::OneHot,
        };
        let length = match (&kind, &coding) {
            (SlotKind::Numeric, _) => {
                if missing_numerics {
                    2
                } else {
                    1
                }
            }
            (_, FieldCoding::Matrix(rows)) => rows.len(),
            (_, FieldCoding::OneHot) => terms.len() + 1,
        };
        slots.push(Slot {
            field_id: field_id.clone(),
            kind,
            shift,
            length,
            terms,
            coding,
        });
        shift += length;
    }
    (slots, shift)
}

fn names(counts: &[(String, f64)]) -> Vec<String> {
    counts.iter().map(|(name, _)| name.clone()).collect()
}

/// Parses `field_codings` in either accepted shape.
///
/// List shape: `[{"field": id, "coding": "dummy", "dummy_class": c}, ...]`
/// or `{"field": id, "coding": "contrast", "coefficients": [[..], ..]}`.
/// Map shape: `{id: {"dummy": c}}` or `{id: {"contrast": [[..], ..]}}`.
/// Fields may be given by name.
pub(crate) fn parse_field_codings(
    value: Option<&Value>,
    fields: &Fields,
) -> Result<HashMap<String, FieldCoding>, LoadError> {
    let mut codings = HashMap::new();
    let mut insert = |key: &str, coding: &str, payload: Option<&Value>| -> Result<(), LoadError> {
        let id = fields
            .resolve(key)
            .ok_or_else(|| LoadError::Malformed(format!("field coding for unknown field {}", key)))?;
        let parsed = if coding == "dummy" {
            FieldCoding::OneHot
        } else {
            FieldCoding::Matrix(matrix(payload).ok_or_else(|| {
                LoadError::Malformed(format!("{} coding of field {} needs a matrix", coding, key))
            })?)
        };
        codings.insert(id.to_string(), parsed);
        Ok(())
    };
    match value {
        None | Some(Value::Null) => {}
        Some(Value::Array(entries)) => {
            for entry in entries {
                let key = entry
                    .get("field")
                    .and_then(Value::as_str)
                    .ok_or_else(|| LoadError::MissingKey("field_codings.field".to_string()))?;
                let coding = entry.get("coding").and_then(Value::as_str).unwrap_or("dummy");
                insert(key, coding, entry.get("coefficients"))?;
            }
        }
        Some(Value::Object(map)) => {
            for (key, spec) in map {
                let Some((coding, payload)) = spec.as_object().and_then(|m| m.iter().next()) else {
                    return Err(LoadError::Malformed(format!(
                        "field coding of {} must be a single entry object",
                        key
                    )));
                };
                insert(key.as_str(), coding.as_str(), Some(payload))?;
            }
        }
        Some(other) => {
            return Err(LoadError::Malformed(format!(
                "field_codings must be a list or an object, got {}",
                other
            )))
        }
    }
    Ok(codings)
}

fn matrix(value: Option<&Value>) -> Option<Vec<Vec<f64>>> {
    value?
        .as_array()?
        .iter()
        .map(|row| row.as_array()?.iter().map(Value::as_f64).collect())
        .collect()
}

/// Parses `[[class, coefficients], ...]`, flattening per field nested runs
pub(crate) fn parse_coefficients(value: Option<&Value>) -> Result<Vec<(String, Vec<f64>)>, LoadError> {
    let entries = value
        .and_then(Value::as_array)
        .ok_or_else(|| LoadError::MissingKey("logistic_regression.coefficients".to_string()))?;
    entries
        .iter()
        .map(|entry| match entry.as_array().map(Vec::as_slice) {
            Some([class, coefficients]) => {
                let class = match class {
                    Value::String(name) => name.clone(),
                    other => other.to_string(),
                };
                let mut flat = Vec::new();
                flatten(coefficients, &mut flat)?;
                Ok((class, flat))
            }
            _ => Err(LoadError::Malformed(format!(
                "coefficients entry must be [class, values], got {}",
                entry
            ))),
        })
        .collect()
}

fn flatten(value: &Value, out: &mut Vec<f64>) -> Result<(), LoadError> {
    match value {
        Value::Number(number) => {
            out.push(number.as_f64().unwrap_or_default());
            Ok(())
        }
        Value::Array(items) => items.iter().try_for_each(|item| flatten(item, out)),
        other => Err(LoadError::Malformed(format!("non numeric coefficient {}", other))),
    }
}
