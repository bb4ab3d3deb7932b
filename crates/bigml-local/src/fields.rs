//! Field metadata and input data validation
//!
//! Every predictor validates raw input against its fields before scoring:
//! keys are resolved by id or name, values are cast to the field optype and
//! keys the model does not use are reported as unused.

use crate::error::{Error, LoadError, Result};
use crate::util::{dec_round, TokenMode, PRECISION};
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

/// Raw input data, keyed by field id or field name
pub type InputData = serde_json::Map<String, Value>;

/// Field optypes understood by local predictors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Optype {
    Numeric,
    Categorical,
    Text,
    Items,
    Datetime,
    #[serde(other)]
    Other,
}

/// Optype-specific summary computed at training time
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FieldSummary {
    #[serde(default, deserialize_with = "named_counts")]
    pub categories: Vec<(String, f64)>,
    #[serde(default, deserialize_with = "named_counts")]
    pub tag_cloud: Vec<(String, f64)>,
    #[serde(default)]
    pub term_forms: BTreeMap<String, Vec<String>>,
    #[serde(default, deserialize_with = "named_counts")]
    pub items: Vec<(String, f64)>,
    #[serde(default)]
    pub mean: Option<f64>,
    #[serde(default)]
    pub standard_deviation: Option<f64>,
    #[serde(default)]
    pub missing_count: f64,
}

/// Tokenization options of a text field
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TermAnalysis {
    #[serde(default)]
    pub case_sensitive: Option<bool>,
    #[serde(default)]
    pub token_mode: Option<TokenMode>,
}

/// Separator options of an items field
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ItemAnalysis {
    #[serde(default)]
    pub separator: Option<String>,
    #[serde(default)]
    pub separator_regexp: Option<String>,
}

impl ItemAnalysis {
    /// Literal separator between items, a blank by default
    pub fn separator(&self) -> &str {
        self.separator_regexp
            .as_deref()
            .or(self.separator.as_deref())
            .unwrap_or(" ")
    }
}

/// Description of one input or objective column
#[derive(Debug, Clone, Deserialize)]
pub struct Field {
    #[serde(skip)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub optype: Optype,
    #[serde(default)]
    pub summary: FieldSummary,
    #[serde(default)]
    pub term_analysis: TermAnalysis,
    #[serde(default)]
    pub item_analysis: ItemAnalysis,
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default)]
    pub suffix: Option<String>,
    #[serde(default)]
    pub datatype: Option<String>,
    #[serde(default)]
    pub parent_optype: Option<String>,
    #[serde(default)]
    pub parent_ids: Vec<String>,
}

impl Field {
    /// Category names in summary order
    pub fn category_names(&self) -> Vec<String> {
        self.summary
            .categories
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }

    fn is_datetime_component(&self) -> bool {
        self.parent_optype.as_deref() == Some("datetime") && !self.parent_ids.is_empty()
    }
}

/// A validated, type-cast input value
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Number(f64),
    Text(String),
}

impl FieldValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            FieldValue::Text(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            FieldValue::Number(_) => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Number(n) => write!(f, "{}", n),
            FieldValue::Text(s) => f.write_str(s),
        }
    }
}

/// Input data after validation, keyed by field id.
///
/// Never mutated by predictors; consumers keep their own bookkeeping.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidatedInput {
    values: BTreeMap<String, FieldValue>,
    unused: Vec<String>,
}

impl ValidatedInput {
    pub fn get(&self, field_id: &str) -> Option<&FieldValue> {
        self.values.get(field_id)
    }

    pub fn contains(&self, field_id: &str) -> bool {
        self.values.contains_key(field_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldValue)> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Input keys the model does not use, sorted
    pub fn unused_fields(&self) -> &[String] {
        &self.unused
    }

    #[cfg(test)]
    pub(crate) fn from_pairs(pairs: Vec<(&str, FieldValue)>) -> Self {
        Self {
            values: pairs
                .into_iter()
                .map(|(id, value)| (id.to_string(), value))
                .collect(),
            unused: Vec::new(),
        }
    }
}

/// Field map of a model plus the bookkeeping validation needs
#[derive(Debug, Clone, Default)]
pub struct Fields {
    fields: BTreeMap<String, Field>,
    names: HashMap<String, String>,
    objective_id: Option<String>,
    inputs: BTreeSet<String>,
    missing_tokens: Vec<String>,
    weight_field: Option<String>,
}

impl Fields {
    /// Parses a `{field_id: field}` JSON map.
    ///
    /// Every non-objective field is accepted as input until narrowed with
    /// [`Fields::with_inputs`].
    pub fn from_value(fields: &Value, objective_id: Option<String>) -> std::result::Result<Self, LoadError> {
        let map = fields
            .as_object()
            .ok_or_else(|| LoadError::Malformed("fields must be an object".to_string()))?;
        let mut parsed = BTreeMap::new();
        for (id, raw) in map {
            let mut field: Field = serde_json::from_value(raw.clone()).map_err(|e| {
                LoadError::Malformed(format!("field {}: {}", id, e))
            })?;
            field.id = id.clone();
            if field.name.is_empty() {
                field.name = id.clone();
            }
            parsed.insert(id.clone(), field);
        }
        let mut names = HashMap::new();
        for (id, field) in &parsed {
            names.entry(field.name.clone()).or_insert_with(|| id.clone());
        }
        let inputs = parsed
            .keys()
            .filter(|id| Some(*id) != objective_id.as_ref())
            .cloned()
            .collect();
        Ok(Self {
            fields: parsed,
            names,
            objective_id,
            inputs,
            missing_tokens: Vec::new(),
            weight_field: None,
        })
    }

    /// Restricts the accepted input fields to `ids`
    pub fn with_inputs<I>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let objective = self.objective_id.clone();
        self.inputs = ids
            .into_iter()
            .filter(|id| Some(id) != objective.as_ref() && self.fields.contains_key(id))
            .collect();
        self
    }

    /// Strings that stand for a missing value
    pub fn with_missing_tokens(mut self, tokens: Vec<String>) -> Self {
        self.missing_tokens = tokens;
        self
    }

    /// Field whose values are accepted and ignored
    pub fn with_weight_field(mut self, field_id: Option<String>) -> Self {
        self.weight_field = field_id;
        self
    }

    /// Adds fields not yet known, keeping existing entries
    pub fn merge(&mut self, other: &Fields) {
        for (id, field) in &other.fields {
            if !self.fields.contains_key(id) {
                self.names
                    .entry(field.name.clone())
                    .or_insert_with(|| id.clone());
                self.fields.insert(id.clone(), field.clone());
            }
        }
        for id in &other.inputs {
            if Some(id) != self.objective_id.as_ref() {
                self.inputs.insert(id.clone());
            }
        }
    }

    pub fn get(&self, field_id: &str) -> Option<&Field> {
        self.fields.get(field_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Field)> {
        self.fields.iter()
    }

    /// Ids accepted as model inputs
    pub fn input_ids(&self) -> impl Iterator<Item = &String> {
        self.inputs.iter()
    }

    pub fn objective_id(&self) -> Option<&str> {
        self.objective_id.as_deref()
    }

    pub fn objective(&self) -> Option<&Field> {
        self.objective_id.as_deref().and_then(|id| self.fields.get(id))
    }

    /// Display name of a field, falling back to its id
    pub fn name<'a>(&'a self, field_id: &'a str) -> &'a str {
        self.fields
            .get(field_id)
            .map(|f| f.name.as_str())
            .unwrap_or(field_id)
    }

    /// Resolves an input key given as field id or field name
    pub fn resolve(&self, key: &str) -> Option<&str> {
        if let Some((id, _)) = self.fields.get_key_value(key) {
            return Some(id.as_str());
        }
        self.names.get(key).map(String::as_str)
    }

    /// Validates and casts raw input data.
    ///
    /// Null values are dropped. Keys that are unknown, belong to the objective
    /// or are not model inputs are reported through
    /// [`ValidatedInput::unused_fields`].
    pub fn validate(&self, input: &InputData) -> Result<ValidatedInput> {
        let mut validated = ValidatedInput::default();
        for (key, value) in input {
            if value.is_null() {
                continue;
            }
            let Some(id) = self.resolve(key) else {
                validated.unused.push(key.clone());
                continue;
            };
            if self.weight_field.as_deref() == Some(id) {
                continue;
            }
            let Some(field) = self.fields.get(id) else {
                validated.unused.push(key.clone());
                continue;
            };
            if self.is_missing_token(value) {
                continue;
            }
            if field.optype == Optype::Datetime && !self.inputs.contains(id) {
                let expanded = self.expand_datetime(field, value, &mut validated.values)?;
                if !expanded {
                    validated.unused.push(key.clone());
                }
                continue;
            }
            if !self.inputs.contains(id) {
                validated.unused.push(key.clone());
                continue;
            }
            if let Some(cast) = cast(field, value)? {
                validated.values.insert(id.to_string(), cast);
            }
        }
        validated.unused.sort();
        validated.unused.dedup();
        Ok(validated)
    }

    fn is_missing_token(&self, value: &Value) -> bool {
        value
            .as_str()
            .is_some_and(|s| self.missing_tokens.iter().any(|token| token == s))
    }

    fn expand_datetime(
        &self,
        parent: &Field,
        value: &Value,
        values: &mut BTreeMap<String, FieldValue>,
    ) -> Result<bool> {
        let components: Vec<&Field> = self
            .fields
            .values()
            .filter(|f| {
                f.is_datetime_component()
                    && f.parent_ids.iter().any(|p| p == &parent.id)
                    && self.inputs.contains(&f.id)
            })
            .collect();
        if components.is_empty() {
            return Ok(false);
        }
        let text = value.as_str().ok_or_else(|| {
            Error::validation(format!(
                "datetime field \"{}\" expects a string, got {}",
                parent.name, value
            ))
        })?;
        let moment = parse_datetime(text).ok_or_else(|| {
            Error::validation(format!(
                "failed to parse \"{}\" as a datetime for field \"{}\"",
                text, parent.name
            ))
        })?;
        for component in components {
            if let Some(number) = component
                .datatype
                .as_deref()
                .and_then(|kind| datetime_component(&moment, kind))
            {
                values.insert(component.id.clone(), FieldValue::Number(number));
            }
        }
        Ok(true)
    }
}

/// Casts a raw JSON value to the type of `field`.
///
/// Numeric strings lose the field prefix and suffix and are rounded to the
/// crate precision. Returns `Ok(None)` for empty numeric strings.
pub fn cast(field: &Field, value: &Value) -> Result<Option<FieldValue>> {
    let mismatch = || {
        Error::validation(format!(
            "mismatch input data type in field \"{}\" for value {}",
            field.name, value
        ))
    };
    match (field.optype, value) {
        (Optype::Numeric, Value::Number(n)) => n.as_f64().map(FieldValue::Number).map(Some).ok_or_else(mismatch),
        (Optype::Numeric, Value::String(s)) => {
            let stripped = strip_affixes(s, field);
            if stripped.is_empty() {
                return Ok(None);
            }
            stripped
                .parse::<f64>()
                .map(|n| Some(FieldValue::Number(dec_round(n, PRECISION))))
                .map_err(|_| mismatch())
        }
        (Optype::Numeric, _) => Err(mismatch()),
        (_, Value::String(s)) => Ok(Some(FieldValue::Text(s.clone()))),
        (_, Value::Number(n)) => Ok(Some(FieldValue::Text(n.to_string()))),
        (Optype::Categorical, Value::Bool(flag)) => {
            let categories = &field.summary.categories;
            if categories.len() != 2 {
                return Err(Error::validation(format!(
                    "boolean value for field \"{}\" requires exactly two categories, found {}",
                    field.name,
                    categories.len()
                )));
            }
            let wanted = if *flag { "true" } else { "false" };
            let category = categories
                .iter()
                .map(|(name, _)| name)
                .find(|name| name.to_lowercase() == wanted)
                .cloned()
                .unwrap_or_else(|| wanted.to_string());
            Ok(Some(FieldValue::Text(category)))
        }
        _ => Err(mismatch()),
    }
}

fn strip_affixes<'a>(value: &'a str, field: &Field) -> &'a str {
    let mut value = value.trim();
    if let Some(prefix) = field.prefix.as_deref().filter(|p| !p.is_empty()) {
        value = value.strip_prefix(prefix).unwrap_or(value);
    }
    if let Some(suffix) = field.suffix.as_deref().filter(|s| !s.is_empty()) {
        value = value.strip_suffix(suffix).unwrap_or(value);
    }
    value.trim()
}

fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    const DATETIME_FORMATS: &[&str] = &[
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
        "%Y/%m/%d %H:%M:%S",
    ];
    const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"];

    let text = text.trim();
    if let Ok(moment) = DateTime::parse_from_rfc3339(text) {
        return Some(moment.naive_utc());
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|format| NaiveDate::parse_from_str(text, format).ok())
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}

fn datetime_component(moment: &NaiveDateTime, kind: &str) -> Option<f64> {
    let value = match kind {
        "year" => moment.year() as f64,
        "month" => moment.month() as f64,
        "day-of-month" => moment.day() as f64,
        "day-of-week" => moment.weekday().number_from_monday() as f64,
        "hour" => moment.hour() as f64,
        "minute" => moment.minute() as f64,
        "second" => moment.second() as f64,
        "millisecond" => (moment.nanosecond() / 1_000_000) as f64,
        _ => return None,
    };
    Some(value)
}

fn value_to_name(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// summary pairs like [["Iris-setosa", 50], ...], names may be numbers
fn named_counts<'de, D>(deserializer: D) -> std::result::Result<Vec<(String, f64)>, D::Error>
where
    D: Deserializer<'de>,
{
    let pairs: Vec<(Value, f64)> = Vec::deserialize(deserializer)?;
    Ok(pairs
        .into_iter()
        .map(|(name, count)| (value_to_name(&name), count))
        .collect())
}
