//! Split predicates of tree nodes

use crate::error::LoadError;
use crate::fields::{FieldValue, Fields, Optype, ValidatedInput};
use crate::util::{count_item_matches, count_term_matches};
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;

/// Comparison operators found in node predicates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Lt,
    Le,
    Eq,
    Ne,
    Ge,
    Gt,
    In,
}

impl Operator {
    fn parse(symbol: &str) -> Option<Self> {
        Some(match symbol {
            "<" => Operator::Lt,
            "<=" => Operator::Le,
            "=" => Operator::Eq,
            "!=" | "/=" => Operator::Ne,
            ">=" => Operator::Ge,
            ">" => Operator::Gt,
            "in" => Operator::In,
            _ => return None,
        })
    }

    fn holds(self, ordering: Ordering) -> bool {
        match self {
            Operator::Lt => ordering == Ordering::Less,
            Operator::Le => ordering != Ordering::Greater,
            Operator::Eq => ordering == Ordering::Equal,
            Operator::Ne => ordering != Ordering::Equal,
            Operator::Ge => ordering != Ordering::Less,
            Operator::Gt => ordering == Ordering::Greater,
            Operator::In => false,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Eq => "=",
            Operator::Ne => "!=",
            Operator::Ge => ">=",
            Operator::Gt => ">",
            Operator::In => "in",
        })
    }
}

/// Condition guarding the entry to a node
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// The root predicate, always satisfied
    True,
    Split {
        operator: Operator,
        /// Missing values follow this branch (`*` suffixed operators)
        missing: bool,
        field: String,
        value: Value,
        /// Text or items term counted instead of comparing the value
        term: Option<String>,
    },
}

impl Predicate {
    pub fn from_value(value: &Value) -> Result<Self, LoadError> {
        let malformed = || LoadError::Malformed(format!("bad predicate {}", value));
        match value {
            Value::Bool(true) | Value::Null => Ok(Predicate::True),
            Value::Object(map) => {
                let symbol = map
                    .get("operator")
                    .and_then(Value::as_str)
                    .ok_or_else(malformed)?;
                let (symbol, missing) = match symbol.strip_suffix('*') {
                    Some(stripped) => (stripped, true),
                    None => (symbol, false),
                };
                let operator = Operator::parse(symbol).ok_or_else(malformed)?;
                let field = map
                    .get("field")
                    .and_then(Value::as_str)
                    .ok_or_else(malformed)?
                    .to_string();
                Ok(Predicate::Split {
                    operator,
                    missing,
                    field,
                    value: map.get("value").cloned().unwrap_or(Value::Null),
                    term: map.get("term").and_then(Value::as_str).map(str::to_string),
                })
            }
            _ => Err(malformed()),
        }
    }

    /// Field tested by the predicate
    pub fn field(&self) -> Option<&str> {
        match self {
            Predicate::True => None,
            Predicate::Split { field, .. } => Some(field),
        }
    }

    /// True when `input` satisfies the predicate
    pub fn apply(&self, input: &ValidatedInput, fields: &Fields) -> bool {
        let Predicate::Split {
            operator,
            missing,
            field,
            value,
            term,
        } = self
        else {
            return true;
        };
        let Some(input_value) = input.get(field) else {
            return *missing || (*operator == Operator::Eq && value.is_null());
        };
        if value.is_null() {
            return *operator == Operator::Ne;
        }
        if let Some(term) = term {
            let count = term_count(fields, field, term, input_value) as f64;
            return value
                .as_f64()
                .and_then(|threshold| count.partial_cmp(&threshold))
                .is_some_and(|ordering| operator.holds(ordering));
        }
        if *operator == Operator::In {
            return value
                .as_array()
                .is_some_and(|options| options.iter().any(|option| same_value(input_value, option)));
        }
        compare(input_value, value).is_some_and(|ordering| operator.holds(ordering))
    }

    /// Human readable rule, using field names
    pub fn to_rule(&self, fields: &Fields) -> String {
        let Predicate::Split {
            operator,
            missing,
            field,
            value,
            term,
        } = self
        else {
            return "TRUE".to_string();
        };
        let name = fields.name(field);
        if value.is_null() {
            return match operator {
                Operator::Eq => format!("{} is missing", name),
                _ => format!("{} is not missing", name),
            };
        }
        let rendered = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        let rule = match term {
            Some(term) => {
                let times = value.as_f64().unwrap_or(0.0);
                match (operator, times) {
                    (Operator::Gt, t) if t == 0.0 => format!("{} contains {}", name, term),
                    (Operator::Eq | Operator::Le, t) if t == 0.0 => {
                        format!("{} does not contain {}", name, term)
                    }
                    _ => format!("{} contains {} {} {} times", name, term, operator, rendered),
                }
            }
            None => format!("{} {} {}", name, operator, rendered),
        };
        if *missing {
            format!("{} or missing", rule)
        } else {
            rule
        }
    }
}

fn term_count(fields: &Fields, field_id: &str, term: &str, input: &FieldValue) -> usize {
    let Some(text) = input.as_str() else {
        return 0;
    };
    let Some(field) = fields.get(field_id) else {
        return 0;
    };
    match field.optype {
        Optype::Items => count_item_matches(text, term, field.item_analysis.separator()),
        _ => {
            let mut forms = vec![term.to_string()];
            if let Some(alternates) = field.summary.term_forms.get(term) {
                forms.extend(alternates.iter().cloned());
            }
            count_term_matches(
                text,
                &forms,
                field.term_analysis.token_mode.unwrap_or_default(),
                field.term_analysis.case_sensitive.unwrap_or(false),
            )
        }
    }
}

fn compare(input: &FieldValue, value: &Value) -> Option<Ordering> {
    match (input, value) {
        (FieldValue::Number(x), Value::Number(y)) => y.as_f64().and_then(|y| x.partial_cmp(&y)),
        (FieldValue::Text(x), Value::String(y)) => Some(x.as_str().cmp(y.as_str())),
        (FieldValue::Text(x), Value::Number(y)) => Some(x.as_str().cmp(y.to_string().as_str())),
        _ => None,
    }
}

fn same_value(input: &FieldValue, option: &Value) -> bool {
    compare(input, option) == Some(Ordering::Equal)
}
