use std::collections::BTreeMap;

use derive_new::new;
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

/// Single field-level check.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Constraint {
    IsString,
    IsInt,
    IsNumber,
    IsBoolean,
    Min(f64),
    Max(f64),
    MinLength(usize),
    MaxLength(usize),
}

/// Name reported for keys the schema does not allow.
pub const WHITELIST: &str = "whitelistValidation";

impl Constraint {
    pub fn name(&self) -> &'static str {
        match self {
            Constraint::IsString => "isString",
            Constraint::IsInt => "isInt",
            Constraint::IsNumber => "isNumber",
            Constraint::IsBoolean => "isBoolean",
            Constraint::Min(_) => "min",
            Constraint::Max(_) => "max",
            Constraint::MinLength(_) => "minLength",
            Constraint::MaxLength(_) => "maxLength",
        }
    }

    /// Whether `value` satisfies the constraint. An absent value never does.
    pub fn holds(&self, value: Option<&Value>) -> bool {
        match (self, value) {
            (Constraint::IsString, Some(Value::String(_))) => true,
            (Constraint::IsInt, Some(Value::Number(n))) => is_integral(n),
            (Constraint::IsNumber, Some(Value::Number(_))) => true,
            (Constraint::IsBoolean, Some(Value::Bool(_))) => true,
            (Constraint::Min(bound), Some(Value::Number(n))) => {
                n.as_f64().is_some_and(|v| v >= *bound)
            }
            (Constraint::Max(bound), Some(Value::Number(n))) => {
                n.as_f64().is_some_and(|v| v <= *bound)
            }
            (Constraint::MinLength(len), Some(Value::String(s))) => s.chars().count() >= *len,
            (Constraint::MaxLength(len), Some(Value::String(s))) => s.chars().count() <= *len,
            _ => false,
        }
    }

    pub fn message(&self, property: &str) -> String {
        match self {
            Constraint::IsString => format!("{property} must be a string"),
            Constraint::IsInt => format!("{property} must be an integer number"),
            Constraint::IsNumber => {
                format!("{property} must be a number conforming to the specified constraints")
            }
            Constraint::IsBoolean => format!("{property} must be a boolean value"),
            Constraint::Min(bound) => format!("{property} must not be less than {bound}"),
            Constraint::Max(bound) => format!("{property} must not be greater than {bound}"),
            Constraint::MinLength(len) => {
                format!("{property} must be longer than or equal to {len} characters")
            }
            Constraint::MaxLength(len) => {
                format!("{property} must be shorter than or equal to {len} characters")
            }
        }
    }
}

fn is_integral(n: &Number) -> bool {
    n.is_i64() || n.is_u64() || n.as_f64().is_some_and(|v| v.fract() == 0.0)
}

/// Failed constraints of one property, keyed by constraint name.
#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq, new)]
pub struct Violation {
    #[new(into)]
    pub property: String,
    pub constraints: BTreeMap<String, String>,
}

impl Violation {
    pub fn unknown_property(property: &str) -> Self {
        let constraints = BTreeMap::from([(
            WHITELIST.to_string(),
            format!("property {property} should not exist"),
        )]);
        Self::new(property, constraints)
    }

    pub fn failed(&self, constraint: &str) -> bool {
        self.constraints.contains_key(constraint)
    }
}
