//! Declarative request DTO validation.
//!
//! A [`Schema`] describes the fields of one DTO. Validating raw request data
//! against it coerces each declared field to its type, then evaluates every
//! constraint and reports all failures at once.

use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Type coercion of raw values
pub mod coerce;

/// Field-level checks and their reports
pub mod constraints;

/// Field rules and DTO schemas
pub mod schema;

pub use constraints::{Constraint, Violation};
pub use schema::{FieldRule, FieldType, Schema, UnknownFields};

/// Part of an inbound request a schema applies to.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ValidationSource {
    #[default]
    Query,
    Body,
}

impl fmt::Display for ValidationSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationSource::Query => f.write_str("query"),
            ValidationSource::Body => f.write_str("body"),
        }
    }
}

impl Schema {
    /// Coerces and checks `input`.
    ///
    /// On success returns the coerced object; otherwise every violation, in
    /// declaration order followed by rejected unknown keys.
    pub fn validate(
        &self,
        mut input: Map<String, Value>,
    ) -> Result<Map<String, Value>, Vec<Violation>> {
        let mut output = Map::new();
        let mut violations = Vec::new();

        for (name, rule) in &self.fields {
            let value = input
                .remove(name)
                .map(|raw| coerce::coerce(rule.kind, raw));

            if let Some(violation) = check_field(name, rule, value.as_ref()) {
                violations.push(violation);
            }
            if let Some(value) = value {
                output.insert(name.clone(), value);
            }
        }

        match self.unknown {
            UnknownFields::Allow => output.extend(input),
            UnknownFields::Strip => {}
            UnknownFields::Deny => {
                violations.extend(input.keys().map(|key| Violation::unknown_property(key)))
            }
        }

        if violations.is_empty() {
            Ok(output)
        } else {
            Err(violations)
        }
    }
}

fn check_field(name: &str, rule: &FieldRule, value: Option<&Value>) -> Option<Violation> {
    let present = value.filter(|v| !v.is_null());
    if present.is_none() && !rule.required {
        return None;
    }

    let failed: BTreeMap<String, String> = rule
        .constraints()
        .into_iter()
        .filter(|constraint| !constraint.holds(present))
        .map(|constraint| (constraint.name().to_string(), constraint.message(name)))
        .collect();

    (!failed.is_empty()).then(|| Violation::new(name, failed))
}

/// Builds a raw source object from decoded `key=value` pairs.
///
/// Every value stays a string; a repeated key collects its values into an
/// array in arrival order.
pub fn object_from_pairs<I>(pairs: I) -> Map<String, Value>
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut object = Map::new();
    for (key, value) in pairs {
        match object.get_mut(&key) {
            Some(Value::Array(values)) => values.push(Value::String(value)),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, Value::String(value)]);
            }
            None => {
                object.insert(key, Value::String(value));
            }
        }
    }
    object
}
