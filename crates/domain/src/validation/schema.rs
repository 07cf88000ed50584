use serde::{Deserialize, Serialize};

use super::constraints::Constraint;

/// Declared type of a DTO field.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Integer,
    Number,
    Boolean,
}

/// Rules for a single DTO field.
///
/// Fields are required unless marked optional. An optional field that is
/// absent or `null` skips every check.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct FieldRule {
    #[serde(rename = "type")]
    pub kind: FieldType,
    #[serde(default = "required_by_default")]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
}

fn required_by_default() -> bool {
    true
}

impl FieldRule {
    pub fn of(kind: FieldType) -> Self {
        Self {
            kind,
            required: true,
            min: None,
            max: None,
            min_length: None,
            max_length: None,
        }
    }

    pub fn string() -> Self {
        Self::of(FieldType::String)
    }

    pub fn integer() -> Self {
        Self::of(FieldType::Integer)
    }

    pub fn number() -> Self {
        Self::of(FieldType::Number)
    }

    pub fn boolean() -> Self {
        Self::of(FieldType::Boolean)
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn min(mut self, bound: f64) -> Self {
        self.min = Some(bound);
        self
    }

    pub fn max(mut self, bound: f64) -> Self {
        self.max = Some(bound);
        self
    }

    pub fn min_length(mut self, length: usize) -> Self {
        self.min_length = Some(length);
        self
    }

    pub fn max_length(mut self, length: usize) -> Self {
        self.max_length = Some(length);
        self
    }

    /// Constraints to evaluate, type check first.
    pub fn constraints(&self) -> Vec<Constraint> {
        let type_check = match self.kind {
            FieldType::String => Constraint::IsString,
            FieldType::Integer => Constraint::IsInt,
            FieldType::Number => Constraint::IsNumber,
            FieldType::Boolean => Constraint::IsBoolean,
        };

        [
            Some(type_check),
            self.min.map(Constraint::Min),
            self.max.map(Constraint::Max),
            self.min_length.map(Constraint::MinLength),
            self.max_length.map(Constraint::MaxLength),
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}

/// What to do with input keys the schema does not declare.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum UnknownFields {
    /// Pass them through untouched.
    #[default]
    Allow,
    /// Drop them from the validated object.
    Strip,
    /// Report each one as a violation.
    Deny,
}

/// Field rule set for one DTO, in declaration order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Schema {
    pub(super) fields: Vec<(String, FieldRule)>,
    pub(super) unknown: UnknownFields,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a field. Declaring the same name twice replaces the earlier rule.
    pub fn field(mut self, name: impl Into<String>, rule: FieldRule) -> Self {
        let name = name.into();
        match self.fields.iter_mut().find(|(existing, _)| *existing == name) {
            Some((_, existing)) => *existing = rule,
            None => self.fields.push((name, rule)),
        }
        self
    }

    pub fn unknown_fields(mut self, policy: UnknownFields) -> Self {
        self.unknown = policy;
        self
    }

    pub fn rule(&self, name: &str) -> Option<&FieldRule> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, rule)| rule)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldRule)> {
        self.fields.iter().map(|(name, rule)| (name.as_str(), rule))
    }
}

impl<N: Into<String>> FromIterator<(N, FieldRule)> for Schema {
    fn from_iter<I: IntoIterator<Item = (N, FieldRule)>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Schema::new(), |schema, (name, rule)| schema.field(name, rule))
    }
}
