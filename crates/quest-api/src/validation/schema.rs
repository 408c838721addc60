use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use quest_types::ids::is_object_id;

static EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern compiles"));

/// First violation found while checking a request section.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ValidationError(pub String);

/// Which part of the request a schema is evaluated against. Query and path
/// values arrive as strings and are coerced to the declared kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Body,
    Query,
    Params,
}

impl Source {
    fn coerces_strings(&self) -> bool {
        matches!(self, Self::Query | Self::Params)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    String,
    Integer,
    Number,
    Boolean,
    /// RFC 3339 timestamp or a bare `YYYY-MM-DD` date; normalized to RFC 3339.
    Date,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum Constraint {
    MinLength { value: usize },
    MaxLength { value: usize },
    Min { value: f64 },
    Max { value: f64 },
    OneOf { values: Vec<String> },
    Pattern { regex: String, message: Option<String> },
    Email,
    ObjectId,
    /// Value must equal another field of the same section.
    EqualsField { field: String, message: Option<String> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldRule {
    pub name: String,
    pub kind: FieldKind,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub allow_empty: bool,
    /// Accept a single value or a list of values; the output is always a list.
    #[serde(default)]
    pub multiple: bool,
    #[serde(default)]
    pub trim: bool,
    #[serde(default)]
    pub lowercase: bool,
    #[serde(default)]
    pub constraints: Vec<Constraint>,
}

impl FieldRule {
    fn new(name: &str, kind: FieldKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            required: false,
            allow_empty: false,
            multiple: false,
            trim: false,
            lowercase: false,
            constraints: Vec::new(),
        }
    }

    pub fn string(name: &str) -> Self {
        Self::new(name, FieldKind::String)
    }

    pub fn integer(name: &str) -> Self {
        Self::new(name, FieldKind::Integer)
    }

    pub fn number(name: &str) -> Self {
        Self::new(name, FieldKind::Number)
    }

    pub fn boolean(name: &str) -> Self {
        Self::new(name, FieldKind::Boolean)
    }

    pub fn date(name: &str) -> Self {
        Self::new(name, FieldKind::Date)
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn allow_empty(mut self) -> Self {
        self.allow_empty = true;
        self
    }

    pub fn multiple(mut self) -> Self {
        self.multiple = true;
        self
    }

    pub fn trim(mut self) -> Self {
        self.trim = true;
        self
    }

    pub fn lowercase(mut self) -> Self {
        self.lowercase = true;
        self
    }

    pub fn min_length(self, value: usize) -> Self {
        self.with(Constraint::MinLength { value })
    }

    pub fn max_length(self, value: usize) -> Self {
        self.with(Constraint::MaxLength { value })
    }

    pub fn min(self, value: f64) -> Self {
        self.with(Constraint::Min { value })
    }

    pub fn max(self, value: f64) -> Self {
        self.with(Constraint::Max { value })
    }

    pub fn one_of(self, values: &[&str]) -> Self {
        self.with(Constraint::OneOf {
            values: values.iter().map(|v| v.to_string()).collect(),
        })
    }

    pub fn pattern(self, regex: &str, message: &str) -> Self {
        self.with(Constraint::Pattern {
            regex: regex.to_string(),
            message: Some(message.to_string()),
        })
    }

    pub fn email(self) -> Self {
        self.with(Constraint::Email)
    }

    pub fn object_id(self) -> Self {
        self.with(Constraint::ObjectId)
    }

    pub fn equals_field(self, field: &str, message: &str) -> Self {
        self.with(Constraint::EqualsField {
            field: field.to_string(),
            message: Some(message.to_string()),
        })
    }

    fn with(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint);
        self
    }
}

/// Declarative description of one request section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    pub fields: Vec<FieldRule>,
    #[serde(default)]
    pub allow_unknown: bool,
    #[serde(default)]
    pub min_fields: usize,
}

impl Schema {
    pub fn new(fields: Vec<FieldRule>) -> Self {
        Self {
            fields,
            allow_unknown: false,
            min_fields: 0,
        }
    }

    /// Update form: every field optional, at least one present.
    pub fn partial(mut self) -> Self {
        for field in &mut self.fields {
            field.required = false;
        }
        self.min_fields = 1;
        self
    }

    pub fn field(mut self, rule: FieldRule) -> Self {
        self.fields.push(rule);
        self
    }
}

struct CompiledField {
    rule: FieldRule,
    /// One entry per `Constraint::Pattern`, in declaration order.
    patterns: Vec<Regex>,
}

/// A schema with its patterns compiled, ready to evaluate requests.
pub struct Validator {
    fields: Vec<CompiledField>,
    allow_unknown: bool,
    min_fields: usize,
}

impl Validator {
    pub fn compile(schema: Schema) -> Result<Self, regex::Error> {
        let fields = schema
            .fields
            .into_iter()
            .map(|rule| {
                let patterns = rule
                    .constraints
                    .iter()
                    .filter_map(|c| match c {
                        Constraint::Pattern { regex, .. } => Some(Regex::new(regex)),
                        _ => None,
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(CompiledField { rule, patterns })
            })
            .collect::<Result<Vec<_>, regex::Error>>()?;

        Ok(Self {
            fields,
            allow_unknown: schema.allow_unknown,
            min_fields: schema.min_fields,
        })
    }

    /// Check `input` and return its normalized form. Stops at the first violation.
    pub fn validate(&self, input: Value, source: Source) -> Result<Value, ValidationError> {
        let Value::Object(mut input) = input else {
            return Err(fail("\"value\" must be of type object".into()));
        };

        let mut output = Map::new();
        for field in &self.fields {
            let name = &field.rule.name;
            let Some(raw) = input.remove(name) else {
                if field.rule.required {
                    return Err(fail(format!("\"{name}\" is required")));
                }
                continue;
            };
            let value = self.check_field(field, raw, source)?;
            output.insert(name.clone(), value);
        }

        if !self.allow_unknown {
            if let Some(key) = input.keys().next() {
                return Err(fail(format!("\"{key}\" is not allowed")));
            }
        } else {
            output.extend(input);
        }

        if output.len() < self.min_fields {
            let noun = if self.min_fields == 1 { "key" } else { "keys" };
            return Err(fail(format!(
                "\"value\" must have at least {} {noun}",
                self.min_fields
            )));
        }

        self.check_references(&output)?;
        Ok(Value::Object(output))
    }

    fn check_field(
        &self,
        field: &CompiledField,
        raw: Value,
        source: Source,
    ) -> Result<Value, ValidationError> {
        if !field.rule.multiple {
            return check_scalar(field, raw, source);
        }
        let items = match raw {
            Value::Array(items) => items,
            single => vec![single],
        };
        let checked = items
            .into_iter()
            .map(|item| check_scalar(field, item, source))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Value::Array(checked))
    }

    fn check_references(&self, output: &Map<String, Value>) -> Result<(), ValidationError> {
        for field in &self.fields {
            let Some(value) = output.get(&field.rule.name) else {
                continue;
            };
            for constraint in &field.rule.constraints {
                if let Constraint::EqualsField { field: other, message } = constraint {
                    if output.get(other) != Some(value) {
                        return Err(fail(message.clone().unwrap_or_else(|| {
                            format!("\"{}\" must match \"{other}\"", field.rule.name)
                        })));
                    }
                }
            }
        }
        Ok(())
    }
}

fn fail(message: String) -> ValidationError {
    ValidationError(message)
}

fn check_scalar(field: &CompiledField, raw: Value, source: Source) -> Result<Value, ValidationError> {
    let rule = &field.rule;
    let name = &rule.name;
    let coerce = source.coerces_strings();

    let value = match rule.kind {
        FieldKind::String => {
            let Value::String(mut s) = raw else {
                return Err(fail(format!("\"{name}\" must be a string")));
            };
            if rule.trim {
                s = s.trim().to_string();
            }
            if rule.lowercase {
                s = s.to_lowercase();
            }
            if s.is_empty() {
                if rule.allow_empty {
                    return Ok(Value::String(s));
                }
                return Err(fail(format!("\"{name}\" is not allowed to be empty")));
            }
            Value::String(s)
        }
        FieldKind::Integer | FieldKind::Number => {
            let n = match &raw {
                Value::Number(n) => n.as_f64(),
                Value::String(s) if coerce => s.trim().parse::<f64>().ok(),
                _ => None,
            }
            .filter(|n| n.is_finite())
            .ok_or_else(|| fail(format!("\"{name}\" must be a number")))?;

            if rule.kind == FieldKind::Integer {
                if n.fract() != 0.0 {
                    return Err(fail(format!("\"{name}\" must be an integer")));
                }
                if n.abs() > 9_007_199_254_740_991.0 {
                    return Err(fail(format!("\"{name}\" must be a safe number")));
                }
                Value::from(n as i64)
            } else {
                Value::from(n)
            }
        }
        FieldKind::Boolean => match raw {
            Value::Bool(b) => Value::Bool(b),
            Value::String(s) if coerce && s == "true" => Value::Bool(true),
            Value::String(s) if coerce && s == "false" => Value::Bool(false),
            _ => return Err(fail(format!("\"{name}\" must be a boolean"))),
        },
        FieldKind::Date => {
            let parsed = raw.as_str().and_then(parse_date);
            let Some(ts) = parsed else {
                return Err(fail(format!("\"{name}\" must be a valid date")));
            };
            Value::String(ts.to_rfc3339_opts(SecondsFormat::Millis, true))
        }
    };

    check_constraints(field, &value)?;
    Ok(value)
}

fn check_constraints(field: &CompiledField, value: &Value) -> Result<(), ValidationError> {
    let name = &field.rule.name;
    let text = value.as_str();
    let mut patterns = field.patterns.iter();

    for constraint in &field.rule.constraints {
        match constraint {
            Constraint::MinLength { value: min } => {
                if text.is_some_and(|s| s.chars().count() < *min) {
                    return Err(fail(format!(
                        "\"{name}\" length must be at least {min} characters long"
                    )));
                }
            }
            Constraint::MaxLength { value: max } => {
                if text.is_some_and(|s| s.chars().count() > *max) {
                    return Err(fail(format!(
                        "\"{name}\" length must be less than or equal to {max} characters long"
                    )));
                }
            }
            Constraint::Min { value: min } => {
                if value.as_f64().is_some_and(|n| n < *min) {
                    return Err(fail(format!(
                        "\"{name}\" must be greater than or equal to {min}"
                    )));
                }
            }
            Constraint::Max { value: max } => {
                if value.as_f64().is_some_and(|n| n > *max) {
                    return Err(fail(format!("\"{name}\" must be less than or equal to {max}")));
                }
            }
            Constraint::OneOf { values } => {
                if !text.is_some_and(|s| values.iter().any(|v| v == s)) {
                    return Err(fail(format!(
                        "\"{name}\" must be one of [{}]",
                        values.join(", ")
                    )));
                }
            }
            Constraint::Pattern { message, .. } => {
                let Some(re) = patterns.next() else { continue };
                if !text.is_some_and(|s| re.is_match(s)) {
                    return Err(fail(message.clone().unwrap_or_else(|| {
                        format!("\"{name}\" fails to match the required pattern")
                    })));
                }
            }
            Constraint::Email => {
                if !text.is_some_and(|s| EMAIL.is_match(s)) {
                    return Err(fail(format!("\"{name}\" must be a valid email")));
                }
            }
            Constraint::ObjectId => {
                if !text.is_some_and(is_object_id) {
                    return Err(fail(format!("\"{name}\" must be a valid id")));
                }
            }
            // Checked once the whole section is known
            Constraint::EqualsField { .. } => {}
        }
    }
    Ok(())
}

fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    let day = NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()?;
    Some(day.and_hms_opt(0, 0, 0)?.and_utc())
}
