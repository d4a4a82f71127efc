//! Declarative payload validation.
//!
//! Each inbound event kind has a static table of [`FieldRule`]s. One generic
//! checker walks a payload against the table and collects every violation as
//! a human-readable message; it never stops at the first problem.

use std::collections::HashSet;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::room::{MAX_ID_LEN, MAX_PAWNS_PER_PLAYER, MAX_PLAYER_NAME_LEN};

/// The event kinds accepted from clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Join,
    Move,
    Capture,
}

impl EventKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::Join => "join",
            Self::Move => "move",
            Self::Capture => "capture",
        }
    }

    /// Constraint table for this event's payload.
    pub fn schema(self) -> &'static [FieldRule] {
        match self {
            Self::Join => JOIN_SCHEMA,
            Self::Move => MOVE_SCHEMA,
            Self::Capture => CAPTURE_SCHEMA,
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
}

impl FieldKind {
    fn describe(self) -> &'static str {
        match self {
            Self::String => "a string",
            Self::Integer => "an integer",
            Self::Number => "a number",
            Self::Boolean => "a boolean",
            Self::Array => "an array",
            Self::Object => "an object",
        }
    }

    fn matches(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Array => value.is_array(),
            Self::Object => value.is_object(),
        }
    }
}

/// One constraint row: a named field, its type and its bounds.
///
/// `min_len`/`max_len` count characters for strings and items for arrays.
/// `min`/`max` apply to numbers. `properties` describes the fields of an
/// object, `items` the fields of each object inside an array.
#[derive(Debug, Clone, Copy)]
pub struct FieldRule {
    pub name: &'static str,
    pub kind: FieldKind,
    pub required: bool,
    pub min_len: Option<usize>,
    pub max_len: Option<usize>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub identifier: bool,
    pub properties: &'static [FieldRule],
    pub items: &'static [FieldRule],
    pub unique_by: Option<&'static str>,
}

impl FieldRule {
    pub const fn new(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            required: false,
            min_len: None,
            max_len: None,
            min: None,
            max: None,
            identifier: false,
            properties: &[],
            items: &[],
            unique_by: None,
        }
    }

    pub const fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub const fn length(mut self, min: usize, max: usize) -> Self {
        self.min_len = Some(min);
        self.max_len = Some(max);
        self
    }

    pub const fn range(mut self, min: f64, max: f64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }

    pub const fn at_least(mut self, min: f64) -> Self {
        self.min = Some(min);
        self
    }

    /// Restrict a string to `[A-Za-z0-9_-]`.
    pub const fn identifier(mut self) -> Self {
        self.identifier = true;
        self
    }

    pub const fn properties(mut self, properties: &'static [FieldRule]) -> Self {
        self.properties = properties;
        self
    }

    pub const fn items(mut self, items: &'static [FieldRule]) -> Self {
        self.items = items;
        self
    }

    pub const fn unique_by(mut self, field: &'static str) -> Self {
        self.unique_by = Some(field);
        self
    }
}

const fn id_field(name: &'static str) -> FieldRule {
    FieldRule::new(name, FieldKind::String)
        .required()
        .length(1, MAX_ID_LEN)
}

const PAWN_REF_SCHEMA: &[FieldRule] = &[id_field("playerId"), id_field("pawnId")];

const PAWN_SPEC_SCHEMA: &[FieldRule] = &[
    id_field("pawnId"),
    FieldRule::new("position", FieldKind::Number).range(0.0, 100.0),
    FieldRule::new("score", FieldKind::Number).at_least(0.0),
    FieldRule::new("atHome", FieldKind::Boolean),
];

pub const JOIN_SCHEMA: &[FieldRule] = &[
    id_field("roomId").identifier(),
    id_field("playerId"),
    FieldRule::new("playerName", FieldKind::String)
        .required()
        .length(1, MAX_PLAYER_NAME_LEN),
    FieldRule::new("pawns", FieldKind::Array)
        .length(0, MAX_PAWNS_PER_PLAYER)
        .items(PAWN_SPEC_SCHEMA)
        .unique_by("pawnId"),
];

pub const MOVE_SCHEMA: &[FieldRule] = &[
    id_field("roomId").identifier(),
    id_field("playerId"),
    id_field("pawnId"),
    FieldRule::new("steps", FieldKind::Integer)
        .required()
        .range(1.0, 6.0),
];

pub const CAPTURE_SCHEMA: &[FieldRule] = &[
    id_field("roomId").identifier(),
    FieldRule::new("striker", FieldKind::Object)
        .required()
        .properties(PAWN_REF_SCHEMA),
    FieldRule::new("victim", FieldKind::Object)
        .required()
        .properties(PAWN_REF_SCHEMA),
];

/// A payload that failed its schema. Holds every violation found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError(pub Vec<String>);

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Validation failed: {}", self.0.join(", "))
    }
}

impl std::error::Error for ValidationError {}

/// Check a payload against the schema for `kind`. Returns all violations;
/// an empty list means the payload is acceptable.
pub fn validate(kind: EventKind, payload: &Value) -> Vec<String> {
    let mut errors = Vec::new();
    match payload.as_object() {
        Some(obj) => check_object("", kind.schema(), obj, &mut errors),
        None => errors.push("payload must be an object".to_string()),
    }
    errors
}

/// Validate and then deserialize a payload into its typed form.
pub fn parse_payload<T: DeserializeOwned>(
    kind: EventKind,
    payload: &Value,
) -> Result<T, ValidationError> {
    let errors = validate(kind, payload);
    if !errors.is_empty() {
        return Err(ValidationError(errors));
    }
    serde_json::from_value(payload.clone()).map_err(|e| ValidationError(vec![e.to_string()]))
}

fn check_object(
    prefix: &str,
    rules: &[FieldRule],
    obj: &Map<String, Value>,
    errors: &mut Vec<String>,
) {
    for rule in rules {
        let path = format!("{prefix}{}", rule.name);
        check_field(&path, rule, obj.get(rule.name), errors);
    }
}

fn check_field(path: &str, rule: &FieldRule, value: Option<&Value>, errors: &mut Vec<String>) {
    let value = match value {
        None | Some(Value::Null) => {
            if rule.required {
                errors.push(format!("{path} is required"));
            }
            return;
        },
        Some(v) => v,
    };

    if !rule.kind.matches(value) {
        errors.push(format!("{path} must be {}", rule.kind.describe()));
        return;
    }

    match value {
        Value::String(s) => {
            let len = s.chars().count();
            check_len(path, rule, len, "characters", errors);
            if rule.identifier
                && !s
                    .bytes()
                    .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
            {
                errors.push(format!(
                    "{path} may only contain letters, digits, '_' and '-'"
                ));
            }
        },
        Value::Number(n) => {
            let Some(n) = n.as_f64() else { return };
            if let Some(min) = rule.min
                && n < min
            {
                errors.push(format!("{path} must be at least {min}"));
            }
            if let Some(max) = rule.max
                && n > max
            {
                errors.push(format!("{path} must not exceed {max}"));
            }
        },
        Value::Array(items) => {
            check_len(path, rule, items.len(), "items", errors);
            if !rule.items.is_empty() {
                check_items(path, rule, items, errors);
            }
        },
        Value::Object(obj) => {
            check_object(&format!("{path}."), rule.properties, obj, errors);
        },
        Value::Bool(_) | Value::Null => {},
    }
}

fn check_len(path: &str, rule: &FieldRule, len: usize, unit: &str, errors: &mut Vec<String>) {
    if let Some(min) = rule.min_len
        && len < min
    {
        errors.push(format!("{path} must be at least {min} {unit}"));
    }
    if let Some(max) = rule.max_len
        && len > max
    {
        errors.push(format!("{path} must not exceed {max} {unit}"));
    }
}

fn check_items(path: &str, rule: &FieldRule, items: &[Value], errors: &mut Vec<String>) {
    let mut seen = HashSet::new();
    for (i, item) in items.iter().enumerate() {
        let item_path = format!("{path}[{i}]");
        let Some(obj) = item.as_object() else {
            errors.push(format!("{item_path} must be an object"));
            continue;
        };
        check_object(&format!("{item_path}."), rule.items, obj, errors);

        if let Some(key) = rule.unique_by
            && let Some(Value::String(id)) = obj.get(key)
            && !seen.insert(id.as_str())
        {
            errors.push(format!("{item_path}: duplicate {key} {id}"));
        }
    }
}
