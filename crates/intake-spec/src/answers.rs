use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

/// In-progress answers keyed by dotted path (`wife.birthDate`) or bare id.
///
/// Updates never mutate an existing set: [`AnswerSet::update`] returns a new
/// revision and the previous one stays valid for comparison.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnswerSet(Map<String, Value>);

impl AnswerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Anything other than a JSON object yields an empty set.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Self(map),
            _ => Self::default(),
        }
    }

    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let first = segments.next()?;
        let mut current = self.0.get(first)?;
        for segment in segments {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }

    /// Returns a copy with `value` stored at `path`.
    ///
    /// Missing intermediate segments become empty objects. The leaf replaces
    /// whatever was there and is stored as given.
    pub fn update(&self, path: &str, value: Value) -> AnswerSet {
        let segments: Vec<&str> = path.split('.').collect();
        if segments.iter().any(|segment| segment.is_empty()) {
            debug!(path, "ignoring update with an empty path segment");
            return self.clone();
        }
        let mut next = self.0.clone();
        assign(&mut next, &segments, value);
        AnswerSet(next)
    }

    pub fn apply(&self, change: &FieldChange) -> AnswerSet {
        self.update(&change.path, change.value.clone())
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    /// Dotted paths of every non-object leaf, depth first.
    pub fn leaves(&self) -> Vec<(String, Value)> {
        let mut leaves = Vec::new();
        collect_leaves(None, &self.0, &mut leaves);
        leaves
    }
}

/// Functional form of [`AnswerSet::update`].
pub fn update(answers: &AnswerSet, path: &str, value: Value) -> AnswerSet {
    answers.update(path, value)
}

fn assign(map: &mut Map<String, Value>, segments: &[&str], value: Value) {
    let Some((head, rest)) = segments.split_first() else {
        return;
    };
    if rest.is_empty() {
        map.insert((*head).to_string(), value);
        return;
    }
    let child = map
        .entry((*head).to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    if !child.is_object() {
        *child = Value::Object(Map::new());
    }
    if let Value::Object(child_map) = child {
        assign(child_map, rest, value);
    }
}

fn collect_leaves(prefix: Option<&str>, map: &Map<String, Value>, out: &mut Vec<(String, Value)>) {
    for (key, value) in map {
        let path = match prefix {
            Some(prefix) => format!("{}.{}", prefix, key),
            None => key.clone(),
        };
        match value {
            Value::Object(child) if !child.is_empty() => collect_leaves(Some(&path), child, out),
            other => out.push((path, other.clone())),
        }
    }
}

/// Change event emitted by a rendered control.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    pub path: String,
    pub value: Value,
}

impl FieldChange {
    pub fn new(path: impl Into<String>, value: Value) -> Self {
        Self {
            path: path.into(),
            value,
        }
    }
}

/// Treats missing, null, empty/whitespace strings, empty lists and `false` as unanswered.
pub fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(text)) => text.trim().is_empty(),
        Some(Value::Array(items)) => items.is_empty(),
        Some(Value::Bool(flag)) => !flag,
        Some(_) => false,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationCode {
    Required,
    NotANumber,
    BelowMinimum,
    AboveMaximum,
    InvalidDate,
    UnknownOption,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationError {
    pub path: String,
    pub code: ValidationCode,
    pub message: String,
}

/// Outcome of one validation pass; rebuilt from scratch on every attempt.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<ValidationError>,
}

impl ValidationResult {
    pub fn from_errors(errors: Vec<ValidationError>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }

    /// Human-readable messages in schema order.
    pub fn messages(&self) -> Vec<String> {
        self.errors.iter().map(|error| error.message.clone()).collect()
    }
}
