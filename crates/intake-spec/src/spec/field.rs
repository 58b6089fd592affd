use chrono::{Datelike, NaiveDate};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Control kinds a questionnaire field may declare.
///
/// Anything the engine does not recognise deserializes to
/// [`FieldType::Unsupported`] and renders nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum FieldType {
    Text,
    Number,
    Date,
    Time,
    Select,
    MultiSelect,
    Checkbox,
    Hidden,
    #[serde(other)]
    Unsupported,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Text => "text",
            FieldType::Number => "number",
            FieldType::Date => "date",
            FieldType::Time => "time",
            FieldType::Select => "select",
            FieldType::MultiSelect => "multiSelect",
            FieldType::Checkbox => "checkbox",
            FieldType::Hidden => "hidden",
            FieldType::Unsupported => "unsupported",
        }
    }

    /// Whether the renderer produces a visible control for this kind.
    pub fn has_control(&self) -> bool {
        !matches!(self, FieldType::Hidden | FieldType::Unsupported)
    }
}

/// A selectable option. Plain strings use the same text as value and label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum FieldOption {
    Plain(String),
    Labeled { value: String, label: String },
}

impl FieldOption {
    pub fn value(&self) -> &str {
        match self {
            FieldOption::Plain(value) => value,
            FieldOption::Labeled { value, .. } => value,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            FieldOption::Plain(value) => value,
            FieldOption::Labeled { label, .. } => label,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum BoundKeyword {
    #[serde(rename = "currentYear")]
    CurrentYear,
}

/// Numeric bound, either literal or resolved against the calendar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum Bound {
    Value(f64),
    Keyword(BoundKeyword),
}

impl Bound {
    /// Resolves the bound for the given day. `currentYear` is never cached.
    pub fn resolve(&self, today: NaiveDate) -> f64 {
        match self {
            Bound::Value(value) => *value,
            Bound::Keyword(BoundKeyword::CurrentYear) => f64::from(today.year()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum AutoCalculate {
    Age,
}

/// One form control: its type, label, constraints and nested sub-questions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FieldDescriptor {
    pub id: String,
    #[serde(default)]
    pub label: String,
    #[serde(rename = "type")]
    pub kind: FieldType,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<FieldOption>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<Bound>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<Bound>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_calculate: Option<AutoCalculate>,
    #[serde(default)]
    pub has_sub_questions: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sub_questions: Vec<FieldDescriptor>,
    /// Overrides the generated "is required" message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_message: Option<String>,
}

impl FieldDescriptor {
    pub fn new(id: impl Into<String>, label: impl Into<String>, kind: FieldType) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            kind,
            required: false,
            options: Vec::new(),
            min: None,
            max: None,
            auto_calculate: None,
            has_sub_questions: false,
            sub_questions: Vec::new(),
            required_message: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_options<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options = options
            .into_iter()
            .map(|option| FieldOption::Plain(option.into()))
            .collect();
        self
    }

    pub fn with_bounds(mut self, min: Option<Bound>, max: Option<Bound>) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    pub fn with_sub_questions(mut self, sub_questions: Vec<FieldDescriptor>) -> Self {
        self.has_sub_questions = !sub_questions.is_empty();
        self.sub_questions = sub_questions;
        self
    }

    pub fn calculates_age(&self) -> bool {
        self.kind == FieldType::Date && self.auto_calculate == Some(AutoCalculate::Age)
    }

    pub fn has_option(&self, value: &str) -> bool {
        self.options.iter().any(|option| option.value() == value)
    }

    /// Sub-questions only count when the parent is a checkbox that declares them.
    pub fn active_sub_questions(&self) -> &[FieldDescriptor] {
        if self.has_sub_questions && self.kind == FieldType::Checkbox {
            &self.sub_questions
        } else {
            &[]
        }
    }
}
