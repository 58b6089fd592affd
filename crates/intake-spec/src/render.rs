use chrono::NaiveDate;
use serde::Serialize;
use serde_json::{Value, json};

use crate::{
    answers::{AnswerSet, FieldChange, is_blank},
    date::{calculate_age, format_date, parse_date},
    spec::{
        field::{FieldDescriptor, FieldType},
        questionnaire::QuestionnaireSchema,
    },
    visibility::resolve_visibility,
};

/// Status labels returned by the renderers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderStatus {
    /// Some visible required field is still blank.
    NeedInput,
    /// Every visible required field has an answer.
    Complete,
}

impl RenderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RenderStatus::NeedInput => "need_input",
            RenderStatus::Complete => "complete",
        }
    }
}

/// Required-field counters over the visible fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RenderProgress {
    pub answered: usize,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChoiceView {
    pub value: String,
    pub label: String,
    pub selected: bool,
}

/// Editable control for one field. Holds a snapshot of the value, no state.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "control", rename_all = "camelCase")]
pub enum Control {
    TextInput {
        value: String,
    },
    NumberInput {
        value: String,
        min: Option<f64>,
        max: Option<f64>,
    },
    /// `age` is the read-only companion shown for `autoCalculate: age`.
    DatePicker {
        value: Option<String>,
        age: Option<u32>,
    },
    TimeInput {
        value: String,
    },
    Select {
        value: Option<String>,
        options: Vec<ChoiceView>,
    },
    /// `value` is the stored selection in its stored order.
    ChipGroup {
        value: Vec<String>,
        chips: Vec<ChoiceView>,
    },
    Checkbox {
        checked: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedField {
    pub path: String,
    pub label: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub required: bool,
    #[serde(flatten)]
    pub control: Control,
}

impl RenderedField {
    /// Change event carrying `value` for this field's path.
    pub fn change(&self, value: Value) -> FieldChange {
        FieldChange::new(self.path.clone(), value)
    }

    /// Change event flipping one chip. `None` for other controls or unknown chips.
    pub fn toggle(&self, option: &str) -> Option<FieldChange> {
        let Control::ChipGroup { value, chips } = &self.control else {
            return None;
        };
        if !chips.iter().any(|chip| chip.value == option) {
            return None;
        }
        let order: Vec<&str> = chips.iter().map(|chip| chip.value.as_str()).collect();
        let next = toggle_option(value, option, &order);
        Some(self.change(json!(next)))
    }
}

/// Adds `option` if absent, removes it if present.
///
/// Remaining elements keep their relative order. An added option goes right
/// after the last selected value that precedes it in `order`, so toggling
/// twice restores a selection kept in option order.
pub fn toggle_option(selection: &[String], option: &str, order: &[&str]) -> Vec<String> {
    if selection.iter().any(|selected| selected == option) {
        return selection
            .iter()
            .filter(|selected| *selected != option)
            .cloned()
            .collect();
    }
    let rank = |value: &str| order.iter().position(|candidate| *candidate == value);
    let insert_at = match rank(option) {
        Some(target) => selection
            .iter()
            .rposition(|selected| rank(selected).is_some_and(|current| current < target))
            .map_or(0, |index| index + 1),
        None => selection.len(),
    };
    let mut next = selection.to_vec();
    next.insert(insert_at, option.to_string());
    next
}

/// Maps one descriptor and its current value to a control.
///
/// `hidden` and unsupported types render nothing.
pub fn render_field(
    descriptor: &FieldDescriptor,
    path: &str,
    value: Option<&Value>,
    today: NaiveDate,
) -> Option<RenderedField> {
    let control = match descriptor.kind {
        FieldType::Text => Control::TextInput {
            value: value.map(value_to_display).unwrap_or_default(),
        },
        FieldType::Number => Control::NumberInput {
            value: value.map(value_to_display).unwrap_or_default(),
            min: descriptor.min.map(|bound| bound.resolve(today)),
            max: descriptor.max.map(|bound| bound.resolve(today)),
        },
        FieldType::Date => {
            let date = value.and_then(parse_date);
            let age = if descriptor.calculates_age() {
                date.and_then(|birth| calculate_age(birth, today))
            } else {
                None
            };
            Control::DatePicker {
                value: date.map(format_date),
                age,
            }
        }
        FieldType::Time => Control::TimeInput {
            value: value.map(value_to_display).unwrap_or_default(),
        },
        FieldType::Select => {
            let current = value.and_then(Value::as_str);
            Control::Select {
                value: current.map(str::to_string),
                options: descriptor
                    .options
                    .iter()
                    .map(|option| ChoiceView {
                        value: option.value().to_string(),
                        label: option.label().to_string(),
                        selected: current == Some(option.value()),
                    })
                    .collect(),
            }
        }
        FieldType::MultiSelect => {
            let selected = selection(value);
            Control::ChipGroup {
                chips: descriptor
                    .options
                    .iter()
                    .map(|option| ChoiceView {
                        value: option.value().to_string(),
                        label: option.label().to_string(),
                        selected: selected.iter().any(|item| item == option.value()),
                    })
                    .collect(),
                value: selected,
            }
        }
        FieldType::Checkbox => Control::Checkbox {
            checked: value.and_then(Value::as_bool).unwrap_or(false),
        },
        FieldType::Hidden | FieldType::Unsupported => return None,
    };

    Some(RenderedField {
        path: path.to_string(),
        label: descriptor.label.clone(),
        kind: descriptor.kind.as_str(),
        required: descriptor.required,
        control,
    })
}

fn selection(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[derive(Debug, Clone)]
pub struct RenderSection {
    pub id: String,
    pub title: String,
    pub fields: Vec<RenderedField>,
}

/// Collected payload used by both text and JSON renderers.
#[derive(Debug, Clone)]
pub struct RenderPayload {
    pub questionnaire_id: String,
    pub title: String,
    pub version: String,
    pub status: RenderStatus,
    pub progress: RenderProgress,
    pub help: Option<String>,
    pub sections: Vec<RenderSection>,
}

impl RenderPayload {
    pub fn field(&self, path: &str) -> Option<&RenderedField> {
        self.sections
            .iter()
            .flat_map(|section| section.fields.iter())
            .find(|field| field.path == path)
    }
}

/// One control per active field, grouped by section.
pub fn build_render_payload(
    schema: &QuestionnaireSchema,
    answers: &AnswerSet,
    today: NaiveDate,
) -> RenderPayload {
    let visibility = resolve_visibility(schema, answers);
    let entries = schema.entries();

    let mut progress = RenderProgress {
        answered: 0,
        total: 0,
    };
    let mut sections: Vec<RenderSection> = schema
        .sections
        .iter()
        .map(|section| RenderSection {
            id: section.id.clone(),
            title: section.title.clone(),
            fields: Vec::new(),
        })
        .collect();

    for entry in &entries {
        if !visibility.get(&entry.path).copied().unwrap_or(false) {
            continue;
        }
        let value = answers.get(&entry.path);
        if entry.descriptor.required {
            progress.total += 1;
            if !is_blank(value) {
                progress.answered += 1;
            }
        }
        if let Some(field) = render_field(entry.descriptor, &entry.path, value, today)
            && let Some(section) = sections
                .iter_mut()
                .find(|section| section.id == entry.section.id)
        {
            section.fields.push(field);
        }
    }

    let status = if progress.answered == progress.total {
        RenderStatus::Complete
    } else {
        RenderStatus::NeedInput
    };

    RenderPayload {
        questionnaire_id: schema.id.clone(),
        title: schema.title.clone(),
        version: schema.version.clone(),
        status,
        progress,
        help: schema.description.clone(),
        sections,
    }
}

/// Render the payload as a structured JSON-friendly value.
pub fn render_json_ui(payload: &RenderPayload) -> Value {
    let sections = payload
        .sections
        .iter()
        .map(|section| {
            json!({
                "id": section.id,
                "title": section.title,
                "fields": section.fields,
            })
        })
        .collect::<Vec<_>>();

    json!({
        "questionnaire_id": payload.questionnaire_id,
        "title": payload.title,
        "version": payload.version,
        "status": payload.status.as_str(),
        "progress": payload.progress,
        "help": payload.help,
        "sections": sections,
    })
}

/// Render the payload as human-friendly text.
pub fn render_text(payload: &RenderPayload) -> String {
    let mut lines = Vec::new();
    lines.push(format!(
        "Form: {} ({})",
        payload.title, payload.questionnaire_id
    ));
    lines.push(format!(
        "Status: {} ({}/{})",
        payload.status.as_str(),
        payload.progress.answered,
        payload.progress.total
    ));
    if let Some(help) = &payload.help {
        lines.push(format!("Help: {}", help));
    }

    for section in &payload.sections {
        if section.fields.is_empty() {
            continue;
        }
        lines.push(format!("[{}]", section.title));
        for field in &section.fields {
            let mut entry = format!(" - {} ({})", field.label, field.path);
            if field.required {
                entry.push_str(" [required]");
            }
            if let Some(value) = control_display(&field.control) {
                entry.push_str(&format!(" = {}", value));
            }
            lines.push(entry);
        }
    }

    lines.join("\n")
}

fn control_display(control: &Control) -> Option<String> {
    match control {
        Control::TextInput { value }
        | Control::NumberInput { value, .. }
        | Control::TimeInput { value } => (!value.is_empty()).then(|| value.clone()),
        Control::DatePicker { value, age } => value.as_ref().map(|date| match age {
            Some(age) => format!("{} (age {})", date, age),
            None => date.clone(),
        }),
        Control::Select { value, options } => value.as_ref().map(|current| {
            options
                .iter()
                .find(|option| &option.value == current)
                .map(|option| option.label.clone())
                .unwrap_or_else(|| current.clone())
        }),
        Control::ChipGroup { chips, .. } => Some(
            chips
                .iter()
                .map(|chip| {
                    let mark = if chip.selected { "x" } else { " " };
                    format!("[{}] {}", mark, chip.label)
                })
                .collect::<Vec<_>>()
                .join(" "),
        ),
        Control::Checkbox { checked } => Some(if *checked { "yes" } else { "no" }.to_string()),
    }
}

fn value_to_display(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        Value::Bool(flag) => flag.to_string(),
        Value::Number(num) => num.to_string(),
        other => other.to_string(),
    }
}
