use std::collections::{BTreeMap, BTreeSet};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::spec::field::{FieldDescriptor, FieldType};

/// Questionnaire shipped with the crate; mirrors the clinic's first-visit form.
pub const BUILTIN_QUESTIONNAIRE: &str = include_str!("builtin_questionnaire.json");

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("questionnaire is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("field path '{0}' is declared more than once")]
    DuplicatePath(String),
    #[error("field '{0}' needs at least one option")]
    MissingOptions(String),
    #[error("section '{section}' declares conditional fields for unknown trigger '{trigger}'")]
    UnknownTrigger { section: String, trigger: String },
}

/// Additional fields unlocked by the value of one trigger field in the section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConditionalFields {
    /// Id of the field (in the same section) whose answer selects a case.
    pub trigger: String,
    /// Trigger value to revealed fields.
    pub cases: BTreeMap<String, Vec<FieldDescriptor>>,
}

/// Named group of fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SectionSchema {
    pub id: String,
    pub title: String,
    /// Nested sections store answers under `section.field`, others at the root.
    #[serde(default = "default_nested")]
    pub nested: bool,
    pub fields: Vec<FieldDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conditional_fields: Option<ConditionalFields>,
}

fn default_nested() -> bool {
    true
}

impl SectionSchema {
    pub fn field_path(&self, field_id: &str) -> String {
        if self.nested {
            format!("{}.{}", self.id, field_id)
        } else {
            field_id.to_string()
        }
    }
}

/// Inputs for the age-at-marriage derivation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MarriageRule {
    pub status_field: String,
    pub married_value: String,
    pub year_field: String,
}

/// Top-level questionnaire definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct QuestionnaireSchema {
    pub id: String,
    pub title: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub sections: Vec<SectionSchema>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marriage: Option<MarriageRule>,
}

/// What decides whether a field is currently active.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Gate {
    Always,
    /// Schema-declared rule: active when the answer at `path` equals `value`.
    Trigger { path: String, value: String },
    /// Sub-question: active when the parent checkbox is checked.
    Parent { path: String },
}

impl Gate {
    pub fn condition_name(&self) -> Option<String> {
        match self {
            Gate::Always => None,
            Gate::Trigger { path, value } => Some(format!("{}={}", path, value)),
            Gate::Parent { path } => Some(path.clone()),
        }
    }

    /// Path of the field this gate depends on.
    pub fn governing_path(&self) -> Option<&str> {
        match self {
            Gate::Always => None,
            Gate::Trigger { path, .. } | Gate::Parent { path } => Some(path),
        }
    }
}

/// A field in declaration order together with its answer path and gate.
#[derive(Debug, Clone)]
pub struct FieldEntry<'a> {
    pub section: &'a SectionSchema,
    pub descriptor: &'a FieldDescriptor,
    pub path: String,
    pub gate: Gate,
}

impl QuestionnaireSchema {
    pub fn from_json(json: &str) -> Result<Self, SchemaError> {
        let schema: QuestionnaireSchema = serde_json::from_str(json)?;
        schema.check()?;
        Ok(schema)
    }

    pub fn builtin() -> Result<Self, SchemaError> {
        Self::from_json(BUILTIN_QUESTIONNAIRE)
    }

    pub fn section(&self, id: &str) -> Option<&SectionSchema> {
        self.sections.iter().find(|section| section.id == id)
    }

    /// Every field, conditional field and sub-question in declaration order.
    ///
    /// Conditional fields follow their trigger; sub-questions follow their parent.
    pub fn entries(&self) -> Vec<FieldEntry<'_>> {
        let mut entries = Vec::new();
        for section in &self.sections {
            for field in &section.fields {
                push_entry(section, field, Gate::Always, &mut entries);
                if let Some(conditional) = &section.conditional_fields
                    && conditional.trigger == field.id
                {
                    let trigger_path = section.field_path(&field.id);
                    for (value, revealed) in &conditional.cases {
                        for descriptor in revealed {
                            let gate = Gate::Trigger {
                                path: trigger_path.clone(),
                                value: value.clone(),
                            };
                            push_entry(section, descriptor, gate, &mut entries);
                        }
                    }
                }
            }
        }
        entries
    }

    pub fn entry(&self, path: &str) -> Option<FieldEntry<'_>> {
        self.entries().into_iter().find(|entry| entry.path == path)
    }

    /// Structural checks run on load. Unsupported field types are allowed.
    pub fn check(&self) -> Result<(), SchemaError> {
        for section in &self.sections {
            if let Some(conditional) = &section.conditional_fields
                && !section
                    .fields
                    .iter()
                    .any(|field| field.id == conditional.trigger)
            {
                return Err(SchemaError::UnknownTrigger {
                    section: section.id.clone(),
                    trigger: conditional.trigger.clone(),
                });
            }
        }

        let mut seen = BTreeSet::new();
        for entry in self.entries() {
            if !seen.insert(entry.path.clone()) {
                return Err(SchemaError::DuplicatePath(entry.path));
            }
            if matches!(
                entry.descriptor.kind,
                FieldType::Select | FieldType::MultiSelect
            ) && entry.descriptor.options.is_empty()
            {
                return Err(SchemaError::MissingOptions(entry.path));
            }
        }
        Ok(())
    }
}

fn push_entry<'a>(
    section: &'a SectionSchema,
    descriptor: &'a FieldDescriptor,
    gate: Gate,
    entries: &mut Vec<FieldEntry<'a>>,
) {
    let path = section.field_path(&descriptor.id);
    entries.push(FieldEntry {
        section,
        descriptor,
        path: path.clone(),
        gate,
    });
    for sub_question in descriptor.active_sub_questions() {
        push_entry(
            section,
            sub_question,
            Gate::Parent { path: path.clone() },
            entries,
        );
    }
}
