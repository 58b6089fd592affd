use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;
use tracing::debug;

use crate::answers::AnswerSet;
use crate::spec::questionnaire::{Gate, QuestionnaireSchema};

/// Field path to visibility.
pub type VisibilityMap = BTreeMap<String, bool>;

/// Condition name to whether it currently holds. Derived, never stored.
pub type ConditionalFieldState = BTreeMap<String, bool>;

/// Recomputes visibility for every field from scratch.
///
/// A gated field is visible when its governing field is visible and the gate
/// holds: trigger rules compare the answer as an exact string, sub-questions
/// need the parent checkbox to be `true`.
pub fn resolve_visibility(schema: &QuestionnaireSchema, answers: &AnswerSet) -> VisibilityMap {
    let mut map = VisibilityMap::new();
    for entry in schema.entries() {
        let governed_by_visible = entry
            .gate
            .governing_path()
            .map(|path| map.get(path).copied().unwrap_or(false))
            .unwrap_or(true);
        let visible = governed_by_visible && gate_holds(&entry.gate, answers);
        map.insert(entry.path, visible);
    }
    debug!(
        visible = map.values().filter(|visible| **visible).count(),
        total = map.len(),
        "resolved visibility"
    );
    map
}

/// Paths of the fields that are currently active.
pub fn compute_visible(answers: &AnswerSet, schema: &QuestionnaireSchema) -> BTreeSet<String> {
    resolve_visibility(schema, answers)
        .into_iter()
        .filter_map(|(path, visible)| visible.then_some(path))
        .collect()
}

/// State of every named condition in the schema.
pub fn conditional_state(
    schema: &QuestionnaireSchema,
    answers: &AnswerSet,
) -> ConditionalFieldState {
    let visibility = resolve_visibility(schema, answers);
    let mut state = ConditionalFieldState::new();
    for entry in schema.entries() {
        if let Some(name) = entry.gate.condition_name() {
            let active = visibility.get(&entry.path).copied().unwrap_or(false);
            state.insert(name, active);
        }
    }
    state
}

pub fn gate_holds(gate: &Gate, answers: &AnswerSet) -> bool {
    match gate {
        Gate::Always => true,
        Gate::Trigger { path, value } => {
            matches!(answers.get(path), Some(Value::String(answer)) if answer == value)
        }
        Gate::Parent { path } => matches!(answers.get(path), Some(Value::Bool(true))),
    }
}
