use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use thiserror::Error;
use tracing::debug;

use intake_spec::{
    AnswerSet, FieldType, QuestionnaireSchema, RenderPayload, SchemaError, build_render_payload,
    compute_visible, conditional_state, derive_final_record, parse_date_str,
    render_json_ui as spec_render_json_ui, render_text as spec_render_text,
    toggle_option as spec_toggle_option, validate,
};

#[derive(Debug, Error)]
enum ComponentError {
    #[error("failed to parse config/{0}")]
    ConfigParse(#[source] serde_json::Error),
    #[error("failed to parse answer value: {0}")]
    ValueParse(#[source] serde_json::Error),
    #[error("invalid questionnaire: {0}")]
    Schema(#[from] SchemaError),
    #[error("questionnaire '{0}' is not available")]
    QuestionnaireUnavailable(String),
    #[error("field '{0}' is not part of the questionnaire")]
    UnknownField(String),
    #[error("field '{0}' is not a multi-select")]
    NotMultiSelect(String),
    #[error("json encode error: {0}")]
    JsonEncode(#[source] serde_json::Error),
}

#[derive(Debug, Deserialize, Serialize, Default)]
#[serde(rename_all = "camelCase")]
struct ComponentConfig {
    #[serde(default)]
    questionnaire_json: Option<String>,
}

fn load_questionnaire(config_json: &str) -> Result<QuestionnaireSchema, ComponentError> {
    let config = if config_json.trim().is_empty() {
        ComponentConfig::default()
    } else {
        serde_json::from_str(config_json).map_err(ComponentError::ConfigParse)?
    };

    match config.questionnaire_json.as_deref() {
        Some(json) => Ok(QuestionnaireSchema::from_json(json)?),
        None => Ok(QuestionnaireSchema::builtin()?),
    }
}

fn ensure_questionnaire(
    questionnaire_id: &str,
    config_json: &str,
) -> Result<QuestionnaireSchema, ComponentError> {
    let schema = load_questionnaire(config_json)?;
    if schema.id != questionnaire_id {
        Err(ComponentError::QuestionnaireUnavailable(
            questionnaire_id.to_string(),
        ))
    } else {
        Ok(schema)
    }
}

fn parse_context(ctx_json: &str) -> Value {
    serde_json::from_str(ctx_json).unwrap_or_else(|_| Value::Object(Map::new()))
}

/// `today` from the context (`YYYY-MM-DD`), falling back to the local date.
fn context_today(ctx: &Value) -> NaiveDate {
    ctx.get("today")
        .and_then(Value::as_str)
        .and_then(parse_date_str)
        .unwrap_or_else(|| Local::now().date_naive())
}

fn parse_answers(answers_json: &str) -> AnswerSet {
    AnswerSet::from_value(
        serde_json::from_str(answers_json).unwrap_or_else(|_| Value::Object(Map::new())),
    )
}

fn respond(result: Result<Value, ComponentError>) -> String {
    match result {
        Ok(value) => serde_json::to_string(&value).unwrap_or_else(|error| {
            json!({"error": format!("json encode: {}", error)}).to_string()
        }),
        Err(err) => json!({ "error": err.to_string() }).to_string(),
    }
}

fn respond_string(result: Result<String, ComponentError>) -> String {
    match result {
        Ok(value) => value,
        Err(err) => json!({ "error": err.to_string() }).to_string(),
    }
}

fn visibility_value(schema: &QuestionnaireSchema, answers: &AnswerSet) -> Value {
    json!({
        "visible": compute_visible(answers, schema),
        "conditions": conditional_state(schema, answers),
    })
}

pub fn describe(questionnaire_id: &str, config_json: &str) -> String {
    respond(
        ensure_questionnaire(questionnaire_id, config_json)
            .and_then(|schema| serde_json::to_value(schema).map_err(ComponentError::JsonEncode)),
    )
}

/// Visible field paths plus the `trigger=value` condition flags.
pub fn visible_fields(questionnaire_id: &str, config_json: &str, answers_json: &str) -> String {
    respond(
        ensure_questionnaire(questionnaire_id, config_json)
            .map(|schema| visibility_value(&schema, &parse_answers(answers_json))),
    )
}

fn render_payload(
    questionnaire_id: &str,
    config_json: &str,
    ctx_json: &str,
    answers_json: &str,
) -> Result<RenderPayload, ComponentError> {
    let schema = ensure_questionnaire(questionnaire_id, config_json)?;
    let today = context_today(&parse_context(ctx_json));
    let answers = parse_answers(answers_json);
    Ok(build_render_payload(&schema, &answers, today))
}

pub fn render_text(
    questionnaire_id: &str,
    config_json: &str,
    ctx_json: &str,
    answers_json: &str,
) -> String {
    respond_string(
        render_payload(questionnaire_id, config_json, ctx_json, answers_json)
            .map(|payload| spec_render_text(&payload)),
    )
}

pub fn render_json_ui(
    questionnaire_id: &str,
    config_json: &str,
    ctx_json: &str,
    answers_json: &str,
) -> String {
    respond(
        render_payload(questionnaire_id, config_json, ctx_json, answers_json)
            .map(|payload| spec_render_json_ui(&payload)),
    )
}

/// Stores `value_json` at `path` and returns the new answers with the
/// recomputed visibility. No validation happens here.
pub fn update_answer(
    questionnaire_id: &str,
    config_json: &str,
    answers_json: &str,
    path: &str,
    value_json: &str,
) -> String {
    respond(
        ensure_questionnaire(questionnaire_id, config_json).and_then(|schema| {
            let value: Value =
                serde_json::from_str(value_json).map_err(ComponentError::ValueParse)?;
            let answers = parse_answers(answers_json).update(path, value);
            debug!(path, "answer updated");
            let mut response = visibility_value(&schema, &answers);
            response["answers"] = answers.into_value();
            Ok(response)
        }),
    )
}

/// Flips one chip of a multi-select field.
pub fn toggle_option(
    questionnaire_id: &str,
    config_json: &str,
    answers_json: &str,
    path: &str,
    option: &str,
) -> String {
    respond(
        ensure_questionnaire(questionnaire_id, config_json).and_then(|schema| {
            let entry = schema
                .entry(path)
                .ok_or_else(|| ComponentError::UnknownField(path.to_string()))?;
            if entry.descriptor.kind != FieldType::MultiSelect {
                return Err(ComponentError::NotMultiSelect(path.to_string()));
            }
            let order: Vec<&str> = entry
                .descriptor
                .options
                .iter()
                .map(|option| option.value())
                .collect();

            let answers = parse_answers(answers_json);
            let selection: Vec<String> = answers
                .get(path)
                .and_then(Value::as_array)
                .map(|items| {
                    items
                        .iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();
            let next = spec_toggle_option(&selection, option, &order);
            let answers = answers.update(path, json!(next));
            Ok(json!({ "answers": answers.into_value() }))
        }),
    )
}

pub fn validate_answers(
    questionnaire_id: &str,
    config_json: &str,
    ctx_json: &str,
    answers_json: &str,
) -> String {
    respond(
        ensure_questionnaire(questionnaire_id, config_json).and_then(|schema| {
            let today = context_today(&parse_context(ctx_json));
            let answers = parse_answers(answers_json);
            serde_json::to_value(validate(&schema, &answers, today))
                .map_err(ComponentError::JsonEncode)
        }),
    )
}

/// Validation then derivation. Returns `status: "error"` with the
/// validation result, or `status: "complete"` with the final record.
pub fn derive_record(
    questionnaire_id: &str,
    config_json: &str,
    ctx_json: &str,
    answers_json: &str,
) -> String {
    respond(
        ensure_questionnaire(questionnaire_id, config_json).and_then(|schema| {
            let today = context_today(&parse_context(ctx_json));
            let answers = parse_answers(answers_json);
            let validation = validate(&schema, &answers, today);
            if !validation.valid {
                let validation =
                    serde_json::to_value(&validation).map_err(ComponentError::JsonEncode)?;
                return Ok(json!({
                    "status": "error",
                    "validation": validation,
                }));
            }
            let record = derive_final_record(&schema, &answers, today);
            let record = serde_json::to_value(record).map_err(ComponentError::JsonEncode)?;
            Ok(json!({
                "status": "complete",
                "record": record,
            }))
        }),
    )
}
