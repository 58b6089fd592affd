use chrono::NaiveDate;
use serde_json::Value;

use crate::answers::{AnswerSet, ValidationCode, ValidationError, ValidationResult, is_blank};
use crate::date::parse_date;
use crate::spec::field::FieldType;
use crate::spec::questionnaire::{FieldEntry, QuestionnaireSchema};
use crate::visibility::resolve_visibility;

/// Checks every active field and collects all failures in schema order.
///
/// Inactive fields are skipped even when marked required.
pub fn validate(
    schema: &QuestionnaireSchema,
    answers: &AnswerSet,
    today: NaiveDate,
) -> ValidationResult {
    let visibility = resolve_visibility(schema, answers);
    let mut errors = Vec::new();

    for entry in schema.entries() {
        if !visibility.get(&entry.path).copied().unwrap_or(false) {
            continue;
        }
        let value = answers.get(&entry.path);
        if is_blank(value) {
            if entry.descriptor.required {
                errors.push(required_error(&entry));
            }
            continue;
        }
        if let Some(value) = value
            && let Some(error) = validate_value(&entry, value, today)
        {
            errors.push(error);
        }
    }

    ValidationResult::from_errors(errors)
}

/// Numeric answers may arrive as JSON numbers or as text from an input box.
pub fn parse_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        _ => None,
    }
}

fn validate_value(entry: &FieldEntry<'_>, value: &Value, today: NaiveDate) -> Option<ValidationError> {
    let descriptor = entry.descriptor;
    match descriptor.kind {
        FieldType::Number => {
            let Some(number) = parse_number(value) else {
                return Some(error(
                    entry,
                    ValidationCode::NotANumber,
                    format!("{} must be a number", display_label(entry)),
                ));
            };
            if let Some(min) = descriptor.min.map(|bound| bound.resolve(today))
                && number < min
            {
                return Some(error(
                    entry,
                    ValidationCode::BelowMinimum,
                    format!("{} must be at least {}", display_label(entry), min),
                ));
            }
            if let Some(max) = descriptor.max.map(|bound| bound.resolve(today))
                && number > max
            {
                return Some(error(
                    entry,
                    ValidationCode::AboveMaximum,
                    format!("{} must be at most {}", display_label(entry), max),
                ));
            }
            None
        }
        FieldType::Date if parse_date(value).is_none() => Some(error(
            entry,
            ValidationCode::InvalidDate,
            format!("{} must be a valid date", display_label(entry)),
        )),
        FieldType::Select => match value.as_str() {
            Some(choice) if descriptor.has_option(choice) => None,
            _ => Some(error(
                entry,
                ValidationCode::UnknownOption,
                format!("{} has an unknown option", display_label(entry)),
            )),
        },
        _ => None,
    }
}

fn required_error(entry: &FieldEntry<'_>) -> ValidationError {
    let message = entry
        .descriptor
        .required_message
        .clone()
        .unwrap_or_else(|| format!("{} is required", display_label(entry)));
    error(entry, ValidationCode::Required, message)
}

fn display_label(entry: &FieldEntry<'_>) -> String {
    let label = if entry.descriptor.label.is_empty() {
        &entry.descriptor.id
    } else {
        &entry.descriptor.label
    };
    if entry.section.nested {
        format!("{}: {}", entry.section.title, label)
    } else {
        label.clone()
    }
}

fn error(entry: &FieldEntry<'_>, code: ValidationCode, message: String) -> ValidationError {
    ValidationError {
        path: entry.path.clone(),
        code,
        message,
    }
}
