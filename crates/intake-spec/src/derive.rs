use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

use crate::answers::{AnswerSet, ValidationResult};
use crate::date::{calculate_age, format_date, marriage_age, parse_date};
use crate::spec::field::FieldType;
use crate::spec::questionnaire::{MarriageRule, QuestionnaireSchema};
use crate::validate::{parse_number, validate};
use crate::visibility::resolve_visibility;

/// Validated, derivation-complete answers ready for the record store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guest_id: Option<String>,
    pub questionnaire_id: String,
    pub answers: AnswerSet,
    pub submitted_on: NaiveDate,
}

impl FinalRecord {
    pub fn get(&self, path: &str) -> Option<&Value> {
        self.answers.get(path)
    }

    pub fn with_guest(mut self, guest_id: impl Into<String>) -> Self {
        self.guest_id = Some(guest_id.into());
        self
    }

    pub fn to_cbor(&self) -> Result<Vec<u8>, serde_cbor::Error> {
        serde_cbor::to_vec(self)
    }
}

/// Builds the record from active answers.
///
/// Numbers are coerced, dates normalised to `YYYY-MM-DD`, inactive fields
/// dropped. Every age-calculating date gets a sibling `age`, and when the
/// schema has a marriage rule a sibling `marriageAge` (null unless married
/// with a year).
pub fn derive_final_record(
    schema: &QuestionnaireSchema,
    answers: &AnswerSet,
    today: NaiveDate,
) -> FinalRecord {
    let visibility = resolve_visibility(schema, answers);
    let entries = schema.entries();
    let marriage_year = schema
        .marriage
        .as_ref()
        .and_then(|rule| married_in(rule, answers));

    let mut record = AnswerSet::new();
    for entry in &entries {
        if !visibility.get(&entry.path).copied().unwrap_or(false) {
            continue;
        }
        let Some(value) = answers.get(&entry.path) else {
            continue;
        };
        record = record.update(&entry.path, coerce(entry.descriptor.kind, value));

        if !entry.descriptor.calculates_age() {
            continue;
        }
        let birth = parse_date(value);
        let age = birth
            .and_then(|birth| calculate_age(birth, today))
            .map(Value::from)
            .unwrap_or(Value::Null);
        record = record.update(&sibling_path(&entry.path, "age"), age);
        if schema.marriage.is_some() {
            let at_marriage = match (birth, marriage_year) {
                (Some(birth), Some(year)) => Value::from(marriage_age(birth, year)),
                _ => Value::Null,
            };
            record = record.update(&sibling_path(&entry.path, "marriageAge"), at_marriage);
        }
    }

    FinalRecord {
        guest_id: None,
        questionnaire_id: schema.id.clone(),
        answers: record,
        submitted_on: today,
    }
}

/// Validation then derivation; the record only exists for a clean answer set.
pub fn finalize(
    schema: &QuestionnaireSchema,
    answers: &AnswerSet,
    today: NaiveDate,
) -> Result<FinalRecord, ValidationResult> {
    let validation = validate(schema, answers, today);
    if !validation.valid {
        return Err(validation);
    }
    Ok(derive_final_record(schema, answers, today))
}

fn married_in(rule: &MarriageRule, answers: &AnswerSet) -> Option<i64> {
    let married = matches!(
        answers.get(&rule.status_field),
        Some(Value::String(status)) if *status == rule.married_value
    );
    if !married {
        return None;
    }
    answers
        .get(&rule.year_field)
        .and_then(parse_number)
        .map(|year| year.trunc() as i64)
}

fn coerce(kind: FieldType, value: &Value) -> Value {
    match kind {
        FieldType::Number => match parse_number(value) {
            Some(number) if number.fract() == 0.0 => Value::from(number as i64),
            Some(number) => Number::from_f64(number)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            None => Value::Null,
        },
        FieldType::Date => parse_date(value)
            .map(|date| Value::String(format_date(date)))
            .unwrap_or(Value::Null),
        _ => value.clone(),
    }
}

fn sibling_path(path: &str, key: &str) -> String {
    match path.rsplit_once('.') {
        Some((parent, _)) => format!("{}.{}", parent, key),
        None => key.to_string(),
    }
}
