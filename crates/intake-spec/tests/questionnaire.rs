use chrono::NaiveDate;
use serde_json::{Value, json};

use intake_spec::{
    AnswerSet, QuestionnaireSchema, ValidationCode, calculate_age, compute_visible,
    derive_final_record, finalize, parse_date_str, validate,
};

fn fixture(name: &str) -> &'static str {
    match name {
        "minimal_form" => include_str!("../tests/fixtures/minimal_form.json"),
        "married_answers" => include_str!("../tests/fixtures/married_answers.json"),
        _ => panic!("unknown fixture {}", name),
    }
}

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 14).expect("date")
}

fn builtin() -> QuestionnaireSchema {
    QuestionnaireSchema::builtin().expect("builtin questionnaire")
}

fn married_answers() -> AnswerSet {
    AnswerSet::from_value(serde_json::from_str(fixture("married_answers")).expect("answers"))
}

#[test]
fn age_turns_over_on_the_birthday() {
    let birth = parse_date_str("2000-06-15").expect("date");
    assert_eq!(calculate_age(birth, today()), Some(23));
    let birthday = NaiveDate::from_ymd_opt(2024, 6, 15).expect("date");
    assert_eq!(calculate_age(birth, birthday), Some(24));
}

#[test]
fn missing_names_and_birth_dates_yield_four_messages_in_schema_order() {
    let schema = builtin();
    let answers = AnswerSet::from_value(json!({
        "maritalStatus": "single",
        "wife": { "nameKana": "SATO HANAKO" },
        "husband": { "nameKana": "SATO TARO" }
    }));

    let result = validate(&schema, &answers, today());
    assert!(!result.valid);
    assert_eq!(
        result.messages(),
        vec![
            "Wife: Name is required",
            "Wife: Birth date is required",
            "Husband: Name is required",
            "Husband: Birth date is required",
        ]
    );
}

#[test]
fn inactive_conditional_field_is_never_required() {
    let schema = builtin();
    let mut answers = married_answers().update("maritalStatus", json!("single"));
    answers = answers.update("marriageYear", json!(""));

    assert!(!compute_visible(&answers, &schema).contains("marriageYear"));
    let result = validate(&schema, &answers, today());
    assert!(result.valid, "unexpected errors: {:?}", result.messages());
}

#[test]
fn active_conditional_field_is_required() {
    let schema = builtin();
    let answers = married_answers().update("marriageYear", json!(""));
    let result = validate(&schema, &answers, today());
    assert_eq!(result.messages(), vec!["Please enter the year of marriage"]);
}

#[test]
fn minimal_form_reports_single_error_and_no_record() {
    let schema = QuestionnaireSchema::from_json(fixture("minimal_form")).expect("schema");
    let answers = AnswerSet::new();

    let outcome = finalize(&schema, &answers, today());
    let validation = outcome.expect_err("validation should fail");
    assert_eq!(validation.errors.len(), 1);
    assert_eq!(validation.errors[0].path, "profile.nickname");
    assert_eq!(validation.errors[0].code, ValidationCode::Required);
}

#[test]
fn number_answers_are_checked_against_resolved_bounds() {
    let schema = builtin();

    let not_a_number = married_answers().update("marriageYear", json!("twenty"));
    let result = validate(&schema, &not_a_number, today());
    assert_eq!(result.errors[0].code, ValidationCode::NotANumber);

    let future = married_answers().update("marriageYear", json!("2025"));
    let result = validate(&schema, &future, today());
    assert_eq!(result.messages(), vec!["Year of marriage must be at most 2024"]);

    let too_early = married_answers().update("marriageYear", json!(1900));
    let result = validate(&schema, &too_early, today());
    assert_eq!(result.errors[0].code, ValidationCode::BelowMinimum);
}

#[test]
fn validation_accumulates_every_failure() {
    let schema = builtin();
    let answers = married_answers()
        .update("marriageYear", json!("abc"))
        .update("wife.birthDate", json!("not a date"))
        .update("husband.name", json!(" "));
    let codes: Vec<ValidationCode> = validate(&schema, &answers, today())
        .errors
        .into_iter()
        .map(|error| error.code)
        .collect();
    assert_eq!(
        codes,
        vec![
            ValidationCode::NotANumber,
            ValidationCode::InvalidDate,
            ValidationCode::Required,
        ]
    );
}

#[test]
fn unknown_select_option_is_rejected() {
    let schema = builtin();
    let answers = married_answers().update("maritalStatus", json!("divorced"));
    let result = validate(&schema, &answers, today());
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].code, ValidationCode::UnknownOption);
}

#[test]
fn married_record_derives_ages_at_marriage() {
    let schema = builtin();
    let record = finalize(&schema, &married_answers(), today()).expect("valid answers");

    assert_eq!(record.get("wife.marriageAge"), Some(&json!(25)));
    assert_eq!(record.get("husband.marriageAge"), Some(&json!(27)));
    assert_eq!(record.get("wife.age"), Some(&json!(34)));
    assert_eq!(record.get("husband.age"), Some(&json!(36)));
    assert_eq!(record.get("marriageYear"), Some(&json!(2015)));
    assert_eq!(record.get("husband.birthDate"), Some(&json!("1988-05-05")));
    assert_eq!(record.get("wife.pregnancyHistory"), Some(&json!(1)));
    assert_eq!(record.get("wife.gender"), Some(&json!("wife")));
    assert_eq!(record.get("treatmentDesires.ivf"), Some(&json!(true)));
    assert_eq!(record.submitted_on, today());
}

#[test]
fn unmarried_record_has_null_marriage_ages_and_drops_inactive_year() {
    let schema = builtin();
    let answers = married_answers().update("maritalStatus", json!("single"));
    let record = derive_final_record(&schema, &answers, today());

    assert_eq!(record.get("wife.marriageAge"), Some(&Value::Null));
    assert_eq!(record.get("husband.marriageAge"), Some(&Value::Null));
    assert!(record.get("marriageYear").is_none());
}

#[test]
fn unchecked_parent_drops_sub_answers_from_record() {
    let schema = builtin();
    let answers = married_answers().update("treatmentDesires.infertility", json!(false));
    let record = derive_final_record(&schema, &answers, today());
    assert_eq!(record.get("treatmentDesires.infertility"), Some(&json!(false)));
    assert!(record.get("treatmentDesires.ivf").is_none());
}

#[test]
fn record_round_trips_through_cbor() {
    let schema = builtin();
    let record = finalize(&schema, &married_answers(), today()).expect("valid answers");
    let bytes = record.to_cbor().expect("cbor");
    let decoded: intake_spec::FinalRecord = serde_cbor::from_slice(&bytes).expect("decode");
    assert_eq!(decoded, record);
}

#[test]
fn schema_checks_reject_structural_mistakes() {
    let unknown_trigger = json!({
        "id": "bad", "title": "Bad", "version": "1",
        "sections": [{
            "id": "s", "title": "S",
            "fields": [{ "id": "a", "type": "text" }],
            "conditionalFields": { "trigger": "missing", "cases": {} }
        }]
    });
    assert!(QuestionnaireSchema::from_json(&unknown_trigger.to_string()).is_err());

    let no_options = json!({
        "id": "bad", "title": "Bad", "version": "1",
        "sections": [{ "id": "s", "title": "S", "fields": [{ "id": "a", "type": "select" }] }]
    });
    assert!(QuestionnaireSchema::from_json(&no_options.to_string()).is_err());

    let duplicate = json!({
        "id": "bad", "title": "Bad", "version": "1",
        "sections": [{
            "id": "s", "title": "S",
            "fields": [{ "id": "a", "type": "text" }, { "id": "a", "type": "number" }]
        }]
    });
    assert!(QuestionnaireSchema::from_json(&duplicate.to_string()).is_err());
}

#[test]
fn json_schema_describes_sections() {
    let schema = intake_spec::questionnaire_json_schema();
    let text = schema.to_string();
    assert!(text.contains("sections"));
    assert!(text.contains("conditionalFields"));
}
