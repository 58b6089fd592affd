//! Guest pre-registration, access-code login and messaging identity links.

use std::sync::LazyLock;

use chrono::{Days, NaiveDate};
use rand::Rng;
use rand::distributions::Alphanumeric;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{info, warn};

use crate::answers::AnswerSet;
use crate::date::format_date;
use crate::message::redact_id;
use crate::store::{RecordStore, StoreError};

static ACCESS_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z][0-9]{6}$").expect("access code pattern compiles"));

const GUEST_ID_LEN: usize = 20;
const CODE_ATTEMPTS: usize = 16;

/// Display name used when a guest has not shared one.
pub const DEFAULT_DISPLAY_NAME: &str = "Guest";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineProfile {
    pub user_id: String,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineIdentity {
    #[serde(flatten)]
    pub profile: LineProfile,
    pub linked_on: NaiveDate,
}

impl LineIdentity {
    pub fn user_id(&self) -> &str {
        &self.profile.user_id
    }
}

/// A pre-registered guest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Guest {
    pub id: String,
    pub access_code: String,
    pub phone_number: String,
    pub birth_date: NaiveDate,
    pub wife_first_blood_date: NaiveDate,
    pub husband_first_blood_date: NaiveDate,
    pub created_on: NaiveDate,
    #[serde(default)]
    pub is_completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_on: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<LineIdentity>,
}

/// Admin input for a new guest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuestRegistration {
    pub phone_number: String,
    pub birth_date: NaiveDate,
    pub wife_first_blood_date: NaiveDate,
    /// Defaults to the wife's date when absent.
    #[serde(default)]
    pub husband_first_blood_date: Option<NaiveDate>,
}

#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("phone number is required")]
    MissingPhoneNumber,
    #[error("could not allocate an unused access code")]
    CodesExhausted,
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("access code must be one letter followed by six digits")]
    MalformedCode,
    #[error("access code not found")]
    UnknownCode,
    #[error("birth date does not match")]
    BirthDateMismatch,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// One uppercase letter followed by six digits, e.g. `L494962`.
pub fn generate_access_code<R: Rng + ?Sized>(rng: &mut R) -> String {
    let letter = char::from(b'A' + rng.gen_range(0..26u8));
    let digits: String = (0..6)
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect();
    format!("{}{}", letter, digits)
}

pub fn is_valid_access_code(code: &str) -> bool {
    ACCESS_CODE.is_match(code)
}

pub fn register<R: Rng + ?Sized>(
    store: &mut dyn RecordStore,
    registration: GuestRegistration,
    rng: &mut R,
    today: NaiveDate,
) -> Result<Guest, RegistrationError> {
    let phone_number = registration.phone_number.trim().to_string();
    if phone_number.is_empty() {
        return Err(RegistrationError::MissingPhoneNumber);
    }

    let mut access_code = None;
    for _ in 0..CODE_ATTEMPTS {
        let candidate = generate_access_code(rng);
        if store.find_by_access_code(&candidate)?.is_empty() {
            access_code = Some(candidate);
            break;
        }
    }
    let access_code = access_code.ok_or(RegistrationError::CodesExhausted)?;

    let guest = Guest {
        id: (&mut *rng)
            .sample_iter(&Alphanumeric)
            .take(GUEST_ID_LEN)
            .map(char::from)
            .collect(),
        access_code,
        phone_number,
        birth_date: registration.birth_date,
        wife_first_blood_date: registration.wife_first_blood_date,
        husband_first_blood_date: registration
            .husband_first_blood_date
            .unwrap_or(registration.wife_first_blood_date),
        created_on: today,
        is_completed: false,
        completed_on: None,
        line: None,
    };
    store.insert_guest(guest.clone())?;
    info!(guest = %redact_id(&guest.id), "guest registered");
    Ok(guest)
}

/// Access code plus birth date login. The code is upper-cased first.
pub fn authenticate(
    store: &dyn RecordStore,
    code: &str,
    birth_date: NaiveDate,
) -> Result<Guest, AuthError> {
    let code = code.trim().to_uppercase();
    if !is_valid_access_code(&code) {
        return Err(AuthError::MalformedCode);
    }
    let candidates = store.find_by_access_code(&code)?;
    if candidates.is_empty() {
        return Err(AuthError::UnknownCode);
    }
    candidates
        .into_iter()
        .find(|guest| guest.birth_date == birth_date)
        .ok_or(AuthError::BirthDateMismatch)
}

/// Attaches a messaging identity. A failed write is logged and the guest is
/// returned unlinked, so login still succeeds.
pub fn link_line_identity(
    store: &mut dyn RecordStore,
    mut guest: Guest,
    profile: LineProfile,
    today: NaiveDate,
) -> Guest {
    let mut linked = guest.clone();
    linked.line = Some(LineIdentity {
        profile,
        linked_on: today,
    });
    match store.update_guest(&linked) {
        Ok(()) => {
            info!(guest = %redact_id(&linked.id), "messaging identity linked");
            guest = linked;
        }
        Err(err) => warn!(guest = %redact_id(&guest.id), error = %err, "linking messaging identity failed"),
    }
    guest
}

/// Auto-login: the guest already linked to this messaging user, if any.
pub fn find_by_line_user(
    store: &dyn RecordStore,
    user_id: &str,
) -> Result<Option<Guest>, StoreError> {
    store.find_by_line_user(user_id)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Reminder {
    pub guest_id: String,
    pub user_id: String,
    pub name: String,
}

/// Completed, linked guests whose first blood test is tomorrow.
pub fn due_reminders(guests: &[Guest], today: NaiveDate) -> Vec<Reminder> {
    let Some(tomorrow) = today.checked_add_days(Days::new(1)) else {
        return Vec::new();
    };
    guests
        .iter()
        .filter(|guest| guest.is_completed && guest.wife_first_blood_date == tomorrow)
        .filter_map(|guest| {
            let line = guest.line.as_ref()?;
            let name = if line.profile.display_name.trim().is_empty() {
                DEFAULT_DISPLAY_NAME.to_string()
            } else {
                line.profile.display_name.clone()
            };
            Some(Reminder {
                guest_id: guest.id.clone(),
                user_id: line.profile.user_id.clone(),
                name,
            })
        })
        .collect()
}

/// Answers the intake form starts with.
pub fn seed_answers(guest: Option<&Guest>) -> AnswerSet {
    let birth_date = guest
        .map(|guest| Value::String(format_date(guest.birth_date)))
        .unwrap_or(Value::Null);
    AnswerSet::from_value(json!({
        "treatmentDesires": {},
        "maritalStatus": "",
        "marriageYear": "",
        "wife": {
            "birthDate": birth_date,
            "gender": "wife",
            "pregnancyHistory": 0,
            "birthHistory": 0,
            "holidays": []
        },
        "husband": {
            "gender": "husband",
            "holidays": []
        }
    }))
}
