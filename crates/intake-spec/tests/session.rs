use std::cell::RefCell;

use chrono::NaiveDate;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde_json::json;

use intake_spec::{
    AnswerSet, FinalRecord, FormSession, Guest, GuestContext, GuestRegistration, LineProfile,
    MemoryStore, Message, MessageTemplates, Messenger, MessagingError, Notifier,
    QuestionnaireSchema, RecordStore, SessionState, StoreError, SubmitError, link_line_identity,
    register, seed_answers,
};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("date")
}

fn today() -> NaiveDate {
    date(2024, 6, 14)
}

#[derive(Default)]
struct RecordingMessenger {
    sent: RefCell<Vec<(String, Vec<Message>)>>,
}

impl Messenger for RecordingMessenger {
    fn push(&self, recipient: &str, messages: &[Message]) -> Result<(), MessagingError> {
        self.sent
            .borrow_mut()
            .push((recipient.to_string(), messages.to_vec()));
        Ok(())
    }
}

struct RejectingMessenger;

impl Messenger for RejectingMessenger {
    fn push(&self, _recipient: &str, _messages: &[Message]) -> Result<(), MessagingError> {
        Err(MessagingError::Rejected {
            status: 500,
            body: "internal error".into(),
        })
    }
}

/// Store whose writes always fail.
struct OfflineStore;

impl RecordStore for OfflineStore {
    fn insert_guest(&mut self, _guest: Guest) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("offline".into()))
    }

    fn update_guest(&mut self, _guest: &Guest) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("offline".into()))
    }

    fn guests(&self) -> Result<Vec<Guest>, StoreError> {
        Ok(Vec::new())
    }

    fn create_record(&mut self, _record: &FinalRecord) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("offline".into()))
    }

    fn mark_completed(&mut self, _guest_id: &str, _on: NaiveDate) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("offline".into()))
    }
}

/// Memory store whose first completion mark fails.
struct FlakyCompletionStore {
    inner: MemoryStore,
    fail_next_mark: bool,
}

impl RecordStore for FlakyCompletionStore {
    fn insert_guest(&mut self, guest: Guest) -> Result<(), StoreError> {
        self.inner.insert_guest(guest)
    }

    fn update_guest(&mut self, guest: &Guest) -> Result<(), StoreError> {
        self.inner.update_guest(guest)
    }

    fn guests(&self) -> Result<Vec<Guest>, StoreError> {
        self.inner.guests()
    }

    fn create_record(&mut self, record: &FinalRecord) -> Result<(), StoreError> {
        self.inner.create_record(record)
    }

    fn mark_completed(&mut self, guest_id: &str, on: NaiveDate) -> Result<(), StoreError> {
        if std::mem::take(&mut self.fail_next_mark) {
            return Err(StoreError::Unavailable("timeout".into()));
        }
        self.inner.mark_completed(guest_id, on)
    }
}

fn registered_guest(store: &mut MemoryStore) -> Guest {
    let mut rng = StdRng::seed_from_u64(7);
    let guest = register(
        store,
        GuestRegistration {
            phone_number: "090-1234-5678".into(),
            birth_date: date(1990, 1, 1),
            wife_first_blood_date: date(2024, 6, 20),
            husband_first_blood_date: None,
        },
        &mut rng,
        date(2024, 6, 1),
    )
    .expect("registration");
    link_line_identity(
        store,
        guest,
        LineProfile {
            user_id: "U1234567890abcdef".into(),
            display_name: "Hanako".into(),
            picture_url: None,
        },
        date(2024, 6, 1),
    )
}

fn fill_required(session: &mut FormSession<'_>) {
    session.update("maritalStatus", json!("married"));
    session.update("marriageYear", json!("2015"));
    session.update("wife.name", json!("Hanako Sato"));
    session.update("wife.nameKana", json!("SATO HANAKO"));
    session.update("husband.name", json!("Taro Sato"));
    session.update("husband.nameKana", json!("SATO TARO"));
    session.update("husband.birthDate", json!("1988-05-05"));
}

#[test]
fn first_change_moves_empty_session_to_editing() {
    let schema = QuestionnaireSchema::builtin().expect("schema");
    let mut session = FormSession::new(&schema);
    assert_eq!(session.state(), SessionState::Empty);
    assert!(session.answers().is_empty());

    session.update("wife.name", json!("Hanako"));
    assert_eq!(session.state(), SessionState::Editing);
    assert_eq!(session.answers().get("wife.name"), Some(&json!("Hanako")));
}

#[test]
fn married_toggle_reveals_year_and_switching_hides_it() {
    let schema = QuestionnaireSchema::builtin().expect("schema");
    let mut session = FormSession::new(&schema);

    assert!(!session.visible().contains("marriageYear"));
    session.update("maritalStatus", json!("married"));
    assert!(session.visible().contains("marriageYear"));
    assert_eq!(session.conditions().get("maritalStatus=married"), Some(&true));

    session.update("maritalStatus", json!("single"));
    assert!(!session.visible().contains("marriageYear"));
}

#[test]
fn failed_validation_keeps_answers_and_errors() {
    let schema = QuestionnaireSchema::builtin().expect("schema");
    let mut store = MemoryStore::new();
    let mut session = FormSession::seeded(&schema, seed_answers(None), None);
    session.update("wife.name", json!("Hanako Sato"));
    let before = session.answers().clone();

    let outcome = session.submit(today(), &mut store, None);
    assert!(matches!(outcome, Err(SubmitError::Validation(_))));
    assert_eq!(session.state(), SessionState::EditingWithErrors);
    assert_eq!(session.answers(), &before);
    assert!(!session.errors().is_empty());
    assert!(store.records().is_empty());
}

#[test]
fn submission_persists_marks_completed_and_notifies() {
    let schema = QuestionnaireSchema::builtin().expect("schema");
    let templates = MessageTemplates::new().expect("templates");
    let messenger = RecordingMessenger::default();
    let mut store = MemoryStore::new();
    let guest = registered_guest(&mut store);

    let mut session = FormSession::seeded(
        &schema,
        seed_answers(Some(&guest)),
        Some(GuestContext::from(&guest)),
    );
    fill_required(&mut session);

    let notifier = Notifier {
        messenger: &messenger,
        templates: &templates,
    };
    let record = session
        .submit(today(), &mut store, Some(&notifier))
        .expect("submitted")
        .clone();

    assert_eq!(session.state(), SessionState::Submitted);
    assert_eq!(record.guest_id.as_deref(), Some(guest.id.as_str()));
    assert_eq!(record.get("wife.birthDate"), Some(&json!("1990-01-01")));
    assert_eq!(record.get("wife.marriageAge"), Some(&json!(25)));
    assert_eq!(store.records(), &[record]);

    let stored = store.guest(&guest.id).expect("store").expect("guest");
    assert!(stored.is_completed);
    assert_eq!(stored.completed_on, Some(today()));

    let sent = messenger.sent.borrow();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "U1234567890abcdef");
    assert_eq!(sent[0].1.len(), 4);
    assert!(sent[0].1[0].as_text().starts_with("Hanako Sato"));
    assert!(sent[0].1[3].as_text().contains("June 20, 2024"));
}

#[test]
fn messaging_failure_does_not_undo_submission() {
    let schema = QuestionnaireSchema::builtin().expect("schema");
    let templates = MessageTemplates::new().expect("templates");
    let mut store = MemoryStore::new();
    let guest = registered_guest(&mut store);

    let mut session = FormSession::seeded(
        &schema,
        seed_answers(Some(&guest)),
        Some(GuestContext::from(&guest)),
    );
    fill_required(&mut session);
    let notifier = Notifier {
        messenger: &RejectingMessenger,
        templates: &templates,
    };

    assert!(session.submit(today(), &mut store, Some(&notifier)).is_ok());
    assert_eq!(session.state(), SessionState::Submitted);
    assert_eq!(store.records().len(), 1);
}

#[test]
fn store_failure_returns_to_editing_and_can_retry() {
    let schema = QuestionnaireSchema::builtin().expect("schema");
    let mut session = FormSession::seeded(&schema, seed_answers(None), None);
    session.update("wife.birthDate", json!("1990-01-01"));
    fill_required(&mut session);

    let outcome = session.submit(today(), &mut OfflineStore, None);
    assert!(matches!(outcome, Err(SubmitError::Store(_))));
    assert_eq!(session.state(), SessionState::Editing);
    assert!(session.record().is_none());

    let mut store = MemoryStore::new();
    assert!(session.submit(today(), &mut store, None).is_ok());
    assert_eq!(store.records().len(), 1);
}

#[test]
fn retry_after_failed_completion_mark_stores_one_record() {
    let schema = QuestionnaireSchema::builtin().expect("schema");
    let mut inner = MemoryStore::new();
    let guest = registered_guest(&mut inner);
    let mut store = FlakyCompletionStore {
        inner,
        fail_next_mark: true,
    };

    let mut session = FormSession::seeded(
        &schema,
        seed_answers(Some(&guest)),
        Some(GuestContext::from(&guest)),
    );
    fill_required(&mut session);

    let outcome = session.submit(today(), &mut store, None);
    assert!(matches!(outcome, Err(SubmitError::Store(_))));
    assert_eq!(session.state(), SessionState::Editing);
    assert_eq!(store.inner.records().len(), 1);

    session.submit(today(), &mut store, None).expect("retry");
    assert_eq!(session.state(), SessionState::Submitted);
    assert_eq!(store.inner.records().len(), 1);
    let stored = store.inner.guest(&guest.id).expect("store").expect("guest");
    assert!(stored.is_completed);
}

#[test]
fn submitted_session_ignores_changes_and_resubmission() {
    let schema = QuestionnaireSchema::builtin().expect("schema");
    let mut store = MemoryStore::new();
    let mut session = FormSession::seeded(&schema, AnswerSet::new(), None);
    session.update("wife.birthDate", json!("1990-01-01"));
    fill_required(&mut session);
    session.submit(today(), &mut store, None).expect("submitted");

    session.update("wife.name", json!("Someone else"));
    assert_eq!(session.answers().get("wife.name"), Some(&json!("Hanako Sato")));
    assert!(matches!(
        session.submit(today(), &mut store, None),
        Err(SubmitError::AlreadySubmitted)
    ));
    assert_eq!(store.records().len(), 1);
}

#[test]
fn rendered_chip_toggle_feeds_back_into_session() {
    let schema = QuestionnaireSchema::builtin().expect("schema");
    let mut session = FormSession::seeded(&schema, seed_answers(None), None);

    let payload = session.render(today());
    let holidays = payload.field("wife.holidays").expect("holidays field");
    let change = holidays.toggle("Wed").expect("chip");
    session.apply(&change);
    assert_eq!(session.answers().get("wife.holidays"), Some(&json!(["Wed"])));

    let payload = session.render(today());
    let holidays = payload.field("wife.holidays").expect("holidays field");
    session.apply(&holidays.toggle("Wed").expect("chip"));
    assert_eq!(session.answers().get("wife.holidays"), Some(&json!([])));
}
