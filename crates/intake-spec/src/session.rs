use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::answers::{AnswerSet, FieldChange, ValidationError, ValidationResult};
use crate::derive::{FinalRecord, finalize};
use crate::guest::Guest;
use crate::message::{Messenger, dispatch_best_effort, redact_id};
use crate::render::{RenderPayload, build_render_payload};
use crate::spec::questionnaire::QuestionnaireSchema;
use crate::store::{RecordStore, StoreError};
use crate::template::{CompletionContext, MessageTemplates};
use crate::visibility::{ConditionalFieldState, compute_visible, conditional_state};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Empty,
    Editing,
    EditingWithErrors,
    Submitted,
}

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("{} validation error(s)", .0.errors.len())]
    Validation(ValidationResult),
    #[error("saving the questionnaire failed: {0}")]
    Store(#[from] StoreError),
    #[error("questionnaire was already submitted")]
    AlreadySubmitted,
}

/// Who the form is being filled for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuestContext {
    pub guest_id: String,
    pub line_user_id: Option<String>,
    pub first_test_date: Option<NaiveDate>,
}

impl From<&Guest> for GuestContext {
    fn from(guest: &Guest) -> Self {
        Self {
            guest_id: guest.id.clone(),
            line_user_id: guest.line.as_ref().map(|line| line.user_id().to_string()),
            first_test_date: Some(guest.wife_first_blood_date),
        }
    }
}

/// Messaging capability plus the templates for the completion notice.
pub struct Notifier<'a> {
    pub messenger: &'a dyn Messenger,
    pub templates: &'a MessageTemplates,
}

/// One form session: owns the answers from mount to submission.
pub struct FormSession<'a> {
    schema: &'a QuestionnaireSchema,
    answers: AnswerSet,
    state: SessionState,
    errors: Vec<ValidationError>,
    guest: Option<GuestContext>,
    /// Stored by a submission whose completion mark then failed.
    saved: Option<FinalRecord>,
    record: Option<FinalRecord>,
}

impl<'a> FormSession<'a> {
    pub fn new(schema: &'a QuestionnaireSchema) -> Self {
        Self::seeded(schema, AnswerSet::new(), None)
    }

    pub fn seeded(
        schema: &'a QuestionnaireSchema,
        answers: AnswerSet,
        guest: Option<GuestContext>,
    ) -> Self {
        Self {
            schema,
            answers,
            state: SessionState::Empty,
            errors: Vec::new(),
            guest,
            saved: None,
            record: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn answers(&self) -> &AnswerSet {
        &self.answers
    }

    /// Errors from the last failed submission attempt.
    pub fn errors(&self) -> &[ValidationError] {
        &self.errors
    }

    pub fn record(&self) -> Option<&FinalRecord> {
        self.record.as_ref()
    }

    /// Applies a control's change event. Ignored once submitted.
    pub fn apply(&mut self, change: &FieldChange) {
        if self.state == SessionState::Submitted {
            debug!(path = %change.path, "ignoring change on submitted session");
            return;
        }
        debug!(path = %change.path, "field changed");
        self.answers = self.answers.apply(change);
        if self.state == SessionState::Empty {
            self.state = SessionState::Editing;
        }
    }

    pub fn update(&mut self, path: &str, value: Value) {
        self.apply(&FieldChange::new(path, value));
    }

    pub fn visible(&self) -> BTreeSet<String> {
        compute_visible(&self.answers, self.schema)
    }

    pub fn conditions(&self) -> ConditionalFieldState {
        conditional_state(self.schema, &self.answers)
    }

    pub fn render(&self, today: NaiveDate) -> RenderPayload {
        build_render_payload(self.schema, &self.answers, today)
    }

    /// Validates, derives and persists the record, then sends the completion
    /// notice without waiting on or reporting its outcome.
    ///
    /// Validation failure leaves the answers untouched with the errors kept;
    /// a store failure returns the session to `Editing` so it can be retried.
    /// A retry after the record was stored only marks the guest completed.
    pub fn submit(
        &mut self,
        today: NaiveDate,
        store: &mut dyn RecordStore,
        notifier: Option<&Notifier<'_>>,
    ) -> Result<&FinalRecord, SubmitError> {
        if self.state == SessionState::Submitted {
            return Err(SubmitError::AlreadySubmitted);
        }
        self.errors.clear();

        let record = match self.saved.take() {
            Some(saved) => {
                debug!("record already stored; retrying completion mark");
                saved
            }
            None => self.create_record(today, store)?,
        };
        if let Some(guest) = &self.guest {
            if let Err(err) = store.mark_completed(&guest.guest_id, today) {
                warn!(error = %err, "marking guest completed failed");
                self.saved = Some(record);
                self.state = SessionState::Editing;
                return Err(err.into());
            }
        }
        self.state = SessionState::Submitted;
        info!(
            guest = %self.guest.as_ref().map(|guest| redact_id(&guest.guest_id)).unwrap_or_default(),
            "questionnaire submitted"
        );

        if let Some(notifier) = notifier {
            self.notify_completion(notifier, &record);
        }
        Ok(self.record.insert(record))
    }

    fn create_record(
        &mut self,
        today: NaiveDate,
        store: &mut dyn RecordStore,
    ) -> Result<FinalRecord, SubmitError> {
        let mut record = match finalize(self.schema, &self.answers, today) {
            Ok(record) => record,
            Err(validation) => {
                info!(errors = validation.errors.len(), "submission rejected by validation");
                self.errors = validation.errors.clone();
                self.state = SessionState::EditingWithErrors;
                return Err(SubmitError::Validation(validation));
            }
        };
        if let Some(guest) = &self.guest {
            record = record.with_guest(guest.guest_id.clone());
        }
        if let Err(err) = store.create_record(&record) {
            warn!(error = %err, "saving questionnaire failed");
            self.state = SessionState::Editing;
            return Err(err.into());
        }
        Ok(record)
    }

    fn notify_completion(&self, notifier: &Notifier<'_>, record: &FinalRecord) {
        let Some(guest) = &self.guest else {
            return;
        };
        let Some(recipient) = &guest.line_user_id else {
            debug!("guest has no messaging identity; skipping completion notice");
            return;
        };
        let name = record
            .get("wife.name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let ctx = CompletionContext {
            name,
            first_test_date: guest.first_test_date,
        };
        match notifier.templates.completion_messages(&ctx) {
            Ok(messages) => {
                dispatch_best_effort(notifier.messenger, recipient, &messages);
            }
            Err(err) => warn!(error = %err, "rendering completion notice failed"),
        }
    }
}
