#![allow(missing_docs)]

pub mod answers;
pub mod date;
pub mod derive;
pub mod guest;
pub mod message;
pub mod render;
pub mod session;
pub mod spec;
pub mod store;
pub mod template;
pub mod validate;
pub mod visibility;

pub use answers::{
    AnswerSet, FieldChange, ValidationCode, ValidationError, ValidationResult, is_blank, update,
};
pub use date::{DaysUntil, calculate_age, days_until, marriage_age, parse_date, parse_date_str};
pub use derive::{FinalRecord, derive_final_record, finalize};
pub use guest::{
    AuthError, Guest, GuestRegistration, LineIdentity, LineProfile, RegistrationError, Reminder,
    authenticate, due_reminders, find_by_line_user, generate_access_code, is_valid_access_code,
    link_line_identity, register, seed_answers,
};
pub use message::{LogMessenger, Message, Messenger, MessagingError, dispatch_best_effort};
pub use render::{
    Control, RenderPayload, RenderProgress, RenderStatus, RenderedField, build_render_payload,
    render_field, render_json_ui, render_text, toggle_option,
};
pub use session::{FormSession, GuestContext, Notifier, SessionState, SubmitError};
pub use spec::{FieldDescriptor, FieldType, QuestionnaireSchema, SchemaError, SectionSchema};
pub use store::{MemoryStore, RecordStore, StoreError};
pub use template::{CompletionContext, MessageTemplates, TemplateError};
pub use validate::validate;
pub use visibility::{
    ConditionalFieldState, VisibilityMap, compute_visible, conditional_state, resolve_visibility,
};

/// JSON Schema describing the questionnaire format.
pub fn questionnaire_json_schema() -> serde_json::Value {
    serde_json::to_value(schemars::schema_for!(QuestionnaireSchema)).unwrap_or_default()
}
