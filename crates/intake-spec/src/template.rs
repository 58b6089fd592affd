use chrono::NaiveDate;
use handlebars::Handlebars;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use crate::message::Message;

const COMPLETION_PARTS: [(&str, &str); 4] = [
    (
        "completion.greeting",
        "{{name}}\n\nThank you for completing your first-visit registration.\n\nPlease note the following:",
    ),
    (
        "completion.belongings",
        "📋 Please bring\n・Your My Number card (health insurance card)\n・Your medication notebook\n・Your basal body temperature chart (if you have one)",
    ),
    (
        "completion.parking",
        "🚗 Parking\nThe clinic car park is available to patients. If it is full, please use a nearby coin parking.",
    ),
    (
        "completion.first_test",
        "⏰ First blood test\n{{first_test_date}}\n\nWe will send you a reminder the day before.",
    ),
];

const REMINDER: (&str, &str) = (
    "reminder",
    "{{name}}\n\nYour first blood test is tomorrow.\n\n📋 Please check your belongings\n・My Number card\n・Medication notebook\n\nWe look forward to seeing you.",
);

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("template registration failed: {0}")]
    Register(#[from] Box<handlebars::TemplateError>),
    #[error("template rendering failed: {0}")]
    Render(#[from] handlebars::RenderError),
}

/// Handlebars registry holding the notification templates.
pub struct MessageTemplates {
    registry: Handlebars<'static>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompletionContext {
    pub name: String,
    pub first_test_date: Option<NaiveDate>,
}

impl MessageTemplates {
    pub fn new() -> Result<Self, TemplateError> {
        let mut registry = Handlebars::new();
        registry.set_strict_mode(true);
        registry.register_escape_fn(handlebars::no_escape);
        for &(name, source) in COMPLETION_PARTS.iter().chain(std::iter::once(&REMINDER)) {
            registry
                .register_template_string(name, source)
                .map_err(Box::new)?;
        }
        Ok(Self { registry })
    }

    /// The four-part notice sent after a successful submission.
    ///
    /// The blood-test part is left out when no date is known.
    pub fn completion_messages(&self, ctx: &CompletionContext) -> Result<Vec<Message>, TemplateError> {
        let data = json!({
            "name": ctx.name,
            "first_test_date": ctx.first_test_date.map(long_date),
        });
        let mut messages = Vec::new();
        for (name, _) in COMPLETION_PARTS {
            if name == "completion.first_test" && ctx.first_test_date.is_none() {
                continue;
            }
            messages.push(Message::text(self.registry.render(name, &data)?));
        }
        Ok(messages)
    }

    pub fn reminder_messages(&self, name: &str) -> Result<Vec<Message>, TemplateError> {
        let text = self.registry.render(REMINDER.0, &json!({ "name": name }))?;
        Ok(vec![Message::text(text)])
    }
}

fn long_date(date: NaiveDate) -> String {
    date.format("%B %-d, %Y").to_string()
}
