mod logging;
mod store;

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::{Value, json};
use tracing::info;

use intake_component::{render_json_ui, render_text, validate_answers};
use intake_line::{LineConfig, handle_webhook, messenger_from_config};
use intake_spec::{
    AnswerSet, DaysUntil, FormSession, Guest, GuestContext, GuestRegistration, LineProfile,
    MessageTemplates, Notifier, QuestionnaireSchema, RecordStore, SubmitError, authenticate,
    days_until, dispatch_best_effort, due_reminders, link_line_identity, parse_date_str,
    questionnaire_json_schema, register, seed_answers,
};

use logging::{LogConfig, init_logging};
use store::FileStore;

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Clinic guest intake CLI",
    long_about = "Renders, validates and submits the first-visit questionnaire, manages guest registration and sends LINE notifications"
)]
struct Cli {
    /// Questionnaire JSON to use instead of the built-in one.
    #[arg(long, value_name = "SCHEMA", global = true)]
    schema: Option<PathBuf>,
    /// Guest/record store file.
    #[arg(
        long,
        value_name = "STORE",
        env = "CLINIC_INTAKE_STORE",
        default_value = "intake-store.json",
        global = true
    )]
    store: PathBuf,
    /// Date to treat as today (YYYY-MM-DD); defaults to the local date.
    #[arg(long, value_name = "DATE", value_parser = parse_day, global = true)]
    today: Option<NaiveDate>,
    /// Debug-level logging.
    #[arg(long, short, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum RenderMode {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Print the JSON Schema of the questionnaire format.
    Schema,
    /// Render the questionnaire for a set of answers.
    Render {
        /// JSON file with the current answers.
        #[arg(long, value_name = "ANSWERS")]
        answers: Option<PathBuf>,
        #[arg(long, value_enum, default_value_t = RenderMode::Text)]
        format: RenderMode,
    },
    /// Validate answers and list every problem.
    Validate {
        #[arg(long, value_name = "ANSWERS")]
        answers: PathBuf,
    },
    /// Pre-register a guest and print the access code.
    Register {
        #[arg(long)]
        phone: String,
        #[arg(long, value_parser = parse_day)]
        birth_date: NaiveDate,
        /// Wife's first blood-test date.
        #[arg(long, value_parser = parse_day)]
        first_test: NaiveDate,
        /// Husband's first blood-test date; defaults to the wife's.
        #[arg(long, value_parser = parse_day)]
        husband_first_test: Option<NaiveDate>,
    },
    /// Log in with access code and birth date, optionally linking a LINE user.
    Login {
        #[arg(long)]
        code: String,
        #[arg(long, value_parser = parse_day)]
        birth_date: NaiveDate,
        #[arg(long)]
        line_user: Option<String>,
        #[arg(long, requires = "line_user")]
        display_name: Option<String>,
    },
    /// Validate, derive and store the final record, then notify the guest.
    Submit {
        #[arg(long, value_name = "ANSWERS")]
        answers: PathBuf,
        /// Access code of the guest the answers belong to.
        #[arg(long, requires = "birth_date")]
        code: Option<String>,
        #[arg(long, value_parser = parse_day)]
        birth_date: Option<NaiveDate>,
        /// Also write the record as CBOR.
        #[arg(long, value_name = "FILE")]
        cbor: Option<PathBuf>,
    },
    /// Send day-before reminders for tomorrow's first blood tests.
    Remind,
    /// Check a webhook delivery signature and summarise its events.
    VerifyWebhook {
        /// Raw request body.
        #[arg(long, value_name = "BODY")]
        body: PathBuf,
        /// Value of the x-line-signature header.
        #[arg(long)]
        signature: String,
    },
}

fn main() -> CliResult<()> {
    let cli = Cli::parse();
    init_logging(&LogConfig::from_verbose(cli.verbose));
    let today = cli.today.unwrap_or_else(|| Local::now().date_naive());

    match cli.command {
        Command::Schema => run_schema(),
        Command::Render { answers, format } => {
            run_render(cli.schema.as_deref(), answers.as_deref(), format, today)
        }
        Command::Validate { answers } => run_validate(cli.schema.as_deref(), &answers, today),
        Command::Register {
            phone,
            birth_date,
            first_test,
            husband_first_test,
        } => run_register(
            &cli.store,
            GuestRegistration {
                phone_number: phone,
                birth_date,
                wife_first_blood_date: first_test,
                husband_first_blood_date: husband_first_test,
            },
            today,
        ),
        Command::Login {
            code,
            birth_date,
            line_user,
            display_name,
        } => run_login(&cli.store, &code, birth_date, line_user, display_name, today),
        Command::Submit {
            answers,
            code,
            birth_date,
            cbor,
        } => run_submit(
            cli.schema.as_deref(),
            &cli.store,
            &answers,
            code.zip(birth_date),
            cbor.as_deref(),
            today,
        ),
        Command::Remind => run_remind(&cli.store, today),
        Command::VerifyWebhook { body, signature } => run_verify_webhook(&body, &signature),
    }
}

fn parse_day(raw: &str) -> Result<NaiveDate, String> {
    parse_date_str(raw).ok_or_else(|| format!("'{}' is not a date (expected YYYY-MM-DD)", raw))
}

fn run_schema() -> CliResult<()> {
    println!("{}", serde_json::to_string_pretty(&questionnaire_json_schema())?);
    Ok(())
}

fn load_schema(path: Option<&Path>) -> CliResult<QuestionnaireSchema> {
    match path {
        Some(path) => Ok(QuestionnaireSchema::from_json(&fs::read_to_string(path)?)?),
        None => Ok(QuestionnaireSchema::builtin()?),
    }
}

/// Component config carrying the `--schema` override, if any.
fn component_config(path: Option<&Path>) -> CliResult<String> {
    match path {
        Some(path) => {
            let questionnaire = fs::read_to_string(path)?;
            Ok(json!({ "questionnaireJson": questionnaire }).to_string())
        }
        None => Ok(String::new()),
    }
}

fn read_answers(path: &Path) -> CliResult<AnswerSet> {
    let value: Value = serde_json::from_str(&fs::read_to_string(path)?)?;
    if !value.is_object() {
        return Err(format!("{} must contain a JSON object", path.display()).into());
    }
    Ok(AnswerSet::from_value(value))
}

fn parse_component_result(response: &str) -> CliResult<Value> {
    let value: Value = serde_json::from_str(response)?;
    if let Some(error) = value.get("error").and_then(Value::as_str) {
        Err(error.into())
    } else {
        Ok(value)
    }
}

fn run_render(
    schema_path: Option<&Path>,
    answers_path: Option<&Path>,
    format: RenderMode,
    today: NaiveDate,
) -> CliResult<()> {
    let schema = load_schema(schema_path)?;
    let config = component_config(schema_path)?;
    let answers = match answers_path {
        Some(path) => read_answers(path)?,
        None => AnswerSet::new(),
    };
    let ctx = json!({ "today": today.to_string() }).to_string();
    let answers_json = answers.into_value().to_string();

    match format {
        RenderMode::Text => {
            let text = render_text(&schema.id, &config, &ctx, &answers_json);
            if text.starts_with('{') {
                parse_component_result(&text)?;
            }
            println!("{}", text);
        }
        RenderMode::Json => {
            let ui = parse_component_result(&render_json_ui(
                &schema.id,
                &config,
                &ctx,
                &answers_json,
            ))?;
            println!("{}", serde_json::to_string_pretty(&ui)?);
        }
    }
    Ok(())
}

fn run_validate(schema_path: Option<&Path>, answers_path: &Path, today: NaiveDate) -> CliResult<()> {
    let schema = load_schema(schema_path)?;
    let config = component_config(schema_path)?;
    let answers = read_answers(answers_path)?;
    let ctx = json!({ "today": today.to_string() }).to_string();
    let result = parse_component_result(&validate_answers(
        &schema.id,
        &config,
        &ctx,
        &answers.into_value().to_string(),
    ))?;

    let valid = result["valid"].as_bool().unwrap_or(false);
    println!(
        "Validation result: {}",
        if valid { "valid" } else { "invalid" }
    );
    describe_validation(&result);

    if valid {
        Ok(())
    } else {
        Err("validation failed".into())
    }
}

fn describe_validation(result: &Value) {
    let Some(errors) = result["errors"].as_array().filter(|errors| !errors.is_empty()) else {
        return;
    };
    println!("Errors:");
    for error in errors {
        println!(
            "  {} - {}",
            error["path"].as_str().unwrap_or("<unknown>"),
            error["message"].as_str().unwrap_or_default()
        );
    }
}

fn run_register(store_path: &Path, registration: GuestRegistration, today: NaiveDate) -> CliResult<()> {
    let mut store = FileStore::open(store_path)?;
    let mut rng = rand::thread_rng();
    let guest = register(&mut store, registration, &mut rng, today)?;
    println!("Guest registered");
    println!("  id: {}", guest.id);
    println!("  access code: {}", guest.access_code);
    Ok(())
}

fn run_login(
    store_path: &Path,
    code: &str,
    birth_date: NaiveDate,
    line_user: Option<String>,
    display_name: Option<String>,
    today: NaiveDate,
) -> CliResult<()> {
    let mut store = FileStore::open(store_path)?;
    let mut guest = authenticate(&store, code, birth_date)?;
    if let Some(user_id) = line_user {
        let profile = LineProfile {
            user_id,
            display_name: display_name.unwrap_or_default(),
            picture_url: None,
        };
        guest = link_line_identity(&mut store, guest, profile, today);
    }

    println!("Logged in as guest {}", guest.id);
    println!(
        "Questionnaire: {}",
        if guest.is_completed { "completed" } else { "not completed" }
    );
    println!("First blood test: {}", countdown(&guest, today));
    if let Some(line) = &guest.line {
        println!("LINE user: {}", line.user_id());
    }
    Ok(())
}

fn countdown(guest: &Guest, today: NaiveDate) -> String {
    let date = guest.wife_first_blood_date;
    match days_until(date, today) {
        Some(DaysUntil::Today) => format!("{} (today)", date),
        Some(DaysUntil::Days(days)) => format!("{} (in {} days)", date, days),
        None => format!("{} (passed)", date),
    }
}

/// Applies the answers file on top of the seeded answers.
///
/// Empty objects carry no answers and would otherwise replace a seeded branch.
fn replay_answers(session: &mut FormSession<'_>, answers: &AnswerSet) {
    for (path, value) in answers.leaves() {
        if value.as_object().is_some_and(|object| object.is_empty()) {
            continue;
        }
        session.update(&path, value);
    }
}

fn run_submit(
    schema_path: Option<&Path>,
    store_path: &Path,
    answers_path: &Path,
    login: Option<(String, NaiveDate)>,
    cbor_path: Option<&Path>,
    today: NaiveDate,
) -> CliResult<()> {
    let schema = load_schema(schema_path)?;
    let answers = read_answers(answers_path)?;
    let mut store = FileStore::open(store_path)?;
    let guest = match login {
        Some((code, birth_date)) => Some(authenticate(&store, &code, birth_date)?),
        None => None,
    };

    let mut session = FormSession::seeded(
        &schema,
        seed_answers(guest.as_ref()),
        guest.as_ref().map(GuestContext::from),
    );
    replay_answers(&mut session, &answers);

    let messenger = messenger_from_config(&LineConfig::from_env())?;
    let templates = MessageTemplates::new()?;
    let notifier = Notifier {
        messenger: messenger.as_ref(),
        templates: &templates,
    };

    let record = match session.submit(today, &mut store, Some(&notifier)) {
        Ok(record) => record,
        Err(SubmitError::Validation(result)) => {
            println!("Validation result: invalid");
            describe_validation(&serde_json::to_value(&result)?);
            return Err("validation failed".into());
        }
        Err(err) => return Err(err.into()),
    };

    if let Some(path) = cbor_path {
        fs::write(path, record.to_cbor()?)?;
    }
    println!("{}", serde_json::to_string_pretty(record)?);
    Ok(())
}

fn run_remind(store_path: &Path, today: NaiveDate) -> CliResult<()> {
    let store = FileStore::open(store_path)?;
    let reminders = due_reminders(&store.guests()?, today);
    let messenger = messenger_from_config(&LineConfig::from_env())?;
    let templates = MessageTemplates::new()?;

    let mut sent = 0;
    for reminder in &reminders {
        let messages = templates.reminder_messages(&reminder.name)?;
        if dispatch_best_effort(messenger.as_ref(), &reminder.user_id, &messages) {
            sent += 1;
        }
    }
    info!(due = reminders.len(), sent, "reminders processed");
    println!("Reminders sent: {}/{}", sent, reminders.len());
    Ok(())
}

fn run_verify_webhook(body_path: &Path, signature: &str) -> CliResult<()> {
    let config = LineConfig::from_env();
    let body = fs::read(body_path)?;
    let summary = handle_webhook(config.secret()?, &body, signature)?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
