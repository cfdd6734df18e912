use checkout_sync::application::engine::{CheckoutEngine, Collaborators};
use checkout_sync::config::SyncConfig;
use checkout_sync::domain::address::{Address, CustomerSnapshot};
use checkout_sync::domain::observer::{CheckoutEvent, ObserverResponse};
use checkout_sync::domain::payload::CheckoutDraft;
use checkout_sync::domain::ports::ValidationStore;
use checkout_sync::infrastructure::in_memory::{
    InMemorySnapshotStore, InMemoryValidationStore, NoticeLog, ScriptedPaymentProcessor,
    ScriptedStoreApi,
};
use checkout_sync::interfaces::csv::script_reader::{ScriptCommand, ScriptReader};
use clap::Parser;
use miette::{IntoDiagnostic, Result};
use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Session script CSV file (action, target, field, value)
    input: PathBuf,

    /// JSON config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Debounce window in milliseconds, for both resources
    #[arg(long)]
    debounce_ms: Option<u64>,
}

struct Session {
    engine: CheckoutEngine,
    store: Arc<InMemorySnapshotStore>,
    api: Arc<ScriptedStoreApi>,
    validation: Arc<InMemoryValidationStore>,
    notices: Arc<NoticeLog>,
}

fn hydrated_address() -> Address {
    Address::new()
        .with("first_name", "Ada")
        .with("last_name", "Lovelace")
        .with("address_1", "1 Main St")
        .with("city", "New York")
        .with("state", "NY")
        .with("postcode", "10001")
        .with("country", "US")
        .with("phone", "555-0100")
        .with("email", "ada@example.com")
}

fn build_session(config: &SyncConfig) -> Session {
    let store = Arc::new(InMemorySnapshotStore::with_data(
        CustomerSnapshot {
            billing: hydrated_address(),
            shipping: hydrated_address(),
        },
        CheckoutDraft {
            has_session: true,
            payment_method: "card".to_string(),
            ..Default::default()
        },
    ));
    let api = Arc::new(ScriptedStoreApi::new());
    let validation = Arc::new(InMemoryValidationStore::new());
    let notices = Arc::new(NoticeLog::new());
    let payment = Arc::new(ScriptedPaymentProcessor::new());

    let engine = CheckoutEngine::new(
        Collaborators {
            store: store.clone(),
            api: api.clone(),
            validation: validation.clone(),
            notices: notices.clone(),
            payment,
        },
        config,
    );

    // Block submission while any field is flagged invalid.
    let pending_errors = validation.clone();
    engine
        .observers()
        .register_fn(CheckoutEvent::Validation, move |_, _| {
            let has_errors = !pending_errors.errors().is_empty();
            async move {
                Ok(Some(if has_errors {
                    ObserverResponse::fail("Please fix the highlighted fields.")
                } else {
                    ObserverResponse::success()
                }))
            }
        });

    Session {
        engine,
        store,
        api,
        validation,
        notices,
    }
}

async fn apply(session: &Session, command: ScriptCommand) {
    match command {
        ScriptCommand::Edit {
            address,
            field,
            value,
        } => session.store.set_address_field(address, &field, &value),
        ScriptCommand::Blur => session.engine.flush().await,
        ScriptCommand::Wait(duration) => tokio::time::sleep(duration).await,
        ScriptCommand::Invalid { key, message } => session
            .validation
            .set_validation_errors([(key, message)].into()),
        ScriptCommand::Valid { key } => session.validation.clear_validation_errors(&[key]),
        ScriptCommand::FailNext(count) => session.api.fail_next(count),
        ScriptCommand::Notes(notes) => session.store.set_order_notes(&notes),
        ScriptCommand::PaymentMethod(method) => session.store.set_payment_method(&method),
        ScriptCommand::AdditionalField { key, value } => {
            session.store.set_additional_field(&key, &value)
        }
        ScriptCommand::Submit => {
            if let Err(e) = session.engine.submit().await {
                eprintln!("Error submitting checkout: {}", e);
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = match cli.config {
        Some(path) => SyncConfig::load(path).into_diagnostic()?,
        None => SyncConfig::default(),
    };
    if let Some(debounce_ms) = cli.debounce_ms {
        config = config.with_debounce_ms(debounce_ms);
    }

    let session = build_session(&config);
    session.engine.start().await;

    // Replay the script
    let file = File::open(cli.input).into_diagnostic()?;
    for command in ScriptReader::new(file).commands() {
        match command {
            Ok(command) => apply(&session, command).await,
            Err(e) => {
                eprintln!("Error reading command: {}", e);
            }
        }
    }

    // Whatever is still pending goes out before we report.
    session.engine.flush().await;
    session.engine.stop();

    let stdout = io::stdout();
    let mut out = stdout.lock();
    for request in session.api.requests() {
        writeln!(out, "{}", serde_json::to_string(&request).into_diagnostic()?).into_diagnostic()?;
    }
    for notice in session.notices.notices() {
        writeln!(out, "notice: {}", notice.message).into_diagnostic()?;
    }
    writeln!(
        out,
        "{}",
        serde_json::to_string(&session.engine.session()).into_diagnostic()?
    )
    .into_diagnostic()?;

    Ok(())
}
