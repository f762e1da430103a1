use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use miette::{IntoDiagnostic, Result};
use rust_decimal::Decimal;
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tutorbook::application::checkout::CheckoutService;
use tutorbook::application::conflicts::ConflictDetector;
use tutorbook::application::lifecycle::BookingLifecycle;
use tutorbook::application::matching::{MatchingService, SearchCriteria, SearchMode};
use tutorbook::config::BookingConfig;
use tutorbook::domain::booking::{BookingId, UserId};
use tutorbook::domain::ports::{BookingStoreBox, ClockBox};
use tutorbook::domain::principal::{Principal, Role};
use tutorbook::error::BookingError;
use tutorbook::infrastructure::clock::{ManualClock, SystemClock};
use tutorbook::infrastructure::in_memory::{
    InMemoryBookingStore, InMemoryPaymentGateway, InMemoryTeacherDirectory,
    RecordingNotificationSink,
};
use tutorbook::interfaces::csv::action_reader::{ActionKind, ActionReader, ActionRecord};
use tutorbook::interfaces::csv::booking_writer::BookingWriter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// TOML configuration file (optional). TUTORBOOK_* variables override it.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Rank teachers for a subject and level at a given time
    Search(SearchArgs),
    /// Replay booking actions from a CSV file and print the resulting bookings
    Process(ProcessArgs),
}

#[derive(Args)]
struct SearchArgs {
    /// JSON array of teacher profiles
    #[arg(long)]
    roster: PathBuf,

    #[arg(long)]
    subject: String,

    #[arg(long)]
    level: String,

    /// Session length in minutes
    #[arg(long, default_value_t = 60)]
    duration: u32,

    /// Session start (RFC 3339)
    #[arg(long, conflicts_with = "now", required_unless_present = "now")]
    at: Option<DateTime<Utc>>,

    /// Search for a session starting right away
    #[arg(long)]
    now: bool,

    #[arg(long)]
    max_price: Option<Decimal>,

    #[arg(long)]
    language: Option<String>,

    #[arg(long)]
    specialization: Option<String>,

    /// Evaluate the search as if the current time were this instant
    #[arg(long)]
    clock: Option<DateTime<Utc>>,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long)]
    db_path: Option<PathBuf>,
}

#[derive(Args)]
struct ProcessArgs {
    /// Input actions CSV file
    input: PathBuf,

    /// JSON array of teacher profiles
    #[arg(long)]
    roster: PathBuf,

    /// JSON array of gateway transactions to verify against
    #[arg(long)]
    payments: Option<PathBuf>,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long)]
    db_path: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Arc::new(BookingConfig::load(cli.config.as_deref()).into_diagnostic()?);

    match cli.command {
        Command::Search(args) => search(config, args).await,
        Command::Process(args) => process(config, args).await,
    }
}

async fn search(config: Arc<BookingConfig>, args: SearchArgs) -> Result<()> {
    let teachers =
        InMemoryTeacherDirectory::from_json_reader(File::open(&args.roster).into_diagnostic()?)
            .into_diagnostic()?;
    let store = open_store(args.db_path)?;
    let clock: ClockBox = match args.clock {
        Some(now) => Arc::new(ManualClock::new(now)),
        None => Arc::new(SystemClock),
    };
    let matching = MatchingService::new(
        config,
        Arc::new(teachers),
        ConflictDetector::new(store),
        clock,
    );

    let mode = match args.at {
        Some(at) if !args.now => SearchMode::Scheduled(at),
        _ => SearchMode::Instant,
    };
    let criteria = SearchCriteria {
        subject_id: args.subject,
        level: args.level,
        language: args.language,
        specialization: args.specialization,
        duration_minutes: args.duration,
        max_price: args.max_price,
        mode,
    };

    let outcome = matching.search(&criteria).await.into_diagnostic()?;
    if let Some(reason) = outcome.empty_reason {
        eprintln!("No teachers found: {}", reason.message());
    }

    let stdout = io::stdout();
    let mut writer = BookingWriter::new(stdout.lock());
    writer.write_summaries(&outcome.teachers).into_diagnostic()?;
    Ok(())
}

struct Replay {
    store: BookingStoreBox,
    checkout: CheckoutService,
    lifecycle: BookingLifecycle,
}

async fn process(config: Arc<BookingConfig>, args: ProcessArgs) -> Result<()> {
    let teachers = Arc::new(
        InMemoryTeacherDirectory::from_json_reader(File::open(&args.roster).into_diagnostic()?)
            .into_diagnostic()?,
    );
    let gateway = match &args.payments {
        Some(path) => InMemoryPaymentGateway::from_json_reader(File::open(path).into_diagnostic()?)
            .into_diagnostic()?,
        None => InMemoryPaymentGateway::new(),
    };
    let store = open_store(args.db_path)?;
    let clock = ManualClock::new(Utc::now());
    let notifications = Arc::new(RecordingNotificationSink::new());

    let replay = Replay {
        checkout: CheckoutService::new(
            config.clone(),
            Arc::new(gateway),
            store.clone(),
            teachers,
            notifications.clone(),
            Arc::new(clock.clone()),
        ),
        lifecycle: BookingLifecycle::new(
            config,
            store.clone(),
            notifications,
            Arc::new(clock.clone()),
        ),
        store,
    };

    let file = File::open(&args.input).into_diagnostic()?;
    let reader = ActionReader::new(file);
    for action in reader.actions() {
        match action {
            Ok(action) => {
                clock.set(action.at);
                if let Err(e) = apply(&replay, &action).await {
                    eprintln!(
                        "Error processing {:?} on {}: {}",
                        action.action,
                        action.reference,
                        e.public_message()
                    );
                }
            }
            Err(e) => {
                eprintln!("Error reading action: {}", e);
            }
        }
    }

    let bookings = replay.store.all().await.into_diagnostic()?;
    let stdout = io::stdout();
    let mut writer = BookingWriter::new(stdout.lock());
    writer.write_bookings(&bookings).into_diagnostic()?;
    Ok(())
}

async fn apply(replay: &Replay, action: &ActionRecord) -> Result<(), BookingError> {
    let lifecycle = &replay.lifecycle;
    match action.action {
        ActionKind::Pay => {
            replay.checkout.complete_booking(&action.reference).await?;
        }
        ActionKind::Accept => {
            let (principal, id) = target(replay, action).await?;
            lifecycle.accept(&principal, id).await?;
        }
        ActionKind::Decline => {
            let (principal, id) = target(replay, action).await?;
            lifecycle.decline(&principal, id).await?;
        }
        ActionKind::Cancel => {
            let (principal, id) = target(replay, action).await?;
            lifecycle.cancel(&principal, id).await?;
        }
        ActionKind::Reschedule => {
            let (principal, id) = target(replay, action).await?;
            lifecycle.request_reschedule(&principal, id).await?;
        }
        ActionKind::Complete => {
            let (principal, id) = target(replay, action).await?;
            lifecycle.complete(&principal, id).await?;
        }
        ActionKind::Review => {
            let (principal, id) = target(replay, action).await?;
            let rating = action.rating.ok_or_else(|| {
                BookingError::ValidationError("review needs a rating".to_string())
            })?;
            lifecycle.submit_review(&principal, id, rating, None).await?;
        }
    }
    Ok(())
}

/// The booking behind the action's payment reference and the actor acting on it.
async fn target(
    replay: &Replay,
    action: &ActionRecord,
) -> Result<(Principal, BookingId), BookingError> {
    let booking = replay
        .store
        .find_by_payment_reference(&action.reference)
        .await?
        .ok_or_else(|| BookingError::not_found("booking", &action.reference))?;

    // Stand-in for the identity provider: the actor's role is whichever side
    // of the booking they claim to be.
    let session = (!action.actor.is_empty()).then(|| {
        let user_id = UserId::new(action.actor.clone());
        let role = if user_id == booking.teacher_id {
            Role::Teacher
        } else {
            Role::Student
        };
        Principal { user_id, role }
    });
    Ok((Principal::require(session)?, booking.id))
}

#[cfg(feature = "storage-rocksdb")]
fn open_store(db_path: Option<PathBuf>) -> Result<BookingStoreBox> {
    use tutorbook::infrastructure::rocksdb::RocksDBStore;

    match db_path {
        Some(path) => Ok(Arc::new(RocksDBStore::open(path).into_diagnostic()?)),
        None => Ok(Arc::new(InMemoryBookingStore::new())),
    }
}

#[cfg(not(feature = "storage-rocksdb"))]
fn open_store(db_path: Option<PathBuf>) -> Result<BookingStoreBox> {
    if db_path.is_some() {
        eprintln!(
            "WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
        );
    }
    Ok(Arc::new(InMemoryBookingStore::new()))
}
