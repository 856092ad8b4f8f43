use std::fmt;
use std::sync::Arc;

use services::{Clock, ProgressionService};
use storage::repository::Storage;
use training_core::model::{
    LearnerId, Module, ModuleId, Page, Quiz, QuizQuestion, TrainingPathId,
};

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidId { flag: &'static str, raw: String },
    InvalidDbUrl { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidId { flag, raw } => write!(f, "invalid {flag} value: {raw}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

struct Args {
    db_url: String,
    module_id: ModuleId,
    learner_id: LearnerId,
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p app -- seed [--db <sqlite_url>] [--module-id <id>]");
    eprintln!(
        "  cargo run -p app -- walk [--db <sqlite_url>] [--module-id <id>] [--learner-id <id>]"
    );
    eprintln!();
    eprintln!("Defaults:");
    eprintln!("  --db sqlite:dev.sqlite3");
    eprintln!("  --module-id 1");
    eprintln!("  --learner-id 1");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  TRAIN_DB_URL, TRAIN_MODULE_ID, TRAIN_LEARNER_ID");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Seed,
    Walk,
}

impl Command {
    fn from_arg(arg: &str) -> Option<Self> {
        match arg {
            "seed" => Some(Self::Seed),
            "walk" => Some(Self::Walk),
            _ => None,
        }
    }
}

impl Args {
    fn parse(args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut db_url = std::env::var("TRAIN_DB_URL")
            .ok()
            .map_or_else(|| "sqlite://dev.sqlite3".into(), normalize_sqlite_url);
        let mut module_id = std::env::var("TRAIN_MODULE_ID")
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .map_or_else(|| ModuleId::new(1), ModuleId::new);
        let mut learner_id = std::env::var("TRAIN_LEARNER_ID")
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .map_or_else(|| LearnerId::new(1), LearnerId::new);

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = normalize_sqlite_url(value);
                }
                "--module-id" => {
                    let value = require_value(args, "--module-id")?;
                    let parsed: u64 = value.parse().map_err(|_| ArgsError::InvalidId {
                        flag: "--module-id",
                        raw: value.clone(),
                    })?;
                    module_id = ModuleId::new(parsed);
                }
                "--learner-id" => {
                    let value = require_value(args, "--learner-id")?;
                    let parsed: u64 = value.parse().map_err(|_| ArgsError::InvalidId {
                        flag: "--learner-id",
                        raw: value.clone(),
                    })?;
                    learner_id = LearnerId::new(parsed);
                }
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(Self {
            db_url,
            module_id,
            learner_id,
        })
    }
}

fn normalize_sqlite_url(raw: String) -> String {
    if raw == "sqlite::memory:" || raw.starts_with("sqlite://") {
        return raw;
    }

    let trimmed = raw.trim().to_string();
    let path_str = trimmed
        .strip_prefix("sqlite:")
        .unwrap_or(trimmed.as_str())
        .to_string();
    let path = std::path::Path::new(&path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| std::path::PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

fn prepare_sqlite_file(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    if db_url == "sqlite::memory:" {
        return Ok(());
    }

    let path = db_url
        .strip_prefix("sqlite://")
        .ok_or_else(|| ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        })?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        }
        .into());
    }

    let path = std::path::Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
    }

    Ok(())
}

/// Sample onboarding module: two quiz-gated pages and a summary page.
fn sample_module(
    id: ModuleId,
    now: chrono::DateTime<chrono::Utc>,
) -> Result<Module, Box<dyn std::error::Error>> {
    let hazard_quiz = Quiz::new(vec![
        QuizQuestion::new(
            "Which fire extinguisher class covers electrical equipment?",
            vec!["Class A".into(), "Class C".into(), "Class K".into()],
            1,
        )?,
        QuizQuestion::new(
            "What is the first step when you discover a fire?",
            vec!["Fight it yourself".into(), "Raise the alarm".into()],
            1,
        )?,
    ])?;

    let handling_quiz = Quiz::new(vec![QuizQuestion::new(
        "How should heavy loads be lifted?",
        vec!["With a straight back".into(), "By bending the spine".into()],
        0,
    )?])?;

    Ok(Module::new(
        id,
        "Workplace Safety Basics",
        Some("mandatory annual refresher".into()),
        Some(TrainingPathId::new(1)),
        vec![
            Page::new("Recognizing hazards", Some(hazard_quiz))?,
            Page::new("Safe handling", Some(handling_quiz))?,
            Page::new("Summary", None)?,
        ],
        now,
    )?)
}

async fn seed(storage: &Storage, module_id: ModuleId) -> Result<(), Box<dyn std::error::Error>> {
    let module = sample_module(module_id, Clock::default_clock().now())?;
    storage.modules.upsert_module(&module).await?;
    println!(
        "seeded module {} ({} pages): {}",
        module.id(),
        module.page_count(),
        module.title()
    );
    Ok(())
}

/// Walks a learner through the module front to back, answering every quiz
/// correctly, and prints the progression as it unfolds.
async fn walk(
    storage: &Storage,
    module_id: ModuleId,
    learner_id: LearnerId,
) -> Result<(), Box<dyn std::error::Error>> {
    let service = ProgressionService::new(
        Clock::default_clock(),
        Arc::clone(&storage.modules),
        Arc::clone(&storage.progress),
        Arc::clone(&storage.attempts),
    );

    let mut session = service.open(learner_id, module_id).await?;
    println!(
        "opened '{}' for learner {} ({:?})",
        session.module().title(),
        learner_id,
        session.progress().status()
    );

    for index in 0..session.module().page_count() {
        if index != session.current_page_index() {
            service.navigate(&mut session, index).await?;
        }
        let page = session.current_page();
        println!("page {index}: {}", page.title());

        if let Some(quiz) = page.quiz() {
            let answers: Vec<Option<usize>> = quiz
                .questions()
                .iter()
                .map(|q| Some(q.correct_option()))
                .collect();
            let submission = service.submit_quiz(&mut session, index, &answers).await?;
            println!(
                "  quiz: {}% ({}/{} correct), passed: {}",
                submission.outcome.score,
                submission.outcome.correct,
                submission.outcome.total,
                submission.outcome.passed
            );
        } else if !session.progress().is_page_complete(index) && index == session.module().page_count() - 1 {
            let outcome = service.complete_page(&mut session, index).await?;
            if outcome.module_completed {
                println!(
                    "  module completed, overall score: {}",
                    outcome.overall_score.unwrap_or(0)
                );
            }
        }
    }

    let overview = session.overview();
    println!(
        "done: {:?}, {}/{} pages ({}%)",
        overview.status,
        overview.completed_pages,
        overview.total_pages,
        overview.percent_complete()
    );
    Ok(())
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut argv: Vec<String> = std::env::args().skip(1).collect();

    let cmd = match argv.first().map(String::as_str) {
        None | Some("--help" | "-h") => {
            print_usage();
            return Ok(());
        }
        Some(first) => Command::from_arg(first).ok_or_else(|| {
            eprintln!("unknown subcommand: {first}");
            print_usage();
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "unknown subcommand")
        })?,
    };
    argv.remove(0);

    let mut iter = argv.into_iter();
    let parsed = Args::parse(&mut iter).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    // Open + migrate SQLite at startup. Keep this in the binary glue so
    // core/services stay pure.
    prepare_sqlite_file(&parsed.db_url)?;
    let storage = Storage::sqlite(&parsed.db_url).await?;

    match cmd {
        Command::Seed => seed(&storage, parsed.module_id).await,
        Command::Walk => walk(&storage, parsed.module_id, parsed.learner_id).await,
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    if let Err(err) = run().await {
        // At this layer (binary glue), printing once is fine.
        eprintln!("{err}");
        std::process::exit(2);
    }
}
