use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use cbt_core::integrity::{EnvironmentSignal, RestrictedAction};
use cbt_core::model::{AttemptResult, OptionId, QuestionKind, TestId, UserId, UserIdentity};
use cbt_core::time::format_remaining;
use services::{
    Clock, ExamLoopService, ExamSession, SaveState, StaticIdentity, SubmitOutcome, TickOutcome,
};
use storage::repository::{ResultRepository, Storage, TestRepository};
use storage::sample::sample_catalog;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidTestId { raw: String },
    InvalidUserId { raw: String },
    InvalidSeed { raw: String },
    InvalidDbUrl { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidTestId { raw } => write!(f, "invalid --test-id value: {raw}"),
            ArgsError::InvalidUserId { raw } => write!(f, "invalid --user-id value: {raw}"),
            ArgsError::InvalidSeed { raw } => write!(f, "invalid --seed value: {raw}"),
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

fn parse_u64(value: &str) -> Option<u64> {
    value.trim().parse::<u64>().ok()
}

struct Args {
    db_url: String,
    test_id: TestId,
    user_id: UserId,
    user_name: String,
    seed: Option<u64>,
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p app -- run     [--db <sqlite_url>] [--test-id <id>] [--user-id <id>]");
    eprintln!("                              [--user-name <name>] [--seed <u64>]");
    eprintln!("  cargo run -p app -- seed    [--db <sqlite_url>]");
    eprintln!("  cargo run -p app -- history [--db <sqlite_url>] [--user-id <id>]");
    eprintln!();
    eprintln!("Defaults:");
    eprintln!("  --db sqlite:cbt.sqlite3");
    eprintln!("  --test-id 1");
    eprintln!("  --user-id 1");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  CBT_DB_URL, CBT_TEST_ID, CBT_USER_ID, CBT_USER_NAME, CBT_SEED, RUST_LOG");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Run,
    Seed,
    History,
}

impl Command {
    fn from_arg(arg: &str) -> Option<Self> {
        match arg {
            "run" => Some(Self::Run),
            "seed" => Some(Self::Seed),
            "history" => Some(Self::History),
            _ => None,
        }
    }
}

impl Args {
    fn parse(args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut db_url = std::env::var("CBT_DB_URL")
            .ok()
            .map_or_else(|| normalize_sqlite_url("sqlite:cbt.sqlite3".into()), normalize_sqlite_url);
        let mut test_id = std::env::var("CBT_TEST_ID")
            .ok()
            .and_then(|value| parse_u64(&value))
            .map_or_else(|| TestId::new(1), TestId::new);
        let mut user_id = std::env::var("CBT_USER_ID")
            .ok()
            .and_then(|value| parse_u64(&value))
            .map_or_else(|| UserId::new(1), UserId::new);
        let mut user_name = std::env::var("CBT_USER_NAME").unwrap_or_else(|_| "Student".into());
        let mut seed = std::env::var("CBT_SEED")
            .ok()
            .and_then(|value| parse_u64(&value));

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = normalize_sqlite_url(value);
                }
                "--test-id" => {
                    let value = require_value(args, "--test-id")?;
                    let parsed =
                        parse_u64(&value).ok_or(ArgsError::InvalidTestId { raw: value.clone() })?;
                    test_id = TestId::new(parsed);
                }
                "--user-id" => {
                    let value = require_value(args, "--user-id")?;
                    let parsed =
                        parse_u64(&value).ok_or(ArgsError::InvalidUserId { raw: value.clone() })?;
                    user_id = UserId::new(parsed);
                }
                "--user-name" => {
                    user_name = require_value(args, "--user-name")?;
                }
                "--seed" => {
                    let value = require_value(args, "--seed")?;
                    let parsed =
                        parse_u64(&value).ok_or(ArgsError::InvalidSeed { raw: value.clone() })?;
                    seed = Some(parsed);
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
            test_id,
            user_id,
            user_name,
            seed,
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

//
// ─── TERMINAL DRIVER ───────────────────────────────────────────────────────────
//

enum Input {
    Show,
    Answer(Vec<usize>),
    Next,
    Previous,
    Goto(usize),
    Signal(EnvironmentSignal),
    Acknowledge,
    Submit,
    Retry,
    Quit,
    Help,
    Unknown(String),
}

impl Input {
    fn parse(line: &str) -> Self {
        let mut parts = line.split_whitespace();
        let Some(head) = parts.next() else {
            return Self::Show;
        };
        match head {
            "show" | "s" => Self::Show,
            "answer" | "a" => {
                let picks: Option<Vec<usize>> = parts.map(|p| p.parse::<usize>().ok()).collect();
                match picks {
                    Some(picks) => Self::Answer(picks),
                    None => Self::Unknown(line.to_string()),
                }
            }
            "next" | "n" => Self::Next,
            "prev" | "p" => Self::Previous,
            "goto" | "g" => match parts.next().and_then(|p| p.parse::<usize>().ok()) {
                Some(n) => Self::Goto(n),
                None => Self::Unknown(line.to_string()),
            },
            "blur" => Self::Signal(EnvironmentSignal::VisibilityLost),
            "copy" => Self::Signal(EnvironmentSignal::Restricted(RestrictedAction::Copy)),
            "paste" => Self::Signal(EnvironmentSignal::Restricted(RestrictedAction::Paste)),
            "menu" => Self::Signal(EnvironmentSignal::Restricted(RestrictedAction::ContextMenu)),
            "ack" => Self::Acknowledge,
            "submit" => Self::Submit,
            "retry" => Self::Retry,
            "quit" | "q" => Self::Quit,
            "help" | "h" | "?" => Self::Help,
            _ => Self::Unknown(line.to_string()),
        }
    }
}

fn print_commands() {
    println!("Commands:");
    println!("  show | next | prev | goto <n>");
    println!("  answer <option numbers...>   replaces the selection (empty clears it)");
    println!("  blur | copy | paste | menu   simulate environment signals");
    println!("  ack                          dismiss the integrity warning");
    println!("  submit                       submit (asks again if questions are unanswered)");
    println!("  retry                        resend a result whose save failed");
    println!("  quit                         leave without submitting");
}

fn render_current(session: &ExamSession) {
    let progress = session.progress();
    let Some(question) = session.current_question() else {
        return;
    };
    println!();
    println!(
        "[{}] Question {}/{}  answered {}  time left {}",
        session.test_title(),
        progress.current_index + 1,
        progress.total,
        progress.answered,
        session.remaining_display()
    );
    let hint = match question.kind() {
        QuestionKind::Single => "choose one",
        QuestionKind::Multiple => "choose all that apply",
    };
    println!("{} ({hint})", question.prompt());
    let selected = session.selection(question.id());
    for (n, option) in question.options().iter().enumerate() {
        let mark = if selected.is_some_and(|s| s.contains(&option.id())) {
            "x"
        } else {
            " "
        };
        println!("  [{mark}] {}. {}", n + 1, option.text());
    }
}

fn render_result(result: &AttemptResult) {
    println!();
    println!("Attempt finished ({})", result.trigger().as_str());
    println!(
        "  correct {}/{}  score {:.2}%",
        result.correct_answers(),
        result.total_questions(),
        result.score()
    );
    println!(
        "  time spent {}  integrity violations {}",
        format_remaining(result.time_spent().num_seconds()),
        result.violation_count()
    );
}

/// Maps 1-based option numbers of the current question to option ids.
fn picks_to_options(session: &ExamSession, picks: &[usize]) -> Option<Vec<OptionId>> {
    let question = session.current_question()?;
    picks
        .iter()
        .map(|n| {
            n.checked_sub(1)
                .and_then(|i| question.options().get(i))
                .map(|o| o.id())
        })
        .collect()
}

/// Reports a finalized attempt. Returns true when the loop can stop.
fn report_finalized(session: &ExamSession) -> bool {
    match session.save_state() {
        SaveState::Saved { result_id } => {
            if let Some(result) = session.result() {
                render_result(result);
            }
            println!("  saved as result #{result_id}");
            true
        }
        SaveState::Failed { reason } => {
            println!("Result could not be saved: {reason}");
            println!("Type `retry` to try again or `quit` to leave.");
            false
        }
        SaveState::Idle | SaveState::Pending => false,
    }
}

async fn drive(svc: &ExamLoopService, mut session: ExamSession) -> Result<(), Box<dyn std::error::Error>> {
    if session.is_submitted() {
        report_finalized(&session);
        return Ok(());
    }

    print_commands();
    render_current(&session);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    let mut warned_low_time = false;
    let mut confirm_submit = false;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match svc.tick(&mut session).await {
                    Ok(TickOutcome::Running { remaining_secs }) => {
                        if session.low_time_warning() && !warned_low_time {
                            warned_low_time = true;
                            println!(
                                "Less than {} left. The test submits itself when time runs out.",
                                format_remaining(i64::from(svc.settings().low_time_warning_secs()))
                            );
                        } else if remaining_secs % 60 == 0 {
                            println!("time left {}", format_remaining(remaining_secs));
                        }
                    }
                    Ok(TickOutcome::Expired) => {
                        println!("Time is up.");
                        if report_finalized(&session) {
                            return Ok(());
                        }
                    }
                    Ok(TickOutcome::Idle) => {}
                    Err(err) => {
                        println!("Time is up.");
                        tracing::warn!(%err, "automatic submission could not be saved");
                        report_finalized(&session);
                    }
                }
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    session.abandon();
                    return Ok(());
                };
                let input = Input::parse(&line);
                if !matches!(input, Input::Submit) {
                    confirm_submit = false;
                }
                match input {
                    Input::Show => render_current(&session),
                    Input::Answer(picks) => {
                        let kind = session.current_question().map(|q| q.kind());
                        if kind == Some(QuestionKind::Single) && picks.len() > 1 {
                            println!("This question takes a single option.");
                            continue;
                        }
                        match (session.current_question().map(|q| q.id()), picks_to_options(&session, &picks)) {
                            (Some(question_id), Some(options)) => {
                                session.answer(question_id, options);
                                render_current(&session);
                            }
                            _ => println!("Unknown option number."),
                        }
                    }
                    Input::Next => {
                        session.next();
                        render_current(&session);
                    }
                    Input::Previous => {
                        session.previous();
                        render_current(&session);
                    }
                    Input::Goto(n) => {
                        session.navigate(n.saturating_sub(1));
                        render_current(&session);
                    }
                    Input::Signal(signal) => {
                        let response = svc.on_signal(&mut session, signal);
                        if response.prevent_default {
                            println!("That action is disabled during the test.");
                        }
                        if let Some(violation) = response.violation {
                            println!(
                                "Warning #{}: leaving the test window is recorded. Type `ack` to continue.",
                                violation.sequence
                            );
                        }
                    }
                    Input::Acknowledge => session.acknowledge_violation(),
                    Input::Submit => {
                        let unanswered = session.progress().unanswered;
                        if unanswered > 0 && !confirm_submit && !session.is_submitted() {
                            confirm_submit = true;
                            println!("You still have {unanswered} unanswered question(s). Type `submit` again to confirm.");
                            continue;
                        }
                        match svc.submit(&mut session).await {
                            Ok(SubmitOutcome::Saved { .. }) => {
                                if report_finalized(&session) {
                                    return Ok(());
                                }
                            }
                            Ok(SubmitOutcome::AlreadySubmitted) => println!("Already submitted."),
                            Err(err) => {
                                tracing::warn!(%err, "submission could not be saved");
                                report_finalized(&session);
                            }
                        }
                    }
                    Input::Retry => match svc.retry_save(&mut session).await {
                        Ok(_) => {
                            if report_finalized(&session) {
                                return Ok(());
                            }
                        }
                        Err(err) => println!("Retry failed: {err}"),
                    },
                    Input::Quit => {
                        session.abandon();
                        return Ok(());
                    }
                    Input::Help => print_commands(),
                    Input::Unknown(raw) => println!("Unknown command: {raw}"),
                }
            }
        }
    }
}

async fn seed(storage: &Storage) -> Result<(), Box<dyn std::error::Error>> {
    let clock = Clock::default_clock();
    let catalog = sample_catalog(clock.now())?;
    for test in &catalog {
        storage.tests.upsert_test(test).await?;
    }
    println!("Seeded {} tests.", catalog.len());
    Ok(())
}

async fn history(storage: &Storage, user_id: UserId) -> Result<(), Box<dyn std::error::Error>> {
    let rows = storage.results.list_results_for_user(user_id, 20).await?;
    if rows.is_empty() {
        println!("No results for user {user_id}.");
    }
    for row in rows {
        println!(
            "#{} test {} {} {}/{} {:.2}% ({})",
            row.id,
            row.result.test_id(),
            row.result.completed_at().to_rfc3339(),
            row.result.correct_answers(),
            row.result.total_questions(),
            row.result.score(),
            row.result.trigger().as_str()
        );
    }
    Ok(())
}

async fn ensure_catalog(tests: &dyn TestRepository) -> Result<(), Box<dyn std::error::Error>> {
    if tests.list_tests(1).await?.is_empty() {
        tracing::info!("empty catalog, seeding demo tests");
        for test in sample_catalog(Clock::default_clock().now())? {
            tests.upsert_test(&test).await?;
        }
    }
    Ok(())
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut argv: Vec<String> = std::env::args().skip(1).collect();

    let cmd = match argv.first().map(String::as_str) {
        None => Command::Run,
        Some("--help" | "-h") => {
            print_usage();
            return Ok(());
        }
        Some(first) if first.starts_with("--") => Command::Run,
        Some(first) => Command::from_arg(first).ok_or_else(|| {
            eprintln!("unknown subcommand: {first}");
            print_usage();
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "unknown subcommand")
        })?,
    };

    if !argv.is_empty() && !argv[0].starts_with("--") {
        argv.remove(0);
    }

    let mut iter = argv.into_iter();
    let parsed = Args::parse(&mut iter).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    prepare_sqlite_file(&parsed.db_url)?;
    let storage = Storage::sqlite(&parsed.db_url).await?;

    match cmd {
        Command::Seed => seed(&storage).await,
        Command::History => history(&storage, parsed.user_id).await,
        Command::Run => {
            ensure_catalog(storage.tests.as_ref()).await?;
            let identity = StaticIdentity::signed_in(UserIdentity::new(
                parsed.user_id,
                parsed.user_name,
            ));
            let svc = ExamLoopService::new(
                Clock::default_clock(),
                Arc::clone(&storage.tests),
                Arc::clone(&storage.results),
                Arc::new(identity),
            )
            .with_shuffle_seed(parsed.seed);

            let session = svc.start_attempt(parsed.test_id).await?;
            drive(&svc, session).await
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_driver_commands() {
        assert!(matches!(Input::parse("a 1 3"), Input::Answer(p) if p == vec![1, 3]));
        assert!(matches!(Input::parse("answer"), Input::Answer(p) if p.is_empty()));
        assert!(matches!(Input::parse("a x"), Input::Unknown(_)));
        assert!(matches!(Input::parse("goto 4"), Input::Goto(4)));
        assert!(matches!(
            Input::parse("blur"),
            Input::Signal(EnvironmentSignal::VisibilityLost)
        ));
        assert!(matches!(Input::parse(""), Input::Show));
        assert!(matches!(Input::parse("submit"), Input::Submit));
    }

    #[test]
    fn memory_and_absolute_urls_pass_through() {
        assert_eq!(normalize_sqlite_url("sqlite::memory:".into()), "sqlite::memory:");
        assert_eq!(
            normalize_sqlite_url("sqlite:///tmp/cbt.sqlite3".into()),
            "sqlite:///tmp/cbt.sqlite3"
        );
        assert!(normalize_sqlite_url("sqlite:cbt.sqlite3".into()).starts_with("sqlite:///"));
    }

    #[test]
    fn rejects_bad_flag_values() {
        let mut args = vec!["--test-id".to_string(), "abc".to_string()].into_iter();
        assert!(matches!(
            Args::parse(&mut args),
            Err(ArgsError::InvalidTestId { .. })
        ));
        let mut args = vec!["--seed".to_string()].into_iter();
        assert!(matches!(
            Args::parse(&mut args),
            Err(ArgsError::MissingValue { flag: "--seed" })
        ));
    }
}
