use std::fmt;
use std::path::PathBuf;

use services::config::parse_base_url;
use services::{
    CardOutcome, DEMO_DECK_ID, RemoteConfig, SessionHost, SessionObserver, StudyConfig,
    StudyServices,
};
use storage::repository::DeckRepository;
use study_core::model::{CardId, DeckId, ProgressSnapshot};
use study_core::session::SessionView;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidId { flag: &'static str, raw: String },
    InvalidDbUrl { raw: String },
    InvalidRemoteUrl { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidId { flag, raw } => write!(f, "invalid {flag} value: {raw:?}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::InvalidRemoteUrl { raw } => write!(f, "invalid --remote value: {raw}"),
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

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p app -- study  [options]   # interactive session over stdin");
    eprintln!("  cargo run -p app -- seed   [options]   # write the demo deck");
    eprintln!("  cargo run -p app -- status [options]   # show saved progress");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --db <sqlite_url>    default sqlite://study.sqlite3");
    eprintln!("  --deck <id>          default {DEMO_DECK_ID}");
    eprintln!("  --learner <id>       default local");
    eprintln!("  --cache <path>       default study-progress.json");
    eprintln!("  --remote <url>       sync progress over HTTP instead of SQLite");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  STUDY_DB_URL, STUDY_DECK_ID, STUDY_LEARNER_ID, STUDY_CACHE_PATH,");
    eprintln!("  STUDY_DEBOUNCE_MS, STUDY_REMOTE_URL, STUDY_REMOTE_TOKEN, RUST_LOG");
}

fn print_keys() {
    println!("keys: [f]lip  [k]now  [l]ater  [u]nmark  [n]ext  [p]rev  [s]tart review");
    println!("      restart  [q]uit  [h]elp");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Study,
    Seed,
    Status,
}

impl Command {
    fn from_arg(arg: &str) -> Option<Self> {
        match arg {
            "study" => Some(Self::Study),
            "seed" => Some(Self::Seed),
            "status" => Some(Self::Status),
            _ => None,
        }
    }
}

struct Args {
    config: StudyConfig,
    deck_id: DeckId,
}

impl Args {
    fn parse(
        mut config: StudyConfig,
        args: &mut impl Iterator<Item = String>,
    ) -> Result<Self, ArgsError> {
        config.db_url = normalize_sqlite_url(config.db_url);
        let mut deck_id = config
            .deck_id
            .clone()
            .unwrap_or_else(|| DeckId::new(DEMO_DECK_ID));

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    config.db_url = normalize_sqlite_url(value);
                }
                "--deck" => {
                    let value = require_value(args, "--deck")?;
                    deck_id = value.parse().map_err(|_| ArgsError::InvalidId {
                        flag: "--deck",
                        raw: value.clone(),
                    })?;
                }
                "--learner" => {
                    let value = require_value(args, "--learner")?;
                    config.learner = value.parse().map_err(|_| ArgsError::InvalidId {
                        flag: "--learner",
                        raw: value.clone(),
                    })?;
                }
                "--cache" => {
                    config.cache_path = PathBuf::from(require_value(args, "--cache")?);
                }
                "--remote" => {
                    let value = require_value(args, "--remote")?;
                    let base_url = parse_base_url("--remote", &value)
                        .map_err(|_| ArgsError::InvalidRemoteUrl { raw: value.clone() })?;
                    let token = config.remote.take().and_then(|remote| remote.token);
                    config.remote = Some(RemoteConfig { base_url, token });
                }
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        config.deck_id = Some(deck_id.clone());
        Ok(Self { config, deck_id })
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

/// Prints session notifications as they happen.
struct ConsoleObserver;

impl SessionObserver for ConsoleObserver {
    fn on_card_complete(&mut self, card_id: &CardId, outcome: CardOutcome) {
        println!("  {card_id}: {}", outcome.as_str());
    }

    fn on_review_later_toggle(&mut self, card_id: &CardId, marked: bool) {
        if marked {
            println!("  {card_id}: saved for review");
        } else {
            println!("  {card_id}: review mark removed");
        }
    }

    fn on_deck_complete(&mut self, snapshot: &ProgressSnapshot) {
        println!(
            "Deck {} complete: {} cards learned.",
            snapshot.deck_id,
            snapshot.learned_set.len()
        );
    }
}

fn render(host: &SessionHost) {
    match host.view() {
        SessionView::NoCards => println!("Nothing to study: this deck has no cards."),
        SessionView::Studying {
            card,
            index,
            total,
            showing_answer,
            learned,
            marked_for_review,
        } => {
            let tag = if learned {
                " (learned)"
            } else if marked_for_review {
                " (review later)"
            } else {
                ""
            };
            println!("[{}/{}]{tag} {}", index + 1, total, card.question());
            if showing_answer {
                println!("      -> {}", card.answer());
            }
        }
        SessionView::ReviewNeeded { count } => {
            println!("{count} card(s) saved for review. [s] to start the review pass.");
        }
        SessionView::Reviewing {
            card,
            index,
            total,
            showing_answer,
            learned,
        } => {
            let tag = if learned { " (learned)" } else { "" };
            println!("review [{}/{}]{tag} {}", index + 1, total, card.question());
            if showing_answer {
                println!("      -> {}", card.answer());
            }
        }
        SessionView::Completed { learned, total } => {
            println!("All done: {learned}/{total} learned. [restart] to go again, [q] to leave.");
        }
    }
}

async fn study(services: &StudyServices, deck_id: &DeckId) -> Result<(), Box<dyn std::error::Error>> {
    let mut host = services
        .open_session(deck_id, Box::new(ConsoleObserver))
        .await;
    if let Some(title) = host.deck().title() {
        println!("{title}");
    }
    print_keys();
    render(&host);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match line.trim() {
            "f" | "flip" => host.flip(),
            "k" | "know" => host.learn_current(),
            "l" | "later" => host.defer_current(),
            "u" | "unmark" => host.unmark_current(),
            "n" | "next" => host.next(),
            "p" | "prev" => host.prev(),
            "s" | "review" => host.start_review(),
            "restart" => host.restart(),
            "q" | "quit" => break,
            "h" | "help" => {
                print_keys();
                continue;
            }
            "" => continue,
            other => {
                println!("unknown key: {other}");
                continue;
            }
        };
        render(&host);
    }

    let mut exited = host.exit();
    exited.settle().await;
    println!(
        "Saved: card {} in {} mode.",
        exited.snapshot.current_index + 1,
        exited.snapshot.mode
    );
    Ok(())
}

async fn status(services: &StudyServices, deck_id: &DeckId) -> Result<(), Box<dyn std::error::Error>> {
    let payload = services
        .decks()
        .fetch_deck(&services.config().learner, deck_id)
        .await?;
    let loaded = services
        .progress_store()
        .reconcile(deck_id, payload.study_progress)
        .await;
    let snapshot = loaded.snapshot;

    println!("deck:     {deck_id} ({} cards)", payload.deck.size());
    println!("learner:  {}", services.config().learner);
    println!("source:   {:?}", loaded.source);
    println!("mode:     {}", snapshot.mode);
    println!("card:     {}", snapshot.current_index + 1);
    println!("learned:  {}", snapshot.learned_set.len());
    println!("review:   {}", snapshot.review_set.len());
    println!("saved at: {}", snapshot.timestamp.to_rfc3339());
    Ok(())
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut argv: Vec<String> = std::env::args().skip(1).collect();

    // Default behavior: studying when no subcommand is provided.
    let cmd = match argv.first().map(String::as_str) {
        None => Command::Study,
        Some("--help" | "-h") => {
            print_usage();
            return Ok(());
        }
        Some(first) if first.starts_with("--") => Command::Study,
        Some(first) => Command::from_arg(first).ok_or_else(|| {
            eprintln!("unknown subcommand: {first}");
            print_usage();
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "unknown subcommand")
        })?,
    };

    if !argv.is_empty() && !argv[0].starts_with("--") {
        argv.remove(0);
    }

    let config = StudyConfig::from_env()?;
    let mut iter = argv.into_iter();
    let parsed = Args::parse(config, &mut iter).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    log::debug!("resolved config: {:?}", parsed.config);

    // Open + migrate SQLite at startup. Keep this in the binary glue so core/services stay pure.
    prepare_sqlite_file(&parsed.config.db_url)?;
    let services = StudyServices::connect(parsed.config).await?;

    match cmd {
        Command::Study => study(&services, &parsed.deck_id).await,
        Command::Seed => {
            let deck = services.seed_demo_deck().await?;
            println!(
                "seeded deck {} with {} cards into {}",
                deck.id(),
                deck.size(),
                services.config().db_url
            );
            Ok(())
        }
        Command::Status => status(&services, &parsed.deck_id).await,
    }
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    if let Err(err) = run().await {
        // At this layer (binary glue), printing once is fine.
        eprintln!("{err}");
        std::process::exit(2);
    }
}
