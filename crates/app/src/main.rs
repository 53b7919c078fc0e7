use std::fmt;
use std::sync::Arc;

use onboard_core::model::{ProgressRecord, TaskId, UserId};
use onboard_core::time::format_position;
use services::AppServices;
use storage::{StorageError, VideoProgressRepository};
use storage::remote::RemoteConfig;
use tracing::{debug, info};

mod replay;

use replay::{SimulatedSurface, Step};

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    MissingFlag { flag: &'static str },
    UnknownArg(String),
    InvalidUser { raw: String },
    InvalidTask { raw: String },
    InvalidDuration { raw: String },
    InvalidDbUrl { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::MissingFlag { flag } => write!(f, "{flag} is required"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidUser { raw } => write!(f, "invalid --user value: {raw}"),
            ArgsError::InvalidTask { raw } => write!(f, "invalid --task value: {raw}"),
            ArgsError::InvalidDuration { raw } => write!(f, "invalid --duration value: {raw}"),
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

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  onboard show   --user <uuid> --task <id> [--db <sqlite_url>]");
    eprintln!("  onboard list   --user <uuid> [--db <sqlite_url>]");
    eprintln!(
        "  onboard replay --user <uuid> --task <id> --duration <secs> [--require] [--db <sqlite_url>] <steps...>"
    );
    eprintln!();
    eprintln!("Replay steps:");
    eprintln!("  play:N  pause  seek:N  end  unload  resume  restart");
    eprintln!();
    eprintln!("Defaults:");
    eprintln!("  --db sqlite:onboard.sqlite3");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  ONBOARD_DB_URL, ONBOARD_REMOTE_URL, ONBOARD_REMOTE_KEY, ONBOARD_REMOTE_TOKEN,");
    eprintln!("  ONBOARD_SAVE_DEBOUNCE_MS, ONBOARD_PROMPT_TIMEOUT_MS, RUST_LOG");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Show,
    List,
    Replay,
}

impl Command {
    fn from_arg(arg: &str) -> Option<Self> {
        match arg {
            "show" => Some(Self::Show),
            "list" => Some(Self::List),
            "replay" => Some(Self::Replay),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
struct Args {
    db_url: String,
    user: Option<UserId>,
    task: Option<TaskId>,
    duration: Option<f64>,
    require: bool,
    steps: Vec<Step>,
}

impl Args {
    fn parse(
        cmd: Command,
        args: &mut impl Iterator<Item = String>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let mut parsed = Self {
            db_url: std::env::var("ONBOARD_DB_URL")
                .ok()
                .map_or_else(
                    || normalize_sqlite_url("sqlite:onboard.sqlite3".into()),
                    normalize_sqlite_url,
                ),
            ..Self::default()
        };

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value }.into());
                    }
                    parsed.db_url = normalize_sqlite_url(value);
                }
                "--user" => {
                    let value = require_value(args, "--user")?;
                    let user = value
                        .parse::<UserId>()
                        .map_err(|_| ArgsError::InvalidUser { raw: value.clone() })?;
                    parsed.user = Some(user);
                }
                "--task" => {
                    let value = require_value(args, "--task")?;
                    let task = value
                        .parse::<TaskId>()
                        .map_err(|_| ArgsError::InvalidTask { raw: value.clone() })?;
                    parsed.task = Some(task);
                }
                "--duration" if cmd == Command::Replay => {
                    let value = require_value(args, "--duration")?;
                    let duration = value
                        .parse::<f64>()
                        .ok()
                        .filter(|d| d.is_finite() && *d > 0.0)
                        .ok_or_else(|| ArgsError::InvalidDuration { raw: value.clone() })?;
                    parsed.duration = Some(duration);
                }
                "--require" if cmd == Command::Replay => parsed.require = true,
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                step if cmd == Command::Replay && !step.starts_with("--") => {
                    parsed.steps.push(step.parse()?);
                }
                _ => return Err(ArgsError::UnknownArg(arg).into()),
            }
        }

        if parsed.user.is_none() {
            return Err(ArgsError::MissingFlag { flag: "--user" }.into());
        }
        if cmd != Command::List && parsed.task.is_none() {
            return Err(ArgsError::MissingFlag { flag: "--task" }.into());
        }
        if cmd == Command::Replay && parsed.duration.is_none() {
            return Err(ArgsError::MissingFlag { flag: "--duration" }.into());
        }
        Ok(parsed)
    }

    fn user(&self) -> Result<UserId, ArgsError> {
        self.user.ok_or(ArgsError::MissingFlag { flag: "--user" })
    }

    fn task(&self) -> Result<&TaskId, ArgsError> {
        self.task.as_ref().ok_or(ArgsError::MissingFlag { flag: "--task" })
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

fn print_record(record: &ProgressRecord) {
    println!(
        "task {}: {} / {} ({:.0}% watched){} last watched {}",
        record.task_id(),
        format_position(record.current_position()),
        format_position(record.duration()),
        record.watch_percentage(),
        if record.completed() { ", completed," } else { "," },
        record.last_watched_at().format("%Y-%m-%d %H:%M:%S UTC"),
    );
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut argv = std::env::args().skip(1);

    let cmd = match argv.next() {
        None => {
            print_usage();
            return Ok(());
        }
        Some(first) if first == "--help" || first == "-h" => {
            print_usage();
            return Ok(());
        }
        Some(first) => Command::from_arg(&first).ok_or_else(|| {
            eprintln!("unknown subcommand: {first}");
            print_usage();
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "unknown subcommand")
        })?,
    };

    let parsed = Args::parse(cmd, &mut argv).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    // Only the local backend needs a file on disk.
    if RemoteConfig::from_env().is_none() {
        prepare_sqlite_file(&parsed.db_url)?;
        debug!("using local store at {}", parsed.db_url);
    } else {
        debug!("using remote store from environment");
    }
    let services = AppServices::from_env(&parsed.db_url).await?;
    let user = parsed.user()?;

    match cmd {
        Command::Show => {
            let task = parsed.task()?;
            match services.progress().get_video_progress(user, task).await {
                Ok(record) => print_record(&record),
                Err(StorageError::NotFound) => println!("task {task}: no progress"),
                Err(err) => return Err(err.into()),
            }
        }
        Command::List => {
            let records = services.progress().list_video_progress(user).await?;
            if records.is_empty() {
                println!("no progress for {user}");
            }
            for record in &records {
                print_record(record);
            }
        }
        Command::Replay => {
            let task = parsed.task()?;
            let duration = parsed
                .duration
                .ok_or(ArgsError::MissingFlag { flag: "--duration" })?;

            let tracker = replay::with_console_collaborators(services.tracker(), task.clone());
            tracker.set_user(Some(user));
            tracker.set_video_requirement(task, parsed.require);

            info!(
                "replaying {} step(s) for task {task} over {}",
                parsed.steps.len(),
                format_position(duration)
            );
            let surface = Arc::new(SimulatedSurface::new(duration));
            replay::run(&tracker, task, surface, &parsed.steps).await;

            match services.progress().get_video_progress(user, task).await {
                Ok(record) => print_record(&record),
                Err(StorageError::NotFound) => println!("task {task}: nothing stored"),
                Err(err) => return Err(err.into()),
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    let log_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(log_filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
