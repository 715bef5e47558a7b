use std::fmt;
use std::str::FromStr;

use progress_core::model::{CourseId, LessonId, PackageId, ParseIdError, UserId};
use services::{AppServices, Clock, ProgressServiceError};
use tracing::debug;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug)]
enum ArgsError {
    MissingCommand,
    MissingValue { flag: &'static str },
    MissingFlag { flag: &'static str },
    UnknownArg(String),
    InvalidDbUrl { raw: String },
    InvalidSeconds { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingCommand => write!(f, "a subcommand is required"),
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::MissingFlag { flag } => write!(f, "{flag} is required"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::InvalidSeconds { raw } => write!(f, "invalid --seconds value: {raw}"),
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

fn parse_id<T>(raw: &str) -> Result<T, progress_core::Error>
where
    T: FromStr<Err = ParseIdError>,
{
    Ok(raw.parse::<T>()?)
}

fn required<T>(value: Option<T>, flag: &'static str) -> Result<T, ArgsError> {
    value.ok_or(ArgsError::MissingFlag { flag })
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!(
        "  cargo run -p app -- init  --user <id> (--course <id> | --package <id>) [--period <text>]"
    );
    eprintln!("  cargo run -p app -- watch --user <id> --course <id> --lesson <id> --seconds <n>");
    eprintln!("  cargo run -p app -- show  --user <id> --course <id>");
    eprintln!("  cargo run -p app -- list  --user <id>");
    eprintln!();
    eprintln!("Every command also accepts:");
    eprintln!("  --db <sqlite_url>         SQLite URL (default: sqlite://progress.sqlite3)");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  PROGRESS_DB_URL           same as --db");
    eprintln!("  RUST_LOG                  log filter for stderr output (default: info)");
}

#[derive(Debug, Clone, PartialEq)]
enum Command {
    Init {
        user_id: UserId,
        course_id: Option<CourseId>,
        package_id: Option<PackageId>,
        period: Option<String>,
    },
    Watch {
        user_id: UserId,
        course_id: CourseId,
        lesson_id: LessonId,
        seconds: f64,
    },
    Show {
        user_id: UserId,
        course_id: CourseId,
    },
    List {
        user_id: UserId,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CommandName {
    Init,
    Watch,
    Show,
    List,
}

impl CommandName {
    fn from_arg(arg: &str) -> Option<Self> {
        match arg {
            "init" => Some(Self::Init),
            "watch" => Some(Self::Watch),
            "show" => Some(Self::Show),
            "list" => Some(Self::List),
            _ => None,
        }
    }
}

struct Args {
    db_url: String,
    command: Command,
}

impl Args {
    fn parse(
        name: CommandName,
        args: &mut impl Iterator<Item = String>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let mut db_url = std::env::var("PROGRESS_DB_URL")
            .ok()
            .map_or_else(default_db_url, normalize_sqlite_url);
        let mut user_id: Option<UserId> = None;
        let mut course_id: Option<CourseId> = None;
        let mut package_id: Option<PackageId> = None;
        let mut lesson_id: Option<LessonId> = None;
        let mut period: Option<String> = None;
        let mut seconds: Option<f64> = None;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value }.into());
                    }
                    db_url = normalize_sqlite_url(value);
                }
                "--user" => {
                    user_id = Some(parse_id(&require_value(args, "--user")?)?);
                }
                "--course" => {
                    course_id = Some(parse_id(&require_value(args, "--course")?)?);
                }
                "--package" => {
                    package_id = Some(parse_id(&require_value(args, "--package")?)?);
                }
                "--lesson" => {
                    lesson_id = Some(parse_id(&require_value(args, "--lesson")?)?);
                }
                "--period" => {
                    period = Some(require_value(args, "--period")?);
                }
                "--seconds" => {
                    let value = require_value(args, "--seconds")?;
                    let parsed: f64 = value
                        .trim()
                        .parse()
                        .map_err(|_| ArgsError::InvalidSeconds { raw: value.clone() })?;
                    seconds = Some(parsed);
                }
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg).into()),
            }
        }

        let user_id = required(user_id, "--user")?;
        let command = match name {
            CommandName::Init => Command::Init {
                user_id,
                course_id,
                package_id,
                period,
            },
            CommandName::Watch => Command::Watch {
                user_id,
                course_id: required(course_id, "--course")?,
                lesson_id: required(lesson_id, "--lesson")?,
                seconds: required(seconds, "--seconds")?,
            },
            CommandName::Show => Command::Show {
                user_id,
                course_id: required(course_id, "--course")?,
            },
            CommandName::List => Command::List { user_id },
        };

        Ok(Self { db_url, command })
    }
}

fn default_db_url() -> String {
    normalize_sqlite_url("progress.sqlite3".into())
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

fn init_tracing() {
    // stdout carries the JSON results, logs go to stderr.
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn print_json(value: &impl serde::Serialize) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut argv = std::env::args().skip(1);

    let name = match argv.next() {
        None => {
            print_usage();
            return Err(ArgsError::MissingCommand.into());
        }
        Some(first) if first == "--help" || first == "-h" => {
            print_usage();
            return Ok(());
        }
        Some(first) => CommandName::from_arg(&first).ok_or_else(|| {
            eprintln!("unknown subcommand: {first}");
            print_usage();
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "unknown subcommand")
        })?,
    };

    let parsed = Args::parse(name, &mut argv).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    // Open + migrate SQLite at startup. Keep this in the binary glue so core/services stay pure.
    prepare_sqlite_file(&parsed.db_url)?;
    debug!(db_url = %parsed.db_url, "opening progress database");
    let services = AppServices::new_sqlite(&parsed.db_url, Clock::default_clock()).await?;
    let progress = services.progress();

    match parsed.command {
        Command::Init {
            user_id,
            course_id,
            package_id,
            period,
        } => {
            let created = progress
                .initialize_progress(&user_id, course_id, package_id, period.as_deref())
                .await?;
            print_json(&created)
        }
        Command::Watch {
            user_id,
            course_id,
            lesson_id,
            seconds,
        } => {
            let outcome = progress
                .update_lesson_watch_time(&user_id, &course_id, &lesson_id, seconds)
                .await?;
            print_json(&outcome)
        }
        Command::Show { user_id, course_id } => {
            let view = progress.get_course_progress(&user_id, &course_id).await?;
            print_json(&view)
        }
        Command::List { user_id } => {
            let views = progress.list_user_progress(&user_id).await?;
            print_json(&views)
        }
    }
}

#[tokio::main]
async fn main() {
    init_tracing();
    if let Err(err) = run().await {
        // At this layer (binary glue), printing once is fine.
        match err.downcast_ref::<ProgressServiceError>() {
            Some(service_err) => eprintln!("{}: {service_err}", service_err.kind().as_str()),
            None => eprintln!("{err}"),
        }
        std::process::exit(2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(name: CommandName, args: &[&str]) -> Result<Args, Box<dyn std::error::Error>> {
        let mut iter = args.iter().map(|s| (*s).to_string());
        Args::parse(name, &mut iter)
    }

    #[test]
    fn parses_watch_command() {
        let args = parse(
            CommandName::Watch,
            &[
                "--db", "sqlite://tmp/p.db", "--user", "u1", "--course", "c1", "--lesson", "L1",
                "--seconds", "42.5",
            ],
        )
        .unwrap();
        assert_eq!(args.db_url, "sqlite://tmp/p.db");
        assert_eq!(
            args.command,
            Command::Watch {
                user_id: UserId::new("u1"),
                course_id: CourseId::new("c1"),
                lesson_id: LessonId::new("L1"),
                seconds: 42.5,
            }
        );
    }

    #[test]
    fn init_leaves_target_validation_to_the_service() {
        let args = parse(
            CommandName::Init,
            &["--user", "u1", "--course", "c1", "--package", "p1"],
        )
        .unwrap();
        assert!(matches!(
            args.command,
            Command::Init {
                course_id: Some(_),
                package_id: Some(_),
                ..
            }
        ));
    }

    #[test]
    fn only_progress_commands_exist() {
        for name in ["init", "watch", "show", "list"] {
            assert!(CommandName::from_arg(name).is_some(), "{name}");
        }
        for name in ["users", "signup", "login"] {
            assert!(CommandName::from_arg(name).is_none(), "{name}");
        }
    }

    #[test]
    fn rejects_missing_and_blank_values() {
        assert!(parse(CommandName::Show, &["--user", "u1"]).is_err());
        assert!(parse(CommandName::List, &["--user", "  "]).is_err());
        assert!(parse(CommandName::Watch, &["--user", "u1", "--seconds", "abc"]).is_err());
        assert!(parse(CommandName::List, &["--user", "u1", "--verbose"]).is_err());
    }

    #[test]
    fn relative_paths_become_absolute_urls() {
        assert_eq!(
            normalize_sqlite_url("sqlite://already.db".into()),
            "sqlite://already.db"
        );
        let normalized = normalize_sqlite_url("sqlite:data/p.db".into());
        assert!(normalized.starts_with("sqlite:///"));
        assert!(normalized.ends_with("data/p.db"));
    }
}
