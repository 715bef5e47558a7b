use std::fmt;

use progress_core::model::{
    CatalogLesson, CourseId, LessonId, LessonKind, PackageId, PackageInfo, PricingEntry,
};
use storage::repository::{Storage, StorageError};

#[derive(Debug, Clone)]
struct Args {
    db_url: String,
    package_id: PackageId,
    period: String,
}

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidDbUrl { raw: String },
    InvalidPackageId { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::InvalidPackageId { raw } => write!(f, "invalid --package-id value: {raw}"),
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

impl Args {
    fn parse() -> Result<Self, ArgsError> {
        let mut db_url = std::env::var("PROGRESS_DB_URL")
            .unwrap_or_else(|_| "sqlite://progress.sqlite3?mode=rwc".into());
        let mut package_id = PackageId::new("starter-bundle");
        let mut period = "6 months".to_string();

        let mut args = std::env::args().skip(1);
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(&mut args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = value;
                }
                "--package-id" => {
                    let value = require_value(&mut args, "--package-id")?;
                    package_id = value
                        .parse()
                        .map_err(|_| ArgsError::InvalidPackageId { raw: value.clone() })?;
                }
                "--period" => {
                    period = require_value(&mut args, "--period")?;
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
            package_id,
            period,
        })
    }
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p storage --bin seed -- [options]");
    eprintln!();
    eprintln!("Options:");
    eprintln!(
        "  --db <sqlite_url>         SQLite URL (default: sqlite://progress.sqlite3?mode=rwc)"
    );
    eprintln!("  --package-id <id>         Package id to upsert (default: starter-bundle)");
    eprintln!("  --period <text>           Package access period (default: \"6 months\")");
    eprintln!("  -h, --help                Show this help");
    eprintln!();
    eprintln!("Environment (same as flags):");
    eprintln!("  PROGRESS_DB_URL");
    eprintln!();
    eprintln!("Progress records are created by the app, e.g.");
    eprintln!("  app init --user <id> --package <package_id>");
}

/// Two demo courses: lesson ids and durations in seconds, `None` for lessons
/// that are not videos.
fn demo_courses() -> Vec<(CourseId, &'static str, Vec<CatalogLesson>)> {
    let lesson = |id: &str, duration: Option<f64>| match duration {
        Some(_) => CatalogLesson::video(id, duration),
        None => CatalogLesson {
            lesson_id: LessonId::new(id),
            kind: LessonKind::Other("quiz".into()),
            duration: None,
        },
    };

    vec![
        (
            CourseId::new("rust-basics"),
            "Rust Basics",
            vec![
                lesson("rb-intro", Some(300.0)),
                lesson("rb-ownership", Some(600.0)),
                lesson("rb-quiz", None),
                lesson("rb-traits", Some(900.0)),
            ],
        ),
        (
            CourseId::new("async-rust"),
            "Async Rust",
            vec![
                lesson("ar-futures", Some(720.0)),
                lesson("ar-tokio", Some(840.0)),
            ],
        ),
    ]
}

/// Upserts the demo courses and a package bundling all of them.
async fn seed_catalog(
    storage: &Storage,
    package_id: &PackageId,
    period: &str,
) -> Result<PackageInfo, StorageError> {
    let courses = demo_courses();
    for (course_id, title, lessons) in &courses {
        storage
            .catalog_writer
            .upsert_course(course_id, title, lessons)
            .await?;
    }

    let package = PackageInfo {
        id: package_id.clone(),
        course_ids: courses.into_iter().map(|(id, _, _)| id).collect(),
        pricing: vec![PricingEntry {
            period: Some(period.to_owned()),
            price: Some(49.0),
        }],
    };
    storage
        .catalog_writer
        .upsert_package(&package, "Starter bundle")
        .await?;
    Ok(package)
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse().map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    let storage = Storage::sqlite(&args.db_url).await?;
    let package = seed_catalog(&storage, &args.package_id, &args.period).await?;

    println!(
        "Seeded package {} with {} courses into {}",
        package.id,
        package.course_ids.len(),
        args.db_url
    );

    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use progress_core::model::UserId;

    #[tokio::test]
    async fn seeding_writes_catalog_only() {
        let storage = Storage::in_memory();
        let package_id = PackageId::new("starter-bundle");

        let package = seed_catalog(&storage, &package_id, "6 months").await.unwrap();
        assert_eq!(
            package.course_ids,
            vec![CourseId::new("rust-basics"), CourseId::new("async-rust")]
        );

        let stored = storage.packages.get_package(&package_id).await.unwrap().unwrap();
        assert_eq!(stored.period_spec(), Some("6 months"));

        let lessons = storage
            .catalog
            .lessons_by_course(&CourseId::new("rust-basics"))
            .await
            .unwrap();
        assert_eq!(lessons.len(), 4);

        let progress = storage
            .progress
            .list_progress(&UserId::new("any"))
            .await
            .unwrap();
        assert!(progress.is_empty());
    }
}
