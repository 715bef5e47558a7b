use chrono::{DateTime, Utc};
use progress_core::model::{
    CatalogLesson, CourseId, LessonId, LessonKind, PackageId, PersistedProgress, ProgressId,
    ProgressRecord, UserId,
};
use progress_core::time::parse_timestamp;
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use crate::repository::{StorageError, invalid_record};

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn io_err<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

pub(crate) fn progress_id_from_i64(v: i64) -> Result<ProgressId, StorageError> {
    u64::try_from(v)
        .map(ProgressId::new)
        .map_err(|_| StorageError::Serialization("progress_id sign overflow".into()))
}

pub(crate) fn position_i64(index: usize) -> Result<i64, StorageError> {
    i64::try_from(index).map_err(|_| StorageError::Serialization("position overflow".into()))
}

/// Reads a timestamp column; naive values are taken as UTC.
fn timestamp(row: &SqliteRow, field: &'static str) -> Result<DateTime<Utc>, StorageError> {
    let raw: String = row.try_get(field).map_err(ser)?;
    parse_timestamp(&raw)
        .ok_or_else(|| StorageError::Serialization(format!("invalid {field}: {raw}")))
}

fn optional_timestamp(
    row: &SqliteRow,
    field: &'static str,
) -> Result<Option<DateTime<Utc>>, StorageError> {
    let raw: Option<String> = row.try_get(field).map_err(ser)?;
    raw.map(|raw| {
        parse_timestamp(&raw)
            .ok_or_else(|| StorageError::Serialization(format!("invalid {field}: {raw}")))
    })
    .transpose()
}

pub(crate) fn map_catalog_lesson_row(row: &SqliteRow) -> Result<CatalogLesson, StorageError> {
    let kind: String = row.try_get("kind").map_err(ser)?;
    Ok(CatalogLesson {
        lesson_id: LessonId::new(row.try_get::<String, _>("id").map_err(ser)?),
        kind: LessonKind::parse(&kind),
        duration: row.try_get("duration").map_err(ser)?,
    })
}

/// Builds a record from its `progress_records` row and its `progress_lessons`
/// rows, which must already be ordered by position.
pub(crate) fn map_progress_rows(
    row: &SqliteRow,
    lesson_rows: &[SqliteRow],
) -> Result<ProgressRecord, StorageError> {
    let mut lesson_ids = Vec::with_capacity(lesson_rows.len());
    let mut lesson_durations = Vec::with_capacity(lesson_rows.len());
    let mut watch_times = Vec::with_capacity(lesson_rows.len());
    for lesson in lesson_rows {
        let lesson_id = LessonId::new(lesson.try_get::<String, _>("lesson_id").map_err(ser)?);
        lesson_durations.push(lesson.try_get::<f64, _>("duration").map_err(ser)?);
        watch_times.push((
            lesson_id.clone(),
            lesson.try_get::<f64, _>("watch_time").map_err(ser)?,
        ));
        lesson_ids.push(lesson_id);
    }

    let parts = PersistedProgress {
        id: progress_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?,
        user_id: UserId::new(row.try_get::<String, _>("user_id").map_err(ser)?),
        course_id: CourseId::new(row.try_get::<String, _>("course_id").map_err(ser)?),
        package_id: row
            .try_get::<Option<String>, _>("package_id")
            .map_err(ser)?
            .map(PackageId::new),
        expiry: optional_timestamp(row, "expiry")?,
        lesson_ids,
        lesson_durations,
        watch_times,
        total_watch_time: row.try_get("total_watch_time").map_err(ser)?,
        course_duration: row.try_get("course_duration").map_err(ser)?,
        created_at: timestamp(row, "created_at")?,
        updated_at: timestamp(row, "updated_at")?,
    };

    ProgressRecord::from_persisted(parts).map_err(invalid_record)
}
