use std::collections::HashMap;

use chrono::{DateTime, Utc};
use progress_core::model::{
    CourseId, LessonId, PackageId, ProgressDraft, ProgressRecord, UserId,
};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection};

use super::SqliteRepository;
use super::mapping::{io_err, map_progress_rows, position_i64, progress_id_from_i64, ser};
use crate::repository::{ProgressRepository, StorageError};

/// Reads one record and its ordered lesson rows on the given connection.
async fn fetch_record(
    conn: &mut SqliteConnection,
    user_id: &UserId,
    course_id: &CourseId,
) -> Result<Option<ProgressRecord>, StorageError> {
    let row = sqlx::query(
        r"
            SELECT
                id, user_id, course_id, package_id, expiry, total_watch_time,
                course_duration, created_at, updated_at
            FROM progress_records
            WHERE user_id = ?1 AND course_id = ?2
        ",
    )
    .bind(user_id.as_str())
    .bind(course_id.as_str())
    .fetch_optional(&mut *conn)
    .await
    .map_err(io_err)?;

    let Some(row) = row else {
        return Ok(None);
    };

    let id: i64 = row.try_get("id").map_err(ser)?;
    let lessons = sqlx::query(
        r"
            SELECT lesson_id, duration, watch_time
            FROM progress_lessons
            WHERE progress_id = ?1
            ORDER BY position ASC
        ",
    )
    .bind(id)
    .fetch_all(&mut *conn)
    .await
    .map_err(io_err)?;

    map_progress_rows(&row, &lessons).map(Some)
}

#[async_trait::async_trait]
impl ProgressRepository for SqliteRepository {
    async fn insert_progress_batch(
        &self,
        drafts: &[ProgressDraft],
    ) -> Result<Vec<ProgressRecord>, StorageError> {
        if drafts.is_empty() {
            return Ok(Vec::new());
        }

        let mut tx = self.pool.begin().await.map_err(io_err)?;
        let mut created = Vec::with_capacity(drafts.len());

        for draft in drafts {
            let res = sqlx::query(
                r"
                    INSERT INTO progress_records (
                        user_id, course_id, package_id, expiry, total_watch_time,
                        course_duration, created_at, updated_at
                    )
                    VALUES (?1, ?2, ?3, ?4, 0, ?5, ?6, ?6)
                    ON CONFLICT(user_id, course_id) DO NOTHING
                ",
            )
            .bind(draft.user_id().as_str())
            .bind(draft.course_id().as_str())
            .bind(draft.package_id().map(PackageId::as_str))
            .bind(draft.expiry())
            .bind(draft.course_duration())
            .bind(draft.created_at())
            .execute(&mut *tx)
            .await
            .map_err(io_err)?;

            // An existing (user, course) record is left untouched.
            if res.rows_affected() == 0 {
                continue;
            }
            let id = res.last_insert_rowid();

            for (position, (lesson_id, duration)) in draft
                .lesson_ids()
                .iter()
                .zip(draft.lesson_durations())
                .enumerate()
            {
                sqlx::query(
                    r"
                        INSERT INTO progress_lessons (
                            progress_id, position, lesson_id, duration, watch_time
                        )
                        VALUES (?1, ?2, ?3, ?4, 0)
                    ",
                )
                .bind(id)
                .bind(position_i64(position)?)
                .bind(lesson_id.as_str())
                .bind(*duration)
                .execute(&mut *tx)
                .await
                .map_err(io_err)?;
            }

            created.push(draft.clone().into_record(progress_id_from_i64(id)?));
        }

        tx.commit().await.map_err(io_err)?;
        Ok(created)
    }

    async fn get_progress(
        &self,
        user_id: &UserId,
        course_id: &CourseId,
    ) -> Result<Option<ProgressRecord>, StorageError> {
        // Both reads share one snapshot so the total matches the lesson rows.
        let mut tx = self.pool.begin().await.map_err(io_err)?;
        let record = fetch_record(&mut *tx, user_id, course_id).await?;
        tx.commit().await.map_err(io_err)?;
        Ok(record)
    }

    async fn list_progress(&self, user_id: &UserId) -> Result<Vec<ProgressRecord>, StorageError> {
        let mut tx = self.pool.begin().await.map_err(io_err)?;

        let rows = sqlx::query(
            r"
                SELECT
                    id, user_id, course_id, package_id, expiry, total_watch_time,
                    course_duration, created_at, updated_at
                FROM progress_records
                WHERE user_id = ?1
                ORDER BY course_id ASC
            ",
        )
        .bind(user_id.as_str())
        .fetch_all(&mut *tx)
        .await
        .map_err(io_err)?;

        let lesson_rows = sqlx::query(
            r"
                SELECT l.progress_id, l.lesson_id, l.duration, l.watch_time
                FROM progress_lessons l
                JOIN progress_records r ON r.id = l.progress_id
                WHERE r.user_id = ?1
                ORDER BY l.progress_id ASC, l.position ASC
            ",
        )
        .bind(user_id.as_str())
        .fetch_all(&mut *tx)
        .await
        .map_err(io_err)?;

        tx.commit().await.map_err(io_err)?;

        let mut lessons_by_record: HashMap<i64, Vec<SqliteRow>> = HashMap::new();
        for lesson in lesson_rows {
            let progress_id: i64 = lesson.try_get("progress_id").map_err(ser)?;
            lessons_by_record.entry(progress_id).or_default().push(lesson);
        }

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let id: i64 = row.try_get("id").map_err(ser)?;
            let lessons = lessons_by_record.remove(&id).unwrap_or_default();
            out.push(map_progress_rows(&row, &lessons)?);
        }
        Ok(out)
    }

    async fn apply_watch_time(
        &self,
        user_id: &UserId,
        course_id: &CourseId,
        lesson_id: &LessonId,
        seconds: f64,
        at: DateTime<Utc>,
    ) -> Result<Option<ProgressRecord>, StorageError> {
        // The first statement is a write, so the transaction takes the
        // database write lock up front and concurrent updaters queue on it.
        let mut tx = self.pool.begin().await.map_err(io_err)?;

        let merged = sqlx::query(
            r"
                UPDATE progress_lessons
                SET watch_time = MAX(watch_time, MIN(?1, duration))
                WHERE lesson_id = ?2
                  AND progress_id = (
                      SELECT id FROM progress_records
                      WHERE user_id = ?3 AND course_id = ?4
                  )
            ",
        )
        .bind(seconds)
        .bind(lesson_id.as_str())
        .bind(user_id.as_str())
        .bind(course_id.as_str())
        .execute(&mut *tx)
        .await
        .map_err(io_err)?;

        if merged.rows_affected() == 0 {
            tx.rollback().await.map_err(io_err)?;
            return Ok(None);
        }

        sqlx::query(
            r"
                UPDATE progress_records
                SET total_watch_time = MAX(0, MIN(
                        (
                            SELECT COALESCE(SUM(watch_time), 0)
                            FROM progress_lessons
                            WHERE progress_id = progress_records.id
                        ),
                        course_duration
                    )),
                    updated_at = ?3
                WHERE user_id = ?1 AND course_id = ?2
            ",
        )
        .bind(user_id.as_str())
        .bind(course_id.as_str())
        .bind(at)
        .execute(&mut *tx)
        .await
        .map_err(io_err)?;

        let record = fetch_record(&mut *tx, user_id, course_id).await?;
        tx.commit().await.map_err(io_err)?;
        Ok(record)
    }
}
