use progress_core::model::{CatalogLesson, CourseId, PackageId, PackageInfo, PricingEntry};
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{io_err, map_catalog_lesson_row, position_i64, ser};
use crate::repository::{CatalogWriter, CourseCatalog, PackageDirectory, StorageError};

#[async_trait::async_trait]
impl CourseCatalog for SqliteRepository {
    /// Durations stored as anything other than a number read back as `None`.
    async fn lessons_by_course(
        &self,
        course_id: &CourseId,
    ) -> Result<Vec<CatalogLesson>, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT
                    id,
                    kind,
                    CASE WHEN typeof(duration) IN ('real', 'integer') THEN duration END
                        AS duration
                FROM lessons
                WHERE course_id = ?1
                ORDER BY position ASC
            ",
        )
        .bind(course_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(io_err)?;

        let mut lessons = Vec::with_capacity(rows.len());
        for row in rows {
            lessons.push(map_catalog_lesson_row(&row)?);
        }
        Ok(lessons)
    }
}

#[async_trait::async_trait]
impl PackageDirectory for SqliteRepository {
    async fn get_package(
        &self,
        package_id: &PackageId,
    ) -> Result<Option<PackageInfo>, StorageError> {
        let mut tx = self.pool.begin().await.map_err(io_err)?;

        let exists = sqlx::query("SELECT 1 FROM packages WHERE id = ?1")
            .bind(package_id.as_str())
            .fetch_optional(&mut *tx)
            .await
            .map_err(io_err)?;
        if exists.is_none() {
            tx.commit().await.map_err(io_err)?;
            return Ok(None);
        }

        let course_rows = sqlx::query(
            r"
                SELECT course_id
                FROM package_courses
                WHERE package_id = ?1
                ORDER BY position ASC
            ",
        )
        .bind(package_id.as_str())
        .fetch_all(&mut *tx)
        .await
        .map_err(io_err)?;

        let pricing_rows = sqlx::query(
            r"
                SELECT period, price
                FROM package_pricing
                WHERE package_id = ?1
                ORDER BY position ASC
            ",
        )
        .bind(package_id.as_str())
        .fetch_all(&mut *tx)
        .await
        .map_err(io_err)?;

        tx.commit().await.map_err(io_err)?;

        let mut course_ids = Vec::with_capacity(course_rows.len());
        for row in course_rows {
            course_ids.push(CourseId::new(
                row.try_get::<String, _>("course_id").map_err(ser)?,
            ));
        }

        let mut pricing = Vec::with_capacity(pricing_rows.len());
        for row in pricing_rows {
            pricing.push(PricingEntry {
                period: row.try_get("period").map_err(ser)?,
                price: row.try_get("price").map_err(ser)?,
            });
        }

        Ok(Some(PackageInfo {
            id: package_id.clone(),
            course_ids,
            pricing,
        }))
    }
}

#[async_trait::async_trait]
impl CatalogWriter for SqliteRepository {
    async fn upsert_course(
        &self,
        course_id: &CourseId,
        title: &str,
        lessons: &[CatalogLesson],
    ) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await.map_err(io_err)?;

        sqlx::query(
            r"
                INSERT INTO courses (id, title)
                VALUES (?1, ?2)
                ON CONFLICT(id) DO UPDATE SET title = excluded.title
            ",
        )
        .bind(course_id.as_str())
        .bind(title)
        .execute(&mut *tx)
        .await
        .map_err(io_err)?;

        sqlx::query("DELETE FROM lessons WHERE course_id = ?1")
            .bind(course_id.as_str())
            .execute(&mut *tx)
            .await
            .map_err(io_err)?;

        for (position, lesson) in lessons.iter().enumerate() {
            sqlx::query(
                r"
                    INSERT INTO lessons (id, course_id, position, kind, duration)
                    VALUES (?1, ?2, ?3, ?4, ?5)
                ",
            )
            .bind(lesson.lesson_id.as_str())
            .bind(course_id.as_str())
            .bind(position_i64(position)?)
            .bind(lesson.kind.as_str())
            .bind(lesson.duration)
            .execute(&mut *tx)
            .await
            .map_err(io_err)?;
        }

        tx.commit().await.map_err(io_err)?;
        Ok(())
    }

    async fn upsert_package(&self, package: &PackageInfo, name: &str) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await.map_err(io_err)?;

        sqlx::query(
            r"
                INSERT INTO packages (id, name)
                VALUES (?1, ?2)
                ON CONFLICT(id) DO UPDATE SET name = excluded.name
            ",
        )
        .bind(package.id.as_str())
        .bind(name)
        .execute(&mut *tx)
        .await
        .map_err(io_err)?;

        sqlx::query("DELETE FROM package_courses WHERE package_id = ?1")
            .bind(package.id.as_str())
            .execute(&mut *tx)
            .await
            .map_err(io_err)?;
        sqlx::query("DELETE FROM package_pricing WHERE package_id = ?1")
            .bind(package.id.as_str())
            .execute(&mut *tx)
            .await
            .map_err(io_err)?;

        for (position, course_id) in package.course_ids.iter().enumerate() {
            sqlx::query(
                r"
                    INSERT INTO package_courses (package_id, course_id, position)
                    VALUES (?1, ?2, ?3)
                ",
            )
            .bind(package.id.as_str())
            .bind(course_id.as_str())
            .bind(position_i64(position)?)
            .execute(&mut *tx)
            .await
            .map_err(io_err)?;
        }

        for (position, entry) in package.pricing.iter().enumerate() {
            sqlx::query(
                r"
                    INSERT INTO package_pricing (package_id, position, period, price)
                    VALUES (?1, ?2, ?3, ?4)
                ",
            )
            .bind(package.id.as_str())
            .bind(position_i64(position)?)
            .bind(entry.period.as_deref())
            .bind(entry.price)
            .execute(&mut *tx)
            .await
            .map_err(io_err)?;
        }

        tx.commit().await.map_err(io_err)?;
        Ok(())
    }
}
