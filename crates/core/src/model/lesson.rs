use serde::{Deserialize, Serialize};

use crate::model::ids::LessonId;

//
// ─── LESSON KIND ───────────────────────────────────────────────────────────────
//

/// Content type of a catalog lesson. Only video lessons carry watch time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LessonKind {
    Video,
    Other(String),
}

impl LessonKind {
    /// Parses the catalog's type label; `"video"` matches case-insensitively.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.eq_ignore_ascii_case("video") {
            Self::Video
        } else {
            Self::Other(trimmed.to_owned())
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            LessonKind::Video => "video",
            LessonKind::Other(raw) => raw.as_str(),
        }
    }

    #[must_use]
    pub fn is_video(&self) -> bool {
        matches!(self, LessonKind::Video)
    }
}

//
// ─── CATALOG LESSON ────────────────────────────────────────────────────────────
//

/// A lesson as reported by the course catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogLesson {
    pub lesson_id: LessonId,
    pub kind: LessonKind,
    /// Duration in seconds, if the catalog has a numeric one.
    pub duration: Option<f64>,
}

impl CatalogLesson {
    #[must_use]
    pub fn video(lesson_id: impl Into<LessonId>, duration: Option<f64>) -> Self {
        Self {
            lesson_id: lesson_id.into(),
            kind: LessonKind::Video,
            duration,
        }
    }

    /// Duration used for progress tracking.
    ///
    /// Missing, non-finite, or negative durations count as zero.
    #[must_use]
    pub fn effective_duration(&self) -> f64 {
        match self.duration {
            Some(d) if d.is_finite() && d > 0.0 => d,
            _ => 0.0,
        }
    }
}

//
// ─── COURSE LESSONS ────────────────────────────────────────────────────────────
//

/// Ordered video lessons of one course with index-aligned durations.
///
/// `lesson_ids[i]` has duration `durations[i]`; `total_duration` is their sum.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CourseLessons {
    lesson_ids: Vec<LessonId>,
    durations: Vec<f64>,
    total_duration: f64,
}

impl CourseLessons {
    /// Result for an unknown or lesson-less course.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Keeps only video lessons, preserving catalog order.
    pub fn from_catalog(lessons: impl IntoIterator<Item = CatalogLesson>) -> Self {
        let mut lesson_ids = Vec::new();
        let mut durations = Vec::new();
        for lesson in lessons.into_iter().filter(|l| l.kind.is_video()) {
            durations.push(lesson.effective_duration());
            lesson_ids.push(lesson.lesson_id);
        }
        let total_duration = durations.iter().sum();
        Self {
            lesson_ids,
            durations,
            total_duration,
        }
    }

    #[must_use]
    pub fn lesson_ids(&self) -> &[LessonId] {
        &self.lesson_ids
    }

    #[must_use]
    pub fn durations(&self) -> &[f64] {
        &self.durations
    }

    #[must_use]
    pub fn total_duration(&self) -> f64 {
        self.total_duration
    }

    pub(crate) fn into_parts(self) -> (Vec<LessonId>, Vec<f64>) {
        (self.lesson_ids, self.durations)
    }
}
