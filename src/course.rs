use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use utoipa::ToSchema;

use crate::error::ApiError;

/// A course outline: what the model previews and what a save request carries.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CourseOutline {
    pub title: String,
    pub description: String,
    pub chapters: Vec<OutlineChapter>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OutlineChapter {
    pub chapter_number: i64,
    pub title: String,
    pub summary: String,
}

/// A persisted chapter row.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Chapter {
    pub id: i64,
    pub course_id: i64,
    pub chapter_number: i64,
    pub title: String,
    pub summary: String,
    pub is_locked: bool,
    pub is_completed: bool,
    pub content_json: Option<String>,
}

/// Saved course as returned right after persisting an outline.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CourseDetail {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub chapters: Vec<ChapterDetail>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct ChapterDetail {
    pub id: i64,
    pub chapter_number: i64,
    pub title: String,
    pub summary: String,
    pub is_locked: bool,
    pub is_completed: bool,
}

/// List view: chapter status only, no summary text and no content.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CourseSummary {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub chapters: Vec<ChapterStatus>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct ChapterStatus {
    pub id: i64,
    pub chapter_number: i64,
    pub title: String,
    pub is_locked: bool,
    pub is_completed: bool,
}

/// Chapter numbers must run 1..=N with no gaps; rejected before any write.
fn validate_outline(outline: &CourseOutline) -> Result<(), ApiError> {
    if outline.chapters.is_empty() {
        return Err(ApiError::InvalidOutline(
            "a course needs at least one chapter".to_string(),
        ));
    }
    for (idx, chapter) in outline.chapters.iter().enumerate() {
        let expected = idx as i64 + 1;
        if chapter.chapter_number != expected {
            return Err(ApiError::InvalidOutline(format!(
                "chapter numbers must be contiguous from 1: expected {}, got {}",
                expected, chapter.chapter_number
            )));
        }
    }
    Ok(())
}

/// Persist a previewed outline for `user_id`. Chapter 1 starts unlocked,
/// every other chapter starts locked.
pub async fn save_course(
    database: &SqlitePool,
    user_id: i64,
    outline: &CourseOutline,
) -> Result<CourseDetail, ApiError> {
    validate_outline(outline)?;

    let course_id = sqlx::query("INSERT INTO courses (title, description, user_id) VALUES (?, ?, ?)")
        .bind(&outline.title)
        .bind(&outline.description)
        .bind(user_id)
        .execute(database)
        .await?
        .last_insert_rowid();

    for (idx, chapter) in outline.chapters.iter().enumerate() {
        let is_locked = idx != 0;
        sqlx::query(
            "INSERT INTO chapters (course_id, chapter_number, title, summary, is_locked) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(course_id)
        .bind(chapter.chapter_number)
        .bind(&chapter.title)
        .bind(&chapter.summary)
        .bind(is_locked)
        .execute(database)
        .await?;
    }

    let chapters = sqlx::query_as::<_, ChapterDetail>(
        "SELECT id, chapter_number, title, summary, is_locked, is_completed \
         FROM chapters WHERE course_id = ? ORDER BY chapter_number",
    )
    .bind(course_id)
    .fetch_all(database)
    .await?;

    Ok(CourseDetail {
        id: course_id,
        title: outline.title.clone(),
        description: outline.description.clone(),
        chapters,
    })
}

/// All courses owned by `user_id`, chapters in order.
pub async fn list_courses(
    database: &SqlitePool,
    user_id: i64,
) -> Result<Vec<CourseSummary>, ApiError> {
    let courses: Vec<(i64, String, String)> =
        sqlx::query_as("SELECT id, title, description FROM courses WHERE user_id = ?")
            .bind(user_id)
            .fetch_all(database)
            .await?;

    let mut result = Vec::with_capacity(courses.len());
    for (id, title, description) in courses {
        let chapters = sqlx::query_as::<_, ChapterStatus>(
            "SELECT id, chapter_number, title, is_locked, is_completed \
             FROM chapters WHERE course_id = ? ORDER BY chapter_number",
        )
        .bind(id)
        .fetch_all(database)
        .await?;
        result.push(CourseSummary {
            id,
            title,
            description,
            chapters,
        });
    }
    Ok(result)
}

/// Fetch a chapter, but only if its course belongs to `user_id`. A chapter
/// outside the caller's course tree answers the same as a missing one.
pub async fn get_chapter_owned(
    database: &SqlitePool,
    chapter_id: i64,
    user_id: i64,
) -> Result<Chapter, ApiError> {
    let chapter = sqlx::query_as::<_, Chapter>(
        "SELECT c.id, c.course_id, c.chapter_number, c.title, c.summary, \
                c.is_locked, c.is_completed, c.content_json \
         FROM chapters c INNER JOIN courses ON courses.id = c.course_id \
         WHERE c.id = ? AND courses.user_id = ?",
    )
    .bind(chapter_id)
    .bind(user_id)
    .fetch_optional(database)
    .await?;
    chapter.ok_or_else(|| ApiError::NotFound(format!("chapter {}", chapter_id)))
}

pub async fn course_title(database: &SqlitePool, course_id: i64) -> Result<String, ApiError> {
    let title: Option<String> = sqlx::query_scalar("SELECT title FROM courses WHERE id = ?")
        .bind(course_id)
        .fetch_optional(database)
        .await?;
    title.ok_or_else(|| ApiError::NotFound(format!("course {}", course_id)))
}

/// Store generated content on a chapter. Written once on first success;
/// concurrent generations are last-write-wins.
pub async fn cache_content(
    database: &SqlitePool,
    chapter_id: i64,
    content_json: &str,
) -> Result<(), ApiError> {
    sqlx::query("UPDATE chapters SET content_json = ? WHERE id = ?")
        .bind(content_json)
        .bind(chapter_id)
        .execute(database)
        .await?;
    Ok(())
}

/// Mark a chapter complete and unlock its direct successor, if any.
/// Idempotent; never cascades further and never re-locks.
pub async fn complete_chapter(
    database: &SqlitePool,
    chapter_id: i64,
    user_id: i64,
) -> Result<(), ApiError> {
    let chapter = get_chapter_owned(database, chapter_id, user_id).await?;

    sqlx::query("UPDATE chapters SET is_completed = TRUE WHERE id = ?")
        .bind(chapter.id)
        .execute(database)
        .await?;
    sqlx::query("UPDATE chapters SET is_locked = FALSE WHERE course_id = ? AND chapter_number = ?")
        .bind(chapter.course_id)
        .bind(chapter.chapter_number + 1)
        .execute(database)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{auth, db};

    async fn setup() -> (SqlitePool, i64) {
        let pool = db::connect_memory().await.unwrap();
        db::init_schema(&pool).await.unwrap();
        let user_id = auth::register(&pool, "alice", "secret").await.unwrap();
        (pool, user_id)
    }

    fn outline(n: usize) -> CourseOutline {
        CourseOutline {
            title: "Rust Basics".to_string(),
            description: "From zero to ownership".to_string(),
            chapters: (1..=n as i64)
                .map(|i| OutlineChapter {
                    chapter_number: i,
                    title: format!("Chapter {}", i),
                    summary: format!("Summary {}", i),
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn first_chapter_unlocked_rest_locked() {
        let (pool, user_id) = setup().await;
        for n in [1usize, 4] {
            let saved = save_course(&pool, user_id, &outline(n)).await.unwrap();
            assert_eq!(saved.chapters.len(), n);
            assert!(!saved.chapters[0].is_locked);
            assert!(saved.chapters.iter().all(|c| !c.is_completed));
            for chapter in &saved.chapters[1..] {
                assert!(chapter.is_locked);
            }
        }
    }

    #[tokio::test]
    async fn non_contiguous_outline_rejected_without_writes() {
        let (pool, user_id) = setup().await;
        let mut bad = outline(3);
        bad.chapters[2].chapter_number = 5;
        let err = save_course(&pool, user_id, &bad).await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidOutline(_)));

        let empty = CourseOutline {
            chapters: vec![],
            ..outline(1)
        };
        let err = save_course(&pool, user_id, &empty).await.unwrap_err();
        assert!(matches!(err, ApiError::InvalidOutline(_)));

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM courses")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn completion_unlocks_exactly_the_next_chapter() {
        let (pool, user_id) = setup().await;
        let saved = save_course(&pool, user_id, &outline(3)).await.unwrap();

        complete_chapter(&pool, saved.chapters[0].id, user_id)
            .await
            .unwrap();
        let first = get_chapter_owned(&pool, saved.chapters[0].id, user_id)
            .await
            .unwrap();
        let second = get_chapter_owned(&pool, saved.chapters[1].id, user_id)
            .await
            .unwrap();
        let third = get_chapter_owned(&pool, saved.chapters[2].id, user_id)
            .await
            .unwrap();
        assert!(first.is_completed);
        assert!(!second.is_locked);
        assert!(third.is_locked);

        // completing again is a no-op
        complete_chapter(&pool, saved.chapters[0].id, user_id)
            .await
            .unwrap();
        let third = get_chapter_owned(&pool, saved.chapters[2].id, user_id)
            .await
            .unwrap();
        assert!(third.is_locked);
    }

    #[tokio::test]
    async fn completing_the_last_chapter_succeeds() {
        let (pool, user_id) = setup().await;
        let saved = save_course(&pool, user_id, &outline(2)).await.unwrap();
        let last = saved.chapters.last().unwrap();
        complete_chapter(&pool, last.id, user_id).await.unwrap();
        let last = get_chapter_owned(&pool, last.id, user_id).await.unwrap();
        assert!(last.is_completed);
    }

    #[tokio::test]
    async fn foreign_chapters_are_not_found() {
        let (pool, user_id) = setup().await;
        let other = auth::register(&pool, "bob", "secret").await.unwrap();
        let saved = save_course(&pool, user_id, &outline(2)).await.unwrap();

        let err = get_chapter_owned(&pool, saved.chapters[0].id, other)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
        let err = complete_chapter(&pool, saved.chapters[0].id, other)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn listing_shows_only_own_courses() {
        let (pool, user_id) = setup().await;
        let other = auth::register(&pool, "bob", "secret").await.unwrap();
        save_course(&pool, user_id, &outline(2)).await.unwrap();

        let mine = list_courses(&pool, user_id).await.unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].chapters.len(), 2);
        let theirs = list_courses(&pool, other).await.unwrap();
        assert!(theirs.is_empty());
    }
}
