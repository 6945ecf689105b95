use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::SqlitePool;
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::{
    ai::{ModelError, TextModel},
    course::{self, CourseOutline},
    error::ApiError,
};

/// Generated lesson payload, cached verbatim on the chapter after the first
/// successful generation.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ChapterContent {
    pub content_markdown: String,
    pub quizzes: Vec<Quiz>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Quiz {
    pub question: String,
    pub options: Vec<String>,
    pub correct_answer: String,
}

fn outline_prompt(topic: &str) -> String {
    format!(
        r#"Act as a curriculum expert.
Create a course syllabus for the topic: "{topic}".
Language: English.

Output MUST be VALID JSON ONLY (no markdown ```json fences, no preamble).
JSON structure:
{{
    "title": "An engaging title",
    "description": "A short one-sentence description",
    "chapters": [
        {{
            "chapter_number": 1,
            "title": "Chapter title",
            "summary": "Summary of the material"
        }}
    ]
}}
Requirement: create 3 to 5 chapters."#
    )
}

fn content_prompt(course_title: &str, chapter_title: &str) -> String {
    format!(
        r#"Act as a friendly, engaging coding mentor, like a friend teaching a friend.

Course topic: "{course_title}"
Current chapter: "{chapter_title}".

Content instructions:
1.  **Tone:** Use relaxed, beginner-friendly language. Avoid dry textbook definitions.
2.  **Analogies:** ALWAYS use real-world analogies to explain technical concepts (e.g. "A variable is like a food container...").
3.  **Interactive:** Address the reader directly, invite them to picture things.
4.  **Tables:** IF you compare things (pros vs cons, type A vs type B), you MUST use a valid Markdown table.

Example of the expected Markdown table:
| Feature | Explanation |
|---|---|
| Speed | Very fast |

Quiz instructions:
Create 1 to 3 multiple-choice quiz questions relevant to the material above.

Output MUST be valid JSON (no markdown ```json fences):
{{
    "content_markdown": "Full material in markdown format (headings, bold, lists, tables)...",
    "quizzes": [
        {{
            "question": "Question?",
            "options": ["A", "B", "C", "D"],
            "correct_answer": "A"
        }}
    ]
}}"#
    )
}

/// Best-effort recovery of a JSON object from free-form model text: the
/// substring from the first `{` to the last `}`.
///
/// Heuristic only. It tolerates prose and code fences around the payload,
/// but a reply containing several unrelated objects, or a literal `{` in
/// text before the real payload, can select the wrong span.
pub fn extract_json_span(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&raw[start..=end])
}

/// Older models of the same family answered with a single `"quiz"` object
/// instead of a `"quizzes"` list. Fold that shape into the current one
/// before validating and caching.
fn normalize_legacy_quiz(value: &mut Value) {
    let Some(obj) = value.as_object_mut() else {
        return;
    };
    if !obj.contains_key("quizzes") {
        if let Some(quiz) = obj.remove("quiz") {
            obj.insert("quizzes".to_string(), Value::Array(vec![quiz]));
        }
    }
}

fn parse_outline(raw: &str) -> Result<CourseOutline, ApiError> {
    let span = extract_json_span(raw).ok_or_else(|| {
        warn!(raw, "model output contains no JSON object");
        ApiError::MalformedAiOutput
    })?;
    serde_json::from_str(span).map_err(|e| {
        warn!(error = %e, "extracted span is not a valid outline");
        ApiError::MalformedAiOutput
    })
}

fn parse_content(raw: &str) -> Result<ChapterContent, ApiError> {
    let span = extract_json_span(raw).ok_or_else(|| {
        warn!(raw, "model output contains no JSON object");
        ApiError::MalformedAiOutput
    })?;
    let mut value: Value = serde_json::from_str(span).map_err(|e| {
        warn!(error = %e, "extracted span is not valid JSON");
        ApiError::MalformedAiOutput
    })?;
    normalize_legacy_quiz(&mut value);
    serde_json::from_value(value).map_err(|e| {
        warn!(error = %e, "model JSON does not match the content shape");
        ApiError::MalformedAiOutput
    })
}

/// Preview an outline for a topic. Nothing is persisted.
pub async fn generate_outline(
    model: &dyn TextModel,
    topic: &str,
) -> Result<CourseOutline, ApiError> {
    let raw = model
        .generate(&outline_prompt(topic))
        .await
        .map_err(|e| match e {
            ModelError::QuotaExceeded => ApiError::QuotaExceeded,
            other => ApiError::GenerationFailed(other.to_string()),
        })?;
    parse_outline(&raw)
}

/// Return a chapter's lesson content, generating and caching it on first
/// access. Cached content is returned unchanged forever; there is no
/// regeneration and no invalidation. Nothing is cached on failure.
pub async fn chapter_content(
    database: &SqlitePool,
    model: &dyn TextModel,
    chapter_id: i64,
    user_id: i64,
) -> Result<ChapterContent, ApiError> {
    let chapter = course::get_chapter_owned(database, chapter_id, user_id).await?;

    if let Some(cached) = &chapter.content_json {
        let content = serde_json::from_str(cached)
            .map_err(|e| anyhow::anyhow!("corrupt cached content for chapter {}: {}", chapter.id, e))?;
        return Ok(content);
    }

    let course_title = course::course_title(database, chapter.course_id).await?;
    let raw = model
        .generate(&content_prompt(&course_title, &chapter.title))
        .await
        .map_err(|e| match e {
            ModelError::QuotaExceeded => ApiError::QuotaExceeded,
            other => ApiError::ContentGenerationFailed(other.to_string()),
        })?;
    let content = parse_content(&raw)?;

    let serialized = serde_json::to_string(&content)
        .map_err(|e| anyhow::anyhow!("failed to serialize content: {}", e))?;
    course::cache_content(database, chapter.id, &serialized).await?;
    info!(chapter_id = chapter.id, "generated and cached chapter content");
    Ok(content)
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    };

    use futures::future::BoxFuture;

    use super::*;
    use crate::{auth, course::OutlineChapter, db};

    /// Scripted model: pops one canned reply per call, counts calls.
    struct ScriptedModel {
        replies: Mutex<Vec<Result<String, ModelError>>>,
        calls: AtomicUsize,
    }

    impl ScriptedModel {
        fn new(replies: Vec<Result<String, ModelError>>) -> Self {
            Self {
                replies: Mutex::new(replies),
                calls: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl TextModel for ScriptedModel {
        fn generate<'a>(&'a self, _prompt: &'a str) -> BoxFuture<'a, Result<String, ModelError>> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                self.replies
                    .lock()
                    .unwrap()
                    .pop()
                    .expect("scripted model ran out of replies")
            })
        }
    }

    async fn setup_chapter() -> (SqlitePool, i64, i64) {
        let pool = db::connect_memory().await.unwrap();
        db::init_schema(&pool).await.unwrap();
        let user_id = auth::register(&pool, "alice", "secret").await.unwrap();
        let saved = course::save_course(
            &pool,
            user_id,
            &CourseOutline {
                title: "Rust Basics".to_string(),
                description: "From zero to ownership".to_string(),
                chapters: vec![OutlineChapter {
                    chapter_number: 1,
                    title: "Variables".to_string(),
                    summary: "Bindings and mutability".to_string(),
                }],
            },
        )
        .await
        .unwrap();
        (pool, user_id, saved.chapters[0].id)
    }

    const CONTENT_JSON: &str = r#"{"content_markdown":"# Variables","quizzes":[{"question":"Q?","options":["A","B"],"correct_answer":"A"}]}"#;

    #[test]
    fn extraction_strips_prose_and_fences() {
        let raw = "Sure! ```json\n{\"title\":\"X\",\"description\":\"Y\",\"chapters\":[]}\n```";
        let span = extract_json_span(raw).unwrap();
        let value: Value = serde_json::from_str(span).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"title": "X", "description": "Y", "chapters": []})
        );
    }

    #[test]
    fn extraction_fails_without_braces() {
        assert!(extract_json_span("no json here").is_none());
        assert!(extract_json_span("} backwards {").is_none());
    }

    #[test]
    fn legacy_quiz_key_becomes_a_list() {
        let mut value = serde_json::json!({
            "content_markdown": "text",
            "quiz": {"question": "Q?", "options": ["A"], "correct_answer": "A"}
        });
        normalize_legacy_quiz(&mut value);
        let obj = value.as_object().unwrap();
        assert!(!obj.contains_key("quiz"));
        assert_eq!(obj["quizzes"].as_array().unwrap().len(), 1);

        // current shape passes through untouched
        let mut value = serde_json::json!({"content_markdown": "text", "quizzes": []});
        normalize_legacy_quiz(&mut value);
        assert!(value.as_object().unwrap()["quizzes"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn outline_is_parsed_from_wrapped_reply() {
        let model = ScriptedModel::new(vec![Ok(
            "Here you go:\n{\"title\":\"T\",\"description\":\"D\",\"chapters\":[{\"chapter_number\":1,\"title\":\"C\",\"summary\":\"S\"}]}"
                .to_string(),
        )]);
        let outline = generate_outline(&model, "rust").await.unwrap();
        assert_eq!(outline.title, "T");
        assert_eq!(outline.chapters.len(), 1);
    }

    #[tokio::test]
    async fn quota_exhaustion_is_surfaced_as_retryable() {
        let model = ScriptedModel::new(vec![Err(ModelError::QuotaExceeded)]);
        let err = generate_outline(&model, "rust").await.unwrap_err();
        assert!(matches!(err, ApiError::QuotaExceeded));
    }

    #[tokio::test]
    async fn content_is_cached_and_never_regenerated() {
        let (pool, user_id, chapter_id) = setup_chapter().await;
        // a second, different reply that must never be used
        let model = ScriptedModel::new(vec![
            Ok(r#"{"content_markdown":"other","quizzes":[]}"#.to_string()),
            Ok(format!("intro text {CONTENT_JSON}")),
        ]);

        let first = chapter_content(&pool, &model, chapter_id, user_id)
            .await
            .unwrap();
        let second = chapter_content(&pool, &model, chapter_id, user_id)
            .await
            .unwrap();
        assert_eq!(model.calls(), 1);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
        assert_eq!(first.content_markdown, "# Variables");
    }

    #[tokio::test]
    async fn malformed_reply_caches_nothing() {
        let (pool, user_id, chapter_id) = setup_chapter().await;
        let model = ScriptedModel::new(vec![Ok("sorry, I can only answer in prose".to_string())]);

        let err = chapter_content(&pool, &model, chapter_id, user_id)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::MalformedAiOutput));

        let cached: Option<String> =
            sqlx::query_scalar("SELECT content_json FROM chapters WHERE id = ?")
                .bind(chapter_id)
                .fetch_one(&pool)
                .await
                .unwrap();
        assert!(cached.is_none());
    }

    #[tokio::test]
    async fn legacy_reply_is_normalized_before_caching() {
        let (pool, user_id, chapter_id) = setup_chapter().await;
        let legacy = r#"{"content_markdown":"# V","quiz":{"question":"Q?","options":["A"],"correct_answer":"A"}}"#;
        let model = ScriptedModel::new(vec![Ok(legacy.to_string())]);

        let content = chapter_content(&pool, &model, chapter_id, user_id)
            .await
            .unwrap();
        assert_eq!(content.quizzes.len(), 1);

        let cached: String = sqlx::query_scalar(
            "SELECT content_json FROM chapters WHERE id = ?",
        )
        .bind(chapter_id)
        .fetch_one(&pool)
        .await
        .unwrap();
        let value: Value = serde_json::from_str(&cached).unwrap();
        let obj = value.as_object().unwrap();
        assert!(obj.contains_key("quizzes"));
        assert!(!obj.contains_key("quiz"));
    }

    #[tokio::test]
    async fn provider_failure_is_not_retryable_for_content() {
        let (pool, user_id, chapter_id) = setup_chapter().await;
        let model = ScriptedModel::new(vec![Err(ModelError::Api {
            status: 400,
            message: "bad request".to_string(),
        })]);
        let err = chapter_content(&pool, &model, chapter_id, user_id)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::ContentGenerationFailed(_)));
    }
}
