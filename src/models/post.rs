use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use url::Url;
use validator::{Validate, ValidationError};

use crate::models::question::OPTION_COUNT;
use crate::utils::html::clean_html;

/// Represents the 'posts' table in the database.
/// The payload is stored as JSON next to an explicit `kind` column.
#[derive(Debug, Clone, FromRow)]
pub struct PostRow {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub kind: String,
    pub payload: serde_json::Value,
    pub comments_count: i32,
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Typed body of a community post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PostContent {
    Text {
        body: String,
    },
    /// A practice question shared with the community.
    Mcq {
        question: String,
        options: Vec<String>,
        correct_option: usize,
        explanation: Option<String>,
    },
    Resource {
        url: String,
        description: String,
    },
    /// A question with a points reward for the best answer.
    Bounty {
        reward_points: u32,
        body: String,
    },
}

#[derive(Debug, Deserialize)]
struct TextPayload {
    body: String,
}

#[derive(Debug, Deserialize)]
struct McqPayload {
    question: String,
    options: Vec<String>,
    correct_option: usize,
    explanation: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResourcePayload {
    url: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct BountyPayload {
    reward_points: u32,
    body: String,
}

impl PostContent {
    pub fn kind(&self) -> &'static str {
        match self {
            PostContent::Text { .. } => "text",
            PostContent::Mcq { .. } => "mcq",
            PostContent::Resource { .. } => "resource",
            PostContent::Bounty { .. } => "bounty",
        }
    }

    /// Decodes a stored payload according to its `kind` column.
    pub fn decode(kind: &str, payload: serde_json::Value) -> Result<Self, serde_json::Error> {
        use serde::de::Error;

        Ok(match kind {
            "text" => {
                let p: TextPayload = serde_json::from_value(payload)?;
                PostContent::Text { body: p.body }
            }
            "mcq" => {
                let p: McqPayload = serde_json::from_value(payload)?;
                PostContent::Mcq {
                    question: p.question,
                    options: p.options,
                    correct_option: p.correct_option,
                    explanation: p.explanation,
                }
            }
            "resource" => {
                let p: ResourcePayload = serde_json::from_value(payload)?;
                PostContent::Resource {
                    url: p.url,
                    description: p.description,
                }
            }
            "bounty" => {
                let p: BountyPayload = serde_json::from_value(payload)?;
                PostContent::Bounty {
                    reward_points: p.reward_points,
                    body: p.body,
                }
            }
            other => return Err(serde_json::Error::custom(format!("unknown post kind '{}'", other))),
        })
    }

    /// The payload stored alongside `kind` (the enum without its tag).
    pub fn payload(&self) -> serde_json::Value {
        let mut value = serde_json::to_value(self).unwrap_or_default();
        if let Some(map) = value.as_object_mut() {
            map.remove("kind");
        }
        value
    }

    /// Sanitizes free-text fields in place.
    pub fn sanitize(&mut self) {
        match self {
            PostContent::Text { body } | PostContent::Bounty { body, .. } => *body = clean_html(body),
            PostContent::Mcq {
                question,
                explanation,
                ..
            } => {
                *question = clean_html(question);
                if let Some(explanation) = explanation {
                    *explanation = clean_html(explanation);
                }
            }
            PostContent::Resource { description, .. } => *description = clean_html(description),
        }
    }
}

fn validate_content(content: &PostContent) -> Result<(), ValidationError> {
    match content {
        PostContent::Text { body } | PostContent::Bounty { body, .. } => {
            if body.trim().is_empty() || body.len() > 10_000 {
                return Err(ValidationError::new("body_length"));
            }
        }
        PostContent::Mcq {
            question,
            options,
            correct_option,
            ..
        } => {
            if question.trim().is_empty() || question.len() > 2_000 {
                return Err(ValidationError::new("question_length"));
            }
            if options.len() != OPTION_COUNT || *correct_option >= OPTION_COUNT {
                return Err(ValidationError::new("mcq_needs_four_options"));
            }
        }
        PostContent::Resource { url, description } => {
            let parsed = Url::parse(url).map_err(|_| ValidationError::new("invalid_url"))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(ValidationError::new("invalid_url_scheme"));
            }
            if description.len() > 2_000 {
                return Err(ValidationError::new("description_too_long"));
            }
        }
    }
    if let PostContent::Bounty { reward_points, .. } = content {
        if *reward_points == 0 {
            return Err(ValidationError::new("reward_must_be_positive"));
        }
    }
    Ok(())
}

/// Post as returned to clients.
#[derive(Debug, Clone, Serialize)]
pub struct Post {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub content: PostContent,
    pub comments_count: i32,
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl TryFrom<PostRow> for Post {
    type Error = serde_json::Error;

    fn try_from(row: PostRow) -> Result<Self, Self::Error> {
        Ok(Post {
            content: PostContent::decode(&row.kind, row.payload)?,
            id: row.id,
            user_id: row.user_id,
            title: row.title,
            comments_count: row.comments_count,
            created_at: row.created_at,
        })
    }
}

/// DTO for creating a new post.
#[derive(Debug, Deserialize, Validate)]
pub struct CreatePostRequest {
    #[validate(length(
        min = 1,
        max = 100,
        message = "Title length must be between 1 and 100 chars"
    ))]
    pub title: String,

    #[validate(custom(function = validate_content))]
    pub content: PostContent,
}

/// Query parameters for listing posts.
#[derive(Debug, Deserialize)]
pub struct PostListParams {
    /// Cursor for pagination: the created_at timestamp of the last post in the previous page.
    pub cursor: Option<chrono::DateTime<chrono::Utc>>,

    /// Number of items to return (default: 20, max: 100).
    pub limit: Option<i64>,

    /// Restrict to one content kind.
    pub kind: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_each_kind_explicitly() {
        let text = PostContent::decode("text", json!({ "body": "hello" })).unwrap();
        assert_eq!(text, PostContent::Text { body: "hello".into() });

        let bounty = PostContent::decode("bounty", json!({ "reward_points": 50, "body": "help" })).unwrap();
        assert_eq!(bounty.kind(), "bounty");

        let mcq = PostContent::decode(
            "mcq",
            json!({ "question": "Q", "options": ["a", "b", "c", "d"], "correct_option": 2, "explanation": null }),
        )
        .unwrap();
        assert!(matches!(mcq, PostContent::Mcq { correct_option: 2, .. }));
    }

    #[test]
    fn mismatched_payload_is_an_error_not_a_guess() {
        // A text payload stored under the resource kind must not decode.
        assert!(PostContent::decode("resource", json!({ "body": "hello" })).is_err());
        assert!(PostContent::decode("poll", json!({})).is_err());
    }

    #[test]
    fn payload_drops_the_tag_and_decodes_back() {
        let content = PostContent::Resource {
            url: "https://example.org/cma-formulas.pdf".into(),
            description: "Formula sheet".into(),
        };
        let payload = content.payload();
        assert!(payload.get("kind").is_none());
        assert_eq!(PostContent::decode(content.kind(), payload).unwrap(), content);
    }

    #[test]
    fn validation_rejects_bad_shapes() {
        let bad_url = CreatePostRequest {
            title: "Link".into(),
            content: PostContent::Resource {
                url: "not a url".into(),
                description: String::new(),
            },
        };
        assert!(bad_url.validate().is_err());

        let free_bounty = CreatePostRequest {
            title: "Help".into(),
            content: PostContent::Bounty {
                reward_points: 0,
                body: "anyone?".into(),
            },
        };
        assert!(free_bounty.validate().is_err());

        let three_options = CreatePostRequest {
            title: "Quiz".into(),
            content: PostContent::Mcq {
                question: "Q".into(),
                options: vec!["a".into(), "b".into(), "c".into()],
                correct_option: 0,
                explanation: None,
            },
        };
        assert!(three_options.validate().is_err());
    }

    #[test]
    fn sanitize_strips_scripts() {
        let mut content = PostContent::Text {
            body: "<b>ok</b><script>alert(1)</script>".into(),
        };
        content.sanitize();
        assert_eq!(content, PostContent::Text { body: "<b>ok</b>".into() });
    }
}
