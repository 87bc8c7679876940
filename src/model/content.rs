use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Read-only content metadata the pipeline joins events against.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Content {
    pub id: Uuid,
    pub slug: String,
    pub title: String,
    #[sqlx(try_from = "String")]
    pub content_type: ContentType,
    pub length_seconds: Option<i32>,
    pub publish_ts: DateTime<Utc>,
}

/// The three kinds of content this pipeline knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Podcast,
    Newsletter,
    Video,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Podcast => "podcast",
            ContentType::Newsletter => "newsletter",
            ContentType::Video => "video",
        }
    }
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for ContentType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "podcast" => Ok(ContentType::Podcast),
            "newsletter" => Ok(ContentType::Newsletter),
            "video" => Ok(ContentType::Video),
            other => Err(format!("unknown content_type: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_type_round_trips_through_strings() {
        for ct in [ContentType::Podcast, ContentType::Newsletter, ContentType::Video] {
            assert_eq!(ContentType::try_from(ct.as_str().to_string()).unwrap(), ct);
        }
    }

    #[test]
    fn unknown_content_type_string_is_rejected() {
        assert!(ContentType::try_from("audiobook".to_string()).is_err());
    }
}
