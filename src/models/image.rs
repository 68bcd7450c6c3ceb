use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An image produced by a completed generation request.
///
/// Only the provider-hosted URL is kept; the bytes are never downloaded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeneratedImage {
    pub id: i64,
    pub request_id: String,
    pub image_url: String,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub content_type: Option<String>,
    pub seed: Option<i64>,
    pub has_nsfw: bool,
    pub created_at: DateTime<Utc>,
}

/// Insert payload for an image row.
#[derive(Debug, Clone, PartialEq)]
pub struct NewGeneratedImage {
    pub request_id: String,
    pub image_url: String,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub content_type: Option<String>,
    pub seed: Option<i64>,
    pub has_nsfw: bool,
}
