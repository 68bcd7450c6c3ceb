use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Lower bound for images per request.
pub const MIN_IMAGES: i32 = 1;

/// Upper bound for images per request (provider limit).
pub const MAX_IMAGES: i32 = 10;

/// Lifecycle status of a generation request, as reported by the provider queue.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, EnumString, Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    InQueue,
    InProgress,
    Completed,
    Failed,
}

impl JobStatus {
    /// Wire and storage representation.
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::InQueue => "IN_QUEUE",
            JobStatus::InProgress => "IN_PROGRESS",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
        }
    }

    /// Terminal jobs are never polled again.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Statuses a job may hold immediately before moving to `self`.
    ///
    /// Transitions only go forward: `IN_QUEUE` -> `IN_PROGRESS` -> terminal,
    /// and a job may skip straight from `IN_QUEUE` to a terminal state.
    pub fn predecessors(self) -> &'static [JobStatus] {
        match self {
            JobStatus::InQueue => &[],
            JobStatus::InProgress => &[JobStatus::InQueue],
            JobStatus::Completed | JobStatus::Failed => {
                &[JobStatus::InQueue, JobStatus::InProgress]
            }
        }
    }

    pub fn can_advance_to(self, next: JobStatus) -> bool {
        next.predecessors().contains(&self)
    }
}

/// Output size presets understood by the provider.
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash, EnumString, Display,
)]
pub enum ImageSize {
    #[serde(rename = "square_hd")]
    #[strum(serialize = "square_hd")]
    SquareHd,
    #[default]
    #[serde(rename = "square")]
    #[strum(serialize = "square")]
    Square,
    #[serde(rename = "portrait_4_3")]
    #[strum(serialize = "portrait_4_3")]
    Portrait4x3,
    #[serde(rename = "portrait_16_9")]
    #[strum(serialize = "portrait_16_9")]
    Portrait16x9,
    #[serde(rename = "landscape_4_3")]
    #[strum(serialize = "landscape_4_3")]
    Landscape4x3,
    #[serde(rename = "landscape_16_9")]
    #[strum(serialize = "landscape_16_9")]
    Landscape16x9,
}

impl ImageSize {
    pub fn as_str(self) -> &'static str {
        match self {
            ImageSize::SquareHd => "square_hd",
            ImageSize::Square => "square",
            ImageSize::Portrait4x3 => "portrait_4_3",
            ImageSize::Portrait16x9 => "portrait_16_9",
            ImageSize::Landscape4x3 => "landscape_4_3",
            ImageSize::Landscape16x9 => "landscape_16_9",
        }
    }
}

/// Clamp a caller-supplied image count into `[MIN_IMAGES, MAX_IMAGES]`.
pub fn clamp_num_images(requested: i64) -> i32 {
    requested.clamp(MIN_IMAGES as i64, MAX_IMAGES as i64) as i32
}

/// A text-to-image request tracked through the provider queue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerationJob {
    pub request_id: String,
    pub prompt: String,
    pub num_images: i32,
    pub model: String,
    pub image_size: ImageSize,
    pub status: JobStatus,
    pub status_url: String,
    pub result_url: String,
    /// Set once the result payload has been fetched and every image stored.
    pub materialized_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Insert payload for a freshly submitted job.
#[derive(Debug, Clone)]
pub struct NewGenerationJob {
    pub request_id: String,
    pub prompt: String,
    pub num_images: i32,
    pub model: String,
    pub image_size: ImageSize,
    pub status: JobStatus,
    pub status_url: String,
    pub result_url: String,
}

/// Listing row: a job and how many images have been stored for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobWithImageCount {
    #[serde(flatten)]
    pub job: GenerationJob,
    pub image_count: i64,
}
