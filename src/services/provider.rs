//! Client for the fal.ai queue API.
//!
//! A request is queued with `POST {base}/{model}`, then tracked through the
//! `status_url` and `response_url` the queue hands back.

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;
use std::time::Duration;

use crate::models::generation::{
    GenerationRequest, GenerationResult, ResultImage, SubmittedRequest,
};
use crate::models::job::JobStatus;

/// Longest provider body echoed back inside an error.
const MAX_ERROR_BODY: usize = 512;

/// Remote image-generation queue.
#[async_trait]
pub trait ImageProvider: Send + Sync {
    /// Queue a generation request.
    async fn submit(
        &self,
        api_key: &str,
        request: &GenerationRequest,
    ) -> Result<SubmittedRequest, ProviderError>;

    /// Current queue status. `Ok(None)` means the provider answered but the
    /// status could not be read; callers treat that as "no change".
    async fn poll_status(
        &self,
        status_url: &str,
        api_key: &str,
    ) -> Result<Option<JobStatus>, ProviderError>;

    /// Output payload of a completed request.
    async fn fetch_result(
        &self,
        result_url: &str,
        api_key: &str,
    ) -> Result<GenerationResult, ProviderError>;
}

/// HTTP client for the fal.ai queue.
pub struct FalClient {
    http: Client,
    base_url: String,
}

#[derive(Serialize)]
struct QueueSubmitRequest<'a> {
    prompt: &'a str,
    num_images: i32,
    image_size: &'a str,
}

#[derive(Deserialize)]
struct QueueSubmitResponse {
    request_id: Option<String>,
    status_url: Option<String>,
    response_url: Option<String>,
}

#[derive(Deserialize)]
struct QueueStatusResponse {
    status: Option<String>,
}

/// Only the shape of `images` is enforced; entries are read field by field.
#[derive(Deserialize)]
struct QueueResultResponse {
    images: Vec<Value>,
    #[serde(default)]
    seed: Value,
    #[serde(default)]
    has_nsfw_concepts: Value,
}

impl FalClient {
    /// `base_url` is the queue root including the owner segment,
    /// e.g. `https://queue.fal.run/fal-ai`. Every call is bounded by `timeout`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ProviderError> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("fal-image-jobs/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ProviderError::Setup(e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Queue URLs for a request, used when the submit response omits them.
    ///
    /// Request URLs are scoped to the app (first model segment), so
    /// `flux/dev` is tracked under `flux`.
    fn derived_urls(&self, model: &str, request_id: &str) -> (String, String) {
        let app = model.split('/').next().unwrap_or(model);
        let result_url = format!("{}/{}/requests/{}", self.base_url, app, request_id);
        let status_url = format!("{result_url}/status");
        (status_url, result_url)
    }
}

#[async_trait]
impl ImageProvider for FalClient {
    async fn submit(
        &self,
        api_key: &str,
        request: &GenerationRequest,
    ) -> Result<SubmittedRequest, ProviderError> {
        let url = format!("{}/{}", self.base_url, request.model);

        tracing::debug!(
            model = %request.model,
            num_images = request.num_images,
            "Queueing generation request"
        );

        let response = self
            .http
            .post(&url)
            .header(AUTHORIZATION, auth_header(api_key))
            .json(&QueueSubmitRequest {
                prompt: &request.prompt,
                num_images: request.num_images,
                image_size: request.image_size.as_str(),
            })
            .send()
            .await
            .map_err(transport_error)?;

        let body = read_body(response).await?;
        let parsed: QueueSubmitResponse = serde_json::from_str(&body)
            .map_err(|e| ProviderError::InvalidResponse(format!("submit response: {e}")))?;

        let request_id = parsed
            .request_id
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| {
                ProviderError::InvalidResponse("submit response has no request_id".to_string())
            })?;

        let (default_status_url, default_result_url) =
            self.derived_urls(&request.model, &request_id);

        Ok(SubmittedRequest {
            status_url: parsed.status_url.unwrap_or(default_status_url),
            result_url: parsed.response_url.unwrap_or(default_result_url),
            request_id,
        })
    }

    async fn poll_status(
        &self,
        status_url: &str,
        api_key: &str,
    ) -> Result<Option<JobStatus>, ProviderError> {
        let response = self
            .http
            .get(status_url)
            .header(AUTHORIZATION, auth_header(api_key))
            .send()
            .await
            .map_err(transport_error)?;

        let body = read_body(response).await?;
        let status = parse_status(&body);
        if status.is_none() {
            tracing::debug!(status_url, body = %truncate(&body), "Unreadable status payload");
        }
        Ok(status)
    }

    async fn fetch_result(
        &self,
        result_url: &str,
        api_key: &str,
    ) -> Result<GenerationResult, ProviderError> {
        let response = self
            .http
            .get(result_url)
            .header(AUTHORIZATION, auth_header(api_key))
            .send()
            .await
            .map_err(transport_error)?;

        let body = read_body(response).await?;
        parse_result(&body)
    }
}

fn auth_header(api_key: &str) -> String {
    format!("Key {api_key}")
}

fn transport_error(err: reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Unreachable(format!("request timed out: {err}"))
    } else {
        ProviderError::Unreachable(err.to_string())
    }
}

/// Read the body, mapping non-2xx statuses onto the error taxonomy.
async fn read_body(response: Response) -> Result<String, ProviderError> {
    let status = response.status();
    let body = response.text().await.map_err(transport_error)?;

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(ProviderError::Unauthorized {
            status: status.as_u16(),
        });
    }
    if status.is_server_error() {
        return Err(ProviderError::Unreachable(format!(
            "provider returned HTTP {}: {}",
            status.as_u16(),
            truncate(&body)
        )));
    }
    if !status.is_success() {
        return Err(ProviderError::Rejected {
            status: status.as_u16(),
            body: truncate(&body),
        });
    }
    Ok(body)
}

fn truncate(body: &str) -> String {
    match body.char_indices().nth(MAX_ERROR_BODY) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}

/// Missing, malformed and unknown statuses all read as `None`.
pub(crate) fn parse_status(body: &str) -> Option<JobStatus> {
    let parsed: QueueStatusResponse = serde_json::from_str(body).ok()?;
    JobStatus::from_str(&parsed.status?).ok()
}

pub(crate) fn parse_result(body: &str) -> Result<GenerationResult, ProviderError> {
    let parsed: QueueResultResponse = serde_json::from_str(body)
        .map_err(|e| ProviderError::InvalidResponse(format!("result payload: {e}")))?;

    let flags = parsed.has_nsfw_concepts.as_array();
    let mut images = Vec::with_capacity(parsed.images.len());
    let mut nsfw_flags = Vec::with_capacity(parsed.images.len());

    for (index, entry) in parsed.images.iter().enumerate() {
        let Some(image) = result_image(entry) else {
            tracing::warn!(index, "Skipping result image without a url");
            continue;
        };
        images.push(image);
        nsfw_flags.push(
            flags
                .and_then(|f| f.get(index))
                .and_then(Value::as_bool)
                .unwrap_or(false),
        );
    }

    Ok(GenerationResult {
        images,
        seed: int_field(&parsed.seed),
        nsfw_flags,
    })
}

/// An image entry needs a non-empty string `url`. Other fields are dropped
/// when missing or malformed.
fn result_image(entry: &Value) -> Option<ResultImage> {
    let url = entry
        .get("url")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|url| !url.is_empty())?;

    let dimension = |key: &str| {
        entry
            .get(key)
            .and_then(int_field)
            .and_then(|v| i32::try_from(v).ok())
    };

    Some(ResultImage {
        url: url.to_string(),
        width: dimension("width"),
        height: dimension("height"),
        content_type: entry
            .get("content_type")
            .and_then(Value::as_str)
            .map(str::to_string),
    })
}

/// Integers and integral floats that fit in an `i64`.
fn int_field(value: &Value) -> Option<i64> {
    value.as_i64().or_else(|| {
        value
            .as_f64()
            .filter(|f| f.fract() == 0.0 && *f >= i64::MIN as f64 && *f < i64::MAX as f64)
            .map(|f| f as i64)
    })
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("HTTP client setup failed: {0}")]
    Setup(String),

    #[error("Provider unreachable: {0}")]
    Unreachable(String),

    #[error("Provider rejected the API key (HTTP {status})")]
    Unauthorized { status: u16 },

    #[error("Provider rejected the request ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("Invalid provider response: {0}")]
    InvalidResponse(String),
}
