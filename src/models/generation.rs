use garde::Validate;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::models::job::ImageSize;

/// Model used when the caller does not pick one.
pub const DEFAULT_MODEL: &str = "fast-sdxl";

/// Body of `POST /api/v1/jobs`.
#[derive(Debug, Deserialize)]
pub struct SubmitJobRequest {
    pub prompt: String,

    /// Clamped into range by the submitter, never rejected. Numeric strings
    /// and floats are coerced; anything unreadable counts as 0.
    #[serde(default = "default_num_images", deserialize_with = "coerce_count")]
    pub num_images: i64,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default)]
    pub image_size: ImageSize,
}

fn default_num_images() -> i64 {
    1
}

fn coerce_count<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Null => default_num_images(),
        Value::Bool(b) => i64::from(b),
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or(0),
        Value::String(s) => parse_count(&s),
        Value::Array(_) | Value::Object(_) => 0,
    })
}

/// Leading integer of a string, e.g. `"15"`, `" 7 "`, `"12.9"` or `"3 images"`.
fn parse_count(raw: &str) -> i64 {
    let trimmed = raw.trim();
    if let Ok(n) = trimmed.parse::<i64>() {
        return n;
    }
    if let Ok(f) = trimmed.parse::<f64>() {
        return f as i64;
    }

    let sign_len = usize::from(trimmed.starts_with(['-', '+']));
    let digits_len = trimmed[sign_len..]
        .bytes()
        .take_while(u8::is_ascii_digit)
        .count();
    trimmed[..sign_len + digits_len]
        .parse::<i64>()
        .unwrap_or(if digits_len > 0 { i64::MAX } else { 0 })
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

/// A generation request that passed validation and is ready for the provider.
#[derive(Debug, Clone, PartialEq, Validate)]
pub struct GenerationRequest {
    #[garde(length(min = 1, max = 4000))]
    pub prompt: String,

    #[garde(range(min = 1, max = 10))]
    pub num_images: i32,

    #[garde(length(min = 1, max = 255), custom(validate_model_id))]
    pub model: String,

    #[garde(skip)]
    pub image_size: ImageSize,
}

/// Model ids are provider path segments such as `fast-sdxl` or `flux/dev`.
fn validate_model_id(value: &str, _ctx: &()) -> garde::Result {
    let allowed = |c: char| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/');
    if !value.chars().all(allowed) {
        return Err(garde::Error::new(
            "may only contain letters, digits, '-', '_', '.' and '/'",
        ));
    }
    if value
        .split('/')
        .any(|segment| segment.is_empty() || segment == "." || segment == "..")
    {
        return Err(garde::Error::new("must not have empty or relative path segments"));
    }
    Ok(())
}

/// Identifiers handed back by the provider when a request is queued.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmittedRequest {
    pub request_id: String,
    pub status_url: String,
    pub result_url: String,
}

/// One image entry from a completed result payload.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultImage {
    pub url: String,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub content_type: Option<String>,
}

/// Output of a completed request.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GenerationResult {
    pub images: Vec<ResultImage>,
    /// Shared by every image of the request.
    pub seed: Option<i64>,
    /// Per-image NSFW flags, indexed like `images`. May be shorter or empty.
    pub nsfw_flags: Vec<bool>,
}

impl GenerationResult {
    pub fn is_nsfw(&self, index: usize) -> bool {
        self.nsfw_flags.get(index).copied().unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(model: &str) -> GenerationRequest {
        GenerationRequest {
            prompt: "a lighthouse at dusk".to_string(),
            num_images: 2,
            model: model.to_string(),
            image_size: ImageSize::Square,
        }
    }

    #[test]
    fn test_accepts_known_model_ids() {
        assert!(request("fast-sdxl").validate().is_ok());
        assert!(request("flux/dev").validate().is_ok());
        assert!(request("stable-diffusion-v3.5").validate().is_ok());
    }

    #[test]
    fn test_rejects_malformed_model_ids() {
        assert!(request("").validate().is_err());
        assert!(request("/flux").validate().is_err());
        assert!(request("flux//dev").validate().is_err());
        assert!(request("flux dev").validate().is_err());
        assert!(request("../../admin").validate().is_err());
        assert!(request("flux?x=1").validate().is_err());
    }

    #[test]
    fn test_rejects_oversized_prompt() {
        let mut req = request("fast-sdxl");
        req.prompt = "x".repeat(4001);
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_submit_body_defaults() {
        let body: SubmitJobRequest = serde_json::from_str(r#"{"prompt":"a cat"}"#).unwrap();
        assert_eq!(body.num_images, 1);
        assert_eq!(body.model, "fast-sdxl");
        assert_eq!(body.image_size, ImageSize::Square);
    }

    #[test]
    fn test_submit_body_coerces_image_count() {
        let count = |raw: &str| {
            let body = format!(r#"{{"prompt":"a cat","num_images":{raw}}}"#);
            serde_json::from_str::<SubmitJobRequest>(&body)
                .unwrap()
                .num_images
        };

        assert_eq!(count("15"), 15);
        assert_eq!(count(r#""15""#), 15);
        assert_eq!(count("15.0"), 15);
        assert_eq!(count("4.7"), 4);
        assert_eq!(count(r#"" 7 ""#), 7);
        assert_eq!(count(r#""3 images""#), 3);
        assert_eq!(count(r#""-2""#), -2);
        assert_eq!(count(r#""many""#), 0);
        assert_eq!(count("true"), 1);
        assert_eq!(count("null"), 1);
        assert_eq!(count("[5]"), 0);
        assert_eq!(count("18446744073709551615"), i64::MAX);
        assert_eq!(count(r#""99999999999999999999""#), i64::MAX);
    }

    #[test]
    fn test_nsfw_flag_defaults_to_false() {
        let result = GenerationResult {
            images: vec![],
            seed: Some(7),
            nsfw_flags: vec![true],
        };
        assert!(result.is_nsfw(0));
        assert!(!result.is_nsfw(1));
        assert!(!GenerationResult::default().is_nsfw(0));
    }
}
