//! Test doubles shared by the integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use fal_image_jobs::db::memory::MemoryJobStore;
use fal_image_jobs::db::JobStore;
use fal_image_jobs::models::generation::{
    GenerationRequest, GenerationResult, ResultImage, SubmittedRequest,
};
use fal_image_jobs::models::job::{GenerationJob, ImageSize, JobStatus};
use fal_image_jobs::services::generation::GenerationService;
use fal_image_jobs::services::provider::{ImageProvider, ProviderError};

pub const TEST_API_KEY: &str = "test-key";

#[derive(Default)]
struct MockState {
    submitted: Vec<GenerationRequest>,
    submit_keys: Vec<String>,
    submit_fails: bool,
    statuses: HashMap<String, JobStatus>,
    failing_polls: HashSet<String>,
    results: HashMap<String, GenerationResult>,
    failing_fetches: HashSet<String>,
    polls: Vec<String>,
    fetches: Vec<String>,
}

/// Scriptable [`ImageProvider`].
///
/// Every submit is accepted with a fresh request id. Status and result
/// responses are scripted per job; an unscripted job reports its status as
/// unreadable and has no result.
#[derive(Default)]
pub struct MockProvider {
    state: Mutex<MockState>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_submits(&self, fail: bool) {
        self.state.lock().unwrap().submit_fails = fail;
    }

    pub fn set_status(&self, job: &GenerationJob, status: JobStatus) {
        self.state
            .lock()
            .unwrap()
            .statuses
            .insert(job.status_url.clone(), status);
    }

    pub fn fail_polls(&self, job: &GenerationJob, fail: bool) {
        let mut state = self.state.lock().unwrap();
        if fail {
            state.failing_polls.insert(job.status_url.clone());
        } else {
            state.failing_polls.remove(&job.status_url);
        }
    }

    pub fn set_result(&self, job: &GenerationJob, result: GenerationResult) {
        self.state
            .lock()
            .unwrap()
            .results
            .insert(job.result_url.clone(), result);
    }

    pub fn fail_fetches(&self, job: &GenerationJob, fail: bool) {
        let mut state = self.state.lock().unwrap();
        if fail {
            state.failing_fetches.insert(job.result_url.clone());
        } else {
            state.failing_fetches.remove(&job.result_url);
        }
    }

    pub fn submitted(&self) -> Vec<GenerationRequest> {
        self.state.lock().unwrap().submitted.clone()
    }

    pub fn submit_keys(&self) -> Vec<String> {
        self.state.lock().unwrap().submit_keys.clone()
    }

    pub fn poll_count(&self) -> usize {
        self.state.lock().unwrap().polls.len()
    }

    pub fn fetch_count(&self) -> usize {
        self.state.lock().unwrap().fetches.len()
    }

    /// Total provider calls of any kind.
    pub fn call_count(&self) -> usize {
        let state = self.state.lock().unwrap();
        state.submit_keys.len() + state.polls.len() + state.fetches.len()
    }
}

#[async_trait]
impl ImageProvider for MockProvider {
    async fn submit(
        &self,
        api_key: &str,
        request: &GenerationRequest,
    ) -> Result<SubmittedRequest, ProviderError> {
        let mut state = self.state.lock().unwrap();
        state.submit_keys.push(api_key.to_string());
        if state.submit_fails {
            return Err(ProviderError::Unreachable("connection refused".to_string()));
        }
        state.submitted.push(request.clone());

        let request_id = Uuid::new_v4().to_string();
        Ok(SubmittedRequest {
            status_url: format!("mock://{}/requests/{}/status", request.model, request_id),
            result_url: format!("mock://{}/requests/{}", request.model, request_id),
            request_id,
        })
    }

    async fn poll_status(
        &self,
        status_url: &str,
        _api_key: &str,
    ) -> Result<Option<JobStatus>, ProviderError> {
        let mut state = self.state.lock().unwrap();
        state.polls.push(status_url.to_string());
        if state.failing_polls.contains(status_url) {
            return Err(ProviderError::Unreachable("status timed out".to_string()));
        }
        Ok(state.statuses.get(status_url).copied())
    }

    async fn fetch_result(
        &self,
        result_url: &str,
        _api_key: &str,
    ) -> Result<GenerationResult, ProviderError> {
        let mut state = self.state.lock().unwrap();
        state.fetches.push(result_url.to_string());
        if state.failing_fetches.contains(result_url) {
            return Err(ProviderError::Unreachable("result timed out".to_string()));
        }
        state
            .results
            .get(result_url)
            .cloned()
            .ok_or_else(|| ProviderError::InvalidResponse("no result scripted".to_string()))
    }
}

/// Service wired to an in-memory store and a mock provider.
pub struct TestHarness {
    pub store: Arc<MemoryJobStore>,
    pub provider: Arc<MockProvider>,
    pub service: GenerationService,
}

pub fn harness() -> TestHarness {
    harness_with_key(Some(TEST_API_KEY))
}

pub fn harness_with_key(api_key: Option<&str>) -> TestHarness {
    let store = Arc::new(MemoryJobStore::new());
    let provider = Arc::new(MockProvider::new());
    let service = GenerationService::new(
        store.clone() as Arc<dyn JobStore>,
        provider.clone() as Arc<dyn ImageProvider>,
        api_key.map(str::to_string),
    );
    TestHarness {
        store,
        provider,
        service,
    }
}

impl TestHarness {
    pub async fn submit(&self, prompt: &str, num_images: i64) -> GenerationJob {
        self.service
            .submit_job(prompt, num_images, "fast-sdxl", ImageSize::Square)
            .await
            .expect("submit failed")
    }
}

/// Result payload with one 512x512 PNG per url.
pub fn png_result(urls: &[&str], seed: i64) -> GenerationResult {
    GenerationResult {
        images: urls
            .iter()
            .map(|url| ResultImage {
                url: url.to_string(),
                width: Some(512),
                height: Some(512),
                content_type: Some("image/png".to_string()),
            })
            .collect(),
        seed: Some(seed),
        nsfw_flags: vec![],
    }
}
