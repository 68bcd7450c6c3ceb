pub mod generation;
pub mod materializer;
pub mod provider;
pub mod reconciler;
pub mod submitter;

/// Treat a blank key the same as a missing one.
pub(crate) fn usable_api_key(api_key: Option<&str>) -> Option<&str> {
    api_key.map(str::trim).filter(|key| !key.is_empty())
}
