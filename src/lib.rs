//! fal.ai image generation job tracker
//!
//! Submits text-to-image requests to the fal.ai queue API, records each
//! accepted request as a job, and reconciles job status with the provider.
//! Completed jobs have their result images stored exactly once.

pub mod app_state;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;
