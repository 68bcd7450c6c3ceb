pub mod generation;
pub mod image;
pub mod job;
