// src/models/mod.rs

//! Domain models for the scraper application.

mod posting;
mod report;

// Re-export all public types
pub use posting::{COLUMNS, JobPosting, KoreanLevel, PostingDetail, Source};
pub use report::{RunReport, SourceReport, SourceState};
