//! Pipeline stages for one scraping run.
//!
//! - `run`: per-source orchestration state machine
//! - `dedupe`: known-URL index gating detail scraping
//! - `validate`: minimum-field gate ahead of persistence

pub mod dedupe;
pub mod run;
pub mod validate;

pub use dedupe::DedupIndex;
pub use run::{RunOptions, run_all, run_source};
pub use validate::{InvalidReason, validate};
