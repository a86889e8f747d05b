// src/pipeline/validate.rs

//! Record validation ahead of persistence.

use std::fmt;

use crate::models::JobPosting;

/// Why a record was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidReason {
    MissingUrl,
    MissingTitle,
    MissingCompany,
}

impl InvalidReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvalidReason::MissingUrl => "missing url",
            InvalidReason::MissingTitle => "missing title",
            InvalidReason::MissingCompany => "missing company",
        }
    }
}

impl fmt::Display for InvalidReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Check a posting against the minimum-field requirements.
///
/// A record needs a URL, a title, and at least one of the two company
/// names. Runs exactly once per record, immediately before it is handed
/// to the storage backend.
pub fn validate(posting: &JobPosting) -> Result<(), InvalidReason> {
    if posting.url.trim().is_empty() {
        return Err(InvalidReason::MissingUrl);
    }
    if posting.title.trim().is_empty() {
        return Err(InvalidReason::MissingTitle);
    }

    let has_company = [&posting.company_kor, &posting.company_eng]
        .iter()
        .any(|c| c.as_deref().is_some_and(|v| !v.trim().is_empty()));
    if !has_company {
        return Err(InvalidReason::MissingCompany);
    }

    Ok(())
}
