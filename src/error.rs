//! Failure taxonomy for a PNR lookup.
//!
//! Every lookup ends in either a record or exactly one [`ScrapeError`].
//! Lower layers (browser session, OCR, config) use `anyhow` internally;
//! the orchestrator folds anything it does not classify into
//! [`ScrapeError::ScrapeFailed`].

use std::time::Duration;

use thiserror::Error;

/// Outcome of a lookup that did not produce a record.
#[derive(Debug, Error)]
pub enum ScrapeError {
    /// The enquiry page itself reported that no record exists.
    /// The message is the page's text, passed through verbatim.
    #[error("lookup not found: {0}")]
    LookupNotFound(String),

    /// OCR never yielded a usable arithmetic expression.
    #[error("captcha not solved after {attempts} attempts")]
    CaptchaUnsolved { attempts: u32 },

    /// Results loaded but a table or row did not have the expected shape.
    #[error("failed to extract {table}: {reason}")]
    ExtractionFailure { table: &'static str, reason: String },

    /// The input or modal trigger is not the element type we drive.
    #[error("unexpected page layout: {0}")]
    UnexpectedPageLayout(String),

    /// Anything else: browser crash, navigation error, wait timeout.
    #[error("scrape failed: {0:#}")]
    ScrapeFailed(#[from] anyhow::Error),
}

impl ScrapeError {
    pub(crate) fn extraction(table: &'static str, reason: impl Into<String>) -> Self {
        ScrapeError::ExtractionFailure {
            table,
            reason: reason.into(),
        }
    }

    /// True only for [`ScrapeError::LookupNotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, ScrapeError::LookupNotFound(_))
    }

    /// Short machine-readable name of the failure kind.
    pub fn kind(&self) -> &'static str {
        match self {
            ScrapeError::LookupNotFound(_) => "lookup_not_found",
            ScrapeError::CaptchaUnsolved { .. } => "captcha_unsolved",
            ScrapeError::ExtractionFailure { .. } => "extraction_failure",
            ScrapeError::UnexpectedPageLayout(_) => "unexpected_page_layout",
            ScrapeError::ScrapeFailed(_) => "scrape_failed",
        }
    }
}

/// A bounded element wait expired.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("element #{id} not found within {}ms", .timeout.as_millis())]
pub struct ElementNotFound {
    pub id: String,
    pub timeout: Duration,
}

/// An element was present but never took up space on the page.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("element #{id} present but not rendered within {}ms", .timeout.as_millis())]
pub struct ElementNotRendered {
    pub id: String,
    pub timeout: Duration,
}

/// A lookup identifier that is not exactly ten decimal digits.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid PNR number {0:?}: expected exactly 10 digits")]
pub struct PnrError(pub String);
