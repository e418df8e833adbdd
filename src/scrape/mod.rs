//! The lookup pipeline: captcha solve loop, result extraction, and the
//! state machine that drives one lookup end to end.

pub mod captcha;
pub mod extract;
pub mod orchestrator;

pub use captcha::solve_captcha;
pub use extract::{extract_record, ResultsPage, TableSchema};
pub use orchestrator::{LookupState, PnrScraper};
