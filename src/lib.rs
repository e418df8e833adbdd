//! PNR status scraper.
//!
//! Drives the public PNR enquiry page in a headless browser: types the PNR,
//! solves the arithmetic captcha with tesseract, and reads the journey,
//! fare and passenger tables into a [`NormalizedRecord`].
//!
//! ```no_run
//! use pnr_scraper::{Pnr, PnrScraper, ScraperConfig};
//!
//! # fn main() -> anyhow::Result<()> {
//! let scraper = PnrScraper::from_config(ScraperConfig::default())?;
//! match scraper.lookup(Pnr::parse("4512345678")?) {
//!     Ok(record) => println!("{} passenger(s)", record.passengers.len()),
//!     Err(e) if e.is_not_found() => println!("no such PNR"),
//!     Err(e) => eprintln!("lookup failed: {}", e),
//! }
//! # Ok(())
//! # }
//! ```

pub mod batch;
pub mod config;
pub mod error;
pub mod logging;
pub mod ocr;
pub mod paths;
pub mod record;
pub mod scrape;
pub mod session;

#[cfg(test)]
mod fakes;

pub use batch::{run_batch, BatchResult};
pub use config::ScraperConfig;
pub use error::{ElementNotFound, ElementNotRendered, PnrError, ScrapeError};
pub use record::{FareAndStatus, JourneySegment, NormalizedRecord, PassengerStatus, Pnr};
pub use scrape::{LookupState, PnrScraper};
pub use session::{ChromeLauncher, PageSession, SessionFactory};

/// One-off lookup with headless Chrome and the tesseract CLI.
pub fn lookup(pnr: Pnr, config: ScraperConfig) -> Result<NormalizedRecord, ScrapeError> {
    PnrScraper::from_config(config)?.lookup(pnr)
}
