//! Lookup state machine.
//!
//! A lookup sequences through: Start → SessionOpened → IdentifierEntered →
//! ModalOpened → CaptchaSolving → Submitted → ResultsLoaded → Extracted →
//! Done. It leaves the happy path through ErrorPage (the site reported no
//! record) or Failed. Whatever the outcome, the session is closed before
//! the result is handed back.

use anyhow::{anyhow, Context, Result};
use tracing::{debug, info, warn};

use crate::config::ScraperConfig;
use crate::error::{ElementNotFound, ScrapeError};
use crate::ocr::{ImageSolver, OcrEngine, TesseractEngine};
use crate::record::{NormalizedRecord, Pnr};
use crate::scrape::captcha::solve_captcha;
use crate::scrape::extract::extract_record;
use crate::session::{poll_until, ChromeLauncher, ElementHandle, PageSession, SessionFactory};

/// Lookup state machine states.
#[derive(Debug, Clone, PartialEq)]
pub enum LookupState {
    /// Nothing opened yet
    Start,
    /// Browser is on the enquiry page
    SessionOpened,
    /// PNR typed into the input
    IdentifierEntered,
    /// Captcha modal opened
    ModalOpened,
    /// Running the captcha solve loop
    CaptchaSolving,
    /// Captcha answer submitted
    Submitted,
    /// Results container rendered
    ResultsLoaded,
    /// Record read from the result tables
    Extracted,
    /// Lookup complete
    Done,
    /// The site reported that the PNR has no record
    ErrorPage,
    /// Any other failure
    Failed(String),
}

impl std::fmt::Display for LookupState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LookupState::Start => write!(f, "Start"),
            LookupState::SessionOpened => write!(f, "Session opened"),
            LookupState::IdentifierEntered => write!(f, "Identifier entered"),
            LookupState::ModalOpened => write!(f, "Modal opened"),
            LookupState::CaptchaSolving => write!(f, "Solving captcha"),
            LookupState::Submitted => write!(f, "Submitted"),
            LookupState::ResultsLoaded => write!(f, "Results loaded"),
            LookupState::Extracted => write!(f, "Extracted"),
            LookupState::Done => write!(f, "Done"),
            LookupState::ErrorPage => write!(f, "Error page"),
            LookupState::Failed(kind) => write!(f, "Failed: {}", kind),
        }
    }
}

/// Scrapes PNR records through fresh browser sessions.
///
/// One scraper can run many lookups, concurrently if `F` and `E` are
/// `Sync`; each lookup gets its own session.
pub struct PnrScraper<F, E> {
    factory: F,
    solver: ImageSolver<E>,
    config: ScraperConfig,
}

impl PnrScraper<ChromeLauncher, TesseractEngine> {
    /// Headless Chrome plus the tesseract CLI. Fails upfront if tesseract
    /// cannot be found.
    pub fn from_config(config: ScraperConfig) -> Result<Self> {
        let engine = TesseractEngine::from_config(&config.captcha)?;
        Ok(Self::new(ChromeLauncher, engine, config))
    }
}

impl<F: SessionFactory, E: OcrEngine> PnrScraper<F, E> {
    pub fn new(factory: F, engine: E, config: ScraperConfig) -> Self {
        let solver = ImageSolver::new(engine, config.captcha.binarize_threshold);
        Self {
            factory,
            solver,
            config,
        }
    }

    pub fn config(&self) -> &ScraperConfig {
        &self.config
    }

    /// Looks up one PNR.
    ///
    /// Returns the normalized record or exactly one [`ScrapeError`]. The
    /// browser session is closed on every path.
    pub fn lookup(&self, pnr: Pnr) -> Result<NormalizedRecord, ScrapeError> {
        let mut lookup = Lookup::new(self, pnr);
        let result = lookup.run();
        lookup.teardown();

        match &result {
            Ok(record) => info!(
                "PNR {}: {} passenger(s), train {}",
                pnr,
                record.passengers.len(),
                record.journey.train_number
            ),
            Err(e) => warn!("PNR {}: {}", pnr, e),
        }
        result
    }
}

/// What the page showed after the captcha was submitted.
enum Outcome {
    NotFound(String),
    Results,
}

/// One lookup's progress through the state machine.
struct Lookup<'a, F: SessionFactory, E> {
    scraper: &'a PnrScraper<F, E>,
    pnr: Pnr,
    state: LookupState,
    session: Option<F::Session>,
    record: Option<NormalizedRecord>,
}

impl<'a, F: SessionFactory, E: OcrEngine> Lookup<'a, F, E> {
    fn new(scraper: &'a PnrScraper<F, E>, pnr: Pnr) -> Self {
        Self {
            scraper,
            pnr,
            state: LookupState::Start,
            session: None,
            record: None,
        }
    }

    fn config(&self) -> &'a ScraperConfig {
        &self.scraper.config
    }

    fn session(&self) -> Result<&F::Session, ScrapeError> {
        self.session
            .as_ref()
            .ok_or_else(|| anyhow!("No open browser session").into())
    }

    fn transition(&mut self, next: LookupState) {
        info!("PNR {}: {} -> {}", self.pnr, self.state, next);
        self.state = next;
    }

    /// Steps until a terminal state. Failures move the machine to
    /// ErrorPage or Failed before being returned.
    fn run(&mut self) -> Result<NormalizedRecord, ScrapeError> {
        loop {
            match self.step() {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => {
                    let next = if e.is_not_found() {
                        LookupState::ErrorPage
                    } else {
                        LookupState::Failed(e.kind().to_string())
                    };
                    self.transition(next);
                    return Err(e);
                }
            }
        }

        self.record
            .take()
            .ok_or_else(|| anyhow!("Lookup ended in state {} without a record", self.state).into())
    }

    /// Advances the state machine by one step.
    ///
    /// Returns `Ok(true)` to keep going, `Ok(false)` once done.
    fn step(&mut self) -> Result<bool, ScrapeError> {
        match &self.state {
            LookupState::Start => {
                let session = self
                    .scraper
                    .factory
                    .open(self.config())
                    .context("Failed to open browser session")?;
                self.session = Some(session);
                self.transition(LookupState::SessionOpened);
            }

            LookupState::SessionOpened => {
                self.enter_identifier()?;
                self.transition(LookupState::IdentifierEntered);
            }

            LookupState::IdentifierEntered => {
                let session = self.session()?;
                let trigger = session.wait_for_element(
                    &self.config().elements.captcha_modal,
                    self.config().timeouts.element_wait(),
                )?;
                session.click(&trigger)?;
                self.transition(LookupState::ModalOpened);
            }

            LookupState::ModalOpened => {
                self.transition(LookupState::CaptchaSolving);
            }

            LookupState::CaptchaSolving => {
                let attempts = solve_captcha(self.session()?, &self.scraper.solver, self.config())?;
                debug!("PNR {}: captcha took {} attempt(s)", self.pnr, attempts);
                self.transition(LookupState::Submitted);
            }

            LookupState::Submitted => match self.wait_for_outcome()? {
                Outcome::NotFound(message) => return Err(ScrapeError::LookupNotFound(message)),
                Outcome::Results => self.transition(LookupState::ResultsLoaded),
            },

            LookupState::ResultsLoaded => {
                let record = self.extract()?;
                self.record = Some(record);
                self.transition(LookupState::Extracted);
            }

            LookupState::Extracted => {
                self.transition(LookupState::Done);
                return Ok(false);
            }

            LookupState::Done | LookupState::ErrorPage | LookupState::Failed(_) => {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Checks the form's element types, then types the PNR. Nothing is
    /// typed when the layout is off.
    fn enter_identifier(&self) -> Result<(), ScrapeError> {
        let session = self.session()?;
        let ids = &self.config().elements;
        let wait = self.config().timeouts.element_wait();

        let input = session.wait_for_element(&ids.pnr_input, wait)?;
        let trigger = session.wait_for_element(&ids.captcha_modal, wait)?;

        let input_kind = input_type(session, &input)?;
        if !matches!(input_kind.as_deref(), Some("text") | Some("number")) {
            return Err(ScrapeError::UnexpectedPageLayout(format!(
                "#{} is {}, expected a text or number input",
                ids.pnr_input,
                describe(&input_kind)
            )));
        }

        let trigger_kind = input_type(session, &trigger)?;
        if trigger_kind.as_deref() != Some("button") {
            return Err(ScrapeError::UnexpectedPageLayout(format!(
                "#{} is {}, expected a button input",
                ids.captcha_modal,
                describe(&trigger_kind)
            )));
        }

        session.send_keys(&input, &self.pnr.to_string())?;
        Ok(())
    }

    /// Polls until the page shows either its error message or the result
    /// tables.
    ///
    /// A results container that never grows its journey table is handed to
    /// extraction, which names the missing table.
    fn wait_for_outcome(&self) -> Result<Outcome, ScrapeError> {
        let session = self.session()?;
        let ids = &self.config().elements;
        let timeouts = &self.config().timeouts;

        let outcome = poll_until(timeouts.result_wait(), timeouts.poll_interval(), || {
            if let Some(message) = error_message(session, &ids.error_message)? {
                return Ok(Some(Outcome::NotFound(message)));
            }
            let results_ready = session.find_element(&ids.results_container)?.is_some()
                && session.find_element(&ids.journey_table)?.is_some();
            Ok(results_ready.then_some(Outcome::Results))
        })?;

        if let Some(outcome) = outcome {
            return Ok(outcome);
        }
        if session.find_element(&ids.results_container)?.is_some() {
            debug!("PNR {}: #{} present without #{}", self.pnr, ids.results_container, ids.journey_table);
            return Ok(Outcome::Results);
        }
        Err(ScrapeError::from(anyhow::Error::new(ElementNotFound {
            id: ids.results_container.clone(),
            timeout: timeouts.result_wait(),
        })))
    }

    fn extract(&self) -> Result<NormalizedRecord, ScrapeError> {
        let session = self.session()?;
        let ids = &self.config().elements;

        let container = session.wait_for_element(&ids.results_container, self.config().timeouts.element_wait())?;
        let html = session.outer_html(&container)?;

        match extract_record(self.pnr, &html, ids) {
            Ok(record) => Ok(record),
            Err(e) => {
                // A half-rendered results block can sit next to the site's
                // "no record" message.
                if let Some(message) = error_message(session, &ids.error_message)? {
                    debug!("PNR {}: extraction failed ({}), page says {:?}", self.pnr, e, message);
                    return Err(ScrapeError::LookupNotFound(message));
                }
                Err(e)
            }
        }
    }

    fn teardown(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.close();
            debug!("PNR {}: session closed", self.pnr);
        }
    }
}

impl<F: SessionFactory, E> Drop for Lookup<'_, F, E> {
    fn drop(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.close();
        }
    }
}

/// `type` attribute of an `<input>`, lower-cased. A missing attribute is
/// `text`, as browsers treat it. `None` for anything that is not an input.
fn input_type<S: PageSession + ?Sized>(session: &S, element: &ElementHandle) -> Result<Option<String>> {
    if session.tag_name(element)? != "input" {
        return Ok(None);
    }
    let kind = session
        .attribute(element, "type")?
        .map(|t| t.trim().to_lowercase())
        .unwrap_or_else(|| "text".to_string());
    Ok(Some(kind))
}

fn describe(input_type: &Option<String>) -> String {
    match input_type {
        Some(kind) => format!("an input of type {:?}", kind),
        None => "not an input".to_string(),
    }
}

/// Text of the error element, if it is present and says something.
fn error_message<S: PageSession + ?Sized>(session: &S, id: &str) -> Result<Option<String>> {
    let Some(element) = session.find_element(id)? else {
        return Ok(None);
    };
    let text = session.text(&element)?;
    Ok((!text.trim().is_empty()).then_some(text))
}
