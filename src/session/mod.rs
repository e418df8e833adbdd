//! Browser page session bound to the enquiry page for one lookup.
//!
//! The scraper only talks to [`PageSession`], so the automation engine is
//! swappable and the pipeline can run against an in-memory page in tests.
//! Elements are addressed by DOM id; an [`ElementHandle`] is re-resolved on
//! every call, which keeps handles valid across page re-renders.

pub mod chrome;

use anyhow::Result;
use image::RgbaImage;
use std::thread;
use std::time::{Duration, Instant};

use crate::config::ScraperConfig;

pub use chrome::{ChromeLauncher, ChromeSession};

/// Reference to an element located by id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementHandle {
    id: String,
}

impl ElementHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

/// An element's border box in page (viewport) pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ElementRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl ElementRect {
    /// True once the element occupies space on the page.
    pub fn is_rendered(&self) -> bool {
        self.width > 0.0 && self.height > 0.0
    }
}

/// Operations the scraper needs from a live page.
///
/// Every wait is bounded. `close` must be idempotent.
pub trait PageSession {
    /// Waits up to `timeout` for the element to be present.
    /// Fails with [`crate::error::ElementNotFound`] on timeout.
    fn wait_for_element(&self, id: &str, timeout: Duration) -> Result<ElementHandle>;

    /// Non-blocking presence check.
    fn find_element(&self, id: &str) -> Result<Option<ElementHandle>>;

    /// Lower-case tag name, e.g. `input`.
    fn tag_name(&self, element: &ElementHandle) -> Result<String>;

    fn attribute(&self, element: &ElementHandle, name: &str) -> Result<Option<String>>;

    /// Rendered text of the element.
    fn text(&self, element: &ElementHandle) -> Result<String>;

    fn outer_html(&self, element: &ElementHandle) -> Result<String>;

    fn element_rect(&self, element: &ElementHandle) -> Result<ElementRect>;

    fn screenshot_full_page(&self) -> Result<RgbaImage>;

    fn send_keys(&self, element: &ElementHandle, text: &str) -> Result<()>;

    fn click(&self, element: &ElementHandle) -> Result<()>;

    fn close(&mut self);
}

/// Opens a fresh session already navigated to the enquiry page.
pub trait SessionFactory {
    type Session: PageSession;

    fn open(&self, config: &ScraperConfig) -> Result<Self::Session>;
}

/// Calls `check` until it yields a value or `timeout` elapses.
///
/// The check always runs at least once. Returns `Ok(None)` on timeout;
/// errors from the check end the wait immediately.
pub fn poll_until<T>(
    timeout: Duration,
    interval: Duration,
    mut check: impl FnMut() -> Result<Option<T>>,
) -> Result<Option<T>> {
    let start = Instant::now();

    loop {
        if let Some(value) = check()? {
            return Ok(Some(value));
        }

        let elapsed = start.elapsed();
        if elapsed >= timeout {
            return Ok(None);
        }

        thread::sleep(interval.min(timeout - elapsed));
    }
}
