//! In-memory stand-ins for the browser and tesseract, used by tests.

use anyhow::{anyhow, Result};
use image::{GrayImage, RgbaImage};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::config::{ElementIds, ScraperConfig};
use crate::error::ElementNotFound;
use crate::ocr::OcrEngine;
use crate::session::{ElementHandle, ElementRect, PageSession, SessionFactory};

#[derive(Debug, Clone)]
pub struct FakeElement {
    pub tag: String,
    pub attributes: HashMap<String, String>,
    pub text: String,
    pub html: String,
    pub rect: ElementRect,
}

impl FakeElement {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_string(),
            attributes: HashMap::new(),
            text: String::new(),
            html: String::new(),
            rect: ElementRect { x: 0.0, y: 0.0, width: 10.0, height: 10.0 },
        }
    }

    pub fn input(kind: &str) -> Self {
        Self::new("input").attr("type", kind)
    }

    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attributes.insert(name.to_string(), value.to_string());
        self
    }

    pub fn text(mut self, text: &str) -> Self {
        self.text = text.to_string();
        self
    }

    pub fn html(mut self, html: &str) -> Self {
        self.html = html.to_string();
        self
    }

    pub fn rect(mut self, x: f64, y: f64, width: f64, height: f64) -> Self {
        self.rect = ElementRect { x, y, width, height };
        self
    }
}

/// Everything a fake page has done, for assertions.
#[derive(Debug, Clone, Default)]
pub struct FakeLog {
    pub screenshots: u32,
    pub typed: Vec<(String, String)>,
    pub clicks: Vec<String>,
    pub close_calls: u32,
}

#[derive(Debug, Clone, Default)]
pub struct FakePage {
    elements: HashMap<String, FakeElement>,
    /// Elements that appear when the keyed element is clicked.
    reveals: HashMap<String, Vec<(String, FakeElement)>>,
    pub log: FakeLog,
}

impl FakePage {
    /// The enquiry form: clicking the modal trigger reveals the captcha,
    /// submitting reveals nothing until [`FakePage::on_submit_results`] or
    /// [`FakePage::on_submit_error`] says otherwise.
    pub fn enquiry(ids: &ElementIds) -> Self {
        let mut page = Self::default()
            .with(&ids.pnr_input, FakeElement::input("text"))
            .with(&ids.captcha_modal, FakeElement::input("button"));
        page.reveal(
            &ids.captcha_modal,
            &ids.captcha_image,
            FakeElement::new("img").rect(100.0, 50.0, 120.0, 40.0),
        );
        page.reveal(&ids.captcha_modal, &ids.captcha_input, FakeElement::input("text"));
        page.reveal(&ids.captcha_modal, &ids.captcha_submit, FakeElement::input("submit"));
        page
    }

    pub fn with(mut self, id: &str, element: FakeElement) -> Self {
        self.elements.insert(id.to_string(), element);
        self
    }

    pub fn reveal(&mut self, clicked: &str, id: &str, element: FakeElement) {
        self.reveals
            .entry(clicked.to_string())
            .or_default()
            .push((id.to_string(), element));
    }

    pub fn on_submit_results(mut self, ids: &ElementIds, container_html: &str) -> Self {
        let submit = ids.captcha_submit.clone();
        self.reveal(
            &submit,
            &ids.results_container,
            FakeElement::new("div").html(container_html),
        );
        self.reveal(&submit, &ids.journey_table, FakeElement::new("table"));
        self
    }

    pub fn on_submit_error(mut self, ids: &ElementIds, message: &str) -> Self {
        let submit = ids.captcha_submit.clone();
        self.reveal(
            &submit,
            &ids.error_message,
            FakeElement::new("div").text(message),
        );
        self
    }
}

/// A session over a shared [`FakePage`].
pub struct FakeSession {
    page: Arc<Mutex<FakePage>>,
}

impl FakeSession {
    fn page(&self) -> MutexGuard<'_, FakePage> {
        self.page.lock().unwrap()
    }

    fn with_element<T>(&self, element: &ElementHandle, f: impl FnOnce(&FakeElement) -> T) -> Result<T> {
        let page = self.page();
        page.elements
            .get(element.id())
            .map(f)
            .ok_or_else(|| anyhow!("no element #{}", element.id()))
    }
}

impl PageSession for FakeSession {
    fn wait_for_element(&self, id: &str, timeout: Duration) -> Result<ElementHandle> {
        if self.page().elements.contains_key(id) {
            Ok(ElementHandle::new(id))
        } else {
            Err(ElementNotFound { id: id.to_string(), timeout }.into())
        }
    }

    fn find_element(&self, id: &str) -> Result<Option<ElementHandle>> {
        Ok(self.page().elements.contains_key(id).then(|| ElementHandle::new(id)))
    }

    fn tag_name(&self, element: &ElementHandle) -> Result<String> {
        self.with_element(element, |e| e.tag.clone())
    }

    fn attribute(&self, element: &ElementHandle, name: &str) -> Result<Option<String>> {
        self.with_element(element, |e| e.attributes.get(name).cloned())
    }

    fn text(&self, element: &ElementHandle) -> Result<String> {
        self.with_element(element, |e| e.text.clone())
    }

    fn outer_html(&self, element: &ElementHandle) -> Result<String> {
        self.with_element(element, |e| e.html.clone())
    }

    fn element_rect(&self, element: &ElementHandle) -> Result<ElementRect> {
        self.with_element(element, |e| e.rect)
    }

    fn screenshot_full_page(&self) -> Result<RgbaImage> {
        self.page().log.screenshots += 1;
        Ok(RgbaImage::new(400, 300))
    }

    fn send_keys(&self, element: &ElementHandle, text: &str) -> Result<()> {
        self.with_element(element, |_| ())?;
        self.page()
            .log
            .typed
            .push((element.id().to_string(), text.to_string()));
        Ok(())
    }

    fn click(&self, element: &ElementHandle) -> Result<()> {
        self.with_element(element, |_| ())?;
        let mut page = self.page();
        page.log.clicks.push(element.id().to_string());
        if let Some(revealed) = page.reveals.remove(element.id()) {
            page.elements.extend(revealed);
        }
        Ok(())
    }

    fn close(&mut self) {
        self.page().log.close_calls += 1;
    }
}

/// Hands out sessions over copies of a template page and keeps every
/// opened page for inspection.
#[derive(Clone)]
pub struct FakeFactory {
    template: FakePage,
    opened: Arc<Mutex<Vec<Arc<Mutex<FakePage>>>>>,
    fail_open: bool,
}

impl FakeFactory {
    pub fn new(template: FakePage) -> Self {
        Self {
            template,
            opened: Arc::default(),
            fail_open: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_open: true,
            ..Self::new(FakePage::default())
        }
    }

    pub fn opened(&self) -> Vec<FakeLog> {
        self.opened
            .lock()
            .unwrap()
            .iter()
            .map(|page| page.lock().unwrap().log.clone())
            .collect()
    }

    pub fn single_log(&self) -> FakeLog {
        let logs = self.opened();
        assert_eq!(logs.len(), 1, "expected exactly one session");
        logs.into_iter().next().unwrap()
    }
}

impl SessionFactory for FakeFactory {
    type Session = FakeSession;

    fn open(&self, _config: &ScraperConfig) -> Result<FakeSession> {
        if self.fail_open {
            return Err(anyhow!("browser failed to start"));
        }
        let page = Arc::new(Mutex::new(self.template.clone()));
        self.opened.lock().unwrap().push(page.clone());
        Ok(FakeSession { page })
    }
}

/// Returns scripted OCR text, then empty text once the script runs out.
#[derive(Clone, Default)]
pub struct ScriptedOcr {
    responses: Arc<Mutex<VecDeque<Result<String, String>>>>,
    calls: Arc<AtomicU32>,
}

impl ScriptedOcr {
    pub fn new(responses: &[&str]) -> Self {
        let ocr = Self::default();
        for text in responses {
            ocr.push(Ok(text.to_string()));
        }
        ocr
    }

    pub fn push(&self, response: Result<String, String>) {
        self.responses.lock().unwrap().push_back(response);
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl OcrEngine for ScriptedOcr {
    fn recognize(&self, _img: &GrayImage) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.responses.lock().unwrap().pop_front() {
            Some(Ok(text)) => Ok(text),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Ok(String::new()),
        }
    }
}

/// Results container markup as the enquiry page renders it.
pub fn results_html(journey_rows: &str, other_rows: &str, passenger_rows: &str) -> String {
    format!(
        r#"<div id="pnrOutputDiv">
  <table id="journeyDetailsTable">
    <tr><th>Train Number</th><th>Train Name</th><th>Boarding Date</th><th>From</th><th>To</th><th>Reserved Upto</th><th>Boarding Point</th><th>Class</th></tr>
    {journey_rows}
  </table>
  <table id="otherDetailsTable">
    <tr><th>Total Fare</th><th>Charting Status</th><th>Remarks</th><th>Train Status</th></tr>
    {other_rows}
  </table>
  <table id="psgnDetailsTable">
    <tr><th>S. No.</th><th>Booking Status</th><th>Current Status</th><th>Coach Position</th></tr>
    {passenger_rows}
  </table>
</div>"#
    )
}

pub const JOURNEY_ROW: &str = "<tr><td>12951</td><td>MUMBAI RAJDHANI</td><td>23-11-2024</td><td>MMCT</td><td>NDLS</td><td>NDLS</td><td>MMCT</td><td>3A</td></tr>";

pub const OTHER_ROW: &str =
    "<tr><td>1234.50</td><td>Chart Not Prepared</td><td></td><td>Running on time</td></tr>";

pub const PASSENGER_ROWS: &str = "\
<tr><td>Passenger 1</td><td>CNF/B2/33/LB</td><td>CNF</td><td>6</td></tr>
<tr><td>Passenger 2</td><td>WL/12</td><td>RAC 3</td><td></td></tr>
<tr><td>Passenger 3</td><td>WL/13</td><td>WL 2</td><td></td></tr>";

pub fn sample_results_html() -> String {
    results_html(JOURNEY_ROW, OTHER_ROW, PASSENGER_ROWS)
}
