//! Headless Chrome implementation of [`PageSession`].

use anyhow::{anyhow, Context, Result};
use headless_chrome::browser::tab::element::Element;
use headless_chrome::browser::tab::NoElementFound;
use headless_chrome::protocol::cdp::Page::CaptureScreenshotFormatOption;
use headless_chrome::util::Timeout;
use headless_chrome::{Browser, LaunchOptions, Tab};
use image::RgbaImage;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::{ElementHandle, ElementRect, PageSession, SessionFactory};
use crate::config::ScraperConfig;
use crate::error::ElementNotFound;

/// Launches one headless Chrome per session.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChromeLauncher;

impl SessionFactory for ChromeLauncher {
    type Session = ChromeSession;

    fn open(&self, config: &ScraperConfig) -> Result<ChromeSession> {
        ChromeSession::open(config)
    }
}

/// One browser process and its single tab.
///
/// Dropping the session closes it, so a worker torn down mid-lookup still
/// kills its browser.
pub struct ChromeSession {
    browser: Option<Browser>,
    tab: Option<Arc<Tab>>,
}

/// CSS selector matching an id verbatim, even ids that are not valid
/// CSS identifiers.
fn id_selector(id: &str) -> String {
    format!("[id=\"{}\"]", id.replace('\\', "\\\\").replace('"', "\\\""))
}

impl ChromeSession {
    /// Launches the browser and navigates to the enquiry page.
    pub fn open(config: &ScraperConfig) -> Result<Self> {
        let browser_config = &config.browser;
        let options = LaunchOptions::default_builder()
            .headless(browser_config.headless)
            .sandbox(browser_config.sandbox)
            .window_size(Some((browser_config.window_width, browser_config.window_height)))
            .path(browser_config.chrome_path.clone())
            .build()
            .map_err(|e| anyhow!("Invalid browser launch options: {}", e))?;

        let browser = Browser::new(options).context("Failed to launch browser")?;
        info!("Browser launched");

        // From here on, any early return drops `session` and kills the browser.
        let mut session = Self {
            browser: Some(browser),
            tab: None,
        };

        let tab = session
            .browser
            .as_ref()
            .ok_or_else(|| anyhow!("Browser closed during startup"))?
            .new_tab()
            .context("Failed to open tab")?;
        tab.set_default_timeout(config.timeouts.element_wait());

        tab.navigate_to(&config.enquiry_url)
            .and_then(|tab| tab.wait_until_navigated())
            .with_context(|| format!("Failed to load {}", config.enquiry_url))?;
        info!("Navigated to {}", config.enquiry_url);

        session.tab = Some(tab);
        Ok(session)
    }

    fn tab(&self) -> Result<&Arc<Tab>> {
        self.tab.as_ref().ok_or_else(|| anyhow!("Browser session is closed"))
    }

    fn element(&self, element: &ElementHandle) -> Result<Element<'_>> {
        self.tab()?
            .find_element(&id_selector(element.id()))
            .with_context(|| format!("Element #{} is gone", element.id()))
    }
}

impl PageSession for ChromeSession {
    fn wait_for_element(&self, id: &str, timeout: Duration) -> Result<ElementHandle> {
        debug!("Waiting up to {}ms for #{}", timeout.as_millis(), id);
        match self
            .tab()?
            .wait_for_element_with_custom_timeout(&id_selector(id), timeout)
        {
            Ok(_) => Ok(ElementHandle::new(id)),
            Err(e) if is_missing(&e) => {
                debug!("Wait for #{} failed: {:#}", id, e);
                Err(ElementNotFound {
                    id: id.to_string(),
                    timeout,
                }
                .into())
            }
            Err(e) => Err(e.context(format!("Failed waiting for #{}", id))),
        }
    }

    fn find_element(&self, id: &str) -> Result<Option<ElementHandle>> {
        match self.tab()?.find_element(&id_selector(id)) {
            Ok(_) => Ok(Some(ElementHandle::new(id))),
            Err(e) if is_missing(&e) => Ok(None),
            Err(e) => Err(e.context(format!("Failed looking up #{}", id))),
        }
    }

    fn tag_name(&self, element: &ElementHandle) -> Result<String> {
        Ok(self.element(element)?.tag_name.to_lowercase())
    }

    fn attribute(&self, element: &ElementHandle, name: &str) -> Result<Option<String>> {
        self.element(element)?.get_attribute_value(name)
    }

    fn text(&self, element: &ElementHandle) -> Result<String> {
        self.element(element)?.get_inner_text()
    }

    fn outer_html(&self, element: &ElementHandle) -> Result<String> {
        self.element(element)?.get_content()
    }

    fn element_rect(&self, element: &ElementHandle) -> Result<ElementRect> {
        let model = self.element(element)?.get_box_model()?;
        Ok(ElementRect {
            x: model.border.top_left.x,
            y: model.border.top_left.y,
            width: model.width,
            height: model.height,
        })
    }

    fn screenshot_full_page(&self) -> Result<RgbaImage> {
        let png = self
            .tab()?
            .capture_screenshot(CaptureScreenshotFormatOption::Png, None, None, true)
            .context("Failed to capture page screenshot")?;
        let img = image::load_from_memory(&png).context("Failed to decode page screenshot")?;
        Ok(img.to_rgba8())
    }

    fn send_keys(&self, element: &ElementHandle, text: &str) -> Result<()> {
        self.element(element)?.type_into(text)?;
        Ok(())
    }

    fn click(&self, element: &ElementHandle) -> Result<()> {
        self.element(element)?.click()?;
        Ok(())
    }

    fn close(&mut self) {
        if let Some(tab) = self.tab.take() {
            if let Err(e) = tab.close(false) {
                debug!("Tab close failed: {:#}", e);
            }
        }
        // Dropping the browser terminates the process.
        if self.browser.take().is_some() {
            info!("Browser closed");
        }
    }
}

impl Drop for ChromeSession {
    fn drop(&mut self) {
        self.close();
    }
}

/// Whether a DOM query failed because the element is absent, as opposed to
/// the browser or connection failing.
fn is_missing(e: &anyhow::Error) -> bool {
    e.is::<NoElementFound>() || e.is::<Timeout>()
}
