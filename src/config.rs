//! Scraper configuration loaded from config.json.
//!
//! Every field has a default, so a config file only needs the keys it
//! overrides. The element ids are the contract with the third-party
//! enquiry page and are the first thing to update when its markup changes.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

pub const DEFAULT_ENQUIRY_URL: &str = "https://www.indianrail.gov.in/enquiry/PNR/PnrEnquiry.html";

/// Complete scraper configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScraperConfig {
    /// Page holding the PNR form
    pub enquiry_url: String,
    /// DOM ids of the elements we drive and read
    pub elements: ElementIds,
    pub timeouts: TimeoutConfig,
    pub captcha: CaptchaConfig,
    pub browser: BrowserConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ElementIds {
    pub pnr_input: String,
    /// Button that opens the captcha modal
    pub captcha_modal: String,
    pub captcha_image: String,
    pub captcha_input: String,
    pub captcha_submit: String,
    pub results_container: String,
    pub journey_table: String,
    pub other_details_table: String,
    pub passenger_table: String,
    pub error_message: String,
    /// Control that swaps in a new captcha image between attempts
    pub captcha_refresh: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Maximum wait for an element to appear (milliseconds)
    pub element_wait_ms: u64,
    /// Maximum wait for the captcha image to render inside the modal
    pub render_wait_ms: u64,
    /// Maximum wait for results or an error message after submitting
    pub result_wait_ms: u64,
    /// Delay between polls of a bounded wait
    pub poll_interval_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptchaConfig {
    /// Total crop/OCR cycles before giving up
    pub max_attempts: u32,
    /// Pause after an unsolved attempt so the next screenshot sees a new
    /// or fully loaded captcha (milliseconds)
    pub retry_delay_ms: u64,
    /// Pixels with luma below this become black, the rest white.
    /// `None` sends the plain grayscale crop to OCR.
    pub binarize_threshold: Option<u8>,
    /// Tesseract page segmentation mode (7 = single text line)
    pub psm: u8,
    /// Restricts the characters tesseract may emit
    pub char_whitelist: Option<String>,
    /// Explicit tesseract executable
    pub tesseract_path: Option<PathBuf>,
    /// Explicit tessdata directory
    pub tessdata_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub headless: bool,
    /// Chrome's sandbox; usually disabled inside containers
    pub sandbox: bool,
    pub window_width: u32,
    pub window_height: u32,
    /// Explicit Chrome/Chromium binary, otherwise auto-detected
    pub chrome_path: Option<PathBuf>,
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            enquiry_url: DEFAULT_ENQUIRY_URL.to_string(),
            elements: ElementIds::default(),
            timeouts: TimeoutConfig::default(),
            captcha: CaptchaConfig::default(),
            browser: BrowserConfig::default(),
        }
    }
}

impl Default for ElementIds {
    fn default() -> Self {
        Self {
            pnr_input: "inputPnrNo".to_string(),
            captcha_modal: "modal1".to_string(),
            captcha_image: "CaptchaImgID".to_string(),
            captcha_input: "inputCaptcha".to_string(),
            captcha_submit: "submitPnrNo".to_string(),
            results_container: "pnrOutputDiv".to_string(),
            journey_table: "journeyDetailsTable".to_string(),
            other_details_table: "otherDetailsTable".to_string(),
            passenger_table: "psgnDetailsTable".to_string(),
            error_message: "errorMessage".to_string(),
            captcha_refresh: None,
        }
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            element_wait_ms: 10_000,
            render_wait_ms: 10_000,
            result_wait_ms: 20_000,
            poll_interval_ms: 250,
        }
    }
}

impl Default for CaptchaConfig {
    fn default() -> Self {
        Self {
            max_attempts: 6,
            retry_delay_ms: 1_000,
            binarize_threshold: None,
            psm: 7,
            char_whitelist: None,
            tesseract_path: None,
            tessdata_dir: None,
        }
    }
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            sandbox: true,
            window_width: 1366,
            window_height: 768,
            chrome_path: None,
        }
    }
}

impl TimeoutConfig {
    pub fn element_wait(&self) -> Duration {
        Duration::from_millis(self.element_wait_ms)
    }

    pub fn render_wait(&self) -> Duration {
        Duration::from_millis(self.render_wait_ms)
    }

    pub fn result_wait(&self) -> Duration {
        Duration::from_millis(self.result_wait_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

impl CaptchaConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

impl ScraperConfig {
    /// Reads a config file. Missing keys take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let value: serde_json::Value = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        if !value.is_object() {
            return Err(anyhow!("Config {} is not a JSON object", path.display()));
        }
        let config = serde_json::from_value(value)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        info!("Config loaded from {}", path.display());
        Ok(config)
    }

    /// Loads the first readable file among `candidates`, or defaults.
    ///
    /// Unlike [`ScraperConfig::load`], a broken implicit file is logged and
    /// skipped rather than treated as fatal.
    pub fn load_first(candidates: &[PathBuf]) -> Self {
        for path in candidates {
            if !path.exists() {
                continue;
            }
            match Self::load(path) {
                Ok(config) => return config,
                Err(e) => warn!("{:#}. Using defaults.", e),
            }
        }
        info!("No config file found. Using default config.");
        Self::default()
    }

    /// Writes this config as pretty JSON, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }
}
