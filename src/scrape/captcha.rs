//! Captcha solve loop: screenshot → crop → OCR → answer.
//!
//! Only the crop/OCR step is retried. Between attempts the loop clicks the
//! captcha refresh control when one is configured, pauses, and waits for
//! the image to render again. Each attempt then takes a fresh screenshot
//! and re-reads the captcha's position.

use std::thread;
use tracing::{debug, info, warn};

use crate::config::ScraperConfig;
use crate::error::{ElementNotRendered, ScrapeError};
use crate::ocr::{crop_region, ImageSolver, OcrEngine, Solution};
use crate::session::{poll_until, ElementHandle, PageSession};

/// Solves the captcha in the open modal and submits the answer.
///
/// Returns the number of attempts used. Fails with
/// [`ScrapeError::CaptchaUnsolved`] once `captcha.max_attempts` crops have
/// produced no answer; any page error propagates immediately.
pub fn solve_captcha<S, E>(
    session: &S,
    solver: &ImageSolver<E>,
    config: &ScraperConfig,
) -> Result<u32, ScrapeError>
where
    S: PageSession + ?Sized,
    E: OcrEngine,
{
    let ids = &config.elements;
    let timeouts = &config.timeouts;

    let image = session.wait_for_element(&ids.captcha_image, timeouts.element_wait())?;
    let answer_input = session.wait_for_element(&ids.captcha_input, timeouts.element_wait())?;
    wait_for_render(session, &image, config)?;

    let max_attempts = config.captcha.max_attempts.max(1);
    for attempt in 1..=max_attempts {
        let screenshot = session.screenshot_full_page()?;
        let rect = session.element_rect(&image)?;
        let crop = crop_region(&screenshot, &rect);
        debug!(
            "Captcha attempt {}/{}: crop {}x{} at ({:.0}, {:.0})",
            attempt,
            max_attempts,
            crop.width(),
            crop.height(),
            rect.x,
            rect.y
        );

        match solver.solve(&crop) {
            Ok(Solution::Answer(answer)) => {
                info!("Captcha solved on attempt {}: {}", attempt, answer);
                session.send_keys(&answer_input, &answer.to_string())?;
                let submit = session.wait_for_element(&ids.captcha_submit, timeouts.element_wait())?;
                session.click(&submit)?;
                return Ok(attempt);
            }
            Ok(Solution::Unsolved) => {
                warn!("Captcha attempt {}/{}: no expression found", attempt, max_attempts);
            }
            Err(e) => {
                warn!("Captcha attempt {}/{}: OCR failed: {:#}", attempt, max_attempts, e);
            }
        }

        if attempt < max_attempts {
            next_challenge(session, &image, config)?;
        }
    }

    Err(ScrapeError::CaptchaUnsolved {
        attempts: max_attempts,
    })
}

/// Asks for a new captcha if the page offers a refresh control, then gives
/// the image time to load before the next screenshot.
fn next_challenge<S>(session: &S, image: &ElementHandle, config: &ScraperConfig) -> Result<(), ScrapeError>
where
    S: PageSession + ?Sized,
{
    if let Some(refresh_id) = &config.elements.captcha_refresh {
        match session.find_element(refresh_id)? {
            Some(refresh) => session.click(&refresh)?,
            None => debug!("Captcha refresh #{} not on page", refresh_id),
        }
    }
    thread::sleep(config.captcha.retry_delay());
    wait_for_render(session, image, config)
}

/// Waits until the modal has given the captcha image a size, so the first
/// screenshot never races the modal's render.
fn wait_for_render<S>(session: &S, image: &ElementHandle, config: &ScraperConfig) -> Result<(), ScrapeError>
where
    S: PageSession + ?Sized,
{
    let timeout = config.timeouts.render_wait();
    let rendered = poll_until(timeout, config.timeouts.poll_interval(), || {
        Ok(session.element_rect(image)?.is_rendered().then_some(()))
    })?;

    rendered.ok_or_else(|| {
        ScrapeError::from(anyhow::Error::new(ElementNotRendered {
            id: image.id().to_string(),
            timeout,
        }))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ElementNotFound;
    use crate::fakes::{FakeElement, FakeFactory, FakePage, ScriptedOcr};
    use crate::session::SessionFactory;
    use std::time::{Duration, Instant};

    fn config() -> ScraperConfig {
        let mut config = ScraperConfig::default();
        config.timeouts.render_wait_ms = 0;
        config.captcha.retry_delay_ms = 0;
        config
    }

    /// A page with the modal already open.
    fn open_modal(config: &ScraperConfig) -> FakeFactory {
        let ids = &config.elements;
        let page = FakePage::default()
            .with(&ids.captcha_image, FakeElement::new("img").rect(100.0, 50.0, 120.0, 40.0))
            .with(&ids.captcha_input, FakeElement::input("text"))
            .with(&ids.captcha_submit, FakeElement::input("submit"));
        FakeFactory::new(page)
    }

    #[test]
    fn test_answer_is_typed_and_submitted() {
        let config = config();
        let factory = open_modal(&config);
        let session = factory.open(&config).unwrap();
        let ocr = ScriptedOcr::new(&["7 + 5 ="]);
        let solver = ImageSolver::new(ocr.clone(), None);

        assert_eq!(solve_captcha(&session, &solver, &config).unwrap(), 1);

        let log = factory.single_log();
        assert_eq!(log.typed, [("inputCaptcha".to_string(), "12".to_string())]);
        assert_eq!(log.clicks, ["submitPnrNo"]);
        assert_eq!(log.screenshots, 1);
    }

    #[test]
    fn test_retries_until_expression_found() {
        let config = config();
        let factory = open_modal(&config);
        let session = factory.open(&config).unwrap();
        let ocr = ScriptedOcr::new(&["", "7 x 5", "7  *  5  ="]);
        let solver = ImageSolver::new(ocr.clone(), None);

        assert_eq!(solve_captcha(&session, &solver, &config).unwrap(), 3);
        assert_eq!(ocr.calls(), 3);
        assert_eq!(factory.single_log().typed[0].1, "35");
    }

    #[test]
    fn test_gives_up_after_exactly_six_attempts() {
        let config = config();
        let factory = open_modal(&config);
        let session = factory.open(&config).unwrap();
        let ocr = ScriptedOcr::new(&["noise"; 10]);
        let solver = ImageSolver::new(ocr.clone(), None);

        let err = solve_captcha(&session, &solver, &config).unwrap_err();

        assert!(matches!(err, ScrapeError::CaptchaUnsolved { attempts: 6 }));
        assert_eq!(ocr.calls(), 6);
        let log = factory.single_log();
        assert_eq!(log.screenshots, 6);
        assert!(log.typed.is_empty());
        assert!(log.clicks.is_empty());
    }

    #[test]
    fn test_ocr_errors_count_as_attempts() {
        let config = config();
        let factory = open_modal(&config);
        let session = factory.open(&config).unwrap();
        let ocr = ScriptedOcr::default();
        ocr.push(Err("tesseract crashed".to_string()));
        ocr.push(Ok("9 - 4 =".to_string()));
        let solver = ImageSolver::new(ocr.clone(), None);

        assert_eq!(solve_captcha(&session, &solver, &config).unwrap(), 2);
        assert_eq!(factory.single_log().typed[0].1, "5");
    }

    #[test]
    fn test_missing_captcha_image_is_not_retried() {
        let config = config();
        let factory = FakeFactory::new(FakePage::default());
        let session = factory.open(&config).unwrap();
        let ocr = ScriptedOcr::new(&["7 + 5 ="]);
        let solver = ImageSolver::new(ocr.clone(), None);

        let err = solve_captcha(&session, &solver, &config).unwrap_err();

        let ScrapeError::ScrapeFailed(cause) = err else {
            panic!("expected ScrapeFailed");
        };
        assert_eq!(cause.downcast_ref::<ElementNotFound>().unwrap().id, "CaptchaImgID");
        assert_eq!(ocr.calls(), 0);
    }

    #[test]
    fn test_unrendered_captcha_times_out_before_screenshot() {
        let config = config();
        let ids = &config.elements;
        let page = FakePage::default()
            .with(&ids.captcha_image, FakeElement::new("img").rect(0.0, 0.0, 0.0, 0.0))
            .with(&ids.captcha_input, FakeElement::input("text"));
        let factory = FakeFactory::new(page);
        let session = factory.open(&config).unwrap();
        let solver = ImageSolver::new(ScriptedOcr::default(), None);

        let err = solve_captcha(&session, &solver, &config).unwrap_err();

        let ScrapeError::ScrapeFailed(cause) = err else {
            panic!("expected ScrapeFailed");
        };
        assert_eq!(cause.downcast_ref::<ElementNotRendered>().unwrap().id, "CaptchaImgID");
        assert!(cause.downcast_ref::<ElementNotFound>().is_none());
        assert_eq!(factory.single_log().screenshots, 0);
    }

    fn modal_with_refresh(config: &mut ScraperConfig) -> FakeFactory {
        config.elements.captcha_refresh = Some("refreshCaptcha".to_string());
        let ids = &config.elements;
        let page = FakePage::default()
            .with(&ids.captcha_image, FakeElement::new("img").rect(100.0, 50.0, 120.0, 40.0))
            .with(&ids.captcha_input, FakeElement::input("text"))
            .with(&ids.captcha_submit, FakeElement::input("submit"))
            .with("refreshCaptcha", FakeElement::new("a"));
        FakeFactory::new(page)
    }

    #[test]
    fn test_refresh_is_clicked_between_attempts() {
        let mut config = config();
        let factory = modal_with_refresh(&mut config);
        let session = factory.open(&config).unwrap();
        let solver = ImageSolver::new(ScriptedOcr::new(&["", "7 x 5", "7 + 5 ="]), None);

        assert_eq!(solve_captcha(&session, &solver, &config).unwrap(), 3);
        assert_eq!(factory.single_log().clicks, ["refreshCaptcha", "refreshCaptcha", "submitPnrNo"]);
    }

    #[test]
    fn test_no_refresh_after_last_attempt() {
        let mut config = config();
        let factory = modal_with_refresh(&mut config);
        let session = factory.open(&config).unwrap();
        let solver = ImageSolver::new(ScriptedOcr::default(), None);

        let err = solve_captcha(&session, &solver, &config).unwrap_err();

        assert!(matches!(err, ScrapeError::CaptchaUnsolved { attempts: 6 }));
        let log = factory.single_log();
        assert_eq!(log.screenshots, 6);
        assert_eq!(log.clicks, ["refreshCaptcha"; 5]);
    }

    #[test]
    fn test_pauses_between_attempts() {
        let mut config = config();
        config.captcha.retry_delay_ms = 25;
        let factory = open_modal(&config);
        let session = factory.open(&config).unwrap();
        let solver = ImageSolver::new(ScriptedOcr::new(&["", "", "1 + 1 ="]), None);

        let start = Instant::now();
        assert_eq!(solve_captcha(&session, &solver, &config).unwrap(), 3);

        assert!(start.elapsed() >= Duration::from_millis(50));
    }
}
