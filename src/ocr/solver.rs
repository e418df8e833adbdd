use anyhow::Result;
use image::RgbaImage;
use regex::Regex;
use std::sync::OnceLock;
use tracing::debug;

use super::engine::OcrEngine;
use super::preprocess::prepare_for_ocr;

/// Two operands around one operator, terminated by `=`.
/// The captcha never shows negatives, exponents or more than one operator.
const EXPRESSION_PATTERN: &str = r"(\d+)\s*([+\-*/])\s*(\d+)\s*=";

fn expression_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(EXPRESSION_PATTERN).expect("expression pattern is valid"))
}

/// Result of one solve attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Solution {
    Answer(i64),
    /// No arithmetic expression could be read; try a fresh capture.
    Unsolved,
}

/// A parsed `a op b =` captcha expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Expression {
    pub left: i64,
    pub operator: char,
    pub right: i64,
}

impl Expression {
    /// Finds the first expression in OCR text.
    pub fn find(text: &str) -> Option<Self> {
        let caps = expression_regex().captures(text)?;
        Some(Self {
            left: caps[1].parse().ok()?,
            operator: caps[2].chars().next()?,
            right: caps[3].parse().ok()?,
        })
    }

    /// Integer value, or `None` on overflow, division by zero or a
    /// division that leaves a remainder.
    pub fn evaluate(&self) -> Option<i64> {
        match self.operator {
            '+' => self.left.checked_add(self.right),
            '-' => self.left.checked_sub(self.right),
            '*' => self.left.checked_mul(self.right),
            '/' => {
                if self.right != 0 && self.left % self.right == 0 {
                    self.left.checked_div(self.right)
                } else {
                    None
                }
            }
            _ => None,
        }
    }
}

/// Solves OCR text without touching an image.
pub fn solve_text(text: &str) -> Solution {
    match Expression::find(text).and_then(|expr| expr.evaluate()) {
        Some(answer) => Solution::Answer(answer),
        None => Solution::Unsolved,
    }
}

/// Captcha crop → OCR → arithmetic answer.
pub struct ImageSolver<E> {
    engine: E,
    binarize_threshold: Option<u8>,
}

impl<E: OcrEngine> ImageSolver<E> {
    pub fn new(engine: E, binarize_threshold: Option<u8>) -> Self {
        Self {
            engine,
            binarize_threshold,
        }
    }

    /// Solves one cropped captcha. OCR engine failures are returned as
    /// errors; unreadable text is [`Solution::Unsolved`].
    pub fn solve(&self, crop: &RgbaImage) -> Result<Solution> {
        if crop.width() == 0 || crop.height() == 0 {
            debug!("Captcha crop is empty");
            return Ok(Solution::Unsolved);
        }

        let prepared = prepare_for_ocr(crop, self.binarize_threshold);
        let text = self.engine.recognize(&prepared)?;
        debug!("Captcha OCR text: {:?}", text.trim());

        Ok(solve_text(&text))
    }
}
