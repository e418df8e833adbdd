//! Captcha OCR: crop preprocessing, the tesseract engine, and the
//! arithmetic solver that turns recognized text into an answer.

pub mod engine;
pub mod preprocess;
pub mod setup;
pub mod solver;

pub use engine::{OcrEngine, TesseractEngine};
pub use preprocess::{crop_region, prepare_for_ocr};
pub use setup::ensure_tessdata;
pub use solver::{solve_text, Expression, ImageSolver, Solution};
