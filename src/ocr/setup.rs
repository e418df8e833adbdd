use anyhow::{anyhow, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;
use tracing::info;

use crate::paths::get_tessdata_dir;

const TESSDATA_REPO: &str = "https://github.com/tesseract-ocr/tessdata/raw/main";
const ENG_TRAINEDDATA: &str = "eng.traineddata";

const COMMON_EXECUTABLES: [&str; 5] = [
    "/usr/bin/tesseract",
    "/usr/local/bin/tesseract",
    "/opt/homebrew/bin/tesseract",
    r"C:\Program Files\Tesseract-OCR\tesseract.exe",
    r"C:\Program Files (x86)\Tesseract-OCR\tesseract.exe",
];

/// Finds the Tesseract executable: explicit path, then PATH, then common
/// install locations.
pub fn find_tesseract_executable(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        if path.exists() {
            return Ok(path.to_path_buf());
        }
        return Err(anyhow!(
            "Configured tesseract not found at {}",
            path.display()
        ));
    }

    if let Ok(output) = Command::new("tesseract").arg("--version").output() {
        if output.status.success() {
            return Ok(PathBuf::from("tesseract"));
        }
    }

    for path in &COMMON_EXECUTABLES {
        let p = PathBuf::from(path);
        if p.exists() {
            return Ok(p);
        }
    }

    Err(anyhow!("Tesseract not found. Please install Tesseract-OCR."))
}

/// Finds a tessdata directory holding `eng.traineddata`.
///
/// `None` means tesseract should use its compiled-in default.
pub fn find_tessdata_dir(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(dir) = explicit {
        return Some(dir.to_path_buf());
    }

    let local = get_tessdata_dir();
    if local.join(ENG_TRAINEDDATA).exists() {
        return Some(local);
    }

    // TESSDATA_PREFIX may point at tessdata itself or at its parent
    if let Ok(prefix) = std::env::var("TESSDATA_PREFIX") {
        let p = PathBuf::from(&prefix);
        if p.join(ENG_TRAINEDDATA).exists() {
            return Some(p);
        }
        let p = p.join("tessdata");
        if p.join(ENG_TRAINEDDATA).exists() {
            return Some(p);
        }
    }

    None
}

/// Ensures `eng.traineddata` is available, downloading it into the local
/// data directory when neither the local copy nor `TESSDATA_PREFIX` has it.
pub fn ensure_tessdata() -> Result<PathBuf> {
    if let Some(dir) = find_tessdata_dir(None) {
        info!("Tessdata found at: {}", dir.display());
        return Ok(dir);
    }

    let tessdata_dir = get_tessdata_dir();
    fs::create_dir_all(&tessdata_dir)?;
    download_tessdata(&tessdata_dir)?;
    Ok(tessdata_dir)
}

/// Downloads English trained data
fn download_tessdata(tessdata_dir: &Path) -> Result<()> {
    let eng_url = format!("{}/{}", TESSDATA_REPO, ENG_TRAINEDDATA);
    let eng_path = tessdata_dir.join(ENG_TRAINEDDATA);

    info!("Downloading {}...", ENG_TRAINEDDATA);

    let client = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(300))
        .build()?;

    let response = client
        .get(&eng_url)
        .header("User-Agent", "pnr-scraper")
        .send()?;

    if !response.status().is_success() {
        return Err(anyhow!(
            "Failed to download {}: HTTP {}",
            ENG_TRAINEDDATA,
            response.status()
        ));
    }

    let bytes = response.bytes()?;
    let mut file = fs::File::create(&eng_path)?;
    file.write_all(&bytes)?;

    info!("Downloaded {} ({} bytes)", ENG_TRAINEDDATA, bytes.len());

    Ok(())
}
