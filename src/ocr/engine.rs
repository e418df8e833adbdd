use anyhow::{anyhow, Context, Result};
use image::{GrayImage, ImageFormat};
use std::io::{Cursor, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};

use super::setup::{find_tessdata_dir, find_tesseract_executable};
use crate::config::CaptchaConfig;

/// Turns a preprocessed image into raw text.
pub trait OcrEngine {
    fn recognize(&self, img: &GrayImage) -> Result<String>;
}

/// Runs the tesseract executable once per image.
///
/// The image is piped in as PNG on stdin and the text read back from
/// stdout, so concurrent lookups never share a file on disk.
#[derive(Debug, Clone)]
pub struct TesseractEngine {
    executable: PathBuf,
    tessdata_dir: Option<PathBuf>,
    psm: u8,
    char_whitelist: Option<String>,
}

impl TesseractEngine {
    /// Resolves the executable and tessdata location up front so a missing
    /// install fails the lookup instead of burning captcha attempts.
    pub fn from_config(config: &CaptchaConfig) -> Result<Self> {
        let executable = find_tesseract_executable(config.tesseract_path.as_deref())?;
        let tessdata_dir = find_tessdata_dir(config.tessdata_dir.as_deref());
        Ok(Self {
            executable,
            tessdata_dir,
            psm: config.psm,
            char_whitelist: config.char_whitelist.clone(),
        })
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.executable);
        cmd.arg("stdin").arg("stdout");
        if let Some(dir) = &self.tessdata_dir {
            cmd.arg("--tessdata-dir").arg(dir);
        }
        cmd.arg("-l").arg("eng").arg("--psm").arg(self.psm.to_string());
        if let Some(whitelist) = &self.char_whitelist {
            cmd.arg("-c")
                .arg(format!("tessedit_char_whitelist={}", whitelist));
        }
        cmd
    }
}

impl OcrEngine for TesseractEngine {
    fn recognize(&self, img: &GrayImage) -> Result<String> {
        let mut png = Vec::new();
        img.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .context("Failed to encode captcha crop")?;

        let mut child = self
            .command()
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to start {}", self.executable.display()))?;

        {
            let mut stdin = child
                .stdin
                .take()
                .ok_or_else(|| anyhow!("Tesseract stdin unavailable"))?;
            stdin.write_all(&png).context("Failed to send image to tesseract")?;
        }

        let output = child.wait_with_output()?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("Tesseract failed: {}", stderr.trim()));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine(whitelist: Option<&str>, tessdata: Option<&str>) -> TesseractEngine {
        TesseractEngine {
            executable: PathBuf::from("tesseract"),
            tessdata_dir: tessdata.map(PathBuf::from),
            psm: 7,
            char_whitelist: whitelist.map(str::to_string),
        }
    }

    fn args(cmd: &Command) -> Vec<String> {
        cmd.get_args()
            .map(|a| a.to_string_lossy().to_string())
            .collect()
    }

    #[test]
    fn test_command_reads_stdin_writes_stdout() {
        let cmd = engine(None, None).command();
        assert_eq!(args(&cmd), ["stdin", "stdout", "-l", "eng", "--psm", "7"]);
    }

    #[test]
    fn test_command_with_tessdata_and_whitelist() {
        let cmd = engine(Some("0123456789+-*/="), Some("/opt/tessdata")).command();
        assert_eq!(
            args(&cmd),
            [
                "stdin",
                "stdout",
                "--tessdata-dir",
                "/opt/tessdata",
                "-l",
                "eng",
                "--psm",
                "7",
                "-c",
                "tessedit_char_whitelist=0123456789+-*/=",
            ]
        );
    }
}
