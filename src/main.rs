//! PNR Scraper
//!
//! Command-line front end: looks up PNR status through the enquiry page and
//! prints one JSON object per lookup.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info};

use pnr_scraper::batch::{exit_code, run_batch};
use pnr_scraper::ocr::setup::find_tesseract_executable;
use pnr_scraper::ocr::{ensure_tessdata, ImageSolver, Solution, TesseractEngine};
use pnr_scraper::{logging, paths, Pnr, PnrScraper, ScraperConfig};

#[derive(Parser, Debug)]
#[command(name = "pnr-scraper", version, about = "Look up PNR status from the enquiry page")]
struct Cli {
    /// Config file (default: config.json next to the executable, then the user config dir)
    #[arg(short = 'c', long = "config", global = true)]
    config: Option<PathBuf>,

    /// Debug logging (RUST_LOG overrides)
    #[arg(short = 'v', long = "verbose", global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Look up one or more 10-digit PNRs
    Lookup {
        #[arg(required = true)]
        pnrs: Vec<Pnr>,

        /// Parallel browser sessions
        #[arg(short = 'w', long = "workers", default_value_t = 1)]
        workers: usize,

        /// Pretty-print the JSON output
        #[arg(long = "pretty")]
        pretty: bool,
    },

    /// Solve a captcha image file and print the answer
    SolveCaptcha { image: PathBuf },

    /// Locate tesseract and download English trained data if missing
    SetupOcr,

    /// Write the default config as JSON
    InitConfig {
        /// Destination (default: the user config dir)
        path: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = paths::ensure_directories() {
        eprintln!("Failed to create data directories: {}", e);
    }
    if let Err(e) = logging::init(cli.verbose) {
        eprintln!("{:#}", e);
    }

    match run(cli) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<u8> {
    match cli.command {
        Command::Lookup {
            pnrs,
            workers,
            pretty,
        } => {
            let config = load_config(cli.config.as_deref())?;
            let scraper = PnrScraper::from_config(config)?;
            let results = run_batch(&scraper, &pnrs, workers);
            for result in &results {
                let value = result.to_json()?;
                let line = if pretty {
                    serde_json::to_string_pretty(&value)?
                } else {
                    serde_json::to_string(&value)?
                };
                println!("{}", line);
            }
            Ok(exit_code(&results))
        }

        Command::SolveCaptcha { image } => {
            let config = load_config(cli.config.as_deref())?;
            let img = image::open(&image)
                .with_context(|| format!("Failed to open {}", image.display()))?
                .to_rgba8();
            let engine = TesseractEngine::from_config(&config.captcha)?;
            let solver = ImageSolver::new(engine, config.captcha.binarize_threshold);
            match solver.solve(&img)? {
                Solution::Answer(answer) => {
                    println!("{}", answer);
                    Ok(0)
                }
                Solution::Unsolved => {
                    println!("unsolved");
                    Ok(1)
                }
            }
        }

        Command::SetupOcr => {
            let config = load_config(cli.config.as_deref())?;
            let tesseract = find_tesseract_executable(config.captcha.tesseract_path.as_deref())?;
            info!("Tesseract: {}", tesseract.display());
            let tessdata = match &config.captcha.tessdata_dir {
                Some(dir) => dir.clone(),
                None => ensure_tessdata()?,
            };
            info!("Tessdata: {}", tessdata.display());
            Ok(0)
        }

        Command::InitConfig { path } => {
            let path = match path {
                Some(path) => path,
                None => paths::get_user_config_path().unwrap_or_else(paths::get_exe_config_path),
            };
            ScraperConfig::default().save(&path)?;
            println!("{}", path.display());
            Ok(0)
        }
    }
}

/// An explicit `--config` must load; implicit files fall back to defaults.
fn load_config(explicit: Option<&Path>) -> Result<ScraperConfig> {
    if let Some(path) = explicit {
        return ScraperConfig::load(path);
    }
    let mut candidates = vec![paths::get_exe_config_path()];
    candidates.extend(paths::get_user_config_path());
    Ok(ScraperConfig::load_first(&candidates))
}
