//! Runs many lookups across worker threads.
//!
//! PNRs go onto a job queue shared by the workers; each worker pulls the
//! next job, runs the lookup in its own browser session, and sends the
//! outcome back tagged with the job's position.

use serde_json::{json, Value};
use std::sync::mpsc::channel;
use std::sync::Mutex;
use std::thread;
use tracing::{debug, info};

use crate::error::ScrapeError;
use crate::ocr::OcrEngine;
use crate::record::{NormalizedRecord, Pnr};
use crate::scrape::PnrScraper;
use crate::session::SessionFactory;

/// Outcome of one lookup in a batch.
#[derive(Debug)]
pub struct BatchResult {
    pub pnr: Pnr,
    pub outcome: Result<NormalizedRecord, ScrapeError>,
}

impl BatchResult {
    /// JSON line for this lookup: the record plus `expires_on`, or the
    /// error with its kind.
    pub fn to_json(&self) -> serde_json::Result<Value> {
        match &self.outcome {
            Ok(record) => {
                let mut value = serde_json::to_value(record)?;
                if let Value::Object(fields) = &mut value {
                    fields.insert("expires_on".to_string(), json!(record.expires_on()));
                }
                Ok(value)
            }
            Err(e) => Ok(json!({
                "pnr": self.pnr,
                "error": e.to_string(),
                "kind": e.kind(),
                "not_found": e.is_not_found(),
            })),
        }
    }
}

/// Looks up every PNR using up to `workers` threads.
///
/// Results come back in input order. `workers` is clamped to at least one
/// and at most one per PNR.
pub fn run_batch<F, E>(scraper: &PnrScraper<F, E>, pnrs: &[Pnr], workers: usize) -> Vec<BatchResult>
where
    F: SessionFactory + Sync,
    E: OcrEngine + Sync,
{
    if pnrs.is_empty() {
        return Vec::new();
    }

    let workers = workers.clamp(1, pnrs.len());
    info!("Batch: {} lookup(s) on {} worker(s)", pnrs.len(), workers);

    let (job_sender, job_receiver) = channel();
    for job in pnrs.iter().copied().enumerate() {
        // The receiver is alive until the end of this function.
        let _ = job_sender.send(job);
    }
    drop(job_sender);
    let job_receiver = Mutex::new(job_receiver);

    let (result_sender, result_receiver) = channel();
    let mut slots: Vec<Option<BatchResult>> = pnrs.iter().map(|_| None).collect();

    thread::scope(|scope| {
        for worker in 1..=workers {
            let job_receiver = &job_receiver;
            let result_sender = result_sender.clone();
            scope.spawn(move || {
                debug!("Batch worker {} started", worker);
                loop {
                    // Release the queue before the lookup so other workers
                    // can pull jobs meanwhile.
                    let job = match job_receiver.lock() {
                        Ok(receiver) => receiver.recv(),
                        Err(_) => break,
                    };
                    let Ok((index, pnr)) = job else {
                        break;
                    };

                    let outcome = scraper.lookup(pnr);
                    if result_sender.send((index, BatchResult { pnr, outcome })).is_err() {
                        break;
                    }
                }
                debug!("Batch worker {} finished", worker);
            });
        }
        drop(result_sender);

        for (index, result) in result_receiver {
            slots[index] = Some(result);
        }
    });

    let results: Vec<BatchResult> = slots.into_iter().flatten().collect();
    let succeeded = results.iter().filter(|r| r.outcome.is_ok()).count();
    info!("Batch complete: {}/{} succeeded", succeeded, results.len());
    results
}

/// Process exit code for a finished batch: 0 when every lookup succeeded,
/// 2 when the only failures are not-found lookups, 1 otherwise.
pub fn exit_code(results: &[BatchResult]) -> u8 {
    let mut not_found = false;
    for result in results {
        match &result.outcome {
            Ok(_) => {}
            Err(e) if e.is_not_found() => not_found = true,
            Err(_) => return 1,
        }
    }
    if not_found { 2 } else { 0 }
}
