//! Result tables → [`NormalizedRecord`].
//!
//! Each table is read through a [`TableSchema`]: the ordered column names
//! its data rows must have. A row of any other width is an extraction
//! failure naming the table, never a silently shifted field.

use chrono::NaiveDate;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::sync::OnceLock;
use tracing::debug;

use crate::config::ElementIds;
use crate::error::ScrapeError;
use crate::record::{FareAndStatus, JourneySegment, NormalizedRecord, PassengerStatus, Pnr};

/// Ordered column layout of one result table.
#[derive(Debug)]
pub struct TableSchema {
    /// Name reported in extraction failures
    pub name: &'static str,
    pub columns: &'static [&'static str],
}

pub static JOURNEY_TABLE: TableSchema = TableSchema {
    name: "journey",
    columns: &[
        "train_number",
        "train_name",
        "boarding_date",
        "reserved_from",
        "reserved_to",
        "reserved_upto",
        "boarding_point",
        "reserved_class",
    ],
};

pub static OTHER_DETAILS_TABLE: TableSchema = TableSchema {
    name: "other",
    columns: &["fare", "charting_status", "remark", "train_status"],
};

pub static PASSENGER_TABLE: TableSchema = TableSchema {
    name: "passenger",
    columns: &["name", "booking_status", "current_status", "coach_position"],
};

/// Failure name for an unparseable fare cell.
pub const FARE: &str = "fare";

/// A data row whose width matched its schema.
#[derive(Debug)]
pub struct Row {
    schema: &'static TableSchema,
    cells: Vec<String>,
}

impl Row {
    /// Cell text by column name.
    pub fn get(&self, column: &str) -> &str {
        self.schema
            .columns
            .iter()
            .position(|c| *c == column)
            .and_then(|idx| self.cells.get(idx))
            .map(String::as_str)
            .unwrap_or_default()
    }

    fn owned(&self, column: &str) -> String {
        self.get(column).to_string()
    }
}

/// Parsed results container.
pub struct ResultsPage {
    doc: Html,
}

impl ResultsPage {
    pub fn parse(html: &str) -> Self {
        Self {
            doc: Html::parse_fragment(html),
        }
    }

    /// Data rows of the table with `table_id`, header row skipped.
    ///
    /// Rows without any cells (spacers) are ignored; every other row must
    /// have exactly as many cells as the schema has columns.
    pub fn rows(&self, table_id: &str, schema: &'static TableSchema) -> Result<Vec<Row>, ScrapeError> {
        let table_selector = parse_selector(&format!("[id=\"{}\"]", table_id.replace('"', "\\\"")), schema)?;
        let row_selector = parse_selector("tr", schema)?;

        let table = self
            .doc
            .select(&table_selector)
            .next()
            .ok_or_else(|| ScrapeError::extraction(schema.name, format!("table #{} missing", table_id)))?;

        let mut rows = Vec::new();
        for (idx, tr) in table.select(&row_selector).enumerate().skip(1) {
            let cells: Vec<String> = tr
                .children()
                .filter_map(ElementRef::wrap)
                .filter(|cell| matches!(cell.value().name(), "td" | "th"))
                .map(|cell| cell_text(&cell))
                .collect();

            if cells.is_empty() {
                continue;
            }
            if cells.len() != schema.columns.len() {
                return Err(ScrapeError::extraction(
                    schema.name,
                    format!(
                        "row {} has {} columns, expected {}",
                        idx,
                        cells.len(),
                        schema.columns.len()
                    ),
                ));
            }
            rows.push(Row { schema, cells });
        }

        debug!("Table {}: {} data rows", schema.name, rows.len());
        Ok(rows)
    }

    fn single_row(&self, table_id: &str, schema: &'static TableSchema) -> Result<Row, ScrapeError> {
        let mut rows = self.rows(table_id, schema)?;
        match rows.len() {
            1 => Ok(rows.remove(0)),
            0 => Err(ScrapeError::extraction(schema.name, "no data row")),
            n => Err(ScrapeError::extraction(
                schema.name,
                format!("expected 1 data row, found {}", n),
            )),
        }
    }
}

fn parse_selector(css: &str, schema: &TableSchema) -> Result<Selector, ScrapeError> {
    Selector::parse(css)
        .map_err(|e| ScrapeError::extraction(schema.name, format!("bad selector {}: {}", css, e)))
}

/// Text of a cell, whitespace collapsed the way a browser renders it.
fn cell_text(cell: &ElementRef<'_>) -> String {
    cell.text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn date_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"^\d{2}-\d{2}-\d{4}$").expect("date pattern is valid"))
}

/// Parses a strict `DD-MM-YYYY` date.
pub fn parse_boarding_date(text: &str) -> Result<NaiveDate, ScrapeError> {
    if !date_regex().is_match(text) {
        return Err(ScrapeError::extraction(
            JOURNEY_TABLE.name,
            format!("boarding date {:?} is not DD-MM-YYYY", text),
        ));
    }
    NaiveDate::parse_from_str(text, "%d-%m-%Y").map_err(|e| {
        ScrapeError::extraction(
            JOURNEY_TABLE.name,
            format!("boarding date {:?}: {}", text, e),
        )
    })
}

/// Parses the fare cell. Thousands separators are tolerated.
pub fn parse_fare(text: &str) -> Result<f64, ScrapeError> {
    let cleaned: String = text.chars().filter(|c| *c != ',').collect();
    match cleaned.trim().parse::<f64>() {
        Ok(fare) if fare.is_finite() => Ok(fare),
        _ => Err(ScrapeError::extraction(
            FARE,
            format!("fare {:?} is not a number", text),
        )),
    }
}

fn journey_from(row: &Row) -> Result<JourneySegment, ScrapeError> {
    Ok(JourneySegment {
        train_number: row.owned("train_number"),
        train_name: row.owned("train_name"),
        boarding_date: parse_boarding_date(row.get("boarding_date"))?,
        reserved_from: row.owned("reserved_from"),
        reserved_to: row.owned("reserved_to"),
        reserved_upto: row.owned("reserved_upto"),
        boarding_point: row.owned("boarding_point"),
        reserved_class: row.owned("reserved_class"),
    })
}

fn fare_from(row: &Row) -> Result<FareAndStatus, ScrapeError> {
    Ok(FareAndStatus {
        fare: parse_fare(row.get("fare"))?,
        charting_status: row.owned("charting_status"),
        remark: row.owned("remark"),
        train_status: row.owned("train_status"),
    })
}

fn passenger_from(row: &Row) -> PassengerStatus {
    let coach_position = row.get("coach_position");
    PassengerStatus {
        name: row.owned("name"),
        booking_status: row.owned("booking_status"),
        current_status: row.owned("current_status"),
        coach_position: (!coach_position.is_empty()).then(|| coach_position.to_string()),
    }
}

/// Reads the three result tables out of the results container's HTML.
pub fn extract_record(pnr: Pnr, container_html: &str, ids: &ElementIds) -> Result<NormalizedRecord, ScrapeError> {
    let page = ResultsPage::parse(container_html);

    let journey = journey_from(&page.single_row(&ids.journey_table, &JOURNEY_TABLE)?)?;
    let fare = fare_from(&page.single_row(&ids.other_details_table, &OTHER_DETAILS_TABLE)?)?;

    let passengers: Vec<PassengerStatus> = page
        .rows(&ids.passenger_table, &PASSENGER_TABLE)?
        .iter()
        .map(passenger_from)
        .collect();
    if passengers.is_empty() {
        return Err(ScrapeError::extraction(PASSENGER_TABLE.name, "no passenger rows"));
    }

    Ok(NormalizedRecord {
        pnr,
        journey,
        fare,
        passengers,
    })
}
