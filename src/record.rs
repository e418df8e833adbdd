//! Lookup identifier and the normalized record a lookup produces.
//!
//! Field names follow the JSON shape the booking service has always
//! exposed: journey and fare fields at top level, passengers under
//! `passengers_details`.

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::PnrError;

/// Days a record stays relevant after the boarding date.
pub const RECORD_RETENTION_DAYS: u64 = 5;

const PNR_MIN: u64 = 1_000_000_000;
const PNR_MAX: u64 = 9_999_999_999;

/// A 10-digit PNR number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub struct Pnr(u64);

impl Pnr {
    /// Accepts values whose decimal rendering has exactly ten digits.
    pub fn new(value: u64) -> Result<Self, PnrError> {
        if (PNR_MIN..=PNR_MAX).contains(&value) {
            Ok(Self(value))
        } else {
            Err(PnrError(value.to_string()))
        }
    }

    /// Parses exactly ten ASCII digits, ignoring surrounding whitespace.
    pub fn parse(text: &str) -> Result<Self, PnrError> {
        let trimmed = text.trim();
        if trimmed.len() != 10 || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return Err(PnrError(text.to_string()));
        }
        trimmed
            .parse::<u64>()
            .map_err(|_| PnrError(text.to_string()))
            .and_then(Self::new)
    }

    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Pnr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Pnr {
    type Err = PnrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<u64> for Pnr {
    type Error = PnrError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Pnr> for u64 {
    fn from(pnr: Pnr) -> Self {
        pnr.0
    }
}

/// One row of the journey table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JourneySegment {
    pub train_number: String,
    pub train_name: String,
    /// Source format `DD-MM-YYYY`, serialized as ISO `YYYY-MM-DD`.
    pub boarding_date: NaiveDate,
    pub reserved_from: String,
    pub reserved_to: String,
    pub reserved_upto: String,
    pub boarding_point: String,
    pub reserved_class: String,
}

/// The single data row of the other-details table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FareAndStatus {
    pub fare: f64,
    pub charting_status: String,
    pub remark: String,
    pub train_status: String,
}

/// One passenger row, in page order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassengerStatus {
    /// Ordinal label as shown on the page, e.g. "Passenger 1".
    pub name: String,
    pub booking_status: String,
    pub current_status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coach_position: Option<String>,
}

/// Everything a successful lookup returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    pub pnr: Pnr,
    #[serde(flatten)]
    pub journey: JourneySegment,
    #[serde(flatten)]
    pub fare: FareAndStatus,
    #[serde(rename = "passengers_details")]
    pub passengers: Vec<PassengerStatus>,
}

impl NormalizedRecord {
    /// Date after which the booking is no longer worth tracking.
    pub fn expires_on(&self) -> Option<NaiveDate> {
        self.journey
            .boarding_date
            .checked_add_days(Days::new(RECORD_RETENTION_DAYS))
    }
}
