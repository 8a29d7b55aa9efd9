use chrono::NaiveDate;
use thiserror::Error;

use crate::reports::ParserError;

/// Caller mistakes detected before any network call or while building readings
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Invalid date range: end date {end} must be after start date {start}")]
    InvalidDateRange { start: NaiveDate, end: NaiveDate },

    #[error("Date range of {days} days exceeds the maximum of {max} days")]
    RangeTooLong { days: i64, max: i64 },

    #[error("Reading value cannot be negative: {0}")]
    NegativeReading(f64),

    #[error("Reading value must be finite: {0}")]
    NonFiniteReading(f64),
}

#[derive(Error, Debug)]
pub enum CalistaError {
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Login failed: {0}")]
    Login(String),

    #[error("Report parsing failed: {0}")]
    Parser(#[from] ParserError),

    #[error(transparent)]
    Request(#[from] reqwest::Error),
}
