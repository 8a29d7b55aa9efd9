// Consumption report parsing for the .xls and .xlsx exports

pub mod cells;
pub mod sheet;
pub mod workbook;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::classifier::PayloadKind;
use crate::error::ValidationError;
use crate::models::MeterType;
use crate::utils::location_key;

pub use sheet::SheetParser;
pub use workbook::{XlsReportParser, XlsxReportParser};

#[derive(Error, Debug)]
pub enum ParserError {
    #[error("Failed to open workbook: {0}")]
    WorkbookOpen(String),

    #[error("Sheet not found: {0}")]
    SheetNotFound(String),

    #[error("Missing header row: {0}")]
    MissingHeader(String),

    #[error("Invalid data at row {row}, col {col}: {msg}")]
    InvalidData { row: usize, col: usize, msg: String },

    #[error("Invalid date format: {0}")]
    InvalidDate(String),

    #[error("Payload is not a report: {0:?}")]
    UnsupportedPayload(PayloadKind),

    #[error("Invalid reading for device {serial}: {source}")]
    InvalidReading {
        serial: String,
        source: ValidationError,
    },

    #[error("Parser task failed: {0}")]
    Task(String),

    #[error("Report for {start} to {end} failed: {source}")]
    Chunk {
        start: NaiveDate,
        end: NaiveDate,
        source: Box<ParserError>,
    },
}

/// One reading as found in a report, before it joins a device
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RawRow {
    pub serial_number: String,
    pub location: String,
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    pub meter_type: MeterType,
}

impl RawRow {
    /// Accent-free lower-case form of the location, for lookups
    pub fn location_key(&self) -> String {
        location_key(&self.location)
    }
}

pub trait ReportParser {
    fn parse(&self, bytes: &[u8]) -> Result<Vec<RawRow>, ParserError>;
}

/// Parser for a classified payload, `None` when the payload is not a report
///
/// `reference_year` is the year of the report's end date, used for date
/// headers that carry no year.
pub fn parser_for(
    kind: PayloadKind,
    reference_year: i32,
) -> Option<Box<dyn ReportParser + Send + Sync>> {
    match kind {
        PayloadKind::LegacyBinarySpreadsheet => Some(Box::new(XlsReportParser::new(reference_year))),
        PayloadKind::ModernZippedSpreadsheet => {
            Some(Box::new(XlsxReportParser::new(reference_year)))
        }
        PayloadKind::PlainText | PayloadKind::Unrecognized => None,
    }
}

pub fn parse_report(
    kind: PayloadKind,
    bytes: &[u8],
    reference_year: i32,
) -> Result<Vec<RawRow>, ParserError> {
    parser_for(kind, reference_year)
        .ok_or(ParserError::UnsupportedPayload(kind))?
        .parse(bytes)
}
