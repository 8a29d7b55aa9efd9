// Cell conversion shared by both report layouts

use calamine::Data;
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};

use super::ParserError;
use crate::utils::parse_decimal;

const TEXT_DATETIME_FORMATS: [&str; 4] = [
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
];

const TEXT_DATE_FORMATS: [&str; 3] = ["%d/%m/%Y", "%Y-%m-%d", "%d-%m-%Y"];

/// Largest serial Excel can represent (9999-12-31)
const MAX_EXCEL_SERIAL: f64 = 2_958_465.0;

/// Text content of a cell, `None` when empty
pub(crate) fn cell_text(cell: Option<&Data>) -> Option<String> {
    let text = match cell? {
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => s.trim().to_string(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) if f.fract() == 0.0 => format!("{f:.0}"),
        Data::Float(f) => f.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => dt
            .as_datetime()
            .map(|d| d.format("%d/%m/%Y").to_string())
            .unwrap_or_default(),
        Data::Error(_) | Data::Empty => String::new(),
    };

    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Numeric reading in a cell
///
/// Empty cells and the `-` placeholder give `Ok(None)`. Text must parse with
/// either decimal separator, anything else is `InvalidData`.
pub(crate) fn cell_number(
    cell: Option<&Data>,
    row: usize,
    col: usize,
) -> Result<Option<f64>, ParserError> {
    let invalid = |msg: String| ParserError::InvalidData { row, col, msg };

    match cell {
        None | Some(Data::Empty) => Ok(None),
        Some(Data::Int(i)) => Ok(Some(*i as f64)),
        Some(Data::Float(f)) if f.is_finite() => Ok(Some(*f)),
        Some(Data::String(s)) => match parse_decimal(s) {
            None => Ok(None),
            Some(Ok(number)) => Ok(Some(number)),
            Some(Err(msg)) => Err(invalid(msg)),
        },
        Some(other) => Err(invalid(format!("expected a number, found {other:?}"))),
    }
}

/// Timestamp in a cell: date-typed cells, serial numbers or text
pub(crate) fn cell_datetime(
    cell: Option<&Data>,
    row: usize,
    col: usize,
) -> Result<Option<DateTime<Utc>>, ParserError> {
    let naive = match cell {
        None | Some(Data::Empty) => return Ok(None),
        Some(Data::DateTime(dt)) => dt.as_datetime(),
        Some(Data::Float(f)) => excel_serial_to_datetime(*f),
        Some(Data::Int(i)) => excel_serial_to_datetime(*i as f64),
        Some(Data::String(s)) | Some(Data::DateTimeIso(s)) => {
            if s.trim().is_empty() {
                return Ok(None);
            }
            parse_date_text(s)
        }
        Some(_) => None,
    };

    naive.map(|n| Some(n.and_utc())).ok_or_else(|| {
        ParserError::InvalidDate(format!("row {row}, col {col}: {cell:?}"))
    })
}

/// Convert a 1900-system serial to a timestamp
///
/// Serials count days from 1899-12-30, the fraction is the time of day.
pub(crate) fn excel_serial_to_datetime(serial: f64) -> Option<NaiveDateTime> {
    if !serial.is_finite() || serial < 1.0 || serial > MAX_EXCEL_SERIAL {
        return None;
    }

    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    let days = serial.trunc() as i64;
    let seconds = (serial.fract() * 86_400.0).round() as i64;
    epoch.checked_add_signed(Duration::days(days) + Duration::seconds(seconds))
}

/// Parse the text date formats seen in portal exports
///
/// Date-only values resolve to midnight.
pub(crate) fn parse_date_text(value: &str) -> Option<NaiveDateTime> {
    let trimmed = value.trim();

    for format in TEXT_DATETIME_FORMATS {
        if let Ok(datetime) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(datetime);
        }
    }

    TEXT_DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(trimmed, format).ok())
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}
