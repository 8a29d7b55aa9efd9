use calamine::{Data, Range};
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use regex::Regex;
use std::sync::OnceLock;
use tracing::{debug, info, warn};

use super::cells::{cell_datetime, cell_number, cell_text, excel_serial_to_datetime, parse_date_text};
use super::{ParserError, RawRow};
use crate::models::MeterType;
use crate::utils::normalize_header;

/// Rows searched for the header before giving up
const HEADER_SEARCH_ROWS: usize = 10;

const SERIAL_HEADER: &str = "n_serie";
const TYPE_HEADERS: [&str; 2] = ["tipo_equipo", "tipo"];
const LOCATION_HEADER: &str = "ubicacion";
const DATE_HEADER: &str = "fecha";
const CURRENT_READING_HEADER: &str = "lectura_actual";

/// Columns of the per-reading export: one row per reading
#[derive(Debug)]
struct PerReadingColumns {
    serial: usize,
    meter_type: usize,
    location: Option<usize>,
    date: usize,
    value: usize,
}

/// Columns of the per-device export: one row per device, one column per date
#[derive(Debug)]
struct PerDeviceColumns {
    serial: usize,
    meter_type: usize,
    location: Option<usize>,
    dates: Vec<(usize, DateTime<Utc>)>,
}

#[derive(Debug)]
enum Layout {
    PerReading(PerReadingColumns),
    PerDevice(PerDeviceColumns),
}

/// Walks the first sheet of a consumption report
///
/// # Expected Sheet Structure:
/// ```text
/// Rows 0-9:  optional title rows, then the header row
///
/// Per-reading export:
///   Nº serie | Tipo equipo | Ubicación | Id lectura | Fecha | Incidencia |
///   Lectura anterior | Lectura actual | Consumo
///
/// Per-device export:
///   Tipo | Nº Serie | Ubicación | 1º Lectura | 15/01 | 01/01 | 15/12 | ...
/// ```
///
/// Layouts are told apart by header names, never by position.
pub struct SheetParser {
    reference_year: i32,
}

impl SheetParser {
    pub fn new(reference_year: i32) -> Self {
        Self { reference_year }
    }

    pub fn parse(&self, range: &Range<Data>) -> Result<Vec<RawRow>, ParserError> {
        let (header_row, layout) = self.detect_layout(range)?;
        debug!("Header found at row {}: {:?}", header_row, layout);

        let rows = match layout {
            Layout::PerReading(columns) => parse_per_reading(range, header_row, &columns)?,
            Layout::PerDevice(columns) => parse_per_device(range, header_row, &columns)?,
        };

        info!("Parsed {} readings from report sheet", rows.len());
        Ok(rows)
    }

    fn detect_layout(&self, range: &Range<Data>) -> Result<(usize, Layout), ParserError> {
        for row in 0..range.height().min(HEADER_SEARCH_ROWS) {
            let names: Vec<String> = (0..range.width())
                .map(|col| {
                    cell_text(range.get((row, col)))
                        .map(|text| normalize_header(&text))
                        .unwrap_or_default()
                })
                .collect();
            let find = |name: &str| names.iter().position(|n| n == name);

            let Some(serial) = find(SERIAL_HEADER) else {
                continue;
            };
            let meter_type = TYPE_HEADERS
                .iter()
                .find_map(|&name| find(name))
                .ok_or_else(|| {
                    ParserError::MissingHeader(format!("no meter type column in row {row}"))
                })?;
            let location = find(LOCATION_HEADER);

            if let (Some(date), Some(value)) = (find(DATE_HEADER), find(CURRENT_READING_HEADER)) {
                let columns = PerReadingColumns {
                    serial,
                    meter_type,
                    location,
                    date,
                    value,
                };
                return Ok((row, Layout::PerReading(columns)));
            }

            let fixed = [Some(serial), Some(meter_type), location];
            let dates = self.date_columns(range, row, &fixed);
            let columns = PerDeviceColumns {
                serial,
                meter_type,
                location,
                dates,
            };
            return Ok((row, Layout::PerDevice(columns)));
        }

        Err(ParserError::MissingHeader(format!(
            "no '{SERIAL_HEADER}' column in the first {HEADER_SEARCH_ROWS} rows"
        )))
    }

    /// Resolve the date of each reading column in the per-device header
    ///
    /// Headers run newest first. A year-less header starts at the reference
    /// year and steps back one year whenever its month is later than the
    /// previous header's month. Headers with a full date reset the year.
    fn date_columns(
        &self,
        range: &Range<Data>,
        header_row: usize,
        fixed: &[Option<usize>],
    ) -> Vec<(usize, DateTime<Utc>)> {
        let mut year = self.reference_year;
        let mut previous_month: Option<u32> = None;
        let mut columns = Vec::new();

        for col in (0..range.width()).filter(|c| !fixed.contains(&Some(*c))) {
            let cell = range.get((header_row, col));
            let Some(text) = cell_text(cell) else {
                continue;
            };

            let date = if let Some(full) = header_full_date(cell) {
                year = full.year();
                Some(full)
            } else if let Some((day, month)) = day_month_pattern().and_then(|re| {
                let caps = re.captures(&text)?;
                Some((caps[1].parse::<u32>().ok()?, caps[2].parse::<u32>().ok()?))
            }) {
                if previous_month.is_some_and(|previous| month > previous) {
                    year -= 1;
                }
                NaiveDate::from_ymd_opt(year, month, day)
            } else {
                None
            };

            match date {
                Some(date) => {
                    previous_month = Some(date.month());
                    if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
                        columns.push((col, midnight.and_utc()));
                    }
                }
                None => warn!("Ignoring report column {} with header '{}'", col, text),
            }
        }

        debug!("Found {} date columns", columns.len());
        columns
    }
}

/// Header cells that carry a complete date
fn header_full_date(cell: Option<&Data>) -> Option<NaiveDate> {
    let datetime = match cell? {
        Data::DateTime(dt) => dt.as_datetime(),
        Data::String(s) | Data::DateTimeIso(s) => parse_date_text(s),
        // Small numbers are column labels, not serial dates
        Data::Float(f) => excel_serial_to_datetime(*f).filter(|d| d.year() >= 2000),
        Data::Int(i) => excel_serial_to_datetime(*i as f64).filter(|d| d.year() >= 2000),
        _ => None,
    };
    datetime.map(|d| d.date())
}

fn parse_per_reading(
    range: &Range<Data>,
    header_row: usize,
    columns: &PerReadingColumns,
) -> Result<Vec<RawRow>, ParserError> {
    let mut rows = Vec::new();

    for row in (header_row + 1)..range.height() {
        let Some((serial_number, meter_type, location)) = device_fields(
            range,
            row,
            columns.serial,
            columns.meter_type,
            columns.location,
        ) else {
            continue;
        };

        let Some(timestamp) = cell_datetime(range.get((row, columns.date)), row, columns.date)?
        else {
            warn!("Row {} for device {} has no date, skipping", row, serial_number);
            continue;
        };

        let value = cell_number(range.get((row, columns.value)), row, columns.value)?;
        let Some(value) = non_negative(value, row, columns.value)? else {
            warn!("Row {} for device {} has no reading, skipping", row, serial_number);
            continue;
        };

        rows.push(RawRow {
            serial_number,
            location,
            timestamp,
            value,
            meter_type,
        });
    }

    Ok(rows)
}

fn parse_per_device(
    range: &Range<Data>,
    header_row: usize,
    columns: &PerDeviceColumns,
) -> Result<Vec<RawRow>, ParserError> {
    let mut rows = Vec::new();

    for row in (header_row + 1)..range.height() {
        let Some((serial_number, meter_type, location)) = device_fields(
            range,
            row,
            columns.serial,
            columns.meter_type,
            columns.location,
        ) else {
            continue;
        };

        let mut values = Vec::with_capacity(columns.dates.len());
        for &(col, timestamp) in &columns.dates {
            let value = cell_number(range.get((row, col)), row, col)?;
            values.push((timestamp, non_negative(value, row, col)?));
        }
        values.sort_by_key(|(timestamp, _)| *timestamp);

        // Gaps take the most recent older value; leading gaps are dropped
        let mut carried: Option<f64> = None;
        for (timestamp, value) in values {
            let Some(value) = value.or(carried) else {
                continue;
            };
            carried = Some(value);
            rows.push(RawRow {
                serial_number: serial_number.clone(),
                location: location.clone(),
                timestamp,
                value,
                meter_type,
            });
        }
    }

    Ok(rows)
}

/// Serial, meter type and location of a data row
///
/// `None` for blank rows, rows without a serial and unknown meter types.
fn device_fields(
    range: &Range<Data>,
    row: usize,
    serial_col: usize,
    type_col: usize,
    location_col: Option<usize>,
) -> Option<(String, MeterType, String)> {
    if (0..range.width()).all(|col| cell_text(range.get((row, col))).is_none()) {
        return None;
    }

    let Some(serial_number) = cell_text(range.get((row, serial_col))) else {
        debug!("Row {} has no serial number, skipping", row);
        return None;
    };

    let description = cell_text(range.get((row, type_col))).unwrap_or_default();
    let Some(meter_type) = MeterType::from_description(&description) else {
        warn!(
            "Unknown meter type '{}' for device {}, skipping row {}",
            description, serial_number, row
        );
        return None;
    };

    let location = location_col
        .and_then(|col| cell_text(range.get((row, col))))
        .unwrap_or_default();

    Some((serial_number, meter_type, location))
}

fn non_negative(value: Option<f64>, row: usize, col: usize) -> Result<Option<f64>, ParserError> {
    match value {
        Some(v) if v < 0.0 => Err(ParserError::InvalidData {
            row,
            col,
            msg: format!("negative reading {v}"),
        }),
        other => Ok(other),
    }
}

/// `dd/mm` date header, compiled once
fn day_month_pattern() -> Option<&'static Regex> {
    static DAY_MONTH: OnceLock<Option<Regex>> = OnceLock::new();
    DAY_MONTH
        .get_or_init(|| Regex::new(r"^(\d{1,2})/(\d{1,2})$").ok())
        .as_ref()
}
