use std::collections::HashMap;

use chrono::{Datelike, Duration, NaiveDate};
use tracing::{debug, error, info, instrument, warn};

use crate::config::{Config, MAX_DAYS_PER_REQUEST};
use crate::error::{CalistaError, ValidationError};
use crate::models::{Device, Reading};
use crate::reports::{parse_report, ParserError, RawRow};
use crate::session::{Payload, SessionManager, SessionStatus};
use crate::utils::location_key;

/// Date window of a single report request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportChunk {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Entry point for downloading device histories from the portal
pub struct CalistaClient {
    config: Config,
    session: SessionManager,
}

impl CalistaClient {
    pub fn new(config: Config) -> Self {
        let session = SessionManager::new(&config);
        Self { config, session }
    }

    pub fn account(&self) -> &str {
        &self.config.email
    }

    pub async fn login(&self) -> Result<(), CalistaError> {
        self.session.login().await
    }

    pub async fn logout(&self) {
        self.session.logout().await
    }

    pub async fn session_status(&self) -> SessionStatus {
        self.session.status().await
    }

    /// Reading history of every device between two dates
    ///
    /// The range is split into report windows of at most
    /// `max_days_per_request` days. A window whose report cannot be parsed is
    /// skipped; the call only fails with a parser error when every window
    /// failed. The session is always closed before returning.
    #[instrument(skip(self), fields(account = %self.config.email))]
    pub async fn get_devices_history(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<HashMap<String, Device>, CalistaError> {
        validate_range(start, end)?;

        let result = self.collect_history(start, end).await;
        self.session.logout().await;

        match &result {
            Ok(devices) => info!("Fetched history for {} devices", devices.len()),
            Err(e) => error!("Failed to fetch device history: {}", e),
        }
        result
    }

    async fn collect_history(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<HashMap<String, Device>, CalistaError> {
        self.session.login().await?;

        let chunks = split_range(start, end, self.config.max_days_per_request);
        debug!("Split {} to {} into {} report requests", start, end, chunks.len());

        let mut devices: HashMap<String, Device> = HashMap::new();
        let mut merged_chunks = 0;
        let mut last_failure: Option<ParserError> = None;

        for chunk in chunks {
            let payload = self.session.fetch_report(chunk.start, chunk.end).await?;

            match parse_chunk(payload, chunk.end.year()).await {
                Ok(rows) => {
                    debug!(
                        "Report {} to {} yielded {} readings",
                        chunk.start,
                        chunk.end,
                        rows.len()
                    );
                    merge_rows(&mut devices, rows);
                    merged_chunks += 1;
                }
                Err(e) => {
                    error!("Report {} to {} failed: {}", chunk.start, chunk.end, e);
                    last_failure = Some(ParserError::Chunk {
                        start: chunk.start,
                        end: chunk.end,
                        source: Box::new(e),
                    });
                }
            }
        }

        match last_failure {
            Some(failure) if merged_chunks == 0 => Err(failure.into()),
            _ => Ok(devices),
        }
    }
}

/// Reject empty, reversed and overlong ranges
pub fn validate_range(start: NaiveDate, end: NaiveDate) -> Result<(), ValidationError> {
    if end <= start {
        return Err(ValidationError::InvalidDateRange { start, end });
    }

    let days = (end - start).num_days();
    if days > MAX_DAYS_PER_REQUEST {
        return Err(ValidationError::RangeTooLong {
            days,
            max: MAX_DAYS_PER_REQUEST,
        });
    }
    Ok(())
}

/// Consecutive windows of at most `max_days`, each starting where the last ended
pub fn split_range(start: NaiveDate, end: NaiveDate, max_days: i64) -> Vec<ReportChunk> {
    let step = Duration::days(max_days.clamp(1, MAX_DAYS_PER_REQUEST));
    let mut chunks = Vec::new();
    let mut current = start;

    while current < end {
        let chunk_end = (current + step).min(end);
        chunks.push(ReportChunk {
            start: current,
            end: chunk_end,
        });
        current = chunk_end;
    }
    chunks
}

/// Parse and validate a whole report off the runtime
///
/// Either every row becomes a reading or the report fails as a unit.
async fn parse_chunk(
    payload: Payload,
    reference_year: i32,
) -> Result<Vec<(RawRow, Reading)>, ParserError> {
    tokio::task::spawn_blocking(move || -> Result<Vec<(RawRow, Reading)>, ParserError> {
        let rows = parse_report(payload.kind, &payload.bytes, reference_year)?;
        rows.into_iter()
            .map(|row| match Reading::new(row.value, row.timestamp) {
                Ok(reading) => Ok((row, reading)),
                Err(source) => Err(ParserError::InvalidReading {
                    serial: row.serial_number,
                    source,
                }),
            })
            .collect()
    })
    .await
    .map_err(|e| ParserError::Task(e.to_string()))?
}

fn merge_rows(devices: &mut HashMap<String, Device>, rows: Vec<(RawRow, Reading)>) {
    for (row, reading) in rows {
        let device = devices
            .entry(row.serial_number.clone())
            .or_insert_with(|| Device::new(&row.serial_number, &row.location, row.meter_type));

        if location_key(device.location()) != row.location_key() {
            warn!(
                "Device {} moved from {} to {}, keeping {}",
                row.serial_number,
                device.location(),
                row.location,
                device.location()
            );
        }

        if device.meter_type() != row.meter_type {
            warn!(
                "Device {} reported as {:?} and {:?}, keeping {:?}",
                row.serial_number,
                device.meter_type(),
                row.meter_type,
                device.meter_type()
            );
        }

        if let Err(e) = device.add_reading(reading) {
            warn!("Dropping reading for device {}: {}", row.serial_number, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MeterType;
    use chrono::{TimeZone, Utc};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_validate_range_reversed() {
        let result = validate_range(date(2024, 2, 1), date(2024, 1, 1));
        assert_eq!(
            result,
            Err(ValidationError::InvalidDateRange {
                start: date(2024, 2, 1),
                end: date(2024, 1, 1)
            })
        );
        assert!(validate_range(date(2024, 1, 1), date(2024, 1, 1)).is_err());
    }

    #[test]
    fn test_validate_range_limit() {
        let start = date(2024, 1, 1);
        assert!(validate_range(start, start + Duration::days(240)).is_ok());
        assert_eq!(
            validate_range(start, start + Duration::days(241)),
            Err(ValidationError::RangeTooLong { days: 241, max: 240 })
        );
    }

    #[test]
    fn test_split_range_single_chunk() {
        let chunks = split_range(date(2024, 1, 1), date(2024, 1, 31), 240);
        assert_eq!(
            chunks,
            vec![ReportChunk {
                start: date(2024, 1, 1),
                end: date(2024, 1, 31)
            }]
        );
    }

    #[test]
    fn test_split_range_windows_are_contiguous() {
        let chunks = split_range(date(2024, 1, 1), date(2024, 1, 26), 10);
        let bounds: Vec<_> = chunks.iter().map(|c| (c.start, c.end)).collect();
        assert_eq!(
            bounds,
            vec![
                (date(2024, 1, 1), date(2024, 1, 11)),
                (date(2024, 1, 11), date(2024, 1, 21)),
                (date(2024, 1, 21), date(2024, 1, 26)),
            ]
        );
    }

    #[test]
    fn test_split_range_clamps_window() {
        assert_eq!(split_range(date(2024, 1, 1), date(2024, 1, 4), 0).len(), 3);
    }

    #[test]
    fn test_merge_rows_groups_by_serial() {
        let row = |serial: &str, day: u32, value: f64| {
            let timestamp = Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap();
            let raw = RawRow {
                serial_number: serial.to_string(),
                location: "Cocina".to_string(),
                timestamp,
                value,
                meter_type: MeterType::Heating,
            };
            (raw, Reading::new(value, timestamp).unwrap())
        };

        let mut devices = HashMap::new();
        merge_rows(&mut devices, vec![row("1", 2, 20.0), row("2", 1, 5.0)]);
        merge_rows(&mut devices, vec![row("1", 1, 10.0), row("1", 2, 21.0)]);

        assert_eq!(devices.len(), 2);
        let first = &devices["1"];
        let values: Vec<_> = first.history().iter().map(Reading::value).collect();
        assert_eq!(values, vec![10.0, 21.0]);
        assert_eq!(first.last_consumption(), Some(11.0));
    }

    #[test]
    fn test_merge_rows_keeps_first_location() {
        let row = |location: &str, day: u32| {
            let timestamp = Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap();
            let raw = RawRow {
                serial_number: "1".to_string(),
                location: location.to_string(),
                timestamp,
                value: f64::from(day),
                meter_type: MeterType::Heating,
            };
            (raw, Reading::new(f64::from(day), timestamp).unwrap())
        };

        let mut devices = HashMap::new();
        merge_rows(&mut devices, vec![row("Salón", 1)]);
        merge_rows(&mut devices, vec![row("SALON ", 2), row("Cocina", 3)]);

        let device = &devices["1"];
        assert_eq!(device.location(), "Salón");
        assert_eq!(device.history().len(), 3);
    }
}
