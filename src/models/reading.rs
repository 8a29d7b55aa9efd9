use std::fmt;
use std::ops::Sub;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;

use crate::error::ValidationError;

/// A single cumulative meter value at a point in time
///
/// Values are never negative and always finite; both constructors enforce it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Reading {
    timestamp: DateTime<Utc>,
    value: f64,
}

impl Reading {
    pub fn new(value: f64, timestamp: DateTime<Utc>) -> Result<Self, ValidationError> {
        if !value.is_finite() {
            return Err(ValidationError::NonFiniteReading(value));
        }
        if value < 0.0 {
            return Err(ValidationError::NegativeReading(value));
        }
        Ok(Self { timestamp, value })
    }

    /// Naive timestamps are taken as UTC
    pub fn from_naive(value: f64, timestamp: NaiveDateTime) -> Result<Self, ValidationError> {
        Self::new(value, timestamp.and_utc())
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn value(&self) -> f64 {
        self.value
    }
}

/// Consumption between two readings, negative on counter rollover
impl Sub for &Reading {
    type Output = f64;

    fn sub(self, other: &Reading) -> f64 {
        self.value - other.value
    }
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2} @ {}", self.value, self.timestamp.to_rfc3339())
    }
}
