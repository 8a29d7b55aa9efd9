use std::fmt;

use chrono::{DateTime, Utc};
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};

use crate::error::ValidationError;
use crate::models::Reading;
use crate::utils::fold_ascii;

/// Kind of meter, as reported in the type column of a report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MeterType {
    Heating,
    HotWater,
    ColdWater,
}

impl MeterType {
    /// Stable machine name, also used when serializing
    pub fn label(&self) -> &'static str {
        match self {
            MeterType::Heating => "heating",
            MeterType::HotWater => "hot_water",
            MeterType::ColdWater => "cold_water",
        }
    }

    /// Detect the meter type from the portal's description
    ///
    /// Examples: "Distribuidor de costes de calefacción", "Agua Caliente",
    /// "Contador de agua fría". Returns `None` for anything else.
    pub fn from_description(description: &str) -> Option<Self> {
        let folded = fold_ascii(description);
        if folded.contains("calefaccion") {
            Some(MeterType::Heating)
        } else if folded.contains("agua caliente") {
            Some(MeterType::HotWater)
        } else if folded.contains("agua fria") {
            Some(MeterType::ColdWater)
        } else {
            None
        }
    }
}

impl Serialize for MeterType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

impl fmt::Display for MeterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MeterType::Heating => "Heating",
            MeterType::HotWater => "Hot water",
            MeterType::ColdWater => "Cold water",
        };
        f.write_str(name)
    }
}

/// A meter and its reading history, ascending by timestamp
#[derive(Debug, Clone, PartialEq)]
pub struct Device {
    serial_number: String,
    location: String,
    meter_type: MeterType,
    history: Vec<Reading>,
}

impl Device {
    pub fn new(
        serial_number: impl Into<String>,
        location: impl Into<String>,
        meter_type: MeterType,
    ) -> Self {
        Self {
            serial_number: serial_number.into(),
            location: location.into(),
            meter_type,
            history: Vec::new(),
        }
    }

    pub fn serial_number(&self) -> &str {
        &self.serial_number
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn meter_type(&self) -> MeterType {
        self.meter_type
    }

    pub fn history(&self) -> &[Reading] {
        &self.history
    }

    /// Insert a reading keeping the history sorted; same timestamp overwrites
    pub fn add_reading(&mut self, reading: Reading) -> Result<(), ValidationError> {
        // Revalidate on insert
        Reading::new(reading.value(), reading.timestamp())?;

        match self
            .history
            .binary_search_by_key(&reading.timestamp(), Reading::timestamp)
        {
            Ok(idx) => self.history[idx] = reading,
            Err(idx) => self.history.insert(idx, reading),
        }
        Ok(())
    }

    pub fn add_reading_value(
        &mut self,
        value: f64,
        timestamp: DateTime<Utc>,
    ) -> Result<(), ValidationError> {
        self.add_reading(Reading::new(value, timestamp)?)
    }

    pub fn last_reading(&self) -> Option<&Reading> {
        self.history.last()
    }

    /// Difference between the two most recent readings
    pub fn last_consumption(&self) -> Option<f64> {
        match self.history.as_slice() {
            [.., previous, last] => Some(last - previous),
            _ => None,
        }
    }
}

impl Serialize for Device {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Device", 6)?;
        state.serialize_field("serial_number", &self.serial_number)?;
        state.serialize_field("location", &self.location)?;
        state.serialize_field("meter_type", &self.meter_type)?;
        state.serialize_field("history", &self.history)?;
        state.serialize_field("last_reading", &self.last_reading())?;
        state.serialize_field("last_consumption", &self.last_consumption())?;
        state.end()
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<{} device {} at {} ({} readings)>",
            self.meter_type,
            self.serial_number,
            self.location,
            self.history.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, 0, 0, 0).unwrap()
    }

    fn heating() -> Device {
        Device::new("12345", "Salón", MeterType::Heating)
    }

    #[test]
    fn test_out_of_order_inserts_are_sorted() {
        let mut device = heating();
        for (day, value) in [(5, 50.0), (1, 10.0), (3, 30.0), (2, 20.0), (4, 40.0)] {
            device.add_reading_value(value, at(day)).unwrap();
        }

        let timestamps: Vec<_> = device.history().iter().map(Reading::timestamp).collect();
        assert_eq!(timestamps, vec![at(1), at(2), at(3), at(4), at(5)]);
        assert_eq!(device.history().len(), 5);
    }

    #[test]
    fn test_same_timestamp_overwrites() {
        let mut device = heating();
        device.add_reading_value(10.0, at(1)).unwrap();
        device.add_reading_value(20.0, at(2)).unwrap();
        device.add_reading_value(25.0, at(2)).unwrap();

        assert_eq!(device.history().len(), 2);
        assert_eq!(device.history()[1].value(), 25.0);
    }

    #[test]
    fn test_negative_value_leaves_history_untouched() {
        let mut device = heating();
        device.add_reading_value(10.0, at(1)).unwrap();

        let result = device.add_reading_value(-1.0, at(2));
        assert_eq!(result, Err(ValidationError::NegativeReading(-1.0)));
        assert_eq!(device.history().len(), 1);
    }

    #[test]
    fn test_last_reading_is_latest_timestamp() {
        let mut device = heating();
        assert!(device.last_reading().is_none());

        device.add_reading_value(30.0, at(3)).unwrap();
        device.add_reading_value(10.0, at(1)).unwrap();
        assert_eq!(device.last_reading().map(Reading::value), Some(30.0));
    }

    #[test]
    fn test_last_consumption_needs_two_readings() {
        let mut device = heating();
        assert_eq!(device.last_consumption(), None);

        device.add_reading_value(10.0, at(1)).unwrap();
        assert_eq!(device.last_consumption(), None);

        device.add_reading_value(14.5, at(2)).unwrap();
        assert_eq!(device.last_consumption(), Some(4.5));
    }

    #[test]
    fn test_last_consumption_can_be_negative() {
        let mut device = Device::new("9", "Cocina", MeterType::ColdWater);
        device.add_reading_value(999.0, at(1)).unwrap();
        device.add_reading_value(3.0, at(2)).unwrap();
        assert_eq!(device.last_consumption(), Some(-996.0));
    }

    #[test]
    fn test_meter_type_from_description() {
        assert_eq!(
            MeterType::from_description("Distribuidor de costes de Calefacción"),
            Some(MeterType::Heating)
        );
        assert_eq!(
            MeterType::from_description("AGUA CALIENTE"),
            Some(MeterType::HotWater)
        );
        assert_eq!(
            MeterType::from_description("Contador agua fría"),
            Some(MeterType::ColdWater)
        );
        assert_eq!(MeterType::from_description("Gas"), None);
    }

    #[test]
    fn test_labels() {
        assert_eq!(MeterType::Heating.label(), "heating");
        assert_eq!(MeterType::HotWater.label(), "hot_water");
        assert_eq!(MeterType::ColdWater.label(), "cold_water");
    }

    #[test]
    fn test_meter_type_serializes_as_label() {
        for meter_type in [MeterType::Heating, MeterType::HotWater, MeterType::ColdWater] {
            assert_eq!(serde_json::to_value(meter_type).unwrap(), meter_type.label());
        }
    }

    #[test]
    fn test_display() {
        let mut device = heating();
        device.add_reading_value(1.0, at(1)).unwrap();
        assert_eq!(device.to_string(), "<Heating device 12345 at Salón (1 readings)>");
    }

    #[test]
    fn test_serialize_includes_derived_values() {
        let mut device = Device::new("777", "Baño", MeterType::HotWater);
        device.add_reading_value(1.0, at(1)).unwrap();
        device.add_reading_value(3.5, at(2)).unwrap();

        let json = serde_json::to_value(&device).unwrap();
        assert_eq!(json["serial_number"], "777");
        assert_eq!(json["meter_type"], "hot_water");
        assert_eq!(json["history"].as_array().unwrap().len(), 2);
        assert_eq!(json["last_reading"]["value"], 3.5);
        assert_eq!(json["last_consumption"], 2.5);
    }
}
