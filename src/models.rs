//! Data models for the sensor bridge.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;

use crate::error::DecodeError;

// ---

/// Timestamp layout emitted by rtl_433 in the `time` field.
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Raw reading as carried in the syslog message payload.
///
/// Unknown fields (`model`, `mic`, ...) are ignored.
#[derive(Debug, Deserialize)]
pub struct RawReading {
    // ---
    pub time: String,
    pub id: i64,
    #[serde(default)]
    pub channel: Option<i64>,
    pub battery_ok: BatteryFlag,
    #[serde(rename = "temperature_C")]
    pub temperature_c: f64,
    pub humidity: i64,
}

/// rtl_433 reports battery state as `0|1`; some decoders emit a JSON bool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum BatteryFlag {
    Bool(bool),
    Int(i64),
}

impl BatteryFlag {
    pub fn is_ok(self) -> bool {
        match self {
            BatteryFlag::Bool(b) => b,
            BatteryFlag::Int(n) => n != 0,
        }
    }
}

/// One parsed telemetry sample.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    // ---
    pub timestamp: DateTime<Utc>,
    pub sensor_id: i64,
    pub name: String,
    pub channel: Option<String>,
    pub battery_ok: bool,
    pub temperature_c: f64,
    pub temperature_f: f64,
    pub humidity: i64,
}

impl RawReading {
    // ---
    /// Parse a JSON payload into a raw reading.
    pub fn from_json(payload: &str) -> Result<Self, DecodeError> {
        Ok(serde_json::from_str(payload)?)
    }

    /// Resolve the sensor name and derive Fahrenheit.
    ///
    /// The `time` field carries no zone and is read as UTC.
    pub fn to_reading(&self, identity: &SensorIdentity) -> Result<Reading, DecodeError> {
        // ---
        let timestamp = NaiveDateTime::parse_from_str(&self.time, TIME_FORMAT)
            .map_err(|source| DecodeError::Timestamp {
                value: self.time.clone(),
                source,
            })?
            .and_utc();

        Ok(Reading {
            timestamp,
            sensor_id: self.id,
            name: identity.resolve(self.id),
            channel: self.channel.map(|c| c.to_string()),
            battery_ok: self.battery_ok.is_ok(),
            temperature_c: self.temperature_c,
            temperature_f: celsius_to_fahrenheit(self.temperature_c),
            humidity: self.humidity,
        })
    }
}

pub fn celsius_to_fahrenheit(c: f64) -> f64 {
    c * 1.8 + 32.0
}

/// Static sensor id → friendly name table, loaded once at startup.
#[derive(Debug, Clone, Default)]
pub struct SensorIdentity {
    names: BTreeMap<i64, String>,
}

impl SensorIdentity {
    // ---
    pub fn new(names: BTreeMap<i64, String>) -> Self {
        Self { names }
    }

    /// Friendly name for `id`, or the id itself when unmapped.
    pub fn resolve(&self, id: i64) -> String {
        self.names
            .get(&id)
            .cloned()
            .unwrap_or_else(|| id.to_string())
    }

    /// Every configured sensor name.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.values().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use chrono::{TimeZone, Timelike};

    fn create_test_identity() -> SensorIdentity {
        // ---
        SensorIdentity::new(BTreeMap::from([
            (3, "attic".to_string()),
            (4, "garage".to_string()),
        ]))
    }

    fn create_test_raw_reading(temp_c: f64, humidity: i64) -> RawReading {
        // ---
        RawReading {
            time: "2024-01-01 00:00:00".to_string(),
            id: 3,
            channel: Some(1),
            battery_ok: BatteryFlag::Int(1),
            temperature_c: temp_c,
            humidity,
        }
    }

    #[test]
    fn test_temperature_conversion() {
        // ---
        let reading = create_test_raw_reading(21.5, 40)
            .to_reading(&create_test_identity())
            .unwrap();

        assert_eq!(reading.temperature_f, 21.5 * 1.8 + 32.0);
        assert_eq!(reading.temperature_f.to_string(), "70.7");
        assert_eq!(reading.temperature_c, 21.5);

        let freezing = create_test_raw_reading(0.0, 40)
            .to_reading(&create_test_identity())
            .unwrap();
        assert_eq!(freezing.temperature_f, 32.0);

        let cold = create_test_raw_reading(-40.0, 40)
            .to_reading(&create_test_identity())
            .unwrap();
        assert_eq!(cold.temperature_f, -40.0);
    }

    #[test]
    fn test_timestamp_parsed_as_utc() {
        // ---
        let mut raw = create_test_raw_reading(20.0, 50);
        raw.time = "2024-03-26 18:45:07".to_string();
        let reading = raw.to_reading(&create_test_identity()).unwrap();

        assert_eq!(
            reading.timestamp,
            Utc.with_ymd_and_hms(2024, 3, 26, 18, 45, 7).unwrap()
        );
        assert_eq!(reading.timestamp.hour(), 18);
    }

    #[test]
    fn test_bad_timestamp_rejected() {
        // ---
        let mut raw = create_test_raw_reading(20.0, 50);
        raw.time = "2024-03-26T18:45:07Z".to_string();

        let err = raw.to_reading(&create_test_identity()).unwrap_err();
        assert!(matches!(err, DecodeError::Timestamp { .. }));
    }

    #[test]
    fn test_name_resolution() {
        // ---
        let identity = create_test_identity();
        assert_eq!(identity.resolve(3), "attic");
        assert_eq!(identity.resolve(4), "garage");
        assert_eq!(identity.resolve(17), "17");

        let mut raw = create_test_raw_reading(20.0, 50);
        raw.id = 99;
        let reading = raw.to_reading(&identity).unwrap();
        assert_eq!(reading.name, "99");
        assert_eq!(reading.sensor_id, 99);
    }

    #[test]
    fn test_json_payload_decoding() {
        // ---
        let payload = r#"{"time":"2024-01-01 00:00:00","model":"Fineoffset-WH31E",
            "id":3,"channel":1,"battery_ok":1,"temperature_C":21.5,"humidity":40,"mic":"CRC"}"#;
        let reading = RawReading::from_json(payload)
            .unwrap()
            .to_reading(&create_test_identity())
            .unwrap();

        assert_eq!(reading.name, "attic");
        assert_eq!(reading.channel.as_deref(), Some("1"));
        assert!(reading.battery_ok);
        assert_eq!(reading.humidity, 40);
    }

    #[test]
    fn test_battery_flag_variants() {
        // ---
        let base = |battery: &str| {
            format!(
                r#"{{"time":"2024-01-01 00:00:00","id":3,"battery_ok":{battery},"temperature_C":1.0,"humidity":1}}"#
            )
        };

        let as_bool = RawReading::from_json(&base("true")).unwrap();
        assert!(as_bool.battery_ok.is_ok());

        let low = RawReading::from_json(&base("0")).unwrap();
        assert!(!low.battery_ok.is_ok());

        let as_false = RawReading::from_json(&base("false")).unwrap();
        assert_eq!(as_false.battery_ok, BatteryFlag::Bool(false));
        assert!(as_false.channel.is_none());
    }

    #[test]
    fn test_malformed_payloads_rejected() {
        // ---
        assert!(matches!(
            RawReading::from_json("not json"),
            Err(DecodeError::Json(_))
        ));
        // humidity must be an integer
        assert!(RawReading::from_json(
            r#"{"time":"2024-01-01 00:00:00","id":3,"battery_ok":1,"temperature_C":1.0,"humidity":40.5}"#
        )
        .is_err());
        // id is required
        assert!(RawReading::from_json(
            r#"{"time":"2024-01-01 00:00:00","battery_ok":1,"temperature_C":1.0,"humidity":40}"#
        )
        .is_err());
    }
}
