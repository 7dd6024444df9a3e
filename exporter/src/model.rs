use chrono::{DateTime, TimeZone, Utc};
use std::collections::BTreeMap;

/// A weather station with its fixed location and attached modules.
#[derive(Debug, Clone, PartialEq)]
pub struct Station {
    pub name: String,
    pub place: Place,
    pub modules: Vec<Module>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Place {
    pub city: String,
    pub country: String,
    pub timezone: String,
    pub longitude: f64,
    pub latitude: f64,
    pub altitude: f64,
}

/// A sensor unit. `last_measure` is `None` when the module has not
/// reported anything yet (unreachable, battery dead, freshly paired).
#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    pub name: String,
    pub last_measure: Option<LastMeasure>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LastMeasure {
    pub info: MeasurementGroup,
    pub data: MeasurementGroup,
}

/// Readings sharing a single UNIX timestamp.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeasurementGroup {
    pub timestamp: i64,
    pub values: BTreeMap<String, f64>,
}

impl MeasurementGroup {
    pub fn new(timestamp: i64) -> Self {
        Self {
            timestamp,
            values: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, name: &str, value: Option<f64>) {
        if let Some(value) = value {
            self.values.insert(name.to_string(), value);
        }
    }

    /// The group's timestamp as UTC, `None` when it is out of range.
    pub fn time(&self) -> Option<DateTime<Utc>> {
        unix_time(self.timestamp)
    }
}

/// UTC time for a UNIX timestamp in seconds. `None` when chrono cannot
/// represent it.
pub fn unix_time(secs: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(secs, 0).single()
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Float(f64),
    Text(String),
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Float(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

/// One timestamped, tagged scalar destined for InfluxDB.
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    pub measurement: String,
    pub tags: BTreeMap<String, String>,
    pub value: FieldValue,
    pub timestamp: DateTime<Utc>,
}

impl Point {
    pub fn new(
        measurement: impl Into<String>,
        value: impl Into<FieldValue>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            measurement: measurement.into(),
            tags: BTreeMap::new(),
            value: value.into(),
            timestamp,
        }
    }

    pub fn tag(mut self, key: &str, value: &str) -> Self {
        self.tags.insert(key.to_string(), value.to_string());
        self
    }

    /// Tags every point carries: which station and which module it came from.
    pub fn station_module(self, station: &str, module: &str) -> Self {
        self.tag("station", station).tag("module", module)
    }
}
