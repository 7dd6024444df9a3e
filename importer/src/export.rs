//! Parsing of the CSV files produced by Netatmo's "export data" feature.
//!
//! ```text
//! Timezone : Europe/Berlin;...
//! "Mein Zuhause";13.40;52.52;"Indoor";"NAMain"
//! Timestamp;"Timezone : Europe/Berlin";Temperature;Humidity;CO2;Noise;Pressure
//! 1609455600;"2021/01/01 00:00:00";20.1;45;612;36;1018.2
//! ```

use anyhow::{bail, Context, Result};
use csv::StringRecord;
use netatmo_exporter::model::{unix_time, Point};
use std::io::Read;
use tracing::warn;

const DELIMITER: u8 = b';';
const METADATA_MODULE_COLUMN: usize = 3;
const FIRST_VALUE_COLUMN: usize = 2;

#[derive(Debug, Clone, PartialEq)]
pub struct ExportHeader {
    pub module: String,
    /// Measurement names, one per value column.
    pub fields: Vec<String>,
}

/// `;`-separated records of any length; the three header lines are read
/// as ordinary records.
pub fn reader<R: Read>(input: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .delimiter(DELIMITER)
        .has_headers(false)
        .flexible(true)
        .from_reader(input)
}

/// Consumes the three header records of an export.
pub fn read_header<I>(records: &mut I) -> Result<ExportHeader>
where
    I: Iterator<Item = csv::Result<StringRecord>>,
{
    let mut next_record = |what: &str| -> Result<StringRecord> {
        records
            .next()
            .with_context(|| format!("missing {} line", what))?
            .with_context(|| format!("failed to read {} line", what))
    };

    next_record("title")?;

    let metadata = next_record("metadata")?;
    let Some(module) = metadata.get(METADATA_MODULE_COLUMN) else {
        bail!(
            "metadata line has {} columns, expected station;lon;lat;module;type",
            metadata.len()
        );
    };
    let module = module.to_string();

    let columns = next_record("column")?;
    let fields = columns
        .iter()
        .skip(FIRST_VALUE_COLUMN)
        .map(str::to_string)
        .collect();

    Ok(ExportHeader { module, fields })
}

/// Points for one data record, or `None` when the record is not a reading
/// (too short, no integer timestamp, or a timestamp outside the
/// representable range). Empty and non-numeric cells are left out.
pub fn row_points(header: &ExportHeader, station: &str, record: &StringRecord) -> Option<Vec<Point>> {
    if record.len() < FIRST_VALUE_COLUMN + 1 {
        return None;
    }
    let timestamp: i64 = record.get(0)?.trim().parse().ok()?;
    let Some(at) = unix_time(timestamp) else {
        warn!("Skipping row with out-of-range timestamp {}", timestamp);
        return None;
    };

    let points = header
        .fields
        .iter()
        .zip(record.iter().skip(FIRST_VALUE_COLUMN))
        .filter_map(|(field, cell)| {
            let value: f64 = cell.trim().parse().ok()?;
            Some(Point::new(field.as_str(), value, at).station_module(station, &header.module))
        })
        .collect();

    Some(points)
}
