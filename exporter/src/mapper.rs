use crate::model::{MeasurementGroup, Module, Place, Point, Station};
use chrono::{DateTime, Utc};
use tracing::{info, warn};

/// Flattens one station into points: for every module that has reported,
/// six location points and the info readings at the info timestamp, then
/// the data readings at the data timestamp.
pub fn station_points(station: &Station) -> Vec<Point> {
    station
        .modules
        .iter()
        .flat_map(|module| module_points(station, module))
        .collect()
}

/// A group whose timestamp cannot be represented contributes no points.
pub fn module_points(station: &Station, module: &Module) -> Vec<Point> {
    let Some(last_measure) = &module.last_measure else {
        info!("Skipping {}, no measurement data available.", module.name);
        return Vec::new();
    };

    let tagged = |point: Point| point.station_module(&station.name, &module.name);
    let info = &last_measure.info;
    let data = &last_measure.data;

    let mut points = Vec::with_capacity(6 + info.values.len() + data.values.len());
    if let Some(at) = group_time(module, "info", info) {
        points.extend(location_points(&station.place, at).into_iter().map(tagged));
        points.extend(readings(info, at).map(tagged));
    }
    if let Some(at) = group_time(module, "data", data) {
        points.extend(readings(data, at).map(tagged));
    }

    points
}

fn group_time(module: &Module, kind: &str, group: &MeasurementGroup) -> Option<DateTime<Utc>> {
    let time = group.time();
    if time.is_none() {
        warn!(
            "Skipping {} readings of {}: timestamp {} is out of range",
            kind, module.name, group.timestamp
        );
    }
    time
}

fn location_points(place: &Place, at: DateTime<Utc>) -> [Point; 6] {
    [
        Point::new("city", place.city.as_str(), at),
        Point::new("country", place.country.as_str(), at),
        Point::new("timezone", place.timezone.as_str(), at),
        Point::new("longitude", place.longitude, at),
        Point::new("latitude", place.latitude, at),
        Point::new("altitude", place.altitude, at),
    ]
}

fn readings(group: &MeasurementGroup, at: DateTime<Utc>) -> impl Iterator<Item = Point> + '_ {
    group
        .values
        .iter()
        .map(move |(name, value)| Point::new(name.as_str(), *value, at))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FieldValue, LastMeasure};

    fn group(timestamp: i64, values: &[(&str, f64)]) -> MeasurementGroup {
        let mut group = MeasurementGroup::new(timestamp);
        for (name, value) in values {
            group.insert(name, Some(*value));
        }
        group
    }

    fn home() -> Station {
        Station {
            name: "Home".to_string(),
            place: Place {
                city: "Berlin".to_string(),
                country: "DE".to_string(),
                timezone: "Europe/Berlin".to_string(),
                longitude: 13.4,
                latitude: 52.5,
                altitude: 45.0,
            },
            modules: vec![
                Module {
                    name: "Outdoor".to_string(),
                    last_measure: Some(LastMeasure {
                        info: group(1000, &[("temperature", 21.5), ("humidity", 60.0)]),
                        data: group(1002, &[("rain", 0.2)]),
                    }),
                },
                Module {
                    name: "Wind gauge".to_string(),
                    last_measure: None,
                },
            ],
        }
    }

    #[test]
    fn test_reporting_module_yields_location_info_and_data_points() {
        let station = home();
        let points = module_points(&station, &station.modules[0]);

        assert_eq!(points.len(), 9);

        let at = |ts: i64| points.iter().filter(|p| p.timestamp.timestamp() == ts).count();
        assert_eq!(at(1000), 8);
        assert_eq!(at(1002), 1);

        let names: Vec<&str> = points.iter().map(|p| p.measurement.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "city",
                "country",
                "timezone",
                "longitude",
                "latitude",
                "altitude",
                "humidity",
                "temperature",
                "rain"
            ]
        );
        assert_eq!(points[0].value, FieldValue::Text("Berlin".to_string()));
        assert_eq!(points[5].value, FieldValue::Float(45.0));
        assert_eq!(points[8].value, FieldValue::Float(0.2));
    }

    #[test]
    fn test_every_point_is_tagged_with_station_and_module() {
        let station = home();
        for point in station_points(&station) {
            assert_eq!(point.tags.len(), 2);
            assert_eq!(point.tags["station"], "Home");
            assert_eq!(point.tags["module"], "Outdoor");
        }
    }

    #[test]
    fn test_module_without_last_measure_is_skipped() {
        let station = home();
        assert!(module_points(&station, &station.modules[1]).is_empty());
        assert_eq!(station_points(&station).len(), 9);
    }

    #[test]
    fn test_empty_groups_still_emit_location() {
        let station = Station {
            name: "S".to_string(),
            place: Place::default(),
            modules: vec![Module {
                name: "M".to_string(),
                last_measure: Some(LastMeasure {
                    info: MeasurementGroup::new(5),
                    data: MeasurementGroup::new(6),
                }),
            }],
        };

        let points = station_points(&station);
        assert_eq!(points.len(), 6);
        assert!(points.iter().all(|p| p.timestamp.timestamp() == 5));
    }

    #[test]
    fn test_out_of_range_group_is_left_out() {
        let mut station = home();
        if let Some(measure) = station.modules[0].last_measure.as_mut() {
            measure.data.timestamp = 10_000_000_000_000;
        }
        let points = station_points(&station);
        assert_eq!(points.len(), 8);
        assert!(points.iter().all(|p| p.timestamp.timestamp() == 1000));

        if let Some(measure) = station.modules[0].last_measure.as_mut() {
            measure.info.timestamp = 10_000_000_000_000;
        }
        assert!(station_points(&station).is_empty());
    }
}
